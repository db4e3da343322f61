// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

use crate::{Context, Error, ExpiringCredential, ProvideCredential, Result};
use std::fmt::{self, Debug};
use std::sync::{Arc, Mutex};

/// Credentials is a shareable handle that resolves a credential lazily.
///
/// Building a handle never performs I/O. The first call to [`Credentials::get`]
/// runs the provider; the result is memoized until it stops being valid, after
/// which the next `get` resolves again. Clones share the provider and the memo.
pub struct Credentials<K: ExpiringCredential> {
    ctx: Context,
    provider: Arc<dyn ProvideCredential<Credential = K>>,
    memo: Arc<Mutex<Option<K>>>,
}

impl<K: ExpiringCredential> Clone for Credentials<K> {
    fn clone(&self) -> Self {
        Self {
            ctx: self.ctx.clone(),
            provider: self.provider.clone(),
            memo: self.memo.clone(),
        }
    }
}

impl<K: ExpiringCredential> Debug for Credentials<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("provider", &self.provider)
            .finish_non_exhaustive()
    }
}

impl<K: ExpiringCredential> Credentials<K> {
    /// Create a new handle over the given provider.
    pub fn new(ctx: Context, provider: impl ProvideCredential<Credential = K>) -> Self {
        Self {
            ctx,
            provider: Arc::new(provider),
            memo: Arc::new(Mutex::new(None)),
        }
    }

    /// Get a valid credential, resolving it if the memoized one is missing or stale.
    ///
    /// Returns a [`ErrorKind::CredentialNotFound`](crate::ErrorKind::CredentialNotFound)
    /// error when the provider has nothing to offer.
    pub async fn get(&self) -> Result<K> {
        let memo = self.memo.lock().expect("lock poisoned").clone();
        if let Some(cred) = memo.filter(|cred| cred.is_valid()) {
            return Ok(cred);
        }

        let cred = self
            .provider
            .provide_credential(&self.ctx)
            .await?
            .ok_or_else(|| {
                Error::credential_not_found("no credential provider yielded a credential")
                    .with_context(format!("provider: {:?}", self.provider))
            })?;

        *self.memo.lock().expect("lock poisoned") = Some(cred.clone());
        Ok(cred)
    }

    /// Drop the memoized credential so the next `get` resolves again.
    pub fn expire(&self) {
        *self.memo.lock().expect("lock poisoned") = None;
    }

    /// Whether the memoized credential is missing or no longer valid.
    pub fn is_expired(&self) -> bool {
        !self.memo.lock().expect("lock poisoned").is_valid()
    }

    /// Whether two handles share the same underlying state.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.memo, &other.memo)
    }
}

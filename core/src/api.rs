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

use crate::time::DateTime;
use crate::{Context, Result};
use std::fmt::Debug;
use std::sync::Arc;

/// ExpiringCredential is implemented by credential values that may go stale.
pub trait ExpiringCredential: Clone + Debug + Send + Sync + Unpin + 'static {
    /// Check if the credential can still be used.
    fn is_valid(&self) -> bool;

    /// The instant after which the credential must not be used, if any.
    fn expires_at(&self) -> Option<DateTime>;
}

impl<T: ExpiringCredential> ExpiringCredential for Option<T> {
    fn is_valid(&self) -> bool {
        let Some(cred) = self else {
            return false;
        };

        cred.is_valid()
    }

    fn expires_at(&self) -> Option<DateTime> {
        self.as_ref().and_then(|cred| cred.expires_at())
    }
}

/// ProvideCredential resolves a credential from one specific source.
///
/// - If the source is present and yields a credential, return `Ok(Some(cred))`.
/// - If the source is absent (no env var, no file, not on EC2...), return `Ok(None)`.
/// - If the source is present but broken, return `Err(err)`.
#[async_trait::async_trait]
pub trait ProvideCredential: Debug + Send + Sync + Unpin + 'static {
    /// Credential returned by this provider.
    type Credential: Send + Sync + Unpin + 'static;

    /// Resolve the credential from the current context.
    async fn provide_credential(&self, ctx: &Context) -> Result<Option<Self::Credential>>;
}

#[async_trait::async_trait]
impl<P: ProvideCredential> ProvideCredential for Arc<P> {
    type Credential = P::Credential;

    async fn provide_credential(&self, ctx: &Context) -> Result<Option<Self::Credential>> {
        self.as_ref().provide_credential(ctx).await
    }
}

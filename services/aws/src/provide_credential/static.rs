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

use crate::Credential;
use async_trait::async_trait;
use dsauth_core::time::{now, DateTime};
use dsauth_core::utils::Redact;
use dsauth_core::{Context, ProvideCredential, Result};
use log::debug;
use std::fmt::{Debug, Formatter};

/// StaticCredentialProvider provides fixed credentials.
///
/// A provider holding an empty key pair is not applicable and yields nothing,
/// so it can sit in a chain unconditionally. Once `expires_in` has passed it
/// yields nothing either, letting the chain move on.
#[derive(Clone, Default)]
pub struct StaticCredentialProvider {
    access_key_id: String,
    secret_access_key: String,
    session_token: Option<String>,
    expires_in: Option<DateTime>,
}

impl Debug for StaticCredentialProvider {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticCredentialProvider")
            .field("access_key_id", &Redact::from(&self.access_key_id))
            .field("secret_access_key", &Redact::from(&self.secret_access_key))
            .field("session_token", &Redact::from(&self.session_token))
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

impl StaticCredentialProvider {
    /// Create a new StaticCredentialProvider with access key ID and secret access key.
    pub fn new(access_key_id: &str, secret_access_key: &str) -> Self {
        Self {
            access_key_id: access_key_id.to_string(),
            secret_access_key: secret_access_key.to_string(),
            session_token: None,
            expires_in: None,
        }
    }

    /// Set the session token.
    pub fn with_session_token(mut self, token: &str) -> Self {
        self.session_token = Some(token.to_string());
        self
    }

    /// Set the expiration reported on the provided credential.
    pub fn with_expires_in(mut self, expires_in: DateTime) -> Self {
        self.expires_in = Some(expires_in);
        self
    }

    /// Whether this provider holds a usable key pair.
    pub fn is_empty(&self) -> bool {
        self.access_key_id.is_empty() || self.secret_access_key.is_empty()
    }
}

#[async_trait]
impl ProvideCredential for StaticCredentialProvider {
    type Credential = Credential;

    async fn provide_credential(&self, _: &Context) -> Result<Option<Self::Credential>> {
        if self.is_empty() {
            return Ok(None);
        }
        if self.expires_in.is_some_and(|t| t <= now()) {
            debug!("static credential expired at {:?}", self.expires_in);
            return Ok(None);
        }

        Ok(Some(Credential {
            access_key_id: self.access_key_id.clone(),
            secret_access_key: self.secret_access_key.clone(),
            session_token: self.session_token.clone(),
            expires_in: self.expires_in,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dsauth_core::time::delta;
    use std::time::Duration;

    #[tokio::test]
    async fn test_static_credential_provider() -> anyhow::Result<()> {
        let ctx = Context::new();

        // Test with basic credentials
        let provider = StaticCredentialProvider::new("test_access_key", "test_secret_key");
        let cred = provider.provide_credential(&ctx).await?;
        assert!(cred.is_some());
        let cred = cred.unwrap();
        assert_eq!(cred.access_key_id, "test_access_key");
        assert_eq!(cred.secret_access_key, "test_secret_key");
        assert!(cred.session_token.is_none());
        assert!(cred.expires_in.is_none());

        // Test with session token and expiration
        let expires_in = now() + delta(Duration::from_secs(900));
        let provider = StaticCredentialProvider::new("test_access_key", "test_secret_key")
            .with_session_token("test_session_token")
            .with_expires_in(expires_in);
        let cred = provider.provide_credential(&ctx).await?.unwrap();
        assert_eq!(cred.session_token, Some("test_session_token".to_string()));
        assert_eq!(cred.expires_in, Some(expires_in));

        Ok(())
    }

    #[tokio::test]
    async fn test_static_credential_provider_empty() -> anyhow::Result<()> {
        let ctx = Context::new();

        for (ak, sk) in [("", ""), ("test_access_key", ""), ("", "test_secret_key")] {
            let provider = StaticCredentialProvider::new(ak, sk);
            assert!(provider.is_empty());
            assert!(provider.provide_credential(&ctx).await?.is_none());
        }

        Ok(())
    }

    #[tokio::test]
    async fn test_static_credential_provider_expired() -> anyhow::Result<()> {
        let provider = StaticCredentialProvider::new("test_access_key", "test_secret_key")
            .with_session_token("test_session_token")
            .with_expires_in(now() - delta(Duration::from_secs(60)));

        assert!(!provider.is_empty());
        assert!(provider.provide_credential(&Context::new()).await?.is_none());
        Ok(())
    }
}

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

use crate::constants::NON_ARN_CACHE_TTL;
use crate::{
    build_bootstrap_chain, build_provider_chain, AssumeRoleApi, AssumeRoleInput, AuthType,
    Config, CredentialCache, CredentialHandle, DatasourceSettings, StsClient,
};
use dsauth_core::time::{delta, now};
use dsauth_core::utils::Redact;
use dsauth_core::{Context, Credentials, Result};
use log::debug;
use std::sync::Arc;

/// ConfigLoader turns datasource settings into a region scoped [`Config`].
///
/// Handles are cached per [`crate::CacheKey`]: callers with the same auth
/// configuration share one handle until its cache entry expires. Clones of a
/// loader share the cache.
///
/// ```no_run
/// use dsauth_aws::{ConfigLoader, DatasourceSettings};
/// use dsauth_core::{Context, OsEnv};
/// use dsauth_file_read_tokio::TokioFileRead;
/// use dsauth_http_send_reqwest::ReqwestHttpSend;
///
/// # async fn example() -> anyhow::Result<()> {
/// let ctx = Context::new()
///     .with_file_read(TokioFileRead)
///     .with_http_send(ReqwestHttpSend::default())
///     .with_env(OsEnv);
/// let loader = ConfigLoader::new(ctx);
///
/// let settings: DatasourceSettings =
///     serde_json::from_str(r#"{"authType": "profile", "profile": "prod"}"#)?;
/// let config = loader.load(&settings, "us-east-1").await?;
/// let cred = config.credentials().get().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    ctx: Context,
    cache: Arc<CredentialCache>,
    sts: Arc<dyn AssumeRoleApi>,
}

impl ConfigLoader {
    /// Create a loader with an empty cache and the default STS client.
    pub fn new(ctx: Context) -> Self {
        Self {
            ctx,
            cache: Arc::new(CredentialCache::new()),
            sts: Arc::new(StsClient::new()),
        }
    }

    /// Use a shared cache, typically one created at service start.
    pub fn with_cache(mut self, cache: Arc<CredentialCache>) -> Self {
        self.cache = cache;
        self
    }

    /// Replace the client used for STS `AssumeRole`.
    pub fn with_sts(mut self, sts: impl AssumeRoleApi) -> Self {
        self.sts = Arc::new(sts);
        self
    }

    /// The cache this loader reads and writes.
    pub fn cache(&self) -> &Arc<CredentialCache> {
        &self.cache
    }

    /// Return the credentials handle for `settings`, building it on a cache miss.
    ///
    /// For [`AuthType::Arn`] the role is assumed first and the STS expiration
    /// becomes the cache expiration. Other auth types are cached for five
    /// minutes. A failed AssumeRole is returned as is and nothing is cached.
    pub async fn credentials(&self, settings: &DatasourceSettings) -> Result<CredentialHandle> {
        let key = settings.cache_key();
        if let Some(handle) = self.cache.get(&key) {
            debug!(
                "credentials cache hit: auth_type={}, access_key={:?}",
                settings.auth_type,
                Redact::from(&settings.access_key)
            );
            return Ok(handle);
        }
        debug!(
            "credentials cache miss: auth_type={}, access_key={:?}",
            settings.auth_type,
            Redact::from(&settings.access_key)
        );

        let (assumed, expiration) = if settings.auth_type == AuthType::Arn {
            let bootstrap = build_bootstrap_chain(&self.ctx, settings);
            let input = AssumeRoleInput::new(&settings.assume_role_arn, &settings.region);
            debug!("assuming role {} in region {}", input.role_arn, input.region);

            let output = self.sts.assume_role(&self.ctx, &bootstrap, &input).await?;
            let expiration = output.expiration;
            (Some(output), expiration)
        } else {
            (None, now() + delta(NON_ARN_CACHE_TTL))
        };

        let chain = build_provider_chain(&self.ctx, settings, assumed.as_ref());
        debug!("built provider chain: {:?}", chain.names());

        let handle = Credentials::new(self.ctx.clone(), chain);
        self.cache.put(key, handle.clone(), Some(expiration));
        Ok(handle)
    }

    /// Resolve the credentials handle for `settings` and scope it to `region`.
    pub async fn load(&self, settings: &DatasourceSettings, region: &str) -> Result<Config> {
        let credentials = self.credentials(settings).await?;
        Ok(Config::new(credentials, region))
    }
}

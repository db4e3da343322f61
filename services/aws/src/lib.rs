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

//! AWS credential resolution for datasources.
//!
//! Given the auth settings of a datasource, [`ConfigLoader`] builds an ordered
//! chain of credential sources, optionally assumes a role through STS first,
//! and caches the resulting handle per auth configuration.
//!
//! ## Credential sources
//!
//! Tried in this order, the first one yielding a credential wins:
//!
//! 1. credentials of the assumed role, for `authType: arn`
//! 2. `AWS_ACCESS_KEY_ID`, `AWS_SECRET_ACCESS_KEY` and `AWS_SESSION_TOKEN`
//! 3. `accessKey` and `secretKey` of the settings
//! 4. the shared credentials and config files, for the profile of the settings
//! 5. web identity via `AWS_ROLE_ARN` and `AWS_WEB_IDENTITY_TOKEN_FILE`
//! 6. ECS container credentials if `AWS_CONTAINER_CREDENTIALS_RELATIVE_URI` is
//!    set, EC2 instance metadata otherwise
//!
//! ## Caching
//!
//! Handles are keyed by `"{auth_type}:{access_key}:{profile}:{assume_role_arn}"`.
//! Assumed role handles live until the STS expiration, everything else for five
//! minutes. Neither the secret key nor the region is part of the key.
//!
//! ## Example
//!
//! ```no_run
//! use dsauth_aws::{AuthType, ConfigLoader, DatasourceSettings};
//! use dsauth_core::{Context, OsEnv};
//! use dsauth_file_read_tokio::TokioFileRead;
//! use dsauth_http_send_reqwest::ReqwestHttpSend;
//!
//! #[tokio::main]
//! async fn main() -> dsauth_core::Result<()> {
//!     let ctx = Context::new()
//!         .with_file_read(TokioFileRead)
//!         .with_http_send(ReqwestHttpSend::default())
//!         .with_env(OsEnv);
//!     let loader = ConfigLoader::new(ctx);
//!
//!     let settings = DatasourceSettings {
//!         auth_type: AuthType::Arn,
//!         assume_role_arn: "arn:aws:iam::123456789012:role/reader".to_string(),
//!         region: "us-east-1".to_string(),
//!         ..Default::default()
//!     };
//!     let config = loader.load(&settings, "us-east-1").await?;
//!     let cred = config.credentials().get().await?;
//!     println!("resolved {cred:?} for {}", config.region());
//!     Ok(())
//! }
//! ```

pub mod constants;

mod credential;
pub use credential::Credential;

mod settings;
pub use settings::{AuthType, CacheKey, DatasourceSettings};

mod provide_credential;
pub use provide_credential::{
    AssumeRoleWithWebIdentityCredentialProvider, EcsCredentialProvider, EnvCredentialProvider,
    ImdsCredentialProvider, ProfileCredentialProvider, StaticCredentialProvider,
};

mod assume_role;
pub use assume_role::{AssumeRoleApi, AssumeRoleInput, AssumeRoleOutput, StsClient};

mod chain;
pub use chain::{build_bootstrap_chain, build_provider_chain, CredentialSource, ProviderChain};

mod cache;
pub use cache::{CachedEntry, CredentialCache};

mod config;
pub use config::{Config, CredentialHandle};

mod loader;
pub use loader::ConfigLoader;

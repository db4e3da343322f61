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

use crate::constants::METADATA_EXPIRY_WINDOW;
use crate::provide_credential::*;
use crate::{AssumeRoleOutput, Credential, DatasourceSettings};
use async_trait::async_trait;
use dsauth_core::{Context, ProvideCredential, ProvideCredentialChain, Result};
use std::fmt::{self, Debug, Formatter};

/// One entry of a [`ProviderChain`].
#[derive(Debug, Clone)]
pub enum CredentialSource {
    /// Fixed keys, from an AssumeRole output or the datasource settings.
    Static(StaticCredentialProvider),
    /// `AWS_ACCESS_KEY_ID` and friends.
    Env(EnvCredentialProvider),
    /// Shared credentials and config files.
    Profile(ProfileCredentialProvider),
    /// STS `AssumeRoleWithWebIdentity` with a token file.
    WebIdentity(AssumeRoleWithWebIdentityCredentialProvider),
    /// ECS container credentials endpoint.
    Ecs(EcsCredentialProvider),
    /// EC2 instance metadata service.
    Imds(ImdsCredentialProvider),
}

impl CredentialSource {
    /// Short name of the source, used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            CredentialSource::Static(_) => "static",
            CredentialSource::Env(_) => "env",
            CredentialSource::Profile(_) => "profile",
            CredentialSource::WebIdentity(_) => "web_identity",
            CredentialSource::Ecs(_) => "ecs",
            CredentialSource::Imds(_) => "imds",
        }
    }

    /// The container provider when `AWS_CONTAINER_CREDENTIALS_RELATIVE_URI` is
    /// set, the instance metadata provider otherwise.
    pub fn remote(ctx: &Context) -> Self {
        match EcsCredentialProvider::from_env(ctx) {
            Some(ecs) => CredentialSource::Ecs(ecs.with_expiry_window(METADATA_EXPIRY_WINDOW)),
            None => CredentialSource::Imds(
                ImdsCredentialProvider::new().with_expiry_window(METADATA_EXPIRY_WINDOW),
            ),
        }
    }
}

#[async_trait]
impl ProvideCredential for CredentialSource {
    type Credential = Credential;

    async fn provide_credential(&self, ctx: &Context) -> Result<Option<Self::Credential>> {
        match self {
            CredentialSource::Static(p) => p.provide_credential(ctx).await,
            CredentialSource::Env(p) => p.provide_credential(ctx).await,
            CredentialSource::Profile(p) => p.provide_credential(ctx).await,
            CredentialSource::WebIdentity(p) => p.provide_credential(ctx).await,
            CredentialSource::Ecs(p) => p.provide_credential(ctx).await,
            CredentialSource::Imds(p) => p.provide_credential(ctx).await,
        }
    }
}

/// Ordered list of credential sources, the first one yielding a credential wins.
///
/// Building a chain performs no I/O; sources are only consulted when the
/// chain is asked for a credential.
#[derive(Default)]
pub struct ProviderChain {
    sources: Vec<CredentialSource>,
    chain: ProvideCredentialChain<Credential>,
}

impl Debug for ProviderChain {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderChain")
            .field("sources", &self.sources)
            .finish()
    }
}

impl ProviderChain {
    /// Create an empty chain.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a source to the chain.
    pub fn push(mut self, source: CredentialSource) -> Self {
        self.chain = self.chain.push(source.clone());
        self.sources.push(source);
        self
    }

    /// The sources in the order they are tried.
    pub fn sources(&self) -> &[CredentialSource] {
        &self.sources
    }

    /// Names of the sources in the order they are tried.
    pub fn names(&self) -> Vec<&'static str> {
        self.sources.iter().map(|s| s.name()).collect()
    }

    /// Number of sources.
    pub fn len(&self) -> usize {
        self.sources.len()
    }

    /// Whether the chain has no sources.
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

#[async_trait]
impl ProvideCredential for ProviderChain {
    type Credential = Credential;

    async fn provide_credential(&self, ctx: &Context) -> Result<Option<Self::Credential>> {
        self.chain.provide_credential(ctx).await
    }
}

/// Build the chain credentials of a datasource are resolved with.
///
/// Sources are tried in this order:
///
/// 1. the AssumeRole output, if any
/// 2. environment variables
/// 3. `access_key` and `secret_key` of the settings
/// 4. the shared profile named by the settings
/// 5. web identity, as configured by the env at build time
/// 6. ECS container credentials or EC2 instance metadata
pub fn build_provider_chain(
    ctx: &Context,
    settings: &DatasourceSettings,
    assumed: Option<&AssumeRoleOutput>,
) -> ProviderChain {
    let assumed = match assumed {
        Some(output) => {
            StaticCredentialProvider::new(&output.access_key_id, &output.secret_access_key)
                .with_session_token(&output.session_token)
                .with_expires_in(output.expiration)
        }
        None => StaticCredentialProvider::default(),
    };

    ProviderChain::new()
        .push(CredentialSource::Static(assumed))
        .push(CredentialSource::Env(EnvCredentialProvider::new()))
        .push(CredentialSource::Static(StaticCredentialProvider::new(
            &settings.access_key,
            &settings.secret_key,
        )))
        .push(CredentialSource::Profile(
            ProfileCredentialProvider::new().with_profile(&settings.profile),
        ))
        .push(CredentialSource::WebIdentity(
            AssumeRoleWithWebIdentityCredentialProvider::from_env(ctx),
        ))
        .push(CredentialSource::remote(ctx))
}

/// Build the chain STS AssumeRole calls are signed with.
///
/// Same as [`build_provider_chain`] without any static keys: the keys of the
/// settings never authenticate the AssumeRole call.
pub fn build_bootstrap_chain(ctx: &Context, settings: &DatasourceSettings) -> ProviderChain {
    ProviderChain::new()
        .push(CredentialSource::Env(EnvCredentialProvider::new()))
        .push(CredentialSource::Profile(
            ProfileCredentialProvider::new().with_profile(&settings.profile),
        ))
        .push(CredentialSource::WebIdentity(
            AssumeRoleWithWebIdentityCredentialProvider::from_env(ctx),
        ))
        .push(CredentialSource::remote(ctx))
}

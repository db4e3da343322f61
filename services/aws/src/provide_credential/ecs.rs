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

use super::utils::apply_expiry_window;
use crate::constants::*;
use crate::Credential;
use async_trait::async_trait;
use bytes::Bytes;
use dsauth_core::time::parse_rfc3339;
use dsauth_core::{Context, Error, ProvideCredential, Result};
use http::Method;
use serde::Deserialize;
use std::time::Duration;

/// EcsCredentialProvider loads credentials from the ECS container credentials
/// endpoint at `http://169.254.170.2{AWS_CONTAINER_CREDENTIALS_RELATIVE_URI}`.
///
/// The returned credential expires `expiry_window` before the time reported
/// by the endpoint, so it gets refreshed ahead of the real expiration.
///
/// References:
/// - [IAM roles for tasks](https://docs.aws.amazon.com/AmazonECS/latest/developerguide/task-iam-roles.html)
#[derive(Debug, Clone)]
pub struct EcsCredentialProvider {
    endpoint: String,
    relative_uri: String,
    expiry_window: Duration,
}

impl EcsCredentialProvider {
    /// Create a new `EcsCredentialProvider` for the given relative uri.
    pub fn new(relative_uri: impl Into<String>) -> Self {
        Self {
            endpoint: ECS_CREDENTIALS_ENDPOINT.to_string(),
            relative_uri: relative_uri.into(),
            expiry_window: Duration::ZERO,
        }
    }

    /// Build from `AWS_CONTAINER_CREDENTIALS_RELATIVE_URI`, `None` when it's unset or empty.
    pub fn from_env(ctx: &Context) -> Option<Self> {
        ctx.env_var(AWS_CONTAINER_CREDENTIALS_RELATIVE_URI)
            .filter(|v| !v.is_empty())
            .map(Self::new)
    }

    /// Override the metadata host, e.g. `http://127.0.0.1:8080`.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Set the window subtracted from the reported expiration.
    pub fn with_expiry_window(mut self, window: Duration) -> Self {
        self.expiry_window = window;
        self
    }

    /// The full url credentials are fetched from.
    pub fn endpoint(&self) -> String {
        format!("{}{}", self.endpoint, self.relative_uri)
    }

    /// The window subtracted from the reported expiration.
    pub fn expiry_window(&self) -> Duration {
        self.expiry_window
    }
}

#[async_trait]
impl ProvideCredential for EcsCredentialProvider {
    type Credential = Credential;

    async fn provide_credential(&self, ctx: &Context) -> Result<Option<Self::Credential>> {
        if self.relative_uri.is_empty() {
            return Ok(None);
        }

        let url = self.endpoint();
        let req = http::Request::builder()
            .uri(&url)
            .method(Method::GET)
            .body(Bytes::new())
            .map_err(|e| {
                Error::unexpected("failed to build ECS metadata request")
                    .with_source(e)
                    .with_context(format!("url: {url}"))
            })?;

        let resp = ctx.http_send_as_string(req).await.map_err(|e| {
            Error::unexpected("failed to connect to ECS credentials endpoint")
                .with_source(e)
                .with_context(format!("url: {url}"))
        })?;

        if resp.status() != http::StatusCode::OK {
            return Err(Error::unexpected(format!(
                "request to ECS task metadata endpoint failed: status={}, body={}",
                resp.status(),
                resp.body()
            ))
            .with_context(format!("url: {url}")));
        }

        let content = resp.into_body();
        let cred: EcsTaskCredentials = serde_json::from_str(&content).map_err(|e| {
            Error::unexpected("failed to parse ECS task credentials")
                .with_source(e)
                .with_context(format!("response_length: {}", content.len()))
        })?;

        let expires_in = parse_rfc3339(&cred.expiration)
            .map_err(|e| Error::unexpected("failed to parse expiration time").with_source(e))?;

        Ok(Some(Credential {
            access_key_id: cred.access_key_id,
            secret_access_key: cred.secret_access_key,
            session_token: Some(cred.token),
            expires_in: Some(apply_expiry_window(expires_in, self.expiry_window)),
        }))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct EcsTaskCredentials {
    access_key_id: String,
    secret_access_key: String,
    token: String,
    expiration: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use dsauth_core::{HttpSend, StaticEnv};
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Clone, Default)]
    struct MockEcs {
        status: u16,
        uris: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl HttpSend for MockEcs {
        async fn http_send(&self, req: http::Request<Bytes>) -> Result<http::Response<Bytes>> {
            self.uris.lock().unwrap().push(req.uri().to_string());
            let body = r#"{
  "AccessKeyId": "ASIAEXAMPLE",
  "Expiration": "2022-05-25T11:45:17Z",
  "RoleArn": "arn:aws:iam::123:role/task",
  "SecretAccessKey": "secret",
  "Token": "token"
}"#;
            Ok(http::Response::builder()
                .status(self.status)
                .body(Bytes::from_static(body.as_bytes()))?)
        }
    }

    fn context(envs: &[(&str, &str)]) -> Context {
        Context::new().with_env(StaticEnv {
            home_dir: None,
            envs: envs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<HashMap<_, _>>(),
        })
    }

    #[test]
    fn test_from_env() {
        assert!(EcsCredentialProvider::from_env(&context(&[])).is_none());
        assert!(EcsCredentialProvider::from_env(&context(&[(
            AWS_CONTAINER_CREDENTIALS_RELATIVE_URI,
            ""
        )]))
        .is_none());

        let provider = EcsCredentialProvider::from_env(&context(&[(
            AWS_CONTAINER_CREDENTIALS_RELATIVE_URI,
            "/v2/credentials/abc",
        )]))
        .expect("provider must be built");
        assert_eq!("http://169.254.170.2/v2/credentials/abc", provider.endpoint());
    }

    #[tokio::test]
    async fn test_ecs_credential_provider() -> anyhow::Result<()> {
        let _ = env_logger::builder().is_test(true).try_init();

        let http = MockEcs {
            status: 200,
            ..Default::default()
        };
        let ctx = Context::new().with_http_send(http.clone());

        let provider = EcsCredentialProvider::new("/v2/credentials/abc")
            .with_expiry_window(METADATA_EXPIRY_WINDOW);
        let cred = provider
            .provide_credential(&ctx)
            .await?
            .expect("credential must be loaded");

        assert_eq!("ASIAEXAMPLE", cred.access_key_id);
        assert_eq!("secret", cred.secret_access_key);
        assert_eq!(Some("token".to_string()), cred.session_token);
        assert_eq!(
            Some(parse_rfc3339("2022-05-25T11:40:17Z")?),
            cred.expires_in
        );
        assert_eq!(
            vec!["http://169.254.170.2/v2/credentials/abc".to_string()],
            http.uris.lock().unwrap().clone()
        );

        Ok(())
    }

    #[tokio::test]
    async fn test_ecs_credential_provider_error_status() {
        let ctx = Context::new().with_http_send(MockEcs {
            status: 500,
            ..Default::default()
        });

        let err = EcsCredentialProvider::new("/v2/credentials/abc")
            .provide_credential(&ctx)
            .await
            .unwrap_err();
        assert_eq!(dsauth_core::ErrorKind::Unexpected, err.kind());
    }
}

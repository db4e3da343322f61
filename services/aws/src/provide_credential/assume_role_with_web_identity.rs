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

use super::utils::{parse_sts_error, sts_endpoint, use_regional_sts_endpoint};
use crate::constants::*;
use crate::Credential;
use async_trait::async_trait;
use bytes::Bytes;
use dsauth_core::time::{now, parse_rfc3339};
use dsauth_core::utils::Redact;
use dsauth_core::{Context, Error, ProvideCredential, Result};
use quick_xml::de;
use serde::Deserialize;
use std::fmt::{Debug, Formatter};

/// AssumeRoleWithWebIdentityCredentialProvider exchanges a web identity token
/// for temporary credentials through STS `AssumeRoleWithWebIdentity`.
///
/// The call is not signed; the token file is the proof of identity.
///
/// References:
/// - [AssumeRoleWithWebIdentity](https://docs.aws.amazon.com/STS/latest/APIReference/API_AssumeRoleWithWebIdentity.html)
#[derive(Debug, Default, Clone)]
pub struct AssumeRoleWithWebIdentityCredentialProvider {
    role_arn: Option<String>,
    role_session_name: Option<String>,
    web_identity_token_file: Option<String>,

    region: Option<String>,
    use_regional_sts_endpoint: bool,
    endpoint: Option<String>,
}

impl AssumeRoleWithWebIdentityCredentialProvider {
    /// Create an empty provider, it yields nothing until configured.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot the web identity configuration from the context env.
    ///
    /// Reads `AWS_ROLE_ARN`, `AWS_WEB_IDENTITY_TOKEN_FILE`,
    /// `AWS_ROLE_SESSION_NAME`, `AWS_REGION` and `AWS_STS_REGIONAL_ENDPOINTS`.
    /// Later changes to the env don't affect the returned provider.
    pub fn from_env(ctx: &Context) -> Self {
        let non_empty = |key: &str| ctx.env_var(key).filter(|v| !v.is_empty());

        Self {
            role_arn: non_empty(AWS_ROLE_ARN),
            role_session_name: non_empty(AWS_ROLE_SESSION_NAME),
            web_identity_token_file: non_empty(AWS_WEB_IDENTITY_TOKEN_FILE),
            region: non_empty(AWS_REGION),
            use_regional_sts_endpoint: use_regional_sts_endpoint(ctx),
            endpoint: None,
        }
    }

    /// Set the role ARN.
    pub fn with_role_arn(mut self, role_arn: impl Into<String>) -> Self {
        self.role_arn = Some(role_arn.into());
        self
    }

    /// Set the web identity token file path.
    pub fn with_web_identity_token_file(mut self, token_file: impl Into<String>) -> Self {
        self.web_identity_token_file = Some(token_file.into());
        self
    }

    /// Set the role session name.
    pub fn with_role_session_name(mut self, name: impl Into<String>) -> Self {
        self.role_session_name = Some(name.into());
        self
    }

    /// Set the region.
    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    /// Override the STS endpoint, e.g. `http://127.0.0.1:9000`.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// The role this provider assumes, if configured.
    pub fn role_arn(&self) -> Option<&str> {
        self.role_arn.as_deref()
    }

    /// The token file this provider reads, if configured.
    pub fn web_identity_token_file(&self) -> Option<&str> {
        self.web_identity_token_file.as_deref()
    }

    /// The session name this provider sends, if configured.
    pub fn role_session_name(&self) -> Option<&str> {
        self.role_session_name.as_deref()
    }

    fn endpoint(&self) -> Result<String> {
        if let Some(endpoint) = &self.endpoint {
            return Ok(endpoint.clone());
        }

        let host = sts_endpoint(self.region.as_deref(), self.use_regional_sts_endpoint)?;
        Ok(format!("https://{host}"))
    }
}

#[async_trait]
impl ProvideCredential for AssumeRoleWithWebIdentityCredentialProvider {
    type Credential = Credential;

    async fn provide_credential(&self, ctx: &Context) -> Result<Option<Self::Credential>> {
        let (Some(role_arn), Some(token_file)) = (&self.role_arn, &self.web_identity_token_file)
        else {
            return Ok(None);
        };

        let token = ctx.file_read_as_string(token_file).await.map_err(|e| {
            Error::config_invalid("failed to read web identity token file")
                .with_source(e)
                .with_context(format!("file: {token_file}"))
        })?;

        let endpoint = self
            .endpoint()
            .map_err(|e| e.with_context(format!("role_arn: {role_arn}")))?;

        // STS requires a session name, fall back to a timestamp like the SDKs do.
        let session_name = self
            .role_session_name
            .clone()
            .unwrap_or_else(|| now().timestamp_millis().to_string());

        let query = form_urlencoded::Serializer::new(String::new())
            .append_pair("Action", "AssumeRoleWithWebIdentity")
            .append_pair("RoleArn", role_arn)
            .append_pair("WebIdentityToken", token.trim())
            .append_pair("Version", STS_API_VERSION)
            .append_pair("RoleSessionName", &session_name)
            .finish();
        let url = format!("{endpoint}/?{query}");

        let req = http::Request::builder()
            .method(http::Method::GET)
            .uri(&url)
            .body(Bytes::new())
            .map_err(|e| {
                Error::unexpected("failed to build STS AssumeRoleWithWebIdentity request")
                    .with_source(e)
                    .with_context(format!("role_arn: {role_arn}"))
                    .with_context(format!("endpoint: {endpoint}"))
            })?;

        let resp = ctx.http_send_as_string(req).await.map_err(|e| {
            Error::unexpected("failed to send AssumeRoleWithWebIdentity request to STS")
                .with_source(e)
                .with_context(format!("role_arn: {role_arn}"))
                .with_context(format!("endpoint: {endpoint}"))
        })?;

        let status = resp.status();
        let request_id = resp
            .headers()
            .get("x-amzn-requestid")
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());

        if status != http::StatusCode::OK {
            return Err(parse_sts_error(
                "AssumeRoleWithWebIdentity",
                status,
                resp.body(),
                request_id.as_deref(),
            )
            .with_context(format!("role_arn: {role_arn}"))
            .with_context(format!("session_name: {session_name}"))
            .with_context(format!("token_file: {token_file}")));
        }

        let body = resp.into_body();
        let resp: AssumeRoleWithWebIdentityResponse = de::from_str(&body).map_err(|e| {
            Error::unexpected("failed to parse STS AssumeRoleWithWebIdentity response")
                .with_source(e)
                .with_context(format!("response_length: {}", body.len()))
                .with_context(format!("role_arn: {role_arn}"))
        })?;
        let resp_cred = resp.result.credentials;

        let cred = Credential {
            access_key_id: resp_cred.access_key_id,
            secret_access_key: resp_cred.secret_access_key,
            session_token: Some(resp_cred.session_token),
            expires_in: Some(parse_rfc3339(&resp_cred.expiration).map_err(|e| {
                Error::unexpected("failed to parse web identity credential expiration")
                    .with_source(e)
                    .with_context(format!("role_arn: {role_arn}"))
            })?),
        };

        Ok(Some(cred))
    }
}

#[derive(Default, Debug, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
struct AssumeRoleWithWebIdentityResponse {
    #[serde(rename = "AssumeRoleWithWebIdentityResult")]
    result: AssumeRoleWithWebIdentityResult,
}

#[derive(Default, Debug, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
struct AssumeRoleWithWebIdentityResult {
    credentials: AssumeRoleWithWebIdentityCredentials,
}

#[derive(Default, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
struct AssumeRoleWithWebIdentityCredentials {
    access_key_id: String,
    secret_access_key: String,
    session_token: String,
    expiration: String,
}

impl Debug for AssumeRoleWithWebIdentityCredentials {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssumeRoleWithWebIdentityCredentials")
            .field("access_key_id", &Redact::from(&self.access_key_id))
            .field("secret_access_key", &Redact::from(&self.secret_access_key))
            .field("session_token", &Redact::from(&self.session_token))
            .field("expiration", &self.expiration)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dsauth_core::{FileRead, HttpSend, StaticEnv};
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    const RESPONSE: &str = r#"<AssumeRoleWithWebIdentityResponse xmlns="https://sts.amazonaws.com/doc/2011-06-15/">
  <AssumeRoleWithWebIdentityResult>
    <Audience>test_audience</Audience>
    <AssumedRoleUser>
      <AssumedRoleId>role_id:dsauth</AssumedRoleId>
      <Arn>arn:aws:sts::123:assumed-role/dsauth/dsauth</Arn>
    </AssumedRoleUser>
    <Provider>arn:aws:iam::123:oidc-provider/example.com/</Provider>
    <Credentials>
      <AccessKeyId>access_key_id</AccessKeyId>
      <SecretAccessKey>secret_access_key</SecretAccessKey>
      <SessionToken>session_token</SessionToken>
      <Expiration>2022-05-25T11:45:17Z</Expiration>
    </Credentials>
    <SubjectFromWebIdentityToken>subject</SubjectFromWebIdentityToken>
  </AssumeRoleWithWebIdentityResult>
  <ResponseMetadata>
    <RequestId>b1663ad1-23ab-41e9-b465-1af34b0c8f1a</RequestId>
  </ResponseMetadata>
</AssumeRoleWithWebIdentityResponse>"#;

    #[derive(Debug)]
    struct TokenFile;

    #[async_trait]
    impl FileRead for TokenFile {
        async fn file_read(&self, path: &str) -> Result<Vec<u8>> {
            assert_eq!("/var/run/secrets/token", path);
            Ok(b"web-identity-token\n".to_vec())
        }
    }

    #[derive(Debug, Clone, Default)]
    struct MockSts {
        uris: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl HttpSend for MockSts {
        async fn http_send(&self, req: http::Request<Bytes>) -> Result<http::Response<Bytes>> {
            self.uris.lock().unwrap().push(req.uri().to_string());
            Ok(http::Response::new(Bytes::from_static(RESPONSE.as_bytes())))
        }
    }

    #[test]
    fn test_parse_assume_role_with_web_identity_response() -> Result<()> {
        let resp: AssumeRoleWithWebIdentityResponse =
            de::from_str(RESPONSE).expect("xml deserialize must success");

        assert_eq!(&resp.result.credentials.access_key_id, "access_key_id");
        assert_eq!(
            &resp.result.credentials.secret_access_key,
            "secret_access_key"
        );
        assert_eq!(&resp.result.credentials.session_token, "session_token");
        assert_eq!(&resp.result.credentials.expiration, "2022-05-25T11:45:17Z");

        Ok(())
    }

    #[test]
    fn test_from_env_snapshot() {
        let ctx = Context::new().with_env(StaticEnv {
            home_dir: None,
            envs: HashMap::from([
                (
                    AWS_ROLE_ARN.to_string(),
                    "arn:aws:iam::123:role/web".to_string(),
                ),
                (
                    AWS_WEB_IDENTITY_TOKEN_FILE.to_string(),
                    "/var/run/secrets/token".to_string(),
                ),
                (AWS_ROLE_SESSION_NAME.to_string(), "".to_string()),
            ]),
        });

        let provider = AssumeRoleWithWebIdentityCredentialProvider::from_env(&ctx);
        assert_eq!(Some("arn:aws:iam::123:role/web"), provider.role_arn());
        assert_eq!(
            Some("/var/run/secrets/token"),
            provider.web_identity_token_file()
        );
        assert_eq!(None, provider.role_session_name());
    }

    #[tokio::test]
    async fn test_not_configured() -> anyhow::Result<()> {
        let provider = AssumeRoleWithWebIdentityCredentialProvider::new()
            .with_role_arn("arn:aws:iam::123:role/web");
        assert!(provider.provide_credential(&Context::new()).await?.is_none());

        Ok(())
    }

    #[tokio::test]
    async fn test_assume_role_with_web_identity() -> anyhow::Result<()> {
        let _ = env_logger::builder().is_test(true).try_init();

        let sts = MockSts::default();
        let ctx = Context::new()
            .with_file_read(TokenFile)
            .with_http_send(sts.clone());

        let provider = AssumeRoleWithWebIdentityCredentialProvider::new()
            .with_role_arn("arn:aws:iam::123:role/web")
            .with_web_identity_token_file("/var/run/secrets/token")
            .with_role_session_name("dsauth")
            .with_region("eu-west-1");

        let cred = provider
            .provide_credential(&ctx)
            .await?
            .expect("credential must be loaded");
        assert_eq!("access_key_id", cred.access_key_id);
        assert_eq!(Some("session_token".to_string()), cred.session_token);
        assert_eq!(
            Some(parse_rfc3339("2022-05-25T11:45:17Z")?),
            cred.expires_in
        );

        let uris = sts.uris.lock().unwrap().clone();
        assert_eq!(
            vec!["https://sts.amazonaws.com/?Action=AssumeRoleWithWebIdentity&RoleArn=arn%3Aaws%3Aiam%3A%3A123%3Arole%2Fweb&WebIdentityToken=web-identity-token&Version=2011-06-15&RoleSessionName=dsauth".to_string()],
            uris
        );

        Ok(())
    }
}

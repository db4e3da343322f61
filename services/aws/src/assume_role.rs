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

use crate::constants::*;
use crate::provide_credential::utils::{parse_sts_error, sts_endpoint};
use crate::Credential;
use async_trait::async_trait;
use aws_sigv4::http_request::{sign, SignableBody, SignableRequest, SigningSettings};
use aws_sigv4::sign::v4;
use bytes::Bytes;
use dsauth_core::time::{parse_rfc3339, DateTime};
use dsauth_core::utils::Redact;
use dsauth_core::{Context, Error, ProvideCredential, Result};
use http::header::CONTENT_TYPE;
use log::debug;
use quick_xml::de;
use serde::Deserialize;
use std::fmt::{Debug, Formatter};
use std::time::SystemTime;

/// Parameters of an STS `AssumeRole` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssumeRoleInput {
    /// Role to assume.
    pub role_arn: String,
    /// Identifier of the assumed role session.
    pub role_session_name: String,
    /// Requested lifetime of the session.
    pub duration_seconds: u32,
    /// Region the STS client talks to.
    pub region: String,
}

impl AssumeRoleInput {
    /// Create an input using the `GrafanaSession` session name and a 900s duration.
    pub fn new(role_arn: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            role_arn: role_arn.into(),
            role_session_name: ROLE_SESSION_NAME.to_string(),
            duration_seconds: ASSUME_ROLE_DURATION_SECONDS,
            region: region.into(),
        }
    }
}

/// Temporary credentials returned by STS `AssumeRole`.
#[derive(Clone, PartialEq, Eq)]
pub struct AssumeRoleOutput {
    /// Access key id of the session.
    pub access_key_id: String,
    /// Secret access key of the session.
    pub secret_access_key: String,
    /// Session token, required alongside the keys.
    pub session_token: String,
    /// Instant the session stops being accepted.
    pub expiration: DateTime,
}

impl Debug for AssumeRoleOutput {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssumeRoleOutput")
            .field("access_key_id", &Redact::from(&self.access_key_id))
            .field("secret_access_key", &Redact::from(&self.secret_access_key))
            .field("session_token", &Redact::from(&self.session_token))
            .field("expiration", &self.expiration)
            .finish()
    }
}

/// AssumeRoleApi exchanges source credentials for a role session.
///
/// `source` resolves the credentials the call is made with.
#[async_trait]
pub trait AssumeRoleApi: Debug + Send + Sync + 'static {
    /// Call STS `AssumeRole`.
    async fn assume_role(
        &self,
        ctx: &Context,
        source: &dyn ProvideCredential<Credential = Credential>,
        input: &AssumeRoleInput,
    ) -> Result<AssumeRoleOutput>;
}

/// StsClient calls STS through the context's `HttpSend`.
///
/// Requests go to the regional endpoint of `input.region` and are signed
/// with SigV4.
///
/// References:
/// - [AssumeRole](https://docs.aws.amazon.com/STS/latest/APIReference/API_AssumeRole.html)
#[derive(Debug, Clone, Default)]
pub struct StsClient {
    endpoint: Option<String>,
}

impl StsClient {
    /// Create a new StsClient.
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the STS endpoint, e.g. `http://127.0.0.1:9000`.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    fn endpoint(&self, region: &str) -> Result<String> {
        if let Some(endpoint) = &self.endpoint {
            return Ok(endpoint.clone());
        }

        let host = sts_endpoint(Some(region), true)?;
        Ok(format!("https://{host}"))
    }

    fn build_request(
        &self,
        endpoint: &str,
        input: &AssumeRoleInput,
    ) -> Result<http::Request<Bytes>> {
        let body = form_urlencoded::Serializer::new(String::new())
            .append_pair("Action", "AssumeRole")
            .append_pair("Version", STS_API_VERSION)
            .append_pair("RoleArn", &input.role_arn)
            .append_pair("RoleSessionName", &input.role_session_name)
            .append_pair("DurationSeconds", &input.duration_seconds.to_string())
            .finish();

        Ok(http::Request::builder()
            .method(http::Method::POST)
            .uri(format!("{endpoint}/"))
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Bytes::from(body))?)
    }
}

#[async_trait]
impl AssumeRoleApi for StsClient {
    async fn assume_role(
        &self,
        ctx: &Context,
        source: &dyn ProvideCredential<Credential = Credential>,
        input: &AssumeRoleInput,
    ) -> Result<AssumeRoleOutput> {
        let region = input.region.trim();
        if region.is_empty() {
            return Err(Error::session_init("STS client requires a region")
                .with_context(format!("role_arn: {}", input.role_arn)));
        }

        let endpoint = self.endpoint(region).map_err(|e| {
            Error::session_init("failed to resolve STS endpoint")
                .with_source(e)
                .with_context(format!("region: {region}"))
        })?;
        let mut req = self.build_request(&endpoint, input).map_err(|e| {
            Error::session_init("failed to build STS AssumeRole request")
                .with_source(e)
                .with_context(format!("endpoint: {endpoint}"))
        })?;

        let cred = source
            .provide_credential(ctx)
            .await
            .map_err(|e| {
                Error::assume_role("failed to load credentials for STS AssumeRole")
                    .with_source(e)
                    .with_context(format!("role_arn: {}", input.role_arn))
            })?
            .ok_or_else(|| {
                Error::assume_role("no credentials available to call STS AssumeRole")
                    .with_context(format!("role_arn: {}", input.role_arn))
            })?;

        sign_request(&mut req, &cred, region).map_err(|e| {
            Error::assume_role("failed to sign STS AssumeRole request")
                .with_source(e)
                .with_context(format!("role_arn: {}", input.role_arn))
        })?;

        debug!(
            "assuming role {} via {endpoint} in region {region}",
            input.role_arn
        );
        let resp = ctx.http_send_as_string(req).await.map_err(|e| {
            Error::assume_role("failed to send AssumeRole request to STS")
                .with_source(e)
                .with_context(format!("role_arn: {}", input.role_arn))
                .with_context(format!("endpoint: {endpoint}"))
        })?;

        let status = resp.status();
        if status != http::StatusCode::OK {
            let request_id = resp
                .headers()
                .get("x-amzn-requestid")
                .and_then(|v| v.to_str().ok())
                .map(|s| s.to_string());
            let cause =
                parse_sts_error("AssumeRole", status, resp.body(), request_id.as_deref());
            return Err(Error::assume_role(format!("STS AssumeRole was rejected: {cause}"))
                .with_source(cause)
                .with_context(format!("role_arn: {}", input.role_arn))
                .with_context(format!("session_name: {}", input.role_session_name)));
        }

        let body = resp.into_body();
        let resp: AssumeRoleResponse = de::from_str(&body).map_err(|e| {
            Error::assume_role("failed to parse STS AssumeRole response")
                .with_source(e)
                .with_context(format!("response_length: {}", body.len()))
                .with_context(format!("role_arn: {}", input.role_arn))
        })?;
        let resp_cred = resp.result.credentials;

        let expiration = parse_rfc3339(&resp_cred.expiration).map_err(|e| {
            Error::assume_role("failed to parse AssumeRole credential expiration")
                .with_source(e)
                .with_context(format!("role_arn: {}", input.role_arn))
        })?;

        Ok(AssumeRoleOutput {
            access_key_id: resp_cred.access_key_id,
            secret_access_key: resp_cred.secret_access_key,
            session_token: resp_cred.session_token,
            expiration,
        })
    }
}

fn sign_request(req: &mut http::Request<Bytes>, cred: &Credential, region: &str) -> Result<()> {
    let identity = aws_credential_types::Credentials::new(
        cred.access_key_id.clone(),
        cred.secret_access_key.clone(),
        cred.session_token.clone(),
        None,
        "dsauth",
    )
    .into();
    let params = v4::SigningParams::builder()
        .identity(&identity)
        .region(region)
        .name("sts")
        .time(SystemTime::now())
        .settings(SigningSettings::default())
        .build()
        .map_err(|e| Error::unexpected("failed to build signing params").with_source(e))?;

    let headers = req
        .headers()
        .iter()
        .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.as_str(), v)));
    let signable = SignableRequest::new(
        req.method().as_str(),
        req.uri().to_string(),
        headers,
        SignableBody::Bytes(req.body()),
    )
    .map_err(|e| Error::unexpected("request can't be signed").with_source(e))?;

    let (instructions, _) = sign(signable, &params.into())
        .map_err(|e| Error::unexpected("failed to sign request").with_source(e))?
        .into_parts();
    instructions.apply_to_request_http1x(req);

    Ok(())
}

#[derive(Default, Debug, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
struct AssumeRoleResponse {
    #[serde(rename = "AssumeRoleResult")]
    result: AssumeRoleResult,
}

#[derive(Default, Debug, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
struct AssumeRoleResult {
    credentials: AssumeRoleCredentials,
}

#[derive(Default, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
struct AssumeRoleCredentials {
    access_key_id: String,
    secret_access_key: String,
    session_token: String,
    expiration: String,
}

impl Debug for AssumeRoleCredentials {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssumeRoleCredentials")
            .field("access_key_id", &Redact::from(&self.access_key_id))
            .field("secret_access_key", &Redact::from(&self.secret_access_key))
            .field("session_token", &Redact::from(&self.session_token))
            .field("expiration", &self.expiration)
            .finish()
    }
}

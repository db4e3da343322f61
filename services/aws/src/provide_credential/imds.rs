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
use dsauth_core::time::{delta, now, parse_rfc3339, DateTime};
use dsauth_core::{Context, Error, ProvideCredential, Result};
use http::header::CONTENT_LENGTH;
use http::Method;
use serde::Deserialize;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Lifetime requested for IMDSv2 session tokens, 21600s (6h) is recommended by AWS.
const IMDS_TOKEN_TTL: Duration = Duration::from_secs(21600);
/// Refresh the session token this long before it expires.
const IMDS_TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(600);

/// ImdsCredentialProvider loads credentials of the instance profile attached
/// to an EC2 instance, using the IMDSv2 session token flow.
///
/// The returned credential expires `expiry_window` before the time reported
/// by the metadata service.
///
/// Setting `AWS_EC2_METADATA_DISABLED=true` turns this provider off and
/// `AWS_EC2_METADATA_SERVICE_ENDPOINT` overrides the endpoint.
#[derive(Debug, Clone)]
pub struct ImdsCredentialProvider {
    endpoint: Option<String>,
    expiry_window: Duration,
    token: Arc<Mutex<(String, DateTime)>>,
}

impl Default for ImdsCredentialProvider {
    fn default() -> Self {
        Self {
            endpoint: None,
            expiry_window: Duration::ZERO,
            token: Arc::new(Mutex::new((String::new(), DateTime::default()))),
        }
    }
}

impl ImdsCredentialProvider {
    /// Create a new `ImdsCredentialProvider` instance.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the endpoint for the metadata service.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Set the window subtracted from the reported expiration.
    pub fn with_expiry_window(mut self, window: Duration) -> Self {
        self.expiry_window = window;
        self
    }

    /// The window subtracted from the reported expiration.
    pub fn expiry_window(&self) -> Duration {
        self.expiry_window
    }

    fn get_endpoint(&self, ctx: &Context) -> String {
        // First check configured endpoint, then environment, then default
        self.endpoint.clone().unwrap_or_else(|| {
            ctx.env_var(AWS_EC2_METADATA_SERVICE_ENDPOINT)
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| IMDS_ENDPOINT.to_string())
        })
    }

    async fn load_ec2_metadata_token(&self, ctx: &Context, endpoint: &str) -> Result<String> {
        {
            let (token, expires_in) = self.token.lock().expect("lock poisoned").clone();
            if expires_in > now() {
                return Ok(token);
            }
        }

        let url = format!("{endpoint}/latest/api/token");
        let req = http::Request::builder()
            .uri(&url)
            .method(Method::PUT)
            .header(CONTENT_LENGTH, "0")
            .header(
                "x-aws-ec2-metadata-token-ttl-seconds",
                IMDS_TOKEN_TTL.as_secs().to_string(),
            )
            .body(Bytes::new())
            .map_err(|e| {
                Error::unexpected("failed to build IMDS token request")
                    .with_source(e)
                    .with_context(format!("url: {url}"))
            })?;

        let resp = ctx.http_send_as_string(req).await.map_err(|e| {
            Error::unexpected("failed to connect to IMDS")
                .with_source(e)
                .with_context(format!("endpoint: {endpoint}"))
                .with_context("hint: check if running on EC2 instance")
        })?;

        if resp.status() != http::StatusCode::OK {
            return Err(parse_imds_error(
                "fetch_imds_token",
                resp.status(),
                resp.body(),
            ));
        }
        let ec2_token = resp.into_body();
        let expires_in = now() + delta(IMDS_TOKEN_TTL) - delta(IMDS_TOKEN_REFRESH_MARGIN);

        {
            *self.token.lock().expect("lock poisoned") = (ec2_token.clone(), expires_in);
        }

        Ok(ec2_token)
    }

    async fn get_metadata(
        &self,
        ctx: &Context,
        url: &str,
        token: &str,
        operation: &str,
    ) -> Result<String> {
        let req = http::Request::builder()
            .uri(url)
            .method(Method::GET)
            .header("x-aws-ec2-metadata-token", token)
            .body(Bytes::new())
            .map_err(|e| {
                Error::unexpected("failed to build IMDS request")
                    .with_source(e)
                    .with_context(format!("url: {url}"))
            })?;

        let resp = ctx.http_send_as_string(req).await.map_err(|e| {
            Error::unexpected("failed to send IMDS request")
                .with_source(e)
                .with_context(format!("operation: {operation}"))
        })?;

        if resp.status() != http::StatusCode::OK {
            return Err(parse_imds_error(operation, resp.status(), resp.body()));
        }

        Ok(resp.into_body())
    }
}

#[async_trait]
impl ProvideCredential for ImdsCredentialProvider {
    type Credential = Credential;

    async fn provide_credential(&self, ctx: &Context) -> Result<Option<Self::Credential>> {
        let disabled = ctx
            .env_var(AWS_EC2_METADATA_DISABLED)
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);
        if disabled {
            return Ok(None);
        }

        let endpoint = self.get_endpoint(ctx);
        let token = self.load_ec2_metadata_token(ctx, &endpoint).await?;

        // List all credentials that node has.
        let url = format!("{endpoint}/latest/meta-data/iam/security-credentials/");
        let profile_name = self
            .get_metadata(ctx, &url, &token, "list_instance_profiles")
            .await?;
        let profile_name = profile_name.lines().next().unwrap_or_default().trim();
        if profile_name.is_empty() {
            return Err(
                Error::config_invalid("no IAM role attached to EC2 instance")
                    .with_context("hint: attach an IAM role to your EC2 instance"),
            );
        }

        // Get the credentials via role_name.
        let url = format!("{endpoint}/latest/meta-data/iam/security-credentials/{profile_name}");
        let content = self
            .get_metadata(ctx, &url, &token, "fetch_credentials")
            .await
            .map_err(|e| e.with_context(format!("profile: {profile_name}")))?;

        let resp: Ec2MetadataIamSecurityCredentials =
            serde_json::from_str(&content).map_err(|e| {
                Error::unexpected("failed to parse IMDS credentials response")
                    .with_source(e)
                    .with_context(format!("response_length: {}", content.len()))
                    .with_context(format!("profile: {profile_name}"))
            })?;

        match resp.code.as_str() {
            "Success" => {}
            "AssumeRoleUnauthorizedAccess" => {
                return Err(Error::credential_denied(format!(
                    "EC2 instance not authorized to assume role: {}",
                    resp.message
                ))
                .with_context(format!("error_code: {}", resp.code))
                .with_context(format!("profile: {profile_name}")));
            }
            code if code.contains("Expired") => {
                return Err(Error::credential_invalid(format!(
                    "IMDS credentials expired: {}",
                    resp.message
                ))
                .with_context(format!("error_code: {}", resp.code))
                .with_context(format!("profile: {profile_name}")));
            }
            _ => {
                return Err(Error::unexpected(format!(
                    "IMDS returned error: [{}] {}",
                    resp.code, resp.message
                ))
                .with_context(format!("profile: {profile_name}")));
            }
        }

        let expires_in = parse_rfc3339(&resp.expiration).map_err(|e| {
            Error::unexpected("failed to parse IMDS credential expiration time")
                .with_source(e)
                .with_context(format!("profile: {profile_name}"))
        })?;

        Ok(Some(Credential {
            access_key_id: resp.access_key_id,
            secret_access_key: resp.secret_access_key,
            session_token: Some(resp.token),
            expires_in: Some(apply_expiry_window(expires_in, self.expiry_window)),
        }))
    }
}

fn parse_imds_error(operation: &str, status: http::StatusCode, body: &str) -> Error {
    let err = match status {
        http::StatusCode::UNAUTHORIZED | http::StatusCode::FORBIDDEN => {
            Error::credential_denied(format!("IMDS {operation} was rejected"))
        }
        http::StatusCode::NOT_FOUND => {
            Error::config_invalid(format!("IMDS {operation} found nothing"))
        }
        _ => Error::unexpected(format!("IMDS {operation} failed")),
    };

    err.with_context(format!("status: {status}"))
        .with_context(format!("body: {body}"))
}

#[derive(Default, Debug, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
struct Ec2MetadataIamSecurityCredentials {
    access_key_id: String,
    secret_access_key: String,
    token: String,
    expiration: String,

    code: String,
    message: String,
}

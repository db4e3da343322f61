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
use dsauth_core::time::DateTime;
use dsauth_core::{Context, Error, Result};
use quick_xml::de;
use serde::Deserialize;
use std::time::Duration;

/// Get the sts endpoint.
///
/// The returning format may look like `sts.{region}.amazonaws.com`
///
/// # Notes
///
/// AWS could have different sts endpoint based on it's region.
/// We can check them by region name.
///
/// ref: https://github.com/awslabs/aws-sdk-rust/blob/31cfae2cf23be0c68a47357070dea1aee9227e3a/sdk/sts/src/aws_endpoint.rs
pub fn sts_endpoint(region: Option<&str>, use_regional: bool) -> Result<String> {
    // use regional sts if use_regional has been set.
    if use_regional {
        let region = region
            .filter(|v| !v.is_empty())
            .ok_or_else(|| Error::config_invalid("regional STS endpoint requires region"))?;
        if region.starts_with("cn-") {
            Ok(format!("sts.{region}.amazonaws.com.cn"))
        } else {
            Ok(format!("sts.{region}.amazonaws.com"))
        }
    } else {
        let region = region.unwrap_or_default();
        if region.starts_with("cn") {
            Ok("sts.amazonaws.com.cn".to_string())
        } else {
            Ok("sts.amazonaws.com".to_string())
        }
    }
}

/// Whether `AWS_STS_REGIONAL_ENDPOINTS` asks for regional endpoints.
pub fn use_regional_sts_endpoint(ctx: &Context) -> bool {
    ctx.env_var(AWS_STS_REGIONAL_ENDPOINTS)
        .map(|v| v == "regional")
        .unwrap_or(false)
}

/// Pull the expiration of a metadata credential forward by `window`.
pub fn apply_expiry_window(expiration: DateTime, window: Duration) -> DateTime {
    expiration - dsauth_core::time::delta(window)
}

#[derive(Default, Debug, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
struct StsErrorResponse {
    error: StsError,
    request_id: String,
}

#[derive(Default, Debug, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
struct StsError {
    code: String,
    message: String,
}

/// Build an error out of a non-200 STS response.
pub fn parse_sts_error(
    action: &str,
    status: http::StatusCode,
    body: &str,
    request_id: Option<&str>,
) -> Error {
    let resp: StsErrorResponse = de::from_str(body).unwrap_or_default();
    let code = resp.error.code;

    let message = format!("STS {action} failed: [{code}] {}", resp.error.message);
    let mut err = match code.as_str() {
        "AccessDenied" | "ExpiredToken" | "InvalidClientTokenId" | "SignatureDoesNotMatch" => {
            Error::credential_denied(message)
        }
        "InvalidIdentityToken" | "IDPRejectedClaim" => Error::credential_invalid(message),
        "MalformedPolicyDocument" | "ValidationError" | "RegionDisabledException" => {
            Error::config_invalid(message)
        }
        _ => Error::unexpected(message),
    };

    err = err.with_context(format!("status: {status}"));
    let request_id = request_id
        .map(|v| v.to_string())
        .or_else(|| Some(resp.request_id).filter(|v| !v.is_empty()));
    if let Some(request_id) = request_id {
        err = err.with_context(format!("request_id: {request_id}"));
    }
    if code.is_empty() {
        err = err.with_context(format!("body: {body}"));
    }
    err
}

#[cfg(test)]
mod tests {
    use super::*;
    use dsauth_core::ErrorKind;
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    #[test_case(None, false, "sts.amazonaws.com")]
    #[test_case(Some("us-east-1"), false, "sts.amazonaws.com")]
    #[test_case(Some("cn-north-1"), false, "sts.amazonaws.com.cn")]
    #[test_case(Some("eu-west-1"), true, "sts.eu-west-1.amazonaws.com")]
    #[test_case(Some("cn-northwest-1"), true, "sts.cn-northwest-1.amazonaws.com.cn")]
    fn test_sts_endpoint(region: Option<&str>, use_regional: bool, expected: &str) {
        assert_eq!(expected, sts_endpoint(region, use_regional).unwrap());
    }

    #[test]
    fn test_sts_endpoint_regional_without_region() {
        assert!(sts_endpoint(None, true).is_err());
        assert!(sts_endpoint(Some(""), true).is_err());
    }

    #[test]
    fn test_apply_expiry_window() {
        let expiration = dsauth_core::time::parse_rfc3339("2022-05-25T11:45:17Z").unwrap();
        assert_eq!(
            dsauth_core::time::parse_rfc3339("2022-05-25T11:40:17Z").unwrap(),
            apply_expiry_window(expiration, METADATA_EXPIRY_WINDOW)
        );
    }

    #[test]
    fn test_parse_sts_error() {
        let body = r#"<ErrorResponse xmlns="https://sts.amazonaws.com/doc/2011-06-15/">
  <Error>
    <Type>Sender</Type>
    <Code>AccessDenied</Code>
    <Message>User is not authorized to perform: sts:AssumeRole</Message>
  </Error>
  <RequestId>c6104cbe-af31-11e0-8154-cbc7ccf896c7</RequestId>
</ErrorResponse>"#;

        let err = parse_sts_error("AssumeRole", http::StatusCode::FORBIDDEN, body, None);
        assert_eq!(ErrorKind::CredentialDenied, err.kind());
        assert_eq!(
            &[
                "status: 403 Forbidden".to_string(),
                "request_id: c6104cbe-af31-11e0-8154-cbc7ccf896c7".to_string()
            ],
            err.context()
        );
    }

    #[test]
    fn test_parse_sts_error_unparsable() {
        let err = parse_sts_error(
            "AssumeRole",
            http::StatusCode::BAD_GATEWAY,
            "upstream down",
            Some("req-1"),
        );
        assert_eq!(ErrorKind::Unexpected, err.kind());
        assert_eq!(
            &[
                "status: 502 Bad Gateway".to_string(),
                "request_id: req-1".to_string(),
                "body: upstream down".to_string()
            ],
            err.context()
        );
    }
}

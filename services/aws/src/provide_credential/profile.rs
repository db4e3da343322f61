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

use crate::{constants::*, Credential};
use async_trait::async_trait;
use dsauth_core::{Context, Error, ProvideCredential, Result};
use ini::{Ini, Properties};
use log::debug;

/// ProfileCredentialProvider loads AWS credentials from the shared files.
///
/// It reads, in order:
/// - `~/.aws/credentials` (or the path specified by `AWS_SHARED_CREDENTIALS_FILE`)
/// - `~/.aws/config` (or the path specified by `AWS_CONFIG_FILE`)
///
/// The profile to use is determined by:
/// 1. The profile specified via `with_profile()`, if not empty
/// 2. The `AWS_PROFILE` environment variable
/// 3. Default to "default"
#[derive(Debug, Clone, Default)]
pub struct ProfileCredentialProvider {
    profile: String,
    config_file: Option<String>,
    credentials_file: Option<String>,
}

impl ProfileCredentialProvider {
    /// Create a new ProfileCredentialProvider with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the profile name to use.
    pub fn with_profile(mut self, profile: impl Into<String>) -> Self {
        self.profile = profile.into();
        self
    }

    /// Set the path to the config file.
    pub fn with_config_file(mut self, path: impl Into<String>) -> Self {
        self.config_file = Some(path.into());
        self
    }

    /// Set the path to the credentials file.
    pub fn with_credentials_file(mut self, path: impl Into<String>) -> Self {
        self.credentials_file = Some(path.into());
        self
    }

    fn profile(&self, ctx: &Context) -> String {
        if !self.profile.is_empty() {
            return self.profile.clone();
        }

        ctx.env_var(AWS_PROFILE)
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| "default".to_string())
    }

    /// Read and parse an ini file, `None` if it doesn't exist or can't be read.
    async fn load_ini(&self, ctx: &Context, path: &str) -> Result<Option<Ini>> {
        let path = if path.starts_with("~/") {
            match ctx.expand_home_dir(path) {
                Some(expanded) => expanded,
                None => {
                    debug!("failed to expand homedir for path: {path}");
                    return Ok(None);
                }
            }
        } else {
            path.to_string()
        };

        let content = match ctx.file_read(&path).await {
            Ok(content) => content,
            Err(err) => {
                debug!("failed to read shared aws file {path}: {err:?}");
                return Ok(None);
            }
        };

        let conf = Ini::load_from_str(&String::from_utf8_lossy(&content)).map_err(|e| {
            Error::config_invalid("failed to parse shared aws file")
                .with_source(anyhow::Error::new(e))
                .with_context(format!("path: {path}"))
        })?;

        Ok(Some(conf))
    }

    async fn load_from_credentials_file(
        &self,
        ctx: &Context,
        profile: &str,
    ) -> Result<Option<Credential>> {
        let path = self
            .credentials_file
            .clone()
            .or_else(|| ctx.env_var(AWS_SHARED_CREDENTIALS_FILE))
            .unwrap_or_else(|| "~/.aws/credentials".to_string());

        let Some(conf) = self.load_ini(ctx, &path).await? else {
            return Ok(None);
        };

        match conf.section(Some(profile)) {
            Some(props) => Ok(credential_from_properties(props)),
            None => {
                debug!("profile {profile} not found in credentials file");
                Ok(None)
            }
        }
    }

    async fn load_from_config_file(
        &self,
        ctx: &Context,
        profile: &str,
    ) -> Result<Option<Credential>> {
        let path = self
            .config_file
            .clone()
            .or_else(|| ctx.env_var(AWS_CONFIG_FILE))
            .unwrap_or_else(|| "~/.aws/config".to_string());

        let Some(conf) = self.load_ini(ctx, &path).await? else {
            return Ok(None);
        };

        let section = match profile {
            "default" => "default".to_string(),
            x => format!("profile {x}"),
        };

        match conf.section(Some(section.as_str())) {
            Some(props) => Ok(credential_from_properties(props)),
            None => {
                debug!("section {section} not found in config file");
                Ok(None)
            }
        }
    }
}

fn credential_from_properties(props: &Properties) -> Option<Credential> {
    let non_empty = |key: &str| props.get(key).map(str::trim).filter(|v| !v.is_empty());
    let access_key_id = non_empty("aws_access_key_id")?;
    let secret_access_key = non_empty("aws_secret_access_key")?;

    Some(Credential {
        access_key_id: access_key_id.to_string(),
        secret_access_key: secret_access_key.to_string(),
        session_token: non_empty("aws_session_token").map(|s| s.to_string()),
        expires_in: None,
    })
}

#[async_trait]
impl ProvideCredential for ProfileCredentialProvider {
    type Credential = Credential;

    async fn provide_credential(&self, ctx: &Context) -> Result<Option<Self::Credential>> {
        let profile = self.profile(ctx);

        // Try credentials file first
        if let Some(cred) = self.load_from_credentials_file(ctx, &profile).await? {
            return Ok(Some(cred));
        }

        // Then try config file
        self.load_from_config_file(ctx, &profile).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dsauth_core::StaticEnv;
    use dsauth_file_read_tokio::TokioFileRead;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;
    use std::fs::File;
    use std::io::Write;
    use tempfile::tempdir;

    fn context(envs: HashMap<String, String>) -> Context {
        Context::new()
            .with_file_read(TokioFileRead)
            .with_env(StaticEnv {
                home_dir: None,
                envs,
            })
    }

    #[tokio::test]
    async fn test_profile_from_credentials_file() -> anyhow::Result<()> {
        let _ = env_logger::builder().is_test(true).try_init();

        let tmp_dir = tempdir()?;
        let file_path = tmp_dir.path().join("credentials");
        let mut tmp_file = File::create(&file_path)?;
        writeln!(tmp_file, "[default]")?;
        writeln!(tmp_file, "aws_access_key_id = DEFAULTACCESSKEYID")?;
        writeln!(tmp_file, "aws_secret_access_key = DEFAULTSECRETACCESSKEY")?;
        writeln!(tmp_file, "aws_session_token = DEFAULTSESSIONTOKEN")?;
        writeln!(tmp_file)?;
        writeln!(tmp_file, "[profile1]")?;
        writeln!(tmp_file, "aws_access_key_id = PROFILE1ACCESSKEYID")?;
        writeln!(tmp_file, "aws_secret_access_key = PROFILE1SECRETACCESSKEY")?;

        let ctx = context(HashMap::new());

        // Test default profile
        let provider =
            ProfileCredentialProvider::new().with_credentials_file(file_path.to_str().unwrap());
        let cred = provider.provide_credential(&ctx).await?.unwrap();
        assert_eq!(cred.access_key_id, "DEFAULTACCESSKEYID");
        assert_eq!(cred.secret_access_key, "DEFAULTSECRETACCESSKEY");
        assert_eq!(cred.session_token, Some("DEFAULTSESSIONTOKEN".to_string()));

        // Test specific profile
        let provider = ProfileCredentialProvider::new()
            .with_profile("profile1")
            .with_credentials_file(file_path.to_str().unwrap());
        let cred = provider.provide_credential(&ctx).await?.unwrap();
        assert_eq!(cred.access_key_id, "PROFILE1ACCESSKEYID");
        assert_eq!(cred.secret_access_key, "PROFILE1SECRETACCESSKEY");
        assert!(cred.session_token.is_none());

        Ok(())
    }

    #[tokio::test]
    async fn test_profile_from_config_file() -> anyhow::Result<()> {
        let _ = env_logger::builder().is_test(true).try_init();

        let tmp_dir = tempdir()?;
        let file_path = tmp_dir.path().join("config");
        let mut tmp_file = File::create(&file_path)?;
        writeln!(tmp_file, "[default]")?;
        writeln!(tmp_file, "aws_access_key_id = DEFAULTACCESSKEYID")?;
        writeln!(tmp_file, "aws_secret_access_key = DEFAULTSECRETACCESSKEY")?;
        writeln!(tmp_file)?;
        writeln!(tmp_file, "[profile profile1]")?;
        writeln!(tmp_file, "aws_access_key_id = PROFILE1ACCESSKEYID")?;
        writeln!(tmp_file, "aws_secret_access_key = PROFILE1SECRETACCESSKEY")?;

        let ctx = context(HashMap::from([(
            AWS_SHARED_CREDENTIALS_FILE.to_string(),
            "/non/existent/credentials".to_string(),
        )]));

        let provider = ProfileCredentialProvider::new()
            .with_profile("profile1")
            .with_config_file(file_path.to_str().unwrap());
        let cred = provider.provide_credential(&ctx).await?.unwrap();
        assert_eq!(cred.access_key_id, "PROFILE1ACCESSKEYID");
        assert_eq!(cred.secret_access_key, "PROFILE1SECRETACCESSKEY");

        Ok(())
    }

    #[tokio::test]
    async fn test_profile_from_env() -> anyhow::Result<()> {
        let _ = env_logger::builder().is_test(true).try_init();

        let tmp_dir = tempdir()?;
        let file_path = tmp_dir.path().join("credentials");
        let mut tmp_file = File::create(&file_path)?;
        writeln!(tmp_file, "[default]")?;
        writeln!(tmp_file, "aws_access_key_id = DEFAULTACCESSKEYID")?;
        writeln!(tmp_file, "aws_secret_access_key = DEFAULTSECRETACCESSKEY")?;
        writeln!(tmp_file)?;
        writeln!(tmp_file, "[profile1]")?;
        writeln!(tmp_file, "aws_access_key_id = PROFILE1ACCESSKEYID")?;
        writeln!(tmp_file, "aws_secret_access_key = PROFILE1SECRETACCESSKEY")?;

        let ctx = context(HashMap::from([
            (AWS_PROFILE.to_string(), "profile1".to_string()),
            (
                AWS_SHARED_CREDENTIALS_FILE.to_string(),
                file_path.to_string_lossy().to_string(),
            ),
        ]));

        // AWS_PROFILE is only used when no profile is configured.
        let cred = ProfileCredentialProvider::new()
            .provide_credential(&ctx)
            .await?
            .unwrap();
        assert_eq!(cred.access_key_id, "PROFILE1ACCESSKEYID");

        let cred = ProfileCredentialProvider::new()
            .with_profile("default")
            .provide_credential(&ctx)
            .await?
            .unwrap();
        assert_eq!(cred.access_key_id, "DEFAULTACCESSKEYID");

        Ok(())
    }

    #[tokio::test]
    async fn test_profile_missing_credentials() -> anyhow::Result<()> {
        let ctx = context(HashMap::new());

        let provider = ProfileCredentialProvider::new()
            .with_credentials_file("/non/existent/path")
            .with_config_file("/non/existent/path");
        assert!(provider.provide_credential(&ctx).await?.is_none());

        // Home dir can't be expanded without a home.
        assert!(ProfileCredentialProvider::new()
            .provide_credential(&ctx)
            .await?
            .is_none());

        Ok(())
    }

    #[tokio::test]
    async fn test_profile_with_blank_keys_is_absent() -> anyhow::Result<()> {
        let tmp_dir = tempdir()?;
        let credentials_path = tmp_dir.path().join("credentials");
        let mut f = File::create(&credentials_path)?;
        writeln!(f, "[dev]")?;
        writeln!(f, "aws_access_key_id =")?;
        writeln!(f, "aws_secret_access_key =")?;

        let config_path = tmp_dir.path().join("config");
        let mut f = File::create(&config_path)?;
        writeln!(f, "[profile dev]")?;
        writeln!(f, "aws_access_key_id = CONFIGACCESSKEYID")?;
        writeln!(f, "aws_secret_access_key = CONFIGSECRETACCESSKEY")?;

        let ctx = context(HashMap::new());

        // Blank keys in the credentials file fall through to the config file.
        let cred = ProfileCredentialProvider::new()
            .with_profile("dev")
            .with_credentials_file(credentials_path.to_str().unwrap())
            .with_config_file(config_path.to_str().unwrap())
            .provide_credential(&ctx)
            .await?
            .unwrap();
        assert_eq!(cred.access_key_id, "CONFIGACCESSKEYID");

        let cred = ProfileCredentialProvider::new()
            .with_profile("dev")
            .with_credentials_file(credentials_path.to_str().unwrap())
            .with_config_file("/non/existent/config")
            .provide_credential(&ctx)
            .await?;
        assert!(cred.is_none());

        Ok(())
    }
}

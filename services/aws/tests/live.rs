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

use dsauth_aws::{AuthType, ConfigLoader, DatasourceSettings};
use dsauth_core::{Context, ExpiringCredential, OsEnv};
use dsauth_file_read_tokio::TokioFileRead;
use dsauth_http_send_reqwest::ReqwestHttpSend;
use log::warn;
use std::env;

fn init_live_loader() -> Option<ConfigLoader> {
    let _ = env_logger::builder().is_test(true).try_init();
    let _ = dotenv::dotenv();

    if env::var("DSAUTH_AWS_TEST").unwrap_or_default() != "on" {
        return None;
    }

    let ctx = Context::new()
        .with_file_read(TokioFileRead)
        .with_http_send(ReqwestHttpSend::default())
        .with_env(OsEnv);
    Some(ConfigLoader::new(ctx))
}

#[tokio::test]
async fn test_live_default_chain() {
    let Some(loader) = init_live_loader() else {
        warn!("DSAUTH_AWS_TEST is not set, skipped");
        return;
    };

    let region = env::var("DSAUTH_AWS_REGION").unwrap_or_else(|_| "us-east-1".to_string());
    let config = loader
        .load(&DatasourceSettings::default(), &region)
        .await
        .expect("load config must succeed");
    let cred = config
        .credentials()
        .get()
        .await
        .expect("default chain must yield a credential");

    assert!(cred.is_valid());
}

#[tokio::test]
async fn test_live_assume_role() {
    let Some(loader) = init_live_loader() else {
        warn!("DSAUTH_AWS_TEST is not set, skipped");
        return;
    };
    let Ok(role_arn) = env::var("DSAUTH_AWS_ROLE_ARN") else {
        warn!("DSAUTH_AWS_ROLE_ARN is not set, skipped");
        return;
    };

    let region = env::var("DSAUTH_AWS_REGION").unwrap_or_else(|_| "us-east-1".to_string());
    let settings = DatasourceSettings {
        auth_type: AuthType::Arn,
        assume_role_arn: role_arn,
        region: region.clone(),
        ..Default::default()
    };

    let config = loader
        .load(&settings, &region)
        .await
        .expect("assume role must succeed");
    let cred = config.credentials().get().await.expect("credential");

    assert!(cred.session_token.is_some());
    assert!(cred.expires_in.is_some());
}

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

use crate::Credential;

/// Shareable credentials handle handed out to datasource clients.
///
/// Resolution is lazy: nothing is fetched until [`dsauth_core::Credentials::get`]
/// is called.
pub type CredentialHandle = dsauth_core::Credentials<Credential>;

/// Everything an AWS client needs for one datasource.
#[derive(Debug, Clone)]
pub struct Config {
    region: String,
    credentials: CredentialHandle,
}

impl Config {
    /// Create a config from a credentials handle and a region.
    pub fn new(credentials: CredentialHandle, region: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            credentials,
        }
    }

    /// Region the client should talk to.
    pub fn region(&self) -> &str {
        &self.region
    }

    /// Credentials handle of the datasource.
    pub fn credentials(&self) -> &CredentialHandle {
        &self.credentials
    }
}

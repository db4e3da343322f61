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

//! Core components for resolving credentials.
//!
//! This crate provides the foundational types and traits shared by the dsauth
//! service crates.
//!
//! ## Overview
//!
//! - **Context**: holds the implementations for file reading, HTTP sending and
//!   environment access. Providers never touch the OS directly.
//! - **ProvideCredential**: resolves a credential from one source, or reports that
//!   the source is absent.
//! - **ProvideCredentialChain**: tries providers in order, first valid credential wins.
//! - **Credentials**: a lazily resolving, shareable handle over a provider.
//!
//! ## Example
//!
//! ```no_run
//! use dsauth_core::{Context, Credentials, ExpiringCredential, ProvideCredential, Result};
//! use dsauth_core::time::DateTime;
//! use async_trait::async_trait;
//!
//! #[derive(Clone, Debug)]
//! struct Token(String);
//!
//! impl ExpiringCredential for Token {
//!     fn is_valid(&self) -> bool {
//!         !self.0.is_empty()
//!     }
//!
//!     fn expires_at(&self) -> Option<DateTime> {
//!         None
//!     }
//! }
//!
//! #[derive(Debug)]
//! struct FromEnv;
//!
//! #[async_trait]
//! impl ProvideCredential for FromEnv {
//!     type Credential = Token;
//!
//!     async fn provide_credential(&self, ctx: &Context) -> Result<Option<Token>> {
//!         Ok(ctx.env_var("MY_TOKEN").map(Token))
//!     }
//! }
//!
//! # async fn example() -> Result<()> {
//! let creds = Credentials::new(Context::new(), FromEnv);
//! let token = creds.get().await?;
//! # Ok(())
//! # }
//! ```

// Make sure all our public APIs have docs.
#![warn(missing_docs)]

pub mod time;
pub mod utils;

mod context;
pub use context::{Context, Env, FileRead, HttpSend, OsEnv, StaticEnv};
pub use context::{NoopEnv, NoopFileRead, NoopHttpSend};

mod error;
pub use error::{Error, ErrorKind, Result};

mod api;
pub use api::{ExpiringCredential, ProvideCredential};

mod chain;
pub use chain::ProvideCredentialChain;

mod credentials;
pub use credentials::Credentials;

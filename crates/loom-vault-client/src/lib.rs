// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Minimal HashiCorp Vault client.
//!
//! Covers what workload authentication needs and nothing more:
//! 1. Build an HTTP client trusting a CA file or a CA directory
//! 2. Logical `read`/`write` against `/v1/{path}`
//! 3. Token self-operations: lookup, renew, revoke
//!
//! # Example
//!
//! ```ignore
//! use loom_vault_client::{SecretToken, VaultClient, VaultClientConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = VaultClientConfig::new("https://vault.internal:8200")
//!         .with_ca_cert("/etc/vault/ca.pem");
//!     let client = VaultClient::new(config)?
//!         .with_token(SecretToken::new("hvs.example".to_string()));
//!
//!     if let Some(secret) = client.read("secret/data/app").await? {
//!         println!("{:?}", secret.data);
//!     }
//!     Ok(())
//! }
//! ```

mod client;
mod config;
mod error;
mod token;
mod types;

pub use client::VaultClient;
pub use config::{VaultClientConfig, DEFAULT_TIMEOUT};
pub use error::{VaultError, VaultResult};
pub use token::SecretToken;
pub use types::{SecretAuth, VaultSecret};

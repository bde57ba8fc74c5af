// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Vault authentication for workloads running as a Google service account.
//!
//! The workload proves its identity by asking the IAM Credentials API to
//! sign a short-lived JWT (`aud = vault/<role>`, `sub = <service account>`)
//! and exchanging it at Vault's GCP auth mount for a Vault token.
//!
//! # Example
//!
//! ```no_run
//! use loom_vault_auth::{ClientConnection, ConnectionOptions};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let connection = ClientConnection::new(ConnectionOptions::new(
//!     "https://vault.internal:8200",
//!     "billing-reader",
//! ))?;
//!
//! let client = connection.ready_client().await?;
//! let secret = client.read("secret/data/billing").await?;
//! # Ok(())
//! # }
//! ```
//!
//! A static token in [`ConnectionOptions`] bypasses all of the above.

pub mod clock;
pub mod config;
pub mod connection;
pub mod error;
pub mod identity;
pub mod provider;
pub mod signer;
pub mod token;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{AuthConfig, GcpEndpoints, DEFAULT_AUTH_PATH};
pub use connection::{ClientConnection, ConnectionOptions};
pub use error::{AuthError, AuthResult};
pub use identity::{AccessTokenSource, GcpServiceAccountResolver, IdentityResolver, ServiceIdentity};
pub use provider::{AuthProvider, GcpAuth};
pub use signer::{AssertionSigner, Claim, JwtSigner};
pub use token::{ServerToken, TokenManager};

// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::fmt;
use std::sync::Arc;

use loom_common_http::RetryConfig;
use loom_vault_client::VaultClient;
use reqwest::Client;
use tracing::debug;

use crate::config::{AuthConfig, GcpEndpoints, DEFAULT_AUTH_PATH};
use crate::error::AuthResult;
use crate::identity::GcpServiceAccountResolver;
use crate::signer::JwtSigner;
use crate::token::TokenManager;

/// A way of logging in to Vault without a pre-issued token.
pub trait AuthProvider: Send + Sync + fmt::Debug {
	fn name(&self) -> &'static str;

	/// Validated configuration for logging in as `role`.
	fn config(&self, role: &str) -> AuthResult<AuthConfig>;

	/// A manager that logs in through this provider, talking to Vault via `client`.
	fn new_token_manager(&self, config: &AuthConfig, client: &VaultClient) -> AuthResult<TokenManager>;
}

/// Google workload identity: login with a JWT signed by the IAM Credentials API.
#[derive(Debug, Clone)]
pub struct GcpAuth {
	auth_path: String,
	endpoints: GcpEndpoints,
	signing_retry: RetryConfig,
	http_client: Option<Client>,
}

impl Default for GcpAuth {
	fn default() -> Self {
		Self {
			auth_path: DEFAULT_AUTH_PATH.to_string(),
			endpoints: GcpEndpoints::from_env(),
			signing_retry: RetryConfig::default(),
			http_client: None,
		}
	}
}

impl GcpAuth {
	pub fn with_auth_path(mut self, path: impl Into<String>) -> Self {
		self.auth_path = path.into();
		self
	}

	pub fn with_endpoints(mut self, endpoints: GcpEndpoints) -> Self {
		self.endpoints = endpoints;
		self
	}

	pub fn with_signing_retry(mut self, retry: RetryConfig) -> Self {
		self.signing_retry = retry;
		self
	}

	pub fn with_http_client(mut self, client: Client) -> Self {
		self.http_client = Some(client);
		self
	}
}

impl AuthProvider for GcpAuth {
	fn name(&self) -> &'static str {
		"gcp"
	}

	fn config(&self, role: &str) -> AuthResult<AuthConfig> {
		let mut config = AuthConfig::new(role)
			.with_auth_path(self.auth_path.clone())
			.with_endpoints(self.endpoints.clone())
			.with_signing_retry(self.signing_retry.clone());
		if let Some(client) = &self.http_client {
			config = config.with_http_client(client.clone());
		}
		config.validate()?;
		Ok(config)
	}

	fn new_token_manager(&self, config: &AuthConfig, client: &VaultClient) -> AuthResult<TokenManager> {
		let http = config.http_client()?;
		let resolver = Arc::new(GcpServiceAccountResolver::new(http.clone(), config.endpoints()));
		let signer = Arc::new(JwtSigner::new(config, resolver, http));
		debug!(role = config.role(), login_path = %config.login_path(), "Created GCP token manager");
		Ok(TokenManager::new(config, client.clone(), signer))
	}
}

// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Entry point for callers that just want an authenticated Vault client.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use loom_vault_client::{SecretToken, VaultClient, VaultClientConfig, DEFAULT_TIMEOUT};
use tokio::sync::OnceCell;
use tracing::info;

use crate::config::AuthConfig;
use crate::error::{AuthError, AuthResult};
use crate::provider::{AuthProvider, GcpAuth};
use crate::token::TokenManager;

/// How to reach Vault and how to authenticate to it.
#[derive(Debug, Clone)]
pub struct ConnectionOptions {
	pub address: String,
	pub ca_cert: Option<PathBuf>,
	pub ca_path: Option<PathBuf>,
	/// When set, used verbatim and no login ever happens.
	pub static_token: Option<SecretToken>,
	/// Vault role for dynamic login. Ignored with a static token.
	pub role: String,
	pub timeout: Duration,
}

impl ConnectionOptions {
	pub fn new(address: impl Into<String>, role: impl Into<String>) -> Self {
		Self {
			address: address.into(),
			ca_cert: None,
			ca_path: None,
			static_token: None,
			role: role.into(),
			timeout: DEFAULT_TIMEOUT,
		}
	}

	pub fn with_ca_cert(mut self, path: impl Into<PathBuf>) -> Self {
		self.ca_cert = Some(path.into());
		self
	}

	pub fn with_ca_path(mut self, path: impl Into<PathBuf>) -> Self {
		self.ca_path = Some(path.into());
		self
	}

	/// Use `token` as-is. Empty tokens are treated as absent.
	pub fn with_static_token(mut self, token: SecretToken) -> Self {
		self.static_token = (!token.is_empty()).then_some(token);
		self
	}

	pub fn with_timeout(mut self, timeout: Duration) -> Self {
		self.timeout = timeout;
		self
	}

	fn client_config(&self) -> VaultClientConfig {
		let mut config = VaultClientConfig::new(self.address.clone()).with_timeout(self.timeout);
		if let Some(path) = &self.ca_cert {
			config = config.with_ca_cert(path.clone());
		}
		if let Some(path) = &self.ca_path {
			config = config.with_ca_path(path.clone());
		}
		config
	}
}

enum Mode {
	Static,
	Dynamic {
		provider: Arc<dyn AuthProvider>,
		config: AuthConfig,
		manager: OnceCell<TokenManager>,
	},
}

/// A Vault connection that hands out clients ready to make requests.
///
/// With a static token the token is attached once and never managed. Otherwise
/// a [`TokenManager`] is built on first use and logs in through the provider.
pub struct ClientConnection {
	client: VaultClient,
	mode: Mode,
}

impl ClientConnection {
	/// Connect using Google workload identity for dynamic login.
	pub fn new(options: ConnectionOptions) -> AuthResult<Self> {
		Self::with_provider(options, Arc::new(GcpAuth::default()))
	}

	pub fn with_provider(options: ConnectionOptions, provider: Arc<dyn AuthProvider>) -> AuthResult<Self> {
		let client = VaultClient::new(options.client_config()).map_err(|e| AuthError::Config {
			message: "unable to create vault client".to_string(),
			source: Some(e),
		})?;
		Self::from_client(client, options.static_token, &options.role, provider)
	}

	/// Build around an existing client. Any token already on `client` is replaced.
	pub fn from_client(
		client: VaultClient,
		static_token: Option<SecretToken>,
		role: &str,
		provider: Arc<dyn AuthProvider>,
	) -> AuthResult<Self> {
		if let Some(token) = static_token.filter(|t| !t.is_empty()) {
			info!(address = client.address(), "Using static Vault token");
			return Ok(Self {
				client: client.with_token(token),
				mode: Mode::Static,
			});
		}

		let config = provider.config(role)?;
		info!(
			address = client.address(),
			provider = provider.name(),
			role = config.role(),
			auth_path = config.auth_path(),
			"Using dynamic Vault authentication"
		);
		Ok(Self {
			client: client.without_token(),
			mode: Mode::Dynamic {
				provider,
				config,
				manager: OnceCell::new(),
			},
		})
	}

	/// A client carrying a usable token, logging in first when needed.
	pub async fn ready_client(&self) -> AuthResult<VaultClient> {
		match &self.mode {
			Mode::Static => Ok(self.client.clone()),
			Mode::Dynamic {
				provider,
				config,
				manager,
			} => {
				let manager = manager
					.get_or_try_init(|| async { provider.new_token_manager(config, &self.client) })
					.await?;
				let token = manager.get_token().await?;
				Ok(self.client.with_token(token.client_token().clone()))
			}
		}
	}

	/// The token manager, once the first `ready_client` call has built it.
	/// Always `None` with a static token.
	pub fn token_manager(&self) -> Option<&TokenManager> {
		match &self.mode {
			Mode::Static => None,
			Mode::Dynamic { manager, .. } => manager.get(),
		}
	}

	pub fn is_static(&self) -> bool {
		matches!(self.mode, Mode::Static)
	}

	/// The underlying client. Carries the token only in static mode.
	pub fn client(&self) -> &VaultClient {
		&self.client
	}
}

impl std::fmt::Debug for ClientConnection {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let mode = match &self.mode {
			Mode::Static => "static",
			Mode::Dynamic { .. } => "dynamic",
		};
		f.debug_struct("ClientConnection")
			.field("client", &self.client)
			.field("mode", &mode)
			.finish()
	}
}

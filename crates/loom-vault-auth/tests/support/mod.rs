// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

#![allow(dead_code)]

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use loom_common_http::RetryConfig;
use loom_vault_auth::{
	AccessTokenSource, AssertionSigner, AuthConfig, AuthError, AuthProvider, AuthResult,
	IdentityResolver, ManualClock, ServiceIdentity, TokenManager,
};
use loom_vault_client::{SecretToken, VaultClient};
use serde_json::{json, Value};
use wiremock::MockServer;

pub const SERVICE_ACCOUNT: &str = "vault-reader@acme-prod.iam.gserviceaccount.com";
pub const ACCESS_TOKEN: &str = "ya29.test-access-token";

pub fn at(secs: i64) -> DateTime<Utc> {
	DateTime::from_timestamp(secs, 0).unwrap()
}

/// Retry policy with millisecond delays so retry tests stay fast.
pub fn fast_retry(max_retries: u32) -> RetryConfig {
	RetryConfig {
		max_retries,
		base_delay: Duration::from_millis(1),
		max_delay: Duration::from_millis(5),
		backoff_factor: 1.5,
		jitter: false,
	}
}

pub fn vault_client(server: &MockServer) -> VaultClient {
	VaultClient::with_http_client(server.uri(), reqwest::Client::new())
}

pub fn login_response(token: &str, lease_secs: u64) -> Value {
	json!({
		"request_id": "0f1c",
		"lease_id": "",
		"renewable": false,
		"lease_duration": 0,
		"data": null,
		"auth": {
			"client_token": token,
			"accessor": format!("acc-{token}"),
			"policies": ["default", "billing"],
			"token_policies": ["default", "billing"],
			"metadata": {"role": "billing", "service_account_email": SERVICE_ACCOUNT},
			"lease_duration": lease_secs,
			"renewable": true
		}
	})
}

pub struct FixedAccessToken;

#[async_trait]
impl AccessTokenSource for FixedAccessToken {
	async fn access_token(&self) -> AuthResult<SecretToken> {
		Ok(SecretToken::new(ACCESS_TOKEN.to_string()))
	}
}

/// Resolves to a fixed service account, optionally moving a clock on each call.
pub struct FixedIdentity {
	email: String,
	resolutions: AtomicU32,
	tick: Option<(ManualClock, chrono::Duration)>,
}

impl FixedIdentity {
	pub fn new(email: &str) -> Self {
		Self {
			email: email.to_string(),
			resolutions: AtomicU32::new(0),
			tick: None,
		}
	}

	pub fn advancing(mut self, clock: ManualClock, by: chrono::Duration) -> Self {
		self.tick = Some((clock, by));
		self
	}

	pub fn resolutions(&self) -> u32 {
		self.resolutions.load(Ordering::SeqCst)
	}
}

#[async_trait]
impl IdentityResolver for FixedIdentity {
	async fn resolve(&self) -> AuthResult<ServiceIdentity> {
		self.resolutions.fetch_add(1, Ordering::SeqCst);
		if let Some((clock, by)) = &self.tick {
			clock.advance(*by);
		}
		Ok(ServiceIdentity::new(self.email.clone(), Arc::new(FixedAccessToken)))
	}
}

/// Signer that hands out a fixed assertion and counts how often it was asked.
pub struct CountingSigner {
	jwt: Option<String>,
	calls: AtomicU32,
}

impl CountingSigner {
	pub fn new(jwt: &str) -> Self {
		Self {
			jwt: Some(jwt.to_string()),
			calls: AtomicU32::new(0),
		}
	}

	pub fn failing() -> Self {
		Self {
			jwt: None,
			calls: AtomicU32::new(0),
		}
	}

	pub fn calls(&self) -> u32 {
		self.calls.load(Ordering::SeqCst)
	}
}

#[async_trait]
impl AssertionSigner for CountingSigner {
	async fn sign(&self) -> AuthResult<SecretToken> {
		self.calls.fetch_add(1, Ordering::SeqCst);
		match &self.jwt {
			Some(jwt) => Ok(SecretToken::new(jwt.clone())),
			None => Err(AuthError::RetryExhausted {
				attempts: 6,
				source: Box::new(AuthError::Signing {
					code: Some(503),
					status: Some("UNAVAILABLE".into()),
					message: "backend unavailable".into(),
				}),
			}),
		}
	}
}

/// Provider that builds managers around a [`CountingSigner`] and records use.
#[derive(Debug)]
pub struct StubProvider {
	signer: Arc<CountingSigner>,
	configs: AtomicU32,
	managers: AtomicU32,
}

impl std::fmt::Debug for CountingSigner {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("CountingSigner").field("calls", &self.calls()).finish()
	}
}

impl StubProvider {
	pub fn new(signer: Arc<CountingSigner>) -> Self {
		Self {
			signer,
			configs: AtomicU32::new(0),
			managers: AtomicU32::new(0),
		}
	}

	pub fn configs(&self) -> u32 {
		self.configs.load(Ordering::SeqCst)
	}

	pub fn managers(&self) -> u32 {
		self.managers.load(Ordering::SeqCst)
	}
}

impl AuthProvider for StubProvider {
	fn name(&self) -> &'static str {
		"stub"
	}

	fn config(&self, role: &str) -> AuthResult<AuthConfig> {
		self.configs.fetch_add(1, Ordering::SeqCst);
		let config = AuthConfig::new(role);
		config.validate()?;
		Ok(config)
	}

	fn new_token_manager(&self, config: &AuthConfig, client: &VaultClient) -> AuthResult<TokenManager> {
		self.managers.fetch_add(1, Ordering::SeqCst);
		Ok(TokenManager::new(config, client.clone(), self.signer.clone()))
	}
}

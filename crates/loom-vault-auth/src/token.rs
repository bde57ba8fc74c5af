// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Lifecycle of the Vault token obtained through workload login.
//!
//! A [`TokenManager`] is either holding no token or holding an active one.
//! Login happens on first demand; refresh extends the held token in place;
//! revoke returns the manager to the empty state so the next demand logs in
//! again. Every operation that reads or changes the state is serialized, so
//! concurrent callers never trigger more than one login.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use loom_vault_client::{SecretAuth, SecretToken, VaultClient, VaultError, VaultSecret};
use serde_json::json;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::AuthConfig;
use crate::error::{AuthError, AuthResult};
use crate::signer::AssertionSigner;

/// A token issued by Vault, with the local time it stops being valid.
#[derive(Debug, Clone)]
pub struct ServerToken {
	client_token: SecretToken,
	accessor: String,
	policies: Vec<String>,
	renewable: bool,
	ttl: Duration,
	expiration: DateTime<Utc>,
}

impl ServerToken {
	fn from_auth(auth: SecretAuth, ttl: Duration, expiration: DateTime<Utc>) -> Self {
		let policies = auth.effective_policies();
		Self {
			client_token: auth.client_token,
			accessor: auth.accessor,
			policies,
			renewable: auth.renewable,
			ttl,
			expiration,
		}
	}

	fn renewed(&mut self, ttl: Duration, expiration: DateTime<Utc>, auth: Option<&SecretAuth>) {
		if let Some(auth) = auth {
			if !auth.client_token.is_empty() {
				self.client_token = auth.client_token.clone();
			}
			self.renewable = auth.renewable;
			let policies = auth.effective_policies();
			if !policies.is_empty() {
				self.policies = policies;
			}
		}
		self.ttl = ttl;
		self.expiration = expiration;
	}

	pub fn client_token(&self) -> &SecretToken {
		&self.client_token
	}

	pub fn accessor(&self) -> &str {
		&self.accessor
	}

	pub fn policies(&self) -> &[String] {
		&self.policies
	}

	pub fn renewable(&self) -> bool {
		self.renewable
	}

	/// TTL granted by the last login or refresh.
	pub fn ttl(&self) -> Duration {
		self.ttl
	}

	pub fn expiration(&self) -> DateTime<Utc> {
		self.expiration
	}
}

#[derive(Debug, Default)]
enum TokenState {
	#[default]
	Unissued,
	Active(ServerToken),
}

/// Owns at most one Vault token for a role.
pub struct TokenManager {
	role: String,
	login_path: String,
	client: VaultClient,
	signer: Arc<dyn AssertionSigner>,
	clock: Arc<dyn Clock>,
	state: Mutex<TokenState>,
}

impl TokenManager {
	/// `client` is used only with explicit tokens; any token attached to it is ignored.
	pub fn new(config: &AuthConfig, client: VaultClient, signer: Arc<dyn AssertionSigner>) -> Self {
		Self {
			role: config.role().to_string(),
			login_path: config.login_path(),
			client: client.without_token(),
			signer,
			clock: Arc::new(SystemClock),
			state: Mutex::new(TokenState::Unissued),
		}
	}

	pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
		self.clock = clock;
		self
	}

	/// The held token, logging in first if none is held.
	///
	/// The held token is returned as-is even when past its expiration;
	/// callers decide when to refresh.
	#[instrument(skip(self), fields(role = %self.role))]
	pub async fn get_token(&self) -> AuthResult<ServerToken> {
		let mut state = self.state.lock().await;
		if let TokenState::Active(token) = &*state {
			return Ok(token.clone());
		}

		let token = self.login().await?;
		*state = TokenState::Active(token.clone());
		Ok(token)
	}

	async fn login(&self) -> AuthResult<ServerToken> {
		let jwt = self.signer.sign().await?;
		let body = json!({ "role": self.role, "jwt": jwt.expose() });

		let issued_at = self.clock.now();
		let response = self
			.client
			.write(&self.login_path, &body)
			.await
			.map_err(|e| AuthError::login("login request failed", Some(e)))?
			.ok_or_else(|| AuthError::login("empty response", None))?;

		let ttl = response_ttl(&response)
			.map_err(|e| AuthError::login("unusable token ttl", Some(e)))?;
		let auth = response
			.auth
			.ok_or_else(|| AuthError::login("response carried no auth block", None))?;
		if auth.client_token.is_empty() {
			return Err(AuthError::login("empty client token", None));
		}

		let expiration = issued_at
			.checked_add_signed(ttl)
			.ok_or_else(|| AuthError::login("token ttl out of range", None))?;
		let token = ServerToken::from_auth(auth, ttl, expiration);
		info!(
			accessor = %token.accessor,
			policies = ?token.policies,
			ttl_secs = ttl.num_seconds(),
			expiration = %token.expiration,
			"Logged in to Vault"
		);
		Ok(token)
	}

	/// True when no token is held or the held token is past its expiration.
	pub async fn is_expired(&self) -> bool {
		match &*self.state.lock().await {
			TokenState::Unissued => true,
			TokenState::Active(token) => self.clock.now() > token.expiration,
		}
	}

	/// Ask Vault whether the held token is still recognized.
	///
	/// No token held counts as revoked. A lookup Vault answers with an
	/// error status means revoked; a lookup that never reaches Vault is an
	/// error, since nothing is known about the token.
	#[instrument(skip(self), fields(role = %self.role))]
	pub async fn is_revoked(&self) -> AuthResult<bool> {
		let token = match &*self.state.lock().await {
			TokenState::Unissued => return Ok(true),
			TokenState::Active(token) => token.client_token.clone(),
		};

		match self.client.lookup_self(&token).await {
			Ok(_) => Ok(false),
			Err(e @ VaultError::Api { .. }) => {
				debug!(error = %e, "Token lookup rejected; treating token as revoked");
				Ok(true)
			}
			Err(e) => Err(AuthError::lookup("token lookup did not complete", Some(e))),
		}
	}

	/// Extend the held token by `increment_secs` (a hint; Vault may grant
	/// less). Returns the new expiration, computed from when the request
	/// was sent.
	#[instrument(skip(self), fields(role = %self.role))]
	pub async fn refresh(&self, increment_secs: u64) -> AuthResult<DateTime<Utc>> {
		let mut state = self.state.lock().await;
		let TokenState::Active(token) = &mut *state else {
			return Err(AuthError::refresh("no token is held", None));
		};

		let requested_at = self.clock.now();
		let response = self
			.client
			.renew_self(&token.client_token, increment_secs)
			.await
			.map_err(|e| AuthError::refresh("renew-self request failed", Some(e)))?;
		let ttl = response_ttl(&response)
			.map_err(|e| AuthError::refresh("unusable token ttl", Some(e)))?;

		if ttl.num_seconds() < i64::try_from(increment_secs).unwrap_or(i64::MAX) {
			warn!(
				requested_secs = increment_secs,
				granted_secs = ttl.num_seconds(),
				"Vault granted less than the requested increment"
			);
		}

		let expiration = requested_at
			.checked_add_signed(ttl)
			.ok_or_else(|| AuthError::refresh("token ttl out of range", None))?;
		token.renewed(ttl, expiration, response.auth.as_ref());
		info!(ttl_secs = ttl.num_seconds(), expiration = %token.expiration, "Refreshed Vault token");
		Ok(token.expiration)
	}

	/// Revoke the held token. On success nothing is held; on failure the
	/// token is kept.
	#[instrument(skip(self), fields(role = %self.role))]
	pub async fn revoke(&self) -> AuthResult<()> {
		let mut state = self.state.lock().await;
		let TokenState::Active(token) = &*state else {
			return Err(AuthError::revoke("no token is held", None));
		};

		self.client
			.revoke_self(&token.client_token)
			.await
			.map_err(|e| AuthError::revoke("revoke-self request failed", Some(e)))?;

		*state = TokenState::Unissued;
		info!("Revoked Vault token");
		Ok(())
	}

	/// Expiration of the held token, if any.
	pub async fn expiration(&self) -> Option<DateTime<Utc>> {
		match &*self.state.lock().await {
			TokenState::Unissued => None,
			TokenState::Active(token) => Some(token.expiration),
		}
	}

	pub async fn is_active(&self) -> bool {
		matches!(&*self.state.lock().await, TokenState::Active(_))
	}
}

impl std::fmt::Debug for TokenManager {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("TokenManager")
			.field("role", &self.role)
			.field("login_path", &self.login_path)
			.field("client", &self.client)
			.finish_non_exhaustive()
	}
}

fn response_ttl(response: &VaultSecret) -> Result<Duration, VaultError> {
	let ttl = response.token_ttl()?;
	Duration::from_std(ttl)
		.map_err(|_| VaultError::InvalidResponse(format!("token ttl out of range: {ttl:?}")))
}

// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Vault HTTP client implementation.

use reqwest::{Client, Method, StatusCode};
use serde_json::{json, Value};
use tracing::{debug, instrument, warn};

use crate::config::VaultClientConfig;
use crate::error::{VaultError, VaultResult};
use crate::token::SecretToken;
use crate::types::{ErrorResponse, VaultSecret};

const VAULT_TOKEN_HEADER: &str = "X-Vault-Token";

/// Client for a single Vault server.
///
/// Cloning is cheap: the underlying connection pool is shared, only the
/// attached token is per-clone.
#[derive(Clone)]
pub struct VaultClient {
	http: Client,
	address: String,
	token: Option<SecretToken>,
}

impl VaultClient {
	/// Build a client from configuration, loading any CA certificates.
	pub fn new(config: VaultClientConfig) -> VaultResult<Self> {
		config.validate()?;

		let mut builder = loom_common_http::builder().timeout(config.timeout);
		for cert in config.root_certificates()? {
			builder = builder.add_root_certificate(cert);
		}

		let http = builder.build().map_err(|e| {
			VaultError::Configuration(format!("failed to create HTTP client: {e}"))
		})?;

		Ok(Self::with_http_client(config.address, http))
	}

	/// Build a client around an existing HTTP client (tests, custom transports).
	pub fn with_http_client(address: impl Into<String>, http: Client) -> Self {
		let address = address.into().trim_end_matches('/').to_string();
		Self {
			http,
			address,
			token: None,
		}
	}

	pub fn address(&self) -> &str {
		&self.address
	}

	/// The token attached to `read`/`write` requests, if any.
	pub fn token(&self) -> Option<&SecretToken> {
		self.token.as_ref()
	}

	pub fn set_token(&mut self, token: SecretToken) {
		self.token = Some(token);
	}

	pub fn clear_token(&mut self) {
		self.token = None;
	}

	/// A clone of this client with `token` attached.
	pub fn with_token(&self, token: SecretToken) -> Self {
		let mut client = self.clone();
		client.set_token(token);
		client
	}

	/// A clone of this client with no token attached.
	pub fn without_token(&self) -> Self {
		let mut client = self.clone();
		client.clear_token();
		client
	}

	/// Read a logical path. A 404 without error messages means "nothing
	/// there" and yields `None`.
	#[instrument(skip(self), fields(address = %self.address))]
	pub async fn read(&self, path: &str) -> VaultResult<Option<VaultSecret>> {
		match self
			.send(Method::GET, path, self.token.as_ref(), None)
			.await
		{
			Err(VaultError::Api { status, errors })
				if status == StatusCode::NOT_FOUND && errors.is_empty() =>
			{
				Ok(None)
			}
			other => other,
		}
	}

	/// Write `body` to a logical path. Login endpoints are plain writes.
	#[instrument(skip(self, body), fields(address = %self.address))]
	pub async fn write(&self, path: &str, body: &Value) -> VaultResult<Option<VaultSecret>> {
		self.send(Method::POST, path, self.token.as_ref(), Some(body))
			.await
	}

	/// Look up the properties of `token` using `token` itself.
	#[instrument(skip(self, token), fields(address = %self.address))]
	pub async fn lookup_self(&self, token: &SecretToken) -> VaultResult<VaultSecret> {
		self.send(Method::GET, "auth/token/lookup-self", Some(token), None)
			.await?
			.ok_or_else(|| VaultError::InvalidResponse("empty lookup-self response".into()))
	}

	/// Ask Vault to extend `token`. `increment_secs` is a hint; Vault may
	/// grant less (policy max TTL) and reports the granted TTL in `auth`.
	#[instrument(skip(self, token), fields(address = %self.address))]
	pub async fn renew_self(
		&self,
		token: &SecretToken,
		increment_secs: u64,
	) -> VaultResult<VaultSecret> {
		let body = json!({ "increment": increment_secs });
		self.send(Method::POST, "auth/token/renew-self", Some(token), Some(&body))
			.await?
			.ok_or_else(|| VaultError::InvalidResponse("empty renew-self response".into()))
	}

	/// Revoke `token` and all of its children.
	#[instrument(skip(self, token), fields(address = %self.address))]
	pub async fn revoke_self(&self, token: &SecretToken) -> VaultResult<()> {
		self.send(Method::POST, "auth/token/revoke-self", Some(token), None)
			.await?;
		Ok(())
	}

	fn url(&self, path: &str) -> String {
		format!("{}/v1/{}", self.address, path.trim_start_matches('/'))
	}

	async fn send(
		&self,
		method: Method,
		path: &str,
		token: Option<&SecretToken>,
		body: Option<&Value>,
	) -> VaultResult<Option<VaultSecret>> {
		let url = self.url(path);
		debug!(method = %method, url = %url, "Sending Vault request");

		let mut request = self.http.request(method, &url);
		if let Some(token) = token {
			request = request.header(VAULT_TOKEN_HEADER, token.expose());
		}
		if let Some(body) = body {
			request = request.json(body);
		}

		let response = request.send().await?;
		let status = response.status();

		if status.is_success() {
			let text = response.text().await?;
			if status == StatusCode::NO_CONTENT || text.trim().is_empty() {
				return Ok(None);
			}
			let secret = serde_json::from_str(&text)
				.map_err(|e| VaultError::InvalidResponse(e.to_string()))?;
			return Ok(Some(secret));
		}

		let text = response.text().await.unwrap_or_default();
		let errors = match serde_json::from_str::<ErrorResponse>(&text) {
			Ok(body) => body.errors,
			Err(_) if text.trim().is_empty() => Vec::new(),
			Err(_) => vec![sanitize_body_for_error(&text, 200)],
		};

		warn!(status = %status, url = %url, "Vault request failed");
		Err(VaultError::Api { status, errors })
	}
}

impl std::fmt::Debug for VaultClient {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("VaultClient")
			.field("address", &self.address)
			.field("has_token", &self.token.is_some())
			.finish()
	}
}

fn sanitize_body_for_error(body: &str, max_len: usize) -> String {
	let sanitized: String = body
		.chars()
		.filter(|c| !c.is_control() || *c == ' ')
		.take(max_len)
		.collect();
	if body.chars().count() > max_len {
		format!("{sanitized}...")
	} else {
		sanitized
	}
}

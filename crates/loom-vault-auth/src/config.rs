// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Authentication configuration.

use std::fmt;
use std::time::Duration;

use loom_common_http::RetryConfig;
use reqwest::Client;

use crate::error::{AuthError, AuthResult};

/// Mount path of the GCP auth method when none is configured.
pub const DEFAULT_AUTH_PATH: &str = "auth/gcp";

pub const DEFAULT_IAM_CREDENTIALS_URL: &str = "https://iamcredentials.googleapis.com/v1";
pub const DEFAULT_METADATA_URL: &str = "http://metadata.google.internal/computeMetadata/v1";

/// OAuth scope requested for the signing call.
pub const CLOUD_PLATFORM_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";

/// Lifetime of a signed login assertion.
pub const CLAIM_LIFETIME_SECS: i64 = 60;

const GOOGLE_HTTP_TIMEOUT: Duration = Duration::from_secs(30);
const GOOGLE_POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(1);

/// Base URLs of the Google services used during login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GcpEndpoints {
	pub iam_credentials_url: String,
	pub metadata_url: String,
}

impl Default for GcpEndpoints {
	fn default() -> Self {
		Self {
			iam_credentials_url: DEFAULT_IAM_CREDENTIALS_URL.to_string(),
			metadata_url: DEFAULT_METADATA_URL.to_string(),
		}
	}
}

impl GcpEndpoints {
	/// Defaults, with the metadata host taken from `GCE_METADATA_HOST` when set.
	pub fn from_env() -> Self {
		let mut endpoints = Self::default();
		if let Some(host) = std::env::var("GCE_METADATA_HOST")
			.ok()
			.filter(|h| !h.trim().is_empty())
		{
			endpoints.metadata_url = format!("http://{}/computeMetadata/v1", host.trim());
		}
		endpoints
	}
}

/// Parameters for logging in to Vault as a Google workload.
///
/// Immutable once handed to a token manager.
#[derive(Clone)]
pub struct AuthConfig {
	role: String,
	auth_path: String,
	endpoints: GcpEndpoints,
	signing_retry: RetryConfig,
	http_client: Option<Client>,
}

impl AuthConfig {
	pub fn new(role: impl Into<String>) -> Self {
		Self {
			role: role.into(),
			auth_path: DEFAULT_AUTH_PATH.to_string(),
			endpoints: GcpEndpoints::default(),
			signing_retry: RetryConfig::default(),
			http_client: None,
		}
	}

	pub fn with_auth_path(mut self, path: impl Into<String>) -> Self {
		self.auth_path = path.into().trim_matches('/').to_string();
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

	/// Use `client` for Google calls instead of building one.
	pub fn with_http_client(mut self, client: Client) -> Self {
		self.http_client = Some(client);
		self
	}

	pub fn role(&self) -> &str {
		&self.role
	}

	pub fn auth_path(&self) -> &str {
		&self.auth_path
	}

	/// `<auth_path>/login`
	pub fn login_path(&self) -> String {
		format!("{}/login", self.auth_path)
	}

	pub fn endpoints(&self) -> &GcpEndpoints {
		&self.endpoints
	}

	pub fn signing_retry(&self) -> &RetryConfig {
		&self.signing_retry
	}

	/// Check the configuration can be used to log in.
	pub fn validate(&self) -> AuthResult<()> {
		if self.role.trim().is_empty() {
			return Err(AuthError::config("role is required for dynamic authentication"));
		}
		if self.auth_path.is_empty() {
			return Err(AuthError::config("auth path is empty"));
		}
		for (name, url) in [
			("IAM credentials", &self.endpoints.iam_credentials_url),
			("metadata", &self.endpoints.metadata_url),
		] {
			if !url.starts_with("http://") && !url.starts_with("https://") {
				return Err(AuthError::config(format!(
					"{name} endpoint must be an http(s) URL: {url}"
				)));
			}
		}
		Ok(())
	}

	/// HTTP client for Google endpoints.
	///
	/// Idle connections are dropped quickly; signing happens once per login.
	pub fn http_client(&self) -> AuthResult<Client> {
		if let Some(client) = &self.http_client {
			return Ok(client.clone());
		}
		loom_common_http::builder()
			.timeout(GOOGLE_HTTP_TIMEOUT)
			.pool_idle_timeout(GOOGLE_POOL_IDLE_TIMEOUT)
			.build()
			.map_err(|e| AuthError::config(format!("failed to create HTTP client: {e}")))
	}
}

impl fmt::Debug for AuthConfig {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("AuthConfig")
			.field("role", &self.role)
			.field("auth_path", &self.auth_path)
			.field("endpoints", &self.endpoints)
			.field("signing_retry", &self.signing_retry)
			.field("custom_http_client", &self.http_client.is_some())
			.finish()
	}
}

// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Discovery of the Google service account the workload runs as.
//!
//! Credentials come from Application Default Credentials. The principal's
//! email is read from the credentials file when it names one (service
//! account keys), otherwise from the metadata server, which is what
//! workload identity on GKE provides.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use loom_vault_client::SecretToken;
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::OnceCell;
use tracing::{debug, info, instrument, warn};

use crate::config::{GcpEndpoints, CLOUD_PLATFORM_SCOPE};
use crate::error::{AuthError, AuthResult};

const METADATA_FLAVOR_HEADER: &str = "Metadata-Flavor";
const CREDENTIALS_ENV: &str = "GOOGLE_APPLICATION_CREDENTIALS";

/// Source of OAuth access tokens for calling IAM on behalf of an identity.
#[async_trait]
pub trait AccessTokenSource: Send + Sync {
	async fn access_token(&self) -> AuthResult<SecretToken>;
}

/// The principal login assertions are signed as, plus the means to act as it.
#[derive(Clone)]
pub struct ServiceIdentity {
	email: String,
	token_source: Arc<dyn AccessTokenSource>,
}

impl ServiceIdentity {
	pub fn new(email: impl Into<String>, token_source: Arc<dyn AccessTokenSource>) -> Self {
		Self {
			email: email.into(),
			token_source,
		}
	}

	pub fn email(&self) -> &str {
		&self.email
	}

	pub async fn access_token(&self) -> AuthResult<SecretToken> {
		self.token_source.access_token().await
	}
}

impl fmt::Debug for ServiceIdentity {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ServiceIdentity")
			.field("email", &self.email)
			.finish_non_exhaustive()
	}
}

/// Determines which identity the workload signs as.
#[async_trait]
pub trait IdentityResolver: Send + Sync {
	async fn resolve(&self) -> AuthResult<ServiceIdentity>;
}

/// Resolves the ambient Google identity via Application Default Credentials.
///
/// The first successful resolution is cached for the life of the resolver.
pub struct GcpServiceAccountResolver {
	http: Client,
	metadata_url: String,
	credentials_file: Option<PathBuf>,
	cached: OnceCell<ServiceIdentity>,
}

impl GcpServiceAccountResolver {
	pub fn new(http: Client, endpoints: &GcpEndpoints) -> Self {
		Self {
			http,
			metadata_url: endpoints.metadata_url.trim_end_matches('/').to_string(),
			credentials_file: std::env::var_os(CREDENTIALS_ENV).map(PathBuf::from),
			cached: OnceCell::new(),
		}
	}

	/// Override the credentials file normally taken from
	/// `GOOGLE_APPLICATION_CREDENTIALS`.
	pub fn with_credentials_file(mut self, path: Option<PathBuf>) -> Self {
		self.credentials_file = path;
		self
	}

	async fn discover(&self) -> AuthResult<ServiceIdentity> {
		debug!(scope = CLOUD_PLATFORM_SCOPE, "Discovering default Google credentials");
		let provider = gcp_auth::provider()
			.await
			.map_err(|e| AuthError::resolution_with("default credential discovery failed", e))?;

		let email = self
			.service_account_email(self.credentials_file.as_deref())
			.await?;

		info!(email = %email, "Resolved workload service account");
		Ok(ServiceIdentity::new(email, Arc::new(AdcTokenSource { provider })))
	}

	/// The principal named by `credentials_file`, falling back to the
	/// metadata server when there is no file or it names no service account.
	async fn service_account_email(&self, credentials_file: Option<&Path>) -> AuthResult<String> {
		let from_file = match credentials_file {
			Some(path) => read_client_email(path).await?,
			None => None,
		};

		match from_file {
			Some(email) => Ok(email),
			None => {
				debug!("Credentials do not name a service account; asking the metadata server");
				self.metadata_email().await
			}
		}
	}

	/// Email of the instance's default service account, from the metadata server.
	#[instrument(skip(self), fields(metadata_url = %self.metadata_url))]
	pub async fn metadata_email(&self) -> AuthResult<String> {
		let url = format!("{}/instance/service-accounts/default/email", self.metadata_url);
		let response = self
			.http
			.get(&url)
			.header(METADATA_FLAVOR_HEADER, "Google")
			.send()
			.await
			.map_err(|e| AuthError::resolution_with("metadata server unreachable", e))?;

		let status = response.status();
		if !status.is_success() {
			return Err(AuthError::resolution(format!(
				"metadata server returned {status} for the default service account"
			)));
		}

		let body = response
			.text()
			.await
			.map_err(|e| AuthError::resolution_with("failed to read metadata response", e))?;
		let email = body.trim().to_string();

		if email.is_empty() {
			return Err(AuthError::resolution(
				"metadata server returned an empty service account email",
			));
		}
		if !email.contains('@') {
			warn!(
				email = %email,
				"Default service account email is malformed; check that the workload is bound to a Google service account"
			);
		}

		Ok(email)
	}
}

#[async_trait]
impl IdentityResolver for GcpServiceAccountResolver {
	async fn resolve(&self) -> AuthResult<ServiceIdentity> {
		self.cached
			.get_or_try_init(|| self.discover())
			.await
			.cloned()
	}
}

impl fmt::Debug for GcpServiceAccountResolver {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("GcpServiceAccountResolver")
			.field("metadata_url", &self.metadata_url)
			.field("credentials_file", &self.credentials_file)
			.field("resolved", &self.cached.get().map(ServiceIdentity::email))
			.finish()
	}
}

struct AdcTokenSource {
	provider: Arc<dyn gcp_auth::TokenProvider>,
}

#[async_trait]
impl AccessTokenSource for AdcTokenSource {
	async fn access_token(&self) -> AuthResult<SecretToken> {
		let token = self
			.provider
			.token(&[CLOUD_PLATFORM_SCOPE])
			.await
			.map_err(|e| AuthError::resolution_with("failed to obtain access token", e))?;
		Ok(SecretToken::new(token.as_str().to_string()))
	}
}

async fn read_client_email(path: &Path) -> AuthResult<Option<String>> {
	let contents = tokio::fs::read_to_string(path).await.map_err(|e| {
		AuthError::resolution_with(format!("unable to read credentials {}", path.display()), e)
	})?;
	parse_client_email(&contents)
}

/// `client_email` of a credentials JSON document, if it carries a non-empty one.
pub(crate) fn parse_client_email(contents: &str) -> AuthResult<Option<String>> {
	#[derive(Deserialize)]
	struct CredentialsFile {
		#[serde(default)]
		client_email: Option<String>,
	}

	let creds: CredentialsFile = serde_json::from_str(contents)
		.map_err(|e| AuthError::resolution_with("unable to parse credentials", e))?;
	Ok(creds
		.client_email
		.map(|e| e.trim().to_string())
		.filter(|e| !e.is_empty()))
}

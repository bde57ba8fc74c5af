// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Login assertions signed by the IAM Credentials `signJwt` API.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use loom_common_http::{retry, RetryConfig, RetryError};
use loom_vault_client::SecretToken;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, StatusCode, Url};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, instrument, trace};

use crate::clock::{Clock, SystemClock};
use crate::config::{AuthConfig, CLAIM_LIFETIME_SECS};
use crate::error::{AuthError, AuthResult};
use crate::identity::IdentityResolver;

/// Claims of a Vault GCP login assertion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claim {
	pub aud: String,
	pub sub: String,
	pub exp: i64,
}

impl Claim {
	/// Assertion for `role`, signed as `subject`, valid for a minute from `now`.
	pub fn new(role: &str, subject: &str, now: DateTime<Utc>) -> Self {
		Self {
			aud: format!("vault/{role}"),
			sub: subject.to_string(),
			exp: (now + Duration::seconds(CLAIM_LIFETIME_SECS)).timestamp(),
		}
	}
}

/// Produces signed login assertions.
#[async_trait]
pub trait AssertionSigner: Send + Sync {
	async fn sign(&self) -> AuthResult<SecretToken>;
}

#[derive(Serialize)]
struct SignJwtRequest {
	/// The claim set, itself JSON-encoded.
	payload: String,
}

#[derive(Deserialize)]
struct SignJwtResponse {
	#[serde(rename = "signedJwt", default)]
	signed_jwt: Option<String>,
	#[serde(default)]
	error: Option<GoogleApiError>,
}

#[derive(Deserialize)]
struct GoogleApiError {
	#[serde(default)]
	code: Option<u16>,
	#[serde(default)]
	status: Option<String>,
	#[serde(default)]
	message: String,
}

/// Signs assertions as the resolved service account, retrying transient
/// failures with exponential backoff.
pub struct JwtSigner {
	role: String,
	resolver: Arc<dyn IdentityResolver>,
	http: Client,
	iam_credentials_url: String,
	retry: RetryConfig,
	clock: Arc<dyn Clock>,
}

impl JwtSigner {
	pub fn new(config: &AuthConfig, resolver: Arc<dyn IdentityResolver>, http: Client) -> Self {
		Self {
			role: config.role().to_string(),
			resolver,
			http,
			iam_credentials_url: config.endpoints().iam_credentials_url.clone(),
			retry: config.signing_retry().clone(),
			clock: Arc::new(SystemClock),
		}
	}

	pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
		self.clock = clock;
		self
	}

	/// One signing attempt: resolve the identity, build a fresh claim, call signJwt.
	#[instrument(skip(self), fields(role = %self.role))]
	pub async fn sign_once(&self) -> AuthResult<SecretToken> {
		let identity = self.resolver.resolve().await?;
		let claim = Claim::new(&self.role, identity.email(), self.clock.now());
		trace!(?claim, "Built login claim");

		let body = encode_sign_request(&claim)?;
		let url = self.sign_url(identity.email())?;
		let access_token = identity.access_token().await?;

		debug!(url = %url, "Requesting JWT signature");
		let response = self
			.http
			.post(url)
			.bearer_auth(access_token.expose())
			.header(CONTENT_TYPE, "application/json")
			.body(body)
			.send()
			.await?;

		let status = response.status();
		let text = response.text().await?;
		decode_sign_response(status, &text)
	}

	fn sign_url(&self, email: &str) -> AuthResult<Url> {
		let mut url = Url::parse(&self.iam_credentials_url)
			.map_err(|e| AuthError::config(format!("invalid IAM credentials URL: {e}")))?;
		let account = format!("{email}:signJwt");
		url.path_segments_mut()
			.map_err(|_| AuthError::config("IAM credentials URL cannot carry a path"))?
			.pop_if_empty()
			.extend(["projects", "-", "serviceAccounts", account.as_str()]);
		Ok(url)
	}
}

#[async_trait]
impl AssertionSigner for JwtSigner {
	async fn sign(&self) -> AuthResult<SecretToken> {
		retry(&self.retry, || self.sign_once())
			.await
			.map_err(|e| match e {
				RetryError::Exhausted { attempts, last } => {
					error!(attempts, error = %last, "JWT signing retries exhausted");
					AuthError::RetryExhausted {
						attempts,
						source: Box::new(last),
					}
				}
				RetryError::Permanent(err) => {
					error!(error = %err, "JWT signing failed");
					err
				}
			})
	}
}

impl std::fmt::Debug for JwtSigner {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("JwtSigner")
			.field("role", &self.role)
			.field("iam_credentials_url", &self.iam_credentials_url)
			.field("retry", &self.retry)
			.finish_non_exhaustive()
	}
}

fn encode_sign_request(claim: &Claim) -> AuthResult<String> {
	let payload = serde_json::to_string(claim)
		.map_err(|e| AuthError::signing(format!("unable to encode claim: {e}")))?;
	serde_json::to_string(&SignJwtRequest { payload })
		.map_err(|e| AuthError::signing(format!("unable to encode sign request: {e}")))
}

fn decode_sign_response(status: StatusCode, body: &str) -> AuthResult<SecretToken> {
	let http_code = (!status.is_success()).then(|| status.as_u16());

	let parsed: SignJwtResponse = serde_json::from_str(body).map_err(|e| AuthError::Signing {
		code: http_code,
		status: None,
		message: format!("unparsable signJwt response ({status}): {e}"),
	})?;

	if let Some(err) = parsed.error {
		return Err(AuthError::Signing {
			code: err.code.or(http_code),
			status: err.status,
			message: err.message,
		});
	}

	if let Some(code) = http_code {
		return Err(AuthError::Signing {
			code: Some(code),
			status: None,
			message: format!("signJwt returned {status}"),
		});
	}

	match parsed.signed_jwt {
		Some(jwt) if !jwt.is_empty() => Ok(SecretToken::new(jwt)),
		_ => Err(AuthError::signing("signJwt response carried no signedJwt")),
	}
}

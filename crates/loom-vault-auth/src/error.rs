// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Error types for workload authentication.

use loom_common_http::{is_retryable_status, RetryableError};
use loom_vault_client::VaultError;
use reqwest::StatusCode;
use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors raised while obtaining or managing a Vault token.
#[derive(Debug, Error)]
pub enum AuthError {
	/// The workload's signing identity could not be determined.
	#[error("cannot resolve signing identity: {message}")]
	Resolution {
		message: String,
		#[source]
		source: Option<BoxError>,
	},

	/// The IAM signJwt call was rejected or answered with something unusable.
	#[error("JWT signing failed: {message}")]
	Signing {
		code: Option<u16>,
		status: Option<String>,
		message: String,
	},

	/// Signing kept failing until the retry cap was reached.
	#[error("JWT signing gave up after {attempts} attempts")]
	RetryExhausted {
		attempts: u32,
		#[source]
		source: Box<AuthError>,
	},

	/// Vault rejected the assertion or returned an unusable login response.
	#[error("vault login failed: {message}")]
	Login {
		message: String,
		#[source]
		source: Option<VaultError>,
	},

	#[error("token refresh failed: {message}")]
	Refresh {
		message: String,
		#[source]
		source: Option<VaultError>,
	},

	#[error("token revocation failed: {message}")]
	Revoke {
		message: String,
		#[source]
		source: Option<VaultError>,
	},

	#[error("token lookup failed: {message}")]
	Lookup {
		message: String,
		#[source]
		source: Option<VaultError>,
	},

	#[error("configuration error: {message}")]
	Config {
		message: String,
		#[source]
		source: Option<VaultError>,
	},

	/// Transport failure talking to Google endpoints.
	#[error("HTTP error: {0}")]
	Http(#[from] reqwest::Error),
}

/// Result type for authentication operations.
pub type AuthResult<T> = Result<T, AuthError>;

impl AuthError {
	pub(crate) fn resolution(message: impl Into<String>) -> Self {
		AuthError::Resolution {
			message: message.into(),
			source: None,
		}
	}

	pub(crate) fn resolution_with(message: impl Into<String>, source: impl Into<BoxError>) -> Self {
		AuthError::Resolution {
			message: message.into(),
			source: Some(source.into()),
		}
	}

	pub(crate) fn signing(message: impl Into<String>) -> Self {
		AuthError::Signing {
			code: None,
			status: None,
			message: message.into(),
		}
	}

	pub(crate) fn login(message: impl Into<String>, source: Option<VaultError>) -> Self {
		AuthError::Login {
			message: message.into(),
			source,
		}
	}

	pub(crate) fn refresh(message: impl Into<String>, source: Option<VaultError>) -> Self {
		AuthError::Refresh {
			message: message.into(),
			source,
		}
	}

	pub(crate) fn revoke(message: impl Into<String>, source: Option<VaultError>) -> Self {
		AuthError::Revoke {
			message: message.into(),
			source,
		}
	}

	pub(crate) fn lookup(message: impl Into<String>, source: Option<VaultError>) -> Self {
		AuthError::Lookup {
			message: message.into(),
			source,
		}
	}

	pub(crate) fn config(message: impl Into<String>) -> Self {
		AuthError::Config {
			message: message.into(),
			source: None,
		}
	}

	/// True when the failure points at a misconfigured workload identity
	/// rather than a transient condition. Such failures need an operator;
	/// everything else means "no usable credential this call".
	pub fn requires_operator(&self) -> bool {
		match self {
			AuthError::Resolution { .. } | AuthError::Config { .. } => true,
			AuthError::RetryExhausted { source, .. } => source.requires_operator(),
			_ => false,
		}
	}
}

impl RetryableError for AuthError {
	fn is_retryable(&self) -> bool {
		match self {
			AuthError::Http(e) => e.is_retryable(),
			// Metadata server and ADC discovery are commonly slow right after
			// pod start.
			AuthError::Resolution { .. } => true,
			AuthError::Signing { code: None, .. } => true,
			AuthError::Signing {
				code: Some(code), ..
			} => StatusCode::from_u16(*code)
				.map(is_retryable_status)
				.unwrap_or(false),
			_ => false,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn signing_errors_retry_only_on_transient_codes() {
		let unavailable = AuthError::Signing {
			code: Some(503),
			status: Some("UNAVAILABLE".into()),
			message: "backend unavailable".into(),
		};
		let denied = AuthError::Signing {
			code: Some(403),
			status: Some("PERMISSION_DENIED".into()),
			message: "iam.serviceAccounts.signJwt denied".into(),
		};
		let malformed = AuthError::signing("missing signedJwt");

		assert!(unavailable.is_retryable());
		assert!(!denied.is_retryable());
		assert!(malformed.is_retryable());
	}

	#[test]
	fn vault_errors_are_never_retried() {
		assert!(!AuthError::login("rejected", None).is_retryable());
		assert!(!AuthError::refresh("no token", None).is_retryable());
		assert!(!AuthError::config("bad").is_retryable());
	}

	#[test]
	fn operator_errors_are_found_through_retry_exhaustion() {
		let exhausted = AuthError::RetryExhausted {
			attempts: 6,
			source: Box::new(AuthError::resolution("metadata server returned 404")),
		};
		assert!(exhausted.requires_operator());
		assert!(!AuthError::login("rejected", None).requires_operator());
	}

	#[test]
	fn exhaustion_preserves_cause_chain() {
		let exhausted = AuthError::RetryExhausted {
			attempts: 3,
			source: Box::new(AuthError::signing("missing signedJwt")),
		};
		let source = std::error::Error::source(&exhausted).unwrap();
		assert_eq!(source.to_string(), "JWT signing failed: missing signedJwt");
	}
}

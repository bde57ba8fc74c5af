// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Error types for the Vault client.

use std::path::PathBuf;

use reqwest::StatusCode;
use thiserror::Error;

/// Errors that can occur when talking to Vault.
#[derive(Debug, Error)]
pub enum VaultError {
	/// The request never produced an HTTP response (connect, timeout, TLS).
	#[error("HTTP error: {0}")]
	Http(#[from] reqwest::Error),

	/// Vault answered with a non-success status.
	#[error("vault returned {status}: {}", .errors.join("; "))]
	Api {
		status: StatusCode,
		errors: Vec<String>,
	},

	/// Vault answered successfully but the body was not what we expected.
	#[error("invalid response: {0}")]
	InvalidResponse(String),

	/// Client configuration is unusable.
	#[error("configuration error: {0}")]
	Configuration(String),

	/// Failed to read a CA certificate from disk.
	#[error("failed to read {path}: {source}")]
	Io {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},
}

impl VaultError {
	/// The HTTP status Vault answered with, if the request got that far.
	pub fn status(&self) -> Option<StatusCode> {
		match self {
			VaultError::Api { status, .. } => Some(*status),
			VaultError::Http(e) => e.status(),
			_ => None,
		}
	}

	/// True when the failure happened before Vault could judge the request.
	pub fn is_transport(&self) -> bool {
		matches!(self, VaultError::Http(_))
	}
}

/// Result type for Vault client operations.
pub type VaultResult<T> = Result<T, VaultError>;

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn api_error_joins_messages() {
		let err = VaultError::Api {
			status: StatusCode::FORBIDDEN,
			errors: vec!["permission denied".to_string(), "bad token".to_string()],
		};
		assert_eq!(
			err.to_string(),
			"vault returned 403 Forbidden: permission denied; bad token"
		);
		assert_eq!(err.status(), Some(StatusCode::FORBIDDEN));
		assert!(!err.is_transport());
	}
}

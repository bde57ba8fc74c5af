// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Environment helpers for the Vault token.
//!
//! The token is never accepted as a command-line flag. It comes from
//! `VAULT_TOKEN`, or from the file named by `VAULT_TOKEN_FILE` (Kubernetes
//! and Docker secret mounts), the file taking precedence.

use std::path::PathBuf;
use std::{env, fs};

use loom_vault_client::SecretToken;
use thiserror::Error;

pub const TOKEN_ENV: &str = "VAULT_TOKEN";

#[derive(Debug, Error)]
pub enum SecretEnvError {
	#[error("failed to read secret file at {path}: {source}")]
	Io {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("secret file path in {var} is empty")]
	EmptyPath { var: String },
}

/// Load `var` from the process environment, honouring `{var}_FILE`.
pub fn load_secret_env(var: &str) -> Result<Option<SecretToken>, SecretEnvError> {
	load_secret_with(var, |name| env::var(name).ok())
}

/// Like [`load_secret_env`] but reading variables through `lookup`.
///
/// A single trailing newline is stripped from file contents. Empty values
/// count as unset.
pub fn load_secret_with(
	var: &str,
	lookup: impl Fn(&str) -> Option<String>,
) -> Result<Option<SecretToken>, SecretEnvError> {
	let file_var = format!("{var}_FILE");

	if let Some(path_str) = lookup(&file_var) {
		if path_str.is_empty() {
			return Err(SecretEnvError::EmptyPath { var: file_var });
		}

		let path = PathBuf::from(&path_str);
		let content = fs::read_to_string(&path).map_err(|e| SecretEnvError::Io {
			path: path.clone(),
			source: e,
		})?;

		let secret = content.strip_suffix('\n').unwrap_or(&content).to_string();
		return Ok(non_empty(secret));
	}

	Ok(lookup(var).and_then(non_empty))
}

fn non_empty(value: String) -> Option<SecretToken> {
	(!value.is_empty()).then(|| SecretToken::new(value))
}

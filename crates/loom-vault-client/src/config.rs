// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Client configuration and CA certificate loading.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::Certificate;
use tracing::debug;

use crate::error::{VaultError, VaultResult};

/// Request timeout used when none is configured.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Configuration for [`crate::VaultClient`].
///
/// `ca_cert` (a PEM file) and `ca_path` (a directory of PEM files) are
/// mutually exclusive.
#[derive(Debug, Clone)]
pub struct VaultClientConfig {
	pub address: String,
	pub ca_cert: Option<PathBuf>,
	pub ca_path: Option<PathBuf>,
	pub timeout: Duration,
}

impl VaultClientConfig {
	pub fn new(address: impl Into<String>) -> Self {
		Self {
			address: address.into(),
			ca_cert: None,
			ca_path: None,
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

	pub fn with_timeout(mut self, timeout: Duration) -> Self {
		self.timeout = timeout;
		self
	}

	pub(crate) fn validate(&self) -> VaultResult<()> {
		if self.address.trim().is_empty() {
			return Err(VaultError::Configuration("vault address is empty".into()));
		}
		if !self.address.starts_with("http://") && !self.address.starts_with("https://") {
			return Err(VaultError::Configuration(format!(
				"vault address must be an http(s) URL, got {:?}",
				self.address
			)));
		}
		if self.ca_cert.is_some() && self.ca_path.is_some() {
			return Err(VaultError::Configuration(
				"specify either a CA certificate file or a CA directory, not both".into(),
			));
		}
		Ok(())
	}

	/// Root certificates to trust in addition to the platform roots.
	pub(crate) fn root_certificates(&self) -> VaultResult<Vec<Certificate>> {
		match (&self.ca_cert, &self.ca_path) {
			(Some(file), None) => {
				let certs = load_pem_file(file)?;
				if certs.is_empty() {
					return Err(VaultError::Configuration(format!(
						"no PEM certificates found in {}",
						file.display()
					)));
				}
				Ok(certs)
			}
			(None, Some(dir)) => load_pem_dir(dir),
			(None, None) => Ok(Vec::new()),
			(Some(_), Some(_)) => Err(VaultError::Configuration(
				"specify either a CA certificate file or a CA directory, not both".into(),
			)),
		}
	}
}

fn read_file(path: &Path) -> VaultResult<String> {
	fs::read_to_string(path).map_err(|source| VaultError::Io {
		path: path.to_path_buf(),
		source,
	})
}

fn load_pem_file(path: &Path) -> VaultResult<Vec<Certificate>> {
	let contents = read_file(path)?;
	let certs = Certificate::from_pem_bundle(contents.as_bytes()).map_err(|e| {
		VaultError::Configuration(format!("invalid certificate in {}: {e}", path.display()))
	})?;
	debug!(path = %path.display(), count = certs.len(), "Loaded CA certificates");
	Ok(certs)
}

fn load_pem_dir(dir: &Path) -> VaultResult<Vec<Certificate>> {
	let entries = fs::read_dir(dir).map_err(|source| VaultError::Io {
		path: dir.to_path_buf(),
		source,
	})?;

	let mut files: Vec<PathBuf> = entries
		.filter_map(Result::ok)
		.map(|e| e.path())
		.filter(|p| p.is_file())
		.collect();
	files.sort();

	let mut certs = Vec::new();
	for file in files {
		certs.extend(load_pem_file(&file)?);
	}

	if certs.is_empty() {
		return Err(VaultError::Configuration(format!(
			"no PEM certificates found in {}",
			dir.display()
		)));
	}
	Ok(certs)
}

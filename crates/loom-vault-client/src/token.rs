// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Redacting wrapper for bearer credentials.
//!
//! Vault client tokens, Google access tokens and signed JWT assertions all
//! pass through [`SecretToken`]. The wrapper:
//!
//! - prints `[REDACTED]` for both `Debug` and `Display`, so `tracing` fields
//!   like `token = %token` never leak the value
//! - zeroizes its buffer on drop
//! - requires an explicit `.expose()` to read the value

use std::fmt;

use serde::{Deserialize, Deserializer};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Placeholder printed instead of a token value.
pub const REDACTED: &str = "[REDACTED]";

#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SecretToken {
	inner: String,
}

impl SecretToken {
	pub fn new(inner: String) -> Self {
		Self { inner }
	}

	/// Access the raw token. Keep call sites few and obvious.
	pub fn expose(&self) -> &str {
		&self.inner
	}

	pub fn is_empty(&self) -> bool {
		self.inner.is_empty()
	}
}

impl Clone for SecretToken {
	fn clone(&self) -> Self {
		Self::new(self.inner.clone())
	}
}

impl PartialEq for SecretToken {
	fn eq(&self, other: &Self) -> bool {
		self.inner == other.inner
	}
}

impl Eq for SecretToken {}

impl fmt::Debug for SecretToken {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_tuple("SecretToken").field(&REDACTED).finish()
	}
}

impl fmt::Display for SecretToken {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(REDACTED)
	}
}

impl From<String> for SecretToken {
	fn from(inner: String) -> Self {
		Self::new(inner)
	}
}

impl<'de> Deserialize<'de> for SecretToken {
	fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
	where
		D: Deserializer<'de>,
	{
		String::deserialize(deserializer).map(SecretToken::new)
	}
}

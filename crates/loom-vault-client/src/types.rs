// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Wire types for Vault responses.

use std::collections::HashMap;
use std::time::Duration;

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::{VaultError, VaultResult};
use crate::token::SecretToken;

/// The envelope Vault wraps around every logical and auth response.
#[derive(Debug, Clone, Deserialize)]
pub struct VaultSecret {
	#[serde(default)]
	pub request_id: String,
	#[serde(default)]
	pub lease_id: String,
	#[serde(default)]
	pub lease_duration: u64,
	#[serde(default)]
	pub renewable: bool,
	#[serde(default)]
	pub data: Option<Map<String, Value>>,
	#[serde(default)]
	pub warnings: Option<Vec<String>>,
	#[serde(default)]
	pub auth: Option<SecretAuth>,
}

/// Token material returned by login and renew-self.
#[derive(Debug, Clone, Deserialize)]
pub struct SecretAuth {
	pub client_token: SecretToken,
	#[serde(default)]
	pub accessor: String,
	#[serde(default)]
	pub policies: Option<Vec<String>>,
	#[serde(default)]
	pub token_policies: Option<Vec<String>>,
	#[serde(default)]
	pub metadata: Option<HashMap<String, String>>,
	#[serde(default)]
	pub lease_duration: u64,
	#[serde(default)]
	pub renewable: bool,
}

/// Error body Vault sends with non-2xx statuses.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct ErrorResponse {
	#[serde(default)]
	pub errors: Vec<String>,
}

impl VaultSecret {
	/// TTL of the token carried by (or described by) this response.
	///
	/// Login and renew responses report it as `auth.lease_duration`; a
	/// lookup-self response reports it as `data.ttl`. A response with
	/// neither yields zero.
	pub fn token_ttl(&self) -> VaultResult<Duration> {
		if let Some(auth) = &self.auth {
			if auth.lease_duration > 0 {
				return Ok(Duration::from_secs(auth.lease_duration));
			}
		}

		match self.data.as_ref().and_then(|d| d.get("ttl")) {
			None | Some(Value::Null) => Ok(Duration::ZERO),
			Some(Value::Number(n)) => n
				.as_u64()
				.or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64))
				.map(Duration::from_secs)
				.ok_or_else(|| VaultError::InvalidResponse(format!("negative token ttl: {n}"))),
			Some(Value::String(s)) => parse_duration_seconds(s),
			Some(other) => Err(VaultError::InvalidResponse(format!(
				"unexpected token ttl value: {other}"
			))),
		}
	}

	/// The client token from `auth`, if this response issued one.
	pub fn client_token(&self) -> Option<&SecretToken> {
		self.auth.as_ref().map(|a| &a.client_token)
	}
}

impl SecretAuth {
	/// Effective policies, preferring `token_policies` as newer servers do.
	pub fn effective_policies(&self) -> Vec<String> {
		self.token_policies
			.clone()
			.filter(|p| !p.is_empty())
			.or_else(|| self.policies.clone())
			.unwrap_or_default()
	}
}

/// Parses Vault's "duration second" encoding: bare seconds or a single
/// integer with an `s`, `m`, `h` or `d` suffix.
fn parse_duration_seconds(raw: &str) -> VaultResult<Duration> {
	let raw = raw.trim();
	if raw.is_empty() {
		return Ok(Duration::ZERO);
	}

	let invalid = || VaultError::InvalidResponse(format!("unparsable token ttl: {raw:?}"));

	if let Ok(secs) = raw.parse::<u64>() {
		return Ok(Duration::from_secs(secs));
	}

	let (unit_start, _) = raw.char_indices().last().ok_or_else(invalid)?;
	let (digits, unit) = raw.split_at(unit_start);
	let value: u64 = digits.parse().map_err(|_| invalid())?;
	let multiplier = match unit {
		"s" => 1,
		"m" => 60,
		"h" => 60 * 60,
		"d" => 24 * 60 * 60,
		_ => return Err(invalid()),
	};

	value
		.checked_mul(multiplier)
		.map(Duration::from_secs)
		.ok_or_else(invalid)
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	fn secret(value: Value) -> VaultSecret {
		serde_json::from_value(value).unwrap()
	}

	#[test]
	fn login_response_ttl_comes_from_auth() {
		let s = secret(json!({
			"request_id": "7c1b",
			"lease_id": "",
			"renewable": false,
			"lease_duration": 0,
			"data": null,
			"warnings": null,
			"auth": {
				"client_token": "hvs.login",
				"accessor": "acc-1",
				"policies": ["default", "app"],
				"token_policies": ["default", "app"],
				"metadata": {"role": "app"},
				"lease_duration": 2764800,
				"renewable": true
			}
		}));

		assert_eq!(s.token_ttl().unwrap(), Duration::from_secs(2_764_800));
		assert_eq!(s.client_token().unwrap().expose(), "hvs.login");
		assert_eq!(
			s.auth.unwrap().effective_policies(),
			vec!["default".to_string(), "app".to_string()]
		);
	}

	#[test]
	fn lookup_response_ttl_comes_from_data() {
		let s = secret(json!({"data": {"ttl": 3599, "accessor": "acc-1"}}));
		assert_eq!(s.token_ttl().unwrap(), Duration::from_secs(3599));
		assert!(s.client_token().is_none());
	}

	#[test]
	fn string_ttls_are_parsed() {
		let s = secret(json!({"data": {"ttl": "90"}}));
		assert_eq!(s.token_ttl().unwrap(), Duration::from_secs(90));

		let s = secret(json!({"data": {"ttl": "2h"}}));
		assert_eq!(s.token_ttl().unwrap(), Duration::from_secs(7200));
	}

	#[test]
	fn unparsable_ttl_is_an_error() {
		let s = secret(json!({"data": {"ttl": "soon"}}));
		assert!(matches!(
			s.token_ttl(),
			Err(VaultError::InvalidResponse(_))
		));

		let s = secret(json!({"data": {"ttl": [1]}}));
		assert!(s.token_ttl().is_err());
	}

	#[test]
	fn missing_ttl_is_zero() {
		let s = secret(json!({"data": {}}));
		assert_eq!(s.token_ttl().unwrap(), Duration::ZERO);
	}

	#[test]
	fn null_policies_are_tolerated() {
		let s = secret(json!({
			"auth": {"client_token": "t", "policies": null, "token_policies": null}
		}));
		assert!(s.auth.unwrap().effective_policies().is_empty());
	}
}

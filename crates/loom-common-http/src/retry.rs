// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Bounded retry with exponential backoff.
//!
//! [`retry`] runs an operation, classifies each failure through
//! [`RetryableError`], sleeps on an exponential schedule between attempts and
//! stops after `max_retries` retries. The caller learns whether the loop gave
//! up because the cap was hit ([`RetryError::Exhausted`]) or because the
//! error was not worth retrying ([`RetryError::Permanent`]).

use std::fmt;
use std::time::Duration;

use reqwest::StatusCode;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct RetryConfig {
	/// Retries after the first attempt. Zero means a single attempt.
	pub max_retries: u32,
	pub base_delay: Duration,
	pub max_delay: Duration,
	pub backoff_factor: f64,
	pub jitter: bool,
}

impl Default for RetryConfig {
	fn default() -> Self {
		Self {
			max_retries: 5,
			base_delay: Duration::from_millis(500),
			max_delay: Duration::from_secs(60),
			backoff_factor: 1.5,
			jitter: true,
		}
	}
}

impl RetryConfig {
	/// Total number of attempts the combinator will make before giving up.
	pub fn max_attempts(&self) -> u32 {
		self.max_retries.saturating_add(1)
	}
}

pub trait RetryableError {
	fn is_retryable(&self) -> bool;
}

/// Statuses that indicate a transient server-side condition.
pub fn is_retryable_status(status: StatusCode) -> bool {
	matches!(
		status,
		StatusCode::TOO_MANY_REQUESTS
			| StatusCode::REQUEST_TIMEOUT
			| StatusCode::INTERNAL_SERVER_ERROR
			| StatusCode::BAD_GATEWAY
			| StatusCode::SERVICE_UNAVAILABLE
			| StatusCode::GATEWAY_TIMEOUT
	)
}

impl RetryableError for reqwest::Error {
	fn is_retryable(&self) -> bool {
		if self.is_timeout() || self.is_connect() {
			return true;
		}

		self.status().is_some_and(is_retryable_status)
	}
}

/// Why [`retry`] stopped without a result.
#[derive(Debug)]
pub enum RetryError<E> {
	/// Every permitted attempt failed with a retryable error.
	Exhausted { attempts: u32, last: E },
	/// The operation failed with an error classified as not retryable.
	Permanent(E),
}

impl<E> RetryError<E> {
	/// The error returned by the final attempt.
	pub fn into_inner(self) -> E {
		match self {
			RetryError::Exhausted { last, .. } => last,
			RetryError::Permanent(err) => err,
		}
	}

	pub fn attempts(&self) -> Option<u32> {
		match self {
			RetryError::Exhausted { attempts, .. } => Some(*attempts),
			RetryError::Permanent(_) => None,
		}
	}
}

impl<E: fmt::Display> fmt::Display for RetryError<E> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			RetryError::Exhausted { attempts, last } => {
				write!(f, "gave up after {attempts} attempts: {last}")
			}
			RetryError::Permanent(err) => write!(f, "{err}"),
		}
	}
}

impl<E> std::error::Error for RetryError<E>
where
	E: std::error::Error + 'static,
{
	fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
		match self {
			RetryError::Exhausted { last, .. } => Some(last),
			RetryError::Permanent(err) => Some(err),
		}
	}
}

fn calculate_delay(cfg: &RetryConfig, retry_index: u32) -> Duration {
	let exponent = i32::try_from(retry_index).unwrap_or(i32::MAX);
	let exponential_delay = cfg.base_delay.as_secs_f64() * cfg.backoff_factor.powi(exponent);
	// from_secs_f64 panics on negative or NaN input.
	let capped_delay = exponential_delay.min(cfg.max_delay.as_secs_f64()).max(0.0);

	let final_delay = if cfg.jitter {
		let jitter_factor = 0.5 + fastrand::f64();
		capped_delay * jitter_factor
	} else {
		capped_delay
	};

	Duration::from_secs_f64(final_delay)
}

/// Run `f` until it succeeds, fails permanently, or the retry cap is hit.
///
/// `f` is invoked afresh for every attempt, so per-attempt state (request
/// bodies, timestamps) must be built inside the closure.
pub async fn retry<F, Fut, T, E>(cfg: &RetryConfig, mut f: F) -> Result<T, RetryError<E>>
where
	F: FnMut() -> Fut,
	Fut: std::future::Future<Output = Result<T, E>>,
	E: RetryableError + fmt::Debug,
{
	let mut attempt: u32 = 0;

	loop {
		match f().await {
			Ok(result) => return Ok(result),
			Err(err) => {
				attempt += 1;

				if !err.is_retryable() {
					warn!(
							error = ?err,
							attempt = attempt,
							"non-retryable error encountered"
					);
					return Err(RetryError::Permanent(err));
				}

				if attempt >= cfg.max_attempts() {
					warn!(
							error = ?err,
							attempt = attempt,
							max_retries = cfg.max_retries,
							"max retries exhausted"
					);
					return Err(RetryError::Exhausted {
						attempts: attempt,
						last: err,
					});
				}

				let delay = calculate_delay(cfg, attempt - 1);
				warn!(
						error = ?err,
						attempt = attempt,
						max_retries = cfg.max_retries,
						delay_ms = delay.as_millis(),
						"retrying after error"
				);

				tokio::time::sleep(delay).await;
			}
		}
	}
}

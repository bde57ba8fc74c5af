// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! JWT signing against a mock IAM Credentials API.

mod support;

use std::sync::Arc;

use loom_vault_auth::{AssertionSigner, AuthConfig, AuthError, Claim, GcpEndpoints, JwtSigner, ManualClock};
use serde_json::{json, Value};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

use support::{at, fast_retry, FixedIdentity, ACCESS_TOKEN, SERVICE_ACCOUNT};

const SIGN_PATH: &str =
	"/v1/projects/-/serviceAccounts/vault-reader@acme-prod.iam.gserviceaccount.com:signJwt";

/// Answers signJwt by returning the submitted payload as the "signed" JWT.
struct EchoPayload;

impl Respond for EchoPayload {
	fn respond(&self, request: &Request) -> ResponseTemplate {
		let body: Value = serde_json::from_slice(&request.body).unwrap();
		let payload = body["payload"].as_str().unwrap().to_string();
		ResponseTemplate::new(200).set_body_json(json!({"keyId": "k1", "signedJwt": payload}))
	}
}

fn unavailable() -> ResponseTemplate {
	ResponseTemplate::new(503).set_body_json(json!({
		"error": {"code": 503, "status": "UNAVAILABLE", "message": "The service is currently unavailable."}
	}))
}

fn config_for(server: &MockServer, max_retries: u32) -> AuthConfig {
	AuthConfig::new("billing")
		.with_endpoints(GcpEndpoints {
			iam_credentials_url: format!("{}/v1", server.uri()),
			..GcpEndpoints::default()
		})
		.with_signing_retry(fast_retry(max_retries))
}

fn signer_for(server: &MockServer, max_retries: u32, identity: FixedIdentity) -> JwtSigner {
	JwtSigner::new(
		&config_for(server, max_retries),
		Arc::new(identity),
		reqwest::Client::new(),
	)
}

fn submitted_claims(requests: &[Request]) -> Vec<Claim> {
	requests
		.iter()
		.map(|r| {
			let body: Value = serde_json::from_slice(&r.body).unwrap();
			serde_json::from_str(body["payload"].as_str().unwrap()).unwrap()
		})
		.collect()
}

#[tokio::test]
async fn signed_claim_names_role_and_service_account() {
	let server = MockServer::start().await;
	Mock::given(method("POST"))
		.and(path(SIGN_PATH))
		.and(header("Authorization", format!("Bearer {ACCESS_TOKEN}").as_str()))
		.respond_with(EchoPayload)
		.expect(1)
		.mount(&server)
		.await;

	let clock = ManualClock::new(at(1_700_000_000));
	let signer = signer_for(&server, 0, FixedIdentity::new(SERVICE_ACCOUNT))
		.with_clock(Arc::new(clock.clone()));

	let jwt = signer.sign().await.unwrap();
	let claim: Claim = serde_json::from_str(jwt.expose()).unwrap();

	assert_eq!(claim.aud, "vault/billing");
	assert_eq!(claim.sub, SERVICE_ACCOUNT);
	assert_eq!(claim.exp, 1_700_000_060);
}

#[tokio::test]
async fn recovers_when_transient_failures_fit_in_retry_cap() {
	let server = MockServer::start().await;
	Mock::given(method("POST"))
		.and(path(SIGN_PATH))
		.respond_with(unavailable())
		.up_to_n_times(3)
		.mount(&server)
		.await;
	Mock::given(method("POST"))
		.and(path(SIGN_PATH))
		.respond_with(EchoPayload)
		.mount(&server)
		.await;

	let signer = signer_for(&server, 5, FixedIdentity::new(SERVICE_ACCOUNT));
	let jwt = signer.sign().await.unwrap();

	let claim: Claim = serde_json::from_str(jwt.expose()).unwrap();
	assert_eq!(claim.sub, SERVICE_ACCOUNT);
	assert_eq!(server.received_requests().await.unwrap().len(), 4);
}

#[tokio::test]
async fn gives_up_after_retry_cap() {
	let server = MockServer::start().await;
	Mock::given(method("POST"))
		.and(path(SIGN_PATH))
		.respond_with(unavailable())
		.expect(3)
		.mount(&server)
		.await;

	let signer = signer_for(&server, 2, FixedIdentity::new(SERVICE_ACCOUNT));
	let err = signer.sign().await.unwrap_err();

	match err {
		AuthError::RetryExhausted { attempts, source } => {
			assert_eq!(attempts, 3);
			assert!(matches!(*source, AuthError::Signing { code: Some(503), .. }));
		}
		other => panic!("unexpected error: {other:?}"),
	}
}

#[tokio::test]
async fn permission_denied_is_not_retried() {
	let server = MockServer::start().await;
	Mock::given(method("POST"))
		.and(path(SIGN_PATH))
		.respond_with(ResponseTemplate::new(403).set_body_json(json!({
			"error": {
				"code": 403,
				"status": "PERMISSION_DENIED",
				"message": "Permission 'iam.serviceAccounts.signJwt' denied"
			}
		})))
		.expect(1)
		.mount(&server)
		.await;

	let signer = signer_for(&server, 5, FixedIdentity::new(SERVICE_ACCOUNT));
	let err = signer.sign().await.unwrap_err();

	assert!(matches!(
		err,
		AuthError::Signing { code: Some(403), ref status, .. } if status.as_deref() == Some("PERMISSION_DENIED")
	));
}

#[tokio::test]
async fn every_attempt_builds_a_fresh_claim() {
	let server = MockServer::start().await;
	Mock::given(method("POST"))
		.and(path(SIGN_PATH))
		.respond_with(unavailable())
		.up_to_n_times(1)
		.mount(&server)
		.await;
	Mock::given(method("POST"))
		.and(path(SIGN_PATH))
		.respond_with(EchoPayload)
		.mount(&server)
		.await;

	let clock = ManualClock::new(at(1_700_000_000));
	let identity = FixedIdentity::new(SERVICE_ACCOUNT).advancing(clock.clone(), chrono::Duration::seconds(10));
	let signer = signer_for(&server, 5, identity).with_clock(Arc::new(clock));

	signer.sign().await.unwrap();

	let requests = server.received_requests().await.unwrap();
	let exps: Vec<i64> = submitted_claims(&requests).iter().map(|c| c.exp).collect();
	assert_eq!(exps, vec![1_700_000_070, 1_700_000_080]);
}

#[tokio::test]
async fn response_without_signed_jwt_is_signing_error() {
	let server = MockServer::start().await;
	Mock::given(method("POST"))
		.and(path(SIGN_PATH))
		.respond_with(ResponseTemplate::new(200).set_body_json(json!({"keyId": "k1"})))
		.expect(1)
		.mount(&server)
		.await;

	let signer = signer_for(&server, 0, FixedIdentity::new(SERVICE_ACCOUNT));
	let err = signer.sign_once().await.unwrap_err();
	assert!(matches!(err, AuthError::Signing { code: None, .. }));
}

#[tokio::test]
async fn unreachable_iam_exhausts_retries() {
	let config = AuthConfig::new("billing")
		.with_endpoints(GcpEndpoints {
			iam_credentials_url: "http://127.0.0.1:1/v1".to_string(),
			..GcpEndpoints::default()
		})
		.with_signing_retry(fast_retry(1));
	let signer = JwtSigner::new(
		&config,
		Arc::new(FixedIdentity::new(SERVICE_ACCOUNT)),
		reqwest::Client::new(),
	);

	match signer.sign().await.unwrap_err() {
		AuthError::RetryExhausted { attempts, source } => {
			assert_eq!(attempts, 2);
			assert!(matches!(*source, AuthError::Http(_)));
		}
		other => panic!("unexpected error: {other:?}"),
	}
}

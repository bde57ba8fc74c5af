// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! `loom-vault`: talk to Vault as the workload's Google service account.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use loom_vault_auth::{ClientConnection, ConnectionOptions, GcpAuth, DEFAULT_AUTH_PATH};
use loom_vault_client::{SecretToken, VaultClient};
use serde_json::{json, Value};
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod config;

/// Vault client that logs in with Google workload identity.
#[derive(Parser, Debug)]
#[command(name = "loom-vault", version, about, long_about = None)]
struct Args {
	/// Vault server address
	#[arg(long, env = "VAULT_ADDR")]
	address: String,

	/// PEM file of CA certificates to trust
	#[arg(long, env = "VAULT_CACERT", conflicts_with = "ca_path")]
	ca_cert: Option<PathBuf>,

	/// Directory of PEM CA certificates to trust
	#[arg(long, env = "VAULT_CAPATH")]
	ca_path: Option<PathBuf>,

	/// Vault role to log in as (ignored when VAULT_TOKEN is set)
	#[arg(long, env = "VAULT_ROLE", default_value = "")]
	role: String,

	/// Mount path of the GCP auth method
	#[arg(long, env = "VAULT_AUTH_PATH", default_value = DEFAULT_AUTH_PATH)]
	auth_path: String,

	/// Request timeout in seconds
	#[arg(long, env = "LOOM_VAULT_TIMEOUT_SECS", default_value_t = 60)]
	timeout_secs: u64,

	/// Output logs as JSON
	#[arg(long)]
	log_json: bool,

	#[command(subcommand)]
	command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
	/// Print a usable Vault token
	Token,

	/// Read a secret and print its data as JSON
	Read {
		/// Logical path, e.g. secret/data/app
		path: String,
	},

	/// Log in and report the token's state
	Status {
		/// Renew the token, asking for this many seconds
		#[arg(long, value_name = "SECS")]
		renew: Option<u64>,

		/// Revoke the token afterwards
		#[arg(long)]
		revoke: bool,
	},
}

fn init_tracing(json_logs: bool) {
	let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

	if json_logs {
		tracing_subscriber::registry()
			.with(filter)
			.with(fmt::layer().json().with_writer(std::io::stderr))
			.init();
	} else {
		tracing_subscriber::registry()
			.with(filter)
			.with(fmt::layer().compact().with_writer(std::io::stderr))
			.init();
	}
}

fn connect(args: &Args, static_token: Option<SecretToken>) -> Result<ClientConnection> {
	let mut options = ConnectionOptions::new(&args.address, &args.role)
		.with_timeout(Duration::from_secs(args.timeout_secs));
	if let Some(path) = &args.ca_cert {
		options = options.with_ca_cert(path);
	}
	if let Some(path) = &args.ca_path {
		options = options.with_ca_path(path);
	}
	if let Some(token) = static_token {
		options = options.with_static_token(token);
	}

	let provider = GcpAuth::default().with_auth_path(&args.auth_path);
	ClientConnection::with_provider(options, Arc::new(provider))
		.context("failed to configure Vault connection")
}

async fn run_token(connection: &ClientConnection) -> Result<()> {
	let client = connection.ready_client().await.context("failed to obtain Vault token")?;
	let token = client
		.token()
		.context("connection produced a client without a token")?;
	println!("{}", token.expose());
	Ok(())
}

async fn run_read(connection: &ClientConnection, path: &str) -> Result<()> {
	let client = connection.ready_client().await.context("failed to obtain Vault token")?;
	let secret = client
		.read(path)
		.await
		.with_context(|| format!("failed to read {path}"))?;

	match secret {
		Some(secret) => {
			let data = secret.data.unwrap_or_default();
			println!("{}", serde_json::to_string_pretty(&data)?);
			Ok(())
		}
		None => anyhow::bail!("no secret at {path}"),
	}
}

/// Describe the connection's token, renewing it first and revoking it afterwards when asked.
async fn status_report(
	connection: &ClientConnection,
	renew: Option<u64>,
	revoke: bool,
) -> Result<Value> {
	let client = connection.ready_client().await.context("failed to obtain Vault token")?;

	let Some(manager) = connection.token_manager() else {
		return static_status(&client, renew, revoke).await;
	};

	if let Some(increment) = renew {
		let expiration = manager.refresh(increment).await.context("failed to renew token")?;
		info!(%expiration, "Token renewed");
	}

	let token = manager.get_token().await?;
	let mut status = json!({
		"mode": "dynamic",
		"accessor": token.accessor(),
		"policies": token.policies(),
		"renewable": token.renewable(),
		"ttl_secs": token.ttl().num_seconds(),
		"expiration": token.expiration().to_rfc3339(),
		"expired": manager.is_expired().await,
		"revoked": manager.is_revoked().await.context("failed to look up token")?,
	});

	if revoke {
		manager.revoke().await.context("failed to revoke token")?;
		status["revoked"] = Value::Bool(true);
	}
	Ok(status)
}

async fn static_status(client: &VaultClient, renew: Option<u64>, revoke: bool) -> Result<Value> {
	let token = client
		.token()
		.context("connection produced a client without a token")?;

	if let Some(increment) = renew {
		let renewed = client
			.renew_self(token, increment)
			.await
			.context("failed to renew static token")?;
		let ttl = renewed.token_ttl().context("renewal returned a bad ttl")?;
		info!(ttl_secs = ttl.as_secs(), "Static token renewed");
	}

	let lookup = client
		.lookup_self(token)
		.await
		.context("static token lookup failed")?;
	let ttl = lookup.token_ttl().context("static token lookup returned a bad ttl")?;
	let mut status = json!({
		"mode": "static",
		"ttl_secs": ttl.as_secs(),
		"revoked": false,
	});

	if revoke {
		client
			.revoke_self(token)
			.await
			.context("failed to revoke static token")?;
		info!("Static token revoked");
		status["revoked"] = Value::Bool(true);
	}
	Ok(status)
}

async fn run_status(connection: &ClientConnection, renew: Option<u64>, revoke: bool) -> Result<()> {
	let status = status_report(connection, renew, revoke).await?;
	println!("{}", serde_json::to_string_pretty(&status)?);
	Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
	let args = Args::parse();
	init_tracing(args.log_json);

	let static_token =
		config::load_secret_env(config::TOKEN_ENV).context("failed to load Vault token")?;
	let connection = connect(&args, static_token)?;

	match &args.command {
		Command::Token => run_token(&connection).await,
		Command::Read { path } => run_read(&connection, path).await,
		Command::Status { renew, revoke } => run_status(&connection, *renew, *revoke).await,
	}
}

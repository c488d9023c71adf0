//! # Gateway Auth - Main Entry Point
//!
//! Loads configuration, installs logging and serves the auth gateway until
//! Ctrl-C.
//!
//! Configuration comes from the YAML (or `.json`) file named by
//! `GATEWAY_AUTH_CONFIG`, defaulting to `config/gateway-auth.yaml`. When that
//! file does not exist the defaults plus `GATEWAY_AUTH_*` environment
//! variables are used.

use std::path::Path;

use anyhow::Context;
use tracing::info;

use gateway_auth::observability::init_logging;
use gateway_auth::{GatewayAuthConfig, GatewayServer};

const DEFAULT_CONFIG_PATH: &str = "config/gateway-auth.yaml";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path =
        std::env::var("GATEWAY_AUTH_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());

    let config = load_config(&config_path)
        .await
        .with_context(|| format!("Failed to load configuration ({})", config_path))?;

    init_logging(&config.logging)?;

    info!("Starting gateway auth");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let server = GatewayServer::new(config).context("Failed to build server")?;
    server.run().await?;

    Ok(())
}

async fn load_config(path: &str) -> gateway_auth::GatewayResult<GatewayAuthConfig> {
    let path = Path::new(path);
    if !path.exists() {
        return GatewayAuthConfig::from_env();
    }

    match path.extension().and_then(|ext| ext.to_str()) {
        Some("json") => GatewayAuthConfig::load_from_json(path).await,
        _ => GatewayAuthConfig::load_from_file(path).await,
    }
}

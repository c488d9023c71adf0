//! # Structured Logging
//!
//! `tracing` subscriber setup. JSON output for deployments, human-readable
//! text for local runs; `RUST_LOG` overrides the configured level.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::core::config::LoggingConfig;
use crate::core::error::{GatewayError, GatewayResult};

/// Default directive when `RUST_LOG` is not set
pub fn default_filter(config: &LoggingConfig) -> String {
    format!(
        "gateway_auth={level},analytics={level},tower_http=info",
        level = config.level.to_lowercase()
    )
}

/// Install the global subscriber. Fails if one is already installed.
pub fn init_logging(config: &LoggingConfig) -> GatewayResult<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(config)));

    let registry = tracing_subscriber::registry().with(filter);

    let result = if config.format.eq_ignore_ascii_case("json") {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_file(true)
                    .with_line_number(true)
                    .json(),
            )
            .try_init()
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .try_init()
    };

    result.map_err(|e| GatewayError::internal(format!("Failed to initialize logging: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter_uses_level() {
        let config = LoggingConfig {
            level: "DEBUG".to_string(),
            format: "text".to_string(),
        };
        assert_eq!(
            default_filter(&config),
            "gateway_auth=debug,analytics=debug,tower_http=info"
        );
    }
}

//! # Configuration Module
//!
//! Configuration structures and loading for the auth gateway.
//!
//! ## Key Features
//! - YAML/JSON configuration parsing with serde
//! - Environment variable override support (`GATEWAY_AUTH_*`)
//! - Validation that reports every problem at once

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use url::Url;

use crate::core::error::{GatewayError, GatewayResult};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayAuthConfig {
    /// HTTP listener settings
    pub server: ServerConfig,

    /// Identity provider (hosted login, profile and token endpoints)
    pub identity_provider: IdentityProviderConfig,

    /// Role checks and per-operation required roles
    pub authorization: AuthorizationConfig,

    /// Profile cache settings
    pub cache: ProfileCacheConfig,

    /// Analytics sink settings
    pub analytics: AnalyticsConfig,

    /// Log output settings
    pub logging: LoggingConfig,
}

impl GatewayAuthConfig {
    /// Load configuration from a YAML file
    pub async fn load_from_file<P: AsRef<Path>>(path: P) -> GatewayResult<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| GatewayError::config(format!("Failed to read config file: {}", e)))?;

        let mut config: GatewayAuthConfig = serde_yaml::from_str(&content)
            .map_err(|e| GatewayError::config(format!("Failed to parse config: {}", e)))?;

        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from JSON
    pub async fn load_from_json<P: AsRef<Path>>(path: P) -> GatewayResult<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| GatewayError::config(format!("Failed to read config file: {}", e)))?;

        let mut config: GatewayAuthConfig = serde_json::from_str(&content)
            .map_err(|e| GatewayError::config(format!("Failed to parse JSON config: {}", e)))?;

        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Build configuration from defaults plus environment variables only
    pub fn from_env() -> GatewayResult<Self> {
        let mut config = Self::default();
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Apply environment variable overrides to configuration
    ///
    /// Environment variables follow the pattern: GATEWAY_AUTH_<FIELD>
    /// For example: GATEWAY_AUTH_PORT=8080
    pub fn apply_env_overrides(&mut self) -> GatewayResult<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary key lookup
    pub(crate) fn apply_overrides<F>(&mut self, lookup: F) -> GatewayResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = lookup("GATEWAY_AUTH_PORT") {
            self.server.port = port
                .parse()
                .map_err(|e| GatewayError::config(format!("Invalid GATEWAY_AUTH_PORT: {}", e)))?;
        }

        if let Some(addr) = lookup("GATEWAY_AUTH_BIND_ADDRESS") {
            self.server.bind_address = addr;
        }

        if let Some(domain) = lookup("GATEWAY_AUTH_DOMAIN") {
            self.identity_provider.domain = domain;
        }

        if let Some(client_id) = lookup("GATEWAY_AUTH_CLIENT_ID") {
            self.identity_provider.client_id = client_id;
        }

        if let Some(secret) = lookup("GATEWAY_AUTH_CLIENT_SECRET") {
            self.identity_provider.client_secret = secret;
        }

        if let Some(url) = lookup("GATEWAY_AUTH_CALLBACK_URL") {
            self.identity_provider.callback_url = url;
        }

        if let Some(ttl) = lookup("GATEWAY_AUTH_CACHE_TTL") {
            self.cache.ttl = humantime::parse_duration(&ttl)
                .map_err(|e| GatewayError::config(format!("Invalid GATEWAY_AUTH_CACHE_TTL: {}", e)))?;
        }

        if let Some(key) = lookup("GATEWAY_AUTH_ANALYTICS_KEY") {
            self.analytics.key = Some(key);
        }

        if let Some(level) = lookup("GATEWAY_AUTH_LOG_LEVEL") {
            self.logging.level = level;
        }

        if let Some(format) = lookup("GATEWAY_AUTH_LOG_FORMAT") {
            self.logging.format = format;
        }

        Ok(())
    }

    /// Validate the configuration, collecting every error before failing
    pub fn validate(&self) -> GatewayResult<()> {
        let mut errors = Vec::new();

        if self.server.bind_address.is_empty() {
            errors.push("bind_address cannot be empty".to_string());
        }

        let idp = &self.identity_provider;
        if idp.domain.is_empty() {
            errors.push("identity_provider.domain cannot be empty".to_string());
        } else if let Err(e) = idp.base_url() {
            errors.push(e.to_string());
        }
        if idp.client_id.is_empty() {
            errors.push("identity_provider.client_id cannot be empty".to_string());
        }
        if !idp.callback_url.is_empty() && Url::parse(&idp.callback_url).is_err() {
            errors.push(format!(
                "identity_provider.callback_url is not a valid URL: {}",
                idp.callback_url
            ));
        }
        for (name, value) in [("token_url", &idp.token_url), ("userinfo_url", &idp.userinfo_url)] {
            if let Some(url) = value {
                if Url::parse(url).is_err() {
                    errors.push(format!("identity_provider.{} is not a valid URL: {}", name, url));
                }
            }
        }
        if idp.request_timeout.is_zero() {
            errors.push("identity_provider.request_timeout must be greater than 0".to_string());
        }

        let authz = &self.authorization;
        if authz.token_prefix.is_empty() {
            errors.push("authorization.token_prefix cannot be empty".to_string());
        }
        if authz.admin_role.is_empty() {
            errors.push("authorization.admin_role cannot be empty".to_string());
        }
        for (index, route) in authz.routes.iter().enumerate() {
            if !route.path.starts_with('/') {
                errors.push(format!("Route {} path must start with '/': {}", index, route.path));
            }
            if let Some(method) = &route.method {
                match method.to_uppercase().as_str() {
                    "GET" | "POST" | "PUT" | "DELETE" | "PATCH" | "HEAD" | "OPTIONS" => {}
                    _ => errors.push(format!(
                        "Route '{}' has invalid HTTP method: {}",
                        route.path, method
                    )),
                }
            }
        }

        if self.cache.ttl.is_zero() {
            errors.push("cache.ttl must be greater than 0".to_string());
        }
        if self.cache.max_entries == Some(0) {
            errors.push("cache.max_entries must be greater than 0 when set".to_string());
        }

        if Url::parse(&self.analytics.endpoint).is_err() {
            errors.push(format!("analytics.endpoint is not a valid URL: {}", self.analytics.endpoint));
        }
        if self.analytics.path_prefix.is_empty() {
            errors.push("analytics.path_prefix cannot be empty".to_string());
        }

        match self.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => errors.push(format!("Invalid log level: {}", self.logging.level)),
        }

        match self.logging.format.to_lowercase().as_str() {
            "json" | "text" => {}
            _ => errors.push(format!("Invalid log format: {}", self.logging.format)),
        }

        if !errors.is_empty() {
            return Err(GatewayError::config(format!(
                "Configuration validation failed:\n{}",
                errors.join("\n")
            )));
        }

        Ok(())
    }
}

/// HTTP listener configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

/// Identity provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityProviderConfig {
    /// Tenant domain, e.g. `example.eu.auth0.com` or a full `https://` origin
    pub domain: String,

    /// OAuth client ID
    pub client_id: String,

    /// OAuth client secret
    pub client_secret: String,

    /// Where the hosted login page posts the token back to
    pub callback_url: String,

    /// Redirect URI sent with token endpoint grants
    pub redirect_uri: String,

    /// Token endpoint, defaults to `{domain}/oauth/token`
    pub token_url: Option<String>,

    /// Profile endpoint, defaults to `{domain}/userinfo`
    pub userinfo_url: Option<String>,

    /// Timeout for every provider call
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
}

impl Default for IdentityProviderConfig {
    fn default() -> Self {
        Self {
            domain: String::new(),
            client_id: String::new(),
            client_secret: String::new(),
            callback_url: String::new(),
            redirect_uri: String::new(),
            token_url: None,
            userinfo_url: None,
            request_timeout: Duration::from_secs(10),
        }
    }
}

impl IdentityProviderConfig {
    /// Base URL of the provider. A bare domain is treated as `https://{domain}`.
    pub fn base_url(&self) -> GatewayResult<Url> {
        let raw = if self.domain.contains("://") {
            self.domain.clone()
        } else {
            format!("https://{}", self.domain)
        };

        Url::parse(&raw).map_err(|e| {
            GatewayError::config(format!(
                "identity_provider.domain is not a valid host ({}): {}",
                self.domain, e
            ))
        })
    }

    /// Resolved token endpoint URL
    pub fn token_endpoint(&self) -> GatewayResult<Url> {
        self.endpoint(self.token_url.as_deref(), "oauth/token")
    }

    /// Resolved profile endpoint URL
    pub fn userinfo_endpoint(&self) -> GatewayResult<Url> {
        self.endpoint(self.userinfo_url.as_deref(), "userinfo")
    }

    /// Resolved hosted login URL, without query parameters
    pub fn authorize_endpoint(&self) -> GatewayResult<Url> {
        self.endpoint(None, "authorize")
    }

    fn endpoint(&self, explicit: Option<&str>, path: &str) -> GatewayResult<Url> {
        match explicit {
            Some(url) => Url::parse(url)
                .map_err(|e| GatewayError::config(format!("Invalid endpoint URL {}: {}", url, e))),
            None => self
                .base_url()?
                .join(path)
                .map_err(|e| GatewayError::config(format!("Invalid endpoint path {}: {}", path, e))),
        }
    }
}

/// Authorization configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthorizationConfig {
    /// Scheme marker stripped from the Authorization header
    pub token_prefix: String,

    /// Profile attribute holding an explicit role list
    pub roles_claim: String,

    /// Role that passes every role check
    pub admin_role: String,

    /// Verified email domain -> role
    pub domain_roles: HashMap<String, String>,

    /// Paths that skip authorization; a trailing `*` matches a prefix
    pub excluded_paths: Vec<String>,

    /// Required roles per operation
    pub routes: Vec<RouteScopeConfig>,
}

impl Default for AuthorizationConfig {
    fn default() -> Self {
        Self {
            token_prefix: "Bearer ".to_string(),
            roles_claim: "magic-box/roles".to_string(),
            admin_role: "admin".to_string(),
            domain_roles: HashMap::new(),
            excluded_paths: vec!["/health".to_string(), "/auth/*".to_string()],
            routes: Vec::new(),
        }
    }
}

/// Required roles for one operation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteScopeConfig {
    /// HTTP method; absent means any method
    #[serde(default)]
    pub method: Option<String>,

    /// Path pattern, e.g. `/api/v1/projects/:id`
    pub path: String,

    /// Roles the caller must hold, in declaration order
    #[serde(default)]
    pub required_roles: Vec<String>,
}

/// Profile cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileCacheConfig {
    /// How long a fetched profile stays valid
    #[serde(with = "humantime_serde")]
    pub ttl: Duration,

    /// Upper bound on cached profiles; unbounded when absent
    pub max_entries: Option<usize>,
}

impl Default for ProfileCacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_millis(6_000_000),
            max_entries: None,
        }
    }
}

/// Analytics sink configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyticsConfig {
    /// Project token; events go to the tracing log when absent
    pub key: Option<String>,

    /// Base URL of the ingestion API
    pub endpoint: String,

    /// Only requests whose path contains this prefix emit REQUEST events
    pub path_prefix: String,

    /// Timeout for every sink call
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            key: None,
            endpoint: "https://api.mixpanel.com".to_string(),
            path_prefix: "/api/v1/".to_string(),
            request_timeout: Duration::from_secs(5),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level
    pub level: String,

    /// Log format (json, text)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "json".to_string(),
        }
    }
}

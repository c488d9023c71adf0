//! # Identity Provider
//!
//! The authorizer talks to the external identity provider through the
//! [`IdentityProvider`] trait: one call to read the profile behind an access
//! token, one call to the token endpoint. [`HttpIdentityProvider`] implements
//! it against an Auth0-style tenant (`/userinfo`, `/oauth/token`).

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use tracing::{debug, warn};
use url::Url;

use crate::core::config::IdentityProviderConfig;
use crate::core::error::{GatewayError, GatewayResult};
use crate::core::types::{token_fingerprint, TokenBundle};

/// `state` value sent with hosted-login redirects and refresh grants
pub const LOGIN_STATE: &str = "innovation";

/// Recoverable provider answers that are reported to the caller instead of failing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderSignal {
    Unauthorized,
    RateLimited,
}

impl ProviderSignal {
    /// The literal text the provider uses for this signal
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unauthorized => "Unauthorized",
            Self::RateLimited => "Too Many Requests",
        }
    }

    /// Recognise a signal in a raw response body
    pub fn from_body(body: &str) -> Option<Self> {
        match body.trim() {
            "Unauthorized" => Some(Self::Unauthorized),
            "Too Many Requests" => Some(Self::RateLimited),
            _ => None,
        }
    }

    fn from_status(status: StatusCode) -> Option<Self> {
        match status {
            StatusCode::UNAUTHORIZED => Some(Self::Unauthorized),
            StatusCode::TOO_MANY_REQUESTS => Some(Self::RateLimited),
            _ => None,
        }
    }
}

impl fmt::Display for ProviderSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the profile endpoint gave back, before interpretation
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderResponse {
    /// Body parsed as JSON (an object, or a JSON string that may itself encode one)
    Json(Value),
    /// Body that is not JSON at all
    Text(String),
    Signal(ProviderSignal),
}

/// Token endpoint grant
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenGrant {
    AuthorizationCode { code: String },
    RefreshToken { refresh_token: String },
}

impl TokenGrant {
    pub fn grant_type(&self) -> &'static str {
        match self {
            Self::AuthorizationCode { .. } => "authorization_code",
            Self::RefreshToken { .. } => "refresh_token",
        }
    }
}

#[derive(Debug, Serialize)]
struct TokenRequestBody<'a> {
    grant_type: &'static str,
    client_id: &'a str,
    client_secret: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    scope: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    refresh_token: Option<&'a str>,
    #[serde(rename = "responseType", skip_serializing_if = "Option::is_none")]
    response_type: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    state: Option<&'static str>,
    redirect_uri: &'a str,
}

impl<'a> TokenRequestBody<'a> {
    fn new(grant: &'a TokenGrant, config: &'a IdentityProviderConfig) -> Self {
        let base = Self {
            grant_type: grant.grant_type(),
            client_id: &config.client_id,
            client_secret: &config.client_secret,
            scope: None,
            code: None,
            refresh_token: None,
            response_type: None,
            state: None,
            redirect_uri: &config.redirect_uri,
        };

        match grant {
            TokenGrant::AuthorizationCode { code } => Self {
                scope: Some("profile+roles"),
                code: Some(code),
                ..base
            },
            TokenGrant::RefreshToken { refresh_token } => Self {
                refresh_token: Some(refresh_token),
                response_type: Some("token id_token"),
                state: Some(LOGIN_STATE),
                ..base
            },
        }
    }
}

/// Build the JSON body posted to the token endpoint for `grant`
pub fn token_request_body(grant: &TokenGrant, config: &IdentityProviderConfig) -> Value {
    serde_json::to_value(TokenRequestBody::new(grant, config)).unwrap_or(Value::Null)
}

/// Access to the identity provider's profile and token endpoints
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Read the profile behind `token`
    async fn fetch_profile(&self, token: &str) -> GatewayResult<ProviderResponse>;

    /// Exchange a grant for a token bundle
    async fn request_token(&self, grant: &TokenGrant) -> GatewayResult<TokenBundle>;
}

/// Identity provider reached over HTTP
pub struct HttpIdentityProvider {
    client: Client,
    config: IdentityProviderConfig,
    userinfo_url: Url,
    token_url: Url,
}

impl HttpIdentityProvider {
    pub fn new(config: IdentityProviderConfig) -> GatewayResult<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| GatewayError::config(format!("Failed to build HTTP client: {}", e)))?;

        Self::with_client(config, client)
    }

    /// Use a caller-supplied client (proxies, custom TLS, tests)
    pub fn with_client(config: IdentityProviderConfig, client: Client) -> GatewayResult<Self> {
        let userinfo_url = config.userinfo_endpoint()?;
        let token_url = config.token_endpoint()?;

        Ok(Self {
            client,
            config,
            userinfo_url,
            token_url,
        })
    }

    fn classify_body(body: String) -> ProviderResponse {
        if let Some(signal) = ProviderSignal::from_body(&body) {
            return ProviderResponse::Signal(signal);
        }

        match serde_json::from_str::<Value>(&body) {
            Ok(value) => ProviderResponse::Json(value),
            Err(_) => ProviderResponse::Text(body),
        }
    }
}

#[async_trait]
impl IdentityProvider for HttpIdentityProvider {
    async fn fetch_profile(&self, token: &str) -> GatewayResult<ProviderResponse> {
        debug!(token = %token_fingerprint(token), "Fetching profile from identity provider");

        let response = self
            .client
            .get(self.userinfo_url.clone())
            .bearer_auth(token)
            .send()
            .await?;

        let status = response.status();
        if let Some(signal) = ProviderSignal::from_status(status) {
            warn!(token = %token_fingerprint(token), %signal, "Identity provider refused profile lookup");
            return Ok(ProviderResponse::Signal(signal));
        }

        if !status.is_success() {
            return Err(GatewayError::identity_provider(format!(
                "profile endpoint returned {}",
                status
            )));
        }

        let body = response.text().await?;
        Ok(Self::classify_body(body))
    }

    async fn request_token(&self, grant: &TokenGrant) -> GatewayResult<TokenBundle> {
        let body = TokenRequestBody::new(grant, &self.config);

        let response = self
            .client
            .post(self.token_url.clone())
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(GatewayError::identity_provider(format!(
                "token endpoint returned {} for {} grant: {}",
                status,
                grant.grant_type(),
                detail
            )));
        }

        let bundle: Value = response.json().await?;
        Ok(TokenBundle::new(bundle))
    }
}

//! # Token Authorizer
//!
//! Turns an `Authorization` header and a list of required roles into an
//! [`AuthDecision`].
//!
//! ## Flow
//! 1. Strip the bearer prefix from the header (missing/malformed → denied).
//! 2. Resolve the token to a profile, from the [`ProfileCache`] or the
//!    [`IdentityProvider`].
//! 3. Cache freshly fetched profiles under the token.
//! 4. Derive effective roles: the explicit roles claim, or a role mapped from
//!    the verified email's domain.
//! 5. Allow when every required role is held or the admin role is held.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;

use crate::auth::decision::{AuthDecision, DenialReason, ProviderFailure};
use crate::auth::provider::{
    IdentityProvider, ProviderResponse, ProviderSignal, TokenGrant, LOGIN_STATE,
};
use crate::caching::ProfileCache;
use crate::core::config::{AuthorizationConfig, IdentityProviderConfig};
use crate::core::error::GatewayResult;
use crate::core::types::{token_fingerprint, Profile, TokenBundle};

/// Outcome of a profile lookup
#[derive(Debug, Clone, PartialEq)]
pub enum ProfileResolution {
    /// A profile, and whether it came from the cache
    Profile { profile: Profile, cached: bool },
    /// The provider refused the lookup
    Signal(ProviderSignal),
}

/// Validates bearer tokens and checks roles
pub struct TokenAuthorizer {
    provider: Arc<dyn IdentityProvider>,
    cache: Arc<ProfileCache>,
    authorize_url: Url,
    token_prefix: String,
    roles_claim: String,
    admin_role: String,
    domain_roles: HashMap<String, String>,
}

impl TokenAuthorizer {
    pub fn new(
        idp: &IdentityProviderConfig,
        authz: &AuthorizationConfig,
        provider: Arc<dyn IdentityProvider>,
        cache: Arc<ProfileCache>,
    ) -> GatewayResult<Self> {
        let mut authorize_url = idp.authorize_endpoint()?;
        authorize_url
            .query_pairs_mut()
            .append_pair("response_type", "token")
            .append_pair("client_id", &idp.client_id)
            .append_pair("redirect_uri", &idp.callback_url)
            .append_pair("state", LOGIN_STATE)
            .append_pair("response_mode", "form_post")
            .append_pair("scope", "openid");

        Ok(Self {
            provider,
            cache,
            authorize_url,
            token_prefix: authz.token_prefix.clone(),
            roles_claim: authz.roles_claim.clone(),
            admin_role: authz.admin_role.clone(),
            domain_roles: authz.domain_roles.clone(),
        })
    }

    /// URL of the provider's hosted login page
    pub fn build_authorize_url(&self) -> String {
        self.authorize_url.to_string()
    }

    pub fn cache(&self) -> &Arc<ProfileCache> {
        &self.cache
    }

    /// Resolve `token` to a profile.
    ///
    /// A live cache entry is returned without calling the provider. Provider
    /// signals (unauthorized, rate limited) come back as `Ok`; only transport
    /// failures are errors. The cache is not written here.
    pub async fn resolve_profile(&self, token: &str) -> GatewayResult<ProfileResolution> {
        if let Some(profile) = self.cache.get(token) {
            debug!(token = %token_fingerprint(token), "Profile served from cache");
            return Ok(ProfileResolution::Profile {
                profile,
                cached: true,
            });
        }

        debug!(token = %token_fingerprint(token), "Profile not cached, asking identity provider");
        let response = self.provider.fetch_profile(token).await?;

        Ok(match interpret_response(response) {
            Ok(profile) => ProfileResolution::Profile {
                profile,
                cached: false,
            },
            Err(signal) => {
                warn!(token = %token_fingerprint(token), %signal, "Identity provider signalled failure");
                ProfileResolution::Signal(signal)
            }
        })
    }

    /// Decide whether the bearer of `header` may perform an operation needing `required_roles`
    pub async fn authorize(&self, header: Option<&str>, required_roles: &[String]) -> AuthDecision {
        let decision = self.decide(header, required_roles).await;

        match &decision {
            AuthDecision::Allowed { profile, .. } => {
                metrics::counter!("auth_decisions_total", "outcome" => "allowed").increment(1);
                debug!(subject = profile.subject().unwrap_or("-"), "Request authorized");
            }
            AuthDecision::Denied { reason, .. } => {
                metrics::counter!("auth_decisions_total", "outcome" => reason.tag()).increment(1);
                info!(reason = %reason, ?required_roles, "Request denied");
            }
        }

        decision
    }

    async fn decide(&self, header: Option<&str>, required_roles: &[String]) -> AuthDecision {
        let Some(token) = header
            .and_then(|h| h.strip_prefix(self.token_prefix.as_str()))
            .filter(|token| !token.trim().is_empty())
        else {
            return AuthDecision::denied(DenialReason::MalformedHeader);
        };

        let profile = match self.resolve_profile(token).await {
            Ok(ProfileResolution::Profile { profile, cached }) => {
                if !cached {
                    debug!(token = %token_fingerprint(token), "Caching profile");
                    self.cache.insert(token, profile.clone());
                }
                profile
            }
            Ok(ProfileResolution::Signal(signal)) => {
                return AuthDecision::Denied {
                    message: signal.as_str().to_string(),
                    reason: DenialReason::Provider(signal.into()),
                };
            }
            Err(err) => {
                warn!(error = %err, "Profile lookup failed");
                return AuthDecision::denied(DenialReason::Provider(ProviderFailure::Unavailable(
                    err.to_string(),
                )));
            }
        };

        let roles = self.effective_roles(&profile);
        let missing = missing_roles(required_roles, &roles);

        if missing.is_empty() || roles.iter().any(|role| role == &self.admin_role) {
            AuthDecision::Allowed { profile, roles }
        } else {
            AuthDecision::denied(DenialReason::InsufficientRole { missing })
        }
    }

    /// Roles the profile holder has.
    ///
    /// An explicit roles claim wins, even when empty. Otherwise a verified email
    /// whose domain appears in the domain table yields that single role.
    pub fn effective_roles(&self, profile: &Profile) -> Vec<String> {
        if let Some(roles) = profile.roles(&self.roles_claim) {
            return roles;
        }

        if !profile.email_verified() {
            return Vec::new();
        }

        profile
            .email()
            .and_then(|email| email.split('@').nth(1))
            .and_then(|domain| self.domain_roles.get(domain))
            .map(|role| vec![role.clone()])
            .unwrap_or_default()
    }

    /// Exchange a hosted-login authorization code for tokens
    pub async fn exchange_authorization_code(&self, code: &str) -> GatewayResult<TokenBundle> {
        info!("Exchanging authorization code for tokens");
        self.provider
            .request_token(&TokenGrant::AuthorizationCode {
                code: code.to_string(),
            })
            .await
    }

    /// Obtain a new access token from a refresh token
    pub async fn refresh_access_token(&self, refresh_token: &str) -> GatewayResult<TokenBundle> {
        info!(token = %token_fingerprint(refresh_token), "Refreshing access token");
        self.provider
            .request_token(&TokenGrant::RefreshToken {
                refresh_token: refresh_token.to_string(),
            })
            .await
    }
}

/// Required roles not present in `held`, in the order they were required
fn missing_roles(required: &[String], held: &[String]) -> Vec<String> {
    required
        .iter()
        .filter(|role| !held.contains(role))
        .cloned()
        .collect()
}

/// Turn a raw provider response into a profile.
///
/// JSON objects are used as-is. A JSON string that itself encodes an object is
/// parsed; any other payload becomes a `{"message": ...}` profile.
fn interpret_response(response: ProviderResponse) -> Result<Profile, ProviderSignal> {
    match response {
        ProviderResponse::Signal(signal) => Err(signal),
        ProviderResponse::Json(Value::Object(attributes)) => Ok(Profile::new(attributes)),
        ProviderResponse::Json(Value::String(text)) | ProviderResponse::Text(text) => {
            if let Some(signal) = ProviderSignal::from_body(&text) {
                return Err(signal);
            }
            match serde_json::from_str::<Value>(&text) {
                Ok(Value::Object(attributes)) => Ok(Profile::new(attributes)),
                _ => Ok(Profile::from_message(text)),
            }
        }
        ProviderResponse::Json(other) => Ok(Profile::from_message(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_missing_roles_keeps_order() {
        let required = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let held = vec!["b".to_string()];
        assert_eq!(missing_roles(&required, &held), vec!["a", "c"]);
        assert!(missing_roles(&[], &held).is_empty());
    }

    #[test]
    fn test_interpret_object() {
        let profile = interpret_response(ProviderResponse::Json(json!({"sub": "u1"}))).unwrap();
        assert_eq!(profile.subject(), Some("u1"));
    }

    #[test]
    fn test_interpret_json_encoded_string() {
        let encoded = Value::String("{\"sub\":\"u2\",\"email\":\"a@b.c\"}".to_string());
        let profile = interpret_response(ProviderResponse::Json(encoded)).unwrap();
        assert_eq!(profile.subject(), Some("u2"));
        assert_eq!(profile.email(), Some("a@b.c"));
    }

    #[test]
    fn test_interpret_plain_string_becomes_message() {
        let profile =
            interpret_response(ProviderResponse::Text("service notice".to_string())).unwrap();
        assert_eq!(profile.get("message"), Some(&json!("service notice")));
    }

    #[test]
    fn test_interpret_signal_in_json_string() {
        let result = interpret_response(ProviderResponse::Json(Value::String(
            "Too Many Requests".to_string(),
        )));
        assert_eq!(result, Err(ProviderSignal::RateLimited));
    }

    #[test]
    fn test_interpret_non_object_json() {
        let profile = interpret_response(ProviderResponse::Json(json!([1, 2]))).unwrap();
        assert_eq!(profile.get("message"), Some(&json!("[1,2]")));
    }
}

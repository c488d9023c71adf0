//! # Authorization Tests
//!
//! Behavioural tests for the token authorizer: cache usage, header parsing,
//! role derivation and the allow/deny rules.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::auth::authorizer::{ProfileResolution, TokenAuthorizer};
use crate::auth::decision::{AuthDecision, DenialReason, ProviderFailure, ACCESS_DENIED};
use crate::auth::provider::{IdentityProvider, ProviderResponse, ProviderSignal, TokenGrant};
use crate::caching::{ManualClock, ProfileCache};
use crate::core::config::{AuthorizationConfig, IdentityProviderConfig, ProfileCacheConfig};
use crate::core::error::{GatewayError, GatewayResult};
use crate::core::types::TokenBundle;

/// Provider double that replays scripted profile responses and counts calls
#[derive(Default)]
struct ScriptedProvider {
    responses: Mutex<VecDeque<GatewayResult<ProviderResponse>>>,
    fallback: Option<Value>,
    profile_calls: AtomicUsize,
    grants: Mutex<Vec<TokenGrant>>,
}

impl ScriptedProvider {
    fn returning(profile: Value) -> Self {
        Self {
            fallback: Some(profile),
            ..Default::default()
        }
    }

    fn push(&self, response: GatewayResult<ProviderResponse>) {
        self.responses.lock().push_back(response);
    }

    fn calls(&self) -> usize {
        self.profile_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IdentityProvider for ScriptedProvider {
    async fn fetch_profile(&self, _token: &str) -> GatewayResult<ProviderResponse> {
        self.profile_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(response) = self.responses.lock().pop_front() {
            return response;
        }
        match &self.fallback {
            Some(profile) => Ok(ProviderResponse::Json(profile.clone())),
            None => Err(GatewayError::identity_provider("no scripted response")),
        }
    }

    async fn request_token(&self, grant: &TokenGrant) -> GatewayResult<TokenBundle> {
        self.grants.lock().push(grant.clone());
        match grant {
            TokenGrant::AuthorizationCode { code } if code == "bad" => {
                Err(GatewayError::identity_provider("token endpoint returned 403"))
            }
            _ => Ok(TokenBundle::new(json!({
                "access_token": "new-access",
                "refresh_token": "new-refresh",
            }))),
        }
    }
}

struct Harness {
    authorizer: TokenAuthorizer,
    provider: Arc<ScriptedProvider>,
    cache: Arc<ProfileCache>,
    clock: ManualClock,
}

fn idp_config() -> IdentityProviderConfig {
    IdentityProviderConfig {
        domain: "tenant.auth0.com".to_string(),
        client_id: "client-123".to_string(),
        client_secret: "s3cret".to_string(),
        callback_url: "https://app.example.com/callback".to_string(),
        redirect_uri: "https://app.example.com/callback".to_string(),
        ..Default::default()
    }
}

fn harness_with(provider: ScriptedProvider, domain_roles: HashMap<String, String>) -> Harness {
    let provider = Arc::new(provider);
    let clock = ManualClock::new(0);
    let cache = Arc::new(ProfileCache::new(
        &ProfileCacheConfig::default(),
        Arc::new(clock.clone()),
    ));
    let authz = AuthorizationConfig {
        domain_roles,
        ..Default::default()
    };
    let authorizer =
        TokenAuthorizer::new(&idp_config(), &authz, provider.clone(), cache.clone()).unwrap();

    Harness {
        authorizer,
        provider,
        cache,
        clock,
    }
}

fn harness(profile: Value) -> Harness {
    harness_with(ScriptedProvider::returning(profile), HashMap::new())
}

fn roles(names: &[&str]) -> Vec<String> {
    names.iter().map(|n| n.to_string()).collect()
}

#[cfg(test)]
mod resolve_profile_tests {
    use super::*;

    #[tokio::test]
    async fn test_unseen_token_calls_provider_once() {
        let h = harness(json!({"sub": "u1"}));

        let resolution = h.authorizer.resolve_profile("tok-1").await.unwrap();

        assert_eq!(h.provider.calls(), 1);
        match resolution {
            ProfileResolution::Profile { profile, cached } => {
                assert!(!cached);
                assert_eq!(profile.subject(), Some("u1"));
            }
            other => panic!("unexpected resolution: {:?}", other),
        }
        assert_eq!(h.cache.stats().hits, 0);
    }

    #[tokio::test]
    async fn test_resolve_does_not_write_cache() {
        let h = harness(json!({"sub": "u1"}));
        h.authorizer.resolve_profile("tok-1").await.unwrap();
        h.authorizer.resolve_profile("tok-1").await.unwrap();

        assert_eq!(h.provider.calls(), 2);
        assert!(h.cache.is_empty());
    }

    #[tokio::test]
    async fn test_fresh_cache_entry_skips_provider() {
        let h = harness(json!({"sub": "u1"}));
        h.cache
            .insert("tok-1", serde_json::from_value(json!({"sub": "cached"})).unwrap());
        h.clock.advance(Duration::from_millis(5_999_999));

        let resolution = h.authorizer.resolve_profile("tok-1").await.unwrap();

        assert_eq!(h.provider.calls(), 0);
        assert!(matches!(
            resolution,
            ProfileResolution::Profile { cached: true, ref profile } if profile.subject() == Some("cached")
        ));
    }

    #[tokio::test]
    async fn test_expired_cache_entry_is_purged_and_refetched() {
        let h = harness(json!({"sub": "fresh"}));
        h.cache
            .insert("tok-1", serde_json::from_value(json!({"sub": "stale"})).unwrap());
        h.clock.advance(Duration::from_millis(6_000_000));

        let resolution = h.authorizer.resolve_profile("tok-1").await.unwrap();

        assert_eq!(h.provider.calls(), 1);
        assert!(h.cache.entry("tok-1").is_none());
        assert!(matches!(
            resolution,
            ProfileResolution::Profile { cached: false, ref profile } if profile.subject() == Some("fresh")
        ));
    }

    #[tokio::test]
    async fn test_signals_resolve_without_error() {
        let h = harness(json!({}));
        h.provider
            .push(Ok(ProviderResponse::Signal(ProviderSignal::Unauthorized)));
        h.provider
            .push(Ok(ProviderResponse::Text("Too Many Requests".to_string())));

        assert_eq!(
            h.authorizer.resolve_profile("a").await.unwrap(),
            ProfileResolution::Signal(ProviderSignal::Unauthorized)
        );
        assert_eq!(
            h.authorizer.resolve_profile("b").await.unwrap(),
            ProfileResolution::Signal(ProviderSignal::RateLimited)
        );
    }

    #[tokio::test]
    async fn test_json_string_payload_is_parsed() {
        let h = harness(json!({}));
        h.provider.push(Ok(ProviderResponse::Json(Value::String(
            "{\"sub\":\"from-string\"}".to_string(),
        ))));

        match h.authorizer.resolve_profile("a").await.unwrap() {
            ProfileResolution::Profile { profile, .. } => {
                assert_eq!(profile.subject(), Some("from-string"))
            }
            other => panic!("unexpected resolution: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_transport_error_is_returned() {
        let h = harness_with(ScriptedProvider::default(), HashMap::new());
        let result = h.authorizer.resolve_profile("a").await;
        assert!(matches!(result, Err(GatewayError::IdentityProvider { .. })));
    }
}

#[cfg(test)]
mod authorize_tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_header_denied_without_provider_call() {
        let h = harness(json!({"magic-box/roles": ["admin"]}));

        let decision = h.authorizer.authorize(None, &[]).await;

        assert_eq!(decision.reason(), Some(&DenialReason::MalformedHeader));
        assert_eq!(decision.message(), Some(ACCESS_DENIED));
        assert_eq!(h.provider.calls(), 0);
    }

    #[tokio::test]
    async fn test_header_without_bearer_prefix_denied() {
        let h = harness(json!({"magic-box/roles": ["admin"]}));

        for header in ["Basic dXNlcjpwYXNz", "tok-1", "bearer tok-1", "Bearertok-1", "Token Bearer tok-1"] {
            let decision = h.authorizer.authorize(Some(header), &[]).await;
            assert_eq!(decision.reason(), Some(&DenialReason::MalformedHeader), "{}", header);
            assert_eq!(decision.message(), Some(ACCESS_DENIED));
        }
        assert_eq!(h.provider.calls(), 0);
    }

    #[tokio::test]
    async fn test_empty_token_after_prefix_denied() {
        let h = harness(json!({"magic-box/roles": ["admin"]}));

        for header in ["Bearer ", "Bearer    "] {
            let decision = h.authorizer.authorize(Some(header), &[]).await;
            assert_eq!(decision.reason(), Some(&DenialReason::MalformedHeader), "{:?}", header);
            assert_eq!(decision.message(), Some(ACCESS_DENIED));
        }
        assert_eq!(h.provider.calls(), 0);
        assert!(h.authorizer.cache().is_empty());
    }

    #[tokio::test]
    async fn test_empty_requirement_allows_any_profile() {
        let h = harness(json!({"sub": "nobody"}));
        let decision = h.authorizer.authorize(Some("Bearer tok"), &[]).await;
        assert!(decision.is_allowed());
    }

    #[tokio::test]
    async fn test_admin_role_bypasses_requirements() {
        let h = harness(json!({"magic-box/roles": ["admin"]}));
        let decision = h
            .authorizer
            .authorize(Some("Bearer tok"), &roles(&["editor", "billing"]))
            .await;
        assert!(decision.is_allowed());
    }

    #[tokio::test]
    async fn test_viewer_cannot_reach_admin_operation() {
        let h = harness(json!({"magic-box/roles": ["viewer"]}));
        let decision = h
            .authorizer
            .authorize(Some("Bearer tok"), &roles(&["admin"]))
            .await;

        assert_eq!(
            decision,
            AuthDecision::Denied {
                message: ACCESS_DENIED.to_string(),
                reason: DenialReason::InsufficientRole {
                    missing: roles(&["admin"])
                },
            }
        );
    }

    #[tokio::test]
    async fn test_all_required_roles_must_be_held() {
        let h = harness(json!({"magic-box/roles": ["viewer", "editor"]}));

        assert!(h
            .authorizer
            .authorize(Some("Bearer tok"), &roles(&["viewer", "editor"]))
            .await
            .is_allowed());

        let decision = h
            .authorizer
            .authorize(Some("Bearer tok"), &roles(&["editor", "billing", "viewer"]))
            .await;
        assert_eq!(
            decision.reason(),
            Some(&DenialReason::InsufficientRole {
                missing: roles(&["billing"])
            })
        );
    }

    #[tokio::test]
    async fn test_email_domain_role_mapping() {
        let domain_roles: HashMap<String, String> =
            [("example.com".to_string(), "editor".to_string())].into();
        let h = harness_with(
            ScriptedProvider::returning(json!({
                "email": "user@example.com",
                "email_verified": true,
            })),
            domain_roles,
        );

        let decision = h
            .authorizer
            .authorize(Some("Bearer tok"), &roles(&["editor"]))
            .await;

        match decision {
            AuthDecision::Allowed { roles: held, .. } => assert_eq!(held, roles(&["editor"])),
            other => panic!("expected allowed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unverified_email_gets_no_role() {
        let domain_roles: HashMap<String, String> =
            [("example.com".to_string(), "editor".to_string())].into();
        let h = harness_with(
            ScriptedProvider::returning(json!({
                "email": "user@example.com",
                "email_verified": false,
            })),
            domain_roles,
        );

        let decision = h
            .authorizer
            .authorize(Some("Bearer tok"), &roles(&["editor"]))
            .await;
        assert!(!decision.is_allowed());
    }

    #[tokio::test]
    async fn test_explicit_roles_beat_email_domain() {
        let domain_roles: HashMap<String, String> =
            [("example.com".to_string(), "admin".to_string())].into();
        let h = harness_with(
            ScriptedProvider::returning(json!({
                "magic-box/roles": ["viewer"],
                "email": "user@example.com",
                "email_verified": true,
            })),
            domain_roles,
        );

        let decision = h
            .authorizer
            .authorize(Some("Bearer tok"), &roles(&["editor"]))
            .await;
        assert!(!decision.is_allowed());
    }

    #[tokio::test]
    async fn test_provider_signal_surfaces_unchanged() {
        let h = harness(json!({}));
        h.provider
            .push(Ok(ProviderResponse::Signal(ProviderSignal::Unauthorized)));

        let decision = h.authorizer.authorize(Some("Bearer tok"), &[]).await;

        assert_eq!(
            decision,
            AuthDecision::Denied {
                message: "Unauthorized".to_string(),
                reason: DenialReason::Provider(ProviderFailure::Unauthorized),
            }
        );
        assert!(h.cache.is_empty());
    }

    #[tokio::test]
    async fn test_rate_limit_signal() {
        let h = harness(json!({}));
        h.provider
            .push(Ok(ProviderResponse::Signal(ProviderSignal::RateLimited)));

        let decision = h.authorizer.authorize(Some("Bearer tok"), &[]).await;
        assert_eq!(
            decision.reason(),
            Some(&DenialReason::Provider(ProviderFailure::RateLimited))
        );
        assert_eq!(decision.message(), Some("Too Many Requests"));
    }

    #[tokio::test]
    async fn test_provider_failure_denies_with_generic_message() {
        let h = harness_with(ScriptedProvider::default(), HashMap::new());

        let decision = h.authorizer.authorize(Some("Bearer tok"), &[]).await;

        assert_eq!(decision.message(), Some(ACCESS_DENIED));
        assert!(matches!(
            decision.reason(),
            Some(DenialReason::Provider(ProviderFailure::Unavailable(_)))
        ));
    }
}

#[cfg(test)]
mod cache_key_tests {
    use super::*;

    #[tokio::test]
    async fn test_profile_cached_under_extracted_token() {
        let h = harness(json!({"sub": "u1"}));

        h.authorizer.authorize(Some("Bearer tok-abc"), &[]).await;

        assert!(h.cache.contains("tok-abc"));
        assert!(!h.cache.contains("Bearer tok-abc"));
    }

    #[tokio::test]
    async fn test_second_request_served_from_cache() {
        let h = harness(json!({"sub": "u1"}));

        h.authorizer.authorize(Some("Bearer tok-abc"), &[]).await;
        h.authorizer.authorize(Some("Bearer tok-abc"), &[]).await;

        assert_eq!(h.provider.calls(), 1);
    }

    #[tokio::test]
    async fn test_cache_hit_keeps_first_insertion_time() {
        let h = harness(json!({"sub": "u1"}));

        h.authorizer.authorize(Some("Bearer tok"), &[]).await;
        h.clock.advance(Duration::from_secs(60));
        h.authorizer.authorize(Some("Bearer tok"), &[]).await;

        assert_eq!(h.cache.entry("tok").unwrap().inserted_at, 0);

        h.clock.advance(Duration::from_millis(6_000_000 - 60_000));
        h.authorizer.authorize(Some("Bearer tok"), &[]).await;
        assert_eq!(h.provider.calls(), 2);
    }
}

#[cfg(test)]
mod token_flow_tests {
    use super::*;

    #[test]
    fn test_authorize_url() {
        let h = harness(json!({}));
        let url = url::Url::parse(&h.authorizer.build_authorize_url()).unwrap();

        assert_eq!(url.host_str(), Some("tenant.auth0.com"));
        assert_eq!(url.path(), "/authorize");

        let query: HashMap<String, String> = url.query_pairs().into_owned().collect();
        assert_eq!(query["response_type"], "token");
        assert_eq!(query["client_id"], "client-123");
        assert_eq!(query["redirect_uri"], "https://app.example.com/callback");
        assert_eq!(query["state"], "innovation");
        assert_eq!(query["response_mode"], "form_post");
        assert_eq!(query["scope"], "openid");
    }

    #[test]
    fn test_authorize_url_is_stable() {
        let h = harness(json!({}));
        assert_eq!(h.authorizer.build_authorize_url(), h.authorizer.build_authorize_url());
        assert_eq!(h.provider.calls(), 0);
    }

    #[tokio::test]
    async fn test_exchange_authorization_code() {
        let h = harness(json!({}));
        let bundle = h.authorizer.exchange_authorization_code("code-1").await.unwrap();

        assert_eq!(bundle.access_token(), Some("new-access"));
        assert_eq!(
            h.provider.grants.lock().as_slice(),
            &[TokenGrant::AuthorizationCode {
                code: "code-1".to_string()
            }]
        );
    }

    #[tokio::test]
    async fn test_refresh_access_token() {
        let h = harness(json!({}));
        let bundle = h.authorizer.refresh_access_token("rt-1").await.unwrap();

        assert_eq!(bundle.refresh_token(), Some("new-refresh"));
        assert_eq!(
            h.provider.grants.lock().as_slice(),
            &[TokenGrant::RefreshToken {
                refresh_token: "rt-1".to_string()
            }]
        );
    }

    #[tokio::test]
    async fn test_exchange_failure_propagates() {
        let h = harness(json!({}));
        let result = h.authorizer.exchange_authorization_code("bad").await;
        assert!(matches!(result, Err(GatewayError::IdentityProvider { .. })));
    }
}

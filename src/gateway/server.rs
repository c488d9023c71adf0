//! # HTTP Server Module
//!
//! Wires the authorizer and event logger into an axum application:
//!
//! - `GET  /health`             liveness probe
//! - `GET  /auth/login`         redirect to the provider's hosted login page
//! - `POST /auth/token`         exchange an authorization code for tokens
//! - `POST /auth/refresh`       exchange a refresh token for a new access token
//! - `GET  /api/v1/me`          caller's profile and effective roles (protected)
//! - `GET  /admin/cache/stats`  profile cache statistics (admin only)
//!
//! Protected routes run behind the authorization middleware; every route
//! runs behind the request logger.

use axum::{
    extract::State,
    http::{header::LOCATION, StatusCode},
    middleware::from_fn_with_state,
    response::{IntoResponse, Response},
    routing::{get, post},
    Extension, Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::analytics::EventLogger;
use crate::auth::{
    authorize_request, AuthGuard, AuthenticatedProfile, HttpIdentityProvider, IdentityProvider,
    ScopeRegistry, TokenAuthorizer,
};
use crate::caching::{ProfileCache, SystemClock};
use crate::core::config::{GatewayAuthConfig, RouteScopeConfig};
use crate::core::error::{GatewayError, GatewayResult};
use crate::middleware::log_requests;

pub const CACHE_STATS_PATH: &str = "/admin/cache/stats";

/// State shared by the route handlers
#[derive(Clone)]
struct AppState {
    authorizer: Arc<TokenAuthorizer>,
    events: EventLogger,
}

/// The auth gateway's HTTP front
pub struct GatewayServer {
    config: GatewayAuthConfig,
    authorizer: Arc<TokenAuthorizer>,
    guard: AuthGuard,
    events: EventLogger,
}

impl GatewayServer {
    /// Build the server with the HTTP identity provider and configured analytics sink
    pub fn new(config: GatewayAuthConfig) -> GatewayResult<Self> {
        let provider = Arc::new(HttpIdentityProvider::new(config.identity_provider.clone())?);
        let cache = Arc::new(ProfileCache::new(&config.cache, Arc::new(SystemClock)));
        let events = EventLogger::from_config(&config.analytics)?;

        Self::with_components(config, provider, cache, events)
    }

    /// Build the server around caller-supplied collaborators
    pub fn with_components(
        config: GatewayAuthConfig,
        provider: Arc<dyn IdentityProvider>,
        cache: Arc<ProfileCache>,
        events: EventLogger,
    ) -> GatewayResult<Self> {
        let authorizer = Arc::new(TokenAuthorizer::new(
            &config.identity_provider,
            &config.authorization,
            provider,
            cache,
        )?);

        let mut routes = config.authorization.routes.clone();
        if !routes.iter().any(|route| route.path == CACHE_STATS_PATH) {
            routes.push(RouteScopeConfig {
                method: Some("GET".to_string()),
                path: CACHE_STATS_PATH.to_string(),
                required_roles: vec![config.authorization.admin_role.clone()],
            });
        }
        let scopes = Arc::new(ScopeRegistry::from_config(&routes)?);

        let guard = AuthGuard::new(
            authorizer.clone(),
            scopes,
            config.authorization.excluded_paths.clone(),
        );

        Ok(Self {
            config,
            authorizer,
            guard,
            events,
        })
    }

    pub fn authorizer(&self) -> &Arc<TokenAuthorizer> {
        &self.authorizer
    }

    pub fn events(&self) -> &EventLogger {
        &self.events
    }

    pub fn bind_addr(&self) -> GatewayResult<SocketAddr> {
        format!("{}:{}", self.config.server.bind_address, self.config.server.port)
            .parse()
            .map_err(|e| GatewayError::config(format!("Invalid bind address: {}", e)))
    }

    /// Application router with the built-in routes only
    pub fn router(&self) -> Router {
        self.router_with(Router::new())
    }

    /// Application router with `api` mounted behind the authorization middleware
    pub fn router_with(&self, api: Router) -> Router {
        let state = AppState {
            authorizer: self.authorizer.clone(),
            events: self.events.clone(),
        };

        let protected = Router::new()
            .route("/api/v1/me", get(current_profile))
            .route(CACHE_STATS_PATH, get(cache_stats))
            .with_state(state.clone())
            .merge(api)
            .layer(from_fn_with_state(self.guard.clone(), authorize_request));

        let public = Router::new()
            .route("/health", get(health))
            .route("/auth/login", get(login))
            .route("/auth/token", post(exchange_code))
            .route("/auth/refresh", post(refresh_token))
            .with_state(state);

        public
            .merge(protected)
            .layer(from_fn_with_state(self.events.clone(), log_requests))
            .layer(TraceLayer::new_for_http())
    }

    /// Serve until Ctrl-C
    pub async fn run(self) -> GatewayResult<()> {
        let addr = self.bind_addr()?;
        let app = self.router();

        let listener = TcpListener::bind(addr).await?;
        info!(%addr, "Auth gateway listening");

        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await?;

        self.events.flush().await;
        info!("Auth gateway stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
    }
}

#[derive(Debug, Deserialize)]
struct CodeRequest {
    code: String,
}

#[derive(Debug, Deserialize)]
struct RefreshRequest {
    refresh_token: String,
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn login(State(state): State<AppState>) -> Response {
    let url = state.authorizer.build_authorize_url();
    (StatusCode::FOUND, [(LOCATION, url)]).into_response()
}

async fn exchange_code(
    State(state): State<AppState>,
    Json(body): Json<CodeRequest>,
) -> GatewayResult<Json<Value>> {
    if body.code.is_empty() {
        return Err(GatewayError::validation("code", "must not be empty"));
    }

    match state.authorizer.exchange_authorization_code(&body.code).await {
        Ok(bundle) => {
            state.events.info(json!({ "action": "token_exchange" }));
            Ok(Json(bundle.into_value()))
        }
        Err(err) => {
            state
                .events
                .error(json!({ "action": "token_exchange", "error": err.to_string() }));
            Err(err)
        }
    }
}

async fn refresh_token(
    State(state): State<AppState>,
    Json(body): Json<RefreshRequest>,
) -> GatewayResult<Json<Value>> {
    if body.refresh_token.is_empty() {
        return Err(GatewayError::validation("refresh_token", "must not be empty"));
    }

    match state.authorizer.refresh_access_token(&body.refresh_token).await {
        Ok(bundle) => {
            state.events.info(json!({ "action": "token_refresh" }));
            Ok(Json(bundle.into_value()))
        }
        Err(err) => {
            state
                .events
                .error(json!({ "action": "token_refresh", "error": err.to_string() }));
            Err(err)
        }
    }
}

async fn current_profile(Extension(auth): Extension<AuthenticatedProfile>) -> Json<Value> {
    Json(json!({
        "profile": auth.profile,
        "roles": auth.roles,
    }))
}

async fn cache_stats(State(state): State<AppState>) -> Json<Value> {
    Json(json!(state.authorizer.cache().stats()))
}

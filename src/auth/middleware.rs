//! # Authorization Middleware
//!
//! Plugs the [`TokenAuthorizer`] into an axum/tower request pipeline. The
//! required roles for a request come from a [`RequiredRoles`] extension when
//! an outer layer set one, otherwise from the [`ScopeRegistry`].
//!
//! Allowed requests continue with an [`AuthenticatedProfile`] extension;
//! denied requests are answered with the mapped [`GatewayError`].
//!
//! Two ways to mount it:
//! - `axum::middleware::from_fn_with_state(guard, authorize_request)`
//! - `AuthorizationLayer::new(guard)` as a plain tower layer

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::{Layer, Service};

use crate::auth::authorizer::TokenAuthorizer;
use crate::auth::decision::AuthDecision;
use crate::auth::scopes::ScopeRegistry;
use crate::core::error::GatewayError;
use crate::core::types::Profile;

/// Roles an operation requires, set by an outer layer to bypass the registry
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequiredRoles(pub Vec<String>);

/// Profile of the caller, inserted into request extensions once authorized
#[derive(Debug, Clone, PartialEq)]
pub struct AuthenticatedProfile {
    pub profile: Profile,
    pub roles: Vec<String>,
}

impl AuthenticatedProfile {
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }
}

/// Shared state for the authorization middleware
#[derive(Clone)]
pub struct AuthGuard {
    authorizer: Arc<TokenAuthorizer>,
    scopes: Arc<ScopeRegistry>,
    excluded_paths: Arc<Vec<String>>,
}

impl AuthGuard {
    pub fn new(
        authorizer: Arc<TokenAuthorizer>,
        scopes: Arc<ScopeRegistry>,
        excluded_paths: Vec<String>,
    ) -> Self {
        Self {
            authorizer,
            scopes,
            excluded_paths: Arc::new(excluded_paths),
        }
    }

    pub fn authorizer(&self) -> &Arc<TokenAuthorizer> {
        &self.authorizer
    }

    /// Check if path is excluded from authorization
    fn is_excluded_path(&self, path: &str) -> bool {
        self.excluded_paths.iter().any(|excluded| {
            if let Some(prefix) = excluded.strip_suffix('*') {
                path.starts_with(prefix)
            } else {
                path == excluded
            }
        })
    }

    /// Authorize `request`, attaching the caller's profile on success
    pub async fn check(&self, request: &mut Request) -> Result<(), GatewayError> {
        let path = request.uri().path().to_string();
        if self.is_excluded_path(&path) {
            return Ok(());
        }

        let header = request
            .headers()
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);

        let required = match request.extensions().get::<RequiredRoles>() {
            Some(RequiredRoles(roles)) => roles.clone(),
            None => self
                .scopes
                .required_roles(request.method().as_str(), &path),
        };

        let decision = self
            .authorizer
            .authorize(header.as_deref(), &required)
            .await;

        match decision {
            AuthDecision::Allowed { profile, roles } => {
                request
                    .extensions_mut()
                    .insert(AuthenticatedProfile { profile, roles });
                Ok(())
            }
            denied => Err(denied
                .to_error()
                .unwrap_or_else(|| GatewayError::internal("denied decision without error"))),
        }
    }
}

/// Axum middleware function for authorization
pub async fn authorize_request(
    State(guard): State<AuthGuard>,
    mut request: Request,
    next: Next,
) -> Response {
    match guard.check(&mut request).await {
        Ok(()) => next.run(request).await,
        Err(err) => err.into_response(),
    }
}

/// Tower layer for authorization
#[derive(Clone)]
pub struct AuthorizationLayer {
    guard: AuthGuard,
}

impl AuthorizationLayer {
    pub fn new(guard: AuthGuard) -> Self {
        Self { guard }
    }
}

impl<S> Layer<S> for AuthorizationLayer {
    type Service = AuthorizationService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AuthorizationService {
            inner,
            guard: self.guard.clone(),
        }
    }
}

/// Tower service for authorization
#[derive(Clone)]
pub struct AuthorizationService<S> {
    inner: S,
    guard: AuthGuard,
}

impl<S> Service<Request> for AuthorizationService<S>
where
    S: Service<Request, Response = Response> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut request: Request) -> Self::Future {
        let guard = self.guard.clone();
        let clone = self.inner.clone();
        // The clone may not be ready; keep the one poll_ready was called on
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move {
            match guard.check(&mut request).await {
                Ok(()) => inner.call(request).await,
                Err(err) => Ok(err.into_response()),
            }
        })
    }
}

/// Helpers for handlers that need the caller's identity
pub mod utils {
    use super::AuthenticatedProfile;
    use axum::extract::Request;

    /// Extract the authenticated profile from a request
    pub fn authenticated_profile(request: &Request) -> Option<&AuthenticatedProfile> {
        request.extensions().get::<AuthenticatedProfile>()
    }

    pub fn is_authenticated(request: &Request) -> bool {
        authenticated_profile(request).is_some()
    }

    /// Provider subject of the caller
    pub fn subject(request: &Request) -> Option<String> {
        authenticated_profile(request)
            .and_then(|auth| auth.profile.subject())
            .map(str::to_string)
    }

    pub fn has_role(request: &Request, role: &str) -> bool {
        authenticated_profile(request)
            .map(|auth| auth.has_role(role))
            .unwrap_or(false)
    }
}

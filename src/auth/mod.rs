//! # Authentication and Authorization
//!
//! Bearer-token validation against an external identity provider, profile
//! caching and role checks.

pub mod authorizer;
pub mod decision;
pub mod middleware;
pub mod provider;
pub mod scopes;

#[cfg(test)]
mod tests;

pub use authorizer::{ProfileResolution, TokenAuthorizer};
pub use decision::{AuthDecision, DenialReason, ProviderFailure, ACCESS_DENIED};
pub use middleware::{
    authorize_request, AuthGuard, AuthenticatedProfile, AuthorizationLayer, RequiredRoles,
};
pub use provider::{
    HttpIdentityProvider, IdentityProvider, ProviderResponse, ProviderSignal, TokenGrant,
};
pub use scopes::ScopeRegistry;

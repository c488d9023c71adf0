//! Authorization outcomes.

use std::fmt;

use crate::auth::provider::ProviderSignal;
use crate::core::error::GatewayError;
use crate::core::types::Profile;

/// Message returned for every denial the provider did not word itself
pub const ACCESS_DENIED: &str = "Access Denied. Please check your token";

/// Why the provider lookup did not produce a profile
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderFailure {
    Unauthorized,
    RateLimited,
    /// Transport error or unusable provider response
    Unavailable(String),
}

impl From<ProviderSignal> for ProviderFailure {
    fn from(signal: ProviderSignal) -> Self {
        match signal {
            ProviderSignal::Unauthorized => Self::Unauthorized,
            ProviderSignal::RateLimited => Self::RateLimited,
        }
    }
}

/// Which check rejected the request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DenialReason {
    /// Header missing or without the bearer prefix
    MalformedHeader,
    Provider(ProviderFailure),
    /// Required roles the caller does not hold, in declaration order
    InsufficientRole { missing: Vec<String> },
}

impl DenialReason {
    /// Short tag for logs and metrics
    pub fn tag(&self) -> &'static str {
        match self {
            Self::MalformedHeader => "malformed_header",
            Self::Provider(_) => "provider_error",
            Self::InsufficientRole { .. } => "insufficient_role",
        }
    }
}

impl fmt::Display for DenialReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MalformedHeader => f.write_str("malformed authorization header"),
            Self::Provider(ProviderFailure::Unauthorized) => f.write_str("provider rejected token"),
            Self::Provider(ProviderFailure::RateLimited) => f.write_str("provider rate limited lookup"),
            Self::Provider(ProviderFailure::Unavailable(detail)) => {
                write!(f, "provider unavailable: {}", detail)
            }
            Self::InsufficientRole { missing } => {
                write!(f, "missing roles: {}", missing.join(", "))
            }
        }
    }
}

/// Result of [`TokenAuthorizer::authorize`](crate::auth::TokenAuthorizer::authorize)
#[derive(Debug, Clone, PartialEq)]
pub enum AuthDecision {
    Allowed {
        profile: Profile,
        roles: Vec<String>,
    },
    Denied {
        message: String,
        reason: DenialReason,
    },
}

impl AuthDecision {
    pub(crate) fn denied(reason: DenialReason) -> Self {
        Self::Denied {
            message: ACCESS_DENIED.to_string(),
            reason,
        }
    }

    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed { .. })
    }

    pub fn reason(&self) -> Option<&DenialReason> {
        match self {
            Self::Allowed { .. } => None,
            Self::Denied { reason, .. } => Some(reason),
        }
    }

    pub fn message(&self) -> Option<&str> {
        match self {
            Self::Allowed { .. } => None,
            Self::Denied { message, .. } => Some(message),
        }
    }

    /// Map a denial onto the error returned to the HTTP client.
    ///
    /// Returns `None` for allowed decisions.
    pub fn to_error(&self) -> Option<GatewayError> {
        let Self::Denied { message, reason } = self else {
            return None;
        };

        Some(match reason {
            DenialReason::MalformedHeader => GatewayError::auth(message.clone()),
            DenialReason::Provider(ProviderFailure::RateLimited) => {
                GatewayError::rate_limited(message.clone())
            }
            DenialReason::Provider(_) => GatewayError::auth(message.clone()),
            DenialReason::InsufficientRole { .. } => GatewayError::authz(message.clone()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[test]
    fn test_denial_status_mapping() {
        let malformed = AuthDecision::denied(DenialReason::MalformedHeader);
        assert_eq!(malformed.to_error().unwrap().status_code(), StatusCode::UNAUTHORIZED);

        let roles = AuthDecision::denied(DenialReason::InsufficientRole {
            missing: vec!["admin".to_string()],
        });
        assert_eq!(roles.to_error().unwrap().status_code(), StatusCode::FORBIDDEN);

        let limited = AuthDecision::Denied {
            message: "Too Many Requests".to_string(),
            reason: DenialReason::Provider(ProviderFailure::RateLimited),
        };
        assert_eq!(limited.to_error().unwrap().status_code(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[test]
    fn test_allowed_has_no_error() {
        let allowed = AuthDecision::Allowed {
            profile: Profile::default(),
            roles: vec![],
        };
        assert!(allowed.is_allowed());
        assert!(allowed.to_error().is_none());
        assert!(allowed.reason().is_none());
    }

    #[test]
    fn test_tags() {
        assert_eq!(DenialReason::MalformedHeader.tag(), "malformed_header");
        assert_eq!(
            DenialReason::Provider(ProviderFailure::Unauthorized).tag(),
            "provider_error"
        );
        assert_eq!(
            DenialReason::InsufficientRole { missing: vec![] }.tag(),
            "insufficient_role"
        );
    }

    #[test]
    fn test_generic_message() {
        let denied = AuthDecision::denied(DenialReason::MalformedHeader);
        assert_eq!(denied.message(), Some(ACCESS_DENIED));
    }
}

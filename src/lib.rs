//! # Gateway Auth - Core Library Crate
//!
//! Bearer-token authorization and analytics event logging for services that
//! sit behind the API Gateway.
//!
//! The crate is built from a handful of cooperating pieces:
//!
//! - `auth`: the `TokenAuthorizer`, its identity provider seam, per-route
//!   role requirements and the axum/tower middleware that enforces them
//! - `caching`: the time-bounded profile cache keyed by access token
//! - `analytics`: the `EventLogger` and the sinks it delivers events to
//! - `middleware`: request logging that feeds the event logger
//! - `gateway`: the HTTP server that wires everything into one router
//! - `observability`: tracing subscriber setup
//!
//! ## Example
//!
//! ```no_run
//! use gateway_auth::{GatewayAuthConfig, GatewayServer};
//!
//! # async fn run() -> gateway_auth::GatewayResult<()> {
//! let config = GatewayAuthConfig::from_env()?;
//! GatewayServer::new(config)?.run().await
//! # }
//! ```

/// Error types, configuration and shared data structures
pub mod core;

/// Token authorization: profile lookup, role checks and the login/token flows
pub mod auth;

/// Time-bounded cache of identity profiles
pub mod caching;

/// Analytics events and the sinks that receive them
pub mod analytics;

/// Request logging middleware
pub mod middleware;

/// HTTP server that exposes the auth endpoints and protects the API routes
pub mod gateway;

/// Logging setup
pub mod observability;

/// Main error type used throughout the crate
pub use core::error::{GatewayError, GatewayResult};

/// Top-level configuration
pub use core::config::GatewayAuthConfig;

pub use core::types::{Profile, RequestLogContext, TokenBundle};

pub use auth::{AuthDecision, AuthGuard, AuthenticatedProfile, IdentityProvider, TokenAuthorizer};

pub use caching::ProfileCache;

pub use analytics::{AnalyticsSink, EventLogger};

pub use gateway::GatewayServer;

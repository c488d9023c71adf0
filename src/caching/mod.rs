//! # Caching Module
//!
//! Short-lived, in-process caching of identity provider profiles so repeated
//! requests with the same access token do not hit the provider.
//!
//! ## Usage Example
//! ```rust
//! use gateway_auth::caching::ProfileCache;
//! use gateway_auth::core::types::Profile;
//!
//! let cache = ProfileCache::with_defaults();
//! cache.insert("access-token", Profile::default());
//! assert!(cache.get("access-token").is_some());
//! ```

pub mod profile_cache;

pub use profile_cache::{
    CachedProfile, Clock, ManualClock, ProfileCache, ProfileCacheStats, SystemClock,
};

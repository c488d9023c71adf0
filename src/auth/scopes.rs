//! # Required Roles Registry
//!
//! Per-operation required roles, keyed by HTTP method and path pattern.
//! Patterns use `matchit` syntax (`/api/v1/projects/:id`, `/files/*path`).

use matchit::Router;
use std::collections::BTreeMap;

use crate::core::config::RouteScopeConfig;
use crate::core::error::{GatewayError, GatewayResult};

#[derive(Debug, Clone)]
struct MethodScopes {
    /// Uppercased method, `None` for any method
    method: Option<String>,
    required_roles: Vec<String>,
}

/// Lookup table from operation to required roles
pub struct ScopeRegistry {
    router: Router<Vec<MethodScopes>>,
    len: usize,
}

impl ScopeRegistry {
    pub fn empty() -> Self {
        Self {
            router: Router::new(),
            len: 0,
        }
    }

    pub fn from_config(routes: &[RouteScopeConfig]) -> GatewayResult<Self> {
        let mut by_path: BTreeMap<&str, Vec<MethodScopes>> = BTreeMap::new();

        for route in routes {
            let method = route.method.as_ref().map(|m| m.to_uppercase());
            let entries = by_path.entry(route.path.as_str()).or_default();

            if entries.iter().any(|existing| existing.method == method) {
                return Err(GatewayError::config(format!(
                    "Duplicate required-roles entry for {} {}",
                    method.as_deref().unwrap_or("ANY"),
                    route.path
                )));
            }

            entries.push(MethodScopes {
                method,
                required_roles: route.required_roles.clone(),
            });
        }

        let mut router = Router::new();
        for (path, entries) in by_path {
            router.insert(path, entries).map_err(|e| {
                GatewayError::config(format!("Invalid route pattern '{}': {}", path, e))
            })?;
        }

        Ok(Self {
            router,
            len: routes.len(),
        })
    }

    /// Roles required for `method path`.
    ///
    /// An entry for the exact method wins over a method-less one. Unregistered
    /// operations require no roles.
    pub fn required_roles(&self, method: &str, path: &str) -> Vec<String> {
        let Ok(matched) = self.router.at(path) else {
            return Vec::new();
        };

        let entries = matched.value;
        entries
            .iter()
            .find(|entry| {
                entry
                    .method
                    .as_deref()
                    .is_some_and(|m| m.eq_ignore_ascii_case(method))
            })
            .or_else(|| entries.iter().find(|entry| entry.method.is_none()))
            .map(|entry| entry.required_roles.clone())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl Default for ScopeRegistry {
    fn default() -> Self {
        Self::empty()
    }
}

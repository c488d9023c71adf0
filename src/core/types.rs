//! # Core Types
//!
//! Data structures shared by the authorizer, the cache and the event logger.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::collections::HashMap;

/// User profile as returned by the identity provider.
///
/// The provider decides which attributes exist, so the profile keeps the raw
/// JSON object and exposes typed accessors for the few fields the authorizer
/// reads.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Profile(Map<String, Value>);

impl Profile {
    /// Wrap a JSON object
    pub fn new(attributes: Map<String, Value>) -> Self {
        Self(attributes)
    }

    /// Profile carrying only a `message` attribute, used for non-JSON provider payloads
    pub fn from_message<S: Into<String>>(message: S) -> Self {
        let mut attributes = Map::new();
        attributes.insert("message".to_string(), Value::String(message.into()));
        Self(attributes)
    }

    /// Raw attribute lookup
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Explicit role list stored under `claim`.
    ///
    /// Returns `None` when the claim is absent or not an array. Non-string
    /// elements are skipped.
    pub fn roles(&self, claim: &str) -> Option<Vec<String>> {
        self.0.get(claim)?.as_array().map(|roles| {
            roles
                .iter()
                .filter_map(|role| role.as_str().map(str::to_string))
                .collect()
        })
    }

    pub fn email(&self) -> Option<&str> {
        self.0.get("email").and_then(Value::as_str)
    }

    pub fn email_verified(&self) -> bool {
        self.0
            .get("email_verified")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// Provider subject identifier (`sub`)
    pub fn subject(&self) -> Option<&str> {
        self.0.get("sub").and_then(Value::as_str)
    }

    pub fn attributes(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_attributes(self) -> Map<String, Value> {
        self.0
    }
}

impl From<Map<String, Value>> for Profile {
    fn from(attributes: Map<String, Value>) -> Self {
        Self(attributes)
    }
}

/// Token endpoint response, forwarded verbatim to the caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenBundle(Value);

impl TokenBundle {
    pub fn new(body: Value) -> Self {
        Self(body)
    }

    pub fn access_token(&self) -> Option<&str> {
        self.0.get("access_token").and_then(Value::as_str)
    }

    pub fn refresh_token(&self) -> Option<&str> {
        self.0.get("refresh_token").and_then(Value::as_str)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }
}

/// What the request logger needs to know about an incoming request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestLogContext {
    pub client_ip: Option<String>,
    pub path: String,
    pub query: HashMap<String, String>,
}

impl RequestLogContext {
    pub fn new<S: Into<String>>(path: S) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    pub fn with_client_ip<S: Into<String>>(mut self, client_ip: S) -> Self {
        self.client_ip = Some(client_ip.into());
        self
    }

    /// Parse a raw query string (`a=1&b=two`) into the query map
    pub fn with_query_string(mut self, query: &str) -> Self {
        self.query = url::form_urlencoded::parse(query.as_bytes())
            .into_owned()
            .collect();
        self
    }
}

/// Short, stable identifier for a token that is safe to put in logs
pub fn token_fingerprint(token: &str) -> String {
    let digest = Sha256::digest(token.as_bytes());
    hex::encode(&digest[..6])
}

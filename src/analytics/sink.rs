//! # Analytics Sinks
//!
//! Destinations for analytics events. [`MixpanelSink`] posts to a Mixpanel
//! compatible `/track` endpoint, [`TracingSink`] writes events to the log when
//! no analytics project is configured, and [`MemorySink`] keeps them in memory.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use parking_lot::Mutex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{debug, info};
use url::Url;
use uuid::Uuid;

use crate::core::config::AnalyticsConfig;
use crate::core::error::{GatewayError, GatewayResult};

/// A named event and its properties
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsEvent {
    pub name: String,
    pub properties: Map<String, Value>,
}

/// Receives analytics events
#[async_trait]
pub trait AnalyticsSink: Send + Sync {
    async fn track(&self, event: &str, properties: Map<String, Value>) -> GatewayResult<()>;
}

/// Mixpanel ingestion over HTTP
pub struct MixpanelSink {
    client: Client,
    token: String,
    track_url: Url,
}

#[derive(Debug, Deserialize)]
struct TrackResponse {
    status: i64,
    #[serde(default)]
    error: Option<String>,
}

impl MixpanelSink {
    pub fn new(token: String, config: &AnalyticsConfig) -> GatewayResult<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| GatewayError::config(format!("Failed to build HTTP client: {}", e)))?;

        let track_url = Url::parse(&config.endpoint)
            .and_then(|base| base.join("track"))
            .map_err(|e| {
                GatewayError::config(format!(
                    "Invalid analytics endpoint {}: {}",
                    config.endpoint, e
                ))
            })?;

        Ok(Self {
            client,
            token,
            track_url,
        })
    }

    /// Base64 `data` payload for one event
    fn encode_event(&self, event: &str, mut properties: Map<String, Value>) -> String {
        properties.insert("token".to_string(), Value::String(self.token.clone()));
        properties
            .entry("$insert_id".to_string())
            .or_insert_with(|| Value::String(Uuid::new_v4().simple().to_string()));

        let batch = json!([{ "event": event, "properties": properties }]);
        STANDARD.encode(batch.to_string())
    }
}

#[async_trait]
impl AnalyticsSink for MixpanelSink {
    async fn track(&self, event: &str, properties: Map<String, Value>) -> GatewayResult<()> {
        let data = self.encode_event(event, properties);

        let response = self
            .client
            .post(self.track_url.clone())
            .form(&[("data", data.as_str()), ("verbose", "1")])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(GatewayError::analytics(format!(
                "track endpoint returned {}",
                status
            )));
        }

        let body: TrackResponse = response.json().await?;
        if body.status != 1 {
            return Err(GatewayError::analytics(
                body.error
                    .unwrap_or_else(|| "event rejected".to_string()),
            ));
        }

        debug!(event, "Analytics event delivered");
        Ok(())
    }
}

/// Writes events to the `analytics` tracing target
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

#[async_trait]
impl AnalyticsSink for TracingSink {
    async fn track(&self, event: &str, properties: Map<String, Value>) -> GatewayResult<()> {
        let properties = Value::Object(properties);
        info!(
            target: "analytics",
            event,
            %properties,
            "Analytics event"
        );
        Ok(())
    }
}

/// Keeps events in memory; can be told to fail
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<AnalyticsEvent>>,
    failure: Mutex<Option<String>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject every following event with `message`
    pub fn fail_with<S: Into<String>>(&self, message: S) {
        *self.failure.lock() = Some(message.into());
    }

    pub fn events(&self) -> Vec<AnalyticsEvent> {
        self.events.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }
}

#[async_trait]
impl AnalyticsSink for MemorySink {
    async fn track(&self, event: &str, properties: Map<String, Value>) -> GatewayResult<()> {
        if let Some(message) = self.failure.lock().clone() {
            return Err(GatewayError::analytics(message));
        }

        self.events.lock().push(AnalyticsEvent {
            name: event.to_string(),
            properties,
        });
        Ok(())
    }
}

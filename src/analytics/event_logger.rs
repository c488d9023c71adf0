//! # Event Logger
//!
//! Structured analytics events for incoming requests and application
//! messages. Every payload is stamped with a local ISO date-time before it is
//! handed to the [`AnalyticsSink`]. Delivery runs on a spawned task so the
//! caller never waits on the sink. Sink failures never reach the caller; they
//! are logged and counted.
//!
//! [`EventLogger::flush`] waits for deliveries still in flight, e.g. before
//! shutdown.

use chrono::Local;
use serde_json::{Map, Value};
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::Notify;
use tracing::warn;

use crate::analytics::sink::{AnalyticsSink, MixpanelSink, TracingSink};
use crate::core::config::AnalyticsConfig;
use crate::core::error::GatewayResult;
use crate::core::types::RequestLogContext;

/// `strftime` pattern for the `timestamp` property, e.g. `2024-03-01T14:05:09+0100`
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%z";

pub const REQUEST_EVENT: &str = "REQUEST";
pub const INFO_EVENT: &str = "INFO";
pub const WARN_EVENT: &str = "WARN";
pub const ERROR_EVENT: &str = "ERROR";

/// Deliveries spawned but not yet finished
#[derive(Default)]
struct InFlight {
    count: AtomicUsize,
    idle: Notify,
}

/// Holds one slot in [`InFlight`] for the lifetime of a delivery task
struct DeliveryGuard(Arc<InFlight>);

impl DeliveryGuard {
    fn new(in_flight: Arc<InFlight>) -> Self {
        in_flight.count.fetch_add(1, Ordering::SeqCst);
        Self(in_flight)
    }
}

impl Drop for DeliveryGuard {
    fn drop(&mut self) {
        if self.0.count.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.0.idle.notify_waiters();
        }
    }
}

/// Sends structured events to an analytics sink
#[derive(Clone)]
pub struct EventLogger {
    sink: Arc<dyn AnalyticsSink>,
    path_prefix: String,
    in_flight: Arc<InFlight>,
}

impl EventLogger {
    pub fn new<S: Into<String>>(sink: Arc<dyn AnalyticsSink>, path_prefix: S) -> Self {
        Self {
            sink,
            path_prefix: path_prefix.into(),
            in_flight: Arc::new(InFlight::default()),
        }
    }

    /// Mixpanel when a project key is configured, the tracing log otherwise
    pub fn from_config(config: &AnalyticsConfig) -> GatewayResult<Self> {
        let sink: Arc<dyn AnalyticsSink> = match &config.key {
            Some(key) => Arc::new(MixpanelSink::new(key.clone(), config)?),
            None => Arc::new(TracingSink),
        };

        Ok(Self::new(sink, config.path_prefix.clone()))
    }

    pub fn path_prefix(&self) -> &str {
        &self.path_prefix
    }

    /// Number of events handed off but not yet delivered
    pub fn pending(&self) -> usize {
        self.in_flight.count.load(Ordering::SeqCst)
    }

    /// Wait until every event handed off so far has reached the sink or failed
    pub async fn flush(&self) {
        loop {
            let idle = self.in_flight.idle.notified();
            if self.pending() == 0 {
                return;
            }
            idle.await;
        }
    }

    /// Emit a REQUEST event when the path contains the prefix, then run `proceed`.
    ///
    /// `proceed` always runs, whether or not an event was emitted, and starts
    /// without waiting for delivery. Its output is returned unchanged.
    pub async fn log_request<F, Fut>(&self, ctx: &RequestLogContext, proceed: F) -> Fut::Output
    where
        F: FnOnce() -> Fut,
        Fut: Future,
    {
        if let Some(payload) = self.request_payload(ctx) {
            self.log(REQUEST_EVENT, Value::Object(payload));
        }
        proceed().await
    }

    /// REQUEST properties, or `None` when the path is outside the prefix
    fn request_payload(&self, ctx: &RequestLogContext) -> Option<Map<String, Value>> {
        if !ctx.path.contains(&self.path_prefix) {
            return None;
        }

        let query: Map<String, Value> = ctx
            .query
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect();

        let mut payload = Map::new();
        payload.insert("clientIp".to_string(), Value::from(ctx.client_ip.clone()));
        payload.insert(
            "path".to_string(),
            Value::String(ctx.path.replacen(&self.path_prefix, "", 1)),
        );
        payload.insert("query".to_string(), Value::Object(query));
        Some(payload)
    }

    pub fn info(&self, payload: Value) {
        self.log(INFO_EVENT, payload)
    }

    pub fn warn(&self, payload: Value) {
        self.log(WARN_EVENT, payload)
    }

    pub fn error(&self, payload: Value) {
        self.log(ERROR_EVENT, payload)
    }

    /// Stamp `payload` with `timestamp` and hand it to a delivery task.
    ///
    /// Non-object payloads are wrapped as `{"message": payload}`. Any existing
    /// `timestamp` property is overwritten. Outside a tokio runtime the event
    /// is dropped with a warning.
    pub fn log(&self, event_name: &str, payload: Value) {
        let mut properties = match payload {
            Value::Object(map) => map,
            other => {
                let mut map = Map::new();
                map.insert("message".to_string(), other);
                map
            }
        };

        properties.insert(
            "timestamp".to_string(),
            Value::String(Local::now().format(TIMESTAMP_FORMAT).to_string()),
        );

        metrics::counter!("analytics_events_total", "event" => event_name.to_string()).increment(1);

        let Ok(runtime) = Handle::try_current() else {
            metrics::counter!("analytics_sink_failures_total").increment(1);
            warn!(event = event_name, "No async runtime, analytics event dropped");
            return;
        };

        let guard = DeliveryGuard::new(self.in_flight.clone());
        let sink = self.sink.clone();
        let event = event_name.to_string();
        runtime.spawn(async move {
            let _guard = guard;
            if let Err(err) = sink.track(&event, properties).await {
                metrics::counter!("analytics_sink_failures_total").increment(1);
                warn!(event = %event, error = %err, "Failed to deliver analytics event");
            }
        });
    }
}

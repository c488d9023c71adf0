//! # Analytics
//!
//! Request and application events sent to an external analytics service.

pub mod event_logger;
pub mod sink;

pub use event_logger::{EventLogger, TIMESTAMP_FORMAT};
pub use sink::{AnalyticsEvent, AnalyticsSink, MemorySink, MixpanelSink, TracingSink};

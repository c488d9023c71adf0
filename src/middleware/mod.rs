pub mod request_logging;

pub use request_logging::{log_requests, request_log_context};

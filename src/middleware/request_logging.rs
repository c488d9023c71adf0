use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::Response,
};
use std::net::SocketAddr;
use std::time::Instant;
use tracing::info;

use crate::analytics::EventLogger;
use crate::core::types::RequestLogContext;

/// Build the analytics view of a request.
///
/// The client IP is the first `X-Forwarded-For` entry, then `X-Real-IP`, then
/// the peer address when the server was started with connect info.
pub fn request_log_context(request: &Request) -> RequestLogContext {
    let headers = request.headers();

    let client_ip = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .or_else(|| {
            headers
                .get("x-real-ip")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        })
        .or_else(|| {
            request
                .extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip().to_string())
        });

    let mut ctx = RequestLogContext::new(request.uri().path());
    if let Some(query) = request.uri().query() {
        ctx = ctx.with_query_string(query);
    }
    ctx.client_ip = client_ip;
    ctx
}

/// Axum middleware that reports requests to the event logger
pub async fn log_requests(
    State(logger): State<EventLogger>,
    request: Request,
    next: Next,
) -> Response {
    let ctx = request_log_context(&request);
    let method = request.method().clone();
    let start_time = Instant::now();

    let response = logger.log_request(&ctx, || next.run(request)).await;

    info!(
        method = %method,
        path = %ctx.path,
        status = response.status().as_u16(),
        duration_ms = start_time.elapsed().as_millis() as u64,
        "Request processed"
    );

    response
}

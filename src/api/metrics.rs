//! Prometheus metrics endpoint and HTTP request tracking middleware.
//!
//! This module provides:
//! - A `/metrics` endpoint that returns Prometheus-formatted metrics
//! - Middleware for tracking HTTP request counts and durations
//! - Descriptions for the workflow counters recorded in `crate::workflow`

use anyhow::{Context, Result};
use axum::{
    body::Body,
    extract::{MatchedPath, State},
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::Arc;
use std::time::Instant;

use super::rate_limit::RATE_LIMITED_TOTAL;
use crate::workflow::{
    CONNECTION_REQUESTS_TOTAL, LOGINS_TOTAL, MESSAGES_SENT_TOTAL, POSTS_CREATED_TOTAL,
    QUESTIONS_ASKED_TOTAL, SIGNUPS_COMPLETED_TOTAL, SIGNUPS_STARTED_TOTAL,
};
use crate::AppState;

pub const HTTP_REQUESTS_TOTAL: &str = "http_requests_total";
pub const HTTP_REQUEST_DURATION_SECONDS: &str = "http_request_duration_seconds";
pub const ROSTER_ENTRIES: &str = "roster_entries";
pub const RELAY_ROOMS: &str = "relay_rooms";

/// Initialize the Prometheus metrics recorder and return a handle for rendering metrics.
///
/// This should be called once during application startup.
pub fn init_metrics() -> Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .context("Failed to install Prometheus recorder")?;

    describe_counter!(HTTP_REQUESTS_TOTAL, "Total number of HTTP requests received");
    describe_histogram!(HTTP_REQUEST_DURATION_SECONDS, "HTTP request duration in seconds");
    describe_counter!(SIGNUPS_STARTED_TOTAL, "Signups that reached code delivery");
    describe_counter!(SIGNUPS_COMPLETED_TOTAL, "Signups verified into an identity, by role");
    describe_counter!(LOGINS_TOTAL, "Login attempts by outcome");
    describe_counter!(
        CONNECTION_REQUESTS_TOTAL,
        "Connection request events by outcome (created/duplicate/accepted/rejected)"
    );
    describe_counter!(MESSAGES_SENT_TOTAL, "Direct messages stored");
    describe_counter!(POSTS_CREATED_TOTAL, "Feed posts created");
    describe_counter!(QUESTIONS_ASKED_TOTAL, "Questions posted to the Q&A board");
    describe_counter!(RATE_LIMITED_TOTAL, "Requests refused by a rate limit budget");
    describe_gauge!(ROSTER_ENTRIES, "Entries in the enrollment roster");
    describe_gauge!(RELAY_ROOMS, "Relay rooms with at least one live subscriber channel");

    Ok(handle)
}

/// GET /metrics - Returns Prometheus-formatted metrics.
///
/// This endpoint is accessible without authentication.
pub async fn metrics_endpoint(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    update_gauge_metrics(&state).await;

    match state.metrics_handle.as_ref() {
        Some(h) => (StatusCode::OK, h.render()),
        None => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Metrics not initialized".to_string(),
        ),
    }
}

async fn update_gauge_metrics(state: &AppState) {
    if let Ok(count) = state.stores.roster.roster_count().await {
        gauge!(ROSTER_ENTRIES).set(count as f64);
    }
    gauge!(RELAY_ROOMS).set(state.relay.room_count() as f64);
}

/// Middleware to track HTTP request metrics.
///
/// Records:
/// - `http_requests_total` counter with method, path, and status labels
/// - `http_request_duration_seconds` histogram with method and path labels
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response {
    let start = Instant::now();

    // Use the matched route template so ids do not explode label cardinality
    let path = request
        .extensions()
        .get::<MatchedPath>()
        .map(|mp| mp.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());

    let method = request.method().to_string();

    let response = next.run(request).await;

    let duration = start.elapsed().as_secs_f64();
    let status = response.status().as_u16().to_string();

    counter!(HTTP_REQUESTS_TOTAL, "method" => method.clone(), "path" => path.clone(), "status" => status).increment(1);
    histogram!(HTTP_REQUEST_DURATION_SECONDS, "method" => method, "path" => path).record(duration);

    response
}

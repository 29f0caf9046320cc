use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use serde::Serialize;

use crate::state::AppState;

/// In-process request counters and timing accumulators.
///
/// Everything here is a derived view for the monitoring surface; no
/// request path reads these values back.
pub struct Metrics {
    started_at: Instant,
    requests_total: AtomicU64,
    errors_total: AtomicU64,
    completions_total: AtomicU64,
    streaming_total: AtomicU64,
    request_millis_total: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        Metrics {
            started_at: Instant::now(),
            requests_total: AtomicU64::new(0),
            errors_total: AtomicU64::new(0),
            completions_total: AtomicU64::new(0),
            streaming_total: AtomicU64::new(0),
            request_millis_total: AtomicU64::new(0),
        }
    }

    pub fn record_request(&self, elapsed_millis: u64, is_error: bool) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
        self.request_millis_total
            .fetch_add(elapsed_millis, Ordering::Relaxed);
        if is_error {
            self.errors_total.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_completion(&self, streamed: bool) {
        self.completions_total.fetch_add(1, Ordering::Relaxed);
        if streamed {
            self.streaming_total.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let requests = self.requests_total.load(Ordering::Relaxed);
        let millis = self.request_millis_total.load(Ordering::Relaxed);
        MetricsSnapshot {
            uptime_seconds: self.uptime_seconds(),
            requests_total: requests,
            errors_total: self.errors_total.load(Ordering::Relaxed),
            completions_total: self.completions_total.load(Ordering::Relaxed),
            streaming_completions_total: self.streaming_total.load(Ordering::Relaxed),
            average_latency_ms: if requests == 0 {
                0.0
            } else {
                millis as f64 / requests as f64
            },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub uptime_seconds: u64,
    pub requests_total: u64,
    pub errors_total: u64,
    pub completions_total: u64,
    pub streaming_completions_total: u64,
    pub average_latency_ms: f64,
}

/// Per-request timing middleware. Counts every request that reaches the
/// router and flags 4xx/5xx responses as errors.
pub async fn track_requests(State(app): State<AppState>, req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_owned();
    let start = Instant::now();

    let response = next.run(req).await;

    let elapsed = start.elapsed();
    let status = response.status();
    app.metrics
        .record_request(elapsed.as_millis() as u64, status.is_client_error() || status.is_server_error());
    tracing::debug!(%method, path, %status, elapsed_ms = elapsed.as_millis() as u64, "handled request");

    response
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let metrics = Metrics::new();
        metrics.record_request(10, false);
        metrics.record_request(30, true);
        metrics.record_completion(false);
        metrics.record_completion(true);

        let snap = metrics.snapshot();
        assert_eq!(snap.requests_total, 2);
        assert_eq!(snap.errors_total, 1);
        assert_eq!(snap.completions_total, 2);
        assert_eq!(snap.streaming_completions_total, 1);
        assert!((snap.average_latency_ms - 20.0).abs() < 1e-9);
    }

    #[test]
    fn empty_snapshot_has_zero_average() {
        let snap = Metrics::new().snapshot();
        assert_eq!(snap.requests_total, 0);
        assert_eq!(snap.average_latency_ms, 0.0);
    }
}

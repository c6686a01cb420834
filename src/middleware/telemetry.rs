use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use axum::http::Request;
use axum::middleware::Next;
use axum::response::Response;
use tracing::info;

/// Per-request AI token counters. Cloned into the request extensions by the
/// telemetry middleware; handlers pass it down so services can record the
/// usage the model reported.
#[derive(Clone, Debug, Default)]
pub struct TokenUsage {
    tokens_in: Arc<AtomicU64>,
    tokens_out: Arc<AtomicU64>,
}

impl TokenUsage {
    pub fn add(&self, tokens_in: u64, tokens_out: u64) {
        self.tokens_in.fetch_add(tokens_in, Ordering::Relaxed);
        self.tokens_out.fetch_add(tokens_out, Ordering::Relaxed);
    }

    pub fn totals(&self) -> (u64, u64) {
        (
            self.tokens_in.load(Ordering::Relaxed),
            self.tokens_out.load(Ordering::Relaxed),
        )
    }
}

pub async fn telemetry_middleware(mut req: Request<Body>, next: Next) -> Response {
    let usage = TokenUsage::default();
    req.extensions_mut().insert(usage.clone());

    let route = req.uri().path().to_string();
    let started = Instant::now();
    let response = next.run(req).await;

    let (tokens_in, tokens_out) = usage.totals();
    // placeholder $/M tokens; adjust to real pricing
    let cost_est = (tokens_in + tokens_out) as f64 / 1_000_000.0;
    info!(
        "[AI_METRICS] route={} tokens_in={} tokens_out={} cost_est=${:.4} duration_ms={}",
        route,
        tokens_in,
        tokens_out,
        cost_est,
        started.elapsed().as_millis()
    );
    response
}

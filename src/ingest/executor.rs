// src/ingest/executor.rs
//! One page request with bounded retries, linear backoff and request spacing.
//!
//! Retries on 429, 5xx and network/timeout failures, waiting
//! `retry_delay * attempt` (or the server's `Retry-After`, whichever is longer).
//! Other 4xx statuses return immediately. All waits go through the injected clock.

use metrics::{counter, histogram};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::clock::Clock;
use crate::config::{EndpointConfig, RetryConfig};
use crate::error::{FetchError, Result};
use crate::ingest::transport::{HttpRequest, Transport};
use crate::ingest::types::RawPage;
use crate::telemetry::ensure_metrics_described;

/// Per-executor tallies, surfaced in the session summary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RequestStats {
    pub requests: u64,
    pub errors: u64,
    pub retries: u64,
}

pub struct RequestExecutor {
    transport: Arc<dyn Transport>,
    clock: Arc<dyn Clock>,
    retry: RetryConfig,
    min_spacing: Duration,
    endpoint: EndpointConfig,
    last_finished: Option<DateTime<Utc>>,
    stats: RequestStats,
}

impl RequestExecutor {
    pub fn new(
        transport: Arc<dyn Transport>,
        clock: Arc<dyn Clock>,
        retry: RetryConfig,
        min_spacing: Duration,
        endpoint: EndpointConfig,
    ) -> Self {
        ensure_metrics_described();
        Self {
            transport,
            clock,
            retry,
            min_spacing,
            endpoint,
            last_finished: None,
            stats: RequestStats::default(),
        }
    }

    pub fn stats(&self) -> RequestStats {
        self.stats
    }

    pub fn endpoint(&self) -> &EndpointConfig {
        &self.endpoint
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Fetch and decode one page from `url` with the given query parameters.
    pub fn execute(&mut self, url: &str, params: &[(String, String)]) -> Result<RawPage> {
        let mut headers = Vec::new();
        if let Some(key) = &self.endpoint.api_key {
            headers.push((self.endpoint.api_key_header.clone(), key.clone()));
        }
        let req = HttpRequest {
            url: url.to_string(),
            query: params.to_vec(),
            headers,
            timeout: self.retry.request_timeout(),
        };

        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            self.wait_for_spacing();

            self.stats.requests += 1;
            counter!("feed_requests_total").increment(1);
            let t0 = self.clock.now();
            let res = self.transport.get(&req);
            let finished = self.clock.now();
            self.last_finished = Some(finished);
            histogram!("feed_request_duration_ms")
                .record((finished - t0).num_milliseconds().max(0) as f64);

            let (err, retry_after) = match res {
                Ok(resp) if resp.is_success() => {
                    return Ok(RawPage::decode(&resp.body, &self.endpoint));
                }
                Ok(resp) => {
                    let retry_after = resp.retry_after;
                    (FetchError::from_status(resp.status, resp.body), retry_after)
                }
                Err(e) => (e, None),
            };

            self.stats.errors += 1;
            counter!("feed_request_errors_total", "class" => err.class().as_str()).increment(1);

            if !err.is_retryable() {
                tracing::error!(
                    target: "ingest",
                    url,
                    attempt,
                    class = %err.class(),
                    error = %err,
                    "non-retryable request failure"
                );
                return Err(err);
            }
            if attempt >= max_attempts {
                tracing::warn!(
                    target: "ingest",
                    url,
                    attempts = attempt,
                    class = %err.class(),
                    error = %err,
                    "retry budget exhausted"
                );
                return Err(FetchError::Exhausted {
                    attempts: attempt,
                    last: Box::new(err),
                });
            }

            let backoff = self.retry.retry_delay().saturating_mul(attempt);
            let delay = retry_after.map_or(backoff, |ra| ra.max(backoff));
            tracing::warn!(
                target: "ingest",
                url,
                attempt,
                class = %err.class(),
                delay_ms = delay.as_millis() as u64,
                "request failed, retrying"
            );
            self.stats.retries += 1;
            counter!("feed_request_retries_total").increment(1);
            self.clock.sleep(delay);
        }
    }

    /// Sleep until `min_spacing` has passed since the previous request ended.
    fn wait_for_spacing(&self) {
        let Some(last) = self.last_finished else {
            return;
        };
        let elapsed = (self.clock.now() - last).to_std().unwrap_or(Duration::ZERO);
        if elapsed < self.min_spacing {
            self.clock.sleep(self.min_spacing - elapsed);
        }
    }
}

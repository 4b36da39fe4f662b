// src/telemetry.rs
//! Process-wide counters for the fetch engine, via the `metrics` facade.
//!
//! These are aggregate observability only. Per-session numbers live in the
//! session counters and are what the stopping policy reads.

use metrics::{describe_counter, describe_histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

/// One-time metrics registration (so series show up in the exposition).
pub fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(describe_all);
}

fn describe_all() {
    describe_counter!("feed_requests_total", "HTTP requests issued, retries included.");
    describe_counter!(
        "feed_request_errors_total",
        "Failed HTTP requests, labelled by error class."
    );
    describe_counter!("feed_request_retries_total", "Requests re-issued after a retryable failure.");
    describe_counter!("feed_pages_total", "Pages with records processed.");
    describe_counter!("feed_records_kept_total", "Records inside the time window.");
    describe_counter!("feed_records_stale_total", "Records older than the cutoff.");
    describe_counter!(
        "feed_records_unparseable_total",
        "Records kept despite an unparseable timestamp."
    );
    describe_counter!("feed_sessions_total", "Finished fetch sessions, labelled by stop reason.");
    describe_histogram!("feed_request_duration_ms", "Request duration in milliseconds.");
}

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the Prometheus recorder for this process.
    pub fn install() -> Result<Self, BuildError> {
        let handle = PrometheusBuilder::new().install_recorder()?;
        // Descriptions emitted before the recorder existed went nowhere.
        describe_all();
        Ok(Self { handle })
    }

    /// Prometheus exposition text.
    pub fn render(&self) -> String {
        self.handle.render()
    }
}

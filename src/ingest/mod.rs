// src/ingest/mod.rs
//! Incremental feed ingest: paginated fetch restricted to a rolling window,
//! stopped early once further pages can no longer hold in-window records.
//!
//! [`FetchOrchestrator::fetch_all`] hands back a lazy [`FetchSession`]. Each
//! page goes through the window filter, the entity tracker and the stopping
//! policy; its in-window records are yielded before the stop decision takes
//! effect, so the page that triggers a stop still contributes.
pub mod counters;
pub mod executor;
pub mod paginator;
pub mod policy;
pub mod timestamp;
pub mod tracker;
pub mod transport;
pub mod types;
pub mod window;

use metrics::counter;
use std::collections::VecDeque;
use std::sync::Arc;

use crate::clock::{Clock, SystemClock};
use crate::config::{validate_hard_page_cap, validate_window_hours, FetchConfig};
use crate::error::{ConfigError, FetchError};
use crate::ingest::counters::SessionCounters;
use crate::ingest::executor::RequestExecutor;
use crate::ingest::paginator::CursorPaginator;
use crate::ingest::policy::{HeuristicSignal, StopReason, StoppingPolicy};
use crate::ingest::tracker::EntityActivityTracker;
use crate::ingest::transport::Transport;
use crate::ingest::types::{FeedId, FetchOutcome, RawRecord, SessionSummary};
use crate::ingest::window::{TimeWindow, TimeWindowFilter};
use crate::telemetry::ensure_metrics_described;

/// Builds fetch sessions. Holds no per-session state, so one orchestrator can
/// be shared across threads, one session per feed.
pub struct FetchOrchestrator {
    config: FetchConfig,
    transport: Arc<dyn Transport>,
    clock: Arc<dyn Clock>,
}

impl FetchOrchestrator {
    pub fn new(
        config: FetchConfig,
        transport: Arc<dyn Transport>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        ensure_metrics_described();
        Ok(Self {
            config,
            transport,
            clock,
        })
    }

    pub fn with_system_clock(
        config: FetchConfig,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, ConfigError> {
        Self::new(config, transport, Arc::new(SystemClock))
    }

    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    /// Start a fresh session for `feed_id`. The cutoff is fixed here, once.
    ///
    /// Nothing is requested until the returned session is first polled.
    pub fn fetch_all(
        &self,
        feed_id: impl Into<FeedId>,
        window_hours: f64,
        page_size_hint: u32,
        hard_page_cap: u32,
    ) -> Result<FetchSession, ConfigError> {
        validate_window_hours(window_hours)?;
        validate_hard_page_cap(hard_page_cap)?;
        if page_size_hint == 0 {
            return Err(ConfigError::invalid("page_size_hint", "must be >= 1"));
        }
        self.start_session(feed_id.into(), window_hours, page_size_hint, hard_page_cap)
    }

    /// [`fetch_all`](Self::fetch_all) with window, page size and cap from config.
    pub fn fetch(&self, feed_id: impl Into<FeedId>) -> Result<FetchSession, ConfigError> {
        self.start_session(
            feed_id.into(),
            self.config.window_hours,
            self.config.page_size_hint,
            self.config.hard_page_cap,
        )
    }

    /// Drain a whole session into memory.
    pub fn fetch_all_eager(
        &self,
        feed_id: impl Into<FeedId>,
        window_hours: f64,
        page_size_hint: u32,
        hard_page_cap: u32,
    ) -> Result<FetchOutcome, ConfigError> {
        Ok(self
            .fetch_all(feed_id, window_hours, page_size_hint, hard_page_cap)?
            .into_outcome())
    }

    fn start_session(
        &self,
        feed_id: FeedId,
        window_hours: f64,
        page_size_hint: u32,
        hard_page_cap: u32,
    ) -> Result<FetchSession, ConfigError> {
        let window = TimeWindow::ending_at(self.clock.now(), window_hours)?;
        let executor = RequestExecutor::new(
            self.transport.clone(),
            self.clock.clone(),
            self.config.retry,
            self.config.pacing.min_request_spacing(),
            self.config.endpoint.clone(),
        );
        let paginator = CursorPaginator::new(
            executor,
            feed_id.clone(),
            page_size_hint,
            hard_page_cap,
            self.config.pacing.inter_page_delay(),
        );
        tracing::info!(
            target: "ingest",
            feed = %feed_id,
            window_hours,
            cutoff = %window.cutoff,
            page_size_hint,
            hard_page_cap,
            "fetch session started"
        );
        Ok(FetchSession {
            feed_id,
            paginator,
            filter: TimeWindowFilter::new(&self.config.endpoint),
            window,
            tracker: EntityActivityTracker::new(),
            counters: SessionCounters::new(self.config.history_size),
            policy: StoppingPolicy::new(self.config.thresholds),
            buffer: VecDeque::new(),
            stop: None,
            last_error: None,
            finished: false,
        })
    }
}

/// One single-pass walk over a feed. Yields in-window records page by page;
/// not restartable.
pub struct FetchSession {
    feed_id: FeedId,
    paginator: CursorPaginator,
    filter: TimeWindowFilter,
    window: TimeWindow,
    tracker: EntityActivityTracker,
    counters: SessionCounters,
    policy: StoppingPolicy,
    buffer: VecDeque<RawRecord>,
    stop: Option<StopReason>,
    last_error: Option<FetchError>,
    finished: bool,
}

impl FetchSession {
    /// Set once the walk is over; buffered records may still be pending.
    pub fn stop_reason(&self) -> Option<StopReason> {
        self.stop
    }

    /// The failure behind a `StopReason::Error`, if any.
    pub fn last_error(&self) -> Option<&FetchError> {
        self.last_error.as_ref()
    }

    pub fn summary(&self) -> SessionSummary {
        let stats = self.paginator.request_stats();
        let basis = self.policy.thresholds().overdue_basis;
        SessionSummary {
            feed_id: self.feed_id.clone(),
            pages_visited: self.counters.pages_visited,
            request_count: stats.requests,
            error_count: stats.errors,
            retry_count: stats.retries,
            raw_seen: self.counters.raw_seen,
            kept: self.counters.kept,
            stale: self.counters.stale,
            unparseable: self.counters.unparseable,
            entities_tracked: self.tracker.len(),
            overdue_entities: self
                .tracker
                .snapshot()
                .overdue_entities(self.window.cutoff, basis),
            stop_reason: self.stop,
        }
    }

    /// Consume the rest of the session and pair the records with its summary.
    pub fn into_outcome(mut self) -> FetchOutcome {
        let records: Vec<RawRecord> = self.by_ref().collect();
        FetchOutcome {
            records,
            summary: self.summary(),
        }
    }

    /// Pull one page through filter, tracker and policy.
    fn advance(&mut self) {
        let page = match self.paginator.next() {
            None => {
                self.stop = Some(self.paginator.end_reason().unwrap_or(StopReason::Exhausted));
                return;
            }
            Some(Err(e)) => {
                self.stop = Some(StopReason::Error(e.class()));
                self.last_error = Some(e);
                return;
            }
            Some(Ok(page)) => page,
        };

        let result = self.filter.filter(page, &self.window);
        self.tracker.update(result.observations.iter());
        self.counters.record_page(
            result.raw_count,
            result.kept_count(),
            result.stale_count,
            result.unparseable_count,
        );
        let eval = self
            .policy
            .evaluate(&self.tracker.snapshot(), self.window.cutoff, &self.counters);

        counter!("feed_pages_total").increment(1);
        counter!("feed_records_kept_total").increment(result.kept_count() as u64);
        counter!("feed_records_stale_total").increment(result.stale_count as u64);
        counter!("feed_records_unparseable_total").increment(result.unparseable_count as u64);

        tracing::info!(
            target: "ingest",
            feed = %self.feed_id,
            page = eval.page_number,
            raw = result.raw_count,
            kept = result.kept_count(),
            stale = result.stale_count,
            unparseable = result.unparseable_count,
            utc_marker = result.utc_marker_count,
            assumed_local = result.assumed_local_count,
            overdue_ratio = eval.overdue_ratio,
            active = eval.active_this_page,
            stop = eval.stop.map(HeuristicSignal::as_str).unwrap_or("-"),
            "page processed"
        );

        self.buffer.extend(result.in_window);
        if let Some(signal) = eval.stop {
            self.stop = Some(StopReason::Heuristic(signal));
        }
    }

    fn finish(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        let summary = self.summary();
        let label = summary.stop_reason.map_or("unknown", |r| r.label());
        counter!("feed_sessions_total", "stop" => label).increment(1);
        match &self.last_error {
            Some(err) => tracing::warn!(
                target: "ingest",
                feed = %self.feed_id,
                error = %err,
                summary = ?summary,
                "fetch session ended on error; keeping partial results"
            ),
            None => tracing::info!(
                target: "ingest",
                feed = %self.feed_id,
                stop = %summary.stop_reason.map(|r| r.to_string()).unwrap_or_default(),
                pages = summary.pages_visited,
                requests = summary.request_count,
                kept = summary.kept,
                summary = ?summary,
                "fetch session finished"
            ),
        }
    }
}

impl Iterator for FetchSession {
    type Item = RawRecord;

    fn next(&mut self) -> Option<RawRecord> {
        loop {
            if let Some(rec) = self.buffer.pop_front() {
                return Some(rec);
            }
            if self.stop.is_some() {
                self.finish();
                return None;
            }
            self.advance();
        }
    }
}

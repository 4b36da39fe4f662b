// src/ingest/paginator.rs
//! Cursor-driven page sequence.
//!
//! First request carries no cursor; each later one passes the previous page's
//! `next_cursor` through untouched. The sequence ends on an empty page, a
//! missing cursor, a request failure, or the hard page cap.

use std::time::Duration;

use crate::error::FetchError;
use crate::ingest::executor::{RequestExecutor, RequestStats};
use crate::ingest::policy::StopReason;
use crate::ingest::types::{FeedId, RawPage};

pub struct CursorPaginator {
    executor: RequestExecutor,
    feed_id: FeedId,
    page_size_hint: u32,
    hard_page_cap: u32,
    inter_page_delay: Duration,
    cursor: Option<String>,
    cursor_exhausted: bool,
    pages_yielded: u32,
    end: Option<StopReason>,
}

impl CursorPaginator {
    pub fn new(
        executor: RequestExecutor,
        feed_id: FeedId,
        page_size_hint: u32,
        hard_page_cap: u32,
        inter_page_delay: Duration,
    ) -> Self {
        Self {
            executor,
            feed_id,
            page_size_hint,
            hard_page_cap,
            inter_page_delay,
            cursor: None,
            cursor_exhausted: false,
            pages_yielded: 0,
            end: None,
        }
    }

    /// Why the sequence ended; `None` while pages may still come.
    pub fn end_reason(&self) -> Option<StopReason> {
        self.end
    }

    pub fn request_stats(&self) -> RequestStats {
        self.executor.stats()
    }

    fn request_target(&self) -> (String, Vec<(String, String)>) {
        let ep = self.executor.endpoint();
        let mut params = Vec::with_capacity(3);
        let url = if ep.base_url.contains("{feed_id}") {
            ep.base_url.replace("{feed_id}", self.feed_id.as_str())
        } else {
            params.push((ep.feed_param.clone(), self.feed_id.to_string()));
            ep.base_url.clone()
        };
        params.push((ep.page_size_param.clone(), self.page_size_hint.to_string()));
        if let Some(c) = &self.cursor {
            params.push((ep.cursor_param.clone(), c.clone()));
        }
        (url, params)
    }

    fn finish(&mut self, reason: StopReason) {
        if self.end.is_none() {
            self.end = Some(reason);
        }
    }
}

impl Iterator for CursorPaginator {
    type Item = Result<RawPage, FetchError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.end.is_some() {
            return None;
        }
        if self.cursor_exhausted {
            self.finish(StopReason::Exhausted);
            return None;
        }
        if self.pages_yielded >= self.hard_page_cap {
            tracing::info!(
                target: "ingest",
                feed = %self.feed_id,
                pages = self.pages_yielded,
                cap = self.hard_page_cap,
                "guard-rail stop"
            );
            self.finish(StopReason::GuardRail);
            return None;
        }

        if self.pages_yielded > 0 {
            self.executor.clock().sleep(self.inter_page_delay);
        }

        let (url, params) = self.request_target();
        let page = match self.executor.execute(&url, &params) {
            Ok(page) => page,
            Err(e) => {
                self.finish(StopReason::Error(e.class()));
                return Some(Err(e));
            }
        };

        if page.is_empty() {
            tracing::debug!(target: "ingest", feed = %self.feed_id, "empty page, pagination done");
            self.finish(StopReason::Exhausted);
            return None;
        }

        self.pages_yielded += 1;
        self.cursor = page.next_cursor.clone();
        self.cursor_exhausted = self.cursor.is_none();
        Some(Ok(page))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::{EndpointConfig, RetryConfig};
    use crate::error::ErrorClass;
    use crate::ingest::transport::{HttpResponse, ScriptedTransport};
    use std::sync::Arc;

    fn paginator(t: Arc<ScriptedTransport>, clock: Arc<ManualClock>, cap: u32) -> CursorPaginator {
        let endpoint = EndpointConfig {
            base_url: "http://feed.test/timeline".into(),
            ..Default::default()
        };
        let ex = RequestExecutor::new(
            t,
            clock,
            RetryConfig::default(),
            Duration::from_secs(1),
            endpoint,
        );
        CursorPaginator::new(ex, FeedId::new("list-1"), 20, cap, Duration::from_secs(1))
    }

    fn page_json(n: usize, cursor: Option<&str>) -> String {
        let records: Vec<_> = (0..n).map(|i| serde_json::json!({ "id": i })).collect();
        serde_json::json!({ "records": records, "next_cursor": cursor }).to_string()
    }

    #[test]
    fn passes_cursors_through_and_stops_when_missing() {
        let t = Arc::new(ScriptedTransport::new([
            Ok(HttpResponse::ok(page_json(2, Some("c2")))),
            Ok(HttpResponse::ok(page_json(2, Some("c3")))),
            Ok(HttpResponse::ok(page_json(1, None))),
        ]));
        let clock = Arc::new(ManualClock::starting_now());
        let mut p = paginator(t.clone(), clock.clone(), 15);

        let sizes: Vec<usize> = p.by_ref().map(|r| r.unwrap().records.len()).collect();
        assert_eq!(sizes, vec![2, 2, 1]);
        assert_eq!(p.end_reason(), Some(StopReason::Exhausted));
        assert_eq!(t.request_count(), 3);

        let reqs = t.recorded();
        assert_eq!(reqs[0].query_value("cursor"), None);
        assert_eq!(reqs[0].query_value("feed_id"), Some("list-1"));
        assert_eq!(reqs[0].query_value("count"), Some("20"));
        assert_eq!(reqs[1].query_value("cursor"), Some("c2"));
        assert_eq!(reqs[2].query_value("cursor"), Some("c3"));
        // Inter-page pacing before pages 2 and 3.
        assert_eq!(clock.total_slept(), Duration::from_secs(2));
    }

    #[test]
    fn empty_first_page_ends_immediately() {
        let t = Arc::new(ScriptedTransport::new([Ok(HttpResponse::ok(page_json(0, Some("c2"))))]));
        let clock = Arc::new(ManualClock::starting_now());
        let mut p = paginator(t.clone(), clock, 15);
        assert!(p.next().is_none());
        assert!(p.next().is_none());
        assert_eq!(p.end_reason(), Some(StopReason::Exhausted));
        assert_eq!(t.request_count(), 1);
    }

    #[test]
    fn guard_rail_caps_an_endless_cursor_loop() {
        let t = Arc::new(ScriptedTransport::from_fn(|_, i| {
            Ok(HttpResponse::ok(page_json(1, Some(format!("c{i}").as_str()))))
        }));
        let clock = Arc::new(ManualClock::starting_now());
        let mut p = paginator(t.clone(), clock, 4);
        assert_eq!(p.by_ref().count(), 4);
        assert_eq!(p.end_reason(), Some(StopReason::GuardRail));
        assert_eq!(t.request_count(), 4);
    }

    #[test]
    fn failure_ends_sequence_with_error_class() {
        let t = Arc::new(ScriptedTransport::new([
            Ok(HttpResponse::ok(page_json(1, Some("c2")))),
            Ok(HttpResponse::status(401)),
        ]));
        let clock = Arc::new(ManualClock::starting_now());
        let mut p = paginator(t, clock, 15);
        assert!(p.next().unwrap().is_ok());
        assert!(p.next().unwrap().is_err());
        assert!(p.next().is_none());
        assert_eq!(p.end_reason(), Some(StopReason::Error(ErrorClass::ClientError)));
    }

    #[test]
    fn feed_id_placeholder_in_url() {
        let t = Arc::new(ScriptedTransport::new([Ok(HttpResponse::ok(page_json(1, None)))]));
        let clock = Arc::new(ManualClock::starting_now());
        let endpoint = EndpointConfig {
            base_url: "http://feed.test/lists/{feed_id}/items".into(),
            ..Default::default()
        };
        let ex = RequestExecutor::new(
            t.clone(),
            clock,
            RetryConfig::default(),
            Duration::ZERO,
            endpoint,
        );
        let mut p = CursorPaginator::new(ex, FeedId::new("abc"), 5, 3, Duration::ZERO);
        assert!(p.next().is_some());
        let req = &t.recorded()[0];
        assert_eq!(req.url, "http://feed.test/lists/abc/items");
        assert_eq!(req.query_value("feed_id"), None);
    }
}

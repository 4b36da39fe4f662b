// tests/fetch_scenarios.rs
use chrono::{DateTime, Duration, Utc};
use incremental_feed_fetcher::ingest::timestamp::parse_timestamp;
use incremental_feed_fetcher::ingest::transport::HttpResponse;
use incremental_feed_fetcher::{
    Clock, ErrorClass, FetchConfig, FetchError, FetchOrchestrator, HeuristicSignal, ManualClock,
    ScriptedTransport, StopReason,
};
use serde_json::{json, Value};
use std::sync::Arc;

fn social(ts: DateTime<Utc>) -> String {
    ts.format("%a %b %d %H:%M:%S +0000 %Y").to_string()
}

fn rec(author: &str, ts: DateTime<Utc>) -> Value {
    json!({ "id": format!("{author}-{}", ts.timestamp()), "author": { "id": author }, "createdAt": social(ts) })
}

fn page(records: Vec<Value>, cursor: Option<&str>) -> HttpResponse {
    HttpResponse::ok(json!({ "records": records, "next_cursor": cursor }).to_string())
}

fn setup(t: ScriptedTransport) -> (Arc<ScriptedTransport>, Arc<ManualClock>, FetchOrchestrator) {
    let t = Arc::new(t);
    let clock = Arc::new(ManualClock::starting_now());
    let mut cfg = FetchConfig::default();
    cfg.endpoint.base_url = "http://feed.test/timeline".into();
    let o = FetchOrchestrator::new(cfg, t.clone(), clock.clone()).unwrap();
    (t, clock, o)
}

#[test]
fn all_entities_fall_behind_cutoff_stops_before_fresher_page() {
    let start = Utc::now();
    let t = ScriptedTransport::new([
        Ok(page(
            vec![
                rec("a", start - Duration::hours(1)),
                rec("b", start - Duration::hours(1)),
                rec("c", start - Duration::hours(1)),
            ],
            Some("c2"),
        )),
        Ok(page(
            vec![
                rec("a", start - Duration::hours(4)),
                rec("b", start - Duration::hours(4)),
                rec("c", start - Duration::hours(4)),
            ],
            Some("c3"),
        )),
        // Never requested: the walk stops on page 2.
        Ok(page(vec![rec("a", start - Duration::minutes(10))], None)),
    ]);
    let (t, clock, o) = setup(t);
    let cutoff = clock.now() - Duration::hours(3);

    let out = o.fetch_all_eager("list-1", 3.0, 20, 15).unwrap();
    assert_eq!(out.records.len(), 3);
    assert_eq!(
        out.summary.stop_reason,
        Some(StopReason::Heuristic(HeuristicSignal::AllOverdue))
    );
    assert_eq!(out.summary.pages_visited, 2);
    assert_eq!(out.summary.stale, 3);
    assert_eq!(out.summary.overdue_entities, 3);
    assert_eq!(t.request_count(), 2);

    for r in &out.records {
        let ts = parse_timestamp(r.as_value()["createdAt"].as_str().unwrap()).unwrap();
        assert!(ts.local.with_timezone(&Utc) >= cutoff);
    }
}

#[test]
fn five_pages_without_in_window_records_stop_the_walk() {
    let start = Utc::now();
    let t = ScriptedTransport::from_fn(move |_, i| {
        if i == 0 {
            let fresh = start - Duration::minutes(20);
            Ok(page(
                vec![rec("a", fresh), rec("b", fresh), rec("c", fresh), rec("d", fresh)],
                Some("c1"),
            ))
        } else {
            // Only one quiet entity shows up, always stale: ratio stays low.
            let old = start - Duration::hours(6) - Duration::minutes(i as i64);
            Ok(page(vec![rec("e", old), rec("e", old)], Some(format!("c{}", i + 1).as_str())))
        }
    });
    let (t, _clock, o) = setup(t);

    let mut session = o.fetch_all("list-1", 3.0, 20, 15).unwrap();
    let got: Vec<_> = session.by_ref().collect();
    assert_eq!(got.len(), 4);
    assert_eq!(
        session.stop_reason(),
        Some(StopReason::Heuristic(HeuristicSignal::ConsecutiveEmptyPages))
    );
    let s = session.summary();
    assert_eq!(s.pages_visited, 6);
    assert_eq!(s.stale, 10);
    assert_eq!(s.raw_seen, s.kept + s.stale);
    assert_eq!(t.request_count(), 6);
}

#[test]
fn empty_first_page_is_exhausted_after_one_request() {
    let (t, _clock, o) = setup(ScriptedTransport::new([Ok(page(vec![], Some("c2")))]));
    let out = o.fetch_all_eager("list-1", 3.0, 20, 15).unwrap();
    assert!(out.records.is_empty());
    assert_eq!(out.summary.stop_reason, Some(StopReason::Exhausted));
    assert_eq!(out.summary.pages_visited, 0);
    assert_eq!(out.summary.request_count, 1);
    assert_eq!(t.request_count(), 1);
}

#[test]
fn endless_cursor_loop_hits_guard_rail() {
    let start = Utc::now();
    let t = ScriptedTransport::from_fn(move |_, i| {
        let fresh = start - Duration::minutes(5);
        Ok(page(
            vec![rec("a", fresh), rec("b", fresh), rec("c", fresh)],
            Some(format!("loop-{}", i % 2).as_str()),
        ))
    });
    let (t, clock, o) = setup(t);

    let out = o.fetch_all_eager("list-1", 3.0, 20, 4).unwrap();
    assert_eq!(out.summary.stop_reason, Some(StopReason::GuardRail));
    assert_eq!(out.summary.pages_visited, 4);
    assert_eq!(out.records.len(), 12);
    assert_eq!(t.request_count(), 4);
    // Inter-page pacing between the four pages, never a real sleep.
    assert!(clock.total_slept() >= std::time::Duration::from_secs(3));
}

#[test]
fn client_error_keeps_partial_results() {
    let start = Utc::now();
    let t = ScriptedTransport::new([
        Ok(page(vec![rec("a", start), rec("b", start)], Some("c2"))),
        Ok(HttpResponse {
            status: 404,
            body: "no such list".into(),
            retry_after: None,
        }),
    ]);
    let (t, _clock, o) = setup(t);

    let mut session = o.fetch_all("missing", 3.0, 20, 15).unwrap();
    let got: Vec<_> = session.by_ref().collect();
    assert_eq!(got.len(), 2);
    assert_eq!(
        session.stop_reason(),
        Some(StopReason::Error(ErrorClass::ClientError))
    );
    assert!(matches!(
        session.last_error(),
        Some(FetchError::Client { status: 404, .. })
    ));
    assert_eq!(t.request_count(), 2);
}

#[test]
fn exhausted_server_errors_end_session_with_error() {
    let start = Utc::now();
    let t = ScriptedTransport::from_fn(move |_, i| {
        if i == 0 {
            Ok(page(vec![rec("a", start)], Some("c2")))
        } else {
            Ok(HttpResponse::status(503))
        }
    });
    let (t, clock, o) = setup(t);

    let out = o.fetch_all_eager("list-1", 3.0, 20, 15).unwrap();
    assert_eq!(out.records.len(), 1);
    assert_eq!(
        out.summary.stop_reason,
        Some(StopReason::Error(ErrorClass::ServerError))
    );
    // One good request, then the full budget of three attempts.
    assert_eq!(t.request_count(), 4);
    assert_eq!(out.summary.error_count, 3);
    assert_eq!(out.summary.retry_count, 2);
    // Inter-page delay 1s, then backoff 2s and 4s.
    assert_eq!(
        clock.sleep_log(),
        vec![
            std::time::Duration::from_secs(1),
            std::time::Duration::from_secs(2),
            std::time::Duration::from_secs(4),
        ]
    );
}

#[test]
fn unparseable_timestamps_fail_open() {
    let start = Utc::now();
    let t = ScriptedTransport::new([Ok(page(
        vec![
            rec("a", start),
            json!({ "id": "odd", "author": { "id": "b" }, "createdAt": "sometime last week" }),
            json!({ "id": "bare", "author": { "id": "c" } }),
        ],
        None,
    ))]);
    let (_t, _clock, o) = setup(t);

    let out = o.fetch_all_eager("list-1", 3.0, 20, 15).unwrap();
    let ids: Vec<_> = out
        .records
        .iter()
        .map(|r| r.as_value()["id"].as_str().unwrap().to_string())
        .collect();
    assert!(ids.contains(&"odd".to_string()));
    assert!(ids.contains(&"bare".to_string()));
    assert_eq!(out.summary.unparseable, 2);
    assert_eq!(out.summary.kept, 3);
    assert_eq!(out.summary.stale, 0);
}

#[test]
fn lazy_consumer_does_not_fetch_ahead() {
    let start = Utc::now();
    let t = ScriptedTransport::from_fn(move |_, i| {
        Ok(page(
            vec![rec("a", start), rec("b", start), rec("c", start)],
            Some(format!("c{}", i + 1).as_str()),
        ))
    });
    let (t, _clock, o) = setup(t);

    let session = o.fetch_all("list-1", 3.0, 20, 15).unwrap();
    let first_two: Vec<_> = session.take(2).collect();
    assert_eq!(first_two.len(), 2);
    assert_eq!(t.request_count(), 1);
}

#[test]
fn each_call_starts_a_fresh_cursor_walk() {
    let start = Utc::now();
    let t = ScriptedTransport::from_fn(move |req, _| {
        let next = match req.query_value("cursor") {
            None => Some("c2"),
            Some(_) => None,
        };
        Ok(page(vec![rec("a", start)], next))
    });
    let (t, _clock, o) = setup(t);

    assert_eq!(o.fetch("list-1").unwrap().count(), 2);
    assert_eq!(o.fetch("list-1").unwrap().count(), 2);
    let cursors: Vec<_> = t
        .recorded()
        .iter()
        .map(|r| r.query_value("cursor").map(str::to_string))
        .collect();
    assert_eq!(
        cursors,
        vec![None, Some("c2".to_string()), None, Some("c2".to_string())]
    );
}

#[test]
fn utc_markers_and_numeric_offsets_agree() {
    let forms = [
        "Tue Oct 14 12:00:00 +0000 2025",
        "Tue Oct 14 14:30:00 +0230 2025",
        "2025-10-14 12:00:00 UTC",
        "Tue Oct 14 12:00:00 GMT 2025",
        "2025-10-14T07:00:00-05:00",
        "Tue, 14 Oct 2025 12:00:00 GMT",
    ];
    let parsed: Vec<_> = forms
        .iter()
        .map(|s| parse_timestamp(s).unwrap_or_else(|| panic!("unparsed: {s}")).local)
        .collect();
    for (form, local) in forms.iter().zip(&parsed) {
        assert_eq!(*local, parsed[0], "{form}");
    }
}

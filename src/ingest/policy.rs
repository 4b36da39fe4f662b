// src/ingest/policy.rs
//! Early-stopping decision.
//!
//! Several redundant signals, any of which halts the walk. A single threshold
//! can be held open forever by one slow-but-alive entity; together they bound
//! wasted requests without truncating entities that are still producing.
//!
//! Evaluated once per page, after filtering and the tracker update. Pure: the
//! same snapshot, cutoff and counters always give the same answer.

use chrono::{DateTime, Local};
use serde::Serialize;
use std::fmt;

use crate::config::StopThresholds;
use crate::error::ErrorClass;
use crate::ingest::counters::SessionCounters;
use crate::ingest::tracker::TrackerSnapshot;

/// Which heuristic fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HeuristicSignal {
    /// Every tracked entity's newest record predates the cutoff.
    AllOverdue,
    /// Nobody active this page and a majority already stale.
    IdleMajorityOverdue,
    /// Almost everybody stale, at most a trickle still active.
    NearlyAllOverdue,
    /// Too many pages in a row without a single in-window record.
    ConsecutiveEmptyPages,
    /// Rolling in-window yield per page below the floor.
    LowYield,
    /// Deep into the walk and nobody active this page.
    DeepPageIdle,
}

impl HeuristicSignal {
    pub fn as_str(self) -> &'static str {
        match self {
            HeuristicSignal::AllOverdue => "all_overdue",
            HeuristicSignal::IdleMajorityOverdue => "idle_majority_overdue",
            HeuristicSignal::NearlyAllOverdue => "nearly_all_overdue",
            HeuristicSignal::ConsecutiveEmptyPages => "consecutive_empty_pages",
            HeuristicSignal::LowYield => "low_yield",
            HeuristicSignal::DeepPageIdle => "deep_page_idle",
        }
    }
}

/// Terminal state of a fetch session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "detail")]
pub enum StopReason {
    /// Cursor ran out or a page came back empty.
    Exhausted,
    /// Hard page cap reached.
    GuardRail,
    Heuristic(HeuristicSignal),
    /// Non-retryable or budget-exhausted request failure; partial results stand.
    Error(ErrorClass),
}

impl StopReason {
    pub fn label(&self) -> &'static str {
        match self {
            StopReason::Exhausted => "exhausted",
            StopReason::GuardRail => "guardrail",
            StopReason::Heuristic(_) => "heuristic",
            StopReason::Error(_) => "error",
        }
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::Heuristic(s) => write!(f, "heuristic:{}", s.as_str()),
            StopReason::Error(c) => write!(f, "error:{c}"),
            other => f.write_str(other.label()),
        }
    }
}

/// Everything the policy computed for one page, for logging.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PolicyEvaluation {
    pub page_number: u32,
    pub total_entities: usize,
    pub overdue_entities: usize,
    pub overdue_ratio: f64,
    pub active_this_page: usize,
    pub consecutive_empty_pages: u32,
    pub rolling_average: Option<f64>,
    pub stop: Option<HeuristicSignal>,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct StoppingPolicy {
    thresholds: StopThresholds,
}

impl StoppingPolicy {
    pub fn new(thresholds: StopThresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> &StopThresholds {
        &self.thresholds
    }

    /// `counters` must already include the current page.
    pub fn evaluate(
        &self,
        snapshot: &TrackerSnapshot<'_>,
        cutoff: DateTime<Local>,
        counters: &SessionCounters,
    ) -> PolicyEvaluation {
        let t = &self.thresholds;
        let total = snapshot.total_entities();
        let overdue = snapshot.overdue_entities(cutoff, t.overdue_basis);
        let ratio = if total == 0 {
            0.0
        } else {
            overdue as f64 / total as f64
        };
        let active = snapshot.active_this_page();
        let rolling_average = counters.history.full_average();
        let page_number = counters.pages_visited;

        let stop = if total > 0 && overdue == total {
            Some(HeuristicSignal::AllOverdue)
        } else if active == 0 && ratio >= t.overdue_majority_ratio && total > 0 {
            Some(HeuristicSignal::IdleMajorityOverdue)
        } else if ratio >= t.overdue_high_ratio && active <= t.high_ratio_max_active && total > 0
        {
            Some(HeuristicSignal::NearlyAllOverdue)
        } else if counters.consecutive_empty_pages >= t.consecutive_empty_limit {
            Some(HeuristicSignal::ConsecutiveEmptyPages)
        } else if rolling_average.is_some_and(|avg| avg < t.min_avg_valid_per_page) {
            Some(HeuristicSignal::LowYield)
        } else if page_number >= t.deep_page_threshold && active == 0 {
            Some(HeuristicSignal::DeepPageIdle)
        } else {
            None
        };

        PolicyEvaluation {
            page_number,
            total_entities: total,
            overdue_entities: overdue,
            overdue_ratio: ratio,
            active_this_page: active,
            consecutive_empty_pages: counters.consecutive_empty_pages,
            rolling_average,
            stop,
        }
    }
}

// src/ingest/window.rs
//! Per-record time-window filter.
//!
//! Splits a page into in-window records and a stale count, and reports per
//! entity whether it contributed anything in-window plus its newest timestamp
//! on this page. Unparseable timestamps fail open: the record is kept.

use chrono::{DateTime, Local, TimeDelta, Utc};
use std::collections::HashMap;

use crate::config::{validate_window_hours, EndpointConfig};
use crate::error::ConfigError;
use crate::ingest::timestamp::{parse_timestamp_value, TzOrigin};
use crate::ingest::types::{EntityId, RawPage, RawRecord};

/// Rolling window fixed at the start of one fetch call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeWindow {
    pub window_hours: f64,
    pub cutoff: DateTime<Local>,
}

impl TimeWindow {
    /// `cutoff = now - window_hours`, computed once and never re-evaluated.
    ///
    /// Fails instead of panicking when the window reaches past what
    /// `DateTime` can represent.
    pub fn ending_at(now: DateTime<Utc>, window_hours: f64) -> Result<Self, ConfigError> {
        validate_window_hours(window_hours)?;
        let out_of_range = || {
            ConfigError::invalid(
                "window_hours",
                format!("{window_hours}h before {now} is out of range"),
            )
        };
        let millis = (window_hours * 3_600_000.0).round();
        if millis >= i64::MAX as f64 {
            return Err(out_of_range());
        }
        let cutoff = TimeDelta::try_milliseconds(millis as i64)
            .and_then(|delta| now.checked_sub_signed(delta))
            .ok_or_else(out_of_range)?;
        Ok(Self {
            window_hours,
            cutoff: cutoff.with_timezone(&Local),
        })
    }

    pub fn contains(&self, ts: DateTime<Local>) -> bool {
        ts >= self.cutoff
    }
}

/// What one page said about one entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EntityObservation {
    pub contributed_in_window: bool,
    /// Newest parseable timestamp on this page, if any.
    pub max_timestamp: Option<DateTime<Local>>,
}

#[derive(Debug, Clone, Default)]
pub struct PageFilterResult {
    pub in_window: Vec<RawRecord>,
    pub raw_count: usize,
    pub stale_count: usize,
    /// Kept despite a timestamp that no format matched.
    pub unparseable_count: usize,
    /// Parsed timestamps with no numeric offset, read as UTC from a marker.
    pub utc_marker_count: usize,
    /// Parsed timestamps with neither offset nor marker, read as local time.
    pub assumed_local_count: usize,
    pub observations: HashMap<EntityId, EntityObservation>,
}

impl PageFilterResult {
    pub fn kept_count(&self) -> usize {
        self.in_window.len()
    }
}

#[derive(Debug, Clone)]
pub struct TimeWindowFilter {
    entity_path: Vec<String>,
    timestamp_keys: Vec<String>,
}

impl TimeWindowFilter {
    pub fn new(endpoint: &EndpointConfig) -> Self {
        Self {
            entity_path: endpoint.entity_path.clone(),
            timestamp_keys: endpoint.timestamp_keys.clone(),
        }
    }

    pub fn filter(&self, page: RawPage, window: &TimeWindow) -> PageFilterResult {
        let mut out = PageFilterResult {
            raw_count: page.records.len(),
            in_window: Vec::with_capacity(page.records.len()),
            ..Default::default()
        };

        for rec in page.records {
            let entity = rec.entity_id(&self.entity_path);
            let parsed = rec
                .timestamp_value(&self.timestamp_keys)
                .and_then(parse_timestamp_value);
            if let Some(ts) = &parsed {
                match ts.origin {
                    TzOrigin::Explicit => {}
                    TzOrigin::UtcMarker => out.utc_marker_count += 1,
                    TzOrigin::AssumedLocal => out.assumed_local_count += 1,
                }
                if ts.origin != TzOrigin::Explicit {
                    tracing::debug!(
                        target: "ingest",
                        entity = %entity,
                        origin = ?ts.origin,
                        timestamp = %ts.local,
                        "timestamp without explicit offset"
                    );
                }
            }
            let obs = out.observations.entry(entity).or_default();

            match parsed {
                Some(ts) => {
                    obs.max_timestamp = Some(match obs.max_timestamp {
                        Some(prev) if prev >= ts.local => prev,
                        _ => ts.local,
                    });
                    if window.contains(ts.local) {
                        obs.contributed_in_window = true;
                        out.in_window.push(rec);
                    } else {
                        out.stale_count += 1;
                    }
                }
                None => {
                    obs.contributed_in_window = true;
                    out.unparseable_count += 1;
                    out.in_window.push(rec);
                }
            }
        }

        debug_assert_eq!(out.kept_count() + out.stale_count, out.raw_count);
        out
    }
}

// src/ingest/tracker.rs
//! Session-scoped per-entity activity.
//!
//! `latest_known` only ever moves forward; `frontier` follows the entity's most
//! recent appearance; `active_this_page` is rewritten on every update;
//! `ever_active` is sticky.

use chrono::{DateTime, Local};
use std::collections::HashMap;

use crate::config::OverdueBasis;
use crate::ingest::types::EntityId;
use crate::ingest::window::EntityObservation;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EntityActivityState {
    /// Max timestamp seen for this entity across the whole session.
    pub latest_known: Option<DateTime<Local>>,
    /// Newest timestamp on the last page that carried a parseable one for this entity.
    pub frontier: Option<DateTime<Local>>,
    pub active_this_page: bool,
    pub ever_active: bool,
}

impl EntityActivityState {
    /// No known timestamp → not overdue.
    pub fn is_overdue(&self, cutoff: DateTime<Local>, basis: OverdueBasis) -> bool {
        let ts = match basis {
            OverdueBasis::Frontier => self.frontier,
            OverdueBasis::LatestKnown => self.latest_known,
        };
        ts.is_some_and(|ts| ts < cutoff)
    }
}

#[derive(Debug, Default)]
pub struct EntityActivityTracker {
    entities: HashMap<EntityId, EntityActivityState>,
}

impl EntityActivityTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one page of observations into the session map.
    pub fn update<'a, I>(&mut self, observations: I)
    where
        I: IntoIterator<Item = (&'a EntityId, &'a EntityObservation)>,
    {
        for st in self.entities.values_mut() {
            st.active_this_page = false;
        }
        for (id, obs) in observations {
            let st = self.entities.entry(id.clone()).or_default();
            st.latest_known = match (st.latest_known, obs.max_timestamp) {
                (Some(prev), Some(seen)) => Some(prev.max(seen)),
                (prev, seen) => prev.or(seen),
            };
            if obs.max_timestamp.is_some() {
                st.frontier = obs.max_timestamp;
            }
            st.active_this_page = obs.contributed_in_window;
            if obs.contributed_in_window {
                st.ever_active = true;
            }
        }
    }

    pub fn snapshot(&self) -> TrackerSnapshot<'_> {
        TrackerSnapshot {
            entities: &self.entities,
        }
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

/// Read-only view handed to the stopping policy.
#[derive(Debug, Clone, Copy)]
pub struct TrackerSnapshot<'a> {
    entities: &'a HashMap<EntityId, EntityActivityState>,
}

impl<'a> TrackerSnapshot<'a> {
    pub fn total_entities(&self) -> usize {
        self.entities.len()
    }

    pub fn overdue_entities(&self, cutoff: DateTime<Local>, basis: OverdueBasis) -> usize {
        self.entities
            .values()
            .filter(|st| st.is_overdue(cutoff, basis))
            .count()
    }

    /// `overdue / total`, 0.0 before any entity has been seen.
    pub fn overdue_ratio(&self, cutoff: DateTime<Local>, basis: OverdueBasis) -> f64 {
        let total = self.total_entities();
        if total == 0 {
            return 0.0;
        }
        self.overdue_entities(cutoff, basis) as f64 / total as f64
    }

    pub fn active_this_page(&self) -> usize {
        self.entities
            .values()
            .filter(|st| st.active_this_page)
            .count()
    }

    pub fn get(&self, id: &EntityId) -> Option<&'a EntityActivityState> {
        self.entities.get(id)
    }
}

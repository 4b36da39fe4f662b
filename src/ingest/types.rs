// src/ingest/types.rs
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::config::EndpointConfig;
use crate::ingest::policy::StopReason;

/// Opaque name of the remote paginated collection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeedId(String);

impl FeedId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FeedId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FeedId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Map key for per-entity tracking. Records without one land in `"unknown"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    pub const UNKNOWN: &'static str = "unknown";

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
    pub fn unknown() -> Self {
        Self(Self::UNKNOWN.to_string())
    }
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// A record exactly as the feed returned it. Only the entity id and the
/// creation timestamp are ever read; the rest is passed through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawRecord(Value);

impl RawRecord {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }

    fn lookup<'a>(&'a self, path: &[String]) -> Option<&'a Value> {
        path.iter().try_fold(&self.0, |v, key| v.get(key.as_str()))
    }

    /// Nested entity id; strings are trimmed, numbers stringified.
    pub fn entity_id(&self, path: &[String]) -> EntityId {
        match self.lookup(path) {
            Some(Value::String(s)) if !s.trim().is_empty() => EntityId::new(s.trim()),
            Some(Value::Number(n)) => EntityId::new(n.to_string()),
            _ => EntityId::unknown(),
        }
    }

    /// First present timestamp field, whatever its JSON type.
    pub fn timestamp_value<'a>(&'a self, keys: &[String]) -> Option<&'a Value> {
        keys.iter()
            .find_map(|k| self.0.get(k.as_str()))
            .filter(|v| !v.is_null())
    }
}

impl From<Value> for RawRecord {
    fn from(v: Value) -> Self {
        Self(v)
    }
}

/// One decoded page: records plus the cursor for the next one.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawPage {
    pub records: Vec<RawRecord>,
    pub next_cursor: Option<String>,
}

impl RawPage {
    /// Decode a response body. Unknown shapes decode to an empty page, which
    /// ends pagination naturally instead of failing the session.
    pub fn decode(body: &str, endpoint: &EndpointConfig) -> Self {
        match serde_json::from_str::<Value>(body) {
            Ok(v) => Self::from_value(v, endpoint),
            Err(e) => {
                tracing::warn!(target: "ingest", error = %e, "response is not JSON; treating as empty page");
                Self::default()
            }
        }
    }

    pub fn from_value(mut v: Value, endpoint: &EndpointConfig) -> Self {
        let records = endpoint
            .record_keys
            .iter()
            .find_map(|k| match v.get_mut(k.as_str()) {
                Some(Value::Array(items)) => Some(std::mem::take(items)),
                _ => None,
            });
        let Some(records) = records else {
            tracing::warn!(
                target: "ingest",
                keys = ?endpoint.record_keys,
                "response has none of the record keys; treating as empty page"
            );
            return Self::default();
        };

        let next_cursor = endpoint
            .cursor_keys
            .iter()
            .find_map(|k| match v.get(k.as_str()) {
                Some(Value::String(s)) if !s.trim().is_empty() => Some(s.clone()),
                Some(Value::Number(n)) => Some(n.to_string()),
                _ => None,
            });

        Self {
            records: records.into_iter().map(RawRecord).collect(),
            next_cursor,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Session totals handed to logging/cost-accounting collaborators.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub feed_id: FeedId,
    pub pages_visited: u32,
    pub request_count: u64,
    pub error_count: u64,
    pub retry_count: u64,
    pub raw_seen: u64,
    pub kept: u64,
    pub stale: u64,
    pub unparseable: u64,
    pub entities_tracked: usize,
    pub overdue_entities: usize,
    pub stop_reason: Option<StopReason>,
}

/// Eager fetch result.
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    pub records: Vec<RawRecord>,
    pub summary: SessionSummary,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ep() -> EndpointConfig {
        EndpointConfig::default()
    }

    #[test]
    fn decodes_primary_and_alternate_record_keys() {
        let p = RawPage::decode(r#"{"records":[{"a":1}],"next_cursor":"c2"}"#, &ep());
        assert_eq!(p.records.len(), 1);
        assert_eq!(p.next_cursor.as_deref(), Some("c2"));

        let p = RawPage::decode(r#"{"data":[{"a":1},{"a":2}],"nextCursor":"c3"}"#, &ep());
        assert_eq!(p.records.len(), 2);
        assert_eq!(p.next_cursor.as_deref(), Some("c3"));
    }

    #[test]
    fn malformed_bodies_are_empty_pages() {
        assert!(RawPage::decode("<html>oops</html>", &ep()).is_empty());
        let p = RawPage::decode(r#"{"items":[{"a":1}],"next_cursor":"x"}"#, &ep());
        assert!(p.is_empty());
        assert_eq!(p.next_cursor, None);
    }

    #[test]
    fn blank_or_null_cursor_means_last_page() {
        let p = RawPage::decode(r#"{"records":[{"a":1}],"next_cursor":"  "}"#, &ep());
        assert_eq!(p.next_cursor, None);
        let p = RawPage::decode(r#"{"records":[{"a":1}],"next_cursor":null}"#, &ep());
        assert_eq!(p.next_cursor, None);
    }

    #[test]
    fn entity_id_extraction() {
        let path = ep().entity_path;
        let r = RawRecord::new(json!({"author": {"id": " 42 "}}));
        assert_eq!(r.entity_id(&path).as_str(), "42");
        let r = RawRecord::new(json!({"author": {"id": 7}}));
        assert_eq!(r.entity_id(&path).as_str(), "7");
        let r = RawRecord::new(json!({"author": {}}));
        assert_eq!(r.entity_id(&path).as_str(), EntityId::UNKNOWN);
        let r = RawRecord::new(json!({"text": "x"}));
        assert_eq!(r.entity_id(&path), EntityId::unknown());
    }
}

// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod clock;
pub mod config;
pub mod error;
pub mod ingest;
pub mod rolling;
pub mod telemetry;

// ---- Re-exports for stable public API ----
pub use crate::clock::{Clock, ManualClock, SystemClock};
pub use crate::config::{load_config_default, load_config_from, FetchConfig, StopThresholds};
pub use crate::error::{ConfigError, ErrorClass, FetchError};
pub use crate::ingest::policy::{HeuristicSignal, StopReason};
pub use crate::ingest::transport::{ReqwestTransport, ScriptedTransport, Transport};
pub use crate::ingest::types::{FeedId, FetchOutcome, RawRecord, SessionSummary};
pub use crate::ingest::{FetchOrchestrator, FetchSession};

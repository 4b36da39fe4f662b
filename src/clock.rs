// src/clock.rs
//! Injected time source. All pacing, backoff and cutoff math goes through a
//! [`Clock`] so tests can run a full paginated walk without real delays.

use chrono::{DateTime, Utc};
use std::sync::Mutex;
use std::time::Duration;

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
    /// Block the calling thread for `d`.
    fn sleep(&self, d: Duration);
}

/// Wall clock + `std::thread::sleep`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn sleep(&self, d: Duration) {
        if !d.is_zero() {
            std::thread::sleep(d);
        }
    }
}

// --- Test helper ---
/// Deterministic clock: `sleep` advances virtual time and records the request.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
    pub sleeps: Mutex<Vec<Duration>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
            sleeps: Mutex::new(Vec::new()),
        }
    }

    pub fn starting_now() -> Self {
        Self::new(Utc::now())
    }

    /// Move time forward without recording a sleep (e.g. simulated request latency).
    pub fn advance(&self, d: Duration) {
        let mut now = self.now.lock().expect("manual clock mutex poisoned");
        let step = chrono::Duration::from_std(d).unwrap_or(chrono::Duration::zero());
        if let Some(next) = now.checked_add_signed(step) {
            *now = next;
        }
    }

    pub fn total_slept(&self) -> Duration {
        self.sleeps
            .lock()
            .expect("manual clock mutex poisoned")
            .iter()
            .sum()
    }

    pub fn sleep_log(&self) -> Vec<Duration> {
        self.sleeps
            .lock()
            .expect("manual clock mutex poisoned")
            .clone()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().expect("manual clock mutex poisoned")
    }

    fn sleep(&self, d: Duration) {
        self.sleeps
            .lock()
            .expect("manual clock mutex poisoned")
            .push(d);
        self.advance(d);
    }
}

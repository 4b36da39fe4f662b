//! # Rolling Window
//! Bounded history of per-page in-window record counts (default: last 10 pages).
//!
//! Feeds the low-yield stop signal: once the window is full, a rolling average
//! below the configured floor means the walk has stopped paying for itself.
//! Session-scoped and owned by one fetch session, so no locking.

use std::collections::VecDeque;

/// Fixed-capacity ring buffer over per-page kept counts.
#[derive(Debug, Clone)]
pub struct RollingWindow {
    buf: VecDeque<usize>,
    capacity: usize,
}

impl RollingWindow {
    /// Create a window holding the last `capacity` pages (minimum 1).
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            buf: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Record one page's in-window count, evicting the oldest when full.
    pub fn record(&mut self, kept: usize) {
        if self.buf.len() == self.capacity {
            self.buf.pop_front();
        }
        self.buf.push_back(kept);
    }

    /// True once `capacity` pages have been recorded.
    pub fn is_full(&self) -> bool {
        self.buf.len() == self.capacity
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Average over the retained pages; `None` when nothing has been recorded.
    pub fn average(&self) -> Option<f64> {
        if self.buf.is_empty() {
            return None;
        }
        let sum: usize = self.buf.iter().sum();
        Some(sum as f64 / self.buf.len() as f64)
    }

    /// Average, but only once the window is full.
    pub fn full_average(&self) -> Option<f64> {
        if self.is_full() {
            self.average()
        } else {
            None
        }
    }
}

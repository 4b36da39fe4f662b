// src/ingest/counters.rs
use crate::rolling::RollingWindow;

/// Per-session tallies. Owned by one fetch session; never shared.
#[derive(Debug, Clone)]
pub struct SessionCounters {
    pub pages_visited: u32,
    pub raw_seen: u64,
    pub kept: u64,
    pub stale: u64,
    pub unparseable: u64,
    pub consecutive_empty_pages: u32,
    /// In-window counts of the last N pages.
    pub history: RollingWindow,
}

impl SessionCounters {
    pub fn new(history_size: usize) -> Self {
        Self {
            pages_visited: 0,
            raw_seen: 0,
            kept: 0,
            stale: 0,
            unparseable: 0,
            consecutive_empty_pages: 0,
            history: RollingWindow::with_capacity(history_size),
        }
    }

    /// Account for one filtered page. `kept + stale` must equal `raw`.
    pub fn record_page(&mut self, raw: usize, kept: usize, stale: usize, unparseable: usize) {
        debug_assert_eq!(kept + stale, raw);
        self.pages_visited += 1;
        self.raw_seen += raw as u64;
        self.kept += kept as u64;
        self.stale += stale as u64;
        self.unparseable += unparseable as u64;
        self.history.record(kept);
        if kept == 0 {
            self.consecutive_empty_pages += 1;
        } else {
            self.consecutive_empty_pages = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_streak_resets_on_yield() {
        let mut c = SessionCounters::new(10);
        c.record_page(3, 0, 3, 0);
        c.record_page(2, 0, 2, 0);
        assert_eq!(c.consecutive_empty_pages, 2);
        c.record_page(4, 1, 3, 1);
        assert_eq!(c.consecutive_empty_pages, 0);
        assert_eq!(c.pages_visited, 3);
        assert_eq!(c.raw_seen, 9);
        assert_eq!(c.kept + c.stale, c.raw_seen);
        assert_eq!(c.unparseable, 1);
        assert_eq!(c.history.len(), 3);
    }
}

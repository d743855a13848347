use crate::srtp::constants::REPLAY_WINDOW_SIZE;

/// 64-entry sliding bitmap over packet indices.
///
/// Anything older than the window is treated as a replay; anything inside it
/// is checked against the bitmap.
pub(crate) struct ReplayWindow {
    max_index: u64,
    window: u64,
}

impl ReplayWindow {
    pub(crate) fn new() -> Self {
        Self {
            max_index: 0,
            window: 0,
        }
    }

    pub(crate) fn is_replay(&self, index: u64) -> bool {
        if index > self.max_index {
            return false;
        }
        let diff = self.max_index.saturating_sub(index);
        if diff >= REPLAY_WINDOW_SIZE {
            return true;
        }
        (self.window & (1u64 << diff)) != 0
    }

    pub(crate) fn record(&mut self, index: u64) {
        if index > self.max_index {
            let diff = index.saturating_sub(self.max_index);
            if diff < REPLAY_WINDOW_SIZE {
                self.window <<= diff as u32;
            } else {
                self.window = 0;
            }
            self.window |= 1;
            self.max_index = index;
        } else {
            let diff = self.max_index.saturating_sub(index);
            if diff < REPLAY_WINDOW_SIZE {
                self.window |= 1u64 << diff;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;

    #[test]
    fn test_repeat_inside_window_is_replay_ok() {
        let mut w = ReplayWindow::new();
        for i in 1..=100u64 {
            assert!(!w.is_replay(i), "index {i} wrongly flagged");
            w.record(i);
        }
        assert!(w.is_replay(50));
        assert!(w.is_replay(100));
    }

    #[test]
    fn test_older_than_window_is_replay_ok() {
        let mut w = ReplayWindow::new();
        for i in 1..=1000u64 {
            w.record(i);
        }
        for i in 1..=935u64 {
            assert!(w.is_replay(i), "index {i} should be too old");
        }
    }

    #[test]
    fn test_in_window_gap_accepted_then_rejected_ok() {
        let mut w = ReplayWindow::new();
        w.record(100);
        // 70 is inside the window and was never recorded.
        assert!(!w.is_replay(70));
        w.record(70);
        assert!(w.is_replay(70));
    }

    #[test]
    fn test_large_jump_clears_window_ok() {
        let mut w = ReplayWindow::new();
        w.record(10);
        w.record(10_000);
        assert!(w.is_replay(10));
        assert!(!w.is_replay(9_990));
    }
}

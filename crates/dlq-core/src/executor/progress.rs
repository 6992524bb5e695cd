//! Progress extraction from downloader output, and report throttling.

use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;
use std::time::{Duration, Instant};

use crate::config::ProgressConfig;
use crate::registry::TaskId;

static PERCENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d+\.\d+)%").unwrap_or_else(|e| panic!("progress pattern: {e}"))
});

/// First `NN.N%` figure on a downloader output line.
pub fn parse_percent(line: &str) -> Option<f64> {
    PERCENT
        .captures(line)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Decides which progress readings are worth an event.
///
/// Shortly after the last report only large jumps pass; later, smaller
/// ones; past `force_after` every reading passes. The first reading for a
/// task and any reading of 100% always pass.
#[derive(Debug)]
pub struct ProgressThrottle {
    min_step_fast: f64,
    min_step: f64,
    fast_window: Duration,
    force_after: Duration,
    last: HashMap<TaskId, (f64, Instant)>,
}

impl Default for ProgressThrottle {
    fn default() -> Self {
        Self::from_config(&ProgressConfig::default())
    }
}

impl ProgressThrottle {
    pub fn from_config(cfg: &ProgressConfig) -> Self {
        Self {
            min_step_fast: cfg.min_step_fast,
            min_step: cfg.min_step,
            fast_window: Duration::from_millis(cfg.fast_window_ms),
            force_after: Duration::from_millis(cfg.force_after_ms),
            last: HashMap::new(),
        }
    }

    /// Whether `percent` for `id` observed at `now` should be reported. A
    /// passing reading becomes the new baseline.
    pub fn should_report(&mut self, id: TaskId, percent: f64, now: Instant) -> bool {
        let pass = match self.last.get(&id) {
            None => true,
            Some(_) if percent >= 100.0 => true,
            Some(&(prev, at)) => {
                let elapsed = now.saturating_duration_since(at);
                let step = (percent - prev).abs();
                if elapsed < self.fast_window {
                    step >= self.min_step_fast
                } else if elapsed < self.force_after {
                    step >= self.min_step
                } else {
                    true
                }
            }
        };
        if pass {
            self.last.insert(id, (percent, now));
        }
        pass
    }

    pub fn forget(&mut self, id: TaskId) {
        self.last.remove(&id);
    }

    pub fn tracked(&self) -> usize {
        self.last.len()
    }
}

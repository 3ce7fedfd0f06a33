//! Update rate control for snapshot streams

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Update rate for snapshot streams
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum UpdateRate {
    /// Every snapshot the aggregator publishes
    #[default]
    Native,

    /// At most this many snapshots per second, latest wins.
    /// `Max(0)` is treated as `Native`.
    Max(u32),
}

impl UpdateRate {
    /// Minimum spacing between emitted snapshots, if throttled
    pub fn interval(self) -> Option<Duration> {
        match self {
            UpdateRate::Native | UpdateRate::Max(0) => None,
            UpdateRate::Max(hz) => Some(Duration::from_secs_f64(1.0 / hz as f64)),
        }
    }

    pub fn needs_throttle(self) -> bool {
        self.interval().is_some()
    }
}

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

/// Per-skill mutable state, owned by one controller for one episode.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ControllerState {
    /// Ticks evaluated so far in this episode.
    pub tick: u64,
    /// Accumulated integral contribution.
    pub integral: f64,
    /// Filtered derivative term from the previous tick.
    pub derivative: f64,
    /// Prior process values, oldest first.
    pub history: VecDeque<f64>,
    /// Maximum history length; `None` keeps everything.
    pub history_limit: Option<usize>,
    /// Manipulated-variable value emitted on the previous tick.
    pub previous_mv: Option<f64>,
}

impl ControllerState {
    pub fn with_history_limit(limit: usize) -> Self {
        Self {
            history_limit: Some(limit),
            ..Default::default()
        }
    }

    /// Append a process value, evicting the oldest past the limit.
    pub fn record(&mut self, value: f64) {
        self.history.push_back(value);
        if let Some(limit) = self.history_limit {
            while self.history.len() > limit {
                self.history.pop_front();
            }
        }
    }

    pub fn last_value(&self) -> Option<f64> {
        self.history.back().copied()
    }

    /// Increment the tick counter and return the new value.
    pub fn advance(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    /// Clear everything but the configured history limit.
    pub fn reset(&mut self) {
        *self = Self {
            history_limit: self.history_limit,
            ..Default::default()
        };
    }
}

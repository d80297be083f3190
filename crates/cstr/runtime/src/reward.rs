//! Tracking-performance score for training feedback.

use serde::{Deserialize, Serialize};
use tracing::debug;

use cstr_types::{Action, Observation};

use crate::error::{RuntimeError, RuntimeResult};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RewardConfig {
    /// Decay applied to the cumulative squared error.
    pub decay: f64,
}

impl Default for RewardConfig {
    fn default() -> Self {
        Self { decay: 0.01 }
    }
}

impl RewardConfig {
    pub fn validate(&self) -> RuntimeResult<()> {
        if !(self.decay.is_finite() && self.decay >= 0.0) {
            return Err(RuntimeError::Config(format!(
                "reward decay {} must be finite and non-negative",
                self.decay
            )));
        }
        Ok(())
    }
}

/// End-of-episode digest of the reward engine.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EpisodeSummary {
    /// Calls to `score`, including the bootstrap call.
    pub ticks_scored: u64,
    pub cumulative_squared_error: f64,
    pub final_rms: Option<f64>,
    pub final_reward: f64,
}

/// Scores each realized transition as `exp(−decay · Σ (Cref − Ca)²)`.
///
/// The first call of an episode only bootstraps and returns exactly 0.0.
#[derive(Clone, Debug, Default)]
pub struct RewardEngine {
    config: RewardConfig,
    started: bool,
    ticks_scored: u64,
    cumulative: f64,
    squared_errors: Vec<f64>,
    rms_history: Vec<f64>,
    rewards: Vec<f64>,
}

impl RewardEngine {
    pub fn new(config: RewardConfig) -> Self {
        Self {
            config,
            ..Default::default()
        }
    }

    pub fn score(&mut self, observation: &Observation, _action: Action) -> f64 {
        self.ticks_scored += 1;
        if !self.started {
            self.started = true;
            self.rewards.push(0.0);
            return 0.0;
        }

        let error = observation.concentration_setpoint() - observation.concentration();
        let squared = error * error;
        self.squared_errors.push(squared);
        self.cumulative += squared;

        let rms = (self.cumulative / self.squared_errors.len() as f64).sqrt();
        self.rms_history.push(rms);

        let reward = (-self.config.decay * self.cumulative).exp();
        self.rewards.push(reward);
        debug!(error, rms, reward, "Scored transition");
        reward
    }

    pub fn squared_errors(&self) -> &[f64] {
        &self.squared_errors
    }

    pub fn rms_history(&self) -> &[f64] {
        &self.rms_history
    }

    pub fn rewards(&self) -> &[f64] {
        &self.rewards
    }

    pub fn cumulative_squared_error(&self) -> f64 {
        self.cumulative
    }

    pub fn summary(&self) -> EpisodeSummary {
        EpisodeSummary {
            ticks_scored: self.ticks_scored,
            cumulative_squared_error: self.cumulative,
            final_rms: self.rms_history.last().copied(),
            final_reward: self.rewards.last().copied().unwrap_or(0.0),
        }
    }

    /// Discard all history. Called at episode start.
    pub fn reset(&mut self) {
        *self = Self::new(self.config.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn observation(ca: f64, cref: f64) -> Observation {
        Observation::from_values([320.0, 300.0, ca, cref, 320.0, cref - ca, 0.3, 7.0]).unwrap()
    }

    #[test]
    fn first_call_is_zero() {
        let mut engine = RewardEngine::default();
        assert_eq!(engine.score(&observation(1.0, 9.0), Action::ZERO), 0.0);
        assert!(engine.squared_errors().is_empty());
    }

    #[test]
    fn perfect_tracking_scores_one() {
        let mut engine = RewardEngine::new(RewardConfig::default());
        engine.score(&observation(4.0, 4.0), Action::ZERO);
        assert_eq!(engine.score(&observation(4.0, 4.0), Action::ZERO), 1.0);
    }

    #[test]
    fn reward_decays_with_cumulative_error() {
        let mut engine = RewardEngine::new(RewardConfig::default());
        engine.score(&observation(4.0, 4.0), Action::ZERO);
        let r1 = engine.score(&observation(3.0, 4.0), Action::ZERO);
        let r2 = engine.score(&observation(2.0, 4.0), Action::ZERO);
        assert!((r1 - (-0.01f64).exp()).abs() < 1e-12);
        assert!((r2 - (-0.05f64).exp()).abs() < 1e-12);
        assert!((engine.rms_history()[1] - (5.0f64 / 2.0).sqrt()).abs() < 1e-12);
    }

    #[test]
    fn summary_and_reset() {
        let mut engine = RewardEngine::default();
        assert_eq!(engine.summary().final_rms, None);
        engine.score(&observation(4.0, 4.0), Action::ZERO);
        engine.score(&observation(3.0, 4.0), Action::ZERO);
        let summary = engine.summary();
        assert_eq!(summary.ticks_scored, 2);
        assert_eq!(summary.cumulative_squared_error, 1.0);
        assert_eq!(summary.final_rms, Some(1.0));

        engine.reset();
        assert_eq!(engine.score(&observation(0.0, 4.0), Action::ZERO), 0.0);
        assert_eq!(engine.summary().ticks_scored, 1);
    }
}

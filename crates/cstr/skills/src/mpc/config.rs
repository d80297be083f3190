use serde::{Deserialize, Serialize};

use crate::error::{SkillError, SkillResult};
use crate::mpc::model::PlantParameters;
use crate::mpc::optimizer::OptimizerConfig;
use crate::mpc::schedule::ReferenceSchedule;

/// Closed interval `[lower, upper]`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub lower: f64,
    pub upper: f64,
}

impl Bounds {
    pub const fn new(lower: f64, upper: f64) -> Self {
        Self { lower, upper }
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.lower && value <= self.upper
    }

    pub fn clamp(&self, value: f64) -> f64 {
        value.clamp(self.lower, self.upper)
    }

    /// Squared distance outside the interval, zero inside.
    pub fn violation_squared(&self, value: f64) -> f64 {
        let excess = if value < self.lower {
            self.lower - value
        } else if value > self.upper {
            value - self.upper
        } else {
            0.0
        };
        excess * excess
    }

    pub(crate) fn validate(&self, name: &str) -> SkillResult<()> {
        if !(self.lower.is_finite() && self.upper.is_finite() && self.lower < self.upper) {
            return Err(SkillError::InvalidConfig(format!(
                "{name} bounds [{}, {}] are not an ordered finite interval",
                self.lower, self.upper
            )));
        }
        Ok(())
    }
}

/// Tuning, constraints and plant description of the MPC skill.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MpcConfig {
    pub plant: PlantParameters,
    pub schedule: ReferenceSchedule,
    pub optimizer: OptimizerConfig,
    /// Prediction horizon in ticks.
    pub horizon: usize,
    /// Control interval.
    pub dt: f64,
    /// RK4 substeps per control interval.
    pub integration_substeps: usize,
    /// Coolant temperature limits (K).
    pub input_bounds: Bounds,
    /// Largest coolant change per tick (K).
    pub max_input_rate: f64,
    pub concentration_bounds: Bounds,
    pub temperature_bounds: Bounds,
    pub stage_weight: f64,
    pub terminal_weight: f64,
    pub input_rate_weight: f64,
    /// Weight on squared state-bound violations.
    pub state_penalty: f64,
    pub solve_timeout_ms: u64,
    /// Length of the predicted-concentration history kept in the state.
    pub history_limit: usize,
}

impl Default for MpcConfig {
    fn default() -> Self {
        Self {
            plant: PlantParameters::default(),
            schedule: ReferenceSchedule::default(),
            optimizer: OptimizerConfig::default(),
            horizon: 10,
            dt: 1.0,
            integration_substeps: 4,
            input_bounds: Bounds::new(273.0, 322.0),
            max_input_rate: 10.0,
            concentration_bounds: Bounds::new(0.1, 12.0),
            temperature_bounds: Bounds::new(100.0, 400.0),
            stage_weight: 1.0,
            terminal_weight: 1.0,
            input_rate_weight: 1.5,
            state_penalty: 1e3,
            solve_timeout_ms: 2000,
            history_limit: 512,
        }
    }
}

impl MpcConfig {
    pub fn validate(&self) -> SkillResult<()> {
        if self.horizon == 0 {
            return Err(SkillError::InvalidConfig("horizon must be positive".into()));
        }
        if !(self.dt > 0.0) {
            return Err(SkillError::InvalidConfig(format!(
                "dt must be positive, got {}",
                self.dt
            )));
        }
        if !(self.max_input_rate > 0.0) {
            return Err(SkillError::InvalidConfig(format!(
                "max input rate must be positive, got {}",
                self.max_input_rate
            )));
        }
        if self.solve_timeout_ms == 0 {
            return Err(SkillError::InvalidConfig(
                "solve timeout must be positive".into(),
            ));
        }
        let weights = [
            self.stage_weight,
            self.terminal_weight,
            self.input_rate_weight,
            self.state_penalty,
        ];
        if weights.iter().any(|w| !(w.is_finite() && *w >= 0.0)) {
            return Err(SkillError::InvalidConfig(
                "cost weights must be finite and non-negative".into(),
            ));
        }
        self.input_bounds.validate("input")?;
        self.concentration_bounds.validate("concentration")?;
        self.temperature_bounds.validate("temperature")?;
        self.plant.validate()?;
        self.schedule.validate()?;
        self.optimizer.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_valid() {
        assert!(MpcConfig::default().validate().is_ok());
    }

    #[test]
    fn inverted_bounds_rejected() {
        let config = MpcConfig {
            input_bounds: Bounds::new(322.0, 273.0),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn violation_is_zero_inside() {
        let b = Bounds::new(0.1, 12.0);
        assert_eq!(b.violation_squared(5.0), 0.0);
        assert!((b.violation_squared(13.0) - 1.0).abs() < 1e-12);
        assert!((b.violation_squared(0.0) - 0.01).abs() < 1e-12);
    }

    #[test]
    fn partial_override_from_json() {
        let config: MpcConfig = serde_json::from_str(r#"{"horizon": 8}"#).unwrap();
        assert_eq!(config.horizon, 8);
        assert_eq!(config.max_input_rate, 10.0);
    }
}

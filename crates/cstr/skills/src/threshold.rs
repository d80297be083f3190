//! Bang-bang control on relative tracking error.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::warn;

use cstr_types::{Action, Channel, Observation};

use crate::controller::SkillController;
use crate::error::{SkillError, SkillResult};
use crate::state::ControllerState;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ErrorThresholdConfig {
    /// Relative error at or above which the corrective action is emitted.
    pub threshold: f64,
    pub correct_action: f64,
    pub hold_action: f64,
    pub measured: Channel,
    pub setpoint: Channel,
}

impl Default for ErrorThresholdConfig {
    fn default() -> Self {
        Self {
            threshold: 0.10,
            correct_action: 1.0,
            hold_action: 0.0,
            measured: Channel::Concentration,
            setpoint: Channel::ConcentrationSetpoint,
        }
    }
}

/// `|actual - setpoint| / setpoint`, rejecting a zero setpoint.
pub fn relative_error(actual: f64, setpoint: f64) -> SkillResult<f64> {
    if setpoint == 0.0 {
        return Err(SkillError::DivisionByZero {
            quantity: "setpoint",
        });
    }
    Ok((actual - setpoint).abs() / setpoint)
}

#[derive(Debug)]
pub struct ErrorThresholdController {
    config: ErrorThresholdConfig,
    state: ControllerState,
}

impl ErrorThresholdController {
    pub fn new(config: ErrorThresholdConfig) -> SkillResult<Self> {
        if !config.threshold.is_finite() || config.threshold < 0.0 {
            return Err(SkillError::InvalidConfig(format!(
                "threshold {} must be a non-negative number",
                config.threshold
            )));
        }
        Ok(Self {
            config,
            state: ControllerState::default(),
        })
    }
}

#[async_trait]
impl SkillController for ErrorThresholdController {
    fn name(&self) -> &str {
        "error-threshold"
    }

    async fn compute_action(
        &mut self,
        observation: &Observation,
        _prior: Action,
    ) -> SkillResult<Action> {
        let tick = self.state.advance();
        let actual = observation.get(self.config.measured);
        let setpoint = observation.get(self.config.setpoint);
        self.state.record(actual);

        let value = match relative_error(actual, setpoint) {
            Ok(error) if error >= self.config.threshold => self.config.correct_action,
            Ok(_) => self.config.hold_action,
            Err(err) => {
                warn!(tick, %err, "Holding: relative error undefined");
                self.config.hold_action
            }
        };
        self.state.previous_mv = Some(value);
        Ok(Action::new(value)?)
    }

    fn state(&self) -> &ControllerState {
        &self.state
    }

    fn reset(&mut self) {
        self.state.reset();
    }
}

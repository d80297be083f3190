//! Risk-coupled attenuation of controller output.

use serde::{Deserialize, Serialize};
use tracing::warn;

use cstr_types::{Action, RiskSignal};

use crate::error::{RuntimeError, RuntimeResult};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GovernorConfig {
    /// Fraction of the action's magnitude removed while runaway is predicted.
    pub attenuation: f64,
}

impl Default for GovernorConfig {
    fn default() -> Self {
        Self { attenuation: 0.05 }
    }
}

impl GovernorConfig {
    pub fn validate(&self) -> RuntimeResult<()> {
        if !(0.0..=1.0).contains(&self.attenuation) {
            return Err(RuntimeError::Config(format!(
                "governor attenuation {} outside [0, 1]",
                self.attenuation
            )));
        }
        Ok(())
    }
}

/// Stateless post-processor applied to every controller output.
#[derive(Clone, Debug, Default)]
pub struct SafetyGovernor {
    config: GovernorConfig,
}

impl SafetyGovernor {
    pub fn new(config: GovernorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &GovernorConfig {
        &self.config
    }

    /// Shrink the action's magnitude by the attenuation fraction when runaway
    /// is predicted, preserving sign. Otherwise pass it through.
    pub fn govern(&self, action: Action, risk: Option<&RiskSignal>) -> Action {
        let runaway = risk.is_some_and(|r| r.runaway);
        let value = action.value();
        if !runaway || value == 0.0 {
            return action;
        }

        let governed = value - self.config.attenuation * value.abs() * value.signum();
        warn!(
            proposed = value,
            governed,
            probability = risk.and_then(|r| r.probability),
            "Runaway predicted, attenuating action"
        );
        Action::new(governed).unwrap_or(action)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn act(v: f64) -> Action {
        Action::new(v).unwrap()
    }

    #[test]
    fn runaway_removes_five_percent() {
        let governor = SafetyGovernor::default();
        let out = governor.govern(act(8.0), Some(&RiskSignal::from_flag(true)));
        assert!((out.value() - 7.6).abs() < 1e-12);

        let out = governor.govern(act(-8.0), Some(&RiskSignal::from_flag(true)));
        assert!((out.value() + 7.6).abs() < 1e-12);
    }

    #[test]
    fn no_risk_passes_through() {
        let governor = SafetyGovernor::default();
        assert_eq!(governor.govern(act(8.0), Some(&RiskSignal::clear())), act(8.0));
        assert_eq!(governor.govern(act(8.0), None), act(8.0));
    }

    #[test]
    fn zero_is_untouched() {
        let governor = SafetyGovernor::default();
        let out = governor.govern(Action::ZERO, Some(&RiskSignal::from_flag(true)));
        assert_eq!(out.value(), 0.0);
    }

    #[test]
    fn attenuation_out_of_range_rejected() {
        assert!(GovernorConfig { attenuation: 1.5 }.validate().is_err());
        assert!(GovernorConfig::default().validate().is_ok());
    }
}

use serde::{Deserialize, Serialize};

/// Thermal runaway prediction for one tick.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RiskSignal {
    /// Predicted runaway (the `thermal_runaway_predict` flag).
    pub runaway: bool,
    /// Positive-class probability, present only when the classifier ran.
    pub probability: Option<f64>,
}

impl RiskSignal {
    /// No risk, classifier not consulted.
    pub fn clear() -> Self {
        Self {
            runaway: false,
            probability: None,
        }
    }

    pub fn from_flag(flag: bool) -> Self {
        Self {
            runaway: flag,
            probability: None,
        }
    }

    /// Channel value (0 or 1).
    pub fn flag(&self) -> u8 {
        u8::from(self.runaway)
    }
}

impl Default for RiskSignal {
    fn default() -> Self {
        Self::clear()
    }
}

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use cstr_types::{Observation, RiskSignal, SensorKey};

use crate::classifier::{RiskClassifier, RiskFeatures};
use crate::error::{PerceptorError, PerceptorResult};

/// Thresholds of the risk perceptor.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PerceptorConfig {
    /// Reactor temperature (K) at or above which the classifier is consulted.
    pub temperature_threshold: f64,
    /// Positive-class probability at or above which runaway is declared.
    pub probability_threshold: f64,
    /// Coolant delta used on the first call, before any history exists.
    pub bootstrap_coolant_delta: f64,
}

impl Default for PerceptorConfig {
    fn default() -> Self {
        Self {
            temperature_threshold: 340.0,
            probability_threshold: 0.30,
            bootstrap_coolant_delta: 5.0,
        }
    }
}

impl PerceptorConfig {
    pub fn validate(&self) -> PerceptorResult<()> {
        if !(0.0..=1.0).contains(&self.probability_threshold) {
            return Err(PerceptorError::InvalidModel(format!(
                "probability threshold {} outside [0, 1]",
                self.probability_threshold
            )));
        }
        if !self.temperature_threshold.is_finite() || !self.bootstrap_coolant_delta.is_finite() {
            return Err(PerceptorError::InvalidModel(
                "perceptor thresholds must be finite".into(),
            ));
        }
        Ok(())
    }
}

/// Stateful wrapper that turns observations into runaway predictions.
pub struct RiskPerceptor {
    classifier: Box<dyn RiskClassifier>,
    config: PerceptorConfig,
    last_coolant_temperature: Option<f64>,
    invocations: u64,
}

impl RiskPerceptor {
    pub fn new(classifier: Box<dyn RiskClassifier>, config: PerceptorConfig) -> Self {
        Self {
            classifier,
            config,
            last_coolant_temperature: None,
            invocations: 0,
        }
    }

    pub fn config(&self) -> &PerceptorConfig {
        &self.config
    }

    /// Number of classifier calls since construction or the last reset.
    pub fn invocations(&self) -> u64 {
        self.invocations
    }

    pub fn last_coolant_temperature(&self) -> Option<f64> {
        self.last_coolant_temperature
    }

    /// Forget the coolant history. Called at episode start.
    pub fn reset(&mut self) {
        self.last_coolant_temperature = None;
        self.invocations = 0;
    }

    /// Channels visible to a controller downstream of the perceptor.
    pub fn filtered_sensor_space(&self) -> Vec<SensorKey> {
        SensorKey::risk_space()
    }

    /// Predict thermal runaway for this observation.
    ///
    /// The coolant history is updated on every call, before inference, so a
    /// failing classifier still advances the delta baseline.
    pub fn compute(&mut self, observation: &Observation) -> PerceptorResult<RiskSignal> {
        let coolant = observation.coolant_temperature();
        let coolant_delta = match self.last_coolant_temperature {
            Some(last) => coolant - last,
            None => self.config.bootstrap_coolant_delta,
        };
        self.last_coolant_temperature = Some(coolant);

        let temperature = observation.temperature();
        if temperature < self.config.temperature_threshold {
            return Ok(RiskSignal::clear());
        }

        let features = RiskFeatures {
            concentration: observation.concentration(),
            temperature,
            coolant_temperature: coolant,
            coolant_delta,
        };
        self.invocations += 1;
        let [_, p1] = self.classifier.predict_proba(&features)?;
        let runaway = if p1 >= self.config.probability_threshold {
            true
        } else {
            self.classifier.predict(&features)? == 1
        };

        if runaway {
            warn!(
                temperature,
                coolant_delta,
                probability = p1,
                "Thermal runaway predicted"
            );
        } else {
            debug!(temperature, probability = p1, "Runaway risk below threshold");
        }

        Ok(RiskSignal {
            runaway,
            probability: Some(p1),
        })
    }

    /// The observation with the prediction merged as `thermal_runaway_predict`.
    pub fn perceive(&mut self, observation: &Observation) -> PerceptorResult<Observation> {
        let risk = self.compute(observation)?;
        Ok(observation.clone().with_risk(risk))
    }
}

impl std::fmt::Debug for RiskPerceptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RiskPerceptor")
            .field("config", &self.config)
            .field("last_coolant_temperature", &self.last_coolant_temperature)
            .field("invocations", &self.invocations)
            .finish_non_exhaustive()
    }
}

//! Frozen classifier contract and the logistic artifact used in production.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{PerceptorError, PerceptorResult};

/// Feature vector, in the order the classifier was trained on.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RiskFeatures {
    pub concentration: f64,
    pub temperature: f64,
    pub coolant_temperature: f64,
    pub coolant_delta: f64,
}

impl RiskFeatures {
    pub fn to_array(&self) -> [f64; 4] {
        [
            self.concentration,
            self.temperature,
            self.coolant_temperature,
            self.coolant_delta,
        ]
    }
}

/// Inference contract of a frozen binary classifier.
pub trait RiskClassifier: Send + Sync {
    /// Predicted label, 0 or 1.
    fn predict(&self, features: &RiskFeatures) -> PerceptorResult<u8>;

    /// Class probabilities `[p0, p1]`.
    fn predict_proba(&self, features: &RiskFeatures) -> PerceptorResult<[f64; 2]>;
}

/// Logistic regression over [`RiskFeatures`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LogisticModel {
    pub coefficients: [f64; 4],
    pub intercept: f64,
    /// Probability at or above which `predict` returns 1.
    #[serde(default = "default_decision_threshold")]
    pub decision_threshold: f64,
}

fn default_decision_threshold() -> f64 {
    0.5
}

impl LogisticModel {
    pub fn new(coefficients: [f64; 4], intercept: f64) -> Self {
        Self {
            coefficients,
            intercept,
            decision_threshold: default_decision_threshold(),
        }
    }

    pub fn validate(&self) -> PerceptorResult<()> {
        if self.coefficients.iter().any(|c| !c.is_finite()) || !self.intercept.is_finite() {
            return Err(PerceptorError::InvalidModel(
                "coefficients and intercept must be finite".into(),
            ));
        }
        if !(self.decision_threshold > 0.0 && self.decision_threshold < 1.0) {
            return Err(PerceptorError::InvalidModel(format!(
                "decision threshold {} outside (0, 1)",
                self.decision_threshold
            )));
        }
        Ok(())
    }

    fn positive_probability(&self, features: &RiskFeatures) -> PerceptorResult<f64> {
        let z = self
            .coefficients
            .iter()
            .zip(features.to_array())
            .fold(self.intercept, |acc, (w, x)| acc + w * x);
        if !z.is_finite() {
            return Err(PerceptorError::Inference(format!(
                "non-finite decision value for {features:?}"
            )));
        }
        Ok(1.0 / (1.0 + (-z).exp()))
    }
}

impl RiskClassifier for LogisticModel {
    fn predict(&self, features: &RiskFeatures) -> PerceptorResult<u8> {
        let p1 = self.positive_probability(features)?;
        Ok(u8::from(p1 >= self.decision_threshold))
    }

    fn predict_proba(&self, features: &RiskFeatures) -> PerceptorResult<[f64; 2]> {
        let p1 = self.positive_probability(features)?;
        Ok([1.0 - p1, p1])
    }
}

/// A frozen classifier loaded once from its JSON artifact.
///
/// The BLAKE3 digest of the raw artifact bytes identifies the model in logs.
#[derive(Clone, Debug)]
pub struct ClassifierArtifact {
    model: LogisticModel,
    digest: String,
}

impl ClassifierArtifact {
    pub fn from_bytes(bytes: &[u8]) -> PerceptorResult<Self> {
        let model: LogisticModel = serde_json::from_slice(bytes)?;
        model.validate()?;
        let digest = blake3::hash(bytes).to_hex().to_string();
        info!(digest = %digest, "Loaded frozen risk classifier");
        Ok(Self { model, digest })
    }

    pub fn load(path: impl AsRef<Path>) -> PerceptorResult<Self> {
        let bytes = std::fs::read(path.as_ref())?;
        Self::from_bytes(&bytes)
    }

    pub fn digest(&self) -> &str {
        &self.digest
    }

    pub fn model(&self) -> &LogisticModel {
        &self.model
    }
}

impl RiskClassifier for ClassifierArtifact {
    fn predict(&self, features: &RiskFeatures) -> PerceptorResult<u8> {
        self.model.predict(features)
    }

    fn predict_proba(&self, features: &RiskFeatures) -> PerceptorResult<[f64; 2]> {
        self.model.predict_proba(features)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn features(temperature: f64) -> RiskFeatures {
        RiskFeatures {
            concentration: 4.0,
            temperature,
            coolant_temperature: 300.0,
            coolant_delta: 5.0,
        }
    }

    fn temperature_model() -> LogisticModel {
        // p1 = 0.5 at T = 360
        LogisticModel::new([0.0, 0.5, 0.0, 0.0], -180.0)
    }

    #[test]
    fn probabilities_sum_to_one() {
        let model = temperature_model();
        let [p0, p1] = model.predict_proba(&features(355.0)).unwrap();
        assert!((p0 + p1 - 1.0).abs() < 1e-12);
        assert!(p1 < 0.5);
    }

    #[test]
    fn predict_uses_decision_threshold() {
        let model = temperature_model();
        assert_eq!(model.predict(&features(350.0)).unwrap(), 0);
        assert_eq!(model.predict(&features(360.0)).unwrap(), 1);
        assert_eq!(model.predict(&features(370.0)).unwrap(), 1);
    }

    #[test]
    fn invalid_threshold_rejected() {
        let mut model = temperature_model();
        model.decision_threshold = 1.5;
        assert!(matches!(
            model.validate(),
            Err(PerceptorError::InvalidModel(_))
        ));
    }

    #[test]
    fn artifact_digest_is_stable() {
        let bytes = serde_json::to_vec(&temperature_model()).unwrap();
        let a = ClassifierArtifact::from_bytes(&bytes).unwrap();
        let b = ClassifierArtifact::from_bytes(&bytes).unwrap();
        assert_eq!(a.digest(), b.digest());
        assert_eq!(a.digest().len(), 64);
    }

    #[test]
    fn artifact_loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"coefficients": [0.0, 0.5, 0.0, 0.0], "intercept": -180.0}}"#
        )
        .unwrap();
        let artifact = ClassifierArtifact::load(file.path()).unwrap();
        assert_eq!(artifact.model().decision_threshold, 0.5);
        assert_eq!(artifact.predict(&features(365.0)).unwrap(), 1);
    }

    #[test]
    fn malformed_artifact_rejected() {
        let err = ClassifierArtifact::from_bytes(b"not a model").unwrap_err();
        assert!(matches!(err, PerceptorError::Artifact(_)));
    }

    #[test]
    fn missing_artifact_is_io_error() {
        let err = ClassifierArtifact::load("/nonexistent/cstr/classifier.json").unwrap_err();
        assert!(matches!(err, PerceptorError::Io(_)));
    }
}

#![deny(unsafe_code)]
//! # cstr-perceptor
//!
//! Predictive thermal-runaway signal for the CSTR control stack.
//!
//! The perceptor wraps a frozen binary classifier and augments each observation
//! with the `thermal_runaway_predict` channel:
//!
//! - **RiskClassifier**: inference contract (`predict`, `predict_proba`)
//! - **ClassifierArtifact**: the frozen logistic model loaded from disk and
//!   fingerprinted with BLAKE3
//! - **RiskPerceptor**: gates inference on reactor temperature and tracks the
//!   coolant-temperature delta between ticks

pub mod classifier;
pub mod error;
pub mod perceptor;

pub use classifier::{ClassifierArtifact, LogisticModel, RiskClassifier, RiskFeatures};
pub use error::{PerceptorError, PerceptorResult};
pub use perceptor::{PerceptorConfig, RiskPerceptor};

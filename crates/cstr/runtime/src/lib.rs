#![deny(unsafe_code)]
//! # cstr-runtime
//!
//! Orchestration layer of the CSTR control stack.
//!
//! Per tick: raw sensors → normalization → risk perceptor (when the active
//! skill consumes the risk channel) → active skill → safety governor → action.
//! The reward engine scores the realized transition separately.
//!
//! - **Selector**: skill library, episode lifecycle, per-tick protocol
//! - **SafetyGovernor**: sign-preserving attenuation under predicted runaway
//! - **RewardEngine**: `exp(−0.01 · Σ (Cref − Ca)²)` with a 0.0 bootstrap
//! - **ControlConfig**: layered configuration of every component
//! - **EpisodeRunner**: closed-loop episodes against [`PlantSimulator`]

pub mod config;
pub mod episode;
pub mod error;
pub mod governor;
pub mod reward;
pub mod selector;
pub mod telemetry;

pub use config::{ControlConfig, SimulationConfig};
pub use episode::{EpisodeRunner, EpisodeTrace, PlantSimulator, TickRecord};
pub use error::{RuntimeError, RuntimeResult};
pub use governor::{GovernorConfig, SafetyGovernor};
pub use reward::{EpisodeSummary, RewardConfig, RewardEngine};
pub use selector::{Decision, EpisodeInfo, EpisodeReport, Selector, TickOutcome};
pub use telemetry::init_tracing;

/// Build a runner for `config`, optionally with a risk perceptor.
pub fn runner_from_config(
    config: &ControlConfig,
    perceptor: Option<cstr_perceptor::RiskPerceptor>,
) -> RuntimeResult<EpisodeRunner> {
    let selector = Selector::from_config(config, perceptor)?;
    let simulator = PlantSimulator::new(
        config.mpc.plant.clone(),
        config.mpc.schedule.clone(),
        config.simulation.clone(),
    );
    Ok(EpisodeRunner::new(selector, simulator, config.mpc.dt))
}

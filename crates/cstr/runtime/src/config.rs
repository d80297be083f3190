//! Layered configuration: defaults, then an optional file, then `CSTR_`
//! environment variables (`CSTR_MPC__HORIZON=8`).

use serde::{Deserialize, Serialize};

use cstr_perceptor::PerceptorConfig;
use cstr_skills::mpc::Bounds;
use cstr_skills::{
    ErrorThresholdConfig, MpcConfig, PidConfig, ProgrammedConfig, TemperatureMpcConfig,
};

use crate::error::{RuntimeError, RuntimeResult};
use crate::governor::GovernorConfig;
use crate::reward::RewardConfig;

/// Closed-loop simulation settings used by the episode driver.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub max_ticks: u64,
    /// Uniform measurement noise as a fraction of the operating span.
    pub noise_fraction: f64,
    pub seed: u64,
    pub initial_concentration: f64,
    pub initial_temperature: f64,
    pub initial_coolant: f64,
    /// Actuator range the plant saturates at.
    pub coolant_bounds: Bounds,
    pub integration_substeps: usize,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            max_ticks: 90,
            noise_fraction: 0.0,
            seed: 42,
            initial_concentration: 8.5698,
            initial_temperature: 311.2612,
            initial_coolant: 297.98,
            coolant_bounds: Bounds::new(273.0, 322.0),
            integration_substeps: 20,
        }
    }
}

/// Everything tunable in the control stack.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    pub perceptor: PerceptorConfig,
    pub programmed: ProgrammedConfig,
    pub error_threshold: ErrorThresholdConfig,
    pub pid: PidConfig,
    pub mpc: MpcConfig,
    pub mpc_temperature: TemperatureMpcConfig,
    pub governor: GovernorConfig,
    pub reward: RewardConfig,
    pub simulation: SimulationConfig,
}

impl ControlConfig {
    /// Load configuration, layering an optional file and the environment over
    /// the defaults.
    pub fn load(path: Option<&str>) -> RuntimeResult<Self> {
        let mut builder = config::Config::builder();

        builder = builder.add_source(config::Config::try_from(&ControlConfig::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("CSTR")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let loaded: ControlConfig = builder.build()?.try_deserialize()?;
        loaded.validate()?;
        Ok(loaded)
    }

    pub fn validate(&self) -> RuntimeResult<()> {
        self.perceptor.validate()?;
        self.programmed.validate()?;
        self.pid.validate()?;
        self.mpc.validate()?;
        self.mpc_temperature.validate()?;
        self.governor.validate()?;
        self.reward.validate()?;

        let sim = &self.simulation;
        if !(0.0..=1.0).contains(&sim.noise_fraction) {
            return Err(RuntimeError::Config(format!(
                "noise fraction {} outside [0, 1]",
                sim.noise_fraction
            )));
        }
        if !(sim.coolant_bounds.lower < sim.coolant_bounds.upper) {
            return Err(RuntimeError::Config("coolant bounds are inverted".into()));
        }
        if sim.max_ticks == 0 {
            return Err(RuntimeError::Config("max_ticks must be positive".into()));
        }
        Ok(())
    }
}

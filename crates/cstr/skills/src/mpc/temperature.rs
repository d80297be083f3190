//! Temperature-tracking MPC on a first-order coolant-to-reactor model.
//!
//! `tau·dT/dt = −(T − T0) + Kp·(Tc − Tc0)`, discretised exactly for an input
//! held over each interval. The controller tracks the `Tref` channel, carries
//! its own coolant setting between ticks and returns the difference to the
//! measured coolant.

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use cstr_types::{Action, Observation};

use crate::controller::SkillController;
use crate::error::{SkillError, SkillResult};
use crate::mpc::config::Bounds;
use crate::mpc::optimizer::{OptimizerConfig, Solution};
use crate::mpc::solve_moves;
use crate::state::ControllerState;

/// Operating span of concentration between the two steady states.
const CONCENTRATION_SPAN: f64 = 8.5698 - 2.0;
/// Operating span of temperature between the two steady states.
const TEMPERATURE_SPAN: f64 = 373.1311 - 311.2612;

/// Linear reactor-temperature response to coolant temperature.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FirstOrderModel {
    pub time_constant: f64,
    /// Reactor kelvin per coolant kelvin at steady state.
    pub gain: f64,
    /// Reactor temperature at the operating point (K).
    pub temperature_offset: f64,
    /// Coolant temperature at the operating point (K).
    pub coolant_offset: f64,
}

impl Default for FirstOrderModel {
    fn default() -> Self {
        Self {
            time_constant: 3.0,
            gain: 0.65,
            temperature_offset: 311.0,
            coolant_offset: 292.0,
        }
    }
}

impl FirstOrderModel {
    pub fn steady_state(&self, coolant: f64) -> f64 {
        self.temperature_offset + self.gain * (coolant - self.coolant_offset)
    }

    /// Temperature after holding `coolant` for `dt`.
    pub fn step(&self, temperature: f64, coolant: f64, dt: f64) -> f64 {
        let target = self.steady_state(coolant);
        target + (temperature - target) * (-dt / self.time_constant).exp()
    }

    fn validate(&self) -> SkillResult<()> {
        if !(self.time_constant.is_finite() && self.time_constant > 0.0) {
            return Err(SkillError::InvalidConfig(format!(
                "time constant must be positive, got {}",
                self.time_constant
            )));
        }
        let coefficients = [self.gain, self.temperature_offset, self.coolant_offset];
        if coefficients.iter().any(|c| !c.is_finite()) {
            return Err(SkillError::InvalidConfig(
                "first-order model coefficients must be finite".into(),
            ));
        }
        Ok(())
    }
}

/// Tuning of the temperature-tracking MPC skill.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TemperatureMpcConfig {
    pub model: FirstOrderModel,
    pub optimizer: OptimizerConfig,
    /// Prediction horizon in ticks.
    pub horizon: usize,
    pub dt: f64,
    /// Coolant temperature limits (K).
    pub input_bounds: Bounds,
    /// Largest coolant change per tick (K).
    pub max_input_rate: f64,
    /// Coolant setting assumed before the first solve (K).
    pub initial_coolant: f64,
    /// Weight on squared coolant moves.
    pub move_weight: f64,
    /// The reference approaches `Tref` from the measured temperature with this
    /// time constant. Zero tracks `Tref` directly.
    pub reference_time_constant: f64,
    /// Uniform measurement noise as a fraction of the operating span.
    pub noise_fraction: f64,
    pub seed: u64,
    pub solve_timeout_ms: u64,
    /// Length of the measured-temperature history kept in the state.
    pub history_limit: usize,
}

impl Default for TemperatureMpcConfig {
    fn default() -> Self {
        Self {
            model: FirstOrderModel::default(),
            optimizer: OptimizerConfig::default(),
            horizon: 10,
            dt: 1.0,
            input_bounds: Bounds::new(273.0, 322.0),
            max_input_rate: 10.0,
            initial_coolant: 292.0,
            move_weight: 0.1,
            reference_time_constant: 1.0,
            noise_fraction: 0.0,
            seed: 42,
            solve_timeout_ms: 2000,
            history_limit: 512,
        }
    }
}

impl TemperatureMpcConfig {
    pub fn validate(&self) -> SkillResult<()> {
        if self.horizon == 0 {
            return Err(SkillError::InvalidConfig("horizon must be positive".into()));
        }
        if !(self.dt > 0.0) || !(self.max_input_rate > 0.0) {
            return Err(SkillError::InvalidConfig(
                "dt and max input rate must be positive".into(),
            ));
        }
        if !(self.move_weight.is_finite() && self.move_weight >= 0.0)
            || !(self.reference_time_constant.is_finite() && self.reference_time_constant >= 0.0)
        {
            return Err(SkillError::InvalidConfig(
                "move weight and reference time constant must be finite and non-negative".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.noise_fraction) {
            return Err(SkillError::InvalidConfig(format!(
                "noise fraction {} outside [0, 1]",
                self.noise_fraction
            )));
        }
        if self.solve_timeout_ms == 0 {
            return Err(SkillError::InvalidConfig(
                "solve timeout must be positive".into(),
            ));
        }
        self.input_bounds.validate("input")?;
        if !self.input_bounds.contains(self.initial_coolant) {
            return Err(SkillError::InvalidConfig(format!(
                "initial coolant {} outside the input bounds",
                self.initial_coolant
            )));
        }
        self.model.validate()?;
        self.optimizer.validate()
    }
}

/// One finite-horizon temperature tracking problem in move space.
#[derive(Clone, Debug)]
pub struct TemperatureProblem {
    model: FirstOrderModel,
    initial: f64,
    previous_input: f64,
    /// Temperature reference for steps `1..=H`.
    references: Vec<f64>,
    dt: f64,
    input_bounds: Bounds,
    max_input_rate: f64,
    move_weight: f64,
}

impl TemperatureProblem {
    pub fn new(
        config: &TemperatureMpcConfig,
        measured: f64,
        setpoint: f64,
        previous_input: f64,
    ) -> Self {
        let references = (1..=config.horizon)
            .map(|k| {
                if config.reference_time_constant > 0.0 {
                    let decay = (-(k as f64) * config.dt / config.reference_time_constant).exp();
                    setpoint + (measured - setpoint) * decay
                } else {
                    setpoint
                }
            })
            .collect();
        Self {
            model: config.model.clone(),
            initial: measured,
            previous_input,
            references,
            dt: config.dt,
            input_bounds: config.input_bounds,
            max_input_rate: config.max_input_rate,
            move_weight: config.move_weight,
        }
    }

    pub fn horizon(&self) -> usize {
        self.references.len()
    }

    pub fn references(&self) -> &[f64] {
        &self.references
    }

    /// Coolant trajectory produced by the moves `z`.
    pub fn inputs(&self, z: &[f64]) -> Vec<f64> {
        let mut previous = self.previous_input;
        z.iter()
            .map(|zk| {
                let u = self.input_bounds.clamp(previous + self.max_input_rate * zk);
                previous = u;
                u
            })
            .collect()
    }

    pub fn cost(&self, z: &[f64]) -> f64 {
        let mut temperature = self.initial;
        let mut previous = self.previous_input;
        let mut total = 0.0;
        for (u, reference) in self.inputs(z).into_iter().zip(&self.references) {
            let delta = u - previous;
            total += self.move_weight * delta * delta;
            previous = u;

            temperature = self.model.step(temperature, u, self.dt);
            let error = temperature - reference;
            total += error * error;
        }
        total
    }
}

#[derive(Debug)]
pub struct TemperatureMpcController {
    config: TemperatureMpcConfig,
    state: ControllerState,
    rng: StdRng,
    warm_start: Option<Vec<f64>>,
}

impl TemperatureMpcController {
    pub fn new(config: TemperatureMpcConfig) -> SkillResult<Self> {
        config.validate()?;
        let state = ControllerState::with_history_limit(config.history_limit);
        let rng = StdRng::seed_from_u64(config.seed);
        Ok(Self {
            config,
            state,
            rng,
            warm_start: None,
        })
    }

    pub fn config(&self) -> &TemperatureMpcConfig {
        &self.config
    }

    /// Coolant temperature the controller last asked for.
    pub fn coolant_setting(&self) -> f64 {
        self.state.previous_mv.unwrap_or(self.config.initial_coolant)
    }

    /// `(Ca, T)` as seen by the controller, noise included.
    pub fn measure(&mut self, observation: &Observation) -> (f64, f64) {
        let mut concentration = observation.concentration();
        let mut temperature = observation.temperature();
        let noise = self.config.noise_fraction;
        if noise > 0.0 {
            concentration += noise * CONCENTRATION_SPAN * self.rng.gen_range(-1.0..=1.0);
            temperature += noise * TEMPERATURE_SPAN * self.rng.gen_range(-1.0..=1.0);
        }
        (concentration, temperature)
    }

    fn clamp_input(&self, proposed: f64, previous: f64) -> f64 {
        let rate = self.config.max_input_rate;
        self.config
            .input_bounds
            .clamp(proposed.clamp(previous - rate, previous + rate))
    }

    async fn solve(&self, problem: TemperatureProblem) -> SkillResult<(Solution, f64)> {
        let horizon = problem.horizon();
        let x0 = self
            .warm_start
            .clone()
            .filter(|w| w.len() == horizon)
            .unwrap_or_else(|| vec![0.0; horizon]);
        let objective = problem.clone();
        let solution = solve_moves(
            move |z| objective.cost(z),
            x0,
            self.config.optimizer.clone(),
            self.config.solve_timeout_ms,
        )
        .await?;
        let first = problem
            .inputs(&solution.x)
            .first()
            .copied()
            .ok_or_else(|| SkillError::SolverFailed("empty move sequence".into()))?;
        Ok((solution, first))
    }
}

#[async_trait]
impl SkillController for TemperatureMpcController {
    fn name(&self) -> &str {
        "mpc-temperature"
    }

    #[instrument(skip_all, name = "temperature_mpc_compute_action")]
    async fn compute_action(
        &mut self,
        observation: &Observation,
        _prior: Action,
    ) -> SkillResult<Action> {
        let tick = self.state.tick;
        let (concentration, temperature) = self.measure(observation);
        let setpoint = observation.temperature_setpoint();
        let previous = self.coolant_setting();
        let problem = TemperatureProblem::new(&self.config, temperature, setpoint, previous);

        let proposed = match self.solve(problem).await {
            Ok((solution, first)) => {
                debug!(
                    tick,
                    cost = solution.cost,
                    iterations = solution.iterations,
                    coolant = first,
                    "Temperature MPC solve"
                );
                let mut shifted = solution.x;
                if let Some(last) = shifted.last().copied() {
                    shifted.remove(0);
                    shifted.push(last);
                }
                self.warm_start = Some(shifted);
                first
            }
            Err(err) if err.is_recoverable() => {
                if tick == 0 {
                    warn!(%err, "Temperature MPC solve failed with no previous setting");
                    return Err(SkillError::NoFallback);
                }
                warn!(%err, coolant = previous, "Temperature MPC solve failed, holding coolant");
                self.warm_start = None;
                previous
            }
            Err(err) => return Err(err),
        };

        let coolant = self.clamp_input(proposed, previous);
        debug!(tick, concentration, temperature, setpoint, coolant, "Temperature MPC move");
        self.state.record(temperature);
        self.state.previous_mv = Some(coolant);
        self.state.advance();

        Ok(Action::new(coolant - observation.coolant_temperature())?)
    }

    fn state(&self) -> &ControllerState {
        &self.state
    }

    fn reset(&mut self) {
        self.state.reset();
        self.warm_start = None;
        self.rng = StdRng::seed_from_u64(self.config.seed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cstr_types::SensorKey;

    fn observation(t: f64, tc: f64, tref: f64) -> Observation {
        Observation::from_values([t, tc, 8.5698, 8.5698, tref, 0.0, 0.14302, 1.4302]).unwrap()
    }

    fn stall_solver(config: &mut TemperatureMpcConfig) {
        config.optimizer.max_iterations = 1;
        config.optimizer.tolerance = 0.0;
        config.optimizer.ftol = 0.0;
    }

    #[test]
    fn model_relaxes_toward_steady_state() {
        let model = FirstOrderModel::default();
        assert_eq!(model.steady_state(292.0), 311.0);
        assert!((model.steady_state(302.0) - 317.5).abs() < 1e-12);

        let next = model.step(311.0, 302.0, 3.0);
        let expected = 317.5 - 6.5 * (-1.0f64).exp();
        assert!((next - expected).abs() < 1e-12, "{next}");
        assert!((model.step(400.0, 292.0, 1e3) - 311.0).abs() < 1e-9);
    }

    #[test]
    fn reference_approaches_setpoint() {
        let config = TemperatureMpcConfig::default();
        let problem = TemperatureProblem::new(&config, 311.0, 330.0, 292.0);
        let refs = problem.references();
        assert_eq!(refs.len(), 10);
        assert!((refs[0] - (330.0 - 19.0 * (-1.0f64).exp())).abs() < 1e-12);
        assert!(refs.windows(2).all(|w| w[1] > w[0] && w[1] < 330.0));

        let step = TemperatureMpcConfig {
            reference_time_constant: 0.0,
            ..Default::default()
        };
        let problem = TemperatureProblem::new(&step, 311.0, 330.0, 292.0);
        assert!(problem.references().iter().all(|r| *r == 330.0));
    }

    #[test]
    fn inputs_respect_rate_and_bounds() {
        let config = TemperatureMpcConfig::default();
        let problem = TemperatureProblem::new(&config, 311.0, 311.0, 318.0);
        let u = problem.inputs(&[1.0, 1.0, -1.0, -0.5]);
        assert_eq!(u, vec![322.0, 322.0, 312.0, 307.0]);
    }

    #[test]
    fn invalid_config_rejected() {
        let config = TemperatureMpcConfig {
            model: FirstOrderModel {
                time_constant: 0.0,
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(TemperatureMpcController::new(config).is_err());

        let config = TemperatureMpcConfig {
            noise_fraction: 1.5,
            ..Default::default()
        };
        assert!(TemperatureMpcController::new(config).is_err());

        let config = TemperatureMpcConfig {
            initial_coolant: 250.0,
            ..Default::default()
        };
        assert!(TemperatureMpcController::new(config).is_err());
    }

    #[tokio::test]
    async fn operating_point_holds_coolant() {
        let mut mpc = TemperatureMpcController::new(TemperatureMpcConfig::default()).unwrap();
        let action = mpc
            .compute_action(&observation(311.0, 292.0, 311.0), Action::ZERO)
            .await
            .unwrap();
        assert!(action.value().abs() < 1e-9, "{action}");
        assert_eq!(mpc.coolant_setting(), 292.0);
        assert_eq!(mpc.state().tick, 1);
        assert_eq!(mpc.state().last_value(), Some(311.0));
    }

    #[tokio::test]
    async fn action_is_relative_to_measured_coolant() {
        let mut mpc = TemperatureMpcController::new(TemperatureMpcConfig::default()).unwrap();
        // Internal setting stays at 292 while the plant reports 300.
        let action = mpc
            .compute_action(&observation(311.0, 300.0, 311.0), Action::new(5.0).unwrap())
            .await
            .unwrap();
        assert!((action.value() + 8.0).abs() < 1e-9, "{action}");
    }

    #[tokio::test]
    async fn hotter_setpoint_raises_coolant_at_rate_limit() {
        let mut mpc = TemperatureMpcController::new(TemperatureMpcConfig::default()).unwrap();
        let action = mpc
            .compute_action(&observation(311.0, 292.0, 330.0), Action::ZERO)
            .await
            .unwrap();
        assert!((action.value() - 10.0).abs() < 1e-9, "{action}");
        assert!((mpc.coolant_setting() - 302.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn first_tick_unconverged_has_no_fallback() {
        let mut config = TemperatureMpcConfig::default();
        stall_solver(&mut config);
        let mut mpc = TemperatureMpcController::new(config).unwrap();
        let err = mpc
            .compute_action(&observation(311.0, 292.0, 313.0), Action::ZERO)
            .await
            .unwrap_err();
        assert_eq!(err, SkillError::NoFallback);
        assert_eq!(mpc.state().tick, 0);
    }

    #[tokio::test]
    async fn unconverged_solve_holds_coolant_setting() {
        let mut mpc = TemperatureMpcController::new(TemperatureMpcConfig::default()).unwrap();
        mpc.compute_action(&observation(311.0, 292.0, 311.0), Action::ZERO)
            .await
            .unwrap();

        stall_solver(&mut mpc.config);
        let action = mpc
            .compute_action(&observation(311.0, 295.0, 313.0), Action::ZERO)
            .await
            .unwrap();
        assert!((action.value() + 3.0).abs() < 1e-9, "{action}");
        assert_eq!(mpc.coolant_setting(), 292.0);
        assert!(mpc.warm_start.is_none());
    }

    #[test]
    fn noise_is_bounded_and_reseeded() {
        let config = TemperatureMpcConfig {
            noise_fraction: 0.1,
            seed: 7,
            ..Default::default()
        };
        let obs = observation(311.0, 292.0, 311.0);
        let mut a = TemperatureMpcController::new(config.clone()).unwrap();
        let mut b = TemperatureMpcController::new(config).unwrap();

        let first = a.measure(&obs);
        assert_eq!(first, b.measure(&obs));
        assert!((first.0 - 8.5698).abs() <= 0.1 * CONCENTRATION_SPAN);
        assert!((first.1 - 311.0).abs() <= 0.1 * TEMPERATURE_SPAN);

        a.measure(&obs);
        a.reset();
        assert_eq!(a.measure(&obs), first);
    }

    #[test]
    fn consumes_plant_channels_and_never_ends() {
        let mpc = TemperatureMpcController::new(TemperatureMpcConfig::default()).unwrap();
        assert_eq!(mpc.name(), "mpc-temperature");
        assert_eq!(mpc.filtered_sensor_space(), SensorKey::plant_space());
        assert!(!mpc.requires_risk_channel());

        let obs = observation(373.0, 322.0, 373.1311);
        assert!(!mpc.success(&obs, Action::ZERO));
        assert!(!mpc.terminate(&obs, Action::ZERO));
    }
}

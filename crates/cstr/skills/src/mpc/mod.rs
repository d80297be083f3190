//! Nonlinear model-predictive control of coolant temperature.
//!
//! Every tick the controller re-solves a finite-horizon tracking problem from
//! its state estimate, applies only the first input, and shifts the solution
//! forward as the next warm start. A solve that stops short of convergence is
//! a failure like a timeout, and the previous action is held instead.

mod config;
mod model;
mod optimizer;
mod problem;
mod schedule;
mod temperature;

pub use config::{Bounds, MpcConfig};
pub use model::{CstrModel, PlantParameters, PlantState};
pub use optimizer::{minimize, OptimizerConfig, Solution};
pub use problem::HorizonProblem;
pub use schedule::{ReferenceSchedule, Setpoint};
pub use temperature::{
    FirstOrderModel, TemperatureMpcConfig, TemperatureMpcController, TemperatureProblem,
};

use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::{debug, instrument, warn};

use cstr_types::{Action, Observation};

use crate::controller::SkillController;
use crate::error::{SkillError, SkillResult};
use crate::state::ControllerState;

#[derive(Debug)]
pub struct MpcController {
    config: MpcConfig,
    model: CstrModel,
    state: ControllerState,
    /// One-step prediction from the previous tick.
    prediction: Option<PlantState>,
    warm_start: Option<Vec<f64>>,
}

impl MpcController {
    pub fn new(config: MpcConfig) -> SkillResult<Self> {
        config.validate()?;
        let model = CstrModel::new(config.plant.clone(), config.integration_substeps);
        let state = ControllerState::with_history_limit(config.history_limit);
        Ok(Self {
            config,
            model,
            state,
            prediction: None,
            warm_start: None,
        })
    }

    pub fn config(&self) -> &MpcConfig {
        &self.config
    }

    pub fn prediction(&self) -> Option<PlantState> {
        self.prediction
    }

    /// Measured state when usable, else the last prediction.
    pub fn estimate_state(&self, measured: PlantState) -> PlantState {
        let usable = measured.is_finite()
            && self.config.concentration_bounds.contains(measured.concentration)
            && self.config.temperature_bounds.contains(measured.temperature);
        if usable {
            return measured;
        }
        match self.prediction {
            Some(predicted) => {
                debug!(?measured, ?predicted, "Measurement out of bounds, using prediction");
                predicted
            }
            None => PlantState::new(
                self.config.concentration_bounds.clamp(measured.concentration),
                self.config.temperature_bounds.clamp(measured.temperature),
            ),
        }
    }

    /// Rate limit against `previous`, then the absolute input bounds.
    pub fn clamp_input(&self, proposed: f64, previous: f64) -> f64 {
        let rate = self.config.max_input_rate;
        let limited = proposed.clamp(previous - rate, previous + rate);
        self.config.input_bounds.clamp(limited)
    }

    async fn solve(&self, problem: HorizonProblem) -> SkillResult<(Solution, f64)> {
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
            .filter(|u| u.is_finite())
            .ok_or_else(|| SkillError::SolverFailed("no finite first input".into()))?;
        Ok((solution, first))
    }
}

/// Minimize `cost` over moves in `[-1, 1]` off the async executor.
///
/// Only a converged solution is returned. Stopping at the iteration limit or
/// on an exhausted line search is [`SkillError::SolverFailed`], and running
/// past `timeout_ms` is [`SkillError::SolverTimeout`].
pub(crate) async fn solve_moves<C>(
    cost: C,
    x0: Vec<f64>,
    optimizer: OptimizerConfig,
    timeout_ms: u64,
) -> SkillResult<Solution>
where
    C: Fn(&[f64]) -> f64 + Send + 'static,
{
    let timeout = Duration::from_millis(timeout_ms);
    let deadline = Instant::now() + timeout;

    let task = tokio::task::spawn_blocking(move || {
        let lower = vec![-1.0; x0.len()];
        let upper = vec![1.0; x0.len()];
        let solution = minimize(cost, x0, &lower, &upper, &optimizer, Some(deadline))?;
        if !solution.converged {
            return Err(SkillError::SolverFailed(format!(
                "not converged after {} iterations, projected gradient {:.3e}",
                solution.iterations, solution.projected_gradient_norm
            )));
        }
        Ok::<_, SkillError>(solution)
    });

    match tokio::time::timeout(timeout, task).await {
        Ok(Ok(Ok(solution))) => Ok(solution),
        Ok(Ok(Err(SkillError::SolverTimeout { .. }))) | Err(_) => {
            Err(SkillError::SolverTimeout { timeout_ms })
        }
        Ok(Ok(Err(err))) => Err(err),
        Ok(Err(join)) => Err(SkillError::SolverFailed(join.to_string())),
    }
}

#[async_trait]
impl SkillController for MpcController {
    fn name(&self) -> &str {
        "mpc"
    }

    #[instrument(skip_all, name = "mpc_compute_action")]
    async fn compute_action(
        &mut self,
        observation: &Observation,
        prior: Action,
    ) -> SkillResult<Action> {
        let tick = self.state.tick;
        let measured_coolant = observation.coolant_temperature();
        // The prior move is already committed on top of the measured coolant.
        let baseline = measured_coolant + prior.value();
        let measured = PlantState::new(observation.concentration(), observation.temperature());
        let initial = self.estimate_state(measured);

        let problem = HorizonProblem::new(
            &self.config,
            self.model.clone(),
            initial,
            baseline,
            tick,
        );

        let proposed = match self.solve(problem).await {
            Ok((solution, first)) => {
                debug!(
                    tick,
                    cost = solution.cost,
                    iterations = solution.iterations,
                    pg_norm = solution.projected_gradient_norm,
                    coolant = first,
                    "MPC solve"
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
                    warn!(%err, "MPC solve failed with no previous action");
                    return Err(SkillError::NoFallback);
                }
                warn!(%err, prior = prior.value(), "MPC solve failed, holding previous action");
                self.warm_start = None;
                baseline
            }
            Err(err) => return Err(err),
        };

        let coolant = self.clamp_input(proposed, baseline);
        if (coolant - proposed).abs() > 1e-9 {
            debug!(proposed, coolant, "External input clamp engaged");
        }

        let predicted = self.model.step(initial, coolant, self.config.dt);
        self.prediction = Some(predicted);
        self.state.record(predicted.concentration);
        self.state.previous_mv = Some(coolant);
        self.state.advance();

        Ok(Action::new(coolant - measured_coolant)?)
    }

    fn state(&self) -> &ControllerState {
        &self.state
    }

    fn reset(&mut self) {
        self.state.reset();
        self.prediction = None;
        self.warm_start = None;
    }
}

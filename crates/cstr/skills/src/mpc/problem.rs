//! One finite-horizon tracking problem in move space.
//!
//! Decision variable `z_k ∈ [−1, 1]` scales the per-tick rate limit, so
//! `u_k = clamp(u_{k−1} + rate·z_k)` satisfies the input bounds and the rate
//! limit for every `z` the optimizer can propose.

use crate::mpc::config::{Bounds, MpcConfig};
use crate::mpc::model::{CstrModel, PlantState};

#[derive(Clone, Debug)]
pub struct HorizonProblem {
    model: CstrModel,
    initial: PlantState,
    previous_input: f64,
    /// Concentration reference for steps `1..=H`.
    references: Vec<f64>,
    dt: f64,
    input_bounds: Bounds,
    max_input_rate: f64,
    concentration_bounds: Bounds,
    temperature_bounds: Bounds,
    stage_weight: f64,
    terminal_weight: f64,
    input_rate_weight: f64,
    state_penalty: f64,
}

impl HorizonProblem {
    pub fn new(
        config: &MpcConfig,
        model: CstrModel,
        initial: PlantState,
        previous_input: f64,
        tick: u64,
    ) -> Self {
        let references = (1..=config.horizon as u64)
            .map(|k| config.schedule.at(tick + k).concentration)
            .collect();
        Self {
            model,
            initial,
            previous_input,
            references,
            dt: config.dt,
            input_bounds: config.input_bounds,
            max_input_rate: config.max_input_rate,
            concentration_bounds: config.concentration_bounds,
            temperature_bounds: config.temperature_bounds,
            stage_weight: config.stage_weight,
            terminal_weight: config.terminal_weight,
            input_rate_weight: config.input_rate_weight,
            state_penalty: config.state_penalty,
        }
    }

    pub fn horizon(&self) -> usize {
        self.references.len()
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
        let horizon = self.horizon();
        let mut state = self.initial;
        let mut previous = self.previous_input;
        let mut total = 0.0;

        for (k, u) in self.inputs(z).into_iter().enumerate() {
            let delta = u - previous;
            total += self.input_rate_weight * delta * delta;
            previous = u;

            state = self.model.step(state, u, self.dt);
            if !state.is_finite() {
                return f64::INFINITY;
            }

            let error = state.concentration - self.references[k];
            let weight = if k + 1 == horizon {
                self.terminal_weight
            } else {
                self.stage_weight
            };
            total += weight * error * error;
            total += self.state_penalty
                * (self.concentration_bounds.violation_squared(state.concentration)
                    + self.temperature_bounds.violation_squared(state.temperature));
        }
        total
    }
}

//! Closed-loop episodes against a simulated reactor.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use cstr_skills::mpc::{CstrModel, PlantParameters, PlantState, ReferenceSchedule};
use cstr_types::{Action, Observation, RawObservation};

use crate::config::SimulationConfig;
use crate::error::RuntimeResult;
use crate::selector::{EpisodeReport, Selector};

/// Operating span of concentration between the two steady states.
const CONCENTRATION_SPAN: f64 = 8.5698 - 2.0;
/// Operating span of temperature between the two steady states.
const TEMPERATURE_SPAN: f64 = 373.1311 - 311.2612;

/// Simulated reactor that applies coolant deltas and reports all eight
/// channels.
#[derive(Debug)]
pub struct PlantSimulator {
    model: CstrModel,
    schedule: ReferenceSchedule,
    config: SimulationConfig,
    state: PlantState,
    coolant: f64,
    tick: u64,
    rng: StdRng,
}

impl PlantSimulator {
    pub fn new(
        plant: PlantParameters,
        schedule: ReferenceSchedule,
        config: SimulationConfig,
    ) -> Self {
        let model = CstrModel::new(plant, config.integration_substeps);
        let state = PlantState::new(config.initial_concentration, config.initial_temperature);
        let coolant = config.initial_coolant;
        let rng = StdRng::seed_from_u64(config.seed);
        Self {
            model,
            schedule,
            config,
            state,
            coolant,
            tick: 0,
            rng,
        }
    }

    pub fn state(&self) -> PlantState {
        self.state
    }

    pub fn coolant(&self) -> f64 {
        self.coolant
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    /// Restore the initial state and reseed the noise.
    pub fn reset(&mut self) {
        self.state = PlantState::new(
            self.config.initial_concentration,
            self.config.initial_temperature,
        );
        self.coolant = self.config.initial_coolant;
        self.tick = 0;
        self.rng = StdRng::seed_from_u64(self.config.seed);
    }

    /// Measure the plant. Noise, if any, affects `Ca` and `T` only.
    pub fn observe(&mut self) -> RuntimeResult<Observation> {
        let setpoint = self.schedule.at(self.tick);
        let mut concentration = self.state.concentration;
        let mut temperature = self.state.temperature;
        let noise = self.config.noise_fraction;
        if noise > 0.0 {
            concentration += noise * CONCENTRATION_SPAN * self.rng.gen_range(-1.0..=1.0);
            temperature += noise * TEMPERATURE_SPAN * self.rng.gen_range(-1.0..=1.0);
        }

        let feed = self.model.params().feed_concentration;
        let observation = Observation::from_values([
            temperature,
            self.coolant,
            concentration,
            setpoint.concentration,
            setpoint.temperature,
            setpoint.concentration - concentration,
            (feed - concentration) / feed,
            feed - concentration,
        ])?;
        Ok(observation)
    }

    /// Apply a coolant delta, saturating at the actuator range, and advance
    /// one control interval.
    pub fn step(&mut self, action: Action, dt: f64) -> RuntimeResult<Observation> {
        self.coolant = self.config.coolant_bounds.clamp(self.coolant + action.value());
        self.state = self.model.step(self.state, self.coolant, dt);
        self.tick += 1;
        self.observe()
    }
}

/// One row of an episode trace.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TickRecord {
    pub tick: u64,
    pub proposed: f64,
    pub action: f64,
    pub governed: bool,
    pub runaway_predicted: Option<bool>,
    pub concentration: f64,
    pub temperature: f64,
    pub coolant: f64,
    pub concentration_setpoint: f64,
    pub reward: f64,
}

/// Episode digest plus its full trace.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EpisodeTrace {
    pub report: EpisodeReport,
    pub records: Vec<TickRecord>,
}

/// Drives a selector and a simulator through whole episodes.
#[derive(Debug)]
pub struct EpisodeRunner {
    selector: Selector,
    simulator: PlantSimulator,
    dt: f64,
}

impl EpisodeRunner {
    pub fn new(selector: Selector, simulator: PlantSimulator, dt: f64) -> Self {
        Self {
            selector,
            simulator,
            dt,
        }
    }

    pub fn selector(&self) -> &Selector {
        &self.selector
    }

    pub fn simulator(&self) -> &PlantSimulator {
        &self.simulator
    }

    /// Run `skill` until it signals success or termination, or for
    /// `max_ticks`.
    pub async fn run(&mut self, skill: &str, max_ticks: u64) -> RuntimeResult<EpisodeTrace> {
        let episode = self.selector.begin_episode(skill)?.id;
        self.simulator.reset();

        let mut observation = self.simulator.observe()?;
        let mut prior = Action::ZERO;
        let mut records = Vec::new();

        for _ in 0..max_ticks {
            let raw = RawObservation::from(*observation.values());
            let outcome = self.selector.tick(&raw, prior).await?;
            let action = outcome.decision.action;

            let next = self.simulator.step(action, self.dt)?;
            let reward = self.selector.score(&next, action);

            records.push(TickRecord {
                tick: outcome.tick,
                proposed: outcome.decision.proposed.value(),
                action: action.value(),
                governed: outcome.decision.governed,
                runaway_predicted: outcome.decision.observation.risk().map(|r| r.runaway),
                concentration: next.concentration(),
                temperature: next.temperature(),
                coolant: next.coolant_temperature(),
                concentration_setpoint: next.concentration_setpoint(),
                reward,
            });

            prior = action;
            observation = next;

            if outcome.success || outcome.terminate {
                debug!(
                    tick = outcome.tick,
                    success = outcome.success,
                    terminate = outcome.terminate,
                    "Skill ended the episode"
                );
                break;
            }
        }

        let report = self.selector.end_episode()?;
        info!(
            %episode,
            ticks = records.len(),
            cumulative_error = report.summary.cumulative_squared_error,
            "Episode trace complete"
        );
        Ok(EpisodeTrace { report, records })
    }
}

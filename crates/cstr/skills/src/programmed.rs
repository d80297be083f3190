//! Phase schedule keyed purely on the tick counter.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use cstr_types::{Action, Observation};

use crate::controller::SkillController;
use crate::error::{SkillError, SkillResult};
use crate::state::ControllerState;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    /// Initial steady state.
    A,
    /// Transition.
    B,
    /// Final steady state.
    C,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProgrammedConfig {
    /// Last tick (inclusive) of phase A.
    pub phase_a_end: u64,
    /// First tick of phase C.
    pub phase_c_start: u64,
    pub phase_a_action: f64,
    pub phase_b_action: f64,
    pub phase_c_action: f64,
}

impl Default for ProgrammedConfig {
    fn default() -> Self {
        Self {
            phase_a_end: 22,
            phase_c_start: 76,
            phase_a_action: 0.0,
            phase_b_action: 1.0,
            phase_c_action: 2.0,
        }
    }
}

impl ProgrammedConfig {
    pub fn validate(&self) -> SkillResult<()> {
        if self.phase_c_start <= self.phase_a_end {
            return Err(SkillError::InvalidConfig(format!(
                "phase C start {} must follow phase A end {}",
                self.phase_c_start, self.phase_a_end
            )));
        }
        if [self.phase_a_action, self.phase_b_action, self.phase_c_action]
            .iter()
            .any(|a| !a.is_finite())
        {
            return Err(SkillError::InvalidConfig(
                "phase actions must be finite".into(),
            ));
        }
        Ok(())
    }

    pub fn phase_for_tick(&self, tick: u64) -> Phase {
        if tick <= self.phase_a_end {
            Phase::A
        } else if tick >= self.phase_c_start {
            Phase::C
        } else {
            Phase::B
        }
    }

    pub fn action_for(&self, phase: Phase) -> f64 {
        match phase {
            Phase::A => self.phase_a_action,
            Phase::B => self.phase_b_action,
            Phase::C => self.phase_c_action,
        }
    }
}

/// Emits a fixed action per phase. Never terminates on its own.
#[derive(Debug)]
pub struct ProgrammedController {
    config: ProgrammedConfig,
    state: ControllerState,
    phase: Phase,
}

impl ProgrammedController {
    pub fn new(config: ProgrammedConfig) -> SkillResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            state: ControllerState::default(),
            phase: Phase::A,
        })
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }
}

#[async_trait]
impl SkillController for ProgrammedController {
    fn name(&self) -> &str {
        "programmed"
    }

    async fn compute_action(
        &mut self,
        _observation: &Observation,
        _prior: Action,
    ) -> SkillResult<Action> {
        let tick = self.state.advance();
        let phase = self.config.phase_for_tick(tick);
        if phase != self.phase {
            debug!(tick, from = ?self.phase, to = ?phase, "Phase change");
            self.phase = phase;
        }
        let value = self.config.action_for(phase);
        self.state.previous_mv = Some(value);
        Ok(Action::new(value)?)
    }

    fn state(&self) -> &ControllerState {
        &self.state
    }

    fn reset(&mut self) {
        self.state.reset();
        self.phase = Phase::A;
    }
}

//! The skill-controller capability and the risk-channel adapter.

use async_trait::async_trait;

use cstr_types::{Action, Observation, SensorKey};

use crate::error::SkillResult;
use crate::state::ControllerState;

/// A control strategy that turns observations into coolant-temperature deltas.
///
/// One instance is active per episode. Implementations mutate only their own
/// [`ControllerState`], which is cleared by [`SkillController::reset`] at
/// episode start.
#[async_trait]
pub trait SkillController: Send + Sync {
    /// Stable name used to register the skill.
    fn name(&self) -> &str;

    /// Rewrite the observation before it reaches `compute_action`.
    fn transform_sensors(&self, observation: Observation) -> Observation {
        observation
    }

    /// Channels this skill consumes.
    fn filtered_sensor_space(&self) -> Vec<SensorKey> {
        SensorKey::plant_space()
    }

    /// Whether the risk perceptor must run before this skill.
    fn requires_risk_channel(&self) -> bool {
        self.filtered_sensor_space()
            .contains(&SensorKey::ThermalRunawayPredict)
    }

    /// Produce this tick's action given the previous one.
    async fn compute_action(&mut self, observation: &Observation, prior: Action)
        -> SkillResult<Action>;

    fn success(&self, _observation: &Observation, _action: Action) -> bool {
        false
    }

    fn terminate(&self, _observation: &Observation, _action: Action) -> bool {
        false
    }

    fn state(&self) -> &ControllerState;

    fn reset(&mut self);
}

/// Declares a dependency on `thermal_runaway_predict` for any skill.
#[derive(Debug)]
pub struct WithRiskChannel<S> {
    inner: S,
}

impl<S: SkillController> WithRiskChannel<S> {
    pub fn new(inner: S) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

#[async_trait]
impl<S: SkillController> SkillController for WithRiskChannel<S> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn transform_sensors(&self, observation: Observation) -> Observation {
        self.inner.transform_sensors(observation)
    }

    fn filtered_sensor_space(&self) -> Vec<SensorKey> {
        let mut space = self.inner.filtered_sensor_space();
        if !space.contains(&SensorKey::ThermalRunawayPredict) {
            space.push(SensorKey::ThermalRunawayPredict);
        }
        space
    }

    async fn compute_action(
        &mut self,
        observation: &Observation,
        prior: Action,
    ) -> SkillResult<Action> {
        self.inner.compute_action(observation, prior).await
    }

    fn success(&self, observation: &Observation, action: Action) -> bool {
        self.inner.success(observation, action)
    }

    fn terminate(&self, observation: &Observation, action: Action) -> bool {
        self.inner.terminate(observation, action)
    }

    fn state(&self) -> &ControllerState {
        self.inner.state()
    }

    fn reset(&mut self) {
        self.inner.reset()
    }
}

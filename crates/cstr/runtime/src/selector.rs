//! Per-tick orchestration of the active skill.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};
use uuid::Uuid;

use cstr_perceptor::RiskPerceptor;
use cstr_skills::{
    ErrorThresholdController, MpcController, PidController, ProgrammedController,
    SkillController, TemperatureMpcController, WithRiskChannel,
};
use cstr_types::{normalize, Action, Observation, RawObservation, SensorKey};

use crate::config::ControlConfig;
use crate::error::{RuntimeError, RuntimeResult};
use crate::governor::SafetyGovernor;
use crate::reward::{EpisodeSummary, RewardEngine};

/// Bookkeeping for the episode in progress.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EpisodeInfo {
    pub id: Uuid,
    pub skill: String,
    pub started_at: DateTime<Utc>,
    pub ticks: u64,
}

/// What the selector did with one observation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    /// Action emitted after the governor.
    pub action: Action,
    /// Action the skill proposed.
    pub proposed: Action,
    /// Observation as the skill saw it, risk channel included when perceived.
    pub observation: Observation,
    /// Whether the governor changed the action.
    pub governed: bool,
}

/// Result of the full per-tick protocol.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TickOutcome {
    pub tick: u64,
    pub decision: Decision,
    pub success: bool,
    pub terminate: bool,
}

/// Episode digest returned by [`Selector::end_episode`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EpisodeReport {
    pub episode: EpisodeInfo,
    pub summary: EpisodeSummary,
}

/// Holds the skill library and routes each tick to the one active skill.
pub struct Selector {
    skills: BTreeMap<String, Box<dyn SkillController>>,
    active: Option<String>,
    perceptor: Option<RiskPerceptor>,
    governor: SafetyGovernor,
    reward: RewardEngine,
    episode: Option<EpisodeInfo>,
}

impl Selector {
    pub fn new(governor: SafetyGovernor, reward: RewardEngine) -> Self {
        Self {
            skills: BTreeMap::new(),
            active: None,
            perceptor: None,
            governor,
            reward,
            episode: None,
        }
    }

    pub fn with_perceptor(mut self, perceptor: RiskPerceptor) -> Self {
        self.perceptor = Some(perceptor);
        self
    }

    /// Selector with the five standard skills registered under their names.
    ///
    /// With a perceptor the MPC skill consumes the risk channel.
    pub fn from_config(
        config: &ControlConfig,
        perceptor: Option<RiskPerceptor>,
    ) -> RuntimeResult<Self> {
        config.validate()?;
        let mut selector = Selector::new(
            SafetyGovernor::new(config.governor.clone()),
            RewardEngine::new(config.reward.clone()),
        );
        selector.register(Box::new(ProgrammedController::new(
            config.programmed.clone(),
        )?))?;
        selector.register(Box::new(ErrorThresholdController::new(
            config.error_threshold.clone(),
        )?))?;
        selector.register(Box::new(PidController::new(config.pid.clone())?))?;
        selector.register(Box::new(TemperatureMpcController::new(
            config.mpc_temperature.clone(),
        )?))?;

        let mpc = MpcController::new(config.mpc.clone())?;
        match perceptor {
            Some(perceptor) => {
                selector.register(Box::new(WithRiskChannel::new(mpc)))?;
                selector.perceptor = Some(perceptor);
            }
            None => selector.register(Box::new(mpc))?,
        }
        Ok(selector)
    }

    pub fn register(&mut self, skill: Box<dyn SkillController>) -> RuntimeResult<()> {
        let name = skill.name().to_string();
        if self.skills.contains_key(&name) {
            return Err(RuntimeError::DuplicateSkill(name));
        }
        debug!(skill = %name, "Registered skill");
        self.skills.insert(name, skill);
        Ok(())
    }

    pub fn skill_names(&self) -> impl Iterator<Item = &str> {
        self.skills.keys().map(String::as_str)
    }

    pub fn episode(&self) -> Option<&EpisodeInfo> {
        self.episode.as_ref()
    }

    pub fn reward(&self) -> &RewardEngine {
        &self.reward
    }

    pub fn perceptor(&self) -> Option<&RiskPerceptor> {
        self.perceptor.as_ref()
    }

    /// Activate `name` and reset every skill, the perceptor and the reward
    /// engine.
    pub fn begin_episode(&mut self, name: &str) -> RuntimeResult<&EpisodeInfo> {
        if !self.skills.contains_key(name) {
            return Err(RuntimeError::UnknownSkill(name.to_string()));
        }
        for skill in self.skills.values_mut() {
            skill.reset();
        }
        if let Some(perceptor) = self.perceptor.as_mut() {
            perceptor.reset();
        }
        self.reward.reset();

        let info = EpisodeInfo {
            id: Uuid::new_v4(),
            skill: name.to_string(),
            started_at: Utc::now(),
            ticks: 0,
        };
        info!(episode = %info.id, skill = name, "Episode started");
        self.active = Some(name.to_string());
        Ok(&*self.episode.insert(info))
    }

    /// Close the episode and hand back its digest.
    pub fn end_episode(&mut self) -> RuntimeResult<EpisodeReport> {
        let episode = self.episode.take().ok_or(RuntimeError::NoActiveEpisode)?;
        self.active = None;
        let summary = self.reward.summary();
        info!(
            episode = %episode.id,
            ticks = episode.ticks,
            final_reward = summary.final_reward,
            "Episode ended"
        );
        Ok(EpisodeReport { episode, summary })
    }

    fn active_skill(&self) -> RuntimeResult<&dyn SkillController> {
        let name = self.active.as_deref().ok_or(RuntimeError::NoActiveEpisode)?;
        self.skills
            .get(name)
            .map(|s| s.as_ref())
            .ok_or_else(|| RuntimeError::UnknownSkill(name.to_string()))
    }

    pub fn transform_sensors(&self, observation: Observation) -> RuntimeResult<Observation> {
        Ok(self.active_skill()?.transform_sensors(observation))
    }

    pub fn filtered_sensor_space(&self) -> RuntimeResult<Vec<SensorKey>> {
        Ok(self.active_skill()?.filtered_sensor_space())
    }

    /// Perceive if the active skill needs the risk channel, delegate, then
    /// govern.
    pub async fn compute_action(
        &mut self,
        observation: &Observation,
        prior: Action,
    ) -> RuntimeResult<Decision> {
        let name = self.active.as_deref().ok_or(RuntimeError::NoActiveEpisode)?;
        let skill = self
            .skills
            .get_mut(name)
            .ok_or_else(|| RuntimeError::UnknownSkill(name.to_string()))?;

        let observation = if skill.requires_risk_channel() {
            match self.perceptor.as_mut() {
                Some(perceptor) => perceptor.perceive(observation)?,
                None if observation.risk().is_some() => observation.clone(),
                None => return Err(RuntimeError::PerceptorMissing(name.to_string())),
            }
        } else {
            observation.clone()
        };

        let proposed = skill.compute_action(&observation, prior).await?;
        let action = self.governor.govern(proposed, observation.risk());
        Ok(Decision {
            action,
            proposed,
            governed: action != proposed,
            observation,
        })
    }

    pub fn success(&self, observation: &Observation, action: Action) -> RuntimeResult<bool> {
        Ok(self.active_skill()?.success(observation, action))
    }

    pub fn terminate(&self, observation: &Observation, action: Action) -> RuntimeResult<bool> {
        Ok(self.active_skill()?.terminate(observation, action))
    }

    /// Score the realized transition.
    pub fn score(&mut self, observation: &Observation, action: Action) -> f64 {
        self.reward.score(observation, action)
    }

    /// Run the host protocol for one raw observation: normalize,
    /// `transform_sensors`, `filtered_sensor_space`, `compute_action`,
    /// `success`, `terminate`.
    #[instrument(skip_all)]
    pub async fn tick(
        &mut self,
        raw: &RawObservation,
        prior: Action,
    ) -> RuntimeResult<TickOutcome> {
        let tick = self
            .episode
            .as_ref()
            .ok_or(RuntimeError::NoActiveEpisode)?
            .ticks;

        let observation = self.transform_sensors(normalize(raw)?)?;
        let sensor_space = self.filtered_sensor_space()?;
        let decision = self.compute_action(&observation, prior).await?;
        let success = self.success(&decision.observation, decision.action)?;
        let terminate = self.terminate(&decision.observation, decision.action)?;

        debug!(
            tick,
            channels = sensor_space.len(),
            proposed = decision.proposed.value(),
            action = decision.action.value(),
            governed = decision.governed,
            "Tick"
        );

        if let Some(episode) = self.episode.as_mut() {
            episode.ticks += 1;
        }
        Ok(TickOutcome {
            tick,
            decision,
            success,
            terminate,
        })
    }
}

impl std::fmt::Debug for Selector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Selector")
            .field("skills", &self.skills.keys().collect::<Vec<_>>())
            .field("active", &self.active)
            .field("perceptor", &self.perceptor)
            .field("episode", &self.episode)
            .finish_non_exhaustive()
    }
}

use thiserror::Error;

use cstr_perceptor::PerceptorError;
use cstr_skills::SkillError;
use cstr_types::TypesError;

/// Errors raised while orchestrating an episode.
#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("unknown skill: {0}")]
    UnknownSkill(String),

    #[error("skill already registered: {0}")]
    DuplicateSkill(String),

    #[error("no active episode")]
    NoActiveEpisode,

    #[error("skill {0} consumes the risk channel but no perceptor is configured")]
    PerceptorMissing(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("failed to load configuration: {0}")]
    ConfigLoad(#[from] config::ConfigError),

    #[error(transparent)]
    Types(#[from] TypesError),

    #[error(transparent)]
    Perceptor(#[from] PerceptorError),

    #[error(transparent)]
    Skill(#[from] SkillError),
}

pub type RuntimeResult<T> = Result<T, RuntimeError>;

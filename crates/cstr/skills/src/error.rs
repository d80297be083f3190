use thiserror::Error;

use cstr_types::TypesError;

/// Errors raised by skill controllers.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SkillError {
    #[error("division by zero: {quantity} is zero")]
    DivisionByZero { quantity: &'static str },

    #[error("invalid controller configuration: {0}")]
    InvalidConfig(String),

    #[error("solver failed: {0}")]
    SolverFailed(String),

    #[error("solver exceeded {timeout_ms}ms")]
    SolverTimeout { timeout_ms: u64 },

    #[error("solver failed on the first tick and no previous action exists")]
    NoFallback,

    #[error(transparent)]
    Types(#[from] TypesError),
}

impl SkillError {
    /// Whether the controller may fall back to holding the previous action.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            SkillError::SolverFailed(_) | SkillError::SolverTimeout { .. }
        )
    }
}

pub type SkillResult<T> = Result<T, SkillError>;

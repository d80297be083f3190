use serde::{Deserialize, Serialize};

use crate::error::{TypesError, TypesResult};

/// Change in coolant temperature (K) to apply this tick.
///
/// Serializes as a one-element vector. Accepts a scalar, a one-element vector
/// or `{"action": v}` on the way in.
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(into = "[f64; 1]", try_from = "ActionInput")]
pub struct Action(f64);

impl Action {
    pub const ZERO: Action = Action(0.0);

    pub fn new(value: f64) -> TypesResult<Self> {
        if !value.is_finite() {
            return Err(TypesError::InvalidAction(format!(
                "action must be finite, got {value}"
            )));
        }
        Ok(Self(value))
    }

    pub fn value(&self) -> f64 {
        self.0
    }

    /// Parse an action from a host-supplied JSON value.
    pub fn from_json(value: serde_json::Value) -> TypesResult<Self> {
        let text = value.to_string();
        let input: ActionInput =
            serde_json::from_value(value).map_err(|_| TypesError::Conversion {
                channel: "action".to_string(),
                value: text,
            })?;
        Action::try_from(input)
    }
}

impl Default for Action {
    fn default() -> Self {
        Action::ZERO
    }
}

impl From<Action> for [f64; 1] {
    fn from(action: Action) -> Self {
        [action.0]
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]", self.0)
    }
}

/// Shapes an action may take at the boundary.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ActionInput {
    Scalar(f64),
    Vector(Vec<f64>),
    Mapping { action: f64 },
}

impl TryFrom<ActionInput> for Action {
    type Error = TypesError;

    fn try_from(input: ActionInput) -> TypesResult<Self> {
        match input {
            ActionInput::Scalar(v) | ActionInput::Mapping { action: v } => Action::new(v),
            ActionInput::Vector(values) => match values.as_slice() {
                [v] => Action::new(*v),
                other => Err(TypesError::InvalidAction(format!(
                    "expected exactly one element, found {}",
                    other.len()
                ))),
            },
        }
    }
}

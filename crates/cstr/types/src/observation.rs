use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::channel::{Channel, CHANNEL_COUNT, RISK_CHANNEL};
use crate::error::{TypesError, TypesResult};
use crate::risk::RiskSignal;

/// Observation as it arrives from the host, before normalization.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawObservation {
    /// Exactly eight values in canonical channel order.
    Sequence(Vec<Value>),
    /// Channel name to value.
    Named(Map<String, Value>),
}

impl From<[f64; CHANNEL_COUNT]> for RawObservation {
    fn from(values: [f64; CHANNEL_COUNT]) -> Self {
        RawObservation::Sequence(values.into_iter().map(Value::from).collect())
    }
}

/// A complete reading of every plant channel.
///
/// Constructed only through [`normalize`] or [`Observation::from_values`], so a
/// controller never sees a partial or non-numeric observation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawObservation", into = "BTreeMap<String, f64>")]
pub struct Observation {
    values: [f64; CHANNEL_COUNT],
    risk: Option<RiskSignal>,
}

impl Observation {
    /// Build from values in canonical order. Every value must be finite.
    pub fn from_values(values: [f64; CHANNEL_COUNT]) -> TypesResult<Self> {
        for channel in Channel::ALL {
            if !values[channel.index()].is_finite() {
                return Err(TypesError::NonFinite {
                    channel: channel.name().to_string(),
                });
            }
        }
        Ok(Self { values, risk: None })
    }

    pub fn get(&self, channel: Channel) -> f64 {
        self.values[channel.index()]
    }

    pub fn values(&self) -> &[f64; CHANNEL_COUNT] {
        &self.values
    }

    pub fn temperature(&self) -> f64 {
        self.get(Channel::Temperature)
    }

    pub fn coolant_temperature(&self) -> f64 {
        self.get(Channel::CoolantTemperature)
    }

    pub fn concentration(&self) -> f64 {
        self.get(Channel::Concentration)
    }

    pub fn concentration_setpoint(&self) -> f64 {
        self.get(Channel::ConcentrationSetpoint)
    }

    pub fn temperature_setpoint(&self) -> f64 {
        self.get(Channel::TemperatureSetpoint)
    }

    pub fn risk(&self) -> Option<&RiskSignal> {
        self.risk.as_ref()
    }

    /// Value of the `thermal_runaway_predict` channel, if merged.
    pub fn thermal_runaway_predict(&self) -> Option<u8> {
        self.risk.map(|r| r.flag())
    }

    /// Merge a risk signal as the additional channel.
    pub fn with_risk(mut self, risk: RiskSignal) -> Self {
        self.risk = Some(risk);
        self
    }

    /// Named view of the observation, including the risk channel when present.
    pub fn to_map(&self) -> BTreeMap<String, f64> {
        let mut map: BTreeMap<String, f64> = Channel::ALL
            .into_iter()
            .map(|c| (c.name().to_string(), self.get(c)))
            .collect();
        if let Some(flag) = self.thermal_runaway_predict() {
            map.insert(RISK_CHANNEL.to_string(), f64::from(flag));
        }
        map
    }
}

impl From<Observation> for BTreeMap<String, f64> {
    fn from(observation: Observation) -> Self {
        observation.to_map()
    }
}

impl TryFrom<RawObservation> for Observation {
    type Error = TypesError;

    fn try_from(raw: RawObservation) -> TypesResult<Self> {
        normalize(&raw)
    }
}

/// Normalize a raw observation into the canonical typed form.
///
/// A sequence must hold exactly [`CHANNEL_COUNT`] numbers. A mapping must name
/// every channel; unknown keys are ignored and `thermal_runaway_predict` is
/// read as a risk flag. Non-numeric values are rejected, never coerced.
pub fn normalize(raw: &RawObservation) -> TypesResult<Observation> {
    match raw {
        RawObservation::Sequence(items) => {
            if items.len() != CHANNEL_COUNT {
                return Err(TypesError::SchemaMismatch {
                    expected: CHANNEL_COUNT,
                    found: items.len(),
                });
            }
            let mut values = [0.0; CHANNEL_COUNT];
            for (channel, item) in Channel::ALL.into_iter().zip(items) {
                values[channel.index()] = numeric(channel.name(), item)?;
            }
            Observation::from_values(values)
        }
        RawObservation::Named(map) => {
            let mut values = [0.0; CHANNEL_COUNT];
            for channel in Channel::ALL {
                let item = map
                    .get(channel.name())
                    .ok_or(TypesError::MissingChannel(channel.name()))?;
                values[channel.index()] = numeric(channel.name(), item)?;
            }
            let observation = Observation::from_values(values)?;
            match map.get(RISK_CHANNEL) {
                Some(item) => {
                    let flag = numeric(RISK_CHANNEL, item)?;
                    if flag != 0.0 && flag != 1.0 {
                        return Err(TypesError::Conversion {
                            channel: RISK_CHANNEL.to_string(),
                            value: item.to_string(),
                        });
                    }
                    Ok(observation.with_risk(RiskSignal::from_flag(flag == 1.0)))
                }
                None => Ok(observation),
            }
        }
    }
}

fn numeric(channel: &str, value: &Value) -> TypesResult<f64> {
    match value {
        Value::Number(n) => n.as_f64().ok_or_else(|| TypesError::Conversion {
            channel: channel.to_string(),
            value: value.to_string(),
        }),
        other => Err(TypesError::Conversion {
            channel: channel.to_string(),
            value: other.to_string(),
        }),
    }
}

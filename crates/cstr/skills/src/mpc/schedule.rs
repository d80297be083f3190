use serde::{Deserialize, Serialize};

use crate::error::{SkillError, SkillResult};

/// Concentration and temperature setpoints at one instant.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Setpoint {
    pub concentration: f64,
    pub temperature: f64,
}

/// Hold `initial`, ramp linearly to `target` between the transition ticks,
/// then hold `target`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReferenceSchedule {
    pub transition_start: u64,
    pub transition_end: u64,
    pub initial: Setpoint,
    pub target: Setpoint,
}

impl Default for ReferenceSchedule {
    fn default() -> Self {
        Self {
            transition_start: 22,
            transition_end: 74,
            initial: Setpoint {
                concentration: 8.5698,
                temperature: 311.2612,
            },
            target: Setpoint {
                concentration: 2.0,
                temperature: 373.1311,
            },
        }
    }
}

impl ReferenceSchedule {
    pub fn validate(&self) -> SkillResult<()> {
        if self.transition_end <= self.transition_start {
            return Err(SkillError::InvalidConfig(format!(
                "transition end {} must follow start {}",
                self.transition_end, self.transition_start
            )));
        }
        let anchors = [
            self.initial.concentration,
            self.initial.temperature,
            self.target.concentration,
            self.target.temperature,
        ];
        if anchors.iter().any(|v| !v.is_finite()) {
            return Err(SkillError::InvalidConfig(
                "schedule anchors must be finite".into(),
            ));
        }
        Ok(())
    }

    pub fn at(&self, tick: u64) -> Setpoint {
        if tick <= self.transition_start {
            return self.initial;
        }
        if tick >= self.transition_end {
            return self.target;
        }
        let span = (self.transition_end - self.transition_start) as f64;
        let s = (tick - self.transition_start) as f64 / span;
        Setpoint {
            concentration: lerp(self.initial.concentration, self.target.concentration, s),
            temperature: lerp(self.initial.temperature, self.target.temperature, s),
        }
    }
}

fn lerp(a: f64, b: f64, s: f64) -> f64 {
    a + (b - a) * s
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn three_segments() {
        let schedule = ReferenceSchedule::default();
        assert_eq!(schedule.at(0), schedule.initial);
        assert_eq!(schedule.at(22), schedule.initial);
        assert_eq!(schedule.at(74), schedule.target);
        assert_eq!(schedule.at(200), schedule.target);

        let mid = schedule.at(48);
        assert!((mid.concentration - (8.5698 + 2.0) / 2.0).abs() < 1e-9);
        assert!((mid.temperature - (311.2612 + 373.1311) / 2.0).abs() < 1e-9);
    }

    #[test]
    fn ramp_is_monotone() {
        let schedule = ReferenceSchedule::default();
        let mut last = schedule.at(0).concentration;
        for tick in 1..90 {
            let c = schedule.at(tick).concentration;
            assert!(c <= last);
            last = c;
        }
    }

    #[test]
    fn empty_transition_rejected() {
        let schedule = ReferenceSchedule {
            transition_end: 22,
            ..Default::default()
        };
        assert!(schedule.validate().is_err());
    }
}

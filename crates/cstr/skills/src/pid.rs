//! Discrete PID with selectable discretization and a filtered derivative.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use cstr_types::{Action, Channel, Observation};

use crate::controller::SkillController;
use crate::error::{SkillError, SkillResult};
use crate::state::ControllerState;

/// How the continuous PID law is discretized.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Discretization {
    #[default]
    Backward,
    Forward,
    Tustin,
    Ramp,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PidConfig {
    /// Proportional gain.
    pub kp: f64,
    /// Integral time. Zero disables integral action.
    pub tau_i: f64,
    /// Derivative time. Zero disables the derivative filter.
    pub tau_d: f64,
    /// Sample interval.
    pub dt: f64,
    /// Derivative filter order.
    pub n: f64,
    pub bias: f64,
    /// Setpoint weight on the proportional term.
    pub b: f64,
    /// Setpoint weight on the derivative term.
    pub c: f64,
    pub method: Discretization,
    pub measured: Channel,
    pub setpoint: Channel,
}

impl Default for PidConfig {
    fn default() -> Self {
        Self {
            kp: 0.04,
            tau_i: 1.8,
            tau_d: 1.5,
            dt: 1.0,
            n: 1.0,
            bias: 0.0,
            b: 1.0,
            c: 0.0,
            method: Discretization::Backward,
            measured: Channel::Temperature,
            setpoint: Channel::TemperatureSetpoint,
        }
    }
}

impl PidConfig {
    pub fn validate(&self) -> SkillResult<()> {
        if !(self.dt > 0.0) {
            return Err(SkillError::InvalidConfig(format!(
                "dt must be positive, got {}",
                self.dt
            )));
        }
        let values = [
            self.kp, self.tau_i, self.tau_d, self.n, self.bias, self.b, self.c,
        ];
        if values.iter().any(|v| !v.is_finite()) {
            return Err(SkillError::InvalidConfig(
                "PID parameters must be finite".into(),
            ));
        }
        Ok(())
    }
}

/// Integral (`b1`, `b2`) and derivative filter (`ad`, `bd`) coefficients.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PidCoefficients {
    pub b1: f64,
    pub b2: f64,
    pub ad: f64,
    pub bd: f64,
}

/// `num / den`, or zero when `den` is zero.
fn guarded(num: f64, den: f64) -> f64 {
    if den == 0.0 {
        0.0
    } else {
        num / den
    }
}

impl PidCoefficients {
    pub fn derive(config: &PidConfig) -> Self {
        let PidConfig {
            kp,
            tau_i: ti,
            tau_d: td,
            dt,
            n,
            method,
            ..
        } = *config;

        let coefficients = match method {
            Discretization::Backward => Self {
                b1: guarded(kp * dt, ti),
                b2: 0.0,
                ad: guarded(td, td + n * dt),
                bd: guarded(kp * td * n, td + n * dt),
            },
            Discretization::Forward => Self {
                b1: 0.0,
                b2: guarded(kp * dt, ti),
                ad: if td == 0.0 { 0.0 } else { 1.0 - n * dt / td },
                bd: kp * n,
            },
            Discretization::Tustin => {
                let b = guarded(kp * dt / 2.0, ti);
                Self {
                    b1: b,
                    b2: b,
                    ad: guarded(2.0 * td - n * dt, 2.0 * td + n * dt),
                    bd: guarded(2.0 * kp * td * n, 2.0 * td + n * dt),
                }
            }
            Discretization::Ramp => {
                let b = guarded(kp * dt / 2.0, ti);
                let ad = if td == 0.0 { 0.0 } else { (-n * dt / td).exp() };
                Self {
                    b1: b,
                    b2: b,
                    ad,
                    bd: kp * td * (1.0 - ad) / dt,
                }
            }
        };

        // No derivative time, no derivative action.
        if td == 0.0 {
            return Self {
                ad: 0.0,
                bd: 0.0,
                ..coefficients
            };
        }
        coefficients
    }
}

/// The three terms and their sum for one tick.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PidTerms {
    pub proportional: f64,
    pub integral: f64,
    pub derivative: f64,
    pub output: f64,
}

/// One evaluation of the discrete PID law.
///
/// The previous error is taken against the current setpoint.
pub fn pid_step(
    config: &PidConfig,
    coefficients: &PidCoefficients,
    setpoint: f64,
    process_value: f64,
    previous_process_value: f64,
    prior_derivative: f64,
) -> PidTerms {
    let error = setpoint - process_value;
    let previous_error = setpoint - previous_process_value;

    let proportional = config.kp * config.b * error;
    let integral = coefficients.b1 * error + coefficients.b2 * previous_error;
    let derivative = coefficients.ad * prior_derivative
        + coefficients.bd * (config.c * error - config.c * previous_error);

    PidTerms {
        proportional,
        integral,
        derivative,
        output: config.bias + proportional + integral + derivative,
    }
}

/// PID skill. Emits 0.0 on the first tick, when no previous process value exists.
#[derive(Debug)]
pub struct PidController {
    config: PidConfig,
    coefficients: PidCoefficients,
    state: ControllerState,
}

impl PidController {
    pub fn new(config: PidConfig) -> SkillResult<Self> {
        config.validate()?;
        let coefficients = PidCoefficients::derive(&config);
        Ok(Self {
            config,
            coefficients,
            state: ControllerState::default(),
        })
    }

    pub fn config(&self) -> &PidConfig {
        &self.config
    }

    pub fn coefficients(&self) -> &PidCoefficients {
        &self.coefficients
    }
}

#[async_trait]
impl SkillController for PidController {
    fn name(&self) -> &str {
        "pid"
    }

    async fn compute_action(
        &mut self,
        observation: &Observation,
        _prior: Action,
    ) -> SkillResult<Action> {
        let process_value = observation.get(self.config.measured);
        let setpoint = observation.get(self.config.setpoint);

        let output = match self.state.last_value() {
            Some(previous) => {
                let terms = pid_step(
                    &self.config,
                    &self.coefficients,
                    setpoint,
                    process_value,
                    previous,
                    self.state.derivative,
                );
                self.state.integral += terms.integral;
                self.state.derivative = terms.derivative;
                debug!(
                    tick = self.state.tick,
                    p = terms.proportional,
                    i = terms.integral,
                    d = terms.derivative,
                    "PID step"
                );
                terms.output
            }
            None => 0.0,
        };

        self.state.record(process_value);
        self.state.advance();
        self.state.previous_mv = Some(output);
        Ok(Action::new(output)?)
    }

    fn state(&self) -> &ControllerState {
        &self.state
    }

    fn reset(&mut self) {
        self.state.reset();
    }
}

#![deny(unsafe_code)]
//! # cstr-skills
//!
//! Interchangeable control strategies for the CSTR. Each implements
//! [`SkillController`] and owns its [`ControllerState`]:
//!
//! - **ProgrammedController**: fixed action per phase of the tick counter
//! - **ErrorThresholdController**: bang-bang on relative concentration error
//! - **PidController**: discrete PID with Backward, Forward, Tustin or Ramp
//!   discretization and a filtered derivative
//! - **MpcController**: nonlinear model-predictive control of coolant
//!   temperature over a time-varying reference, with rate and bound clamps
//! - **TemperatureMpcController**: linear MPC tracking the reactor temperature
//!   setpoint through a first-order coolant model
//!
//! [`WithRiskChannel`] wraps any skill so the selector runs the risk perceptor
//! before it.

pub mod controller;
pub mod error;
pub mod mpc;
pub mod pid;
pub mod programmed;
pub mod state;
pub mod threshold;

pub use controller::{SkillController, WithRiskChannel};
pub use error::{SkillError, SkillResult};
pub use mpc::{MpcConfig, MpcController, TemperatureMpcConfig, TemperatureMpcController};
pub use pid::{pid_step, Discretization, PidCoefficients, PidConfig, PidController, PidTerms};
pub use programmed::{Phase, ProgrammedConfig, ProgrammedController};
pub use state::ControllerState;
pub use threshold::{relative_error, ErrorThresholdConfig, ErrorThresholdController};

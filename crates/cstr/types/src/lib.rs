#![deny(unsafe_code)]
//! # cstr-types
//!
//! Shared vocabulary of the CSTR control stack.
//!
//! - **Channel**: the fixed 8-channel sensor schema in canonical order
//!   (`T, Tc, Ca, Cref, Tref, Conc_Error, Eps_Yield, Cb_Prod`)
//! - **Observation**: one complete, typed reading of every channel, optionally
//!   carrying the perceptor's risk signal
//! - **RawObservation**: the boundary shape (named mapping or ordered sequence)
//!   that is normalized exactly once into an [`Observation`]
//! - **Action**: the finite coolant-temperature delta emitted each tick
//! - **RiskSignal**: predicted thermal runaway, merged into the observation
//!   as the `thermal_runaway_predict` channel

pub mod action;
pub mod channel;
pub mod error;
pub mod observation;
pub mod risk;

pub use action::{Action, ActionInput};
pub use channel::{Channel, SensorKey, CHANNEL_COUNT, RISK_CHANNEL};
pub use error::{TypesError, TypesResult};
pub use observation::{normalize, Observation, RawObservation};
pub use risk::RiskSignal;

//! A simulated OpenEVSE charging controller.
//!
//! The [`state_machine`] models what the controller reports; the
//! [`simulator`] puts it behind a [`RapiStream`](openevse_rapi::RapiStream)
//! that answers RAPI commands, so that the protocol engine and the manager
//! can be exercised without hardware.

pub mod error;
pub mod simulator;
pub mod state_machine;

pub use error::{EmulatorError, Result};
pub use simulator::{
    DEFAULT_FIRMWARE, DEFAULT_MILLIVOLTS, DEFAULT_PROTOCOL, DEFAULT_TEMPERATURES, SimulatedEvse,
    SimulatorHandle,
};
pub use state_machine::{Controller, ControllerBuilder, MAX_HISTORY_SIZE, Mode, Snapshot, StateTransition};

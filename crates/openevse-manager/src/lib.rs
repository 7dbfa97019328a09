//! Claim arbitration for an OpenEVSE charging controller.
//!
//! Several subsystems want a say over one charger: a manual override, solar
//! divert, a boost timer, a current shaper. Each holds a *claim* with a
//! priority; [`EvseManager`] resolves the claims into a single target and
//! keeps the controller in line with it over RAPI.
//!
//! - [`claims`]: the fixed-capacity claim table and its resolver
//! - [`monitor`]: typed views of `$GV`, `$GC`, `$GS`, `$GG`, `$GP` and async frames
//! - [`events`]: state change, boot and reading notifications
//! - [`manager`]: [`EvseManager`] itself
//! - [`config`]: [`ManagerConfig`], loadable from JSON

pub mod claims;
pub mod config;
pub mod error;
pub mod events;
pub mod manager;
pub mod monitor;

pub use claims::{Claim, ClaimOutcome, ClaimTable, Resolution};
pub use config::ManagerConfig;
pub use error::{ConfigError, Result};
pub use events::{BootReady, DataReady, StateChange, VehicleData};
pub use manager::EvseManager;
pub use monitor::{
    AsyncEvent, ChargeReading, CurrentCapacity, EvseStatus, FirmwareInfo, StatusReport,
    Temperatures,
};

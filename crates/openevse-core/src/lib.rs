//! Shared value types for the OpenEVSE RAPI engine and claim manager.
//!
//! Everything in this crate is a plain value: client identifiers, requested
//! operating properties, priorities and the controller's state codes. The
//! protocol engine (`openevse-rapi`) and the arbitration layer
//! (`openevse-manager`) both build on these types.

pub mod constants;
pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::*;

/// Version info
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

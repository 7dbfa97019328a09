use openevse_core::HardwareState;

/// Result type alias for controller operations.
pub type Result<T> = std::result::Result<T, EmulatorError>;

/// Requests the simulated controller refuses.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EmulatorError {
    /// Pilot outside the hardware range.
    #[error("Pilot {amps}A outside {min}A..={max}A")]
    PilotOutOfRange { amps: u32, min: u32, max: u32 },

    /// Minimum above maximum when building a controller.
    #[error("Invalid current range {min}A..={max}A")]
    InvalidCurrentRange { min: u32, max: u32 },

    /// The vehicle cannot draw current while unplugged.
    #[error("No vehicle connected")]
    VehicleNotConnected,

    /// Only fault codes can be tripped.
    #[error("{0} is not a fault state")]
    NotAFault(HardwareState),
}

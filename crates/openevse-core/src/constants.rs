//! Core constants for the RAPI protocol and the claim manager.
//!
//! # Frame Structure
//!
//! Every RAPI exchange is a single line of ASCII:
//!
//! ```text
//! $<BODY>[ :<SEQ>]^<CHK><CR>
//! ```
//!
//! Where:
//! - `$` - Start of command marker
//! - `BODY` - Command or response tokens separated by spaces
//! - ` :SEQ` - Optional two hex digit sequence id
//! - `^CHK` - Two hex digit XOR of every byte before `^`
//! - `CR` - Carriage return (0x0D) ends the frame
//!
//! # Usage
//!
//! ```
//! use openevse_core::constants::*;
//!
//! assert_eq!(START_OF_COMMAND, b'$');
//! assert_eq!(END_OF_COMMAND, b'\r');
//! assert!(MAX_TOKENS <= RAPI_BUFLEN);
//! ```

// ============================================================================
// Frame Markers
// ============================================================================

/// Start of command marker. Bytes received before it are discarded.
pub const START_OF_COMMAND: u8 = b'$';

/// End of command marker (carriage return).
pub const END_OF_COMMAND: u8 = 0x0D;

/// Start of the sequence id marker inside a frame body.
pub const START_OF_SEQUENCE: u8 = b':';

/// Separates the frame body from its checksum.
pub const CHECKSUM_MARKER: u8 = b'^';

/// Token separator inside a frame body.
pub const TOKEN_SEPARATOR: u8 = b' ';

// ============================================================================
// Limits
// ============================================================================

/// Size of the controller's receive buffer.
///
/// A response frame may hold at most `RAPI_BUFLEN - 1` bytes between `$` and
/// CR (the `$` included); a longer frame is an overflow. Outbound commands are
/// bound by the same buffer on the controller side.
pub const RAPI_BUFLEN: usize = 40;

/// Maximum number of tokens a response body is split into.
pub const MAX_TOKENS: usize = 10;

/// Default number of commands that may wait behind the one in flight.
pub const DEFAULT_QUEUE_CAPACITY: usize = 10;

/// Number of client claims the manager can hold at once.
pub const MAX_CLIENT_CLAIMS: usize = 10;

// ============================================================================
// Timing
// ============================================================================

/// Default reply deadline for a command, in milliseconds.
pub const DEFAULT_TIMEOUT_MS: u64 = 500;

/// Delay between handshake attempts while the controller is unreachable.
pub const DEFAULT_CONNECT_RETRY_MS: u64 = 10_000;

/// Delay between status polls while connected.
pub const DEFAULT_STATUS_POLL_MS: u64 = 30_000;

/// Delay before re-asserting a target after a failed push.
pub const DEFAULT_PUSH_RETRY_MS: u64 = 1_000;

/// Delay between `$GG` current and voltage polls while charging.
pub const DEFAULT_CHARGE_POLL_MS: u64 = 1_000;

/// Delay between `$GP` temperature polls while connected.
pub const DEFAULT_TEMPERATURE_POLL_MS: u64 = 30_000;

// ============================================================================
// Readings
// ============================================================================

/// `$GP` value of a temperature sensor that is not fitted.
pub const TEMPERATURE_NOT_INSTALLED: i32 = -2560;

// ============================================================================
// Sequence Ids
// ============================================================================

/// Reserved sequence id meaning "sequencing disabled". Never transmitted.
pub const INVALID_SEQUENCE_ID: u8 = 0;

// ============================================================================
// Protocol Versions
// ============================================================================

/// First protocol version whose `$GS` reply carries hex states, pilot state
/// and vflags (encoded as `major * 1000 + minor * 100 + patch`).
pub const PROTOCOL_EXTENDED_STATUS: u32 = encode_version(5, 0, 0);

/// Encode a `major.minor.patch` protocol version into a comparable integer.
///
/// # Examples
///
/// ```
/// use openevse_core::constants::encode_version;
///
/// assert_eq!(encode_version(5, 2, 1), 5201);
/// assert!(encode_version(5, 0, 0) > encode_version(4, 9, 9));
/// ```
pub const fn encode_version(major: u32, minor: u32, patch: u32) -> u32 {
    major * 1000 + minor * 100 + patch
}

// ============================================================================
// Volatile Flags (vflags)
// ============================================================================

/// Controller is in a non-autoresettable fault.
pub const VFLAG_HARD_FAULT: u32 = 0x0002;

/// Sleeping after reaching a time or charge limit.
pub const VFLAG_LIMIT_SLEEP: u32 = 0x0004;

/// Locked pending authentication.
pub const VFLAG_AUTH_LOCKED: u32 = 0x0008;

/// Charging relay is closed.
pub const VFLAG_CHARGING_ON: u32 = 0x0040;

/// Vehicle connected (valid only when the pilot is not at -12 V).
pub const VFLAG_EV_CONNECTED: u32 = 0x0100;

/// Set while no charging session is running.
pub const VFLAG_SESSION_ENDED: u32 = 0x0200;

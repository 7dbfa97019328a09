//! RAPI protocol engine for OpenEVSE charging controllers.
//!
//! RAPI is the line-oriented ASCII protocol spoken over the serial link
//! between the network module and the charging controller:
//!
//! ```text
//! -> $SC 16 V :1A^0F\r        set pilot to 16 A (volatile), sequence id 0x1A
//! <- $OK :1A^4A\r             accepted, sequence id echoed
//! <- $AT 03 03 32 0140^35\r   unsolicited state transition
//! ```
//!
//! The crate is layered bottom-up:
//!
//! - [`frame`]: outbound encoding and the XOR checksum
//! - [`stream_parser`]: cutting `$`…CR frames out of a byte stream
//! - [`response`]: checksum verification, tokenizing and classification
//! - [`sender`]: [`RapiSender`], the polled single-in-flight command engine
//! - [`codec`]: [`RapiCodec`] for `tokio_util::codec::Framed`
//! - [`stream`] and, with `hardware-serial`, `serial`: the link itself

pub mod clock;
pub mod codec;
pub mod config;
pub mod error;
pub mod frame;
pub mod queue;
pub mod response;
pub mod sender;
pub mod sequence;
#[cfg(feature = "hardware-serial")]
pub mod serial;
pub mod stream;
pub mod stream_parser;

pub use clock::{Clock, ManualClock, SystemClock};
pub use codec::RapiCodec;
pub use config::RapiConfig;
pub use error::{RapiError, Result};
pub use frame::Frame;
pub use queue::CommandQueue;
pub use response::{RapiResponse, ResponseKind};
pub use sender::{Completion, EventHandler, RapiResult, RapiSender, RapiStats};
pub use sequence::SequenceGenerator;
#[cfg(feature = "hardware-serial")]
pub use serial::{DEFAULT_BAUD_RATE, SerialStream};
pub use stream::{MemoryStream, RapiStream};
pub use stream_parser::{DrainEvents, MAX_FRAME_LEN, ParserEvent, ParserState, StreamParser};

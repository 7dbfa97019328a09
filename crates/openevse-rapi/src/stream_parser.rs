//! Stream parser for RAPI frames.
//!
//! The serial link delivers bytes one at a time with no message boundaries.
//! This module accumulates them and cuts complete frames using a small state
//! machine that looks for the `$` start marker and the CR terminator.
//!
//! # Protocol Framing
//!
//! ```text
//! $  <body>[^<checksum>]  CR
//! 0x24 OK 8.2.2 5.2.1^1F 0x0D
//! ```
//!
//! Bytes received before a `$` are noise and are dropped. A frame that grows
//! past the controller's buffer size before its CR is reported as an
//! overflow and discarded; the parser then resynchronises on the next `$`.
//!
//! # Usage
//!
//! ```
//! use openevse_rapi::{ParserEvent, StreamParser};
//!
//! let mut parser = StreamParser::new();
//!
//! // Feed partial data as it arrives from the link
//! parser.feed(b"noise$OK 8.2");
//! parser.feed(b".2 5.2.1\r");
//!
//! match parser.next_event() {
//!     Some(ParserEvent::Frame(frame)) => assert_eq!(&frame[..], b"$OK 8.2.2 5.2.1"),
//!     other => panic!("unexpected {:?}", other),
//! }
//! ```

use bytes::{Bytes, BytesMut};
use openevse_core::constants::{END_OF_COMMAND, RAPI_BUFLEN, START_OF_COMMAND};
use std::collections::VecDeque;

/// Largest frame, `$` included and CR excluded, that fits the receive buffer.
pub const MAX_FRAME_LEN: usize = RAPI_BUFLEN - 1;

/// Recommended initial capacity for the event queue.
const INITIAL_EVENT_QUEUE_CAPACITY: usize = 4;

/// State machine states for parsing RAPI frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParserState {
    /// Waiting for the `$` start marker. Anything else is discarded.
    WaitingStart,

    /// Accumulating frame bytes until CR.
    ReadingFrame,
}

/// Something the parser found in the byte stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParserEvent {
    /// A complete frame from `$` up to, not including, CR.
    Frame(Bytes),

    /// A frame outgrew the receive buffer and was dropped.
    Overflow,
}

/// Stateful stream parser for RAPI frames.
///
/// # State Machine
///
/// ```text
/// ┌─────────────┐   '$'     ┌──────────────┐   CR    ┌─────────────┐
/// │WaitingStart │──────────>│ ReadingFrame │────────>│ Frame event │
/// └─────────────┘           └──────────────┘         └─────────────┘
///       ^  │ other bytes           │ len > MAX_FRAME_LEN     │
///       │  │ (discarded)           v                         │
///       │  └───────────┐   ┌────────────────┐                │
///       │              │   │ Overflow event │                │
///       └──────────────┴───┴────────────────┴────────────────┘
/// ```
///
/// # Example
///
/// ```
/// use openevse_rapi::{ParserState, StreamParser};
///
/// let mut parser = StreamParser::new();
/// parser.feed(b"$GS");
/// assert_eq!(parser.state(), ParserState::ReadingFrame);
/// assert!(parser.next_event().is_none());
///
/// parser.feed(b"\r");
/// assert_eq!(parser.events_available(), 1);
/// ```
#[derive(Debug)]
pub struct StreamParser {
    /// Bytes of the frame being assembled, `$` included.
    buffer: BytesMut,

    state: ParserState,

    events: VecDeque<ParserEvent>,
}

impl StreamParser {
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(RAPI_BUFLEN),
            state: ParserState::WaitingStart,
            events: VecDeque::with_capacity(INITIAL_EVENT_QUEUE_CAPACITY),
        }
    }

    /// Feed bytes from the link into the parser.
    ///
    /// Any number of frames (or overflows) may be produced by one call; they
    /// are queued in arrival order.
    pub fn feed(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            self.push_byte(byte);
        }
    }

    /// Feed a single byte.
    pub fn push_byte(&mut self, byte: u8) {
        match self.state {
            ParserState::WaitingStart => {
                if byte == START_OF_COMMAND {
                    self.buffer.clear();
                    self.buffer.extend_from_slice(&[byte]);
                    self.state = ParserState::ReadingFrame;
                }
            }
            ParserState::ReadingFrame => {
                if byte == END_OF_COMMAND {
                    let frame = self.buffer.split().freeze();
                    self.events.push_back(ParserEvent::Frame(frame));
                    self.state = ParserState::WaitingStart;
                } else {
                    self.buffer.extend_from_slice(&[byte]);
                    if self.buffer.len() > MAX_FRAME_LEN {
                        self.buffer.clear();
                        self.events.push_back(ParserEvent::Overflow);
                        self.state = ParserState::WaitingStart;
                    }
                }
            }
        }
    }

    /// Extract the next event, if any.
    pub fn next_event(&mut self) -> Option<ParserEvent> {
        self.events.pop_front()
    }

    pub fn state(&self) -> ParserState {
        self.state
    }

    /// Returns number of events ready for extraction.
    pub fn events_available(&self) -> usize {
        self.events.len()
    }

    /// Drop any partial frame and queued events.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.events.clear();
        self.state = ParserState::WaitingStart;
    }

    /// Returns an iterator that drains all currently queued events.
    pub fn drain_events(&mut self) -> DrainEvents<'_> {
        DrainEvents { parser: self }
    }
}

impl Default for StreamParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Iterator returned by [`StreamParser::drain_events`].
pub struct DrainEvents<'a> {
    parser: &'a mut StreamParser,
}

impl Iterator for DrainEvents<'_> {
    type Item = ParserEvent;

    fn next(&mut self) -> Option<Self::Item> {
        self.parser.next_event()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let len = self.parser.events_available();
        (len, Some(len))
    }
}

impl ExactSizeIterator for DrainEvents<'_> {}

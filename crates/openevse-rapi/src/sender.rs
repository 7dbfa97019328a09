//! The RAPI command engine.
//!
//! [`RapiSender`] owns the link to the controller. It keeps at most one
//! command in flight, queues the rest, matches replies to the in-flight
//! command, routes unsolicited frames to an event handler and enforces a
//! deadline per command.
//!
//! # Flow
//!
//! ```text
//! send_cmd ──> queue ──> transmit ──> in flight ──┬─ $OK ──────────> Ok(response)
//!   │                       ^                     ├─ $NK ──────────> Err(Rejected)
//!   │ full / too long       │                     ├─ other ────────> Err(InvalidResponse)
//!   v                       │                     ├─ overflow ─────> Err(BufferOverflow)
//! Err(..) now               │                     └─ deadline ─────> Err(Timeout)
//!                           └──── next queued ─────────┘
//!
//! $ST / $WF / $A.. ──> event handler (never completes a command)
//! bad checksum / stale sequence id ──> dropped, counted
//! ```
//!
//! Nothing here blocks or spawns. The owner calls [`RapiSender::poll`] from
//! its run loop; every completion fires from inside `poll` or, for capacity
//! errors, from inside `send_cmd` itself.
//!
//! # Example
//!
//! ```
//! use openevse_rapi::{Frame, ManualClock, MemoryStream, RapiConfig, RapiSender};
//!
//! let stream = MemoryStream::new();
//! let mut sender = RapiSender::with_clock(stream.clone(), ManualClock::new(), RapiConfig::default());
//!
//! // The controller's reply is already waiting on the link.
//! stream.push_inbound(&Frame::new("$OK 1.2.3 1.2.3").encode().unwrap());
//!
//! let response = sender.send_cmd_sync("$GV").unwrap();
//! assert_eq!(response.tokens(), ["$OK", "1.2.3", "1.2.3"]);
//! assert!(sender.is_connected());
//! ```

use serde::Serialize;
use std::cell::RefCell;
use std::rc::Rc;
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::RapiConfig;
use crate::error::RapiError;
use crate::frame::Frame;
use crate::queue::CommandQueue;
use crate::response::{RapiResponse, ResponseKind};
use crate::sequence::SequenceGenerator;
use crate::stream::RapiStream;
use crate::stream_parser::{ParserEvent, StreamParser};

/// Outcome of one command.
pub type RapiResult = std::result::Result<RapiResponse, RapiError>;

/// Completion handler, called exactly once per command.
pub type Completion = Box<dyn FnOnce(RapiResult)>;

/// Handler for unsolicited frames.
pub type EventHandler = Box<dyn FnMut(&RapiResponse)>;

/// Longest wait `poll` reports, so that inbound bytes are picked up promptly.
const IDLE_POLL_INTERVAL: Duration = Duration::from_millis(10);

struct CommandItem {
    frame: Frame,
    timeout: Duration,
    completion: Completion,
}

struct InFlight {
    frame: Frame,
    deadline: Instant,
    timeout: Duration,
    completion: Completion,
}

/// Counters kept by a [`RapiSender`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RapiStats {
    /// Commands written to the link.
    pub sent: u64,
    pub succeeded: u64,
    pub rejected: u64,
    pub invalid: u64,
    pub timed_out: u64,
    pub bad_checksum: u64,
    pub bad_sequence: u64,
    pub overflow: u64,
    pub queue_full: u64,
    pub too_long: u64,
    pub transport_errors: u64,
    pub async_events: u64,
}

/// Single-owner RAPI command engine over a [`RapiStream`].
pub struct RapiSender<S, C = SystemClock> {
    stream: S,
    clock: C,
    config: RapiConfig,
    parser: StreamParser,
    queue: CommandQueue<CommandItem>,
    in_flight: Option<InFlight>,
    sequence: SequenceGenerator,
    on_event: Option<EventHandler>,
    connected: bool,
    last_response: Option<RapiResponse>,
    stats: RapiStats,
}

impl<S: RapiStream> RapiSender<S, SystemClock> {
    /// Create a sender on the system clock.
    pub fn new(stream: S, config: RapiConfig) -> Self {
        Self::with_clock(stream, SystemClock, config)
    }
}

impl<S: RapiStream, C: Clock> RapiSender<S, C> {
    /// Create a sender on a custom clock.
    pub fn with_clock(stream: S, clock: C, config: RapiConfig) -> Self {
        let mut sequence = SequenceGenerator::new();
        if config.sequence_ids {
            sequence.enable();
        }

        Self {
            stream,
            clock,
            parser: StreamParser::new(),
            queue: CommandQueue::new(config.queue_capacity),
            in_flight: None,
            sequence,
            on_event: None,
            connected: false,
            last_response: None,
            stats: RapiStats::default(),
            config,
        }
    }

    /// Queue a command with the configured timeout.
    ///
    /// See [`RapiSender::send_cmd_with_timeout`].
    pub fn send_cmd<F>(&mut self, command: impl Into<String>, callback: F)
    where
        F: FnOnce(RapiResult) + 'static,
    {
        let timeout = self.config.timeout();
        self.send_cmd_with_timeout(command, timeout, callback);
    }

    /// Queue a command.
    ///
    /// The command is written at once when nothing is in flight. `callback`
    /// fires exactly once: synchronously, from inside this call, with
    /// `QueueFull` or `CommandTooLong`; otherwise from a later
    /// [`RapiSender::poll`].
    ///
    /// # Arguments
    ///
    /// * `command` - Command body such as `"$SC 16 V"`; the `$` is optional
    /// * `timeout` - Reply deadline, counted from transmission
    /// * `callback` - Completion handler
    pub fn send_cmd_with_timeout<F>(
        &mut self,
        command: impl Into<String>,
        timeout: Duration,
        callback: F,
    ) where
        F: FnOnce(RapiResult) + 'static,
    {
        let frame = Frame::new(command);
        let completion: Completion = Box::new(callback);

        if let Err(err) = frame.check_len(self.sequence.is_enabled()) {
            self.stats.too_long += 1;
            warn!(command = %frame, "{}", err);
            completion(Err(err));
            return;
        }

        let item = CommandItem {
            frame,
            timeout,
            completion,
        };

        if self.in_flight.is_none() && self.queue.is_empty() {
            self.transmit(item);
            return;
        }

        if let Err(item) = self.queue.push(item) {
            self.stats.queue_full += 1;
            warn!(command = %item.frame, "command queue full");
            (item.completion)(Err(RapiError::QueueFull {
                capacity: self.queue.capacity(),
            }));
        }
    }

    /// Send a command and drive [`RapiSender::poll`] until it completes.
    pub fn send_cmd_sync(&mut self, command: impl Into<String>) -> RapiResult {
        let timeout = self.config.timeout();
        self.send_cmd_sync_with_timeout(command, timeout)
    }

    /// Send a command with an explicit timeout and wait for its result.
    ///
    /// Between poll steps the calling task sleeps on the sender's clock for
    /// the interval `poll` reports.
    pub fn send_cmd_sync_with_timeout(
        &mut self,
        command: impl Into<String>,
        timeout: Duration,
    ) -> RapiResult {
        let slot: Rc<RefCell<Option<RapiResult>>> = Rc::default();
        let sink = Rc::clone(&slot);
        self.send_cmd_with_timeout(command, timeout, move |result| {
            *sink.borrow_mut() = Some(result);
        });

        loop {
            if let Some(result) = slot.borrow_mut().take() {
                return result;
            }
            let wait = self.poll();
            if slot.borrow().is_none() {
                self.clock.sleep(wait);
            }
        }
    }

    /// Run one step: read what the link has, complete or route every frame,
    /// expire the in-flight command if its deadline passed, and transmit the
    /// next queued command when idle.
    ///
    /// # Returns
    ///
    /// How long the caller may wait before polling again.
    pub fn poll(&mut self) -> Duration {
        let available = self.stream.available();
        for _ in 0..available {
            match self.stream.read() {
                Some(byte) => self.parser.push_byte(byte),
                None => break,
            }
        }

        while let Some(event) = self.parser.next_event() {
            match event {
                ParserEvent::Frame(bytes) => self.handle_frame(&bytes),
                ParserEvent::Overflow => {
                    self.stats.overflow += 1;
                    warn!("receive buffer overflow");
                    self.complete(Err(RapiError::BufferOverflow));
                }
            }
        }

        self.check_deadline();
        self.dispatch_next();
        self.next_wake()
    }

    /// Turn sequence ids on (seeded from the wall clock) or off.
    pub fn enable_sequence_id(&mut self, enable: bool) {
        if enable {
            self.sequence.enable();
        } else {
            self.sequence.disable();
        }
    }

    /// Turn sequence ids on with a fixed seed.
    pub fn enable_sequence_id_with_seed(&mut self, seed: u8) {
        self.sequence.enable_with_seed(seed);
    }

    pub fn is_sequence_id_enabled(&self) -> bool {
        self.sequence.is_enabled()
    }

    /// Register the handler for unsolicited frames, replacing any previous
    /// one.
    pub fn set_on_event<F>(&mut self, handler: F)
    where
        F: FnMut(&RapiResponse) + 'static,
    {
        self.on_event = Some(Box::new(handler));
    }

    pub fn clear_on_event(&mut self) {
        self.on_event = None;
    }

    /// `true` after an `$OK` reply, `false` again after a timeout or a
    /// failed write.
    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// `true` when nothing is in flight or queued.
    pub fn is_idle(&self) -> bool {
        self.in_flight.is_none() && self.queue.is_empty()
    }

    /// Commands in flight or waiting.
    pub fn pending(&self) -> usize {
        self.queue.len() + usize::from(self.in_flight.is_some())
    }

    pub fn stats(&self) -> &RapiStats {
        &self.stats
    }

    /// The last `$OK` reply.
    pub fn last_response(&self) -> Option<&RapiResponse> {
        self.last_response.as_ref()
    }

    pub fn config(&self) -> &RapiConfig {
        &self.config
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn stream(&self) -> &S {
        &self.stream
    }

    pub fn stream_mut(&mut self) -> &mut S {
        &mut self.stream
    }

    fn transmit(&mut self, item: CommandItem) {
        let frame = match self.sequence.next_id() {
            Some(id) => item.frame.with_sequence_id(id),
            None => item.frame,
        };

        let bytes = match frame.encode() {
            Ok(bytes) => bytes,
            Err(err) => {
                self.stats.too_long += 1;
                warn!(command = %frame, "{}", err);
                (item.completion)(Err(err));
                return;
            }
        };

        trace!("-> {}", String::from_utf8_lossy(&bytes).trim_end());
        if let Err(err) = self.stream.write(&bytes).and_then(|()| self.stream.flush()) {
            self.stats.transport_errors += 1;
            warn!(command = %frame, "write failed: {}", err);
            self.set_connected(false);
            (item.completion)(Err(err.into()));
            return;
        }

        self.stats.sent += 1;
        self.in_flight = Some(InFlight {
            frame,
            deadline: self.clock.now() + item.timeout,
            timeout: item.timeout,
            completion: item.completion,
        });
    }

    fn dispatch_next(&mut self) {
        while self.in_flight.is_none() {
            match self.queue.pop() {
                Some(item) => self.transmit(item),
                None => break,
            }
        }
    }

    fn complete(&mut self, result: RapiResult) {
        match self.in_flight.take() {
            Some(in_flight) => {
                (in_flight.completion)(result);
                self.dispatch_next();
            }
            None => debug!("nothing in flight, dropping {:?}", result),
        }
    }

    fn handle_frame(&mut self, bytes: &[u8]) {
        trace!("<- {}", String::from_utf8_lossy(bytes));

        let response = match RapiResponse::decode(bytes) {
            Ok(response) => response,
            Err(err) => {
                self.stats.bad_checksum += 1;
                warn!("discarding frame: {}", err);
                return;
            }
        };

        let kind = response.kind();
        if kind == ResponseKind::Event {
            self.stats.async_events += 1;
            debug!(event = %response, "async event");
            if let Some(handler) = self.on_event.as_mut() {
                handler(&response);
            }
            return;
        }

        let Some(in_flight) = self.in_flight.as_ref() else {
            debug!(response = %response, "unsolicited reply ignored");
            return;
        };

        if let (Some(expected), Some(received)) =
            (in_flight.frame.sequence_id(), response.sequence_id())
            && expected != received
        {
            self.stats.bad_sequence += 1;
            warn!("discarding frame: {}", RapiError::BadSequenceId { expected, received });
            return;
        }

        match kind {
            ResponseKind::Ok => {
                self.stats.succeeded += 1;
                self.set_connected(true);
                self.last_response = Some(response.clone());
                self.complete(Ok(response));
            }
            ResponseKind::Rejected => {
                self.stats.rejected += 1;
                let command = in_flight.frame.body().to_string();
                debug!(command = %command, "command rejected");
                self.complete(Err(RapiError::rejected(command)));
            }
            ResponseKind::Unknown | ResponseKind::Event => {
                self.stats.invalid += 1;
                warn!(response = %response, "invalid response");
                self.complete(Err(RapiError::invalid_response(response.raw())));
            }
        }
    }

    fn check_deadline(&mut self) {
        let Some(in_flight) = self.in_flight.as_ref() else {
            return;
        };
        if self.clock.now() < in_flight.deadline {
            return;
        }

        let timeout_ms = in_flight.timeout.as_millis() as u64;
        warn!(command = %in_flight.frame, "no reply within {}ms", timeout_ms);
        self.stats.timed_out += 1;
        self.set_connected(false);
        self.complete(Err(RapiError::timeout(timeout_ms)));
    }

    fn next_wake(&self) -> Duration {
        match &self.in_flight {
            Some(in_flight) => in_flight
                .deadline
                .saturating_duration_since(self.clock.now())
                .min(IDLE_POLL_INTERVAL),
            None => IDLE_POLL_INTERVAL,
        }
    }

    fn set_connected(&mut self, connected: bool) {
        if self.connected != connected {
            if connected {
                info!("controller connected");
            } else {
                info!("controller connection lost");
            }
        }
        self.connected = connected;
    }
}

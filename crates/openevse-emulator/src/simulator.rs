//! A simulated controller on the far end of a [`RapiStream`].
//!
//! [`SimulatedEvse`] is handed to a sender or manager as its link; the
//! paired [`SimulatorHandle`] lets a test or the CLI play the vehicle, drop
//! the link or corrupt traffic. Commands are answered synchronously from
//! inside `write`, so the reply is waiting by the next poll.
//!
//! # Examples
//!
//! ```
//! use openevse_emulator::SimulatedEvse;
//! use openevse_rapi::{ManualClock, RapiConfig, RapiSender};
//!
//! let (evse, handle) = SimulatedEvse::new();
//! let mut sender = RapiSender::with_clock(evse, ManualClock::new(), RapiConfig::default());
//!
//! let version = sender.send_cmd_sync("$GV").unwrap();
//! assert_eq!(version.tokens(), ["$OK", "8.2.2", "5.2.1"]);
//!
//! sender.send_cmd_sync("$SC 16 V").unwrap();
//! assert_eq!(handle.pilot(), 16);
//! assert_eq!(handle.commands(), ["$GV", "$SC 16 V"]);
//! ```

use openevse_core::HardwareState;
use openevse_core::constants::{
    PROTOCOL_EXTENDED_STATUS, TEMPERATURE_NOT_INSTALLED, encode_version,
};
use openevse_rapi::{Frame, ParserEvent, RapiResponse, RapiStream, StreamParser};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::io;
use std::rc::Rc;
use tracing::{debug, trace};

use crate::state_machine::{Controller, Snapshot, StateTransition};

pub const DEFAULT_FIRMWARE: &str = "8.2.2";
pub const DEFAULT_PROTOCOL: &str = "5.2.1";
pub const DEFAULT_MILLIVOLTS: u32 = 240_000;
/// `$GP` in tenths of a degree: the RTC sensor fitted, the others absent.
pub const DEFAULT_TEMPERATURES: [i32; 3] =
    [250, TEMPERATURE_NOT_INSTALLED, TEMPERATURE_NOT_INSTALLED];

struct Simulator {
    controller: Controller,
    firmware: String,
    protocol: String,
    extended_status: bool,
    millivolts: Option<u32>,
    temperatures: [i32; 3],
    parser: StreamParser,
    outbound: VecDeque<u8>,
    silent: bool,
    corrupt_next: bool,
    reject_next: usize,
    reboot_after_reply: bool,
    commands: Vec<String>,
}

impl Simulator {
    fn new(controller: Controller) -> Self {
        Self {
            controller,
            firmware: DEFAULT_FIRMWARE.to_string(),
            protocol: DEFAULT_PROTOCOL.to_string(),
            extended_status: true,
            millivolts: Some(DEFAULT_MILLIVOLTS),
            temperatures: DEFAULT_TEMPERATURES,
            parser: StreamParser::new(),
            outbound: VecDeque::new(),
            silent: false,
            corrupt_next: false,
            reject_next: 0,
            reboot_after_reply: false,
            commands: Vec::new(),
        }
    }

    fn receive(&mut self, bytes: &[u8]) {
        if self.silent {
            trace!(len = bytes.len(), "Simulator is silent, dropping bytes");
            return;
        }
        self.parser.feed(bytes);
        while let Some(event) = self.parser.next_event() {
            match event {
                ParserEvent::Frame(frame) => self.handle_frame(&frame),
                ParserEvent::Overflow => self.reply("$NK", None),
            }
        }
    }

    fn handle_frame(&mut self, frame: &[u8]) {
        let request = match RapiResponse::decode(frame) {
            Ok(request) => request,
            Err(err) => {
                debug!("Simulator refusing frame: {}", err);
                self.reply("$NK", None);
                return;
            }
        };
        let sequence_id = request.sequence_id();
        self.commands.push(request.tokens().join(" "));

        if self.reject_next > 0 {
            self.reject_next -= 1;
            self.reply("$NK", sequence_id);
            return;
        }

        let (body, transition) = self.execute(&request);
        self.reply(&body, sequence_id);
        if transition.is_some() {
            self.announce();
        }
        if std::mem::take(&mut self.reboot_after_reply) {
            self.boot();
        }
    }

    fn execute(&mut self, request: &RapiResponse) -> (String, Option<StateTransition>) {
        let controller = &mut self.controller;
        match request.token(0).unwrap_or_default() {
            "$GV" => (format!("$OK {} {}", self.firmware, self.protocol), None),
            "$GC" => (
                format!(
                    "$OK {} {} {} {}",
                    controller.min_current(),
                    controller.max_current(),
                    controller.pilot(),
                    controller.max_current()
                ),
                None,
            ),
            "$GS" => {
                let snapshot = controller.snapshot();
                let elapsed = controller.session_elapsed();
                let body = if self.extended_status {
                    format!(
                        "$OK {:02x} {} {:02x} {:04x}",
                        snapshot.state.as_u8(),
                        elapsed,
                        snapshot.pilot_state.as_u8(),
                        snapshot.vflags
                    )
                } else {
                    format!("$OK {} {}", snapshot.state.as_u8(), elapsed)
                };
                (body, None)
            }
            "$GG" => {
                let milliamps = if controller.state() == HardwareState::CHARGING {
                    controller.pilot() * 1000
                } else {
                    0
                };
                let millivolts = self.millivolts.map_or(-1, i64::from);
                (format!("$OK {} {}", milliamps, millivolts), None)
            }
            "$GP" => {
                let [ds3231, mcp9808, tmp007] = self.temperatures;
                (format!("$OK {} {} {}", ds3231, mcp9808, tmp007), None)
            }
            "$GE" => (
                format!("$OK {} {:04x}", controller.pilot(), controller.vflags()),
                None,
            ),
            "$SC" => match request.token_u32(1).map(|amps| (amps, controller.set_pilot(amps))) {
                Some((amps, Ok(()))) => (format!("$OK {}", amps), None),
                _ => ("$NK".to_string(), None),
            },
            "$FE" => ("$OK".to_string(), controller.enable()),
            "$FS" => ("$OK".to_string(), controller.sleep()),
            "$FD" => ("$OK".to_string(), controller.disable()),
            "$FR" => {
                controller.reset();
                self.reboot_after_reply = true;
                ("$OK".to_string(), None)
            }
            _ => ("$NK".to_string(), None),
        }
    }

    fn reply(&mut self, body: &str, sequence_id: Option<u8>) {
        let mut frame = Frame::new(body);
        if let Some(id) = sequence_id {
            frame = frame.with_sequence_id(id);
        }
        self.emit(frame);
    }

    /// Report the current state unsolicited: `$AT` on extended firmware,
    /// `$ST` otherwise.
    fn announce(&mut self) {
        let Snapshot {
            state,
            pilot_state,
            vflags,
            pilot,
        } = self.controller.snapshot();
        let body = if self.extended_status {
            format!(
                "$AT {:02x} {:02x} {} {:04x}",
                state.as_u8(),
                pilot_state.as_u8(),
                pilot,
                vflags
            )
        } else {
            format!("$ST {:02x}", state.as_u8())
        };
        self.emit(Frame::new(body));
    }

    fn boot(&mut self) {
        let body = format!("$AB 00 {}", self.firmware);
        self.emit(Frame::new(body));
    }

    fn emit(&mut self, frame: Frame) {
        if self.silent {
            return;
        }
        let mut bytes = match frame.encode() {
            Ok(bytes) => bytes.to_vec(),
            Err(err) => {
                debug!("Simulator cannot encode {}: {}", frame, err);
                return;
            }
        };
        if self.corrupt_next && bytes.len() >= 3 {
            self.corrupt_next = false;
            let digit = bytes.len() - 2;
            bytes[digit] = if bytes[digit] == b'0' { b'1' } else { b'0' };
        }
        trace!(frame = %frame, "Simulator sending");
        self.outbound.extend(bytes);
    }
}

fn is_extended(protocol: &str) -> bool {
    let parts: Vec<u32> = protocol
        .split('.')
        .filter_map(|part| part.parse().ok())
        .collect();
    match parts[..] {
        [major, minor, patch] => encode_version(major, minor, patch) >= PROTOCOL_EXTENDED_STATUS,
        _ => true,
    }
}

/// The controller end of a link.
pub struct SimulatedEvse {
    inner: Rc<RefCell<Simulator>>,
}

/// Control over a [`SimulatedEvse`] while something else owns it.
#[derive(Clone)]
pub struct SimulatorHandle {
    inner: Rc<RefCell<Simulator>>,
}

impl SimulatedEvse {
    /// A controller at rest: enabled, no vehicle, 6..=32 A, pilot 32 A.
    pub fn new() -> (Self, SimulatorHandle) {
        Self::with_controller(Controller::default())
    }

    pub fn with_controller(controller: Controller) -> (Self, SimulatorHandle) {
        let inner = Rc::new(RefCell::new(Simulator::new(controller)));
        let handle = SimulatorHandle {
            inner: Rc::clone(&inner),
        };
        (Self { inner }, handle)
    }
}

impl RapiStream for SimulatedEvse {
    fn available(&mut self) -> usize {
        self.inner.borrow().outbound.len()
    }

    fn read(&mut self) -> Option<u8> {
        self.inner.borrow_mut().outbound.pop_front()
    }

    fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.inner.borrow_mut().receive(bytes);
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl SimulatorHandle {
    // ------------------------------------------------------------------------
    // Vehicle
    // ------------------------------------------------------------------------

    pub fn plug_in(&self) {
        self.with_transition(Controller::plug_in);
    }

    pub fn unplug(&self) {
        self.with_transition(Controller::unplug);
    }

    /// The vehicle starts drawing current. Ignored while unplugged.
    pub fn start_charging(&self) {
        self.with_transition(|controller| controller.start_charging().ok().flatten());
    }

    pub fn stop_charging(&self) {
        self.with_transition(Controller::stop_charging);
    }

    /// Trip a fault state. Non-fault states are ignored.
    pub fn trip(&self, fault: HardwareState) {
        self.with_transition(|controller| controller.trip(fault).ok().flatten());
    }

    pub fn clear_fault(&self) {
        self.with_transition(Controller::clear_fault);
    }

    /// Power cycle the controller and announce the restart with `$AB`.
    pub fn reboot(&self) {
        let mut sim = self.inner.borrow_mut();
        sim.controller.reset();
        sim.parser.clear();
        sim.boot();
    }

    fn with_transition(&self, change: impl FnOnce(&mut Controller) -> Option<StateTransition>) {
        let mut sim = self.inner.borrow_mut();
        if change(&mut sim.controller).is_some() {
            sim.announce();
        }
    }

    // ------------------------------------------------------------------------
    // Link
    // ------------------------------------------------------------------------

    /// Stop answering and drop everything written, like a powered-off
    /// controller.
    pub fn set_silent(&self, silent: bool) {
        let mut sim = self.inner.borrow_mut();
        sim.silent = silent;
        if silent {
            sim.parser.clear();
        }
    }

    /// Flip the checksum of the next frame sent.
    pub fn corrupt_next_frame(&self) {
        self.inner.borrow_mut().corrupt_next = true;
    }

    /// Answer the next `count` commands with `$NK`.
    pub fn reject_next(&self, count: usize) {
        self.inner.borrow_mut().reject_next = count;
    }

    /// Queue raw bytes for the host, bypassing the controller model.
    pub fn inject(&self, bytes: &[u8]) {
        self.inner.borrow_mut().outbound.extend(bytes.iter().copied());
    }

    /// Send an unsolicited frame such as `"$WF 2"`.
    pub fn send_async(&self, body: &str) {
        self.inner.borrow_mut().emit(Frame::new(body));
    }

    /// Firmware and protocol version reported by `$GV`. Protocols before
    /// 5.0.0 get the short `$GS` format and `$ST` announcements.
    pub fn set_version(&self, firmware: &str, protocol: &str) {
        let mut sim = self.inner.borrow_mut();
        sim.firmware = firmware.to_string();
        sim.protocol = protocol.to_string();
        sim.extended_status = is_extended(protocol);
    }

    /// Line voltage reported by `$GG`; `None` reports it as not measured.
    pub fn set_millivolts(&self, millivolts: Option<u32>) {
        self.inner.borrow_mut().millivolts = millivolts;
    }

    /// Sensor readings reported by `$GP`, in tenths of a degree. Use
    /// `TEMPERATURE_NOT_INSTALLED` for an absent sensor.
    pub fn set_temperatures(&self, temperatures: [i32; 3]) {
        self.inner.borrow_mut().temperatures = temperatures;
    }

    // ------------------------------------------------------------------------
    // Readings
    // ------------------------------------------------------------------------

    /// Commands received, without sequence ids or checksums, oldest first.
    pub fn commands(&self) -> Vec<String> {
        self.inner.borrow().commands.clone()
    }

    pub fn take_commands(&self) -> Vec<String> {
        std::mem::take(&mut self.inner.borrow_mut().commands)
    }

    pub fn snapshot(&self) -> Snapshot {
        self.inner.borrow().controller.snapshot()
    }

    pub fn state(&self) -> HardwareState {
        self.inner.borrow().controller.state()
    }

    pub fn pilot(&self) -> u32 {
        self.inner.borrow().controller.pilot()
    }

    pub fn controller(&self) -> Controller {
        self.inner.borrow().controller.clone()
    }

    /// Advance the session clock of the simulated controller.
    pub fn tick(&self, seconds: u32) {
        self.inner.borrow_mut().controller.tick(seconds);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use openevse_rapi::{ManualClock, RapiConfig, RapiError, RapiSender};
    use std::cell::RefCell;
    use std::rc::Rc;

    type Sender = RapiSender<SimulatedEvse, ManualClock>;

    fn sender() -> (Sender, SimulatorHandle) {
        let (evse, handle) = SimulatedEvse::new();
        (
            RapiSender::with_clock(evse, ManualClock::new(), RapiConfig::default()),
            handle,
        )
    }

    fn record_events(sender: &mut Sender) -> Rc<RefCell<Vec<String>>> {
        let events: Rc<RefCell<Vec<String>>> = Rc::default();
        let sink = Rc::clone(&events);
        sender.set_on_event(move |event| sink.borrow_mut().push(event.raw().to_string()));
        events
    }

    #[test]
    fn test_queries() {
        let (mut sender, _handle) = sender();
        assert_eq!(
            sender.send_cmd_sync("$GC").unwrap().tokens(),
            ["$OK", "6", "32", "32", "32"]
        );
        assert_eq!(
            sender.send_cmd_sync("$GS").unwrap().tokens(),
            ["$OK", "01", "0", "01", "0200"]
        );
        assert_eq!(
            sender.send_cmd_sync("$GE").unwrap().tokens(),
            ["$OK", "32", "0200"]
        );
    }

    #[test]
    fn test_charge_and_temperature_readings() {
        let (mut sender, handle) = sender();
        assert_eq!(
            sender.send_cmd_sync("$GG").unwrap().tokens(),
            ["$OK", "0", "240000"]
        );

        handle.plug_in();
        handle.start_charging();
        sender.send_cmd_sync("$SC 16 V").unwrap();
        handle.set_millivolts(None);
        assert_eq!(
            sender.send_cmd_sync("$GG").unwrap().tokens(),
            ["$OK", "16000", "-1"]
        );

        assert_eq!(
            sender.send_cmd_sync("$GP").unwrap().tokens(),
            ["$OK", "250", "-2560", "-2560"]
        );
        handle.set_temperatures([312, 298, TEMPERATURE_NOT_INSTALLED]);
        assert_eq!(
            sender.send_cmd_sync("$GP").unwrap().tokens(),
            ["$OK", "312", "298", "-2560"]
        );
    }

    #[test]
    fn test_state_commands_announce_transitions() {
        let (mut sender, handle) = sender();
        let events = record_events(&mut sender);

        sender.send_cmd_sync("$FS").unwrap();
        sender.poll();
        assert_eq!(handle.state(), HardwareState::SLEEPING);
        assert_eq!(events.borrow().as_slice(), ["$AT fe 01 32 0200"]);

        // Already sleeping: no announcement.
        sender.send_cmd_sync("$FS").unwrap();
        sender.poll();
        assert_eq!(events.borrow().len(), 1);

        sender.send_cmd_sync("$FD").unwrap();
        sender.send_cmd_sync("$FE").unwrap();
        assert_eq!(handle.state(), HardwareState::NOT_CONNECTED);
    }

    #[test]
    fn test_pilot_out_of_range_is_rejected() {
        let (mut sender, handle) = sender();
        assert_eq!(
            sender.send_cmd_sync("$SC 40 V"),
            Err(RapiError::rejected("$SC 40 V"))
        );
        assert_eq!(handle.pilot(), 32);
    }

    #[test]
    fn test_unknown_command_is_rejected() {
        let (mut sender, _handle) = sender();
        assert!(matches!(
            sender.send_cmd_sync("$ZZ"),
            Err(RapiError::Rejected { .. })
        ));
    }

    #[test]
    fn test_bad_checksum_from_host_is_rejected() {
        let (mut evse, handle) = SimulatedEvse::new();
        evse.write(b"$GV^00\r").unwrap();

        let mut reply = Vec::new();
        while let Some(byte) = evse.read() {
            reply.push(byte);
        }
        assert_eq!(reply, Frame::new("$NK").encode().unwrap().to_vec());
        assert!(handle.commands().is_empty());
    }

    #[test]
    fn test_sequence_id_is_echoed() {
        let (mut sender, _handle) = sender();
        sender.enable_sequence_id_with_seed(0x41);
        let response = sender.send_cmd_sync("$GV").unwrap();
        assert_eq!(response.sequence_id(), Some(0x42));
    }

    #[test]
    fn test_vehicle_events() {
        let (mut sender, handle) = sender();
        let events = record_events(&mut sender);

        handle.plug_in();
        handle.start_charging();
        handle.unplug();
        sender.poll();

        assert_eq!(
            events.borrow().as_slice(),
            [
                "$AT 02 02 32 0300",
                "$AT 03 03 32 0140",
                "$AT 01 01 32 0200"
            ]
        );
    }

    #[test]
    fn test_legacy_protocol() {
        let (mut sender, handle) = sender();
        handle.set_version("3.11.3", "4.0.1");
        let events = record_events(&mut sender);

        assert_eq!(
            sender.send_cmd_sync("$GS").unwrap().tokens(),
            ["$OK", "1", "0"]
        );
        handle.plug_in();
        sender.poll();
        assert_eq!(events.borrow().as_slice(), ["$ST 02"]);
    }

    #[test]
    fn test_silent_controller_times_out() {
        let (mut sender, handle) = sender();
        handle.set_silent(true);
        assert_eq!(sender.send_cmd_sync("$GV"), Err(RapiError::timeout(500)));
        assert!(handle.commands().is_empty());

        handle.set_silent(false);
        assert!(sender.send_cmd_sync("$GV").is_ok());
    }

    #[test]
    fn test_corrupt_frame_is_dropped_by_host() {
        let (mut sender, handle) = sender();
        handle.corrupt_next_frame();
        assert_eq!(sender.send_cmd_sync("$GV"), Err(RapiError::timeout(500)));
        assert_eq!(sender.stats().bad_checksum, 1);
    }

    #[test]
    fn test_reject_next() {
        let (mut sender, handle) = sender();
        handle.reject_next(1);
        assert!(sender.send_cmd_sync("$FE").is_err());
        assert!(sender.send_cmd_sync("$FE").is_ok());
        assert_eq!(handle.take_commands(), ["$FE", "$FE"]);
        assert!(handle.commands().is_empty());
    }

    #[test]
    fn test_reset_command_reboots() {
        let (mut sender, handle) = sender();
        let events = record_events(&mut sender);
        sender.send_cmd_sync("$SC 10 V").unwrap();

        sender.send_cmd_sync("$FR").unwrap();
        sender.poll();
        assert_eq!(handle.pilot(), 32);
        assert_eq!(events.borrow().as_slice(), ["$AB 00 8.2.2"]);
    }

    #[test]
    fn test_injected_bytes_reach_host() {
        let (mut sender, handle) = sender();
        let events = record_events(&mut sender);
        handle.send_async("$WF 2");
        handle.inject(b"garbage$ST 03\r");
        sender.poll();
        assert_eq!(events.borrow().as_slice(), ["$WF 2", "$ST 03"]);
    }

    #[test]
    fn test_is_extended() {
        assert!(is_extended("5.0.0"));
        assert!(is_extended("5.2.1"));
        assert!(!is_extended("4.9.9"));
        assert!(is_extended("garbage"));
    }
}

//! The EVSE manager.
//!
//! [`EvseManager`] owns the RAPI link and the claim table. Clients claim the
//! charger with a priority; the manager resolves the claims into one target
//! and pushes only what differs from the state the hardware last confirmed.
//!
//! # Lifecycle
//!
//! ```text
//!            connect_retry_ms
//!   ┌──────────────────────────────┐
//!   v                              │ failure
//! Disconnected ──> $GV ──> $GC ──> $GS ──> Connected ──┐
//!   ^                                        │  $GS    │ status_poll_ms
//!   │             link lost / $AB            │  $GG    │ charge_poll_ms, charging only
//!   │                                        │  $GP    │ temperature_poll_ms
//!   └────────────────────────────────────────┘ <───────┘
//! ```
//!
//! The periodic queries go out one at a time; a due `$GS` goes first.
//!
//! While connected, each wake compares the resolved target with the
//! confirmed hardware state and issues `$SC <amps> V` and `$FE`/`$FS`/`$FD`
//! for the differences. A failed push is re-asserted after `retry_ms`.
//!
//! # Concurrency
//!
//! Everything runs on the caller's task through [`EvseManager::poll`].
//! Command completions and unsolicited frames are posted to an internal
//! channel and handled at the next wake, so a claim never lands in the
//! middle of an update.
//!
//! # Examples
//!
//! ```
//! use openevse_core::{EvseClient, EvseProperties, EvseState, priority};
//! use openevse_manager::{EvseManager, ManagerConfig};
//! use openevse_rapi::{ManualClock, MemoryStream};
//!
//! let mut manager = EvseManager::with_clock(MemoryStream::new(), ManualClock::new(), ManagerConfig::default());
//!
//! assert!(manager.claim(
//!     EvseClient::OPENEVSE_MANUAL,
//!     priority::MANUAL,
//!     EvseProperties::new(EvseState::Disabled),
//! ));
//! assert_eq!(manager.get_state(EvseClient::NULL), EvseState::Disabled);
//! assert!(!manager.is_connected());
//! ```

use openevse_core::{EvseClient, EvseProperties, EvseState};
use openevse_rapi::{Clock, RapiResponse, RapiResult, RapiSender, RapiStream, SystemClock};
use std::cell::RefCell;
use std::rc::Rc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

use crate::claims::{Claim, ClaimOutcome, ClaimTable, Resolution};
use crate::config::ManagerConfig;
use crate::events::{BootReady, DataReady, StateChange, Subscribers, VehicleData};
use crate::monitor::{
    AsyncEvent, ChargeReading, CurrentCapacity, EvseStatus, FirmwareInfo, StatusReport,
    Temperatures,
};

/// Handshake queries, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HandshakeStep {
    Version,
    Capacity,
    Status,
}

impl HandshakeStep {
    fn command(self) -> &'static str {
        match self {
            HandshakeStep::Version => "$GV",
            HandshakeStep::Capacity => "$GC",
            HandshakeStep::Status => "$GS",
        }
    }
}

/// Periodic queries while connected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Query {
    Status,
    Charge,
    Temperatures,
}

impl Query {
    fn command(self) -> &'static str {
        match self {
            Query::Status => "$GS",
            Query::Charge => "$GG",
            Query::Temperatures => "$GP",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Link {
    Disconnected { next_attempt: Instant },
    Handshake(HandshakeStep),
    Connected,
}

/// Posted by completions and the event handler.
enum Message {
    Handshake(HandshakeStep, RapiResult),
    Query(Query, RapiResult),
    StateApplied { state: EvseState, result: RapiResult },
    PilotApplied { amps: u32, result: RapiResult },
    Event(RapiResponse),
}

/// Values the hardware has confirmed. `None` is unknown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Applied {
    state: Option<EvseState>,
    pilot: Option<u32>,
}

/// Claim arbitration and hardware synchronisation for one charger.
pub struct EvseManager<S, C = SystemClock> {
    sender: RapiSender<S, C>,
    config: ManagerConfig,
    claims: ClaimTable,
    resolution: Resolution,
    link: Link,
    firmware: Option<FirmwareInfo>,
    capacity: Option<CurrentCapacity>,
    status: Option<EvseStatus>,
    session_elapsed: u32,
    charge: Option<ChargeReading>,
    temperatures: Option<Temperatures>,
    vehicle: VehicleData,
    vehicle_updated_at: Option<Instant>,
    applied: Applied,
    pending_state: Option<EvseState>,
    pending_pilot: Option<u32>,
    retry_at: Option<Instant>,
    query_pending: bool,
    next_status_poll: Instant,
    next_charge_poll: Instant,
    next_temperature_poll: Instant,
    messages_tx: mpsc::UnboundedSender<Message>,
    messages_rx: mpsc::UnboundedReceiver<Message>,
    state_change: Subscribers<StateChange>,
    boot_ready: Subscribers<BootReady>,
    data_ready: Subscribers<DataReady>,
}

impl<S: RapiStream> EvseManager<S, SystemClock> {
    pub fn new(stream: S, config: ManagerConfig) -> Self {
        Self::with_clock(stream, SystemClock, config)
    }
}

impl<S: RapiStream, C: Clock> EvseManager<S, C> {
    /// Create a manager on a custom clock. Nothing is sent until the first
    /// [`EvseManager::poll`].
    pub fn with_clock(stream: S, clock: C, config: ManagerConfig) -> Self {
        let now = clock.now();
        let mut sender = RapiSender::with_clock(stream, clock, config.rapi.clone());
        let (messages_tx, messages_rx) = mpsc::unbounded_channel();

        let events = messages_tx.clone();
        sender.set_on_event(move |event| {
            let _ = events.send(Message::Event(event.clone()));
        });

        Self {
            sender,
            claims: ClaimTable::new(),
            resolution: Resolution::default(),
            link: Link::Disconnected { next_attempt: now },
            firmware: None,
            capacity: None,
            status: None,
            session_elapsed: 0,
            charge: None,
            temperatures: None,
            vehicle: VehicleData::default(),
            vehicle_updated_at: None,
            applied: Applied::default(),
            pending_state: None,
            pending_pilot: None,
            retry_at: None,
            query_pending: false,
            next_status_poll: now,
            next_charge_poll: now,
            next_temperature_poll: now,
            messages_tx,
            messages_rx,
            state_change: Subscribers::default(),
            boot_ready: Subscribers::default(),
            data_ready: Subscribers::default(),
            config,
        }
    }

    // ------------------------------------------------------------------------
    // Claims
    // ------------------------------------------------------------------------

    /// Add or replace `client`'s claim.
    ///
    /// Returns `false`, leaving everything untouched, when the claim table
    /// is full. The new target is resolved at once and pushed to the
    /// hardware on the next wake.
    pub fn claim(&mut self, client: EvseClient, priority: i32, properties: EvseProperties) -> bool {
        match self.claims.claim(client, priority, properties) {
            ClaimOutcome::Rejected => {
                warn!(%client, priority, "Claim rejected, no free slot");
                false
            }
            ClaimOutcome::Unchanged => true,
            outcome => {
                debug!(%client, priority, ?properties, ?outcome, "Claim");
                self.reevaluate();
                true
            }
        }
    }

    /// Drop `client`'s claim. Returns `false` if it held none.
    pub fn release(&mut self, client: EvseClient) -> bool {
        if !self.claims.release(client) {
            return false;
        }
        debug!(%client, "Claim released");
        self.reevaluate();
        true
    }

    pub fn client_has_claim(&self, client: EvseClient) -> bool {
        self.claims.contains(client)
    }

    pub fn get_claim(&self, client: EvseClient) -> Option<&Claim> {
        self.claims.get(client)
    }

    pub fn claims(&self) -> impl Iterator<Item = &Claim> {
        self.claims.iter()
    }

    /// Bumped every time the claim table changes.
    pub fn claims_version(&self) -> u64 {
        self.claims.version()
    }

    /// The resolved target and which clients it came from.
    pub fn resolution(&self) -> &Resolution {
        &self.resolution
    }

    /// Requested state of `client`, or the resolved state for
    /// [`EvseClient::NULL`].
    pub fn get_state(&self, client: EvseClient) -> EvseState {
        if client.is_null() {
            return self.resolution.properties.state;
        }
        self.claims
            .get(client)
            .map_or(EvseState::None, |claim| claim.properties.state)
    }

    /// Requested charge current of `client`, or for [`EvseClient::NULL`] the
    /// pilot the manager drives the hardware to.
    pub fn get_charge_current(&self, client: EvseClient) -> Option<u32> {
        if client.is_null() {
            return self.effective_pilot();
        }
        self.claim_property(client, |props| props.charge_current)
    }

    pub fn get_max_current(&self, client: EvseClient) -> Option<u32> {
        if client.is_null() {
            return self.resolution.properties.max_current;
        }
        self.claim_property(client, |props| props.max_current)
    }

    pub fn get_energy_limit(&self, client: EvseClient) -> Option<u32> {
        if client.is_null() {
            return self.resolution.properties.energy_limit;
        }
        self.claim_property(client, |props| props.energy_limit)
    }

    pub fn get_time_limit(&self, client: EvseClient) -> Option<u32> {
        if client.is_null() {
            return self.resolution.properties.time_limit;
        }
        self.claim_property(client, |props| props.time_limit)
    }

    fn claim_property(
        &self,
        client: EvseClient,
        field: impl Fn(&EvseProperties) -> Option<u32>,
    ) -> Option<u32> {
        self.claims.get(client).and_then(|claim| field(&claim.properties))
    }

    /// The pilot for the resolved target: the tightest of the hardware
    /// ceiling, the resolved max current and the resolved charge current,
    /// but never below the hardware minimum. `None` until the hardware
    /// reported its capacity.
    pub fn effective_pilot(&self) -> Option<u32> {
        let capacity = self.capacity?;
        let props = &self.resolution.properties;
        let mut pilot = props.max_current.unwrap_or_else(|| capacity.ceiling());
        if let Some(charge) = props.charge_current {
            pilot = pilot.min(charge);
        }
        Some(pilot.max(capacity.min_current))
    }

    // ------------------------------------------------------------------------
    // Settings
    // ------------------------------------------------------------------------

    /// Choose between `$FS` (sleep) and `$FD` for disabling. When the
    /// charger is already disabled the new command is issued at the next
    /// wake.
    pub fn set_sleep_for_disable(&mut self, sleep: bool) {
        if self.config.sleep_for_disable == sleep {
            return;
        }
        self.config.sleep_for_disable = sleep;
        if self.resolution.properties.state == EvseState::Disabled
            && self.applied.state == Some(EvseState::Disabled)
        {
            self.applied.state = None;
        }
    }

    pub fn sleep_for_disable(&self) -> bool {
        self.config.sleep_for_disable
    }

    /// Set the user ceiling on the pilot. `None` leaves only the hardware
    /// limit.
    pub fn set_max_configured_current(&mut self, amps: Option<u32>) {
        self.config.max_configured_current = amps;
        self.reevaluate();
    }

    /// The ceiling no resolved `max_current` may exceed: the user setting
    /// capped by what the hardware reported.
    pub fn max_configured_current(&self) -> Option<u32> {
        let hardware = self.capacity.map(|capacity| capacity.ceiling());
        match (self.config.max_configured_current, hardware) {
            (Some(user), Some(hardware)) => Some(user.min(hardware)),
            (user, hardware) => user.or(hardware),
        }
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    // ------------------------------------------------------------------------
    // Hardware view
    // ------------------------------------------------------------------------

    /// Whether the handshake completed and the link has not been lost since.
    pub fn is_connected(&self) -> bool {
        self.link == Link::Connected
    }

    pub fn status(&self) -> Option<EvseStatus> {
        self.status
    }

    pub fn firmware(&self) -> Option<&FirmwareInfo> {
        self.firmware.as_ref()
    }

    pub fn capacity(&self) -> Option<CurrentCapacity> {
        self.capacity
    }

    /// Seconds into the charging session, as of the last `$GS`.
    pub fn session_elapsed(&self) -> u32 {
        self.session_elapsed
    }

    pub fn is_vehicle_connected(&self) -> bool {
        self.status.is_some_and(|status| status.is_vehicle_connected())
    }

    pub fn is_charging(&self) -> bool {
        self.status.is_some_and(|status| status.is_charging())
    }

    /// Last `$GG` reading. The voltage is kept from an earlier reading when
    /// the latest one had none.
    pub fn charge_reading(&self) -> Option<ChargeReading> {
        self.charge
    }

    /// Last `$GP` reading.
    pub fn temperatures(&self) -> Option<Temperatures> {
        self.temperatures
    }

    // ------------------------------------------------------------------------
    // Vehicle
    // ------------------------------------------------------------------------

    pub fn set_vehicle_state_of_charge(&mut self, percent: u32) {
        self.vehicle.state_of_charge = Some(percent);
        self.vehicle_updated();
    }

    pub fn set_vehicle_range(&mut self, range: u32) {
        self.vehicle.range = Some(range);
        self.vehicle_updated();
    }

    /// Seconds until the vehicle expects to be full.
    pub fn set_vehicle_eta(&mut self, seconds: u32) {
        self.vehicle.eta = Some(seconds);
        self.vehicle_updated();
    }

    pub fn vehicle(&self) -> VehicleData {
        self.vehicle
    }

    /// When any vehicle value was last set.
    pub fn vehicle_last_updated(&self) -> Option<Instant> {
        self.vehicle_updated_at
    }

    fn vehicle_updated(&mut self) {
        self.vehicle_updated_at = Some(self.now());
        self.data_ready.publish(&DataReady::Vehicle(self.vehicle));
    }

    /// Receive every change of the controller's state, pilot state or
    /// vflags.
    pub fn on_state_change(&mut self) -> mpsc::UnboundedReceiver<StateChange> {
        self.state_change.subscribe()
    }

    /// Receive a notice each time a handshake completes.
    pub fn on_boot_ready(&mut self) -> mpsc::UnboundedReceiver<BootReady> {
        self.boot_ready.subscribe()
    }

    /// Receive every status, charge, temperature and vehicle reading.
    pub fn on_data_ready(&mut self) -> mpsc::UnboundedReceiver<DataReady> {
        self.data_ready.subscribe()
    }

    pub fn sender(&self) -> &RapiSender<S, C> {
        &self.sender
    }

    // ------------------------------------------------------------------------
    // Run loop
    // ------------------------------------------------------------------------

    /// Run one wake: drive the link, handle completions and events, advance
    /// the handshake or status poll and push the target.
    ///
    /// # Returns
    ///
    /// How long the caller may wait before calling again.
    pub fn poll(&mut self) -> Duration {
        let wait = self.sender.poll();
        self.drain_messages();
        self.check_link();
        self.step_lifecycle();
        self.apply_target();

        let now = self.now();
        match self.next_timer() {
            Some(at) => wait.min(at.saturating_duration_since(now)),
            None => wait,
        }
    }

    /// Send a raw command and drive the manager until it completes.
    pub fn send_cmd_sync(&mut self, command: impl Into<String>) -> RapiResult {
        let slot: Rc<RefCell<Option<RapiResult>>> = Rc::default();
        let sink = Rc::clone(&slot);
        self.sender.send_cmd(command, move |result| {
            *sink.borrow_mut() = Some(result);
        });

        loop {
            if let Some(result) = slot.borrow_mut().take() {
                return result;
            }
            let wait = self.poll();
            if slot.borrow().is_none() {
                self.sender.clock().sleep(wait);
            }
        }
    }

    fn now(&self) -> Instant {
        self.sender.clock().now()
    }

    fn next_timer(&self) -> Option<Instant> {
        match self.link {
            Link::Disconnected { next_attempt } => Some(next_attempt),
            Link::Handshake(_) => None,
            Link::Connected => {
                let charge = self.is_charging().then_some(self.next_charge_poll);
                let polls = [
                    Some(self.next_status_poll),
                    charge,
                    Some(self.next_temperature_poll),
                ];
                let poll = if self.query_pending {
                    None
                } else {
                    polls.into_iter().flatten().min()
                };
                match (poll, self.retry_at) {
                    (Some(a), Some(b)) => Some(a.min(b)),
                    (a, b) => a.or(b),
                }
            }
        }
    }

    fn drain_messages(&mut self) {
        while let Ok(message) = self.messages_rx.try_recv() {
            self.handle_message(message);
        }
    }

    fn handle_message(&mut self, message: Message) {
        match message {
            Message::Handshake(step, result) => self.on_handshake_reply(step, result),
            Message::Query(query, result) => {
                self.query_pending = false;
                match result {
                    Ok(response) => self.on_query_reply(query, &response),
                    Err(err) => debug!(command = query.command(), "Poll failed: {}", err),
                }
            }
            Message::StateApplied { state, result } => {
                self.pending_state = None;
                match result {
                    Ok(_) => {
                        debug!(%state, "State applied");
                        self.applied.state = Some(state);
                    }
                    Err(err) => self.push_failed("state", err.to_string()),
                }
            }
            Message::PilotApplied { amps, result } => {
                self.pending_pilot = None;
                match result {
                    Ok(_) => {
                        debug!(amps, "Pilot applied");
                        self.applied.pilot = Some(amps);
                    }
                    Err(err) => self.push_failed("pilot", err.to_string()),
                }
            }
            Message::Event(response) => self.on_async_event(&response),
        }
    }

    // ------------------------------------------------------------------------
    // Link lifecycle
    // ------------------------------------------------------------------------

    fn step_lifecycle(&mut self) {
        let now = self.now();
        match self.link {
            Link::Disconnected { next_attempt } if now >= next_attempt => {
                debug!("Starting EVSE handshake");
                self.begin_step(HandshakeStep::Version);
            }
            Link::Connected if !self.query_pending => {
                if let Some(query) = self.due_query(now) {
                    self.request(query, now);
                }
            }
            _ => {}
        }
    }

    fn begin_step(&mut self, step: HandshakeStep) {
        self.link = Link::Handshake(step);
        let tx = self.messages_tx.clone();
        self.sender.send_cmd(step.command(), move |result| {
            let _ = tx.send(Message::Handshake(step, result));
        });
    }

    fn on_handshake_reply(&mut self, step: HandshakeStep, result: RapiResult) {
        if self.link != Link::Handshake(step) {
            trace!(?step, "Ignoring stale handshake reply");
            return;
        }

        let response = match result {
            Ok(response) => response,
            Err(err) => return self.handshake_failed(step, err.to_string()),
        };

        match step {
            HandshakeStep::Version => match FirmwareInfo::parse(&response) {
                Ok(info) => {
                    debug!(firmware = %info.firmware, protocol = %info.protocol, "EVSE version");
                    self.firmware = Some(info);
                    self.begin_step(HandshakeStep::Capacity);
                }
                Err(err) => self.handshake_failed(step, err.to_string()),
            },
            HandshakeStep::Capacity => match CurrentCapacity::parse(&response) {
                Ok(capacity) => {
                    debug!(?capacity, "EVSE capacity");
                    self.capacity = Some(capacity);
                    if capacity.pilot.is_some() {
                        self.applied.pilot = capacity.pilot;
                    }
                    self.reevaluate();
                    self.begin_step(HandshakeStep::Status);
                }
                Err(err) => self.handshake_failed(step, err.to_string()),
            },
            HandshakeStep::Status => {
                let Some(firmware) = self.firmware.clone() else {
                    return self.handshake_failed(step, "no firmware info".to_string());
                };
                match StatusReport::parse(&response, &firmware) {
                    Ok(report) => {
                        self.record_status(report);
                        self.link_up(firmware, report.status);
                    }
                    Err(err) => self.handshake_failed(step, err.to_string()),
                }
            }
        }
    }

    fn handshake_failed(&mut self, step: HandshakeStep, reason: String) {
        let retry = self.config.connect_retry();
        warn!(
            command = step.command(),
            "EVSE handshake failed: {}, retrying in {:?}", reason, retry
        );
        self.link = Link::Disconnected {
            next_attempt: self.now() + retry,
        };
    }

    fn link_up(&mut self, firmware: FirmwareInfo, status: EvseStatus) {
        let Some(capacity) = self.capacity else {
            return self.handshake_failed(HandshakeStep::Status, "no capacity".to_string());
        };

        info!(
            firmware = %firmware.firmware,
            protocol = %firmware.protocol,
            state = %status.evse_state,
            "EVSE connected"
        );
        let now = self.now();
        self.link = Link::Connected;
        self.next_status_poll = now + self.config.status_poll();
        self.next_charge_poll = now + self.config.charge_poll();
        self.next_temperature_poll = now + self.config.temperature_poll();
        self.boot_ready.publish(&BootReady {
            firmware,
            capacity,
            status,
        });
    }

    /// Forget everything the hardware confirmed and start a new handshake.
    fn link_down(&mut self) {
        self.applied = Applied::default();
        self.query_pending = false;
        self.retry_at = None;
        self.link = Link::Disconnected {
            next_attempt: self.now(),
        };
    }

    fn check_link(&mut self) {
        if self.link == Link::Connected && !self.sender.is_connected() {
            warn!("EVSE link lost");
            self.link_down();
        }
    }

    fn due_query(&self, now: Instant) -> Option<Query> {
        if now >= self.next_status_poll {
            Some(Query::Status)
        } else if self.is_charging() && now >= self.next_charge_poll {
            Some(Query::Charge)
        } else if now >= self.next_temperature_poll {
            Some(Query::Temperatures)
        } else {
            None
        }
    }

    fn request(&mut self, query: Query, now: Instant) {
        match query {
            Query::Status => self.next_status_poll = now + self.config.status_poll(),
            Query::Charge => self.next_charge_poll = now + self.config.charge_poll(),
            Query::Temperatures => {
                self.next_temperature_poll = now + self.config.temperature_poll()
            }
        }

        self.query_pending = true;
        let tx = self.messages_tx.clone();
        self.sender.send_cmd(query.command(), move |result| {
            let _ = tx.send(Message::Query(query, result));
        });
    }

    // ------------------------------------------------------------------------
    // Hardware state
    // ------------------------------------------------------------------------

    fn on_query_reply(&mut self, query: Query, response: &RapiResponse) {
        match query {
            Query::Status => {
                let Some(firmware) = &self.firmware else {
                    return;
                };
                match StatusReport::parse(response, firmware) {
                    Ok(report) => self.record_status(report),
                    Err(err) => warn!("Ignoring status reply: {}", err),
                }
            }
            Query::Charge => match ChargeReading::parse(response) {
                Ok(mut reading) => {
                    if reading.millivolts.is_none() {
                        reading.millivolts = self.charge.and_then(|last| last.millivolts);
                    }
                    trace!(
                        milliamps = reading.milliamps,
                        millivolts = ?reading.millivolts,
                        "Charge reading"
                    );
                    self.charge = Some(reading);
                    self.data_ready.publish(&DataReady::Charge(reading));
                }
                Err(err) => warn!("Ignoring charge reading: {}", err),
            },
            Query::Temperatures => match Temperatures::parse(response) {
                Ok(temperatures) => {
                    trace!(?temperatures, "Temperatures");
                    self.temperatures = Some(temperatures);
                    self.data_ready.publish(&DataReady::Temperatures(temperatures));
                }
                Err(err) => warn!("Ignoring temperatures: {}", err),
            },
        }
    }

    fn record_status(&mut self, report: StatusReport) {
        self.session_elapsed = report.session_elapsed;
        self.update_status(report.status);
        self.data_ready.publish(&DataReady::Status(report));
    }

    fn on_async_event(&mut self, response: &RapiResponse) {
        let event = match AsyncEvent::parse(response) {
            Ok(event) => event,
            Err(err) => {
                warn!("Ignoring async frame: {}", err);
                return;
            }
        };

        match event {
            AsyncEvent::Transition {
                status,
                current_capacity,
            } => {
                self.applied.pilot = Some(current_capacity);
                self.update_status(status);
            }
            AsyncEvent::State(evse_state) => {
                let status = match self.status {
                    Some(previous) if previous.pilot_state.is_some() => EvseStatus {
                        evse_state,
                        ..previous
                    },
                    _ => EvseStatus::from_state(evse_state),
                };
                self.update_status(status);
            }
            AsyncEvent::Boot {
                post_code,
                firmware,
            } => {
                info!(%post_code, %firmware, "EVSE restarted");
                self.link_down();
            }
            AsyncEvent::WifiRequest { mode } => {
                info!(%mode, "EVSE requested WiFi mode");
            }
            AsyncEvent::Other(raw) => trace!(%raw, "Unhandled async frame"),
        }
    }

    /// Record a status report from the hardware and publish it if it changed.
    fn update_status(&mut self, status: EvseStatus) {
        self.applied.state = Some(status.evse_state.requested_state());

        let previous = self.status.replace(status);
        if previous == Some(status) {
            return;
        }

        debug!(
            state = %status.evse_state,
            vflags = status.vflags,
            "EVSE state changed"
        );
        self.state_change.publish(&StateChange {
            previous,
            current: status,
        });

        let was_connected = previous.is_some_and(|p| p.is_vehicle_connected());
        if was_connected && !status.is_vehicle_connected() {
            self.on_vehicle_disconnected();
        }
    }

    fn on_vehicle_disconnected(&mut self) {
        info!("Vehicle disconnected");
        if !self.config.release_auto_claims_on_disconnect {
            return;
        }
        let released = self.claims.release_auto();
        if !released.is_empty() {
            info!(?released, "Released auto-release claims");
            self.reevaluate();
        }
    }

    // ------------------------------------------------------------------------
    // Arbitration and pushes
    // ------------------------------------------------------------------------

    fn reevaluate(&mut self) {
        let mut resolution = self.claims.resolve();
        if let Some(ceiling) = self.max_configured_current() {
            let props = &mut resolution.properties;
            if props.max_current.is_none_or(|amps| amps > ceiling) {
                props.max_current = Some(ceiling);
                resolution.max_current_client = None;
            }
        }

        if resolution != self.resolution {
            debug!(
                state = %resolution.properties.state,
                charge_current = ?resolution.properties.charge_current,
                max_current = ?resolution.properties.max_current,
                owner = ?resolution.state_client,
                "Target changed"
            );
        }
        self.resolution = resolution;
    }

    fn apply_target(&mut self) {
        if self.link != Link::Connected {
            return;
        }
        if let Some(at) = self.retry_at {
            if self.now() < at {
                return;
            }
            self.retry_at = None;
        }

        let state = self.resolution.properties.state;
        let push_state = self.pending_state.is_none() && self.applied.state != Some(state);
        let pilot = self
            .effective_pilot()
            .filter(|amps| self.pending_pilot.is_none() && self.applied.pilot != Some(*amps));

        // Stop before touching the pilot; set the pilot before enabling.
        if state == EvseState::Disabled {
            if push_state {
                self.push_state(state);
            }
            if let Some(amps) = pilot {
                self.push_pilot(amps);
            }
        } else {
            if let Some(amps) = pilot {
                self.push_pilot(amps);
            }
            if push_state {
                self.push_state(state);
            }
        }
    }

    fn push_state(&mut self, state: EvseState) {
        let command = match state {
            EvseState::Disabled if self.config.sleep_for_disable => "$FS",
            EvseState::Disabled => "$FD",
            EvseState::Active | EvseState::None => "$FE",
        };
        debug!(%state, command, "Pushing state");
        self.pending_state = Some(state);
        let tx = self.messages_tx.clone();
        self.sender.send_cmd(command, move |result| {
            let _ = tx.send(Message::StateApplied { state, result });
        });
    }

    fn push_pilot(&mut self, amps: u32) {
        debug!(amps, "Pushing pilot");
        self.pending_pilot = Some(amps);
        let tx = self.messages_tx.clone();
        self.sender.send_cmd(format!("$SC {} V", amps), move |result| {
            let _ = tx.send(Message::PilotApplied { amps, result });
        });
    }

    fn push_failed(&mut self, what: &str, reason: String) {
        let retry = self.config.retry();
        warn!("Failed to apply {}: {}, retrying in {:?}", what, reason, retry);
        self.retry_at = Some(self.now() + retry);
    }
}

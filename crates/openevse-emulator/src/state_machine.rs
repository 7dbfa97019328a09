//! State machine of a simulated charging controller.
//!
//! The controller's reported state follows from two inputs: the operating
//! mode set over RAPI and what the vehicle is doing.
//!
//! | Mode     | Vehicle            | State           |
//! |----------|--------------------|-----------------|
//! | enabled  | unplugged          | `NOT_CONNECTED` |
//! | enabled  | plugged, idle      | `CONNECTED`     |
//! | enabled  | plugged, drawing   | `CHARGING`      |
//! | sleeping | any                | `SLEEPING`      |
//! | disabled | any                | `DISABLED`      |
//!
//! A tripped fault overrides all of the above until cleared.
//!
//! # Examples
//!
//! ```
//! use openevse_core::HardwareState;
//! use openevse_emulator::Controller;
//!
//! let mut controller = Controller::builder().with_current_range(6, 32).build().unwrap();
//! assert_eq!(controller.state(), HardwareState::NOT_CONNECTED);
//!
//! controller.plug_in();
//! controller.start_charging().unwrap();
//! assert_eq!(controller.state(), HardwareState::CHARGING);
//!
//! controller.sleep();
//! assert_eq!(controller.state(), HardwareState::SLEEPING);
//! assert_eq!(controller.history().len(), 3);
//! ```

use openevse_core::HardwareState;
use openevse_core::constants::{VFLAG_CHARGING_ON, VFLAG_EV_CONNECTED, VFLAG_SESSION_ENDED};
use serde::Serialize;
use std::collections::VecDeque;

use crate::error::{EmulatorError, Result};

/// Transitions kept in the history.
pub const MAX_HISTORY_SIZE: usize = 100;

/// Operating mode selected with `$FE`, `$FS` and `$FD`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Enabled,
    Sleeping,
    Disabled,
}

/// One change of the reported state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StateTransition {
    pub from: HardwareState,
    pub to: HardwareState,
}

/// What the controller reports in `$GS` and `$AT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Snapshot {
    pub state: HardwareState,
    pub pilot_state: HardwareState,
    pub vflags: u32,
    pub pilot: u32,
}

/// A simulated OpenEVSE controller.
#[derive(Debug, Clone)]
pub struct Controller {
    mode: Mode,
    fault: Option<HardwareState>,
    vehicle_connected: bool,
    vehicle_drawing: bool,
    pilot: u32,
    min_current: u32,
    max_current: u32,
    session_elapsed: u32,
    state: HardwareState,
    history: VecDeque<StateTransition>,
}

impl Default for Controller {
    fn default() -> Self {
        Self::from_parts(Mode::Enabled, 6, 32, 32)
    }
}

impl Controller {
    pub fn builder() -> ControllerBuilder {
        ControllerBuilder::default()
    }

    fn from_parts(mode: Mode, min_current: u32, max_current: u32, pilot: u32) -> Self {
        let mut controller = Self {
            mode,
            fault: None,
            vehicle_connected: false,
            vehicle_drawing: false,
            pilot,
            min_current,
            max_current,
            session_elapsed: 0,
            state: HardwareState::STARTING,
            history: VecDeque::with_capacity(MAX_HISTORY_SIZE),
        };
        controller.state = controller.derive_state();
        controller
    }

    // ------------------------------------------------------------------------
    // RAPI side
    // ------------------------------------------------------------------------

    /// `$FE`.
    pub fn enable(&mut self) -> Option<StateTransition> {
        self.mode = Mode::Enabled;
        self.update()
    }

    /// `$FS`.
    pub fn sleep(&mut self) -> Option<StateTransition> {
        self.mode = Mode::Sleeping;
        self.vehicle_drawing = false;
        self.update()
    }

    /// `$FD`.
    pub fn disable(&mut self) -> Option<StateTransition> {
        self.mode = Mode::Disabled;
        self.vehicle_drawing = false;
        self.update()
    }

    /// `$SC <amps>`.
    pub fn set_pilot(&mut self, amps: u32) -> Result<()> {
        if !(self.min_current..=self.max_current).contains(&amps) {
            return Err(EmulatorError::PilotOutOfRange {
                amps,
                min: self.min_current,
                max: self.max_current,
            });
        }
        self.pilot = amps;
        Ok(())
    }

    /// Power cycle: enabled, pilot at maximum, faults cleared. The vehicle
    /// stays where it is.
    pub fn reset(&mut self) -> Option<StateTransition> {
        self.mode = Mode::Enabled;
        self.fault = None;
        self.vehicle_drawing = false;
        self.pilot = self.max_current;
        self.session_elapsed = 0;
        self.update()
    }

    // ------------------------------------------------------------------------
    // Vehicle side
    // ------------------------------------------------------------------------

    pub fn plug_in(&mut self) -> Option<StateTransition> {
        self.vehicle_connected = true;
        self.update()
    }

    pub fn unplug(&mut self) -> Option<StateTransition> {
        self.vehicle_connected = false;
        self.vehicle_drawing = false;
        self.session_elapsed = 0;
        self.update()
    }

    /// The vehicle asks for current. Only charges while enabled.
    pub fn start_charging(&mut self) -> Result<Option<StateTransition>> {
        if !self.vehicle_connected {
            return Err(EmulatorError::VehicleNotConnected);
        }
        self.vehicle_drawing = true;
        Ok(self.update())
    }

    pub fn stop_charging(&mut self) -> Option<StateTransition> {
        self.vehicle_drawing = false;
        self.update()
    }

    /// Enter a fault state until [`Controller::clear_fault`].
    pub fn trip(&mut self, fault: HardwareState) -> Result<Option<StateTransition>> {
        if !fault.is_error() {
            return Err(EmulatorError::NotAFault(fault));
        }
        self.fault = Some(fault);
        self.vehicle_drawing = false;
        Ok(self.update())
    }

    pub fn clear_fault(&mut self) -> Option<StateTransition> {
        self.fault = None;
        self.update()
    }

    /// Advance the session clock.
    pub fn tick(&mut self, seconds: u32) {
        if self.state == HardwareState::CHARGING {
            self.session_elapsed = self.session_elapsed.saturating_add(seconds);
        }
    }

    // ------------------------------------------------------------------------
    // Readings
    // ------------------------------------------------------------------------

    pub fn state(&self) -> HardwareState {
        self.state
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// J1772 pilot as seen from the vehicle side.
    pub fn pilot_state(&self) -> HardwareState {
        match (self.vehicle_connected, self.state) {
            (false, _) => HardwareState::NOT_CONNECTED,
            (true, HardwareState::CHARGING) => HardwareState::CHARGING,
            (true, _) => HardwareState::CONNECTED,
        }
    }

    pub fn vflags(&self) -> u32 {
        let mut flags = 0;
        if self.vehicle_connected {
            flags |= VFLAG_EV_CONNECTED;
        }
        if self.state == HardwareState::CHARGING {
            flags |= VFLAG_CHARGING_ON;
        } else if self.session_elapsed == 0 {
            flags |= VFLAG_SESSION_ENDED;
        }
        flags
    }

    pub fn pilot(&self) -> u32 {
        self.pilot
    }

    pub fn min_current(&self) -> u32 {
        self.min_current
    }

    pub fn max_current(&self) -> u32 {
        self.max_current
    }

    pub fn session_elapsed(&self) -> u32 {
        self.session_elapsed
    }

    pub fn is_vehicle_connected(&self) -> bool {
        self.vehicle_connected
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            state: self.state,
            pilot_state: self.pilot_state(),
            vflags: self.vflags(),
            pilot: self.pilot,
        }
    }

    /// Recorded transitions, oldest first.
    pub fn history(&self) -> &VecDeque<StateTransition> {
        &self.history
    }

    fn derive_state(&self) -> HardwareState {
        if let Some(fault) = self.fault {
            return fault;
        }
        match self.mode {
            Mode::Sleeping => HardwareState::SLEEPING,
            Mode::Disabled => HardwareState::DISABLED,
            Mode::Enabled if !self.vehicle_connected => HardwareState::NOT_CONNECTED,
            Mode::Enabled if self.vehicle_drawing => HardwareState::CHARGING,
            Mode::Enabled => HardwareState::CONNECTED,
        }
    }

    fn update(&mut self) -> Option<StateTransition> {
        let to = self.derive_state();
        if to == self.state {
            return None;
        }

        let transition = StateTransition {
            from: self.state,
            to,
        };
        self.state = to;
        if self.history.len() >= MAX_HISTORY_SIZE {
            self.history.pop_front();
        }
        self.history.push_back(transition);
        Some(transition)
    }
}

/// Builder for [`Controller`].
#[derive(Debug, Clone)]
pub struct ControllerBuilder {
    mode: Mode,
    min_current: u32,
    max_current: u32,
    pilot: Option<u32>,
}

impl Default for ControllerBuilder {
    fn default() -> Self {
        Self {
            mode: Mode::Enabled,
            min_current: 6,
            max_current: 32,
            pilot: None,
        }
    }
}

impl ControllerBuilder {
    pub fn with_current_range(mut self, min: u32, max: u32) -> Self {
        self.min_current = min;
        self.max_current = max;
        self
    }

    /// Initial pilot; defaults to the maximum.
    pub fn with_pilot(mut self, amps: u32) -> Self {
        self.pilot = Some(amps);
        self
    }

    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    pub fn build(self) -> Result<Controller> {
        if self.min_current > self.max_current {
            return Err(EmulatorError::InvalidCurrentRange {
                min: self.min_current,
                max: self.max_current,
            });
        }
        let mut controller =
            Controller::from_parts(self.mode, self.min_current, self.max_current, self.max_current);
        if let Some(amps) = self.pilot {
            controller.set_pilot(amps)?;
        }
        Ok(controller)
    }
}

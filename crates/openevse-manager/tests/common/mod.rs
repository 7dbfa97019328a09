//! Shared helpers for the manager integration tests.

#![allow(dead_code)]

use openevse_emulator::{SimulatedEvse, SimulatorHandle};
use openevse_manager::{EvseManager, ManagerConfig};
use openevse_rapi::ManualClock;
use std::time::Duration;

/// Polls that are enough for any exchange the tests trigger to finish.
const SETTLE_POLLS: usize = 12;

/// A manager wired to a simulated controller on a manual clock.
pub struct Harness {
    pub manager: EvseManager<SimulatedEvse, ManualClock>,
    pub evse: SimulatorHandle,
    pub clock: ManualClock,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(ManagerConfig::default())
    }

    pub fn with_config(config: ManagerConfig) -> Self {
        let (link, evse) = SimulatedEvse::new();
        let clock = ManualClock::new();
        let manager = EvseManager::with_clock(link, clock.clone(), config);
        Self {
            manager,
            evse,
            clock,
        }
    }

    /// A harness past its handshake, with the command log cleared.
    pub fn connected() -> Self {
        Self::connected_with_config(ManagerConfig::default())
    }

    pub fn connected_with_config(config: ManagerConfig) -> Self {
        let mut h = Self::with_config(config);
        h.settle();
        assert!(h.manager.is_connected(), "handshake did not complete");
        h.evse.take_commands();
        h
    }

    /// Poll without letting time pass.
    pub fn settle(&mut self) {
        for _ in 0..SETTLE_POLLS {
            self.manager.poll();
        }
    }

    /// Let `ms` milliseconds pass, then settle.
    pub fn advance(&mut self, ms: u64) {
        self.clock.advance(Duration::from_millis(ms));
        self.settle();
    }

    /// Commands the controller received since the last call.
    pub fn commands(&self) -> Vec<String> {
        self.evse.take_commands()
    }
}

//! Notifications published by the manager.

use serde::Serialize;
use tokio::sync::mpsc;

use crate::monitor::{
    ChargeReading, CurrentCapacity, EvseStatus, FirmwareInfo, StatusReport, Temperatures,
};

/// The controller's state, pilot state or vflags changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StateChange {
    /// Last known status; `None` for the first report after a handshake.
    pub previous: Option<EvseStatus>,
    pub current: EvseStatus,
}

/// The controller answered the handshake and the manager is ready to apply
/// claims.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BootReady {
    pub firmware: FirmwareInfo,
    pub capacity: CurrentCapacity,
    pub status: EvseStatus,
}

/// What the car reports about itself, as passed in by a vehicle
/// integration. Fields stay `None` until first set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct VehicleData {
    /// Battery state of charge in percent.
    pub state_of_charge: Option<u32>,
    /// Remaining range, in the unit the integration uses.
    pub range: Option<u32>,
    /// Seconds until the car expects to be charged.
    pub eta: Option<u32>,
}

/// A fresh reading arrived.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum DataReady {
    Status(StatusReport),
    Charge(ChargeReading),
    Temperatures(Temperatures),
    Vehicle(VehicleData),
}

/// Fan-out of events to any number of receivers.
///
/// Receivers that have been dropped are pruned on the next publish.
#[derive(Debug)]
pub(crate) struct Subscribers<T> {
    senders: Vec<mpsc::UnboundedSender<T>>,
}

impl<T> Default for Subscribers<T> {
    fn default() -> Self {
        Self {
            senders: Vec::new(),
        }
    }
}

impl<T: Clone> Subscribers<T> {
    pub(crate) fn subscribe(&mut self) -> mpsc::UnboundedReceiver<T> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.senders.push(tx);
        rx
    }

    pub(crate) fn publish(&mut self, event: &T) {
        self.senders.retain(|tx| tx.send(event.clone()).is_ok());
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.senders.len()
    }
}

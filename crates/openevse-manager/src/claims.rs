//! The claim table and its resolver.
//!
//! Each subsystem that wants a say over the charger holds at most one claim:
//! a priority plus the [`EvseProperties`] it asks for. The table has a fixed
//! number of slots; a claim that finds no free slot fails without touching
//! the table.
//!
//! # Resolution
//!
//! - `state`, `charge_current`, `energy_limit`, `time_limit` and
//!   `auto_release` come from the winning claim: the highest priority claim
//!   with a state opinion. Between equal priorities the most recently
//!   changed claim wins. Without any opinion the charger is `Active`.
//! - `max_current` is the lowest `max_current` of any claim, regardless of
//!   priority.
//!
//! ```
//! use openevse_core::{EvseClient, EvseProperties, EvseState, priority};
//! use openevse_manager::ClaimTable;
//!
//! let mut table: ClaimTable = ClaimTable::new();
//! table.claim(
//!     EvseClient::OPENEVSE_DIVERT,
//!     priority::DIVERT,
//!     EvseProperties::new(EvseState::Active).with_charge_current(10),
//! );
//! table.claim(
//!     EvseClient::OPENEVSE_MANUAL,
//!     priority::MANUAL,
//!     EvseProperties::new(EvseState::Disabled),
//! );
//!
//! let resolved = table.resolve();
//! assert_eq!(resolved.properties.state, EvseState::Disabled);
//! assert_eq!(resolved.state_client, Some(EvseClient::OPENEVSE_MANUAL));
//! ```

use openevse_core::constants::MAX_CLIENT_CLAIMS;
use openevse_core::{EvseClient, EvseProperties, EvseState};
use serde::Serialize;

/// One client's request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Claim {
    pub client: EvseClient,
    pub priority: i32,
    pub properties: EvseProperties,
    /// Table version at which this claim last changed.
    pub changed_at: u64,
}

/// What [`ClaimTable::claim`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// A free slot was taken.
    Added,
    /// The client's existing claim now holds different values.
    Updated,
    /// The client's claim already held exactly these values.
    Unchanged,
    /// No free slot, or the null client. The table is untouched.
    Rejected,
}

impl ClaimOutcome {
    /// Whether the client now holds the requested claim.
    pub fn is_accepted(self) -> bool {
        !matches!(self, ClaimOutcome::Rejected)
    }

    /// Whether the table contents changed.
    pub fn is_change(self) -> bool {
        matches!(self, ClaimOutcome::Added | ClaimOutcome::Updated)
    }
}

/// The outcome of arbitration, with the clients each value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Resolution {
    /// Resolved properties. `state` is never `None`.
    pub properties: EvseProperties,

    /// Client whose claim supplied the state and the values that follow it.
    pub state_client: Option<EvseClient>,

    /// Client whose claim supplied the lowest `max_current`.
    pub max_current_client: Option<EvseClient>,
}

impl Default for Resolution {
    fn default() -> Self {
        Self {
            properties: EvseProperties::new(EvseState::Active),
            state_client: None,
            max_current_client: None,
        }
    }
}

/// Fixed capacity table of client claims.
#[derive(Debug, Clone)]
pub struct ClaimTable<const N: usize = MAX_CLIENT_CLAIMS> {
    slots: [Option<Claim>; N],
    version: u64,
}

impl<const N: usize> Default for ClaimTable<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> ClaimTable<N> {
    pub fn new() -> Self {
        Self {
            slots: [None; N],
            version: 0,
        }
    }

    /// Add or replace `client`'s claim.
    ///
    /// The client's existing slot is reused; otherwise the first free slot
    /// is taken. Repeating a claim exactly returns `Unchanged` and keeps its
    /// recency, so it does not win an equal-priority tie it had lost.
    pub fn claim(
        &mut self,
        client: EvseClient,
        priority: i32,
        properties: EvseProperties,
    ) -> ClaimOutcome {
        if client.is_null() {
            return ClaimOutcome::Rejected;
        }

        let (index, outcome) = match self.position(client) {
            Some(index) => {
                if let Some(existing) = &self.slots[index]
                    && existing.priority == priority
                    && existing.properties == properties
                {
                    return ClaimOutcome::Unchanged;
                }
                (index, ClaimOutcome::Updated)
            }
            None => match self.slots.iter().position(Option::is_none) {
                Some(index) => (index, ClaimOutcome::Added),
                None => return ClaimOutcome::Rejected,
            },
        };

        self.version += 1;
        self.slots[index] = Some(Claim {
            client,
            priority,
            properties,
            changed_at: self.version,
        });
        outcome
    }

    /// Remove `client`'s claim. Returns `false` when it held none.
    pub fn release(&mut self, client: EvseClient) -> bool {
        match self.position(client) {
            Some(index) => {
                self.slots[index] = None;
                self.version += 1;
                true
            }
            None => false,
        }
    }

    /// Remove every claim flagged `auto_release` and return their clients.
    pub fn release_auto(&mut self) -> Vec<EvseClient> {
        let released: Vec<EvseClient> = self
            .iter()
            .filter(|claim| claim.properties.auto_release)
            .map(|claim| claim.client)
            .collect();
        for client in &released {
            self.release(*client);
        }
        released
    }

    pub fn contains(&self, client: EvseClient) -> bool {
        self.position(client).is_some()
    }

    pub fn get(&self, client: EvseClient) -> Option<&Claim> {
        self.iter().find(|claim| claim.client == client)
    }

    /// Occupied slots in slot order.
    pub fn iter(&self) -> impl Iterator<Item = &Claim> {
        self.slots.iter().flatten()
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }

    pub fn capacity(&self) -> usize {
        N
    }

    /// Incremented on every change to the table.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Arbitrate the current claims.
    pub fn resolve(&self) -> Resolution {
        let mut resolution = Resolution::default();

        let winner = self
            .iter()
            .filter(|claim| claim.properties.state.has_opinion())
            .max_by_key(|claim| (claim.priority, claim.changed_at));

        if let Some(winner) = winner {
            let props = &mut resolution.properties;
            props.state = winner.properties.state;
            props.charge_current = winner.properties.charge_current;
            props.energy_limit = winner.properties.energy_limit;
            props.time_limit = winner.properties.time_limit;
            props.auto_release = winner.properties.auto_release;
            resolution.state_client = Some(winner.client);
        }

        let ceiling = self
            .iter()
            .filter_map(|claim| claim.properties.max_current.map(|amps| (amps, claim)))
            .min_by_key(|(amps, claim)| (*amps, std::cmp::Reverse(claim.changed_at)));

        if let Some((amps, claim)) = ceiling {
            resolution.properties.max_current = Some(amps);
            resolution.max_current_client = Some(claim.client);
        }

        resolution
    }

    fn position(&self, client: EvseClient) -> Option<usize> {
        self.slots
            .iter()
            .position(|slot| slot.as_ref().is_some_and(|claim| claim.client == client))
    }
}

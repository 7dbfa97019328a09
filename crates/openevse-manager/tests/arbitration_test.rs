//! Claim arbitration as seen on the wire.
//!
//! Each test claims and releases through an `EvseManager` connected to a
//! simulated controller and checks which commands reach it.

mod common;

use common::Harness;
use openevse_core::{EvseClient, EvseProperties, EvseState, HardwareState, priority};
use openevse_core::constants::MAX_CLIENT_CLAIMS;
use openevse_manager::ManagerConfig;

fn active(amps: u32) -> EvseProperties {
    EvseProperties::new(EvseState::Active).with_charge_current(amps)
}

fn disabled() -> EvseProperties {
    EvseProperties::new(EvseState::Disabled)
}

// ============================================================================
// Overrides and limits
// ============================================================================

#[test]
fn test_divert_then_manual_override() {
    let mut h = Harness::connected();

    assert!(h.manager.claim(EvseClient::OPENEVSE_DIVERT, priority::DIVERT, active(10)));
    h.settle();
    assert_eq!(h.commands(), ["$SC 10 V"]);
    assert_eq!(h.evse.pilot(), 10);
    assert_eq!(h.manager.get_state(EvseClient::NULL), EvseState::Active);
    assert_eq!(h.manager.get_charge_current(EvseClient::NULL), Some(10));

    assert!(h.manager.claim(EvseClient::OPENEVSE_MANUAL, priority::MANUAL, disabled()));
    h.settle();
    assert_eq!(h.commands(), ["$FS", "$SC 32 V"]);
    assert_eq!(h.evse.state(), HardwareState::SLEEPING);
    assert_eq!(h.manager.get_state(EvseClient::NULL), EvseState::Disabled);
    assert_eq!(
        h.manager.resolution().state_client,
        Some(EvseClient::OPENEVSE_MANUAL)
    );

    // Divert's claim is still there, just outranked.
    assert!(h.manager.client_has_claim(EvseClient::OPENEVSE_DIVERT));
    assert_eq!(h.manager.get_charge_current(EvseClient::OPENEVSE_DIVERT), Some(10));

    assert!(h.manager.release(EvseClient::OPENEVSE_MANUAL));
    h.settle();
    assert_eq!(h.commands(), ["$SC 10 V", "$FE"]);
    assert_eq!(h.evse.state(), HardwareState::NOT_CONNECTED);
}

#[test]
fn test_max_current_is_lowest_of_all_claims() {
    let mut h = Harness::connected();

    h.manager.claim(
        EvseClient::OPENEVSE_DIVERT,
        50,
        EvseProperties::default().with_max_current(32),
    );
    h.manager.claim(
        EvseClient::OPEN_ENERGY_MONITOR_SHAPER,
        10,
        EvseProperties::default().with_max_current(16),
    );
    h.settle();

    assert_eq!(h.manager.get_max_current(EvseClient::NULL), Some(16));
    assert_eq!(
        h.manager.resolution().max_current_client,
        Some(EvseClient::OPEN_ENERGY_MONITOR_SHAPER)
    );
    assert_eq!(h.commands(), ["$SC 16 V"]);
}

#[test]
fn test_ceiling_holds_against_higher_priority() {
    let mut h = Harness::connected();

    h.manager.claim(EvseClient::OPENEVSE_MANUAL, priority::MANUAL, active(32));
    h.manager.claim(
        EvseClient::OPEN_ENERGY_MONITOR_SHAPER,
        priority::DEFAULT,
        EvseProperties::default().with_max_current(12),
    );
    h.settle();

    assert_eq!(h.evse.pilot(), 12);
    assert_eq!(h.manager.get_charge_current(EvseClient::NULL), Some(12));
}

#[test]
fn test_user_ceiling_applies() {
    let mut h = Harness::connected_with_config(ManagerConfig {
        max_configured_current: Some(20),
        ..ManagerConfig::default()
    });
    assert_eq!(h.manager.max_configured_current(), Some(20));

    h.manager.claim(EvseClient::OPENEVSE_BOOST, priority::BOOST, active(32));
    h.settle();
    assert_eq!(h.evse.pilot(), 20);

    h.manager.set_max_configured_current(None);
    h.settle();
    assert_eq!(h.evse.pilot(), 32);
}

// ============================================================================
// Idempotence
// ============================================================================

#[test]
fn test_identical_claim_issues_no_write() {
    let mut h = Harness::connected();

    h.manager.claim(EvseClient::OPENEVSE_DIVERT, priority::DIVERT, active(10));
    h.settle();
    let version = h.manager.claims_version();
    h.commands();

    assert!(h.manager.claim(EvseClient::OPENEVSE_DIVERT, priority::DIVERT, active(10)));
    h.settle();
    assert!(h.commands().is_empty());
    assert_eq!(h.manager.claims_version(), version);
}

#[test]
fn test_release_without_claim() {
    let mut h = Harness::connected();
    let version = h.manager.claims_version();

    assert!(!h.manager.release(EvseClient::OPENEVSE_BOOST));
    h.settle();
    assert!(h.commands().is_empty());
    assert_eq!(h.manager.claims_version(), version);
}

#[test]
fn test_claim_with_matching_hardware_issues_no_write() {
    let mut h = Harness::connected();

    // The controller already runs active at 32 A.
    h.manager.claim(EvseClient::OPENEVSE_SCHEDULE, priority::TIMER, active(32));
    h.settle();
    assert!(h.commands().is_empty());
}

// ============================================================================
// Priorities
// ============================================================================

#[test]
fn test_equal_priority_most_recent_wins() {
    let mut h = Harness::connected();

    h.manager.claim(EvseClient::OPENEVSE_SCHEDULE, priority::TIMER, active(16));
    h.manager.claim(EvseClient::OPENEVSE_DIVERT, priority::TIMER, active(8));
    h.settle();
    assert_eq!(h.evse.pilot(), 8);

    h.manager.claim(EvseClient::OPENEVSE_SCHEDULE, priority::TIMER, active(18));
    h.settle();
    assert_eq!(h.evse.pilot(), 18);
}

#[test]
fn test_repeated_claim_does_not_retake_a_tie() {
    let mut h = Harness::connected();

    h.manager.claim(EvseClient::OPENEVSE_SCHEDULE, 100, active(16));
    h.manager.claim(EvseClient::OPENEVSE_DIVERT, 100, disabled());
    h.settle();
    assert_eq!(h.evse.state(), HardwareState::SLEEPING);
    h.commands();

    h.manager.claim(EvseClient::OPENEVSE_SCHEDULE, 100, active(16));
    h.settle();
    assert_eq!(h.manager.get_state(EvseClient::NULL), EvseState::Disabled);
    assert_eq!(h.manager.resolution().state_client, Some(EvseClient::OPENEVSE_DIVERT));
    assert_eq!(h.evse.state(), HardwareState::SLEEPING);
    assert!(h.commands().is_empty());
}

#[test]
fn test_claim_without_state_opinion_is_ceiling_only() {
    let mut h = Harness::connected();

    h.manager.claim(EvseClient::OPENEVSE_MANUAL, priority::MANUAL, disabled());
    h.manager.claim(
        EvseClient::OPENEVSE_ERROR,
        priority::ERROR,
        EvseProperties::default().with_charge_current(6),
    );
    h.settle();

    assert_eq!(h.manager.get_state(EvseClient::NULL), EvseState::Disabled);
    assert_eq!(h.manager.get_state(EvseClient::OPENEVSE_ERROR), EvseState::None);
    assert_eq!(h.evse.state(), HardwareState::SLEEPING);
}

#[test]
fn test_full_table_rejects_claim() {
    let mut h = Harness::connected();

    for code in 0..MAX_CLIENT_CLAIMS as u16 {
        let client = EvseClient::new(EvseClient::VENDOR_UNREGISTERED, code);
        assert!(h.manager.claim(client, priority::DEFAULT, active(24)));
    }
    h.settle();
    h.commands();
    let version = h.manager.claims_version();

    assert!(!h.manager.claim(EvseClient::OPENEVSE_MANUAL, priority::MANUAL, disabled()));
    h.settle();
    assert!(h.commands().is_empty());
    assert_eq!(h.manager.claims_version(), version);
    assert_eq!(h.manager.get_state(EvseClient::NULL), EvseState::Active);
    assert_eq!(h.manager.claims().count(), MAX_CLIENT_CLAIMS);
}

// ============================================================================
// Getters
// ============================================================================

#[test]
fn test_limits_follow_the_winner() {
    let mut h = Harness::connected();

    h.manager.claim(
        EvseClient::OPENEVSE_LIMIT,
        priority::LIMIT,
        EvseProperties::new(EvseState::Active)
            .with_energy_limit(10_000)
            .with_time_limit(7200),
    );
    h.manager.claim(
        EvseClient::OPENEVSE_DIVERT,
        priority::DIVERT,
        active(8).with_energy_limit(500),
    );

    assert_eq!(h.manager.get_energy_limit(EvseClient::NULL), Some(10_000));
    assert_eq!(h.manager.get_time_limit(EvseClient::NULL), Some(7200));
    assert_eq!(h.manager.get_energy_limit(EvseClient::OPENEVSE_DIVERT), Some(500));
    assert_eq!(h.manager.get_time_limit(EvseClient::OPENEVSE_DIVERT), None);
    assert_eq!(h.manager.get_charge_current(EvseClient::OPENEVSE_BOOST), None);
    assert_eq!(
        h.manager.get_claim(EvseClient::OPENEVSE_LIMIT).map(|c| c.priority),
        Some(priority::LIMIT)
    );
}

#[test]
fn test_claims_can_be_made_before_connecting() {
    let mut h = Harness::new();
    h.manager.claim(EvseClient::OPENEVSE_MANUAL, priority::MANUAL, disabled());
    assert!(!h.manager.is_connected());

    h.settle();
    assert!(h.manager.is_connected());
    assert_eq!(h.commands(), ["$GV", "$GC", "$GS", "$FS"]);
}

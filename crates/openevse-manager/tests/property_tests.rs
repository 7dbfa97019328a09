//! Property-based tests for arbitration against the simulated controller.

mod common;

use common::Harness;
use openevse_core::{EvseClient, EvseProperties, EvseState, HardwareState};
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Op {
    Claim {
        client: u16,
        priority: i32,
        properties: EvseProperties,
    },
    Release(u16),
}

fn state() -> impl Strategy<Value = EvseState> {
    prop_oneof![
        Just(EvseState::None),
        Just(EvseState::Active),
        Just(EvseState::Disabled),
    ]
}

fn properties() -> impl Strategy<Value = EvseProperties> {
    (
        state(),
        proptest::option::of(1u32..=40),
        proptest::option::of(1u32..=40),
    )
        .prop_map(|(state, charge, max)| {
            let mut props = EvseProperties::new(state);
            props.charge_current = charge;
            props.max_current = max;
            props
        })
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (1u16..=6, 0i32..=2000, properties()).prop_map(|(client, priority, properties)| Op::Claim {
            client,
            priority,
            properties,
        }),
        1 => (1u16..=6).prop_map(Op::Release),
    ]
}

fn client(code: u16) -> EvseClient {
    EvseClient::new(EvseClient::VENDOR_UNREGISTERED, code)
}

proptest! {
    /// Property: once the manager settles, the controller runs exactly the
    /// resolved target.
    #[test]
    fn prop_controller_converges_on_target(ops in prop::collection::vec(op(), 1..20)) {
        let mut h = Harness::connected();

        for op in ops {
            match op {
                Op::Claim { client: code, priority, properties } => {
                    prop_assert!(h.manager.claim(client(code), priority, properties));
                }
                Op::Release(code) => {
                    h.manager.release(client(code));
                }
            }
        }
        h.settle();

        prop_assert_eq!(Some(h.evse.pilot()), h.manager.effective_pilot());
        let expected = match h.manager.get_state(EvseClient::NULL) {
            EvseState::Disabled => HardwareState::SLEEPING,
            _ => HardwareState::NOT_CONNECTED,
        };
        prop_assert_eq!(h.evse.state(), expected);
    }

    /// Property: the pilot never leaves the controller's range.
    #[test]
    fn prop_pilot_within_hardware_range(ops in prop::collection::vec(op(), 1..20)) {
        let mut h = Harness::connected();
        for op in ops {
            if let Op::Claim { client: code, priority, properties } = op {
                h.manager.claim(client(code), priority, properties);
            }
            let pilot = h.manager.effective_pilot().unwrap();
            prop_assert!((6..=32).contains(&pilot));
        }
    }
}

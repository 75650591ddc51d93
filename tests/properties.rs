//! Property-based tests covering publish-order and identity invariants
//! through the public `CrossBar` API.

use proptest::prelude::*;

use crossbar::prelude::*;

/// Property: message ids on a single channel are strictly increasing
/// regardless of how many values are published or what they contain.
#[test]
fn prop_message_ids_increase_monotonically_per_channel() {
    proptest!(|(values in proptest::collection::vec(any::<i32>(), 1..30))| {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let bus = CrossBar::new();

        let mut ids = Vec::new();
        for v in values {
            let msg = rt
                .block_on(bus.publish("props.ticks", v, PublishOptions::new()))
                .unwrap();
            ids.push(msg.id);
        }

        for window in ids.windows(2) {
            prop_assert!(window[0] < window[1]);
        }
    });
}

/// Property: `get_or_create` (exercised indirectly through repeated publishes
/// to the same channel) is idempotent for a fixed body type, whatever the
/// channel name.
#[test]
fn prop_repeated_publish_to_same_channel_never_errors_on_type_mismatch() {
    proptest!(|(name in "[a-z]{1,12}", count in 1usize..10)| {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let bus = CrossBar::new();

        for i in 0..count {
            let result = rt.block_on(bus.publish(&name, i as i32, PublishOptions::new()));
            prop_assert!(result.is_ok());
        }
    });
}

/// Property: a subscription disposed any number of times settles into
/// `Detached` and never oscillates back to `Active`.
#[test]
fn prop_dispose_is_idempotent_under_repeated_calls() {
    proptest!(|(dispose_calls in 1usize..10)| {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let bus = CrossBar::new();

        let sub = rt
            .block_on(bus.subscribe(
                "props.disposal",
                |_msg: Message<i32>| async move {},
                SubscribeOptions::new(),
            ))
            .unwrap();

        for _ in 0..dispose_calls {
            sub.dispose();
        }

        prop_assert_eq!(sub.state(), SubscriptionState::Detached);
    });
}

/// Property: correlation ids allocated by the bus are strictly increasing,
/// independent of which channel or body type requested them.
#[test]
fn prop_correlation_ids_are_strictly_increasing() {
    proptest!(|(count in 1usize..50)| {
        let bus = CrossBar::new();
        let mut ids = Vec::new();
        for _ in 0..count {
            ids.push(bus.get_next_correlation_id());
        }
        for window in ids.windows(2) {
            prop_assert!(window[0] < window[1]);
        }
    });
}

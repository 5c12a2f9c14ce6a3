//! Counter-window behavior between two relay clients.

use std::time::Duration;

use tradelink::relay::{CounterChannel, Tag};
use tradelink::test_harness::LoopbackRelay;

const CHC2: Tag = Tag::new(*b"CHC2");
const WAIT: Duration = Duration::from_secs(5);
const POLL: Duration = Duration::from_millis(10);

#[test]
fn counter_tagged_messages_flow_between_clients() {
    let relay = LoopbackRelay::start();
    let alice = relay.client("counter-room");
    let bob = relay.client("counter-room");

    let mut alice_channel = CounterChannel::new();
    let mut bob_channel = CounterChannel::new();

    alice_channel.send(&alice, CHC2, &[0x70, 0x01]).unwrap();
    let body = bob_channel.recv(&bob, CHC2, WAIT, POLL).unwrap();
    assert_eq!(&body[..], &[0x70, 0x01]);

    alice_channel.send(&alice, CHC2, &[0x71, 0x02]).unwrap();
    let body = bob_channel.recv(&bob, CHC2, WAIT, POLL).unwrap();
    assert_eq!(&body[..], &[0x71, 0x02]);
}

#[test]
fn stale_redelivery_is_never_observed() {
    let relay = LoopbackRelay::start();
    let alice = relay.client("stale-room");
    let bob = relay.client("stale-room");

    let mut alice_channel = CounterChannel::new();
    let mut bob_channel = CounterChannel::new();

    alice_channel.send(&alice, CHC2, &[0x70]).unwrap();
    let first = bob_channel.recv(&bob, CHC2, WAIT, POLL).unwrap();
    assert_eq!(&first[..], &[0x70]);

    // The room re-serves the same cached frame on request; the counter
    // window must reject it rather than hand it to the menu layer.
    bob.request(CHC2).unwrap();
    std::thread::sleep(Duration::from_millis(100));
    assert!(bob_channel.try_recv(&bob, CHC2).is_none());
}

#[test]
fn first_message_initializes_the_expected_counter() {
    let relay = LoopbackRelay::start();
    let alice = relay.client("init-room");
    let bob = relay.client("init-room");

    // Simulate a mid-session join: alice's outbound counter starts high.
    let mut alice_channel = CounterChannel::new();
    for _ in 0..200 {
        alice_channel.stage(&alice, Tag::new(*b"XXXX"), &[0]);
    }

    let mut bob_channel = CounterChannel::new();
    alice_channel.send(&alice, CHC2, &[0x42]).unwrap();
    let body = bob_channel.recv(&bob, CHC2, WAIT, POLL).unwrap();
    assert_eq!(&body[..], &[0x42]);

    // The next message advances normally from the adopted counter.
    alice_channel.send(&alice, CHC2, &[0x43]).unwrap();
    let body = bob_channel.recv(&bob, CHC2, WAIT, POLL).unwrap();
    assert_eq!(&body[..], &[0x43]);
}

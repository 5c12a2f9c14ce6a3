//! Two peers exchanging a section synchronously over SNG frames.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::thread;

use tradelink::data::Generation;
use tradelink::exchange::SectionExchanger;
use tradelink::test_harness::{LoopbackRelay, ScriptedLink};

/// Scripts a cartridge that streams `own` for one section: preamble
/// echo, first byte, then one reply per forwarded peer byte.
fn scripted_cartridge(starter: u8, own: &[u8]) -> ScriptedLink {
    let mut link = ScriptedLink::new();
    link.push_replies(&[starter, own[0]]);
    link.push_replies(&own[1..]);
    link.push_replies(&[0x00]); // reply to the final forwarded byte
    link
}

fn section_bytes(seed: u8, len: usize) -> Vec<u8> {
    let mut state = seed;
    (0..len)
        .map(|_| {
            state = state.wrapping_mul(151).wrapping_add(43);
            // Keep clear of the starter and the SNG keep-alive byte.
            match state {
                0xFD | 0xFE | 0xFF => 0x42,
                other => other,
            }
        })
        .collect()
}

#[test]
fn sync_section_delivers_both_views() {
    let relay = LoopbackRelay::start();
    let room = "sync-room";
    let client_a = relay.client(room);
    let client_b = relay.client(room);

    // Section 0 keeps the test fast; the algorithm is length-blind.
    let length = Generation::Gen2.section_lengths()[0];
    let side_a = section_bytes(3, length);
    let side_b = section_bytes(7, length);

    let b_bytes = side_b.clone();
    let a_bytes = side_a.clone();
    let handle = thread::spawn(move || {
        let mut link = scripted_cartridge(0xFD, &b_bytes);
        let stop = Arc::new(AtomicBool::new(false));
        let mut exchanger =
            SectionExchanger::new(&mut link, &client_b, Generation::Gen2, stop);
        exchanger.run_sync(0).unwrap()
    });

    let mut link = scripted_cartridge(0xFD, &side_a);
    let stop = Arc::new(AtomicBool::new(false));
    let mut exchanger = SectionExchanger::new(&mut link, &client_a, Generation::Gen2, stop);
    let outcome_a = exchanger.run_sync(0).unwrap();
    drop(exchanger);
    let outcome_b = handle.join().unwrap();

    assert_eq!(outcome_a.own, side_a);
    assert_eq!(outcome_b.own, side_b);
    assert_eq!(outcome_a.peer, side_b);
    assert_eq!(outcome_b.peer, a_bytes);

    // Every byte our cartridge consumed came from the peer's stream.
    let sent = link.sent();
    assert_eq!(&sent[sent.len() - length..], &side_b[..]);
}

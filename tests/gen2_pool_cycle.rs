//! A full scripted Gen 2 pool trade: enter, sit, sections, menu,
//! success, re-entry, cancel.

use std::time::Duration;

use tradelink::data::{Generation, StaticTables};
use tradelink::mediator::{SessionConfig, TradeMediator, TradeTarget};
use tradelink::negotiate::ExchangeMode;
use tradelink::party::gen12::{section_for_single, SingleMon, MAIL_ENTRY_LEN, NAME_LEN};
use tradelink::relay::Tag;
use tradelink::test_harness::{fixture_data_root, LoopbackRelay, ScriptedLink};

fn pool_single() -> Vec<u8> {
    let mut record = vec![0u8; 48];
    record[0] = 0x13; // species
    record[2] = 33; // one real move
    record[6] = 0x12; // trainer id, big endian
    record[7] = 0x34;
    let mon = SingleMon {
        species: 0x13,
        record,
        ot_name: vec![0x80; NAME_LEN],
        nickname: vec![0x81; NAME_LEN],
        mail: vec![0; MAIL_ENTRY_LEN],
    };
    mon.to_bytes()
}

fn own_party_section() -> Vec<u8> {
    let mut record = vec![0u8; 48];
    record[0] = 0x19;
    record[2] = 33;
    let mon = SingleMon {
        species: 0x19,
        record,
        ot_name: vec![0x82; NAME_LEN],
        nickname: vec![0x83; NAME_LEN],
        mail: vec![0; MAIL_ENTRY_LEN],
    };
    section_for_single(Generation::Gen2, &[0x86; NAME_LEN], 0x4242, &mon)
        .unwrap()
        .into_bytes()
}

fn push_buffered_section(script: &mut Vec<u8>, starter: u8, own: &[u8]) {
    script.push(starter); // preamble echo
    script.push(own[0]); // first payload byte
    script.extend_from_slice(&own[1..]);
    script.push(0x00); // reply to the final feed byte, discarded
}

fn push_sections(script: &mut Vec<u8>, own_party: &[u8]) {
    push_buffered_section(script, 0xFD, &[0x11; 10]);
    push_buffered_section(script, 0xFD, own_party);
    push_buffered_section(script, 0xFD, &[0x00; 197]);
    push_buffered_section(script, 0x20, &[0x00; 385]);
}

fn push_menu_trade(script: &mut Vec<u8>) {
    script.extend_from_slice(&[0x70; 10]); // own selection, 10 stable
    script.push(0x00); // peer selection ack
    script.push(0xFE); // peer selection ready
    script.extend_from_slice(&[0x72; 10]); // accept, 10 stable
    script.push(0x00); // peer decision ack
    script.push(0xFE); // peer decision ready
    script.extend_from_slice(&[0x91; 10]); // success byte, 10 stable
    script.push(0x00); // reply to the success echo
    script.push(0x00); // drain to ack
    script.extend_from_slice(&[0xFE; 5]); // drain to stable ready
}

fn push_menu_cancel(script: &mut Vec<u8>) {
    script.extend_from_slice(&[0x7F; 10]); // cancel, 10 stable
    script.push(0x7F); // end handshake echo
    script.push(0x00); // end handshake drain
}

#[test]
fn pool_trade_cycle_runs_to_completion() {
    let root = fixture_data_root();
    let tables = StaticTables::load(root.path(), Generation::Gen2).unwrap();

    let relay = LoopbackRelay::start();
    let room = "pool-room";
    let mediator_client = relay.client(room);

    // The "server": publishes the pool Pokémon into the room.
    let server = relay.client(room);
    server.send(Tag::new(*b"POL2"), pool_single()).unwrap();

    // A passive observer verifying what the mediator publishes.
    let observer = relay.client(room);

    let own_party = own_party_section();
    let mut link = ScriptedLink::new();
    let mut script = Vec::new();
    // Enter the room, then two full cycles: trade, re-enter, cancel.
    script.extend_from_slice(&[0x61, 0xD1, 0x00, 0xFE, 0xFE]);
    script.extend_from_slice(&[0x75, 0x00, 0xFD]);
    push_sections(&mut script, &own_party);
    push_menu_trade(&mut script);
    script.extend_from_slice(&[0x75, 0x00, 0xFD]);
    push_sections(&mut script, &own_party);
    push_menu_cancel(&mut script);
    link.push_replies(&script);

    let session = SessionConfig {
        generation: Generation::Gen2,
        target: TradeTarget::Pool,
        preferred_mode: ExchangeMode::Synchronous,
        egg_trade: false,
        japanese: false,
        relay_addr: Some(relay.addr().to_string()),
        room: room.to_string(),
    };

    let mut mediator = TradeMediator::new(link, mediator_client, &tables, session).unwrap();
    mediator.run(&mut |_| true).unwrap();

    // The mediator published its choices; the latest CHC2 is the
    // cancel from the second cycle.
    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    loop {
        if let Some(chc) = observer.peek(Tag::new(*b"CHC2")) {
            if chc.len() >= 2 && chc[1] == 0x7F {
                break;
            }
        }
        assert!(
            std::time::Instant::now() < deadline,
            "cancel CHC2 never published"
        );
        std::thread::sleep(Duration::from_millis(10));
    }

    let suc = observer.peek(Tag::new(*b"SUC2")).expect("SUC2 published");
    assert_eq!(suc[1], 0x91);

    let ask = observer.peek(Tag::new(*b"ASK2")).expect("ASK2 published");
    assert!(ask[1] == 0x72 || ask[1] == 0x43);
}

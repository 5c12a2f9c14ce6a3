//! CLI smoke tests.

use assert_cmd::Command;
use byteorder::{ByteOrder, LittleEndian};
use predicates::prelude::*;

fn valid_record_bytes() -> Vec<u8> {
    let mut bytes = vec![0u8; 100];
    LittleEndian::write_u32(&mut bytes[0..4], 0xDEAD_BEEF);
    LittleEndian::write_u32(&mut bytes[4..8], 0x1234_5678);
    let mut record = tradelink::party::Pk3Record::from_bytes(&bytes).unwrap();
    let plain = record.decrypt();
    record.apply(&plain);
    record.as_bytes().to_vec()
}

#[test]
fn help_lists_the_command_tree() {
    Command::cargo_bin("tradelink")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("trade"))
        .stdout(predicate::str::contains("inspect"));
}

#[test]
fn inspect_prints_a_decoded_record() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("record.pk3");
    std::fs::write(&file, valid_record_bytes()).unwrap();

    Command::cargo_bin("tradelink")
        .unwrap()
        .current_dir(dir.path())
        .args(["inspect", "record.pk3"])
        .assert()
        .success()
        .stdout(predicate::str::contains("DEADBEEF"))
        .stdout(predicate::str::contains("checksum:  ok"));
}

#[test]
fn inspect_refuses_wrong_lengths() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("short.bin");
    std::fs::write(&file, [0u8; 10]).unwrap();

    Command::cargo_bin("tradelink")
        .unwrap()
        .current_dir(dir.path())
        .args(["inspect", "short.bin"])
        .assert()
        .failure();
}

//! In-crate test harness: fixture data roots, a scripted cartridge
//! link, and a loopback relay server.

use std::collections::{HashMap, VecDeque};
use std::fs;
use std::io::Write as _;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use crate::data::Generation;
use crate::link::{ByteLink, LinkError, VoltageMode, NO_DATA};
use crate::relay::{FrameReader, RelayClient, RelayFrame, Tag};

// ---------------------------------------------------------------------
// Scripted cartridge link
// ---------------------------------------------------------------------

/// A cartridge stand-in that replays scripted replies and records every
/// byte the mediator sent. An exhausted script answers with the
/// timeout sentinel.
#[derive(Default)]
pub struct ScriptedLink {
    replies: VecDeque<u8>,
    replies32: VecDeque<u32>,
    sent: Vec<u8>,
    sent32: Vec<u32>,
    pub voltage: Option<VoltageMode>,
}

impl ScriptedLink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_replies(&mut self, replies: &[u8]) {
        self.replies.extend(replies.iter().copied());
    }

    pub fn push_replies32(&mut self, replies: &[u32]) {
        self.replies32.extend(replies.iter().copied());
    }

    pub fn sent(&self) -> &[u8] {
        &self.sent
    }

    pub fn sent32(&self) -> &[u32] {
        &self.sent32
    }
}

impl ByteLink for ScriptedLink {
    fn exchange(&mut self, out: u8) -> Result<u8, LinkError> {
        self.sent.push(out);
        Ok(self.replies.pop_front().unwrap_or(NO_DATA))
    }

    fn exchange32(&mut self, out: u32) -> Result<u32, LinkError> {
        self.sent32.push(out);
        Ok(self.replies32.pop_front().unwrap_or(u32::from(NO_DATA)))
    }

    fn set_voltage(&mut self, mode: VoltageMode) -> Result<(), LinkError> {
        self.voltage = Some(mode);
        Ok(())
    }
}

// ---------------------------------------------------------------------
// Loopback relay server
// ---------------------------------------------------------------------

struct Room {
    /// Last value per tag, with the member that published it; a poll is
    /// never answered with the requester's own value.
    cache: HashMap<Tag, (usize, Vec<u8>)>,
    members: Vec<(usize, Arc<Mutex<TcpStream>>)>,
}

impl Room {
    fn new() -> Self {
        Self {
            cache: HashMap::new(),
            members: Vec::new(),
        }
    }

    fn send_to(stream: &Arc<Mutex<TcpStream>>, frame: &RelayFrame) {
        if let Ok(mut guard) = stream.lock() {
            let _ = guard.write_all(&frame.encode());
        }
    }

    fn broadcast_except(&self, sender: usize, frame: &RelayFrame) {
        for (id, stream) in &self.members {
            if *id != sender {
                Self::send_to(stream, frame);
            }
        }
    }
}

/// A minimal reference relay: members join a named room with an initial
/// `S ROOM` frame; `S` frames are cached per tag and echoed to the rest
/// of the room; `G` frames are answered from the cache or forwarded so
/// a peer's outbox can answer.
pub struct LoopbackRelay {
    addr: SocketAddr,
}

impl LoopbackRelay {
    pub fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind loopback relay");
        let addr = listener.local_addr().expect("local addr");
        let rooms: Arc<Mutex<HashMap<String, Room>>> = Arc::new(Mutex::new(HashMap::new()));
        let next_id = Arc::new(AtomicUsize::new(0));

        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else { break };
                let rooms = Arc::clone(&rooms);
                let id = next_id.fetch_add(1, Ordering::Relaxed);
                thread::spawn(move || serve_member(stream, rooms, id));
            }
        });

        Self { addr }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Connects a fresh client into `room`.
    pub fn client(&self, room: &str) -> RelayClient {
        let stream = TcpStream::connect(self.addr).expect("connect loopback relay");
        RelayClient::from_stream(stream, room).expect("join room")
    }
}

fn serve_member(stream: TcpStream, rooms: Arc<Mutex<HashMap<String, Room>>>, id: usize) {
    let writer = Arc::new(Mutex::new(stream.try_clone().expect("clone member stream")));
    let mut reader = FrameReader::new(stream);

    // The first frame names the room.
    let room_name = match reader.read_next() {
        Ok(Some(RelayFrame::Send { tag, payload })) if tag == Tag::new(*b"ROOM") => {
            String::from_utf8_lossy(&payload).to_string()
        }
        _ => return,
    };
    {
        let mut rooms = rooms.lock().unwrap_or_else(|e| e.into_inner());
        rooms
            .entry(room_name.clone())
            .or_insert_with(Room::new)
            .members
            .push((id, Arc::clone(&writer)));
    }

    while let Ok(Some(frame)) = reader.read_next() {
        let mut rooms = rooms.lock().unwrap_or_else(|e| e.into_inner());
        let Some(room) = rooms.get_mut(&room_name) else {
            break;
        };
        match &frame {
            RelayFrame::Send { tag, payload } => {
                room.cache.insert(*tag, (id, payload.to_vec()));
                room.broadcast_except(id, &frame);
            }
            RelayFrame::Get { tag } => match room.cache.get(tag) {
                Some((sender, cached)) if *sender != id => {
                    Room::send_to(&writer, &RelayFrame::send(*tag, cached.clone()));
                }
                _ => room.broadcast_except(id, &frame),
            },
        }
    }

    let mut rooms = rooms.lock().unwrap_or_else(|e| e.into_inner());
    if let Some(room) = rooms.get_mut(&room_name) {
        room.members.retain(|(member, _)| *member != id);
    }
}

// ---------------------------------------------------------------------
// Fixture data root
// ---------------------------------------------------------------------

static FIXTURE_COUNTER: AtomicUsize = AtomicUsize::new(0);

/// A generated data root on disk, removed on drop.
pub struct FixtureRoot {
    path: PathBuf,
}

impl FixtureRoot {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for FixtureRoot {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.path);
    }
}

/// Builds a complete deterministic data root covering the Gen 1/2 and
/// Gen 3 table layouts.
pub fn fixture_data_root() -> FixtureRoot {
    let unique = FIXTURE_COUNTER.fetch_add(1, Ordering::Relaxed);
    let path = std::env::temp_dir().join(format!(
        "tradelink-fixture-{}-{unique}",
        std::process::id()
    ));
    let _ = fs::remove_dir_all(&path);

    write_gen12_dir(&path.join(Generation::Gen2.data_dir()), Generation::Gen2);
    write_gen12_dir(&path.join(Generation::Gen1.data_dir()), Generation::Gen1);
    write_gen3_dir(&path.join(Generation::Gen3.data_dir()));

    FixtureRoot { path }
}

fn write(path: &Path, bytes: &[u8]) {
    fs::write(path, bytes).expect("write fixture file");
}

fn exp_table_text() -> String {
    let mut out = String::new();
    for group in 0u32..6 {
        for level in 1u32..=100 {
            let exp = (level - 1).pow(3) * (group + 4) / 4;
            out.push_str(&format!("{exp} "));
        }
        out.push('\n');
    }
    out
}

fn text_conv_lines() -> String {
    let mut out = String::new();
    for (index, letter) in (b'A'..=b'Z').enumerate() {
        out.push_str(&format!("{:02X} {}\n", 0x80 + index, letter as char));
    }
    out.push_str("7F  \n");
    out.push_str("E6 ?\n");
    out
}

fn names_file(count: usize) -> String {
    (0..count)
        .map(|index| format!("MON{index:03}\n"))
        .collect()
}

fn moves_pp_table() -> Vec<u8> {
    let mut table: Vec<u8> = (0..=255u16).map(|id| ((id * 3) % 35 + 5) as u8).collect();
    table[16] = 40;
    table[33] = 35;
    table
}

fn stats_table(count: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(count * 6);
    for species in 0..count {
        for stat in 0..6usize {
            out.push((35 + (species * 7 + stat * 11) % 90) as u8);
        }
    }
    out
}

/// Check map for one Gen 1/2 record, following the record layout.
fn record_checks(generation: Generation) -> Vec<u8> {
    match generation {
        Generation::Gen1 => {
            // species, currHP, box level, status, types, catch rate,
            // moves, OT id, exp, stat exp, DVs, PPs, level, stats.
            let mut map = vec![6, 12, 12, 0, 0, 19, 19, 10];
            map.extend_from_slice(&[9, 9, 9, 9]);
            map.extend_from_slice(&[0, 0]);
            map.extend_from_slice(&[17, 17, 17]);
            map.extend_from_slice(&[13; 10]);
            map.extend_from_slice(&[14, 14]);
            map.extend_from_slice(&[16, 16, 16, 16]);
            map.push(11);
            map.extend_from_slice(&[15; 10]);
            map
        }
        _ => {
            // species, item, moves, OT id, exp, stat exp, DVs, PPs,
            // friendship/egg cycles, pokerus, caught data, level,
            // status, unused, currHP, stats.
            let mut map = vec![6, 10];
            map.extend_from_slice(&[9, 9, 9, 9]);
            map.extend_from_slice(&[0, 0]);
            map.extend_from_slice(&[17, 17, 17]);
            map.extend_from_slice(&[13; 10]);
            map.extend_from_slice(&[14, 14]);
            map.extend_from_slice(&[16, 16, 16, 16]);
            map.push(18);
            map.extend_from_slice(&[0, 0, 0]);
            map.push(11);
            map.extend_from_slice(&[0, 0]);
            map.extend_from_slice(&[12, 12]);
            map.extend_from_slice(&[15; 12]);
            map
        }
    }
}

fn name_checks() -> Vec<u8> {
    let mut map = vec![1; 10];
    map.push(4);
    map
}

fn mail_entry_checks() -> Vec<u8> {
    let mut map = vec![2; 33];
    map.extend_from_slice(&[0; 8]);
    map.extend_from_slice(&[21, 20, 22, 0, 0, 0]);
    map
}

fn checks_map(generation: Generation) -> Vec<u8> {
    let lengths = generation.section_lengths();
    let mut map = Vec::new();

    // Section 0: random bytes, nothing to check.
    map.extend_from_slice(&vec![0u8; lengths[0]]);

    // Section 1: header, records, OT names, nicknames.
    let mut section = Vec::with_capacity(lengths[1]);
    section.extend_from_slice(&name_checks());
    section.push(5);
    section.extend_from_slice(&[7, 7, 7, 7, 7, 7, 8]);
    section.extend_from_slice(&[0, 0]);
    for _ in 0..6 {
        section.extend_from_slice(&record_checks(generation));
    }
    for _ in 0..12 {
        section.extend_from_slice(&name_checks());
    }
    section.resize(lengths[1], 0);
    map.extend_from_slice(&section);

    // Section 2: patch list with a short header.
    let mut section = vec![0u8; 7];
    section.resize(lengths[2], 23);
    map.extend_from_slice(&section);

    // Section 3 (Gen 2): six mail entries then the mail patch list.
    if lengths.len() > 3 {
        let mut section = Vec::with_capacity(lengths[3]);
        for _ in 0..6 {
            section.extend_from_slice(&mail_entry_checks());
        }
        section.resize(lengths[3], 24);
        map.extend_from_slice(&section);
    }

    map
}

fn single_checks(generation: Generation) -> Vec<u8> {
    let mut map = record_checks(generation);
    map.extend_from_slice(&name_checks());
    map.extend_from_slice(&name_checks());
    if generation == Generation::Gen2 {
        map.extend_from_slice(&mail_entry_checks());
    }
    map
}

fn write_gen12_dir(dir: &Path, generation: Generation) {
    fs::create_dir_all(dir).expect("create fixture dir");

    write(&dir.join("stats.bin"), &stats_table(256));
    write(
        &dir.join("pokemon_exp_groups.bin"),
        &(0..=255u8).map(|s| s % 6).collect::<Vec<_>>(),
    );
    write(&dir.join("pokemon_exp.txt"), exp_table_text().as_bytes());
    // Kadabra and item-gated Seadra, plus a spare plain trade evo.
    write(
        &dir.join("evolution_ids.bin"),
        &[0x40, 0x00, 0x41, 0x75, 0x8B, 0xE6, 0x4B, 0x00, 0x4C],
    );
    write(&dir.join("pokemon_names.txt"), names_file(256).as_bytes());
    write(&dir.join("bad_ids_items.bin"), &[0xEE, 0xFF]);
    write(&dir.join("bad_ids_moves.bin"), &[0xEE, 0xFF]);
    write(&dir.join("bad_ids_pokemon.bin"), &[0x00, 0xEE, 0xFC, 0xFE, 0xFF]);
    write(
        &dir.join("bad_ids_text.bin"),
        &(0x00..=0x3Fu8).collect::<Vec<_>>(),
    );
    write(&dir.join("moves_pp_list.bin"), &moves_pp_table());
    write(
        &dir.join("pokemon_patch_set_0.bin"),
        &(0x01..=0x20u8).collect::<Vec<_>>(),
    );
    write(
        &dir.join("pokemon_patch_set_1.bin"),
        &(0x01..=0x20u8).collect::<Vec<_>>(),
    );
    write(
        &dir.join("mail_patch_set.bin"),
        &(0x01..=0x10u8).collect::<Vec<_>>(),
    );
    write(&dir.join("checks_map.bin"), &checks_map(generation));
    write(
        &dir.join("single_pokemon_checks_map.bin"),
        &single_checks(generation),
    );
    write(&dir.join("moves_checks_map.bin"), &[9, 9, 9, 9, 16, 16, 16, 16]);
    let mail_len = *generation.section_lengths().last().unwrap();
    write(&dir.join("no_mail_section.bin"), &vec![0u8; mail_len]);
    write(
        &dir.join("base_random_section.bin"),
        &[0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88, 0x99, 0xAA],
    );
    // EGG plus terminator.
    write(&dir.join("egg_nick.bin"), &[0x84, 0x86, 0x86, 0x50]);
    write(&dir.join("text_conv.txt"), text_conv_lines().as_bytes());
    write(&dir.join("learnset_evos.bin"), &[0xF9, 0x40]);
    write(&dir.join("base.bin"), &base_party_blob(generation));
}

fn base_party_blob(generation: Generation) -> Vec<u8> {
    let lengths = generation.section_lengths();
    let mut blob = Vec::new();
    blob.extend_from_slice(&[0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88, 0x99, 0xAA]);

    let mut party = vec![0u8; lengths[1]];
    // Trader name, count, one Rattata, terminated species list.
    party[..4].copy_from_slice(&[0x86, 0x87, 0x8E, 0x92]);
    for byte in party.iter_mut().take(11).skip(4) {
        *byte = 0x50;
    }
    party[11] = 1;
    party[12] = 0x13;
    for slot in 13..19 {
        party[slot] = 0xFF;
    }
    party[21] = 0x13;
    blob.extend_from_slice(&party);

    blob.extend_from_slice(&vec![0u8; lengths[2]]);
    if lengths.len() > 3 {
        blob.extend_from_slice(&vec![0u8; lengths[3]]);
    }
    blob
}

fn write_gen3_dir(dir: &Path) {
    fs::create_dir_all(dir).expect("create fixture dir");
    const SPECIES: usize = 412;

    write(&dir.join("stats.bin"), &stats_table(SPECIES));
    write(
        &dir.join("pokemon_exp_groups.bin"),
        &(0..SPECIES).map(|s| (s % 6) as u8).collect::<Vec<_>>(),
    );
    write(&dir.join("pokemon_exp.txt"), exp_table_text().as_bytes());
    // Species 0 and the egg sentinel are invalid; the high entry sizes
    // the flag table across the whole dex.
    let mut invalid = Vec::new();
    invalid.extend_from_slice(&0u16.to_le_bytes());
    invalid.extend_from_slice(&412u16.to_le_bytes());
    write(&dir.join("invalid_pokemon.bin"), &invalid);
    write(&dir.join("invalid_held_items.bin"), &0x0177u16.to_le_bytes());
    let mut abilities = Vec::with_capacity(SPECIES * 2);
    for species in 0..SPECIES {
        abilities.push((species % 70) as u8);
        // A few species carry identical first and second abilities.
        abilities.push(if species % 5 == 0 {
            (species % 70) as u8
        } else {
            ((species + 1) % 70) as u8
        });
    }
    write(&dir.join("abilities.bin"), &abilities);
    write(&dir.join("moves_pp_list.bin"), &moves_pp_table());
    write(&dir.join("pokemon_names.txt"), names_file(SPECIES).as_bytes());
    write(&dir.join("egg_nick.bin"), &[0x84, 0x86, 0x86, 0xFF]);
    write(&dir.join("text_conv.txt"), text_conv_lines().as_bytes());
    write(&dir.join("base.bin"), &vec![0u8; 0x380]);
    write(&dir.join("base_pool.bin"), &vec![0u8; 0x380]);
}

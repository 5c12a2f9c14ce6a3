//! Gen 1/2 party sections, records and slot views.

use byteorder::{BigEndian, ByteOrder};
use thiserror::Error;

use crate::data::{Generation, StaticTables};

pub const NAME_LEN: usize = 11;
pub const JP_NAME_LEN: usize = 6;
pub const MAX_PARTY: usize = 6;
pub const LIST_TERMINATOR: u8 = 0xFF;
/// Species byte marking an egg in the Gen 2 species list.
pub const EGG_SENTINEL: u8 = 0xFD;
pub const MAIL_ENTRY_LEN: usize = 47;
pub const MAIL_DATA_LEN: usize = MAIL_ENTRY_LEN * MAX_PARTY;

#[derive(Debug, Error)]
pub enum PartyError {
    #[error("section {index} expects {expected} bytes, got {got}")]
    SectionLength {
        index: usize,
        expected: usize,
        got: usize,
    },
    #[error("party slot {slot} out of range (count {count})")]
    SlotOutOfRange { slot: usize, count: usize },
    #[error("single-Pokémon record expects {expected} bytes, got {got}")]
    RecordLength { expected: usize, got: usize },
}

/// Byte offsets within the Pokémon section of one generation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Layout {
    record_len: usize,
    count: usize,
    species_list: usize,
    trainer_id: usize,
    records: usize,
    ot_names: usize,
    nicknames: usize,
}

impl Layout {
    fn for_generation(generation: Generation) -> Self {
        let record_len = generation.party_record_len();
        let records = NAME_LEN + 1 + (MAX_PARTY + 1) + 2;
        let ot_names = records + record_len * MAX_PARTY;
        let nicknames = ot_names + NAME_LEN * MAX_PARTY;
        Self {
            record_len,
            count: NAME_LEN,
            species_list: NAME_LEN + 1,
            trainer_id: NAME_LEN + 1 + (MAX_PARTY + 1),
            records,
            ot_names,
            nicknames,
        }
    }
}

/// The full single-Pokémon payload carried by `CHC`/`POL` messages:
/// record, OT name, nickname, and (Gen 2) the slot's mail entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SingleMon {
    pub species: u8,
    pub record: Vec<u8>,
    pub ot_name: Vec<u8>,
    pub nickname: Vec<u8>,
    pub mail: Vec<u8>,
}

impl SingleMon {
    /// Wire length of a single-Pokémon payload for `generation`.
    pub fn wire_len(generation: Generation) -> usize {
        let mail = match generation {
            Generation::Gen2 => MAIL_ENTRY_LEN,
            _ => 0,
        };
        generation.party_record_len() + NAME_LEN * 2 + mail
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out =
            Vec::with_capacity(self.record.len() + self.ot_name.len() + self.nickname.len());
        out.extend_from_slice(&self.record);
        out.extend_from_slice(&self.ot_name);
        out.extend_from_slice(&self.nickname);
        out.extend_from_slice(&self.mail);
        out
    }

    pub fn from_bytes(generation: Generation, raw: &[u8]) -> Result<Self, PartyError> {
        let expected = Self::wire_len(generation);
        if raw.len() != expected {
            return Err(PartyError::RecordLength {
                expected,
                got: raw.len(),
            });
        }
        let record_len = generation.party_record_len();
        let record = raw[..record_len].to_vec();
        let ot_name = raw[record_len..record_len + NAME_LEN].to_vec();
        let nickname = raw[record_len + NAME_LEN..record_len + NAME_LEN * 2].to_vec();
        let mail = raw[record_len + NAME_LEN * 2..].to_vec();
        Ok(Self {
            species: record[0],
            record,
            ot_name,
            nickname,
            mail,
        })
    }
}

/// Owned Pokémon section with slot-indexed views.
///
/// The mediator owns the peer's cached section and mutates it only
/// through [`PartySection::swap_with_last`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PartySection {
    generation: Generation,
    layout: Layout,
    bytes: Vec<u8>,
}

impl PartySection {
    /// Wraps a Pokémon section buffer (section index 1).
    pub fn new(generation: Generation, bytes: Vec<u8>) -> Result<Self, PartyError> {
        let expected = generation.section_lengths()[1];
        if bytes.len() != expected {
            return Err(PartyError::SectionLength {
                index: 1,
                expected,
                got: bytes.len(),
            });
        }
        Ok(Self {
            generation,
            layout: Layout::for_generation(generation),
            bytes,
        })
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn trader_name(&self) -> &[u8] {
        &self.bytes[..NAME_LEN]
    }

    pub fn trainer_id(&self) -> u16 {
        BigEndian::read_u16(&self.bytes[self.layout.trainer_id..])
    }

    pub fn party_count(&self) -> usize {
        usize::from(self.bytes[self.layout.count]).clamp(1, MAX_PARTY)
    }

    pub fn set_party_count(&mut self, count: usize) {
        self.bytes[self.layout.count] = count.clamp(1, MAX_PARTY) as u8;
        for slot in count..=MAX_PARTY {
            self.bytes[self.layout.species_list + slot] = LIST_TERMINATOR;
        }
    }

    pub fn species_at(&self, slot: usize) -> u8 {
        self.bytes[self.layout.species_list + slot]
    }

    pub fn set_species_at(&mut self, slot: usize, species: u8) {
        self.bytes[self.layout.species_list + slot] = species;
    }

    pub fn core_at(&self, slot: usize) -> &[u8] {
        let start = self.layout.records + slot * self.layout.record_len;
        &self.bytes[start..start + self.layout.record_len]
    }

    pub fn core_at_mut(&mut self, slot: usize) -> &mut [u8] {
        let start = self.layout.records + slot * self.layout.record_len;
        &mut self.bytes[start..start + self.layout.record_len]
    }

    pub fn ot_at(&self, slot: usize) -> &[u8] {
        let start = self.layout.ot_names + slot * NAME_LEN;
        &self.bytes[start..start + NAME_LEN]
    }

    pub fn nickname_at(&self, slot: usize) -> &[u8] {
        let start = self.layout.nicknames + slot * NAME_LEN;
        &self.bytes[start..start + NAME_LEN]
    }

    /// Extracts the full single-Pokémon payload for `slot`, pulling the
    /// slot's mail entry from `mail_section` when the generation has one.
    pub fn extract_single(
        &self,
        slot: usize,
        mail_section: Option<&[u8]>,
    ) -> Result<SingleMon, PartyError> {
        let count = self.party_count();
        if slot >= count {
            return Err(PartyError::SlotOutOfRange { slot, count });
        }
        let mail = match (self.generation, mail_section) {
            (Generation::Gen2, Some(mail)) => {
                mail[slot * MAIL_ENTRY_LEN..(slot + 1) * MAIL_ENTRY_LEN].to_vec()
            }
            (Generation::Gen2, None) => vec![0; MAIL_ENTRY_LEN],
            _ => Vec::new(),
        };
        Ok(SingleMon {
            species: self.species_at(slot),
            record: self.core_at(slot).to_vec(),
            ot_name: self.ot_at(slot).to_vec(),
            nickname: self.nickname_at(slot).to_vec(),
            mail,
        })
    }

    /// Reproduces the post-trade party locally: slots above `slot`
    /// shift down one place and `incoming` lands in the last occupied
    /// slot. Party size is unchanged.
    pub fn swap_with_last(&mut self, slot: usize, incoming: &SingleMon) -> Result<(), PartyError> {
        let count = self.party_count();
        if slot >= count {
            return Err(PartyError::SlotOutOfRange { slot, count });
        }
        let last = count - 1;
        for from in slot + 1..count {
            let to = from - 1;
            let species = self.species_at(from);
            self.set_species_at(to, species);
            let record = self.core_at(from).to_vec();
            self.core_at_mut(to).copy_from_slice(&record);
            self.copy_name(self.layout.ot_names, from, to);
            self.copy_name(self.layout.nicknames, from, to);
        }
        self.set_species_at(last, incoming.species);
        self.core_at_mut(last).copy_from_slice(&incoming.record);
        let ot = self.layout.ot_names + last * NAME_LEN;
        self.bytes[ot..ot + NAME_LEN].copy_from_slice(&incoming.ot_name);
        let nick = self.layout.nicknames + last * NAME_LEN;
        self.bytes[nick..nick + NAME_LEN].copy_from_slice(&incoming.nickname);
        Ok(())
    }

    fn copy_name(&mut self, base: usize, from: usize, to: usize) {
        let src = base + from * NAME_LEN;
        let dst = base + to * NAME_LEN;
        let name: [u8; NAME_LEN] = self.bytes[src..src + NAME_LEN].try_into().unwrap_or_default();
        self.bytes[dst..dst + NAME_LEN].copy_from_slice(&name);
    }

    /// Rewrites `slot`'s move block from an `MVS` refresh payload
    /// (4 move ids followed by 4 PP bytes).
    pub fn apply_move_refresh(&mut self, slot: usize, moves: &[u8; 4], pps: &[u8; 4]) {
        let (move_base, pp_base) = match self.generation {
            Generation::Gen1 => (8, 29),
            _ => (2, 23),
        };
        let record = self.core_at_mut(slot);
        record[move_base..move_base + 4].copy_from_slice(moves);
        record[pp_base..pp_base + 4].copy_from_slice(pps);
    }

    /// Moves and PP bytes of `slot`'s record, for `MVS` payloads.
    pub fn moves_of(&self, slot: usize) -> ([u8; 4], [u8; 4]) {
        let (move_base, pp_base) = match self.generation {
            Generation::Gen1 => (8, 29),
            _ => (2, 23),
        };
        let record = self.core_at(slot);
        let moves = record[move_base..move_base + 4].try_into().unwrap_or([0; 4]);
        let pps = record[pp_base..pp_base + 4].try_into().unwrap_or([0; 4]);
        (moves, pps)
    }

    /// Held item of `slot`'s record (Gen 2; Gen 1 reuses the catch-rate
    /// byte at the same position).
    pub fn held_item_at(&self, slot: usize) -> u8 {
        match self.generation {
            Generation::Gen1 => self.core_at(slot)[7],
            _ => self.core_at(slot)[1],
        }
    }

    /// Converts `slot` into an egg for Gen 2 pool delivery: egg sentinel
    /// in the species list, fresh hatch cycles, zero HP, `EGG` nickname.
    pub fn convert_to_egg(&mut self, slot: usize, tables: &StaticTables, cycles: u8) {
        self.set_species_at(slot, EGG_SENTINEL);
        if self.generation == Generation::Gen2 {
            let record = self.core_at_mut(slot);
            record[27] = cycles;
            record[34] = 0;
            record[35] = 0;
        }
        let nick = self.layout.nicknames + slot * NAME_LEN;
        let field = &mut self.bytes[nick..nick + NAME_LEN];
        field.fill(crate::data::text::TERMINATOR_GB);
        let egg = &tables.egg_nick;
        let len = egg.len().min(NAME_LEN);
        field[..len].copy_from_slice(&egg[..len]);
    }
}

/// Offsets of every name field in the Pokémon section: trader name,
/// six OT names, six nicknames.
pub fn name_field_offsets(generation: Generation) -> Vec<usize> {
    let layout = Layout::for_generation(generation);
    let mut offsets = vec![0];
    for slot in 0..MAX_PARTY {
        offsets.push(layout.ot_names + slot * NAME_LEN);
    }
    for slot in 0..MAX_PARTY {
        offsets.push(layout.nicknames + slot * NAME_LEN);
    }
    offsets
}

/// Builds a fresh Pokémon section holding exactly one Pokémon, used for
/// pool trades where the server sends a single record.
pub fn section_for_single(
    generation: Generation,
    trader_name: &[u8],
    trainer_id: u16,
    mon: &SingleMon,
) -> Result<PartySection, PartyError> {
    let expected = generation.section_lengths()[1];
    let layout = Layout::for_generation(generation);
    let mut bytes = vec![0u8; expected];
    let name_len = trader_name.len().min(NAME_LEN);
    bytes[..name_len].copy_from_slice(&trader_name[..name_len]);
    bytes[name_len..NAME_LEN].fill(crate::data::text::TERMINATOR_GB);
    bytes[layout.count] = 1;
    bytes[layout.species_list] = mon.species;
    for slot in 1..=MAX_PARTY {
        bytes[layout.species_list + slot] = LIST_TERMINATOR;
    }
    BigEndian::write_u16(&mut bytes[layout.trainer_id..layout.trainer_id + 2], trainer_id);

    let mut section = PartySection::new(generation, bytes)?;
    section.core_at_mut(0).copy_from_slice(&mon.record);
    let ot = layout.ot_names;
    section.bytes[ot..ot + NAME_LEN].copy_from_slice(&mon.ot_name);
    let nick = layout.nicknames;
    section.bytes[nick..nick + NAME_LEN].copy_from_slice(&mon.nickname);
    Ok(section)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_mon(generation: Generation, species: u8) -> SingleMon {
        let mut record = vec![species; generation.party_record_len()];
        record[0] = species;
        let mail = match generation {
            Generation::Gen2 => vec![0; MAIL_ENTRY_LEN],
            _ => Vec::new(),
        };
        SingleMon {
            species,
            record,
            ot_name: vec![0x80; NAME_LEN],
            nickname: vec![0x81; NAME_LEN],
            mail,
        }
    }

    fn section_with_party(species: &[u8]) -> PartySection {
        let generation = Generation::Gen2;
        let mut section = section_for_single(
            generation,
            &[0x80; NAME_LEN],
            0x1234,
            &sample_mon(generation, species[0]),
        )
        .unwrap();
        section.set_party_count(species.len());
        for (slot, &id) in species.iter().enumerate() {
            section.set_species_at(slot, id);
            section.core_at_mut(slot)[0] = id;
        }
        section
    }

    #[test]
    fn single_mon_round_trips_through_wire_bytes() {
        let mon = sample_mon(Generation::Gen2, 0xF9);
        let bytes = mon.to_bytes();
        assert_eq!(bytes.len(), SingleMon::wire_len(Generation::Gen2));
        let decoded = SingleMon::from_bytes(Generation::Gen2, &bytes).unwrap();
        assert_eq!(decoded, mon);
    }

    #[test]
    fn swap_with_last_preserves_size_and_order() {
        let mut section = section_with_party(&[0x01, 0x02, 0x03, 0x04]);
        let incoming = sample_mon(Generation::Gen2, 0x99);
        section.swap_with_last(1, &incoming).unwrap();

        assert_eq!(section.party_count(), 4);
        assert_eq!(section.species_at(0), 0x01);
        assert_eq!(section.species_at(1), 0x03);
        assert_eq!(section.species_at(2), 0x04);
        assert_eq!(section.species_at(3), 0x99);
        assert_eq!(section.core_at(3)[0], 0x99);
    }

    #[test]
    fn swap_rejects_slot_past_count() {
        let mut section = section_with_party(&[0x01, 0x02]);
        let incoming = sample_mon(Generation::Gen2, 0x99);
        let err = section.swap_with_last(2, &incoming).unwrap_err();
        assert!(matches!(err, PartyError::SlotOutOfRange { .. }));
    }

    #[test]
    fn trainer_id_reads_big_endian() {
        let section = section_with_party(&[0x01]);
        assert_eq!(section.trainer_id(), 0x1234);
    }

    #[test]
    fn move_refresh_rewrites_move_block() {
        let mut section = section_with_party(&[0x01]);
        section.apply_move_refresh(0, &[0x39, 0x3A, 0x00, 0x00], &[10, 10, 0, 0]);
        let record = section.core_at(0);
        assert_eq!(&record[2..6], &[0x39, 0x3A, 0x00, 0x00]);
        assert_eq!(&record[23..27], &[10, 10, 0, 0]);
    }

    #[test]
    fn egg_conversion_sets_sentinel_and_nickname() {
        let root = crate::test_harness::fixture_data_root();
        let tables =
            crate::data::StaticTables::load(root.path(), Generation::Gen2).unwrap();
        let mut section = section_with_party(&[0x01]);
        section.convert_to_egg(0, &tables, 10);
        assert_eq!(section.species_at(0), EGG_SENTINEL);
        assert_eq!(section.core_at(0)[27], 10);
        assert_eq!(&section.core_at(0)[34..36], &[0, 0]);
    }
}

//! Check variants and their dispatch context.

use crate::data::StaticTables;

const TEXT_TERMINATOR: u8 = 0x50;
const TEXT_NEWLINE: u8 = 0x4E;
const LIST_TERMINATOR: u8 = 0xFF;
const EGG_SENTINEL: u8 = 0xFD;
const DEFAULT_MOVE: u8 = 0x21; // Tackle
const DEFAULT_TEXT: u8 = 0xE6; // '?'

/// One check variant, indexed by the check-map byte at each position.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Check {
    Nothing,
    Text,
    TextNewline,
    TextFinal,
    TextFinalNoEnd,
    TeamSize,
    Species,
    SpeciesSpecial,
    SpeciesForceTerminate,
    Move,
    Item,
    Level,
    CheckHp,
    LoadStatExp,
    LoadStatIv,
    CheckStat,
    Pp,
    Experience,
    EggCyclesFriendship,
    Type,
    MailSpecies,
    MailItem,
    MailSameSpecies,
    PokemonPatchSet,
    MailPatchSet,
    JapaneseMailPatchSet,
}

impl Check {
    /// Maps a check-map byte to its variant; unknown indices check nothing.
    pub fn from_index(index: u8) -> Self {
        match index {
            0 => Check::Nothing,
            1 => Check::Text,
            2 => Check::TextNewline,
            3 => Check::TextFinal,
            4 => Check::TextFinalNoEnd,
            5 => Check::TeamSize,
            6 => Check::Species,
            7 => Check::SpeciesSpecial,
            8 => Check::SpeciesForceTerminate,
            9 => Check::Move,
            10 => Check::Item,
            11 => Check::Level,
            12 => Check::CheckHp,
            13 => Check::LoadStatExp,
            14 => Check::LoadStatIv,
            15 => Check::CheckStat,
            16 => Check::Pp,
            17 => Check::Experience,
            18 => Check::EggCyclesFriendship,
            19 => Check::Type,
            20 => Check::MailSpecies,
            21 => Check::MailItem,
            22 => Check::MailSameSpecies,
            23 => Check::PokemonPatchSet,
            24 => Check::MailPatchSet,
            25 => Check::JapaneseMailPatchSet,
            _ => Check::Nothing,
        }
    }
}

/// Accumulated walk state shared by every check in one pass.
pub struct CheckContext<'a> {
    tables: &'a StaticTables,
    team_size: u8,
    species: u8,
    species_list: Vec<u8>,
    species_slot: usize,
    moves: [u8; 4],
    move_index: usize,
    pp_index: usize,
    exp: u32,
    exp_positions: [usize; 3],
    exp_count: usize,
    stat_exp: [u16; 5],
    stat_exp_pending: Option<u8>,
    stat_exp_index: usize,
    ivs: [u8; 2],
    iv_count: usize,
    level: u8,
    hp_pending: Option<(usize, u8)>,
    stat_pending: Option<(usize, u8)>,
    stat_index: usize,
    patch_set: usize,
    mail_slot: usize,
}

impl<'a> CheckContext<'a> {
    pub fn new(tables: &'a StaticTables) -> Self {
        Self {
            tables,
            team_size: 1,
            species: 0,
            species_list: Vec::new(),
            species_slot: 0,
            moves: [0; 4],
            move_index: 0,
            pp_index: 0,
            exp: 0,
            exp_positions: [0; 3],
            exp_count: 0,
            stat_exp: [0; 5],
            stat_exp_pending: None,
            stat_exp_index: 0,
            ivs: [0; 2],
            iv_count: 0,
            level: 0,
            hp_pending: None,
            stat_pending: None,
            stat_index: 0,
            patch_set: 0,
            mail_slot: 0,
        }
    }

    /// Per-record accumulators restart when a new record's species byte
    /// is reached.
    fn start_record(&mut self, species: u8) {
        self.species = species;
        self.moves = [0; 4];
        self.move_index = 0;
        self.pp_index = 0;
        self.exp = 0;
        self.exp_count = 0;
        self.stat_exp = [0; 5];
        self.stat_exp_pending = None;
        self.stat_exp_index = 0;
        self.ivs = [0; 2];
        self.iv_count = 0;
        self.level = 0;
        self.hp_pending = None;
        self.stat_pending = None;
        self.stat_index = 0;
    }

    fn default_species(&self) -> u8 {
        match self.tables.generation {
            crate::data::Generation::Gen1 => 0xA5, // Rattata, internal id
            _ => 0x13,                             // Rattata, dex id
        }
    }

    fn clean_species(&self, value: u8) -> u8 {
        match &self.tables.sanity {
            Some(sanity) if sanity.bad_species.contains(value) => self.default_species(),
            _ => value,
        }
    }

    fn clean_move(&self, value: u8) -> u8 {
        if value == 0 {
            return 0;
        }
        match &self.tables.sanity {
            Some(sanity) if sanity.bad_moves.contains(value) => DEFAULT_MOVE,
            _ => value,
        }
    }

    fn clean_item(&self, value: u8) -> u8 {
        if value == 0 {
            return 0;
        }
        match &self.tables.sanity {
            Some(sanity) if sanity.bad_items.contains(value) => 0,
            _ => value,
        }
    }

    fn clean_text(&self, value: u8) -> u8 {
        match &self.tables.sanity {
            Some(sanity) if sanity.bad_text.contains(value) => DEFAULT_TEXT,
            _ => value,
        }
    }

    /// IV for a stat slot from the two packed DV bytes. HP is derived
    /// from the low bit of the other four.
    fn iv_for(&self, stat_index: usize) -> u8 {
        let attack = self.ivs[0] >> 4;
        let defense = self.ivs[0] & 0x0F;
        let speed = self.ivs[1] >> 4;
        let special = self.ivs[1] & 0x0F;
        match stat_index {
            0 => (attack & 1) << 3 | (defense & 1) << 2 | (speed & 1) << 1 | (special & 1),
            1 => attack,
            2 => defense,
            3 => speed,
            _ => special,
        }
    }

    fn stat_bounds(&self, stat_index: usize) -> (u16, u16) {
        let base = self.tables.base_stats(self.species as u16);
        let base = base.get(stat_index).copied().unwrap_or(0);
        let level = if self.level == 0 { 100 } else { self.level };
        let is_hp = stat_index == 0;
        let min = gen12_stat(base, 0, 0, 2, is_hp);
        let max = gen12_stat(base, 15, u16::MAX, level.max(2), is_hp);
        (min, max)
    }
}

/// Gen 1/2 stat formula: `((base + iv) * 2 + sqrt(statexp)/4) * level / 100`
/// plus `level + 10` for HP, `5` otherwise.
fn gen12_stat(base: u8, iv: u8, stat_exp: u16, level: u8, is_hp: bool) -> u16 {
    let core = (u32::from(base) + u32::from(iv)) * 2 + u32::from(isqrt(stat_exp)) / 4;
    let scaled = core * u32::from(level) / 100;
    let bonus = if is_hp { u32::from(level) + 10 } else { 5 };
    (scaled + bonus).min(u32::from(u16::MAX)) as u16
}

fn isqrt(value: u16) -> u16 {
    let mut root = 0u32;
    let value = u32::from(value);
    while (root + 1) * (root + 1) <= value {
        root += 1;
    }
    root as u16
}

impl Check {
    /// Applies this check at `pos`, substituting in place and updating
    /// the walk context.
    pub fn apply(self, ctx: &mut CheckContext<'_>, buf: &mut [u8], pos: usize) {
        let value = buf[pos];
        match self {
            Check::Nothing | Check::EggCyclesFriendship | Check::Type => {}

            Check::Text => buf[pos] = ctx.clean_text(value),
            Check::TextNewline => {
                if value != TEXT_NEWLINE {
                    buf[pos] = ctx.clean_text(value);
                }
            }
            Check::TextFinal => {
                if value != TEXT_TERMINATOR {
                    buf[pos] = TEXT_TERMINATOR;
                }
            }
            Check::TextFinalNoEnd => {
                if value != TEXT_TERMINATOR {
                    buf[pos] = ctx.clean_text(value);
                }
            }

            Check::TeamSize => {
                let size = value.clamp(1, 6);
                buf[pos] = size;
                ctx.team_size = size;
            }
            Check::Species => {
                let cleaned = ctx.clean_species(value);
                buf[pos] = cleaned;
                ctx.start_record(cleaned);
            }
            Check::SpeciesSpecial => {
                if ctx.species_slot >= usize::from(ctx.team_size) {
                    buf[pos] = LIST_TERMINATOR;
                } else if value != LIST_TERMINATOR && value != EGG_SENTINEL {
                    buf[pos] = ctx.clean_species(value);
                }
                if buf[pos] != LIST_TERMINATOR {
                    ctx.species_list.push(buf[pos]);
                    ctx.species_slot += 1;
                }
            }
            Check::SpeciesForceTerminate => buf[pos] = LIST_TERMINATOR,

            Check::Move => {
                let cleaned = ctx.clean_move(value);
                buf[pos] = cleaned;
                ctx.moves[ctx.move_index % 4] = cleaned;
                ctx.move_index += 1;
            }
            Check::Item => buf[pos] = ctx.clean_item(value),

            Check::Level => {
                let level = if ctx.exp_count == 3 {
                    ctx.tables.level_from_exp(ctx.species as u16, ctx.exp)
                } else {
                    value.clamp(2, 100)
                };
                buf[pos] = level;
                ctx.level = level;
            }

            Check::CheckHp => match ctx.hp_pending.take() {
                None => ctx.hp_pending = Some((pos, value)),
                Some((high_pos, high)) => {
                    let current = u16::from_be_bytes([high, value]);
                    let base = ctx.tables.base_stats(ctx.species as u16)[0];
                    let level = if ctx.level == 0 { 100 } else { ctx.level };
                    let max =
                        gen12_stat(base, ctx.iv_for(0), ctx.stat_exp[0], level.max(2), true);
                    let clamped = current.min(max);
                    let bytes = clamped.to_be_bytes();
                    buf[high_pos] = bytes[0];
                    buf[pos] = bytes[1];
                }
            },

            Check::LoadStatExp => match ctx.stat_exp_pending.take() {
                None => ctx.stat_exp_pending = Some(value),
                Some(high) => {
                    let index = ctx.stat_exp_index % 5;
                    ctx.stat_exp[index] = u16::from_be_bytes([high, value]);
                    ctx.stat_exp_index += 1;
                }
            },
            Check::LoadStatIv => {
                ctx.ivs[ctx.iv_count % 2] = value;
                ctx.iv_count += 1;
            }
            Check::CheckStat => match ctx.stat_pending.take() {
                None => ctx.stat_pending = Some((pos, value)),
                Some((high_pos, high)) => {
                    let stat = u16::from_be_bytes([high, value]);
                    let (min, max) = ctx.stat_bounds(ctx.stat_index);
                    let clamped = stat.clamp(min, max);
                    let bytes = clamped.to_be_bytes();
                    buf[high_pos] = bytes[0];
                    buf[pos] = bytes[1];
                    ctx.stat_index += 1;
                }
            },

            Check::Pp => {
                let ups = value >> 6;
                let remaining = value & 0x3F;
                let move_id = ctx.moves[ctx.pp_index % 4];
                ctx.pp_index += 1;
                let base = ctx.tables.base_pp(move_id);
                // 40-PP moves gain 7 per up; the 6-bit field caps at 61.
                let per_up = if base == 40 { 7 } else { base / 5 };
                let max = base.saturating_add(per_up * ups);
                buf[pos] = (ups << 6) | remaining.min(max);
            }

            Check::Experience => {
                if ctx.exp_count == 3 {
                    // A later exp field restarts the accumulator.
                    ctx.exp = 0;
                    ctx.exp_count = 0;
                }
                ctx.exp = (ctx.exp << 8) | u32::from(value);
                ctx.exp_positions[ctx.exp_count] = pos;
                ctx.exp_count += 1;
                if ctx.exp_count == 3 {
                    let cap = ctx.tables.exp_for_level(ctx.species as u16, 100);
                    if cap > 0 && ctx.exp > cap {
                        ctx.exp = cap;
                        let bytes = ctx.exp.to_be_bytes();
                        buf[ctx.exp_positions[0]] = bytes[1];
                        buf[ctx.exp_positions[1]] = bytes[2];
                        buf[ctx.exp_positions[2]] = bytes[3];
                    }
                }
            }

            Check::MailSpecies => {
                if value != 0 {
                    buf[pos] = ctx.clean_species(value);
                }
            }
            Check::MailItem => buf[pos] = ctx.clean_item(value),
            Check::MailSameSpecies => {
                let expected = ctx.species_list.get(ctx.mail_slot).copied();
                ctx.mail_slot += 1;
                if let Some(expected) = expected {
                    if value != expected && value != 0 {
                        buf[pos] = expected;
                    }
                }
            }

            Check::PokemonPatchSet => {
                let Some(gen12) = &ctx.tables.gen12 else {
                    return;
                };
                if value == LIST_TERMINATOR {
                    ctx.patch_set = (ctx.patch_set + 1).min(1);
                } else if !gen12.patch_set_pokemon[ctx.patch_set].contains(value) {
                    buf[pos] = 0x00;
                }
            }
            Check::MailPatchSet => {
                let Some(gen12) = &ctx.tables.gen12 else {
                    return;
                };
                if value != LIST_TERMINATOR && !gen12.patch_set_mail.contains(value) {
                    buf[pos] = 0x00;
                }
            }
            Check::JapaneseMailPatchSet => {
                let Some(japanese) = &ctx.tables.japanese else {
                    return;
                };
                if value != LIST_TERMINATOR && !japanese.mail_patch_set.contains(value) {
                    buf[pos] = 0x00;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Generation, StaticTables};

    fn tables() -> StaticTables {
        let root = crate::test_harness::fixture_data_root();
        StaticTables::load(root.path(), Generation::Gen2).unwrap()
    }

    #[test]
    fn check_indices_cover_all_variants() {
        for index in 0u8..26 {
            let check = Check::from_index(index);
            if index == 0 {
                assert_eq!(check, Check::Nothing);
            } else {
                assert_ne!(check, Check::Nothing, "index {index}");
            }
        }
        assert_eq!(Check::from_index(200), Check::Nothing);
    }

    #[test]
    fn team_size_clamps_to_party_bounds() {
        let tables = tables();
        let mut ctx = CheckContext::new(&tables);
        let mut buf = [0u8];
        Check::TeamSize.apply(&mut ctx, &mut buf, 0);
        assert_eq!(buf[0], 1);
        buf[0] = 9;
        Check::TeamSize.apply(&mut ctx, &mut buf, 0);
        assert_eq!(buf[0], 6);
    }

    #[test]
    fn species_list_terminates_past_team_size() {
        let tables = tables();
        let mut ctx = CheckContext::new(&tables);
        let mut buf = [2u8, 0x13, 0x14, 0x15];
        Check::TeamSize.apply(&mut ctx, &mut buf, 0);
        Check::SpeciesSpecial.apply(&mut ctx, &mut buf, 1);
        Check::SpeciesSpecial.apply(&mut ctx, &mut buf, 2);
        Check::SpeciesSpecial.apply(&mut ctx, &mut buf, 3);
        assert_eq!(buf, [2, 0x13, 0x14, 0xFF]);
    }

    #[test]
    fn pp_clamps_to_base_plus_ups() {
        let tables = tables();
        let mut ctx = CheckContext::new(&tables);
        // Move 33 has base PP 35 in the fixture tables.
        let mut buf = [33u8, 0xFF];
        Check::Move.apply(&mut ctx, &mut buf, 0);
        Check::Pp.apply(&mut ctx, &mut buf, 1);
        let ups = buf[1] >> 6;
        let remaining = buf[1] & 0x3F;
        assert_eq!(ups, 3);
        assert_eq!(remaining, 35 + (35 / 5) * 3);
    }

    #[test]
    fn forty_pp_moves_gain_seven_per_up() {
        let tables = tables();
        let mut ctx = CheckContext::new(&tables);
        // Move 16 has base PP 40 in the fixture tables.
        let mut buf = [16u8, 0xFF];
        Check::Move.apply(&mut ctx, &mut buf, 0);
        Check::Pp.apply(&mut ctx, &mut buf, 1);
        assert_eq!(buf[1] & 0x3F, 61);
    }

    #[test]
    fn experience_caps_at_level_100() {
        let tables = tables();
        let mut ctx = CheckContext::new(&tables);
        let mut buf = [0x13, 0xFF, 0xFF, 0xFF];
        Check::Species.apply(&mut ctx, &mut buf, 0);
        Check::Experience.apply(&mut ctx, &mut buf, 1);
        Check::Experience.apply(&mut ctx, &mut buf, 2);
        Check::Experience.apply(&mut ctx, &mut buf, 3);
        let cap = tables.exp_for_level(0x13, 100);
        let exp = u32::from_be_bytes([0, buf[1], buf[2], buf[3]]);
        assert_eq!(exp, cap);
    }

    #[test]
    fn patch_set_conformance_replaces_non_members() {
        let tables = tables();
        let mut ctx = CheckContext::new(&tables);
        let member = 0x01;
        let mut buf = [member, 0xFE, 0xFF, 0xFE];
        Check::PokemonPatchSet.apply(&mut ctx, &mut buf, 0);
        Check::PokemonPatchSet.apply(&mut ctx, &mut buf, 1);
        Check::PokemonPatchSet.apply(&mut ctx, &mut buf, 2);
        Check::PokemonPatchSet.apply(&mut ctx, &mut buf, 3);
        // 0xFE is never a set member; 0xFF advances to the next set.
        assert_eq!(buf, [member, 0x00, 0xFF, 0x00]);
    }
}

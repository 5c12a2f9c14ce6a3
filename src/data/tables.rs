//! Binary table parsers.

use std::path::Path;

use super::{read, DataError, Generation};

/// 256-wide membership bitmap built from a byte-list file.
#[derive(Clone)]
pub struct IdBitmap {
    bits: [bool; 256],
}

impl IdBitmap {
    pub fn from_member_list(members: &[u8]) -> Self {
        let mut bits = [false; 256];
        for &member in members {
            bits[member as usize] = true;
        }
        Self { bits }
    }

    pub fn contains(&self, value: u8) -> bool {
        self.bits[value as usize]
    }
}

impl std::fmt::Debug for IdBitmap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self.bits.iter().filter(|bit| **bit).count();
        write!(f, "IdBitmap({count} set)")
    }
}

/// One trade-evolution rule: `species` evolves into `target`, gated on
/// a held item when `required_item` is nonzero.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EvolutionRule {
    pub species: u8,
    pub required_item: u8,
    pub target: u8,
}

impl EvolutionRule {
    pub fn trigger_matches(&self, held_item: u8) -> bool {
        self.required_item == 0 || self.required_item == held_item
    }
}

/// Bad-ID bitmaps and position-indexed check maps. Absence of any file
/// in this group turns sanity checking off entirely.
#[derive(Debug)]
pub struct SanityTables {
    pub bad_items: IdBitmap,
    pub bad_moves: IdBitmap,
    pub bad_species: IdBitmap,
    pub bad_text: IdBitmap,
    /// One check-index byte per section position, split per section.
    pub section_checks: Vec<Vec<u8>>,
    pub single_checks: Vec<u8>,
    pub moves_checks: Vec<u8>,
}

#[derive(Debug)]
pub struct Gen12Tables {
    pub patch_set_pokemon: [IdBitmap; 2],
    pub patch_set_mail: IdBitmap,
    /// Mail section carrying no mail, fed when the shortcut applies.
    pub no_mail_section: Vec<u8>,
    pub base_random_section: Vec<u8>,
    pub evolutions: Vec<EvolutionRule>,
    /// Species that learn a move on trade evolution.
    pub learnset_evos: IdBitmap,
    /// Full default party used as ghost data in buffered mode.
    pub base_party: Option<Vec<u8>>,
}

#[derive(Debug)]
pub struct Gen3Tables {
    /// Indexed by u16 species id.
    pub invalid_species: Vec<bool>,
    pub invalid_items: Vec<bool>,
    /// Species → (first ability, second ability).
    pub abilities: Vec<[u8; 2]>,
    pub base_party: Vec<u8>,
    pub base_pool: Vec<u8>,
}

impl Gen3Tables {
    pub fn species_valid(&self, species: u16) -> bool {
        !self
            .invalid_species
            .get(species as usize)
            .copied()
            .unwrap_or(true)
    }

    pub fn item_valid(&self, item: u16) -> bool {
        item == 0
            || !self
                .invalid_items
                .get(item as usize)
                .copied()
                .unwrap_or(true)
    }

    pub fn abilities_for(&self, species: u16) -> [u8; 2] {
        self.abilities
            .get(species as usize)
            .copied()
            .unwrap_or([0, 0])
    }
}

#[derive(Debug)]
pub struct JapaneseTables {
    pub mail_en_to_jp: [u8; 256],
    pub mail_jp_to_en: [u8; 256],
    pub mail_checks: Vec<u8>,
    pub mail_patch_set: IdBitmap,
}

pub(super) fn parse_stats(raw: &[u8]) -> Vec<[u8; 6]> {
    raw.chunks_exact(6)
        .map(|chunk| {
            let mut stats = [0u8; 6];
            stats.copy_from_slice(chunk);
            stats
        })
        .collect()
}

pub(super) fn parse_exp_curves(path: &Path, text: &str) -> Result<Vec<Vec<u32>>, DataError> {
    let values: Result<Vec<u32>, _> = text.split_whitespace().map(str::parse).collect();
    let values =
        values.map_err(|e| DataError::malformed(path, format!("bad exp value: {e}")))?;
    if values.is_empty() || values.len() % 100 != 0 {
        return Err(DataError::malformed(
            path,
            format!("expected a multiple of 100 entries, got {}", values.len()),
        ));
    }
    Ok(values.chunks_exact(100).map(<[u32]>::to_vec).collect())
}

fn parse_evolutions(path: &Path, raw: &[u8]) -> Result<Vec<EvolutionRule>, DataError> {
    if raw.len() % 3 != 0 {
        return Err(DataError::malformed(
            path,
            format!("expected 3-byte triples, got {} bytes", raw.len()),
        ));
    }
    Ok(raw
        .chunks_exact(3)
        .map(|triple| EvolutionRule {
            species: triple[0],
            required_item: triple[1],
            target: triple[2],
        })
        .collect())
}

fn parse_u16_list(raw: &[u8]) -> Vec<u16> {
    raw.chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect()
}

fn invalid_flags(ids: &[u16]) -> Vec<bool> {
    let max = ids.iter().copied().max().unwrap_or(0) as usize;
    let mut flags = vec![false; max + 1];
    for &id in ids {
        flags[id as usize] = true;
    }
    flags
}

pub(super) fn load_sanity(dir: &Path, generation: Generation) -> Result<SanityTables, DataError> {
    let bad_items = IdBitmap::from_member_list(&read(&dir.join("bad_ids_items.bin"))?);
    let bad_moves = IdBitmap::from_member_list(&read(&dir.join("bad_ids_moves.bin"))?);
    let bad_species = IdBitmap::from_member_list(&read(&dir.join("bad_ids_pokemon.bin"))?);
    let bad_text = IdBitmap::from_member_list(&read(&dir.join("bad_ids_text.bin"))?);

    let checks_path = dir.join("checks_map.bin");
    let checks_map = read(&checks_path)?;
    let lengths = generation.section_lengths();
    let expected: usize = lengths.iter().sum();
    if checks_map.len() != expected {
        return Err(DataError::malformed(
            &checks_path,
            format!("expected {expected} check bytes, got {}", checks_map.len()),
        ));
    }
    let mut section_checks = Vec::with_capacity(lengths.len());
    let mut offset = 0;
    for &length in lengths {
        section_checks.push(checks_map[offset..offset + length].to_vec());
        offset += length;
    }

    Ok(SanityTables {
        bad_items,
        bad_moves,
        bad_species,
        bad_text,
        section_checks,
        single_checks: read(&dir.join("single_pokemon_checks_map.bin"))?,
        moves_checks: read(&dir.join("moves_checks_map.bin"))?,
    })
}

pub(super) fn load_gen12(dir: &Path) -> Result<Gen12Tables, DataError> {
    let patch_set_pokemon = [
        IdBitmap::from_member_list(&read(&dir.join("pokemon_patch_set_0.bin"))?),
        IdBitmap::from_member_list(&read(&dir.join("pokemon_patch_set_1.bin"))?),
    ];
    let patch_set_mail = IdBitmap::from_member_list(&read(&dir.join("mail_patch_set.bin"))?);
    let evolutions_path = dir.join("evolution_ids.bin");
    let evolutions = parse_evolutions(&evolutions_path, &read(&evolutions_path)?)?;

    Ok(Gen12Tables {
        patch_set_pokemon,
        patch_set_mail,
        no_mail_section: read(&dir.join("no_mail_section.bin"))?,
        base_random_section: read(&dir.join("base_random_section.bin"))?,
        evolutions,
        learnset_evos: IdBitmap::from_member_list(&read(&dir.join("learnset_evos.bin"))?),
        base_party: read(&dir.join("base.bin")).ok(),
    })
}

pub(super) fn load_gen3(dir: &Path) -> Result<Gen3Tables, DataError> {
    let invalid_species = invalid_flags(&parse_u16_list(&read(&dir.join("invalid_pokemon.bin"))?));
    let invalid_items = invalid_flags(&parse_u16_list(&read(&dir.join("invalid_held_items.bin"))?));
    let abilities = read(&dir.join("abilities.bin"))?
        .chunks_exact(2)
        .map(|pair| [pair[0], pair[1]])
        .collect();

    Ok(Gen3Tables {
        invalid_species,
        invalid_items,
        abilities,
        base_party: read(&dir.join("base.bin"))?,
        base_pool: read(&dir.join("base_pool.bin"))?,
    })
}

pub(super) fn load_japanese(dir: &Path) -> Result<JapaneseTables, DataError> {
    let en_path = dir.join("mail_conversion_table_en_to_jp.bin");
    let jp_path = dir.join("mail_conversion_table_jp_to_en.bin");
    let mail_en_to_jp = translation_table(&en_path, &read(&en_path)?)?;
    let mail_jp_to_en = translation_table(&jp_path, &read(&jp_path)?)?;

    Ok(JapaneseTables {
        mail_en_to_jp,
        mail_jp_to_en,
        mail_checks: read(&dir.join("mail_checks_jp.bin"))?,
        mail_patch_set: IdBitmap::from_member_list(&read(
            &dir.join("japanese_mail_patch_set.bin"),
        )?),
    })
}

fn translation_table(path: &Path, raw: &[u8]) -> Result<[u8; 256], DataError> {
    let table: [u8; 256] = raw
        .try_into()
        .map_err(|_| DataError::malformed(path, format!("expected 256 bytes, got {}", raw.len())))?;
    Ok(table)
}

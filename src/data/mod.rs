//! Static table loading.
//!
//! Everything the mediator consults at runtime — base stats, EXP
//! curves, bad-ID bitmaps, check maps, patch-set membership, section
//! templates, text tables — is parsed once from the data root into an
//! immutable [`StaticTables`] value and held by reference thereafter.

mod tables;
pub mod text;

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

pub use tables::{
    EvolutionRule, Gen3Tables, Gen12Tables, IdBitmap, JapaneseTables, SanityTables,
};
pub use text::TextTable;

/// Cartridge generation the session is driving.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Generation {
    Gen1,
    Gen2,
    Gen3,
}

impl Generation {
    /// Fixed per-generation section lengths, in exchange order.
    pub fn section_lengths(self) -> &'static [usize] {
        match self {
            Generation::Gen1 => &[10, 418, 197],
            Generation::Gen2 => &[10, 444, 197, 385],
            Generation::Gen3 => &[0x380],
        }
    }

    /// Subdirectory of the data root holding this generation's tables.
    pub fn data_dir(self) -> &'static str {
        match self {
            Generation::Gen1 => "rby",
            Generation::Gen2 => "gsc",
            Generation::Gen3 => "rse",
        }
    }

    /// Single-character tag suffix used on peer message tags.
    pub fn tag_suffix(self) -> u8 {
        match self {
            Generation::Gen1 => b'1',
            Generation::Gen2 => b'2',
            Generation::Gen3 => b'3',
        }
    }

    pub fn party_record_len(self) -> usize {
        match self {
            Generation::Gen1 => 44,
            Generation::Gen2 => 48,
            Generation::Gen3 => 100,
        }
    }
}

impl std::fmt::Display for Generation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Generation::Gen1 => write!(f, "gen1"),
            Generation::Gen2 => write!(f, "gen2"),
            Generation::Gen3 => write!(f, "gen3"),
        }
    }
}

#[derive(Debug, Error)]
pub enum DataError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed table {path}: {reason}")]
    Malformed { path: PathBuf, reason: String },
}

impl DataError {
    fn malformed(path: &Path, reason: impl Into<String>) -> Self {
        DataError::Malformed {
            path: path.to_path_buf(),
            reason: reason.into(),
        }
    }
}

/// All tables for one generation, loaded once at startup.
#[derive(Debug)]
pub struct StaticTables {
    pub generation: Generation,
    /// Base stats, six bytes per species, index 0 unused.
    pub stats: Vec<[u8; 6]>,
    /// Species → EXP group id.
    pub exp_groups: Vec<u8>,
    /// Per-group cumulative EXP required for each level 1..=100.
    pub exp_curves: Vec<Vec<u32>>,
    /// ASCII species names for log lines.
    pub names: Vec<String>,
    /// Move id → base PP.
    pub moves_pp: Vec<u8>,
    /// Nickname bytes written onto converted eggs.
    pub egg_nick: Vec<u8>,
    pub text: TextTable,
    /// Bad-ID bitmaps and check maps; `None` disables sanity checks.
    pub sanity: Option<SanityTables>,
    pub gen12: Option<Gen12Tables>,
    pub gen3: Option<Gen3Tables>,
    /// Japanese cartridge support; `None` turns the feature off.
    pub japanese: Option<JapaneseTables>,
}

impl StaticTables {
    /// Loads the table set for `generation` from `data_root`.
    ///
    /// Required tables fail the load; the sanity-check and Japanese
    /// table groups degrade to `None` when any of their files is
    /// missing.
    pub fn load(data_root: &Path, generation: Generation) -> Result<Self, DataError> {
        let dir = data_root.join(generation.data_dir());

        let stats = tables::parse_stats(&read(&dir.join("stats.bin"))?);
        let exp_groups = read(&dir.join("pokemon_exp_groups.bin"))?;
        let exp_curves = tables::parse_exp_curves(
            &dir.join("pokemon_exp.txt"),
            &read_text(&dir.join("pokemon_exp.txt"))?,
        )?;
        let names = read_text(&dir.join("pokemon_names.txt"))?
            .lines()
            .map(|line| line.trim_end().to_string())
            .collect();
        let moves_pp = read(&dir.join("moves_pp_list.bin"))?;
        let egg_nick = read(&dir.join("egg_nick.bin"))?;
        let text = TextTable::parse(&dir.join("text_conv.txt"), &read_text(&dir.join("text_conv.txt"))?)?;

        let (sanity, gen12, gen3) = match generation {
            Generation::Gen1 | Generation::Gen2 => {
                let sanity = tables::load_sanity(&dir, generation).ok();
                let gen12 = tables::load_gen12(&dir)?;
                (sanity, Some(gen12), None)
            }
            Generation::Gen3 => {
                let gen3 = tables::load_gen3(&dir)?;
                (None, None, Some(gen3))
            }
        };

        let japanese = match generation {
            Generation::Gen1 | Generation::Gen2 => tables::load_japanese(&dir).ok(),
            Generation::Gen3 => None,
        };

        Ok(Self {
            generation,
            stats,
            exp_groups,
            exp_curves,
            names,
            moves_pp,
            egg_nick,
            text,
            sanity,
            gen12,
            gen3,
            japanese,
        })
    }

    pub fn sanity_enabled(&self) -> bool {
        self.sanity.is_some()
    }

    /// Base stats for `species`, or zeroes when out of range.
    pub fn base_stats(&self, species: u16) -> [u8; 6] {
        self.stats.get(species as usize).copied().unwrap_or([0; 6])
    }

    pub fn base_pp(&self, move_id: u8) -> u8 {
        self.moves_pp.get(move_id as usize).copied().unwrap_or(0)
    }

    /// Species name for log lines; falls back to the raw index.
    pub fn species_name(&self, species: u16) -> String {
        self.names
            .get(species as usize)
            .filter(|name| !name.is_empty())
            .cloned()
            .unwrap_or_else(|| format!("#{species:03}"))
    }

    /// Level reached with `exp` on this species' curve, clamped to [2, 100].
    ///
    /// Binary search over the cumulative curve: the level is the last
    /// entry whose requirement does not exceed `exp`.
    pub fn level_from_exp(&self, species: u16, exp: u32) -> u8 {
        let group = self
            .exp_groups
            .get(species as usize)
            .copied()
            .unwrap_or(0) as usize;
        let Some(curve) = self.exp_curves.get(group) else {
            return 2;
        };
        let level = match curve.binary_search(&exp) {
            Ok(index) => index + 1,
            Err(index) => index,
        };
        level.clamp(2, 100) as u8
    }

    /// Cumulative EXP required for `level` on this species' curve.
    pub fn exp_for_level(&self, species: u16, level: u8) -> u32 {
        let group = self
            .exp_groups
            .get(species as usize)
            .copied()
            .unwrap_or(0) as usize;
        self.exp_curves
            .get(group)
            .and_then(|curve| curve.get(level.clamp(1, 100) as usize - 1))
            .copied()
            .unwrap_or(0)
    }

    /// Whether `species` may evolve or learn a move when traded.
    pub fn is_special_mon(&self, species: u8, held_item: u8) -> bool {
        let Some(gen12) = &self.gen12 else {
            return false;
        };
        if gen12.learnset_evos.contains(species) {
            return true;
        }
        gen12
            .evolutions
            .iter()
            .any(|rule| rule.species == species && rule.trigger_matches(held_item))
    }
}

fn read(path: &Path) -> Result<Vec<u8>, DataError> {
    fs::read(path).map_err(|source| DataError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn read_text(path: &Path) -> Result<String, DataError> {
    fs::read_to_string(path).map_err(|source| DataError::Io {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn section_lengths_match_generation() {
        assert_eq!(Generation::Gen1.section_lengths(), &[10, 418, 197]);
        assert_eq!(Generation::Gen2.section_lengths(), &[10, 444, 197, 385]);
        assert_eq!(Generation::Gen3.section_lengths(), &[0x380]);
    }

    #[test]
    fn tables_load_from_fixture_root() {
        let root = crate::test_harness::fixture_data_root();
        let tables = StaticTables::load(root.path(), Generation::Gen2).unwrap();
        assert!(tables.sanity_enabled());
        assert!(tables.gen12.is_some());
        assert_eq!(tables.base_pp(33), 35);
    }

    #[test]
    fn level_from_exp_clamps_and_searches() {
        let root = crate::test_harness::fixture_data_root();
        let tables = StaticTables::load(root.path(), Generation::Gen2).unwrap();
        assert_eq!(tables.level_from_exp(19, 0), 2);
        let exp_50 = tables.exp_for_level(19, 50);
        assert_eq!(tables.level_from_exp(19, exp_50), 50);
        assert_eq!(tables.level_from_exp(19, u32::MAX), 100);
    }
}

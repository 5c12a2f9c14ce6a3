//! Position-indexed section sanitizers.
//!
//! A section is validated by walking it against a check map: one byte
//! per position, each indexing a check variant. Checks substitute, they
//! never reject; with sanity tables absent every check is the identity.

mod checks;

pub use checks::{Check, CheckContext};

use tracing::debug;

use crate::data::StaticTables;

/// Section/record sanitizer over the loaded check maps.
pub struct Validator<'a> {
    tables: &'a StaticTables,
}

impl<'a> Validator<'a> {
    pub fn new(tables: &'a StaticTables) -> Self {
        Self { tables }
    }

    /// Sanitizes one party section in place.
    pub fn sanitize_section(&self, section_index: usize, buf: &mut [u8]) {
        let Some(sanity) = &self.tables.sanity else {
            return;
        };
        let Some(map) = sanity.section_checks.get(section_index) else {
            return;
        };
        self.run(map, buf);
    }

    /// Sanitizes a peer-sent single-Pokémon record in place.
    pub fn sanitize_single(&self, buf: &mut [u8]) {
        let Some(sanity) = &self.tables.sanity else {
            return;
        };
        self.run(&sanity.single_checks, buf);
    }

    /// Sanitizes a moves+PP refresh payload in place.
    pub fn sanitize_moves(&self, buf: &mut [u8]) {
        let Some(sanity) = &self.tables.sanity else {
            return;
        };
        self.run(&sanity.moves_checks, buf);
    }

    fn run(&self, map: &[u8], buf: &mut [u8]) {
        let mut ctx = CheckContext::new(self.tables);
        let len = map.len().min(buf.len());
        for pos in 0..len {
            let check = Check::from_index(map[pos]);
            let before = buf[pos];
            check.apply(&mut ctx, buf, pos);
            if buf[pos] != before {
                debug!(
                    pos,
                    check = ?check,
                    before = format_args!("{before:#04x}"),
                    after = format_args!("{:#04x}", buf[pos]),
                    "sanitized byte"
                );
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
    fn sanitize_is_identity_without_sanity_tables() {
        let mut tables = tables();
        tables.sanity = None;
        let validator = Validator::new(&tables);
        let mut buf = vec![0xEE; 16];
        let want = buf.clone();
        validator.sanitize_section(1, &mut buf);
        assert_eq!(buf, want);
    }

    #[test]
    fn sanitize_section_is_idempotent() {
        let tables = tables();
        let validator = Validator::new(&tables);
        let mut buf: Vec<u8> = (0..=255u8).cycle().take(444).collect();
        validator.sanitize_section(1, &mut buf);
        let once = buf.clone();
        validator.sanitize_section(1, &mut buf);
        assert_eq!(buf, once);
    }

    #[test]
    fn bad_species_substitutes_default() {
        let tables = tables();
        let validator = Validator::new(&tables);
        // Single-Pokémon map in the fixture starts with a species check.
        let mut buf = vec![0u8; tables.sanity.as_ref().unwrap().single_checks.len()];
        buf[0] = 0xEE;
        validator.sanitize_single(&mut buf);
        assert_eq!(buf[0], 0x13);
    }
}

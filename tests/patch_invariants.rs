//! Patch and validator invariants over whole sections.

use tradelink::data::{Generation, StaticTables};
use tradelink::party::{apply_patch_list, create_patch_list};
use tradelink::test_harness::fixture_data_root;
use tradelink::validate::Validator;

fn pseudo_random_section(len: usize, seed: u8) -> Vec<u8> {
    let mut state = seed;
    (0..len)
        .map(|_| {
            state = state.wrapping_mul(197).wrapping_add(91);
            state
        })
        .collect()
}

#[test]
fn patch_round_trip_over_generated_sections() {
    for seed in 0..16u8 {
        let mut section = pseudo_random_section(444, seed);
        // Force escape bytes at the page edges and in the middle.
        section[0] = 0xFE;
        section[0xFB] = 0xFE;
        section[0xFC] = 0xFE;
        section[443] = 0xFE;
        let original = section.clone();

        let list = create_patch_list(&mut section);
        assert!(
            !section.contains(&0xFE),
            "escaped section still carries 0xFE (seed {seed})"
        );
        assert_eq!(section.len(), original.len());

        apply_patch_list(&mut section, &list);
        assert_eq!(section, original, "round trip failed for seed {seed}");
    }
}

#[test]
fn section_lengths_are_preserved_by_sanitizing() {
    let root = fixture_data_root();
    let tables = StaticTables::load(root.path(), Generation::Gen2).unwrap();
    let validator = Validator::new(&tables);

    for (index, &length) in Generation::Gen2.section_lengths().iter().enumerate() {
        let mut section = pseudo_random_section(length, index as u8);
        validator.sanitize_section(index, &mut section);
        assert_eq!(section.len(), length);
    }
}

#[test]
fn validator_is_idempotent_across_sections() {
    let root = fixture_data_root();
    let tables = StaticTables::load(root.path(), Generation::Gen2).unwrap();
    let validator = Validator::new(&tables);

    for (index, &length) in Generation::Gen2.section_lengths().iter().enumerate() {
        for seed in [0u8, 7, 42, 0xFD] {
            let mut section = pseudo_random_section(length, seed);
            validator.sanitize_section(index, &mut section);
            let once = section.clone();
            validator.sanitize_section(index, &mut section);
            assert_eq!(section, once, "section {index} seed {seed}");
        }
    }
}

#[test]
fn gen1_tables_load_without_japanese_support() {
    let root = fixture_data_root();
    let tables = StaticTables::load(root.path(), Generation::Gen1).unwrap();
    assert!(tables.japanese.is_none());
    assert!(tables.sanity_enabled());
    assert_eq!(Generation::Gen1.section_lengths(), &[10, 418, 197]);
}

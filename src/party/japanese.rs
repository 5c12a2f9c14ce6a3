//! Japanese ↔ International party conversion.
//!
//! Japanese cartridges use 6-byte name fields where the International
//! format expects 11. Ingest widens every name field with 0x50 padding;
//! egress removes the same bytes again. Mail bodies additionally pass
//! through byte-translation tables.

use crate::data::text::TERMINATOR_GB;
use crate::data::Generation;

use super::gen12::{JP_NAME_LEN, MAX_PARTY, NAME_LEN};

/// Name fields in a Pokémon section: trader name, six OT names, six
/// nicknames.
const NAME_FIELDS: usize = 1 + MAX_PARTY * 2;

/// Length of the Japanese variant of the Pokémon section.
pub fn jp_section_len(generation: Generation) -> usize {
    generation.section_lengths()[1] - NAME_FIELDS * (NAME_LEN - JP_NAME_LEN)
}

/// Widens one 6-byte Japanese name field to the 11-byte International
/// form by padding with 0x50.
pub fn widen_name(jp: &[u8]) -> [u8; NAME_LEN] {
    let mut out = [TERMINATOR_GB; NAME_LEN];
    let len = jp.len().min(JP_NAME_LEN);
    out[..len].copy_from_slice(&jp[..len]);
    out
}

/// Narrows an 11-byte International name field back to 6 bytes,
/// keeping the visible characters and forcing a terminator.
pub fn narrow_name(intl: &[u8]) -> [u8; JP_NAME_LEN] {
    let mut out = [TERMINATOR_GB; JP_NAME_LEN];
    let len = (JP_NAME_LEN - 1).min(intl.len());
    out[..len].copy_from_slice(&intl[..len]);
    out[JP_NAME_LEN - 1] = TERMINATOR_GB;
    out
}

/// Rebuilds a Japanese Pokémon section in the International layout.
pub fn widen_party_section(generation: Generation, jp: &[u8]) -> Vec<u8> {
    let record_len = generation.party_record_len();
    let intl_len = generation.section_lengths()[1];
    let mut out = Vec::with_capacity(intl_len);

    let mut cursor = 0;
    out.extend_from_slice(&widen_name(&jp[..JP_NAME_LEN]));
    cursor += JP_NAME_LEN;

    // Count, species list, trainer id and the record block are shared.
    let fixed = 1 + (MAX_PARTY + 1) + 2 + record_len * MAX_PARTY;
    out.extend_from_slice(&jp[cursor..cursor + fixed]);
    cursor += fixed;

    for _ in 0..MAX_PARTY * 2 {
        out.extend_from_slice(&widen_name(&jp[cursor..cursor + JP_NAME_LEN]));
        cursor += JP_NAME_LEN;
    }

    out.extend_from_slice(&jp[cursor..]);
    out.resize(intl_len, 0);
    out
}

/// Rebuilds an International Pokémon section in the Japanese layout.
pub fn narrow_party_section(generation: Generation, intl: &[u8]) -> Vec<u8> {
    let record_len = generation.party_record_len();
    let mut out = Vec::with_capacity(jp_section_len(generation));

    let mut cursor = 0;
    out.extend_from_slice(&narrow_name(&intl[..NAME_LEN]));
    cursor += NAME_LEN;

    let fixed = 1 + (MAX_PARTY + 1) + 2 + record_len * MAX_PARTY;
    out.extend_from_slice(&intl[cursor..cursor + fixed]);
    cursor += fixed;

    for _ in 0..MAX_PARTY * 2 {
        out.extend_from_slice(&narrow_name(&intl[cursor..cursor + NAME_LEN]));
        cursor += NAME_LEN;
    }

    out.extend_from_slice(&intl[cursor..]);
    out.resize(jp_section_len(generation), 0);
    out
}

/// Translates a mail body through a 256-entry byte table.
pub fn translate_mail(body: &mut [u8], table: &[u8; 256]) {
    for byte in body {
        *byte = table[usize::from(*byte)];
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn widen_then_narrow_preserves_visible_chars() {
        let jp = [0x80, 0x81, 0x82, TERMINATOR_GB, 0x00, 0x00];
        let wide = widen_name(&jp);
        assert_eq!(wide.len(), NAME_LEN);
        assert_eq!(&wide[..JP_NAME_LEN], &jp);
        assert!(wide[JP_NAME_LEN..].iter().all(|&b| b == TERMINATOR_GB));

        let narrow = narrow_name(&wide);
        assert_eq!(&narrow[..4], &jp[..4]);
        assert_eq!(narrow[JP_NAME_LEN - 1], TERMINATOR_GB);
    }

    #[test]
    fn section_conversion_round_trips() {
        let generation = Generation::Gen2;
        let jp_len = jp_section_len(generation);
        let mut jp = vec![0u8; jp_len];
        for (index, byte) in jp.iter_mut().enumerate() {
            *byte = (index % 0x4D) as u8;
        }
        // Terminate each name field so narrowing loses nothing visible.
        let names_base = JP_NAME_LEN
            + 1
            + (MAX_PARTY + 1)
            + 2
            + generation.party_record_len() * MAX_PARTY;
        for field in 0..NAME_FIELDS {
            let base = match field {
                0 => 0,
                n => names_base + (n - 1) * JP_NAME_LEN,
            };
            jp[base + JP_NAME_LEN - 1] = TERMINATOR_GB;
        }

        let wide = widen_party_section(generation, &jp);
        assert_eq!(wide.len(), generation.section_lengths()[1]);
        let narrowed = narrow_party_section(generation, &wide);
        assert_eq!(narrowed, jp);
    }

    #[test]
    fn mail_translation_maps_every_byte() {
        let mut table = [0u8; 256];
        for (index, entry) in table.iter_mut().enumerate() {
            *entry = (index as u8).wrapping_add(1);
        }
        let mut body = vec![0x00, 0x10, 0xFF];
        translate_mail(&mut body, &table);
        assert_eq!(body, vec![0x01, 0x11, 0x00]);
    }
}

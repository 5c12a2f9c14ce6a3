//! 0xFE escape patching.
//!
//! The cartridge wire protocol reserves 0xFE, so any data byte holding
//! it is sent as 0xFF and its position recorded in a side-channel patch
//! list. Offsets are 1-based within 0xFC-sized pages; a 0xFF byte in
//! the list ends the current page, and the final 0xFF ends the list.

pub const PAGE_SIZE: usize = 0xFC;
pub const ESCAPED: u8 = 0xFE;
pub const ESCAPE_REPLACEMENT: u8 = 0xFF;
pub const PAGE_END: u8 = 0xFF;

/// Escapes `block` in place and returns the patch list describing the
/// escaped positions, including the terminating page ends for every
/// page the block spans.
pub fn create_patch_list(block: &mut [u8]) -> Vec<u8> {
    let pages = block.len().div_ceil(PAGE_SIZE).max(1);
    let mut list = Vec::new();
    let mut page = 0;
    for pos in 0..block.len() {
        if block[pos] != ESCAPED {
            continue;
        }
        block[pos] = ESCAPE_REPLACEMENT;
        while pos / PAGE_SIZE > page {
            list.push(PAGE_END);
            page += 1;
        }
        list.push((pos % PAGE_SIZE + 1) as u8);
    }
    while page < pages {
        list.push(PAGE_END);
        page += 1;
    }
    list
}

/// Restores escaped bytes in `block` from `list`. Bytes past the final
/// page end are ignored; offsets past the block are dropped.
pub fn apply_patch_list(block: &mut [u8], list: &[u8]) {
    let pages = block.len().div_ceil(PAGE_SIZE).max(1);
    let mut page = 0;
    for &entry in list {
        if entry == PAGE_END {
            page += 1;
            if page >= pages {
                break;
            }
            continue;
        }
        if entry == 0 {
            // 0x00 marks a conformance-rejected entry; nothing to restore.
            continue;
        }
        let pos = page * PAGE_SIZE + usize::from(entry) - 1;
        if let Some(byte) = block.get_mut(pos) {
            *byte = ESCAPED;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_restores_escaped_bytes() {
        let mut block = vec![0u8; 444];
        block[0] = ESCAPED;
        block[0xFB] = ESCAPED;
        block[0xFC] = ESCAPED;
        block[443] = ESCAPED;
        let original = block.clone();

        let list = create_patch_list(&mut block);
        assert!(!block.contains(&ESCAPED));

        apply_patch_list(&mut block, &list);
        assert_eq!(block, original);
    }

    #[test]
    fn clean_block_yields_only_page_ends() {
        let mut block = vec![0u8; 300];
        let list = create_patch_list(&mut block);
        assert_eq!(list, vec![PAGE_END, PAGE_END]);
    }

    #[test]
    fn offsets_are_one_based_within_pages() {
        let mut block = vec![0u8; 260];
        block[0] = ESCAPED;
        block[PAGE_SIZE] = ESCAPED;
        let list = create_patch_list(&mut block);
        assert_eq!(list, vec![1, PAGE_END, 1, PAGE_END]);
    }

    #[test]
    fn rejected_entries_are_skipped() {
        let mut block = vec![0x11u8; 16];
        apply_patch_list(&mut block, &[0x00, 3, PAGE_END]);
        assert_eq!(block[2], ESCAPED);
        assert_eq!(block[0], 0x11);
    }

    #[test]
    fn stray_offsets_past_block_are_dropped() {
        let mut block = vec![0u8; 8];
        apply_patch_list(&mut block, &[0xF0, PAGE_END]);
        assert_eq!(block, vec![0u8; 8]);
    }
}

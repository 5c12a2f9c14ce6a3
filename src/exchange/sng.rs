//! SNG position-slot frames.
//!
//! Synchronous mode streams `(position, value)` slots between peers.
//! Two wire formats exist: the OLD format packs 2 slots plus a trailing
//! section-index byte (7 bytes); the NEW format packs 8 self-describing
//! slots of 4 bytes each (32 bytes). The format is auto-detected from
//! the first well-formed peer frame.

pub const OLD_FRAME_LEN: usize = 7;
pub const NEW_FRAME_LEN: usize = 32;
pub const OLD_SLOTS: usize = 2;
pub const NEW_SLOTS: usize = 8;

/// Slot value meaning "no data yet"; positions carrying it are polled
/// again rather than consumed.
pub const KEEP_ALIVE: u8 = 0xFE;
/// Position marking the pre-section rendezvous sentinel.
pub const READY_POS: u16 = 0xFFFF;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SngFormat {
    Old,
    New,
}

/// One `(position, value)` pair tagged with its section index.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SngSlot {
    pub pos: u16,
    pub val: u8,
    pub section: u8,
}

impl SngSlot {
    pub fn data(pos: u16, val: u8, section: u8) -> Self {
        Self { pos, val, section }
    }

    /// Rendezvous sentinel announcing readiness for `section`.
    pub fn ready(section: u8) -> Self {
        Self {
            pos: READY_POS,
            val: section,
            section,
        }
    }

    /// Completion marker: any position at or past the section length.
    pub fn completion(length: u16, section: u8) -> Self {
        Self {
            pos: length,
            val: 0,
            section,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.pos == READY_POS
    }

    pub fn is_keep_alive(&self) -> bool {
        self.pos != READY_POS && self.val == KEEP_ALIVE
    }
}

/// Encodes up to a frame's worth of slots, padding with keep-alives.
pub fn encode_frame(format: SngFormat, section: u8, slots: &[SngSlot]) -> Vec<u8> {
    match format {
        SngFormat::New => {
            let mut out = Vec::with_capacity(NEW_FRAME_LEN);
            for index in 0..NEW_SLOTS {
                let slot = slots.get(index).copied().unwrap_or(SngSlot {
                    pos: 0,
                    val: KEEP_ALIVE,
                    section,
                });
                out.extend_from_slice(&slot.pos.to_be_bytes());
                out.push(slot.val);
                out.push(slot.section);
            }
            out
        }
        SngFormat::Old => {
            let mut out = Vec::with_capacity(OLD_FRAME_LEN);
            for index in 0..OLD_SLOTS {
                let slot = slots.get(index).copied().unwrap_or(SngSlot {
                    pos: 0,
                    val: KEEP_ALIVE,
                    section,
                });
                out.extend_from_slice(&slot.pos.to_be_bytes());
                out.push(slot.val);
            }
            out.push(section);
            out
        }
    }
}

/// Decodes a frame of either format; `None` for anything malformed.
pub fn decode_frame(raw: &[u8]) -> Option<(SngFormat, Vec<SngSlot>)> {
    match raw.len() {
        NEW_FRAME_LEN => {
            let slots = raw
                .chunks_exact(4)
                .map(|chunk| SngSlot {
                    pos: u16::from_be_bytes([chunk[0], chunk[1]]),
                    val: chunk[2],
                    section: chunk[3],
                })
                .collect();
            Some((SngFormat::New, slots))
        }
        OLD_FRAME_LEN => {
            let section = raw[OLD_FRAME_LEN - 1];
            let slots = raw[..OLD_FRAME_LEN - 1]
                .chunks_exact(3)
                .map(|chunk| SngSlot {
                    pos: u16::from_be_bytes([chunk[0], chunk[1]]),
                    val: chunk[2],
                    section,
                })
                .collect();
            Some((SngFormat::Old, slots))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_format_round_trips_eight_slots() {
        let slots: Vec<SngSlot> = (0..NEW_SLOTS)
            .map(|index| SngSlot::data(index as u16, 0x5A + index as u8, 1))
            .collect();
        let raw = encode_frame(SngFormat::New, 1, &slots);
        assert_eq!(raw.len(), NEW_FRAME_LEN);
        let (format, decoded) = decode_frame(&raw).unwrap();
        assert_eq!(format, SngFormat::New);
        assert_eq!(decoded, slots);
    }

    #[test]
    fn old_format_round_trips_two_slots() {
        let slots = vec![SngSlot::data(0, 0x5A, 2), SngSlot::data(1, 0x7F, 2)];
        let raw = encode_frame(SngFormat::Old, 2, &slots);
        assert_eq!(raw.len(), OLD_FRAME_LEN);
        let (format, decoded) = decode_frame(&raw).unwrap();
        assert_eq!(format, SngFormat::Old);
        assert_eq!(decoded, slots);
    }

    #[test]
    fn short_frames_pad_with_keep_alive() {
        let raw = encode_frame(SngFormat::New, 1, &[SngSlot::data(3, 0x10, 1)]);
        let (_, decoded) = decode_frame(&raw).unwrap();
        assert_eq!(decoded[0], SngSlot::data(3, 0x10, 1));
        assert!(decoded[1..].iter().all(SngSlot::is_keep_alive));
    }

    #[test]
    fn unknown_lengths_are_rejected() {
        assert!(decode_frame(&[0u8; 5]).is_none());
        assert!(decode_frame(&[0u8; 31]).is_none());
        assert!(decode_frame(&[]).is_none());
    }

    #[test]
    fn ready_sentinel_is_distinguishable() {
        let ready = SngSlot::ready(2);
        assert!(ready.is_ready());
        assert!(!ready.is_keep_alive());
        let raw = encode_frame(SngFormat::New, 2, &[ready]);
        let (_, decoded) = decode_frame(&raw).unwrap();
        assert!(decoded[0].is_ready());
        assert_eq!(decoded[0].val, 2);
    }
}

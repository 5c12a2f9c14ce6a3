//! Relay client.
//!
//! A duplex connection to the relay server carrying tagged binary
//! messages: `S`-frames publish the latest value for a tag into the
//! room, `G`-frames ask the room for a tag's latest value. The client
//! keeps a last-value-per-tag inbox and outbox; polls from the peer are
//! answered from the outbox automatically.

mod client;
mod counter;
mod frame;

pub use client::RelayClient;
pub use counter::CounterChannel;
pub use frame::{FrameReader, RelayFrame};

use thiserror::Error;

use crate::data::Generation;

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("relay io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed relay frame: {reason}")]
    MalformedFrame { reason: String },
    #[error("relay connection closed")]
    Closed,
    #[error("timed out waiting for {tag}")]
    PollTimeout { tag: Tag },
}

/// Four-character message tag naming a semantic channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Tag(pub [u8; 4]);

impl Tag {
    pub const fn new(raw: [u8; 4]) -> Self {
        Self(raw)
    }

    /// Builds a generation-suffixed tag, e.g. `BUF` → `BUF2`.
    pub fn family(prefix: &[u8; 3], generation: Generation) -> Self {
        Self([prefix[0], prefix[1], prefix[2], generation.tag_suffix()])
    }

    pub fn as_bytes(&self) -> &[u8; 4] {
        &self.0
    }
}

impl std::fmt::Display for Tag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for &byte in &self.0 {
            let c = if byte.is_ascii_graphic() {
                byte as char
            } else {
                '.'
            };
            write!(f, "{c}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn family_tags_carry_generation_suffix() {
        assert_eq!(Tag::family(b"BUF", Generation::Gen2), Tag::new(*b"BUF2"));
        assert_eq!(Tag::family(b"SNG", Generation::Gen1), Tag::new(*b"SNG1"));
        assert_eq!(Tag::family(b"CHC", Generation::Gen3), Tag::new(*b"CHC3"));
    }

    #[test]
    fn tags_render_as_ascii() {
        assert_eq!(Tag::new(*b"CHC2").to_string(), "CHC2");
        assert_eq!(Tag::new([0x00, b'A', b'B', b'C']).to_string(), ".ABC");
    }
}

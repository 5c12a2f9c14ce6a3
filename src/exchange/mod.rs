//! Section exchanger.
//!
//! One party section moves between the cartridge and the peer either
//! synchronously (per-byte SNG mediation while the cartridge streams)
//! or buffered (fed locally from a previously received blob). Both
//! paths share the cartridge preamble handshake.

mod buffered;
pub mod sng;
mod sync;

pub use sng::{SngFormat, SngSlot};
pub use sync::SectionOutcome;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::data::Generation;
use crate::link::{ByteLink, LinkError};
use crate::relay::{RelayClient, RelayError, Tag};

/// Section starter byte for sections 0..3.
const STARTER: u8 = 0xFD;
/// The Gen 2 mail section announces itself differently.
const MAIL_STARTER: u8 = 0x20;

#[derive(Debug, Error)]
pub enum ExchangeError {
    #[error(transparent)]
    Link(#[from] LinkError),
    #[error(transparent)]
    Relay(#[from] RelayError),
    #[error("buffered feed expects {expected} bytes, got {got}")]
    FeedLength { expected: usize, got: usize },
    #[error("trade stopped")]
    Stopped,
}

/// Mediates section transfers for one cartridge generation.
pub struct SectionExchanger<'a, L> {
    pub(crate) link: &'a mut L,
    pub(crate) relay: &'a RelayClient,
    pub(crate) generation: Generation,
    pub(crate) stop: Arc<AtomicBool>,
    pub(crate) sng_tag: Tag,
    pub(crate) format: Option<SngFormat>,
    pub(crate) poll_interval: Duration,
    pub(crate) position_cap: Duration,
}

impl<'a, L: ByteLink> SectionExchanger<'a, L> {
    pub fn new(
        link: &'a mut L,
        relay: &'a RelayClient,
        generation: Generation,
        stop: Arc<AtomicBool>,
    ) -> Self {
        Self {
            link,
            relay,
            generation,
            stop,
            sng_tag: Tag::family(b"SNG", generation),
            format: None,
            poll_interval: Duration::from_millis(10),
            position_cap: Duration::from_secs(10),
        }
    }

    /// Detected SNG wire format, once a well-formed peer frame has
    /// arrived.
    pub fn sng_format(&self) -> Option<SngFormat> {
        self.format
    }

    pub(crate) fn check_stop(&self) -> Result<(), ExchangeError> {
        if self.stop.load(Ordering::Relaxed) {
            return Err(ExchangeError::Stopped);
        }
        Ok(())
    }

    pub(crate) fn starter_for(&self, section_index: usize) -> u8 {
        if self.generation == Generation::Gen2 && section_index == 3 {
            MAIL_STARTER
        } else {
            STARTER
        }
    }

    /// Per-section preamble: send the starter until the cartridge
    /// echoes it, then keep sending until the response departs from the
    /// starter. That departing byte is payload byte 0.
    pub(crate) fn preamble(&mut self, section_index: usize) -> Result<u8, ExchangeError> {
        let starter = self.starter_for(section_index);
        loop {
            self.check_stop()?;
            if self.link.exchange(starter)? == starter {
                break;
            }
        }
        loop {
            self.check_stop()?;
            let response = self.link.exchange(starter)?;
            if response != starter {
                return Ok(response);
            }
        }
    }

    /// Threshold past which an outgoing 0xFD is rewritten to 0xFF for
    /// this section. A cargo-culted safety net for known Gen 2 poison
    /// positions; retained as observed.
    pub(crate) fn poison_threshold(&self, section_index: usize) -> Option<u16> {
        if self.generation != Generation::Gen2 {
            return None;
        }
        match section_index {
            1 => Some(441),
            2 => Some(72),
            3 => Some(171),
            _ => None,
        }
    }

    /// Prepares an own byte for the SNG payload: 0xFE is reserved as
    /// keep-alive on that channel, and poison positions drop 0xFD.
    pub(crate) fn escape_wire_byte(&self, section_index: usize, pos: usize, byte: u8) -> u8 {
        if byte == sng::KEEP_ALIVE {
            return 0xFF;
        }
        if byte == 0xFD {
            if let Some(threshold) = self.poison_threshold(section_index) {
                if pos as u16 >= threshold {
                    tracing::warn!(
                        section = section_index,
                        pos,
                        "poison byte 0xFD rewritten to 0xFF in outbound frame"
                    );
                    return 0xFF;
                }
            }
        }
        byte
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_harness::{LoopbackRelay, ScriptedLink};

    fn exchanger_parts() -> (ScriptedLink, LoopbackRelay) {
        (ScriptedLink::new(), LoopbackRelay::start())
    }

    #[test]
    fn preamble_waits_for_echo_then_first_byte() {
        let (mut link, relay) = exchanger_parts();
        // Cartridge ignores two pings, echoes the starter, then yields
        // the first payload byte.
        link.push_replies(&[0x00, 0x00, 0xFD, 0xFD, 0x5A]);
        let client = relay.client("preamble");
        let stop = Arc::new(AtomicBool::new(false));
        let mut exchanger =
            SectionExchanger::new(&mut link, &client, Generation::Gen2, stop);
        let first = exchanger.preamble(0).unwrap();
        assert_eq!(first, 0x5A);
    }

    #[test]
    fn mail_section_uses_its_own_starter() {
        let (mut link, relay) = exchanger_parts();
        link.push_replies(&[0x20, 0x11]);
        let client = relay.client("mail-preamble");
        let stop = Arc::new(AtomicBool::new(false));
        let mut exchanger =
            SectionExchanger::new(&mut link, &client, Generation::Gen2, stop);
        let first = exchanger.preamble(3).unwrap();
        assert_eq!(first, 0x11);
        assert!(link.sent().iter().all(|&b| b == 0x20));
    }

    #[test]
    fn stop_flag_aborts_the_preamble() {
        let (mut link, relay) = exchanger_parts();
        link.push_replies(&[0x00; 4]);
        let client = relay.client("stopped");
        let stop = Arc::new(AtomicBool::new(true));
        let mut exchanger =
            SectionExchanger::new(&mut link, &client, Generation::Gen2, stop);
        assert!(matches!(
            exchanger.preamble(0),
            Err(ExchangeError::Stopped)
        ));
    }

    #[test]
    fn poison_rewrite_applies_past_threshold_only() {
        let (mut link, relay) = exchanger_parts();
        let client = relay.client("poison");
        let stop = Arc::new(AtomicBool::new(false));
        let exchanger = SectionExchanger::new(&mut link, &client, Generation::Gen2, stop);
        assert_eq!(exchanger.escape_wire_byte(1, 100, 0xFD), 0xFD);
        assert_eq!(exchanger.escape_wire_byte(1, 441, 0xFD), 0xFF);
        assert_eq!(exchanger.escape_wire_byte(2, 72, 0xFD), 0xFF);
        assert_eq!(exchanger.escape_wire_byte(0, 5, 0xFE), 0xFF);
    }
}

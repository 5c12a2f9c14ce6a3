//! Buffered (local-feed) section exchange.

use tracing::debug;

use crate::link::ByteLink;

use super::{ExchangeError, SectionExchanger};

impl<L: ByteLink> SectionExchanger<'_, L> {
    /// Runs one section fed locally from `feed` (a slice of a cached
    /// peer `FLL` blob or a bundled template), bypassing per-byte peer
    /// I/O entirely. Returns the bytes our cartridge produced.
    pub fn run_buffered(
        &mut self,
        section_index: usize,
        feed: &[u8],
    ) -> Result<Vec<u8>, ExchangeError> {
        let length = self.generation.section_lengths()[section_index];
        if feed.len() != length {
            return Err(ExchangeError::FeedLength {
                expected: length,
                got: feed.len(),
            });
        }
        debug!(section = section_index, length, "buffered section start");

        let first = self.preamble(section_index)?;
        let mut own = Vec::with_capacity(length);
        own.push(first);

        for &byte in feed {
            self.check_stop()?;
            let next = self.link.exchange(byte)?;
            if own.len() < length {
                own.push(next);
            }
        }

        debug!(section = section_index, "buffered section done");
        Ok(own)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;

    use super::super::{ExchangeError, SectionExchanger};
    use crate::data::Generation;
    use crate::test_harness::{LoopbackRelay, ScriptedLink};

    #[test]
    fn buffered_feed_collects_own_section() {
        let mut link = ScriptedLink::new();
        // Preamble echo, then byte 0, then replies to the ten feed
        // bytes of the random section.
        link.push_replies(&[0xFD, 0xA0]);
        link.push_replies(&[0xA1, 0xA2, 0xA3, 0xA4, 0xA5, 0xA6, 0xA7, 0xA8, 0xA9, 0xAA]);

        let relay = LoopbackRelay::start();
        let client = relay.client("buffered");
        let stop = Arc::new(AtomicBool::new(false));
        let mut exchanger =
            SectionExchanger::new(&mut link, &client, Generation::Gen2, stop);

        let feed: Vec<u8> = (0..10).collect();
        let own = exchanger.run_buffered(0, &feed).unwrap();
        assert_eq!(own.len(), 10);
        assert_eq!(own[0], 0xA0);
        assert_eq!(own[9], 0xA9);

        // The feed bytes all reached the cartridge after the preamble.
        let sent = link.sent();
        assert_eq!(&sent[sent.len() - 10..], &feed[..]);
    }

    #[test]
    fn feed_length_mismatch_is_refused() {
        let mut link = ScriptedLink::new();
        let relay = LoopbackRelay::start();
        let client = relay.client("badfeed");
        let stop = Arc::new(AtomicBool::new(false));
        let mut exchanger =
            SectionExchanger::new(&mut link, &client, Generation::Gen2, stop);
        let err = exchanger.run_buffered(0, &[0u8; 4]).unwrap_err();
        assert!(matches!(err, ExchangeError::FeedLength { expected: 10, got: 4 }));
    }
}

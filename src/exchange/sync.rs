//! Synchronous (interleaved) section exchange.

use std::thread;
use std::time::Instant;

use tracing::{debug, trace, warn};

use crate::link::ByteLink;

use super::sng::{self, SngFormat, SngSlot, NEW_SLOTS, OLD_SLOTS};
use super::{ExchangeError, SectionExchanger};

/// Both views of one completed section: what our cartridge produced and
/// what the peer's did.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SectionOutcome {
    pub own: Vec<u8>,
    pub peer: Vec<u8>,
}

impl<L: ByteLink> SectionExchanger<'_, L> {
    /// Runs one section in synchronous mode: every peer byte is
    /// delivered over SNG while the cartridge streams its own.
    pub fn run_sync(&mut self, section_index: usize) -> Result<SectionOutcome, ExchangeError> {
        let length = self.generation.section_lengths()[section_index];
        let section = section_index as u8;
        debug!(section = section_index, length, "sync section start");

        let first = self.preamble(section_index)?;
        let mut own: Vec<u8> = Vec::with_capacity(length);
        own.push(first);

        let mut peer: Vec<Option<u8>> = vec![None; length];
        let mut peer_done = false;

        self.rendezvous(section, &own, &mut peer, &mut peer_done)?;

        let mut pos = 0usize;
        let mut stall_started = Instant::now();
        while pos < length {
            self.check_stop()?;
            self.publish_slots(section, section_index, &own, pos)?;
            self.ingest(section, length, &mut peer, &mut peer_done);

            match peer[pos] {
                Some(value) => {
                    let next = self.link.exchange(value)?;
                    pos += 1;
                    if pos < length {
                        own.push(next);
                    }
                    stall_started = Instant::now();
                }
                None => {
                    if stall_started.elapsed() >= self.position_cap {
                        warn!(
                            section = section_index,
                            pos, "no peer data for position; still waiting"
                        );
                        stall_started = Instant::now();
                    }
                    self.relay.request(self.sng_tag)?;
                    thread::sleep(self.poll_interval);
                }
            }
        }

        // Announce completion until the peer confirms or the cap runs
        // out; at least one marker always goes out so a peer that
        // finished first still hears from us. The tail data slots ride
        // along so a peer that lost the final frames can still finish.
        let deadline = Instant::now() + self.position_cap;
        loop {
            self.check_stop()?;
            let format = self.format.unwrap_or(SngFormat::New);
            let capacity = match format {
                SngFormat::New => NEW_SLOTS,
                SngFormat::Old => OLD_SLOTS,
            };
            let mut slots = vec![SngSlot::completion(length as u16, section)];
            let tail = own.len().saturating_sub(capacity - 1);
            slots.extend((tail..own.len()).map(|index| {
                SngSlot::data(
                    index as u16,
                    self.escape_wire_byte(section_index, index, own[index]),
                    section,
                )
            }));
            let frame = sng::encode_frame(format, section, &slots);
            self.relay.send(self.sng_tag, frame)?;
            self.relay.request(self.sng_tag)?;
            self.ingest(section, length, &mut peer, &mut peer_done);
            if peer_done {
                break;
            }
            if Instant::now() >= deadline {
                warn!(section = section_index, "peer never confirmed completion");
                break;
            }
            thread::sleep(self.poll_interval);
        }

        let peer: Vec<u8> = peer.into_iter().map(Option::unwrap_or_default).collect();
        debug!(section = section_index, "sync section done");
        Ok(SectionOutcome { own, peer })
    }

    /// Pre-section rendezvous: exchange ready sentinels until the peer
    /// echoes one for this section, or implicitly syncs by already
    /// sending data-bearing slots for it.
    fn rendezvous(
        &mut self,
        section: u8,
        own: &[u8],
        peer: &mut [Option<u8>],
        peer_done: &mut bool,
    ) -> Result<(), ExchangeError> {
        let stall_started = Instant::now();
        loop {
            self.check_stop()?;
            let format = self.format.unwrap_or(SngFormat::New);
            let slots = [
                SngSlot::ready(section),
                SngSlot::data(0, self.escape_wire_byte(usize::from(section), 0, own[0]), section),
            ];
            self.relay.send(self.sng_tag, sng::encode_frame(format, section, &slots))?;
            self.relay.request(self.sng_tag)?;

            if let Some(payload) = self.relay.take(self.sng_tag) {
                let Some((format, slots)) = sng::decode_frame(&payload) else {
                    continue;
                };
                self.format.get_or_insert(format);
                let mut synced = false;
                for slot in slots {
                    if slot.is_ready() && slot.val == section {
                        synced = true;
                        continue;
                    }
                    if slot.section == section && !slot.is_keep_alive() {
                        // Implicit sync: the peer is already streaming.
                        synced = true;
                        let pos = usize::from(slot.pos);
                        if pos >= peer.len() {
                            *peer_done = true;
                        } else {
                            peer[pos] = Some(slot.val);
                        }
                    }
                }
                if synced {
                    trace!(section, "section rendezvous complete");
                    return Ok(());
                }
            }

            if stall_started.elapsed() >= self.position_cap {
                warn!(section, "rendezvous still waiting for peer");
                return Ok(());
            }
            thread::sleep(self.poll_interval);
        }
    }

    /// Publishes the most recent own bytes, newest last, padding the
    /// frame for redundancy against loss and reordering.
    fn publish_slots(
        &mut self,
        section: u8,
        section_index: usize,
        own: &[u8],
        pos: usize,
    ) -> Result<(), ExchangeError> {
        let format = self.format.unwrap_or(SngFormat::New);
        let capacity = match format {
            SngFormat::New => NEW_SLOTS,
            SngFormat::Old => OLD_SLOTS,
        };
        let start = own.len().saturating_sub(capacity).min(pos);
        let slots: Vec<SngSlot> = (start..own.len())
            .map(|index| {
                SngSlot::data(
                    index as u16,
                    self.escape_wire_byte(section_index, index, own[index]),
                    section,
                )
            })
            .collect();
        self.relay
            .send(self.sng_tag, sng::encode_frame(format, section, &slots))?;
        Ok(())
    }

    fn ingest(
        &mut self,
        section: u8,
        length: usize,
        peer: &mut [Option<u8>],
        peer_done: &mut bool,
    ) {
        while let Some(payload) = self.relay.take(self.sng_tag) {
            let Some((format, slots)) = sng::decode_frame(&payload) else {
                continue;
            };
            self.format.get_or_insert(format);
            for slot in slots {
                if slot.is_ready() {
                    // A rendezvous for a later section means the peer
                    // already finished this one.
                    if slot.val > section {
                        *peer_done = true;
                    }
                    continue;
                }
                if slot.is_keep_alive() {
                    continue;
                }
                if slot.section != section {
                    if slot.section > section {
                        *peer_done = true;
                    }
                    continue;
                }
                let pos = usize::from(slot.pos);
                if pos >= length {
                    *peer_done = true;
                    continue;
                }
                // Re-delivered positions are idempotent.
                peer[pos].get_or_insert(slot.val);
            }
        }
    }
}

//! Gen 3 trade machine over the 32-bit SPI transport.

use std::sync::Arc;
use std::time::Duration;

use byteorder::{ByteOrder, LittleEndian};
use tracing::{debug, info, warn};

use crate::link::ByteLink;
use crate::party::gen3::{Pk3Record, Pk3Single, MAIL_LEN, RECORD_LEN, RIBBON_LEN, VERSION_LEN};
use crate::relay::{RelayClient, Tag};

use super::{TradeError, TradeMediator, TradeTarget};

/// Control flags in the top byte of every word.
const FLAG_DONE: u32 = 0x20 << 24;
const FLAG_NOT_DONE: u32 = 0x40 << 24;
const FLAG_SENDING: u32 = 0x10 << 24;
const FLAG_IN_PARTY: u32 = 0x80 << 24;
const ASKING_NYBBLE: u32 = 0x0C << 24;

const SECTION_LEN: usize = 0x380;
const BLOCKS: usize = SECTION_LEN / 2;

/// Section layout: count, six records, six mails, one version block
/// (the whole party comes from one cartridge), six ribbon blocks, then
/// the mail and party sums and the global sum in the trailing word.
const COUNT_AT: usize = 0;
const PARTY_BASE: usize = COUNT_AT + 2;
const MAIL_BASE: usize = PARTY_BASE + RECORD_LEN * 6;
const VERSION_AT: usize = MAIL_BASE + MAIL_LEN * 6;
const RIBBON_BASE: usize = VERSION_AT + VERSION_LEN;
const MAIL_SUM_AT: usize = RIBBON_BASE + RIBBON_LEN * 6;
const PARTY_SUM_AT: usize = MAIL_SUM_AT + 4;
const GLOBAL_SUM_AT: usize = PARTY_SUM_AT + 4;

// Every slot's fields must land inside the fixed section.
const _: () = assert!(GLOBAL_SUM_AT + 2 == SECTION_LEN);

/// Menu byte set inside `in_party_trading | done` frames.
const SELECTION_BASE: u8 = 0x80;
const SELECTION_CANCEL: u8 = 0x8F;
const FIRST_ACCEPT: u8 = 0xA2;
const FIRST_DECLINE: u8 = 0xA1;
const SECOND_ACCEPT: u8 = 0xB2;
const SECOND_DECLINE: u8 = 0xB1;
const SUCCESS_FAILED: u8 = 0x9F;
const SUCCESS_ROUNDS: usize = 7;

const STABLE_READS: usize = 10;
const POOL_WAIT: Duration = Duration::from_secs(120);

fn data_frame(pos: u16, value: u16) -> u32 {
    FLAG_SENDING | (u32::from(pos & 0x1FF) << 16) | u32::from(value)
}

fn is_data(word: u32) -> bool {
    word & FLAG_SENDING != 0
}

fn data_pos(word: u32) -> usize {
    ((word >> 16) & 0x1FF) as usize
}

fn data_value(word: u32) -> u16 {
    word as u16
}

fn ask_frame(start: u16, end: u16) -> u32 {
    ASKING_NYBBLE | (u32::from(end & 0xFFF) << 12) | u32::from(start & 0xFFF)
}

fn is_ask(word: u32) -> bool {
    !is_data(word) && (word >> 24) & 0x0C == 0x0C
}

fn ask_range(word: u32) -> (usize, usize) {
    ((word & 0xFFF) as usize, ((word >> 12) & 0xFFF) as usize)
}

fn menu_frame(value: u8) -> u32 {
    FLAG_IN_PARTY | FLAG_DONE | u32::from(value)
}

fn menu_value(word: u32) -> Option<u8> {
    if word & FLAG_IN_PARTY != 0 {
        Some(word as u8)
    } else {
        None
    }
}

fn compute_checksums(section: &[u8]) -> (u32, u32, u32) {
    let sum_words = |range: std::ops::Range<usize>| {
        section[range]
            .chunks_exact(2)
            .fold(0u32, |sum, pair| {
                sum.wrapping_add(u32::from(LittleEndian::read_u16(pair)))
            })
    };
    let mail_sum = sum_words(MAIL_BASE..VERSION_AT);
    let party_count = u32::from(LittleEndian::read_u16(&section[COUNT_AT..COUNT_AT + 2]));
    let party_sum = sum_words(PARTY_BASE..MAIL_BASE).wrapping_add(party_count);
    let global_sum = sum_words(0..GLOBAL_SUM_AT);
    (mail_sum, party_sum, global_sum)
}

fn write_checksums(section: &mut [u8]) {
    let (mail_sum, party_sum, _) = compute_checksums(section);
    LittleEndian::write_u32(&mut section[MAIL_SUM_AT..MAIL_SUM_AT + 4], mail_sum);
    LittleEndian::write_u32(&mut section[PARTY_SUM_AT..PARTY_SUM_AT + 4], party_sum);
    let (_, _, global_sum) = compute_checksums(section);
    // The global sum lives in the final transfer block.
    LittleEndian::write_u16(&mut section[GLOBAL_SUM_AT..GLOBAL_SUM_AT + 2], global_sum as u16);
}

fn checksums_valid(section: &[u8]) -> bool {
    let (mail_sum, party_sum, global_sum) = compute_checksums(section);
    LittleEndian::read_u32(&section[MAIL_SUM_AT..MAIL_SUM_AT + 4]) == mail_sum
        && LittleEndian::read_u32(&section[PARTY_SUM_AT..PARTY_SUM_AT + 4]) == party_sum
        && LittleEndian::read_u16(&section[GLOBAL_SUM_AT..GLOBAL_SUM_AT + 2]) == global_sum as u16
}

enum Gen3Outcome {
    Traded,
    Declined,
    Cancelled,
}

impl<L: ByteLink> TradeMediator<'_, L> {
    pub(crate) fn run_gen3(&mut self) -> Result<(), TradeError> {
        self.warn_unvalidated();
        if self.tables.gen3.is_none() {
            return Err(TradeError::MissingTables("gen3"));
        }

        loop {
            self.check_stop()?;
            let flood = self.start_version_flood();

            let mut feed = match self.config.target {
                TradeTarget::Pool => self.gen3_pool_section()?,
                TradeTarget::Link => self.gen3_peer_section()?,
            };
            write_checksums(&mut feed);

            let own = self.transfer_section(&feed)?;
            flood.stop();
            if self.config.target == TradeTarget::Link {
                self.relay.send(Tag::new(*b"FL3S"), own.clone())?;
            }

            match self.gen3_menu(&own)? {
                Gen3Outcome::Traded => {
                    info!("gen 3 trade cycle complete");
                    if self.config.target == TradeTarget::Pool {
                        self.gen3_reconnect()?;
                    }
                }
                Gen3Outcome::Declined => {
                    debug!("gen 3 offer declined; menu restarts");
                }
                Gen3Outcome::Cancelled => {
                    info!("gen 3 trade session ended");
                    return Ok(());
                }
            }
        }
    }

    /// Streams `feed` to the cartridge while collecting its own section
    /// in return. 448 u16 blocks travel as data frames; ask frames
    /// request retransmits; transfer completes once the block bitmap is
    /// full and all three checksums hold.
    fn transfer_section(&mut self, feed: &[u8]) -> Result<Vec<u8>, TradeError> {
        debug!("gen 3 section transfer start");
        let mut own = vec![0u8; SECTION_LEN];
        let mut have = vec![false; BLOCKS];
        let mut cursor = 0usize;
        let mut cartridge_done = false;

        loop {
            self.check_stop()?;
            let complete = have.iter().all(|&b| b) && checksums_valid(&own);
            let out = if cursor < BLOCKS {
                let value = LittleEndian::read_u16(&feed[cursor * 2..cursor * 2 + 2]);
                let word = data_frame(cursor as u16, value);
                cursor += 1;
                word
            } else if complete {
                FLAG_DONE
            } else if let Some((start, end)) = missing_range(&have) {
                ask_frame(start as u16, end as u16)
            } else {
                FLAG_NOT_DONE
            };

            let reply = self.link.exchange32(out)?;
            if is_data(reply) {
                let pos = data_pos(reply);
                if pos < BLOCKS {
                    LittleEndian::write_u16(
                        &mut own[pos * 2..pos * 2 + 2],
                        data_value(reply),
                    );
                    have[pos] = true;
                }
            } else if is_ask(reply) {
                let (start, _end) = ask_range(reply);
                // Rewind and retransmit the requested range.
                cursor = cursor.min(start.min(BLOCKS));
            } else if reply & FLAG_DONE != 0 {
                cartridge_done = true;
            }

            if complete && cartridge_done {
                break;
            }
        }
        debug!("gen 3 section transfer done");
        Ok(own)
    }

    fn gen3_menu(&mut self, own: &[u8]) -> Result<Gen3Outcome, TradeError> {
        let selection = self.read_stable32(|b| {
            (SELECTION_BASE..SELECTION_BASE + 6).contains(&b) || b == SELECTION_CANCEL
        })?;
        info!(selection = format_args!("{selection:#04x}"), "gen 3 selection confirmed");

        if selection == SELECTION_CANCEL {
            self.link.exchange32(menu_frame(SELECTION_CANCEL))?;
            return Ok(Gen3Outcome::Cancelled);
        }
        let slot = usize::from(selection - SELECTION_BASE);
        let offered = extract_single(own, slot)?;

        let mut body = vec![selection, 0, 0];
        body.extend_from_slice(&offered.to_bytes());
        match self.config.target {
            TradeTarget::Pool => {
                self.relay.send(Tag::new(*b"P3SO"), offered.to_bytes())?;
            }
            TradeTarget::Link => self.send_counter(Tag::new(*b"CH3S"), &body)?,
        }

        let (peer_selection, peer_single) = self.gen3_peer_choice()?;
        if peer_selection == SELECTION_CANCEL {
            self.link.exchange32(menu_frame(SELECTION_CANCEL))?;
            return Ok(Gen3Outcome::Cancelled);
        }
        let Some(peer_single) = peer_single else {
            return Ok(Gen3Outcome::Declined);
        };

        // Refuse records whose plaintext checksum fails or that miss
        // the validity gates; they stay parsed but never trade.
        let tables = self.tables.gen3.as_ref().expect("gen3 tables");
        let plain = peer_single.record.decrypt();
        if !plain.trade_worthy(tables) {
            info!(
                species = plain.species(),
                valid_checksum = plain.checksum_valid(),
                "peer record refused at the menu"
            );
            self.link.exchange32(menu_frame(SELECTION_CANCEL))?;
            return Ok(Gen3Outcome::Declined);
        }
        info!(
            species = %self.tables.species_name(plain.display_species()),
            "peer offers"
        );
        self.link.exchange32(menu_frame(peer_selection))?;

        // Two confirm rounds, then seven success rounds.
        for (tag, accept, decline) in [
            (Tag::new(*b"A3S1"), FIRST_ACCEPT, FIRST_DECLINE),
            (Tag::new(*b"A3S2"), SECOND_ACCEPT, SECOND_DECLINE),
        ] {
            let ours = self.read_stable32(|b| b == accept || b == decline)?;
            let theirs = self.gen3_exchange_menu_byte(tag, ours, accept)?;
            self.link.exchange32(menu_frame(theirs))?;
            if ours == decline || theirs == decline {
                info!("gen 3 offer declined");
                return Ok(Gen3Outcome::Declined);
            }
        }

        for round in 0..SUCCESS_ROUNDS {
            let ours = self.read_stable32(|b| {
                (0x90..=0x95).contains(&b) || b == 0x9C || b == SUCCESS_FAILED
            })?;
            let tag = Tag::new([b'S', b'3', b'S', b'1' + round as u8]);
            let theirs = self.gen3_exchange_menu_byte(tag, ours, ours)?;
            self.link.exchange32(menu_frame(theirs))?;
            if ours == SUCCESS_FAILED || theirs == SUCCESS_FAILED {
                warn!(round, "gen 3 success sequence failed");
                return Ok(Gen3Outcome::Declined);
            }
        }

        info!(
            sent = %self.tables.species_name(offered.record.decrypt().display_species()),
            received = %self.tables.species_name(plain.display_species()),
            "gen 3 trade succeeded"
        );
        Ok(Gen3Outcome::Traded)
    }

    /// Sends our menu byte as a 3-byte LE counter-tagged payload and
    /// returns the peer's; pool trades synthesize `fallback`.
    fn gen3_exchange_menu_byte(
        &mut self,
        tag: Tag,
        ours: u8,
        fallback: u8,
    ) -> Result<u8, TradeError> {
        if self.config.target == TradeTarget::Pool {
            return Ok(fallback);
        }
        self.send_counter(tag, &[ours, 0, 0])?;
        let body = self.recv_counter(tag)?;
        Ok(body.first().copied().unwrap_or(fallback))
    }

    fn gen3_peer_choice(&mut self) -> Result<(u8, Option<Pk3Single>), TradeError> {
        if self.config.target == TradeTarget::Pool {
            // The pool always offers its slot 0.
            return Ok((SELECTION_BASE, self.gen3_pool_mon.take()));
        }
        let body = self.recv_counter(Tag::new(*b"CH3S"))?;
        let Some((&selection, rest)) = body.split_first() else {
            return Ok((SELECTION_CANCEL, None));
        };
        if selection == SELECTION_CANCEL || rest.len() < 2 {
            return Ok((selection, None));
        }
        let record = &rest[2..];
        match Pk3Single::from_bytes(record) {
            Ok(single) => Ok((selection, Some(single))),
            Err(err) => {
                warn!("peer single-Pokémon payload malformed: {err}");
                Ok((selection, None))
            }
        }
    }

    /// Builds the section fed to the cartridge from the server's pool
    /// Pokémon.
    fn gen3_pool_section(&mut self) -> Result<Vec<u8>, TradeError> {
        self.relay
            .send(Tag::new(*b"VES3"), super::version_payload().to_vec())?;
        let raw = self.relay.poll(
            Tag::new(*b"P3SI"),
            POOL_WAIT,
            Duration::from_millis(100),
        )?;
        let single = Pk3Single::from_bytes(&raw)?;
        let plain = single.record.decrypt();
        info!(
            species = %self.tables.species_name(plain.display_species()),
            valid = plain.checksum_valid(),
            "pool offers"
        );

        let mut section = self
            .tables
            .gen3
            .as_ref()
            .expect("gen3 tables")
            .base_pool
            .clone();
        section.resize(SECTION_LEN, 0);
        LittleEndian::write_u16(&mut section[COUNT_AT..COUNT_AT + 2], 1);
        section[PARTY_BASE..PARTY_BASE + RECORD_LEN].copy_from_slice(single.record.as_bytes());
        section[MAIL_BASE..MAIL_BASE + MAIL_LEN].copy_from_slice(&single.mail);
        section[VERSION_AT..VERSION_AT + VERSION_LEN].copy_from_slice(&single.version_info);
        section[RIBBON_BASE..RIBBON_BASE + RIBBON_LEN].copy_from_slice(&single.ribbon);
        self.gen3_pool_mon = Some(single);
        Ok(section)
    }

    /// Cached peer section for a link cycle, or the bundled default
    /// party while the first `FL3S` blob is still in flight.
    fn gen3_peer_section(&mut self) -> Result<Vec<u8>, TradeError> {
        let tag = Tag::new(*b"FL3S");
        self.relay.request(tag)?;
        let mut section = match self.relay.take(tag) {
            Some(blob) if blob.len() == SECTION_LEN => blob.to_vec(),
            Some(blob) => {
                warn!(got = blob.len(), expected = SECTION_LEN, "discarding malformed FL3S blob");
                self.tables.gen3.as_ref().expect("gen3 tables").base_party.clone()
            }
            None => self.tables.gen3.as_ref().expect("gen3 tables").base_party.clone(),
        };
        section.resize(SECTION_LEN, 0);
        Ok(section)
    }

    fn gen3_reconnect(&mut self) -> Result<(), TradeError> {
        let Some(addr) = self.config.relay_addr.clone() else {
            return Ok(());
        };
        debug!("reconnecting relay to refresh the pool");
        let client = RelayClient::connect(addr.as_str(), &self.config.room)?;
        self.relay = Arc::new(client);
        Ok(())
    }

    /// 10-consecutive confirmation over menu frames, filtering
    /// cartridge glitches.
    fn read_stable32(&mut self, accept: impl Fn(u8) -> bool) -> Result<u8, TradeError> {
        let mut candidate = None;
        let mut run = 0usize;
        loop {
            self.check_stop()?;
            let reply = self.link.exchange32(FLAG_IN_PARTY | FLAG_NOT_DONE)?;
            let Some(value) = menu_value(reply) else {
                candidate = None;
                run = 0;
                continue;
            };
            if !accept(value) {
                candidate = None;
                run = 0;
                continue;
            }
            match candidate {
                Some(current) if current == value => {
                    run += 1;
                    if run >= STABLE_READS {
                        return Ok(value);
                    }
                }
                _ => {
                    candidate = Some(value);
                    run = 1;
                }
            }
        }
    }
}

/// First maximal run of missing blocks, as an ask range.
fn missing_range(have: &[bool]) -> Option<(usize, usize)> {
    let start = have.iter().position(|&b| !b)?;
    let end = have[start..]
        .iter()
        .position(|&b| b)
        .map(|len| start + len)
        .unwrap_or(have.len());
    Some((start, end))
}

/// Record, mail, version-info and ribbon block for `slot`, straight
/// from a transfer section. The version block is shared by every slot;
/// ribbons are per slot. Any field falling outside its region is a
/// layout fault and fails the trade rather than shipping zeroed data.
fn extract_single(section: &[u8], slot: usize) -> Result<Pk3Single, TradeError> {
    let record_at = PARTY_BASE + slot * RECORD_LEN;
    let mail_at = MAIL_BASE + slot * MAIL_LEN;
    let ribbon_at = RIBBON_BASE + slot * RIBBON_LEN;
    if record_at + RECORD_LEN > MAIL_BASE
        || mail_at + MAIL_LEN > VERSION_AT
        || ribbon_at + RIBBON_LEN > MAIL_SUM_AT
    {
        return Err(TradeError::SectionLayout { slot });
    }

    let record = Pk3Record::from_bytes(&section[record_at..record_at + RECORD_LEN])?;
    let mut mail = [0u8; MAIL_LEN];
    mail.copy_from_slice(&section[mail_at..mail_at + MAIL_LEN]);
    let mut version_info = [0u8; VERSION_LEN];
    version_info.copy_from_slice(&section[VERSION_AT..VERSION_AT + VERSION_LEN]);
    let mut ribbon = [0u8; RIBBON_LEN];
    ribbon.copy_from_slice(&section[ribbon_at..ribbon_at + RIBBON_LEN]);
    Ok(Pk3Single {
        record,
        mail,
        version_info,
        ribbon,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_frames_round_trip_position_and_value() {
        let word = data_frame(447, 0xBEEF);
        assert!(is_data(word));
        assert_eq!(data_pos(word), 447);
        assert_eq!(data_value(word), 0xBEEF);
    }

    #[test]
    fn ask_frames_round_trip_ranges() {
        let word = ask_frame(12, 448);
        assert!(is_ask(word));
        assert!(!is_data(word));
        assert_eq!(ask_range(word), (12, 448));
    }

    #[test]
    fn menu_frames_carry_in_party_flag() {
        let word = menu_frame(0x83);
        assert_eq!(menu_value(word), Some(0x83));
        assert_eq!(menu_value(FLAG_DONE), None);
    }

    #[test]
    fn layout_constants_tile_the_section_exactly() {
        assert_eq!(PARTY_BASE, COUNT_AT + 2);
        assert_eq!(MAIL_BASE, PARTY_BASE + RECORD_LEN * 6);
        assert_eq!(VERSION_AT, MAIL_BASE + MAIL_LEN * 6);
        assert_eq!(RIBBON_BASE, VERSION_AT + VERSION_LEN);
        assert_eq!(MAIL_SUM_AT, RIBBON_BASE + RIBBON_LEN * 6);
        assert_eq!(GLOBAL_SUM_AT + 2, SECTION_LEN);
    }

    #[test]
    fn every_party_slot_extracts_with_its_own_ribbon() {
        let mut section = vec![0u8; SECTION_LEN];
        LittleEndian::write_u16(&mut section[COUNT_AT..COUNT_AT + 2], 6);
        section[VERSION_AT] = 3;
        for slot in 0..6 {
            section[RIBBON_BASE + slot * RIBBON_LEN] = 0x10 + slot as u8;
        }
        for slot in 0..6 {
            let single = extract_single(&section, slot).unwrap();
            assert_eq!(single.version_info, [3, 0]);
            assert_eq!(single.ribbon[0], 0x10 + slot as u8, "slot {slot}");
        }
    }

    #[test]
    fn checksums_round_trip_over_a_section() {
        let mut section: Vec<u8> = (0..SECTION_LEN as u32).map(|v| v as u8).collect();
        write_checksums(&mut section);
        assert!(checksums_valid(&section));
        section[PARTY_BASE] ^= 0xFF;
        assert!(!checksums_valid(&section));
    }

    #[test]
    fn missing_range_finds_first_gap() {
        let mut have = vec![true; 10];
        assert_eq!(missing_range(&have), None);
        have[3] = false;
        have[4] = false;
        assert_eq!(missing_range(&have), Some((3, 5)));
    }
}

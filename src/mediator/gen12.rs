//! Gen 1/2 trade machine.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::data::Generation;
use crate::exchange::SectionExchanger;
use crate::link::ByteLink;
use crate::negotiate::ExchangeMode;
use crate::party::japanese;
use crate::party::{self, gen12, PartySection, SingleMon};
use crate::relay::RelayClient;
use crate::validate::Validator;

use super::{version_payload, TradeError, TradeMediator, TradeTarget};

/// Offset of the patch list inside the patch section.
const PATCH_HEADER: usize = 7;
/// Gen 2 held-item ids that carry mail.
const MAIL_ITEMS: std::ops::RangeInclusive<u8> = 0xB5..=0xC0;
const ASK_NEED: u8 = 0x72;
const ASK_NONE: u8 = 0x43;
/// Hatch cycles written onto converted pool eggs.
const EGG_CYCLES: u8 = 10;
const POOL_WAIT: Duration = Duration::from_secs(120);
const FLL_WAIT: Duration = Duration::from_secs(120);

/// Cartridge byte set for one generation; Gen 1 sits 0x10 below Gen 2.
#[derive(Clone, Copy, Debug)]
struct MenuBytes {
    selection_base: u8,
    cancel: u8,
    accept: u8,
    decline: u8,
    end: u8,
}

impl MenuBytes {
    fn for_generation(generation: Generation) -> Self {
        match generation {
            Generation::Gen1 => Self {
                selection_base: 0x60,
                cancel: 0x6F,
                accept: 0x62,
                decline: 0x61,
                end: 0x6F,
            },
            _ => Self {
                selection_base: 0x70,
                cancel: 0x7F,
                accept: 0x72,
                decline: 0x71,
                end: 0x7F,
            },
        }
    }

    fn is_selection(&self, byte: u8) -> bool {
        (self.selection_base..self.selection_base + gen12::MAX_PARTY as u8).contains(&byte)
    }

    fn is_success(&self, byte: u8) -> bool {
        (0x90..=0x9F).contains(&byte) || self.is_selection(byte)
    }
}

fn handshake_bytes(generation: Generation) -> ([u8; 5], [u8; 5], [u8; 3], [u8; 3]) {
    match generation {
        Generation::Gen1 => (
            [0x01, 0x61, 0xD1, 0x00, 0xFE],
            [0x61, 0xD1, 0x00, 0xFE, 0xFE],
            [0x65, 0x65, 0x66],
            [0x65, 0x00, 0xFD],
        ),
        _ => (
            [0x01, 0x61, 0xD1, 0x00, 0xFE],
            [0x61, 0xD1, 0x00, 0xFE, 0xFE],
            [0x75, 0x75, 0x76],
            [0x75, 0x00, 0xFD],
        ),
    }
}

/// All sections of one side, in exchange order.
type SectionSet = Vec<Vec<u8>>;

/// Outcome of one pass through the trade menu.
enum MenuOutcome {
    /// A trade completed; flags say which sides owe a move refresh.
    Traded {
        we_send_mvs: bool,
        we_expect_mvs: bool,
    },
    /// One side declined; the menu restarts.
    Declined,
    /// The player backed out; the session ends.
    Cancelled,
    /// Ghost cycle driven to the no-thanks path while real data loads.
    Ghost,
}

impl<L: ByteLink> TradeMediator<'_, L> {
    pub(crate) fn run_gen12(&mut self) -> Result<(), TradeError> {
        self.warn_unvalidated();
        if self.tables.gen12.is_none() {
            return Err(TradeError::MissingTables("gen12"));
        }
        let bytes = MenuBytes::for_generation(self.config.generation);

        {
            let flood = self.start_version_flood();
            self.enter_room()?;
            flood.stop();
        }
        info!("entered the trade room");

        let mut peer_cache: Option<SectionSet> = None;
        // Carried across cycles: whether each side owes an MVS refresh.
        let mut we_send_mvs = false;
        let mut we_expect_mvs = false;
        let mut first_cycle = true;

        loop {
            self.check_stop()?;
            let flood = self.start_version_flood();
            self.sit_at_table()?;
            info!("sitting at the trade table");

            let blank = !we_send_mvs && !we_expect_mvs;
            let ghost = self.mode == ExchangeMode::Buffered
                && self.config.target == TradeTarget::Link
                && peer_cache.is_none();

            let (own_sections, peer_sections) = if first_cycle || blank {
                self.starting_sequence(&mut peer_cache)?
            } else {
                self.subsequent_sequence(&mut peer_cache, we_expect_mvs, we_send_mvs)?
            };
            first_cycle = false;
            flood.stop();

            let mut own = PartySection::new(self.config.generation, own_sections[1].clone())?;
            let mut peer = PartySection::new(self.config.generation, peer_sections[1].clone())?;
            let own_mail = own_sections.get(3).cloned();

            // Refresh pending from the previous cycle is consumed by
            // the sequence above; reset before the menu so a
            // cancellation re-enters clean.
            we_send_mvs = false;
            we_expect_mvs = false;

            let outcome = self.menu_cycle(&bytes, &mut own, &mut peer, own_mail.as_deref(), ghost)?;
            match outcome {
                MenuOutcome::Traded {
                    we_send_mvs: send,
                    we_expect_mvs: expect,
                } => {
                    we_send_mvs = send;
                    we_expect_mvs = expect;
                    let mut cache = peer_sections;
                    cache[1] = peer.into_bytes();
                    peer_cache = Some(cache);
                    if self.config.target == TradeTarget::Pool {
                        self.reconnect_for_pool()?;
                        peer_cache = None;
                    }
                    info!("trade cycle complete; returning to the table");
                }
                MenuOutcome::Declined => {
                    debug!("offer declined; menu restarts");
                    let mut cache = peer_sections;
                    cache[1] = peer.into_bytes();
                    peer_cache = Some(cache);
                }
                MenuOutcome::Ghost => {
                    debug!("ghost cycle cancelled in-game; waiting for peer data");
                    self.await_peer_sections(&mut peer_cache)?;
                }
                MenuOutcome::Cancelled => {
                    self.end_trade(&bytes)?;
                    info!("trade session ended");
                    return Ok(());
                }
            }
        }
    }

    fn enter_room(&mut self) -> Result<(), TradeError> {
        let (enter_send, enter_accept, _, _) = handshake_bytes(self.config.generation);
        let accepts: Vec<&[u8]> = enter_accept.iter().map(std::slice::from_ref).collect();
        self.handshake(&enter_send, &accepts)
    }

    fn sit_at_table(&mut self) -> Result<(), TradeError> {
        let (_, _, sit_send, sit_accept) = handshake_bytes(self.config.generation);
        let accepts: Vec<&[u8]> = sit_accept.iter().map(std::slice::from_ref).collect();
        self.handshake(&sit_send, &accepts)
    }

    fn end_trade(&mut self, bytes: &MenuBytes) -> Result<(), TradeError> {
        self.drain_until(bytes.end, bytes.end)?;
        self.drain_until(bytes.end, 0x00)
    }

    /// Full starting sequence: every section crosses the table, either
    /// synchronously or from cached/ghost data.
    fn starting_sequence(
        &mut self,
        peer_cache: &mut Option<SectionSet>,
    ) -> Result<(SectionSet, SectionSet), TradeError> {
        let generation = self.config.generation;
        let lengths = generation.section_lengths();
        debug!(sections = lengths.len(), "starting sequence");

        // Stage our random-section template for peers that pull it.
        let random_template = self.gen12_tables().base_random_section.clone();
        self.relay.stage(self.tag(b"RAN"), random_template);

        match (self.mode, self.config.target) {
            (ExchangeMode::Synchronous, TradeTarget::Link) => self.sync_sequence(),
            _ => self.buffered_sequence(peer_cache),
        }
    }

    fn sync_sequence(&mut self) -> Result<(SectionSet, SectionSet), TradeError> {
        let generation = self.config.generation;
        let lengths = generation.section_lengths().to_vec();
        let mut own = SectionSet::new();
        let mut peer = SectionSet::new();

        for section_index in 0..lengths.len() {
            if section_index == 3 && !self.any_mail_pending(&own, &peer) {
                // Neither side carries mail; skip the per-byte sync.
                let feed = self.gen12_tables().no_mail_section.clone();
                let own_mail = self.with_exchanger(|ex| ex.run_buffered(3, &feed))?;
                own.push(own_mail);
                peer.push(feed);
                continue;
            }
            let outcome = self.with_exchanger(|ex| ex.run_sync(section_index))?;
            own.push(outcome.own);
            peer.push(outcome.peer);
        }

        self.apply_japanese_ingest(&mut own);
        self.sanitize_peer_sections(&mut peer);
        Ok((own, peer))
    }

    fn buffered_sequence(
        &mut self,
        peer_cache: &mut Option<SectionSet>,
    ) -> Result<(SectionSet, SectionSet), TradeError> {
        let generation = self.config.generation;
        let lengths = generation.section_lengths().to_vec();

        let mut feeds = match (&peer_cache, self.config.target) {
            (Some(cache), _) => cache.clone(),
            (None, TradeTarget::Pool) => self.pool_sections()?,
            (None, TradeTarget::Link) => self.ghost_sections()?,
        };
        for (index, feed) in feeds.iter_mut().enumerate() {
            feed.resize(lengths[index], 0);
        }

        // A Japanese cartridge expects its own name layout and mail
        // charset on the wire.
        let mut cartridge_feeds = feeds.clone();
        self.apply_japanese_egress(&mut cartridge_feeds);

        let mut own = SectionSet::new();
        for (section_index, feed) in cartridge_feeds.iter().enumerate() {
            let collected = self.with_exchanger(|ex| ex.run_buffered(section_index, feed))?;
            own.push(collected);
        }
        self.apply_japanese_ingest(&mut own);

        if self.config.target == TradeTarget::Link {
            // One FLL blob per direction per cycle.
            let blob: Vec<u8> = own.iter().flatten().copied().collect();
            self.relay.send(self.tag(b"FLL"), blob)?;
            if let Some(fresh) = self.take_peer_sections() {
                *peer_cache = Some(fresh);
            }
        }

        let mut peer = feeds;
        self.sanitize_peer_sections(&mut peer);
        Ok((own, peer))
    }

    /// Post-trade re-entry with pending refreshes: receive the peer's
    /// MVS, feed sections from cache, send our own MVS.
    fn subsequent_sequence(
        &mut self,
        peer_cache: &mut Option<SectionSet>,
        we_expect_mvs: bool,
        we_send_mvs: bool,
    ) -> Result<(SectionSet, SectionSet), TradeError> {
        debug!("subsequent sequence");
        if we_expect_mvs {
            let body = self.recv_counter(self.tag(b"MVS"))?;
            let mut refresh = body.to_vec();
            Validator::new(self.tables).sanitize_moves(&mut refresh);
            if refresh.len() >= 8 {
                if let Some(cache) = peer_cache.as_mut() {
                    let mut section =
                        PartySection::new(self.config.generation, cache[1].clone())?;
                    let last = section.party_count() - 1;
                    let moves = refresh[0..4].try_into().unwrap_or([0; 4]);
                    let pps = refresh[4..8].try_into().unwrap_or([0; 4]);
                    section.apply_move_refresh(last, &moves, &pps);
                    info!(slot = last, "applied peer move refresh");
                    cache[1] = section.into_bytes();
                }
            }
        }

        let result = self.buffered_sequence(peer_cache)?;

        if we_send_mvs {
            // The peer expects our refresh: read the evolved moves
            // straight from the fresh cartridge data.
            let own_section = PartySection::new(self.config.generation, result.0[1].clone())?;
            let last = own_section.party_count() - 1;
            let (moves, pps) = own_section.moves_of(last);
            let mut body = Vec::with_capacity(8);
            body.extend_from_slice(&moves);
            body.extend_from_slice(&pps);
            self.send_counter(self.tag(b"MVS"), &body)?;
        }

        Ok(result)
    }

    /// One pass through the in-game trade menu.
    fn menu_cycle(
        &mut self,
        bytes: &MenuBytes,
        own: &mut PartySection,
        peer: &mut PartySection,
        own_mail: Option<&[u8]>,
        ghost: bool,
    ) -> Result<MenuOutcome, TradeError> {
        let selection =
            self.read_stable(0x00, |b| bytes.is_selection(b) || b == bytes.cancel)?;
        info!(selection = format_args!("{selection:#04x}"), "own selection confirmed");

        if ghost {
            // No peer data yet: back the cartridge out via the
            // no-thanks path and wait for the real party.
            self.drain_until(bytes.cancel, 0x00)?;
            return Ok(MenuOutcome::Ghost);
        }

        if selection == bytes.cancel {
            self.send_counter(self.tag(b"CHC"), &[bytes.cancel])?;
            return Ok(MenuOutcome::Cancelled);
        }

        let slot = usize::from(selection - bytes.selection_base);
        let offered = own.extract_single(slot, own_mail)?;
        info!(
            slot,
            species = %self.tables.species_name(u16::from(offered.species)),
            "offering"
        );

        let mut body = Vec::with_capacity(1 + SingleMon::wire_len(self.config.generation));
        body.push(selection);
        body.extend_from_slice(&offered.to_bytes());
        self.send_counter(self.tag(b"CHC"), &body)?;

        let (peer_selection, peer_mon) = self.peer_choice(bytes)?;
        if peer_selection == bytes.cancel {
            info!("peer cancelled the menu");
            self.drain_until(bytes.cancel, 0x00)?;
            return Ok(MenuOutcome::Cancelled);
        }
        let Some(peer_mon) = peer_mon else {
            return Ok(MenuOutcome::Declined);
        };
        let peer_slot = usize::from(peer_selection - bytes.selection_base);
        info!(
            peer_slot,
            species = %self.tables.species_name(u16::from(peer_mon.species)),
            "peer offers"
        );

        // Forward the peer's selection, then wait for ack and ready.
        self.drain_until(peer_selection, 0x00)?;
        self.drain_until(peer_selection, 0xFE)?;

        // Accept or decline.
        let decision = self.read_stable(0x00, |b| b == bytes.accept || b == bytes.decline)?;
        self.send_counter(self.tag(b"ACP"), &[decision])?;
        let peer_decision = match self.config.target {
            TradeTarget::Pool => bytes.accept,
            TradeTarget::Link => self
                .recv_counter(self.tag(b"ACP"))?
                .first()
                .copied()
                .unwrap_or(bytes.decline),
        };
        self.drain_until(peer_decision, 0x00)?;
        self.drain_until(peer_decision, 0xFE)?;

        if decision != bytes.accept || peer_decision != bytes.accept {
            info!("offer declined");
            return Ok(MenuOutcome::Declined);
        }

        // Both accepted: wait for the cartridge's success byte.
        let success = self.read_stable(0x00, |b| bytes.is_success(b))?;
        self.send_counter(self.tag(b"SUC"), &[success])?;
        if self.config.target == TradeTarget::Link {
            let _ = self.recv_counter(self.tag(b"SUC"))?;
        }
        self.link.exchange(success)?;
        self.drain_until(0x00, 0x00)?;
        self.drain_until_stable(0x00, 0xFE, 5)?;
        info!(
            sent = %self.tables.species_name(u16::from(offered.species)),
            received = %self.tables.species_name(u16::from(peer_mon.species)),
            "trade succeeded"
        );

        // Reproduce both new parties locally; no extra exchange needed.
        peer.swap_with_last(peer_slot, &offered)?;
        own.swap_with_last(slot, &peer_mon)?;

        // Need-data exchange: whoever sent away a special mon needs the
        // refreshed move block after the peer's cartridge evolves it.
        let sent_item = item_of(self.config.generation, &offered);
        let received_item = item_of(self.config.generation, &peer_mon);
        let we_expect = self.tables.is_special_mon(offered.species, sent_item);
        let we_send = self.tables.is_special_mon(peer_mon.species, received_item);
        self.send_counter(
            self.tag(b"ASK"),
            &[if we_expect { ASK_NEED } else { ASK_NONE }],
        )?;
        let we_send_mvs = match self.config.target {
            TradeTarget::Pool => false,
            TradeTarget::Link => {
                let ask = self.recv_counter(self.tag(b"ASK"))?;
                ask.first().copied() == Some(ASK_NEED) || we_send
            }
        };
        let we_expect_mvs = self.config.target == TradeTarget::Link && we_expect;

        Ok(MenuOutcome::Traded {
            we_send_mvs,
            we_expect_mvs,
        })
    }

    /// The peer's (or the pool's) trade choice with its sanitized
    /// single-Pokémon record.
    fn peer_choice(
        &mut self,
        bytes: &MenuBytes,
    ) -> Result<(u8, Option<SingleMon>), TradeError> {
        if self.config.target == TradeTarget::Pool {
            // The server-side pool always offers its slot 0.
            return Ok((bytes.selection_base, self.pool_mon.take()));
        }
        let body = self.recv_counter(self.tag(b"CHC"))?;
        let Some((&selection, record)) = body.split_first() else {
            return Ok((bytes.cancel, None));
        };
        if selection == bytes.cancel || record.is_empty() {
            return Ok((selection, None));
        }
        let mut record = record.to_vec();
        Validator::new(self.tables).sanitize_single(&mut record);
        let mon = SingleMon::from_bytes(self.config.generation, &record)?;
        Ok((selection, Some(mon)))
    }

    /// Feeds for a ghost cycle: the bundled default party.
    fn ghost_sections(&mut self) -> Result<SectionSet, TradeError> {
        let blob = self
            .gen12_tables()
            .base_party
            .clone()
            .ok_or(TradeError::MissingTables("base party template"))?;
        Ok(split_sections(self.config.generation, &blob))
    }

    /// Feeds for a pool cycle, built around the server's Pokémon.
    fn pool_sections(&mut self) -> Result<SectionSet, TradeError> {
        self.relay
            .send(self.tag(b"VES"), version_payload().to_vec())?;
        let raw = self.relay.poll(
            self.tag(b"POL"),
            POOL_WAIT,
            Duration::from_millis(100),
        )?;
        let mut raw = raw.to_vec();
        Validator::new(self.tables).sanitize_single(&mut raw);
        let mon = SingleMon::from_bytes(self.config.generation, &raw)?;
        info!(
            species = %self.tables.species_name(u16::from(mon.species)),
            "pool offers"
        );

        let trainer_id = pool_trainer_id(self.config.generation, &mon);
        let mut section = party::gen12::section_for_single(
            self.config.generation,
            POOL_TRADER_NAME,
            trainer_id,
            &mon,
        )?;
        if self.config.egg_trade && self.config.generation == Generation::Gen2 {
            section.convert_to_egg(0, self.tables, EGG_CYCLES);
            info!("pool Pokémon delivered as an egg");
        }
        self.pool_mon = section.extract_single(0, None).ok();

        let generation = self.config.generation;
        let tables = self.gen12_tables();
        let mut sections = SectionSet::new();
        sections.push(tables.base_random_section.clone());

        let mut pokemon = section.into_bytes();
        let list = party::create_patch_list(&mut pokemon);
        sections.push(pokemon);

        let mut patch_section = vec![0u8; generation.section_lengths()[2]];
        let end = (PATCH_HEADER + list.len()).min(patch_section.len());
        patch_section[PATCH_HEADER..end]
            .copy_from_slice(&list[..end - PATCH_HEADER]);
        sections.push(patch_section);

        if generation == Generation::Gen2 {
            sections.push(tables.no_mail_section.clone());
        }
        Ok(sections)
    }

    fn reconnect_for_pool(&mut self) -> Result<(), TradeError> {
        let Some(addr) = self.config.relay_addr.clone() else {
            return Ok(());
        };
        debug!("reconnecting relay to refresh the pool");
        let client = RelayClient::connect(addr.as_str(), &self.config.room)?;
        self.relay = Arc::new(client);
        Ok(())
    }

    fn take_peer_sections(&mut self) -> Option<SectionSet> {
        let blob = self.relay.take(self.tag(b"FLL"))?;
        let expected: usize = self.config.generation.section_lengths().iter().sum();
        if blob.len() != expected {
            warn!(got = blob.len(), expected, "discarding malformed FLL blob");
            return None;
        }
        Some(split_sections(self.config.generation, &blob))
    }

    fn await_peer_sections(
        &mut self,
        peer_cache: &mut Option<SectionSet>,
    ) -> Result<(), TradeError> {
        let tag = self.tag(b"FLL");
        let blob = self
            .relay
            .poll(tag, FLL_WAIT, Duration::from_millis(100))?;
        let expected: usize = self.config.generation.section_lengths().iter().sum();
        if blob.len() == expected {
            *peer_cache = Some(split_sections(self.config.generation, &blob));
        } else {
            warn!(got = blob.len(), expected, "peer FLL blob has wrong length");
        }
        Ok(())
    }

    /// Normalizes sections read from a Japanese cartridge into the
    /// International layout: name fields widen to eleven bytes with
    /// 0x50 padding, mail bodies translate through the lookup table.
    fn apply_japanese_ingest(&self, sections: &mut SectionSet) {
        if !self.config.japanese {
            return;
        }
        let Some(jp) = &self.tables.japanese else {
            return;
        };
        if let Some(section) = sections.get_mut(1) {
            for base in gen12::name_field_offsets(self.config.generation) {
                let widened = japanese::widen_name(&section[base..base + gen12::JP_NAME_LEN]);
                section[base..base + gen12::NAME_LEN].copy_from_slice(&widened);
            }
        }
        if let Some(mail) = sections.get_mut(3) {
            for entry in 0..gen12::MAX_PARTY {
                let at = entry * gen12::MAIL_ENTRY_LEN;
                japanese::translate_mail(&mut mail[at..at + 33], &jp.mail_jp_to_en);
            }
        }
    }

    /// The inverse conversion before feeding peer data to a Japanese
    /// cartridge.
    fn apply_japanese_egress(&self, sections: &mut SectionSet) {
        if !self.config.japanese {
            return;
        }
        let Some(jp) = &self.tables.japanese else {
            return;
        };
        if let Some(section) = sections.get_mut(1) {
            for base in gen12::name_field_offsets(self.config.generation) {
                let narrowed = japanese::narrow_name(&section[base..base + gen12::NAME_LEN]);
                section[base..base + gen12::JP_NAME_LEN].copy_from_slice(&narrowed);
                section[base + gen12::JP_NAME_LEN..base + gen12::NAME_LEN]
                    .fill(crate::data::text::TERMINATOR_GB);
            }
        }
        if let Some(mail) = sections.get_mut(3) {
            for entry in 0..gen12::MAX_PARTY {
                let at = entry * gen12::MAIL_ENTRY_LEN;
                japanese::translate_mail(&mut mail[at..at + 33], &jp.mail_en_to_jp);
            }
        }
    }

    fn sanitize_peer_sections(&self, sections: &mut SectionSet) {
        let validator = Validator::new(self.tables);
        for (index, section) in sections.iter_mut().enumerate() {
            validator.sanitize_section(index, section);
        }
    }

    fn any_mail_pending(&self, own: &SectionSet, peer: &SectionSet) -> bool {
        [own, peer].iter().any(|set| {
            set.get(1)
                .and_then(|raw| PartySection::new(self.config.generation, raw.clone()).ok())
                .is_some_and(|section| {
                    (0..section.party_count())
                        .any(|slot| MAIL_ITEMS.contains(&section.held_item_at(slot)))
                })
        })
    }

    fn gen12_tables(&self) -> &crate::data::Gen12Tables {
        self.tables
            .gen12
            .as_ref()
            .expect("gen12 tables checked at session start")
    }

    fn with_exchanger<T>(
        &mut self,
        run: impl FnOnce(&mut SectionExchanger<'_, L>) -> Result<T, crate::exchange::ExchangeError>,
    ) -> Result<T, TradeError> {
        let mut exchanger = SectionExchanger::new(
            &mut self.link,
            self.relay.as_ref(),
            self.config.generation,
            Arc::clone(&self.stop),
        );
        exchanger.format = self.sng_format;
        let result = run(&mut exchanger);
        self.sng_format = exchanger.sng_format();
        result.map_err(TradeError::from)
    }
}

/// `POOL` in the Gen 1/2 charset, terminator padded.
const POOL_TRADER_NAME: &[u8] = &[0x8F, 0x8E, 0x8E, 0x8B, 0x50, 0x50, 0x50, 0x50, 0x50, 0x50, 0x50];

fn item_of(generation: Generation, mon: &SingleMon) -> u8 {
    match generation {
        Generation::Gen1 => mon.record.get(7).copied().unwrap_or(0),
        _ => mon.record.get(1).copied().unwrap_or(0),
    }
}

fn pool_trainer_id(generation: Generation, mon: &SingleMon) -> u16 {
    let offset = match generation {
        Generation::Gen1 => 12,
        _ => 6,
    };
    match mon.record.get(offset..offset + 2) {
        Some(pair) => u16::from_be_bytes([pair[0], pair[1]]),
        None => 0,
    }
}

fn split_sections(generation: Generation, blob: &[u8]) -> SectionSet {
    let mut sections = SectionSet::new();
    let mut offset = 0;
    for &length in generation.section_lengths() {
        let end = (offset + length).min(blob.len());
        let mut section = blob[offset..end].to_vec();
        section.resize(length, 0);
        sections.push(section);
        offset = end;
    }
    sections
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn menu_bytes_shift_down_for_gen1() {
        let gen1 = MenuBytes::for_generation(Generation::Gen1);
        let gen2 = MenuBytes::for_generation(Generation::Gen2);
        assert_eq!(gen1.selection_base, gen2.selection_base - 0x10);
        assert_eq!(gen1.cancel, gen2.cancel - 0x10);
        assert!(gen2.is_selection(0x70));
        assert!(gen2.is_selection(0x75));
        assert!(!gen2.is_selection(0x76));
    }

    #[test]
    fn success_accepts_implicit_new_selection() {
        let bytes = MenuBytes::for_generation(Generation::Gen2);
        assert!(bytes.is_success(0x91));
        assert!(bytes.is_success(0x70));
        assert!(!bytes.is_success(0x20));
    }

    #[test]
    fn split_sections_pads_and_slices() {
        let blob: Vec<u8> = (0..1036u16).map(|v| v as u8).collect();
        let sections = split_sections(Generation::Gen2, &blob);
        assert_eq!(sections.len(), 4);
        assert_eq!(sections[0].len(), 10);
        assert_eq!(sections[1].len(), 444);
        assert_eq!(sections[2].len(), 197);
        assert_eq!(sections[3].len(), 385);
    }

    #[test]
    fn mail_items_cover_the_mail_range() {
        assert!(MAIL_ITEMS.contains(&0xB5));
        assert!(MAIL_ITEMS.contains(&0xC0));
        assert!(!MAIL_ITEMS.contains(&0xB0));
    }
}

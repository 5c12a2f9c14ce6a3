//! Trade mediator.
//!
//! The per-generation state machine driving a session: enter the Cable
//! Club, sit at the table, run the starting sequence, then loop on the
//! trade menu until cancelled. Cartridge I/O and peer I/O interleave at
//! well-defined suspension points; all shared state (inbox, counters,
//! caches) is owned here.

mod flood;
mod gen3;
mod gen12;

pub use flood::VersionFlood;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::data::{Generation, StaticTables};
use crate::exchange::ExchangeError;
use crate::link::{ByteLink, LinkError, VoltageMode, NO_DATA};
use crate::negotiate::{self, ExchangeMode};
use crate::party::PartyError;
use crate::relay::{CounterChannel, RelayClient, RelayError, Tag};

/// Keep-alive byte ignored while polling the cartridge for a decision.
const KEEP_ALIVE: u8 = 0xFE;
/// Consecutive identical reads required to trust a cartridge decision.
const STABLE_READS: usize = 10;
/// Peer-join cap for the first counter-tagged exchange of a session.
const PEER_JOIN_CAP: Duration = Duration::from_secs(120);
const MENU_POLL: Duration = Duration::from_millis(50);

#[derive(Debug, Error)]
pub enum TradeError {
    #[error(transparent)]
    Link(#[from] LinkError),
    #[error(transparent)]
    Relay(#[from] RelayError),
    #[error(transparent)]
    Exchange(#[from] ExchangeError),
    #[error(transparent)]
    Party(#[from] PartyError),
    #[error("required table group missing: {0}")]
    MissingTables(&'static str),
    #[error("transfer section cannot hold slot {slot}")]
    SectionLayout { slot: usize },
    #[error("trade stopped")]
    Stopped,
}

impl TradeError {
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            TradeError::Link(_)
                | TradeError::Stopped
                | TradeError::MissingTables(_)
                | TradeError::SectionLayout { .. }
        )
    }
}

/// Who sits on the other side of the table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TradeTarget {
    /// A second player reached through the relay room.
    Link,
    /// The server-side Pokémon pool.
    Pool,
}

/// Session wiring handed to [`TradeMediator::new`].
pub struct SessionConfig {
    pub generation: Generation,
    pub target: TradeTarget,
    pub preferred_mode: ExchangeMode,
    /// Deliver the pool Pokémon as an egg (Gen 2 pool trades).
    pub egg_trade: bool,
    /// Japanese cartridge on our side of the link.
    pub japanese: bool,
    /// Relay endpoint, kept so pool re-trades can reconnect and force
    /// a fresh server-side Pokémon.
    pub relay_addr: Option<String>,
    pub room: String,
}

/// The per-session trade state machine.
pub struct TradeMediator<'a, L> {
    pub(crate) link: L,
    pub(crate) relay: Arc<RelayClient>,
    pub(crate) tables: &'a StaticTables,
    pub(crate) config: SessionConfig,
    pub(crate) counters: CounterChannel,
    pub(crate) stop: Arc<AtomicBool>,
    pub(crate) mode: ExchangeMode,
    /// SNG wire format detected on the first peer frame, carried across
    /// section exchanges.
    pub(crate) sng_format: Option<crate::exchange::SngFormat>,
    /// The pool Pokémon staged for the current cycle (pool trades).
    pub(crate) pool_mon: Option<crate::party::SingleMon>,
    pub(crate) gen3_pool_mon: Option<crate::party::Pk3Single>,
}

impl<'a, L: ByteLink> TradeMediator<'a, L> {
    pub fn new(
        mut link: L,
        relay: RelayClient,
        tables: &'a StaticTables,
        config: SessionConfig,
    ) -> Result<Self, TradeError> {
        let voltage = match config.generation {
            Generation::Gen3 => VoltageMode::Gba,
            _ => VoltageMode::Gb,
        };
        link.set_voltage(voltage)?;
        let mode = config.preferred_mode;
        Ok(Self {
            link,
            relay: Arc::new(relay),
            tables,
            config,
            counters: CounterChannel::new(),
            stop: Arc::new(AtomicBool::new(false)),
            mode,
            sng_format: None,
            pool_mon: None,
            gen3_pool_mon: None,
        })
    }

    /// Cancellation flag shared with the UI; every suspension point
    /// rechecks it.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    pub fn mode(&self) -> ExchangeMode {
        self.mode
    }

    /// Runs the session until the trade ends or is stopped.
    ///
    /// `mode_prompt` is consulted when the peer wins the mode tiebreak.
    pub fn run(&mut self, mode_prompt: &mut dyn FnMut(ExchangeMode) -> bool) -> Result<(), TradeError> {
        info!(
            generation = %self.config.generation,
            target = ?self.config.target,
            "trade session starting"
        );

        if self.config.target == TradeTarget::Link && self.config.generation != Generation::Gen3 {
            let mut rng = rand::thread_rng();
            self.mode = negotiate::negotiate(
                &self.relay,
                &mut self.counters,
                self.config.generation,
                self.config.preferred_mode,
                &mut rng,
                mode_prompt,
            )?;
        } else if self.config.target == TradeTarget::Pool {
            // Pool trades have no peer cartridge to synchronize with.
            self.mode = ExchangeMode::Buffered;
        }
        info!(mode = %self.mode, "exchange mode fixed");

        match self.config.generation {
            Generation::Gen1 | Generation::Gen2 => self.run_gen12(),
            Generation::Gen3 => self.run_gen3(),
        }
    }

    pub(crate) fn check_stop(&self) -> Result<(), TradeError> {
        if self.stop.load(Ordering::Relaxed) {
            return Err(TradeError::Stopped);
        }
        Ok(())
    }

    pub(crate) fn tag(&self, prefix: &[u8; 3]) -> Tag {
        Tag::family(prefix, self.config.generation)
    }

    /// Sends each byte of `sends` until the cartridge's response is in
    /// the matching accept set.
    pub(crate) fn handshake(
        &mut self,
        sends: &[u8],
        accepts: &[&[u8]],
    ) -> Result<(), TradeError> {
        for (send, accept) in sends.iter().zip(accepts) {
            loop {
                self.check_stop()?;
                let response = self.link.exchange(*send)?;
                if accept.contains(&response) {
                    break;
                }
            }
        }
        Ok(())
    }

    /// Polls the cartridge with `out` until `STABLE_READS` consecutive
    /// reads return the same accepted byte. `NO_DATA` and the 0xFE
    /// keep-alive never count.
    pub(crate) fn read_stable(
        &mut self,
        out: u8,
        accept: impl Fn(u8) -> bool,
    ) -> Result<u8, TradeError> {
        let mut candidate = None;
        let mut run = 0usize;
        loop {
            self.check_stop()?;
            let response = self.link.exchange(out)?;
            if response == NO_DATA || response == KEEP_ALIVE || !accept(response) {
                candidate = None;
                run = 0;
                continue;
            }
            match candidate {
                Some(current) if current == response => {
                    run += 1;
                    if run >= STABLE_READS {
                        return Ok(response);
                    }
                }
                _ => {
                    candidate = Some(response);
                    run = 1;
                }
            }
        }
    }

    /// Drains the cartridge with `out` until it answers `want`.
    pub(crate) fn drain_until(&mut self, out: u8, want: u8) -> Result<(), TradeError> {
        loop {
            self.check_stop()?;
            if self.link.exchange(out)? == want {
                return Ok(());
            }
        }
    }

    /// Drains until `want` is seen `runs` times in a row.
    pub(crate) fn drain_until_stable(
        &mut self,
        out: u8,
        want: u8,
        runs: usize,
    ) -> Result<(), TradeError> {
        let mut seen = 0usize;
        loop {
            self.check_stop()?;
            if self.link.exchange(out)? == want {
                seen += 1;
                if seen >= runs {
                    return Ok(());
                }
            } else {
                seen = 0;
            }
        }
    }

    /// Counter-tagged receive with the peer-join cap and the menu poll
    /// cadence.
    pub(crate) fn recv_counter(&mut self, tag: Tag) -> Result<bytes::Bytes, TradeError> {
        let body = self
            .counters
            .recv(&self.relay, tag, PEER_JOIN_CAP, MENU_POLL)?;
        debug!(%tag, len = body.len(), "counter-tagged message accepted");
        Ok(body)
    }

    pub(crate) fn send_counter(&mut self, tag: Tag, body: &[u8]) -> Result<(), TradeError> {
        self.counters.send(&self.relay, tag, body)?;
        Ok(())
    }

    /// Starts the periodic version announce used to survive races while
    /// entering and sitting.
    pub(crate) fn start_version_flood(&self) -> VersionFlood {
        VersionFlood::start(
            Arc::clone(&self.relay),
            self.tag(b"VEC"),
            version_payload().to_vec(),
        )
    }

    pub(crate) fn warn_unvalidated(&self) {
        match self.config.generation {
            Generation::Gen1 => {
                warn!("gen 1 link path has not been validated on hardware")
            }
            Generation::Gen3 if self.config.target == TradeTarget::Link => {
                warn!("gen 3 link path has not been validated on hardware")
            }
            _ => {}
        }
    }
}

/// Six-byte version announce payload: three u16 LE components.
pub(crate) fn version_payload() -> [u8; 6] {
    let mut parts = env!("CARGO_PKG_VERSION")
        .split('.')
        .map(|part| part.parse::<u16>().unwrap_or(0));
    let mut payload = [0u8; 6];
    for slot in 0..3 {
        let value = parts.next().unwrap_or(0);
        payload[slot * 2..slot * 2 + 2].copy_from_slice(&value.to_le_bytes());
    }
    payload
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_payload_encodes_three_components() {
        let payload = version_payload();
        let minor = u16::from_le_bytes([payload[2], payload[3]]);
        assert_eq!(minor, 4);
    }
}

//! Buffered-vs-synchronous mode negotiation.
//!
//! Both peers stage their preferred mode under `BUF` so the
//! counterpart's first poll is answered immediately. Disagreement is
//! settled by a counter-tagged random tiebreak over `NEG`: the higher
//! roll keeps its mode, the loser is asked (via callback) whether to
//! follow. Ties redraw; after ten rounds the session falls back to
//! synchronous.

use std::time::{Duration, Instant};

use rand::Rng;
use tracing::{debug, info, warn};

use crate::data::Generation;
use crate::relay::{CounterChannel, RelayClient, RelayError, Tag};

pub const MODE_BUFFERED: u8 = 0x85;
pub const MODE_SYNCHRONOUS: u8 = 0x12;

const MAX_ROUNDS: usize = 10;
const NEGOTIATION_CAP: Duration = Duration::from_secs(30);
const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExchangeMode {
    Buffered,
    Synchronous,
}

impl ExchangeMode {
    pub fn as_byte(self) -> u8 {
        match self {
            ExchangeMode::Buffered => MODE_BUFFERED,
            ExchangeMode::Synchronous => MODE_SYNCHRONOUS,
        }
    }

    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            MODE_BUFFERED => Some(ExchangeMode::Buffered),
            MODE_SYNCHRONOUS => Some(ExchangeMode::Synchronous),
            _ => None,
        }
    }
}

impl std::fmt::Display for ExchangeMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExchangeMode::Buffered => write!(f, "buffered"),
            ExchangeMode::Synchronous => write!(f, "synchronous"),
        }
    }
}

/// One-shot mode agreement at link-session start.
///
/// `prompt` is invoked on the losing side with the winner's mode and
/// returns whether the user accepts it.
pub fn negotiate<R: Rng>(
    client: &RelayClient,
    counters: &mut CounterChannel,
    generation: Generation,
    preferred: ExchangeMode,
    rng: &mut R,
    prompt: &mut dyn FnMut(ExchangeMode) -> bool,
) -> Result<ExchangeMode, RelayError> {
    let buf_tag = Tag::family(b"BUF", generation);
    let neg_tag = Tag::family(b"NEG", generation);

    let mut ours = preferred;
    counters.stage(client, buf_tag, &[ours.as_byte()]);

    // One cap covers the whole negotiation; every wait below draws on
    // the same deadline.
    let deadline = Instant::now() + NEGOTIATION_CAP;

    for round in 0..MAX_ROUNDS {
        let theirs = match recv_mode(client, counters, buf_tag, deadline) {
            Ok(mode) => mode,
            Err(RelayError::PollTimeout { .. }) => {
                warn!("mode negotiation timed out; defaulting to synchronous");
                return Ok(ExchangeMode::Synchronous);
            }
            Err(err) => return Err(err),
        };

        if theirs == ours {
            info!(mode = %ours, "exchange mode agreed");
            return Ok(ours);
        }

        // Random tiebreak: both send a roll; higher wins, ties redraw.
        let our_roll: u8 = rng.gen();
        counters.send(client, neg_tag, &[our_roll])?;
        let remaining = deadline.saturating_duration_since(Instant::now());
        let their_roll = match counters.recv(client, neg_tag, remaining, POLL_INTERVAL) {
            Ok(body) if !body.is_empty() => body[0],
            Ok(_) => continue,
            Err(RelayError::PollTimeout { .. }) => {
                warn!("tiebreak timed out; defaulting to synchronous");
                return Ok(ExchangeMode::Synchronous);
            }
            Err(err) => return Err(err),
        };

        debug!(round, our_roll, their_roll, "mode tiebreak");
        if our_roll == their_roll {
            continue;
        }
        if our_roll < their_roll {
            // We lost: the user decides whether to adopt their mode.
            if prompt(theirs) {
                ours = theirs;
            }
        }
        counters.send(client, buf_tag, &[ours.as_byte()])?;
    }

    warn!("mode negotiation did not converge; defaulting to synchronous");
    Ok(ExchangeMode::Synchronous)
}

fn recv_mode(
    client: &RelayClient,
    counters: &mut CounterChannel,
    buf_tag: Tag,
    deadline: Instant,
) -> Result<ExchangeMode, RelayError> {
    loop {
        if let Some(body) = counters.try_recv(client, buf_tag) {
            if let Some(mode) = body.first().copied().and_then(ExchangeMode::from_byte) {
                return Ok(mode);
            }
        }
        if Instant::now() >= deadline {
            return Err(RelayError::PollTimeout { tag: buf_tag });
        }
        client.request(buf_tag)?;
        std::thread::sleep(POLL_INTERVAL);
    }
}

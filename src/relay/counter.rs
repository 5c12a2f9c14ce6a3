//! Counter-tagged messaging.
//!
//! Sequenced operations prepend a wrapping u8 counter to the payload.
//! An incoming counter `c` is accepted iff `(c - expected) mod 256`
//! is at most 128; anything else is a stale room echo and is dropped.
//! The expected counter is adopted from the first accepted message,
//! never assumed to start at zero.

use std::time::Duration;

use bytes::Bytes;
use tracing::debug;

use super::{RelayClient, RelayError, Tag};

const ACCEPT_WINDOW: u8 = 128;

/// Per-session counter state for both directions.
#[derive(Debug, Default)]
pub struct CounterChannel {
    outbound: u8,
    expected: Option<u8>,
}

impl CounterChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publishes `body` under `tag` with the next outbound counter.
    pub fn send(
        &mut self,
        client: &RelayClient,
        tag: Tag,
        body: &[u8],
    ) -> Result<(), RelayError> {
        let mut payload = Vec::with_capacity(1 + body.len());
        payload.push(self.outbound);
        payload.extend_from_slice(body);
        self.outbound = self.outbound.wrapping_add(1);
        client.send(tag, payload)
    }

    /// Stages `body` in the outbox with the next outbound counter
    /// without publishing it.
    pub fn stage(&mut self, client: &RelayClient, tag: Tag, body: &[u8]) {
        let mut payload = Vec::with_capacity(1 + body.len());
        payload.push(self.outbound);
        payload.extend_from_slice(body);
        self.outbound = self.outbound.wrapping_add(1);
        client.stage(tag, payload);
    }

    /// Takes the inbox value for `tag` if its counter advances the
    /// expected window; stale frames are dropped silently.
    pub fn try_recv(&mut self, client: &RelayClient, tag: Tag) -> Option<Bytes> {
        let payload = client.take(tag)?;
        self.accept(tag, payload)
    }

    /// Polls `tag` until a counter-advancing frame arrives or `timeout`
    /// elapses. Stale frames consume a poll round and re-request.
    pub fn recv(
        &mut self,
        client: &RelayClient,
        tag: Tag,
        timeout: Duration,
        interval: Duration,
    ) -> Result<Bytes, RelayError> {
        let deadline = std::time::Instant::now() + timeout;
        loop {
            if let Some(body) = self.try_recv(client, tag) {
                return Ok(body);
            }
            if std::time::Instant::now() >= deadline {
                return Err(RelayError::PollTimeout { tag });
            }
            client.request(tag)?;
            std::thread::sleep(interval);
        }
    }

    fn accept(&mut self, tag: Tag, payload: Bytes) -> Option<Bytes> {
        let (&counter, body) = payload.split_first()?;
        match self.expected {
            None => {
                // First counter-tagged frame of the session fixes the
                // expected counter.
                let _ = body;
                self.expected = Some(counter.wrapping_add(1));
                Some(payload.slice(1..))
            }
            Some(expected) => {
                let distance = counter.wrapping_sub(expected);
                if distance <= ACCEPT_WINDOW {
                    self.expected = Some(counter.wrapping_add(1));
                    Some(payload.slice(1..))
                } else {
                    debug!(%tag, counter, expected, "dropping stale counter-tagged frame");
                    None
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn accept(channel: &mut CounterChannel, counter: u8) -> bool {
        let mut payload = vec![counter];
        payload.push(0x70);
        channel
            .accept(Tag::new(*b"CHC2"), Bytes::from(payload))
            .is_some()
    }

    #[test]
    fn first_frame_fixes_expected_counter() {
        let mut channel = CounterChannel::new();
        assert!(accept(&mut channel, 42));
        assert_eq!(channel.expected, Some(43));
    }

    #[test]
    fn stale_counter_outside_window_is_dropped() {
        let mut channel = CounterChannel::new();
        channel.expected = Some(13);
        // (12 - 13) mod 256 = 255 > 128: stale.
        assert!(!accept(&mut channel, 12));
        assert_eq!(channel.expected, Some(13));
    }

    #[test]
    fn counter_inside_window_advances_expected() {
        let mut channel = CounterChannel::new();
        channel.expected = Some(13);
        assert!(accept(&mut channel, 13));
        assert_eq!(channel.expected, Some(14));
        assert!(accept(&mut channel, 20));
        assert_eq!(channel.expected, Some(21));
    }

    #[test]
    fn window_wraps_modulo_256() {
        let mut channel = CounterChannel::new();
        channel.expected = Some(250);
        assert!(accept(&mut channel, 4));
        assert_eq!(channel.expected, Some(5));
    }

    #[test]
    fn duplicate_delivery_is_rejected_after_accept() {
        let mut channel = CounterChannel::new();
        assert!(accept(&mut channel, 7));
        // The room re-delivers the same frame; it is now stale.
        assert!(!accept(&mut channel, 7));
    }
}

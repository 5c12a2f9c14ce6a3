//! Periodic version-announce task.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{bounded, RecvTimeoutError, Sender};
use tracing::trace;

use crate::relay::{RelayClient, Tag};

const FLOOD_INTERVAL: Duration = Duration::from_millis(200);

/// Emits a version announce every 200 ms while trade setup is in
/// progress, so the peer sees us despite enter/sit races. Stopped
/// explicitly at the end of each starting sequence.
pub struct VersionFlood {
    stop_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl VersionFlood {
    pub fn start(relay: Arc<RelayClient>, tag: Tag, payload: Vec<u8>) -> Self {
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let handle = thread::Builder::new()
            .name("version-flood".to_string())
            .spawn(move || loop {
                if relay.send(tag, payload.clone()).is_err() {
                    break;
                }
                trace!(%tag, "version announce");
                match stop_rx.recv_timeout(FLOOD_INTERVAL) {
                    Err(RecvTimeoutError::Timeout) => {}
                    _ => break,
                }
            })
            .ok();
        Self {
            stop_tx: Some(stop_tx),
            handle,
        }
    }

    /// Stops the flood and joins the task.
    pub fn stop(mut self) {
        self.halt();
    }

    fn halt(&mut self) {
        self.stop_tx.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for VersionFlood {
    fn drop(&mut self) {
        self.halt();
    }
}

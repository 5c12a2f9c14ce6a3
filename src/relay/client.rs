//! Relay client over a blocking TCP connection.

use std::collections::BTreeMap;
use std::io::Write;
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use bytes::Bytes;
use tracing::{debug, trace, warn};

use super::{FrameReader, RelayError, RelayFrame, Tag};

const ROOM_TAG: Tag = Tag::new(*b"ROOM");

struct Shared {
    writer: Mutex<TcpStream>,
    inbox: Mutex<BTreeMap<Tag, Bytes>>,
    outbox: Mutex<BTreeMap<Tag, Bytes>>,
    connected: AtomicBool,
}

impl Shared {
    fn write_frame(&self, frame: &RelayFrame) -> Result<(), RelayError> {
        if !self.connected.load(Ordering::Acquire) {
            return Err(RelayError::Closed);
        }
        let mut writer = self.writer.lock().unwrap_or_else(|e| e.into_inner());
        writer.write_all(&frame.encode()).map_err(|err| {
            self.connected.store(false, Ordering::Release);
            RelayError::Io(err)
        })
    }
}

/// Typed message queue over the relay connection.
///
/// A background reader thread demultiplexes incoming frames by tag into
/// the single-slot inbox (latest wins) and answers peer polls from the
/// outbox. All client methods are non-blocking apart from [`poll`].
///
/// [`poll`]: RelayClient::poll
pub struct RelayClient {
    shared: Arc<Shared>,
    reader: Option<JoinHandle<()>>,
}

impl RelayClient {
    /// Connects to the relay and joins `room`.
    pub fn connect(addr: impl ToSocketAddrs, room: &str) -> Result<Self, RelayError> {
        let stream = TcpStream::connect(addr)?;
        Self::from_stream(stream, room)
    }

    /// Wraps an already-connected stream; used by tests and by pool
    /// reconnects.
    pub fn from_stream(stream: TcpStream, room: &str) -> Result<Self, RelayError> {
        stream.set_nodelay(true)?;
        let reader_stream = stream.try_clone()?;
        let shared = Arc::new(Shared {
            writer: Mutex::new(stream),
            inbox: Mutex::new(BTreeMap::new()),
            outbox: Mutex::new(BTreeMap::new()),
            connected: AtomicBool::new(true),
        });

        shared.write_frame(&RelayFrame::send(ROOM_TAG, room.as_bytes().to_vec()))?;

        let reader_shared = Arc::clone(&shared);
        let reader = thread::Builder::new()
            .name("relay-reader".to_string())
            .spawn(move || run_reader(reader_shared, reader_stream))
            .map_err(RelayError::Io)?;

        Ok(Self {
            shared,
            reader: Some(reader),
        })
    }

    pub fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::Acquire)
    }

    /// Publishes `payload` under `tag` and records it as the outbox
    /// value served to peer polls.
    pub fn send(&self, tag: Tag, payload: impl Into<Bytes>) -> Result<(), RelayError> {
        let payload = payload.into();
        self.stage(tag, payload.clone());
        trace!(%tag, len = payload.len(), "relay send");
        self.shared.write_frame(&RelayFrame::send(tag, payload))
    }

    /// Records an outbox value without publishing it; the peer's next
    /// `G` for the tag is answered with it.
    pub fn stage(&self, tag: Tag, payload: impl Into<Bytes>) {
        let mut outbox = self.shared.outbox.lock().unwrap_or_else(|e| e.into_inner());
        outbox.insert(tag, payload.into());
    }

    /// Asks the room for the latest value of `tag`.
    pub fn request(&self, tag: Tag) -> Result<(), RelayError> {
        self.shared.write_frame(&RelayFrame::get(tag))
    }

    /// Takes the inbox value for `tag`, if one has arrived.
    pub fn take(&self, tag: Tag) -> Option<Bytes> {
        let mut inbox = self.shared.inbox.lock().unwrap_or_else(|e| e.into_inner());
        inbox.remove(&tag)
    }

    /// Reads the inbox value for `tag` without consuming it.
    pub fn peek(&self, tag: Tag) -> Option<Bytes> {
        let inbox = self.shared.inbox.lock().unwrap_or_else(|e| e.into_inner());
        inbox.get(&tag).cloned()
    }

    /// Re-requests `tag` with a small sleep until a value arrives or
    /// `timeout` elapses.
    pub fn poll(&self, tag: Tag, timeout: Duration, interval: Duration) -> Result<Bytes, RelayError> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(payload) = self.take(tag) {
                return Ok(payload);
            }
            if Instant::now() >= deadline {
                return Err(RelayError::PollTimeout { tag });
            }
            self.request(tag)?;
            thread::sleep(interval);
        }
    }

    /// Closes the connection and joins the reader thread.
    pub fn shutdown(mut self) {
        self.close();
    }

    fn close(&mut self) {
        self.shared.connected.store(false, Ordering::Release);
        if let Ok(writer) = self.shared.writer.lock() {
            let _ = writer.shutdown(std::net::Shutdown::Both);
        }
        if let Some(handle) = self.reader.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for RelayClient {
    fn drop(&mut self) {
        self.close();
    }
}

fn run_reader(shared: Arc<Shared>, stream: TcpStream) {
    let mut reader = FrameReader::new(stream);
    loop {
        match reader.read_next() {
            Ok(Some(RelayFrame::Send { tag, payload })) => {
                trace!(%tag, len = payload.len(), "relay recv");
                let mut inbox = shared.inbox.lock().unwrap_or_else(|e| e.into_inner());
                inbox.insert(tag, payload);
            }
            Ok(Some(RelayFrame::Get { tag })) => {
                // The room echoes polls; answer from the outbox when we
                // hold a value for the tag.
                let staged = {
                    let outbox = shared.outbox.lock().unwrap_or_else(|e| e.into_inner());
                    outbox.get(&tag).cloned()
                };
                if let Some(payload) = staged {
                    debug!(%tag, "answering peer poll from outbox");
                    if shared.write_frame(&RelayFrame::send(tag, payload)).is_err() {
                        break;
                    }
                }
            }
            Ok(None) => {
                debug!("relay connection closed");
                break;
            }
            Err(err) => {
                if shared.connected.load(Ordering::Acquire) {
                    warn!("relay reader stopped: {err}");
                }
                break;
            }
        }
    }
    shared.connected.store(false, Ordering::Release);
}

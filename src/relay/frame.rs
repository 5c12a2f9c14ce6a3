//! Relay wire framing.
//!
//! `S | tag[4] | len u16 BE | payload` publishes a value;
//! `G | tag[4]` requests the room's latest value for the tag.

use std::io::Read;

use bytes::Bytes;

use super::{RelayError, Tag};

const KIND_SEND: u8 = b'S';
const KIND_GET: u8 = b'G';

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RelayFrame {
    Send { tag: Tag, payload: Bytes },
    Get { tag: Tag },
}

impl RelayFrame {
    pub fn send(tag: Tag, payload: impl Into<Bytes>) -> Self {
        RelayFrame::Send {
            tag,
            payload: payload.into(),
        }
    }

    pub fn get(tag: Tag) -> Self {
        RelayFrame::Get { tag }
    }

    pub fn encode(&self) -> Vec<u8> {
        match self {
            RelayFrame::Send { tag, payload } => {
                let mut out = Vec::with_capacity(7 + payload.len());
                out.push(KIND_SEND);
                out.extend_from_slice(tag.as_bytes());
                out.extend_from_slice(&(payload.len() as u16).to_be_bytes());
                out.extend_from_slice(payload);
                out
            }
            RelayFrame::Get { tag } => {
                let mut out = Vec::with_capacity(5);
                out.push(KIND_GET);
                out.extend_from_slice(tag.as_bytes());
                out
            }
        }
    }
}

/// Blocking frame decoder over the relay connection.
pub struct FrameReader<R> {
    reader: R,
}

impl<R: Read> FrameReader<R> {
    pub fn new(reader: R) -> Self {
        Self { reader }
    }

    /// Reads the next frame; `None` on a clean close before a frame
    /// starts.
    pub fn read_next(&mut self) -> Result<Option<RelayFrame>, RelayError> {
        let mut kind = [0u8; 1];
        match self.reader.read(&mut kind) {
            Ok(0) => return Ok(None),
            Ok(_) => {}
            Err(err) => return Err(err.into()),
        }

        let mut tag = [0u8; 4];
        self.read_exact(&mut tag)?;
        let tag = Tag::new(tag);

        match kind[0] {
            KIND_GET => Ok(Some(RelayFrame::Get { tag })),
            KIND_SEND => {
                let mut len = [0u8; 2];
                self.read_exact(&mut len)?;
                let len = usize::from(u16::from_be_bytes(len));
                let mut payload = vec![0u8; len];
                self.read_exact(&mut payload)?;
                Ok(Some(RelayFrame::Send {
                    tag,
                    payload: Bytes::from(payload),
                }))
            }
            other => Err(RelayError::MalformedFrame {
                reason: format!("unknown frame kind {other:#04x}"),
            }),
        }
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), RelayError> {
        let mut read = 0;
        while read < buf.len() {
            let n = self.reader.read(&mut buf[read..])?;
            if n == 0 {
                return Err(RelayError::MalformedFrame {
                    reason: "frame truncated".to_string(),
                });
            }
            read += n;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn send_frame_round_trips() {
        let frame = RelayFrame::send(Tag::new(*b"CHC2"), vec![0x0C, 0x70]);
        let encoded = frame.encode();
        assert_eq!(&encoded[..5], b"SCHC2");
        assert_eq!(&encoded[5..7], &[0x00, 0x02]);

        let mut reader = FrameReader::new(Cursor::new(encoded));
        assert_eq!(reader.read_next().unwrap().unwrap(), frame);
    }

    #[test]
    fn get_frame_round_trips() {
        let frame = RelayFrame::get(Tag::new(*b"BUF2"));
        let encoded = frame.encode();
        assert_eq!(encoded, b"GBUF2".to_vec());

        let mut reader = FrameReader::new(Cursor::new(encoded));
        assert_eq!(reader.read_next().unwrap().unwrap(), frame);
    }

    #[test]
    fn empty_stream_reads_none() {
        let mut reader = FrameReader::new(Cursor::new(Vec::new()));
        assert!(reader.read_next().unwrap().is_none());
    }

    #[test]
    fn unknown_kind_is_malformed() {
        let mut reader = FrameReader::new(Cursor::new(b"XAAAA".to_vec()));
        assert!(matches!(
            reader.read_next(),
            Err(RelayError::MalformedFrame { .. })
        ));
    }

    #[test]
    fn truncated_payload_is_malformed() {
        let mut encoded = RelayFrame::send(Tag::new(*b"FLL2"), vec![1, 2, 3, 4]).encode();
        encoded.truncate(encoded.len() - 2);
        let mut reader = FrameReader::new(Cursor::new(encoded));
        assert!(matches!(
            reader.read_next(),
            Err(RelayError::MalformedFrame { .. })
        ));
    }
}

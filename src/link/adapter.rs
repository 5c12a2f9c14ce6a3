//! Transport-generic adapter link.

use std::io::{ErrorKind, Read, Write};

use super::{ByteLink, LinkError, VoltageMode, NO_DATA};

const CMD_EXCHANGE: u8 = 0x45; // 'E'
const CMD_EXCHANGE32: u8 = 0x57; // 'W'
const CMD_VOLTAGE: u8 = 0x56; // 'V'

/// Byte link over any `Read + Write` handle to the adapter (a serial
/// device file, a socket to a bridge, a scripted stream in tests).
///
/// The adapter echoes one response byte per exchanged byte; a read that
/// times out at the transport level is reported as [`NO_DATA`].
pub struct AdapterLink<T> {
    transport: T,
}

impl<T: Read + Write> AdapterLink<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    pub fn into_inner(self) -> T {
        self.transport
    }

    fn read_exact_or_sentinel(&mut self, buf: &mut [u8]) -> Result<bool, LinkError> {
        let mut read = 0;
        while read < buf.len() {
            match self.transport.read(&mut buf[read..]) {
                Ok(0) => return Err(LinkError::Disconnected),
                Ok(n) => read += n,
                Err(err)
                    if err.kind() == ErrorKind::TimedOut
                        || err.kind() == ErrorKind::WouldBlock =>
                {
                    return Ok(false);
                }
                Err(err) if err.kind() == ErrorKind::Interrupted => {}
                Err(err) => return Err(err.into()),
            }
        }
        Ok(true)
    }
}

impl<T: Read + Write> ByteLink for AdapterLink<T> {
    fn exchange(&mut self, out: u8) -> Result<u8, LinkError> {
        self.transport.write_all(&[CMD_EXCHANGE, out])?;
        self.transport.flush()?;
        let mut reply = [0u8; 1];
        if self.read_exact_or_sentinel(&mut reply)? {
            Ok(reply[0])
        } else {
            Ok(NO_DATA)
        }
    }

    fn exchange32(&mut self, out: u32) -> Result<u32, LinkError> {
        let mut frame = [0u8; 5];
        frame[0] = CMD_EXCHANGE32;
        frame[1..].copy_from_slice(&out.to_le_bytes());
        self.transport.write_all(&frame)?;
        self.transport.flush()?;
        let mut reply = [0u8; 4];
        if self.read_exact_or_sentinel(&mut reply)? {
            Ok(u32::from_le_bytes(reply))
        } else {
            Ok(u32::from(NO_DATA))
        }
    }

    fn set_voltage(&mut self, mode: VoltageMode) -> Result<(), LinkError> {
        let selector = match mode {
            VoltageMode::Gb => 0x01,
            VoltageMode::Gba => 0x02,
        };
        self.transport.write_all(&[CMD_VOLTAGE, selector])?;
        self.transport.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{self, Cursor};

    struct Transport {
        written: Vec<u8>,
        replies: Cursor<Vec<u8>>,
    }

    impl Transport {
        fn new(replies: Vec<u8>) -> Self {
            Self {
                written: Vec::new(),
                replies: Cursor::new(replies),
            }
        }
    }

    impl Read for Transport {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.replies.read(buf)
        }
    }

    impl Write for Transport {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.written.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn exchange_writes_command_and_reads_reply() {
        let mut link = AdapterLink::new(Transport::new(vec![0x61]));
        let reply = link.exchange(0x01).unwrap();
        assert_eq!(reply, 0x61);
        assert_eq!(link.into_inner().written, vec![CMD_EXCHANGE, 0x01]);
    }

    #[test]
    fn closed_transport_is_disconnection() {
        let mut link = AdapterLink::new(Transport::new(Vec::new()));
        let err = link.exchange(0x01).unwrap_err();
        assert!(matches!(err, LinkError::Disconnected));
    }

    struct TimingOut;

    impl Read for TimingOut {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::new(ErrorKind::TimedOut, "timeout"))
        }
    }

    impl Write for TimingOut {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn timeout_yields_no_data_sentinel() {
        let mut link = AdapterLink::new(TimingOut);
        assert_eq!(link.exchange(0x7F).unwrap(), NO_DATA);
        assert_eq!(link.exchange32(0xDEAD_BEEF).unwrap(), u32::from(NO_DATA));
    }
}

//! Cartridge byte link.
//!
//! The USB adapter's firmware protocol is an external collaborator;
//! this module abstracts it as a byte-exchange primitive. Every write
//! produces exactly one read, and a timed-out read yields the
//! [`NO_DATA`] sentinel rather than an error so the mediator's
//! keep-alive logic can proceed.

mod adapter;

pub use adapter::AdapterLink;

use thiserror::Error;

/// Sentinel returned for a timed-out cartridge read.
pub const NO_DATA: u8 = 0x00;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VoltageMode {
    /// 5 V Game Boy / Game Boy Color.
    Gb,
    /// 3.3 V Game Boy Advance.
    Gba,
}

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("adapter io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("adapter disconnected")]
    Disconnected,
}

impl LinkError {
    /// Adapter loss always aborts the mediator.
    pub fn is_fatal(&self) -> bool {
        true
    }
}

/// Half-duplex exchange with the cartridge.
pub trait ByteLink {
    /// Exchanges a single byte (Gen 1/2).
    fn exchange(&mut self, out: u8) -> Result<u8, LinkError>;

    /// Exchanges a 32-bit word (Gen 3).
    fn exchange32(&mut self, out: u32) -> Result<u32, LinkError>;

    fn set_voltage(&mut self, mode: VoltageMode) -> Result<(), LinkError>;
}

impl<L: ByteLink + ?Sized> ByteLink for Box<L> {
    fn exchange(&mut self, out: u8) -> Result<u8, LinkError> {
        (**self).exchange(out)
    }

    fn exchange32(&mut self, out: u32) -> Result<u32, LinkError> {
        (**self).exchange32(out)
    }

    fn set_voltage(&mut self, mode: VoltageMode) -> Result<(), LinkError> {
        (**self).set_voltage(mode)
    }
}

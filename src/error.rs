use thiserror::Error;

use crate::data::DataError;
use crate::exchange::ExchangeError;
use crate::link::LinkError;
use crate::mediator::TradeError;
use crate::relay::RelayError;

/// Crate-level convenience error.
///
/// A thin wrapper over the per-capability errors; callers that care
/// about a specific failure match on the inner enum.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    Data(#[from] DataError),

    #[error(transparent)]
    Link(#[from] LinkError),

    #[error(transparent)]
    Relay(#[from] RelayError),

    #[error(transparent)]
    Exchange(#[from] ExchangeError),

    #[error(transparent)]
    Trade(#[from] TradeError),

    #[error("config error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether the mediator may keep running after this error.
    ///
    /// Only adapter loss and explicit user stop are fatal; everything
    /// else is retried or substituted at the point it occurs.
    pub fn is_fatal(&self) -> bool {
        match self {
            Error::Link(e) => e.is_fatal(),
            Error::Trade(e) => e.is_fatal(),
            Error::Relay(_) | Error::Exchange(_) => false,
            Error::Data(_) | Error::Config(_) | Error::Io(_) => true,
        }
    }
}

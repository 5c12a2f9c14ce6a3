#![forbid(unsafe_code)]

pub mod cli;
pub mod config;
pub mod data;
pub mod error;
pub mod exchange;
pub mod link;
pub mod mediator;
pub mod negotiate;
pub mod party;
pub mod relay;
pub mod telemetry;
pub mod test_harness;
pub mod validate;

pub use error::Error;
pub type Result<T> = std::result::Result<T, Error>;

// Re-export the types most callers touch at crate root.
pub use crate::data::{Generation, StaticTables};
pub use crate::link::{ByteLink, VoltageMode};
pub use crate::mediator::{SessionConfig, TradeMediator, TradeTarget};
pub use crate::negotiate::ExchangeMode;
pub use crate::relay::{RelayClient, Tag};

//! Party section codec.
//!
//! Parsing and serialization of the fixed-length party sections, the
//! 0xFE escape patching shared by the Pokémon and mail blocks, the
//! per-generation record formats, and the Japanese conversions.

pub mod gen3;
pub mod gen12;
pub mod japanese;
pub mod patch;

pub use gen3::{Pk3Record, Pk3Single, SUBSTRUCTURE_ORDERS};
pub use gen12::{PartyError, PartySection, SingleMon};
pub use patch::{apply_patch_list, create_patch_list};

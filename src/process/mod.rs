// src/process/mod.rs
//! Raw extracted tables → `CleanTable`.

pub mod date_parser;
pub mod normalize;
pub mod raw_table;
pub mod split;
pub mod utils;

pub use normalize::{DateSource, NormalizeOptions, Normalized, Normalizer};
pub use raw_table::{NormalizedRow, RawTableFragment};
pub use utils::Value;

//! Record normalization and filtering
//!
//! - Symbol normalization across exchange naming schemes
//! - Numeric field parsing for string-encoded prices
//! - Order-preserving symbol filtering

pub mod filter;

pub use filter::{filter_records, normalize_symbol, parse_value};

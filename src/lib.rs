//! Multi-Exchange Liquidity Aggregator
//!
//! Fans requests out to several authenticated exchanges at once, tolerates
//! individual source failures, normalizes their answers into one record
//! shape and selects the best-qualified source for extraction.

pub mod aggregator;
pub mod auth;
pub mod client;
pub mod config;
pub mod data;
pub mod error;
pub mod exchange;
pub mod selection;
pub mod types;


pub use aggregator::{AggregationOutcome, Aggregator};
pub use error::{AggregatorError, Result, SourceError};
pub use types::{
    DataSource, ExtractionResult, NormalizedRecord, VerificationReport, VerificationResult,
};

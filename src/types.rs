//! Core data model shared by adapters, the aggregator and the selection policy

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Data source identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataSource {
    Binance,
    Coinbase,
    Kraken,
    Custom(u32),
}

impl std::fmt::Display for DataSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DataSource::Binance => write!(f, "binance"),
            DataSource::Coinbase => write!(f, "coinbase"),
            DataSource::Kraken => write!(f, "kraken"),
            DataSource::Custom(id) => write!(f, "custom_{}", id),
        }
    }
}

/// Canonical record produced by every adapter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedRecord {
    /// Normalized symbol (e.g. BTCUSD)
    pub symbol: String,
    /// Price or liquidity
    pub value: f64,
    pub source_id: DataSource,
    pub observed_at: DateTime<Utc>,
}

/// Per-call context handed to each adapter
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Timestamp used for request signing and record stamping
    pub timestamp: DateTime<Utc>,
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestContext {
    pub fn new() -> Self {
        Self::at(Utc::now())
    }

    pub fn at(timestamp: DateTime<Utc>) -> Self {
        Self { timestamp }
    }

    /// Millisecond timestamp as used in signed payloads
    pub fn timestamp_millis(&self) -> i64 {
        self.timestamp.timestamp_millis()
    }
}

/// Raw liquidity measurement from one source, before threshold evaluation
#[derive(Debug, Clone, PartialEq)]
pub struct LiquidityQuote {
    pub source_id: DataSource,
    pub liquidity: f64,
    /// Signature attached to the liquidity request
    pub signature: String,
}

/// Outcome of verifying one source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationResult {
    pub source_id: DataSource,
    pub measured_liquidity: f64,
    /// measured_liquidity >= threshold
    pub verified: bool,
    pub signature_valid: bool,
    pub error: Option<String>,
}

impl VerificationResult {
    /// Result for a source that raised instead of returning data
    pub fn failed(source_id: DataSource, error: impl std::fmt::Display) -> Self {
        Self {
            source_id,
            measured_liquidity: 0.0,
            verified: false,
            signature_valid: false,
            error: Some(error.to_string()),
        }
    }

    /// Whether the selection policy may consider this result
    pub fn qualifies(&self) -> bool {
        self.verified && self.signature_valid
    }
}

/// All per-source verification results for one target, in registration order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationReport {
    pub target_address: String,
    pub observed_at: DateTime<Utc>,
    pub results: Vec<VerificationResult>,
}

impl VerificationReport {
    pub fn verified_count(&self) -> usize {
        self.results.iter().filter(|r| r.qualifies()).count()
    }

    /// Sources that errored during verification
    pub fn failed_sources(&self) -> Vec<DataSource> {
        self.results
            .iter()
            .filter(|r| r.error.is_some())
            .map(|r| r.source_id)
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResult {
    /// SHA-256 of target and observation time.
    /// A convenience identifier, not a uniqueness guarantee.
    pub transaction_id: String,
    pub extracted_amount: f64,
    pub source_id: DataSource,
    pub observed_at: DateTime<Utc>,
}

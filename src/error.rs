//! Error types for the aggregator

use crate::types::DataSource;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AggregatorError {
    #[error("Insufficient liquidity for {target}: no source reached {threshold}")]
    InsufficientLiquidity { target: String, threshold: f64 },

    #[error("Signing error: {0}")]
    Signing(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, AggregatorError>;

/// Failure raised by the transport collaborator
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransportError {
    #[error("request failed: {0}")]
    Request(String),

    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error("transport closed")]
    Closed,
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        TransportError::Request(e.to_string())
    }
}

/// Why a single source failed
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SourceErrorKind {
    #[error("transport: {0}")]
    Transport(#[from] TransportError),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("unparsable response: {0}")]
    Parse(String),

    #[error("timed out after {after_ms}ms")]
    Timeout { after_ms: u64 },
}

/// One source unreachable or invalid. Contained by the aggregator.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("source {source_id} failed: {cause}")]
pub struct SourceError {
    pub source_id: DataSource,
    pub cause: SourceErrorKind,
}

impl SourceError {
    pub fn new(source_id: DataSource, cause: impl Into<SourceErrorKind>) -> Self {
        Self {
            source_id,
            cause: cause.into(),
        }
    }

    pub fn parse(source_id: DataSource, msg: impl std::fmt::Display) -> Self {
        Self::new(source_id, SourceErrorKind::Parse(msg.to_string()))
    }

    pub fn status(source_id: DataSource, status: u16, body: &[u8]) -> Self {
        let body = String::from_utf8_lossy(body).chars().take(200).collect();
        Self::new(source_id, SourceErrorKind::Status { status, body })
    }
}

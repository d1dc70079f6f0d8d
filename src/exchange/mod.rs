//! Source adapters
//!
//! One adapter per exchange. Every adapter:
//! - builds its own (optionally signed) request
//! - sends it through the shared [`Transport`]
//! - validates the status and maps native fields into [`NormalizedRecord`]
//!
//! Adapters never share mutable state. A failure comes back as a
//! [`SourceError`] value so the aggregator can keep going.

pub mod binance;
pub mod coinbase;
pub mod kraken;
pub mod mock;

pub use binance::BinanceAdapter;
pub use coinbase::CoinbaseAdapter;
pub use kraken::KrakenAdapter;
pub use mock::MockSource;

use crate::auth::Credential;
use crate::client::{Transport, TransportResponse};
use crate::config::ExchangeConfig;
use crate::data::parse_value;
use crate::error::{AggregatorError, Result, SourceError};
use crate::types::{DataSource, LiquidityQuote, NormalizedRecord, RequestContext};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::sync::Arc;

/// Capability every exchange implements
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    fn source_id(&self) -> DataSource;

    /// Fetch current prices as normalized records
    async fn fetch(
        &self,
        ctx: &RequestContext,
    ) -> std::result::Result<Vec<NormalizedRecord>, SourceError>;

    /// Measure liquidity available for `target` with a signed request
    async fn fetch_liquidity(
        &self,
        target: &str,
        ctx: &RequestContext,
    ) -> std::result::Result<LiquidityQuote, SourceError>;
}

/// Build the adapter for a configured exchange
pub fn build_adapter(
    config: &ExchangeConfig,
    transport: Arc<dyn Transport>,
) -> Result<Arc<dyn SourceAdapter>> {
    let credential = Credential::new(config.api_key.clone(), config.secret_key.clone());
    let adapter: Arc<dyn SourceAdapter> = match config.source {
        DataSource::Binance => {
            Arc::new(BinanceAdapter::new(&config.base_url, credential, transport)?)
        }
        DataSource::Coinbase => {
            Arc::new(CoinbaseAdapter::new(&config.base_url, credential, transport)?)
        }
        DataSource::Kraken => {
            Arc::new(KrakenAdapter::new(&config.base_url, credential, transport)?)
        }
        DataSource::Custom(id) => {
            return Err(AggregatorError::Config(format!(
                "no adapter available for custom source {}",
                id
            )))
        }
    };
    Ok(adapter)
}

/// Reject non-2xx responses, hand back the body otherwise
pub(crate) fn ensure_success(
    source: DataSource,
    resp: &TransportResponse,
) -> std::result::Result<&[u8], SourceError> {
    if resp.is_success() {
        Ok(&resp.body)
    } else {
        Err(SourceError::status(source, resp.status, &resp.body))
    }
}

pub(crate) fn parse_json<T: DeserializeOwned>(
    source: DataSource,
    body: &[u8],
) -> std::result::Result<T, SourceError> {
    serde_json::from_slice(body).map_err(|e| SourceError::parse(source, e))
}

/// Numeric field that exchanges send either as a JSON number or a string
pub(crate) fn json_value(
    source: DataSource,
    field: &str,
    v: &serde_json::Value,
) -> std::result::Result<f64, SourceError> {
    let parsed = match v {
        serde_json::Value::String(s) => parse_value(s),
        serde_json::Value::Number(n) => n.as_f64().filter(|f| f.is_finite() && *f >= 0.0),
        _ => None,
    };
    parsed.ok_or_else(|| SourceError::parse(source, format!("invalid {}: {}", field, v)))
}

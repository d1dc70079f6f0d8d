//! Scripted source adapter for testing and dry runs

use super::SourceAdapter;
use crate::auth::SIGNATURE_HEX_LEN;
use crate::error::{SourceError, SourceErrorKind, TransportError};
use crate::types::{DataSource, LiquidityQuote, NormalizedRecord, RequestContext};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::time::Duration;

/// Adapter returning fixed prices and liquidity after an optional delay
pub struct MockSource {
    source: DataSource,
    prices: Vec<(String, f64)>,
    liquidity: f64,
    signature: String,
    latency: Duration,
    fail: bool,
    calls: Mutex<u32>,
}

impl MockSource {
    pub fn new(source: DataSource) -> Self {
        Self {
            source,
            prices: Vec::new(),
            liquidity: 0.0,
            signature: "ab".repeat(SIGNATURE_HEX_LEN / 2),
            latency: Duration::ZERO,
            fail: false,
            calls: Mutex::new(0),
        }
    }

    pub fn with_price(mut self, symbol: &str, price: f64) -> Self {
        self.prices.push((symbol.to_string(), price));
        self
    }

    pub fn with_liquidity(mut self, liquidity: f64) -> Self {
        self.liquidity = liquidity;
        self
    }

    /// Override the signature reported with liquidity quotes
    pub fn with_signature(mut self, signature: &str) -> Self {
        self.signature = signature.to_string();
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn with_failures(mut self) -> Self {
        self.fail = true;
        self
    }

    /// Number of fetch or liquidity calls received
    pub fn calls(&self) -> u32 {
        *self.calls.lock()
    }

    async fn simulate(&self) -> std::result::Result<(), SourceError> {
        *self.calls.lock() += 1;
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        if self.fail {
            return Err(SourceError::new(
                self.source,
                SourceErrorKind::Transport(TransportError::Request("mock failure".to_string())),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl SourceAdapter for MockSource {
    fn source_id(&self) -> DataSource {
        self.source
    }

    async fn fetch(
        &self,
        ctx: &RequestContext,
    ) -> std::result::Result<Vec<NormalizedRecord>, SourceError> {
        self.simulate().await?;
        Ok(self
            .prices
            .iter()
            .map(|(symbol, price)| NormalizedRecord {
                symbol: symbol.clone(),
                value: *price,
                source_id: self.source,
                observed_at: ctx.timestamp,
            })
            .collect())
    }

    async fn fetch_liquidity(
        &self,
        _target: &str,
        _ctx: &RequestContext,
    ) -> std::result::Result<LiquidityQuote, SourceError> {
        self.simulate().await?;
        Ok(LiquidityQuote {
            source_id: self.source,
            liquidity: self.liquidity,
            signature: self.signature.clone(),
        })
    }
}

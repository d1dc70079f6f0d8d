//! Coinbase-style REST adapter
//!
//! Product ids use a dash (`BTC-USD`) and are normalized on the way in.
//! Signed requests carry `CB-ACCESS-KEY`, `CB-ACCESS-SIGN` and
//! `CB-ACCESS-TIMESTAMP` (seconds).

use super::{ensure_success, json_value, parse_json, SourceAdapter};
use crate::auth::{Credential, PayloadValue, Signer};
use crate::client::{Transport, TransportRequest};
use crate::data::{normalize_symbol, parse_value};
use crate::error::{AggregatorError, Result, SourceError, SourceErrorKind};
use crate::types::{DataSource, LiquidityQuote, NormalizedRecord, RequestContext};
use async_trait::async_trait;
use reqwest::Url;
use serde::Deserialize;
use std::sync::Arc;

const TICKERS_PATH: &str = "/products/tickers";

#[derive(Debug, Deserialize)]
struct ProductTicker {
    product_id: String,
    price: String,
}

#[derive(Debug, Deserialize)]
struct PoolInfo {
    total_liquidity: serde_json::Value,
}

pub struct CoinbaseAdapter {
    base_url: Url,
    signer: Signer,
    transport: Arc<dyn Transport>,
}

impl CoinbaseAdapter {
    pub fn new(
        base_url: &str,
        credential: Credential,
        transport: Arc<dyn Transport>,
    ) -> Result<Self> {
        let base_url = Url::parse(base_url.trim_end_matches('/')).map_err(|e| {
            AggregatorError::Config(format!("coinbase base_url {}: {}", base_url, e))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(AggregatorError::Config(format!(
                "coinbase base_url {} cannot hold a path",
                base_url
            )));
        }

        Ok(Self {
            base_url,
            signer: Signer::new(credential)?,
            transport,
        })
    }

    /// `{base}/pools/{target}` with the target percent-encoded as one segment
    fn pool_url(&self, target: &str) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push("pools").push(target);
        }
        url
    }

    fn liquidity_request(
        &self,
        target: &str,
        ctx: &RequestContext,
    ) -> (TransportRequest, String) {
        let url = self.pool_url(target);
        let timestamp = ctx.timestamp.timestamp();
        let signature = self.signer.sign(vec![
            ("method", PayloadValue::from("GET")),
            ("path", PayloadValue::from(url.path())),
            ("timestamp", PayloadValue::from(timestamp)),
        ]);

        let req = TransportRequest::get(url.as_str())
            .header("CB-ACCESS-KEY", self.signer.api_key())
            .header("CB-ACCESS-SIGN", signature.clone())
            .header("CB-ACCESS-TIMESTAMP", timestamp.to_string());
        (req, signature)
    }
}

#[async_trait]
impl SourceAdapter for CoinbaseAdapter {
    fn source_id(&self) -> DataSource {
        DataSource::Coinbase
    }

    async fn fetch(
        &self,
        ctx: &RequestContext,
    ) -> std::result::Result<Vec<NormalizedRecord>, SourceError> {
        let source = self.source_id();
        let base = self.base_url.as_str().trim_end_matches('/');
        let req = TransportRequest::get(format!("{}{}", base, TICKERS_PATH));
        let resp = self
            .transport
            .send_request(req)
            .await
            .map_err(|e| SourceError::new(source, SourceErrorKind::Transport(e)))?;

        let tickers: Vec<ProductTicker> = parse_json(source, ensure_success(source, &resp)?)?;

        tickers
            .into_iter()
            .map(|t| {
                let value = parse_value(&t.price).ok_or_else(|| {
                    SourceError::parse(
                        source,
                        format!("invalid price for {}: {}", t.product_id, t.price),
                    )
                })?;
                Ok(NormalizedRecord {
                    symbol: normalize_symbol(&t.product_id),
                    value,
                    source_id: source,
                    observed_at: ctx.timestamp,
                })
            })
            .collect()
    }

    async fn fetch_liquidity(
        &self,
        target: &str,
        ctx: &RequestContext,
    ) -> std::result::Result<LiquidityQuote, SourceError> {
        let source = self.source_id();
        let (req, signature) = self.liquidity_request(target, ctx);
        let resp = self
            .transport
            .send_request(req)
            .await
            .map_err(|e| SourceError::new(source, SourceErrorKind::Transport(e)))?;

        let pool: PoolInfo = parse_json(source, ensure_success(source, &resp)?)?;
        Ok(LiquidityQuote {
            source_id: source,
            liquidity: json_value(source, "total_liquidity", &pool.total_liquidity)?,
            signature,
        })
    }
}

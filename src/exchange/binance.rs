//! Binance-style REST adapter
//!
//! Prices come from the public ticker endpoint. Liquidity requests are
//! signed: `pool` and `timestamp` go into the payload, the HMAC is appended
//! as the `signature` query parameter and the key travels in `X-MBX-APIKEY`.

use super::{ensure_success, json_value, parse_json, SourceAdapter};
use crate::auth::{Credential, PayloadValue, Signer};
use crate::client::{Transport, TransportRequest};
use crate::data::{normalize_symbol, parse_value};
use crate::error::{Result, SourceError, SourceErrorKind};
use crate::types::{DataSource, LiquidityQuote, NormalizedRecord, RequestContext};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use tracing::debug;

const TICKER_PATH: &str = "/api/v3/ticker/price";
const LIQUIDITY_PATH: &str = "/api/v3/pool/liquidity";

#[derive(Debug, Deserialize)]
struct TickerPrice {
    symbol: String,
    price: String,
}

#[derive(Debug, Deserialize)]
struct PoolLiquidity {
    liquidity: serde_json::Value,
}

pub struct BinanceAdapter {
    base_url: String,
    signer: Signer,
    transport: Arc<dyn Transport>,
}

impl BinanceAdapter {
    pub fn new(
        base_url: &str,
        credential: Credential,
        transport: Arc<dyn Transport>,
    ) -> Result<Self> {
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            signer: Signer::new(credential)?,
            transport,
        })
    }

    fn liquidity_request(
        &self,
        target: &str,
        ctx: &RequestContext,
    ) -> (TransportRequest, String) {
        let timestamp = ctx.timestamp_millis();
        let signature = self.signer.sign(vec![
            ("pool", PayloadValue::from(target)),
            ("timestamp", PayloadValue::from(timestamp)),
        ]);

        let req = TransportRequest::get(format!("{}{}", self.base_url, LIQUIDITY_PATH))
            .header("X-MBX-APIKEY", self.signer.api_key())
            .query("pool", target)
            .query("timestamp", timestamp.to_string())
            .query("signature", signature.clone());
        (req, signature)
    }
}

#[async_trait]
impl SourceAdapter for BinanceAdapter {
    fn source_id(&self) -> DataSource {
        DataSource::Binance
    }

    async fn fetch(
        &self,
        ctx: &RequestContext,
    ) -> std::result::Result<Vec<NormalizedRecord>, SourceError> {
        let source = self.source_id();
        let req = TransportRequest::get(format!("{}{}", self.base_url, TICKER_PATH));
        let resp = self
            .transport
            .send_request(req)
            .await
            .map_err(|e| SourceError::new(source, SourceErrorKind::Transport(e)))?;

        let tickers: Vec<TickerPrice> = parse_json(source, ensure_success(source, &resp)?)?;
        debug!("binance returned {} tickers", tickers.len());

        tickers
            .into_iter()
            .map(|t| {
                let value = parse_value(&t.price).ok_or_else(|| {
                    SourceError::parse(
                        source,
                        format!("invalid price for {}: {}", t.symbol, t.price),
                    )
                })?;
                Ok(NormalizedRecord {
                    symbol: normalize_symbol(&t.symbol),
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

        let body: PoolLiquidity = parse_json(source, ensure_success(source, &resp)?)?;
        Ok(LiquidityQuote {
            source_id: source,
            liquidity: json_value(source, "liquidity", &body.liquidity)?,
            signature,
        })
    }
}

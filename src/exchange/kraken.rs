//! Kraken-style REST adapter
//!
//! Responses are wrapped in `{ "error": [...], "result": ... }`; a non-empty
//! error list is treated as a failed call even on HTTP 200.

use super::{ensure_success, json_value, parse_json, SourceAdapter};
use crate::auth::{Credential, PayloadValue, Signer};
use crate::client::{Transport, TransportRequest};
use crate::data::{normalize_symbol, parse_value};
use crate::error::{Result, SourceError, SourceErrorKind};
use crate::types::{DataSource, LiquidityQuote, NormalizedRecord, RequestContext};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::Arc;

const TICKER_PATH: &str = "/0/public/Ticker";
const LIQUIDITY_PATH: &str = "/0/private/Liquidity";

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    error: Vec<String>,
    result: Option<T>,
}

#[derive(Debug, Deserialize)]
struct PairTicker {
    /// Last trade closed: [price, lot volume]
    c: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct LiquidityResult {
    liquidity: serde_json::Value,
}

pub struct KrakenAdapter {
    base_url: String,
    signer: Signer,
    transport: Arc<dyn Transport>,
}

/// Legacy asset codes that differ from the common ticker
fn kraken_asset(code: &str) -> &str {
    match code {
        "XBT" => "BTC",
        "XDG" => "DOGE",
        other => other,
    }
}

/// Map a Kraken pair name onto the common symbol form.
///
/// Legacy pairs carry an `X`/`Z` class prefix on both legs (`XXBTZUSD`).
/// Only whole asset codes are renamed, so `ETHXBT` is left alone.
fn kraken_symbol(pair: &str) -> String {
    let pair = normalize_symbol(pair);
    let b = pair.as_bytes();
    if b.len() == 8 && matches!(b[0], b'X' | b'Z') && matches!(b[4], b'X' | b'Z') {
        return format!("{}{}", kraken_asset(&pair[1..4]), kraken_asset(&pair[5..8]));
    }
    match pair.strip_prefix("XBT") {
        Some(quote) => format!("BTC{}", quote),
        None => pair,
    }
}

fn unwrap_envelope<T>(
    source: DataSource,
    env: Envelope<T>,
) -> std::result::Result<T, SourceError> {
    if !env.error.is_empty() {
        return Err(SourceError::parse(source, env.error.join("; ")));
    }
    env.result
        .ok_or_else(|| SourceError::parse(source, "missing result"))
}

impl KrakenAdapter {
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
        let nonce = ctx.timestamp_millis();
        let signature = self.signer.sign(vec![
            ("nonce", PayloadValue::from(nonce)),
            ("pool", PayloadValue::from(target)),
        ]);

        let req = TransportRequest::get(format!("{}{}", self.base_url, LIQUIDITY_PATH))
            .header("API-Key", self.signer.api_key())
            .header("API-Sign", signature.clone())
            .query("pool", target)
            .query("nonce", nonce.to_string());
        (req, signature)
    }
}

#[async_trait]
impl SourceAdapter for KrakenAdapter {
    fn source_id(&self) -> DataSource {
        DataSource::Kraken
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

        let env: Envelope<BTreeMap<String, PairTicker>> =
            parse_json(source, ensure_success(source, &resp)?)?;
        let pairs = unwrap_envelope(source, env)?;

        pairs
            .into_iter()
            .map(|(pair, ticker)| {
                let value = ticker
                    .c
                    .first()
                    .and_then(|p| parse_value(p))
                    .ok_or_else(|| {
                        SourceError::parse(source, format!("invalid close for {}", pair))
                    })?;
                Ok(NormalizedRecord {
                    symbol: kraken_symbol(&pair),
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

        let env: Envelope<LiquidityResult> = parse_json(source, ensure_success(source, &resp)?)?;
        let result = unwrap_envelope(source, env)?;
        Ok(LiquidityQuote {
            source_id: source,
            liquidity: json_value(source, "liquidity", &result.liquidity)?,
            signature,
        })
    }
}

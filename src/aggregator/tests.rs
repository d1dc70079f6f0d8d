//! Aggregator tests with scripted sources

use super::*;
use crate::client::StubTransport;
use crate::config::ExchangeConfig;
use crate::error::AggregatorError;
use crate::exchange::MockSource;
use async_trait::async_trait;
use rand::Rng;
use std::sync::atomic::{AtomicBool, Ordering};

fn settings(timeout_ms: u64) -> AggregatorSettings {
    AggregatorSettings {
        request_timeout_ms: timeout_ms,
        ..AggregatorSettings::default()
    }
}

fn source(id: u32) -> MockSource {
    MockSource::new(DataSource::Custom(id))
}

fn three_sources(latencies: [u64; 3]) -> Aggregator {
    let mut agg = Aggregator::new(settings(2_000));
    agg.register(Arc::new(
        source(1)
            .with_price("BTCUSD", 50000.0)
            .with_price("ETHUSD", 3000.0)
            .with_latency(Duration::from_millis(latencies[0])),
    ));
    agg.register(Arc::new(
        source(2)
            .with_price("BTCUSD", 50010.0)
            .with_latency(Duration::from_millis(latencies[1])),
    ));
    agg.register(Arc::new(
        source(3)
            .with_price("SOLUSD", 150.0)
            .with_price("BTCUSD", 49990.0)
            .with_latency(Duration::from_millis(latencies[2])),
    ));
    agg
}

fn keys(records: &[NormalizedRecord]) -> Vec<(DataSource, String)> {
    records
        .iter()
        .map(|r| (r.source_id, r.symbol.clone()))
        .collect()
}

#[tokio::test]
async fn test_partial_failure_isolated() {
    let mut agg = Aggregator::new(settings(1_000));
    agg.register(Arc::new(source(1).with_price("BTCUSD", 1.0)));
    agg.register(Arc::new(source(2).with_price("BTCUSD", 2.0).with_failures()));
    agg.register(Arc::new(source(3).with_price("ETHUSD", 3.0)));

    let outcome = agg.aggregate_detailed(None).await;
    assert!(outcome.is_partial());
    assert_eq!(outcome.failures.len(), 1);
    assert_eq!(outcome.failures[0].source_id, DataSource::Custom(2));
    assert_eq!(
        keys(&outcome.records),
        vec![
            (DataSource::Custom(1), "BTCUSD".to_string()),
            (DataSource::Custom(3), "ETHUSD".to_string()),
        ]
    );

    let records = agg.aggregate(None).await;
    assert_eq!(records.len(), 2);
}

#[tokio::test]
async fn test_all_sources_failing_yields_empty() {
    let mut agg = Aggregator::new(settings(1_000));
    agg.register(Arc::new(source(1).with_failures()));
    agg.register(Arc::new(source(2).with_failures()));

    let outcome = agg.aggregate_detailed(None).await;
    assert!(outcome.records.is_empty());
    assert_eq!(outcome.failures.len(), 2);
}

#[tokio::test]
async fn test_failing_source_does_not_cancel_siblings() {
    let slow = Arc::new(
        source(2)
            .with_price("BTCUSD", 2.0)
            .with_latency(Duration::from_millis(50)),
    );
    let mut agg = Aggregator::new(settings(1_000));
    agg.register(Arc::new(source(1).with_failures()));
    agg.register(slow.clone());

    let records = agg.aggregate(None).await;
    assert_eq!(records.len(), 1);
    assert_eq!(slow.calls(), 1);
}

#[tokio::test]
async fn test_output_follows_registration_order() {
    // first registered source answers last
    let agg = three_sources([60, 0, 30]);
    let records = agg.aggregate(None).await;
    assert_eq!(
        keys(&records),
        vec![
            (DataSource::Custom(1), "BTCUSD".to_string()),
            (DataSource::Custom(1), "ETHUSD".to_string()),
            (DataSource::Custom(2), "BTCUSD".to_string()),
            (DataSource::Custom(3), "SOLUSD".to_string()),
            (DataSource::Custom(3), "BTCUSD".to_string()),
        ]
    );
}

#[tokio::test]
async fn test_ordering_stable_across_random_latencies() {
    let mut rng = rand::rng();
    let mut runs = Vec::new();
    for _ in 0..3 {
        let latencies = [
            rng.random_range(0..40),
            rng.random_range(0..40),
            rng.random_range(0..40),
        ];
        let agg = three_sources(latencies);
        runs.push(keys(&agg.aggregate(None).await));
    }
    assert_eq!(runs[0], runs[1]);
    assert_eq!(runs[1], runs[2]);
}

#[tokio::test]
async fn test_symbol_filter_applied() {
    let agg = three_sources([0, 0, 0]);
    let set: HashSet<String> = ["BTCUSD".to_string()].into();

    let records = agg.aggregate(Some(&set)).await;
    assert_eq!(records.len(), 3);
    assert!(records.iter().all(|r| r.symbol == "BTCUSD"));
    assert_eq!(
        records.iter().map(|r| r.source_id).collect::<Vec<_>>(),
        vec![DataSource::Custom(1), DataSource::Custom(2), DataSource::Custom(3)]
    );
}

#[tokio::test]
async fn test_empty_group_returns_empty() {
    let agg = three_sources([0, 0, 0]);
    assert!(agg.aggregate_group(&[], None).await.is_empty());
}

#[tokio::test]
async fn test_group_restricts_sources() {
    let agg = three_sources([0, 0, 0]);
    // group order does not matter, registration order does
    let records = agg
        .aggregate_group(&[DataSource::Custom(3), DataSource::Custom(1)], None)
        .await;
    let sources: Vec<DataSource> = records.iter().map(|r| r.source_id).collect();
    assert_eq!(
        sources,
        vec![
            DataSource::Custom(1),
            DataSource::Custom(1),
            DataSource::Custom(3),
            DataSource::Custom(3),
        ]
    );
}

#[tokio::test]
async fn test_no_sources_registered() {
    let agg = Aggregator::new(AggregatorSettings::default());
    assert!(agg.aggregate(None).await.is_empty());
    assert!(agg.sources().is_empty());
}

#[tokio::test]
async fn test_slow_source_times_out() {
    let mut agg = Aggregator::new(settings(50));
    agg.register(Arc::new(source(1).with_price("BTCUSD", 1.0)));
    agg.register(Arc::new(
        source(2)
            .with_price("BTCUSD", 2.0)
            .with_latency(Duration::from_secs(5)),
    ));

    let started = std::time::Instant::now();
    let outcome = agg.aggregate_detailed(None).await;
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(outcome.records.len(), 1);
    assert_eq!(
        outcome.failures[0].cause,
        SourceErrorKind::Timeout { after_ms: 50 }
    );
}

/// Records whether its fetch finished or was dropped mid-flight
struct CancelProbe {
    completed: Arc<AtomicBool>,
    dropped: Arc<AtomicBool>,
}

struct DropFlag(Arc<AtomicBool>);

impl Drop for DropFlag {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl SourceAdapter for CancelProbe {
    fn source_id(&self) -> DataSource {
        DataSource::Custom(99)
    }

    async fn fetch(
        &self,
        _ctx: &RequestContext,
    ) -> std::result::Result<Vec<NormalizedRecord>, SourceError> {
        let _guard = DropFlag(self.dropped.clone());
        tokio::time::sleep(Duration::from_secs(5)).await;
        self.completed.store(true, Ordering::SeqCst);
        Ok(Vec::new())
    }

    async fn fetch_liquidity(
        &self,
        _target: &str,
        _ctx: &RequestContext,
    ) -> std::result::Result<crate::types::LiquidityQuote, SourceError> {
        Err(SourceError::parse(self.source_id(), "unsupported"))
    }
}

#[tokio::test]
async fn test_caller_cancellation_drops_pending_fetches() {
    let completed = Arc::new(AtomicBool::new(false));
    let dropped = Arc::new(AtomicBool::new(false));
    let mut agg = Aggregator::new(settings(10_000));
    agg.register(Arc::new(CancelProbe {
        completed: completed.clone(),
        dropped: dropped.clone(),
    }));

    let result = tokio::time::timeout(Duration::from_millis(50), agg.aggregate(None)).await;
    assert!(result.is_err());
    assert!(dropped.load(Ordering::SeqCst));
    assert!(!completed.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_verify_flags_threshold() {
    let mut agg = Aggregator::new(settings(1_000));
    agg.register(Arc::new(source(1).with_liquidity(30.0)));
    agg.register(Arc::new(source(2).with_liquidity(120.0)));
    agg.register(Arc::new(source(3).with_liquidity(100.0)));

    let report = agg.verify("POOL1", 100.0).await;
    assert_eq!(report.target_address, "POOL1");
    let flags: Vec<bool> = report.results.iter().map(|r| r.verified).collect();
    assert_eq!(flags, vec![false, true, true]);
    assert!(report.results.iter().all(|r| r.signature_valid));
    assert!(report.results.iter().all(|r| r.error.is_none()));
}

#[tokio::test]
async fn test_verify_captures_adapter_errors() {
    let mut agg = Aggregator::new(settings(1_000));
    agg.register(Arc::new(source(1).with_liquidity(500.0).with_failures()));
    agg.register(Arc::new(source(2).with_liquidity(150.0)));

    let report = agg.verify("POOL1", 100.0).await;
    assert_eq!(report.results.len(), 2);
    let failed = &report.results[0];
    assert_eq!(failed.source_id, DataSource::Custom(1));
    assert!(!failed.verified);
    assert!(failed.error.as_deref().unwrap().contains("mock failure"));
    assert_eq!(report.failed_sources(), vec![DataSource::Custom(1)]);
    assert!(report.results[1].verified);
}

#[tokio::test]
async fn test_verify_signature_shape() {
    let mut agg = Aggregator::new(settings(1_000));
    agg.register(Arc::new(source(1).with_liquidity(500.0).with_signature("deadbeef")));

    let report = agg.verify("POOL1", 100.0).await;
    assert!(report.results[0].verified);
    assert!(!report.results[0].signature_valid);
    assert!(agg.extract("POOL1", 100.0).await.is_err());
}

#[tokio::test]
async fn test_extract_end_to_end() {
    let mut agg = Aggregator::new(settings(1_000));
    agg.register(Arc::new(source(1).with_liquidity(30.0)));
    agg.register(Arc::new(source(2).with_liquidity(120.0).with_latency(Duration::from_millis(20))));
    agg.register(Arc::new(source(3).with_liquidity(80.0)));

    let extraction = agg.extract("POOL1", 100.0).await.unwrap();
    assert_eq!(extraction.source_id, DataSource::Custom(2));
    assert_eq!(extraction.extracted_amount, 120.0);
    assert_eq!(
        extraction.transaction_id,
        crate::selection::transaction_id("POOL1", extraction.observed_at)
    );
}

#[tokio::test]
async fn test_extract_insufficient_liquidity() {
    let mut agg = Aggregator::new(settings(1_000));
    agg.register(Arc::new(source(1).with_liquidity(30.0)));
    agg.register(Arc::new(source(2).with_failures()));

    match agg.extract("POOL1", 100.0).await {
        Err(AggregatorError::InsufficientLiquidity { target, threshold }) => {
            assert_eq!(target, "POOL1");
            assert_eq!(threshold, 100.0);
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[tokio::test]
async fn test_extract_without_sources_fails() {
    let agg = Aggregator::new(AggregatorSettings::default());
    assert!(matches!(
        agg.extract("POOL1", 1.0).await,
        Err(AggregatorError::InsufficientLiquidity { .. })
    ));
}

fn exchange(source: DataSource, base_url: &str) -> ExchangeConfig {
    ExchangeConfig {
        source,
        base_url: base_url.to_string(),
        api_key: format!("{}-key", source),
        secret_key: format!("{}-secret", source),
        enabled: true,
    }
}

fn live_like_config() -> Config {
    Config {
        aggregator: settings(1_000),
        exchanges: vec![
            exchange(DataSource::Binance, "https://binance.test"),
            exchange(DataSource::Coinbase, "https://coinbase.test"),
            exchange(DataSource::Kraken, "https://kraken.test"),
        ],
    }
}

fn scripted_transport() -> Arc<StubTransport> {
    Arc::new(
        StubTransport::new()
            .with_json(
                "/api/v3/ticker/price",
                serde_json::json!([{"symbol": "BTCUSD", "price": "50000"}]),
            )
            .with_json(
                "/api/v3/pool/liquidity",
                serde_json::json!({"pool": "POOL1", "liquidity": "30"}),
            )
            .with_json(
                "/products/tickers",
                serde_json::json!([{"product_id": "BTC-USD", "price": "50010"}]),
            )
            .with_json(
                "/pools/POOL1",
                serde_json::json!({"pool_id": "POOL1", "total_liquidity": "120"}),
            )
            .with_response(
                "/0/public/Ticker",
                crate::client::TransportResponse::new(502, "bad gateway"),
            )
            .with_json(
                "/0/private/Liquidity",
                serde_json::json!({"error": [], "result": {"liquidity": 80}}),
            ),
    )
}

#[tokio::test]
async fn test_from_config_end_to_end() {
    let transport = scripted_transport();
    let agg = Aggregator::from_config(&live_like_config(), transport.clone()).unwrap();
    assert_eq!(
        agg.sources(),
        vec![DataSource::Binance, DataSource::Coinbase, DataSource::Kraken]
    );

    let outcome = agg.aggregate_detailed(None).await;
    assert_eq!(
        keys(&outcome.records),
        vec![
            (DataSource::Binance, "BTCUSD".to_string()),
            (DataSource::Coinbase, "BTCUSD".to_string()),
        ]
    );
    assert_eq!(outcome.failures.len(), 1);
    assert_eq!(outcome.failures[0].source_id, DataSource::Kraken);

    let report = agg.verify("POOL1", 100.0).await;
    let liquidity: Vec<f64> = report.results.iter().map(|r| r.measured_liquidity).collect();
    assert_eq!(liquidity, vec![30.0, 120.0, 80.0]);
    assert!(report.results.iter().all(|r| r.signature_valid));

    let extraction = agg.extract("POOL1", 100.0).await.unwrap();
    assert_eq!(extraction.source_id, DataSource::Coinbase);
    assert_eq!(extraction.extracted_amount, 120.0);

    agg.shutdown();
}

#[test]
fn test_from_config_skips_disabled() {
    let mut config = live_like_config();
    config.exchanges[1].enabled = false;
    let agg = Aggregator::from_config(&config, scripted_transport()).unwrap();
    assert_eq!(agg.sources(), vec![DataSource::Binance, DataSource::Kraken]);
}

#[test]
fn test_from_config_rejects_invalid() {
    let mut config = live_like_config();
    config.exchanges[2].source = DataSource::Binance;
    assert!(matches!(
        Aggregator::from_config(&config, scripted_transport()),
        Err(AggregatorError::Config(_))
    ));
}

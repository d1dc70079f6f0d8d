//! Concurrent multi-source aggregation
//!
//! Every call fans out one fetch per registered adapter and waits for all of
//! them to settle. A failing or slow source never cancels its siblings; its
//! error is recorded next to the successful output instead. Results are
//! flattened in registration order, so output is stable no matter which
//! source answers first.

use crate::auth::is_valid_signature_shape;
use crate::client::Transport;
use crate::config::{AggregatorSettings, Config};
use crate::data::filter_records;
use crate::error::{Result, SourceError, SourceErrorKind};
use crate::exchange::{build_adapter, SourceAdapter};
use crate::selection::extract_from_report;
use crate::types::{
    DataSource, ExtractionResult, NormalizedRecord, RequestContext, VerificationReport,
    VerificationResult,
};
use futures_util::future::join_all;
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Flattened records plus the sources that failed to deliver them
#[derive(Debug, Clone, Default)]
pub struct AggregationOutcome {
    pub records: Vec<NormalizedRecord>,
    pub failures: Vec<SourceError>,
}

impl AggregationOutcome {
    pub fn is_partial(&self) -> bool {
        !self.failures.is_empty()
    }
}

/// Fan-out/fan-in engine over a fixed set of source adapters
pub struct Aggregator {
    adapters: Vec<Arc<dyn SourceAdapter>>,
    settings: AggregatorSettings,
}

impl Aggregator {
    pub fn new(settings: AggregatorSettings) -> Self {
        Self {
            adapters: Vec::new(),
            settings,
        }
    }

    /// Build adapters for every enabled exchange, in configuration order
    pub fn from_config(config: &Config, transport: Arc<dyn Transport>) -> Result<Self> {
        config.validate()?;
        let mut agg = Self::new(config.aggregator.clone());
        for exchange in config.enabled_exchanges() {
            agg.register(build_adapter(exchange, Arc::clone(&transport))?);
        }
        info!("Aggregator ready with {} sources", agg.adapters.len());
        Ok(agg)
    }

    /// Add a source. Registration order is output order.
    pub fn register(&mut self, adapter: Arc<dyn SourceAdapter>) {
        debug!("Registered source {}", adapter.source_id());
        self.adapters.push(adapter);
    }

    pub fn sources(&self) -> Vec<DataSource> {
        self.adapters.iter().map(|a| a.source_id()).collect()
    }

    fn timeout(&self) -> Duration {
        Duration::from_millis(self.settings.request_timeout_ms)
    }

    /// Prices from every source, optionally restricted to `symbols`
    pub async fn aggregate(&self, symbols: Option<&HashSet<String>>) -> Vec<NormalizedRecord> {
        self.aggregate_detailed(symbols).await.records
    }

    /// Like [`Aggregator::aggregate`] but also reports which sources failed
    pub async fn aggregate_detailed(
        &self,
        symbols: Option<&HashSet<String>>,
    ) -> AggregationOutcome {
        let adapters: Vec<&Arc<dyn SourceAdapter>> = self.adapters.iter().collect();
        self.fan_out(&adapters, symbols).await
    }

    /// Aggregate over the registered sources named in `group` only.
    /// An empty group yields no records.
    pub async fn aggregate_group(
        &self,
        group: &[DataSource],
        symbols: Option<&HashSet<String>>,
    ) -> Vec<NormalizedRecord> {
        if group.is_empty() {
            return Vec::new();
        }
        let adapters: Vec<&Arc<dyn SourceAdapter>> = self
            .adapters
            .iter()
            .filter(|a| group.contains(&a.source_id()))
            .collect();
        self.fan_out(&adapters, symbols).await.records
    }

    async fn fan_out(
        &self,
        adapters: &[&Arc<dyn SourceAdapter>],
        symbols: Option<&HashSet<String>>,
    ) -> AggregationOutcome {
        if adapters.is_empty() {
            return AggregationOutcome::default();
        }

        let ctx = RequestContext::new();
        let timeout = self.timeout();
        info!("Fetching prices from {} sources", adapters.len());

        let settled = join_all(adapters.iter().map(|adapter| {
            with_timeout(adapter.source_id(), timeout, adapter.fetch(&ctx))
        }))
        .await;

        let mut outcome = AggregationOutcome::default();
        for result in settled {
            match result {
                Ok(records) => outcome.records.extend(records),
                Err(e) => {
                    warn!("{}", e);
                    outcome.failures.push(e);
                }
            }
        }

        outcome.records = filter_records(outcome.records, symbols);
        info!(
            "Aggregated {} records ({} of {} sources failed)",
            outcome.records.len(),
            outcome.failures.len(),
            adapters.len()
        );
        outcome
    }

    /// Measure liquidity for `target` at every source and check it against `threshold`
    pub async fn verify(&self, target: &str, threshold: f64) -> VerificationReport {
        let ctx = RequestContext::new();
        let timeout = self.timeout();
        info!(
            "Verifying liquidity for {} across {} sources (threshold {})",
            target,
            self.adapters.len(),
            threshold
        );

        let settled = join_all(self.adapters.iter().map(|adapter| {
            with_timeout(adapter.source_id(), timeout, adapter.fetch_liquidity(target, &ctx))
        }))
        .await;

        let results = self
            .adapters
            .iter()
            .zip(settled)
            .map(|(adapter, outcome)| match outcome {
                Ok(quote) => VerificationResult {
                    source_id: quote.source_id,
                    measured_liquidity: quote.liquidity,
                    verified: quote.liquidity >= threshold,
                    signature_valid: is_valid_signature_shape(&quote.signature),
                    error: None,
                },
                Err(e) => {
                    warn!("Verification failed: {}", e);
                    VerificationResult::failed(adapter.source_id(), &e.cause)
                }
            })
            .collect();

        VerificationReport {
            target_address: target.to_string(),
            observed_at: ctx.timestamp,
            results,
        }
    }

    /// Verify `target` with `amount` as threshold and extract from the best source
    pub async fn extract(&self, target: &str, amount: f64) -> Result<ExtractionResult> {
        let report = self.verify(target, amount).await;
        let extraction = extract_from_report(&report, amount)?;
        info!(
            "Extracted {:.4} from {} for {} (tx {})",
            extraction.extracted_amount, extraction.source_id, target, extraction.transaction_id
        );
        Ok(extraction)
    }

    /// Release all adapters and the transports they hold
    pub fn shutdown(self) {
        info!("Shutting down aggregator ({} sources)", self.adapters.len());
        drop(self.adapters);
    }
}

/// Bound one source call by `timeout`, turning elapsed time into a `SourceError`
async fn with_timeout<T, F>(
    source: DataSource,
    timeout: Duration,
    fut: F,
) -> std::result::Result<T, SourceError>
where
    F: Future<Output = std::result::Result<T, SourceError>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(SourceError::new(
            source,
            SourceErrorKind::Timeout {
                after_ms: timeout.as_millis() as u64,
            },
        )),
    }
}

#[cfg(test)]
mod tests;

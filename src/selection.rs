//! Selection policy for the extraction workflow
//!
//! Picks the qualifying source with the most liquidity. A result qualifies
//! when it met the threshold and its signature passed the shape check.

use crate::error::{AggregatorError, Result};
use crate::types::{ExtractionResult, VerificationReport, VerificationResult};
use chrono::{DateTime, SecondsFormat, Utc};
use sha2::{Digest, Sha256};
use tracing::{info, warn};

/// Winner of a verification report. Ties go to the earliest result.
pub fn select_best(report: &VerificationReport) -> Result<VerificationResult> {
    let mut best: Option<&VerificationResult> = None;
    for result in report.results.iter().filter(|r| r.qualifies()) {
        match best {
            Some(b) if result.measured_liquidity <= b.measured_liquidity => {}
            _ => best = Some(result),
        }
    }

    match best {
        Some(winner) => {
            info!(
                "Selected {} for {} with liquidity {:.4} ({} of {} qualified)",
                winner.source_id,
                report.target_address,
                winner.measured_liquidity,
                report.verified_count(),
                report.results.len()
            );
            Ok(winner.clone())
        }
        None => {
            warn!(
                "No qualifying source for {} among {} results",
                report.target_address,
                report.results.len()
            );
            Err(AggregatorError::InsufficientLiquidity {
                target: report.target_address.clone(),
                threshold: 0.0,
            })
        }
    }
}

/// Hex SHA-256 of `target:observed_at`. Not guaranteed unique.
pub fn transaction_id(target: &str, observed_at: DateTime<Utc>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(target.as_bytes());
    hasher.update(b":");
    hasher.update(
        observed_at
            .to_rfc3339_opts(SecondsFormat::Nanos, true)
            .as_bytes(),
    );
    hex::encode(hasher.finalize())
}

/// Package the selected source into an extraction result
pub fn build_extraction(
    report: &VerificationReport,
    winner: &VerificationResult,
) -> ExtractionResult {
    ExtractionResult {
        transaction_id: transaction_id(&report.target_address, report.observed_at),
        extracted_amount: winner.measured_liquidity,
        source_id: winner.source_id,
        observed_at: report.observed_at,
    }
}

/// Select and package in one step, reporting the requested threshold on failure
pub fn extract_from_report(
    report: &VerificationReport,
    threshold: f64,
) -> Result<ExtractionResult> {
    let winner = select_best(report).map_err(|e| match e {
        AggregatorError::InsufficientLiquidity { target, .. } => {
            AggregatorError::InsufficientLiquidity { target, threshold }
        }
        other => other,
    })?;
    Ok(build_extraction(report, &winner))
}

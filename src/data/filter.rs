//! Filter/normalizer over flattened aggregation output

use crate::types::NormalizedRecord;
use std::collections::HashSet;

/// Canonical symbol form: uppercase with `-`, `/`, `_` and spaces removed.
///
/// `BTC-USD`, `btc/usd` and `BTCUSD` all map to `BTCUSD`.
pub fn normalize_symbol(raw: &str) -> String {
    raw.chars()
        .filter(|c| !matches!(c, '-' | '/' | '_' | ' '))
        .flat_map(char::to_uppercase)
        .collect()
}

/// Parse a price or liquidity field. Rejects NaN, infinities and negatives.
pub fn parse_value(raw: &str) -> Option<f64> {
    let v: f64 = raw.trim().parse().ok()?;
    (v.is_finite() && v >= 0.0).then_some(v)
}

/// Keep a record iff `symbols` is absent or contains its symbol. Order is preserved.
pub fn filter_records(
    records: Vec<NormalizedRecord>,
    symbols: Option<&HashSet<String>>,
) -> Vec<NormalizedRecord> {
    match symbols {
        None => records,
        Some(set) => records
            .into_iter()
            .filter(|r| set.contains(&r.symbol))
            .collect(),
    }
}

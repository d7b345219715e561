//! Time-weighted average of price samples

use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use tracing::warn;

use index_core::Sample;

/// Decimal places of a published index price
pub const PRICE_SCALE: u32 = 2;

/// Weighted average price of `samples`, unrounded.
///
/// Each sample is weighted by the whole seconds separating it from the
/// earliest sample of the batch, with a floor of one. Offsets rather than raw
/// epoch seconds are used because epoch values within one window are nearly
/// identical and would flatten the weighting.
pub fn weighted_average(samples: &[Sample]) -> Decimal {
    match samples {
        [] => Decimal::ZERO,
        [only] => only.price,
        _ => {
            let mut sorted: Vec<&Sample> = samples.iter().collect();
            sorted.sort_by_key(|s| s.observed_at);
            let min_time = sorted[0].observed_at;

            exact_average(&sorted, min_time)
                .or_else(|| running_average(&sorted, min_time))
                .unwrap_or_else(|| {
                    let latest = sorted[sorted.len() - 1];
                    warn!(
                        "Weighted average of {} samples out of decimal range, using latest price",
                        sorted.len()
                    );
                    latest.price
                })
        }
    }
}

/// Sum of weighted prices over sum of weights. `None` on overflow.
fn exact_average(sorted: &[&Sample], min_time: DateTime<Utc>) -> Option<Decimal> {
    let mut numerator = Decimal::ZERO;
    let mut denominator = Decimal::ZERO;
    for sample in sorted {
        let weight = Decimal::from(sample_weight(sample.observed_at, min_time));
        numerator = numerator.checked_add(sample.price.checked_mul(weight)?)?;
        denominator = denominator.checked_add(weight)?;
    }
    numerator.checked_div(denominator)
}

/// Incremental form of the same average. Intermediates stay within the
/// range of the prices, so it only fails where `exact_average` already has.
fn running_average(sorted: &[&Sample], min_time: DateTime<Utc>) -> Option<Decimal> {
    let (first, rest) = sorted.split_first()?;
    let mut mean = first.price;
    let mut total = Decimal::from(sample_weight(first.observed_at, min_time));
    for sample in rest {
        let weight = Decimal::from(sample_weight(sample.observed_at, min_time));
        total = total.checked_add(weight)?;
        let step = sample.price.checked_sub(mean)?.checked_div(total)?.checked_mul(weight)?;
        mean = mean.checked_add(step)?;
    }
    Some(mean)
}

/// Whole seconds between `observed_at` and `min_time`, never less than one.
pub fn sample_weight(observed_at: DateTime<Utc>, min_time: DateTime<Utc>) -> i64 {
    (observed_at - min_time).num_seconds().max(1)
}

/// Round to [`PRICE_SCALE`] places, keeping trailing zeros (`250` -> `250.00`).
pub fn round_amount(amount: Decimal) -> Decimal {
    let mut rounded = amount.round_dp_with_strategy(PRICE_SCALE, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(PRICE_SCALE);
    rounded
}

use crate::market_data::types::{ChangeSign, PricePoint, Snapshot};

/// Converts a price point into local currency and measures the change
/// against the previous cycle's total.
///
/// Pure: the caller owns `previous_total` and replaces it with the
/// returned `total_value_local` once the cycle has used it.
pub fn compute(point: &PricePoint, rate: f64, previous_total: Option<f64>) -> Snapshot {
    let market_price_local = point.price_usd * rate;
    let total_value_local = market_price_local * point.volume_units;
    let change_local = previous_total.map_or(0.0, |previous| total_value_local - previous);

    let change_sign = if change_local > 0.0 {
        ChangeSign::Positive
    } else if change_local < 0.0 {
        ChangeSign::Negative
    } else {
        ChangeSign::Zero
    };

    Snapshot {
        market_price_local,
        volume_units: point.volume_units,
        total_value_local,
        change_local,
        change_sign,
    }
}

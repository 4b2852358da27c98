/// Price and volume of the tracked asset as reported by a price source.
/// Rebuilt every cycle, never persisted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PricePoint {
    pub price_usd: f64,
    pub volume_units: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeSign {
    Positive,
    Negative,
    Zero,
}

/// Values derived from one cycle's price point and exchange rate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Snapshot {
    pub market_price_local: f64,
    pub volume_units: f64,
    pub total_value_local: f64,
    pub change_local: f64,
    pub change_sign: ChangeSign,
}

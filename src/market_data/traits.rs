use async_trait::async_trait;

use crate::market_data::types::PricePoint;

/// Source of the USD→local exchange rate.
///
/// Infallible by contract: implementations recover from upstream
/// failures themselves and always hand back a usable rate.
#[async_trait]
pub trait RateSource: Send + Sync {
    async fn get_rate(&self) -> f64;
}

/// Source of the asset's USD price and volume.
#[async_trait]
pub trait PriceSource: Send + Sync {
    async fn get_price(&self) -> anyhow::Result<PricePoint>;
}

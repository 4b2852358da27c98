use anyhow::{Context, anyhow};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::PriceConfig;
use crate::market_data::json;
use crate::market_data::traits::PriceSource;
use crate::market_data::types::PricePoint;
use crate::metrics::prometheus::record_price_fetch;

/// Asset price and volume from a primary endpoint, with a secondary
/// endpoint of a different shape as fallback.
pub struct PriceFetcher {
    client: reqwest::Client,
    config: PriceConfig,
}

impl PriceFetcher {
    pub fn new(client: reqwest::Client, config: PriceConfig) -> Self {
        Self { client, config }
    }

    async fn fetch_primary(&self) -> anyhow::Result<PricePoint> {
        let res = self
            .client
            .get(&self.config.primary_url)
            .send()
            .await
            .context("unable to reach primary price source")?;

        if res.status() == StatusCode::BAD_GATEWAY {
            anyhow::bail!("primary price source returned 502 Bad Gateway");
        }

        let body: Value = res
            .error_for_status()?
            .json()
            .await
            .context("unable to parse primary price response")?;

        let field = |path: &str| {
            json::lookup(&body, path)
                .and_then(json::as_amount)
                .with_context(|| format!("primary response has no numeric `{path}`"))
        };

        validated(PricePoint {
            price_usd: field(&self.config.primary_price_field)?,
            volume_units: field(&self.config.primary_volume_field)?,
        })
    }

    async fn fetch_secondary(&self) -> anyhow::Result<PricePoint> {
        let res: api::Stats = self
            .client
            .get(&self.config.secondary_url)
            .send()
            .await
            .context("unable to reach secondary price source")?
            .error_for_status()?
            .json()
            .await
            .context("unable to parse secondary price response")?;

        validated(PricePoint {
            price_usd: res.market_price_usd,
            volume_units: res.trade_volume_btc,
        })
    }
}

fn validated(point: PricePoint) -> anyhow::Result<PricePoint> {
    if !(point.price_usd.is_finite() && point.price_usd > 0.0) {
        anyhow::bail!("price {} is not a positive number", point.price_usd);
    }
    if !(point.volume_units.is_finite() && point.volume_units >= 0.0) {
        anyhow::bail!("volume {} is not a non-negative number", point.volume_units);
    }
    Ok(point)
}

#[async_trait]
impl PriceSource for PriceFetcher {
    async fn get_price(&self) -> anyhow::Result<PricePoint> {
        let primary_err = match self.fetch_primary().await {
            Ok(point) => {
                debug!(?point, "price from primary source");
                record_price_fetch("primary");
                return Ok(point);
            }
            Err(err) => err,
        };

        warn!(error = %format!("{primary_err:#}"), "primary price source failed, trying secondary");

        match self.fetch_secondary().await {
            Ok(point) => {
                debug!(?point, "price from secondary source");
                record_price_fetch("secondary");
                Ok(point)
            }
            Err(err) => {
                warn!(error = %format!("{err:#}"), "secondary price source failed");
                record_price_fetch("failed");
                Err(anyhow!("could not retrieve price data"))
            }
        }
    }
}

mod api {
    use serde::Deserialize;

    #[derive(Deserialize, Debug)]
    pub struct Stats {
        pub market_price_usd: f64,
        pub trade_volume_btc: f64,
    }
}

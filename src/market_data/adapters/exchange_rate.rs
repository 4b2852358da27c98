use anyhow::Context;
use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::config::RateConfig;
use crate::market_data::traits::RateSource;
use crate::metrics::prometheus::{record_rate, record_rate_lookup};
use crate::state::rate_cache::RateCache;

/// USD→local exchange rate with a TTL cache in front of the remote
/// endpoint. Falls back to the last stored rate, then to a fixed default.
pub struct ExchangeRateFetcher {
    client: reqwest::Client,
    config: RateConfig,
    cache: RateCache,
}

impl ExchangeRateFetcher {
    pub fn new(client: reqwest::Client, config: RateConfig, cache: RateCache) -> Self {
        Self { client, config, cache }
    }

    async fn fetch_remote(&self) -> anyhow::Result<f64> {
        let res: api::Response = self
            .client
            .get(&self.config.url)
            .send()
            .await
            .context("unable to get exchange rate")?
            .error_for_status()?
            .json()
            .await
            .context("unable to parse exchange rate response")?;

        let rate = res
            .rates
            .get(&self.config.currency)
            .copied()
            .with_context(|| format!("response has no rate for {}", self.config.currency))?;

        if !(rate.is_finite() && rate > 0.0) {
            anyhow::bail!("exchange rate {rate} is not a positive number");
        }

        Ok(rate)
    }

    /// Resolves the rate and names where it came from: cache, remote,
    /// stale or default.
    async fn lookup_rate(&self) -> (f64, &'static str) {
        let now_ms = chrono::Utc::now().timestamp_millis();
        let cached = self.cache.load(now_ms);

        if let Some(cached) = cached.filter(|c| self.cache.is_fresh(c, now_ms)) {
            debug!(rate = cached.rate, "exchange rate served from cache");
            return (cached.rate, "cache");
        }

        let rate = match self.fetch_remote().await {
            Ok(rate) => rate,
            Err(err) => {
                let error = format!("{err:#}");
                return match cached {
                    Some(stale) => {
                        warn!(%error, rate = stale.rate, "exchange rate refresh failed, using stale cache");
                        (stale.rate, "stale")
                    }
                    None => {
                        warn!(%error, rate = self.config.default_rate, "exchange rate refresh failed, using default");
                        (self.config.default_rate, "default")
                    }
                };
            }
        };

        if let Err(err) = self.cache.save(rate, now_ms) {
            warn!(error = %format!("{err:#}"), "failed to cache exchange rate");
        }

        info!(rate, currency = %self.config.currency, "exchange rate refreshed");
        (rate, "remote")
    }
}

#[async_trait]
impl RateSource for ExchangeRateFetcher {
    async fn get_rate(&self) -> f64 {
        let (rate, source) = self.lookup_rate().await;
        record_rate_lookup(source);
        record_rate(rate);
        rate
    }
}

mod api {
    use serde::Deserialize;
    use std::collections::HashMap;

    #[derive(Deserialize, Debug)]
    pub struct Response {
        pub rates: HashMap<String, f64>,
    }
}

use anyhow::Context;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_RATE_URL: &str = "https://api.exchangerate-api.com/v4/latest/USD";
pub const DEFAULT_PRIMARY_URL: &str = "https://api.blockcypher.com/v1/btc/main";
pub const DEFAULT_SECONDARY_URL: &str = "https://api.blockchain.info/stats";

/// Runtime configuration. Every field has a default so the ticker runs
/// with an empty environment.
#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub rate: RateConfig,
    pub price: PriceConfig,
    pub cache_path: PathBuf,
    pub output_path: PathBuf,
    pub refresh_interval: Duration,
    pub http_timeout: Option<Duration>,
    pub metrics_port: Option<u16>,
}

#[derive(Debug, Clone)]
pub struct RateConfig {
    pub url: String,
    /// Key looked up under `rates` in the response body.
    pub currency: String,
    pub default_rate: f64,
    pub ttl: Duration,
}

#[derive(Debug, Clone)]
pub struct PriceConfig {
    pub primary_url: String,
    /// Dot-separated paths into the primary payload. The upstream field
    /// names are a best guess, hence configurable.
    pub primary_price_field: String,
    pub primary_volume_field: String,
    pub secondary_url: String,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        // dotenvy loads .env, but doesn't override already-set env vars
        dotenvy::dotenv().ok();

        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let string = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let rate = RateConfig {
            url: string("TICKER_RATE_URL", DEFAULT_RATE_URL),
            currency: string("TICKER_RATE_CURRENCY", "RUB"),
            default_rate: parse(&lookup, "TICKER_DEFAULT_RATE")?.unwrap_or(90.0),
            ttl: Duration::from_secs(parse(&lookup, "TICKER_RATE_TTL_SECS")?.unwrap_or(3_600)),
        };

        if !(rate.default_rate.is_finite() && rate.default_rate > 0.0) {
            anyhow::bail!("TICKER_DEFAULT_RATE must be a positive number, got {}", rate.default_rate);
        }

        let price = PriceConfig {
            primary_url: string("TICKER_PRIMARY_URL", DEFAULT_PRIMARY_URL),
            primary_price_field: string("TICKER_PRIMARY_PRICE_FIELD", "last_price"),
            primary_volume_field: string("TICKER_PRIMARY_VOLUME_FIELD", "total_fees"),
            secondary_url: string("TICKER_SECONDARY_URL", DEFAULT_SECONDARY_URL),
        };

        let refresh_secs: u64 = parse(&lookup, "TICKER_REFRESH_SECS")?.unwrap_or(60);
        if refresh_secs == 0 {
            anyhow::bail!("TICKER_REFRESH_SECS must be greater than zero");
        }

        let http_timeout: Option<u64> = parse(&lookup, "TICKER_HTTP_TIMEOUT_SECS")?;
        if http_timeout == Some(0) {
            anyhow::bail!("TICKER_HTTP_TIMEOUT_SECS must be greater than zero");
        }

        Ok(Self {
            log_level: string("RUST_LOG", "info"),
            rate,
            price,
            cache_path: PathBuf::from(string("TICKER_CACHE_PATH", ".ticker-cache.json")),
            output_path: PathBuf::from(string("TICKER_OUTPUT_PATH", "ticker.html")),
            refresh_interval: Duration::from_secs(refresh_secs),
            http_timeout: http_timeout.map(Duration::from_secs),
            metrics_port: parse(&lookup, "TICKER_METRICS_PORT")?,
        })
    }
}

fn parse<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> anyhow::Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    lookup(key)
        .map(|raw| raw.trim().parse::<T>().with_context(|| format!("invalid value for {key}: {raw:?}")))
        .transpose()
}

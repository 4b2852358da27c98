mod config;
mod market_data;
mod metrics;
mod render;
mod scheduler;
mod state;
mod valuation;

use anyhow::Result;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use config::Config;
use market_data::adapters::exchange_rate::ExchangeRateFetcher;
use market_data::adapters::price::PriceFetcher;
use render::TableRenderer;
use render::html::HtmlFileSurface;
use scheduler::RefreshScheduler;
use state::rate_cache::RateCache;
use state::store::FileStore;

fn init_tracing(default_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;
    init_tracing(&config.log_level);

    info!("rub-ticker starting");

    if let Some(port) = config.metrics_port {
        metrics::prometheus::init_metrics_server(port)?;
        info!(port, "metrics exporter listening");
    }

    let client = market_data::build_client(config.http_timeout)?;

    let store = FileStore::new(&config.cache_path);
    info!(path = %store.path().display(), "rate cache");
    let cache = RateCache::new(Box::new(store), config.rate.ttl);

    let rates = ExchangeRateFetcher::new(client.clone(), config.rate.clone(), cache);
    let prices = PriceFetcher::new(client, config.price.clone());

    let surface = HtmlFileSurface::new(&config.output_path, config.refresh_interval);
    info!(path = %surface.path().display(), "rendering ticker page");

    let scheduler = Arc::new(RefreshScheduler::new(
        Box::new(rates),
        Box::new(prices),
        TableRenderer::new(surface),
    ));

    let scheduler_handle = tokio::spawn(scheduler.run(config.refresh_interval));

    tokio::select! {
        res = scheduler_handle => {
            match res {
                Ok(Ok(())) => warn!("scheduler exited"),
                Ok(Err(err)) => warn!(error = %err, "scheduler returned error"),
                Err(err) => warn!(error = %err, "scheduler task panicked"),
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("received Ctrl-C, shutting down");
        }
    }

    Ok(())
}

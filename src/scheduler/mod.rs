use chrono::Local;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::market_data::traits::{PriceSource, RateSource};
use crate::market_data::types::Snapshot;
use crate::metrics::prometheus::{record_cycle, record_total_value};
use crate::render::{DisplaySurface, TableRenderer};
use crate::valuation;

#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    Rendered(Snapshot),
    Failed(String),
    /// Another cycle was still running.
    Skipped,
}

/// Drives fetch → compute → render cycles, one at a time.
///
/// A request arriving while a cycle is in flight is dropped, not queued.
pub struct RefreshScheduler<S> {
    rates: Box<dyn RateSource>,
    prices: Box<dyn PriceSource>,
    renderer: TableRenderer<S>,
    in_flight: AtomicBool,
    /// Total of the last successful cycle; only touched while `in_flight` is held.
    previous_total: Mutex<Option<f64>>,
}

/// Holds the single-flight flag until dropped, including on panic.
struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    fn claim(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl<S: DisplaySurface> RefreshScheduler<S> {
    pub fn new(
        rates: Box<dyn RateSource>,
        prices: Box<dyn PriceSource>,
        renderer: TableRenderer<S>,
    ) -> Self {
        Self {
            rates,
            prices,
            renderer,
            in_flight: AtomicBool::new(false),
            previous_total: Mutex::new(None),
        }
    }

    /// Runs one cycle unless one is already in flight.
    pub async fn refresh(&self) -> CycleOutcome {
        let Some(_in_flight) = InFlight::claim(&self.in_flight) else {
            info!("refresh already in flight, skipping cycle");
            record_cycle("skipped");
            return CycleOutcome::Skipped;
        };

        if let Err(err) = self.renderer.render_loading() {
            warn!(error = %format!("{err:#}"), "failed to render loading placeholder");
        }

        match self.run_cycle().await {
            Ok(snapshot) => {
                record_cycle("ok");
                CycleOutcome::Rendered(snapshot)
            }
            Err(err) => {
                let reason = format!("{err:#}");
                warn!(error = %reason, "refresh cycle failed");
                record_cycle("failed");

                if let Err(err) = self.renderer.render_error(&reason, Local::now()) {
                    warn!(error = %format!("{err:#}"), "failed to render error row");
                }

                CycleOutcome::Failed(reason)
            }
        }
    }

    async fn run_cycle(&self) -> anyhow::Result<Snapshot> {
        // Both fetches run to completion; a price failure then fails the cycle
        let (rate, point) = futures::join!(self.rates.get_rate(), self.prices.get_price());
        let point = point?;

        let snapshot = {
            let mut previous = self.previous_total.lock().unwrap_or_else(PoisonError::into_inner);
            let snapshot = valuation::compute(&point, rate, *previous);
            *previous = Some(snapshot.total_value_local);
            snapshot
        };

        info!(
            rate,
            price_usd = point.price_usd,
            volume = point.volume_units,
            total = snapshot.total_value_local,
            change = snapshot.change_local,
            "snapshot computed"
        );
        record_total_value(snapshot.total_value_local);

        self.renderer.render(&snapshot, Local::now())?;
        Ok(snapshot)
    }
}

impl<S: DisplaySurface + 'static> RefreshScheduler<S> {
    /// Fires a cycle immediately, then once per `period`, forever.
    /// Each cycle runs on its own task; ticks landing on a running cycle
    /// are dropped by the single-flight guard.
    pub async fn run(self: Arc<Self>, period: Duration) -> anyhow::Result<()> {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(period_secs = period.as_secs(), "refresh scheduler started");

        loop {
            ticker.tick().await;
            debug!("refresh tick");

            let scheduler = Arc::clone(&self);
            tokio::spawn(async move {
                scheduler.refresh().await;
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market_data::types::{ChangeSign, PricePoint};
    use crate::render::testing::RecordingSurface;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::Notify;

    struct FixedRate {
        rate: f64,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl RateSource for FixedRate {
        async fn get_rate(&self) -> f64 {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.rate
        }
    }

    /// Replays scripted results; optionally parks inside the fetch until released.
    struct ScriptedPrice {
        results: Mutex<VecDeque<Result<PricePoint, String>>>,
        calls: Arc<AtomicUsize>,
        entered: Arc<Notify>,
        gate: Option<Arc<Notify>>,
    }

    #[async_trait]
    impl PriceSource for ScriptedPrice {
        async fn get_price(&self) -> anyhow::Result<PricePoint> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.entered.notify_one();
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            let next = self.results.lock().unwrap().pop_front().expect("no scripted price left");
            next.map_err(|reason| anyhow::anyhow!(reason))
        }
    }

    struct Harness {
        scheduler: Arc<RefreshScheduler<RecordingSurface>>,
        rate_calls: Arc<AtomicUsize>,
        price_calls: Arc<AtomicUsize>,
        entered: Arc<Notify>,
    }

    fn harness(results: Vec<Result<PricePoint, String>>, gate: Option<Arc<Notify>>) -> Harness {
        let rate_calls = Arc::new(AtomicUsize::new(0));
        let price_calls = Arc::new(AtomicUsize::new(0));
        let entered = Arc::new(Notify::new());

        let scheduler = RefreshScheduler::new(
            Box::new(FixedRate { rate: 90.0, calls: rate_calls.clone() }),
            Box::new(ScriptedPrice {
                results: Mutex::new(results.into()),
                calls: price_calls.clone(),
                entered: entered.clone(),
                gate,
            }),
            TableRenderer::new(RecordingSurface::default()),
        );

        Harness {
            scheduler: Arc::new(scheduler),
            rate_calls,
            price_calls,
            entered,
        }
    }

    fn point(price_usd: f64, volume_units: f64) -> Result<PricePoint, String> {
        Ok(PricePoint { price_usd, volume_units })
    }

    fn previous_total(scheduler: &RefreshScheduler<RecordingSurface>) -> Option<f64> {
        *scheduler.previous_total.lock().unwrap()
    }

    #[tokio::test]
    async fn successive_cycles_track_change() {
        let h = harness(vec![point(50_000.0, 1.0), point(40_000.0, 1.0)], None);

        let CycleOutcome::Rendered(first) = h.scheduler.refresh().await else {
            panic!("first cycle did not render");
        };
        assert_eq!(first.total_value_local, 4_500_000.0);
        assert_eq!(first.change_sign, ChangeSign::Zero);
        assert_eq!(previous_total(&h.scheduler), Some(4_500_000.0));

        let CycleOutcome::Rendered(second) = h.scheduler.refresh().await else {
            panic!("second cycle did not render");
        };
        assert_eq!(second.change_local, -900_000.0);
        assert_eq!(second.change_sign, ChangeSign::Negative);
        assert_eq!(previous_total(&h.scheduler), Some(3_600_000.0));

        let surface = h.scheduler.renderer.surface();
        let bodies = surface.bodies.lock().unwrap();
        assert!(bodies[0].contains("Loading"));
        assert!(bodies[1].contains("change-neutral"));
        assert!(bodies[3].contains("change-negative"));
        assert!(surface.last_status().unwrap().starts_with("Last updated: "));
    }

    #[tokio::test]
    async fn price_failure_renders_error_and_releases_guard() {
        let h = harness(
            vec![Err("could not retrieve price data".to_string()), point(50_000.0, 1.0)],
            None,
        );

        let outcome = h.scheduler.refresh().await;

        assert_eq!(outcome, CycleOutcome::Failed("could not retrieve price data".to_string()));
        assert_eq!(previous_total(&h.scheduler), None);
        let surface = h.scheduler.renderer.surface();
        assert!(surface.last_body().unwrap().contains("class=\"error\""));
        assert!(surface.last_body().unwrap().contains("could not retrieve price data"));
        assert!(surface.last_status().unwrap().starts_with("Update failed: "));

        assert!(matches!(h.scheduler.refresh().await, CycleOutcome::Rendered(_)));
    }

    #[tokio::test]
    async fn overlapping_refresh_is_dropped() {
        let gate = Arc::new(Notify::new());
        let h = harness(vec![point(50_000.0, 1.0), point(50_000.0, 2.0)], Some(gate.clone()));

        let first = tokio::spawn({
            let scheduler = h.scheduler.clone();
            async move { scheduler.refresh().await }
        });
        h.entered.notified().await;

        assert_eq!(h.scheduler.refresh().await, CycleOutcome::Skipped);
        assert_eq!(h.price_calls.load(Ordering::SeqCst), 1);
        assert_eq!(h.rate_calls.load(Ordering::SeqCst), 1);
        assert_eq!(previous_total(&h.scheduler), None);

        gate.notify_one();
        assert!(matches!(first.await.unwrap(), CycleOutcome::Rendered(_)));
        assert_eq!(previous_total(&h.scheduler), Some(4_500_000.0));

        // Back to idle: the next request runs
        let second = tokio::spawn({
            let scheduler = h.scheduler.clone();
            async move { scheduler.refresh().await }
        });
        h.entered.notified().await;
        gate.notify_one();
        assert!(matches!(second.await.unwrap(), CycleOutcome::Rendered(_)));
        assert_eq!(h.price_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn run_fires_immediately_then_every_period() {
        let results = (0..10).map(|_| point(50_000.0, 1.0)).collect();
        let h = harness(results, None);

        let runner = tokio::spawn(h.scheduler.clone().run(Duration::from_secs(60)));

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(h.price_calls.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(h.price_calls.load(Ordering::SeqCst), 3);

        runner.abort();
    }

    struct SlowRate {
        finished: Arc<AtomicBool>,
    }

    #[async_trait]
    impl RateSource for SlowRate {
        async fn get_rate(&self) -> f64 {
            tokio::time::sleep(Duration::from_millis(50)).await;
            self.finished.store(true, Ordering::SeqCst);
            90.0
        }
    }

    struct PanicsOnce {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl PriceSource for PanicsOnce {
        async fn get_price(&self) -> anyhow::Result<PricePoint> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                panic!("price source blew up");
            }
            Ok(PricePoint { price_usd: 50_000.0, volume_units: 1.0 })
        }
    }

    /// Accepts loading and error rows, rejects data rows.
    #[derive(Default)]
    struct RejectingSurface {
        error_rows: AtomicUsize,
    }

    impl DisplaySurface for RejectingSurface {
        fn set_table_body(&self, html: &str) -> anyhow::Result<()> {
            if html.contains("class=\"error\"") {
                self.error_rows.fetch_add(1, Ordering::SeqCst);
            }
            if !html.contains("colspan") {
                anyhow::bail!("disk full");
            }
            Ok(())
        }

        fn set_status(&self, _text: &str) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn price_failure_lets_rate_lookup_finish() {
        let finished = Arc::new(AtomicBool::new(false));
        let scheduler = RefreshScheduler::new(
            Box::new(SlowRate { finished: finished.clone() }),
            Box::new(ScriptedPrice {
                results: Mutex::new(vec![Err("could not retrieve price data".to_string())].into()),
                calls: Arc::new(AtomicUsize::new(0)),
                entered: Arc::new(Notify::new()),
                gate: None,
            }),
            TableRenderer::new(RecordingSurface::default()),
        );

        let outcome = scheduler.refresh().await;

        assert_eq!(outcome, CycleOutcome::Failed("could not retrieve price data".to_string()));
        assert!(finished.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn render_failure_renders_error_and_releases_guard() {
        let price_calls = Arc::new(AtomicUsize::new(0));
        let scheduler = RefreshScheduler::new(
            Box::new(FixedRate { rate: 90.0, calls: Arc::new(AtomicUsize::new(0)) }),
            Box::new(ScriptedPrice {
                results: Mutex::new(vec![point(50_000.0, 1.0), point(50_000.0, 1.0)].into()),
                calls: price_calls.clone(),
                entered: Arc::new(Notify::new()),
                gate: None,
            }),
            TableRenderer::new(RejectingSurface::default()),
        );

        let CycleOutcome::Failed(reason) = scheduler.refresh().await else {
            panic!("render failure did not fail the cycle");
        };
        assert!(reason.contains("disk full"));
        assert_eq!(scheduler.renderer.surface().error_rows.load(Ordering::SeqCst), 1);

        assert!(matches!(scheduler.refresh().await, CycleOutcome::Failed(_)));
        assert_eq!(price_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn panicking_cycle_releases_guard() {
        let scheduler = Arc::new(RefreshScheduler::new(
            Box::new(FixedRate { rate: 90.0, calls: Arc::new(AtomicUsize::new(0)) }),
            Box::new(PanicsOnce { calls: AtomicUsize::new(0) }),
            TableRenderer::new(RecordingSurface::default()),
        ));

        let crashed = tokio::spawn({
            let scheduler = scheduler.clone();
            async move { scheduler.refresh().await }
        });
        assert!(crashed.await.unwrap_err().is_panic());

        assert!(matches!(scheduler.refresh().await, CycleOutcome::Rendered(_)));
    }
}

//! Background refresh tasks.
//!
//! Each task is a tokio task driven by an interval and a `watch` shutdown
//! channel; `stop()` signals and then joins it.

use rates_types::{CurrencyPair, RatePersistence, RateRecord};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, instrument, warn};

use crate::resolver::RateResolver;

/// A supervised periodic task.
pub struct BackgroundTask {
    name: &'static str,
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl BackgroundTask {
    /// Spawns `tick` every `period`. The first tick fires immediately when
    /// `immediate` is set, otherwise after one period.
    ///
    /// `tick` receives a shutdown receiver so long ticks can bail out early.
    pub fn spawn<F, Fut>(name: &'static str, period: Duration, immediate: bool, mut tick: F) -> Self
    where
        F: FnMut(watch::Receiver<bool>) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (shutdown, mut rx) = watch::channel(false);
        let handle = tokio::spawn(async move {
            info!(task = name, period_secs = period.as_secs(), "Background task started");

            let start = if immediate {
                Instant::now()
            } else {
                Instant::now() + period
            };
            let mut ticker = tokio::time::interval_at(start, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    changed = rx.changed() => {
                        if changed.is_err() || *rx.borrow() {
                            break;
                        }
                    }
                    _ = ticker.tick() => tick(rx.clone()).await,
                }
            }

            info!(task = name, "Background task stopped");
        });

        Self {
            name,
            shutdown,
            handle,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// True once the task has exited.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Signals shutdown and waits for the task to exit.
    pub async fn stop(self) {
        let name = self.name;
        let _ = self.shutdown.send(true);
        if let Err(err) = self.handle.await {
            error!(task = name, %err, "Background task ended abnormally");
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Prefetch
// ─────────────────────────────────────────────────────────────────────────────

/// Warms the caches for frequently requested pairs.
pub fn spawn_prefetch(resolver: Arc<RateResolver>) -> BackgroundTask {
    let config = resolver.config();
    let period = config.prefetch_interval;
    let pairs = Arc::new(config.prefetch_pairs.clone());
    let delay = config.prefetch_pair_delay;

    BackgroundTask::spawn("prefetch", period, false, move |shutdown| {
        let resolver = Arc::clone(&resolver);
        let pairs = Arc::clone(&pairs);
        async move { prefetch_pairs(&resolver, &pairs, delay, shutdown).await }
    })
}

#[instrument(skip_all, fields(pairs = pairs.len()))]
async fn prefetch_pairs(
    resolver: &RateResolver,
    pairs: &[CurrencyPair],
    delay: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    for (i, pair) in pairs.iter().enumerate() {
        if i > 0 {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown.changed() => return,
            }
        }
        let resolution = resolver.resolve(pair.from_code(), pair.to_code(), None).await;
        debug!(%pair, rate = %resolution.rate, origin = %resolution.origin, "Prefetched rate");
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Auto-update
// ─────────────────────────────────────────────────────────────────────────────

/// Outcome of refreshing the tracked currencies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshReport {
    pub total: usize,
    pub live: usize,
    pub stored: usize,
}

impl RefreshReport {
    pub fn all_live(&self) -> bool {
        self.live == self.total
    }
}

/// Resolves every tracked currency against the base currency and hands live
/// results to `persistence`.
#[instrument(skip_all)]
pub async fn refresh_tracked(
    resolver: &RateResolver,
    persistence: Option<&dyn RatePersistence>,
) -> RefreshReport {
    let config = resolver.config();
    let base = config.base_currency.as_str();
    let mut report = RefreshReport::default();

    for currency in &config.tracked_currencies {
        report.total += 1;
        let resolution = resolver.resolve(currency, base, None).await;
        if !resolution.origin.is_live() {
            warn!(currency, base, origin = %resolution.origin, "No live rate, not recording");
            continue;
        }
        report.live += 1;

        let (Some(persistence), Ok(pair)) = (persistence, CurrencyPair::new(currency, base)) else {
            continue;
        };
        if pair.is_identity() {
            continue;
        }

        let record = RateRecord::new(pair, resolution.rate, resolution.origin.label());
        match persistence.store_rate(record).await {
            Ok(()) => report.stored += 1,
            Err(err) => error!(currency, base, %err, "Failed to persist rate"),
        }
    }

    info!(
        total = report.total,
        live = report.live,
        stored = report.stored,
        "Tracked currencies refreshed"
    );
    report
}

/// Periodically refreshes and persists the tracked currencies.
pub fn spawn_auto_update(
    resolver: Arc<RateResolver>,
    persistence: Arc<dyn RatePersistence>,
) -> BackgroundTask {
    let period = resolver.config().auto_update_interval;

    BackgroundTask::spawn("auto-update", period, true, move |_shutdown| {
        let resolver = Arc::clone(&resolver);
        let persistence = Arc::clone(&persistence);
        async move {
            refresh_tracked(&resolver, Some(persistence.as_ref())).await;
        }
    })
}

//! Currency Application Service
//!
//! The single entry point consumers use. Wraps the resolver and owns the
//! background tasks.

use chrono::NaiveDate;
use rates_types::{DetailedStats, RatePersistence};
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{info, warn};

use crate::resolver::{RateResolver, Resolution};
use crate::tasks::{self, BackgroundTask};

/// Application service for rate lookups and refresh scheduling.
pub struct CurrencyService {
    resolver: Arc<RateResolver>,
    persistence: Option<Arc<dyn RatePersistence>>,
    auto_update: Mutex<Option<BackgroundTask>>,
    prefetch: Mutex<Option<BackgroundTask>>,
}

impl CurrencyService {
    /// Creates a service over the given resolver.
    pub fn new(resolver: RateResolver) -> Self {
        Self {
            resolver: Arc::new(resolver),
            persistence: None,
            auto_update: Mutex::new(None),
            prefetch: Mutex::new(None),
        }
    }

    /// Attaches the collaborator that receives refreshed rates.
    pub fn with_persistence(mut self, persistence: Arc<dyn RatePersistence>) -> Self {
        self.persistence = Some(persistence);
        self
    }

    pub fn resolver(&self) -> &RateResolver {
        &self.resolver
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Lookups
    // ─────────────────────────────────────────────────────────────────────────────

    /// Resolves a rate and reports where it came from.
    pub async fn resolve(&self, from: &str, to: &str, date: Option<NaiveDate>) -> Resolution {
        self.resolver.resolve(from, to, date).await
    }

    pub async fn get_exchange_rate(&self, from: &str, to: &str, date: Option<NaiveDate>) -> Decimal {
        self.resolver.get_exchange_rate(from, to, date).await
    }

    pub async fn get_current_rate(&self, from: &str, to: &str) -> Decimal {
        self.resolver.get_current_rate(from, to).await
    }

    pub async fn get_historical_rate(&self, date: NaiveDate, from: &str, to: &str) -> Decimal {
        self.resolver.get_historical_rate(date, from, to).await
    }

    pub async fn get_monthly_average_rate(
        &self,
        year: i32,
        month: u32,
        from: &str,
        to: &str,
    ) -> Decimal {
        self.resolver
            .get_monthly_average_rate(year, month, from, to)
            .await
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Maintenance
    // ─────────────────────────────────────────────────────────────────────────────

    pub fn clear_cache(&self) {
        self.resolver.clear_cache();
    }

    pub async fn get_provider_status(&self) -> BTreeMap<String, bool> {
        self.resolver.get_provider_status().await
    }

    pub fn get_detailed_stats(&self) -> DetailedStats {
        let mut stats = self.resolver.get_detailed_stats();
        stats.auto_update_running = self.is_auto_update_running();
        stats.prefetch_running = is_running(&self.prefetch);
        stats
    }

    /// Drops every cache and refreshes the tracked currencies right away.
    ///
    /// Returns true only if every tracked currency came from a live source.
    pub async fn force_update(&self) -> bool {
        self.resolver.clear_cache();
        let report = tasks::refresh_tracked(&self.resolver, self.persistence.as_deref()).await;
        if !report.all_live() {
            warn!(
                live = report.live,
                total = report.total,
                "Forced update fell back for some currencies"
            );
        }
        report.all_live()
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Background Tasks
    // ─────────────────────────────────────────────────────────────────────────────

    /// Starts the periodic auto-update. Returns false if it is already
    /// running or no persistence is attached.
    pub fn start_auto_update(&self) -> bool {
        let Some(persistence) = self.persistence.clone() else {
            warn!("Auto-update needs a persistence collaborator");
            return false;
        };

        let mut slot = lock(&self.auto_update);
        if slot.as_ref().is_some_and(|task| !task.is_finished()) {
            return false;
        }
        *slot = Some(tasks::spawn_auto_update(
            Arc::clone(&self.resolver),
            persistence,
        ));
        true
    }

    /// Stops the auto-update and waits for it to exit.
    pub async fn stop_auto_update(&self) {
        let task = lock(&self.auto_update).take();
        if let Some(task) = task {
            task.stop().await;
        }
    }

    pub fn is_auto_update_running(&self) -> bool {
        is_running(&self.auto_update)
    }

    /// Starts prefetch, and auto-update when persistence is attached.
    pub fn start_background_tasks(&self) {
        {
            let mut slot = lock(&self.prefetch);
            if slot.as_ref().is_none_or(|task| task.is_finished()) {
                *slot = Some(tasks::spawn_prefetch(Arc::clone(&self.resolver)));
            }
        }
        if self.persistence.is_some() {
            self.start_auto_update();
        }
        info!(
            prefetch = is_running(&self.prefetch),
            auto_update = self.is_auto_update_running(),
            "Background tasks started"
        );
    }

    /// Stops and joins every background task.
    pub async fn shutdown(&self) {
        let prefetch = lock(&self.prefetch).take();
        if let Some(task) = prefetch {
            task.stop().await;
        }
        self.stop_auto_update().await;
        info!("Currency service shut down");
    }
}

fn lock(slot: &Mutex<Option<BackgroundTask>>) -> MutexGuard<'_, Option<BackgroundTask>> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

fn is_running(slot: &Mutex<Option<BackgroundTask>>) -> bool {
    lock(slot).as_ref().is_some_and(|task| !task.is_finished())
}

//! Reclaims stock held by checkouts that were never paid.
//!
//! Per order, the guarded `pending -> expired` transition comes first and the
//! stock release happens only if that transition applied. If a payment
//! confirmation got there first, the transition is a no-op and the stock,
//! already consumed by the sale, is left alone.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, error, info};

use crate::lifecycle::Transition;
use crate::models::OrderStatus;
use crate::store::OrderStore;
use crate::utils::error::AppError;

/// Floor for the tick period; `tokio::time::interval` rejects zero.
const MIN_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy)]
pub struct SweeperConfig {
    pub interval: Duration,
    /// How long a pending order may hold stock.
    pub reservation_ttl: Duration,
    pub batch_size: i64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub candidates: usize,
    pub expired: usize,
    pub skipped: usize,
    pub errors: usize,
}

pub struct Sweeper {
    store: Arc<dyn OrderStore>,
    config: SweeperConfig,
}

impl Sweeper {
    pub fn new(store: Arc<dyn OrderStore>, config: SweeperConfig) -> Self {
        Self { store, config }
    }

    pub async fn sweep_once(&self, now: DateTime<Utc>) -> Result<SweepReport, AppError> {
        let ttl = chrono::Duration::from_std(self.config.reservation_ttl)
            .map_err(|e| AppError::InternalServerError(format!("Invalid reservation TTL: {}", e)))?;
        let cutoff = now - ttl;

        let candidates = self
            .store
            .stale_pending(cutoff, self.config.batch_size)
            .await?;
        let mut report = SweepReport {
            candidates: candidates.len(),
            ..SweepReport::default()
        };

        for order_id in candidates {
            match self.store.close_pending(order_id, OrderStatus::Expired).await {
                Ok(Transition::Applied) => {
                    info!(%order_id, "Expired abandoned order and released stock");
                    report.expired += 1;
                }
                Ok(Transition::AlreadyProcessed) => {
                    debug!(%order_id, "Order settled before it could expire");
                    report.skipped += 1;
                }
                Err(e) => {
                    // One bad order must not stall the rest of the batch.
                    error!(%order_id, error = %e, "Failed to expire order");
                    report.errors += 1;
                }
            }
        }

        Ok(report)
    }

    /// Sweeps every `interval` until `shutdown` flips to `true`.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.config.interval.max(MIN_INTERVAL));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        info!(
            interval_secs = self.config.interval.as_secs(),
            ttl_secs = self.config.reservation_ttl.as_secs(),
            "Reclamation sweeper started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.sweep_once(Utc::now()).await {
                        Ok(report) if report.candidates > 0 => {
                            info!(
                                expired = report.expired,
                                skipped = report.skipped,
                                errors = report.errors,
                                "Sweep finished"
                            );
                        }
                        Ok(_) => {}
                        Err(e) => error!(error = %e, "Sweep failed"),
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Reclamation sweeper stopped");
    }
}

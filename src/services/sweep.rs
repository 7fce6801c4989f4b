//! Periodic cleanup: stale pending orders and expired sessions.

use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::{task::JoinHandle, time};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{error::AppResult, services::order_service::OrderLedger, store::SessionStore};

#[derive(Debug, Clone, Default, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SweepReport {
    pub cancelled_orders: Vec<Uuid>,
    pub purged_sessions: u64,
}

#[derive(Clone)]
pub struct Sweeper {
    ledger: OrderLedger,
    sessions: Arc<dyn SessionStore>,
    pending_order_ttl: chrono::Duration,
}

impl Sweeper {
    pub fn new(
        ledger: OrderLedger,
        sessions: Arc<dyn SessionStore>,
        pending_order_ttl: chrono::Duration,
    ) -> Self {
        Self {
            ledger,
            sessions,
            pending_order_ttl,
        }
    }

    pub async fn run_once(&self, now: DateTime<Utc>) -> AppResult<SweepReport> {
        let cancelled_orders = self
            .ledger
            .cancel_stale_pending(self.pending_order_ttl, now)
            .await?;
        let purged_sessions = self.sessions.purge_expired().await?;

        if !cancelled_orders.is_empty() || purged_sessions > 0 {
            tracing::info!(
                cancelled = cancelled_orders.len(),
                purged_sessions,
                "sweep finished"
            );
        }
        Ok(SweepReport {
            cancelled_orders,
            purged_sessions,
        })
    }

    /// Runs the sweep every `every` until the task is aborted. Failures are
    /// logged and the next tick tries again.
    pub fn spawn(self, every: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = time::interval(every);
            interval.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
            tracing::info!(interval_secs = every.as_secs(), "sweep task started");

            loop {
                interval.tick().await;
                if let Err(err) = self.run_once(Utc::now()).await {
                    tracing::warn!(error = %err, "sweep failed");
                }
            }
        })
    }
}

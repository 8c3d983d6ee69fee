//! # Jobs
//!
//! Periodic expiry sweep over every tenant.
//!
//! For each tenant the sweep records expiring/expired transitions in one
//! transaction, then (after commit) notifies about them and asks the loaders
//! for a fresh copy of every expired document that is not uploaded by hand.

use crate::plugins::PluginsManager;
use crate::services::{self, LoadOutcome};
use chrono::NaiveDate;
use civic_core::document::expiration_sweep;
use civic_core::{Actor, DocumentStatus, MutationContext, TenantPool};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Totals of one sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub tenants: usize,
    pub expiring: usize,
    pub expired: usize,
    pub notified: usize,
    pub reloaded: usize,
    pub failed_tenants: usize,
}

/// Sweep every tenant once.
pub async fn run_sweep(pool: &TenantPool, plugins: &PluginsManager, today: NaiveDate, warn_days: i64) -> SweepReport {
    let mut report = SweepReport::default();
    let tenants = match pool.tenants() {
        Ok(tenants) => tenants,
        Err(err) => {
            tracing::error!(error = %err, "could not list tenants");
            return report;
        }
    };

    for tenant in tenants {
        report.tenants += 1;
        let db = match pool.database(&tenant.id) {
            Ok(db) => db,
            Err(err) => {
                tracing::error!(tenant = %tenant.id, error = %err, "could not open tenant database");
                report.failed_tenants += 1;
                continue;
            }
        };

        let ctx = MutationContext::new(Actor::System);
        let transitions = match db.write(|tx| expiration_sweep(tx, today, warn_days, &ctx)) {
            Ok(transitions) => transitions,
            Err(err) => {
                tracing::error!(tenant = %tenant.id, error = %err, "expiry sweep failed");
                report.failed_tenants += 1;
                continue;
            }
        };

        let mut notifications = Vec::with_capacity(transitions.len());
        for transition in &transitions {
            match transition.status {
                DocumentStatus::Expired => report.expired += 1,
                _ => report.expiring += 1,
            }
            match services::notification_for_transition(&db, &tenant, transition) {
                Ok(notification) => notifications.push(notification),
                Err(err) => tracing::warn!(tenant = %tenant.id, error = %err, "could not build notification"),
            }
        }
        report.notified += services::dispatch(plugins, &db, notifications).await;

        for transition in transitions
            .iter()
            .filter(|t| t.status == DocumentStatus::Expired && t.document.is_loadable())
        {
            match services::load_document(plugins, &tenant, &db, transition.document.id).await {
                Ok(LoadOutcome::Loaded { .. }) => report.reloaded += 1,
                Ok(_) => {}
                Err(err) => tracing::warn!(tenant = %tenant.id, document = %transition.document.id, error = %err, "reload failed"),
            }
        }
    }

    tracing::info!(
        tenants = report.tenants,
        expiring = report.expiring,
        expired = report.expired,
        notified = report.notified,
        reloaded = report.reloaded,
        "expiry sweep finished"
    );
    report
}

/// Run the sweep every `interval` until the task is aborted. The first run
/// happens after one full interval.
pub fn spawn_sweeper(
    pool: Arc<TenantPool>,
    plugins: Arc<PluginsManager>,
    interval: Duration,
    warn_days: i64,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let today = chrono::Utc::now().date_naive();
            run_sweep(&pool, &plugins, today, warn_days).await;
        }
    })
}


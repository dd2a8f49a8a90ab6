//! Drain side of the relay: downstream client, notifiers and the periodic
//! scheduler that delivers due jobs.

mod client;
mod config;
mod drain;
mod notify;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

pub use client::{Delivery, Downstream, HttpDownstream, classify};
pub use config::{ConfigError, WorkerConfig};
pub use drain::{DrainReport, Scheduler};
pub use notify::{LogNotifier, WebhookNotifier};

/// Run drain cycles every `poll_interval` until `shutdown` flips to true.
///
/// A cycle in flight when shutdown arrives is allowed to finish. Store errors
/// abort only the current cycle; the loop keeps going.
pub async fn run_worker(
    scheduler: Arc<Scheduler>,
    poll_interval: Duration,
    mut shutdown: watch::Receiver<bool>,
    mut on_report: impl FnMut(&DrainReport) + Send,
) {
    tracing::info!(
        poll_interval_ms = poll_interval.as_millis() as u64,
        "drain worker started"
    );

    let mut ticker = tokio::time::interval(poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            _ = ticker.tick() => match scheduler.tick().await {
                Ok(Some(report)) => {
                    if report.selected > 0 || report.downstream_down {
                        tracing::info!(?report, "drain cycle finished");
                    } else {
                        tracing::debug!("drain cycle found nothing due");
                    }
                    on_report(&report);
                }
                Ok(None) => tracing::debug!("previous drain cycle still running, tick skipped"),
                Err(e) => tracing::error!(error = %e, "drain cycle aborted by store error"),
            },
        }
    }

    tracing::info!("drain worker stopped");
}

//! Fixed-interval drivers for the periodic sweeps.
//!
//! Escalations and the SLA notification pass share the faster cadence; referee and
//! consent reminders run on their own, slower interval. Every sweep is safe to rerun,
//! so a missed tick is simply skipped.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};
use vetting::config::SchedulerConfig;

use crate::infra::ApiService;

pub(crate) struct SweepHandles {
    handles: Vec<JoinHandle<()>>,
}

impl SweepHandles {
    pub(crate) fn abort(self) {
        for handle in self.handles {
            handle.abort();
        }
    }
}

pub(crate) fn spawn(service: Arc<ApiService>, config: &SchedulerConfig) -> SweepHandles {
    info!(
        escalation_interval_secs = config.escalation_interval.as_secs(),
        reminder_interval_secs = config.reminder_interval.as_secs(),
        "sweep scheduler started"
    );

    let escalations = tokio::spawn(run_every(
        config.escalation_interval,
        Arc::clone(&service),
        |service| {
            if let Err(err) = service.process_escalations() {
                warn!(error = %err, "escalation sweep aborted");
            }
            if let Err(err) = service.process_sla_notifications() {
                warn!(error = %err, "SLA notification pass aborted");
            }
        },
    ));

    let reminders = tokio::spawn(run_every(config.reminder_interval, service, |service| {
        if let Err(err) = service.process_scheduled_reminders() {
            warn!(error = %err, "reminder sweep aborted");
        }
    }));

    SweepHandles {
        handles: vec![escalations, reminders],
    }
}

async fn run_every<F>(period: Duration, service: Arc<ApiService>, sweep: F)
where
    F: Fn(&ApiService) + Send + Sync + 'static,
{
    let sweep = Arc::new(sweep);
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // The first tick completes immediately; startup does not trigger a sweep.
    interval.tick().await;

    loop {
        interval.tick().await;
        // Sweeps make blocking repository calls; keep them off the async workers.
        let service = Arc::clone(&service);
        let sweep = Arc::clone(&sweep);
        if let Err(err) = tokio::task::spawn_blocking(move || sweep(&service)).await {
            warn!(error = %err, "sweep task failed");
        }
    }
}

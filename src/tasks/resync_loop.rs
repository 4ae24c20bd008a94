use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Days, Utc};
use tokio::time::sleep;
use tracing::{info, warn};

use crate::models::webhook::WebhookAction;
use crate::service::reconcile::{ReconcileOutcome, Reconciler};
use crate::service::scheduling::{SchedulerError, SchedulingClient};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ResyncReport {
    pub seen: usize,
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub skipped: usize,
    pub failed: usize,
}

pub async fn run_resync_loop(
    reconciler: Arc<Reconciler>,
    scheduler: Arc<dyn SchedulingClient>,
    interval: Duration,
    lookahead_days: u64,
) {
    loop {
        match resync_tick(&reconciler, scheduler.as_ref(), Utc::now(), lookahead_days).await {
            Ok(report) => info!(
                seen = report.seen,
                created = report.created,
                updated = report.updated,
                unchanged = report.unchanged,
                skipped = report.skipped,
                failed = report.failed,
                "resync finished"
            ),
            Err(err) => warn!(error = %err, "resync could not list appointments"),
        }
        sleep(interval).await;
    }
}

/// Reconciles every appointment from `now`'s date (in the field timezone)
/// through `lookahead_days` later. Only the listing call can fail the tick.
pub async fn resync_tick<S: SchedulingClient + ?Sized>(
    reconciler: &Reconciler,
    scheduler: &S,
    now: DateTime<Utc>,
    lookahead_days: u64,
) -> Result<ResyncReport, SchedulerError> {
    let today = now.with_timezone(&reconciler.timezone()).date_naive();
    let until = today
        .checked_add_days(Days::new(lookahead_days))
        .unwrap_or(today);
    let appointments = scheduler.list_appointments(today, until).await?;

    let no_fields = HashMap::new();
    let mut report = ResyncReport::default();
    for appointment in &appointments {
        report.seen += 1;
        match reconciler
            .reconcile_appointment(appointment, &WebhookAction::Changed, &no_fields)
            .await
        {
            Ok(ReconcileOutcome::Created(_)) => report.created += 1,
            Ok(ReconcileOutcome::Updated(_)) => report.updated += 1,
            Ok(ReconcileOutcome::Unchanged(_)) => report.unchanged += 1,
            Ok(ReconcileOutcome::Skipped(reason)) => {
                report.skipped += 1;
                info!(appointment_id = appointment.id, %reason, "resync skipped appointment");
            }
            Err(err) => {
                report.failed += 1;
                warn!(appointment_id = appointment.id, error = %err, "resync failed for appointment");
            }
        }
    }
    Ok(report)
}

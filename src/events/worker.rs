use std::sync::Arc;

use chrono::Utc;
use tokio::sync::mpsc;
use tracing::{error, info};

use crate::events::queue::Event;
use crate::service::reconcile::{ReconcileError, ReconcileOutcome, Reconciler};

/// Drains the bus until every sender is dropped.
pub async fn run_event_worker(mut rx: mpsc::Receiver<Event>, reconciler: Arc<Reconciler>) {
    while let Some(event) = rx.recv().await {
        let _ = handle_event(&reconciler, event).await;
    }
    info!("event worker stopped");
}

pub async fn handle_event(
    reconciler: &Reconciler,
    event: Event,
) -> Result<ReconcileOutcome, ReconcileError> {
    match event {
        Event::WebhookReceived {
            payload,
            received_at,
        } => {
            let lag_ms = (Utc::now() - received_at).num_milliseconds();
            let result = reconciler.reconcile_webhook(&payload).await;
            match &result {
                Ok(ReconcileOutcome::Skipped(reason)) => info!(
                    action = %payload.action,
                    appointment_id = ?payload.appointment_id,
                    %reason,
                    lag_ms,
                    "webhook skipped"
                ),
                Ok(outcome) => info!(
                    action = %payload.action,
                    appointment_id = ?payload.appointment_id,
                    session_id = outcome.session().map(|s| s.id.as_str()).unwrap_or_default(),
                    outcome = outcome.label(),
                    lag_ms,
                    "webhook reconciled"
                ),
                Err(err) => error!(
                    action = %payload.action,
                    appointment_id = ?payload.appointment_id,
                    error = %err,
                    "webhook reconciliation failed"
                ),
            }
            result
        }
    }
}

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tracing::warn;

use crate::models::webhook::WebhookPayload;

#[derive(Debug, Clone)]
pub enum Event {
    WebhookReceived {
        payload: WebhookPayload,
        received_at: DateTime<Utc>,
    },
}

#[derive(Clone)]
pub struct EventBus {
    tx: mpsc::Sender<Event>,
}

impl EventBus {
    pub fn new(buffer: usize) -> (Self, mpsc::Receiver<Event>) {
        let (tx, rx) = mpsc::channel(buffer);
        (Self { tx }, rx)
    }

    pub async fn emit(&self, event: Event) {
        if self.tx.send(event).await.is_err() {
            warn!("event worker stopped, dropping event");
        }
    }
}

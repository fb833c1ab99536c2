//! Fire-and-forget operator notifications. The channel consumes critical
//! task failures and must never block or fail the completion call that
//! raised them.

use async_trait::async_trait;
use serde::Serialize;
use tracing::warn;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
pub struct FailureEvent {
    pub message: String,
    pub task_id: Uuid,
    pub worker_id: Option<Uuid>,
}

#[async_trait]
pub trait Notify: Send + Sync {
    async fn send(&self, event: FailureEvent) -> anyhow::Result<()>;
}

/// Posts the event as JSON to a configured webhook.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            url,
        }
    }
}

#[async_trait]
impl Notify for WebhookNotifier {
    async fn send(&self, event: FailureEvent) -> anyhow::Result<()> {
        self.client
            .post(&self.url)
            .json(&event)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

/// Used when no webhook is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNotifier;

#[async_trait]
impl Notify for NoopNotifier {
    async fn send(&self, _event: FailureEvent) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Dispatch off the request path. Delivery failures are logged and dropped.
pub fn dispatch(notifier: std::sync::Arc<dyn Notify>, event: FailureEvent) {
    tokio::spawn(async move {
        let task_id = event.task_id;
        if let Err(e) = notifier.send(event).await {
            warn!("Failed to deliver failure notification for task {task_id}: {e}");
        }
    });
}

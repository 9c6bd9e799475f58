//! Notification clients for approval events

use async_trait::async_trait;
use reqwest::Client as HttpClient;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::config::NotificationConfig;
use crate::error::{Result, WorkflowError};
use crate::workflow::traits::{Notification, Notifier};

/// Posts each notification as JSON to a webhook
pub struct WebhookNotifier {
    url: String,
    http_client: HttpClient,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http_client = HttpClient::builder().timeout(timeout).build()?;

        Ok(Self {
            url: url.into(),
            http_client,
        })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, notification: &Notification) -> Result<()> {
        let response = self.http_client.post(&self.url).json(notification).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(WorkflowError::Notification(format!(
                "Webhook returned {}: {}",
                status, error_text
            )));
        }

        log::info!(
            "Webhook notification sent for approval {} to {} recipients",
            notification.instance_id,
            notification.recipients.len()
        );
        Ok(())
    }
}

/// Writes notifications to the log; used when no webhook is configured
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, notification: &Notification) -> Result<()> {
        let recipients: Vec<&str> = notification.recipients.iter().map(|r| r.as_str()).collect();
        log::info!(
            "Notify {:?} for approval {} ({}): {}",
            notification.event,
            notification.instance_id,
            notification.status,
            recipients.join(", ")
        );
        Ok(())
    }
}

/// Keeps every notification in memory, optionally failing each call
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
    fail: bool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().map(|sent| sent.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, notification: &Notification) -> Result<()> {
        if self.fail {
            return Err(WorkflowError::Notification("recording notifier set to fail".to_string()));
        }
        self.sent
            .lock()
            .map_err(|_| WorkflowError::Notification("recorder lock poisoned".to_string()))?
            .push(notification.clone());
        Ok(())
    }
}

/// Webhook notifier when a URL is configured, log notifier otherwise
pub fn notifier_from_config(config: &NotificationConfig) -> Result<Arc<dyn Notifier>> {
    match &config.webhook_url {
        Some(url) => {
            log::info!("Sending approval notifications to {}", url);
            Ok(Arc::new(WebhookNotifier::new(
                url.clone(),
                Duration::from_secs(config.timeout_secs),
            )?))
        }
        None => {
            log::info!("No notification webhook configured, notifications are logged only");
            Ok(Arc::new(LogNotifier))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::approval_types::{ActorId, ApprovalStatus, DefinitionId, InstanceId};
    use crate::workflow::traits::NotificationEvent;

    fn notification() -> Notification {
        Notification {
            event: NotificationEvent::ApprovalRequested,
            instance_id: InstanceId::new(),
            definition_id: DefinitionId::parse("expense").unwrap(),
            status: ApprovalStatus::Pending,
            step_index: Some(0),
            step_name: Some("manager".to_string()),
            recipients: vec![ActorId::new("maria")],
        }
    }

    #[tokio::test]
    async fn test_recording_notifier_keeps_order() {
        let notifier = RecordingNotifier::new();
        notifier.notify(&notification()).await.unwrap();
        notifier.notify(&notification()).await.unwrap();
        assert_eq!(notifier.sent().len(), 2);

        let failing = RecordingNotifier::failing();
        assert!(failing.notify(&notification()).await.is_err());
        assert!(failing.sent().is_empty());
    }

    #[tokio::test]
    async fn test_log_notifier_never_fails() {
        assert!(LogNotifier.notify(&notification()).await.is_ok());
    }

    #[test]
    fn test_notification_wire_shape() {
        let json = serde_json::to_value(notification()).unwrap();
        assert_eq!(json["event"], "approval_requested");
        assert_eq!(json["status"], "pending");
        assert_eq!(json["recipients"][0], "maria");
    }

    #[test]
    fn test_notifier_from_config_without_webhook() {
        assert!(notifier_from_config(&NotificationConfig::default()).is_ok());
    }
}

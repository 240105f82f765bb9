// src/services/messaging_service.rs
use async_trait::async_trait;
use dashmap::DashMap;
use futures::future::join_all;
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::{
    errors::{SparrowError as AppError, SparrowResult},
    models::messages::RideEvent,
};

/// Transport-level address of a connected user (device token, socket id).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelHandle(pub String);

/// Who is reachable and on which channel. Maintained by the transport layer
/// on connect and disconnect.
pub trait ChannelRegistry: Send + Sync {
    fn channel_of(&self, user_id: &str) -> Option<ChannelHandle>;
    fn connect(&self, user_id: &str, handle: ChannelHandle);
    fn disconnect(&self, user_id: &str);
}

#[derive(Debug, Default)]
pub struct InMemoryChannelRegistry {
    channels: DashMap<String, ChannelHandle>,
}

impl InMemoryChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ChannelRegistry for InMemoryChannelRegistry {
    fn channel_of(&self, user_id: &str) -> Option<ChannelHandle> {
        self.channels.get(user_id).map(|entry| entry.value().clone())
    }

    fn connect(&self, user_id: &str, handle: ChannelHandle) {
        self.channels.insert(user_id.to_string(), handle);
    }

    fn disconnect(&self, user_id: &str) {
        self.channels.remove(user_id);
    }
}

#[async_trait]
pub trait NotificationService: Send + Sync {
    /// Fire-and-forget delivery of one event to one user.
    async fn notify(&self, recipient_id: &str, event: &RideEvent) -> SparrowResult<()>;

    /// Best-effort fan-out. Individual failures are logged, not returned.
    async fn broadcast(&self, recipients: &[String], event: &RideEvent) {
        let sends = recipients.iter().map(|recipient| async move {
            if let Err(e) = self.notify(recipient, event).await {
                tracing::warn!("Broadcast of {} to {} failed: {}", event.name(), recipient, e);
            }
        });
        join_all(sends).await;
    }
}

/// Delivery that must never block a state transition.
pub async fn notify_quietly(service: &dyn NotificationService, recipient_id: &str, event: RideEvent) {
    if let Err(e) = service.notify(recipient_id, &event).await {
        tracing::warn!("Notification {} to {} failed: {}", event.name(), recipient_id, e);
    }
}

#[derive(Debug, Clone)]
pub struct PushConfig {
    pub gateway_url: String,
    pub api_key: Option<String>,
    /// Upper bound on one push; offers wait on delivery before their window opens.
    pub timeout: Duration,
}

/// Posts events to an HTTP push gateway, addressed by channel handle.
pub struct PushNotificationService {
    config: PushConfig,
    client: reqwest::Client,
    registry: Arc<dyn ChannelRegistry>,
}

impl PushNotificationService {
    pub fn new(config: PushConfig, registry: Arc<dyn ChannelRegistry>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            config,
            client,
            registry,
        }
    }
}

#[async_trait]
impl NotificationService for PushNotificationService {
    async fn notify(&self, recipient_id: &str, event: &RideEvent) -> SparrowResult<()> {
        let ChannelHandle(channel) = self
            .registry
            .channel_of(recipient_id)
            .ok_or_else(|| AppError::upstream(format!("no channel registered for {}", recipient_id)))?;

        tracing::debug!("Pushing {} to {} via {}", event.name(), recipient_id, channel);

        let body = json!({
            "to": channel,
            "event": event.name(),
            "payload": event,
            "priority": "high",
        });

        let mut request = self.client.post(&self.config.gateway_url).json(&body);
        if let Some(key) = &self.config.api_key {
            request = request.header("Authorization", format!("key={}", key));
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            tracing::error!("Push gateway rejected {}: {}", event.name(), error_text);
            return Err(AppError::upstream(error_text));
        }

        Ok(())
    }
}

/// Logs instead of sending and keeps a copy of everything for inspection.
#[derive(Debug, Default)]
pub struct MockNotificationService {
    sent: Mutex<Vec<(String, RideEvent)>>,
}

impl MockNotificationService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<(String, RideEvent)> {
        self.sent.lock().map(|sent| sent.clone()).unwrap_or_default()
    }

    pub fn sent_to(&self, recipient_id: &str) -> Vec<RideEvent> {
        self.sent()
            .into_iter()
            .filter(|(to, _)| to == recipient_id)
            .map(|(_, event)| event)
            .collect()
    }

    pub fn count_named(&self, name: &str) -> usize {
        self.sent().iter().filter(|(_, event)| event.name() == name).count()
    }
}

#[async_trait]
impl NotificationService for MockNotificationService {
    async fn notify(&self, recipient_id: &str, event: &RideEvent) -> SparrowResult<()> {
        tracing::info!("[MOCK] Would send {} to {} for ride {}", event.name(), recipient_id, event.ride_id());
        if let Ok(mut sent) = self.sent.lock() {
            sent.push((recipient_id.to_string(), event.clone()));
        }
        Ok(())
    }
}

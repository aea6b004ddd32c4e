//! Outbound real-time notifications
//!
//! Delivery is best-effort. Callers log failures and carry on; a client
//! that misses an event picks the change up on its next thread fetch.

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use super::MessageView;

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("Notification channel closed")]
    ChannelClosed,

    #[error("Failed to encode notification: {0}")]
    Encode(String),
}

/// Event pushed to a single recipient
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    #[serde(rename_all = "camelCase")]
    NewMessage {
        conversation_id: Uuid,
        message: MessageView,
    },
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, recipient: Uuid, notification: Notification) -> Result<(), NotifyError>;
}

//! Conversations, messages and their request DTOs

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::UserSummary;
use crate::trade::TradeSummary;

/// A two-party thread scoped to exactly one trade
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: Uuid,
    pub participants: Vec<Uuid>,
    pub trade_id: Uuid,
    pub last_message_id: Option<Uuid>,
    pub status: ConversationStatus,
    /// Unread message count per participant id
    pub unread_counts: HashMap<Uuid, i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    /// New pending conversation with zeroed counters for both parties.
    pub fn new(initiator: Uuid, recipient: Uuid, trade_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            participants: vec![initiator, recipient],
            trade_id,
            last_message_id: None,
            status: ConversationStatus::Pending,
            unread_counts: HashMap::from([(initiator, 0), (recipient, 0)]),
            created_at: now,
            updated_at: now,
        }
    }

    /// Order-independent key of the participant pair
    pub fn pair_key(first: Uuid, second: Uuid) -> (Uuid, Uuid) {
        if first <= second {
            (first, second)
        } else {
            (second, first)
        }
    }

    pub fn key(&self) -> (Uuid, Uuid, Uuid) {
        let (low, high) = match self.participants.as_slice() {
            [a, b, ..] => Self::pair_key(*a, *b),
            [a] => (*a, *a),
            [] => (Uuid::nil(), Uuid::nil()),
        };
        (low, high, self.trade_id)
    }

    pub fn is_participant(&self, user_id: Uuid) -> bool {
        self.participants.contains(&user_id)
    }

    pub fn others(&self, user_id: Uuid) -> impl Iterator<Item = Uuid> + '_ {
        self.participants.iter().copied().filter(move |p| *p != user_id)
    }

    pub fn unread_for(&self, user_id: Uuid) -> i64 {
        self.unread_counts.get(&user_id).copied().unwrap_or(0)
    }

    /// Records a message from `sender`: every other participant gains one
    /// unread message and the thread becomes active.
    pub fn record_message(&mut self, sender: Uuid, message_id: Uuid, at: DateTime<Utc>) {
        let others: Vec<Uuid> = self.others(sender).collect();
        for participant in others {
            *self.unread_counts.entry(participant).or_insert(0) += 1;
        }
        self.last_message_id = Some(message_id);
        self.status = ConversationStatus::Active;
        self.updated_at = at;
    }

    pub fn mark_read_by(&mut self, user_id: Uuid) {
        self.unread_counts.insert(user_id, 0);
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "conversation_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ConversationStatus {
    #[default]
    Pending,
    Active,
    Finished,
    Archived,
}

/// A single message inside a conversation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub content: String,
    #[serde(rename = "type")]
    pub message_type: MessageType,
    pub read_by: Vec<Uuid>,
    pub metadata: MessageMetadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Message {
    /// New message, already read by its sender.
    pub fn new(
        conversation_id: Uuid,
        sender_id: Uuid,
        content: String,
        message_type: MessageType,
        metadata: MessageMetadata,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            conversation_id,
            sender_id,
            content,
            message_type,
            read_by: vec![sender_id],
            metadata,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_read_by(&self, user_id: Uuid) -> bool {
        self.read_by.contains(&user_id)
    }

    /// Set insertion; returns whether anything changed.
    pub fn mark_read_by(&mut self, user_id: Uuid) -> bool {
        if self.sender_id == user_id || self.is_read_by(user_id) {
            return false;
        }
        self.read_by.push(user_id);
        true
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "message_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    #[default]
    Text,
    Image,
    TradeOffer,
    System,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct MessageMetadata {
    /// Trade proposed in exchange
    pub trade_offer: Option<Uuid>,
    pub image_url: Option<String>,
}

/// Body of `POST /api/messages`. Either `conversationId`, or both
/// `recipientId` and `tradeId`, must be given.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    pub conversation_id: Option<Uuid>,
    pub recipient_id: Option<Uuid>,
    pub trade_id: Option<Uuid>,
    #[serde(default)]
    pub content: String,
    #[serde(rename = "type", default)]
    pub message_type: MessageType,
    #[serde(default)]
    pub metadata: MessageMetadata,
}

/// Body of `POST /api/messages/conversations`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartConversationRequest {
    pub recipient_id: Uuid,
    pub trade_id: Uuid,
}

/// Conversation as presented to one of its participants
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConversationView {
    pub id: Uuid,
    /// Everyone but the viewer
    pub participants: Vec<UserSummary>,
    pub trade: Option<TradeSummary>,
    pub last_message: Option<Message>,
    pub status: ConversationStatus,
    /// The viewer's own unread count
    pub unread_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Message with its sender's public profile; `sender` is null once the
/// sending account is gone.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MessageView {
    #[serde(flatten)]
    pub message: Message,
    pub sender: Option<UserSummary>,
}

/// Result of fetching a thread
#[derive(Debug, Clone, Serialize)]
pub struct Thread {
    pub conversation: ConversationView,
    pub messages: Vec<MessageView>,
}

/// Result of sending a message
#[derive(Debug, Clone, Serialize)]
pub struct SentMessage {
    pub message: MessageView,
    pub conversation: ConversationView,
}

#[derive(Debug, Serialize)]
pub struct ConversationsPayload {
    pub conversations: Vec<ConversationView>,
}

#[derive(Debug, Serialize)]
pub struct ConversationPayload {
    pub conversation: ConversationView,
}

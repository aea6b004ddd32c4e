//! Messaging service - conversation lifecycle, unread tracking and
//! notification fan-out

use std::collections::HashMap;
use std::sync::Arc;

use uuid::Uuid;

use super::model::*;
use super::notify::{Notification, Notifier};
use crate::error::{ApiError, ApiResult};
use crate::models::{User, UserSummary};
use crate::store::{Repository, StoreError};

pub struct MessagingService {
    store: Arc<dyn Repository>,
    notifier: Arc<dyn Notifier>,
    max_message_length: usize,
}

impl MessagingService {
    pub fn new(
        store: Arc<dyn Repository>,
        notifier: Arc<dyn Notifier>,
        max_message_length: usize,
    ) -> Self {
        Self {
            store,
            notifier,
            max_message_length,
        }
    }

    /// Returns the conversation between `initiator` and `recipient` about
    /// `trade_id`, creating a pending one when none exists yet.
    pub async fn start_or_reuse(
        &self,
        initiator: &User,
        recipient_id: Uuid,
        trade_id: Uuid,
    ) -> ApiResult<Conversation> {
        if initiator.id == recipient_id {
            return Err(ApiError::BadRequest(
                "Cannot start a conversation with yourself".to_string(),
            ));
        }
        if self.store.find_user(recipient_id).await?.is_none() {
            return Err(ApiError::NotFound("Recipient not found".to_string()));
        }
        if self.store.find_trade(trade_id).await?.is_none() {
            return Err(ApiError::NotFound("Trade not found".to_string()));
        }

        if let Some(existing) = self
            .store
            .find_conversation_between(initiator.id, recipient_id, trade_id)
            .await?
        {
            return Ok(existing);
        }

        let conversation = Conversation::new(initiator.id, recipient_id, trade_id);
        match self.store.insert_conversation(conversation).await {
            Ok(created) => {
                tracing::info!(
                    conversation_id = %created.id,
                    trade_id = %trade_id,
                    "Conversation started"
                );
                Ok(created)
            }
            // Lost a race against a concurrent start for the same triple.
            Err(StoreError::Conflict(_)) => self
                .store
                .find_conversation_between(initiator.id, recipient_id, trade_id)
                .await?
                .ok_or_else(|| ApiError::Internal("Conversation vanished after conflict".into())),
            Err(e) => Err(e.into()),
        }
    }

    /// `start_or_reuse` presented to the initiator
    pub async fn start(
        &self,
        initiator: &User,
        request: StartConversationRequest,
    ) -> ApiResult<ConversationView> {
        let conversation = self
            .start_or_reuse(initiator, request.recipient_id, request.trade_id)
            .await?;
        self.view(&conversation, initiator.id).await
    }

    pub async fn send(&self, sender: &User, request: SendMessageRequest) -> ApiResult<SentMessage> {
        let content = request.content.trim();
        if content.is_empty() {
            return Err(ApiError::invalid_field("content", "Message content is required"));
        }
        if content.chars().count() > self.max_message_length {
            return Err(ApiError::invalid_field(
                "content",
                format!(
                    "Message cannot exceed {} characters",
                    self.max_message_length
                ),
            ));
        }

        let mut conversation = match (request.conversation_id, request.recipient_id, request.trade_id)
        {
            (Some(conversation_id), _, _) => {
                let conversation = self.find_conversation(conversation_id).await?;
                if !conversation.is_participant(sender.id) {
                    return Err(ApiError::Forbidden(
                        "Not a participant in this conversation".to_string(),
                    ));
                }
                conversation
            }
            (None, Some(recipient_id), Some(trade_id)) => {
                self.start_or_reuse(sender, recipient_id, trade_id).await?
            }
            _ => {
                return Err(ApiError::BadRequest(
                    "conversationId, or recipientId and tradeId, are required".to_string(),
                ))
            }
        };

        if let Some(offered) = request.metadata.trade_offer {
            if self.store.find_trade(offered).await?.is_none() {
                return Err(ApiError::NotFound("Offered trade not found".to_string()));
            }
        }

        let message = Message::new(
            conversation.id,
            sender.id,
            content.to_string(),
            request.message_type,
            request.metadata,
        );
        let message = self.store.insert_message(message).await?;

        conversation.record_message(sender.id, message.id, message.created_at);
        self.store.save_conversation(&conversation).await?;

        tracing::info!(
            conversation_id = %conversation.id,
            message_id = %message.id,
            sender_id = %sender.id,
            "Message sent"
        );

        let message = MessageView {
            message,
            sender: Some(sender.summary()),
        };
        for recipient in conversation.others(sender.id) {
            let notification = Notification::NewMessage {
                conversation_id: conversation.id,
                message: message.clone(),
            };
            if let Err(e) = self.notifier.notify(recipient, notification).await {
                tracing::warn!(
                    recipient_id = %recipient,
                    conversation_id = %conversation.id,
                    error = %e,
                    "Failed to deliver message notification"
                );
            }
        }

        let view = self.view(&conversation, sender.id).await?;
        Ok(SentMessage {
            message,
            conversation: view,
        })
    }

    /// Messages oldest first. Everything not sent by the caller is marked
    /// read and the caller's unread counter is reset before listing.
    pub async fn fetch_thread(&self, user: &User, conversation_id: Uuid) -> ApiResult<Thread> {
        let mut conversation = self.find_conversation(conversation_id).await?;
        if !conversation.is_participant(user.id) {
            return Err(ApiError::Forbidden(
                "Not authorized to view this conversation".to_string(),
            ));
        }

        let marked = self
            .store
            .mark_messages_read(conversation_id, user.id)
            .await?;
        if conversation.unread_for(user.id) != 0 {
            conversation.mark_read_by(user.id);
            self.store.save_conversation(&conversation).await?;
        }
        tracing::debug!(conversation_id = %conversation_id, marked, "Thread read");

        let messages = self.store.list_messages(conversation_id).await?;
        let mut sender_ids: Vec<Uuid> = messages.iter().map(|m| m.sender_id).collect();
        sender_ids.sort();
        sender_ids.dedup();
        let senders: HashMap<Uuid, UserSummary> = self
            .store
            .find_users(&sender_ids)
            .await?
            .iter()
            .map(|u| (u.id, u.summary()))
            .collect();
        let messages = messages
            .into_iter()
            .map(|message| MessageView {
                sender: senders.get(&message.sender_id).cloned(),
                message,
            })
            .collect();

        let view = self.view(&conversation, user.id).await?;
        Ok(Thread {
            conversation: view,
            messages,
        })
    }

    /// Most recently updated first
    pub async fn list_conversations(&self, user: &User) -> ApiResult<Vec<ConversationView>> {
        let conversations = self.store.list_conversations_for(user.id).await?;

        let mut other_ids: Vec<Uuid> = conversations
            .iter()
            .flat_map(|c| c.others(user.id))
            .collect();
        other_ids.sort();
        other_ids.dedup();
        let people: HashMap<Uuid, User> = self
            .store
            .find_users(&other_ids)
            .await?
            .into_iter()
            .map(|u| (u.id, u))
            .collect();

        let mut views = Vec::with_capacity(conversations.len());
        for conversation in &conversations {
            views.push(self.view_with(conversation, user.id, &people).await?);
        }
        Ok(views)
    }

    pub async fn delete_message(&self, user: &User, message_id: Uuid) -> ApiResult<()> {
        let message = self
            .store
            .find_message(message_id)
            .await?
            .ok_or_else(|| ApiError::NotFound("Message not found".to_string()))?;

        if message.sender_id != user.id {
            return Err(ApiError::Forbidden(
                "Not authorized to delete this message".to_string(),
            ));
        }

        if !self.store.delete_message(message_id).await? {
            return Err(ApiError::NotFound("Message not found".to_string()));
        }
        tracing::info!(message_id = %message_id, "Message deleted");
        Ok(())
    }

    async fn find_conversation(&self, id: Uuid) -> ApiResult<Conversation> {
        self.store
            .find_conversation(id)
            .await?
            .ok_or_else(|| ApiError::NotFound("Conversation not found".to_string()))
    }

    async fn view(&self, conversation: &Conversation, viewer: Uuid) -> ApiResult<ConversationView> {
        let ids: Vec<Uuid> = conversation.others(viewer).collect();
        let people = self
            .store
            .find_users(&ids)
            .await?
            .into_iter()
            .map(|u| (u.id, u))
            .collect();
        self.view_with(conversation, viewer, &people).await
    }

    async fn view_with(
        &self,
        conversation: &Conversation,
        viewer: Uuid,
        people: &HashMap<Uuid, User>,
    ) -> ApiResult<ConversationView> {
        let participants = conversation
            .others(viewer)
            .filter_map(|id| people.get(&id).map(User::summary))
            .collect();

        let trade = self
            .store
            .find_trade(conversation.trade_id)
            .await?
            .map(|t| t.summary());

        let last_message = match conversation.last_message_id {
            Some(id) => self.store.find_message(id).await?,
            None => None,
        };

        Ok(ConversationView {
            id: conversation.id,
            participants,
            trade,
            last_message,
            status: conversation.status,
            unread_count: conversation.unread_for(viewer),
            created_at: conversation.created_at,
            updated_at: conversation.updated_at,
        })
    }
}

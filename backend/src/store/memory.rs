//! In-process store backed by `RwLock<HashMap>` tables

use std::cmp::Ordering;
use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    ConversationStore, MessageStore, Repository, StoreError, StoreResult, TradeStore, UserStore,
};
use crate::messaging::{Conversation, Message};
use crate::models::{Page, User};
use crate::trade::geo::haversine_meters;
use crate::trade::{Trade, TradeFilter, TradeSearch};

/// Volatile store used by tests and when no database is configured
#[derive(Default)]
pub struct MemoryStore {
    users: RwLock<HashMap<Uuid, User>>,
    trades: RwLock<HashMap<Uuid, Trade>>,
    conversations: RwLock<HashMap<Uuid, Conversation>>,
    messages: RwLock<HashMap<Uuid, Message>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn newest_first(a: &Trade, b: &Trade) -> Ordering {
    b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id))
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn insert_user(&self, user: User) -> StoreResult<User> {
        let mut users = self.users.write().await;
        if users.values().any(|u| u.subject == user.subject) {
            return Err(StoreError::Conflict("user".to_string()));
        }
        users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn find_user(&self, id: Uuid) -> StoreResult<Option<User>> {
        Ok(self.users.read().await.get(&id).cloned())
    }

    async fn find_user_by_subject(&self, subject: &str) -> StoreResult<Option<User>> {
        let users = self.users.read().await;
        Ok(users.values().find(|u| u.subject == subject).cloned())
    }

    async fn find_users(&self, ids: &[Uuid]) -> StoreResult<Vec<User>> {
        let users = self.users.read().await;
        Ok(ids.iter().filter_map(|id| users.get(id).cloned()).collect())
    }

    async fn save_user(&self, user: &User) -> StoreResult<()> {
        self.users.write().await.insert(user.id, user.clone());
        Ok(())
    }
}

#[async_trait]
impl TradeStore for MemoryStore {
    async fn insert_trade(&self, trade: Trade) -> StoreResult<Trade> {
        self.trades.write().await.insert(trade.id, trade.clone());
        Ok(trade)
    }

    async fn find_trade(&self, id: Uuid) -> StoreResult<Option<Trade>> {
        Ok(self.trades.read().await.get(&id).cloned())
    }

    async fn save_trade(&self, trade: &Trade) -> StoreResult<()> {
        let mut trades = self.trades.write().await;
        let views = trades.get(&trade.id).map_or(trade.views, |stored| stored.views);
        trades.insert(
            trade.id,
            Trade {
                views,
                ..trade.clone()
            },
        );
        Ok(())
    }

    async fn delete_trade(&self, id: Uuid) -> StoreResult<bool> {
        Ok(self.trades.write().await.remove(&id).is_some())
    }

    async fn increment_views(&self, id: Uuid) -> StoreResult<()> {
        if let Some(trade) = self.trades.write().await.get_mut(&id) {
            trade.views += 1;
        }
        Ok(())
    }

    async fn list_trades(
        &self,
        filter: &TradeFilter,
        page: Page,
    ) -> StoreResult<(Vec<Trade>, i64)> {
        let trades = self.trades.read().await;
        let mut matching: Vec<&Trade> = trades.values().filter(|t| filter.matches(t)).collect();
        matching.sort_by(|a, b| newest_first(a, b));

        let total = matching.len() as i64;
        let items = matching
            .into_iter()
            .skip(page.offset() as usize)
            .take(page.limit as usize)
            .cloned()
            .collect();
        Ok((items, total))
    }

    async fn search_trades(&self, search: &TradeSearch) -> StoreResult<Vec<Trade>> {
        let needle = search.text.as_ref().map(|t| t.to_lowercase());
        let trades = self.trades.read().await;

        let mut hits: Vec<(Option<f64>, &Trade)> = trades
            .values()
            .filter(|t| search.status.map_or(true, |s| t.status == s))
            .filter(|t| search.category.map_or(true, |c| t.category == c))
            .filter(|t| {
                needle.as_ref().map_or(true, |n| {
                    t.title.to_lowercase().contains(n) || t.description.to_lowercase().contains(n)
                })
            })
            .filter_map(|t| match search.near {
                None => Some((None, t)),
                Some(geo) => {
                    let (lat, lng) = (t.location.latitude()?, t.location.longitude()?);
                    let distance = haversine_meters(geo.latitude, geo.longitude, lat, lng);
                    (distance <= geo.radius_meters).then_some((Some(distance), t))
                }
            })
            .collect();

        hits.sort_by(|(da, a), (db, b)| match (da, db) {
            (Some(x), Some(y)) => x.partial_cmp(y).unwrap_or(Ordering::Equal),
            _ => newest_first(a, b),
        });

        Ok(hits
            .into_iter()
            .take(search.limit as usize)
            .map(|(_, t)| t.clone())
            .collect())
    }
}

#[async_trait]
impl ConversationStore for MemoryStore {
    async fn insert_conversation(&self, conversation: Conversation) -> StoreResult<Conversation> {
        let mut conversations = self.conversations.write().await;
        let key = conversation.key();
        if conversations.values().any(|c| c.key() == key) {
            return Err(StoreError::Conflict("conversation".to_string()));
        }
        conversations.insert(conversation.id, conversation.clone());
        Ok(conversation)
    }

    async fn find_conversation(&self, id: Uuid) -> StoreResult<Option<Conversation>> {
        Ok(self.conversations.read().await.get(&id).cloned())
    }

    async fn find_conversation_between(
        &self,
        first: Uuid,
        second: Uuid,
        trade_id: Uuid,
    ) -> StoreResult<Option<Conversation>> {
        let (low, high) = Conversation::pair_key(first, second);
        let conversations = self.conversations.read().await;
        Ok(conversations
            .values()
            .find(|c| c.key() == (low, high, trade_id))
            .cloned())
    }

    async fn save_conversation(&self, conversation: &Conversation) -> StoreResult<()> {
        self.conversations
            .write()
            .await
            .insert(conversation.id, conversation.clone());
        Ok(())
    }

    async fn list_conversations_for(&self, user_id: Uuid) -> StoreResult<Vec<Conversation>> {
        let conversations = self.conversations.read().await;
        let mut mine: Vec<Conversation> = conversations
            .values()
            .filter(|c| c.is_participant(user_id))
            .cloned()
            .collect();
        mine.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(mine)
    }
}

#[async_trait]
impl MessageStore for MemoryStore {
    async fn insert_message(&self, message: Message) -> StoreResult<Message> {
        self.messages.write().await.insert(message.id, message.clone());
        Ok(message)
    }

    async fn find_message(&self, id: Uuid) -> StoreResult<Option<Message>> {
        Ok(self.messages.read().await.get(&id).cloned())
    }

    async fn list_messages(&self, conversation_id: Uuid) -> StoreResult<Vec<Message>> {
        let messages = self.messages.read().await;
        let mut thread: Vec<Message> = messages
            .values()
            .filter(|m| m.conversation_id == conversation_id)
            .cloned()
            .collect();
        thread.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(thread)
    }

    async fn mark_messages_read(&self, conversation_id: Uuid, reader: Uuid) -> StoreResult<u64> {
        let mut messages = self.messages.write().await;
        let changed = messages
            .values_mut()
            .filter(|m| m.conversation_id == conversation_id)
            .map(|m| m.mark_read_by(reader))
            .filter(|changed| *changed)
            .count();
        Ok(changed as u64)
    }

    async fn delete_message(&self, id: Uuid) -> StoreResult<bool> {
        Ok(self.messages.write().await.remove(&id).is_some())
    }
}

#[async_trait]
impl Repository for MemoryStore {
    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }
}

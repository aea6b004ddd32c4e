//! Postgres store
//!
//! Nested documents (address, valuation, location, ...) live in `jsonb`
//! columns; anything filtered on has its own typed column.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, Postgres};
use sqlx::types::Json;
use sqlx::{FromRow, QueryBuilder};
use uuid::Uuid;

use super::{
    ConversationStore, MessageStore, Repository, StoreResult, TradeStore, UserStore,
};
use crate::messaging::{Conversation, ConversationStatus, Message, MessageMetadata, MessageType};
use crate::models::{Address, Page, Rating, User, UserRole, Verification};
use crate::trade::geo::EARTH_RADIUS_METERS;
use crate::trade::{
    Category, Condition, Location, Preferences, Trade, TradeFilter, TradeImage, TradeSearch,
    TradeStatus, TradeType, Valuation,
};

/// Store backed by a Postgres connection pool
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

// ============================================================================
// Row mappings
// ============================================================================

#[derive(FromRow)]
struct UserRow {
    id: Uuid,
    subject: String,
    email: Option<String>,
    phone: Option<String>,
    name: Option<String>,
    address: Json<Address>,
    interests: Vec<String>,
    offerings: Vec<String>,
    is_verified: bool,
    verification: Json<Verification>,
    trade_points: i64,
    rating_average: f64,
    rating_count: i64,
    role: UserRole,
    profile_image: Option<String>,
    is_active: bool,
    last_login: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id,
            subject: row.subject,
            email: row.email,
            phone: row.phone,
            name: row.name,
            address: row.address.0,
            interests: row.interests,
            offerings: row.offerings,
            is_verified: row.is_verified,
            verification: row.verification.0,
            trade_points: row.trade_points,
            rating: Rating {
                average: row.rating_average,
                count: row.rating_count,
            },
            role: row.role,
            profile_image: row.profile_image,
            is_active: row.is_active,
            last_login: row.last_login,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(FromRow)]
struct TradeRow {
    id: Uuid,
    owner_id: Uuid,
    title: String,
    description: String,
    category: Category,
    subcategory: Option<String>,
    images: Json<Vec<TradeImage>>,
    condition: Condition,
    trade_type: TradeType,
    valuation: Json<Valuation>,
    trade_points: i64,
    location: Json<Location>,
    preferences: Json<Preferences>,
    status: TradeStatus,
    views: i64,
    likes: i64,
    liked_by: Vec<Uuid>,
    in_wishlist: Vec<Uuid>,
    expires_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<TradeRow> for Trade {
    fn from(row: TradeRow) -> Self {
        Self {
            id: row.id,
            owner_id: row.owner_id,
            title: row.title,
            description: row.description,
            category: row.category,
            subcategory: row.subcategory,
            images: row.images.0,
            condition: row.condition,
            trade_type: row.trade_type,
            valuation: row.valuation.0,
            trade_points: row.trade_points,
            location: row.location.0,
            preferences: row.preferences.0,
            status: row.status,
            views: row.views,
            likes: row.likes,
            liked_by: row.liked_by,
            in_wishlist: row.in_wishlist,
            expires_at: row.expires_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(FromRow)]
struct ConversationRow {
    id: Uuid,
    participants: Vec<Uuid>,
    trade_id: Uuid,
    last_message_id: Option<Uuid>,
    status: ConversationStatus,
    unread_counts: Json<HashMap<Uuid, i64>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ConversationRow> for Conversation {
    fn from(row: ConversationRow) -> Self {
        Self {
            id: row.id,
            participants: row.participants,
            trade_id: row.trade_id,
            last_message_id: row.last_message_id,
            status: row.status,
            unread_counts: row.unread_counts.0,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(FromRow)]
struct MessageRow {
    id: Uuid,
    conversation_id: Uuid,
    sender_id: Uuid,
    content: String,
    message_type: MessageType,
    read_by: Vec<Uuid>,
    metadata: Json<MessageMetadata>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<MessageRow> for Message {
    fn from(row: MessageRow) -> Self {
        Self {
            id: row.id,
            conversation_id: row.conversation_id,
            sender_id: row.sender_id,
            content: row.content,
            message_type: row.message_type,
            read_by: row.read_by,
            metadata: row.metadata.0,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

// ============================================================================
// Users
// ============================================================================

#[async_trait]
impl UserStore for PgStore {
    async fn insert_user(&self, user: User) -> StoreResult<User> {
        sqlx::query(
            r#"
            INSERT INTO users (
                id, subject, email, phone, name, address, interests, offerings,
                is_verified, verification, trade_points, rating_average, rating_count,
                role, profile_image, is_active, last_login, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19)
            "#,
        )
        .bind(user.id)
        .bind(&user.subject)
        .bind(&user.email)
        .bind(&user.phone)
        .bind(&user.name)
        .bind(Json(&user.address))
        .bind(&user.interests)
        .bind(&user.offerings)
        .bind(user.is_verified)
        .bind(Json(&user.verification))
        .bind(user.trade_points)
        .bind(user.rating.average)
        .bind(user.rating.count)
        .bind(user.role)
        .bind(&user.profile_image)
        .bind(user.is_active)
        .bind(user.last_login)
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(user)
    }

    async fn find_user(&self, id: Uuid) -> StoreResult<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(User::from))
    }

    async fn find_user_by_subject(&self, subject: &str) -> StoreResult<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE subject = $1")
            .bind(subject)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(User::from))
    }

    async fn find_users(&self, ids: &[Uuid]) -> StoreResult<Vec<User>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE id = ANY($1)")
            .bind(ids)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(User::from).collect())
    }

    async fn save_user(&self, user: &User) -> StoreResult<()> {
        sqlx::query(
            r#"
            UPDATE users SET
                email = $2, phone = $3, name = $4, address = $5, interests = $6,
                offerings = $7, is_verified = $8, verification = $9, trade_points = $10,
                rating_average = $11, rating_count = $12, role = $13, profile_image = $14,
                is_active = $15, last_login = $16, updated_at = $17
            WHERE id = $1
            "#,
        )
        .bind(user.id)
        .bind(&user.email)
        .bind(&user.phone)
        .bind(&user.name)
        .bind(Json(&user.address))
        .bind(&user.interests)
        .bind(&user.offerings)
        .bind(user.is_verified)
        .bind(Json(&user.verification))
        .bind(user.trade_points)
        .bind(user.rating.average)
        .bind(user.rating.count)
        .bind(user.role)
        .bind(&user.profile_image)
        .bind(user.is_active)
        .bind(user.last_login)
        .bind(user.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

// ============================================================================
// Trades
// ============================================================================

fn push_trade_filter(qb: &mut QueryBuilder<'_, Postgres>, filter: &TradeFilter) {
    if let Some(status) = filter.status {
        qb.push(" AND status = ").push_bind(status);
    }
    if let Some(category) = filter.category {
        qb.push(" AND category = ").push_bind(category);
    }
    if let Some(categories) = &filter.categories {
        let labels: Vec<String> = categories.iter().map(|c| c.as_str().to_string()).collect();
        qb.push(" AND category::text = ANY(").push_bind(labels).push(")");
    }
    if let Some(condition) = filter.condition {
        qb.push(" AND condition = ").push_bind(condition);
    }
    if let Some(min) = filter.min_points {
        qb.push(" AND trade_points >= ").push_bind(min);
    }
    if let Some(max) = filter.max_points {
        qb.push(" AND trade_points <= ").push_bind(max);
    }
    if let Some(owner_id) = filter.owner_id {
        qb.push(" AND owner_id = ").push_bind(owner_id);
    }
    if let Some(owner_id) = filter.exclude_owner_id {
        qb.push(" AND owner_id <> ").push_bind(owner_id);
    }
    if let Some(user_id) = filter.wishlisted_by {
        qb.push(" AND ").push_bind(user_id).push(" = ANY(in_wishlist)");
    }
}

#[async_trait]
impl TradeStore for PgStore {
    async fn insert_trade(&self, trade: Trade) -> StoreResult<Trade> {
        sqlx::query(
            r#"
            INSERT INTO trades (
                id, owner_id, title, description, category, subcategory, images, condition,
                trade_type, valuation, trade_points, location, preferences, status, views,
                likes, liked_by, in_wishlist, expires_at, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20, $21)
            "#,
        )
        .bind(trade.id)
        .bind(trade.owner_id)
        .bind(&trade.title)
        .bind(&trade.description)
        .bind(trade.category)
        .bind(&trade.subcategory)
        .bind(Json(&trade.images))
        .bind(trade.condition)
        .bind(trade.trade_type)
        .bind(Json(&trade.valuation))
        .bind(trade.trade_points)
        .bind(Json(&trade.location))
        .bind(Json(&trade.preferences))
        .bind(trade.status)
        .bind(trade.views)
        .bind(trade.likes)
        .bind(&trade.liked_by)
        .bind(&trade.in_wishlist)
        .bind(trade.expires_at)
        .bind(trade.created_at)
        .bind(trade.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(trade)
    }

    async fn find_trade(&self, id: Uuid) -> StoreResult<Option<Trade>> {
        let row = sqlx::query_as::<_, TradeRow>("SELECT * FROM trades WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Trade::from))
    }

    async fn save_trade(&self, trade: &Trade) -> StoreResult<()> {
        sqlx::query(
            r#"
            UPDATE trades SET
                title = $2, description = $3, category = $4, subcategory = $5, images = $6,
                condition = $7, trade_type = $8, valuation = $9, trade_points = $10,
                location = $11, preferences = $12, status = $13, likes = $14,
                liked_by = $15, in_wishlist = $16, expires_at = $17, updated_at = $18
            WHERE id = $1
            "#,
        )
        .bind(trade.id)
        .bind(&trade.title)
        .bind(&trade.description)
        .bind(trade.category)
        .bind(&trade.subcategory)
        .bind(Json(&trade.images))
        .bind(trade.condition)
        .bind(trade.trade_type)
        .bind(Json(&trade.valuation))
        .bind(trade.trade_points)
        .bind(Json(&trade.location))
        .bind(Json(&trade.preferences))
        .bind(trade.status)
        .bind(trade.likes)
        .bind(&trade.liked_by)
        .bind(&trade.in_wishlist)
        .bind(trade.expires_at)
        .bind(trade.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete_trade(&self, id: Uuid) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM trades WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn increment_views(&self, id: Uuid) -> StoreResult<()> {
        sqlx::query("UPDATE trades SET views = views + 1 WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list_trades(
        &self,
        filter: &TradeFilter,
        page: Page,
    ) -> StoreResult<(Vec<Trade>, i64)> {
        let mut count_builder = QueryBuilder::new("SELECT COUNT(*) FROM trades WHERE 1=1");
        push_trade_filter(&mut count_builder, filter);
        let total: i64 = count_builder
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await?;

        let mut query_builder = QueryBuilder::new("SELECT * FROM trades WHERE 1=1");
        push_trade_filter(&mut query_builder, filter);
        query_builder.push(" ORDER BY created_at DESC, id LIMIT ");
        query_builder.push_bind(page.limit as i64);
        query_builder.push(" OFFSET ");
        query_builder.push_bind(page.offset() as i64);

        let rows = query_builder
            .build_query_as::<TradeRow>()
            .fetch_all(&self.pool)
            .await?;

        Ok((rows.into_iter().map(Trade::from).collect(), total))
    }

    async fn search_trades(&self, search: &TradeSearch) -> StoreResult<Vec<Trade>> {
        let mut qb: QueryBuilder<'_, Postgres> = QueryBuilder::new("SELECT * FROM (SELECT trades.*, ");

        match search.near {
            Some(geo) => {
                qb.push("(2 * ")
                    .push_bind(EARTH_RADIUS_METERS)
                    .push(" * asin(least(1, sqrt(power(sin(radians(latitude - ")
                    .push_bind(geo.latitude)
                    .push(") / 2), 2) + cos(radians(")
                    .push_bind(geo.latitude)
                    .push(")) * cos(radians(latitude)) * power(sin(radians(longitude - ")
                    .push_bind(geo.longitude)
                    .push(") / 2), 2))))) AS distance FROM trades WHERE latitude IS NOT NULL");
            }
            None => {
                qb.push("NULL::double precision AS distance FROM trades WHERE 1=1");
            }
        }

        if let Some(status) = search.status {
            qb.push(" AND status = ").push_bind(status);
        }
        if let Some(category) = search.category {
            qb.push(" AND category = ").push_bind(category);
        }
        if let Some(text) = &search.text {
            let pattern = format!("%{}%", escape_like(text));
            qb.push(" AND (title ILIKE ")
                .push_bind(pattern.clone())
                .push(" OR description ILIKE ")
                .push_bind(pattern)
                .push(")");
        }

        qb.push(") AS matches");
        match search.near {
            Some(geo) => {
                qb.push(" WHERE distance <= ")
                    .push_bind(geo.radius_meters)
                    .push(" ORDER BY distance ASC");
            }
            None => {
                qb.push(" ORDER BY created_at DESC");
            }
        }
        qb.push(" LIMIT ").push_bind(search.limit as i64);

        let rows = qb.build_query_as::<TradeRow>().fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(Trade::from).collect())
    }
}

/// Escapes `%`, `_` and `\` so user text matches literally.
fn escape_like(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

// ============================================================================
// Conversations
// ============================================================================

#[async_trait]
impl ConversationStore for PgStore {
    async fn insert_conversation(&self, conversation: Conversation) -> StoreResult<Conversation> {
        let (low, high, trade_id) = conversation.key();
        sqlx::query(
            r#"
            INSERT INTO conversations (
                id, participants, participant_low, participant_high, trade_id,
                last_message_id, status, unread_counts, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(conversation.id)
        .bind(&conversation.participants)
        .bind(low)
        .bind(high)
        .bind(trade_id)
        .bind(conversation.last_message_id)
        .bind(conversation.status)
        .bind(Json(&conversation.unread_counts))
        .bind(conversation.created_at)
        .bind(conversation.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(conversation)
    }

    async fn find_conversation(&self, id: Uuid) -> StoreResult<Option<Conversation>> {
        let row = sqlx::query_as::<_, ConversationRow>("SELECT * FROM conversations WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Conversation::from))
    }

    async fn find_conversation_between(
        &self,
        first: Uuid,
        second: Uuid,
        trade_id: Uuid,
    ) -> StoreResult<Option<Conversation>> {
        let (low, high) = Conversation::pair_key(first, second);
        let row = sqlx::query_as::<_, ConversationRow>(
            "SELECT * FROM conversations WHERE participant_low = $1 AND participant_high = $2 AND trade_id = $3",
        )
        .bind(low)
        .bind(high)
        .bind(trade_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Conversation::from))
    }

    async fn save_conversation(&self, conversation: &Conversation) -> StoreResult<()> {
        sqlx::query(
            r#"
            UPDATE conversations SET
                last_message_id = $2, status = $3, unread_counts = $4, updated_at = $5
            WHERE id = $1
            "#,
        )
        .bind(conversation.id)
        .bind(conversation.last_message_id)
        .bind(conversation.status)
        .bind(Json(&conversation.unread_counts))
        .bind(conversation.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_conversations_for(&self, user_id: Uuid) -> StoreResult<Vec<Conversation>> {
        let rows = sqlx::query_as::<_, ConversationRow>(
            "SELECT * FROM conversations WHERE $1 = ANY(participants) ORDER BY updated_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Conversation::from).collect())
    }
}

// ============================================================================
// Messages
// ============================================================================

#[async_trait]
impl MessageStore for PgStore {
    async fn insert_message(&self, message: Message) -> StoreResult<Message> {
        sqlx::query(
            r#"
            INSERT INTO messages (
                id, conversation_id, sender_id, content, message_type, read_by,
                metadata, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(message.id)
        .bind(message.conversation_id)
        .bind(message.sender_id)
        .bind(&message.content)
        .bind(message.message_type)
        .bind(&message.read_by)
        .bind(Json(&message.metadata))
        .bind(message.created_at)
        .bind(message.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(message)
    }

    async fn find_message(&self, id: Uuid) -> StoreResult<Option<Message>> {
        let row = sqlx::query_as::<_, MessageRow>("SELECT * FROM messages WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Message::from))
    }

    async fn list_messages(&self, conversation_id: Uuid) -> StoreResult<Vec<Message>> {
        let rows = sqlx::query_as::<_, MessageRow>(
            "SELECT * FROM messages WHERE conversation_id = $1 ORDER BY created_at ASC, id",
        )
        .bind(conversation_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Message::from).collect())
    }

    async fn mark_messages_read(&self, conversation_id: Uuid, reader: Uuid) -> StoreResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE messages
            SET read_by = array_append(read_by, $2), updated_at = NOW()
            WHERE conversation_id = $1 AND sender_id <> $2 AND NOT ($2 = ANY(read_by))
            "#,
        )
        .bind(conversation_id)
        .bind(reader)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn delete_message(&self, id: Uuid) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM messages WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl Repository for PgStore {
    async fn ping(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

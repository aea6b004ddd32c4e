//! Postgres Store Tests
//!
//! Need a disposable database in `DATABASE_URL`; run with
//! `cargo test -- --ignored`.

use chrono::Duration;
use sqlx::postgres::PgPoolOptions;
use uuid::Uuid;

use barter_backend::messaging::{Conversation, Message, MessageMetadata, MessageType};
use barter_backend::models::{Page, User};
use barter_backend::store::{
    ConversationStore, MessageStore, PgStore, StoreError, TradeStore, UserStore,
};
use barter_backend::trade::{
    Category, Condition, Location, Preferences, Trade, TradeDraft, TradeFilter, TradeStatus,
    TradeType, Valuation,
};

async fn store() -> PgStore {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(&url)
        .await
        .expect("Failed to connect to database");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to run migrations");
    PgStore::new(pool)
}

fn draft(title: &str) -> TradeDraft {
    TradeDraft {
        title: title.to_string(),
        description: "Integration fixture".to_string(),
        category: Category::Books,
        subcategory: None,
        images: Vec::new(),
        condition: Condition::Good,
        trade_type: TradeType::Product,
        valuation: Valuation::new(40.0),
        location: Location {
            coordinates: Some([-9.14, 38.72]),
            ..Location::default()
        },
        preferences: Preferences::default(),
    }
}

#[tokio::test]
#[ignore]
async fn test_user_subject_is_unique() {
    let store = store().await;
    let subject = format!("pg_{}", Uuid::new_v4());

    store.insert_user(User::new(subject.clone(), 100)).await.unwrap();
    let err = store.insert_user(User::new(subject.clone(), 100)).await.unwrap_err();
    assert!(matches!(err, StoreError::Conflict(_)));

    let found = store.find_user_by_subject(&subject).await.unwrap().unwrap();
    assert_eq!(found.trade_points, 100);
}

#[tokio::test]
#[ignore]
async fn test_trade_round_trip_and_views() {
    let store = store().await;
    let owner = store
        .insert_user(User::new(format!("pg_{}", Uuid::new_v4()), 100))
        .await
        .unwrap();

    let trade = store
        .insert_trade(Trade::new(owner.id, draft("Paperback"), Duration::days(90)))
        .await
        .unwrap();
    assert_eq!(trade.trade_points, 30);

    store.increment_views(trade.id).await.unwrap();
    store.increment_views(trade.id).await.unwrap();
    let mut stored = store.find_trade(trade.id).await.unwrap().unwrap();
    assert_eq!(stored.views, 2);

    stored.toggle_like(owner.id);
    store.save_trade(&stored).await.unwrap();
    let stored = store.find_trade(trade.id).await.unwrap().unwrap();
    assert_eq!(stored.likes, 1);
    assert_eq!(stored.views, 2);

    let filter = TradeFilter {
        owner_id: Some(owner.id),
        status: Some(TradeStatus::Active),
        ..TradeFilter::default()
    };
    let (trades, total) = store.list_trades(&filter, Page::new(None, None)).await.unwrap();
    assert_eq!(total, 1);
    assert_eq!(trades[0].id, trade.id);

    assert!(store.delete_trade(trade.id).await.unwrap());
    assert!(store.find_trade(trade.id).await.unwrap().is_none());
}

#[tokio::test]
#[ignore]
async fn test_conversation_triple_is_unique_and_reads_are_tracked() {
    let store = store().await;
    let a = store
        .insert_user(User::new(format!("pg_{}", Uuid::new_v4()), 100))
        .await
        .unwrap();
    let b = store
        .insert_user(User::new(format!("pg_{}", Uuid::new_v4()), 100))
        .await
        .unwrap();
    let trade = store
        .insert_trade(Trade::new(a.id, draft("Atlas"), Duration::days(90)))
        .await
        .unwrap();

    let conversation = store
        .insert_conversation(Conversation::new(b.id, a.id, trade.id))
        .await
        .unwrap();
    let err = store
        .insert_conversation(Conversation::new(a.id, b.id, trade.id))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Conflict(_)));

    let found = store
        .find_conversation_between(a.id, b.id, trade.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found.id, conversation.id);

    for text in ["first", "second"] {
        store
            .insert_message(Message::new(
                conversation.id,
                b.id,
                text.to_string(),
                MessageType::Text,
                MessageMetadata::default(),
            ))
            .await
            .unwrap();
    }

    assert_eq!(store.mark_messages_read(conversation.id, a.id).await.unwrap(), 2);
    assert_eq!(store.mark_messages_read(conversation.id, a.id).await.unwrap(), 0);

    let messages = store.list_messages(conversation.id).await.unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].content, "first");
    assert!(messages.iter().all(|m| m.is_read_by(a.id)));
}

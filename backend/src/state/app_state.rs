//! Application state shared across handlers

use std::sync::Arc;

use axum::extract::FromRef;

use crate::auth::{IdentityVerifier, UserService};
use crate::config::{Config, Environment};
use crate::messaging::MessagingService;
use crate::store::Repository;
use crate::trade::TradeService;
use crate::websocket::NotificationHub;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Repository>,
    pub identity: Arc<dyn IdentityVerifier>,
    pub user_service: Arc<UserService>,
    pub trade_service: Arc<TradeService>,
    pub messaging_service: Arc<MessagingService>,
    pub notifications: NotificationHub,
    pub environment: Environment,
}

impl AppState {
    /// Wires every service onto one store and one identity verifier.
    pub fn new(
        config: &Config,
        store: Arc<dyn Repository>,
        identity: Arc<dyn IdentityVerifier>,
    ) -> Self {
        let notifications = NotificationHub::new();

        let user_service = Arc::new(UserService::new(
            Arc::clone(&store),
            config.starting_trade_points,
        ));
        let trade_service = Arc::new(TradeService::new(
            Arc::clone(&store),
            config.trade_ttl_days,
        ));
        let messaging_service = Arc::new(MessagingService::new(
            Arc::clone(&store),
            Arc::new(notifications.clone()),
            config.max_message_length,
        ));

        Self {
            store,
            identity,
            user_service,
            trade_service,
            messaging_service,
            notifications,
            environment: config.environment,
        }
    }
}

impl FromRef<AppState> for NotificationHub {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.notifications.clone()
    }
}

impl FromRef<AppState> for Arc<dyn IdentityVerifier> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.identity.clone()
    }
}

impl FromRef<AppState> for Arc<UserService> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.user_service.clone()
    }
}

impl FromRef<AppState> for Arc<TradeService> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.trade_service.clone()
    }
}

impl FromRef<AppState> for Arc<MessagingService> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.messaging_service.clone()
    }
}

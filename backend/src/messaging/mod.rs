//! Conversation and message subsystem

mod model;
mod notify;
mod service;

pub use model::*;
pub use notify::{Notification, Notifier, NotifyError};
pub use service::MessagingService;

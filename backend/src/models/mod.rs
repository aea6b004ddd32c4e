//! Shared data models for the barter backend

use serde::{Deserialize, Serialize};

pub mod user;
pub use user::*;

/// Success envelope: `{ "success": true, ...payload }`
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(flatten)]
    pub payload: T,
}

impl<T> ApiResponse<T> {
    pub fn ok(payload: T) -> Self {
        Self {
            success: true,
            payload,
        }
    }
}

/// Payload carrying only a human readable message
#[derive(Debug, Serialize, Deserialize)]
pub struct MessagePayload {
    pub message: String,
}

impl MessagePayload {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Page/limit pair as requested by a client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub page: u32,
    pub limit: u32,
}

impl Page {
    pub const DEFAULT_LIMIT: u32 = 10;
    pub const MAX_LIMIT: u32 = 100;

    /// Normalizes client input: page starts at 1, limit is clamped.
    pub fn new(page: Option<u32>, limit: Option<u32>) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            limit: limit
                .unwrap_or(Self::DEFAULT_LIMIT)
                .clamp(1, Self::MAX_LIMIT),
        }
    }

    pub fn offset(&self) -> u64 {
        (self.page as u64 - 1) * self.limit as u64
    }
}

/// Pagination block returned with list responses
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Pagination {
    pub total: i64,
    pub page: u32,
    pub pages: i64,
    pub limit: u32,
}

impl Pagination {
    pub fn new(total: i64, page: Page) -> Self {
        let limit = page.limit as i64;
        Self {
            total,
            page: page.page,
            pages: (total + limit - 1) / limit,
            limit: page.limit,
        }
    }
}

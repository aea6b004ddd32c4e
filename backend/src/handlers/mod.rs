//! API handlers for the barter backend

pub mod auth;
pub mod health;
pub mod message;
pub mod trade;
pub mod user;

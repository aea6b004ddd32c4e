//! Barter Marketplace Backend Library
//!
//! This library exports the core modules for the barter backend server.

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod messaging;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;
pub mod store;
pub mod trade;
pub mod websocket;

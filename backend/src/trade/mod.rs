//! Trade listings: model, geo helpers and the lifecycle service

pub mod geo;
mod model;
mod service;

pub use model::*;
pub use service::TradeService;

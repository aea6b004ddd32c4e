//! Pure domain services

pub mod valuation;

pub use valuation::{compute_trade_points, points_for};

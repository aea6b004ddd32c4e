//! Trade points valuation engine
//!
//! Deterministic scoring of a listing from its declared attributes. The
//! output is what every persisted trade carries as `tradePoints`; clients
//! never get to supply it.

use crate::trade::{Category, Condition, Valuation};

// ============================================================================
// Configuration Constants
// ============================================================================

/// Multiplier used when the condition label is not recognised
const UNKNOWN_CONDITION_MULTIPLIER: f64 = 0.5;

/// Yearly depreciation as a fraction of base value
const DEPRECIATION_PER_YEAR: f64 = 0.05;

/// Ages above this many years depreciate by the flat cap instead
const DEPRECIATION_YEARS_LIMIT: f64 = 5.0;

/// Maximum depreciation as a fraction of base value
const DEPRECIATION_CAP: f64 = 0.25;

/// Demand bonus for categories without a specific entry
const DEFAULT_DEMAND_BONUS: f64 = 1.0;

/// No trade is ever worth less than this
const MIN_TRADE_POINTS: i64 = 1;

// ============================================================================
// Lookup tables
// ============================================================================

/// Share of the base value kept at a given wear level
pub fn condition_multiplier(condition: &str) -> f64 {
    match condition {
        "new" => 1.0,
        "like_new" => 0.9,
        "good" => 0.75,
        "fair" => 0.6,
        "poor" => 0.4,
        _ => UNKNOWN_CONDITION_MULTIPLIER,
    }
}

/// Category demand factor; categories not listed get no bonus
pub fn demand_bonus(category: &str) -> f64 {
    match category {
        "Electronics" => 1.2,
        "Vehicles" => 1.5,
        "Jewelry" => 1.3,
        "Art" => 1.4,
        "Services" => 1.1,
        _ => DEFAULT_DEMAND_BONUS,
    }
}

/// 0.6 for quality 1 up to 1.5 for quality 10
pub fn quality_multiplier(quality: f64) -> f64 {
    0.5 + quality / 10.0
}

/// Linear 5% per year for the first five years, then a flat 25%.
pub fn age_depreciation(base_value: f64, age_months: f64) -> f64 {
    let years = age_months / 12.0;
    if years <= DEPRECIATION_YEARS_LIMIT {
        base_value * DEPRECIATION_PER_YEAR * years
    } else {
        base_value * DEPRECIATION_CAP
    }
}

// ============================================================================
// Engine
// ============================================================================

/// Points for a typed valuation, condition and category.
pub fn compute_trade_points(valuation: &Valuation, condition: Condition, category: Category) -> i64 {
    points_for(
        valuation.base_value,
        valuation.age_months,
        valuation.quality,
        condition.as_str(),
        category.as_str(),
    )
}

/// Points from raw labels. Unknown conditions and categories fall back to
/// their default multipliers; the result is never below one.
pub fn points_for(
    base_value: f64,
    age_months: f64,
    quality: f64,
    condition: &str,
    category: &str,
) -> i64 {
    let points = base_value
        * condition_multiplier(condition)
        * quality_multiplier(quality)
        * demand_bonus(category)
        - age_depreciation(base_value, age_months);

    // Half-way values round toward positive infinity.
    let rounded = (points + 0.5).floor();
    if rounded.is_nan() {
        return MIN_TRADE_POINTS;
    }
    (rounded as i64).max(MIN_TRADE_POINTS)
}

//! Trade listings and request DTOs

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::models::UserSummary;
use crate::services::valuation::compute_trade_points;

/// A listed item or service offered for barter
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Trade {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub title: String,
    pub description: String,
    pub category: Category,
    pub subcategory: Option<String>,
    pub images: Vec<TradeImage>,
    pub condition: Condition,
    pub trade_type: TradeType,
    pub valuation: Valuation,
    /// Always the valuation engine's output for the current valuation,
    /// condition and category.
    pub trade_points: i64,
    pub location: Location,
    pub preferences: Preferences,
    pub status: TradeStatus,
    pub views: i64,
    pub likes: i64,
    pub liked_by: Vec<Uuid>,
    pub in_wishlist: Vec<Uuid>,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Trade {
    /// Builds a new active listing owned by `owner_id`. Points are computed
    /// before the value is handed back, so no caller can observe a trade
    /// without them.
    pub fn new(owner_id: Uuid, draft: TradeDraft, ttl: Duration) -> Self {
        let now = Utc::now();
        let mut trade = Self {
            id: Uuid::new_v4(),
            owner_id,
            title: draft.title,
            description: draft.description,
            category: draft.category,
            subcategory: draft.subcategory,
            images: draft.images,
            condition: draft.condition,
            trade_type: draft.trade_type,
            valuation: draft.valuation,
            trade_points: 0,
            location: draft.location,
            preferences: draft.preferences,
            status: TradeStatus::Active,
            views: 0,
            likes: 0,
            liked_by: Vec::new(),
            in_wishlist: Vec::new(),
            expires_at: now + ttl,
            created_at: now,
            updated_at: now,
        };
        trade.recompute_points();
        trade
    }

    pub fn recompute_points(&mut self) {
        self.trade_points = compute_trade_points(&self.valuation, self.condition, self.category);
    }

    /// Applies whitelisted changes. Points are recomputed whenever the
    /// valuation, condition or category is touched.
    pub fn apply_update(&mut self, update: UpdateTradeRequest) {
        let mut revalue = false;

        if let Some(title) = update.title {
            self.title = title;
        }
        if let Some(description) = update.description {
            self.description = description;
        }
        if let Some(category) = update.category {
            self.category = category;
            revalue = true;
        }
        if let Some(subcategory) = update.subcategory {
            self.subcategory = Some(subcategory);
        }
        if let Some(condition) = update.condition {
            self.condition = condition;
            revalue = true;
        }
        if let Some(valuation) = update.valuation {
            self.valuation.merge(valuation);
            revalue = true;
        }
        if let Some(images) = update.images {
            self.images = images;
        }
        if let Some(location) = update.location {
            self.location = location.into();
        }
        if let Some(preferences) = update.preferences {
            self.preferences = preferences;
        }
        if let Some(status) = update.status {
            self.status = status;
        }

        if revalue {
            self.recompute_points();
        }
        self.updated_at = Utc::now();
    }

    /// Toggles the user's like; returns whether the trade is now liked.
    pub fn toggle_like(&mut self, user_id: Uuid) -> bool {
        let liked = toggle_member(&mut self.liked_by, user_id);
        self.likes = self.liked_by.len() as i64;
        self.updated_at = Utc::now();
        liked
    }

    /// Toggles wishlist membership; returns whether the trade is now listed.
    pub fn toggle_wishlist(&mut self, user_id: Uuid) -> bool {
        let listed = toggle_member(&mut self.in_wishlist, user_id);
        self.updated_at = Utc::now();
        listed
    }

    pub fn is_owned_by(&self, user_id: Uuid) -> bool {
        self.owner_id == user_id
    }

    pub fn summary(&self) -> TradeSummary {
        TradeSummary {
            id: self.id,
            owner_id: self.owner_id,
            title: self.title.clone(),
            images: self.images.clone(),
            trade_points: self.trade_points,
        }
    }
}

fn toggle_member(set: &mut Vec<Uuid>, user_id: Uuid) -> bool {
    if set.contains(&user_id) {
        set.retain(|id| *id != user_id);
        false
    } else {
        set.push(user_id);
        true
    }
}

/// Compact projection embedded in conversations
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TradeSummary {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub title: String,
    pub images: Vec<TradeImage>,
    pub trade_points: i64,
}

/// Declared worth of an item, input to the valuation engine
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Valuation {
    pub base_value: f64,
    pub currency: String,
    /// Age of the item in months
    #[serde(rename = "age", alias = "ageMonths")]
    pub age_months: f64,
    /// 1 (worst) to 10 (best)
    pub quality: f64,
    pub brand: Option<String>,
}

impl Valuation {
    pub const DEFAULT_CURRENCY: &'static str = "USD";
    pub const DEFAULT_QUALITY: f64 = 5.0;

    pub fn new(base_value: f64) -> Self {
        Self {
            base_value,
            currency: Self::DEFAULT_CURRENCY.to_string(),
            age_months: 0.0,
            quality: Self::DEFAULT_QUALITY,
            brand: None,
        }
    }

    fn merge(&mut self, patch: ValuationPatch) {
        if let Some(base_value) = patch.base_value {
            self.base_value = base_value;
        }
        if let Some(currency) = patch.currency {
            self.currency = currency;
        }
        if let Some(age_months) = patch.age_months {
            self.age_months = age_months;
        }
        if let Some(quality) = patch.quality {
            self.quality = quality;
        }
        if let Some(brand) = patch.brand {
            self.brand = Some(brand);
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, Hash)]
#[sqlx(type_name = "trade_category")]
pub enum Category {
    Electronics,
    Fashion,
    Books,
    Sports,
    Art,
    Music,
    Gaming,
    Jewelry,
    Tools,
    Furniture,
    Collectibles,
    Toys,
    #[serde(rename = "Home Decor")]
    #[sqlx(rename = "Home Decor")]
    HomeDecor,
    #[serde(rename = "Outdoor Gear")]
    #[sqlx(rename = "Outdoor Gear")]
    OutdoorGear,
    Vehicles,
    Services,
    Skills,
    Other,
}

impl Category {
    pub const ALL: [Category; 18] = [
        Category::Electronics,
        Category::Fashion,
        Category::Books,
        Category::Sports,
        Category::Art,
        Category::Music,
        Category::Gaming,
        Category::Jewelry,
        Category::Tools,
        Category::Furniture,
        Category::Collectibles,
        Category::Toys,
        Category::HomeDecor,
        Category::OutdoorGear,
        Category::Vehicles,
        Category::Services,
        Category::Skills,
        Category::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Electronics => "Electronics",
            Category::Fashion => "Fashion",
            Category::Books => "Books",
            Category::Sports => "Sports",
            Category::Art => "Art",
            Category::Music => "Music",
            Category::Gaming => "Gaming",
            Category::Jewelry => "Jewelry",
            Category::Tools => "Tools",
            Category::Furniture => "Furniture",
            Category::Collectibles => "Collectibles",
            Category::Toys => "Toys",
            Category::HomeDecor => "Home Decor",
            Category::OutdoorGear => "Outdoor Gear",
            Category::Vehicles => "Vehicles",
            Category::Services => "Services",
            Category::Skills => "Skills",
            Category::Other => "Other",
        }
    }

    /// Case-insensitive lookup by display name, used for free-form
    /// user interests.
    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(label.trim()))
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "trade_condition", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    New,
    LikeNew,
    #[default]
    Good,
    Fair,
    Poor,
}

impl Condition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Condition::New => "new",
            Condition::LikeNew => "like_new",
            Condition::Good => "good",
            Condition::Fair => "fair",
            Condition::Poor => "poor",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "trade_type", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TradeType {
    #[default]
    Product,
    Service,
    Skill,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "trade_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TradeStatus {
    #[default]
    Active,
    Pending,
    Completed,
    Cancelled,
    Expired,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Validate)]
#[serde(rename_all = "camelCase")]
pub struct TradeImage {
    #[validate(length(min = 1))]
    pub url: String,
    #[serde(default)]
    pub is_main: bool,
    pub caption: Option<String>,
}

/// Postal location plus an optional point used for radius search
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    pub address: String,
    pub city: String,
    pub state: String,
    pub country: String,
    /// `[longitude, latitude]`
    pub coordinates: Option<[f64; 2]>,
}

impl Location {
    pub fn longitude(&self) -> Option<f64> {
        self.coordinates.map(|c| c[0])
    }

    pub fn latitude(&self) -> Option<f64> {
        self.coordinates.map(|c| c[1])
    }
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase", default)]
pub struct LocationInput {
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
    #[validate(custom = "validate_coordinates")]
    pub coordinates: Option<[f64; 2]>,
}

impl From<LocationInput> for Location {
    fn from(input: LocationInput) -> Self {
        Self {
            address: input.address.unwrap_or_default(),
            city: input.city.unwrap_or_default(),
            state: input.state.unwrap_or_default(),
            country: input.country.unwrap_or_default(),
            coordinates: input.coordinates,
        }
    }
}

fn validate_coordinates(coordinates: &[f64; 2]) -> Result<(), ValidationError> {
    let [lng, lat] = *coordinates;
    if !(-180.0..=180.0).contains(&lng) || !(-90.0..=90.0).contains(&lat) {
        let mut err = ValidationError::new("coordinates");
        err.message = Some("must be [longitude, latitude] within valid ranges".into());
        return Err(err);
    }
    Ok(())
}

fn validate_images(images: &[TradeImage]) -> Result<(), ValidationError> {
    for image in images {
        if let Err(errors) = image.validate() {
            let mut err = ValidationError::new("images");
            err.message = Some(format!("invalid image: {}", errors).into());
            return Err(err);
        }
    }
    Ok(())
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct Preferences {
    pub looking_for: Vec<String>,
    pub trade_type: ExchangeMode,
    /// Kilometres
    pub max_distance: Option<f64>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExchangeMode {
    InPerson,
    Online,
    #[default]
    Both,
}

/// Validated input to `Trade::new`
#[derive(Debug, Clone)]
pub struct TradeDraft {
    pub title: String,
    pub description: String,
    pub category: Category,
    pub subcategory: Option<String>,
    pub images: Vec<TradeImage>,
    pub condition: Condition,
    pub trade_type: TradeType,
    pub valuation: Valuation,
    pub location: Location,
    pub preferences: Preferences,
}

/// Body of `POST /api/trades`. Derived or server-owned fields such as
/// `tradePoints`, `views` and `owner` are not accepted.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateTradeRequest {
    #[validate(length(min = 1, max = 100, message = "title must be 1-100 characters"))]
    pub title: String,
    #[validate(length(min = 1, max = 1000, message = "description must be 1-1000 characters"))]
    pub description: String,
    pub category: Category,
    pub subcategory: Option<String>,
    #[serde(default)]
    #[validate]
    pub images: Vec<TradeImage>,
    pub condition: Option<Condition>,
    pub trade_type: Option<TradeType>,
    #[validate]
    pub valuation: ValuationInput,
    #[validate]
    pub location: Option<LocationInput>,
    pub preferences: Option<Preferences>,
}

impl From<CreateTradeRequest> for TradeDraft {
    fn from(req: CreateTradeRequest) -> Self {
        let mut valuation = Valuation::new(req.valuation.base_value);
        valuation.merge(ValuationPatch {
            base_value: None,
            currency: req.valuation.currency,
            age_months: req.valuation.age_months,
            quality: req.valuation.quality,
            brand: req.valuation.brand,
        });

        Self {
            title: req.title.trim().to_string(),
            description: req.description,
            category: req.category,
            subcategory: req.subcategory,
            images: req.images,
            condition: req.condition.unwrap_or_default(),
            trade_type: req.trade_type.unwrap_or_default(),
            valuation,
            location: req.location.map(Location::from).unwrap_or_default(),
            preferences: req.preferences.unwrap_or_default(),
        }
    }
}

/// Valuation as submitted on creation; only `baseValue` is required.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ValuationInput {
    #[validate(range(min = 0.0, message = "baseValue must not be negative"))]
    pub base_value: f64,
    pub currency: Option<String>,
    #[serde(rename = "age", alias = "ageMonths")]
    #[validate(range(min = 0.0, message = "age must not be negative"))]
    pub age_months: Option<f64>,
    #[validate(range(min = 1.0, max = 10.0, message = "quality must be between 1 and 10"))]
    pub quality: Option<f64>,
    pub brand: Option<String>,
}

/// Partial valuation applied on update
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase", default)]
pub struct ValuationPatch {
    #[validate(range(min = 0.0, message = "baseValue must not be negative"))]
    pub base_value: Option<f64>,
    pub currency: Option<String>,
    #[serde(rename = "age", alias = "ageMonths")]
    #[validate(range(min = 0.0, message = "age must not be negative"))]
    pub age_months: Option<f64>,
    #[validate(range(min = 1.0, max = 10.0, message = "quality must be between 1 and 10"))]
    pub quality: Option<f64>,
    pub brand: Option<String>,
}

/// Body of `PUT /api/trades/:id`; only these fields can change.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase", default)]
pub struct UpdateTradeRequest {
    #[validate(length(min = 1, max = 100, message = "title must be 1-100 characters"))]
    pub title: Option<String>,
    #[validate(length(min = 1, max = 1000, message = "description must be 1-1000 characters"))]
    pub description: Option<String>,
    pub category: Option<Category>,
    pub subcategory: Option<String>,
    pub condition: Option<Condition>,
    #[validate]
    pub valuation: Option<ValuationPatch>,
    #[validate(custom = "validate_images")]
    pub images: Option<Vec<TradeImage>>,
    #[validate]
    pub location: Option<LocationInput>,
    pub preferences: Option<Preferences>,
    pub status: Option<TradeStatus>,
}

/// Query of `GET /api/trades`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ListTradesQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub category: Option<Category>,
    pub condition: Option<Condition>,
    pub min_points: Option<i64>,
    pub max_points: Option<i64>,
    pub status: Option<TradeStatus>,
}

/// Query of `GET /api/trades/search`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SearchTradesQuery {
    pub q: Option<String>,
    pub category: Option<Category>,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    /// Kilometres
    pub radius: Option<f64>,
}

/// Query of `GET /api/trades/mine`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct OwnTradesQuery {
    pub status: Option<TradeStatus>,
}

/// Storage-level filter shared by every listing query
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TradeFilter {
    pub status: Option<TradeStatus>,
    pub category: Option<Category>,
    pub categories: Option<Vec<Category>>,
    pub condition: Option<Condition>,
    pub min_points: Option<i64>,
    pub max_points: Option<i64>,
    pub owner_id: Option<Uuid>,
    pub exclude_owner_id: Option<Uuid>,
    pub wishlisted_by: Option<Uuid>,
}

impl TradeFilter {
    pub fn matches(&self, trade: &Trade) -> bool {
        self.status.map_or(true, |s| trade.status == s)
            && self.category.map_or(true, |c| trade.category == c)
            && self
                .categories
                .as_ref()
                .map_or(true, |cs| cs.contains(&trade.category))
            && self.condition.map_or(true, |c| trade.condition == c)
            && self.min_points.map_or(true, |min| trade.trade_points >= min)
            && self.max_points.map_or(true, |max| trade.trade_points <= max)
            && self.owner_id.map_or(true, |o| trade.owner_id == o)
            && self.exclude_owner_id.map_or(true, |o| trade.owner_id != o)
            && self
                .wishlisted_by
                .map_or(true, |u| trade.in_wishlist.contains(&u))
    }
}

/// Point-and-radius constraint, radius already in metres
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoQuery {
    pub latitude: f64,
    pub longitude: f64,
    pub radius_meters: f64,
}

/// Storage-level search request
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TradeSearch {
    pub text: Option<String>,
    pub category: Option<Category>,
    pub status: Option<TradeStatus>,
    pub near: Option<GeoQuery>,
    pub limit: u32,
}

/// Trade as sent to clients, with the owner's public profile embedded.
/// `owner` is null when the owning account no longer exists.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TradeView {
    #[serde(flatten)]
    pub trade: Trade,
    pub owner: Option<UserSummary>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeListPayload {
    pub trades: Vec<TradeView>,
    pub pagination: crate::models::Pagination,
}

#[derive(Debug, Serialize)]
pub struct TradeSearchPayload {
    pub trades: Vec<TradeView>,
    pub count: usize,
}

#[derive(Debug, Serialize)]
pub struct TradesPayload {
    pub trades: Vec<TradeView>,
}

#[derive(Debug, Serialize)]
pub struct TradePayload {
    pub trade: TradeView,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeWithMessage {
    pub message: String,
    pub trade: TradeView,
}

#[derive(Debug, Serialize)]
pub struct LikePayload {
    pub liked: bool,
    pub likes: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WishlistPayload {
    pub in_wishlist: bool,
}

//! Trade service - listing lifecycle, discovery and engagement toggles
//!
//! Ownership is checked here; the verification gate is applied by the
//! caller's extractor before any mutating method is reached.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Duration;
use uuid::Uuid;
use validator::Validate;

use super::model::*;
use crate::error::{ApiError, ApiResult};
use crate::models::{Page, Pagination, User, UserSummary};
use crate::store::Repository;

/// Search radius when `radius` is omitted, in kilometres
const DEFAULT_SEARCH_RADIUS_KM: f64 = 50.0;
const SEARCH_LIMIT: u32 = 20;
const RECOMMENDATION_LIMIT: u32 = 10;
/// Upper bound for the unpaginated per-user lists
const USER_LIST_LIMIT: u32 = 100;

pub struct TradeService {
    store: Arc<dyn Repository>,
    ttl: Duration,
}

impl TradeService {
    pub fn new(store: Arc<dyn Repository>, ttl_days: i64) -> Self {
        Self {
            store,
            ttl: Duration::days(ttl_days),
        }
    }

    /// Create a listing owned by `owner`. Points are always computed here.
    pub async fn create(&self, owner: &User, request: CreateTradeRequest) -> ApiResult<Trade> {
        request.validate()?;

        let trade = Trade::new(owner.id, TradeDraft::from(request), self.ttl);
        let trade = self.store.insert_trade(trade).await?;

        tracing::info!(
            trade_id = %trade.id,
            owner_id = %owner.id,
            trade_points = trade.trade_points,
            "Trade created"
        );
        Ok(trade)
    }

    /// Fetch a trade and count the view. The counter write happens in the
    /// background; the returned value already includes this view.
    pub async fn get(&self, id: Uuid) -> ApiResult<Trade> {
        let mut trade = self.find(id).await?;

        let store = Arc::clone(&self.store);
        tokio::spawn(async move {
            if let Err(e) = store.increment_views(id).await {
                tracing::warn!(trade_id = %id, error = %e, "Failed to record trade view");
            }
        });

        trade.views += 1;
        Ok(trade)
    }

    pub async fn update(
        &self,
        user: &User,
        id: Uuid,
        request: UpdateTradeRequest,
    ) -> ApiResult<Trade> {
        request.validate()?;

        let mut trade = self.find(id).await?;
        if !trade.is_owned_by(user.id) {
            return Err(ApiError::Forbidden(
                "Not authorized to update this trade".to_string(),
            ));
        }

        trade.apply_update(request);
        self.store.save_trade(&trade).await?;

        tracing::info!(trade_id = %id, trade_points = trade.trade_points, "Trade updated");
        Ok(trade)
    }

    pub async fn delete(&self, user: &User, id: Uuid) -> ApiResult<()> {
        let trade = self.find(id).await?;
        if !trade.is_owned_by(user.id) {
            return Err(ApiError::Forbidden(
                "Not authorized to delete this trade".to_string(),
            ));
        }

        if !self.store.delete_trade(id).await? {
            return Err(ApiError::NotFound("Trade not found".to_string()));
        }

        tracing::info!(trade_id = %id, owner_id = %user.id, "Trade deleted");
        Ok(())
    }

    /// Paginated listing. Only active trades are shown unless a status is
    /// requested explicitly.
    pub async fn list(&self, query: ListTradesQuery) -> ApiResult<TradeListPayload> {
        if let (Some(min), Some(max)) = (query.min_points, query.max_points) {
            if min > max {
                return Err(ApiError::invalid_field(
                    "minPoints",
                    "minPoints must not exceed maxPoints",
                ));
            }
        }

        let page = Page::new(query.page, query.limit);
        let filter = TradeFilter {
            status: Some(query.status.unwrap_or(TradeStatus::Active)),
            category: query.category,
            condition: query.condition,
            min_points: query.min_points,
            max_points: query.max_points,
            ..Default::default()
        };

        let (trades, total) = self.store.list_trades(&filter, page).await?;
        Ok(TradeListPayload {
            trades: self.present(trades).await?,
            pagination: Pagination::new(total, page),
        })
    }

    /// Text and radius search over active trades. `radius` is in kilometres.
    pub async fn search(&self, query: SearchTradesQuery) -> ApiResult<Vec<Trade>> {
        let near = match (query.lat, query.lng) {
            (Some(latitude), Some(longitude)) => {
                if !(-90.0..=90.0).contains(&latitude) {
                    return Err(ApiError::invalid_field("lat", "lat must be between -90 and 90"));
                }
                if !(-180.0..=180.0).contains(&longitude) {
                    return Err(ApiError::invalid_field(
                        "lng",
                        "lng must be between -180 and 180",
                    ));
                }
                let radius_km = query.radius.unwrap_or(DEFAULT_SEARCH_RADIUS_KM);
                if !radius_km.is_finite() || radius_km <= 0.0 {
                    return Err(ApiError::invalid_field("radius", "radius must be positive"));
                }
                Some(GeoQuery {
                    latitude,
                    longitude,
                    radius_meters: radius_km * 1000.0,
                })
            }
            (None, None) => None,
            _ => {
                return Err(ApiError::BadRequest(
                    "lat and lng must be provided together".to_string(),
                ))
            }
        };

        let text = query
            .q
            .map(|q| q.trim().to_string())
            .filter(|q| !q.is_empty());

        let search = TradeSearch {
            text,
            category: query.category,
            status: Some(TradeStatus::Active),
            near,
            limit: SEARCH_LIMIT,
        };
        Ok(self.store.search_trades(&search).await?)
    }

    /// Active trades by other users, in the caller's interest categories
    /// when any match, otherwise the most recent ones.
    pub async fn recommendations(&self, user: &User) -> ApiResult<Vec<Trade>> {
        let page = Page::new(Some(1), Some(RECOMMENDATION_LIMIT));
        let base = TradeFilter {
            status: Some(TradeStatus::Active),
            exclude_owner_id: Some(user.id),
            ..Default::default()
        };

        let interests: Vec<Category> = user
            .interests
            .iter()
            .filter_map(|label| Category::from_label(label))
            .collect();

        if !interests.is_empty() {
            let filter = TradeFilter {
                categories: Some(interests),
                ..base.clone()
            };
            let (trades, _) = self.store.list_trades(&filter, page).await?;
            if !trades.is_empty() {
                return Ok(trades);
            }
        }

        let (trades, _) = self.store.list_trades(&base, page).await?;
        Ok(trades)
    }

    pub async fn wishlist(&self, user: &User) -> ApiResult<Vec<Trade>> {
        let filter = TradeFilter {
            status: Some(TradeStatus::Active),
            wishlisted_by: Some(user.id),
            ..Default::default()
        };
        let (trades, _) = self
            .store
            .list_trades(&filter, Page::new(Some(1), Some(USER_LIST_LIMIT)))
            .await?;
        Ok(trades)
    }

    /// The caller's own trades in any status unless one is given.
    pub async fn mine(&self, user: &User, status: Option<TradeStatus>) -> ApiResult<Vec<Trade>> {
        let filter = TradeFilter {
            status,
            owner_id: Some(user.id),
            ..Default::default()
        };
        let (trades, _) = self
            .store
            .list_trades(&filter, Page::new(Some(1), Some(USER_LIST_LIMIT)))
            .await?;
        Ok(trades)
    }

    pub async fn toggle_like(&self, user: &User, id: Uuid) -> ApiResult<LikePayload> {
        let mut trade = self.find(id).await?;
        let liked = trade.toggle_like(user.id);
        self.store.save_trade(&trade).await?;

        tracing::debug!(trade_id = %id, user_id = %user.id, liked, "Trade like toggled");
        Ok(LikePayload {
            liked,
            likes: trade.likes,
        })
    }

    pub async fn toggle_wishlist(&self, user: &User, id: Uuid) -> ApiResult<WishlistPayload> {
        let mut trade = self.find(id).await?;
        let in_wishlist = trade.toggle_wishlist(user.id);
        self.store.save_trade(&trade).await?;
        Ok(WishlistPayload { in_wishlist })
    }

    /// Attaches each owner's public profile, loading every owner once.
    pub async fn present(&self, trades: Vec<Trade>) -> ApiResult<Vec<TradeView>> {
        let mut owner_ids: Vec<Uuid> = trades.iter().map(|t| t.owner_id).collect();
        owner_ids.sort_unstable();
        owner_ids.dedup();

        let owners: HashMap<Uuid, UserSummary> = self
            .store
            .find_users(&owner_ids)
            .await?
            .into_iter()
            .map(|u| (u.id, u.summary()))
            .collect();

        Ok(trades
            .into_iter()
            .map(|trade| TradeView {
                owner: owners.get(&trade.owner_id).cloned(),
                trade,
            })
            .collect())
    }

    pub async fn present_one(&self, trade: Trade) -> ApiResult<TradeView> {
        let owner = self
            .store
            .find_user(trade.owner_id)
            .await?
            .map(|u| u.summary());
        Ok(TradeView { trade, owner })
    }

    async fn find(&self, id: Uuid) -> ApiResult<Trade> {
        self.store
            .find_trade(id)
            .await?
            .ok_or_else(|| ApiError::NotFound("Trade not found".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, TradeStore, UserStore};
    use serde_json::json;

    fn service() -> (TradeService, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (TradeService::new(store.clone(), 90), store)
    }

    fn request(value: serde_json::Value) -> CreateTradeRequest {
        serde_json::from_value(value).unwrap()
    }

    fn camera() -> CreateTradeRequest {
        request(json!({
            "title": "Camera",
            "description": "Mirrorless body",
            "category": "Electronics",
            "valuation": { "baseValue": 200 }
        }))
    }

    #[tokio::test]
    async fn test_create_computes_points() {
        let (svc, _) = service();
        let owner = User::new("owner", 100);
        let trade = svc.create(&owner, camera()).await.unwrap();
        assert_eq!(trade.trade_points, 180);
        assert_eq!(trade.owner_id, owner.id);
    }

    #[tokio::test]
    async fn test_create_rejects_invalid_quality() {
        let (svc, _) = service();
        let owner = User::new("owner", 100);
        let err = svc
            .create(
                &owner,
                request(json!({
                    "title": "Camera",
                    "description": "Mirrorless body",
                    "category": "Electronics",
                    "valuation": { "baseValue": 200, "quality": 0 }
                })),
            )
            .await
            .unwrap_err();
        match err {
            ApiError::Validation(fields) => assert!(fields.contains_key("valuation.quality")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_non_owner_cannot_update_or_delete() {
        let (svc, _) = service();
        let owner = User::new("owner", 100);
        let stranger = User::new("stranger", 100);
        let trade = svc.create(&owner, camera()).await.unwrap();

        let err = svc
            .update(&stranger, trade.id, UpdateTradeRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Forbidden(_)));

        let err = svc.delete(&stranger, trade.id).await.unwrap_err();
        assert!(matches!(err, ApiError::Forbidden(_)));

        svc.delete(&owner, trade.id).await.unwrap();
        assert!(matches!(
            svc.get(trade.id).await.unwrap_err(),
            ApiError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn test_update_persists_recomputed_points() {
        let (svc, store) = service();
        let owner = User::new("owner", 100);
        let trade = svc.create(&owner, camera()).await.unwrap();

        let update: UpdateTradeRequest =
            serde_json::from_value(json!({ "valuation": { "baseValue": 300 } })).unwrap();
        let updated = svc.update(&owner, trade.id, update).await.unwrap();
        assert_eq!(updated.trade_points, 270);

        let stored = store.find_trade(trade.id).await.unwrap().unwrap();
        assert_eq!(stored.trade_points, 270);
    }

    #[tokio::test]
    async fn test_like_twice_restores_count() {
        let (svc, _) = service();
        let owner = User::new("owner", 100);
        let fan = User::new("fan", 100);
        let trade = svc.create(&owner, camera()).await.unwrap();

        let first = svc.toggle_like(&fan, trade.id).await.unwrap();
        assert!(first.liked);
        assert_eq!(first.likes, 1);

        let second = svc.toggle_like(&fan, trade.id).await.unwrap();
        assert!(!second.liked);
        assert_eq!(second.likes, 0);
    }

    #[tokio::test]
    async fn test_list_defaults_to_active() {
        let (svc, _) = service();
        let owner = User::new("owner", 100);
        let trade = svc.create(&owner, camera()).await.unwrap();
        svc.create(&owner, camera()).await.unwrap();

        let update: UpdateTradeRequest =
            serde_json::from_value(json!({ "status": "completed" })).unwrap();
        svc.update(&owner, trade.id, update).await.unwrap();

        let listed = svc.list(ListTradesQuery::default()).await.unwrap();
        assert_eq!(listed.pagination.total, 1);

        let completed = svc
            .list(ListTradesQuery {
                status: Some(TradeStatus::Completed),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(completed.trades[0].trade.id, trade.id);
    }

    #[tokio::test]
    async fn test_recommendations_prefer_interests_and_skip_own() {
        let (svc, _) = service();
        let seller = User::new("seller", 100);
        let mut buyer = User::new("buyer", 100);
        buyer.interests = vec!["books".to_string()];

        svc.create(&seller, camera()).await.unwrap();
        svc.create(
            &seller,
            request(json!({
                "title": "Novel",
                "description": "Paperback",
                "category": "Books",
                "valuation": { "baseValue": 10 }
            })),
        )
        .await
        .unwrap();
        svc.create(&buyer, camera()).await.unwrap();

        let recs = svc.recommendations(&buyer).await.unwrap();
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].category, Category::Books);

        buyer.interests = vec!["Vehicles".to_string()];
        let recs = svc.recommendations(&buyer).await.unwrap();
        assert_eq!(recs.len(), 2);
        assert!(recs.iter().all(|t| t.owner_id == seller.id));
    }

    #[tokio::test]
    async fn test_search_requires_both_coordinates() {
        let (svc, _) = service();
        let err = svc
            .search(SearchTradesQuery {
                lat: Some(40.0),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_listing_embeds_owner_profile() {
        let (svc, store) = service();
        let mut owner = User::new("owner", 100);
        owner.name = Some("Olga".to_string());
        let owner = store.insert_user(owner).await.unwrap();
        let orphaned = User::new("gone", 100);

        svc.create(&owner, camera()).await.unwrap();
        svc.create(&orphaned, camera()).await.unwrap();

        let listed = svc.list(ListTradesQuery::default()).await.unwrap();
        assert_eq!(listed.trades.len(), 2);
        for view in &listed.trades {
            if view.trade.owner_id == owner.id {
                let summary = view.owner.as_ref().unwrap();
                assert_eq!(summary.name.as_deref(), Some("Olga"));
            } else {
                assert!(view.owner.is_none());
            }
        }

        let trade = svc.mine(&owner, None).await.unwrap().remove(0);
        let view = svc.present_one(trade).await.unwrap();
        assert_eq!(view.owner.unwrap().id, owner.id);
    }
}

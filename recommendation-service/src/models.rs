use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const MIN_INTERACTIONS_FOR_RECOMMENDATION: i64 = 3;
pub const MAX_RECOMMENDATIONS: i64 = 20;
pub const DEFAULT_RECOMMENDATIONS: i64 = 10;

pub const TRENDING_WINDOW_DAYS: i64 = 7;
pub const TRENDING_DECAY_FACTOR: f64 = 0.9;
pub const TRENDING_MIN_INTERACTIONS: i32 = 5;
pub const TRENDING_MAX_PRODUCTS: i64 = 50;
pub const TRENDING_MIN_SCORE: f64 = 0.0;

pub const TRENDING_WEIGHT_VIEWS: f64 = 1.0;
pub const TRENDING_WEIGHT_CARTS: f64 = 2.0;
pub const TRENDING_WEIGHT_PURCHASES: f64 = 5.0;
pub const TRENDING_WEIGHT_WISHLISTS: f64 = 1.5;

pub const SIMILARITY_THRESHOLD: f64 = 0.3;
pub const SIMILARITY_MIN_COMMON_USERS: i32 = 2;
pub const SIMILARITY_BATCH_SIZE: usize = 100;

pub const RECENT_INTERACTIONS_FOR_ITEM_BASED: i64 = 50;

pub const USER_RECOMMENDATIONS_CACHE_TTL_SECS: u64 = 3600;
pub const PRODUCT_RECOMMENDATIONS_CACHE_TTL_SECS: u64 = 3600;
pub const TRENDING_CACHE_TTL_SECS: u64 = 1800;

#[derive(Debug, Clone, Queryable, Identifiable, Serialize, Deserialize)]
#[diesel(table_name = crate::schema::user_interactions)]
pub struct UserInteraction {
    pub id: Uuid,
    pub user_id: String,
    pub product_id: String,
    pub interaction_type: String,
    pub weight: f64,
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::user_interactions)]
pub struct NewUserInteraction {
    pub id: Uuid,
    pub user_id: String,
    pub product_id: String,
    pub interaction_type: String,
    pub weight: f64,
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Queryable, Identifiable, Serialize, Deserialize)]
#[diesel(table_name = crate::schema::product_similarities)]
pub struct ProductSimilarity {
    pub id: Uuid,
    pub product_id_1: String,
    pub product_id_2: String,
    pub similarity_score: f64,
    pub similarity_method: String,
    pub common_users: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::product_similarities)]
pub struct NewProductSimilarity {
    pub id: Uuid,
    pub product_id_1: String,
    pub product_id_2: String,
    pub similarity_score: f64,
    pub similarity_method: String,
    pub common_users: i32,
}

#[derive(Debug, Clone, Queryable, Identifiable, Serialize, Deserialize)]
#[diesel(table_name = crate::schema::trending_products)]
pub struct TrendingProduct {
    pub id: Uuid,
    pub product_id: String,
    pub trending_score: f64,
    pub view_count: i32,
    pub cart_count: i32,
    pub purchase_count: i32,
    pub wishlist_count: i32,
    pub calculated_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::trending_products)]
pub struct NewTrendingProduct {
    pub id: Uuid,
    pub product_id: String,
    pub trending_score: f64,
    pub view_count: i32,
    pub cart_count: i32,
    pub purchase_count: i32,
    pub wishlist_count: i32,
    pub calculated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::user_recommendations)]
pub struct NewUserRecommendation {
    pub id: Uuid,
    pub user_id: String,
    pub product_id: String,
    pub algorithm: String,
    pub rank: i32,
    pub score: f64,
    pub generated_at: DateTime<Utc>,
}

/// The closed set of event types the interaction log accepts, with the
/// weight each contributes to a user's affinity for a product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionType {
    View,
    AddToCart,
    Purchase,
    Wishlist,
    RemoveCart,
    Search,
}

impl InteractionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            InteractionType::View => "view",
            InteractionType::AddToCart => "add_to_cart",
            InteractionType::Purchase => "purchase",
            InteractionType::Wishlist => "wishlist",
            InteractionType::RemoveCart => "remove_cart",
            InteractionType::Search => "search",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "view" => Some(InteractionType::View),
            "add_to_cart" => Some(InteractionType::AddToCart),
            "purchase" => Some(InteractionType::Purchase),
            "wishlist" => Some(InteractionType::Wishlist),
            "remove_cart" => Some(InteractionType::RemoveCart),
            "search" => Some(InteractionType::Search),
            _ => None,
        }
    }

    pub fn weight(&self) -> f64 {
        match self {
            InteractionType::View => 1.0,
            InteractionType::AddToCart => 3.0,
            InteractionType::Purchase => 5.0,
            InteractionType::Wishlist => 2.0,
            InteractionType::RemoveCart => -1.0,
            InteractionType::Search => 0.5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Algorithm {
    CollaborativeFiltering,
    ContentBased,
    Hybrid,
    Trending,
    Personalized,
}

impl Algorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            Algorithm::CollaborativeFiltering => "collaborative_filtering",
            Algorithm::ContentBased => "content_based",
            Algorithm::Hybrid => "hybrid",
            Algorithm::Trending => "trending",
            Algorithm::Personalized => "personalized",
        }
    }

    /// An absent algorithm means hybrid; anything outside the accepted set
    /// is rejected.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "" | "hybrid" => Some(Algorithm::Hybrid),
            "collaborative_filtering" => Some(Algorithm::CollaborativeFiltering),
            "content_based" => Some(Algorithm::ContentBased),
            "trending" => Some(Algorithm::Trending),
            "personalized" => Some(Algorithm::Personalized),
            _ => None,
        }
    }
}

pub const SIMILARITY_METHOD_COSINE: &str = "cosine";

/// Clamp a requested result count into [1, MAX]; zero or negative falls
/// back to the default.
pub fn clamp_limit(requested: i64) -> i64 {
    if requested <= 0 {
        DEFAULT_RECOMMENDATIONS
    } else {
        requested.min(MAX_RECOMMENDATIONS)
    }
}

/// Same clamp for the trending surface, which allows a deeper list.
pub fn clamp_trending_limit(requested: i64) -> i64 {
    if requested <= 0 {
        DEFAULT_RECOMMENDATIONS
    } else {
        requested.min(TRENDING_MAX_PRODUCTS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interaction_weights_match_the_fixed_table() {
        assert_eq!(InteractionType::View.weight(), 1.0);
        assert_eq!(InteractionType::Wishlist.weight(), 2.0);
        assert_eq!(InteractionType::AddToCart.weight(), 3.0);
        assert_eq!(InteractionType::Purchase.weight(), 5.0);
        assert_eq!(InteractionType::RemoveCart.weight(), -1.0);
        assert_eq!(InteractionType::Search.weight(), 0.5);
    }

    #[test]
    fn interaction_type_rejects_unknown_values() {
        assert_eq!(InteractionType::parse("view"), Some(InteractionType::View));
        assert_eq!(InteractionType::parse("VIEW"), None);
        assert_eq!(InteractionType::parse("click"), None);
        assert_eq!(InteractionType::parse(""), None);
    }

    #[test]
    fn algorithm_defaults_to_hybrid_and_rejects_unknown() {
        assert_eq!(Algorithm::parse(""), Some(Algorithm::Hybrid));
        assert_eq!(Algorithm::parse("hybrid"), Some(Algorithm::Hybrid));
        assert_eq!(
            Algorithm::parse("collaborative_filtering"),
            Some(Algorithm::CollaborativeFiltering)
        );
        assert_eq!(Algorithm::parse("trending"), Some(Algorithm::Trending));
        assert_eq!(
            Algorithm::parse("personalized"),
            Some(Algorithm::Personalized)
        );
        assert_eq!(Algorithm::parse("magic"), None);
    }

    #[test]
    fn limits_clamp_into_range() {
        assert_eq!(clamp_limit(0), DEFAULT_RECOMMENDATIONS);
        assert_eq!(clamp_limit(-3), DEFAULT_RECOMMENDATIONS);
        assert_eq!(clamp_limit(1), 1);
        assert_eq!(clamp_limit(15), 15);
        assert_eq!(clamp_limit(100), MAX_RECOMMENDATIONS);

        assert_eq!(clamp_trending_limit(0), DEFAULT_RECOMMENDATIONS);
        assert_eq!(clamp_trending_limit(35), 35);
        assert_eq!(clamp_trending_limit(500), TRENDING_MAX_PRODUCTS);
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type ProductId = i64;

/// A product row as returned by the data store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductRecord {
    pub id: ProductId,
    pub name: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub price: Option<f64>,
    pub restaurant_id: Option<i64>,
    pub is_available: bool,
    pub quantity: i32,
    pub restaurant_name: Option<String>,
    pub restaurant_category: Option<String>,
}

/// Snapshot of the product fields surfaced in recommendations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductMetadata {
    pub name: String,
    pub category: String,
    pub price: f64,
    pub restaurant_id: Option<i64>,
    pub restaurant_name: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionType {
    Order,
    AddToCart,
    View,
    Rate,
}

/// One row of a user's interaction history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InteractionRecord {
    pub product_id: ProductId,
    pub quantity: i32,
    pub occurred_at: DateTime<Utc>,
    pub interaction_type: InteractionType,
}

/// Product with its order count inside a popularity window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PopularProduct {
    pub product_id: ProductId,
    #[serde(flatten)]
    pub metadata: ProductMetadata,
    pub order_count: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationType {
    Personalized,
    ColdStartPopular,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationCandidate {
    pub product_id: ProductId,
    #[serde(flatten)]
    pub metadata: ProductMetadata,
    pub similarity_score: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_score: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repeated: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub popularity_boost: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_count: Option<u64>,
    pub recommendation_type: RecommendationType,
}

impl RecommendationCandidate {
    pub fn personalized(product_id: ProductId, metadata: ProductMetadata, similarity_score: f32) -> Self {
        Self {
            product_id,
            metadata,
            similarity_score,
            final_score: None,
            repeated: None,
            popularity_boost: None,
            order_count: None,
            recommendation_type: RecommendationType::Personalized,
        }
    }

    pub fn cold_start(popular: PopularProduct) -> Self {
        Self {
            product_id: popular.product_id,
            metadata: popular.metadata,
            similarity_score: 0.0,
            final_score: None,
            repeated: None,
            popularity_boost: None,
            order_count: Some(popular.order_count),
            recommendation_type: RecommendationType::ColdStartPopular,
        }
    }

    /// Score used for ordering: the rule-adjusted score when rules ran.
    pub fn ranking_score(&self) -> f32 {
        self.final_score.unwrap_or(self.similarity_score)
    }
}

/// Width of each block of the feature space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureBreakdown {
    pub category_features: usize,
    pub restaurant_category_features: usize,
    pub text_features: usize,
    pub numeric_features: usize,
}

impl FeatureBreakdown {
    pub fn total(&self) -> usize {
        self.category_features
            + self.restaurant_category_features
            + self.text_features
            + self.numeric_features
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnginePhase {
    Uninitialized,
    Building,
    Ready,
}

/// Diagnostic counters for health reporting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineStats {
    pub phase: EnginePhase,
    pub generation: Option<uuid::Uuid>,
    pub cached_products: usize,
    pub cached_profiles: usize,
    pub vector_dimensions: usize,
    pub breakdown: Option<FeatureBreakdown>,
}

/// Descriptive statistics of a user profile vector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileSummary {
    pub username: String,
    pub vector_dimensions: usize,
    pub mean: f32,
    pub std: f32,
    pub min: f32,
    pub max: f32,
    pub non_zero_features: usize,
    pub breakdown: FeatureBreakdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InitOutcome {
    AlreadyReady,
    LoadedFromCache,
    Rebuilt,
    NoProducts,
}

impl ProductRecord {
    pub fn text(&self) -> String {
        format!(
            "{} {}",
            self.name.as_deref().unwrap_or(""),
            self.description.as_deref().unwrap_or("")
        )
    }

    pub fn metadata(&self) -> ProductMetadata {
        ProductMetadata {
            name: self.name.clone().unwrap_or_default(),
            category: self.category.clone().unwrap_or_default(),
            price: self.price.unwrap_or(0.0),
            restaurant_id: self.restaurant_id,
            restaurant_name: self.restaurant_name.clone(),
        }
    }

    pub fn is_servable(&self) -> bool {
        self.is_available && self.quantity > 0
    }
}

impl InteractionRecord {
    pub fn order(product_id: ProductId, quantity: i32, occurred_at: DateTime<Utc>) -> Self {
        Self {
            product_id,
            quantity,
            occurred_at,
            interaction_type: InteractionType::Order,
        }
    }
}

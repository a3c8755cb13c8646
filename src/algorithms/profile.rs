use crate::config::InteractionWeights;
use crate::models::*;
use nalgebra::DVector;
use std::collections::{HashMap, HashSet};

/// Weighted centroid of the products a user interacted with.
#[derive(Debug, Clone)]
pub struct AggregatedProfile {
    pub vector: Vec<f32>,
    pub interactions_used: usize,
    pub unique_products: usize,
}

pub struct ProfileBuilder {
    weights: InteractionWeights,
}

impl ProfileBuilder {
    pub fn new(weights: InteractionWeights) -> Self {
        Self { weights }
    }

    pub fn base_weight(&self, interaction_type: InteractionType) -> f32 {
        match interaction_type {
            InteractionType::Order => self.weights.order,
            InteractionType::AddToCart => self.weights.add_to_cart,
            InteractionType::View => self.weights.view,
            InteractionType::Rate => self.weights.rate,
        }
    }

    /// `sum(weight * vector) / sum(weight)` over interactions with known
    /// products. Returns `None` when no positive weight was accumulated.
    pub fn aggregate(
        &self,
        interactions: &[InteractionRecord],
        vectors: &HashMap<ProductId, Vec<f32>>,
    ) -> Option<AggregatedProfile> {
        let dimension = vectors.values().next()?.len();
        let mut profile = DVector::<f32>::zeros(dimension);
        let mut total_weight = 0.0f32;
        let mut used = 0;
        let mut products = HashSet::new();

        for interaction in interactions {
            let Some(vector) = vectors.get(&interaction.product_id) else {
                continue;
            };
            if vector.len() != dimension {
                continue;
            }

            let weight = self.base_weight(interaction.interaction_type) * interaction.quantity as f32;
            if weight <= 0.0 {
                continue;
            }

            profile.axpy(weight, &DVector::from_column_slice(vector), 1.0);
            total_weight += weight;
            used += 1;
            products.insert(interaction.product_id);
        }

        if total_weight <= 0.0 {
            return None;
        }

        profile /= total_weight;
        Some(AggregatedProfile {
            vector: profile.as_slice().to_vec(),
            interactions_used: used,
            unique_products: products.len(),
        })
    }
}

/// Descriptive statistics (population std) of a profile vector.
pub fn summarize(username: &str, vector: &[f32], breakdown: FeatureBreakdown) -> ProfileSummary {
    let n = vector.len().max(1) as f32;
    let mean = vector.iter().sum::<f32>() / n;
    let variance = vector.iter().map(|x| (x - mean).powi(2)).sum::<f32>() / n;

    ProfileSummary {
        username: username.to_string(),
        vector_dimensions: vector.len(),
        mean,
        std: variance.sqrt(),
        min: vector.iter().copied().fold(f32::INFINITY, f32::min),
        max: vector.iter().copied().fold(f32::NEG_INFINITY, f32::max),
        non_zero_features: vector.iter().filter(|x| **x != 0.0).count(),
        breakdown,
    }
}

//! Similarity ranking and business-rule re-ranking.

use super::similarity::cosine_score;
use crate::models::*;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

/// Descending by score, ascending product id on ties.
fn by_score_desc(a: (f32, ProductId), b: (f32, ProductId)) -> Ordering {
    b.0.partial_cmp(&a.0)
        .unwrap_or(Ordering::Equal)
        .then_with(|| a.1.cmp(&b.1))
}

/// Scores every product against `profile`, keeping strictly positive scores.
pub fn rank_by_similarity(
    profile: &[f32],
    vectors: &HashMap<ProductId, Vec<f32>>,
    metadata: &HashMap<ProductId, ProductMetadata>,
) -> Vec<RecommendationCandidate> {
    let mut candidates: Vec<RecommendationCandidate> = vectors
        .iter()
        .filter_map(|(id, vector)| {
            let similarity = cosine_score(profile, vector);
            if similarity <= 0.0 {
                return None;
            }
            let meta = metadata.get(id)?.clone();
            Some(RecommendationCandidate::personalized(*id, meta, similarity))
        })
        .collect();

    candidates.sort_by(|a, b| by_score_desc((a.similarity_score, a.product_id), (b.similarity_score, b.product_id)));
    candidates
}

pub fn sort_by_final_score(candidates: &mut [RecommendationCandidate]) {
    candidates.sort_by(|a, b| by_score_desc((a.ranking_score(), a.product_id), (b.ranking_score(), b.product_id)));
}

/// Repetition penalty followed by an additive popularity boost.
#[derive(Debug, Clone, Copy)]
pub struct BusinessRules {
    pub repeat_penalty: f32,
    pub max_popularity_boost: f32,
}

impl BusinessRules {
    /// Sets `final_score` to the penalized similarity for recently ordered
    /// products and to the plain similarity otherwise.
    pub fn apply_repeat_penalty(&self, candidates: &mut [RecommendationCandidate], recent: &HashSet<ProductId>) {
        for candidate in candidates.iter_mut() {
            let repeated = recent.contains(&candidate.product_id);
            candidate.repeated = Some(repeated);
            candidate.final_score = Some(if repeated {
                candidate.similarity_score * self.repeat_penalty
            } else {
                candidate.similarity_score
            });
        }
    }

    /// Boost in [0, max_popularity_boost] proportional to the order count
    /// normalized by the busiest product.
    pub fn popularity_boost(&self, order_count: u64, max_count: u64) -> f32 {
        let denominator = max_count.max(1) as f32;
        (order_count as f32 / denominator).min(1.0) * self.max_popularity_boost
    }

    pub fn apply_popularity_boost(&self, candidates: &mut [RecommendationCandidate], counts: &HashMap<ProductId, u64>) {
        let max_count = counts.values().copied().max().unwrap_or(1);
        for candidate in candidates.iter_mut() {
            let boost = self.popularity_boost(counts.get(&candidate.product_id).copied().unwrap_or(0), max_count);
            candidate.final_score = Some(candidate.ranking_score() + boost);
            candidate.popularity_boost = Some(boost);
        }
    }

    pub fn apply(
        &self,
        candidates: &mut [RecommendationCandidate],
        recent: &HashSet<ProductId>,
        counts: &HashMap<ProductId, u64>,
    ) {
        self.apply_repeat_penalty(candidates, recent);
        self.apply_popularity_boost(candidates, counts);
        sort_by_final_score(candidates);
    }
}

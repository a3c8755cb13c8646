use crate::models::ProductId;
use nalgebra::DVector;
use std::collections::HashMap;

/// Cosine similarity clamped into [0, 1]. Zero or mismatched vectors score 0.
pub fn cosine_score(profile: &[f32], product: &[f32]) -> f32 {
    if profile.len() != product.len() || profile.is_empty() {
        return 0.0;
    }

    let a = DVector::from_column_slice(profile);
    let b = DVector::from_column_slice(product);
    let norm_a = a.norm();
    let norm_b = b.norm();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    let similarity = a.dot(&b) / (norm_a * norm_b);
    if similarity.is_nan() {
        0.0
    } else {
        similarity.clamp(0.0, 1.0)
    }
}

/// Similarity between a profile and a cached product; unknown ids score 0.
pub fn product_similarity(
    profile: &[f32],
    vectors: &HashMap<ProductId, Vec<f32>>,
    product_id: ProductId,
) -> f32 {
    vectors
        .get(&product_id)
        .map(|vector| cosine_score(profile, vector))
        .unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_vectors_score_one() {
        let v = vec![1.0, 0.0, 0.3, 0.5];
        assert!((cosine_score(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn orthogonal_and_negative_are_zero() {
        assert_eq!(cosine_score(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
        assert_eq!(cosine_score(&[1.0, 0.0], &[-1.0, 0.0]), 0.0);
    }

    #[test]
    fn degenerate_inputs_score_zero() {
        assert_eq!(cosine_score(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
        assert_eq!(cosine_score(&[1.0], &[1.0, 1.0]), 0.0);
    }

    #[test]
    fn unknown_product_scores_zero() {
        let mut vectors = HashMap::new();
        vectors.insert(1, vec![1.0, 1.0]);
        assert!(product_similarity(&[1.0, 1.0], &vectors, 1) > 0.99);
        assert_eq!(product_similarity(&[1.0, 1.0], &vectors, 2), 0.0);
    }
}

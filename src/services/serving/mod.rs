use crate::config::Config;
use crate::error::{EngineError, EngineResult};
use crate::models::*;
use crate::services::recommendation::RecommendationEngine;
use crate::utils::validation::{validate_limit, validate_username};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimilarityReport {
    pub product_id: ProductId,
    pub username: String,
    pub similarity_score: f32,
    pub product_info: Option<ProductMetadata>,
}

/// Request-facing wrapper around the engine: input validation, lazy
/// initialization and request counters.
pub struct ServingService {
    engine: Arc<RecommendationEngine>,
    config: Arc<Config>,
    serving_stats: Arc<DashMap<String, u64>>,
}

impl ServingService {
    pub fn new(engine: Arc<RecommendationEngine>, config: Arc<Config>) -> Self {
        Self {
            engine,
            config,
            serving_stats: Arc::new(DashMap::new()),
        }
    }

    fn limit(&self, n: Option<usize>) -> EngineResult<usize> {
        let settings = &self.config.recommendation;
        validate_limit(n.unwrap_or(settings.default_results), settings.max_results)
    }

    pub async fn serve_recommendations(
        &self,
        username: &str,
        n: Option<usize>,
        apply_rules: bool,
    ) -> EngineResult<Vec<RecommendationCandidate>> {
        self.increment_stat("total_requests");
        let username = validate_username(username)?;
        let n = self.limit(n)?;

        let start_time = std::time::Instant::now();
        self.engine.ensure_initialized().await?;
        let result = self.engine.get_recommendations(username, n, apply_rules).await;
        let latency = start_time.elapsed().as_millis() as u64;
        self.update_latency_stat(latency);

        match &result {
            Ok(recommendations) => {
                self.increment_stat("successful_requests");
                info!(username, count = recommendations.len(), latency_ms = latency, "Served recommendations");
            }
            Err(e) => {
                self.increment_stat("failed_requests");
                error!(username, error = %e, "Failed to get recommendations");
            }
        }
        result
    }

    pub async fn serve_cold_start(
        &self,
        n: Option<usize>,
        category: Option<&str>,
    ) -> EngineResult<Vec<RecommendationCandidate>> {
        self.increment_stat("cold_start_requests");
        let n = self.limit(n)?;
        let category = category.map(str::trim).filter(|c| !c.is_empty());
        self.engine.cold_start_recommendations(n, category).await
    }

    pub async fn user_vector_info(&self, username: &str) -> EngineResult<Option<ProfileSummary>> {
        let username = validate_username(username)?;
        self.engine.ensure_initialized().await?;
        self.engine.profile_summary(username).await
    }

    pub async fn product_similarity(&self, product_id: ProductId, username: &str) -> EngineResult<SimilarityReport> {
        let username = validate_username(username)?;
        self.engine.ensure_initialized().await?;

        let (similarity_score, product_info) = self
            .engine
            .similarity_for_user(username, product_id)
            .await?
            .ok_or_else(|| EngineError::Validation("User has no order history".to_string()))?;

        Ok(SimilarityReport {
            product_id,
            username: username.to_string(),
            similarity_score,
            product_info,
        })
    }

    pub async fn rebuild(&self) -> EngineResult<EngineStats> {
        self.increment_stat("rebuilds");
        let outcome = self.engine.initialize(true).await?;
        info!(?outcome, "Cache rebuild finished");
        Ok(self.engine.stats())
    }

    pub fn health(&self) -> EngineStats {
        self.engine.stats()
    }

    pub fn get_serving_stats(&self) -> HashMap<String, u64> {
        self.serving_stats.iter().map(|entry| (entry.key().clone(), *entry.value())).collect()
    }

    fn increment_stat(&self, key: &str) {
        let mut counter = self.serving_stats.entry(key.to_string()).or_insert(0);
        *counter += 1;
    }

    fn update_latency_stat(&self, latency_ms: u64) {
        let current_avg = self.serving_stats.get("avg_latency_ms").map(|v| *v).unwrap_or(0);
        let request_count = self.serving_stats.get("total_requests").map(|v| *v).unwrap_or(1).max(1);

        let new_avg = (current_avg * (request_count - 1) + latency_ms) / request_count;
        self.serving_stats.insert("avg_latency_ms".to_string(), new_avg);

        let current_max = self.serving_stats.get("max_latency_ms").map(|v| *v).unwrap_or(0);
        if latency_ms > current_max {
            self.serving_stats.insert("max_latency_ms".to_string(), latency_ms);
        }
    }
}

use chrono::{DateTime, Duration, Utc};
use menurec::*;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio_test::{assert_err, assert_ok};

/// Wraps the in-memory store to count product fetches, inject failures and
/// slow down selected queries.
#[derive(Default)]
struct ScriptedStore {
    inner: InMemoryStore,
    fail: AtomicBool,
    product_fetches: AtomicUsize,
    product_delay_ms: AtomicU64,
    interaction_delay_ms: AtomicU64,
}

async fn pause(delay_ms: &AtomicU64) {
    let ms = delay_ms.load(Ordering::SeqCst);
    if ms > 0 {
        tokio::time::sleep(std::time::Duration::from_millis(ms)).await;
    }
}

#[async_trait::async_trait]
impl InteractionStore for ScriptedStore {
    async fn available_products(&self) -> anyhow::Result<Vec<ProductRecord>> {
        self.product_fetches.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        pause(&self.product_delay_ms).await;
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("connection refused");
        }
        self.inner.available_products().await
    }

    async fn user_interactions(
        &self,
        username: &str,
        since: Option<DateTime<Utc>>,
    ) -> anyhow::Result<Vec<InteractionRecord>> {
        pause(&self.interaction_delay_ms).await;
        self.inner.user_interactions(username, since).await
    }

    async fn recently_ordered(&self, username: &str, since: DateTime<Utc>) -> anyhow::Result<HashSet<ProductId>> {
        self.inner.recently_ordered(username, since).await
    }

    async fn order_counts(&self, since: DateTime<Utc>) -> anyhow::Result<HashMap<ProductId, u64>> {
        self.inner.order_counts(since).await
    }

    async fn popular_products(
        &self,
        since: DateTime<Utc>,
        category: Option<&str>,
        limit: usize,
    ) -> anyhow::Result<Vec<PopularProduct>> {
        self.inner.popular_products(since, category, limit).await
    }
}

fn product(id: ProductId, name: &str, category: &str, price: f64) -> ProductRecord {
    ProductRecord {
        id,
        name: Some(name.to_string()),
        description: None,
        category: Some(category.to_string()),
        price: Some(price),
        restaurant_id: Some(1),
        is_available: true,
        quantity: 10,
        restaurant_name: Some("Mama's".to_string()),
        restaurant_category: None,
    }
}

fn test_config() -> (Config, PathBuf) {
    let dir = std::env::temp_dir().join(format!("menurec-it-{}", uuid::Uuid::new_v4()));
    let mut config = Config::default();
    config.cache.directory = dir.clone();
    (config, dir)
}

fn days_back(days: i64) -> DateTime<Utc> {
    Utc::now() - Duration::days(days)
}

/// A: pizza 10, B: pizza 12, C: sushi 30.
fn seeded_store() -> Arc<ScriptedStore> {
    let store = Arc::new(ScriptedStore::default());
    store.inner.upsert_product(product(1, "A", "pizza", 10.0));
    store.inner.upsert_product(product(2, "B", "pizza", 12.0));
    store.inner.upsert_product(product(3, "C", "sushi", 30.0));
    store
}

fn engine_for(store: Arc<ScriptedStore>, config: &Config) -> RecommendationEngine {
    RecommendationEngine::new(store, Arc::new(config.clone()))
}

fn position(list: &[RecommendationCandidate], id: ProductId) -> usize {
    list.iter().position(|c| c.product_id == id).expect("product missing from ranking")
}

#[tokio::test]
async fn same_category_outranks_other_category() {
    let (config, dir) = test_config();
    let store = seeded_store();
    store.inner.record_order("ana", 1, 1, days_back(40));
    store.inner.record_order("ana", 1, 1, days_back(45));

    let engine = engine_for(store, &config);
    assert_eq!(assert_ok!(engine.initialize(false).await), InitOutcome::Rebuilt);

    let stats = engine.stats();
    assert_eq!(stats.phase, EnginePhase::Ready);
    // 2 categories + 1 restaurant category + empty vocabulary + price
    assert_eq!(stats.vector_dimensions, 4);

    let ranked = assert_ok!(engine.get_recommendations("ana", 10, false).await);
    assert!(position(&ranked, 2) < position(&ranked, 3));
    assert_eq!(ranked[0].product_id, 1);
    assert!((ranked[0].similarity_score - 1.0).abs() < 1e-5);
    assert!(ranked.iter().all(|c| c.final_score.is_none()));

    std::fs::remove_dir_all(dir).ok();
}

#[tokio::test]
async fn calls_before_initialization_are_not_ready() {
    let (config, _dir) = test_config();
    let engine = engine_for(seeded_store(), &config);

    assert_eq!(engine.phase(), EnginePhase::Uninitialized);
    assert!(matches!(
        assert_err!(engine.get_recommendations("ana", 5, true).await),
        EngineError::NotReady
    ));
    assert!(matches!(assert_err!(engine.build_user_profile("ana", true).await), EngineError::NotReady));
    assert!(matches!(assert_err!(engine.calculate_similarity(&[1.0], 1)), EngineError::NotReady));
}

#[tokio::test]
async fn user_without_history_has_no_profile() {
    let (config, dir) = test_config();
    let store = seeded_store();
    store.inner.record_order("bob", 99, 3, days_back(1));

    let engine = engine_for(store, &config);
    assert_ok!(engine.initialize(false).await);

    assert!(assert_ok!(engine.build_user_profile("ghost", true).await).is_none());
    assert!(assert_ok!(engine.get_recommendations("ghost", 10, true).await).is_empty());
    // only unknown products in history
    assert!(assert_ok!(engine.build_user_profile("bob", true).await).is_none());
    assert_eq!(engine.stats().cached_profiles, 0);

    std::fs::remove_dir_all(dir).ok();
}

#[tokio::test]
async fn similarity_of_unknown_product_is_zero() {
    let (config, dir) = test_config();
    let store = seeded_store();
    store.inner.record_order("ana", 2, 1, days_back(3));

    let engine = engine_for(store, &config);
    assert_ok!(engine.initialize(false).await);

    let profile = assert_ok!(engine.build_user_profile("ana", true).await).unwrap();
    assert!((assert_ok!(engine.calculate_similarity(&profile, 2)) - 1.0).abs() < 1e-5);
    assert_eq!(assert_ok!(engine.calculate_similarity(&profile, 404)), 0.0);

    std::fs::remove_dir_all(dir).ok();
}

#[tokio::test]
async fn business_rules_penalize_repeats_and_boost_popular() {
    let (config, dir) = test_config();
    let store = seeded_store();
    // ana reordered A recently; B is the busiest product overall
    store.inner.record_order("ana", 1, 2, days_back(2));
    for user in ["u1", "u2", "u3", "u4"] {
        store.inner.record_order(user, 2, 1, days_back(5));
    }

    let engine = engine_for(store, &config);
    assert_ok!(engine.initialize(false).await);

    let plain = assert_ok!(engine.get_recommendations("ana", 10, false).await);
    let ruled = assert_ok!(engine.get_recommendations("ana", 10, true).await);

    let similarity = |id| plain.iter().find(|c| c.product_id == id).unwrap().similarity_score;
    let a = ruled.iter().find(|c| c.product_id == 1).unwrap();
    let b = ruled.iter().find(|c| c.product_id == 2).unwrap();

    assert_eq!(a.repeated, Some(true));
    assert!((a.popularity_boost.unwrap() - 0.05).abs() < 1e-6);
    assert!((a.final_score.unwrap() - (similarity(1) * 0.7 + 0.05)).abs() < 1e-5);

    assert_eq!(b.repeated, Some(false));
    assert!((b.popularity_boost.unwrap() - 0.2).abs() < 1e-6);
    assert!((b.final_score.unwrap() - (similarity(2) + 0.2)).abs() < 1e-5);

    assert_eq!(ruled[0].product_id, 2);
    let again = assert_ok!(engine.get_recommendations("ana", 10, true).await);
    assert_eq!(again, ruled);

    std::fs::remove_dir_all(dir).ok();
}

#[tokio::test]
async fn results_are_truncated_to_n() {
    let (config, dir) = test_config();
    let store = seeded_store();
    store.inner.record_order("ana", 1, 1, days_back(1));

    let engine = engine_for(store, &config);
    assert_ok!(engine.initialize(false).await);
    assert_eq!(assert_ok!(engine.get_recommendations("ana", 1, true).await).len(), 1);

    std::fs::remove_dir_all(dir).ok();
}

#[tokio::test]
async fn cold_start_ranks_by_recent_orders_and_filters_category() {
    let (config, _dir) = test_config();
    let store = seeded_store();
    for (user, product_id) in [("u1", 3), ("u2", 3), ("u3", 3), ("u1", 1), ("u2", 1), ("u1", 2)] {
        store.inner.record_order(user, product_id, 1, days_back(3));
    }
    // outside the 30 day window
    for _ in 0..10 {
        store.inner.record_order("old", 2, 1, days_back(60));
    }

    let engine = engine_for(store, &config);

    let all = assert_ok!(engine.cold_start_recommendations(10, None).await);
    let ids: Vec<_> = all.iter().map(|c| c.product_id).collect();
    assert_eq!(ids, vec![3, 1, 2]);
    assert_eq!(all[0].order_count, Some(3));
    assert!(all.iter().all(|c| c.recommendation_type == RecommendationType::ColdStartPopular));

    let pizza = assert_ok!(engine.cold_start_recommendations(10, Some("pizza")).await);
    let ids: Vec<_> = pizza.iter().map(|c| c.product_id).collect();
    assert_eq!(ids, vec![1, 2]);
    assert_eq!(engine.phase(), EnginePhase::Uninitialized);
}

#[tokio::test]
async fn cache_round_trip_restores_generation_and_profiles() {
    let (config, dir) = test_config();
    let store = seeded_store();
    store.inner.record_order("ana", 1, 2, days_back(10));

    let first = engine_for(store.clone(), &config);
    assert_ok!(first.initialize(false).await);
    let profile = assert_ok!(first.build_user_profile("ana", true).await).unwrap();
    assert_ok!(first.persist());
    let before = first.stats();

    let second = engine_for(store.clone(), &config);
    assert_eq!(assert_ok!(second.initialize(false).await), InitOutcome::LoadedFromCache);
    let after = second.stats();
    assert_eq!(after.generation, before.generation);
    assert_eq!(after.vector_dimensions, before.vector_dimensions);
    assert_eq!(after.cached_profiles, 1);
    assert_eq!(store.product_fetches.load(Ordering::SeqCst), 1);

    let restored = assert_ok!(second.build_user_profile("ana", true).await).unwrap();
    assert_eq!(restored, profile);

    std::fs::remove_dir_all(dir).ok();
}

#[tokio::test]
async fn concurrent_first_requests_build_once() {
    let (config, dir) = test_config();
    let store = seeded_store();
    let engine = Arc::new(engine_for(store.clone(), &config));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let engine = engine.clone();
            tokio::spawn(async move { engine.ensure_initialized().await })
        })
        .collect();
    for handle in handles {
        assert_ok!(handle.await.unwrap());
    }

    assert_eq!(store.product_fetches.load(Ordering::SeqCst), 1);
    assert_eq!(engine.phase(), EnginePhase::Ready);

    std::fs::remove_dir_all(dir).ok();
}

#[tokio::test]
async fn failed_rebuild_keeps_previous_generation() {
    let (config, dir) = test_config();
    let store = seeded_store();
    let engine = engine_for(store.clone(), &config);
    assert_ok!(engine.initialize(false).await);
    let before = engine.stats();

    store.fail.store(true, Ordering::SeqCst);
    assert!(matches!(assert_err!(engine.initialize(true).await), EngineError::Store(_)));

    let after = engine.stats();
    assert_eq!(after.phase, EnginePhase::Ready);
    assert_eq!(after.generation, before.generation);
    assert_eq!(after.cached_products, 3);

    std::fs::remove_dir_all(dir).ok();
}

#[tokio::test]
async fn empty_catalog_stays_uninitialized() {
    let (config, _dir) = test_config();
    let engine = engine_for(Arc::new(ScriptedStore::default()), &config);

    assert_eq!(assert_ok!(engine.initialize(true).await), InitOutcome::NoProducts);
    assert_eq!(engine.phase(), EnginePhase::Uninitialized);
    assert!(matches!(assert_err!(engine.ensure_initialized().await), EngineError::NotReady));
}

#[tokio::test]
async fn cached_profile_is_stale_until_cleared() {
    let (config, dir) = test_config();
    let store = seeded_store();
    store.inner.record_order("ana", 1, 1, days_back(50));

    let engine = engine_for(store.clone(), &config);
    assert_ok!(engine.initialize(false).await);
    let original = assert_ok!(engine.build_user_profile("ana", true).await).unwrap();

    store.inner.record_order("ana", 3, 5, days_back(0));
    let cached = assert_ok!(engine.build_user_profile("ana", true).await).unwrap();
    assert_eq!(cached, original);

    assert_eq!(engine.clear_profile_cache(), 1);
    let fresh = assert_ok!(engine.build_user_profile("ana", true).await).unwrap();
    assert_ne!(fresh, original);

    std::fs::remove_dir_all(dir).ok();
}

#[tokio::test]
async fn forced_rebuild_starts_a_new_generation() {
    let (config, dir) = test_config();
    let store = seeded_store();
    store.inner.record_order("ana", 1, 1, days_back(1));

    let engine = engine_for(store.clone(), &config);
    assert_ok!(engine.initialize(false).await);
    assert_ok!(engine.build_user_profile("ana", true).await);
    let before = engine.stats();

    store.inner.upsert_product(product(4, "D", "burger", 8.0));
    assert_eq!(assert_ok!(engine.initialize(true).await), InitOutcome::Rebuilt);
    let after = engine.stats();

    assert_ne!(after.generation, before.generation);
    assert_eq!(after.cached_products, 4);
    assert_eq!(after.cached_profiles, 0);
    assert_eq!(after.vector_dimensions, before.vector_dimensions + 1);

    assert_eq!(assert_ok!(engine.initialize(false).await), InitOutcome::AlreadyReady);

    std::fs::remove_dir_all(dir).ok();
}

#[tokio::test]
async fn unavailable_products_are_not_encoded() {
    let (config, dir) = test_config();
    let store = seeded_store();
    let mut sold_out = product(5, "E", "pizza", 9.0);
    sold_out.quantity = 0;
    store.inner.upsert_product(sold_out);

    let engine = engine_for(store, &config);
    assert_ok!(engine.initialize(false).await);
    assert_eq!(engine.stats().cached_products, 3);
    assert!(assert_ok!(engine.product_metadata(5)).is_none());

    std::fs::remove_dir_all(dir).ok();
}

#[tokio::test]
async fn similarity_request_spanning_a_rebuild_uses_one_generation() {
    let (config, dir) = test_config();
    let store = seeded_store();
    store.inner.record_order("ana", 1, 1, days_back(2));

    let state = AppState::with_store(config, store.clone());
    assert_ok!(state.engine.initialize(false).await);
    let before = state.engine.stats();

    store.interaction_delay_ms.store(300, Ordering::SeqCst);
    let serving = state.serving.clone();
    let in_flight = tokio::spawn(async move { serving.product_similarity(1, "ana").await });

    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    store.inner.upsert_product(product(4, "D", "burger", 8.0));
    assert_eq!(assert_ok!(state.engine.initialize(true).await), InitOutcome::Rebuilt);
    assert_eq!(state.engine.stats().vector_dimensions, before.vector_dimensions + 1);

    let report = assert_ok!(in_flight.await.unwrap());
    assert!((report.similarity_score - 1.0).abs() < 1e-5, "got {}", report.similarity_score);
    assert_eq!(report.product_info.map(|info| info.name), Some("A".to_string()));

    std::fs::remove_dir_all(dir).ok();
}

#[tokio::test]
async fn recommendations_spanning_a_rebuild_rank_the_old_catalog() {
    let (config, dir) = test_config();
    let store = seeded_store();
    store.inner.record_order("ana", 1, 1, days_back(2));

    let state = AppState::with_store(config, store.clone());
    assert_ok!(state.engine.initialize(false).await);

    store.interaction_delay_ms.store(300, Ordering::SeqCst);
    let serving = state.serving.clone();
    let in_flight = tokio::spawn(async move { serving.serve_recommendations("ana", None, false).await });

    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    store.inner.upsert_product(product(4, "D", "burger", 8.0));
    assert_ok!(state.engine.initialize(true).await);

    let ranked = assert_ok!(in_flight.await.unwrap());
    let ids: HashSet<_> = ranked.iter().map(|c| c.product_id).collect();
    assert_eq!(ids, HashSet::from([1, 2, 3]));
    assert_eq!(ranked[0].product_id, 1);
    assert!((ranked[0].similarity_score - 1.0).abs() < 1e-5);

    std::fs::remove_dir_all(dir).ok();
}

#[tokio::test]
async fn concurrent_profiles_for_different_users_are_all_cached() {
    let (config, dir) = test_config();
    let store = seeded_store();
    let users: Vec<String> = (0..16).map(|i| format!("user{}", i)).collect();
    for (i, user) in users.iter().enumerate() {
        store.inner.record_order(user, 1 + (i as ProductId % 3), 1, days_back(4));
    }

    let engine = Arc::new(engine_for(store, &config));
    assert_ok!(engine.initialize(false).await);

    let handles: Vec<_> = users
        .iter()
        .cloned()
        .map(|user| {
            let engine = engine.clone();
            tokio::spawn(async move { engine.build_user_profile(&user, true).await })
        })
        .collect();
    for handle in handles {
        assert!(assert_ok!(handle.await.unwrap()).is_some());
    }

    assert_eq!(engine.stats().cached_profiles, users.len());

    std::fs::remove_dir_all(dir).ok();
}

#[tokio::test]
async fn abandoned_rebuild_restores_previous_generation() {
    let (config, dir) = test_config();
    let store = seeded_store();
    let engine = engine_for(store.clone(), &config);
    assert_ok!(engine.initialize(false).await);
    let before = engine.stats();

    store.product_delay_ms.store(500, Ordering::SeqCst);
    let abandoned = tokio::time::timeout(std::time::Duration::from_millis(50), engine.initialize(true)).await;
    assert!(abandoned.is_err());

    let after = engine.stats();
    assert_eq!(after.phase, EnginePhase::Ready);
    assert_eq!(after.generation, before.generation);

    std::fs::remove_dir_all(dir).ok();
}

#[tokio::test]
async fn abandoned_first_build_returns_to_uninitialized() {
    let (config, dir) = test_config();
    let store = seeded_store();
    store.product_delay_ms.store(500, Ordering::SeqCst);
    let engine = engine_for(store.clone(), &config);

    let abandoned = tokio::time::timeout(std::time::Duration::from_millis(50), engine.initialize(false)).await;
    assert!(abandoned.is_err());
    assert_eq!(engine.phase(), EnginePhase::Uninitialized);

    store.product_delay_ms.store(0, Ordering::SeqCst);
    assert_eq!(assert_ok!(engine.initialize(false).await), InitOutcome::Rebuilt);

    std::fs::remove_dir_all(dir).ok();
}

#[tokio::test]
async fn removed_product_drops_out_after_rebuild() {
    let (config, dir) = test_config();
    let store = seeded_store();
    store.inner.record_order("ana", 1, 1, days_back(6));
    store.inner.record_order("ana", 3, 1, days_back(6));

    let engine = engine_for(store.clone(), &config);
    assert_ok!(engine.initialize(false).await);
    let mixed = assert_ok!(engine.build_user_profile("ana", false).await).unwrap();
    assert!(assert_ok!(engine.calculate_similarity(&mixed, 1)) < 1.0 - 1e-3);

    store.inner.remove_product(3);
    assert_ok!(engine.initialize(true).await);
    assert_eq!(engine.stats().cached_products, 2);
    assert!(assert_ok!(engine.product_metadata(3)).is_none());

    let profile = assert_ok!(engine.build_user_profile("ana", false).await).unwrap();
    assert!((assert_ok!(engine.calculate_similarity(&profile, 1)) - 1.0).abs() < 1e-5);

    std::fs::remove_dir_all(dir).ok();
}

use crate::algorithms::profile::summarize;
use crate::algorithms::{
    product_similarity, rank_by_similarity, BusinessRules, EncodedCatalog, FeatureEncoder, FeatureSpace, ProfileBuilder,
};
use crate::config::Config;
use crate::error::{EngineError, EngineResult};
use crate::models::*;
use crate::services::store::InteractionStore;
use crate::services::vector_cache::{Snapshot, VectorCacheStore};
use crate::utils::days_ago;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task;
use tracing::{debug, info, warn};

/// One build of the feature space with everything derived from it.
///
/// Profiles live inside the generation so a rebuild drops them together
/// with the vectors they were computed against.
pub struct Generation {
    pub space: FeatureSpace,
    pub vectors: HashMap<ProductId, Vec<f32>>,
    pub metadata: HashMap<ProductId, ProductMetadata>,
    profiles: DashMap<String, Arc<Vec<f32>>>,
}

impl Generation {
    fn from_catalog(catalog: EncodedCatalog) -> Self {
        Self {
            space: catalog.space,
            vectors: catalog.vectors,
            metadata: catalog.metadata,
            profiles: DashMap::new(),
        }
    }

    fn from_snapshot(snapshot: Snapshot) -> Self {
        let profiles = snapshot
            .profiles
            .into_iter()
            .map(|(user, vector)| (user, Arc::new(vector)))
            .collect();
        Self {
            space: snapshot.space,
            vectors: snapshot.vectors,
            metadata: snapshot.metadata,
            profiles,
        }
    }

    fn snapshot(&self) -> Snapshot {
        Snapshot {
            space: self.space.clone(),
            vectors: self.vectors.clone(),
            metadata: self.metadata.clone(),
            profiles: self
                .profiles
                .iter()
                .map(|entry| (entry.key().clone(), entry.value().as_ref().clone()))
                .collect(),
        }
    }

    pub fn cached_profiles(&self) -> usize {
        self.profiles.len()
    }
}

enum EngineState {
    Uninitialized,
    /// A build is running; the previous generation, if any, keeps serving.
    Building(Option<Arc<Generation>>),
    Ready(Arc<Generation>),
}

/// Owns the `Building` state of one build. Unless the build publishes, the
/// previous state is put back on drop, including when the caller abandons
/// the future mid-build.
struct BuildGuard<'a> {
    state: &'a RwLock<EngineState>,
    previous: Option<Option<Arc<Generation>>>,
}

impl<'a> BuildGuard<'a> {
    fn begin(state: &'a RwLock<EngineState>, previous: Option<Arc<Generation>>) -> Self {
        *state.write() = EngineState::Building(previous.clone());
        Self {
            state,
            previous: Some(previous),
        }
    }

    fn publish(mut self, generation: Arc<Generation>) {
        self.previous = None;
        *self.state.write() = EngineState::Ready(generation);
    }
}

impl Drop for BuildGuard<'_> {
    fn drop(&mut self) {
        if let Some(previous) = self.previous.take() {
            *self.state.write() = match previous {
                Some(generation) => EngineState::Ready(generation),
                None => EngineState::Uninitialized,
            };
        }
    }
}

/// Content-based recommendation engine.
///
/// Cached user profiles are not invalidated when new orders arrive; they
/// are refreshed on rebuild, on `clear_profile_cache` or when a caller asks
/// for a fresh profile.
pub struct RecommendationEngine {
    store: Arc<dyn InteractionStore>,
    cache: VectorCacheStore,
    encoder: FeatureEncoder,
    profile_builder: ProfileBuilder,
    rules: BusinessRules,
    config: Arc<Config>,
    state: RwLock<EngineState>,
    build_lock: Mutex<()>,
}

impl RecommendationEngine {
    pub fn new(store: Arc<dyn InteractionStore>, config: Arc<Config>) -> Self {
        let rules = BusinessRules {
            repeat_penalty: config.recommendation.repeat_penalty,
            max_popularity_boost: config.recommendation.popularity_boost,
        };

        Self {
            store,
            cache: VectorCacheStore::new(config.cache.directory.clone(), config.features.clone()),
            encoder: FeatureEncoder::new(config.features.clone()),
            profile_builder: ProfileBuilder::new(config.recommendation.weights.clone()),
            rules,
            config,
            state: RwLock::new(EngineState::Uninitialized),
            build_lock: Mutex::new(()),
        }
    }

    pub fn phase(&self) -> EnginePhase {
        match &*self.state.read() {
            EngineState::Uninitialized => EnginePhase::Uninitialized,
            EngineState::Building(_) => EnginePhase::Building,
            EngineState::Ready(_) => EnginePhase::Ready,
        }
    }

    /// The generation currently being served.
    pub fn generation(&self) -> EngineResult<Arc<Generation>> {
        match &*self.state.read() {
            EngineState::Ready(generation) | EngineState::Building(Some(generation)) => Ok(generation.clone()),
            _ => Err(EngineError::NotReady),
        }
    }

    /// Lazily initializes on first use; concurrent callers wait for the one
    /// build in flight.
    pub async fn ensure_initialized(&self) -> EngineResult<()> {
        if self.generation().is_ok() {
            return Ok(());
        }
        match self.initialize(false).await? {
            InitOutcome::NoProducts if self.generation().is_err() => Err(EngineError::NotReady),
            _ => Ok(()),
        }
    }

    /// Loads the cached generation or rebuilds from the data store.
    ///
    /// A failed, empty or abandoned rebuild leaves the previous generation
    /// serving. Cache IO and the encoder fit run on the blocking pool.
    pub async fn initialize(&self, force_rebuild: bool) -> EngineResult<InitOutcome> {
        let _lock = self.build_lock.lock().await;

        let previous = match &*self.state.read() {
            EngineState::Ready(_) if !force_rebuild => return Ok(InitOutcome::AlreadyReady),
            EngineState::Ready(generation) => Some(generation.clone()),
            EngineState::Building(previous) => previous.clone(),
            EngineState::Uninitialized => None,
        };
        let build = BuildGuard::begin(&self.state, previous);

        if !force_rebuild {
            let cache = self.cache.clone();
            if let Some(snapshot) = task::spawn_blocking(move || cache.load()).await? {
                build.publish(Arc::new(Generation::from_snapshot(snapshot)));
                info!("Using cached vectors");
                return Ok(InitOutcome::LoadedFromCache);
            }
        }

        info!(force_rebuild, "Building vectors from data store");
        let products = self.store.available_products().await.map_err(EngineError::store)?;
        let products: Vec<ProductRecord> = products.into_iter().filter(ProductRecord::is_servable).collect();

        let encoder = self.encoder.clone();
        let Some(catalog) = task::spawn_blocking(move || encoder.fit(&products)).await? else {
            warn!("No products found in data store");
            return Ok(InitOutcome::NoProducts);
        };

        let generation = Arc::new(Generation::from_catalog(catalog));
        build.publish(generation.clone());

        let cache = self.cache.clone();
        let saved = task::spawn_blocking(move || cache.save(&generation.snapshot())).await;
        if let Err(e) = saved.map_err(EngineError::from).and_then(|result| result) {
            warn!(error = %e, "Failed to save vector cache");
        }
        Ok(InitOutcome::Rebuilt)
    }

    async fn profile_for(
        &self,
        generation: &Generation,
        username: &str,
        use_cache: bool,
    ) -> EngineResult<Option<Arc<Vec<f32>>>> {
        if use_cache {
            if let Some(profile) = generation.profiles.get(username) {
                debug!(username, "Profile cache hit");
                return Ok(Some(profile.clone()));
            }
        }

        let interactions = self
            .store
            .user_interactions(username, None)
            .await
            .map_err(EngineError::store)?;
        if interactions.is_empty() {
            info!(username, "No interactions found");
            return Ok(None);
        }

        let Some(aggregated) = self.profile_builder.aggregate(&interactions, &generation.vectors) else {
            info!(username, interactions = interactions.len(), "No known products in history");
            return Ok(None);
        };

        info!(
            username,
            orders = interactions.len(),
            used = aggregated.interactions_used,
            unique_products = aggregated.unique_products,
            dimensions = aggregated.vector.len(),
            "Built user profile"
        );

        let profile = Arc::new(aggregated.vector);
        generation.profiles.insert(username.to_string(), profile.clone());
        Ok(Some(profile))
    }

    /// User profile vector, or `None` when no usable history exists.
    pub async fn build_user_profile(&self, username: &str, use_cache: bool) -> EngineResult<Option<Vec<f32>>> {
        let generation = self.generation()?;
        let profile = self.profile_for(&generation, username, use_cache).await?;
        Ok(profile.map(|p| p.as_ref().clone()))
    }

    pub fn calculate_similarity(&self, profile: &[f32], product_id: ProductId) -> EngineResult<f32> {
        let generation = self.generation()?;
        Ok(product_similarity(profile, &generation.vectors, product_id))
    }

    /// Scores `product_id` against the user's profile and returns its
    /// metadata, all from the one generation serving when the call began.
    /// `None` when the user has no usable history.
    pub async fn similarity_for_user(
        &self,
        username: &str,
        product_id: ProductId,
    ) -> EngineResult<Option<(f32, Option<ProductMetadata>)>> {
        let generation = self.generation()?;
        let Some(profile) = self.profile_for(&generation, username, true).await? else {
            return Ok(None);
        };

        let score = product_similarity(&profile, &generation.vectors, product_id);
        Ok(Some((score, generation.metadata.get(&product_id).cloned())))
    }

    pub async fn get_recommendations(
        &self,
        username: &str,
        n: usize,
        apply_rules: bool,
    ) -> EngineResult<Vec<RecommendationCandidate>> {
        let generation = self.generation()?;

        let Some(profile) = self.profile_for(&generation, username, true).await? else {
            return Ok(Vec::new());
        };

        let mut candidates = rank_by_similarity(&profile, &generation.vectors, &generation.metadata);
        debug!(username, candidates = candidates.len(), "Scored products");

        if apply_rules {
            let settings = &self.config.recommendation;
            let recent = self
                .store
                .recently_ordered(username, days_ago(settings.repeat_window_days))
                .await
                .map_err(EngineError::store)?;
            let counts = self
                .store
                .order_counts(days_ago(settings.popularity_window_days))
                .await
                .map_err(EngineError::store)?;
            self.rules.apply(&mut candidates, &recent, &counts);
            debug!(username, recent = recent.len(), "Business rules applied");
        }

        candidates.truncate(n);
        Ok(candidates)
    }

    /// Most ordered products in the cold-start window; needs no vectors.
    pub async fn cold_start_recommendations(
        &self,
        n: usize,
        category: Option<&str>,
    ) -> EngineResult<Vec<RecommendationCandidate>> {
        let popular = self
            .store
            .popular_products(days_ago(self.config.recommendation.cold_start_window_days), category, n)
            .await
            .map_err(EngineError::store)?;
        info!(count = popular.len(), category, "Generated cold-start recommendations");
        Ok(popular.into_iter().map(RecommendationCandidate::cold_start).collect())
    }

    /// Statistics of a freshly built profile.
    pub async fn profile_summary(&self, username: &str) -> EngineResult<Option<ProfileSummary>> {
        let generation = self.generation()?;
        let profile = self.profile_for(&generation, username, false).await?;
        Ok(profile.map(|p| summarize(username, &p, generation.space.breakdown())))
    }

    pub fn product_metadata(&self, product_id: ProductId) -> EngineResult<Option<ProductMetadata>> {
        Ok(self.generation()?.metadata.get(&product_id).cloned())
    }

    /// Drops cached profiles of the serving generation.
    pub fn clear_profile_cache(&self) -> usize {
        match self.generation() {
            Ok(generation) => {
                let cleared = generation.profiles.len();
                generation.profiles.clear();
                info!(cleared, "Cleared profile cache");
                cleared
            }
            Err(_) => 0,
        }
    }

    /// Writes the serving generation, including cached profiles, to disk.
    pub fn persist(&self) -> EngineResult<()> {
        let generation = self.generation()?;
        self.cache.save(&generation.snapshot())
    }

    pub fn stats(&self) -> EngineStats {
        let phase = self.phase();
        match self.generation() {
            Ok(generation) => EngineStats {
                phase,
                generation: Some(generation.space.generation),
                cached_products: generation.vectors.len(),
                cached_profiles: generation.cached_profiles(),
                vector_dimensions: generation.space.dimension(),
                breakdown: Some(generation.space.breakdown()),
            },
            Err(_) => EngineStats {
                phase,
                generation: None,
                cached_products: 0,
                cached_profiles: 0,
                vector_dimensions: 0,
                breakdown: None,
            },
        }
    }
}

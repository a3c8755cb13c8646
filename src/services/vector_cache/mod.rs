//! On-disk snapshot of one feature-space generation.
//!
//! Three artifacts live in the cache directory: the vectors snapshot, the
//! fitted TF-IDF model and the fitted price scaler. Each carries the same
//! generation id and the encoder settings they were fitted with; a load that
//! finds mismatched, missing or malformed pieces is rejected as a whole.

use crate::algorithms::{CategoryEncoder, FeatureSpace, MinMaxScaler, TfIdfVectorizer};
use crate::config::FeatureConfig;
use crate::error::{EngineError, EngineResult};
use crate::models::*;
use crate::utils::validation::validate_vector;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use tracing::{info, warn};
use uuid::Uuid;

pub const SCHEMA_VERSION: u32 = 1;

const VECTORS_FILE: &str = "vectors_cache.json";
const TFIDF_FILE: &str = "tfidf_vectorizer.json";
const SCALER_FILE: &str = "price_scaler.json";

/// Everything needed to serve without refitting the encoder.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub space: FeatureSpace,
    pub vectors: HashMap<ProductId, Vec<f32>>,
    pub metadata: HashMap<ProductId, ProductMetadata>,
    pub profiles: HashMap<String, Vec<f32>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct ArtifactHeader {
    schema_version: u32,
    generation: Uuid,
    features: FeatureConfig,
}

#[derive(Serialize, Deserialize)]
struct VectorsArtifact {
    header: ArtifactHeader,
    category: CategoryEncoder,
    restaurant_category: CategoryEncoder,
    product_vectors: HashMap<ProductId, Vec<f32>>,
    product_metadata: HashMap<ProductId, ProductMetadata>,
    user_profiles: HashMap<String, Vec<f32>>,
}

#[derive(Serialize, Deserialize)]
struct TfIdfArtifact {
    header: ArtifactHeader,
    model: TfIdfVectorizer,
}

#[derive(Serialize, Deserialize)]
struct ScalerArtifact {
    header: ArtifactHeader,
    model: MinMaxScaler,
}

/// Snapshot files for one cache directory, valid only for the encoder
/// settings the store was created with.
#[derive(Debug, Clone)]
pub struct VectorCacheStore {
    directory: PathBuf,
    features: FeatureConfig,
}

impl VectorCacheStore {
    pub fn new(directory: impl Into<PathBuf>, features: FeatureConfig) -> Self {
        Self {
            directory: directory.into(),
            features,
        }
    }

    /// Reads the last snapshot. Any failure means "cold, must rebuild".
    pub fn load(&self) -> Option<Snapshot> {
        if !self.directory.join(VECTORS_FILE).exists() {
            return None;
        }

        match self.try_load() {
            Ok(snapshot) => {
                info!(
                    products = snapshot.vectors.len(),
                    profiles = snapshot.profiles.len(),
                    generation = %snapshot.space.generation,
                    "Loaded vector cache"
                );
                Some(snapshot)
            }
            Err(e) => {
                warn!(directory = %self.directory.display(), error = %e, "Failed to load vector cache");
                None
            }
        }
    }

    fn try_load(&self) -> EngineResult<Snapshot> {
        let vectors: VectorsArtifact = self.read_artifact(VECTORS_FILE)?;
        let tfidf: TfIdfArtifact = self.read_artifact(TFIDF_FILE)?;
        let scaler: ScalerArtifact = self.read_artifact(SCALER_FILE)?;

        let header = vectors.header;
        if header.schema_version != SCHEMA_VERSION {
            return Err(EngineError::Cache(format!(
                "schema version {} is not supported",
                header.schema_version
            )));
        }
        if header.features != self.features {
            return Err(EngineError::Cache(format!(
                "fitted with {:?}, current encoder uses {:?}",
                header.features, self.features
            )));
        }
        if tfidf.header != header || scaler.header != header {
            return Err(EngineError::Cache("artifacts belong to different generations".to_string()));
        }
        if !tfidf.model.is_consistent() || !scaler.model.is_consistent() {
            return Err(EngineError::Cache("fitted models are malformed".to_string()));
        }

        let space = FeatureSpace {
            generation: header.generation,
            category: vectors.category,
            restaurant_category: vectors.restaurant_category,
            text: tfidf.model,
            price: scaler.model,
        };

        let dimension = space.dimension();
        let widths_match = vectors
            .product_vectors
            .values()
            .chain(vectors.user_profiles.values())
            .all(|v| v.len() == dimension);
        if !widths_match {
            return Err(EngineError::Cache(format!(
                "stored vectors do not match feature space width {}",
                dimension
            )));
        }
        for stored in vectors.product_vectors.values().chain(vectors.user_profiles.values()) {
            validate_vector(stored).map_err(|e| EngineError::Cache(e.to_string()))?;
        }
        if vectors.product_vectors.is_empty()
            || vectors.product_vectors.keys().any(|id| !vectors.product_metadata.contains_key(id))
        {
            return Err(EngineError::Cache("product vectors and metadata disagree".to_string()));
        }

        Ok(Snapshot {
            space,
            vectors: vectors.product_vectors,
            metadata: vectors.product_metadata,
            profiles: vectors.user_profiles,
        })
    }

    /// Writes all three artifacts; the vectors artifact is published last.
    pub fn save(&self, snapshot: &Snapshot) -> EngineResult<()> {
        fs::create_dir_all(&self.directory)?;

        let header = ArtifactHeader {
            schema_version: SCHEMA_VERSION,
            generation: snapshot.space.generation,
            features: self.features.clone(),
        };

        self.write_artifact(
            TFIDF_FILE,
            &TfIdfArtifact {
                header: header.clone(),
                model: snapshot.space.text.clone(),
            },
        )?;
        self.write_artifact(
            SCALER_FILE,
            &ScalerArtifact {
                header: header.clone(),
                model: snapshot.space.price,
            },
        )?;
        self.write_artifact(
            VECTORS_FILE,
            &VectorsArtifact {
                header,
                category: snapshot.space.category.clone(),
                restaurant_category: snapshot.space.restaurant_category.clone(),
                product_vectors: snapshot.vectors.clone(),
                product_metadata: snapshot.metadata.clone(),
                user_profiles: snapshot.profiles.clone(),
            },
        )?;

        info!(
            directory = %self.directory.display(),
            products = snapshot.vectors.len(),
            profiles = snapshot.profiles.len(),
            "Saved vector cache"
        );
        Ok(())
    }

    fn read_artifact<T: DeserializeOwned>(&self, name: &str) -> EngineResult<T> {
        let bytes = fs::read(self.directory.join(name))?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    fn write_artifact<T: Serialize>(&self, name: &str, value: &T) -> EngineResult<()> {
        let target = self.directory.join(name);
        let tmp = self.directory.join(format!("{}.tmp", name));
        fs::write(&tmp, serde_json::to_vec(value)?)?;
        fs::rename(&tmp, &target)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithms::FeatureEncoder;
    use std::path::Path;

    fn scratch_dir() -> PathBuf {
        std::env::temp_dir().join(format!("menurec-cache-{}", Uuid::new_v4()))
    }

    fn store_at(dir: &Path) -> VectorCacheStore {
        VectorCacheStore::new(dir, FeatureConfig::default())
    }

    fn product(id: ProductId, name: &str, category: &str, price: f64) -> ProductRecord {
        ProductRecord {
            id,
            name: Some(name.to_string()),
            description: Some("fresh house special".to_string()),
            category: Some(category.to_string()),
            price: Some(price),
            restaurant_id: Some(7),
            is_available: true,
            quantity: 3,
            restaurant_name: Some("Corner".to_string()),
            restaurant_category: Some("fast food".to_string()),
        }
    }

    fn snapshot() -> Snapshot {
        let products = vec![
            product(1, "Cheese pizza", "pizza", 9.5),
            product(2, "Veggie pizza", "pizza", 11.25),
            product(3, "Salmon nigiri", "sushi", 17.0),
        ];
        let catalog = FeatureEncoder::new(FeatureConfig::default()).fit(&products).unwrap();
        let mut profiles = HashMap::new();
        profiles.insert("ana".to_string(), catalog.vectors[&1].clone());
        Snapshot {
            space: catalog.space,
            vectors: catalog.vectors,
            metadata: catalog.metadata,
            profiles,
        }
    }

    #[test]
    fn save_then_load_reproduces_snapshot() {
        let dir = scratch_dir();
        let store = store_at(&dir);
        let original = snapshot();

        store.save(&original).unwrap();
        let loaded = store.load().unwrap();

        assert_eq!(loaded, original);
        for (id, vector) in &original.vectors {
            let bits: Vec<u32> = vector.iter().map(|x| x.to_bits()).collect();
            let loaded_bits: Vec<u32> = loaded.vectors[id].iter().map(|x| x.to_bits()).collect();
            assert_eq!(bits, loaded_bits);
        }
        assert!(!dir.join(format!("{}.tmp", VECTORS_FILE)).exists());

        fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn missing_cache_is_cold() {
        assert!(store_at(&scratch_dir()).load().is_none());
    }

    #[test]
    fn truncated_artifact_is_rejected() {
        let dir = scratch_dir();
        let store = store_at(&dir);
        store.save(&snapshot()).unwrap();

        let path = dir.join(VECTORS_FILE);
        let bytes = fs::read(&path).unwrap();
        fs::write(&path, &bytes[..bytes.len() / 2]).unwrap();
        assert!(store.load().is_none());

        fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn mixed_generations_are_rejected() {
        let dir = scratch_dir();
        let store = store_at(&dir);
        store.save(&snapshot()).unwrap();
        let stale_tfidf = fs::read(dir.join(TFIDF_FILE)).unwrap();

        store.save(&snapshot()).unwrap();
        fs::write(dir.join(TFIDF_FILE), stale_tfidf).unwrap();
        assert!(store.load().is_none());

        fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn missing_model_artifact_is_rejected() {
        let dir = scratch_dir();
        let store = store_at(&dir);
        store.save(&snapshot()).unwrap();
        fs::remove_file(dir.join(SCALER_FILE)).unwrap();
        assert!(store.load().is_none());

        fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn changed_encoder_settings_are_rejected() {
        let dir = scratch_dir();
        store_at(&dir).save(&snapshot()).unwrap();

        let narrower = FeatureConfig {
            max_text_features: 1,
            ..FeatureConfig::default()
        };
        assert!(VectorCacheStore::new(&dir, narrower).load().is_none());
        assert!(store_at(&dir).load().is_some());

        fs::remove_dir_all(dir).ok();
    }
}

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub postgres: PostgresConfig,
    pub recommendation: RecommendationConfig,
    pub features: FeatureConfig,
    pub cache: CacheConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub workers: usize,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(format!("{}:{}", self.host, self.port).parse()?)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostgresConfig {
    pub url: String,
    pub max_connections: u32,
}

/// Multipliers applied per interaction kind when aggregating a user profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InteractionWeights {
    pub order: f32,
    pub add_to_cart: f32,
    pub view: f32,
    pub rate: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendationConfig {
    pub weights: InteractionWeights,
    /// Multiplier applied to the similarity of recently reordered products.
    pub repeat_penalty: f32,
    pub repeat_window_days: i64,
    /// Upper bound of the additive popularity boost.
    pub popularity_boost: f32,
    pub popularity_window_days: i64,
    pub cold_start_window_days: i64,
    pub default_results: usize,
    pub max_results: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureConfig {
    pub max_text_features: usize,
    pub min_document_frequency: usize,
    pub min_ngram: usize,
    pub max_ngram: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub directory: PathBuf,
}

impl Default for InteractionWeights {
    fn default() -> Self {
        Self {
            order: 3.0,
            add_to_cart: 2.0,
            view: 1.0,
            rate: 4.0,
        }
    }
}

impl Default for RecommendationConfig {
    fn default() -> Self {
        Self {
            weights: InteractionWeights::default(),
            repeat_penalty: 0.7,
            repeat_window_days: 30,
            popularity_boost: 0.2,
            popularity_window_days: 90,
            cold_start_window_days: 30,
            default_results: 10,
            max_results: 50,
        }
    }
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            max_text_features: 100,
            min_document_frequency: 2,
            min_ngram: 1,
            max_ngram: 2,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 5001,
                workers: num_cpus::get(),
            },
            postgres: PostgresConfig {
                url: "postgresql://localhost:5432/FoodDelivery".to_string(),
                max_connections: 10,
            },
            recommendation: RecommendationConfig::default(),
            features: FeatureConfig::default(),
            cache: CacheConfig {
                directory: PathBuf::from("./recommendation_cache"),
            },
        }
    }
}

impl Config {
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(config::Environment::with_prefix("MENUREC").separator("__"))
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    /// Loads `path` when it exists, otherwise falls back to defaults.
    pub fn load_or_default(path: &str) -> anyhow::Result<Self> {
        if std::path::Path::new(path).exists() {
            Self::from_file(path)
        } else {
            tracing::info!(path, "Config file not found, using default configuration");
            Ok(Self::default())
        }
    }
}

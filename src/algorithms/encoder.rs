use super::scaler::MinMaxScaler;
use super::tfidf::TfIdfVectorizer;
use crate::config::FeatureConfig;
use crate::models::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info};
use uuid::Uuid;

/// Ordered one-hot encoder: values keep the order they were first seen in.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CategoryEncoder {
    values: Vec<String>,
}

impl CategoryEncoder {
    pub fn fit<'a>(values: impl IntoIterator<Item = &'a str>) -> Self {
        let mut encoder = Self::default();
        for value in values {
            if encoder.index_of(value).is_none() {
                encoder.values.push(value.to_string());
            }
        }
        encoder
    }

    pub fn index_of(&self, value: &str) -> Option<usize> {
        self.values.iter().position(|v| v == value)
    }

    /// Unseen values produce an all-zero block.
    pub fn encode_into(&self, value: &str, out: &mut Vec<f32>) {
        let start = out.len();
        out.resize(start + self.values.len(), 0.0);
        if let Some(idx) = self.index_of(value) {
            out[start + idx] = 1.0;
        }
    }

    pub fn values(&self) -> &[String] {
        &self.values
    }

    pub fn width(&self) -> usize {
        self.values.len()
    }
}

/// Frozen encoding configuration of one build generation.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureSpace {
    pub generation: Uuid,
    pub category: CategoryEncoder,
    pub restaurant_category: CategoryEncoder,
    pub text: TfIdfVectorizer,
    pub price: MinMaxScaler,
}

impl FeatureSpace {
    /// Category one-hot, restaurant-category one-hot, TF-IDF, scaled price.
    pub fn encode(&self, product: &ProductRecord) -> Vec<f32> {
        let mut vector = Vec::with_capacity(self.dimension());
        self.category
            .encode_into(product.category.as_deref().unwrap_or(""), &mut vector);
        self.restaurant_category
            .encode_into(product.restaurant_category.as_deref().unwrap_or(""), &mut vector);
        vector.extend(self.text.transform(&product.text()));
        vector.push(self.price.transform(product.price.unwrap_or(0.0)));
        vector
    }

    pub fn breakdown(&self) -> FeatureBreakdown {
        FeatureBreakdown {
            category_features: self.category.width(),
            restaurant_category_features: self.restaurant_category.width(),
            text_features: self.text.width(),
            numeric_features: 1,
        }
    }

    pub fn dimension(&self) -> usize {
        self.breakdown().total()
    }
}

/// Output of a full encoder fit.
#[derive(Debug, Clone)]
pub struct EncodedCatalog {
    pub space: FeatureSpace,
    pub vectors: HashMap<ProductId, Vec<f32>>,
    pub metadata: HashMap<ProductId, ProductMetadata>,
}

#[derive(Debug, Clone)]
pub struct FeatureEncoder {
    config: FeatureConfig,
}

impl FeatureEncoder {
    pub fn new(config: FeatureConfig) -> Self {
        Self { config }
    }

    /// Fits a new feature space on `products` and encodes every product.
    /// Returns `None` for an empty batch.
    pub fn fit(&self, products: &[ProductRecord]) -> Option<EncodedCatalog> {
        if products.is_empty() {
            return None;
        }

        let category = CategoryEncoder::fit(products.iter().map(|p| p.category.as_deref().unwrap_or("")));
        let restaurant_category = CategoryEncoder::fit(
            products
                .iter()
                .map(|p| p.restaurant_category.as_deref().unwrap_or("")),
        );
        debug!(
            categories = category.width(),
            restaurant_categories = restaurant_category.width(),
            "Built category encodings"
        );

        let documents: Vec<String> = products.iter().map(ProductRecord::text).collect();
        let text = TfIdfVectorizer::fit(&documents, &self.config);
        debug!(vocabulary = text.width(), "Fitted TF-IDF vocabulary");

        let prices: Vec<f64> = products.iter().map(|p| p.price.unwrap_or(0.0)).collect();
        let price = MinMaxScaler::fit(&prices)?;

        let space = FeatureSpace {
            generation: Uuid::new_v4(),
            category,
            restaurant_category,
            text,
            price,
        };

        let mut vectors = HashMap::with_capacity(products.len());
        let mut metadata = HashMap::with_capacity(products.len());
        for product in products {
            vectors.insert(product.id, space.encode(product));
            metadata.insert(product.id, product.metadata());
        }

        let breakdown = space.breakdown();
        info!(
            products = vectors.len(),
            dimensions = breakdown.total(),
            category = breakdown.category_features + breakdown.restaurant_category_features,
            text = breakdown.text_features,
            numeric = breakdown.numeric_features,
            generation = %space.generation,
            "Created product feature vectors"
        );

        Some(EncodedCatalog {
            space,
            vectors,
            metadata,
        })
    }
}

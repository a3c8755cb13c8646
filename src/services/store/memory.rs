use super::InteractionStore;
use crate::models::*;
use anyhow::Result;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use tracing::debug;

#[derive(Debug, Clone)]
struct OrderRow {
    username: String,
    record: InteractionRecord,
}

/// In-process store with the same query semantics as [`super::PostgresStore`].
#[derive(Default)]
pub struct InMemoryStore {
    products: RwLock<HashMap<ProductId, ProductRecord>>,
    orders: RwLock<Vec<OrderRow>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert_product(&self, product: ProductRecord) {
        self.products.write().insert(product.id, product);
    }

    pub fn remove_product(&self, product_id: ProductId) {
        self.products.write().remove(&product_id);
    }

    pub fn record_order(&self, username: &str, product_id: ProductId, quantity: i32, at: DateTime<Utc>) {
        self.orders.write().push(OrderRow {
            username: username.to_string(),
            record: InteractionRecord::order(product_id, quantity, at),
        });
        debug!(username, product_id, quantity, "Recorded order");
    }
}

#[async_trait::async_trait]
impl InteractionStore for InMemoryStore {
    async fn available_products(&self) -> Result<Vec<ProductRecord>> {
        let mut products: Vec<ProductRecord> = self
            .products
            .read()
            .values()
            .filter(|p| p.is_servable())
            .cloned()
            .collect();
        products.sort_by_key(|p| p.id);
        Ok(products)
    }

    async fn user_interactions(
        &self,
        username: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<InteractionRecord>> {
        let mut history: Vec<InteractionRecord> = self
            .orders
            .read()
            .iter()
            .filter(|row| row.username == username)
            .filter(|row| since.map_or(true, |s| row.record.occurred_at >= s))
            .map(|row| row.record.clone())
            .collect();
        history.sort_by(|a, b| b.occurred_at.cmp(&a.occurred_at));
        Ok(history)
    }

    async fn recently_ordered(&self, username: &str, since: DateTime<Utc>) -> Result<HashSet<ProductId>> {
        Ok(self
            .orders
            .read()
            .iter()
            .filter(|row| row.username == username && row.record.occurred_at >= since)
            .map(|row| row.record.product_id)
            .collect())
    }

    async fn order_counts(&self, since: DateTime<Utc>) -> Result<HashMap<ProductId, u64>> {
        let mut counts = HashMap::new();
        for row in self.orders.read().iter().filter(|row| row.record.occurred_at >= since) {
            *counts.entry(row.record.product_id).or_insert(0) += 1;
        }
        Ok(counts)
    }

    async fn popular_products(
        &self,
        since: DateTime<Utc>,
        category: Option<&str>,
        limit: usize,
    ) -> Result<Vec<PopularProduct>> {
        let counts = self.order_counts(since).await?;
        let products = self.products.read();

        let mut popular: Vec<PopularProduct> = counts
            .into_iter()
            .filter_map(|(id, order_count)| {
                let product = products.get(&id)?;
                if !product.is_servable() || product.restaurant_id.is_none() {
                    return None;
                }
                if let Some(category) = category {
                    if product.category.as_deref() != Some(category) {
                        return None;
                    }
                }
                Some(PopularProduct {
                    product_id: id,
                    metadata: product.metadata(),
                    order_count,
                })
            })
            .collect();

        popular.sort_by(|a, b| b.order_count.cmp(&a.order_count).then_with(|| a.product_id.cmp(&b.product_id)));
        popular.truncate(limit);
        Ok(popular)
    }
}

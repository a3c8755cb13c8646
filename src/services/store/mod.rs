//! Data-store collaborator: products, order history and popularity queries.

pub mod memory;
pub mod postgres;

pub use memory::InMemoryStore;
pub use postgres::PostgresStore;

use crate::models::*;
use anyhow::Result;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};

#[async_trait::async_trait]
pub trait InteractionStore: Send + Sync {
    /// Products that are available and in stock.
    async fn available_products(&self) -> Result<Vec<ProductRecord>>;

    /// Interaction history of `username`, most recent first, optionally
    /// limited to rows at or after `since`.
    async fn user_interactions(
        &self,
        username: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<InteractionRecord>>;

    /// Distinct product ids ordered by `username` at or after `since`.
    async fn recently_ordered(&self, username: &str, since: DateTime<Utc>) -> Result<HashSet<ProductId>>;

    /// Order rows per product across all users at or after `since`.
    async fn order_counts(&self, since: DateTime<Utc>) -> Result<HashMap<ProductId, u64>>;

    /// Available products ranked by order rows at or after `since`, highest
    /// first, optionally restricted to one product category.
    async fn popular_products(
        &self,
        since: DateTime<Utc>,
        category: Option<&str>,
        limit: usize,
    ) -> Result<Vec<PopularProduct>>;
}

use super::InteractionStore;
use crate::config::PostgresConfig;
use crate::models::*;
use anyhow::Result;
use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{FromRow, Postgres, QueryBuilder};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info};

const AVAILABLE_PRODUCTS: &str = r#"
    SELECT
        p.id,
        p.name,
        p.description,
        p.category,
        p.price,
        p.restaurant_id,
        p.is_available,
        p.quantity,
        r.name AS restaurant_name,
        r.category AS restaurant_category
    FROM product p
    LEFT JOIN restaurant r ON p.restaurant_id = r.id
    WHERE p.is_available = true
    AND p.quantity > 0
"#;

#[derive(FromRow)]
struct ProductRow {
    id: i64,
    name: Option<String>,
    description: Option<String>,
    category: Option<String>,
    price: Option<f64>,
    restaurant_id: Option<i64>,
    is_available: Option<bool>,
    quantity: Option<i32>,
    restaurant_name: Option<String>,
    restaurant_category: Option<String>,
}

#[derive(FromRow)]
struct HistoryRow {
    product_id: i64,
    quantity: i32,
    order_date: NaiveDateTime,
}

#[derive(FromRow)]
struct PopularRow {
    id: i64,
    name: Option<String>,
    category: Option<String>,
    price: Option<f64>,
    restaurant_id: Option<i64>,
    restaurant_name: Option<String>,
    order_count: i64,
}

impl From<ProductRow> for ProductRecord {
    fn from(row: ProductRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            description: row.description,
            category: row.category,
            price: row.price,
            restaurant_id: row.restaurant_id,
            is_available: row.is_available.unwrap_or(false),
            quantity: row.quantity.unwrap_or(0),
            restaurant_name: row.restaurant_name,
            restaurant_category: row.restaurant_category,
        }
    }
}

/// `order_date` is stored as a UTC timestamp without time zone.
fn naive(at: DateTime<Utc>) -> NaiveDateTime {
    at.naive_utc()
}

pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub async fn connect(config: &PostgresConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.url)
            .await?;
        info!(max_connections = config.max_connections, "Connected to Postgres");
        Ok(Self::from_pool(pool))
    }

    /// Wraps a pool shared with other parts of the process.
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Cold-start query; the category predicate is only added when present
    /// and its value is always bound.
    fn popular_query<'a>(since: DateTime<Utc>, category: Option<&'a str>, limit: usize) -> QueryBuilder<'a, Postgres> {
        let mut builder = QueryBuilder::new(
            r#"
            SELECT
                p.id,
                p.name,
                p.category,
                p.price,
                p.restaurant_id,
                r.name AS restaurant_name,
                COUNT(*) AS order_count
            FROM user_order_history uoh
            JOIN product p ON uoh.product_id = p.id
            JOIN restaurant r ON p.restaurant_id = r.id
            WHERE p.is_available = true
            AND p.quantity > 0
            AND uoh.order_date >= "#,
        );
        builder.push_bind(naive(since));
        if let Some(category) = category {
            builder.push(" AND p.category = ").push_bind(category);
        }
        builder.push(
            " GROUP BY p.id, p.name, p.category, p.price, p.restaurant_id, r.name \
             ORDER BY order_count DESC, p.id ASC LIMIT ",
        );
        builder.push_bind(i64::try_from(limit).unwrap_or(i64::MAX));
        builder
    }
}

#[async_trait::async_trait]
impl InteractionStore for PostgresStore {
    async fn available_products(&self) -> Result<Vec<ProductRecord>> {
        let rows = sqlx::query_as::<_, ProductRow>(AVAILABLE_PRODUCTS)
            .fetch_all(&self.pool)
            .await?;
        debug!(count = rows.len(), "Fetched available products");
        Ok(rows.into_iter().map(ProductRecord::from).collect())
    }

    async fn user_interactions(
        &self,
        username: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<InteractionRecord>> {
        let rows = sqlx::query_as::<_, HistoryRow>(
            r#"
            SELECT product_id, quantity, order_date
            FROM user_order_history
            WHERE user_username = $1
            AND ($2::timestamp IS NULL OR order_date >= $2)
            ORDER BY order_date DESC
            "#,
        )
        .bind(username)
        .bind(since.map(naive))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| InteractionRecord::order(row.product_id, row.quantity, row.order_date.and_utc()))
            .collect())
    }

    async fn recently_ordered(&self, username: &str, since: DateTime<Utc>) -> Result<HashSet<ProductId>> {
        let ids: Vec<(i64,)> = sqlx::query_as(
            r#"
            SELECT DISTINCT product_id
            FROM user_order_history
            WHERE user_username = $1
            AND order_date >= $2
            "#,
        )
        .bind(username)
        .bind(naive(since))
        .fetch_all(&self.pool)
        .await?;

        Ok(ids.into_iter().map(|(id,)| id).collect())
    }

    async fn order_counts(&self, since: DateTime<Utc>) -> Result<HashMap<ProductId, u64>> {
        let rows: Vec<(i64, i64)> = sqlx::query_as(
            r#"
            SELECT product_id, COUNT(*) AS order_count
            FROM user_order_history
            WHERE order_date >= $1
            GROUP BY product_id
            "#,
        )
        .bind(naive(since))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(id, count)| (id, count.max(0) as u64))
            .collect())
    }

    async fn popular_products(
        &self,
        since: DateTime<Utc>,
        category: Option<&str>,
        limit: usize,
    ) -> Result<Vec<PopularProduct>> {
        let mut query = Self::popular_query(since, category, limit);
        let rows = query.build_query_as::<PopularRow>().fetch_all(&self.pool).await?;

        Ok(rows
            .into_iter()
            .map(|row| PopularProduct {
                product_id: row.id,
                metadata: ProductMetadata {
                    name: row.name.unwrap_or_default(),
                    category: row.category.unwrap_or_default(),
                    price: row.price.unwrap_or(0.0),
                    restaurant_id: row.restaurant_id,
                    restaurant_name: row.restaurant_name,
                },
                order_count: row.order_count.max(0) as u64,
            })
            .collect())
    }
}

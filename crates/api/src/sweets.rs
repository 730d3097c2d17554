//! Sweet inventory storage
//!
//! Plain CRUD plus stock movements. Access control lives in the router, not here.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Sweet {
    pub id: Uuid,
    pub name: String,
    pub category: String,
    pub price: f64,
    pub quantity: i32,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewSweet {
    pub name: String,
    pub category: String,
    pub price: f64,
    pub quantity: i32,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SweetUpdate {
    pub name: Option<String>,
    pub category: Option<String>,
    pub price: Option<f64>,
    pub quantity: Option<i32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SweetFilter {
    pub name: Option<String>,
    pub category: Option<String>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
}

impl SweetFilter {
    fn matches(&self, sweet: &Sweet) -> bool {
        if let Some(name) = self.name.as_deref().filter(|n| !n.is_empty()) {
            if !sweet.name.to_lowercase().contains(&name.to_lowercase()) {
                return false;
            }
        }
        if let Some(category) = self.category.as_deref().filter(|c| !c.is_empty()) {
            if sweet.category != category {
                return false;
            }
        }
        if self.min_price.is_some_and(|min| sweet.price < min) {
            return false;
        }
        if self.max_price.is_some_and(|max| sweet.price > max) {
            return false;
        }
        true
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SweetError {
    #[error("Sweet not found")]
    NotFound,
    #[error("Out of stock")]
    OutOfStock,
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[async_trait]
pub trait SweetRepository: Send + Sync {
    async fn list(&self) -> Result<Vec<Sweet>, SweetError>;
    async fn search(&self, filter: &SweetFilter) -> Result<Vec<Sweet>, SweetError>;
    async fn create(&self, new: NewSweet) -> Result<Sweet, SweetError>;
    async fn update(&self, id: Uuid, update: SweetUpdate) -> Result<Sweet, SweetError>;
    async fn delete(&self, id: Uuid) -> Result<(), SweetError>;
    /// Take one unit out of stock
    async fn purchase(&self, id: Uuid) -> Result<Sweet, SweetError>;
    async fn restock(&self, id: Uuid, amount: i32) -> Result<Sweet, SweetError>;
}

const SWEET_COLUMNS: &str = "id, name, category, price, quantity, created_at, updated_at";

#[derive(Clone)]
pub struct PgSweetRepository {
    pool: PgPool,
}

impl PgSweetRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn exists(&self, id: Uuid) -> Result<bool, SweetError> {
        let found: Option<(bool,)> = sqlx::query_as("SELECT TRUE FROM sweets WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(found.is_some())
    }
}

#[async_trait]
impl SweetRepository for PgSweetRepository {
    async fn list(&self) -> Result<Vec<Sweet>, SweetError> {
        let sweets = sqlx::query_as::<_, Sweet>(&format!(
            "SELECT {} FROM sweets ORDER BY created_at ASC",
            SWEET_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(sweets)
    }

    async fn search(&self, filter: &SweetFilter) -> Result<Vec<Sweet>, SweetError> {
        let name_pattern = filter
            .name
            .as_deref()
            .filter(|n| !n.is_empty())
            .map(|n| format!("%{}%", n.replace('%', "\\%").replace('_', "\\_")));
        let category = filter.category.as_deref().filter(|c| !c.is_empty());

        let sweets = sqlx::query_as::<_, Sweet>(&format!(
            r#"
            SELECT {}
            FROM sweets
            WHERE ($1::TEXT IS NULL OR name ILIKE $1)
              AND ($2::TEXT IS NULL OR category = $2)
              AND ($3::DOUBLE PRECISION IS NULL OR price >= $3)
              AND ($4::DOUBLE PRECISION IS NULL OR price <= $4)
            ORDER BY created_at ASC
            "#,
            SWEET_COLUMNS
        ))
        .bind(name_pattern)
        .bind(category)
        .bind(filter.min_price)
        .bind(filter.max_price)
        .fetch_all(&self.pool)
        .await?;
        Ok(sweets)
    }

    async fn create(&self, new: NewSweet) -> Result<Sweet, SweetError> {
        let sweet = sqlx::query_as::<_, Sweet>(&format!(
            r#"
            INSERT INTO sweets (id, name, category, price, quantity, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, NOW(), NOW())
            RETURNING {}
            "#,
            SWEET_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(new.name.trim())
        .bind(new.category.trim())
        .bind(new.price)
        .bind(new.quantity)
        .fetch_one(&self.pool)
        .await?;
        Ok(sweet)
    }

    async fn update(&self, id: Uuid, update: SweetUpdate) -> Result<Sweet, SweetError> {
        sqlx::query_as::<_, Sweet>(&format!(
            r#"
            UPDATE sweets
            SET name = COALESCE($2, name),
                category = COALESCE($3, category),
                price = COALESCE($4, price),
                quantity = COALESCE($5, quantity),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            SWEET_COLUMNS
        ))
        .bind(id)
        .bind(update.name.as_deref().map(str::trim))
        .bind(update.category.as_deref().map(str::trim))
        .bind(update.price)
        .bind(update.quantity)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(SweetError::NotFound)
    }

    async fn delete(&self, id: Uuid) -> Result<(), SweetError> {
        let rows = sqlx::query("DELETE FROM sweets WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?
            .rows_affected();
        if rows == 0 {
            return Err(SweetError::NotFound);
        }
        Ok(())
    }

    async fn purchase(&self, id: Uuid) -> Result<Sweet, SweetError> {
        let updated = sqlx::query_as::<_, Sweet>(&format!(
            r#"
            UPDATE sweets
            SET quantity = quantity - 1, updated_at = NOW()
            WHERE id = $1 AND quantity > 0
            RETURNING {}
            "#,
            SWEET_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        match updated {
            Some(sweet) => Ok(sweet),
            None if self.exists(id).await? => Err(SweetError::OutOfStock),
            None => Err(SweetError::NotFound),
        }
    }

    async fn restock(&self, id: Uuid, amount: i32) -> Result<Sweet, SweetError> {
        sqlx::query_as::<_, Sweet>(&format!(
            r#"
            UPDATE sweets
            SET quantity = LEAST(quantity::BIGINT + $2, 2147483647)::INTEGER, updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            SWEET_COLUMNS
        ))
        .bind(id)
        .bind(amount)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(SweetError::NotFound)
    }
}

/// Process-local inventory for tests and local development
#[derive(Default)]
pub struct InMemorySweetRepository {
    sweets: RwLock<HashMap<Uuid, Sweet>>,
}

impl InMemorySweetRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SweetRepository for InMemorySweetRepository {
    async fn list(&self) -> Result<Vec<Sweet>, SweetError> {
        let mut sweets: Vec<Sweet> = self.sweets.read().await.values().cloned().collect();
        sweets.sort_by_key(|s| s.created_at);
        Ok(sweets)
    }

    async fn search(&self, filter: &SweetFilter) -> Result<Vec<Sweet>, SweetError> {
        Ok(self
            .list()
            .await?
            .into_iter()
            .filter(|s| filter.matches(s))
            .collect())
    }

    async fn create(&self, new: NewSweet) -> Result<Sweet, SweetError> {
        let now = OffsetDateTime::now_utc();
        let sweet = Sweet {
            id: Uuid::new_v4(),
            name: new.name.trim().to_string(),
            category: new.category.trim().to_string(),
            price: new.price,
            quantity: new.quantity,
            created_at: now,
            updated_at: now,
        };
        self.sweets.write().await.insert(sweet.id, sweet.clone());
        Ok(sweet)
    }

    async fn update(&self, id: Uuid, update: SweetUpdate) -> Result<Sweet, SweetError> {
        let mut sweets = self.sweets.write().await;
        let sweet = sweets.get_mut(&id).ok_or(SweetError::NotFound)?;
        if let Some(name) = update.name {
            sweet.name = name.trim().to_string();
        }
        if let Some(category) = update.category {
            sweet.category = category.trim().to_string();
        }
        if let Some(price) = update.price {
            sweet.price = price;
        }
        if let Some(quantity) = update.quantity {
            sweet.quantity = quantity;
        }
        sweet.updated_at = OffsetDateTime::now_utc();
        Ok(sweet.clone())
    }

    async fn delete(&self, id: Uuid) -> Result<(), SweetError> {
        self.sweets
            .write()
            .await
            .remove(&id)
            .map(|_| ())
            .ok_or(SweetError::NotFound)
    }

    async fn purchase(&self, id: Uuid) -> Result<Sweet, SweetError> {
        let mut sweets = self.sweets.write().await;
        let sweet = sweets.get_mut(&id).ok_or(SweetError::NotFound)?;
        if sweet.quantity <= 0 {
            return Err(SweetError::OutOfStock);
        }
        sweet.quantity -= 1;
        sweet.updated_at = OffsetDateTime::now_utc();
        Ok(sweet.clone())
    }

    async fn restock(&self, id: Uuid, amount: i32) -> Result<Sweet, SweetError> {
        let mut sweets = self.sweets.write().await;
        let sweet = sweets.get_mut(&id).ok_or(SweetError::NotFound)?;
        sweet.quantity = sweet.quantity.saturating_add(amount);
        sweet.updated_at = OffsetDateTime::now_utc();
        Ok(sweet.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_sweet(name: &str, category: &str, price: f64, quantity: i32) -> NewSweet {
        NewSweet {
            name: name.into(),
            category: category.into(),
            price,
            quantity,
        }
    }

    #[tokio::test]
    async fn test_purchase_until_out_of_stock() {
        let repo = InMemorySweetRepository::new();
        let sweet = repo.create(new_sweet("Ladoo", "Indian", 10.0, 1)).await.unwrap();

        assert_eq!(repo.purchase(sweet.id).await.unwrap().quantity, 0);
        assert!(matches!(repo.purchase(sweet.id).await, Err(SweetError::OutOfStock)));
    }

    #[tokio::test]
    async fn test_restock_and_missing() {
        let repo = InMemorySweetRepository::new();
        let sweet = repo.create(new_sweet("Barfi", "Indian", 12.5, 0)).await.unwrap();

        assert_eq!(repo.restock(sweet.id, 5).await.unwrap().quantity, 5);
        assert!(matches!(
            repo.restock(Uuid::new_v4(), 1).await,
            Err(SweetError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_restock_saturates_at_max() {
        let repo = InMemorySweetRepository::new();
        let sweet = repo
            .create(new_sweet("Halwa", "Indian", 5.0, i32::MAX - 1))
            .await
            .unwrap();

        assert_eq!(repo.restock(sweet.id, 10).await.unwrap().quantity, i32::MAX);
    }

    #[tokio::test]
    async fn test_search_filters() {
        let repo = InMemorySweetRepository::new();
        repo.create(new_sweet("Gulab Jamun", "Indian", 20.0, 3)).await.unwrap();
        repo.create(new_sweet("Chocolate Fudge", "Western", 35.0, 3)).await.unwrap();
        repo.create(new_sweet("Jalebi", "Indian", 15.0, 3)).await.unwrap();

        let by_name = repo
            .search(&SweetFilter {
                name: Some("jamun".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(by_name.len(), 1);

        let indian_cheap = repo
            .search(&SweetFilter {
                category: Some("Indian".into()),
                max_price: Some(18.0),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(indian_cheap.len(), 1);
        assert_eq!(indian_cheap[0].name, "Jalebi");

        let pricey = repo
            .search(&SweetFilter {
                min_price: Some(30.0),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(pricey[0].name, "Chocolate Fudge");
    }

    #[tokio::test]
    async fn test_partial_update_and_delete() {
        let repo = InMemorySweetRepository::new();
        let sweet = repo.create(new_sweet("Peda", "Indian", 8.0, 2)).await.unwrap();

        let updated = repo
            .update(
                sweet.id,
                SweetUpdate {
                    price: Some(9.5),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.price, 9.5);
        assert_eq!(updated.name, "Peda");

        repo.delete(sweet.id).await.unwrap();
        assert!(matches!(repo.delete(sweet.id).await, Err(SweetError::NotFound)));
    }

    #[test]
    fn test_sweet_serializes_camel_case() {
        let now = OffsetDateTime::now_utc();
        let sweet = Sweet {
            id: Uuid::new_v4(),
            name: "Ladoo".into(),
            category: "Indian".into(),
            price: 10.0,
            quantity: 1,
            created_at: now,
            updated_at: now,
        };
        let json = serde_json::to_value(&sweet).unwrap();
        assert!(json.get("createdAt").is_some());
    }
}

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use saleslens_core::domain::business::BusinessId;
use saleslens_core::domain::promotion::{
    Promotion, PromotionCategory, PromotionId, PromotionSuggestion, SuggestionId,
};
use saleslens_core::errors::StoreError;
use saleslens_core::identity::normalize_name;
use saleslens_core::suggestions::PromotionStore;

use super::{date_text, parse_date, parse_rfc3339, RepositoryError};
use crate::DbPool;

pub struct SqlPromotionRepository {
    pool: DbPool,
}

impl SqlPromotionRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn categories(&self) -> Result<Vec<PromotionCategory>, RepositoryError> {
        let rows =
            sqlx::query("SELECT category_key, label FROM promotion_category ORDER BY rowid ASC")
                .fetch_all(&self.pool)
                .await?;
        rows.iter()
            .map(|row| {
                Ok(PromotionCategory {
                    key: row.try_get("category_key")?,
                    label: row.try_get("label")?,
                })
            })
            .collect()
    }

    pub async fn save_suggestions(
        &self,
        suggestions: &[PromotionSuggestion],
    ) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;
        for suggestion in suggestions {
            sqlx::query(
                "INSERT INTO promotion_suggestion (id, business_id, title, description, created_at)
                 VALUES (?, ?, ?, ?, ?)",
            )
            .bind(&suggestion.id.0)
            .bind(&suggestion.business_id.0)
            .bind(&suggestion.title)
            .bind(&suggestion.description)
            .bind(suggestion.created_at.to_rfc3339())
            .execute(&mut *tx)
            .await?;

            for key in &suggestion.category_keys {
                sqlx::query(
                    "INSERT INTO promotion_suggestion_category (suggestion_id, category_key)
                     VALUES (?, ?)",
                )
                .bind(&suggestion.id.0)
                .bind(key)
                .execute(&mut *tx)
                .await?;
            }
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn suggestions_for(
        &self,
        business_id: &BusinessId,
    ) -> Result<Vec<PromotionSuggestion>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, business_id, title, description, created_at
             FROM promotion_suggestion
             WHERE business_id = ?
             ORDER BY created_at ASC, rowid ASC",
        )
        .bind(&business_id.0)
        .fetch_all(&self.pool)
        .await?;

        let mut suggestions = Vec::with_capacity(rows.len());
        for row in &rows {
            let id: String = row.try_get("id")?;
            let category_keys = sqlx::query(
                "SELECT category_key FROM promotion_suggestion_category
                 WHERE suggestion_id = ?
                 ORDER BY rowid ASC",
            )
            .bind(&id)
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(|row| row.try_get::<String, _>("category_key"))
            .collect::<Result<Vec<_>, _>>()?;

            suggestions.push(PromotionSuggestion {
                id: SuggestionId(id),
                business_id: BusinessId(row.try_get("business_id")?),
                title: row.try_get("title")?,
                description: row.try_get("description")?,
                category_keys,
                created_at: parse_rfc3339(
                    "suggestion created_at",
                    &row.try_get::<String, _>("created_at")?,
                )?,
            });
        }
        Ok(suggestions)
    }

    pub async fn save_promotion(&self, promotion: &Promotion) -> Result<(), RepositoryError> {
        if let Some(end) = promotion.end_date {
            if end < promotion.start_date {
                return Err(RepositoryError::Rejected(format!(
                    "promotion ends ({end}) before it starts ({})",
                    promotion.start_date
                )));
            }
        }
        let product_names = serde_json::to_string(&promotion.product_names)
            .map_err(|error| RepositoryError::Decode(error.to_string()))?;

        sqlx::query(
            "INSERT INTO promotion
                (id, business_id, description, product_names, start_date, end_date, sold_count,
                 created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&promotion.id.0)
        .bind(&promotion.business_id.0)
        .bind(&promotion.description)
        .bind(product_names)
        .bind(date_text(promotion.start_date))
        .bind(promotion.end_date.map(date_text))
        .bind(promotion.sold_count)
        .bind(promotion.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn promotions_for(
        &self,
        business_id: &BusinessId,
    ) -> Result<Vec<Promotion>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, business_id, description, product_names, start_date, end_date,
                    sold_count, created_at
             FROM promotion
             WHERE business_id = ?
             ORDER BY start_date ASC, created_at ASC",
        )
        .bind(&business_id.0)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(promotion_from_row).collect()
    }

    /// Recomputes `sold_count` for the promotions touched by new sales of
    /// `product_names` between `start` and `end`. Names compare normalized.
    pub async fn refresh(
        &self,
        business_id: &BusinessId,
        product_names: &[String],
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<u64, RepositoryError> {
        let uploaded = product_names
            .iter()
            .map(|name| normalize_name(name))
            .filter(|name| !name.is_empty())
            .collect::<HashSet<_>>();
        if uploaded.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        let promotions = sqlx::query(
            "SELECT id, business_id, description, product_names, start_date, end_date,
                    sold_count, created_at
             FROM promotion
             WHERE business_id = ?",
        )
        .bind(&business_id.0)
        .fetch_all(&mut *tx)
        .await?
        .iter()
        .map(promotion_from_row)
        .collect::<Result<Vec<_>, _>>()?;

        let mut refreshed = 0;
        for promotion in promotions.iter().filter(|promotion| promotion.overlaps(start, end)) {
            let promoted = promotion
                .product_names
                .iter()
                .map(|name| normalize_name(name))
                .collect::<HashSet<_>>();
            if promoted.is_disjoint(&uploaded) {
                continue;
            }

            let (from, to) = promotion.clamp_range(start, end);
            let rows = sqlx::query(
                "SELECT product_name, units_sold FROM sales_data_point
                 WHERE business_id = ? AND sale_date >= ? AND sale_date <= ?",
            )
            .bind(&business_id.0)
            .bind(date_text(from))
            .bind(date_text(to))
            .fetch_all(&mut *tx)
            .await?;

            let mut sold_count = 0_i64;
            for row in &rows {
                let name: String = row.try_get("product_name")?;
                if promoted.contains(&normalize_name(&name)) {
                    sold_count += row.try_get::<i64, _>("units_sold")?;
                }
            }

            sqlx::query("UPDATE promotion SET sold_count = ? WHERE id = ?")
                .bind(sold_count)
                .bind(&promotion.id.0)
                .execute(&mut *tx)
                .await?;
            refreshed += 1;
        }

        tx.commit().await?;
        Ok(refreshed)
    }
}

fn promotion_from_row(row: &SqliteRow) -> Result<Promotion, RepositoryError> {
    let product_names_raw: String = row.try_get("product_names")?;
    let product_names = serde_json::from_str::<Vec<String>>(&product_names_raw).map_err(|err| {
        RepositoryError::Decode(format!("invalid promotion product_names: {err}"))
    })?;
    let end_date = row
        .try_get::<Option<String>, _>("end_date")?
        .as_deref()
        .map(|value| parse_date("promotion end_date", value))
        .transpose()?;

    Ok(Promotion {
        id: PromotionId(row.try_get("id")?),
        business_id: BusinessId(row.try_get("business_id")?),
        description: row.try_get("description")?,
        product_names,
        start_date: parse_date("promotion start_date", &row.try_get::<String, _>("start_date")?)?,
        end_date,
        sold_count: row.try_get("sold_count")?,
        created_at: parse_rfc3339(
            "promotion created_at",
            &row.try_get::<String, _>("created_at")?,
        )?,
    })
}

#[async_trait]
impl PromotionStore for SqlPromotionRepository {
    async fn list_categories(&self) -> Result<Vec<PromotionCategory>, StoreError> {
        Ok(self.categories().await?)
    }

    async fn insert_suggestions(
        &self,
        suggestions: &[PromotionSuggestion],
    ) -> Result<(), StoreError> {
        Ok(self.save_suggestions(suggestions).await?)
    }

    async fn list_suggestions(
        &self,
        business_id: &BusinessId,
    ) -> Result<Vec<PromotionSuggestion>, StoreError> {
        Ok(self.suggestions_for(business_id).await?)
    }

    async fn create_promotion(&self, promotion: &Promotion) -> Result<(), StoreError> {
        Ok(self.save_promotion(promotion).await?)
    }

    async fn list_promotions(
        &self,
        business_id: &BusinessId,
    ) -> Result<Vec<Promotion>, StoreError> {
        Ok(self.promotions_for(business_id).await?)
    }

    async fn refresh_sold_counts(
        &self,
        business_id: &BusinessId,
        product_names: &[String],
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<u64, StoreError> {
        Ok(self.refresh(business_id, product_names, start, end).await?)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, TimeZone, Utc};
    use rust_decimal::Decimal;

    use saleslens_core::domain::business::Business;
    use saleslens_core::domain::promotion::{
        Promotion, PromotionId, PromotionSuggestion, SuggestionId,
    };
    use saleslens_core::domain::sales::{SalesLine, SalesOrigin, SalesRecordBatch};

    use super::SqlPromotionRepository;
    use crate::repositories::{
        BusinessRepository, RepositoryError, SqlBusinessRepository, SqlLedgerRepository,
    };
    use crate::{connect_with_settings, migrations, DbPool};

    async fn setup() -> (DbPool, Business) {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        let business = Business::new("Corner Cafe").expect("business");
        SqlBusinessRepository::new(pool.clone()).create(&business).await.expect("create");
        (pool, business)
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, d).expect("date")
    }

    fn promotion(business: &Business, id: &str, start: u32, end: Option<u32>) -> Promotion {
        Promotion {
            id: PromotionId(id.to_string()),
            business_id: business.id.clone(),
            description: "Latte week".to_string(),
            product_names: vec!["Iced Latte".to_string()],
            start_date: day(start),
            end_date: end.map(day),
            sold_count: 0,
            created_at: Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).single().expect("ts"),
        }
    }

    async fn record_sales(pool: &DbPool, business: &Business, sales: &[(u32, &str, i64)]) {
        let lines = sales
            .iter()
            .map(|(d, name, units)| SalesLine {
                date: day(*d),
                product_id: format!("gen_{}", name.to_lowercase().replace(' ', "_")),
                product_name: name.to_string(),
                unit_price: Decimal::new(500, 2),
                units_sold: *units,
                revenue: Decimal::new(500 * units, 2),
                origin: SalesOrigin::Upload,
            })
            .collect::<Vec<_>>();
        let batch = SalesRecordBatch::start(
            business.id.clone(),
            SalesOrigin::Upload,
            "sales.csv",
            Utc::now(),
        );
        SqlLedgerRepository::new(pool.clone()).commit(batch, &lines).await.expect("commit");
    }

    #[tokio::test]
    async fn seeded_categories_are_listed_in_seed_order() {
        let (pool, _) = setup().await;
        let keys = SqlPromotionRepository::new(pool)
            .categories()
            .await
            .expect("categories")
            .into_iter()
            .map(|category| category.key)
            .collect::<Vec<_>>();
        assert_eq!(keys.first().map(String::as_str), Some("discount"));
        assert_eq!(keys.len(), 7);
    }

    #[tokio::test]
    async fn suggestions_round_trip_with_their_categories() {
        let (pool, business) = setup().await;
        let repo = SqlPromotionRepository::new(pool);
        let suggestion = PromotionSuggestion {
            id: SuggestionId::generate(),
            business_id: business.id.clone(),
            title: "Two-for-Tuesday".to_string(),
            description: "Pair a pastry with any latte.".to_string(),
            category_keys: vec!["bundle".to_string(), "discount".to_string()],
            created_at: Utc::now(),
        };

        repo.save_suggestions(std::slice::from_ref(&suggestion)).await.expect("save");
        let stored = repo.suggestions_for(&business.id).await.expect("list");

        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].title, suggestion.title);
        assert_eq!(stored[0].category_keys, suggestion.category_keys);
    }

    #[tokio::test]
    async fn unknown_category_aborts_the_whole_insert() {
        let (pool, business) = setup().await;
        let repo = SqlPromotionRepository::new(pool);
        let good = PromotionSuggestion {
            id: SuggestionId::generate(),
            business_id: business.id.clone(),
            title: "Happy hour".to_string(),
            description: "Half price 3-5pm".to_string(),
            category_keys: vec!["happy_hour".to_string()],
            created_at: Utc::now(),
        };
        let bad = PromotionSuggestion {
            id: SuggestionId::generate(),
            category_keys: vec!["flash_sale".to_string()],
            ..good.clone()
        };

        assert!(repo.save_suggestions(&[good, bad]).await.is_err());
        assert!(repo.suggestions_for(&business.id).await.expect("list").is_empty());
    }

    #[tokio::test]
    async fn sold_count_sums_units_inside_both_ranges() {
        let (pool, business) = setup().await;
        let repo = SqlPromotionRepository::new(pool.clone());
        repo.save_promotion(&promotion(&business, "promo-1", 3, Some(6))).await.expect("save");
        repo.save_promotion(&promotion(&business, "promo-2", 20, None)).await.expect("save");
        record_sales(
            &pool,
            &business,
            &[(2, "Iced Latte", 10), (4, "iced latte", 2), (6, "Iced Latte", 3), (5, "Scone", 7)],
        )
        .await;

        let refreshed = repo
            .refresh(&business.id, &["ICED LATTE".to_string()], day(1), day(10))
            .await
            .expect("refresh");

        assert_eq!(refreshed, 1);
        let promotions = repo.promotions_for(&business.id).await.expect("list");
        assert_eq!(promotions[0].sold_count, 5);
        assert_eq!(promotions[1].sold_count, 0);
    }

    #[tokio::test]
    async fn promotion_ending_before_it_starts_is_rejected() {
        let (pool, business) = setup().await;
        let repo = SqlPromotionRepository::new(pool);
        let error = repo
            .save_promotion(&promotion(&business, "promo-1", 9, Some(3)))
            .await
            .expect_err("inverted range");
        assert!(matches!(error, RepositoryError::Rejected(_)));
    }
}

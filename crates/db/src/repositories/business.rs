use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use saleslens_core::domain::business::{Business, BusinessId};
use saleslens_core::errors::StoreError;
use saleslens_core::sync::SyncStateStore;

use super::{parse_rfc3339, BusinessRepository, RepositoryError};
use crate::DbPool;

const BUSINESS_COLUMNS: &str = "id, name, category, target_customers, vibe, utc_offset_minutes,
     commerce_access_token, last_sync_at, created_at";

pub struct SqlBusinessRepository {
    pool: DbPool,
}

impl SqlBusinessRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn business_from_row(row: &SqliteRow) -> Result<Business, RepositoryError> {
    let last_sync_at = row
        .try_get::<Option<String>, _>("last_sync_at")?
        .as_deref()
        .map(|ts| parse_rfc3339("business last_sync_at", ts))
        .transpose()?;

    Ok(Business {
        id: BusinessId(row.try_get("id")?),
        name: row.try_get("name")?,
        category: row.try_get("category")?,
        target_customers: row.try_get("target_customers")?,
        vibe: row.try_get("vibe")?,
        utc_offset_minutes: row.try_get("utc_offset_minutes")?,
        commerce_access_token: row
            .try_get::<Option<String>, _>("commerce_access_token")?
            .map(SecretString::from),
        last_sync_at,
        created_at: parse_rfc3339(
            "business created_at",
            &row.try_get::<String, _>("created_at")?,
        )?,
    })
}

#[async_trait]
impl BusinessRepository for SqlBusinessRepository {
    async fn create(&self, business: &Business) -> Result<(), RepositoryError> {
        business.validate().map_err(|error| RepositoryError::Rejected(error.to_string()))?;

        sqlx::query(
            "INSERT INTO business
                (id, name, category, target_customers, vibe, utc_offset_minutes,
                 commerce_access_token, last_sync_at, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&business.id.0)
        .bind(&business.name)
        .bind(&business.category)
        .bind(&business.target_customers)
        .bind(&business.vibe)
        .bind(business.utc_offset_minutes)
        .bind(
            business
                .commerce_access_token
                .as_ref()
                .map(|token| token.expose_secret().to_string()),
        )
        .bind(business.last_sync_at.map(|ts| ts.to_rfc3339()))
        .bind(business.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_by_id(&self, id: &BusinessId) -> Result<Option<Business>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {BUSINESS_COLUMNS} FROM business WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(business_from_row).transpose()
    }

    async fn list(&self) -> Result<Vec<Business>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {BUSINESS_COLUMNS} FROM business ORDER BY created_at ASC, id ASC"
        ))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(business_from_row).collect()
    }

    async fn set_access_token(
        &self,
        id: &BusinessId,
        token: SecretString,
    ) -> Result<(), RepositoryError> {
        let updated = sqlx::query("UPDATE business SET commerce_access_token = ? WHERE id = ?")
            .bind(token.expose_secret().to_string())
            .bind(&id.0)
            .execute(&self.pool)
            .await?;
        if updated.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(format!("business {id}")));
        }
        Ok(())
    }
}

/// Cursor comparison is on the stored RFC 3339 text, which is always written
/// by `DateTime::to_rfc3339` and so round-trips exactly.
fn cursor_text(cursor: Option<DateTime<Utc>>) -> Option<String> {
    cursor.map(|ts| ts.to_rfc3339())
}

impl SqlBusinessRepository {
    async fn take_claim(
        &self,
        id: &BusinessId,
        expected_cursor: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let claimed = sqlx::query(
            "INSERT INTO sync_claim (business_id, expires_at)
             SELECT id, ? FROM business WHERE id = ? AND last_sync_at IS ?
             ON CONFLICT (business_id) DO UPDATE SET expires_at = excluded.expires_at
             WHERE sync_claim.expires_at <= ?",
        )
        .bind(expires_at.timestamp())
        .bind(&id.0)
        .bind(cursor_text(expected_cursor))
        .bind(now.timestamp())
        .execute(&self.pool)
        .await?;
        Ok(claimed.rows_affected() == 1)
    }

    async fn write_cursor(
        &self,
        id: &BusinessId,
        expected_cursor: Option<DateTime<Utc>>,
        synced_through: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let updated =
            sqlx::query("UPDATE business SET last_sync_at = ? WHERE id = ? AND last_sync_at IS ?")
                .bind(synced_through.to_rfc3339())
                .bind(&id.0)
                .bind(cursor_text(expected_cursor))
                .execute(&mut *tx)
                .await?;
        if updated.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }
        sqlx::query("DELETE FROM sync_claim WHERE business_id = ?")
            .bind(&id.0)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(true)
    }

    async fn drop_claim(&self, id: &BusinessId) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM sync_claim WHERE business_id = ?")
            .bind(&id.0)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl SyncStateStore for SqlBusinessRepository {
    async fn claim(
        &self,
        business_id: &BusinessId,
        expected_cursor: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        Ok(self.take_claim(business_id, expected_cursor, now, expires_at).await?)
    }

    async fn advance_cursor(
        &self,
        business_id: &BusinessId,
        expected_cursor: Option<DateTime<Utc>>,
        synced_through: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        Ok(self.write_cursor(business_id, expected_cursor, synced_through).await?)
    }

    async fn release(&self, business_id: &BusinessId) -> Result<(), StoreError> {
        Ok(self.drop_claim(business_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};
    use secrecy::{ExposeSecret, SecretString};

    use saleslens_core::domain::business::{Business, BusinessId};
    use saleslens_core::sync::SyncStateStore;

    use super::SqlBusinessRepository;
    use crate::repositories::{BusinessRepository, RepositoryError};
    use crate::{connect_with_settings, migrations};

    async fn repository() -> SqlBusinessRepository {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        SqlBusinessRepository::new(pool)
    }

    #[tokio::test]
    async fn business_round_trip_keeps_profile_and_offset() {
        let repo = repository().await;
        let mut business = Business::new("Corner Cafe").expect("business");
        business.category = Some("cafe".to_string());
        business.vibe = Some("cozy".to_string());
        business.utc_offset_minutes = -300;

        repo.create(&business).await.expect("create");
        let found = repo.find_by_id(&business.id).await.expect("find").expect("present");

        assert_eq!(found.name, "Corner Cafe");
        assert_eq!(found.category.as_deref(), Some("cafe"));
        assert_eq!(found.utc_offset_minutes, -300);
        assert!(found.last_sync_at.is_none());
        assert!(!found.is_commerce_connected());
    }

    #[tokio::test]
    async fn only_connected_businesses_are_listed_for_sync() {
        let repo = repository().await;
        let first = Business::new("Corner Cafe").expect("business");
        let second = Business::new("Night Bakery").expect("business");
        repo.create(&first).await.expect("create");
        repo.create(&second).await.expect("create");

        repo.set_access_token(&second.id, SecretString::from("sq-token".to_string()))
            .await
            .expect("connect");

        let connected = repo.list_connected().await.expect("list");
        assert_eq!(connected.len(), 1);
        assert_eq!(connected[0].id, second.id);
        let token = connected[0].commerce_access_token.as_ref().expect("token");
        assert_eq!(token.expose_secret(), "sq-token");
        assert_eq!(repo.list().await.expect("list").len(), 2);
    }

    #[tokio::test]
    async fn cursor_advances_on_the_stored_business() {
        let repo = repository().await;
        let business = Business::new("Corner Cafe").expect("business");
        repo.create(&business).await.expect("create");
        let synced = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).single().expect("ts");

        assert!(repo.advance_cursor(&business.id, None, synced).await.expect("advance"));

        let found = repo.find_by_id(&business.id).await.expect("find").expect("present");
        assert_eq!(found.last_sync_at, Some(synced));
    }

    #[tokio::test]
    async fn cursor_is_not_moved_from_a_stale_expectation() {
        let repo = repository().await;
        let business = Business::new("Corner Cafe").expect("business");
        repo.create(&business).await.expect("create");
        let first = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).single().expect("ts");
        let second = Utc.with_ymd_and_hms(2024, 6, 1, 13, 0, 0).single().expect("ts");
        assert!(repo.advance_cursor(&business.id, None, first).await.expect("advance"));

        let moved = repo.advance_cursor(&business.id, None, second).await.expect("advance");

        assert!(!moved);
        let found = repo.find_by_id(&business.id).await.expect("find").expect("present");
        assert_eq!(found.last_sync_at, Some(first));
    }

    #[tokio::test]
    async fn sync_claim_is_exclusive_until_released_or_expired() {
        let repo = repository().await;
        let business = Business::new("Corner Cafe").expect("business");
        repo.create(&business).await.expect("create");
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).single().expect("ts");
        let until = now + Duration::minutes(15);

        assert!(repo.claim(&business.id, None, now, until).await.expect("claim"));
        assert!(!repo.claim(&business.id, None, now, until).await.expect("second claim"));

        repo.release(&business.id).await.expect("release");
        assert!(repo.claim(&business.id, None, now, until).await.expect("after release"));

        let later = until + Duration::seconds(1);
        let takeover = repo
            .claim(&business.id, None, later, later + Duration::minutes(15))
            .await
            .expect("after expiry");
        assert!(takeover);
    }

    #[tokio::test]
    async fn sync_claim_requires_the_expected_cursor() {
        let repo = repository().await;
        let business = Business::new("Corner Cafe").expect("business");
        repo.create(&business).await.expect("create");
        let synced = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).single().expect("ts");
        let now = synced + Duration::hours(1);
        assert!(repo.advance_cursor(&business.id, None, synced).await.expect("advance"));

        let stale = repo.claim(&business.id, None, now, now + Duration::minutes(15)).await;
        let fresh = repo.claim(&business.id, Some(synced), now, now + Duration::minutes(15)).await;

        assert!(!stale.expect("stale claim"));
        assert!(fresh.expect("fresh claim"));
    }

    #[tokio::test]
    async fn unknown_business_cannot_be_connected() {
        let repo = repository().await;
        let error = repo
            .set_access_token(
                &BusinessId("biz-missing".to_string()),
                SecretString::from("t".to_string()),
            )
            .await
            .expect_err("missing business");
        assert!(matches!(error, RepositoryError::NotFound(_)));
    }

    #[tokio::test]
    async fn invalid_business_is_rejected_before_insert() {
        let repo = repository().await;
        let mut business = Business::new("Corner Cafe").expect("business");
        business.name = "ab".to_string();
        assert!(matches!(repo.create(&business).await, Err(RepositoryError::Rejected(_))));
        assert!(repo.list().await.expect("list").is_empty());
    }
}

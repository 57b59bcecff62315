use chrono::{DateTime, FixedOffset, NaiveDate, Offset, Utc};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::DomainError;

const NAME_MIN_CHARS: usize = 3;
const PROFILE_FIELD_MAX_CHARS: usize = 32;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BusinessId(pub String);

impl BusinessId {
    pub fn generate() -> Self {
        Self(format!("biz-{}", Uuid::new_v4().simple()))
    }
}

impl std::fmt::Display for BusinessId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Business aggregate as seen by the ingestion pipeline.
///
/// `last_sync_at` is the commerce sync cursor. It travels with the aggregate
/// into a sync run and comes back advanced in the run report; nothing else
/// holds it.
#[derive(Clone, Debug)]
pub struct Business {
    pub id: BusinessId,
    pub name: String,
    pub category: Option<String>,
    pub target_customers: Option<String>,
    pub vibe: Option<String>,
    pub utc_offset_minutes: i32,
    pub commerce_access_token: Option<SecretString>,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Descriptive context handed to the suggestion model.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusinessContext {
    pub name: String,
    pub category: Option<String>,
    pub target_customers: Option<String>,
    pub vibe: Option<String>,
}

impl Business {
    pub fn new(name: impl Into<String>) -> Result<Self, DomainError> {
        let business = Self {
            id: BusinessId::generate(),
            name: name.into().trim().to_string(),
            category: None,
            target_customers: None,
            vibe: None,
            utc_offset_minutes: 0,
            commerce_access_token: None,
            last_sync_at: None,
            created_at: Utc::now(),
        };
        business.validate()?;
        Ok(business)
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        let name_len = self.name.trim().chars().count();
        if name_len < NAME_MIN_CHARS {
            return Err(DomainError::InvalidBusiness(
                "business name must be at least 3 characters".to_string(),
            ));
        }
        if name_len > PROFILE_FIELD_MAX_CHARS {
            return Err(DomainError::InvalidBusiness(
                "business name cannot exceed 32 characters".to_string(),
            ));
        }

        for (field, value) in [
            ("category", &self.category),
            ("target_customers", &self.target_customers),
            ("vibe", &self.vibe),
        ] {
            if value.as_ref().is_some_and(|v| v.chars().count() > PROFILE_FIELD_MAX_CHARS) {
                return Err(DomainError::InvalidBusiness(format!(
                    "{field} cannot exceed 32 characters"
                )));
            }
        }

        if FixedOffset::east_opt(self.utc_offset_minutes.saturating_mul(60)).is_none() {
            return Err(DomainError::InvalidBusiness(format!(
                "utc offset of {} minutes is out of range",
                self.utc_offset_minutes
            )));
        }

        Ok(())
    }

    pub fn local_offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.utc_offset_minutes.saturating_mul(60))
            .unwrap_or_else(|| Utc.fix())
    }

    /// Calendar date of `instant` on the business's wall clock.
    pub fn local_date(&self, instant: DateTime<Utc>) -> NaiveDate {
        instant.with_timezone(&self.local_offset()).date_naive()
    }

    pub fn is_commerce_connected(&self) -> bool {
        self.commerce_access_token.is_some()
    }

    pub fn context(&self) -> BusinessContext {
        BusinessContext {
            name: self.name.clone(),
            category: self.category.clone(),
            target_customers: self.target_customers.clone(),
            vibe: self.vibe.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, TimeZone, Utc};

    use super::Business;
    use crate::errors::DomainError;

    #[test]
    fn rejects_short_and_long_names() {
        assert!(matches!(Business::new("ab"), Err(DomainError::InvalidBusiness(_))));
        assert!(matches!(
            Business::new("a".repeat(33)),
            Err(DomainError::InvalidBusiness(_))
        ));
        assert!(Business::new("  Corner Cafe  ").is_ok());
    }

    #[test]
    fn local_date_follows_utc_offset() {
        let mut business = Business::new("Corner Cafe").expect("valid business");
        let instant = Utc.with_ymd_and_hms(2024, 3, 1, 23, 30, 0).single().expect("instant");

        assert_eq!(business.local_date(instant), NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());

        business.utc_offset_minutes = 60;
        assert_eq!(business.local_date(instant), NaiveDate::from_ymd_opt(2024, 3, 2).unwrap());

        business.utc_offset_minutes = -8 * 60;
        assert_eq!(business.local_date(instant), NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
    }

    #[test]
    fn profile_fields_are_length_checked() {
        let mut business = Business::new("Corner Cafe").expect("valid business");
        business.vibe = Some("x".repeat(40));
        let error = business.validate().expect_err("vibe too long");
        assert!(error.to_string().contains("vibe"));
    }
}

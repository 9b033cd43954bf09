use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Bumped whenever the generation table layout changes
pub const SCHEMA_VERSION: i64 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct GenerationMetadata {
    pub generation_id: String,
    pub version_tag: String,
    pub schema_version: i64,
    pub orange_book_source_date: Option<NaiveDate>,
    /// Publication month of the biologics dataset, `YYYY-MM`
    pub purple_book_source_month: Option<String>,
    pub orange_book_sha256: Option<String>,
    pub purple_book_sha256: Option<String>,
    pub product_count: i64,
    pub patent_count: i64,
    pub exclusivity_count: i64,
    pub biologic_count: i64,
    pub rows_skipped: i64,
    pub built_at: DateTime<Utc>,
}

impl GenerationMetadata {
    pub fn age_days(&self, now: DateTime<Utc>) -> i64 {
        (now - self.built_at).num_days()
    }

    /// A generation is stale once it is older than `max_age_days`
    pub fn is_stale(&self, now: DateTime<Utc>, max_age_days: i64) -> bool {
        now - self.built_at > chrono::Duration::days(max_age_days)
    }

    pub fn version_tag_for(orange_book_date: Option<NaiveDate>, purple_book_month: Option<&str>) -> String {
        format!(
            "ob-{}.pb-{}",
            orange_book_date
                .map(|d| d.format("%Y%m%d").to_string())
                .unwrap_or_else(|| "unknown".to_string()),
            purple_book_month.map(|m| m.replace('-', "")).unwrap_or_else(|| "unknown".to_string()),
        )
    }
}

/// Snapshot of the store for operators
#[derive(Debug, Clone, Serialize)]
pub struct StoreStatus {
    pub active_generation: Option<GenerationMetadata>,
    pub age_days: Option<i64>,
    pub is_stale: bool,
    pub rebuild_in_progress: bool,
    pub last_rebuild_error: Option<String>,
}

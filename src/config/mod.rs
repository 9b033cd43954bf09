use std::env;
use std::path::PathBuf;

/// Read an env var and parse it, falling back to `default` when unset or malformed.
fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

/// Remote dataset locations and fetch policy
#[derive(Debug, Clone)]
pub struct SourceConfig {
    pub orange_book_url: String,
    /// `{year}` and `{month}` (lowercase English month name) are substituted for each month tried.
    pub purple_book_url_template: String,
    pub max_lookback_months: u32,
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
    pub request_timeout_secs: u64,
    pub user_agent: String,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            orange_book_url: env::var("ORANGE_BOOK_URL")
                .unwrap_or_else(|_| "https://www.fda.gov/media/76860/download".to_string()),
            purple_book_url_template: env::var("PURPLE_BOOK_URL_TEMPLATE").unwrap_or_else(|_| {
                "https://purplebooksearch.fda.gov/files/{year}/purplebook-search-{month}-data-download.csv"
                    .to_string()
            }),
            max_lookback_months: env_or("PURPLE_BOOK_MAX_LOOKBACK_MONTHS", 12),
            max_retries: env_or("FDA_FETCH_MAX_RETRIES", 3).max(1),
            retry_base_delay_ms: env_or("FDA_FETCH_RETRY_BASE_DELAY_MS", 1000),
            request_timeout_secs: env_or("FDA_REQUEST_TIMEOUT_SECS", 120),
            user_agent: "Atlas-Regdata/0.1".to_string(),
        }
    }
}

/// Where generations live on disk
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub data_dir: PathBuf,
    pub read_pool_size: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: env::var("REGDATA_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./data/regdata")),
            read_pool_size: env_or("REGDATA_READ_POOL_SIZE", 4).max(1),
        }
    }
}

impl StoreConfig {
    pub fn in_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            read_pool_size: 4,
        }
    }
}

/// Rebuild policy
#[derive(Debug, Clone)]
pub struct FreshnessConfig {
    pub max_age_days: i64,
    /// After a failed rebuild that fell back to stale data, wait this long before trying again.
    pub retry_cooldown_secs: u64,
    pub refresh_interval_hours: u64,
}

impl Default for FreshnessConfig {
    fn default() -> Self {
        Self {
            max_age_days: env_or("REGDATA_MAX_AGE_DAYS", 30),
            retry_cooldown_secs: env_or("REGDATA_RETRY_COOLDOWN_SECS", 3600),
            refresh_interval_hours: env_or("REGDATA_REFRESH_INTERVAL_HOURS", 24).max(1),
        }
    }
}

#[derive(Debug, Clone)]
pub struct QueryConfig {
    pub max_search_results: usize,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            max_search_results: env_or("REGDATA_MAX_SEARCH_RESULTS", 200).max(1),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    pub source: SourceConfig,
    pub store: StoreConfig,
    pub freshness: FreshnessConfig,
    pub query: QueryConfig,
}

impl EngineConfig {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        Self::default()
    }
}

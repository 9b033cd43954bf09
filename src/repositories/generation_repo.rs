use sqlx::{query, query_as, Row, SqlitePool};

use crate::error::{EngineError, Result};
use crate::models::generation::{GenerationMetadata, SCHEMA_VERSION};
use crate::repositories::schema::REQUIRED_TABLES;

pub struct GenerationRepository {
    pool: SqlitePool,
}

impl GenerationRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn metadata(&self) -> Result<Option<GenerationMetadata>> {
        let meta = query_as::<_, GenerationMetadata>("SELECT * FROM generation_meta LIMIT 1")
            .fetch_optional(&self.pool)
            .await?;

        Ok(meta)
    }

    /// Check that a generation file on disk is complete and readable by this build
    pub async fn verify(&self) -> Result<GenerationMetadata> {
        let rows = query("SELECT name FROM sqlite_master WHERE type = 'table'")
            .fetch_all(&self.pool)
            .await?;
        let present: Vec<String> = rows
            .iter()
            .map(|row| row.try_get::<String, _>("name"))
            .collect::<std::result::Result<_, _>>()?;

        if let Some(missing) = REQUIRED_TABLES
            .iter()
            .find(|table| !present.iter().any(|name| name == *table))
        {
            return Err(EngineError::Unavailable(format!(
                "generation is missing table {}",
                missing
            )));
        }

        let meta = self.metadata().await?.ok_or_else(|| {
            EngineError::Unavailable("generation has no metadata row".to_string())
        })?;

        if meta.schema_version != SCHEMA_VERSION {
            return Err(EngineError::Unavailable(format!(
                "generation schema version {} does not match {}",
                meta.schema_version, SCHEMA_VERSION
            )));
        }

        Ok(meta)
    }
}

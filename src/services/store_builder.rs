// ============================================================================
// Store Builder - one immutable SQLite file per generation
// ============================================================================
//
// On-disk layout under the data directory:
//
//   generations/<id>.db          a complete, readable generation
//   generations/<id>.db.partial  a build in progress (or an abandoned one)
//   ACTIVE                       id of the generation to serve
//
// A build only ever writes its own `.partial` file. The file becomes a
// `.db` by rename after the transaction commits, and becomes active only
// when ACTIVE is rewritten (temp file + rename). A crash at any point
// leaves the previously active generation untouched.
//
// ============================================================================

use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::{NaiveDate, Utc};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use sqlx::{ConnectOptions, Connection};
use uuid::Uuid;

use crate::error::{EngineError, Result};
use crate::models::generation::{GenerationMetadata, SCHEMA_VERSION};
use crate::repositories::{
    GenerationRepository, GenerationWriter, OrangeBookRepository, PurpleBookRepository,
};
use crate::services::parsers::{OrangeBookData, PurpleBookData};

const ACTIVE_POINTER: &str = "ACTIVE";
const GENERATIONS_DIR: &str = "generations";
const DB_EXTENSION: &str = "db";
const PARTIAL_SUFFIX: &str = ".db.partial";

/// Everything a build consumes: parsed rows plus provenance for the metadata
#[derive(Debug, Clone, Default)]
pub struct ParsedDatasets {
    pub orange_book: OrangeBookData,
    pub purple_book: PurpleBookData,
    pub orange_book_source_date: Option<NaiveDate>,
    /// `YYYY-MM`
    pub purple_book_month: Option<String>,
    pub orange_book_sha256: Option<String>,
    pub purple_book_sha256: Option<String>,
}

impl ParsedDatasets {
    pub fn rows_skipped(&self) -> usize {
        self.orange_book.rows_skipped() + self.purple_book.report.rows_skipped
    }
}

/// A built, read-only generation
#[derive(Debug)]
pub struct Generation {
    pub metadata: GenerationMetadata,
    path: PathBuf,
    pool: SqlitePool,
}

impl Generation {
    /// Open an existing generation file read-only and check it is complete
    pub async fn open(path: &Path, read_pool_size: u32) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .read_only(true)
            .journal_mode(SqliteJournalMode::Delete);

        let pool = SqlitePoolOptions::new()
            .max_connections(read_pool_size.max(1))
            .connect_with(options)
            .await?;

        let metadata = match GenerationRepository::new(pool.clone()).verify().await {
            Ok(meta) => meta,
            Err(e) => {
                pool.close().await;
                return Err(e);
            }
        };

        Ok(Self {
            metadata,
            path: path.to_path_buf(),
            pool,
        })
    }

    pub fn id(&self) -> &str {
        &self.metadata.generation_id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn orange_book(&self) -> OrangeBookRepository {
        OrangeBookRepository::new(self.pool.clone())
    }

    pub fn purple_book(&self) -> PurpleBookRepository {
        PurpleBookRepository::new(self.pool.clone())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// Paths of the on-disk store
#[derive(Debug, Clone)]
pub struct StoreLayout {
    data_dir: PathBuf,
}

impl StoreLayout {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    pub fn generations_dir(&self) -> PathBuf {
        self.data_dir.join(GENERATIONS_DIR)
    }

    pub fn generation_path(&self, generation_id: &str) -> PathBuf {
        self.generations_dir()
            .join(format!("{}.{}", generation_id, DB_EXTENSION))
    }

    pub fn partial_path(&self, generation_id: &str) -> PathBuf {
        self.generations_dir()
            .join(format!("{}{}", generation_id, PARTIAL_SUFFIX))
    }

    pub fn active_pointer_path(&self) -> PathBuf {
        self.data_dir.join(ACTIVE_POINTER)
    }

    pub async fn ensure_dirs(&self) -> Result<()> {
        tokio::fs::create_dir_all(self.generations_dir()).await?;
        Ok(())
    }

    pub async fn read_active_pointer(&self) -> Result<Option<String>> {
        match tokio::fs::read_to_string(self.active_pointer_path()).await {
            Ok(content) => {
                let id = content.trim();
                Ok(if id.is_empty() { None } else { Some(id.to_string()) })
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Replace ACTIVE atomically
    pub async fn write_active_pointer(&self, generation_id: &str) -> Result<()> {
        let target = self.active_pointer_path();
        let temp = self.data_dir.join(format!("{}.tmp", ACTIVE_POINTER));
        tokio::fs::write(&temp, generation_id.as_bytes()).await?;
        tokio::fs::rename(&temp, &target).await?;
        Ok(())
    }

    /// Delete abandoned partial builds and every generation not in `keep`.
    /// Returns the number of files removed.
    pub async fn sweep(&self, keep: &[&str]) -> Result<usize> {
        let mut removed = 0;
        let mut entries = match tokio::fs::read_dir(self.generations_dir()).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            let is_partial = name.ends_with(PARTIAL_SUFFIX);
            let is_stale_generation = name
                .strip_suffix(&format!(".{}", DB_EXTENSION))
                .map(|id| !keep.contains(&id))
                .unwrap_or(false);

            if is_partial || is_stale_generation {
                match tokio::fs::remove_file(entry.path()).await {
                    Ok(()) => {
                        tracing::debug!("Removed generation file {}", name);
                        removed += 1;
                    }
                    Err(e) => tracing::warn!("Could not remove generation file {}: {}", name, e),
                }
            }
        }

        Ok(removed)
    }
}

/// Sortable, collision-free generation id: `20260918T101500-1a2b3c4d`
pub fn new_generation_id() -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{}-{}", Utc::now().format("%Y%m%dT%H%M%S"), &suffix[..8])
}

pub struct StoreBuilder {
    layout: StoreLayout,
    read_pool_size: u32,
}

impl StoreBuilder {
    pub fn new(layout: StoreLayout, read_pool_size: u32) -> Self {
        Self {
            layout,
            read_pool_size,
        }
    }

    /// Write `data` as a new generation and open it. On failure nothing is left behind.
    pub async fn build(&self, generation_id: &str, data: &ParsedDatasets) -> Result<Generation> {
        let started = Instant::now();
        self.layout.ensure_dirs().await.map_err(as_build_error)?;

        let partial = self.layout.partial_path(generation_id);
        let target = self.layout.generation_path(generation_id);
        remove_if_exists(&partial).await;

        if let Err(e) = Self::write_generation(&partial, generation_id, data).await {
            remove_if_exists(&partial).await;
            return Err(as_build_error(e));
        }

        if let Err(e) = tokio::fs::rename(&partial, &target).await {
            remove_if_exists(&partial).await;
            return Err(EngineError::Build(format!(
                "Could not finalize generation {}: {}",
                generation_id, e
            )));
        }

        let generation = match Generation::open(&target, self.read_pool_size).await {
            Ok(generation) => generation,
            Err(e) => {
                remove_if_exists(&target).await;
                return Err(as_build_error(e));
            }
        };

        tracing::info!(
            "Built generation {} ({}) in {}ms: {} products, {} patents, {} exclusivities, {} biologics",
            generation_id,
            generation.metadata.version_tag,
            started.elapsed().as_millis(),
            generation.metadata.product_count,
            generation.metadata.patent_count,
            generation.metadata.exclusivity_count,
            generation.metadata.biologic_count
        );

        Ok(generation)
    }

    async fn write_generation(path: &Path, generation_id: &str, data: &ParsedDatasets) -> Result<()> {
        let mut conn = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Delete)
            .synchronous(SqliteSynchronous::Normal)
            .connect()
            .await?;

        let mut tx = conn.begin().await?;

        GenerationWriter::create_tables(&mut tx).await?;

        let ob = &data.orange_book;
        let products = GenerationWriter::insert_products(&mut tx, &ob.products).await?;
        let patents = GenerationWriter::insert_patents(&mut tx, &ob.patents).await?;
        let exclusivities = GenerationWriter::insert_exclusivities(&mut tx, &ob.exclusivities).await?;
        let biologics = GenerationWriter::insert_biologics(&mut tx, &data.purple_book.biologics).await?;

        GenerationWriter::build_indexes(&mut tx).await?;

        let metadata = GenerationMetadata {
            generation_id: generation_id.to_string(),
            version_tag: GenerationMetadata::version_tag_for(
                data.orange_book_source_date,
                data.purple_book_month.as_deref(),
            ),
            schema_version: SCHEMA_VERSION,
            orange_book_source_date: data.orange_book_source_date,
            purple_book_source_month: data.purple_book_month.clone(),
            orange_book_sha256: data.orange_book_sha256.clone(),
            purple_book_sha256: data.purple_book_sha256.clone(),
            product_count: products as i64,
            patent_count: patents as i64,
            exclusivity_count: exclusivities as i64,
            biologic_count: biologics as i64,
            rows_skipped: data.rows_skipped() as i64,
            built_at: Utc::now(),
        };
        GenerationWriter::insert_metadata(&mut tx, &metadata).await?;

        tx.commit().await?;
        conn.close().await?;
        Ok(())
    }
}

fn as_build_error(e: EngineError) -> EngineError {
    match e {
        EngineError::Build(_) => e,
        other => EngineError::Build(other.to_string()),
    }
}

async fn remove_if_exists(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!("Could not remove {}: {}", path.display(), e);
        }
    }
}

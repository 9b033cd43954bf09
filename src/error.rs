// ============================================================================
// Engine Errors
// ============================================================================
//
// Four failure classes surface from the engine:
//
// 1. **Acquisition** - a remote dataset could not be fetched after retries
// 2. **Parse**       - a mandatory file produced zero usable rows
// 3. **Build**       - the generation database could not be written
// 4. **Validation**  - the caller passed a missing or malformed parameter
//
// "Not found" is never an error: queries return empty result sets.
//
// Acquisition/Parse/Build failures are absorbed by the freshness manager
// whenever a previous generation can keep serving. They only reach the
// caller when there is nothing to fall back to.
//
// ============================================================================

use std::sync::Arc;

use thiserror::Error;
use validator::ValidationErrors;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Acquisition error: {0}")]
    Acquisition(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Build error: {0}")]
    Build(String),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationErrors),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Data unavailable: {0}")]
    Unavailable(String),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl EngineError {
    /// True when the caller supplied a bad parameter; retrying won't help.
    pub fn is_validation(&self) -> bool {
        matches!(self, EngineError::Validation(_) | EngineError::InvalidInput(_))
    }

    /// True for failures of the acquire/parse/build pipeline.
    pub fn is_pipeline_failure(&self) -> bool {
        matches!(
            self,
            EngineError::Acquisition(_) | EngineError::Parse(_) | EngineError::Build(_)
        )
    }
}

impl EngineError {
    /// Recover an owned error from one shared between the callers of a
    /// single build. Variants that can't be cloned keep their message.
    pub fn from_shared(shared: Arc<EngineError>) -> Self {
        match Arc::try_unwrap(shared) {
            Ok(owned) => owned,
            Err(shared) => match shared.as_ref() {
                EngineError::Acquisition(msg) => EngineError::Acquisition(msg.clone()),
                EngineError::Parse(msg) => EngineError::Parse(msg.clone()),
                EngineError::Build(msg) => EngineError::Build(msg.clone()),
                EngineError::InvalidInput(msg) => EngineError::InvalidInput(msg.clone()),
                EngineError::Unavailable(msg) => EngineError::Unavailable(msg.clone()),
                EngineError::Validation(errors) => EngineError::Validation(errors.clone()),
                EngineError::Database(e) => EngineError::Build(format!("database: {}", e)),
                EngineError::Io(e) => EngineError::Io(std::io::Error::new(e.kind(), e.to_string())),
                EngineError::Internal(e) => EngineError::Internal(anyhow::anyhow!("{:#}", e)),
            },
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;

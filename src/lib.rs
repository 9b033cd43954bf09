pub mod config;
pub mod error;
pub mod models;
pub mod repositories;
pub mod services;
pub mod utils;

pub use config::EngineConfig;
pub use error::{EngineError, Result};
pub use services::RegulatoryDataEngine;

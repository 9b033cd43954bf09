pub mod engine;
pub mod freshness_manager;
pub mod parsers;
pub mod patent_cliff;
pub mod query_engine;
pub mod source_fetcher;
pub mod store_builder;

pub use engine::RegulatoryDataEngine;
pub use freshness_manager::{FreshnessManager, FreshnessScheduler, GenerationHandle};
pub use patent_cliff::PatentCliffAnalyzer;
pub use query_engine::QueryEngine;
pub use source_fetcher::{DataSource, FdaSourceFetcher, OrangeBookRaw, PurpleBookRaw};
pub use store_builder::{Generation, ParsedDatasets, StoreBuilder, StoreLayout};

// ============================================================================
// Regulatory Data Engine
// ============================================================================
//
// Entry point for callers. Owns the generation handle, the freshness
// manager and the read side. Every operation:
//
//   1. validates its parameters (bad input never triggers a download)
//   2. calls `ready_for_reads()`: waits for a build only when nothing has
//      been built yet; a stale store is refreshed in the background
//   3. reads the active generation
//
// ============================================================================

use std::sync::Arc;

use chrono::NaiveDate;
use validator::Validate;

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::models::generation::StoreStatus;
use crate::models::orange_book::normalize_application_number;
use crate::models::queries::{
    DrugNameRequest, InterchangeabilityRequest, InterchangeabilityResult, OrangeBookSearchRequest,
    OrangeBookSearchResult, PatentCliffAnalysis, PatentCliffRequest, PatentExclusivityRequest,
    PatentExclusivityResult, PurpleBookSearchResult, TherapeuticEquivalents,
};
use crate::services::freshness_manager::{FreshnessManager, FreshnessScheduler, GenerationHandle};
use crate::services::patent_cliff::PatentCliffAnalyzer;
use crate::services::query_engine::QueryEngine;
use crate::services::source_fetcher::{DataSource, FdaSourceFetcher};
use crate::utils::search_terms::SearchTerms;

pub struct RegulatoryDataEngine {
    freshness: Arc<FreshnessManager>,
    queries: QueryEngine,
    cliff: PatentCliffAnalyzer,
    refresh_interval_hours: u64,
}

impl RegulatoryDataEngine {
    /// Engine backed by the public FDA downloads
    pub async fn open(config: EngineConfig) -> Result<Self> {
        let source = Arc::new(FdaSourceFetcher::new(config.source.clone()));
        Self::with_source(config, source).await
    }

    /// Engine backed by any `DataSource`
    pub async fn with_source(config: EngineConfig, source: Arc<dyn DataSource>) -> Result<Self> {
        let freshness = Arc::new(
            FreshnessManager::open(source, &config.store, config.freshness.clone()).await?,
        );
        let handle = freshness.handle();

        Ok(Self {
            queries: QueryEngine::new(handle.clone(), config.query.clone()),
            cliff: PatentCliffAnalyzer::new(handle),
            freshness,
            refresh_interval_hours: config.freshness.refresh_interval_hours,
        })
    }

    pub async fn ensure_ready(&self) -> Result<()> {
        self.freshness.ensure_ready().await
    }

    /// Rebuild regardless of age
    pub async fn refresh(&self) -> Result<()> {
        self.freshness.force_rebuild().await
    }

    pub async fn status(&self) -> StoreStatus {
        self.freshness.status().await
    }

    /// The handle queries read through; holding a generation from it keeps
    /// that generation's file on disk
    pub fn generation_handle(&self) -> Arc<GenerationHandle> {
        self.freshness.handle()
    }

    pub fn scheduler(&self) -> FreshnessScheduler {
        FreshnessScheduler::new(self.freshness.clone(), self.refresh_interval_hours)
    }

    pub async fn search_orange_book(
        &self,
        drug_name: &str,
        include_generics: bool,
    ) -> Result<OrangeBookSearchResult> {
        let request = OrangeBookSearchRequest {
            drug_name: drug_name.to_string(),
            include_generics,
        };
        request.validate()?;
        let terms = SearchTerms::parse(&request.drug_name)?;

        self.freshness.ready_for_reads().await?;
        self.queries.search_orange_book(&terms, request.include_generics).await
    }

    pub async fn get_therapeutic_equivalents(&self, drug_name: &str) -> Result<TherapeuticEquivalents> {
        let terms = drug_terms(drug_name)?;

        self.freshness.ready_for_reads().await?;
        self.queries.get_therapeutic_equivalents(&terms).await
    }

    pub async fn get_patent_exclusivity(&self, application_number: &str) -> Result<PatentExclusivityResult> {
        let request = PatentExclusivityRequest {
            application_number: application_number.trim().to_string(),
        };
        request.validate()?;
        let normalized = normalize_application_number(&request.application_number);
        if normalized.is_empty() {
            return Err(EngineError::InvalidInput("application number is required".to_string()));
        }

        self.freshness.ready_for_reads().await?;
        self.queries.get_patent_exclusivity(&normalized).await
    }

    pub async fn analyze_patent_cliff(&self, drug_name: &str, years_ahead: u32) -> Result<PatentCliffAnalysis> {
        let terms = cliff_terms(drug_name, years_ahead)?;

        self.freshness.ready_for_reads().await?;
        self.cliff.analyze(&terms, years_ahead).await
    }

    /// `analyze_patent_cliff` evaluated as of `today`
    pub async fn analyze_patent_cliff_at(
        &self,
        drug_name: &str,
        years_ahead: u32,
        today: NaiveDate,
    ) -> Result<PatentCliffAnalysis> {
        let terms = cliff_terms(drug_name, years_ahead)?;

        self.freshness.ready_for_reads().await?;
        self.cliff.analyze_at(&terms, years_ahead, today).await
    }

    pub async fn search_purple_book(&self, drug_name: &str) -> Result<PurpleBookSearchResult> {
        let terms = drug_terms(drug_name)?;

        self.freshness.ready_for_reads().await?;
        self.queries.search_purple_book(&terms).await
    }

    pub async fn get_biosimilar_interchangeability(
        &self,
        reference_product_name: &str,
    ) -> Result<InterchangeabilityResult> {
        let request = InterchangeabilityRequest {
            reference_product_name: reference_product_name.to_string(),
        };
        request.validate()?;
        let terms = SearchTerms::parse(&request.reference_product_name)?;

        self.freshness.ready_for_reads().await?;
        self.queries.get_biosimilar_interchangeability(&terms).await
    }
}

fn drug_terms(drug_name: &str) -> Result<SearchTerms> {
    let request = DrugNameRequest {
        drug_name: drug_name.to_string(),
    };
    request.validate()?;
    SearchTerms::parse(&request.drug_name)
}

fn cliff_terms(drug_name: &str, years_ahead: u32) -> Result<SearchTerms> {
    let request = PatentCliffRequest {
        drug_name: drug_name.to_string(),
        years_ahead,
    };
    request.validate()?;
    SearchTerms::parse(&request.drug_name)
}

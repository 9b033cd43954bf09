use std::sync::Arc;

use crate::config::QueryConfig;
use crate::error::{EngineError, Result};
use crate::models::orange_book::Product;
use crate::models::purple_book::Biologic;
use crate::models::queries::{
    InterchangeabilityResult, OrangeBookSearchResult, PatentExclusivityResult,
    PurpleBookSearchResult, TherapeuticEquivalents,
};
use crate::services::freshness_manager::GenerationHandle;
use crate::services::store_builder::Generation;
use crate::utils::search_terms::SearchTerms;

/// Read operations over whichever generation is active when the call starts.
/// A call that starts before a swap finishes on the generation it started with.
pub struct QueryEngine {
    handle: Arc<GenerationHandle>,
    config: QueryConfig,
}

impl QueryEngine {
    pub fn new(handle: Arc<GenerationHandle>, config: QueryConfig) -> Self {
        Self { handle, config }
    }

    pub(crate) async fn active(&self) -> Result<Arc<Generation>> {
        self.handle
            .current()
            .await
            .ok_or_else(|| EngineError::Unavailable("no generation has been built yet".to_string()))
    }

    pub async fn search_orange_book(
        &self,
        terms: &SearchTerms,
        include_generics: bool,
    ) -> Result<OrangeBookSearchResult> {
        let generation = self.active().await?;
        let (products, total_count) = generation
            .orange_book()
            .search_products(terms, include_generics, self.config.max_search_results)
            .await?;

        tracing::debug!(
            "Orange Book search {:?}: {} of {} products",
            terms.for_log(),
            products.len(),
            total_count
        );

        Ok(OrangeBookSearchResult {
            query: terms.raw().to_string(),
            include_generics,
            truncated: total_count > products.len(),
            total_count,
            products,
        })
    }

    pub async fn get_therapeutic_equivalents(&self, terms: &SearchTerms) -> Result<TherapeuticEquivalents> {
        let generation = self.active().await?;
        let products = generation.orange_book().find_by_name(terms).await?;
        let total_count = products.len();
        let (reference_listed_drugs, ab_rated_generics, other_products) = partition_equivalents(products);

        Ok(TherapeuticEquivalents {
            query: terms.raw().to_string(),
            reference_listed_drugs,
            ab_rated_generics,
            other_products,
            total_count,
        })
    }

    /// `application_number` must already be normalized
    pub async fn get_patent_exclusivity(&self, application_number: &str) -> Result<PatentExclusivityResult> {
        let generation = self.active().await?;
        let repo = generation.orange_book();
        let (patents, exclusivities) = tokio::try_join!(
            repo.patents_for_application(application_number),
            repo.exclusivities_for_application(application_number)
        )?;

        Ok(PatentExclusivityResult {
            application_number: application_number.to_string(),
            total_count: patents.len() + exclusivities.len(),
            patents,
            exclusivities,
        })
    }

    pub async fn search_purple_book(&self, terms: &SearchTerms) -> Result<PurpleBookSearchResult> {
        let (reference_products, biosimilars) = self.reference_family(terms).await?;

        Ok(PurpleBookSearchResult {
            query: terms.raw().to_string(),
            total_count: reference_products.len() + biosimilars.len(),
            reference_products,
            biosimilars,
        })
    }

    pub async fn get_biosimilar_interchangeability(
        &self,
        terms: &SearchTerms,
    ) -> Result<InterchangeabilityResult> {
        let (reference_products, referencing) = self.reference_family(terms).await?;
        let total_count = referencing.len();
        let (interchangeable, biosimilar_only): (Vec<Biologic>, Vec<Biologic>) =
            referencing.into_iter().partition(|b| b.is_interchangeable);

        Ok(InterchangeabilityResult {
            query: terms.raw().to_string(),
            reference_products,
            interchangeable,
            biosimilar_only,
            total_count,
        })
    }

    /// Originators matching `terms` and every biologic pointing at one of them
    async fn reference_family(&self, terms: &SearchTerms) -> Result<(Vec<Biologic>, Vec<Biologic>)> {
        let generation = self.active().await?;
        let repo = generation.purple_book();

        let references = repo.find_reference_products(terms).await?;
        let licenses: Vec<String> = references.iter().map(|b| b.license_number.clone()).collect();
        let referencing = repo.find_referencing(&licenses).await?;

        Ok((references, referencing))
    }
}

/// Split products into (reference listed drugs, AB-rated generics, everything
/// else). Each product lands in exactly one bucket; RLD status wins over the
/// TE code, and non-RLD NDA products stay out of the generics bucket.
pub fn partition_equivalents(products: Vec<Product>) -> (Vec<Product>, Vec<Product>, Vec<Product>) {
    let mut reference = Vec::new();
    let mut ab_rated = Vec::new();
    let mut other = Vec::new();

    for product in products {
        if product.is_reference_listed_drug {
            reference.push(product);
        } else if product.is_ab_rated() && !product.is_brand() {
            ab_rated.push(product);
        } else {
            other.push(product);
        }
    }

    (reference, ab_rated, other)
}

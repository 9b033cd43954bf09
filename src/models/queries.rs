use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::orange_book::{Exclusivity, Patent, Product};
use crate::models::purple_book::Biologic;

// ============================================================================
// Requests
// ============================================================================

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct OrangeBookSearchRequest {
    #[validate(length(min = 1, max = 200))]
    pub drug_name: String,
    #[serde(default)]
    pub include_generics: bool,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct DrugNameRequest {
    #[validate(length(min = 1, max = 200))]
    pub drug_name: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct PatentExclusivityRequest {
    #[validate(length(min = 1, max = 20))]
    pub application_number: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct PatentCliffRequest {
    #[validate(length(min = 1, max = 200))]
    pub drug_name: String,
    #[validate(range(min = 1, max = 50))]
    pub years_ahead: u32,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct InterchangeabilityRequest {
    #[validate(length(min = 1, max = 200))]
    pub reference_product_name: String,
}

// ============================================================================
// Results
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct OrangeBookSearchResult {
    pub query: String,
    pub include_generics: bool,
    pub total_count: usize,
    /// True when `products` was capped below `total_count`
    pub truncated: bool,
    pub products: Vec<Product>,
}

/// Every matching product lands in exactly one partition.
#[derive(Debug, Clone, Serialize)]
pub struct TherapeuticEquivalents {
    pub query: String,
    pub reference_listed_drugs: Vec<Product>,
    pub ab_rated_generics: Vec<Product>,
    pub other_products: Vec<Product>,
    pub total_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct PatentExclusivityResult {
    pub application_number: String,
    pub patents: Vec<Patent>,
    pub exclusivities: Vec<Exclusivity>,
    pub total_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct PatentExpiration {
    pub patent_number: String,
    pub application_number: String,
    pub product_number: String,
    pub trade_name: Option<String>,
    pub expiration_date: NaiveDate,
    pub drug_substance: bool,
    pub drug_product: bool,
    pub use_code: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExclusivityExpiration {
    pub exclusivity_code: String,
    pub description: Option<String>,
    pub application_number: String,
    pub product_number: String,
    pub trade_name: Option<String>,
    pub expiration_date: NaiveDate,
}

#[derive(Debug, Clone, Serialize)]
pub struct PatentCliffAnalysis {
    pub drug_name: String,
    pub ingredients: Vec<String>,
    pub as_of: NaiveDate,
    pub years_ahead: u32,
    pub horizon_end: NaiveDate,
    pub next_expiration: Option<NaiveDate>,
    pub all_patents_expire: Option<NaiveDate>,
    pub exclusivity_expires: Option<NaiveDate>,
    pub generic_entry_estimate: Option<NaiveDate>,
    /// `None` when no patent or exclusivity data exists; floored at zero.
    pub years_until_loe: Option<f64>,
    pub upcoming_patent_expirations: Vec<PatentExpiration>,
    pub upcoming_exclusivity_expirations: Vec<ExclusivityExpiration>,
    pub patents_considered: usize,
    pub exclusivities_considered: usize,
    pub delisted_patents_excluded: usize,
    /// Rows whose expiration date was absent or unparsed
    pub undated_entries: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct PurpleBookSearchResult {
    pub query: String,
    pub reference_products: Vec<Biologic>,
    pub biosimilars: Vec<Biologic>,
    pub total_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct InterchangeabilityResult {
    pub query: String,
    pub reference_products: Vec<Biologic>,
    /// Pharmacy-substitutable without prescriber intervention
    pub interchangeable: Vec<Biologic>,
    pub biosimilar_only: Vec<Biologic>,
    pub total_count: usize,
}

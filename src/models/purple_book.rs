use serde::{Deserialize, Serialize};

use crate::utils::dates::ParsedDate;

/// One licensed biological product
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Biologic {
    pub license_number: String,
    pub proper_name: String,
    pub proprietary_name: Option<String>,
    pub applicant: Option<String>,
    pub strength: Option<String>,
    pub dosage_form: Option<String>,
    pub route: Option<String>,
    pub licensure_date: Option<ParsedDate>,
    pub license_status: Option<String>,
    pub marketing_status: Option<String>,
    /// License number of the originator this product biosimilarizes. Empty for originators.
    pub reference_license_number: Option<String>,
    pub is_biosimilar: bool,
    pub is_interchangeable: bool,
    pub interchangeable_date: Option<ParsedDate>,
    pub exclusivity_expiration: Option<ParsedDate>,
    pub orphan_exclusivity_expiration: Option<ParsedDate>,
    pub interchangeable_exclusivity_expiration: Option<ParsedDate>,
}

impl Biologic {
    pub fn display_name(&self) -> &str {
        self.proprietary_name.as_deref().unwrap_or(&self.proper_name)
    }

    /// True when this product names `license_number` as its reference
    pub fn references(&self, license_number: &str) -> bool {
        self.reference_license_number.as_deref() == Some(license_number)
    }
}

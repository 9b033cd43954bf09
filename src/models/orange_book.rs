use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::utils::dates::ParsedDate;

// ============================================================================
// Orange Book Codes
// ============================================================================

/// NDA (new drug, brand) vs ANDA (abbreviated, generic)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ApplicationType {
    #[serde(rename = "N")]
    Nda,
    #[serde(rename = "A")]
    Anda,
}

impl ApplicationType {
    pub fn code(&self) -> &'static str {
        match self {
            ApplicationType::Nda => "N",
            ApplicationType::Anda => "A",
        }
    }

    pub fn is_brand(&self) -> bool {
        matches!(self, ApplicationType::Nda)
    }
}

impl FromStr for ApplicationType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "N" | "NDA" => Ok(ApplicationType::Nda),
            "A" | "ANDA" => Ok(ApplicationType::Anda),
            other => Err(format!("Unknown application type: {:?}", other)),
        }
    }
}

impl fmt::Display for ApplicationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MarketingStatus {
    #[serde(rename = "Prescription")]
    Prescription,
    #[serde(rename = "Over-the-counter")]
    OverTheCounter,
    #[serde(rename = "Discontinued")]
    Discontinued,
}

impl MarketingStatus {
    pub fn label(&self) -> &'static str {
        match self {
            MarketingStatus::Prescription => "Prescription",
            MarketingStatus::OverTheCounter => "Over-the-counter",
            MarketingStatus::Discontinued => "Discontinued",
        }
    }
}

impl FromStr for MarketingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "RX" | "PRESCRIPTION" => Ok(MarketingStatus::Prescription),
            "OTC" | "OVER-THE-COUNTER" | "OVER THE COUNTER" => Ok(MarketingStatus::OverTheCounter),
            "DISCN" | "DISCONTINUED" => Ok(MarketingStatus::Discontinued),
            other => Err(format!("Unknown marketing type: {:?}", other)),
        }
    }
}

impl fmt::Display for MarketingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Strip an NDA/ANDA prefix and left-pad numeric application numbers to six digits.
pub fn normalize_application_number(raw: &str) -> String {
    let upper = raw.trim().to_ascii_uppercase();
    let without_prefix = ["ANDA", "NDA", "A", "N"]
        .iter()
        .find_map(|prefix| {
            upper
                .strip_prefix(prefix)
                .map(|rest| rest.trim_start_matches(['-', ' ']))
                .filter(|rest| !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit()))
        })
        .unwrap_or(upper.as_str());

    if !without_prefix.is_empty() && without_prefix.len() < 6 && without_prefix.chars().all(|c| c.is_ascii_digit()) {
        format!("{:0>6}", without_prefix)
    } else {
        without_prefix.to_string()
    }
}

/// Human-readable meaning of common exclusivity codes
pub fn exclusivity_code_description(code: &str) -> Option<&'static str> {
    let upper = code.trim().to_ascii_uppercase();
    let description = match upper.as_str() {
        "NCE" => "New chemical entity",
        "NCE*" => "New chemical entity (patent challenge window)",
        "ODE" => "Orphan drug exclusivity",
        "PED" => "Pediatric exclusivity",
        "NP" => "New product",
        "NPP" => "New patient population",
        "NS" => "New strength",
        "NDF" => "New dosage form",
        "NR" => "New route",
        "NC" => "New combination",
        "GAIN" => "Generating antibiotic incentives now",
        "CGT" => "Competitive generic therapy",
        "PC" => "Patent challenge (180-day generic exclusivity)",
        "RTO" => "Rx-to-OTC switch",
        _ if upper.starts_with("ODE") => "Orphan drug exclusivity",
        _ if upper.starts_with("I-") => "New indication",
        _ if upper.starts_with("M-") => "Miscellaneous",
        _ if upper.starts_with("D-") => "Dosing schedule change",
        _ => return None,
    };
    Some(description)
}

// ============================================================================
// Entities
// ============================================================================

/// (application type, application number, product number)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProductKey {
    pub application_type: ApplicationType,
    pub application_number: String,
    pub product_number: String,
}

impl fmt::Display for ProductKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}/{}", self.application_type, self.application_number, self.product_number)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub ingredient: String,
    pub dosage_form: Option<String>,
    pub route: Option<String>,
    pub trade_name: Option<String>,
    pub applicant: Option<String>,
    pub applicant_full_name: Option<String>,
    pub strength: Option<String>,
    pub application_type: ApplicationType,
    pub application_number: String,
    pub product_number: String,
    pub te_code: Option<String>,
    pub approval_date: Option<ParsedDate>,
    pub is_reference_listed_drug: bool,
    pub is_reference_standard: bool,
    pub marketing_status: MarketingStatus,
}

impl Product {
    pub fn key(&self) -> ProductKey {
        ProductKey {
            application_type: self.application_type,
            application_number: self.application_number.clone(),
            product_number: self.product_number.clone(),
        }
    }

    pub fn is_brand(&self) -> bool {
        self.application_type.is_brand()
    }

    /// AB-rated: pharmacist-substitutable against the reference listed drug
    pub fn is_ab_rated(&self) -> bool {
        self.te_code
            .as_deref()
            .map(|code| code.trim().to_ascii_uppercase().starts_with("AB"))
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Patent {
    pub application_type: ApplicationType,
    pub application_number: String,
    pub product_number: String,
    pub patent_number: String,
    pub expiration_date: Option<ParsedDate>,
    pub drug_substance: bool,
    pub drug_product: bool,
    pub use_code: Option<String>,
    pub delisted: bool,
    pub submission_date: Option<ParsedDate>,
}

impl Patent {
    pub fn key(&self) -> ProductKey {
        ProductKey {
            application_type: self.application_type,
            application_number: self.application_number.clone(),
            product_number: self.product_number.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exclusivity {
    pub application_type: ApplicationType,
    pub application_number: String,
    pub product_number: String,
    pub exclusivity_code: String,
    pub expiration_date: Option<ParsedDate>,
}

impl Exclusivity {
    pub fn key(&self) -> ProductKey {
        ProductKey {
            application_type: self.application_type,
            application_number: self.application_number.clone(),
            product_number: self.product_number.clone(),
        }
    }

    pub fn description(&self) -> Option<&'static str> {
        exclusivity_code_description(&self.exclusivity_code)
    }
}

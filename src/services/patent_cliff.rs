/// Patent-cliff analysis
///
/// Loss of exclusivity is estimated from every patent and exclusivity
/// attached to any product sharing the drug's ingredient(s). Generic entry
/// is taken as the later of the last patent expiry and the last exclusivity
/// expiry, with no extra padding.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{Months, NaiveDate, Utc};

use crate::error::{EngineError, Result};
use crate::models::queries::{ExclusivityExpiration, PatentCliffAnalysis, PatentExpiration};
use crate::repositories::{LinkedExclusivity, LinkedPatent};
use crate::services::freshness_manager::GenerationHandle;
use crate::utils::dates::years_between;
use crate::utils::search_terms::SearchTerms;

pub struct PatentCliffAnalyzer {
    handle: Arc<GenerationHandle>,
}

impl PatentCliffAnalyzer {
    pub fn new(handle: Arc<GenerationHandle>) -> Self {
        Self { handle }
    }

    pub async fn analyze(&self, terms: &SearchTerms, years_ahead: u32) -> Result<PatentCliffAnalysis> {
        self.analyze_at(terms, years_ahead, Utc::now().date_naive()).await
    }

    /// Same as `analyze` with an explicit "today"
    pub async fn analyze_at(
        &self,
        terms: &SearchTerms,
        years_ahead: u32,
        today: NaiveDate,
    ) -> Result<PatentCliffAnalysis> {
        let generation = self
            .handle
            .current()
            .await
            .ok_or_else(|| EngineError::Unavailable("no generation has been built yet".to_string()))?;
        let repo = generation.orange_book();

        let products = repo.find_by_name(terms).await?;
        let ingredients = distinct_ingredients(products.iter().map(|p| p.ingredient.as_str()));

        let (patents, exclusivities) = tokio::try_join!(
            repo.patents_for_ingredients(&ingredients),
            repo.exclusivities_for_ingredients(&ingredients)
        )?;

        tracing::debug!(
            "Patent cliff for {:?}: {} ingredients, {} patents, {} exclusivities",
            terms.for_log(),
            ingredients.len(),
            patents.len(),
            exclusivities.len()
        );

        Ok(summarize(terms.raw(), ingredients, years_ahead, today, patents, exclusivities))
    }
}

/// Case-insensitive dedupe, first spelling wins, sorted
fn distinct_ingredients<'a>(names: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut seen: BTreeMap<String, String> = BTreeMap::new();
    for name in names {
        seen.entry(name.to_lowercase()).or_insert_with(|| name.to_string());
    }
    seen.into_values().collect()
}

/// Aggregate dates and the itemized horizon from already-collected rows
pub fn summarize(
    drug_name: &str,
    ingredients: Vec<String>,
    years_ahead: u32,
    today: NaiveDate,
    patents: Vec<LinkedPatent>,
    exclusivities: Vec<LinkedExclusivity>,
) -> PatentCliffAnalysis {
    let horizon_end = today
        .checked_add_months(Months::new(years_ahead.saturating_mul(12)))
        .unwrap_or(NaiveDate::MAX);
    let in_horizon = |date: NaiveDate| date >= today && date <= horizon_end;

    let delisted_patents_excluded = patents.iter().filter(|p| p.patent.delisted).count();
    let mut undated_entries = 0;

    let mut dated_patents = Vec::new();
    for linked in patents.into_iter().filter(|p| !p.patent.delisted) {
        match linked.patent.expiration_date.as_ref().and_then(|d| d.date()) {
            Some(date) => dated_patents.push((date, linked)),
            None => undated_entries += 1,
        }
    }
    let patents_considered = dated_patents.len() + undated_entries;

    let mut dated_exclusivities = Vec::new();
    let mut undated_exclusivities = 0;
    for linked in exclusivities {
        match linked.exclusivity.expiration_date.as_ref().and_then(|d| d.date()) {
            Some(date) => dated_exclusivities.push((date, linked)),
            None => undated_exclusivities += 1,
        }
    }
    let exclusivities_considered = dated_exclusivities.len() + undated_exclusivities;
    undated_entries += undated_exclusivities;

    let next_expiration = dated_patents.iter().map(|(d, _)| *d).filter(|d| *d >= today).min();
    let all_patents_expire = dated_patents.iter().map(|(d, _)| *d).max();
    let exclusivity_expires = dated_exclusivities.iter().map(|(d, _)| *d).max();
    // None orders below Some, so this is the later of whichever dates exist
    let generic_entry_estimate = all_patents_expire.max(exclusivity_expires);
    let years_until_loe = generic_entry_estimate.map(|date| years_between(today, date).max(0.0));

    let mut upcoming_patent_expirations: Vec<PatentExpiration> = dated_patents
        .into_iter()
        .filter(|(date, _)| in_horizon(*date))
        .map(|(date, linked)| PatentExpiration {
            patent_number: linked.patent.patent_number,
            application_number: linked.patent.application_number,
            product_number: linked.patent.product_number,
            trade_name: linked.trade_name,
            expiration_date: date,
            drug_substance: linked.patent.drug_substance,
            drug_product: linked.patent.drug_product,
            use_code: linked.patent.use_code,
        })
        .collect();
    upcoming_patent_expirations.sort_by(|a, b| {
        a.expiration_date
            .cmp(&b.expiration_date)
            .then_with(|| a.patent_number.cmp(&b.patent_number))
    });

    let mut upcoming_exclusivity_expirations: Vec<ExclusivityExpiration> = dated_exclusivities
        .into_iter()
        .filter(|(date, _)| in_horizon(*date))
        .map(|(date, linked)| ExclusivityExpiration {
            description: linked.exclusivity.description().map(str::to_string),
            exclusivity_code: linked.exclusivity.exclusivity_code,
            application_number: linked.exclusivity.application_number,
            product_number: linked.exclusivity.product_number,
            trade_name: linked.trade_name,
            expiration_date: date,
        })
        .collect();
    upcoming_exclusivity_expirations.sort_by(|a, b| {
        a.expiration_date
            .cmp(&b.expiration_date)
            .then_with(|| a.exclusivity_code.cmp(&b.exclusivity_code))
    });

    PatentCliffAnalysis {
        drug_name: drug_name.to_string(),
        ingredients,
        as_of: today,
        years_ahead,
        horizon_end,
        next_expiration,
        all_patents_expire,
        exclusivity_expires,
        generic_entry_estimate,
        years_until_loe,
        upcoming_patent_expirations,
        upcoming_exclusivity_expirations,
        patents_considered,
        exclusivities_considered,
        delisted_patents_excluded,
        undated_entries,
    }
}

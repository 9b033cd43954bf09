// ============================================================================
// Orange Book Parser
// ============================================================================
//
// products.txt, patent.txt and exclusivity.txt are tilde-delimited with a
// header row. Each row is parsed on its own: a row with the wrong field
// count or an unusable mandatory field is skipped and counted, it never
// aborts the file. A file that yields zero rows fails the whole parse.
//
// ============================================================================

use std::collections::HashSet;

use crate::error::Result;
use crate::models::orange_book::{
    normalize_application_number, ApplicationType, Exclusivity, MarketingStatus, Patent, Product,
    ProductKey,
};
use crate::services::parsers::{non_blank, parse_flag, ParseReport, TabularDecoder};
use crate::services::source_fetcher::OrangeBookRaw;
use crate::utils::dates::parse_source_date;

pub const PRODUCT_FIELDS: usize = 14;
pub const PATENT_FIELDS: usize = 10;
pub const EXCLUSIVITY_FIELDS: usize = 5;

const DELIMITER: u8 = b'~';

#[derive(Debug, Clone, Default)]
pub struct OrangeBookData {
    pub products: Vec<Product>,
    pub patents: Vec<Patent>,
    pub exclusivities: Vec<Exclusivity>,
    pub reports: Vec<ParseReport>,
    /// Patents whose product key has no product row (kept, excluded from joins)
    pub orphaned_patents: usize,
    pub orphaned_exclusivities: usize,
}

impl OrangeBookData {
    pub fn rows_skipped(&self) -> usize {
        self.reports.iter().map(|r| r.rows_skipped).sum()
    }
}

pub struct OrangeBookParser;

impl OrangeBookParser {
    pub fn parse(raw: &OrangeBookRaw) -> Result<OrangeBookData> {
        let (products, product_report) = Self::parse_products(&raw.products)?;
        let (patents, patent_report) = Self::parse_patents(&raw.patents)?;
        let (exclusivities, exclusivity_report) = Self::parse_exclusivity(&raw.exclusivity)?;

        let product_keys: HashSet<ProductKey> = products.iter().map(Product::key).collect();
        let orphaned_patents = patents.iter().filter(|p| !product_keys.contains(&p.key())).count();
        let orphaned_exclusivities = exclusivities
            .iter()
            .filter(|e| !product_keys.contains(&e.key()))
            .count();

        if orphaned_patents > 0 || orphaned_exclusivities > 0 {
            tracing::info!(
                "Orange Book has {} patents and {} exclusivities without a matching product",
                orphaned_patents,
                orphaned_exclusivities
            );
        }

        Ok(OrangeBookData {
            products,
            patents,
            exclusivities,
            reports: vec![product_report, patent_report, exclusivity_report],
            orphaned_patents,
            orphaned_exclusivities,
        })
    }

    pub fn parse_products(text: &str) -> Result<(Vec<Product>, ParseReport)> {
        let mut report = ParseReport::new("products.txt");
        let mut seen = HashSet::new();
        let mut products = Vec::new();

        for (line, fields) in Self::data_rows(text, "ingredient") {
            report.rows_read += 1;
            match Self::parse_product_row(&fields) {
                Ok(product) => {
                    if seen.insert(product.key()) {
                        products.push(product);
                        report.rows_parsed += 1;
                    } else {
                        report.duplicates += 1;
                    }
                }
                Err(reason) => {
                    tracing::debug!("products.txt line {} skipped: {}", line, reason);
                    report.rows_skipped += 1;
                }
            }
        }

        report.log_summary();
        report.ensure_not_empty()?;
        Ok((products, report))
    }

    pub fn parse_patents(text: &str) -> Result<(Vec<Patent>, ParseReport)> {
        let mut report = ParseReport::new("patent.txt");
        let mut patents = Vec::new();

        for (line, fields) in Self::data_rows(text, "appl_type") {
            report.rows_read += 1;
            match Self::parse_patent_row(&fields) {
                Ok(patent) => {
                    patents.push(patent);
                    report.rows_parsed += 1;
                }
                Err(reason) => {
                    tracing::debug!("patent.txt line {} skipped: {}", line, reason);
                    report.rows_skipped += 1;
                }
            }
        }

        report.log_summary();
        report.ensure_not_empty()?;
        Ok((patents, report))
    }

    pub fn parse_exclusivity(text: &str) -> Result<(Vec<Exclusivity>, ParseReport)> {
        let mut report = ParseReport::new("exclusivity.txt");
        let mut exclusivities = Vec::new();

        for (line, fields) in Self::data_rows(text, "appl_type") {
            report.rows_read += 1;
            match Self::parse_exclusivity_row(&fields) {
                Ok(exclusivity) => {
                    exclusivities.push(exclusivity);
                    report.rows_parsed += 1;
                }
                Err(reason) => {
                    tracing::debug!("exclusivity.txt line {} skipped: {}", line, reason);
                    report.rows_skipped += 1;
                }
            }
        }

        report.log_summary();
        report.ensure_not_empty()?;
        Ok((exclusivities, report))
    }

    /// Ingredient~DF;Route~Trade_Name~Applicant~Strength~Appl_Type~Appl_No~Product_No~TE_Code~Approval_Date~RLD~RS~Type~Applicant_Full_Name
    pub fn parse_product_row(fields: &[String]) -> std::result::Result<Product, String> {
        check_field_count(fields, PRODUCT_FIELDS)?;

        let ingredient = non_blank(&fields[0]).ok_or("missing ingredient")?;
        let (dosage_form, route) = split_dosage_form_route(&fields[1]);
        let application_type: ApplicationType = fields[5].parse()?;
        let application_number = required_application_number(&fields[6])?;
        let product_number = required_product_number(&fields[7])?;
        let marketing_status: MarketingStatus = fields[12].parse()?;

        Ok(Product {
            ingredient,
            dosage_form,
            route,
            trade_name: non_blank(&fields[2]),
            applicant: non_blank(&fields[3]),
            applicant_full_name: non_blank(&fields[13]),
            strength: non_blank(&fields[4]),
            application_type,
            application_number,
            product_number,
            te_code: non_blank(&fields[8]),
            approval_date: parse_source_date(&fields[9]),
            is_reference_listed_drug: parse_flag(&fields[10]),
            is_reference_standard: parse_flag(&fields[11]),
            marketing_status,
        })
    }

    /// Appl_Type~Appl_No~Product_No~Patent_No~Patent_Expire_Date_Text~Drug_Substance_Flag~Drug_Product_Flag~Patent_Use_Code~Delist_Flag~Submission_Date
    pub fn parse_patent_row(fields: &[String]) -> std::result::Result<Patent, String> {
        check_field_count(fields, PATENT_FIELDS)?;

        Ok(Patent {
            application_type: fields[0].parse()?,
            application_number: required_application_number(&fields[1])?,
            product_number: required_product_number(&fields[2])?,
            patent_number: non_blank(&fields[3]).ok_or("missing patent number")?,
            expiration_date: parse_source_date(&fields[4]),
            drug_substance: parse_flag(&fields[5]),
            drug_product: parse_flag(&fields[6]),
            use_code: non_blank(&fields[7]),
            delisted: parse_flag(&fields[8]),
            submission_date: parse_source_date(&fields[9]),
        })
    }

    /// Appl_Type~Appl_No~Product_No~Exclusivity_Code~Exclusivity_Date
    pub fn parse_exclusivity_row(fields: &[String]) -> std::result::Result<Exclusivity, String> {
        check_field_count(fields, EXCLUSIVITY_FIELDS)?;

        Ok(Exclusivity {
            application_type: fields[0].parse()?,
            application_number: required_application_number(&fields[1])?,
            product_number: required_product_number(&fields[2])?,
            exclusivity_code: non_blank(&fields[3]).ok_or("missing exclusivity code")?,
            expiration_date: parse_source_date(&fields[4]),
        })
    }

    /// Data rows with 1-based line numbers; a leading header row is dropped
    /// when its first cell names the expected first column.
    fn data_rows(text: &str, first_header: &str) -> Vec<(usize, Vec<String>)> {
        let decoded = TabularDecoder::read_delimited(text, DELIMITER, false);
        let mut rows = decoded.rows.into_iter().enumerate().peekable();

        if let Some((_, first)) = rows.peek() {
            let is_header = first
                .first()
                .map(|cell| cell.trim().eq_ignore_ascii_case(first_header))
                .unwrap_or(false);
            if is_header {
                rows.next();
            }
        }

        rows.map(|(idx, row)| (idx + 1, row)).collect()
    }
}

fn check_field_count(fields: &[String], expected: usize) -> std::result::Result<(), String> {
    if fields.len() != expected {
        return Err(format!("expected {} fields, found {}", expected, fields.len()));
    }
    Ok(())
}

fn required_application_number(value: &str) -> std::result::Result<String, String> {
    let normalized = normalize_application_number(value);
    if normalized.is_empty() {
        return Err("missing application number".to_string());
    }
    Ok(normalized)
}

/// Product numbers are three digits in every file; pad the occasional short one.
fn required_product_number(value: &str) -> std::result::Result<String, String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err("missing product number".to_string());
    }
    if trimmed.len() < 3 && trimmed.chars().all(|c| c.is_ascii_digit()) {
        return Ok(format!("{:0>3}", trimmed));
    }
    Ok(trimmed.to_string())
}

/// "TABLET;ORAL" -> (TABLET, ORAL). Only the first `;` separates the two.
fn split_dosage_form_route(value: &str) -> (Option<String>, Option<String>) {
    match value.split_once(';') {
        Some((form, route)) => (non_blank(form), non_blank(route)),
        None => (non_blank(value), None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;
    use crate::utils::dates::ParsedDate;
    use chrono::NaiveDate;

    const PRODUCT_HEADER: &str = "Ingredient~DF;Route~Trade_Name~Applicant~Strength~Appl_Type~Appl_No~Product_No~TE_Code~Approval_Date~RLD~RS~Type~Applicant_Full_Name";

    fn fields(line: &str) -> Vec<String> {
        line.split('~').map(str::to_string).collect()
    }

    #[test]
    fn test_ibuprofen_product_row() {
        let row = fields("IBUPROFEN~TABLET;ORAL~MOTRIN~MCNEIL~400MG~N~018989~001~AB~Sep 19, 1984~Yes~No~RX~MCNEIL CONSUMER HEALTHCARE");
        let product = OrangeBookParser::parse_product_row(&row).unwrap();

        assert_eq!(product.ingredient, "IBUPROFEN");
        assert_eq!(product.dosage_form.as_deref(), Some("TABLET"));
        assert_eq!(product.route.as_deref(), Some("ORAL"));
        assert_eq!(product.application_type, ApplicationType::Nda);
        assert_eq!(product.application_number, "018989");
        assert_eq!(product.product_number, "001");
        assert_eq!(product.te_code.as_deref(), Some("AB"));
        assert_eq!(
            product.approval_date,
            Some(ParsedDate::Date(NaiveDate::from_ymd_opt(1984, 9, 19).unwrap()))
        );
        assert_eq!(product.approval_date.as_ref().unwrap().to_column(), "1984-09-19");
        assert!(product.is_reference_listed_drug);
        assert!(!product.is_reference_standard);
        assert_eq!(product.marketing_status, MarketingStatus::Prescription);
        assert_eq!(product.applicant_full_name.as_deref(), Some("MCNEIL CONSUMER HEALTHCARE"));
    }

    #[test]
    fn test_discontinued_product_and_blank_fields() {
        let row = fields("ASPIRIN~TABLET;ORAL~~~325MG~A~070001~1~~Approved Prior to Jan 1, 1982~No~No~DISCN~");
        let product = OrangeBookParser::parse_product_row(&row).unwrap();

        assert_eq!(product.marketing_status.label(), "Discontinued");
        assert_eq!(product.trade_name, None);
        assert_eq!(product.applicant, None);
        assert_eq!(product.te_code, None);
        assert_eq!(product.product_number, "001");
        assert!(product.approval_date.unwrap().is_unparsed());
    }

    #[test]
    fn test_malformed_product_rows_are_counted() {
        let text = format!(
            "{}\n{}\n{}\n{}\n",
            PRODUCT_HEADER,
            "IBUPROFEN~TABLET;ORAL~MOTRIN~MCNEIL~400MG~N~018989~001~AB~Sep 19, 1984~Yes~No~RX~MCNEIL",
            "TOO~FEW~FIELDS",
            "IBUPROFEN~TABLET;ORAL~X~Y~400MG~Q~018989~002~AB~Sep 19, 1984~No~No~RX~Y",
        );
        let (products, report) = OrangeBookParser::parse_products(&text).unwrap();

        assert_eq!(products.len(), 1);
        assert_eq!(report.rows_read, 3);
        assert_eq!(report.rows_parsed, 1);
        assert_eq!(report.rows_skipped, 2);
    }

    #[test]
    fn test_duplicate_product_keys_dropped() {
        let line = "IBUPROFEN~TABLET;ORAL~MOTRIN~MCNEIL~400MG~N~018989~001~AB~Sep 19, 1984~Yes~No~RX~MCNEIL";
        let text = format!("{}\n{}\n{}\n", PRODUCT_HEADER, line, line);
        let (products, report) = OrangeBookParser::parse_products(&text).unwrap();

        assert_eq!(products.len(), 1);
        assert_eq!(report.duplicates, 1);
    }

    #[test]
    fn test_zero_valid_rows_is_parse_error() {
        let text = format!("{}\nGARBAGE\n", PRODUCT_HEADER);
        let err = OrangeBookParser::parse_products(&text).unwrap_err();
        assert!(matches!(err, EngineError::Parse(_)));
    }

    #[test]
    fn test_patent_row() {
        let row = fields("N~020702~001~5104876~Apr 14, 2029~Y~N~U-123~Y~2003-05-01");
        let patent = OrangeBookParser::parse_patent_row(&row).unwrap();

        assert_eq!(patent.application_number, "020702");
        assert_eq!(patent.patent_number, "5104876");
        assert_eq!(patent.expiration_date.unwrap().to_column(), "2029-04-14");
        assert!(patent.drug_substance);
        assert!(!patent.drug_product);
        assert_eq!(patent.use_code.as_deref(), Some("U-123"));
        assert!(patent.delisted);
        assert_eq!(patent.submission_date.unwrap().to_column(), "2003-05-01");
    }

    #[test]
    fn test_exclusivity_row() {
        let row = fields("N~021000~002~ODE-377~Dec 1, 2027");
        let exclusivity = OrangeBookParser::parse_exclusivity_row(&row).unwrap();

        assert_eq!(exclusivity.exclusivity_code, "ODE-377");
        assert_eq!(exclusivity.product_number, "002");
        assert_eq!(exclusivity.expiration_date.unwrap().to_column(), "2027-12-01");
        assert!(OrangeBookParser::parse_exclusivity_row(&fields("N~021000~002~~")).is_err());
    }

    #[test]
    fn test_orphans_are_counted_not_dropped() {
        let raw = OrangeBookRaw {
            products: format!(
                "{}\nIBUPROFEN~TABLET;ORAL~MOTRIN~MCNEIL~400MG~N~018989~001~AB~Sep 19, 1984~Yes~No~RX~MCNEIL\n",
                PRODUCT_HEADER
            ),
            patents: "Appl_Type~Appl_No~Product_No~Patent_No~Patent_Expire_Date_Text~Drug_Substance_Flag~Drug_Product_Flag~Patent_Use_Code~Delist_Flag~Submission_Date\nN~018989~001~111~Jan 1, 2030~Y~~~~\nN~099999~001~222~Jan 1, 2031~~Y~~~\n".to_string(),
            exclusivity: "Appl_Type~Appl_No~Product_No~Exclusivity_Code~Exclusivity_Date\nN~018989~001~NCE~Jan 1, 2028\n".to_string(),
            source_date: None,
            sha256: String::new(),
        };

        let data = OrangeBookParser::parse(&raw).unwrap();
        assert_eq!(data.patents.len(), 2);
        assert_eq!(data.orphaned_patents, 1);
        assert_eq!(data.orphaned_exclusivities, 0);
        assert_eq!(data.rows_skipped(), 0);
    }
}

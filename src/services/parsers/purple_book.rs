// ============================================================================
// Purple Book Parser
// ============================================================================
//
// The biologics download is a CSV (sometimes preceded by a few preamble
// lines) or a spreadsheet export. Column positions are not stable across
// publications, so columns are located by header name through alias lists.
//
// Reference pointers: when the file carries the reference product's BLA
// number it is used directly; otherwise a biosimilar's reference product
// names are resolved against the originators of the same load.
//
// ============================================================================

use std::collections::{HashMap, HashSet};

use crate::error::{EngineError, Result};
use crate::models::purple_book::Biologic;
use crate::services::parsers::{
    non_blank, normalize_header, parse_flag, FileType, ParseReport, TabularDecoder,
};
use crate::services::source_fetcher::PurpleBookRaw;
use crate::utils::dates::{parse_source_date_with, DateFormat, ParsedDate};

/// Rows scanned for the header before giving up
const HEADER_SEARCH_ROWS: usize = 50;

const LICENSE_NUMBER: &[&str] = &["BLA Number", "License Number", "BLA"];
const PROPER_NAME: &[&str] = &["Proper Name", "Nonproprietary Name"];
const PROPRIETARY_NAME: &[&str] = &["Proprietary Name", "Brand Name"];
const APPLICANT: &[&str] = &["Applicant", "Applicant Name", "Sponsor"];
const STRENGTH: &[&str] = &["Strength"];
const DOSAGE_FORM: &[&str] = &["Dosage Form"];
const ROUTE: &[&str] = &["Route of Administration", "Route"];
const LICENSURE_DATE: &[&str] = &["Date of First Licensure", "Licensure Date", "Approval Date"];
const LICENSE_STATUS: &[&str] = &["Licensure", "License Status"];
const MARKETING_STATUS: &[&str] = &["Marketing Status", "Status"];
const BLA_TYPE: &[&str] = &["BLA Type", "Application Type"];
const BIOSIMILAR: &[&str] = &["Biosimilar"];
const INTERCHANGEABLE: &[&str] = &["Interchangeable"];
const INTERCHANGEABLE_DATE: &[&str] = &["Interchangeable Date", "Date of Interchangeability"];
const REFERENCE_LICENSE: &[&str] = &[
    "Reference Product BLA Number",
    "Ref. Product BLA Number",
    "Reference BLA Number",
    "Reference License Number",
];
const REFERENCE_PROPER_NAME: &[&str] = &["Ref. Product Proper Name", "Reference Product Proper Name"];
const REFERENCE_PROPRIETARY_NAME: &[&str] = &[
    "Ref. Product Proprietary Name",
    "Reference Product Proprietary Name",
    "Reference Product",
];
const EXCLUSIVITY_EXPIRATION: &[&str] = &[
    "Exclusivity Expiration Date",
    "Ref. Product Exclusivity Exp. Date",
    "Reference Product Exclusivity Expiration Date",
];
const ORPHAN_EXCLUSIVITY_EXPIRATION: &[&str] = &[
    "Orphan Exclusivity Exp. Date",
    "Orphan Exclusivity Expiration Date",
];
const INTERCHANGEABLE_EXCLUSIVITY_EXPIRATION: &[&str] = &[
    "First Interchangeable Exclusivity Exp. Date",
    "First Interchangeable Exclusivity Expiration Date",
];

/// Column positions resolved from a header row
#[derive(Debug, Clone)]
struct ColumnMap {
    license_number: usize,
    proper_name: usize,
    proprietary_name: Option<usize>,
    applicant: Option<usize>,
    strength: Option<usize>,
    dosage_form: Option<usize>,
    route: Option<usize>,
    licensure_date: Option<usize>,
    license_status: Option<usize>,
    marketing_status: Option<usize>,
    bla_type: Option<usize>,
    biosimilar: Option<usize>,
    interchangeable: Option<usize>,
    interchangeable_date: Option<usize>,
    reference_license: Option<usize>,
    reference_proper_name: Option<usize>,
    reference_proprietary_name: Option<usize>,
    exclusivity_expiration: Option<usize>,
    orphan_exclusivity_expiration: Option<usize>,
    interchangeable_exclusivity_expiration: Option<usize>,
}

impl ColumnMap {
    fn from_header(row: &[String]) -> Option<Self> {
        let normalized: Vec<String> = row.iter().map(|cell| normalize_header(cell)).collect();
        // Aliases are tried in order so the preferred column wins when several exist
        let find = |aliases: &[&str]| {
            aliases.iter().find_map(|alias| {
                let wanted = normalize_header(alias);
                normalized.iter().position(|cell| *cell == wanted)
            })
        };

        Some(Self {
            license_number: find(LICENSE_NUMBER)?,
            proper_name: find(PROPER_NAME)?,
            proprietary_name: find(PROPRIETARY_NAME),
            applicant: find(APPLICANT),
            strength: find(STRENGTH),
            dosage_form: find(DOSAGE_FORM),
            route: find(ROUTE),
            licensure_date: find(LICENSURE_DATE),
            license_status: find(LICENSE_STATUS),
            marketing_status: find(MARKETING_STATUS),
            bla_type: find(BLA_TYPE),
            biosimilar: find(BIOSIMILAR),
            interchangeable: find(INTERCHANGEABLE),
            interchangeable_date: find(INTERCHANGEABLE_DATE),
            reference_license: find(REFERENCE_LICENSE),
            reference_proper_name: find(REFERENCE_PROPER_NAME),
            reference_proprietary_name: find(REFERENCE_PROPRIETARY_NAME),
            exclusivity_expiration: find(EXCLUSIVITY_EXPIRATION),
            orphan_exclusivity_expiration: find(ORPHAN_EXCLUSIVITY_EXPIRATION),
            interchangeable_exclusivity_expiration: find(INTERCHANGEABLE_EXCLUSIVITY_EXPIRATION),
        })
    }

    fn required_width(&self) -> usize {
        self.license_number.max(self.proper_name) + 1
    }
}

/// A parsed row before reference names are resolved to license numbers
#[derive(Debug, Clone)]
struct BiologicRow {
    biologic: Biologic,
    reference_proper_name: Option<String>,
    reference_proprietary_name: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct PurpleBookData {
    pub biologics: Vec<Biologic>,
    pub report: ParseReport,
    /// Biosimilars whose reference was found by name rather than license number
    pub references_resolved_by_name: usize,
    pub unresolved_references: usize,
}

pub struct PurpleBookParser;

impl PurpleBookParser {
    pub fn parse(raw: &PurpleBookRaw) -> Result<PurpleBookData> {
        let decoded = TabularDecoder::read_any(&raw.bytes, &raw.file_name)?;
        let formats: &[DateFormat] = match decoded.file_type {
            FileType::Excel => &DateFormat::SPREADSHEET,
            FileType::Delimited => &DateFormat::TEXT,
        };
        Self::parse_rows(&decoded.rows, formats)
    }

    pub fn parse_rows(rows: &[Vec<String>], date_formats: &[DateFormat]) -> Result<PurpleBookData> {
        let mut report = ParseReport::new("purple book");

        let (header_idx, columns) = rows
            .iter()
            .take(HEADER_SEARCH_ROWS)
            .enumerate()
            .find_map(|(idx, row)| ColumnMap::from_header(row).map(|map| (idx, map)))
            .ok_or_else(|| {
                EngineError::Parse(
                    "Purple Book header row not found (expected BLA Number and Proper Name columns)"
                        .to_string(),
                )
            })?;

        let mut seen = HashSet::new();
        let mut parsed_rows = Vec::new();

        for (idx, row) in rows.iter().enumerate().skip(header_idx + 1) {
            report.rows_read += 1;
            match Self::parse_row(row, &columns, date_formats) {
                Ok(parsed) => {
                    if seen.insert(parsed.biologic.license_number.clone()) {
                        parsed_rows.push(parsed);
                        report.rows_parsed += 1;
                    } else {
                        report.duplicates += 1;
                    }
                }
                Err(reason) => {
                    tracing::debug!("Purple Book row {} skipped: {}", idx + 1, reason);
                    report.rows_skipped += 1;
                }
            }
        }

        report.log_summary();
        report.ensure_not_empty()?;

        let (biologics, resolved, unresolved) = Self::resolve_references(parsed_rows);
        if unresolved > 0 {
            tracing::warn!(
                "{} biosimilars have no resolvable reference product in this load",
                unresolved
            );
        }

        Ok(PurpleBookData {
            biologics,
            report,
            references_resolved_by_name: resolved,
            unresolved_references: unresolved,
        })
    }

    fn parse_row(
        row: &[String],
        columns: &ColumnMap,
        date_formats: &[DateFormat],
    ) -> std::result::Result<BiologicRow, String> {
        if row.len() < columns.required_width() {
            return Err(format!(
                "expected at least {} fields, found {}",
                columns.required_width(),
                row.len()
            ));
        }

        let cell = |idx: Option<usize>| -> Option<String> {
            idx.and_then(|i| row.get(i)).and_then(|v| non_blank(v))
        };
        let date = |idx: Option<usize>| -> Option<ParsedDate> {
            idx.and_then(|i| row.get(i))
                .and_then(|v| parse_source_date_with(v, date_formats))
        };

        let license_number = cell(Some(columns.license_number))
            .map(|v| normalize_license_number(&v))
            .filter(|v| !v.is_empty())
            .ok_or("missing license number")?;
        let proper_name = cell(Some(columns.proper_name)).ok_or("missing proper name")?;

        let bla_type = cell(columns.bla_type).unwrap_or_default().to_ascii_lowercase();
        let is_interchangeable = match cell(columns.interchangeable) {
            Some(flag) => parse_flag(&flag),
            None => bla_type.contains("interchangeable"),
        };
        // Interchangeable products are a subset of biosimilars
        let is_biosimilar = is_interchangeable
            || match cell(columns.biosimilar) {
                Some(flag) => parse_flag(&flag),
                None => bla_type.contains("351(k)") || bla_type.contains("biosimilar"),
            };

        let reference_license_number = if is_biosimilar {
            cell(columns.reference_license).map(|v| normalize_license_number(&v))
        } else {
            None
        };

        Ok(BiologicRow {
            biologic: Biologic {
                license_number,
                proper_name,
                proprietary_name: cell(columns.proprietary_name),
                applicant: cell(columns.applicant),
                strength: cell(columns.strength),
                dosage_form: cell(columns.dosage_form),
                route: cell(columns.route),
                licensure_date: date(columns.licensure_date),
                license_status: cell(columns.license_status),
                marketing_status: cell(columns.marketing_status),
                reference_license_number,
                is_biosimilar,
                is_interchangeable,
                interchangeable_date: date(columns.interchangeable_date),
                exclusivity_expiration: date(columns.exclusivity_expiration),
                orphan_exclusivity_expiration: date(columns.orphan_exclusivity_expiration),
                interchangeable_exclusivity_expiration: date(
                    columns.interchangeable_exclusivity_expiration,
                ),
            },
            reference_proper_name: cell(columns.reference_proper_name),
            reference_proprietary_name: cell(columns.reference_proprietary_name),
        })
    }

    /// Fill missing reference pointers of biosimilars from reference product names.
    /// Returns (biologics, resolved by name, still unresolved).
    fn resolve_references(rows: Vec<BiologicRow>) -> (Vec<Biologic>, usize, usize) {
        let mut by_proprietary: HashMap<String, String> = HashMap::new();
        let mut by_proper: HashMap<String, String> = HashMap::new();

        for row in rows.iter().filter(|r| !r.biologic.is_biosimilar) {
            let license = &row.biologic.license_number;
            if let Some(name) = &row.biologic.proprietary_name {
                by_proprietary.entry(name.to_lowercase()).or_insert_with(|| license.clone());
            }
            by_proper
                .entry(row.biologic.proper_name.to_lowercase())
                .or_insert_with(|| license.clone());
        }

        let mut resolved = 0;
        let mut unresolved = 0;
        let biologics = rows
            .into_iter()
            .map(|row| {
                let mut biologic = row.biologic;
                if biologic.is_biosimilar && biologic.reference_license_number.is_none() {
                    let found = row
                        .reference_proprietary_name
                        .as_ref()
                        .and_then(|name| by_proprietary.get(&name.to_lowercase()))
                        .or_else(|| {
                            row.reference_proper_name
                                .as_ref()
                                .and_then(|name| by_proper.get(&name.to_lowercase()))
                        });
                    match found {
                        Some(license) => {
                            biologic.reference_license_number = Some(license.clone());
                            resolved += 1;
                        }
                        None => unresolved += 1,
                    }
                }
                biologic
            })
            .collect();

        (biologics, resolved, unresolved)
    }
}

/// "BLA 125057" -> "125057"
fn normalize_license_number(raw: &str) -> String {
    let trimmed = raw.trim();
    let upper = trimmed.to_ascii_uppercase();
    match upper.strip_prefix("BLA") {
        Some(rest) => rest.trim_start_matches([' ', '-', '#']).to_string(),
        None => trimmed.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|c| c.to_string()).collect()
    }

    fn public_csv_rows() -> Vec<Vec<String>> {
        vec![
            row(&["Purple Book Data Download"]),
            row(&["Generated 09/15/2026"]),
            row(&[
                "N/R/U", "Applicant", "BLA Number", "Proprietary Name", "Proper Name", "BLA Type",
                "Strength", "Dosage Form", "Route of Administration", "Marketing Status", "Licensure",
                "Ref. Product Proper Name", "Ref. Product Proprietary Name", "Date of First Licensure",
                "Exclusivity Expiration Date", "Orphan Exclusivity Exp. Date",
            ]),
            row(&[
                "", "AbbVie Inc.", "125057", "Humira", "adalimumab", "351(a)", "40 mg/0.8 mL",
                "Injection", "Subcutaneous", "Rx", "Licensed", "", "", "12/31/2002", "", "",
            ]),
            row(&[
                "", "Amgen Inc.", "761024", "Amjevita", "adalimumab-atto", "351(k) Biosimilar",
                "40 mg/0.8 mL", "Injection", "Subcutaneous", "Rx", "Licensed", "adalimumab", "Humira",
                "09/23/2016", "", "",
            ]),
            row(&[
                "", "Boehringer", "761058", "Cyltezo", "adalimumab-adbm", "351(k) Interchangeable",
                "40 mg/0.8 mL", "Injection", "Subcutaneous", "Rx", "Licensed", "adalimumab", "Humira",
                "08/25/2017", "", "",
            ]),
            row(&["", "Broken Row"]),
            row(&[
                "", "AbbVie Inc.", "125057", "Humira", "adalimumab", "351(a)", "80 mg/0.8 mL",
                "Injection", "Subcutaneous", "Rx", "Licensed", "", "", "12/31/2002", "", "",
            ]),
        ]
    }

    #[test]
    fn test_public_layout_with_preamble() {
        let data = PurpleBookParser::parse_rows(&public_csv_rows(), &DateFormat::TEXT).unwrap();

        assert_eq!(data.biologics.len(), 3);
        assert_eq!(data.report.rows_skipped, 1);
        assert_eq!(data.report.duplicates, 1);

        let humira = &data.biologics[0];
        assert_eq!(humira.license_number, "125057");
        assert!(!humira.is_biosimilar);
        assert_eq!(humira.reference_license_number, None);
        assert_eq!(humira.licensure_date.as_ref().unwrap().to_column(), "2002-12-31");

        let amjevita = &data.biologics[1];
        assert!(amjevita.is_biosimilar);
        assert!(!amjevita.is_interchangeable);
        assert_eq!(amjevita.reference_license_number.as_deref(), Some("125057"));

        let cyltezo = &data.biologics[2];
        assert!(cyltezo.is_biosimilar);
        assert!(cyltezo.is_interchangeable);
        assert!(cyltezo.references("125057"));

        assert_eq!(data.references_resolved_by_name, 2);
        assert_eq!(data.unresolved_references, 0);
    }

    #[test]
    fn test_explicit_flags_and_reference_column() {
        let rows = vec![
            row(&["License Number", "Proper Name", "Proprietary Name", "Biosimilar", "Interchangeable", "Reference License Number", "Interchangeable Date"]),
            row(&["BLA 103000", "filgrastim", "Neupogen", "No", "No", "999999", ""]),
            row(&["125553", "filgrastim-sndz", "Zarxio", "Yes", "No", "103000", ""]),
            row(&["761080", "filgrastim-aafi", "Nivestym", "Yes", "Yes", "103000", "2024-02-01"]),
        ];
        let data = PurpleBookParser::parse_rows(&rows, &DateFormat::TEXT).unwrap();

        let neupogen = &data.biologics[0];
        assert_eq!(neupogen.license_number, "103000");
        // Originators never carry a reference pointer
        assert_eq!(neupogen.reference_license_number, None);

        assert_eq!(data.biologics[1].reference_license_number.as_deref(), Some("103000"));
        assert!(data.biologics[2].is_interchangeable);
        assert_eq!(
            data.biologics[2].interchangeable_date.as_ref().unwrap().to_column(),
            "2024-02-01"
        );
        assert_eq!(data.references_resolved_by_name, 0);
    }

    #[test]
    fn test_missing_header_is_parse_error() {
        let rows = vec![row(&["foo", "bar"]), row(&["1", "2"])];
        let err = PurpleBookParser::parse_rows(&rows, &DateFormat::TEXT).unwrap_err();
        assert!(matches!(err, EngineError::Parse(_)));
    }

    #[test]
    fn test_header_only_is_parse_error() {
        let rows = vec![row(&["BLA Number", "Proper Name"])];
        let err = PurpleBookParser::parse_rows(&rows, &DateFormat::TEXT).unwrap_err();
        assert!(matches!(err, EngineError::Parse(_)));
    }

    #[test]
    fn test_unresolvable_reference_is_kept_empty() {
        let rows = vec![
            row(&["BLA Number", "Proper Name", "BLA Type", "Ref. Product Proprietary Name"]),
            row(&["761999", "examplemab-xyz", "351(k) Biosimilar", "Notloaded"]),
        ];
        let data = PurpleBookParser::parse_rows(&rows, &DateFormat::TEXT).unwrap();
        assert_eq!(data.biologics[0].reference_license_number, None);
        assert_eq!(data.unresolved_references, 1);
    }
}

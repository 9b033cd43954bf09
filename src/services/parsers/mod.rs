pub mod orange_book;
pub mod purple_book;
pub mod tabular;

pub use orange_book::*;
pub use purple_book::*;
pub use tabular::*;

use serde::Serialize;

use crate::error::{EngineError, Result};

/// Row accounting for one parsed source file
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ParseReport {
    pub file: String,
    pub rows_read: usize,
    pub rows_parsed: usize,
    /// Malformed rows: wrong field count or an unusable mandatory field
    pub rows_skipped: usize,
    /// Well-formed rows dropped because their identity key was already loaded
    pub duplicates: usize,
}

impl ParseReport {
    pub fn new(file: &str) -> Self {
        Self {
            file: file.to_string(),
            ..Default::default()
        }
    }

    /// A mandatory file that yields nothing is almost certainly truncated or the wrong format.
    pub fn ensure_not_empty(&self) -> Result<()> {
        if self.rows_parsed == 0 {
            return Err(EngineError::Parse(format!(
                "{} contained no valid rows ({} read, {} skipped)",
                self.file, self.rows_read, self.rows_skipped
            )));
        }
        Ok(())
    }

    pub fn log_summary(&self) {
        if self.rows_skipped > 0 {
            tracing::warn!(
                "{}: parsed {} rows, skipped {} malformed, dropped {} duplicates",
                self.file, self.rows_parsed, self.rows_skipped, self.duplicates
            );
        } else {
            tracing::info!(
                "{}: parsed {} rows, dropped {} duplicates",
                self.file, self.rows_parsed, self.duplicates
            );
        }
    }
}

/// Blank text is absent, never an empty string or a sentinel
pub(crate) fn non_blank(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

pub(crate) fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_uppercase().as_str(),
        "Y" | "YES" | "TRUE" | "1"
    )
}

/// Header cells compared on letters and digits only: "Ref. Product Proper Name" == "ref product proper name"
pub(crate) fn normalize_header(value: &str) -> String {
    value
        .chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_blank() {
        assert_eq!(non_blank("  "), None);
        assert_eq!(non_blank(" AB "), Some("AB".to_string()));
    }

    #[test]
    fn test_flags() {
        assert!(parse_flag("Y"));
        assert!(parse_flag("yes"));
        assert!(!parse_flag(""));
        assert!(!parse_flag("N"));
    }

    #[test]
    fn test_header_normalization() {
        assert_eq!(normalize_header("Ref. Product Proper Name"), "refproductpropername");
        assert_eq!(normalize_header("BLA Number"), normalize_header("bla_number"));
    }

    #[test]
    fn test_empty_report_is_parse_error() {
        let report = ParseReport { file: "products.txt".into(), rows_read: 3, rows_skipped: 3, ..Default::default() };
        assert!(matches!(report.ensure_not_empty(), Err(EngineError::Parse(_))));
    }
}

/// Source date handling.
///
/// FDA files mix several date encodings. Each recognized encoding is a
/// `DateFormat` variant tried in a fixed order; text none of them accept is
/// kept verbatim as `ParsedDate::Unparsed` instead of being guessed at.

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

const UNPARSED_PREFIX: &str = "UNPARSED:";

/// Recognized date encodings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateFormat {
    /// 2031-05-12
    Iso,
    /// 2031-05-12T00:00:00 or 2031-05-12 00:00:00 (spreadsheet ISO cells)
    IsoDateTime,
    /// May 12, 2031
    MonthDayYear,
    /// 05/12/2031
    UsSlash,
    /// Excel day serial, only meaningful for spreadsheet cells
    ExcelSerial,
}

impl DateFormat {
    /// Encodings found in delimited text files
    pub const TEXT: [DateFormat; 4] = [
        DateFormat::Iso,
        DateFormat::IsoDateTime,
        DateFormat::MonthDayYear,
        DateFormat::UsSlash,
    ];

    /// Encodings found in spreadsheet cells
    pub const SPREADSHEET: [DateFormat; 5] = [
        DateFormat::Iso,
        DateFormat::IsoDateTime,
        DateFormat::MonthDayYear,
        DateFormat::UsSlash,
        DateFormat::ExcelSerial,
    ];

    pub fn parse(self, text: &str) -> Option<NaiveDate> {
        match self {
            DateFormat::Iso => NaiveDate::parse_from_str(text, "%Y-%m-%d").ok(),
            DateFormat::IsoDateTime => {
                let date_part = text.get(..10)?;
                let rest = text.get(10..)?;
                if !(rest.starts_with('T') || rest.starts_with(' ')) {
                    return None;
                }
                NaiveDate::parse_from_str(date_part, "%Y-%m-%d").ok()
            }
            DateFormat::MonthDayYear => NaiveDate::parse_from_str(text, "%b %d, %Y").ok(),
            DateFormat::UsSlash => NaiveDate::parse_from_str(text, "%m/%d/%Y").ok(),
            DateFormat::ExcelSerial => {
                let whole = text.split('.').next()?;
                if whole.is_empty() || !whole.chars().all(|c| c.is_ascii_digit()) {
                    return None;
                }
                let days: i64 = whole.parse().ok()?;
                // 1 = 1900-01-01; Excel's phantom 1900-02-29 makes 1899-12-30 the usable epoch
                if !(1..=2_958_465).contains(&days) {
                    return None;
                }
                NaiveDate::from_ymd_opt(1899, 12, 30)?.checked_add_signed(Duration::days(days))
            }
        }
    }
}

/// A date as it came out of a source file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParsedDate {
    Date(NaiveDate),
    Unparsed { unparsed: String },
}

impl ParsedDate {
    pub fn date(&self) -> Option<NaiveDate> {
        match self {
            ParsedDate::Date(d) => Some(*d),
            ParsedDate::Unparsed { .. } => None,
        }
    }

    pub fn is_unparsed(&self) -> bool {
        matches!(self, ParsedDate::Unparsed { .. })
    }

    /// Column encoding: ISO text, or the original text behind a marker prefix.
    pub fn to_column(&self) -> String {
        match self {
            ParsedDate::Date(d) => d.format("%Y-%m-%d").to_string(),
            ParsedDate::Unparsed { unparsed } => format!("{}{}", UNPARSED_PREFIX, unparsed),
        }
    }

    pub fn from_column(value: &str) -> Self {
        if let Some(original) = value.strip_prefix(UNPARSED_PREFIX) {
            return ParsedDate::Unparsed {
                unparsed: original.to_string(),
            };
        }
        match NaiveDate::parse_from_str(value, "%Y-%m-%d") {
            Ok(d) => ParsedDate::Date(d),
            Err(_) => ParsedDate::Unparsed {
                unparsed: value.to_string(),
            },
        }
    }
}

/// Parse a date from a delimited text field. Blank input is absent (`None`).
pub fn parse_source_date(text: &str) -> Option<ParsedDate> {
    parse_source_date_with(text, &DateFormat::TEXT)
}

pub fn parse_source_date_with(text: &str, formats: &[DateFormat]) -> Option<ParsedDate> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }

    let found = formats.iter().find_map(|format| format.parse(trimmed));
    Some(match found {
        Some(date) => ParsedDate::Date(date),
        None => {
            tracing::debug!("Unrecognized date text kept as unparsed: {:?}", trimmed);
            ParsedDate::Unparsed {
                unparsed: trimmed.to_string(),
            }
        }
    })
}

pub fn date_to_column(date: &Option<ParsedDate>) -> Option<String> {
    date.as_ref().map(ParsedDate::to_column)
}

pub fn date_from_column(value: Option<String>) -> Option<ParsedDate> {
    value
        .filter(|v| !v.is_empty())
        .map(|v| ParsedDate::from_column(&v))
}

/// Fractional years from `from` to `to`, negative when `to` is earlier.
pub fn years_between(from: NaiveDate, to: NaiveDate) -> f64 {
    (to - from).num_days() as f64 / 365.25
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_recognized_encodings() {
        assert_eq!(parse_source_date("2031-05-12"), Some(ParsedDate::Date(ymd(2031, 5, 12))));
        assert_eq!(parse_source_date("May 12, 2031"), Some(ParsedDate::Date(ymd(2031, 5, 12))));
        assert_eq!(parse_source_date("Jan 1, 1982"), Some(ParsedDate::Date(ymd(1982, 1, 1))));
        assert_eq!(parse_source_date("05/12/2031"), Some(ParsedDate::Date(ymd(2031, 5, 12))));
        assert_eq!(
            parse_source_date("2031-05-12T00:00:00"),
            Some(ParsedDate::Date(ymd(2031, 5, 12)))
        );
    }

    #[test]
    fn test_unrecognized_text_is_explicit() {
        let parsed = parse_source_date("Approved Prior to Jan 1, 1982").unwrap();
        assert!(parsed.is_unparsed());
        assert_eq!(parsed.date(), None);
        assert_eq!(parsed.to_column(), "UNPARSED:Approved Prior to Jan 1, 1982");
    }

    #[test]
    fn test_blank_is_absent() {
        assert_eq!(parse_source_date(""), None);
        assert_eq!(parse_source_date("   "), None);
    }

    #[test]
    fn test_excel_serial_only_when_requested() {
        // 45292 = 2024-01-01
        assert!(parse_source_date("45292").unwrap().is_unparsed());
        assert_eq!(
            parse_source_date_with("45292", &DateFormat::SPREADSHEET),
            Some(ParsedDate::Date(ymd(2024, 1, 1)))
        );
    }

    #[test]
    fn test_column_encoding() {
        let date = ParsedDate::Date(ymd(2027, 3, 9));
        assert_eq!(ParsedDate::from_column(&date.to_column()), date);

        let unparsed = ParsedDate::Unparsed { unparsed: "TBD".to_string() };
        assert_eq!(ParsedDate::from_column(&unparsed.to_column()), unparsed);
        assert_eq!(date_from_column(Some(String::new())), None);
    }

    #[test]
    fn test_years_between() {
        let years = years_between(ymd(2024, 1, 1), ymd(2026, 1, 1));
        assert!((years - 2.0).abs() < 0.01);
        assert!(years_between(ymd(2026, 1, 1), ymd(2024, 1, 1)) < 0.0);
    }
}

/// Raw tabular decoding for FDA downloads
/// Delimited text (tilde / comma) and Excel (XLSX/XLS) into rows of trimmed strings

use std::io::Cursor;
use csv::ReaderBuilder;
use calamine::{Reader, open_workbook_from_rs, Xlsx, Xls, Data};
use sha2::{Sha256, Digest};
use crate::error::{Result, EngineError};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FileType {
    Delimited,
    Excel,
}

impl std::fmt::Display for FileType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FileType::Delimited => write!(f, "delimited"),
            FileType::Excel => write!(f, "xlsx"),
        }
    }
}

/// Rows of one decoded file, header included
#[derive(Debug, Clone)]
pub struct DecodedRows {
    pub file_type: FileType,
    pub rows: Vec<Vec<String>>,
    /// Records the reader itself could not decode
    pub unreadable_rows: usize,
    pub empty_rows_skipped: usize,
}

pub struct TabularDecoder;

impl TabularDecoder {
    /// Detect file type from content and filename
    pub fn detect_file_type(data: &[u8], filename: &str) -> FileType {
        let filename_lower = filename.to_lowercase();

        if filename_lower.ends_with(".xlsx") || filename_lower.ends_with(".xls") {
            return FileType::Excel;
        }

        if data.len() >= 4 {
            // XLSX (ZIP format) starts with PK
            if &data[0..2] == b"PK" {
                return FileType::Excel;
            }

            // XLS (OLE format) starts with D0 CF 11 E0
            if data.len() >= 8 && &data[0..8] == b"\xD0\xCF\x11\xE0\xA1\xB1\x1A\xE1" {
                return FileType::Excel;
            }
        }

        FileType::Delimited
    }

    /// Decode a delimited text payload. Quoting is configurable because the
    /// Orange Book files are unquoted and may contain stray `"` characters.
    pub fn read_delimited(text: &str, delimiter: u8, quoting: bool) -> DecodedRows {
        let text = text.strip_prefix('\u{feff}').unwrap_or(text);

        let mut reader = ReaderBuilder::new()
            .delimiter(delimiter)
            .has_headers(false)
            .flexible(true)
            .quoting(quoting)
            .trim(csv::Trim::All)
            .from_reader(text.as_bytes());

        let mut rows = Vec::new();
        let mut unreadable_rows = 0;
        let mut empty_rows_skipped = 0;

        for (idx, result) in reader.records().enumerate() {
            match result {
                Ok(record) => {
                    let row: Vec<String> = record.iter()
                        .map(|s| s.trim().to_string())
                        .collect();

                    // Skip completely empty rows
                    if row.iter().all(|s| s.is_empty()) {
                        empty_rows_skipped += 1;
                        continue;
                    }

                    rows.push(row);
                }
                Err(e) => {
                    tracing::debug!("Row {} could not be decoded: {}", idx + 1, e);
                    unreadable_rows += 1;
                }
            }
        }

        DecodedRows {
            file_type: FileType::Delimited,
            rows,
            unreadable_rows,
            empty_rows_skipped,
        }
    }

    /// Decode a spreadsheet or comma-separated payload, whichever it is
    pub fn read_any(data: &[u8], filename: &str) -> Result<DecodedRows> {
        match Self::detect_file_type(data, filename) {
            FileType::Excel => Self::read_excel(data, filename),
            FileType::Delimited => {
                let text = String::from_utf8_lossy(data);
                Ok(Self::read_delimited(&text, b',', true))
            }
        }
    }

    /// Decode the first sheet of an Excel file (XLSX or XLS)
    pub fn read_excel(data: &[u8], filename: &str) -> Result<DecodedRows> {
        let cursor = Cursor::new(data);

        let range = if filename.to_lowercase().ends_with(".xls") {
            match open_workbook_from_rs::<Xls<_>, _>(cursor.clone()) {
                Ok(mut workbook) => Self::get_sheet_range_xls(&mut workbook)?,
                Err(_) => {
                    let mut workbook = open_workbook_from_rs::<Xlsx<_>, _>(Cursor::new(data))
                        .map_err(|e| EngineError::Parse(
                            format!("Failed to open spreadsheet {}: {}", filename, e)
                        ))?;
                    Self::get_sheet_range_xlsx(&mut workbook)?
                }
            }
        } else {
            match open_workbook_from_rs::<Xlsx<_>, _>(cursor.clone()) {
                Ok(mut workbook) => Self::get_sheet_range_xlsx(&mut workbook)?,
                Err(_) => {
                    let mut workbook = open_workbook_from_rs::<Xls<_>, _>(Cursor::new(data))
                        .map_err(|e| EngineError::Parse(
                            format!("Failed to open spreadsheet {}: {}", filename, e)
                        ))?;
                    Self::get_sheet_range_xls(&mut workbook)?
                }
            }
        };

        let mut rows = Vec::new();
        let mut empty_rows_skipped = 0;

        for row in range.rows() {
            let row_data: Vec<String> = row.iter()
                .map(Self::cell_to_string)
                .collect();

            if row_data.iter().all(|s| s.is_empty()) {
                empty_rows_skipped += 1;
                continue;
            }

            rows.push(row_data);
        }

        Ok(DecodedRows {
            file_type: FileType::Excel,
            rows,
            unreadable_rows: 0,
            empty_rows_skipped,
        })
    }

    fn get_sheet_range_xlsx(workbook: &mut Xlsx<Cursor<&[u8]>>) -> Result<calamine::Range<Data>> {
        let sheet_names = workbook.sheet_names().to_owned();
        let sheet_name = sheet_names.first()
            .ok_or_else(|| EngineError::Parse("Spreadsheet contains no sheets".to_string()))?;

        workbook
            .worksheet_range(sheet_name)
            .map_err(|e| EngineError::Parse(
                format!("Failed to read sheet {}: {}", sheet_name, e)
            ))
    }

    fn get_sheet_range_xls(workbook: &mut Xls<Cursor<&[u8]>>) -> Result<calamine::Range<Data>> {
        let sheet_names = workbook.sheet_names().to_owned();
        let sheet_name = sheet_names.first()
            .ok_or_else(|| EngineError::Parse("Spreadsheet contains no sheets".to_string()))?;

        workbook
            .worksheet_range(sheet_name)
            .map_err(|e| EngineError::Parse(
                format!("Failed to read sheet {}: {}", sheet_name, e)
            ))
    }

    /// Date cells come out as their Excel serial number; the date parser knows that encoding.
    fn cell_to_string(cell: &Data) -> String {
        match cell {
            Data::Int(i) => i.to_string(),
            Data::Float(f) => {
                // Remove trailing zeros and decimal point if whole number
                let s = format!("{}", f);
                if s.contains('.') {
                    s.trim_end_matches('0').trim_end_matches('.').to_string()
                } else {
                    s
                }
            }
            Data::String(s) => s.trim().to_string(),
            Data::Bool(b) => b.to_string(),
            Data::DateTime(dt) => format!("{}", dt),
            Data::DateTimeIso(s) => s.clone(),
            Data::DurationIso(s) => s.clone(),
            Data::Error(_) => String::new(),
            Data::Empty => String::new(),
        }
    }

    /// SHA-256 of a raw payload, recorded in generation metadata
    pub fn calculate_hash(data: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(data);
        hex::encode(hasher.finalize())
    }
}

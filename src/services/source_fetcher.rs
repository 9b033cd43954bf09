use std::io::{Cursor, Read};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Months, NaiveDate, Utc};

use crate::config::SourceConfig;
use crate::error::{EngineError, Result};
use crate::services::parsers::TabularDecoder;

/// The three Orange Book member files, decoded to text
#[derive(Debug, Clone)]
pub struct OrangeBookRaw {
    pub products: String,
    pub patents: String,
    pub exclusivity: String,
    /// Publication date of the archive (Last-Modified, or the fetch date)
    pub source_date: Option<NaiveDate>,
    pub sha256: String,
}

/// One Purple Book download, still undecoded (CSV or spreadsheet)
#[derive(Debug, Clone)]
pub struct PurpleBookRaw {
    pub bytes: Vec<u8>,
    pub file_name: String,
    /// First day of the month the dataset was published for
    pub dataset_month: NaiveDate,
    pub sha256: String,
}

impl PurpleBookRaw {
    pub fn month_label(&self) -> String {
        self.dataset_month.format("%Y-%m").to_string()
    }
}

/// Where raw datasets come from. The engine only ever talks to this seam.
#[async_trait]
pub trait DataSource: Send + Sync {
    async fn fetch_orange_book(&self) -> Result<OrangeBookRaw>;
    async fn fetch_purple_book(&self) -> Result<PurpleBookRaw>;
}

/// Result of one URL download after retries
#[derive(Debug)]
enum Download {
    Found {
        bytes: Vec<u8>,
        last_modified: Option<NaiveDate>,
    },
    /// 404, or a placeholder HTML page where a data file should be
    NotPublished,
}

/// Downloads the public FDA datasets over HTTP
pub struct FdaSourceFetcher {
    config: SourceConfig,
    http_client: reqwest::Client,
}

impl FdaSourceFetcher {
    pub fn new(config: SourceConfig) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()
            .unwrap_or_default();

        Self { config, http_client }
    }

    pub fn config(&self) -> &SourceConfig {
        &self.config
    }

    /// Fetch the Purple Book, walking back month by month from `today`.
    pub async fn fetch_purple_book_as_of(&self, today: NaiveDate) -> Result<PurpleBookRaw> {
        let candidates = purple_book_candidates(
            today,
            self.config.max_lookback_months,
            &self.config.purple_book_url_template,
        );

        for (month, url) in candidates {
            tracing::debug!("Trying Purple Book dataset for {}: {}", month.format("%Y-%m"), url);

            // A network failure that survives retries aborts the month search: an
            // older month would not be reachable either.
            match self.download(&url).await? {
                Download::Found { bytes, .. } => {
                    tracing::info!(
                        "Purple Book dataset found for {} ({} bytes)",
                        month.format("%Y-%m"),
                        bytes.len()
                    );
                    let sha256 = TabularDecoder::calculate_hash(&bytes);
                    return Ok(PurpleBookRaw {
                        file_name: file_name_from_url(&url),
                        bytes,
                        dataset_month: month,
                        sha256,
                    });
                }
                Download::NotPublished => continue,
            }
        }

        Err(EngineError::Acquisition(format!(
            "No Purple Book dataset published within {} months of {}",
            self.config.max_lookback_months, today
        )))
    }

    /// Download with exponential backoff. 404 is a definitive "not published".
    async fn download(&self, url: &str) -> Result<Download> {
        let max_retries = self.config.max_retries.max(1);
        let mut last_error = None;

        for attempt in 0..max_retries {
            if attempt > 0 {
                let delay = Duration::from_millis(
                    self.config.retry_base_delay_ms.saturating_mul(1 << (attempt - 1).min(16)),
                );
                tracing::warn!("Retry attempt {} for {} after {:?} delay", attempt + 1, url, delay);
                tokio::time::sleep(delay).await;
            }

            let response = match self.http_client.get(url).send().await {
                Ok(response) => response,
                Err(e) => {
                    last_error = Some(format!("HTTP request failed: {}", e));
                    continue;
                }
            };

            let status = response.status();
            if status.as_u16() == 404 {
                tracing::debug!("{} returned 404", url);
                return Ok(Download::NotPublished);
            }
            if status.as_u16() == 429 {
                let wait = retry_after_secs(&response).unwrap_or(0).min(60);
                tracing::warn!("Rate limited by {}, backing off {}s", url, wait);
                tokio::time::sleep(Duration::from_secs(wait)).await;
                last_error = Some("rate limited (429)".to_string());
                continue;
            }
            if status.is_client_error() && status.as_u16() != 408 {
                return Err(EngineError::Acquisition(format!("{} returned status {}", url, status)));
            }
            if !status.is_success() {
                last_error = Some(format!("server returned status {}", status));
                continue;
            }

            let last_modified = response
                .headers()
                .get(reqwest::header::LAST_MODIFIED)
                .and_then(|v| v.to_str().ok())
                .and_then(parse_http_date);

            match response.bytes().await {
                Ok(bytes) => {
                    if looks_like_html(&bytes) {
                        tracing::debug!("{} served an HTML page instead of a dataset", url);
                        return Ok(Download::NotPublished);
                    }
                    return Ok(Download::Found {
                        bytes: bytes.to_vec(),
                        last_modified,
                    });
                }
                Err(e) => {
                    last_error = Some(format!("Failed to read response body: {}", e));
                    continue;
                }
            }
        }

        Err(EngineError::Acquisition(format!(
            "{} failed after {} attempts: {}",
            url,
            max_retries,
            last_error.unwrap_or_else(|| "unknown error".to_string())
        )))
    }
}

#[async_trait]
impl DataSource for FdaSourceFetcher {
    async fn fetch_orange_book(&self) -> Result<OrangeBookRaw> {
        let url = &self.config.orange_book_url;
        tracing::info!("Downloading Orange Book archive from {}", url);

        let (bytes, last_modified) = match self.download(url).await? {
            Download::Found { bytes, last_modified } => (bytes, last_modified),
            Download::NotPublished => {
                return Err(EngineError::Acquisition(format!(
                    "Orange Book archive not available at {}",
                    url
                )))
            }
        };

        let mut raw = unpack_orange_book_archive(&bytes)?;
        raw.source_date = Some(last_modified.unwrap_or_else(|| Utc::now().date_naive()));
        Ok(raw)
    }

    async fn fetch_purple_book(&self) -> Result<PurpleBookRaw> {
        self.fetch_purple_book_as_of(Utc::now().date_naive()).await
    }
}

/// Candidate (month, url) pairs, newest first: the current month then
/// `max_lookback_months` earlier ones.
pub fn purple_book_candidates(
    today: NaiveDate,
    max_lookback_months: u32,
    template: &str,
) -> Vec<(NaiveDate, String)> {
    let Some(current) = today.with_day(1) else {
        return Vec::new();
    };

    (0..=max_lookback_months)
        .filter_map(|back| current.checked_sub_months(Months::new(back)))
        .map(|month| {
            let url = template
                .replace("{year}", &month.year().to_string())
                .replace("{month}", &month.format("%B").to_string().to_lowercase());
            (month, url)
        })
        .collect()
}

/// Pull the three member files out of the Orange Book zip.
/// Member names are matched case-insensitively and may sit in a folder.
pub fn unpack_orange_book_archive(bytes: &[u8]) -> Result<OrangeBookRaw> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| EngineError::Parse(format!("Orange Book archive is not a valid zip: {}", e)))?;

    let mut products = None;
    let mut patents = None;
    let mut exclusivity = None;

    for idx in 0..archive.len() {
        let mut file = archive
            .by_index(idx)
            .map_err(|e| EngineError::Parse(format!("Unreadable Orange Book archive entry: {}", e)))?;
        if file.is_dir() {
            continue;
        }

        let base_name = file
            .name()
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or_default()
            .to_ascii_lowercase();
        let slot = match base_name.as_str() {
            "products.txt" | "product.txt" => &mut products,
            "patent.txt" | "patents.txt" => &mut patents,
            "exclusivity.txt" => &mut exclusivity,
            _ => continue,
        };

        let mut content = Vec::new();
        file.read_to_end(&mut content)?;
        *slot = Some(String::from_utf8_lossy(&content).into_owned());
    }

    let missing = |name: &str| EngineError::Parse(format!("Orange Book archive has no {}", name));

    Ok(OrangeBookRaw {
        products: products.ok_or_else(|| missing("products.txt"))?,
        patents: patents.ok_or_else(|| missing("patent.txt"))?,
        exclusivity: exclusivity.ok_or_else(|| missing("exclusivity.txt"))?,
        source_date: None,
        sha256: TabularDecoder::calculate_hash(bytes),
    })
}

fn looks_like_html(bytes: &[u8]) -> bool {
    let head = String::from_utf8_lossy(&bytes[..bytes.len().min(512)]).to_ascii_lowercase();
    let head = head.trim_start_matches('\u{feff}').trim_start();
    head.starts_with("<!doctype") || head.starts_with("<html")
}

fn parse_http_date(value: &str) -> Option<NaiveDate> {
    DateTime::parse_from_rfc2822(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc).date_naive())
}

fn retry_after_secs(response: &reqwest::Response) -> Option<u64> {
    response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}

fn file_name_from_url(url: &str) -> String {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    path.rsplit('/')
        .next()
        .filter(|name| !name.is_empty())
        .unwrap_or("purplebook.csv")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    fn zip_with(entries: &[(&str, &str)]) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        for (name, content) in entries {
            writer.start_file(*name, SimpleFileOptions::default()).unwrap();
            writer.write_all(content.as_bytes()).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn test_candidates_walk_back_across_year_boundary() {
        let today = NaiveDate::from_ymd_opt(2026, 2, 17).unwrap();
        let candidates = purple_book_candidates(today, 3, "https://x/{year}/pb-{month}.csv");

        assert_eq!(candidates.len(), 4);
        assert_eq!(candidates[0].1, "https://x/2026/pb-february.csv");
        assert_eq!(candidates[1].1, "https://x/2026/pb-january.csv");
        assert_eq!(candidates[2].1, "https://x/2025/pb-december.csv");
        assert_eq!(candidates[3].0, NaiveDate::from_ymd_opt(2025, 11, 1).unwrap());
    }

    #[test]
    fn test_unpack_finds_members_case_insensitively() {
        let bytes = zip_with(&[
            ("EOBZIP/Products.txt", "Ingredient~Type\n"),
            ("EOBZIP/patent.txt", "Appl_Type~Appl_No\n"),
            ("EOBZIP/exclusivity.txt", "Appl_Type~Exclusivity_Code\n"),
            ("readme.pdf", "ignored"),
        ]);

        let raw = unpack_orange_book_archive(&bytes).unwrap();
        assert!(raw.products.starts_with("Ingredient"));
        assert!(raw.patents.starts_with("Appl_Type~Appl_No"));
        assert!(raw.exclusivity.contains("Exclusivity_Code"));
        assert_eq!(raw.sha256.len(), 64);
    }

    #[test]
    fn test_unpack_missing_member_is_parse_error() {
        let bytes = zip_with(&[("products.txt", "x"), ("patent.txt", "y")]);
        let err = unpack_orange_book_archive(&bytes).unwrap_err();
        assert!(matches!(err, EngineError::Parse(msg) if msg.contains("exclusivity.txt")));
    }

    #[test]
    fn test_unpack_rejects_non_zip() {
        let err = unpack_orange_book_archive(b"<html>maintenance</html>").unwrap_err();
        assert!(matches!(err, EngineError::Parse(_)));
    }

    #[test]
    fn test_html_placeholder_detection() {
        assert!(looks_like_html(b"  <!DOCTYPE html><html>"));
        assert!(looks_like_html(b"<HTML><body>Page not found"));
        assert!(!looks_like_html(b"N/R/U,Applicant,BLA Number"));
    }

    #[test]
    fn test_http_date_and_file_name() {
        assert_eq!(
            parse_http_date("Wed, 16 Sep 2026 14:02:11 GMT"),
            NaiveDate::from_ymd_opt(2026, 9, 16)
        );
        assert_eq!(parse_http_date("yesterday"), None);
        assert_eq!(
            file_name_from_url("https://h/files/2026/purplebook-search-september-data-download.csv?x=1"),
            "purplebook-search-september-data-download.csv"
        );
    }
}

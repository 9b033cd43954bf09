// Shared fixtures for the integration suites: small FDA-format datasets and
// an in-process DataSource that counts how often it is asked for data.
#![allow(dead_code)]

use std::io::{Cursor, Write};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;

use atlas_regdata::config::{EngineConfig, FreshnessConfig, QueryConfig, SourceConfig, StoreConfig};
use atlas_regdata::error::{EngineError, Result};
use atlas_regdata::services::parsers::TabularDecoder;
use atlas_regdata::services::{DataSource, OrangeBookRaw, PurpleBookRaw};

pub const PRODUCTS_TXT: &str = "\
Ingredient~DF;Route~Trade_Name~Applicant~Strength~Appl_Type~Appl_No~Product_No~TE_Code~Approval_Date~RLD~RS~Type~Applicant_Full_Name
IBUPROFEN~TABLET;ORAL~MOTRIN~MCNEIL~400MG~N~018989~001~AB~Sep 19, 1984~Yes~No~RX~MCNEIL CONSUMER HEALTHCARE
IBUPROFEN~TABLET;ORAL~IBUPROFEN~PERRIGO~400MG~A~071935~001~AB~Jun 21, 1988~No~No~RX~PERRIGO CO
IBUPROFEN~TABLET;ORAL~IBUPROFEN~BX PHARMA~400MG~A~075000~001~BX~Jan 05, 1999~No~No~RX~BX PHARMA INC
IBUPROFEN~TABLET;ORAL~ADVIL~PFIZER~200MG~N~019012~001~~May 18, 1984~No~No~OTC~PFIZER CONSUMER HEALTHCARE
ATORVASTATIN CALCIUM~TABLET;ORAL~LIPITOR~VIATRIS~EQ 10MG BASE~N~020702~001~AB~Dec 17, 1996~Yes~No~RX~VIATRIS SPECIALTY LLC
ATORVASTATIN CALCIUM~TABLET;ORAL~ATORVASTATIN CALCIUM~TEVA~EQ 10MG BASE~A~076477~001~AB~Nov 30, 2011~No~No~RX~TEVA PHARMACEUTICALS USA
FENOFIBRATE~TABLET;ORAL~TRICOR~ABBVIE~145MG~N~021000~001~AB~Nov 05, 2004~Yes~No~RX~ABBVIE INC
SEMAGLUTIDE~TABLET;ORAL~RYBELSUS~NOVO~3MG~N~213051~001~~Sep 20, 2019~Yes~No~RX~NOVO NORDISK INC
IBUPROFEN~TABLET;ORAL~MOTRIN~MCNEIL~400MG~N~018989~001~AB~Sep 19, 1984~Yes~No~RX~MCNEIL CONSUMER HEALTHCARE
BROKEN~ROW
";

pub const PATENT_TXT: &str = "\
Appl_Type~Appl_No~Product_No~Patent_No~Patent_Expire_Date_Text~Drug_Substance_Flag~Drug_Product_Flag~Patent_Use_Code~Delist_Flag~Submission_Date
N~020702~001~5273995~Jun 28, 2011~Y~Y~U-1~~
N~020702~001~6126971~Jan 19, 2017~~Y~~~
N~021000~001~7037529~Jan 09, 2023~~Y~U-2~~
N~213051~001~10000000~Dec 05, 2031~Y~~U-3~~Jan 10, 2020
N~213051~001~10500000~Aug 01, 2033~~Y~~~
N~213051~001~9999999~Mar 01, 2040~~Y~~Y~
N~099999~001~8888888~Jan 01, 2030~Y~~~~
";

pub const EXCLUSIVITY_TXT: &str = "\
Appl_Type~Appl_No~Product_No~Exclusivity_Code~Exclusivity_Date
N~213051~001~NCE~Dec 05, 2024
N~213051~001~M-123~Jan 16, 2035
N~020702~001~PED~Dec 28, 2011
N~021000~001~NP~Nov 05, 2007
";

pub const PURPLE_BOOK_CSV: &str = "\
Purple Book Data Download
\"Date of data download: 9/15/2026\"
N/R/U,Applicant,BLA Number,Proprietary Name,Proper Name,BLA Type,Strength,Dosage Form,Route of Administration,Marketing Status,Licensure,Date of First Licensure,Ref. Product Proper Name,Ref. Product Proprietary Name,Exclusivity Expiration Date,Orphan Exclusivity Exp. Date
,AbbVie Inc.,125057,Humira,adalimumab,351(a),40 mg/0.8 mL,Injection,Subcutaneous,Rx,Licensed,12/31/2002,,,,
,Amgen Inc.,761024,Amjevita,adalimumab-atto,351(k) Biosimilar,40 mg/0.8 mL,Injection,Subcutaneous,Rx,Licensed,09/23/2016,adalimumab,Humira,,
,Boehringer Ingelheim,761058,Cyltezo,adalimumab-adbm,351(k) Interchangeable,40 mg/0.8 mL,Injection,Subcutaneous,Rx,Licensed,08/25/2017,adalimumab,Humira,,
,Sandoz Inc.,761071,Hyrimoz,adalimumab-adaz,351(k) Biosimilar,40 mg/0.8 mL,Injection,Subcutaneous,Rx,Licensed,10/30/2018,adalimumab,Humira,,
,Samsung Bioepis,761118,Hadlima,adalimumab-bwwd,351(k) Biosimilar,40 mg/0.8 mL,Injection,Subcutaneous,Rx,Licensed,07/23/2019,adalimumab,Humira,,
,Amgen Inc.,103353,Neupogen,filgrastim,351(a),300 mcg/mL,Injection,Intravenous,Rx,Licensed,02/20/1991,,,,
,Sandoz Inc.,125553,Zarxio,filgrastim-sndz,351(k) Biosimilar,300 mcg/0.5 mL,Injection,Subcutaneous,Rx,Licensed,03/06/2015,filgrastim,Neupogen,,
";

pub const PRODUCT_COUNT: i64 = 8;
pub const PATENT_COUNT: i64 = 7;
pub const EXCLUSIVITY_COUNT: i64 = 4;
pub const BIOLOGIC_COUNT: i64 = 7;

pub fn orange_book_zip() -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for (name, content) in [
        ("products.txt", PRODUCTS_TXT),
        ("patent.txt", PATENT_TXT),
        ("exclusivity.txt", EXCLUSIVITY_TXT),
    ] {
        writer
            .start_file(name, zip::write::SimpleFileOptions::default())
            .unwrap();
        writer.write_all(content.as_bytes()).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

pub fn orange_book_raw() -> OrangeBookRaw {
    OrangeBookRaw {
        products: PRODUCTS_TXT.to_string(),
        patents: PATENT_TXT.to_string(),
        exclusivity: EXCLUSIVITY_TXT.to_string(),
        source_date: NaiveDate::from_ymd_opt(2026, 9, 15),
        sha256: TabularDecoder::calculate_hash(PRODUCTS_TXT.as_bytes()),
    }
}

pub fn purple_book_raw() -> PurpleBookRaw {
    PurpleBookRaw {
        bytes: PURPLE_BOOK_CSV.as_bytes().to_vec(),
        file_name: "purplebook-search-september-data-download.csv".to_string(),
        dataset_month: NaiveDate::from_ymd_opt(2026, 9, 1).unwrap(),
        sha256: TabularDecoder::calculate_hash(PURPLE_BOOK_CSV.as_bytes()),
    }
}

/// How the fake source answers
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SourceMode {
    Healthy,
    /// Every fetch fails as if retries were exhausted
    Unreachable,
    /// Fetch succeeds but products.txt has no valid rows
    TruncatedProducts,
}

pub struct FakeSource {
    mode: Mutex<SourceMode>,
    delay: Duration,
    pub orange_fetches: AtomicUsize,
    pub purple_fetches: AtomicUsize,
}

impl FakeSource {
    pub fn new(mode: SourceMode) -> Arc<Self> {
        Self::with_delay(mode, Duration::from_millis(0))
    }

    pub fn with_delay(mode: SourceMode, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            mode: Mutex::new(mode),
            delay,
            orange_fetches: AtomicUsize::new(0),
            purple_fetches: AtomicUsize::new(0),
        })
    }

    pub fn set_mode(&self, mode: SourceMode) {
        *self.mode.lock().unwrap() = mode;
    }

    pub fn orange_fetch_count(&self) -> usize {
        self.orange_fetches.load(Ordering::SeqCst)
    }

    fn mode(&self) -> SourceMode {
        *self.mode.lock().unwrap()
    }
}

#[async_trait]
impl DataSource for FakeSource {
    async fn fetch_orange_book(&self) -> Result<OrangeBookRaw> {
        self.orange_fetches.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;

        match self.mode() {
            SourceMode::Healthy => Ok(orange_book_raw()),
            SourceMode::Unreachable => Err(EngineError::Acquisition(
                "orange book download failed after 3 attempts".to_string(),
            )),
            SourceMode::TruncatedProducts => {
                let mut raw = orange_book_raw();
                raw.products = "Ingredient~DF;Route\nGARBAGE\n".to_string();
                Ok(raw)
            }
        }
    }

    async fn fetch_purple_book(&self) -> Result<PurpleBookRaw> {
        self.purple_fetches.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;

        match self.mode() {
            SourceMode::Unreachable => Err(EngineError::Acquisition(
                "no purple book dataset reachable".to_string(),
            )),
            _ => Ok(purple_book_raw()),
        }
    }
}

pub fn test_config(data_dir: &Path, max_age_days: i64) -> EngineConfig {
    EngineConfig {
        source: SourceConfig {
            max_retries: 2,
            retry_base_delay_ms: 1,
            request_timeout_secs: 5,
            ..SourceConfig::default()
        },
        store: StoreConfig::in_dir(data_dir),
        freshness: FreshnessConfig {
            max_age_days,
            retry_cooldown_secs: 0,
            refresh_interval_hours: 24,
        },
        query: QueryConfig {
            max_search_results: 50,
        },
    }
}

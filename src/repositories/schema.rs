//! Generation database layout.
//!
//! Every generation is a fresh SQLite file, so there are no migrations: the
//! tables are created empty, bulk-loaded, then indexed. Secondary indices and
//! FTS5 content are built after the load rather than maintained per insert.

/// Base tables, created before any row is written
pub const CREATE_TABLES: &[&str] = &[
    r#"
    CREATE TABLE generation_meta (
        generation_id TEXT PRIMARY KEY,
        version_tag TEXT NOT NULL,
        schema_version INTEGER NOT NULL,
        orange_book_source_date TEXT,
        purple_book_source_month TEXT,
        orange_book_sha256 TEXT,
        purple_book_sha256 TEXT,
        product_count INTEGER NOT NULL,
        patent_count INTEGER NOT NULL,
        exclusivity_count INTEGER NOT NULL,
        biologic_count INTEGER NOT NULL,
        rows_skipped INTEGER NOT NULL,
        built_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE products (
        id INTEGER PRIMARY KEY,
        ingredient TEXT NOT NULL,
        dosage_form TEXT,
        route TEXT,
        trade_name TEXT,
        applicant TEXT,
        applicant_full_name TEXT,
        strength TEXT,
        appl_type TEXT NOT NULL,
        appl_no TEXT NOT NULL,
        product_no TEXT NOT NULL,
        te_code TEXT,
        approval_date TEXT,
        rld INTEGER NOT NULL,
        rs INTEGER NOT NULL,
        marketing_status TEXT NOT NULL,
        UNIQUE (appl_type, appl_no, product_no)
    )
    "#,
    r#"
    CREATE TABLE patents (
        id INTEGER PRIMARY KEY,
        appl_type TEXT NOT NULL,
        appl_no TEXT NOT NULL,
        product_no TEXT NOT NULL,
        patent_no TEXT NOT NULL,
        patent_expire_date TEXT,
        drug_substance INTEGER NOT NULL,
        drug_product INTEGER NOT NULL,
        use_code TEXT,
        delisted INTEGER NOT NULL,
        submission_date TEXT
    )
    "#,
    r#"
    CREATE TABLE exclusivities (
        id INTEGER PRIMARY KEY,
        appl_type TEXT NOT NULL,
        appl_no TEXT NOT NULL,
        product_no TEXT NOT NULL,
        exclusivity_code TEXT NOT NULL,
        exclusivity_date TEXT
    )
    "#,
    r#"
    CREATE TABLE biologics (
        id INTEGER PRIMARY KEY,
        license_number TEXT NOT NULL UNIQUE,
        proper_name TEXT NOT NULL,
        proprietary_name TEXT,
        applicant TEXT,
        strength TEXT,
        dosage_form TEXT,
        route TEXT,
        licensure_date TEXT,
        license_status TEXT,
        marketing_status TEXT,
        reference_license_number TEXT,
        is_biosimilar INTEGER NOT NULL,
        is_interchangeable INTEGER NOT NULL,
        interchangeable_date TEXT,
        exclusivity_expiration TEXT,
        orphan_exclusivity_expiration TEXT,
        interchangeable_exclusivity_expiration TEXT,
        CHECK (is_biosimilar = 1 OR reference_license_number IS NULL)
    )
    "#,
    r#"
    CREATE VIRTUAL TABLE products_fts USING fts5(
        ingredient, trade_name, applicant_full_name,
        content = 'products', content_rowid = 'id'
    )
    "#,
    r#"
    CREATE VIRTUAL TABLE biologics_fts USING fts5(
        proper_name, proprietary_name, applicant,
        content = 'biologics', content_rowid = 'id'
    )
    "#,
];

/// Lookup indices, built once all rows are in
pub const CREATE_INDEXES: &[&str] = &[
    "CREATE INDEX idx_products_ingredient ON products (ingredient COLLATE NOCASE)",
    "CREATE INDEX idx_products_trade_name ON products (trade_name COLLATE NOCASE)",
    "CREATE INDEX idx_products_appl_no ON products (appl_no)",
    "CREATE INDEX idx_products_te_code ON products (te_code)",
    "CREATE INDEX idx_products_rld ON products (rld)",
    "CREATE INDEX idx_patents_key ON patents (appl_type, appl_no, product_no)",
    "CREATE INDEX idx_patents_appl_no ON patents (appl_no)",
    "CREATE INDEX idx_exclusivities_key ON exclusivities (appl_type, appl_no, product_no)",
    "CREATE INDEX idx_exclusivities_appl_no ON exclusivities (appl_no)",
    "CREATE INDEX idx_biologics_proper_name ON biologics (proper_name COLLATE NOCASE)",
    "CREATE INDEX idx_biologics_proprietary_name ON biologics (proprietary_name COLLATE NOCASE)",
    "CREATE INDEX idx_biologics_reference ON biologics (reference_license_number)",
    "CREATE INDEX idx_biologics_flags ON biologics (is_biosimilar, is_interchangeable)",
];

/// Derive both full-text indices from their content tables in one pass
pub const REBUILD_FTS: &[&str] = &[
    "INSERT INTO products_fts (products_fts) VALUES ('rebuild')",
    "INSERT INTO biologics_fts (biologics_fts) VALUES ('rebuild')",
];

/// Tables every readable generation must contain
pub const REQUIRED_TABLES: &[&str] = &[
    "generation_meta",
    "products",
    "patents",
    "exclusivities",
    "biologics",
    "products_fts",
    "biologics_fts",
];

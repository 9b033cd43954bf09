use sqlx::{query_as, query_scalar, FromRow, QueryBuilder, Sqlite, SqlitePool};

use crate::error::{EngineError, Result};
use crate::models::orange_book::{Exclusivity, Patent, Product};
use crate::utils::dates::date_from_column;
use crate::utils::search_terms::SearchTerms;

/// Full-text or substring match on ingredient, trade name and applicant
const MATCH_ALL_FIELDS: &str = r#"
    SELECT rowid AS id FROM products_fts WHERE products_fts MATCH ?1
    UNION
    SELECT id FROM products
    WHERE ingredient LIKE ?2 ESCAPE '\'
       OR trade_name LIKE ?2 ESCAPE '\'
       OR applicant_full_name LIKE ?2 ESCAPE '\'
"#;

/// Same, restricted to ingredient and trade name
const MATCH_NAME_FIELDS: &str = r#"
    SELECT rowid AS id FROM products_fts WHERE products_fts MATCH ?1
    UNION
    SELECT id FROM products
    WHERE ingredient LIKE ?2 ESCAPE '\'
       OR trade_name LIKE ?2 ESCAPE '\'
"#;

/// Brands first, then by name, then by key
const PRODUCT_ORDER: &str = "ORDER BY CASE p.appl_type WHEN 'N' THEN 0 ELSE 1 END, \
     p.trade_name COLLATE NOCASE, p.ingredient COLLATE NOCASE, p.appl_no, p.product_no";

const NAME_COLUMNS: &[&str] = &["ingredient", "trade_name"];

#[derive(Debug, FromRow)]
struct ProductRow {
    ingredient: String,
    dosage_form: Option<String>,
    route: Option<String>,
    trade_name: Option<String>,
    applicant: Option<String>,
    applicant_full_name: Option<String>,
    strength: Option<String>,
    appl_type: String,
    appl_no: String,
    product_no: String,
    te_code: Option<String>,
    approval_date: Option<String>,
    rld: bool,
    rs: bool,
    marketing_status: String,
}

impl TryFrom<ProductRow> for Product {
    type Error = EngineError;

    fn try_from(row: ProductRow) -> Result<Self> {
        Ok(Product {
            ingredient: row.ingredient,
            dosage_form: row.dosage_form,
            route: row.route,
            trade_name: row.trade_name,
            applicant: row.applicant,
            applicant_full_name: row.applicant_full_name,
            strength: row.strength,
            application_type: row.appl_type.parse().map_err(corrupt_row)?,
            application_number: row.appl_no,
            product_number: row.product_no,
            te_code: row.te_code,
            approval_date: date_from_column(row.approval_date),
            is_reference_listed_drug: row.rld,
            is_reference_standard: row.rs,
            marketing_status: row.marketing_status.parse().map_err(corrupt_row)?,
        })
    }
}

#[derive(Debug, FromRow)]
struct PatentRow {
    appl_type: String,
    appl_no: String,
    product_no: String,
    patent_no: String,
    patent_expire_date: Option<String>,
    drug_substance: bool,
    drug_product: bool,
    use_code: Option<String>,
    delisted: bool,
    submission_date: Option<String>,
}

impl TryFrom<PatentRow> for Patent {
    type Error = EngineError;

    fn try_from(row: PatentRow) -> Result<Self> {
        Ok(Patent {
            application_type: row.appl_type.parse().map_err(corrupt_row)?,
            application_number: row.appl_no,
            product_number: row.product_no,
            patent_number: row.patent_no,
            expiration_date: date_from_column(row.patent_expire_date),
            drug_substance: row.drug_substance,
            drug_product: row.drug_product,
            use_code: row.use_code,
            delisted: row.delisted,
            submission_date: date_from_column(row.submission_date),
        })
    }
}

#[derive(Debug, FromRow)]
struct ExclusivityRow {
    appl_type: String,
    appl_no: String,
    product_no: String,
    exclusivity_code: String,
    exclusivity_date: Option<String>,
}

impl TryFrom<ExclusivityRow> for Exclusivity {
    type Error = EngineError;

    fn try_from(row: ExclusivityRow) -> Result<Self> {
        Ok(Exclusivity {
            application_type: row.appl_type.parse().map_err(corrupt_row)?,
            application_number: row.appl_no,
            product_number: row.product_no,
            exclusivity_code: row.exclusivity_code,
            expiration_date: date_from_column(row.exclusivity_date),
        })
    }
}

#[derive(Debug, FromRow)]
struct LinkedPatentRow {
    #[sqlx(flatten)]
    patent: PatentRow,
    trade_name: Option<String>,
}

#[derive(Debug, FromRow)]
struct LinkedExclusivityRow {
    #[sqlx(flatten)]
    exclusivity: ExclusivityRow,
    trade_name: Option<String>,
}

/// A patent joined to the product it protects
#[derive(Debug, Clone)]
pub struct LinkedPatent {
    pub patent: Patent,
    pub trade_name: Option<String>,
}

#[derive(Debug, Clone)]
pub struct LinkedExclusivity {
    pub exclusivity: Exclusivity,
    pub trade_name: Option<String>,
}

pub struct OrangeBookRepository {
    pool: SqlitePool,
}

impl OrangeBookRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Products matching `terms` on any searchable field. Returns the capped
    /// page plus the full match count.
    pub async fn search_products(
        &self,
        terms: &SearchTerms,
        include_generics: bool,
        limit: usize,
    ) -> Result<(Vec<Product>, usize)> {
        let fts = terms.fts_match(None);
        let like = terms.like_pattern();

        let count_sql = format!(
            "SELECT COUNT(*) FROM products p WHERE p.id IN ({}) AND (?3 OR p.appl_type = 'N')",
            MATCH_ALL_FIELDS
        );
        let total: i64 = query_scalar(&count_sql)
            .bind(&fts)
            .bind(&like)
            .bind(include_generics)
            .fetch_one(&self.pool)
            .await?;

        let page_sql = format!(
            "SELECT p.* FROM products p WHERE p.id IN ({}) AND (?3 OR p.appl_type = 'N') {} LIMIT ?4",
            MATCH_ALL_FIELDS, PRODUCT_ORDER
        );
        let rows = query_as::<_, ProductRow>(&page_sql)
            .bind(&fts)
            .bind(&like)
            .bind(include_generics)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;

        Ok((convert_all(rows)?, total as usize))
    }

    /// Every product (brand and generic) whose ingredient or trade name matches
    pub async fn find_by_name(&self, terms: &SearchTerms) -> Result<Vec<Product>> {
        let sql = format!(
            "SELECT p.* FROM products p WHERE p.id IN ({}) {}",
            MATCH_NAME_FIELDS, PRODUCT_ORDER
        );
        let rows = query_as::<_, ProductRow>(&sql)
            .bind(terms.fts_match(Some(NAME_COLUMNS)))
            .bind(terms.like_pattern())
            .fetch_all(&self.pool)
            .await?;

        convert_all(rows)
    }

    /// Patents filed under an application number, both application types, orphans included
    pub async fn patents_for_application(&self, application_number: &str) -> Result<Vec<Patent>> {
        let rows = query_as::<_, PatentRow>(
            r#"
            SELECT * FROM patents
            WHERE appl_no = ?
            ORDER BY appl_type, product_no, patent_expire_date, patent_no
            "#,
        )
        .bind(application_number)
        .fetch_all(&self.pool)
        .await?;

        convert_all(rows)
    }

    pub async fn exclusivities_for_application(&self, application_number: &str) -> Result<Vec<Exclusivity>> {
        let rows = query_as::<_, ExclusivityRow>(
            r#"
            SELECT * FROM exclusivities
            WHERE appl_no = ?
            ORDER BY appl_type, product_no, exclusivity_date, exclusivity_code
            "#,
        )
        .bind(application_number)
        .fetch_all(&self.pool)
        .await?;

        convert_all(rows)
    }

    /// Patents of every product carrying one of `ingredients` (exact, case-insensitive).
    /// Orphaned patents have no product and are therefore never returned.
    pub async fn patents_for_ingredients(&self, ingredients: &[String]) -> Result<Vec<LinkedPatent>> {
        if ingredients.is_empty() {
            return Ok(Vec::new());
        }

        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT pt.*, p.trade_name FROM patents pt \
             JOIN products p ON p.appl_type = pt.appl_type AND p.appl_no = pt.appl_no \
             AND p.product_no = pt.product_no \
             WHERE p.ingredient COLLATE NOCASE IN (",
        );
        push_list(&mut builder, ingredients);
        builder.push(" ORDER BY pt.patent_expire_date, pt.patent_no, pt.appl_no, pt.product_no");

        let rows = builder
            .build_query_as::<LinkedPatentRow>()
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter()
            .map(|row| {
                Ok(LinkedPatent {
                    patent: row.patent.try_into()?,
                    trade_name: row.trade_name,
                })
            })
            .collect()
    }

    pub async fn exclusivities_for_ingredients(&self, ingredients: &[String]) -> Result<Vec<LinkedExclusivity>> {
        if ingredients.is_empty() {
            return Ok(Vec::new());
        }

        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT ex.*, p.trade_name FROM exclusivities ex \
             JOIN products p ON p.appl_type = ex.appl_type AND p.appl_no = ex.appl_no \
             AND p.product_no = ex.product_no \
             WHERE p.ingredient COLLATE NOCASE IN (",
        );
        push_list(&mut builder, ingredients);
        builder.push(" ORDER BY ex.exclusivity_date, ex.exclusivity_code, ex.appl_no, ex.product_no");

        let rows = builder
            .build_query_as::<LinkedExclusivityRow>()
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter()
            .map(|row| {
                Ok(LinkedExclusivity {
                    exclusivity: row.exclusivity.try_into()?,
                    trade_name: row.trade_name,
                })
            })
            .collect()
    }
}

/// `a, b, c)` with every value bound
fn push_list<'args>(builder: &mut QueryBuilder<'args, Sqlite>, values: &'args [String]) {
    let mut separated = builder.separated(", ");
    for value in values {
        separated.push_bind(value.as_str());
    }
    separated.push_unseparated(")");
}

fn corrupt_row(reason: String) -> EngineError {
    EngineError::Internal(anyhow::anyhow!("corrupt generation row: {}", reason))
}

fn convert_all<R, T>(rows: Vec<R>) -> Result<Vec<T>>
where
    T: TryFrom<R, Error = EngineError>,
{
    rows.into_iter().map(T::try_from).collect()
}

use sqlx::{query_as, FromRow, QueryBuilder, Sqlite, SqlitePool};

use crate::error::Result;
use crate::models::purple_book::Biologic;
use crate::utils::dates::date_from_column;
use crate::utils::search_terms::SearchTerms;

const NAME_COLUMNS: &[&str] = &["proper_name", "proprietary_name"];

#[derive(Debug, FromRow)]
struct BiologicRow {
    license_number: String,
    proper_name: String,
    proprietary_name: Option<String>,
    applicant: Option<String>,
    strength: Option<String>,
    dosage_form: Option<String>,
    route: Option<String>,
    licensure_date: Option<String>,
    license_status: Option<String>,
    marketing_status: Option<String>,
    reference_license_number: Option<String>,
    is_biosimilar: bool,
    is_interchangeable: bool,
    interchangeable_date: Option<String>,
    exclusivity_expiration: Option<String>,
    orphan_exclusivity_expiration: Option<String>,
    interchangeable_exclusivity_expiration: Option<String>,
}

impl From<BiologicRow> for Biologic {
    fn from(row: BiologicRow) -> Self {
        Biologic {
            license_number: row.license_number,
            proper_name: row.proper_name,
            proprietary_name: row.proprietary_name,
            applicant: row.applicant,
            strength: row.strength,
            dosage_form: row.dosage_form,
            route: row.route,
            licensure_date: date_from_column(row.licensure_date),
            license_status: row.license_status,
            marketing_status: row.marketing_status,
            reference_license_number: row.reference_license_number,
            is_biosimilar: row.is_biosimilar,
            is_interchangeable: row.is_interchangeable,
            interchangeable_date: date_from_column(row.interchangeable_date),
            exclusivity_expiration: date_from_column(row.exclusivity_expiration),
            orphan_exclusivity_expiration: date_from_column(row.orphan_exclusivity_expiration),
            interchangeable_exclusivity_expiration: date_from_column(
                row.interchangeable_exclusivity_expiration,
            ),
        }
    }
}

pub struct PurpleBookRepository {
    pool: SqlitePool,
}

impl PurpleBookRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Originator (non-biosimilar) products matching by proper or proprietary name
    pub async fn find_reference_products(&self, terms: &SearchTerms) -> Result<Vec<Biologic>> {
        let rows = query_as::<_, BiologicRow>(
            r#"
            SELECT b.* FROM biologics b
            WHERE b.is_biosimilar = 0
              AND (
                b.id IN (SELECT rowid FROM biologics_fts WHERE biologics_fts MATCH ?1)
                OR b.proper_name LIKE ?2 ESCAPE '\'
                OR b.proprietary_name LIKE ?2 ESCAPE '\'
              )
            ORDER BY b.proprietary_name COLLATE NOCASE, b.proper_name COLLATE NOCASE, b.license_number
            "#,
        )
        .bind(terms.fts_match(Some(NAME_COLUMNS)))
        .bind(terms.like_pattern())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Biologic::from).collect())
    }

    /// Every biologic whose reference pointer is one of `license_numbers`
    pub async fn find_referencing(&self, license_numbers: &[String]) -> Result<Vec<Biologic>> {
        if license_numbers.is_empty() {
            return Ok(Vec::new());
        }

        let mut builder: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT * FROM biologics WHERE reference_license_number IN (");
        let mut separated = builder.separated(", ");
        for license in license_numbers {
            separated.push_bind(license.as_str());
        }
        separated.push_unseparated(")");
        builder.push(
            " ORDER BY is_interchangeable DESC, proprietary_name COLLATE NOCASE, \
             proper_name COLLATE NOCASE, license_number",
        );

        let rows = builder
            .build_query_as::<BiologicRow>()
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(Biologic::from).collect())
    }
}

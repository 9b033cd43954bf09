use sqlx::{query, QueryBuilder, Sqlite, SqliteConnection};

use crate::error::Result;
use crate::models::generation::GenerationMetadata;
use crate::models::orange_book::{Exclusivity, Patent, Product};
use crate::models::purple_book::Biologic;
use crate::repositories::schema::{CREATE_INDEXES, CREATE_TABLES, REBUILD_FTS};
use crate::utils::dates::date_to_column;

/// Rows per multi-row INSERT; keeps bound parameters well under SQLite's limit
const INSERT_CHUNK: usize = 500;

/// Bulk writer for a generation that is still being built.
/// All methods run on one connection so the caller controls the transaction.
pub struct GenerationWriter;

impl GenerationWriter {
    pub async fn create_tables(conn: &mut SqliteConnection) -> Result<()> {
        for statement in CREATE_TABLES {
            query(statement).execute(&mut *conn).await?;
        }
        Ok(())
    }

    /// Secondary indices and full-text content, derived from the loaded rows
    pub async fn build_indexes(conn: &mut SqliteConnection) -> Result<()> {
        for statement in CREATE_INDEXES.iter().chain(REBUILD_FTS) {
            query(statement).execute(&mut *conn).await?;
        }
        Ok(())
    }

    pub async fn insert_products(conn: &mut SqliteConnection, products: &[Product]) -> Result<u64> {
        let mut written = 0;

        for chunk in products.chunks(INSERT_CHUNK) {
            let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(
                "INSERT INTO products (ingredient, dosage_form, route, trade_name, applicant, \
                 applicant_full_name, strength, appl_type, appl_no, product_no, te_code, \
                 approval_date, rld, rs, marketing_status) ",
            );
            builder.push_values(chunk, |mut row, p| {
                row.push_bind(p.ingredient.as_str())
                    .push_bind(p.dosage_form.as_deref())
                    .push_bind(p.route.as_deref())
                    .push_bind(p.trade_name.as_deref())
                    .push_bind(p.applicant.as_deref())
                    .push_bind(p.applicant_full_name.as_deref())
                    .push_bind(p.strength.as_deref())
                    .push_bind(p.application_type.code())
                    .push_bind(p.application_number.as_str())
                    .push_bind(p.product_number.as_str())
                    .push_bind(p.te_code.as_deref())
                    .push_bind(date_to_column(&p.approval_date))
                    .push_bind(p.is_reference_listed_drug)
                    .push_bind(p.is_reference_standard)
                    .push_bind(p.marketing_status.label());
            });
            written += builder.build().execute(&mut *conn).await?.rows_affected();
        }

        Ok(written)
    }

    pub async fn insert_patents(conn: &mut SqliteConnection, patents: &[Patent]) -> Result<u64> {
        let mut written = 0;

        for chunk in patents.chunks(INSERT_CHUNK) {
            let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(
                "INSERT INTO patents (appl_type, appl_no, product_no, patent_no, patent_expire_date, \
                 drug_substance, drug_product, use_code, delisted, submission_date) ",
            );
            builder.push_values(chunk, |mut row, p| {
                row.push_bind(p.application_type.code())
                    .push_bind(p.application_number.as_str())
                    .push_bind(p.product_number.as_str())
                    .push_bind(p.patent_number.as_str())
                    .push_bind(date_to_column(&p.expiration_date))
                    .push_bind(p.drug_substance)
                    .push_bind(p.drug_product)
                    .push_bind(p.use_code.as_deref())
                    .push_bind(p.delisted)
                    .push_bind(date_to_column(&p.submission_date));
            });
            written += builder.build().execute(&mut *conn).await?.rows_affected();
        }

        Ok(written)
    }

    pub async fn insert_exclusivities(
        conn: &mut SqliteConnection,
        exclusivities: &[Exclusivity],
    ) -> Result<u64> {
        let mut written = 0;

        for chunk in exclusivities.chunks(INSERT_CHUNK) {
            let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(
                "INSERT INTO exclusivities (appl_type, appl_no, product_no, exclusivity_code, exclusivity_date) ",
            );
            builder.push_values(chunk, |mut row, e| {
                row.push_bind(e.application_type.code())
                    .push_bind(e.application_number.as_str())
                    .push_bind(e.product_number.as_str())
                    .push_bind(e.exclusivity_code.as_str())
                    .push_bind(date_to_column(&e.expiration_date));
            });
            written += builder.build().execute(&mut *conn).await?.rows_affected();
        }

        Ok(written)
    }

    pub async fn insert_biologics(conn: &mut SqliteConnection, biologics: &[Biologic]) -> Result<u64> {
        let mut written = 0;

        for chunk in biologics.chunks(INSERT_CHUNK) {
            let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(
                "INSERT INTO biologics (license_number, proper_name, proprietary_name, applicant, \
                 strength, dosage_form, route, licensure_date, license_status, marketing_status, \
                 reference_license_number, is_biosimilar, is_interchangeable, interchangeable_date, \
                 exclusivity_expiration, orphan_exclusivity_expiration, \
                 interchangeable_exclusivity_expiration) ",
            );
            builder.push_values(chunk, |mut row, b| {
                row.push_bind(b.license_number.as_str())
                    .push_bind(b.proper_name.as_str())
                    .push_bind(b.proprietary_name.as_deref())
                    .push_bind(b.applicant.as_deref())
                    .push_bind(b.strength.as_deref())
                    .push_bind(b.dosage_form.as_deref())
                    .push_bind(b.route.as_deref())
                    .push_bind(date_to_column(&b.licensure_date))
                    .push_bind(b.license_status.as_deref())
                    .push_bind(b.marketing_status.as_deref())
                    .push_bind(b.reference_license_number.as_deref())
                    .push_bind(b.is_biosimilar)
                    .push_bind(b.is_interchangeable)
                    .push_bind(date_to_column(&b.interchangeable_date))
                    .push_bind(date_to_column(&b.exclusivity_expiration))
                    .push_bind(date_to_column(&b.orphan_exclusivity_expiration))
                    .push_bind(date_to_column(&b.interchangeable_exclusivity_expiration));
            });
            written += builder.build().execute(&mut *conn).await?.rows_affected();
        }

        Ok(written)
    }

    pub async fn insert_metadata(conn: &mut SqliteConnection, meta: &GenerationMetadata) -> Result<()> {
        query(
            r#"
            INSERT INTO generation_meta (
                generation_id, version_tag, schema_version, orange_book_source_date,
                purple_book_source_month, orange_book_sha256, purple_book_sha256,
                product_count, patent_count, exclusivity_count, biologic_count,
                rows_skipped, built_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&meta.generation_id)
        .bind(&meta.version_tag)
        .bind(meta.schema_version)
        .bind(meta.orange_book_source_date)
        .bind(&meta.purple_book_source_month)
        .bind(&meta.orange_book_sha256)
        .bind(&meta.purple_book_sha256)
        .bind(meta.product_count)
        .bind(meta.patent_count)
        .bind(meta.exclusivity_count)
        .bind(meta.biologic_count)
        .bind(meta.rows_skipped)
        .bind(meta.built_at)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }
}

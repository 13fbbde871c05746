//! # PostgreSQL Store
//!
//! [`FilingStore`] over a `sqlx` connection pool. Each unit of work is one
//! database transaction that starts with `pg_advisory_xact_lock(filing_id)`,
//! so the per-filing lock is released by PostgreSQL itself on commit or
//! rollback. Child collections of a business are stored as JSONB columns and
//! both tables carry a `version` column checked on every update.

use super::{FilingStore, UnitOfWork};
use crate::config::DatabaseConfig;
use crate::error::{FilerError, FilerResult};
use crate::models::{Business, Filing, FilingStatus};
use async_trait::async_trait;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, Row, Transaction};
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct PgFilingStore {
    pool: PgPool,
}

impl PgFilingStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect a pool sized from configuration
    pub async fn connect(config: &DatabaseConfig) -> FilerResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_seconds))
            .connect(&config.url)
            .await?;

        info!(
            max_connections = config.max_connections,
            "🗄️ DATABASE: Connected filing store pool"
        );
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn health_check(&self) -> FilerResult<bool> {
        let row = sqlx::query("SELECT 1 AS health").fetch_one(&self.pool).await?;
        let health: i32 = row.try_get("health")?;
        Ok(health == 1)
    }
}

#[async_trait]
impl FilingStore for PgFilingStore {
    async fn begin(&self, filing_id: i64) -> FilerResult<Box<dyn UnitOfWork>> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(filing_id)
            .execute(&mut *tx)
            .await?;
        debug!(filing_id = filing_id, "Acquired advisory lock for filing");

        Ok(Box::new(PgUnitOfWork { tx }))
    }
}

struct PgUnitOfWork {
    tx: Transaction<'static, Postgres>,
}

fn decode_error(column: &str, reason: impl std::fmt::Display) -> FilerError {
    FilerError::Serialization(format!("column {column}: {reason}"))
}

fn filing_from_row(row: &PgRow) -> FilerResult<Filing> {
    let status: String = row.try_get("status")?;
    let comments: Option<Json<Vec<crate::models::Comment>>> = row.try_get("comments")?;
    let processing_error: Option<Json<crate::models::ProcessingError>> =
        row.try_get("processing_error")?;

    Ok(Filing {
        id: row.try_get("id")?,
        business_id: row.try_get("business_id")?,
        filing_type: row.try_get("filing_type")?,
        status: status
            .parse::<FilingStatus>()
            .map_err(|e| decode_error("status", e))?,
        filing_json: row.try_get("filing_json")?,
        effective_date: row.try_get("effective_date")?,
        submitter_id: row.try_get("submitter_id")?,
        completion_date: row.try_get("completion_date")?,
        court_order_file_number: row.try_get("court_order_file_number")?,
        court_order_date: row.try_get("court_order_date")?,
        court_order_effect_of_order: row.try_get("court_order_effect_of_order")?,
        order_details: row.try_get("order_details")?,
        meta_data: row.try_get("meta_data")?,
        comments: comments.map(|c| c.0).unwrap_or_default(),
        withdrawn_filing_id: row.try_get("withdrawn_filing_id")?,
        corrected_filing_id: row.try_get("corrected_filing_id")?,
        processing_error: processing_error.map(|e| e.0),
        version: row.try_get("version")?,
    })
}

fn business_from_row(row: &PgRow) -> FilerResult<Business> {
    let legal_type: String = row.try_get("legal_type")?;
    let state: String = row.try_get("state")?;
    let offices: Json<Vec<crate::models::Office>> = row.try_get("offices")?;
    let parties: Json<Vec<crate::models::Party>> = row.try_get("parties")?;
    let party_roles: Json<Vec<crate::models::PartyRole>> = row.try_get("party_roles")?;
    let share_classes: Json<Vec<crate::models::ShareClass>> = row.try_get("share_classes")?;
    let aliases: Json<Vec<crate::models::Alias>> = row.try_get("aliases")?;
    let resolutions: Json<Vec<crate::models::Resolution>> = row.try_get("resolutions")?;

    Ok(Business {
        id: row.try_get("id")?,
        identifier: row.try_get("identifier")?,
        legal_type: legal_type
            .parse()
            .map_err(|e| decode_error("legal_type", e))?,
        legal_name: row.try_get("legal_name")?,
        state: state.parse().map_err(|e| decode_error("state", e))?,
        state_filing_id: row.try_get("state_filing_id")?,
        founding_date: row.try_get("founding_date")?,
        dissolution_date: row.try_get("dissolution_date")?,
        restoration_expiry_date: row.try_get("restoration_expiry_date")?,
        last_ar_date: row.try_get("last_ar_date")?,
        last_ar_year: row.try_get("last_ar_year")?,
        last_agm_date: row.try_get("last_agm_date")?,
        last_modified: row.try_get("last_modified")?,
        admin_freeze: row.try_get("admin_freeze")?,
        restriction_ind: row.try_get("restriction_ind")?,
        jurisdiction: row.try_get("jurisdiction")?,
        naics_description: row.try_get("naics_description")?,
        offices: offices.0,
        parties: parties.0,
        party_roles: party_roles.0,
        share_classes: share_classes.0,
        aliases: aliases.0,
        resolutions: resolutions.0,
        version: row.try_get("version")?,
    })
}

#[async_trait]
impl UnitOfWork for PgUnitOfWork {
    async fn find_filing(&mut self, filing_id: i64) -> FilerResult<Option<Filing>> {
        let row = sqlx::query("SELECT * FROM filings WHERE id = $1")
            .bind(filing_id)
            .fetch_optional(&mut *self.tx)
            .await?;

        row.as_ref().map(filing_from_row).transpose()
    }

    async fn find_business(&mut self, business_id: i64) -> FilerResult<Option<Business>> {
        let row = sqlx::query("SELECT * FROM businesses WHERE id = $1")
            .bind(business_id)
            .fetch_optional(&mut *self.tx)
            .await?;

        row.as_ref().map(business_from_row).transpose()
    }

    async fn save_filing(&mut self, filing: &Filing) -> FilerResult<i64> {
        let result = sqlx::query(
            r#"
            UPDATE filings SET
                business_id = $3,
                status = $4,
                filing_json = $5,
                effective_date = $6,
                completion_date = $7,
                court_order_file_number = $8,
                court_order_date = $9,
                court_order_effect_of_order = $10,
                order_details = $11,
                meta_data = $12,
                comments = $13,
                withdrawn_filing_id = $14,
                corrected_filing_id = $15,
                processing_error = $16,
                version = version + 1
            WHERE id = $1 AND version = $2
            "#,
        )
        .bind(filing.id)
        .bind(filing.version)
        .bind(filing.business_id)
        .bind(filing.status.as_str())
        .bind(&filing.filing_json)
        .bind(filing.effective_date)
        .bind(filing.completion_date)
        .bind(&filing.court_order_file_number)
        .bind(filing.court_order_date)
        .bind(&filing.court_order_effect_of_order)
        .bind(&filing.order_details)
        .bind(&filing.meta_data)
        .bind(Json(&filing.comments))
        .bind(filing.withdrawn_filing_id)
        .bind(filing.corrected_filing_id)
        .bind(filing.processing_error.as_ref().map(Json))
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(FilerError::OptimisticLock {
                entity: "filing".to_string(),
                id: filing.id,
            });
        }
        Ok(filing.version + 1)
    }

    async fn save_business(&mut self, business: &Business) -> FilerResult<i64> {
        if business.id == 0 {
            let id: i64 = sqlx::query_scalar(
                r#"
                INSERT INTO businesses (
                    identifier, legal_type, legal_name, state, state_filing_id,
                    founding_date, dissolution_date, restoration_expiry_date,
                    last_ar_date, last_ar_year, last_agm_date, last_modified,
                    admin_freeze, restriction_ind, jurisdiction, naics_description,
                    offices, parties, party_roles, share_classes, aliases, resolutions,
                    version
                ) VALUES (
                    $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12,
                    $13, $14, $15, $16, $17, $18, $19, $20, $21, $22, 1
                )
                RETURNING id
                "#,
            )
            .bind(&business.identifier)
            .bind(business.legal_type.as_str())
            .bind(&business.legal_name)
            .bind(business.state.as_str())
            .bind(business.state_filing_id)
            .bind(business.founding_date)
            .bind(business.dissolution_date)
            .bind(business.restoration_expiry_date)
            .bind(business.last_ar_date)
            .bind(business.last_ar_year)
            .bind(business.last_agm_date)
            .bind(business.last_modified)
            .bind(business.admin_freeze)
            .bind(business.restriction_ind)
            .bind(&business.jurisdiction)
            .bind(&business.naics_description)
            .bind(Json(&business.offices))
            .bind(Json(&business.parties))
            .bind(Json(&business.party_roles))
            .bind(Json(&business.share_classes))
            .bind(Json(&business.aliases))
            .bind(Json(&business.resolutions))
            .fetch_one(&mut *self.tx)
            .await?;
            return Ok(id);
        }

        let result = sqlx::query(
            r#"
            UPDATE businesses SET
                identifier = $3, legal_type = $4, legal_name = $5, state = $6,
                state_filing_id = $7, founding_date = $8, dissolution_date = $9,
                restoration_expiry_date = $10, last_ar_date = $11, last_ar_year = $12,
                last_agm_date = $13, last_modified = $14, admin_freeze = $15,
                restriction_ind = $16, jurisdiction = $17, naics_description = $18,
                offices = $19, parties = $20, party_roles = $21, share_classes = $22,
                aliases = $23, resolutions = $24,
                version = version + 1
            WHERE id = $1 AND version = $2
            "#,
        )
        .bind(business.id)
        .bind(business.version)
        .bind(&business.identifier)
        .bind(business.legal_type.as_str())
        .bind(&business.legal_name)
        .bind(business.state.as_str())
        .bind(business.state_filing_id)
        .bind(business.founding_date)
        .bind(business.dissolution_date)
        .bind(business.restoration_expiry_date)
        .bind(business.last_ar_date)
        .bind(business.last_ar_year)
        .bind(business.last_agm_date)
        .bind(business.last_modified)
        .bind(business.admin_freeze)
        .bind(business.restriction_ind)
        .bind(&business.jurisdiction)
        .bind(&business.naics_description)
        .bind(Json(&business.offices))
        .bind(Json(&business.parties))
        .bind(Json(&business.party_roles))
        .bind(Json(&business.share_classes))
        .bind(Json(&business.aliases))
        .bind(Json(&business.resolutions))
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(FilerError::OptimisticLock {
                entity: "business".to_string(),
                id: business.id,
            });
        }
        Ok(business.id)
    }

    async fn commit(self: Box<Self>) -> FilerResult<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> FilerResult<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}

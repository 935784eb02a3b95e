//! Load coordination: ordered, conflict-safe writes into the relational store
//!
//! All rows for one source document are written inside a single transaction,
//! in parent-before-child order within each guest-check subtree: the guest
//! check first, then its taxes, then its detail lines, then any menu items
//! those lines reference. Every insert is insert-only: a pre-existing row
//! with the same natural key is left untouched (`ON CONFLICT ... DO
//! NOTHING`), so re-processing a document never duplicates or overwrites
//! rows. The provisioned schema carries the unique constraints the conflict
//! targets name.

use sqlx::{PgPool, Postgres, Transaction};
use thiserror::Error;
use tracing::{debug, info};

use crate::models::{CheckBundle, DetailLineRow, GuestCheckRow, MenuItemRow, TaxRow};

/// Failure while loading one document's rows.
#[derive(Debug, Error)]
pub enum LoadError {
    /// Connectivity to the relational store was lost; the run cannot
    /// continue past this document.
    #[error("relational store unreachable: {0}")]
    Connection(#[source] sqlx::Error),

    /// The document's transaction failed and was rolled back; the run may
    /// continue with the next document.
    #[error("document transaction failed at {statement}: {source}")]
    Document {
        statement: &'static str,
        #[source]
        source: sqlx::Error,
    },
}

impl LoadError {
    fn classify(statement: &'static str, source: sqlx::Error) -> Self {
        match source {
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed => LoadError::Connection(source),
            _ => LoadError::Document { statement, source },
        }
    }

    /// Whether this failure is infrastructure-level (run must abort) rather
    /// than scoped to the one document.
    pub fn is_infrastructure(&self) -> bool {
        matches!(self, LoadError::Connection(_))
    }
}

/// Row accounting for one committed document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadStats {
    /// Rows newly inserted
    pub inserted: u64,
    /// Rows skipped because the same primary key already existed
    pub skipped: u64,
}

impl LoadStats {
    fn observe(&mut self, rows_affected: u64) {
        if rows_affected == 0 {
            self.skipped += 1;
        } else {
            self.inserted += rows_affected;
        }
    }

    pub fn total(&self) -> u64 {
        self.inserted + self.skipped
    }
}

pub struct LoadCoordinator {
    db: PgPool,
}

impl LoadCoordinator {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Write every bundle of one source document in a single transaction.
    ///
    /// Any statement failure rolls back the whole document.
    pub async fn load_document(&self, bundles: &[CheckBundle]) -> Result<LoadStats, LoadError> {
        let mut tx = self
            .db
            .begin()
            .await
            .map_err(|e| LoadError::classify("BEGIN", e))?;

        let mut stats = LoadStats::default();

        for bundle in bundles {
            self.load_bundle(&mut tx, bundle, &mut stats).await?;
        }

        tx.commit()
            .await
            .map_err(|e| LoadError::classify("COMMIT", e))?;

        info!(
            guest_checks = bundles.len(),
            inserted = stats.inserted,
            skipped = stats.skipped,
            "Document committed"
        );

        Ok(stats)
    }

    /// Write one guest-check subtree in parent-before-child order.
    async fn load_bundle(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        bundle: &CheckBundle,
        stats: &mut LoadStats,
    ) -> Result<(), LoadError> {
        debug!(
            guest_check_id = bundle.guest_check.guest_check_id,
            rows = bundle.row_count(),
            "Loading guest check subtree"
        );

        stats.observe(insert_guest_check(tx, &bundle.guest_check).await?);

        for tax in &bundle.taxes {
            stats.observe(insert_tax(tx, tax).await?);
        }

        for line in &bundle.detail_lines {
            stats.observe(insert_detail_line(tx, line).await?);
        }

        for item in &bundle.menu_items {
            stats.observe(insert_menu_item(tx, item).await?);
        }

        Ok(())
    }
}

async fn insert_guest_check(
    tx: &mut Transaction<'_, Postgres>,
    row: &GuestCheckRow,
) -> Result<u64, LoadError> {
    let result = sqlx::query(
        r#"
        INSERT INTO guest_checks (
            guest_check_id, chk_num, opn_bus_dt, clsd_bus_dt, sub_ttl,
            chk_ttl, emp_num, num_srvc_rd, num_chk_prntd
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        ON CONFLICT (guest_check_id) DO NOTHING
        "#,
    )
    .bind(row.guest_check_id)
    .bind(row.chk_num)
    .bind(row.opn_bus_dt)
    .bind(row.clsd_bus_dt)
    .bind(&row.sub_ttl)
    .bind(&row.chk_ttl)
    .bind(row.emp_num)
    .bind(row.num_srvc_rd)
    .bind(row.num_chk_prntd)
    .execute(&mut **tx)
    .await
    .map_err(|e| LoadError::classify("INSERT guest_checks", e))?;

    Ok(result.rows_affected())
}

async fn insert_tax(tx: &mut Transaction<'_, Postgres>, row: &TaxRow) -> Result<u64, LoadError> {
    let result = sqlx::query(
        r#"
        INSERT INTO taxes (
            guest_check_id, tax_num, txbl_sls_ttl, tax_coll_ttl, tax_rate, tax_type
        )
        VALUES ($1, $2, $3, $4, $5, $6)
        ON CONFLICT (guest_check_id, tax_num) DO NOTHING
        "#,
    )
    .bind(row.guest_check_id)
    .bind(row.tax_num)
    .bind(&row.txbl_sls_ttl)
    .bind(&row.tax_coll_ttl)
    .bind(&row.tax_rate)
    .bind(row.tax_type)
    .execute(&mut **tx)
    .await
    .map_err(|e| LoadError::classify("INSERT taxes", e))?;

    Ok(result.rows_affected())
}

async fn insert_detail_line(
    tx: &mut Transaction<'_, Postgres>,
    row: &DetailLineRow,
) -> Result<u64, LoadError> {
    let result = sqlx::query(
        r#"
        INSERT INTO detail_lines (
            guest_check_line_item_id, guest_check_id, line_num, detail_utc,
            dsp_ttl, dsp_qty, menu_item_id
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        ON CONFLICT (guest_check_line_item_id) DO NOTHING
        "#,
    )
    .bind(row.guest_check_line_item_id)
    .bind(row.guest_check_id)
    .bind(row.line_num)
    .bind(row.detail_utc)
    .bind(&row.dsp_ttl)
    .bind(row.dsp_qty)
    .bind(row.menu_item_id)
    .execute(&mut **tx)
    .await
    .map_err(|e| LoadError::classify("INSERT detail_lines", e))?;

    Ok(result.rows_affected())
}

async fn insert_menu_item(
    tx: &mut Transaction<'_, Postgres>,
    row: &MenuItemRow,
) -> Result<u64, LoadError> {
    // Insert-only: a menu item observed earlier (this run or any prior one)
    // keeps its first-written attributes.
    let result = sqlx::query(
        r#"
        INSERT INTO menu_items (
            menu_item_id, mi_num, mod_flag, incl_tax, prc_lvl
        )
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (menu_item_id) DO NOTHING
        "#,
    )
    .bind(row.menu_item_id)
    .bind(row.menu_item_id)
    .bind(row.mod_flag)
    .bind(&row.incl_tax)
    .bind(row.prc_lvl)
    .execute(&mut **tx)
    .await
    .map_err(|e| LoadError::classify("INSERT menu_items", e))?;

    Ok(result.rows_affected())
}

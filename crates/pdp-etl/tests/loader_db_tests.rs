//! Load-coordinator integration tests against a live Postgres
//!
//! Ignored by default. Run with a provisioned database:
//!
//! ```text
//! DATABASE_URL=postgresql://localhost/pdp_test cargo test -p pdp-etl -- --ignored
//! ```

use chrono::NaiveDate;
use pdp_etl::loader::LoadCoordinator;
use pdp_etl::models::{CheckBundle, DetailLineRow, GuestCheckRow, MenuItemRow, TaxRow};
use sqlx::postgres::PgPoolOptions;
use sqlx::types::BigDecimal;
use sqlx::PgPool;
use std::str::FromStr;

async fn connect() -> PgPool {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for --ignored tests");
    PgPoolOptions::new()
        .max_connections(2)
        .connect(&url)
        .await
        .expect("failed to connect to test database")
}

/// Mirror of the externally provisioned schema, including the unique
/// constraints the loader's conflict targets rely on.
async fn provision(pool: &PgPool) {
    let statements = [
        r#"
        CREATE TABLE IF NOT EXISTS guest_checks (
            guest_check_id BIGINT PRIMARY KEY,
            chk_num INT,
            opn_bus_dt DATE,
            clsd_bus_dt DATE,
            sub_ttl DECIMAL(10, 2),
            chk_ttl DECIMAL(10, 2),
            emp_num INT,
            num_srvc_rd INT,
            num_chk_prntd INT
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS taxes (
            tax_id SERIAL PRIMARY KEY,
            guest_check_id BIGINT REFERENCES guest_checks(guest_check_id),
            tax_num INT,
            txbl_sls_ttl DECIMAL(10, 2),
            tax_coll_ttl DECIMAL(10, 2),
            tax_rate DECIMAL(5, 2),
            tax_type INT,
            UNIQUE (guest_check_id, tax_num)
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS detail_lines (
            guest_check_line_item_id BIGINT PRIMARY KEY,
            guest_check_id BIGINT REFERENCES guest_checks(guest_check_id),
            line_num INT,
            detail_utc TIMESTAMP,
            dsp_ttl DECIMAL(10, 2),
            dsp_qty INT,
            menu_item_id BIGINT
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS menu_items (
            menu_item_id BIGINT PRIMARY KEY,
            mi_num BIGINT,
            mod_flag BOOLEAN,
            incl_tax DECIMAL(10, 2),
            prc_lvl INT
        )
        "#,
    ];

    for statement in statements {
        sqlx::query(statement).execute(pool).await.unwrap();
    }
}

/// Remove any rows a previous run of the same test left behind.
async fn cleanup(pool: &PgPool, guest_check_id: i64) {
    for statement in [
        "DELETE FROM detail_lines WHERE guest_check_id = $1",
        "DELETE FROM taxes WHERE guest_check_id = $1",
        "DELETE FROM guest_checks WHERE guest_check_id = $1",
    ] {
        sqlx::query(statement)
            .bind(guest_check_id)
            .execute(pool)
            .await
            .unwrap();
    }

    sqlx::query("DELETE FROM menu_items WHERE menu_item_id = $1")
        .bind(guest_check_id + 500)
        .execute(pool)
        .await
        .unwrap();
}

fn money(literal: &str) -> BigDecimal {
    BigDecimal::from_str(literal).unwrap()
}

fn sample_bundle(guest_check_id: i64) -> CheckBundle {
    let mut bundle = CheckBundle::new(GuestCheckRow {
        guest_check_id,
        chk_num: 100,
        opn_bus_dt: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
        clsd_bus_dt: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
        sub_ttl: Some(money("10.00")),
        chk_ttl: Some(money("11.00")),
        emp_num: None,
        num_srvc_rd: None,
        num_chk_prntd: None,
    });

    bundle.taxes.push(TaxRow {
        guest_check_id,
        tax_num: 1,
        txbl_sls_ttl: money("10.00"),
        tax_coll_ttl: money("1.00"),
        tax_rate: money("0.10"),
        tax_type: None,
    });

    bundle.detail_lines.push(DetailLineRow {
        guest_check_line_item_id: guest_check_id * 100,
        guest_check_id,
        line_num: 1,
        detail_utc: NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap(),
        dsp_ttl: money("10.00"),
        dsp_qty: 1,
        menu_item_id: Some(guest_check_id + 500),
    });

    bundle.menu_items.push(MenuItemRow {
        menu_item_id: guest_check_id + 500,
        mod_flag: false,
        incl_tax: money("0.00"),
        prc_lvl: 0,
    });

    bundle
}

async fn count(pool: &PgPool, sql: &str, id: i64) -> i64 {
    sqlx::query_scalar(sql)
        .bind(id)
        .fetch_one(pool)
        .await
        .unwrap()
}

#[tokio::test]
#[ignore = "requires a provisioned Postgres (set DATABASE_URL)"]
async fn test_reprocessing_never_duplicates_rows() {
    let pool = connect().await;
    provision(&pool).await;

    let id = 810_001;
    cleanup(&pool, id).await;
    let loader = LoadCoordinator::new(pool.clone());
    let bundles = vec![sample_bundle(id)];

    let first = loader.load_document(&bundles).await.unwrap();
    assert_eq!(first.inserted, 4);
    assert_eq!(first.skipped, 0);

    let second = loader.load_document(&bundles).await.unwrap();
    assert_eq!(second.inserted, 0);
    assert_eq!(second.skipped, 4);

    assert_eq!(
        count(&pool, "SELECT COUNT(*) FROM guest_checks WHERE guest_check_id = $1", id).await,
        1
    );
    assert_eq!(
        count(&pool, "SELECT COUNT(*) FROM taxes WHERE guest_check_id = $1", id).await,
        1
    );
    assert_eq!(
        count(&pool, "SELECT COUNT(*) FROM detail_lines WHERE guest_check_id = $1", id).await,
        1
    );
}

#[tokio::test]
#[ignore = "requires a provisioned Postgres (set DATABASE_URL)"]
async fn test_first_write_wins_on_reprocessing() {
    let pool = connect().await;
    provision(&pool).await;

    let id = 810_002;
    cleanup(&pool, id).await;
    let loader = LoadCoordinator::new(pool.clone());

    loader.load_document(&[sample_bundle(id)]).await.unwrap();

    // Re-process the "same" check with drifted attributes: the stored row
    // must keep its first-written values.
    let mut drifted = sample_bundle(id);
    drifted.guest_check.chk_ttl = Some(money("99.99"));
    drifted.menu_items[0].prc_lvl = 7;
    loader.load_document(&[drifted]).await.unwrap();

    let chk_ttl: BigDecimal = sqlx::query_scalar(
        "SELECT chk_ttl FROM guest_checks WHERE guest_check_id = $1",
    )
    .bind(id)
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(chk_ttl, money("11.00"));

    let prc_lvl: i32 = sqlx::query_scalar(
        "SELECT prc_lvl FROM menu_items WHERE menu_item_id = $1",
    )
    .bind(id + 500)
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(prc_lvl, 0);
}

#[tokio::test]
#[ignore = "requires a provisioned Postgres (set DATABASE_URL)"]
async fn test_failed_document_rolls_back_parent_and_children() {
    let pool = connect().await;
    provision(&pool).await;

    let id = 810_003;
    cleanup(&pool, id).await;
    let mut bundle = sample_bundle(id);
    // point the tax at a parent that does not exist so the transaction
    // fails after the guest check was already written
    bundle.taxes[0].guest_check_id = -1;

    let loader = LoadCoordinator::new(pool.clone());
    let err = loader.load_document(&[bundle]).await.unwrap_err();
    assert!(!err.is_infrastructure());

    // no orphaned parent survives the rollback
    assert_eq!(
        count(&pool, "SELECT COUNT(*) FROM guest_checks WHERE guest_check_id = $1", id).await,
        0
    );
    assert_eq!(
        count(&pool, "SELECT COUNT(*) FROM detail_lines WHERE guest_check_id = $1", id).await,
        0
    );
}

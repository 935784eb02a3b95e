//! Typed relational rows normalized from one guest-check document

use chrono::{NaiveDate, NaiveDateTime};
use sqlx::types::BigDecimal;

/// One row for the `guest_checks` table, the root of a check subtree.
#[derive(Debug, Clone, PartialEq)]
pub struct GuestCheckRow {
    /// Natural, immutable identifier (source `guestCheckId`)
    pub guest_check_id: i64,
    pub chk_num: i32,
    pub opn_bus_dt: NaiveDate,
    pub clsd_bus_dt: NaiveDate,
    pub sub_ttl: Option<BigDecimal>,
    pub chk_ttl: Option<BigDecimal>,
    pub emp_num: Option<i32>,
    pub num_srvc_rd: Option<i32>,
    pub num_chk_prntd: Option<i32>,
}

/// One row for the `taxes` table. The store assigns the synthetic `tax_id`;
/// idempotency rides the `(guest_check_id, tax_num)` natural key.
#[derive(Debug, Clone, PartialEq)]
pub struct TaxRow {
    pub guest_check_id: i64,
    pub tax_num: i32,
    pub txbl_sls_ttl: BigDecimal,
    pub tax_coll_ttl: BigDecimal,
    pub tax_rate: BigDecimal,
    pub tax_type: Option<i32>,
}

/// One row for the `detail_lines` table.
#[derive(Debug, Clone, PartialEq)]
pub struct DetailLineRow {
    /// Natural identifier (source `guestCheckLineItemId`)
    pub guest_check_line_item_id: i64,
    pub guest_check_id: i64,
    pub line_num: i32,
    /// Source `detailUTC`, stored as a UTC wall-clock timestamp
    pub detail_utc: NaiveDateTime,
    pub dsp_ttl: BigDecimal,
    pub dsp_qty: i32,
    /// Link to the referenced menu item; forfeited (None) when the nested
    /// menu-item payload is absent or fails validation
    pub menu_item_id: Option<i64>,
}

/// One row for the `menu_items` table, keyed by the source `miNum`.
#[derive(Debug, Clone, PartialEq)]
pub struct MenuItemRow {
    pub menu_item_id: i64,
    pub mod_flag: bool,
    pub incl_tax: BigDecimal,
    pub prc_lvl: i32,
}

/// All rows normalized from one guest check's subtree, in the order the load
/// coordinator must write them: the check itself, then its taxes, then its
/// detail lines, then any menu items those lines reference.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckBundle {
    pub guest_check: GuestCheckRow,
    pub taxes: Vec<TaxRow>,
    pub detail_lines: Vec<DetailLineRow>,
    pub menu_items: Vec<MenuItemRow>,
}

impl CheckBundle {
    /// Create a bundle holding only the parent row.
    pub fn new(guest_check: GuestCheckRow) -> Self {
        Self {
            guest_check,
            taxes: Vec::new(),
            detail_lines: Vec::new(),
            menu_items: Vec::new(),
        }
    }

    /// Total number of rows the bundle will attempt to write.
    pub fn row_count(&self) -> usize {
        1 + self.taxes.len() + self.detail_lines.len() + self.menu_items.len()
    }
}

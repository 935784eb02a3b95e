//! Entity normalization: validated raw records into typed relational rows
//!
//! Normalization runs after shape validation, so required fields are known to
//! be present with the right primitive type. What validation cannot check is
//! whether a value converts to its typed form (a date literal that parses, an
//! integer that fits the column); those conversions fail here with a
//! [`NormalizeError`] and the caller quarantines the record like any other
//! per-record failure.
//!
//! Monetary amounts and rates are parsed from the JSON number's decimal
//! literal, never through an `f64` round-trip, and are padded (not rounded)
//! to two fractional digits.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde_json::Value;
use sqlx::types::BigDecimal;
use std::str::FromStr;
use thiserror::Error;

use crate::models::{CheckBundle, DetailLineRow, GuestCheckRow, MenuItemRow, TaxRow};
use crate::schema::{self, EntityKind};

/// A validated record that could not be converted to its typed row.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NormalizeError {
    #[error("missing required field `{0}`")]
    MissingField(&'static str),

    #[error("field `{field}` is not a valid {expected}: `{value}`")]
    BadValue {
        field: &'static str,
        expected: &'static str,
        value: String,
    },
}

/// Accepted names for a guest check's tax collection, in preference order.
///
/// Upstream emits the collection under either name; they are not a schema
/// version signal, so the first present name simply wins.
pub const TAX_COLLECTION_ALIASES: [&str; 2] = ["taxes", "taxation"];

/// Resolve the tax collection of a guest check by ordered alias preference.
///
/// Returns the matched alias and its value, or `None` when no alias is
/// present, which callers treat as an empty collection rather than an error.
pub fn tax_collection(check: &Value) -> Option<(&'static str, &Value)> {
    TAX_COLLECTION_ALIASES
        .iter()
        .find_map(|alias| check.get(alias).map(|value| (*alias, value)))
}

/// The nested menu-item object of a detail line, if one is present.
pub fn menu_item_object(line: &Value) -> Option<&Value> {
    line.get("menuItem")
}

/// Normalize a guest-check record into its row.
pub fn guest_check_row(raw: &Value) -> Result<GuestCheckRow, NormalizeError> {
    Ok(GuestCheckRow {
        guest_check_id: int(raw, "guestCheckId")?,
        chk_num: int32(raw, "chkNum")?,
        opn_bus_dt: date(raw, "opnBusDt")?,
        clsd_bus_dt: date(raw, "clsdBusDt")?,
        sub_ttl: opt_money(raw, "subTtl")?,
        chk_ttl: opt_money(raw, "chkTtl")?,
        emp_num: opt_int32(raw, "empNum")?,
        num_srvc_rd: opt_int32(raw, "numSrvcRd")?,
        num_chk_prntd: opt_int32(raw, "numChkPrntd")?,
    })
}

/// Normalize a tax record, deriving its foreign key from the parent check.
pub fn tax_row(raw: &Value, guest_check_id: i64) -> Result<TaxRow, NormalizeError> {
    Ok(TaxRow {
        guest_check_id,
        tax_num: int32(raw, "taxNum")?,
        txbl_sls_ttl: money_or_zero(raw, "txblSlsTtl")?,
        tax_coll_ttl: money_or_zero(raw, "taxCollTtl")?,
        tax_rate: money_or_zero(raw, "taxRate")?,
        tax_type: opt_int32(raw, "taxType")?,
    })
}

/// Normalize a detail-line record. The menu-item link is derived by the
/// caller (present and valid nested object, else `None`) and passed in.
pub fn detail_line_row(
    raw: &Value,
    guest_check_id: i64,
    menu_item_id: Option<i64>,
) -> Result<DetailLineRow, NormalizeError> {
    Ok(DetailLineRow {
        guest_check_line_item_id: int(raw, "guestCheckLineItemId")?,
        guest_check_id,
        line_num: int32(raw, "lineNum")?,
        detail_utc: timestamp(raw, "detailUTC")?,
        dsp_ttl: money(raw, "dspTtl")?,
        dsp_qty: int32(raw, "dspQty")?,
        menu_item_id,
    })
}

/// Normalize a nested menu-item record.
pub fn menu_item_row(raw: &Value) -> Result<MenuItemRow, NormalizeError> {
    Ok(MenuItemRow {
        menu_item_id: int(raw, "miNum")?,
        mod_flag: bool_or(raw, "modFlag", false)?,
        incl_tax: money_or_zero(raw, "inclTax")?,
        prc_lvl: opt_int32(raw, "prcLvl")?.unwrap_or(0),
    })
}

// ============================================================================
// Check-subtree composition
// ============================================================================

/// A record rejected while composing a check subtree, with everything the
/// quarantine sink needs to persist it.
#[derive(Debug, Clone, PartialEq)]
pub struct Reject {
    pub kind: EntityKind,
    pub reason: String,
    pub payload: Value,
}

fn rejected(kind: EntityKind, reason: impl Into<String>, payload: &Value) -> Reject {
    Reject {
        kind,
        reason: reason.into(),
        payload: payload.clone(),
    }
}

/// Validate and normalize one guest check and everything nested under it.
///
/// Returns the loadable bundle (absent when the check itself is rejected)
/// together with every record rejected along the way. A rejected nested
/// record never sinks its siblings: a bad tax leaves the other taxes intact,
/// and a bad nested menu item forfeits the detail line's link while the line
/// itself still loads.
pub fn compose_check(check: &Value) -> (Option<CheckBundle>, Vec<Reject>) {
    let mut rejects = Vec::new();

    if let Err(violations) = schema::validate(check, EntityKind::GuestCheck) {
        let reason = schema::describe_violations(&violations);
        rejects.push(rejected(EntityKind::GuestCheck, reason, check));
        return (None, rejects);
    }

    let guest_check = match guest_check_row(check) {
        Ok(row) => row,
        Err(e) => {
            rejects.push(rejected(EntityKind::GuestCheck, e.to_string(), check));
            return (None, rejects);
        },
    };

    let guest_check_id = guest_check.guest_check_id;
    let mut bundle = CheckBundle::new(guest_check);

    // Neither tax alias present means no taxes, not a failure.
    let taxes = tax_collection(check).and_then(|(_, value)| value.as_array());
    for tax in taxes.into_iter().flatten() {
        if let Err(violations) = schema::validate(tax, EntityKind::Tax) {
            let reason = schema::describe_violations(&violations);
            rejects.push(rejected(EntityKind::Tax, reason, tax));
            continue;
        }

        match tax_row(tax, guest_check_id) {
            Ok(row) => bundle.taxes.push(row),
            Err(e) => rejects.push(rejected(EntityKind::Tax, e.to_string(), tax)),
        }
    }

    let lines = check.get("detailLines").and_then(Value::as_array);
    for line in lines.into_iter().flatten() {
        if let Err(violations) = schema::validate(line, EntityKind::DetailLine) {
            let reason = schema::describe_violations(&violations);
            rejects.push(rejected(EntityKind::DetailLine, reason, line));
            continue;
        }

        let menu_item_id = compose_menu_item(line, &mut bundle, &mut rejects);

        match detail_line_row(line, guest_check_id, menu_item_id) {
            Ok(row) => bundle.detail_lines.push(row),
            Err(e) => rejects.push(rejected(EntityKind::DetailLine, e.to_string(), line)),
        }
    }

    (Some(bundle), rejects)
}

/// Resolve the nested menu item of a detail line, if any.
///
/// Returns the menu-item key to link. An invalid nested payload is rejected
/// on its own and the link is forfeited.
fn compose_menu_item(
    line: &Value,
    bundle: &mut CheckBundle,
    rejects: &mut Vec<Reject>,
) -> Option<i64> {
    let raw = menu_item_object(line)?;

    if let Err(violations) = schema::validate(raw, EntityKind::MenuItem) {
        let reason = schema::describe_violations(&violations);
        rejects.push(rejected(EntityKind::MenuItem, reason, raw));
        return None;
    }

    match menu_item_row(raw) {
        Ok(row) => {
            let menu_item_id = row.menu_item_id;
            bundle.menu_items.push(row);
            Some(menu_item_id)
        },
        Err(e) => {
            rejects.push(rejected(EntityKind::MenuItem, e.to_string(), raw));
            None
        },
    }
}

// ============================================================================
// Field extraction
// ============================================================================

fn bad(field: &'static str, expected: &'static str, value: &Value) -> NormalizeError {
    NormalizeError::BadValue {
        field,
        expected,
        value: value.to_string(),
    }
}

fn require<'a>(raw: &'a Value, field: &'static str) -> Result<&'a Value, NormalizeError> {
    raw.get(field).ok_or(NormalizeError::MissingField(field))
}

fn int(raw: &Value, field: &'static str) -> Result<i64, NormalizeError> {
    let value = require(raw, field)?;
    value.as_i64().ok_or_else(|| bad(field, "integer", value))
}

fn int32(raw: &Value, field: &'static str) -> Result<i32, NormalizeError> {
    let value = require(raw, field)?;
    value
        .as_i64()
        .and_then(|n| i32::try_from(n).ok())
        .ok_or_else(|| bad(field, "32-bit integer", value))
}

fn opt_int32(raw: &Value, field: &'static str) -> Result<Option<i32>, NormalizeError> {
    match raw.get(field) {
        None => Ok(None),
        Some(value) => value
            .as_i64()
            .and_then(|n| i32::try_from(n).ok())
            .map(Some)
            .ok_or_else(|| bad(field, "32-bit integer", value)),
    }
}

fn bool_or(raw: &Value, field: &'static str, default: bool) -> Result<bool, NormalizeError> {
    match raw.get(field) {
        None => Ok(default),
        Some(value) => value.as_bool().ok_or_else(|| bad(field, "boolean", value)),
    }
}

fn date(raw: &Value, field: &'static str) -> Result<NaiveDate, NormalizeError> {
    let value = require(raw, field)?;
    let text = value.as_str().ok_or_else(|| bad(field, "date string", value))?;
    NaiveDate::parse_from_str(text, "%Y-%m-%d").map_err(|_| bad(field, "date (YYYY-MM-DD)", value))
}

fn timestamp(raw: &Value, field: &'static str) -> Result<NaiveDateTime, NormalizeError> {
    let value = require(raw, field)?;
    let text = value
        .as_str()
        .ok_or_else(|| bad(field, "timestamp string", value))?;

    DateTime::parse_from_rfc3339(text)
        .map(|dt| dt.naive_utc())
        .or_else(|_| NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S"))
        .map_err(|_| bad(field, "UTC timestamp (RFC 3339)", value))
}

/// Parse a JSON number from its decimal literal.
fn decimal(field: &'static str, value: &Value) -> Result<BigDecimal, NormalizeError> {
    let Value::Number(number) = value else {
        return Err(bad(field, "number", value));
    };
    BigDecimal::from_str(&number.to_string()).map_err(|_| bad(field, "number", value))
}

/// Pad a monetary amount or rate to two fractional digits. Padding only; a
/// source value reported with more precision is kept as-is.
fn to_cents(amount: BigDecimal) -> BigDecimal {
    let (_, scale) = amount.as_bigint_and_exponent();
    if scale < 2 {
        amount.with_scale(2)
    } else {
        amount
    }
}

fn money(raw: &Value, field: &'static str) -> Result<BigDecimal, NormalizeError> {
    decimal(field, require(raw, field)?).map(to_cents)
}

fn opt_money(raw: &Value, field: &'static str) -> Result<Option<BigDecimal>, NormalizeError> {
    match raw.get(field) {
        None => Ok(None),
        Some(value) => decimal(field, value).map(to_cents).map(Some),
    }
}

fn money_or_zero(raw: &Value, field: &'static str) -> Result<BigDecimal, NormalizeError> {
    Ok(opt_money(raw, field)?.unwrap_or_else(|| BigDecimal::from(0).with_scale(2)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_tax_collection_primary_alias() {
        let check = json!({ "taxes": [{ "taxNum": 1 }] });

        let (alias, value) = tax_collection(&check).unwrap();
        assert_eq!(alias, "taxes");
        assert_eq!(value.as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_tax_collection_secondary_alias() {
        let check = json!({ "taxation": [{ "taxNum": 1 }] });

        let (alias, _) = tax_collection(&check).unwrap();
        assert_eq!(alias, "taxation");
    }

    #[test]
    fn test_tax_collection_prefers_first_alias_when_both_present() {
        let check = json!({
            "taxation": [{ "taxNum": 2 }],
            "taxes": [{ "taxNum": 1 }]
        });

        let (alias, value) = tax_collection(&check).unwrap();
        assert_eq!(alias, "taxes");
        assert_eq!(value[0]["taxNum"], 1);
    }

    #[test]
    fn test_tax_collection_neither_alias_is_explicit_none() {
        let check = json!({ "guestCheckId": 1 });
        assert!(tax_collection(&check).is_none());
    }

    #[test]
    fn test_guest_check_row_full() {
        let raw = json!({
            "guestCheckId": 1,
            "chkNum": 100,
            "opnBusDt": "2024-01-01",
            "clsdBusDt": "2024-01-02",
            "subTtl": 10.00,
            "chkTtl": 11.00,
            "empNum": 7,
            "numSrvcRd": 2,
            "numChkPrntd": 1
        });

        let row = guest_check_row(&raw).unwrap();
        assert_eq!(row.guest_check_id, 1);
        assert_eq!(row.chk_num, 100);
        assert_eq!(row.opn_bus_dt, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        assert_eq!(row.clsd_bus_dt, NaiveDate::from_ymd_opt(2024, 1, 2).unwrap());
        assert_eq!(row.sub_ttl, Some(BigDecimal::from_str("10.00").unwrap()));
        assert_eq!(row.chk_ttl, Some(BigDecimal::from_str("11.00").unwrap()));
        assert_eq!(row.emp_num, Some(7));
    }

    #[test]
    fn test_guest_check_row_absent_optionals_stay_null() {
        let raw = json!({
            "guestCheckId": 1,
            "chkNum": 100,
            "opnBusDt": "2024-01-01",
            "clsdBusDt": "2024-01-01"
        });

        let row = guest_check_row(&raw).unwrap();
        assert_eq!(row.sub_ttl, None);
        assert_eq!(row.emp_num, None);
        assert_eq!(row.num_chk_prntd, None);
    }

    #[test]
    fn test_guest_check_row_bad_date_is_an_error() {
        let raw = json!({
            "guestCheckId": 1,
            "chkNum": 100,
            "opnBusDt": "01/01/2024",
            "clsdBusDt": "2024-01-01"
        });

        let err = guest_check_row(&raw).unwrap_err();
        assert!(matches!(
            err,
            NormalizeError::BadValue { field: "opnBusDt", .. }
        ));
    }

    #[test]
    fn test_amounts_are_padded_to_two_decimals_not_rounded() {
        let raw = json!({ "taxNum": 1, "txblSlsTtl": 120, "taxCollTtl": 0.1, "taxRate": 0.125 });

        let row = tax_row(&raw, 1).unwrap();
        assert_eq!(row.txbl_sls_ttl, BigDecimal::from_str("120.00").unwrap());
        assert_eq!(row.tax_coll_ttl, BigDecimal::from_str("0.10").unwrap());
        // more precision than reported is never dropped
        assert_eq!(row.tax_rate, BigDecimal::from_str("0.125").unwrap());
    }

    #[test]
    fn test_tax_row_defaults_absent_amounts_to_zero() {
        let raw = json!({ "taxNum": 3 });

        let row = tax_row(&raw, 42).unwrap();
        assert_eq!(row.guest_check_id, 42);
        assert_eq!(row.tax_num, 3);
        assert_eq!(row.txbl_sls_ttl, BigDecimal::from_str("0.00").unwrap());
        assert_eq!(row.tax_coll_ttl, BigDecimal::from_str("0.00").unwrap());
        assert_eq!(row.tax_rate, BigDecimal::from_str("0.00").unwrap());
        assert_eq!(row.tax_type, None);
    }

    #[test]
    fn test_detail_line_row_derives_parent_and_menu_item_keys() {
        let raw = json!({
            "guestCheckLineItemId": 10,
            "lineNum": 1,
            "detailUTC": "2024-01-01T12:00:00Z",
            "dspTtl": 10.00,
            "dspQty": 1
        });

        let row = detail_line_row(&raw, 1, Some(500)).unwrap();
        assert_eq!(row.guest_check_line_item_id, 10);
        assert_eq!(row.guest_check_id, 1);
        assert_eq!(
            row.detail_utc,
            NaiveDate::from_ymd_opt(2024, 1, 1)
                .unwrap()
                .and_hms_opt(12, 0, 0)
                .unwrap()
        );
        assert_eq!(row.menu_item_id, Some(500));

        let unlinked = detail_line_row(&raw, 1, None).unwrap();
        assert_eq!(unlinked.menu_item_id, None);
    }

    #[test]
    fn test_detail_line_row_accepts_zoneless_timestamp() {
        let raw = json!({
            "guestCheckLineItemId": 10,
            "lineNum": 1,
            "detailUTC": "2024-01-01T12:00:00",
            "dspTtl": 10.00,
            "dspQty": 1
        });

        assert!(detail_line_row(&raw, 1, None).is_ok());
    }

    #[test]
    fn test_detail_line_row_bad_timestamp_is_an_error() {
        let raw = json!({
            "guestCheckLineItemId": 10,
            "lineNum": 1,
            "detailUTC": "noonish",
            "dspTtl": 10.00,
            "dspQty": 1
        });

        let err = detail_line_row(&raw, 1, None).unwrap_err();
        assert!(matches!(
            err,
            NormalizeError::BadValue { field: "detailUTC", .. }
        ));
    }

    #[test]
    fn test_menu_item_row_defaults() {
        let raw = json!({ "miNum": 500 });

        let row = menu_item_row(&raw).unwrap();
        assert_eq!(row.menu_item_id, 500);
        assert!(!row.mod_flag);
        assert_eq!(row.incl_tax, BigDecimal::from_str("0.00").unwrap());
        assert_eq!(row.prc_lvl, 0);
    }

    #[test]
    fn test_menu_item_row_explicit_fields() {
        let raw = json!({ "miNum": 500, "modFlag": true, "inclTax": 1.5, "prcLvl": 2 });

        let row = menu_item_row(&raw).unwrap();
        assert!(row.mod_flag);
        assert_eq!(row.incl_tax, BigDecimal::from_str("1.50").unwrap());
        assert_eq!(row.prc_lvl, 2);
    }

    #[test]
    fn test_int32_out_of_range_is_an_error() {
        let raw = json!({ "taxNum": 9_000_000_000_i64 });

        let err = tax_row(&raw, 1).unwrap_err();
        assert!(matches!(
            err,
            NormalizeError::BadValue { field: "taxNum", .. }
        ));
    }

    #[test]
    fn test_compose_check_rejects_invalid_check_wholesale() {
        let check = json!({
            "guestCheckId": 1,
            "opnBusDt": "2024-01-01",
            "clsdBusDt": "2024-01-01"
        });

        let (bundle, rejects) = compose_check(&check);
        assert!(bundle.is_none());
        assert_eq!(rejects.len(), 1);
        assert_eq!(rejects[0].kind, EntityKind::GuestCheck);
        assert!(rejects[0].reason.contains("chkNum"));
        assert_eq!(rejects[0].payload, check);
    }

    #[test]
    fn test_compose_check_bad_tax_leaves_siblings_intact() {
        let check = json!({
            "guestCheckId": 1,
            "chkNum": 100,
            "opnBusDt": "2024-01-01",
            "clsdBusDt": "2024-01-01",
            "taxes": [
                { "taxRate": 0.10 },
                { "taxNum": 2, "taxRate": 0.05 }
            ]
        });

        let (bundle, rejects) = compose_check(&check);
        let bundle = bundle.unwrap();

        assert_eq!(bundle.taxes.len(), 1);
        assert_eq!(bundle.taxes[0].tax_num, 2);
        assert_eq!(rejects.len(), 1);
        assert_eq!(rejects[0].kind, EntityKind::Tax);
    }

    #[test]
    fn test_compose_check_bad_menu_item_forfeits_link_only() {
        let check = json!({
            "guestCheckId": 1,
            "chkNum": 100,
            "opnBusDt": "2024-01-01",
            "clsdBusDt": "2024-01-01",
            "detailLines": [{
                "guestCheckLineItemId": 10,
                "lineNum": 1,
                "detailUTC": "2024-01-01T12:00:00Z",
                "dspTtl": 10.00,
                "dspQty": 1,
                "menuItem": { "modFlag": true }
            }]
        });

        let (bundle, rejects) = compose_check(&check);
        let bundle = bundle.unwrap();

        // the detail line still loads, with no menu-item linkage
        assert_eq!(bundle.detail_lines.len(), 1);
        assert_eq!(bundle.detail_lines[0].menu_item_id, None);
        assert!(bundle.menu_items.is_empty());

        // the menu-item payload is rejected on its own
        assert_eq!(rejects.len(), 1);
        assert_eq!(rejects[0].kind, EntityKind::MenuItem);
        assert!(rejects[0].reason.contains("miNum"));
    }

    #[test]
    fn test_compose_check_without_tax_collection_yields_zero_taxes() {
        let check = json!({
            "guestCheckId": 1,
            "chkNum": 100,
            "opnBusDt": "2024-01-01",
            "clsdBusDt": "2024-01-01"
        });

        let (bundle, rejects) = compose_check(&check);
        assert!(bundle.unwrap().taxes.is_empty());
        assert!(rejects.is_empty());
    }
}

//! Shape validation for raw POS records
//!
//! Each entity kind carries a declarative field table: required fields must be
//! present with the right primitive type, optional fields are type-checked
//! only when present. Validation is pure and never panics; a non-object input
//! is reported as a violation like any other.

use serde_json::Value;
use std::fmt;

/// The four entity kinds normalized out of one guest-check document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    GuestCheck,
    Tax,
    DetailLine,
    MenuItem,
}

impl EntityKind {
    pub const ALL: [EntityKind; 4] = [
        EntityKind::GuestCheck,
        EntityKind::Tax,
        EntityKind::DetailLine,
        EntityKind::MenuItem,
    ];

    /// Snake-case plural tag, used for quarantine partitioning and summaries.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::GuestCheck => "guest_checks",
            EntityKind::Tax => "taxes",
            EntityKind::DetailLine => "detail_lines",
            EntityKind::MenuItem => "menu_items",
        }
    }

    fn fields(&self) -> &'static [FieldSpec] {
        match self {
            EntityKind::GuestCheck => GUEST_CHECK_FIELDS,
            EntityKind::Tax => TAX_FIELDS,
            EntityKind::DetailLine => DETAIL_LINE_FIELDS,
            EntityKind::MenuItem => MENU_ITEM_FIELDS,
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Primitive type expected for a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Integer,
    Number,
    String,
    Boolean,
    Array,
    Object,
}

impl FieldType {
    fn matches(&self, value: &Value) -> bool {
        match self {
            FieldType::Integer => value.is_i64() || value.is_u64(),
            FieldType::Number => value.is_number(),
            FieldType::String => value.is_string(),
            FieldType::Boolean => value.is_boolean(),
            FieldType::Array => value.is_array(),
            FieldType::Object => value.is_object(),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::Integer => "integer",
            FieldType::Number => "number",
            FieldType::String => "string",
            FieldType::Boolean => "boolean",
            FieldType::Array => "array",
            FieldType::Object => "object",
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

struct FieldSpec {
    name: &'static str,
    ty: FieldType,
    required: bool,
}

const fn required(name: &'static str, ty: FieldType) -> FieldSpec {
    FieldSpec {
        name,
        ty,
        required: true,
    }
}

const fn optional(name: &'static str, ty: FieldType) -> FieldSpec {
    FieldSpec {
        name,
        ty,
        required: false,
    }
}

const GUEST_CHECK_FIELDS: &[FieldSpec] = &[
    required("guestCheckId", FieldType::Integer),
    required("chkNum", FieldType::Integer),
    required("opnBusDt", FieldType::String),
    required("clsdBusDt", FieldType::String),
    optional("subTtl", FieldType::Number),
    optional("chkTtl", FieldType::Number),
    optional("empNum", FieldType::Integer),
    optional("numSrvcRd", FieldType::Integer),
    optional("numChkPrntd", FieldType::Integer),
    optional("taxes", FieldType::Array),
    optional("taxation", FieldType::Array),
    optional("detailLines", FieldType::Array),
];

const TAX_FIELDS: &[FieldSpec] = &[
    required("taxNum", FieldType::Integer),
    optional("txblSlsTtl", FieldType::Number),
    optional("taxCollTtl", FieldType::Number),
    optional("taxRate", FieldType::Number),
    optional("taxType", FieldType::Integer),
];

const DETAIL_LINE_FIELDS: &[FieldSpec] = &[
    required("guestCheckLineItemId", FieldType::Integer),
    required("lineNum", FieldType::Integer),
    required("detailUTC", FieldType::String),
    required("dspTtl", FieldType::Number),
    required("dspQty", FieldType::Integer),
    optional("menuItem", FieldType::Object),
];

const MENU_ITEM_FIELDS: &[FieldSpec] = &[
    required("miNum", FieldType::Integer),
    optional("modFlag", FieldType::Boolean),
    optional("inclTax", FieldType::Number),
    optional("prcLvl", FieldType::Integer),
];

/// A single violated constraint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    /// The record itself is not a JSON object.
    NotAnObject { found: &'static str },
    /// A required field is absent.
    MissingField { field: &'static str },
    /// A field is present with the wrong primitive type.
    WrongType {
        field: &'static str,
        expected: FieldType,
        found: &'static str,
    },
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Violation::NotAnObject { found } => {
                write!(f, "expected a JSON object, found {}", found)
            },
            Violation::MissingField { field } => {
                write!(f, "missing required field `{}`", field)
            },
            Violation::WrongType {
                field,
                expected,
                found,
            } => {
                write!(f, "field `{}`: expected {}, found {}", field, expected, found)
            },
        }
    }
}

/// JSON type name for diagnostics.
pub fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Validate a raw record against the declared shape of one entity kind.
///
/// Returns `Ok(())` on pass, or every violated constraint on failure.
pub fn validate(record: &Value, kind: EntityKind) -> Result<(), Vec<Violation>> {
    let Some(object) = record.as_object() else {
        return Err(vec![Violation::NotAnObject {
            found: json_type_name(record),
        }]);
    };

    let mut violations = Vec::new();

    for spec in kind.fields() {
        match object.get(spec.name) {
            None => {
                if spec.required {
                    violations.push(Violation::MissingField { field: spec.name });
                }
            },
            Some(value) => {
                if !spec.ty.matches(value) {
                    violations.push(Violation::WrongType {
                        field: spec.name,
                        expected: spec.ty,
                        found: json_type_name(value),
                    });
                }
            },
        }
    }

    if violations.is_empty() {
        Ok(())
    } else {
        Err(violations)
    }
}

/// Join violations into one human-readable failure reason.
pub fn describe_violations(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

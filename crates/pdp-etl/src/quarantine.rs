//! Quarantine sink for rejected records
//!
//! Every record that fails validation or normalization is written to object
//! storage as one timestamped JSON document under a per-entity-kind prefix,
//! so rejects can be audited later without ever blocking the pipeline. The
//! sink is best-effort by contract: a failed quarantine write is logged and
//! swallowed, never surfaced to the caller.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::{error, warn};
use uuid::Uuid;

use crate::object_store::ObjectStore;
use crate::schema::EntityKind;

/// One durable quarantine record.
#[derive(Debug, Serialize)]
struct QuarantineRecord<'a> {
    timestamp: String,
    error_message: &'a str,
    data: &'a Value,
}

pub struct QuarantineSink {
    store: ObjectStore,
    prefix: String,
}

impl QuarantineSink {
    pub fn new(store: ObjectStore, prefix: impl Into<String>) -> Self {
        Self {
            store,
            prefix: prefix.into(),
        }
    }

    /// Durably record one rejected payload. Never raises.
    pub async fn record(&self, kind: EntityKind, reason: &str, payload: &Value) {
        let now = Utc::now();
        let key = object_key(&self.prefix, kind, now, Uuid::new_v4());

        let record = QuarantineRecord {
            timestamp: now.format("%Y-%m-%d %H:%M:%S").to_string(),
            error_message: reason,
            data: payload,
        };

        let body = match serde_json::to_vec(&record) {
            Ok(body) => body,
            Err(e) => {
                error!(
                    kind = %kind,
                    error = %e,
                    "Failed to serialize quarantine record"
                );
                return;
            },
        };

        match self
            .store
            .upload(&key, body, Some("application/json".to_string()))
            .await
        {
            Ok(()) => {
                warn!(
                    kind = %kind,
                    key = %key,
                    reason = %reason,
                    "Record quarantined"
                );
            },
            Err(e) => {
                // Best-effort path: log to the fallback channel and move on.
                error!(
                    kind = %kind,
                    key = %key,
                    reason = %reason,
                    error = %format!("{e:#}"),
                    "Failed to write quarantine record"
                );
            },
        }
    }
}

/// Object key for one quarantine record: per-kind prefix, unique per record.
fn object_key(prefix: &str, kind: EntityKind, at: DateTime<Utc>, id: Uuid) -> String {
    format!(
        "{}/invalid_{}/{}_{}.json",
        prefix.trim_end_matches('/'),
        kind.as_str(),
        at.format("%Y%m%dT%H%M%S%3fZ"),
        id.simple()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_object_key_partitions_by_kind() {
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let id = Uuid::nil();

        let key = object_key("logs", EntityKind::GuestCheck, at, id);
        assert_eq!(
            key,
            "logs/invalid_guest_checks/20240101T120000000Z_00000000000000000000000000000000.json"
        );

        let key = object_key("logs", EntityKind::MenuItem, at, id);
        assert!(key.starts_with("logs/invalid_menu_items/"));
    }

    #[test]
    fn test_object_key_tolerates_trailing_slash_in_prefix() {
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let key = object_key("logs/", EntityKind::Tax, at, Uuid::nil());
        assert!(key.starts_with("logs/invalid_taxes/"));
    }

    #[test]
    fn test_distinct_records_never_share_a_key() {
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let a = object_key("logs", EntityKind::Tax, at, Uuid::new_v4());
        let b = object_key("logs", EntityKind::Tax, at, Uuid::new_v4());
        assert_ne!(a, b);
    }

    #[test]
    fn test_record_shape() {
        let payload = serde_json::json!({ "taxNum": "bad" });
        let record = QuarantineRecord {
            timestamp: "2024-01-01 12:00:00".to_string(),
            error_message: "field `taxNum`: expected integer, found string",
            data: &payload,
        };

        let encoded = serde_json::to_value(&record).unwrap();
        assert_eq!(encoded["timestamp"], "2024-01-01 12:00:00");
        assert_eq!(
            encoded["error_message"],
            "field `taxNum`: expected integer, found string"
        );
        assert_eq!(encoded["data"]["taxNum"], "bad");
    }
}

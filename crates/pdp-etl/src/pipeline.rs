//! Pipeline orchestration
//!
//! Drives the full extract-validate-transform-load cycle over one or more
//! raw documents: download from object storage, walk the guest-check tree
//! (checks, then their taxes and detail lines, then nested menu items),
//! validate and normalize each record, quarantine rejects, and hand each
//! document's surviving rows to the load coordinator as one transaction.
//!
//! A malformed record never stops its siblings and a failed document never
//! stops the run; only an infrastructure fault (object store or relational
//! store unreachable) aborts, surfacing the partial summary.

use anyhow::anyhow;
use serde_json::Value;
use sqlx::PgPool;
use std::fmt;
use tracing::{error, info};

use crate::config::EtlConfig;
use crate::loader::LoadCoordinator;
use crate::models::CheckBundle;
use crate::normalize;
use crate::object_store::ObjectStore;
use crate::quarantine::QuarantineSink;
use crate::schema::EntityKind;

/// Terminal state of one pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunStatus {
    /// Every document was processed, regardless of individual quarantines
    /// or failed documents.
    Completed,
    /// An infrastructure fault stopped the run early.
    Aborted { reason: String },
}

/// Accepted/quarantined accounting for one entity kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KindCounts {
    pub accepted: usize,
    pub quarantined: usize,
}

/// What one run did, per entity kind and per document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub guest_checks: KindCounts,
    pub taxes: KindCounts,
    pub detail_lines: KindCounts,
    pub menu_items: KindCounts,
    /// Documents whose transaction committed
    pub documents_loaded: usize,
    /// Documents whose transaction rolled back
    pub documents_failed: usize,
    pub rows_inserted: u64,
    pub rows_skipped: u64,
    pub status: RunStatus,
}

impl Default for RunSummary {
    fn default() -> Self {
        Self {
            guest_checks: KindCounts::default(),
            taxes: KindCounts::default(),
            detail_lines: KindCounts::default(),
            menu_items: KindCounts::default(),
            documents_loaded: 0,
            documents_failed: 0,
            rows_inserted: 0,
            rows_skipped: 0,
            status: RunStatus::Completed,
        }
    }
}

impl RunSummary {
    pub fn counts(&self, kind: EntityKind) -> &KindCounts {
        match kind {
            EntityKind::GuestCheck => &self.guest_checks,
            EntityKind::Tax => &self.taxes,
            EntityKind::DetailLine => &self.detail_lines,
            EntityKind::MenuItem => &self.menu_items,
        }
    }

    fn counts_mut(&mut self, kind: EntityKind) -> &mut KindCounts {
        match kind {
            EntityKind::GuestCheck => &mut self.guest_checks,
            EntityKind::Tax => &mut self.taxes,
            EntityKind::DetailLine => &mut self.detail_lines,
            EntityKind::MenuItem => &mut self.menu_items,
        }
    }

    pub fn record_accepted(&mut self, kind: EntityKind) {
        self.counts_mut(kind).accepted += 1;
    }

    pub fn record_quarantined(&mut self, kind: EntityKind) {
        self.counts_mut(kind).quarantined += 1;
    }

    /// Count every row of an accepted check subtree.
    pub fn record_bundle(&mut self, bundle: &CheckBundle) {
        self.guest_checks.accepted += 1;
        self.taxes.accepted += bundle.taxes.len();
        self.detail_lines.accepted += bundle.detail_lines.len();
        self.menu_items.accepted += bundle.menu_items.len();
    }

    pub fn total_quarantined(&self) -> usize {
        EntityKind::ALL
            .iter()
            .map(|kind| self.counts(*kind).quarantined)
            .sum()
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self.status, RunStatus::Aborted { .. })
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.status {
            RunStatus::Completed => write!(f, "run completed")?,
            RunStatus::Aborted { reason } => write!(f, "run aborted ({})", reason)?,
        }

        write!(
            f,
            ": {} documents loaded, {} failed",
            self.documents_loaded, self.documents_failed
        )?;

        for kind in EntityKind::ALL {
            let counts = self.counts(kind);
            write!(
                f,
                "; {} {} accepted / {} quarantined",
                kind, counts.accepted, counts.quarantined
            )?;
        }

        write!(
            f,
            "; {} rows inserted, {} skipped",
            self.rows_inserted, self.rows_skipped
        )
    }
}

/// A document that could not be loaded.
enum DocumentFailure {
    /// Scoped to this document; the run continues.
    Document(anyhow::Error),
    /// The backing store is unreachable; the run aborts.
    Infrastructure(anyhow::Error),
}

/// The EVTL pipeline over raw guest-check documents.
pub struct EtlPipeline {
    config: EtlConfig,
    store: ObjectStore,
    quarantine: QuarantineSink,
    loader: LoadCoordinator,
}

impl EtlPipeline {
    /// Wire the pipeline from its explicit configuration and collaborators.
    pub fn new(config: EtlConfig, db: PgPool, store: ObjectStore) -> Self {
        let quarantine = QuarantineSink::new(store.clone(), config.quarantine_prefix.clone());
        let loader = LoadCoordinator::new(db);

        Self {
            config,
            store,
            quarantine,
            loader,
        }
    }

    /// Process the documents named by the configuration.
    pub async fn run(&self) -> RunSummary {
        self.run_keys(&self.config.raw_keys).await
    }

    /// Process the given raw-document object keys, strictly in order.
    pub async fn run_keys(&self, keys: &[String]) -> RunSummary {
        let mut summary = RunSummary::default();

        for key in keys {
            info!(document_key = %key, "Fetching raw document");

            let bytes = match self.store.download(key).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    let reason = format!("object store unreachable for `{}`: {:#}", key, e);
                    error!(document_key = %key, "Aborting run: {}", reason);
                    summary.status = RunStatus::Aborted { reason };
                    return summary;
                },
            };

            match self.process_document(key, &bytes, &mut summary).await {
                Ok(()) => {
                    summary.documents_loaded += 1;
                },
                Err(DocumentFailure::Document(e)) => {
                    summary.documents_failed += 1;
                    error!(
                        document_key = %key,
                        error = %format!("{:#}", e),
                        "Document failed; continuing with next document"
                    );
                },
                Err(DocumentFailure::Infrastructure(e)) => {
                    let reason = format!("{:#}", e);
                    error!(document_key = %key, "Aborting run: {}", reason);
                    summary.status = RunStatus::Aborted { reason };
                    return summary;
                },
            }
        }

        info!(
            documents = summary.documents_loaded,
            failed = summary.documents_failed,
            quarantined = summary.total_quarantined(),
            "Run completed"
        );

        summary
    }

    /// Validate, normalize, and load one raw document.
    async fn process_document(
        &self,
        key: &str,
        bytes: &[u8],
        summary: &mut RunSummary,
    ) -> Result<(), DocumentFailure> {
        let document: Value = serde_json::from_slice(bytes).map_err(|e| {
            DocumentFailure::Document(anyhow!("document `{}` is not valid JSON: {}", key, e))
        })?;

        let checks = document
            .get("guestChecks")
            .and_then(Value::as_array)
            .ok_or_else(|| {
                DocumentFailure::Document(anyhow!(
                    "document `{}` carries no `guestChecks` array",
                    key
                ))
            })?;

        info!(document_key = %key, guest_checks = checks.len(), "Validating guest checks");

        let mut bundles = Vec::new();
        for check in checks {
            let (bundle, rejects) = normalize::compose_check(check);

            for r in &rejects {
                self.quarantine.record(r.kind, &r.reason, &r.payload).await;
                summary.record_quarantined(r.kind);
            }

            if let Some(bundle) = bundle {
                summary.record_bundle(&bundle);
                bundles.push(bundle);
            }
        }

        if bundles.is_empty() {
            info!(document_key = %key, "No loadable guest checks in document");
            return Ok(());
        }

        info!(document_key = %key, guest_checks = bundles.len(), "Loading document");

        match self.loader.load_document(&bundles).await {
            Ok(stats) => {
                summary.rows_inserted += stats.inserted;
                summary.rows_skipped += stats.skipped;
                Ok(())
            },
            Err(e) if e.is_infrastructure() => Err(DocumentFailure::Infrastructure(e.into())),
            Err(e) => Err(DocumentFailure::Document(e.into())),
        }
    }
}

//! PDP ETL Library
//!
//! Extract-validate-transform-load pipeline for restaurant point-of-sale
//! guest-check documents: raw JSON is pulled from object storage, validated
//! against per-entity shape tables, normalized into typed relational rows,
//! and loaded idempotently into Postgres, one transaction per document.
//! Malformed records are quarantined back to object storage without halting
//! the run.
//!
//! # Example
//!
//! ```no_run
//! use pdp_etl::{config::EtlConfig, db, object_store::ObjectStore, EtlPipeline};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = EtlConfig::load()?;
//!     let pool = db::create_pool(&config.database).await?;
//!     let store = ObjectStore::new(config.object_store.clone()).await?;
//!
//!     let pipeline = EtlPipeline::new(config, pool, store);
//!     let summary = pipeline.run().await;
//!     println!("{}", summary);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod db;
pub mod loader;
pub mod models;
pub mod normalize;
pub mod object_store;
pub mod pipeline;
pub mod quarantine;
pub mod schema;

pub use config::EtlConfig;
pub use loader::{LoadCoordinator, LoadError, LoadStats};
pub use models::CheckBundle;
pub use pipeline::{EtlPipeline, RunStatus, RunSummary};
pub use quarantine::QuarantineSink;
pub use schema::EntityKind;

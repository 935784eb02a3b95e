//! PDP Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared error handling and logging for the PDP workspace.
//!
//! # Overview
//!
//! This crate provides common functionality used across all PDP workspace
//! members:
//!
//! - **Error Handling**: Custom error types and result types
//! - **Logging**: Centralized tracing initialization
//!
//! # Example
//!
//! ```no_run
//! use pdp_common::logging::{init_logging, LogConfig};
//! use tracing::info;
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = LogConfig::from_env()?;
//!     init_logging(&config)?;
//!     info!("Application started");
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod logging;

// Re-export commonly used types
pub use error::{PdpError, Result};

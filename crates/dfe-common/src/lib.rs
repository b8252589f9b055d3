//! DFE Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared types, validation helpers, and error handling for the fiscal
//! document ingestion workspace.
//!
//! # Overview
//!
//! - **Error Handling**: [`DfeError`] and the [`Result`] alias
//! - **Access Keys**: 44-digit document identifiers with their mod-11 check digit
//! - **Types**: tax identifiers (CNPJ/CPF), vehicle plates and state codes
//! - **Logging**: `tracing` subscriber setup shared by every binary
//!
//! # Example
//!
//! ```no_run
//! use dfe_common::{access_key::AccessKey, Result};
//!
//! fn check(raw: &str) -> Result<()> {
//!     let key = AccessKey::parse(raw)?;
//!     println!("check digit {}", key.check_digit());
//!     Ok(())
//! }
//! ```

pub mod access_key;
pub mod error;
pub mod logging;
pub mod types;

// Re-export commonly used types
pub use access_key::AccessKey;
pub use error::{DfeError, Result};
pub use types::{Plate, StateCode, TaxId};

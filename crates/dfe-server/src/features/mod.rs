//! Feature modules implementing the HTTP API
//!
//! Each feature is a vertical slice:
//! - `commands/` - write operations
//! - `queries/` - read operations
//! - `routes.rs` - HTTP route definitions
//!
//! # Features
//!
//! - **uploads**: submit transport document files and poll their status

pub mod uploads;

use axum::Router;
use std::sync::Arc;

use crate::ingest::UploadIntake;
use crate::store::DocumentStore;

/// Creates the API router with every feature mounted under its prefix.
pub fn router<S: DocumentStore>(intake: Arc<UploadIntake<S>>) -> Router<()> {
    Router::new().nest("/uploads", uploads::uploads_routes().with_state(intake))
}

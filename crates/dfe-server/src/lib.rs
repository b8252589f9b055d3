//! DFE Server Library
//!
//! Ingestion service for Brazilian fiscal transport documents: CT-e
//! waybills, MDF-e manifests and their cancellation and closure events.
//!
//! # Overview
//!
//! - **Intake**: multipart uploads are registered as PENDING and queued
//! - **Workers**: a bounded pool decodes each file and commits it in one
//!   store transaction, marking the upload PROCESSED or FAILED
//! - **Store**: PostgreSQL through SQLx, behind the [`store::DocumentStore`]
//!   seam so the pipeline runs against an in-memory backend in tests
//!
//! # Routes
//!
//! - `POST /api/v1/uploads` single file
//! - `POST /api/v1/uploads/batch` up to the configured batch size
//! - `GET /api/v1/uploads/:id` upload status

pub mod api;
pub mod config;
pub mod error;
pub mod features;
pub mod ingest;
pub mod middleware;
pub mod models;
pub mod store;

pub use config::Config;
pub use error::AppError;

use axum::Router;
use std::sync::Arc;

use ingest::UploadIntake;
use store::DocumentStore;

/// Versioned API router without outer middleware.
pub fn api_router<S: DocumentStore>(intake: Arc<UploadIntake<S>>) -> Router {
    Router::new().nest("/api/v1", features::router(intake))
}

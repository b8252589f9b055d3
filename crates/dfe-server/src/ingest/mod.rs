//! Fiscal transport document ingestion
//!
//! Pipeline per uploaded file:
//!
//! 1. [`detector`] classifies the payload by its root markers
//! 2. [`decoder`] maps it to a [`parsed`] record with named errors
//! 3. [`validate`] applies commit-time checks (check digit, state codes)
//! 4. [`coordinator`] resolves entities and writes everything in one
//!    store transaction, retrying transient failures
//!
//! [`intake`] registers uploads and feeds the bounded [`worker`] pool.

pub mod config;
pub mod coordinator;
pub mod decoder;
pub mod detector;
pub mod error;
pub mod intake;
pub mod parsed;
pub mod resolver;
pub mod schema;
pub mod validate;
pub mod worker;

pub use config::IngestConfig;
pub use coordinator::{IngestAction, IngestOutcome, IngestionCoordinator};
pub use detector::{detect, DocumentType};
pub use error::{DecodeError, IngestError, ValidationError};
pub use intake::{AcceptedUpload, BatchReceipt, IntakeError, RejectedFile, UploadFile, UploadIntake};
pub use worker::{IngestJob, JobQueue, WorkerPool};

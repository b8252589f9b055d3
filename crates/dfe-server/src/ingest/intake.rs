//! Upload intake: register submissions and hand them to the workers

use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use super::worker::{IngestJob, JobQueue, QueueError};
use crate::models::Upload;
use crate::store::{DocumentStore, StoreError};

const XML_EXTENSION: &str = ".xml";

/// Longest filename the uploads table stores.
pub const MAX_FILENAME_LENGTH: usize = 255;

#[derive(Error, Debug)]
pub enum IntakeError {
    #[error("Batch has {got} files, the maximum is {max}")]
    TooManyFiles { max: usize, got: usize },

    #[error("Filename '{0}' is blank or longer than 255 bytes")]
    InvalidFilename(String),

    #[error("File '{0}' is not an .xml file")]
    InvalidExtension(String),

    #[error("File '{0}' is empty")]
    EmptyContent(String),

    #[error("Ingestion queue is full, retry later")]
    QueueFull,

    #[error("Ingestion queue is shut down")]
    QueueClosed,

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<QueueError> for IntakeError {
    fn from(err: QueueError) -> Self {
        match err {
            QueueError::Full => IntakeError::QueueFull,
            QueueError::Closed => IntakeError::QueueClosed,
        }
    }
}

/// A file as received from the client.
#[derive(Debug, Clone)]
pub struct UploadFile {
    pub filename: String,
    pub content: Vec<u8>,
}

impl UploadFile {
    pub fn new(filename: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            filename: filename.into(),
            content: content.into(),
        }
    }

    fn is_xml(&self) -> bool {
        has_xml_extension(&self.filename)
    }

    /// Name and content checks made on every `.xml` file before it is registered.
    fn check(&self) -> Result<(), IntakeError> {
        check_filename(&self.filename)?;
        if self.content.is_empty() {
            return Err(IntakeError::EmptyContent(self.filename.clone()));
        }
        Ok(())
    }
}

pub fn check_filename(filename: &str) -> Result<(), IntakeError> {
    if filename.trim().is_empty() || filename.len() > MAX_FILENAME_LENGTH {
        return Err(IntakeError::InvalidFilename(filename.to_string()));
    }
    Ok(())
}

pub fn has_xml_extension(filename: &str) -> bool {
    filename.len() > XML_EXTENSION.len()
        && filename
            .get(filename.len() - XML_EXTENSION.len()..)
            .is_some_and(|ext| ext.eq_ignore_ascii_case(XML_EXTENSION))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AcceptedUpload {
    pub id: Uuid,
    pub filename: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RejectedFile {
    pub filename: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchReceipt {
    pub accepted: Vec<AcceptedUpload>,
    /// Names of files ignored for not ending in `.xml`.
    pub skipped: Vec<String>,
    /// `.xml` files left out for a bad name or empty content.
    pub rejected: Vec<RejectedFile>,
}

pub struct UploadIntake<S: DocumentStore> {
    store: Arc<S>,
    queue: JobQueue,
    max_batch_files: usize,
}

impl<S: DocumentStore> UploadIntake<S> {
    pub fn new(store: Arc<S>, queue: JobQueue, max_batch_files: usize) -> Self {
        Self {
            store,
            queue,
            max_batch_files,
        }
    }

    pub fn max_batch_files(&self) -> usize {
        self.max_batch_files
    }

    /// Register one file as a PENDING upload and queue it.
    pub async fn submit(&self, file: UploadFile) -> Result<Upload, IntakeError> {
        check_filename(&file.filename)?;
        if !file.is_xml() {
            return Err(IntakeError::InvalidExtension(file.filename));
        }
        file.check()?;

        let slots = self.queue.try_reserve(1)?;
        let upload = self.store.create_upload(&file.filename).await?;
        slots.send([IngestJob {
            upload_id: upload.id,
            filename: file.filename,
            content: file.content,
        }]);
        info!(upload_id = %upload.id, filename = %upload.filename, "Upload accepted");
        Ok(upload)
    }

    /// Register every valid `.xml` file of a batch and queue them together.
    ///
    /// The batch is rejected as a whole when it exceeds the file limit or
    /// the queue cannot take all of its files. Files failing the per-file
    /// checks are reported in the receipt and never registered.
    pub async fn submit_batch(&self, files: Vec<UploadFile>) -> Result<BatchReceipt, IntakeError> {
        if files.len() > self.max_batch_files {
            return Err(IntakeError::TooManyFiles {
                max: self.max_batch_files,
                got: files.len(),
            });
        }

        let (files, skipped): (Vec<UploadFile>, Vec<UploadFile>) =
            files.into_iter().partition(UploadFile::is_xml);
        let skipped: Vec<String> = skipped.into_iter().map(|f| f.filename).collect();
        if !skipped.is_empty() {
            warn!(count = skipped.len(), files = ?skipped, "Skipping non-XML files in batch");
        }

        let mut rejected = Vec::new();
        let files: Vec<UploadFile> = files
            .into_iter()
            .filter(|file| match file.check() {
                Ok(()) => true,
                Err(err) => {
                    warn!(filename = %file.filename, error = %err, "Rejecting file in batch");
                    rejected.push(RejectedFile {
                        filename: file.filename.clone(),
                        reason: err.to_string(),
                    });
                    false
                },
            })
            .collect();
        if files.is_empty() {
            return Ok(BatchReceipt {
                accepted: Vec::new(),
                skipped,
                rejected,
            });
        }

        let slots = self.queue.try_reserve(files.len())?;
        let names: Vec<String> = files.iter().map(|f| f.filename.clone()).collect();
        let uploads = self.store.create_uploads(&names).await?;

        let accepted = uploads
            .iter()
            .map(|u| AcceptedUpload {
                id: u.id,
                filename: u.filename.clone(),
            })
            .collect();
        let jobs = uploads.into_iter().zip(files).map(|(upload, file)| IngestJob {
            upload_id: upload.id,
            filename: file.filename,
            content: file.content,
        });
        slots.send(jobs);

        let receipt = BatchReceipt {
            accepted,
            skipped,
            rejected,
        };
        info!(
            accepted = receipt.accepted.len(),
            skipped = receipt.skipped.len(),
            rejected = receipt.rejected.len(),
            "Batch accepted"
        );
        Ok(receipt)
    }

    pub async fn status(&self, upload_id: Uuid) -> Result<Option<Upload>, IntakeError> {
        Ok(self.store.get_upload(upload_id).await?)
    }
}

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::ingest::intake::check_filename;
use crate::ingest::{IntakeError, UploadFile, UploadIntake};
use crate::models::{Upload, UploadStatus};
use crate::store::DocumentStore;

#[derive(Debug, Clone)]
pub struct SubmitUploadCommand {
    pub filename: String,
    pub content: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmitUploadResponse {
    pub id: Uuid,
    pub filename: String,
    pub status: UploadStatus,
    pub submitted_at: DateTime<Utc>,
}

impl From<Upload> for SubmitUploadResponse {
    fn from(upload: Upload) -> Self {
        Self {
            id: upload.id,
            filename: upload.filename,
            status: upload.status,
            submitted_at: upload.submitted_at,
        }
    }
}

impl SubmitUploadCommand {
    pub fn validate(&self) -> Result<(), IntakeError> {
        check_filename(&self.filename)
    }
}

#[tracing::instrument(skip(intake, command), fields(filename = %command.filename, bytes = command.content.len()))]
pub async fn handle<S: DocumentStore>(
    intake: &UploadIntake<S>,
    command: SubmitUploadCommand,
) -> Result<SubmitUploadResponse, IntakeError> {
    command.validate()?;
    let upload = intake
        .submit(UploadFile::new(command.filename, command.content))
        .await?;
    Ok(upload.into())
}

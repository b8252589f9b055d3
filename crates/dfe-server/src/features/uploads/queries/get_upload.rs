use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::ingest::{IntakeError, UploadIntake};
use crate::models::{Upload, UploadStatus};
use crate::store::DocumentStore;

#[derive(Debug, Clone, Copy)]
pub struct GetUploadQuery {
    pub id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadStatusResponse {
    pub id: Uuid,
    pub filename: String,
    pub status: UploadStatus,
    pub submitted_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processed_at: Option<DateTime<Utc>>,
}

impl From<Upload> for UploadStatusResponse {
    fn from(upload: Upload) -> Self {
        Self {
            id: upload.id,
            filename: upload.filename,
            status: upload.status,
            submitted_at: upload.submitted_at,
            access_key: upload.access_key,
            failure_detail: upload.failure_detail,
            processed_at: upload.processed_at,
        }
    }
}

#[tracing::instrument(skip(intake))]
pub async fn handle<S: DocumentStore>(
    intake: &UploadIntake<S>,
    query: GetUploadQuery,
) -> Result<Option<UploadStatusResponse>, IntakeError> {
    Ok(intake.status(query.id).await?.map(UploadStatusResponse::from))
}

//! Upload routes
//!
//! - `POST /` multipart with one `file` field
//! - `POST /batch` multipart with repeated `files` fields
//! - `GET /:id` upload status

use axum::{
    extract::{multipart::Field, DefaultBodyLimit, Multipart, Path, State},
    http::StatusCode,
    response::Response,
    routing::{get, post},
    Router,
};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use super::{
    commands::{submit, submit_batch, SubmitBatchCommand, SubmitUploadCommand},
    queries::{get_upload, GetUploadQuery},
};
use crate::api::ApiResponse;
use crate::error::AppError;
use crate::ingest::{UploadFile, UploadIntake};
use crate::store::DocumentStore;

/// Upper bound on a whole multipart request body.
pub const MAX_REQUEST_BYTES: usize = 64 * 1024 * 1024;

pub fn uploads_routes<S: DocumentStore>() -> Router<Arc<UploadIntake<S>>> {
    Router::new()
        .route("/", post(submit_upload::<S>))
        .route("/batch", post(submit_upload_batch::<S>))
        .route("/:id", get(get_upload_status::<S>))
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BYTES))
}

async fn read_file(field: Field<'_>) -> Result<UploadFile, AppError> {
    let filename = field
        .file_name()
        .map(str::to_string)
        .ok_or_else(|| AppError::BadRequest("Multipart file part has no filename".to_string()))?;
    let content = field
        .bytes()
        .await
        .map_err(|e| AppError::BadRequest(format!("Failed to read file '{}': {}", filename, e)))?;
    Ok(UploadFile::new(filename, content.to_vec()))
}

fn multipart_error(e: axum::extract::multipart::MultipartError) -> AppError {
    AppError::BadRequest(format!("Failed to read multipart field: {}", e))
}

#[tracing::instrument(skip(intake, multipart))]
async fn submit_upload<S: DocumentStore>(
    State(intake): State<Arc<UploadIntake<S>>>,
    mut multipart: Multipart,
) -> Result<Response, AppError> {
    let mut file = None;
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() == Some("file") {
            file = Some(read_file(field).await?);
            break;
        }
    }
    let file = file.ok_or_else(|| AppError::BadRequest("No file field found in multipart data".to_string()))?;

    let command = SubmitUploadCommand {
        filename: file.filename,
        content: file.content,
    };
    let response = submit::handle(&intake, command).await?;

    tracing::info!(upload_id = %response.id, filename = %response.filename, "Upload queued via API");
    Ok(ApiResponse::success(response).with_status(StatusCode::ACCEPTED))
}

#[tracing::instrument(skip(intake, multipart))]
async fn submit_upload_batch<S: DocumentStore>(
    State(intake): State<Arc<UploadIntake<S>>>,
    mut multipart: Multipart,
) -> Result<Response, AppError> {
    let mut command = SubmitBatchCommand::default();
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some("files") {
            continue;
        }
        command.files.push(read_file(field).await?);
        // Stop reading once the batch is already over the limit.
        if command.files.len() > intake.max_batch_files() {
            break;
        }
    }
    if command.files.is_empty() {
        return Err(AppError::BadRequest("No files field found in multipart data".to_string()));
    }

    let receipt = submit_batch::handle(&intake, command).await?;
    let meta = json!({
        "accepted": receipt.accepted.len(),
        "skipped": receipt.skipped.len(),
        "rejected": receipt.rejected.len(),
    });

    Ok(ApiResponse::success_with_meta(receipt, meta).with_status(StatusCode::ACCEPTED))
}

#[tracing::instrument(skip(intake))]
async fn get_upload_status<S: DocumentStore>(
    State(intake): State<Arc<UploadIntake<S>>>,
    Path(id): Path<Uuid>,
) -> Result<Response, AppError> {
    match get_upload::handle(&intake, GetUploadQuery { id }).await? {
        Some(upload) => Ok(ApiResponse::success(upload).with_status(StatusCode::OK)),
        None => Err(AppError::NotFound(format!("Upload {} not found", id))),
    }
}

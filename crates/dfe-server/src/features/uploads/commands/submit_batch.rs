use crate::ingest::{BatchReceipt, IntakeError, UploadFile, UploadIntake};
use crate::store::DocumentStore;

#[derive(Debug, Clone, Default)]
pub struct SubmitBatchCommand {
    pub files: Vec<UploadFile>,
}

#[tracing::instrument(skip(intake, command), fields(files = command.files.len()))]
pub async fn handle<S: DocumentStore>(
    intake: &UploadIntake<S>,
    command: SubmitBatchCommand,
) -> Result<BatchReceipt, IntakeError> {
    intake.submit_batch(command.files).await
}

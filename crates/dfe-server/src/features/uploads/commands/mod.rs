pub mod submit;
pub mod submit_batch;

pub use submit::{SubmitUploadCommand, SubmitUploadResponse};
pub use submit_batch::SubmitBatchCommand;

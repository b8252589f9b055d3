pub mod commands;
pub mod queries;
pub mod routes;

pub use commands::{SubmitBatchCommand, SubmitUploadCommand, SubmitUploadResponse};
pub use queries::{GetUploadQuery, UploadStatusResponse};
pub use routes::uploads_routes;

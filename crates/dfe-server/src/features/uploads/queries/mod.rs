pub mod get_upload;

pub use get_upload::{GetUploadQuery, UploadStatusResponse};

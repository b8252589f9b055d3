//! Error taxonomy of the ingestion pipeline

use thiserror::Error;

use crate::store::StoreError;

/// Structural failure while decoding a document payload.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Payload is not valid UTF-8")]
    InvalidEncoding,

    #[error("Malformed XML: {0}")]
    MalformedXml(String),

    #[error("Unexpected root element <{found}>, expected {expected}")]
    UnexpectedRoot { expected: &'static str, found: String },

    #[error("Unsupported schema version '{0}'")]
    UnsupportedVersion(String),

    #[error("Missing document identifier (Id attribute)")]
    MissingIdentifier,

    #[error("Invalid access key in {field}: '{value}' ({reason})")]
    InvalidAccessKey {
        field: &'static str,
        value: String,
        reason: String,
    },

    #[error("Missing required field {0}")]
    MissingField(&'static str),

    #[error("Invalid number in {field}: '{value}'")]
    InvalidNumber { field: &'static str, value: String },

    #[error("Invalid timestamp in {field}: '{value}'")]
    InvalidTimestamp { field: &'static str, value: String },

    #[error("The {role} has neither CNPJ nor CPF")]
    MissingTaxId { role: &'static str },

    #[error("Invalid tax id for the {role}: '{value}'")]
    InvalidTaxId { role: &'static str, value: String },

    #[error("Invalid vehicle plate '{0}'")]
    InvalidPlate(String),

    #[error("Unsupported event type {code}{}", name_suffix(.name))]
    UnsupportedEventType {
        code: String,
        name: Option<&'static str>,
    },
}

fn name_suffix(name: &Option<&'static str>) -> String {
    name.map(|n| format!(" ({})", n)).unwrap_or_default()
}

/// Commit-time validation failure of a decoded document.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Access key {key} has check digit {actual}, expected {expected}")]
    CheckDigit { key: String, expected: u8, actual: u8 },

    #[error("Invalid state code in {field}: '{value}'")]
    StateCode { field: &'static str, value: String },

    #[error("Manifest has no driver name")]
    MissingDriverName,

    #[error("Manifest has no driver CPF")]
    MissingDriverTaxId,
}

/// Failure of one ingestion job.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Unrecognized document type")]
    Unrecognized,

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("Target document {key} not found")]
    TargetNotFound { key: String },

    #[error("Document {key} already exists with a different kind")]
    KindConflict { key: String },

    #[error("Resolved entity missing for {0}")]
    Unresolved(String),

    #[error("Storage error: {0}")]
    Store(StoreError),
}

impl From<StoreError> for IngestError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::KindConflict { access_key } => IngestError::KindConflict { key: access_key },
            other => IngestError::Store(other),
        }
    }
}

impl IngestError {
    /// Only transport failures are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, IngestError::Store(e) if e.is_transient())
    }

    /// Text recorded on the upload when the job fails.
    pub fn failure_detail(&self) -> String {
        self.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsupported_event_display() {
        let err = DecodeError::UnsupportedEventType {
            code: "110110".to_string(),
            name: Some("correction letter"),
        };
        assert_eq!(err.to_string(), "Unsupported event type 110110 (correction letter)");

        let err = DecodeError::UnsupportedEventType { code: "999999".to_string(), name: None };
        assert_eq!(err.to_string(), "Unsupported event type 999999");
    }

    #[test]
    fn test_retryable_only_for_transient_store_errors() {
        assert!(IngestError::Store(StoreError::Unavailable("timeout".into())).is_retryable());
        assert!(!IngestError::Store(StoreError::NotFound("x".into())).is_retryable());
        assert!(!IngestError::Unrecognized.is_retryable());
        assert!(!IngestError::TargetNotFound { key: "k".into() }.is_retryable());
    }

    #[test]
    fn test_kind_conflict_is_lifted_from_store() {
        let err: IngestError = StoreError::KindConflict { access_key: "k".into() }.into();
        assert!(matches!(err, IngestError::KindConflict { .. }));
    }
}

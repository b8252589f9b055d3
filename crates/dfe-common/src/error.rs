//! Error types shared across the workspace

use thiserror::Error;

/// Result type alias for common operations
pub type Result<T> = std::result::Result<T, DfeError>;

/// Main error type for shared value types
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DfeError {
    #[error("Invalid access key length: expected 44 characters, got {0}")]
    AccessKeyLength(usize),

    #[error("Access key must contain only digits: {0}")]
    AccessKeyNotNumeric(String),

    #[error("Access key check digit mismatch: expected {expected}, got {actual}")]
    CheckDigitMismatch { expected: u8, actual: u8 },

    #[error("Invalid CNPJ: {0}")]
    InvalidCnpj(String),

    #[error("Invalid CPF: {0}")]
    InvalidCpf(String),

    #[error("Invalid vehicle plate: {0}")]
    InvalidPlate(String),

    #[error("Invalid state code: {0}")]
    InvalidStateCode(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Parse error: {0}")]
    Parse(String),
}

// Domain Error Types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Filename does not match the raw dump pattern: {0}")]
    FilenameMismatch(String),

    #[error("Bad data shape: expected {expected}, got {actual}")]
    ShapeMismatch { expected: String, actual: String },

    #[error("Observation tag is {0} characters; must be at most 127")]
    TagTooLong(usize),

    #[error("Invalid correlator map entry: {0}")]
    InvalidMapEntry(String),

    #[error("Invalid BDA table row: {0}")]
    InvalidBdaRow(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

pub type Result<T> = std::result::Result<T, DomainError>;

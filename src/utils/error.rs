use crate::adapters::pickle::PickleError;
use crate::domain::array::ArrayError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConvertError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Pickle decoding failed: {0}")]
    DecodeError(#[from] PickleError),

    #[error("Array construction failed: {0}")]
    ArrayError(#[from] ArrayError),

    #[error("Dataset '{name}' could not be built")]
    DatasetError {
        name: String,
        #[source]
        source: ArrayError,
    },

    #[error("Dataset name '{name}' is used by more than one key")]
    DuplicateDatasetError { name: String },

    #[error("Zip operation failed: {0}")]
    ZipError(#[from] zip::result::ZipError),

    #[error("Malformed container member '{member}': {reason}")]
    FormatError { member: String, reason: String },

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Invalid value '{value}' for {field}: {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Missing required configuration: {field}")]
    MissingConfigError { field: String },
}

impl ConvertError {
    pub fn recovery_suggestion(&self) -> &'static str {
        match self {
            ConvertError::IoError(_) => "Check that the path exists and is readable/writable",
            ConvertError::DecodeError(_) => "The file is truncated or is not a pickle",
            ConvertError::ArrayError(_) | ConvertError::DatasetError { .. } => {
                "Nested mappings and ragged lists cannot be stored as arrays"
            }
            ConvertError::DuplicateDatasetError { .. } => {
                "Give every top-level key a distinct str() form, e.g. not both 1 and '1'"
            }
            ConvertError::ZipError(_) | ConvertError::FormatError { .. } => {
                "Delete the damaged output file and run the conversion again"
            }
            ConvertError::ConfigError { .. }
            | ConvertError::InvalidConfigValueError { .. }
            | ConvertError::MissingConfigError { .. } => {
                "Pass --input-dir and --output-dir, or point --config at a valid TOML file"
            }
        }
    }
}

/// Renders an error followed by every `source()` beneath it.
pub fn error_chain(error: &dyn std::error::Error) -> String {
    let mut out = error.to_string();
    let mut current = error.source();
    while let Some(cause) = current {
        out.push_str("\n  caused by: ");
        out.push_str(&cause.to_string());
        current = cause.source();
    }
    out
}

pub type Result<T> = std::result::Result<T, ConvertError>;

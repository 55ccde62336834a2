// src/errors.rs
use thiserror::Error;

/// Failures talking to the REST API.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("network error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("{message} (HTTP {status})")]
    Status { status: u16, message: String },

    #[error("unexpected response: {0}")]
    Decode(String),
}

impl ApiError {
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl AppError {
    pub fn validation(field: &str, reason: &str) -> Self {
        Self::Validation { field: field.to_string(), reason: reason.to_string() }
    }
}

pub type Result<T, E = AppError> = std::result::Result<T, E>;

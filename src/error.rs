//! Error handling and custom error types
//!
//! Provides unified error handling across the crate using thiserror. The
//! asset server maps these into HTTP responses in `server::error`.

use crate::models::{AssetKind, CleanupOutcome};
use std::collections::BTreeMap;
use thiserror::Error;

/// Field name to list of human-readable messages.
pub type FieldErrors = BTreeMap<String, Vec<String>>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Validation error: {}", format_field_errors(.0))]
    Validation(FieldErrors),

    #[error("Invalid file type for {kind}: {detail}")]
    InvalidFileType { kind: AssetKind, detail: String },

    #[error("File too large for {kind}: {size} bytes exceeds the {limit} byte limit")]
    FileTooLarge {
        kind: AssetKind,
        size: u64,
        limit: u64,
    },

    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Record write failed after upload: {reason} ({cleanup})")]
    LinkFailed {
        reason: String,
        filename: String,
        cleanup: CleanupOutcome,
    },

    #[error("Request failed{}: {message}", format_status(.status))]
    Request {
        status: Option<u16>,
        message: String,
    },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Generic error: {0}")]
    Generic(String),
}

impl Error {
    /// Client-side validation failure for a single field.
    pub fn field(field: &str, message: impl Into<String>) -> Self {
        let mut errors = FieldErrors::new();
        errors.insert(field.to_string(), vec![message.into()]);
        Error::Validation(errors)
    }

    /// True for failures caused by the caller's input rather than the
    /// environment. These are surfaced immediately and never retried.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Error::Validation(_) | Error::InvalidFileType { .. } | Error::FileTooLarge { .. }
        )
    }
}

fn format_field_errors(errors: &FieldErrors) -> String {
    errors
        .iter()
        .map(|(field, messages)| format!("{}: {}", field, messages.join(", ")))
        .collect::<Vec<_>>()
        .join(" | ")
}

fn format_status(status: &Option<u16>) -> String {
    status
        .map(|status| format!(" (status {})", status))
        .unwrap_or_default()
}

pub type Result<T> = std::result::Result<T, Error>;

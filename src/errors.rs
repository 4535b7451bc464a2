//! Error types for the notebox application.
//!
//! This module defines the error type shared by the repository, the store
//! gateway and the bundle codec, together with the coarse [`ErrorKind`]
//! taxonomy callers use to decide how to react.

use std::{io, path::PathBuf};

use thiserror::Error;

/// The main error type for the notebox application.
#[derive(Error, Debug)]
pub enum NoteError {
    /// Errors related to file I/O operations.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Errors related to serialization/deserialization operations.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Errors related to zip operations.
    #[error("Zip error: {0}")]
    ZipError(#[from] zip::result::ZipError),

    /// Note was not found when performing an operation.
    #[error("Note not found: {id}")]
    NoteNotFound { id: String },

    /// Malformed store, bundle or document input.
    #[error("Invalid format: {message}")]
    InvalidFormat { message: String },

    /// Lock or unlock authorization was declined.
    #[error("Authentication failed: {message}")]
    AuthFailure { message: String },

    /// Errors related to export operations.
    #[error("Export failed: {message}")]
    ExportFailed { message: String },

    /// Errors related to configuration.
    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    /// Directory creation or access failed.
    #[error("Failed to create or access directory: {path}")]
    DirectoryError { path: PathBuf },

    /// An asset path tried to leave the asset root.
    #[error("Asset path escapes storage root: {path}")]
    UnsafeAssetPath { path: String },
}

/// Coarse classification of [`NoteError`] values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    InvalidFormat,
    IoFailure,
    AuthFailure,
    Config,
}

impl NoteError {
    /// Maps this error onto the failure taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            NoteError::NoteNotFound { .. } => ErrorKind::NotFound,
            NoteError::InvalidFormat { .. }
            | NoteError::Serialization(_)
            | NoteError::UnsafeAssetPath { .. } => ErrorKind::InvalidFormat,
            NoteError::Io(_)
            | NoteError::ZipError(_)
            | NoteError::ExportFailed { .. }
            | NoteError::DirectoryError { .. } => ErrorKind::IoFailure,
            NoteError::AuthFailure { .. } => ErrorKind::AuthFailure,
            NoteError::ConfigError { .. } => ErrorKind::Config,
        }
    }

    pub(crate) fn invalid_format(message: impl Into<String>) -> Self {
        NoteError::InvalidFormat {
            message: message.into(),
        }
    }

    pub(crate) fn auth(message: impl Into<String>) -> Self {
        NoteError::AuthFailure {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        let not_found = NoteError::NoteNotFound {
            id: "abc".to_string(),
        };
        assert_eq!(not_found.kind(), ErrorKind::NotFound);
        assert_eq!(not_found.to_string(), "Note not found: abc");

        let io = NoteError::from(io::Error::new(io::ErrorKind::Other, "disk gone"));
        assert_eq!(io.kind(), ErrorKind::IoFailure);
        assert!(io.to_string().contains("disk gone"));

        assert_eq!(
            NoteError::invalid_format("missing data.notes").kind(),
            ErrorKind::InvalidFormat
        );
        assert_eq!(NoteError::auth("declined").kind(), ErrorKind::AuthFailure);
    }
}

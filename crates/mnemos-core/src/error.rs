// SPDX-FileCopyrightText: 2026 Mnemos Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Mnemos memory subsystem.

use strum::Display;
use thiserror::Error;

type BoxedSource = Box<dyn std::error::Error + Send + Sync>;

/// Classifies a storage failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum StorageErrorKind {
    /// The referenced record does not exist (in the caller's scope).
    NotFound,
    /// The record is malformed: missing embedding, dimension mismatch, bad category.
    InvalidRecord,
    /// The backend failed to read or write.
    IoFailure,
}

/// The primary error type used across all Mnemos traits and operations.
#[derive(Debug, Error)]
pub enum MnemosError {
    /// Configuration errors (invalid thresholds, dimension mismatch across providers).
    /// Raised at construction time.
    #[error("configuration error: {0}")]
    Config(String),

    /// Embedding provider errors.
    #[error("embedding error: {message}")]
    Embedding {
        message: String,
        /// Whether repeating the call may succeed (timeouts, 429, 5xx).
        retryable: bool,
        #[source]
        source: Option<BoxedSource>,
    },

    /// Storage backend errors.
    #[error("storage error ({kind}): {message}")]
    Storage {
        kind: StorageErrorKind,
        message: String,
        #[source]
        source: Option<BoxedSource>,
    },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl MnemosError {
    /// Wraps a backend I/O failure.
    pub fn storage_io<E>(message: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        MnemosError::Storage {
            kind: StorageErrorKind::IoFailure,
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn invalid_record(message: impl Into<String>) -> Self {
        MnemosError::Storage {
            kind: StorageErrorKind::InvalidRecord,
            message: message.into(),
            source: None,
        }
    }

    pub fn not_found(id: &str) -> Self {
        MnemosError::Storage {
            kind: StorageErrorKind::NotFound,
            message: format!("memory `{id}` does not exist"),
            source: None,
        }
    }

    pub fn embedding_retryable(message: impl Into<String>) -> Self {
        MnemosError::Embedding {
            message: message.into(),
            retryable: true,
            source: None,
        }
    }

    pub fn embedding_fatal(message: impl Into<String>) -> Self {
        MnemosError::Embedding {
            message: message.into(),
            retryable: false,
            source: None,
        }
    }

    /// Returns true if the failed operation may succeed when repeated.
    pub fn is_retryable(&self) -> bool {
        match self {
            MnemosError::Embedding { retryable, .. } => *retryable,
            MnemosError::Storage { kind, .. } => *kind == StorageErrorKind::IoFailure,
            _ => false,
        }
    }

    /// Returns the storage failure kind, if this is a storage error.
    pub fn storage_kind(&self) -> Option<StorageErrorKind> {
        match self {
            MnemosError::Storage { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

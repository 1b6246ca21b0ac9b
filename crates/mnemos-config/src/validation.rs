// SPDX-FileCopyrightText: 2026 Mnemos Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.

use crate::diagnostic::ConfigError;
use crate::domain::domain_violations;
use crate::model::{EmbeddingBackend, MnemosConfig, StorageBackend};

/// Validate a deserialized configuration for semantic correctness.
///
/// Collects every violation instead of stopping at the first.
pub fn validate_config(config: &MnemosConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors: Vec<ConfigError> = domain_violations(&config.domain)
        .into_iter()
        .map(|message| ConfigError::Validation { message })
        .collect();

    if config.storage.backend == StorageBackend::Sqlite
        && config.storage.database_path.trim().is_empty()
    {
        errors.push(ConfigError::Validation {
            message: "storage.database_path must not be empty for the sqlite backend".to_string(),
        });
    }

    if config.embedding.dimensions == 0 {
        errors.push(ConfigError::Validation {
            message: "embedding.dimensions must be at least 1".to_string(),
        });
    }

    match config.embedding.provider {
        EmbeddingBackend::Http => {
            let endpoint = config.embedding.endpoint.trim();
            if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
                errors.push(ConfigError::Validation {
                    message: format!(
                        "embedding.endpoint `{endpoint}` must start with http:// or https://"
                    ),
                });
            }
            if config.embedding.timeout_secs == 0 {
                errors.push(ConfigError::Validation {
                    message: "embedding.timeout_secs must be at least 1".to_string(),
                });
            }
        }
        EmbeddingBackend::Onnx => {
            if config.embedding.data_dir.trim().is_empty() {
                errors.push(ConfigError::Validation {
                    message: "embedding.data_dir must not be empty for the onnx provider"
                        .to_string(),
                });
            }
        }
    }

    if errors.is_empty() { Ok(()) } else { Err(errors) }
}

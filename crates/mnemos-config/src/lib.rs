// SPDX-FileCopyrightText: 2026 Mnemos Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration system for Mnemos.
//!
//! TOML configuration with strict validation (`deny_unknown_fields`), layered
//! file lookup, `MNEMOS_` environment overrides, miette diagnostics with typo
//! suggestions, and the immutable [`DomainConfig`] policy value.
//!
//! ```no_run
//! use mnemos_config::load_and_validate;
//!
//! let config = load_and_validate().expect("config errors");
//! let domain = config.domain_config().expect("validated above");
//! println!("owner cap: {}", domain.max_memories_per_owner());
//! ```

pub mod diagnostic;
pub mod domain;
pub mod loader;
pub mod model;
pub mod validation;

pub use diagnostic::{ConfigError, render_errors};
pub use domain::{DomainConfig, DomainConfigBuilder};
pub use loader::{load_config, load_config_from_path, load_config_from_str};
pub use model::{
    DomainSection, EmbeddingBackend, EmbeddingConfig, MnemosConfig, StorageBackend,
    StorageConfig,
};

use mnemos_core::MnemosError;

impl MnemosConfig {
    /// Convert the `[domain]` section into the validated policy value.
    pub fn domain_config(&self) -> Result<DomainConfig, MnemosError> {
        DomainConfig::try_from(self.domain.clone())
    }
}

/// Load configuration from the file hierarchy and validate it.
pub fn load_and_validate() -> Result<MnemosConfig, Vec<ConfigError>> {
    match loader::load_config() {
        Ok(config) => {
            validation::validate_config(&config)?;
            tracing::debug!(
                backend = ?config.storage.backend,
                provider = ?config.embedding.provider,
                "configuration loaded"
            );
            Ok(config)
        }
        Err(err) => Err(diagnostic::figment_to_config_errors(
            err,
            &collect_toml_sources(),
        )),
    }
}

/// Load configuration from a TOML string and validate it.
pub fn load_and_validate_str(toml_content: &str) -> Result<MnemosConfig, Vec<ConfigError>> {
    match loader::load_config_from_str(toml_content) {
        Ok(config) => {
            validation::validate_config(&config)?;
            Ok(config)
        }
        Err(err) => {
            let sources = vec![("<inline>".to_string(), toml_content.to_string())];
            Err(diagnostic::figment_to_config_errors(err, &sources))
        }
    }
}

/// Read every config file that exists, for error span resolution.
fn collect_toml_sources() -> Vec<(String, String)> {
    let mut candidates = vec![std::path::PathBuf::from(loader::SYSTEM_CONFIG)];
    candidates.extend(loader::user_config_path());
    candidates.push(
        std::env::current_dir()
            .map(|d| d.join(loader::LOCAL_CONFIG))
            .unwrap_or_else(|_| loader::LOCAL_CONFIG.into()),
    );

    candidates
        .into_iter()
        .filter_map(|path| {
            std::fs::read_to_string(&path)
                .ok()
                .map(|content| (path.display().to_string(), content))
        })
        .collect()
}

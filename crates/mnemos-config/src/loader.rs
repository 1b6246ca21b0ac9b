// SPDX-FileCopyrightText: 2026 Mnemos Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Layered configuration loading with Figment.
//!
//! `./mnemos.toml` > `~/.config/mnemos/mnemos.toml` > `/etc/mnemos/mnemos.toml`,
//! with `MNEMOS_` environment variable overrides on top.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::Path;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use crate::model::MnemosConfig;

pub(crate) const SYSTEM_CONFIG: &str = "/etc/mnemos/mnemos.toml";
pub(crate) const LOCAL_CONFIG: &str = "mnemos.toml";

/// Load configuration from the standard hierarchy with env var overrides.
pub fn load_config() -> Result<MnemosConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string only (no file lookup, no env).
pub fn load_config_from_str(toml_content: &str) -> Result<MnemosConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(MnemosConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<MnemosConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(MnemosConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// The Figment used by [`load_config`], before extraction.
pub fn build_figment() -> Figment {
    Figment::new()
        .merge(Serialized::defaults(MnemosConfig::default()))
        .merge(Toml::file(SYSTEM_CONFIG))
        .merge(Toml::file(user_config_path().unwrap_or_default()))
        .merge(Toml::file(LOCAL_CONFIG))
        .merge(env_provider())
}

pub(crate) fn user_config_path() -> Option<std::path::PathBuf> {
    dirs::config_dir().map(|d| d.join("mnemos").join("mnemos.toml"))
}

/// Environment provider mapping `MNEMOS_<SECTION>_<KEY>` to `section.key`.
///
/// Uses an explicit section map rather than splitting on `_`, since keys
/// like `database_path` contain underscores themselves.
pub(crate) fn env_provider() -> Env {
    Env::prefixed("MNEMOS_").map(|key| {
        let mapped = key
            .as_str()
            .replacen("storage_", "storage.", 1)
            .replacen("embedding_", "embedding.", 1)
            .replacen("domain_", "domain.", 1);
        mapped.into()
    })
}

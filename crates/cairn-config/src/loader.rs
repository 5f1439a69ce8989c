// SPDX-FileCopyrightText: 2026 Cairn Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./cairn.toml` > `~/.config/cairn/cairn.toml` > `/etc/cairn/cairn.toml`
//! with environment variable overrides via `CAIRN_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::Path;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use crate::model::CairnConfig;

/// Config sections, in the order they are matched against env var names.
const SECTIONS: &[&str] = &[
    "general",
    "cache",
    "store",
    "extraction",
    "index",
    "embedding",
    "generation",
];

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/cairn/cairn.toml` (system-wide)
/// 3. `~/.config/cairn/cairn.toml` (user XDG config)
/// 4. `./cairn.toml` (local directory)
/// 5. `CAIRN_*` environment variables
pub fn load_config() -> Result<CairnConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string only (no XDG lookup, no env).
///
/// Used for testing and explicit configuration.
pub fn load_config_from_str(toml_content: &str) -> Result<CairnConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(CairnConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<CairnConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(CairnConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Build the Figment used internally for config loading (exposed for diagnostic use).
pub fn build_figment() -> Figment {
    Figment::new()
        .merge(Serialized::defaults(CairnConfig::default()))
        .merge(Toml::file("/etc/cairn/cairn.toml"))
        .merge(Toml::file(
            dirs::config_dir()
                .map(|d| d.join("cairn/cairn.toml"))
                .unwrap_or_default(),
        ))
        .merge(Toml::file("cairn.toml"))
        .merge(env_provider())
}

/// Create the environment variable provider with explicit section mapping.
///
/// Uses `Env::map()` rather than `Env::split("_")` because keys contain
/// underscores: `CAIRN_EXTRACTION_MAX_MESSAGES` must map to
/// `extraction.max_messages`, not `extraction.max.messages`.
fn env_provider() -> Env {
    Env::prefixed("CAIRN_").map(|key| map_env_key(key.as_str()).into())
}

/// Map a lowercased, prefix-stripped env var name onto a dotted config path.
pub(crate) fn map_env_key(key: &str) -> String {
    for section in SECTIONS {
        if let Some(rest) = key
            .strip_prefix(section)
            .and_then(|rest| rest.strip_prefix('_'))
        {
            return format!("{section}.{rest}");
        }
    }
    key.to_string()
}

// SPDX-FileCopyrightText: 2026 Cairn Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that cannot be expressed via serde attributes,
//! such as non-zero bounds, namespace shape, and similarity ranges.

use crate::diagnostic::ConfigError;
use crate::model::{CacheBackendKind, CairnConfig};

/// Validate a deserialized configuration for semantic correctness.
///
/// Returns `Ok(())` if all validations pass, or `Err(Vec<ConfigError>)` with
/// all collected validation errors (does not fail fast).
pub fn validate_config(config: &CairnConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    if config.cache.backend == CacheBackendKind::Disk && config.cache.directory.trim().is_empty() {
        errors.push(ConfigError::validation(
            "cache.directory must not be empty when cache.backend = \"disk\"",
        ));
    }

    if config.store.directory.trim().is_empty() {
        errors.push(ConfigError::validation("store.directory must not be empty"));
    }

    let namespace = config.store.namespace.trim();
    if namespace.is_empty() {
        errors.push(ConfigError::validation("store.namespace must not be empty"));
    } else if namespace.contains(['/', '\\']) || namespace == "." || namespace == ".." {
        errors.push(ConfigError::validation(format!(
            "store.namespace `{namespace}` must be a plain name without path separators"
        )));
    }

    if config.store.max_attempts == 0 {
        errors.push(ConfigError::validation("store.max_attempts must be at least 1"));
    }

    if config.extraction.max_messages == 0 {
        errors.push(ConfigError::validation(
            "extraction.max_messages must be at least 1",
        ));
    }

    if config.extraction.max_content_length_chars == 0 {
        errors.push(ConfigError::validation(
            "extraction.max_content_length_chars must be at least 1",
        ));
    }

    if config.extraction.max_attempts == 0 {
        errors.push(ConfigError::validation(
            "extraction.max_attempts must be at least 1",
        ));
    }

    if config.extraction.generation_timeout_secs == 0 {
        errors.push(ConfigError::validation(
            "extraction.generation_timeout_secs must be at least 1",
        ));
    }

    if config.index.default_limit == 0 {
        errors.push(ConfigError::validation("index.default_limit must be at least 1"));
    }

    if let Some(min) = config.index.min_similarity
        && !(-1.0..=1.0).contains(&min)
    {
        errors.push(ConfigError::validation(format!(
            "index.min_similarity must be within [-1, 1], got {min}"
        )));
    }

    if let Some(endpoint) = &config.embedding.endpoint
        && !(endpoint.starts_with("http://") || endpoint.starts_with("https://"))
    {
        errors.push(ConfigError::validation(format!(
            "embedding.endpoint `{endpoint}` must be an http(s) URL"
        )));
    }

    if let Some(command) = &config.generation.command
        && command.trim().is_empty()
    {
        errors.push(ConfigError::validation(
            "generation.command must not be empty when set",
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

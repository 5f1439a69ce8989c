// SPDX-FileCopyrightText: 2026 Cairn Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests for the Cairn configuration system.

use cairn_config::diagnostic::ConfigError;
use cairn_config::model::{CacheBackendKind, CairnConfig};
use cairn_config::{load_and_validate_str, load_config_from_path, load_config_from_str};

/// Valid TOML with every section deserializes successfully.
#[test]
fn valid_toml_deserializes_into_cairn_config() {
    let toml = r#"
[general]
log_level = "debug"

[cache]
backend = "disk"
directory = "/tmp/cairn/cache"

[store]
directory = "/tmp/cairn/memories"
namespace = "project-x"
max_attempts = 5
base_delay_ms = 100

[extraction]
max_messages = 10
max_content_length_chars = 300
max_attempts = 2
generation_timeout_secs = 60
source = "session-42"

[index]
default_limit = 8
query_cache_capacity = 16
min_similarity = 0.2

[embedding]
endpoint = "http://localhost:11434/v1"
model = "nomic-embed-text"

[generation]
command = "claude"
args = ["-p", "--output-format", "text"]
"#;

    let config = load_config_from_str(toml).expect("valid TOML should deserialize");
    assert_eq!(config.general.log_level, "debug");
    assert_eq!(config.cache.backend, CacheBackendKind::Disk);
    assert_eq!(config.store.namespace, "project-x");
    assert_eq!(config.store.max_attempts, 5);
    assert_eq!(config.store.base_delay_ms, 100);
    assert_eq!(config.extraction.max_messages, 10);
    assert_eq!(config.extraction.max_content_length_chars, 300);
    assert_eq!(config.extraction.source, "session-42");
    assert_eq!(config.index.default_limit, 8);
    assert_eq!(config.index.min_similarity, Some(0.2));
    assert_eq!(
        config.embedding.endpoint.as_deref(),
        Some("http://localhost:11434/v1")
    );
    assert_eq!(config.generation.command.as_deref(), Some("claude"));
    assert_eq!(config.generation.args.len(), 3);
}

/// Unknown field in [extraction] is rejected.
#[test]
fn unknown_field_in_extraction_produces_error() {
    let toml = r#"
[extraction]
max_mesages = 10
"#;

    let err = load_config_from_str(toml).expect_err("should reject unknown field");
    let err_str = format!("{err}");
    assert!(
        err_str.contains("unknown field") || err_str.contains("max_mesages"),
        "error should mention the unknown field, got: {err_str}"
    );
}

/// Unknown keys surface as UnknownKey diagnostics with a suggestion.
#[test]
fn load_and_validate_str_suggests_typo_fix() {
    let errors = load_and_validate_str("[index]\ndefault_limt = 3\n").unwrap_err();
    assert!(errors.iter().any(|e| matches!(
        e,
        ConfigError::UnknownKey { suggestion, .. } if suggestion.as_deref() == Some("default_limit")
    )));
}

/// Semantic violations surface as Validation diagnostics.
#[test]
fn load_and_validate_str_runs_validation() {
    let errors = load_and_validate_str("[extraction]\nmax_messages = 0\n").unwrap_err();
    assert!(errors.iter().any(|e| matches!(
        e,
        ConfigError::Validation { message } if message.contains("max_messages")
    )));
}

/// An empty document yields the compiled defaults.
#[test]
fn missing_sections_use_defaults() {
    let config = load_config_from_str("").expect("empty TOML should use defaults");
    let defaults = CairnConfig::default();

    assert_eq!(config.general.log_level, "info");
    assert_eq!(config.extraction.max_messages, 20);
    assert_eq!(config.extraction.max_content_length_chars, 500);
    assert_eq!(config.store.base_delay_ms, 250);
    assert_eq!(config.store.directory, defaults.store.directory);
    assert_eq!(config.index.default_limit, 5);
}

/// Wrong value types are reported, not coerced.
#[test]
fn invalid_type_is_rejected() {
    let errors = load_and_validate_str("[store]\nmax_attempts = \"three\"\n").unwrap_err();
    assert!(
        errors
            .iter()
            .any(|e| matches!(e, ConfigError::InvalidType { key, .. } if key.contains("max_attempts")))
    );
}

/// CAIRN_* environment variables override file values with section mapping.
#[test]
fn env_vars_override_file_values() {
    figment::Jail::expect_with(|jail| {
        jail.create_file(
            "cairn.toml",
            r#"
[extraction]
max_messages = 12

[store]
namespace = "from-file"
"#,
        )?;
        jail.set_env("CAIRN_EXTRACTION_MAX_MESSAGES", "7");
        jail.set_env("CAIRN_STORE_BASE_DELAY_MS", "10");

        let config = load_config_from_path(std::path::Path::new("cairn.toml"))
            .expect("env overrides should merge");
        assert_eq!(config.extraction.max_messages, 7);
        assert_eq!(config.store.base_delay_ms, 10);
        assert_eq!(config.store.namespace, "from-file");
        Ok(())
    });
}

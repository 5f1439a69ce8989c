// SPDX-FileCopyrightText: 2026 Cairn Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Cairn memory pipeline.
//!
//! This crate provides the error taxonomy, the adapter traits for the two
//! external capabilities (text generation and embeddings), and the request
//! and response types those traits exchange.

pub mod error;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::CairnError;
pub use types::{AdapterType, HealthStatus};

pub use traits::{EmbeddingAdapter, GenerationAdapter, PluginAdapter};

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn cairn_error_messages_carry_context() {
        let err = CairnError::ExtractionFailed {
            attempts: 3,
            reason: "no JSON object found".into(),
        };
        assert_eq!(
            err.to_string(),
            "extraction failed after 3 attempt(s): no JSON object found"
        );

        let err = CairnError::GenerationTimeout {
            timeout: Duration::from_secs(120),
            attempt: 2,
        };
        assert!(err.to_string().contains("attempt 2"));

        let err = CairnError::StorageUnavailable {
            path: "/tmp/mem/default.jsonl".into(),
            attempts: 3,
            source: std::io::Error::other("resource busy"),
        };
        let msg = err.to_string();
        assert!(msg.contains("default.jsonl"));
        assert!(msg.contains("3 attempt(s)"));

    }

    #[test]
    fn replicate_keeps_variant_and_message() {
        let original = CairnError::StorageUnavailable {
            path: "/tmp/mem/default.jsonl".into(),
            attempts: 3,
            source: std::io::Error::new(std::io::ErrorKind::ResourceBusy, "resource busy"),
        };
        let copy = original.replicate();
        assert_eq!(copy.to_string(), original.to_string());
        match copy {
            CairnError::StorageUnavailable { attempts, source, .. } => {
                assert_eq!(attempts, 3);
                assert_eq!(source.kind(), std::io::ErrorKind::ResourceBusy);
            }
            other => panic!("unexpected variant: {other:?}"),
        }

        let original = CairnError::ExtractionFailed {
            attempts: 2,
            reason: "no JSON object found".into(),
        };
        assert!(matches!(
            original.replicate(),
            CairnError::ExtractionFailed { attempts: 2, ref reason } if reason == "no JSON object found"
        ));
        assert!(CairnError::cancelled("ingest").replicate().is_cancelled());
    }

    #[test]
    fn transient_classification() {
        assert!(CairnError::GenerationError {
            message: "502".into(),
            attempt: 1
        }
        .is_transient());
        assert!(CairnError::EmbeddingUnavailable {
            message: "down".into()
        }
        .is_transient());
        assert!(!CairnError::InvalidArgument("limit".into()).is_transient());
        assert!(!CairnError::cancelled("append").is_transient());
        assert!(CairnError::cancelled("append").is_cancelled());
    }

    #[test]
    fn adapter_type_display_round_trip() {
        use std::str::FromStr;

        for variant in [AdapterType::Generation, AdapterType::Embedding] {
            let parsed = AdapterType::from_str(&variant.to_string()).expect("should parse back");
            assert_eq!(variant, parsed);
        }
    }

    #[test]
    fn health_status_variants() {
        let healthy = HealthStatus::Healthy;
        assert_ne!(HealthStatus::Degraded("slow".into()), healthy);
        assert_ne!(HealthStatus::Unhealthy("down".into()), healthy);
    }

    #[test]
    fn all_traits_are_exported() {
        fn _assert_plugin_adapter<T: PluginAdapter>() {}
        fn _assert_generation_adapter<T: GenerationAdapter>() {}
        fn _assert_embedding_adapter<T: EmbeddingAdapter>() {}
    }
}

// SPDX-FileCopyrightText: 2026 Cairn Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Embedding adapter for OpenAI-compatible `/embeddings` endpoints.
//!
//! Every failure (connection, status, body shape) is reported as
//! [`CairnError::EmbeddingUnavailable`], which the index treats as a signal
//! to degrade to keyword scoring.

use std::time::Duration;

use async_trait::async_trait;
use cairn_config::model::EmbeddingConfig;
use cairn_core::error::CairnError;
use cairn_core::traits::{EmbeddingAdapter, PluginAdapter};
use cairn_core::types::{AdapterType, EmbeddingInput, EmbeddingOutput, HealthStatus};
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingDatum {
    embedding: Vec<f32>,
    #[serde(default)]
    index: usize,
}

fn unavailable(message: impl Into<String>) -> CairnError {
    CairnError::EmbeddingUnavailable {
        message: message.into(),
    }
}

/// HTTP client for an embeddings API.
#[derive(Debug, Clone)]
pub struct HttpEmbedder {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

impl HttpEmbedder {
    /// Creates a client for `base_url` (for example `http://localhost:11434/v1`).
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, CairnError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CairnError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            api_key,
        })
    }

    /// Build from `[embedding]` configuration. Returns `None` when no endpoint is set.
    pub fn from_config(config: &EmbeddingConfig) -> Result<Option<Self>, CairnError> {
        let Some(endpoint) = &config.endpoint else {
            return Ok(None);
        };
        Self::new(
            endpoint.clone(),
            config.model.clone(),
            config.api_key.clone(),
            Duration::from_secs(config.timeout_secs),
        )
        .map(Some)
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn url(&self) -> String {
        format!("{}/embeddings", self.base_url)
    }
}

#[async_trait]
impl PluginAdapter for HttpEmbedder {
    fn name(&self) -> &str {
        "http-embedder"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Embedding
    }

    async fn health_check(&self) -> Result<HealthStatus, CairnError> {
        let probe = EmbeddingInput {
            texts: vec!["health check".to_string()],
        };
        match self.embed(probe).await {
            Ok(_) => Ok(HealthStatus::Healthy),
            Err(e) => Ok(HealthStatus::Degraded(e.to_string())),
        }
    }

    async fn shutdown(&self) -> Result<(), CairnError> {
        Ok(())
    }
}

#[async_trait]
impl EmbeddingAdapter for HttpEmbedder {
    async fn embed(&self, input: EmbeddingInput) -> Result<EmbeddingOutput, CairnError> {
        if input.texts.is_empty() {
            return Ok(EmbeddingOutput {
                embeddings: Vec::new(),
                dimensions: 0,
            });
        }

        let body = EmbeddingRequest {
            model: &self.model,
            input: &input.texts,
        };
        let mut request = self.client.post(self.url()).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| unavailable(format!("embedding request failed: {e}")))?;

        let status = response.status();
        debug!(status = %status, texts = input.texts.len(), "embedding response received");
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(unavailable(format!("embedding API returned {status}: {body}")));
        }

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| unavailable(format!("failed to parse embedding response: {e}")))?;

        if parsed.data.len() != input.texts.len() {
            return Err(unavailable(format!(
                "embedding API returned {} vectors for {} inputs",
                parsed.data.len(),
                input.texts.len()
            )));
        }

        let mut data = parsed.data;
        data.sort_by_key(|d| d.index);
        let dimensions = data.first().map_or(0, |d| d.embedding.len());
        if dimensions == 0 || data.iter().any(|d| d.embedding.len() != dimensions) {
            return Err(unavailable("embedding API returned inconsistent dimensions"));
        }

        Ok(EmbeddingOutput {
            embeddings: data.into_iter().map(|d| d.embedding).collect(),
            dimensions,
        })
    }
}

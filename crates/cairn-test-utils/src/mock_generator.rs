// SPDX-FileCopyrightText: 2026 Cairn Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock text-generation adapter for deterministic testing.
//!
//! `MockGenerator` implements `GenerationAdapter` with pre-configured
//! replies and records every prompt it receives.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use cairn_core::CairnError;
use cairn_core::traits::{GenerationAdapter, PluginAdapter};
use cairn_core::types::{AdapterType, GenerationRequest, GenerationResponse, HealthStatus};

/// One scripted reply.
#[derive(Debug, Clone)]
pub enum MockReply {
    /// Return this text.
    Text(String),
    /// Fail with `GenerationError`.
    Error(String),
    /// Sleep for the given duration, then return the text.
    Delayed(Duration, String),
}

/// A mock generator that returns pre-configured replies.
///
/// Replies are popped from a FIFO queue. When the queue is empty the
/// fallback reply is returned, which defaults to an empty memory list.
pub struct MockGenerator {
    replies: Mutex<VecDeque<MockReply>>,
    fallback: Mutex<MockReply>,
    prompts: Mutex<Vec<String>>,
    calls: AtomicUsize,
}

impl MockGenerator {
    /// Create a mock generator with an empty queue.
    pub fn new() -> Self {
        Self::build(VecDeque::new(), MockReply::Text(r#"{"memories": []}"#.to_string()))
    }

    /// Create a mock generator pre-loaded with text replies.
    pub fn with_responses(responses: Vec<String>) -> Self {
        let queue = responses.into_iter().map(MockReply::Text).collect();
        Self::build(queue, MockReply::Text(r#"{"memories": []}"#.to_string()))
    }

    /// Create a mock generator that answers every call with `text`.
    pub fn always(text: impl Into<String>) -> Self {
        Self::build(VecDeque::new(), MockReply::Text(text.into()))
    }

    fn build(replies: VecDeque<MockReply>, fallback: MockReply) -> Self {
        Self {
            replies: Mutex::new(replies),
            fallback: Mutex::new(fallback),
            prompts: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Add a text reply to the end of the queue.
    pub async fn add_response(&self, text: impl Into<String>) {
        self.replies
            .lock()
            .await
            .push_back(MockReply::Text(text.into()));
    }

    /// Add a failing reply to the end of the queue.
    pub async fn add_error(&self, message: impl Into<String>) {
        self.replies
            .lock()
            .await
            .push_back(MockReply::Error(message.into()));
    }

    /// Add an arbitrary reply to the end of the queue.
    pub async fn add_reply(&self, reply: MockReply) {
        self.replies.lock().await.push_back(reply);
    }

    /// Replace the reply used once the queue is empty.
    pub async fn set_fallback(&self, reply: MockReply) {
        *self.fallback.lock().await = reply;
    }

    /// Number of `generate` calls so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Every prompt received, in call order.
    pub async fn prompts(&self) -> Vec<String> {
        self.prompts.lock().await.clone()
    }

    async fn next_reply(&self) -> MockReply {
        match self.replies.lock().await.pop_front() {
            Some(reply) => reply,
            None => self.fallback.lock().await.clone(),
        }
    }
}

impl Default for MockGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PluginAdapter for MockGenerator {
    fn name(&self) -> &str {
        "mock-generator"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Generation
    }

    async fn health_check(&self) -> Result<HealthStatus, CairnError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), CairnError> {
        Ok(())
    }
}

#[async_trait]
impl GenerationAdapter for MockGenerator {
    async fn generate(&self, request: GenerationRequest) -> Result<GenerationResponse, CairnError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().await.push(request.prompt);

        match self.next_reply().await {
            MockReply::Text(text) => Ok(GenerationResponse { text }),
            MockReply::Error(message) => Err(CairnError::GenerationError { message, attempt: 0 }),
            MockReply::Delayed(delay, text) => {
                tokio::time::sleep(delay).await;
                Ok(GenerationResponse { text })
            }
        }
    }
}

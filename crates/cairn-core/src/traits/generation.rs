// SPDX-FileCopyrightText: 2026 Cairn Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Generation adapter trait for the external text-generation capability.

use async_trait::async_trait;

use crate::error::CairnError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{GenerationRequest, GenerationResponse};

/// Adapter for an opaque text-generation capability.
///
/// Implementations enforce `request.timeout` themselves and fail with
/// [`CairnError::GenerationTimeout`] or [`CairnError::GenerationError`].
/// The `attempt` field of those errors is filled in by the caller.
#[async_trait]
pub trait GenerationAdapter: PluginAdapter {
    /// Sends a prompt and returns the raw response text.
    async fn generate(&self, request: GenerationRequest) -> Result<GenerationResponse, CairnError>;
}

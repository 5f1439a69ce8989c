// SPDX-FileCopyrightText: 2026 Cairn Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bounded memory extraction from conversation history.
//!
//! The conversation is cut to a fixed window of trailing messages, filtered
//! to user and assistant turns, truncated per message, and handed to the
//! generation capability with a fixed instruction template. The response is
//! parsed defensively; unusable responses are retried with the failure reason
//! appended to the prompt, driven by [`RetryMachine`].

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use cairn_config::model::ExtractionConfig;
use cairn_core::error::CairnError;
use cairn_core::traits::GenerationAdapter;
use cairn_core::types::GenerationRequest;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::recording;
use crate::retry::{RetryEvent, RetryMachine, RetryState};
use crate::types::{ConversationMessage, Memory, MemoryCategory, MemoryMetadata, Role};

/// Appended to message content that was cut at the length ceiling.
pub const TRUNCATION_MARKER: &str = "... [truncated]";

/// Backoff before retrying after a generation failure (doubles per attempt).
const INITIAL_RETRY_DELAY_MS: u64 = 1_000;

/// Backoff ceiling for generation retries.
const MAX_RETRY_DELAY_MS: u64 = 30_000;

/// Instruction template. `{transcript}` is replaced with the formatted window.
const EXTRACTION_PROMPT: &str = r#"Extract knowledge from this conversation that would be worth remembering in future sessions.

Respond with a single JSON object of the form:
{"memories": [{"content": "...", "category": "...", "importance": 0.5, "tags": ["..."]}]}

For each memory:
- "content": the knowledge as a standalone statement
- "category": one of learning, decision, issue_solved, pattern, preference
- "importance": a number between 0 and 1
- "tags": short lowercase labels

If nothing is worth remembering, respond with {"memories": []}.
If you cannot perform the task, respond with {"error": "<reason>"}.

Conversation:
{transcript}

Respond with JSON only, no explanation:"#;

/// A memory proposed by the generation capability, after validation.
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryCandidate {
    pub content: String,
    pub category: MemoryCategory,
    pub importance: f64,
    pub tags: BTreeSet<String>,
}

impl MemoryCandidate {
    /// Mint a new memory (fresh id, current timestamp) from this candidate.
    pub fn into_memory(self, source: &str) -> Memory {
        Memory::new(
            self.content,
            self.category,
            MemoryMetadata {
                importance: self.importance,
                tags: self.tags,
                source: source.to_string(),
            },
        )
    }
}

/// Result of parsing one generation response.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseOutcome {
    /// The response held a memory list. Invalid candidates were dropped.
    Success(Vec<MemoryCandidate>),
    /// The response was unusable; asking again may help.
    RetryableFailure(String),
    /// The generator explicitly declined; asking again will not help.
    Fatal(String),
}

/// Cut `content` to at most `max_chars` characters, marker included.
///
/// Applying this twice yields the same string as applying it once.
pub fn truncate_content(content: &str, max_chars: usize) -> String {
    if content.chars().count() <= max_chars {
        return content.to_string();
    }

    let marker_len = TRUNCATION_MARKER.chars().count();
    if max_chars <= marker_len {
        return content.chars().take(max_chars).collect();
    }

    let mut out: String = content.chars().take(max_chars - marker_len).collect();
    out.push_str(TRUNCATION_MARKER);
    out
}

/// Select the trailing `max_messages` entries, keep user/assistant turns, and
/// render them as `User: ...` / `Assistant: ...` lines.
///
/// Entries before the window are dropped entirely.
pub fn format_transcript(
    history: &[ConversationMessage],
    max_messages: usize,
    max_content_length_chars: usize,
) -> String {
    let start = history.len().saturating_sub(max_messages);
    let mut transcript = String::new();
    for message in &history[start..] {
        let speaker = match message.role {
            Role::User => "User",
            Role::Assistant => "Assistant",
            Role::Other => continue,
        };
        let content = truncate_content(&message.content, max_content_length_chars);
        transcript.push_str(speaker);
        transcript.push_str(": ");
        transcript.push_str(&content);
        transcript.push('\n');
    }
    transcript
}

/// Build the generation prompt, appending the previous failure when retrying.
pub fn build_prompt(transcript: &str, feedback: Option<&str>) -> String {
    let mut prompt = EXTRACTION_PROMPT.replace("{transcript}", transcript.trim_end());
    if let Some(reason) = feedback {
        prompt.push_str("\n\nYour previous response could not be used: ");
        prompt.push_str(reason);
        prompt.push_str("\nRespond again with only the JSON object described above.");
    }
    prompt
}

/// Parse a raw generation response.
///
/// Tries the whole response as JSON first, then each balanced `{...}` block
/// inside it in order, until one holds a memory list or an explicit refusal.
pub fn parse_response(raw: &str) -> ParseOutcome {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return ParseOutcome::RetryableFailure("response was empty".to_string());
    }

    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        return interpret(value);
    }

    let mut last_failure = "response contained no JSON object".to_string();
    let mut from = 0;
    while let Some(found) = trimmed[from..].find('{') {
        let start = from + found;
        // Resume after this brace unless a valid block lets us skip past it whole.
        from = start + 1;
        let Some(block) = balanced_object(&trimmed[start..]) else {
            continue;
        };

        match serde_json::from_str::<Value>(block) {
            Ok(value) => match interpret(value) {
                ParseOutcome::RetryableFailure(reason) => {
                    last_failure = reason;
                    from = start + block.len();
                }
                outcome => return outcome,
            },
            Err(e) => last_failure = format!("embedded JSON block is invalid: {e}"),
        }
    }
    ParseOutcome::RetryableFailure(last_failure)
}

/// The balanced `{...}` block at the start of `text`, ignoring brackets inside strings.
fn balanced_object(text: &str) -> Option<&str> {
    let mut stack = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text.char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => stack.push('}'),
            '[' => stack.push(']'),
            '}' | ']' => {
                if stack.pop() != Some(ch) {
                    return None;
                }
                if stack.is_empty() {
                    return Some(&text[..offset + ch.len_utf8()]);
                }
            }
            _ => {}
        }
    }
    None
}

fn interpret(value: Value) -> ParseOutcome {
    match value {
        Value::Array(items) => ParseOutcome::Success(candidates(items)),
        Value::Object(mut map) => match map.remove("memories") {
            Some(Value::Array(items)) => ParseOutcome::Success(candidates(items)),
            Some(_) => ParseOutcome::RetryableFailure("`memories` must be an array".to_string()),
            None => match map.get("error") {
                Some(Value::String(reason)) => ParseOutcome::Fatal(reason.clone()),
                Some(other) => ParseOutcome::Fatal(other.to_string()),
                None => ParseOutcome::RetryableFailure(
                    "expected an object with a `memories` array".to_string(),
                ),
            },
        },
        _ => ParseOutcome::RetryableFailure("expected a JSON object".to_string()),
    }
}

fn candidates(items: Vec<Value>) -> Vec<MemoryCandidate> {
    let total = items.len();
    let kept: Vec<MemoryCandidate> = items.into_iter().filter_map(candidate).collect();
    if kept.len() < total {
        debug!(dropped = total - kept.len(), "dropped candidates without content");
    }
    kept
}

fn candidate(item: Value) -> Option<MemoryCandidate> {
    let Value::Object(map) = item else {
        return None;
    };

    let content = map.get("content")?.as_str()?.trim();
    if content.is_empty() {
        return None;
    }

    let category = map
        .get("category")
        .and_then(Value::as_str)
        .map(MemoryCategory::from_str_value)
        .unwrap_or(MemoryCategory::Learning);

    let importance = map
        .get("importance")
        .and_then(Value::as_f64)
        .map(|v| v.clamp(0.0, 1.0))
        .unwrap_or(MemoryMetadata::DEFAULT_IMPORTANCE);

    let tags = match map.get("tags") {
        Some(Value::Array(tags)) => tags
            .iter()
            .filter_map(Value::as_str)
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect(),
        Some(Value::String(tag)) if !tag.trim().is_empty() => {
            BTreeSet::from([tag.trim().to_string()])
        }
        _ => BTreeSet::new(),
    };

    Some(MemoryCandidate {
        content: content.to_string(),
        category,
        importance,
        tags,
    })
}

/// Extracts memories from conversation history through a generation capability.
pub struct MemoryExtractor {
    generator: Arc<dyn GenerationAdapter>,
    config: ExtractionConfig,
    retry_base_delay: Duration,
}

impl MemoryExtractor {
    pub fn new(generator: Arc<dyn GenerationAdapter>, config: ExtractionConfig) -> Self {
        Self {
            generator,
            config,
            retry_base_delay: Duration::from_millis(INITIAL_RETRY_DELAY_MS),
        }
    }

    /// Override the backoff applied after a failed generation call.
    pub fn with_retry_backoff(mut self, base: Duration) -> Self {
        self.retry_base_delay = base;
        self
    }

    pub fn config(&self) -> &ExtractionConfig {
        &self.config
    }

    /// Format the bounded transcript for `history`.
    pub fn prepare(&self, history: &[ConversationMessage]) -> String {
        format_transcript(
            history,
            self.config.max_messages,
            self.config.max_content_length_chars,
        )
    }

    /// Extract memories from `history`. Nothing is persisted.
    pub async fn extract(
        &self,
        history: &[ConversationMessage],
        cancel: &CancellationToken,
    ) -> Result<Vec<Memory>, CairnError> {
        let transcript = self.prepare(history);
        self.extract_transcript(&transcript, cancel).await
    }

    /// Extract memories from an already formatted transcript.
    pub async fn extract_transcript(
        &self,
        transcript: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<Memory>, CairnError> {
        let candidates = self.extract_candidates(transcript, cancel).await?;
        let memories: Vec<Memory> = candidates
            .into_iter()
            .map(|c| c.into_memory(&self.config.source))
            .collect();
        recording::record_memories_extracted(memories.len());
        info!(count = memories.len(), "extracted memories");
        Ok(memories)
    }

    /// Run the generate/parse/retry loop and return validated candidates.
    ///
    /// Fails with [`CairnError::ExtractionFailed`] when every attempt produced
    /// unusable output, or with the last generation error when the final
    /// attempt could not reach the generator.
    pub async fn extract_candidates(
        &self,
        transcript: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<MemoryCandidate>, CairnError> {
        if transcript.trim().is_empty() {
            debug!("empty extraction window, skipping generation");
            return Ok(Vec::new());
        }

        let mut machine = RetryMachine::new(self.config.max_attempts);
        let mut feedback: Option<String> = None;
        let mut last_generation_error: Option<CairnError> = None;
        let mut parsed: Vec<MemoryCandidate> = Vec::new();

        loop {
            match machine.state().clone() {
                RetryState::Attempting { attempt } => {
                    if cancel.is_cancelled() {
                        return Err(CairnError::cancelled("extraction"));
                    }
                    let prompt = build_prompt(transcript, feedback.as_deref());
                    let event = match self.generate_once(prompt, attempt, cancel).await {
                        Ok(raw) => {
                            last_generation_error = None;
                            match parse_response(&raw) {
                                ParseOutcome::Success(candidates) => {
                                    recording::record_extraction_attempt("parsed");
                                    parsed = candidates;
                                    RetryEvent::Succeeded
                                }
                                ParseOutcome::RetryableFailure(reason) => {
                                    recording::record_extraction_attempt("malformed");
                                    warn!(attempt, reason = %reason, "unusable generation output");
                                    debug!(raw = %raw, "raw generation output");
                                    RetryEvent::Failed {
                                        reason,
                                        retryable: true,
                                    }
                                }
                                ParseOutcome::Fatal(reason) => {
                                    recording::record_extraction_attempt("declined");
                                    warn!(attempt, reason = %reason, "generator declined extraction");
                                    RetryEvent::Failed {
                                        reason: format!("generator declined: {reason}"),
                                        retryable: false,
                                    }
                                }
                            }
                        }
                        Err(e) if e.is_cancelled() => return Err(e),
                        Err(
                            e @ (CairnError::GenerationTimeout { .. }
                            | CairnError::GenerationError { .. }),
                        ) => {
                            warn!(attempt, error = %e, "generation attempt failed");
                            let reason = e.to_string();
                            last_generation_error = Some(e);
                            RetryEvent::Failed {
                                reason,
                                retryable: true,
                            }
                        }
                        Err(e) => return Err(e),
                    };
                    machine.apply(event);
                }
                RetryState::RetryingWithFeedback { attempt, reason } => {
                    if last_generation_error.is_some() {
                        self.backoff(attempt, cancel).await?;
                    } else {
                        feedback = Some(reason);
                    }
                    machine.apply(RetryEvent::Resumed);
                }
                RetryState::Succeeded { attempts } => {
                    debug!(attempts, candidates = parsed.len(), "extraction parsed");
                    return Ok(parsed);
                }
                RetryState::Exhausted { attempts, reason } => {
                    if let Some(e) = last_generation_error {
                        return Err(e);
                    }
                    return Err(CairnError::ExtractionFailed { attempts, reason });
                }
            }
        }
    }

    async fn generate_once(
        &self,
        prompt: String,
        attempt: u32,
        cancel: &CancellationToken,
    ) -> Result<String, CairnError> {
        let timeout = Duration::from_secs(self.config.generation_timeout_secs);
        let request = GenerationRequest { prompt, timeout };
        let started = Instant::now();

        let result = tokio::select! {
            _ = cancel.cancelled() => return Err(CairnError::cancelled("extraction")),
            result = tokio::time::timeout(timeout, self.generator.generate(request)) => result,
        };
        recording::record_generation_latency(started.elapsed().as_secs_f64());

        // Adapter errors are re-stamped with the extraction attempt number.
        match result {
            Ok(Ok(response)) => Ok(response.text),
            Ok(Err(CairnError::GenerationError { message, .. })) => {
                recording::record_extraction_attempt("error");
                Err(CairnError::GenerationError { message, attempt })
            }
            Ok(Err(CairnError::GenerationTimeout { .. })) | Err(_) => {
                recording::record_extraction_attempt("timeout");
                Err(CairnError::GenerationTimeout { timeout, attempt })
            }
            Ok(Err(e)) => Err(e),
        }
    }

    async fn backoff(&self, attempt: u32, cancel: &CancellationToken) -> Result<(), CairnError> {
        let max = Duration::from_millis(MAX_RETRY_DELAY_MS);
        let delay = self
            .retry_base_delay
            .saturating_mul(1u32 << attempt.saturating_sub(1).min(16))
            .min(max);
        debug!(attempt, delay_ms = delay.as_millis() as u64, "backing off before next generation attempt");
        tokio::select! {
            _ = cancel.cancelled() => Err(CairnError::cancelled("extraction")),
            _ = tokio::time::sleep(delay) => Ok(()),
        }
    }
}

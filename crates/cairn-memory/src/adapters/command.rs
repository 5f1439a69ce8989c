// SPDX-FileCopyrightText: 2026 Cairn Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Generation adapter that runs an external assistant CLI.
//!
//! The prompt is written to the child's stdin and its stdout is the
//! response. The child is killed if it outlives the request timeout.

use std::process::Stdio;

use async_trait::async_trait;
use cairn_config::model::GenerationConfig;
use cairn_core::error::CairnError;
use cairn_core::traits::{GenerationAdapter, PluginAdapter};
use cairn_core::types::{AdapterType, GenerationRequest, GenerationResponse, HealthStatus};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

/// Runs `program args...` once per generation request.
#[derive(Debug, Clone)]
pub struct CommandGenerator {
    program: String,
    args: Vec<String>,
}

impl CommandGenerator {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Build from `[generation]` configuration.
    pub fn from_config(config: &GenerationConfig) -> Result<Self, CairnError> {
        let program = config
            .command
            .as_deref()
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| CairnError::Config("generation.command is not set".to_string()))?;
        Ok(Self::new(program, config.args.clone()))
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    fn failure(&self, message: impl std::fmt::Display) -> CairnError {
        CairnError::GenerationError {
            message: format!("{}: {message}", self.program),
            attempt: 0,
        }
    }
}

#[async_trait]
impl PluginAdapter for CommandGenerator {
    fn name(&self) -> &str {
        "command"
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
impl GenerationAdapter for CommandGenerator {
    async fn generate(&self, request: GenerationRequest) -> Result<GenerationResponse, CairnError> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| self.failure(format!("failed to spawn: {e}")))?;

        // Feed stdin concurrently so a child that writes before reading cannot deadlock.
        if let Some(mut stdin) = child.stdin.take() {
            let prompt = request.prompt;
            tokio::spawn(async move {
                if let Err(e) = stdin.write_all(prompt.as_bytes()).await {
                    debug!(error = %e, "generator closed stdin early");
                }
            });
        }

        let output = match tokio::time::timeout(request.timeout, child.wait_with_output()).await {
            Ok(result) => result.map_err(|e| self.failure(format!("failed to wait: {e}")))?,
            Err(_) => {
                return Err(CairnError::GenerationTimeout {
                    timeout: request.timeout,
                    attempt: 0,
                });
            }
        };

        if !output.status.success() {
            let code = output.status.code().unwrap_or(-1);
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(self.failure(format!("exit code {code}: {}", stderr.trim())));
        }

        let text = String::from_utf8_lossy(&output.stdout).into_owned();
        debug!(program = %self.program, bytes = text.len(), "generation command finished");
        Ok(GenerationResponse { text })
    }
}

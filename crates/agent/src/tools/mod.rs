//! Tool registry and the capability bundles agents are bound to.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::llm::ToolDefinition;

pub mod awx;
pub mod endpoint;
pub mod github;

/// Tool output above this size is cut before it reaches the model.
pub const MAX_TOOL_OUTPUT_BYTES: usize = 16 * 1024;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ToolOutput {
    pub content: String,
    pub is_error: bool,
}

impl ToolOutput {
    pub fn success(content: impl Into<String>) -> Self {
        Self { content: content.into(), is_error: false }
    }

    pub fn error(content: impl Into<String>) -> Self {
        Self { content: content.into(), is_error: true }
    }

    pub fn json(value: &Value) -> Self {
        Self::success(value.to_string())
    }

    /// Cuts content to `max_bytes` on a char boundary and appends a marker.
    pub fn truncated(mut self, max_bytes: usize) -> Self {
        if max_bytes == 0 || self.content.len() <= max_bytes {
            return self;
        }
        let mut cut = max_bytes;
        while cut > 0 && !self.content.is_char_boundary(cut) {
            cut -= 1;
        }
        let omitted = self.content.len() - cut;
        self.content.truncate(cut);
        self.content.push_str(&format!("\n\n[truncated: {omitted} bytes omitted]"));
        self
    }
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),
    #[error("{service} returned HTTP {status}: {body}")]
    Status { service: &'static str, status: u16, body: String },
    #[error("{service} request failed: {source}")]
    Transport {
        service: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("{service} request failed: {detail}")]
    Upstream { service: &'static str, detail: String },
    #[error("{service} returned a malformed response: {detail}")]
    MalformedResponse { service: &'static str, detail: String },
    #[error("{0}")]
    Rejected(String),
    #[error("filesystem error: {0}")]
    Io(#[from] std::io::Error),
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn definition(&self) -> ToolDefinition;

    /// Performs exactly one external operation.
    async fn execute(&self, arguments: Value) -> Result<ToolOutput, ToolError>;
}

/// A named set of tools. Invocation never fails: every problem comes back
/// as error text the calling agent can reason about.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<T>(&mut self, tool: T)
    where
        T: Tool + 'static,
    {
        self.register_shared(Arc::new(tool));
    }

    pub fn register_shared(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.definition().name;
        if self.tools.insert(name.clone(), tool).is_some() {
            warn!(event_name = "agent.tools.duplicate", tool = %name, "tool registered twice");
        }
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(String::as_str).collect()
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.values().map(|tool| tool.definition()).collect()
    }

    pub async fn invoke(&self, name: &str, arguments: Value) -> ToolOutput {
        let Some(tool) = self.tools.get(name) else {
            return ToolOutput::error(format!(
                "Unknown tool `{name}`. Available tools: {}",
                self.names().join(", ")
            ));
        };

        let definition = tool.definition();
        if let Err(message) = validate_arguments(&definition.parameters, &arguments) {
            debug!(event_name = "agent.tools.invalid_arguments", tool = name, %message);
            return ToolOutput::error(message);
        }

        match tool.execute(arguments).await {
            Ok(output) => output.truncated(MAX_TOOL_OUTPUT_BYTES),
            Err(error) => {
                warn!(
                    event_name = "agent.tools.failed",
                    tool = name,
                    error = %error,
                    "tool invocation failed"
                );
                ToolOutput::error(format!("Tool `{name}` failed: {error}"))
                    .truncated(MAX_TOOL_OUTPUT_BYTES)
            }
        }
    }
}

/// Structural check of tool arguments against the declared JSON schema.
pub fn validate_arguments(schema: &Value, arguments: &Value) -> Result<(), String> {
    let validator = match jsonschema::validator_for(schema) {
        Ok(validator) => validator,
        Err(error) => {
            warn!(error = %error, "invalid tool schema, skipping validation");
            return Ok(());
        }
    };

    let errors: Vec<String> = validator.iter_errors(arguments).map(|e| e.to_string()).collect();
    if errors.is_empty() {
        Ok(())
    } else {
        Err(format!("Input validation failed: {}", errors.join("; ")))
    }
}

//! Scripted fakes for the model, tool, and REST seams.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::events::EventSink;
use crate::llm::{Completion, CompletionRequest, LlmClient, LlmError, ToolCall, ToolDefinition};
use crate::tools::endpoint::{ApiClient, ApiRequest};
use crate::tools::{Tool, ToolError, ToolOutput};

/// Replays queued completions in order and records every request.
/// Text is streamed word by word before being returned.
#[derive(Default)]
pub struct ScriptedLlm {
    script: Mutex<VecDeque<Result<Completion, LlmError>>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedLlm {
    pub fn new(completions: Vec<Completion>) -> Self {
        Self {
            script: Mutex::new(completions.into_iter().map(Ok).collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn with_texts(texts: Vec<&str>) -> Self {
        Self::new(texts.into_iter().map(Completion::text).collect())
    }

    pub fn push_error(&self, error: LlmError) {
        self.script.lock().expect("script lock").push_back(Err(error));
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().expect("requests lock").clone()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    async fn complete(
        &self,
        request: CompletionRequest,
        events: &EventSink,
    ) -> Result<Completion, LlmError> {
        self.requests.lock().expect("requests lock").push(request);
        let next = self.script.lock().expect("script lock").pop_front();
        let completion = next.unwrap_or_else(|| Err(LlmError::Stream("script exhausted".into())))?;
        for word in completion.text.split_inclusive(' ') {
            events.token(word);
        }
        Ok(completion)
    }
}

pub fn call(id: &str, name: &str, arguments: Value) -> ToolCall {
    ToolCall { id: id.to_string(), name: name.to_string(), arguments }
}

/// A tool with a fixed schema and a fixed answer.
pub struct StaticTool {
    name: &'static str,
    parameters: Value,
    response: Option<String>,
}

impl StaticTool {
    pub fn new(name: &'static str, parameters: Value, response: &str) -> Self {
        Self { name, parameters, response: Some(response.to_string()) }
    }

    pub fn failing(name: &'static str) -> Self {
        Self {
            name,
            parameters: json!({ "type": "object", "properties": {} }),
            response: None,
        }
    }
}

#[async_trait]
impl Tool for StaticTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name.to_string(),
            description: format!("static {}", self.name),
            parameters: self.parameters.clone(),
        }
    }

    async fn execute(&self, _arguments: Value) -> Result<ToolOutput, ToolError> {
        match &self.response {
            Some(response) => Ok(ToolOutput::success(response.clone())),
            None => Err(ToolError::Status {
                service: "awx",
                status: 502,
                body: "bad gateway".to_string(),
            }),
        }
    }
}

/// Records outgoing REST requests and answers each with the same value.
pub struct RecordingApi {
    response: Value,
    requests: Mutex<Vec<ApiRequest>>,
}

impl RecordingApi {
    pub fn returning(response: Value) -> Self {
        Self { response, requests: Mutex::new(Vec::new()) }
    }

    pub fn requests(&self) -> Vec<ApiRequest> {
        self.requests.lock().expect("requests lock").clone()
    }
}

#[async_trait]
impl ApiClient for RecordingApi {
    fn service(&self) -> &'static str {
        "test"
    }

    async fn send(&self, request: ApiRequest) -> Result<Value, ToolError> {
        self.requests.lock().expect("requests lock").push(request);
        Ok(self.response.clone())
    }
}

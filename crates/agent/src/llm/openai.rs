use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{Stream, StreamExt};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use awxchat_core::config::LlmConfig;

use super::{
    ChatMessage, Completion, CompletionRequest, FinishReason, LlmClient, LlmError, MessageRole,
    ToolCall,
};
use crate::events::EventSink;

const BASE_BACKOFF: Duration = Duration::from_millis(500);
const MAX_BACKOFF: Duration = Duration::from_secs(8);

/// Streaming client for any endpoint speaking the OpenAI chat-completions
/// protocol (OpenAI, OpenRouter, Ollama).
#[derive(Clone)]
pub struct OpenAiCompatibleClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<SecretString>,
    model: String,
    max_retries: u32,
}

impl OpenAiCompatibleClient {
    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .map_err(|error| LlmError::Configuration(error.to_string()))?;

        Ok(Self {
            http,
            base_url: config.effective_base_url(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            max_retries: config.max_retries,
        })
    }

    /// Same endpoint and credentials, different model.
    pub fn with_model(&self, model: impl Into<String>) -> Self {
        Self { model: model.into(), ..self.clone() }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    async fn open_stream(&self, body: &Value) -> Result<reqwest::Response, LlmError> {
        let mut attempt = 0u32;
        loop {
            match self.send_once(body).await {
                Ok(response) => return Ok(response),
                Err(error) if error.is_retryable() && attempt < self.max_retries => {
                    let delay = backoff(attempt);
                    warn!(
                        event_name = "llm.request.retry",
                        model = %self.model,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "retrying model request"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(error) => return Err(error),
            }
        }
    }

    async fn send_once(&self, body: &Value) -> Result<reqwest::Response, LlmError> {
        let mut request = self.http.post(self.endpoint()).json(body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key.expose_secret());
        }

        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let text = response.text().await.unwrap_or_default();
        Err(LlmError::Api { status: status.as_u16(), message: api_error_message(&text) })
    }
}

#[async_trait]
impl LlmClient for OpenAiCompatibleClient {
    async fn complete(
        &self,
        request: CompletionRequest,
        events: &EventSink,
    ) -> Result<Completion, LlmError> {
        let body = build_request_body(&self.model, &request);
        debug!(
            event_name = "llm.request.started",
            model = %self.model,
            messages = request.messages.len(),
            tools = request.tools.len(),
            structured = request.output.is_some(),
            "sending model request"
        );

        let response = self.open_stream(&body).await?;
        let completion = parse_sse_stream(response.bytes_stream(), events).await?;

        debug!(
            event_name = "llm.request.completed",
            model = %self.model,
            finish_reason = ?completion.finish_reason,
            tool_calls = completion.tool_calls.len(),
            "model request completed"
        );
        Ok(completion)
    }
}

fn backoff(attempt: u32) -> Duration {
    BASE_BACKOFF.saturating_mul(1u32.checked_shl(attempt).unwrap_or(u32::MAX)).min(MAX_BACKOFF)
}

fn api_error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|value| value.pointer("/error/message").and_then(Value::as_str).map(str::to_owned))
        .unwrap_or_else(|| body.chars().take(500).collect())
}

pub(crate) fn build_request_body(model: &str, request: &CompletionRequest) -> Value {
    let mut messages = Vec::with_capacity(request.messages.len() + 1);
    if !request.system.is_empty() {
        messages.push(json!({ "role": "system", "content": request.system }));
    }
    messages.extend(request.messages.iter().map(message_json));

    let mut body = json!({
        "model": model,
        "messages": messages,
        "stream": true,
    });

    if !request.tools.is_empty() {
        body["tools"] = request
            .tools
            .iter()
            .map(|tool| {
                json!({
                    "type": "function",
                    "function": {
                        "name": tool.name,
                        "description": tool.description,
                        "parameters": tool.parameters,
                    }
                })
            })
            .collect();
    }

    if let Some(output) = &request.output {
        body["response_format"] = json!({
            "type": "json_schema",
            "json_schema": {
                "name": output.name,
                "schema": output.schema,
                "strict": true,
            }
        });
    }

    body
}

fn message_json(message: &ChatMessage) -> Value {
    match message.role {
        MessageRole::User => json!({ "role": "user", "content": message.content }),
        MessageRole::Tool => json!({
            "role": "tool",
            "tool_call_id": message.tool_call_id.clone().unwrap_or_default(),
            "content": message.content,
        }),
        MessageRole::Assistant if message.tool_calls.is_empty() => {
            json!({ "role": "assistant", "content": message.content })
        }
        MessageRole::Assistant => {
            let calls: Vec<Value> = message
                .tool_calls
                .iter()
                .map(|call| {
                    json!({
                        "id": call.id,
                        "type": "function",
                        "function": {
                            "name": call.name,
                            "arguments": call.arguments.to_string(),
                        }
                    })
                })
                .collect();
            let content =
                if message.content.is_empty() { Value::Null } else { json!(message.content) };
            json!({ "role": "assistant", "content": content, "tool_calls": calls })
        }
    }
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    error: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: Option<StreamDelta>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<ToolCallDelta>,
}

#[derive(Debug, Deserialize)]
struct ToolCallDelta {
    #[serde(default)]
    index: usize,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<FunctionDelta>,
}

#[derive(Debug, Deserialize)]
struct FunctionDelta {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

#[derive(Default)]
struct PartialToolCall {
    id: String,
    name: String,
    arguments: String,
}

#[derive(Default)]
struct StreamState {
    text: String,
    tool_calls: BTreeMap<usize, PartialToolCall>,
    finish_reason: Option<FinishReason>,
    done: bool,
}

impl StreamState {
    fn apply(&mut self, data: &str, events: &EventSink) -> Result<(), LlmError> {
        if data == "[DONE]" {
            self.done = true;
            return Ok(());
        }

        let chunk: StreamChunk = serde_json::from_str(data)
            .map_err(|error| LlmError::Stream(format!("undecodable chunk: {error}")))?;

        if let Some(error) = chunk.error {
            let message = error
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_owned)
                .unwrap_or_else(|| error.to_string());
            let status = error
                .get("code")
                .and_then(Value::as_u64)
                .and_then(|code| u16::try_from(code).ok())
                .unwrap_or(500);
            return Err(LlmError::Api { status, message });
        }

        for choice in chunk.choices {
            if let Some(delta) = choice.delta {
                if let Some(content) = delta.content {
                    events.token(&content);
                    self.text.push_str(&content);
                }
                for call in delta.tool_calls {
                    let partial = self.tool_calls.entry(call.index).or_default();
                    if let Some(id) = call.id {
                        partial.id = id;
                    }
                    if let Some(function) = call.function {
                        if let Some(name) = function.name {
                            partial.name.push_str(&name);
                        }
                        if let Some(arguments) = function.arguments {
                            partial.arguments.push_str(&arguments);
                        }
                    }
                }
            }
            if let Some(reason) = choice.finish_reason {
                self.finish_reason = Some(match reason.as_str() {
                    "stop" => FinishReason::Stop,
                    "tool_calls" | "function_call" => FinishReason::ToolCalls,
                    "length" => FinishReason::Length,
                    _ => FinishReason::Other,
                });
            }
        }
        Ok(())
    }

    fn into_completion(self) -> Completion {
        let tool_calls: Vec<ToolCall> = self
            .tool_calls
            .into_iter()
            .map(|(index, partial)| {
                let arguments = if partial.arguments.trim().is_empty() {
                    json!({})
                } else {
                    serde_json::from_str(&partial.arguments).unwrap_or_else(|error| {
                        warn!(
                            event_name = "llm.tool_call.malformed_arguments",
                            tool = %partial.name,
                            error = %error,
                            "tool call arguments were not valid json"
                        );
                        json!({})
                    })
                };
                let id =
                    if partial.id.is_empty() { format!("call_{index}") } else { partial.id };
                ToolCall { id, name: partial.name, arguments }
            })
            .collect();

        let finish_reason = self.finish_reason.unwrap_or(if tool_calls.is_empty() {
            FinishReason::Stop
        } else {
            FinishReason::ToolCalls
        });

        Completion { text: self.text, tool_calls, finish_reason }
    }
}

/// Consumes a `text/event-stream` body of chat-completion chunks.
pub(crate) async fn parse_sse_stream<S, B, E>(
    stream: S,
    events: &EventSink,
) -> Result<Completion, LlmError>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: std::fmt::Display,
{
    let mut state = StreamState::default();
    let mut buffer: Vec<u8> = Vec::new();
    tokio::pin!(stream);

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|error| LlmError::Stream(error.to_string()))?;
        buffer.extend(chunk.as_ref().iter().copied().filter(|byte| *byte != b'\r'));

        while let Some(end) = find_event_boundary(&buffer) {
            let raw: Vec<u8> = buffer.drain(..end + 2).collect();
            let event = String::from_utf8_lossy(&raw[..end]);
            for data in event_data(&event) {
                state.apply(&data, events)?;
            }
            if state.done {
                return Ok(state.into_completion());
            }
        }
    }

    if !buffer.is_empty() {
        let event = String::from_utf8_lossy(&buffer).into_owned();
        for data in event_data(&event) {
            state.apply(&data, events)?;
        }
    }

    Ok(state.into_completion())
}

fn find_event_boundary(buffer: &[u8]) -> Option<usize> {
    buffer.windows(2).position(|window| window == b"\n\n")
}

fn event_data(event: &str) -> Vec<String> {
    event
        .lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|data| data.trim().to_string())
        .filter(|data| !data.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use std::convert::Infallible;

    use serde_json::json;

    use super::{build_request_body, parse_sse_stream};
    use crate::events::{EventSink, StreamEvent};
    use crate::llm::{
        ChatMessage, CompletionRequest, FinishReason, LlmError, OutputSchema, ToolCall,
        ToolDefinition,
    };

    fn chunks(parts: &[&str]) -> impl futures_util::Stream<Item = Result<Vec<u8>, Infallible>> {
        let owned: Vec<Result<Vec<u8>, Infallible>> =
            parts.iter().map(|part| Ok(part.as_bytes().to_vec())).collect();
        futures_util::stream::iter(owned)
    }

    #[tokio::test]
    async fn text_deltas_are_streamed_and_accumulated() {
        let (sink, mut receiver) = EventSink::channel();
        let stream = chunks(&[
            "data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"lo\"},\"finish_reason\":\"stop\"}]}\r\n\r\n",
            "data: [DONE]\n\n",
        ]);

        let completion = parse_sse_stream(stream, &sink).await.expect("stream parses");

        assert_eq!(completion.text, "Hello");
        assert_eq!(completion.finish_reason, FinishReason::Stop);
        assert_eq!(receiver.try_recv().ok(), Some(StreamEvent::Token("Hel".to_string())));
        assert_eq!(receiver.try_recv().ok(), Some(StreamEvent::Token("lo".to_string())));
    }

    #[tokio::test]
    async fn tool_call_fragments_split_across_chunks_are_joined() {
        let stream = chunks(&[
            "data: {\"choices\":[{\"delta\":{\"tool_calls\":[{\"index\":0,\"id\":\"call_1\",\"function\":{\"name\":\"list_jobs\",\"arguments\":\"{\\\"sta\"}}]}}]}\n",
            "\ndata: {\"choices\":[{\"delta\":{\"tool_calls\":[{\"index\":0,\"function\":{\"arguments\":\"tus\\\":\\\"failed\\\"}\"}}]},\"finish_reason\":\"tool_calls\"}]}\n\n",
            "data: [DONE]\n\n",
        ]);

        let completion =
            parse_sse_stream(stream, &EventSink::disabled()).await.expect("stream parses");

        assert_eq!(completion.finish_reason, FinishReason::ToolCalls);
        assert_eq!(
            completion.tool_calls,
            vec![ToolCall {
                id: "call_1".to_string(),
                name: "list_jobs".to_string(),
                arguments: json!({"status": "failed"}),
            }]
        );
    }

    #[tokio::test]
    async fn malformed_tool_arguments_fall_back_to_empty_object() {
        let stream = chunks(&[
            "data: {\"choices\":[{\"delta\":{\"tool_calls\":[{\"index\":0,\"id\":\"c\",\"function\":{\"name\":\"ping\",\"arguments\":\"{not json\"}}]}}]}\n\n",
        ]);

        let completion =
            parse_sse_stream(stream, &EventSink::disabled()).await.expect("stream parses");

        assert_eq!(completion.tool_calls[0].arguments, json!({}));
        assert_eq!(completion.finish_reason, FinishReason::ToolCalls);
    }

    #[tokio::test]
    async fn error_chunk_becomes_api_error() {
        let stream = chunks(&["data: {\"error\":{\"message\":\"overloaded\",\"code\":503}}\n\n"]);

        let error = parse_sse_stream(stream, &EventSink::disabled())
            .await
            .expect_err("error chunk should fail");

        assert!(error.to_string().contains("overloaded"));
        assert!(error.is_retryable());
    }

    #[tokio::test]
    async fn out_of_range_error_code_maps_to_server_error() {
        let stream = chunks(&["data: {\"error\":{\"message\":\"bad\",\"code\":65936}}\n\n"]);

        let error = parse_sse_stream(stream, &EventSink::disabled())
            .await
            .expect_err("error chunk should fail");

        assert!(matches!(error, LlmError::Api { status: 500, .. }), "{error:?}");
    }

    #[test]
    fn request_body_carries_tools_schema_and_tool_history() {
        let request = CompletionRequest {
            system: "be brief".to_string(),
            messages: vec![
                ChatMessage::user("ping awx"),
                ChatMessage::assistant_tool_calls(
                    "",
                    vec![ToolCall {
                        id: "call_9".to_string(),
                        name: "ping".to_string(),
                        arguments: json!({}),
                    }],
                ),
                ChatMessage::tool_result("call_9", "{\"ha\":false}"),
            ],
            tools: vec![ToolDefinition {
                name: "ping".to_string(),
                description: "Ping the controller".to_string(),
                parameters: json!({"type": "object", "properties": {}}),
            }],
            output: Some(OutputSchema {
                name: "reply",
                schema: json!({"type": "object"}),
            }),
        };

        let body = build_request_body("gpt-4o-mini", &request);

        assert_eq!(body["stream"], json!(true));
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][2]["content"], serde_json::Value::Null);
        assert_eq!(body["messages"][2]["tool_calls"][0]["function"]["arguments"], "{}");
        assert_eq!(body["messages"][3]["tool_call_id"], "call_9");
        assert_eq!(body["tools"][0]["function"]["name"], "ping");
        assert_eq!(body["response_format"]["json_schema"]["strict"], json!(true));
    }
}

//! Deterministic model and runtime wiring for route tests.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use awxchat_agent::events::EventSink;
use awxchat_agent::guardrails::{GuardrailGate, LlmClassifier};
use awxchat_agent::llm::{
    Completion, CompletionRequest, LlmClient, LlmError, MessageRole, ToolCall,
};
use awxchat_agent::tools::ToolRegistry;
use awxchat_agent::{AgentRuntime, ConversationStore, Orchestrator};
use awxchat_db::InMemoryConversationRepository;

use crate::state::AppState;

pub const ANSWER: &str = "Your AWX controller is healthy.";

/// Routes on message keywords:
/// - "weather" is refused by the guardrail
/// - "explode" makes the leader fail
/// - "ping" makes the leader call a tool once before answering
pub struct KeywordModel;

#[async_trait]
impl LlmClient for KeywordModel {
    async fn complete(
        &self,
        request: CompletionRequest,
        events: &EventSink,
    ) -> Result<Completion, LlmError> {
        let last = request.messages.last().cloned();
        let text = last.as_ref().map(|message| message.content.clone()).unwrap_or_default();

        if request.output.as_ref().is_some_and(|output| output.name == "guardrail_verdict") {
            let valid = !text.contains("weather");
            return Ok(Completion::text(
                json!({ "is_valid_request": valid, "reasoning": "keyword check" }).to_string(),
            ));
        }
        if text.contains("explode") {
            return Err(LlmError::Api { status: 502, message: "bad gateway".to_string() });
        }
        let after_tool = last.is_some_and(|message| message.role == MessageRole::Tool);
        if text.contains("ping") && !after_tool {
            return Ok(Completion::tool_calls(vec![ToolCall {
                id: "call-1".to_string(),
                name: "ping_awx".to_string(),
                arguments: json!({}),
            }]));
        }

        let answer = json!({ "explanation": ANSWER }).to_string();
        events.token(&answer);
        Ok(Completion::text(answer))
    }
}

pub fn runtime() -> Arc<AgentRuntime> {
    let llm: Arc<dyn LlmClient> = Arc::new(KeywordModel);
    let store = ConversationStore::new(Arc::new(InMemoryConversationRepository::default()));
    let gate = GuardrailGate::new(
        Arc::new(LlmClassifier::new(llm.clone())),
        6,
        Duration::from_secs(5),
    );
    let orchestrator =
        Orchestrator::new(llm, ToolRegistry::new(), 40).expect("scope patterns compile");
    Arc::new(AgentRuntime::new(store, gate, orchestrator))
}

pub fn state() -> AppState {
    AppState::new(runtime())
}

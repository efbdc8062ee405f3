use tracing::{info, warn};
use uuid::Uuid;

use awxchat_core::{AgentReply, DomainError, Turn};

use crate::conversation::ConversationStore;
use crate::error::AgentError;
use crate::events::EventSink;
use crate::guardrails::{GateDecision, GuardrailGate, GuardrailVerdict, REFUSAL_MESSAGE};
use crate::orchestrator::Orchestrator;

/// One user message entering the system from any transport.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TurnRequest {
    pub user_id: String,
    pub content: String,
    pub correlation_id: String,
}

impl TurnRequest {
    pub fn new(user_id: impl Into<String>, content: impl Into<String>) -> Result<Self, DomainError> {
        let user_id = user_id.into();
        let content = content.into();
        if user_id.trim().is_empty() {
            return Err(DomainError::EmptyUserId);
        }
        if content.trim().is_empty() {
            return Err(DomainError::EmptyMessage);
        }
        Ok(Self { user_id, content, correlation_id: Uuid::new_v4().to_string() })
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = correlation_id.into();
        self
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum TurnOutcome {
    Answered {
        reply: AgentReply,
        agent: &'static str,
        tool_calls: Vec<String>,
        persisted: bool,
    },
    Blocked {
        reply: AgentReply,
        verdict: GuardrailVerdict,
        persisted: bool,
    },
}

impl TurnOutcome {
    pub fn reply(&self) -> &AgentReply {
        match self {
            Self::Answered { reply, .. } | Self::Blocked { reply, .. } => reply,
        }
    }

    pub fn is_blocked(&self) -> bool {
        matches!(self, Self::Blocked { .. })
    }
}

/// History, gate, and orchestrator wired into the per-turn pipeline.
/// Shared by every transport; each turn runs independently.
pub struct AgentRuntime {
    store: ConversationStore,
    gate: GuardrailGate,
    orchestrator: Orchestrator,
}

impl AgentRuntime {
    pub fn new(store: ConversationStore, gate: GuardrailGate, orchestrator: Orchestrator) -> Self {
        Self { store, gate, orchestrator }
    }

    pub fn store(&self) -> &ConversationStore {
        &self.store
    }

    /// Stored history for display, tool payloads stripped.
    pub async fn history(&self, user_id: &str) -> Vec<Turn> {
        self.store.read(user_id).await.iter().map(Turn::summary).collect()
    }

    /// Runs one turn: history read, guardrail, orchestration, persistence.
    /// On failure the stored history is left untouched.
    pub async fn handle_turn(
        &self,
        request: TurnRequest,
        events: &EventSink,
    ) -> Result<TurnOutcome, AgentError> {
        let TurnRequest { user_id, content, correlation_id } = request;
        let history = self.store.read(&user_id).await;
        info!(
            event_name = "agent.turn.started",
            correlation_id = %correlation_id,
            user_id = %user_id,
            history_turns = history.len(),
            "turn started"
        );

        if let GateDecision::Reject(verdict) =
            self.gate.check(&history, &content, &correlation_id).await
        {
            let reply = AgentReply::from_explanation(REFUSAL_MESSAGE);
            let persisted = self
                .persist(&user_id, history, &content, reply.to_assistant_turn())
                .await;
            info!(
                event_name = "agent.turn.guardrail_rejected",
                correlation_id = %correlation_id,
                user_id = %user_id,
                reasoning = %verdict.reasoning,
                persisted,
                "turn rejected by guardrail"
            );
            return Ok(TurnOutcome::Blocked { reply, verdict, persisted });
        }

        let result = match self
            .orchestrator
            .run(&user_id, &history, &content, events, &correlation_id)
            .await
        {
            Ok(result) => result,
            Err(error) => {
                warn!(
                    event_name = "agent.turn.failed",
                    correlation_id = %correlation_id,
                    user_id = %user_id,
                    error = %error,
                    "orchestration failed; history untouched"
                );
                return Err(error);
            }
        };

        let persisted = if result.reply.is_material() {
            self.persist(&user_id, history, &content, result.reply.to_assistant_turn()).await
        } else {
            false
        };
        info!(
            event_name = "agent.turn.completed",
            correlation_id = %correlation_id,
            user_id = %user_id,
            agent = result.agent,
            steps = result.steps,
            tool_calls = result.tool_calls.len(),
            persisted,
            "turn completed"
        );

        Ok(TurnOutcome::Answered {
            reply: result.reply,
            agent: result.agent,
            tool_calls: result.tool_calls,
            persisted,
        })
    }

    async fn persist(
        &self,
        user_id: &str,
        mut history: Vec<Turn>,
        content: &str,
        answer: Turn,
    ) -> bool {
        history.push(Turn::user(content));
        history.push(answer);
        self.store.write(user_id, &history).await.is_saved()
    }
}

//! Agent runtime for the AWX chat assistant.
//!
//! A turn flows through a fixed pipeline:
//! 1. **History** (`conversation`) - fail-open read of the user's recent turns
//! 2. **Guardrail** (`guardrails`) - topic classifier; fails open, refusals are persisted
//! 3. **Orchestration** (`orchestrator`) - the leader answers or hands off to one
//!    specialist (`agents`), each driven by `runner` against its tool bundle (`tools`)
//! 4. **Persistence** - the new user/assistant pair is written back with
//!    compare-and-swap retries
//!
//! Streaming output leaves through `events`; `runtime::AgentRuntime` ties
//! the stages together for every transport.

pub mod agents;
pub mod conversation;
pub mod error;
pub mod events;
pub mod guardrails;
pub mod llm;
pub mod orchestrator;
pub mod runner;
pub mod runtime;
pub mod scope;
pub mod tools;

#[cfg(test)]
mod testing;

pub use conversation::{ConversationStore, WriteOutcome};
pub use error::AgentError;
pub use events::{EventSink, StreamEvent};
pub use guardrails::{GuardrailGate, LlmClassifier, REFUSAL_MESSAGE};
pub use orchestrator::{OrchestrationResult, Orchestrator};
pub use runtime::{AgentRuntime, TurnOutcome, TurnRequest};

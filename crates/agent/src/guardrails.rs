use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use awxchat_core::domain::conversation::{recent_window, transcript};
use awxchat_core::Turn;

use crate::error::AgentError;
use crate::events::EventSink;
use crate::llm::{parse_structured, ChatMessage, CompletionRequest, LlmClient, OutputSchema};

/// Fixed reply for turns the gate rejects.
pub const REFUSAL_MESSAGE: &str =
    "I am here to help you with Ansible AWX so right now I can't help you with that.";

pub const DEFAULT_GUARDRAIL_WINDOW: usize = 6;

const EMPTY_TRANSCRIPT: &str = "User: Hello";

const CLASSIFIER_INSTRUCTIONS: &str = "\
You screen requests sent to an assistant for Ansible AWX operators. Read the \
conversation transcript and decide whether the LAST user message may be answered.

Allow it when it concerns:
- the assistant itself (its tools, abilities, how to use it);
- Ansible, AWX or Tower: playbooks, inventories, hosts, projects, credentials, job templates, jobs;
- Linux or Unix administration, server configuration, infrastructure automation;
- DevOps practice: CI/CD, scripting, cloud tooling, source control for automation content.

Also allow short follow-ups (\"show more\", \"what else?\", \"where is it?\", \"continue\") \
when the previous exchange in the transcript was on one of those topics, even if the \
follow-up itself names no technical term.

Reject anything else: entertainment, sports, celebrities, personal life, general trivia.

Answer with is_valid_request and a one-sentence reasoning.";

/// Output of the topic classifier for one turn. Never persisted.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct GuardrailVerdict {
    pub is_valid_request: bool,
    #[serde(default)]
    pub reasoning: String,
}

impl GuardrailVerdict {
    pub fn allow(reasoning: impl Into<String>) -> Self {
        Self { is_valid_request: true, reasoning: reasoning.into() }
    }

    pub fn reject(reasoning: impl Into<String>) -> Self {
        Self { is_valid_request: false, reasoning: reasoning.into() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GateDecision {
    Allow(GuardrailVerdict),
    Reject(GuardrailVerdict),
}

impl GateDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow(_))
    }

    pub fn verdict(&self) -> &GuardrailVerdict {
        match self {
            Self::Allow(verdict) | Self::Reject(verdict) => verdict,
        }
    }
}

#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, transcript: &str) -> Result<GuardrailVerdict, AgentError>;
}

/// Classifier backed by a model call with a strict verdict schema. Its
/// output is never streamed to clients.
pub struct LlmClassifier {
    llm: Arc<dyn LlmClient>,
}

impl LlmClassifier {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    pub fn verdict_schema() -> OutputSchema {
        OutputSchema {
            name: "guardrail_verdict",
            schema: json!({
                "type": "object",
                "properties": {
                    "is_valid_request": { "type": "boolean" },
                    "reasoning": { "type": "string" }
                },
                "required": ["is_valid_request", "reasoning"],
                "additionalProperties": false
            }),
        }
    }
}

#[async_trait]
impl Classifier for LlmClassifier {
    async fn classify(&self, transcript: &str) -> Result<GuardrailVerdict, AgentError> {
        let request = CompletionRequest {
            system: CLASSIFIER_INSTRUCTIONS.to_string(),
            messages: vec![ChatMessage::user(transcript)],
            tools: Vec::new(),
            output: Some(Self::verdict_schema()),
        };

        let completion = self.llm.complete(request, &EventSink::disabled()).await?;
        parse_structured(&completion.text)
            .map_err(|error| AgentError::Classifier(format!("unreadable verdict: {error}")))
    }
}

/// Pre-orchestration topic filter. Any failure to evaluate lets the turn through.
pub struct GuardrailGate {
    classifier: Arc<dyn Classifier>,
    window: usize,
    timeout: Duration,
}

impl GuardrailGate {
    pub fn new(classifier: Arc<dyn Classifier>, window: usize, timeout: Duration) -> Self {
        Self { classifier, window, timeout }
    }

    pub async fn check(&self, history: &[Turn], message: &str, correlation_id: &str) -> GateDecision {
        let context = build_context(history, message, self.window);

        let verdict = match tokio::time::timeout(self.timeout, self.classifier.classify(&context))
            .await
        {
            Ok(Ok(verdict)) => verdict,
            Ok(Err(error)) => {
                warn!(
                    event_name = "agent.guardrail.failed_open",
                    correlation_id,
                    error = %error,
                    "guardrail could not be evaluated; allowing turn"
                );
                return GateDecision::Allow(GuardrailVerdict::allow("guardrail unavailable"));
            }
            Err(_) => {
                warn!(
                    event_name = "agent.guardrail.failed_open",
                    correlation_id,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "guardrail timed out; allowing turn"
                );
                return GateDecision::Allow(GuardrailVerdict::allow("guardrail timed out"));
            }
        };

        info!(
            event_name = "agent.guardrail.checked",
            correlation_id,
            is_valid_request = verdict.is_valid_request,
            reasoning = %verdict.reasoning,
            "guardrail verdict"
        );

        if verdict.is_valid_request {
            GateDecision::Allow(verdict)
        } else {
            GateDecision::Reject(verdict)
        }
    }
}

/// Role-tagged transcript of the last `window` non-blank turns, the new
/// message included.
pub fn build_context(history: &[Turn], message: &str, window: usize) -> String {
    let mut turns: Vec<Turn> =
        history.iter().filter(|turn| !turn.content.trim().is_empty()).cloned().collect();
    if !message.trim().is_empty() {
        turns.push(Turn::user(message));
    }

    let context = transcript(recent_window(&turns, window.max(1)));
    if context.trim().is_empty() {
        EMPTY_TRANSCRIPT.to_string()
    } else {
        context
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use async_trait::async_trait;
    use awxchat_core::Turn;

    use super::{
        build_context, Classifier, GateDecision, GuardrailGate, GuardrailVerdict, LlmClassifier,
    };
    use crate::error::AgentError;
    use crate::testing::ScriptedLlm;

    struct FixedClassifier {
        verdict: Option<GuardrailVerdict>,
        seen: Mutex<Vec<String>>,
    }

    impl FixedClassifier {
        fn returning(verdict: GuardrailVerdict) -> Self {
            Self { verdict: Some(verdict), seen: Mutex::new(Vec::new()) }
        }

        fn failing() -> Self {
            Self { verdict: None, seen: Mutex::new(Vec::new()) }
        }
    }

    #[async_trait]
    impl Classifier for FixedClassifier {
        async fn classify(&self, transcript: &str) -> Result<GuardrailVerdict, AgentError> {
            self.seen.lock().expect("lock").push(transcript.to_string());
            self.verdict.clone().ok_or_else(|| AgentError::Classifier("boom".to_string()))
        }
    }

    struct StalledClassifier;

    #[async_trait]
    impl Classifier for StalledClassifier {
        async fn classify(&self, _transcript: &str) -> Result<GuardrailVerdict, AgentError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(GuardrailVerdict::reject("too late"))
        }
    }

    fn gate(classifier: Arc<dyn Classifier>) -> GuardrailGate {
        GuardrailGate::new(classifier, 6, Duration::from_secs(5))
    }

    #[test]
    fn context_keeps_latest_turns_with_role_tags() {
        let history: Vec<Turn> = (0..8)
            .map(|i| {
                if i % 2 == 0 {
                    Turn::user(format!("q{i}"))
                } else {
                    Turn::assistant(format!("a{i}"))
                }
            })
            .collect();

        let context = build_context(&history, "what else?", 6);

        assert_eq!(
            context,
            "Assistant: a3\nUser: q4\nAssistant: a5\nUser: q6\nAssistant: a7\nUser: what else?"
        );
    }

    #[test]
    fn empty_context_becomes_greeting() {
        assert_eq!(build_context(&[], "   ", 6), "User: Hello");
        assert_eq!(build_context(&[Turn::assistant(" ")], "", 6), "User: Hello");
    }

    #[tokio::test]
    async fn follow_up_is_checked_with_prior_exchange() {
        let classifier = Arc::new(FixedClassifier::returning(GuardrailVerdict::allow("follow-up")));
        let history = vec![
            Turn::user("list all AWX inventories"),
            Turn::assistant("There are 3 inventories."),
        ];

        let decision = gate(classifier.clone()).check(&history, "what else?", "corr-1").await;

        assert!(decision.is_allowed());
        let seen = classifier.seen.lock().expect("lock");
        assert_eq!(
            seen[0],
            "User: list all AWX inventories\nAssistant: There are 3 inventories.\nUser: what else?"
        );
    }

    #[tokio::test]
    async fn rejected_verdict_is_a_reject_decision() {
        let classifier = Arc::new(FixedClassifier::returning(GuardrailVerdict::reject("sports")));

        let decision = gate(classifier).check(&[], "who won the match?", "corr-2").await;

        assert_eq!(decision, GateDecision::Reject(GuardrailVerdict::reject("sports")));
    }

    #[tokio::test]
    async fn classifier_error_fails_open() {
        let decision =
            gate(Arc::new(FixedClassifier::failing())).check(&[], "anything", "corr-3").await;
        assert!(decision.is_allowed());
    }

    #[tokio::test(start_paused = true)]
    async fn classifier_timeout_fails_open() {
        let gate = GuardrailGate::new(Arc::new(StalledClassifier), 6, Duration::from_secs(1));
        let decision = gate.check(&[], "anything", "corr-4").await;
        assert!(decision.is_allowed());
    }

    #[tokio::test]
    async fn llm_classifier_reads_structured_verdict() {
        let llm = Arc::new(ScriptedLlm::with_texts(vec![
            "{\"is_valid_request\": false, \"reasoning\": \"off topic\"}",
        ]));
        let classifier = LlmClassifier::new(llm.clone());

        let verdict = classifier.classify("User: tell me a joke").await.expect("verdict");

        assert_eq!(verdict, GuardrailVerdict::reject("off topic"));
        let requests = llm.requests();
        assert_eq!(requests[0].output.as_ref().map(|o| o.name), Some("guardrail_verdict"));
        assert!(requests[0].tools.is_empty());
    }

    #[tokio::test]
    async fn llm_classifier_prose_is_an_error() {
        let llm = Arc::new(ScriptedLlm::with_texts(vec!["Sure, that's fine."]));
        let result = LlmClassifier::new(llm).classify("User: hi").await;
        assert!(matches!(result, Err(AgentError::Classifier(_))));
    }
}

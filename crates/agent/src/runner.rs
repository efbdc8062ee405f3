//! Drives one agent until it produces structured output or hands off.

use std::sync::Arc;

use tracing::{debug, info};

use awxchat_core::AgentReply;

use crate::agents::{AgentSpec, Specialist};
use crate::error::AgentError;
use crate::events::EventSink;
use crate::llm::{parse_structured, ChatMessage, CompletionRequest, LlmClient};

/// Model invocations shared by every agent that works on one turn.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StepBudget {
    max: u32,
    used: u32,
}

impl StepBudget {
    pub fn new(max: u32) -> Self {
        Self { max, used: 0 }
    }

    pub fn consume(&mut self) -> Result<(), AgentError> {
        if self.used >= self.max {
            return Err(AgentError::MaxTurnsExceeded(self.max));
        }
        self.used += 1;
        Ok(())
    }

    pub fn used(&self) -> u32 {
        self.used
    }

    pub fn max(&self) -> u32 {
        self.max
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum AgentStep {
    Final(AgentReply),
    Handoff(Specialist),
}

#[derive(Clone, Debug, PartialEq)]
pub struct AgentRun {
    pub step: AgentStep,
    /// Names of the tools invoked, in call order.
    pub tool_calls: Vec<String>,
}

#[derive(Clone)]
pub struct AgentRunner {
    llm: Arc<dyn LlmClient>,
}

impl AgentRunner {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    /// Runs `spec` over `context`. Tool calls are executed one at a time, in
    /// the order the model issued them, and their output is fed back before
    /// the next model step.
    pub async fn run(
        &self,
        spec: &AgentSpec,
        context: Vec<ChatMessage>,
        budget: &mut StepBudget,
        events: &EventSink,
        correlation_id: &str,
    ) -> Result<AgentRun, AgentError> {
        let mut messages = context;
        let mut tool_calls = Vec::new();
        let tools = spec.tool_definitions();

        loop {
            budget.consume()?;
            let request = CompletionRequest {
                system: spec.instructions.clone(),
                messages: messages.clone(),
                tools: tools.clone(),
                output: Some(spec.output.clone()),
            };
            let completion = self.llm.complete(request, events).await?;
            debug!(
                event_name = "agent.step.completed",
                correlation_id,
                agent = spec.name,
                step = budget.used(),
                tool_calls = completion.tool_calls.len(),
                "model step completed"
            );

            if completion.tool_calls.is_empty() {
                let reply = parse_structured::<AgentReply>(&completion.text).map_err(|error| {
                    AgentError::MalformedOutput { agent: spec.name, detail: error.to_string() }
                })?;
                return Ok(AgentRun { step: AgentStep::Final(reply), tool_calls });
            }

            let handoff = completion.tool_calls.iter().find_map(|call| {
                Specialist::from_handoff_tool(&call.name)
                    .filter(|specialist| spec.handoffs.contains(specialist))
            });
            if let Some(specialist) = handoff {
                info!(
                    event_name = "agent.handoff",
                    correlation_id,
                    from = spec.name,
                    to = specialist.agent_name(),
                    "agent handed off"
                );
                return Ok(AgentRun { step: AgentStep::Handoff(specialist), tool_calls });
            }

            messages.push(ChatMessage::assistant_tool_calls(
                completion.text.clone(),
                completion.tool_calls.clone(),
            ));
            for call in completion.tool_calls {
                events.tool_call(spec.name, &call.name);
                info!(
                    event_name = "agent.tool.invoked",
                    correlation_id,
                    agent = spec.name,
                    tool = %call.name,
                    "invoking tool"
                );
                let output = spec.tools.invoke(&call.name, call.arguments).await;
                messages.push(ChatMessage::tool_result(call.id, output.content));
                tool_calls.push(call.name);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::{AgentRunner, AgentStep, StepBudget};
    use crate::agents::{awx_worker_spec, chat_spec, leader_spec, Specialist};
    use crate::error::AgentError;
    use crate::events::{EventSink, StreamEvent};
    use crate::llm::{ChatMessage, Completion, MessageRole};
    use crate::testing::{call, ScriptedLlm, StaticTool};
    use crate::tools::ToolRegistry;

    fn inventory_tools() -> Arc<ToolRegistry> {
        let mut registry = ToolRegistry::new();
        registry.register(StaticTool::new(
            "list_inventories",
            json!({ "type": "object", "properties": {} }),
            r#"{"count":1,"results":[{"name":"Demo Inventory"}]}"#,
        ));
        Arc::new(registry)
    }

    #[test]
    fn budget_rejects_the_step_past_its_limit() {
        let mut budget = StepBudget::new(2);
        assert!(budget.consume().is_ok());
        assert!(budget.consume().is_ok());
        assert!(matches!(budget.consume(), Err(AgentError::MaxTurnsExceeded(2))));
        assert_eq!(budget.used(), 2);
    }

    #[tokio::test]
    async fn final_answer_is_parsed_from_fenced_json() {
        let llm = Arc::new(ScriptedLlm::with_texts(vec![
            "```json\n{\"explanation\":\"Inventories group hosts.\"}\n```",
        ]));
        let runner = AgentRunner::new(llm.clone());
        let mut budget = StepBudget::new(5);

        let run = runner
            .run(&chat_spec(), vec![ChatMessage::user("what is an inventory?")], &mut budget, &EventSink::disabled(), "c-1")
            .await
            .expect("run");

        match run.step {
            AgentStep::Final(reply) => assert_eq!(reply.explanation, "Inventories group hosts."),
            other => panic!("unexpected step {other:?}"),
        }
        assert_eq!(budget.used(), 1);
        let request = &llm.requests()[0];
        assert_eq!(request.output.as_ref().map(|schema| schema.name), Some("chat_output"));
        assert!(request.tools.is_empty());
    }

    #[tokio::test]
    async fn leader_handoff_stops_the_loop() {
        let llm = Arc::new(ScriptedLlm::new(vec![Completion::tool_calls(vec![call(
            "h1",
            "transfer_to_awx_worker_agent",
            json!({}),
        )])]));
        let runner = AgentRunner::new(llm);
        let mut budget = StepBudget::new(5);

        let run = runner
            .run(&leader_spec(false), vec![ChatMessage::user("list inventories")], &mut budget, &EventSink::disabled(), "c-2")
            .await
            .expect("run");

        assert_eq!(run.step, AgentStep::Handoff(Specialist::AwxWorker));
        assert!(run.tool_calls.is_empty());
    }

    #[tokio::test]
    async fn handoff_outside_the_leader_list_is_an_unknown_tool() {
        let llm = Arc::new(ScriptedLlm::new(vec![
            Completion::tool_calls(vec![call("h1", "transfer_to_github_worker_agent", json!({}))]),
            Completion::text(r#"{"explanation":"GitHub is not configured for you."}"#),
        ]));
        let runner = AgentRunner::new(llm.clone());
        let mut budget = StepBudget::new(5);

        let run = runner
            .run(&leader_spec(false), vec![ChatMessage::user("list my issues")], &mut budget, &EventSink::disabled(), "c-3")
            .await
            .expect("run");

        assert!(matches!(run.step, AgentStep::Final(_)));
        let second = &llm.requests()[1];
        let tool_message = second.messages.last().expect("tool result");
        assert_eq!(tool_message.role, MessageRole::Tool);
        assert!(tool_message.content.starts_with("Unknown tool `transfer_to_github_worker_agent`"));
    }

    #[tokio::test]
    async fn tool_calls_run_in_order_and_notify_before_invocation() {
        let llm = Arc::new(ScriptedLlm::new(vec![
            Completion::tool_calls(vec![
                call("t1", "list_inventories", json!({})),
                call("t2", "list_inventories", json!({})),
            ]),
            Completion::text(
                r#"{"tool_result":"{}","result":"Demo Inventory","explanation":"You have one inventory.","tool_name":"list_inventories"}"#,
            ),
        ]));
        let runner = AgentRunner::new(llm.clone());
        let (events, mut receiver) = EventSink::channel();
        let mut budget = StepBudget::new(5);

        let run = runner
            .run(&awx_worker_spec(inventory_tools()), vec![ChatMessage::user("list inventories")], &mut budget, &events, "c-4")
            .await
            .expect("run");

        assert_eq!(run.tool_calls, vec!["list_inventories", "list_inventories"]);
        assert_eq!(
            receiver.try_recv().expect("first event"),
            StreamEvent::ToolCall { agent: "awx_worker_agent", tool: "list_inventories".to_string() }
        );
        let second = &llm.requests()[1];
        let roles: Vec<MessageRole> = second.messages.iter().map(|message| message.role).collect();
        assert_eq!(
            roles,
            vec![MessageRole::User, MessageRole::Assistant, MessageRole::Tool, MessageRole::Tool]
        );
        assert_eq!(second.messages[2].tool_call_id.as_deref(), Some("t1"));
        assert_eq!(second.messages[3].tool_call_id.as_deref(), Some("t2"));
    }

    #[tokio::test]
    async fn tool_failure_is_fed_back_as_text() {
        let mut registry = ToolRegistry::new();
        registry.register(StaticTool::failing("launch_job_template"));
        let llm = Arc::new(ScriptedLlm::new(vec![
            Completion::tool_calls(vec![call("t1", "launch_job_template", json!({}))]),
            Completion::text(
                r#"{"tool_result":"","result":"","explanation":"AWX rejected the launch.","tool_name":"launch_job_template"}"#,
            ),
        ]));
        let runner = AgentRunner::new(llm.clone());
        let mut budget = StepBudget::new(5);

        runner
            .run(&awx_worker_spec(Arc::new(registry)), vec![ChatMessage::user("launch 7")], &mut budget, &EventSink::disabled(), "c-5")
            .await
            .expect("run");

        let fed_back = &llm.requests()[1].messages[2].content;
        assert!(fed_back.contains("502"), "{fed_back}");
    }

    #[tokio::test]
    async fn prose_without_explanation_is_malformed() {
        let llm = Arc::new(ScriptedLlm::with_texts(vec!["Sure, here you go."]));
        let runner = AgentRunner::new(llm);
        let mut budget = StepBudget::new(5);

        let error = runner
            .run(&chat_spec(), vec![ChatMessage::user("hi")], &mut budget, &EventSink::disabled(), "c-6")
            .await
            .expect_err("malformed");

        assert!(matches!(error, AgentError::MalformedOutput { agent: "chat_agent", .. }));
    }

    #[tokio::test]
    async fn endless_tool_loop_exhausts_the_budget() {
        let looping: Vec<Completion> = (0..4)
            .map(|index| Completion::tool_calls(vec![call(&format!("t{index}"), "list_inventories", json!({}))]))
            .collect();
        let runner = AgentRunner::new(Arc::new(ScriptedLlm::new(looping)));
        let mut budget = StepBudget::new(3);

        let error = runner
            .run(&awx_worker_spec(inventory_tools()), vec![ChatMessage::user("loop")], &mut budget, &EventSink::disabled(), "c-7")
            .await
            .expect_err("budget");

        assert!(matches!(error, AgentError::MaxTurnsExceeded(3)));
    }
}

//! Leader-first delegation: the leader answers or hands the turn to exactly
//! one specialist, which then finishes it.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::info;

use awxchat_core::config::GithubConfig;
use awxchat_core::{AgentReply, RepositoryBinding, Turn};

use crate::agents::{
    awx_worker_spec, chat_spec, github_worker_spec, leader_spec, AgentSpec, Specialist,
    LEADER_NAME,
};
use crate::error::AgentError;
use crate::events::EventSink;
use crate::llm::{ChatMessage, LlmClient};
use crate::runner::{AgentRunner, AgentStep, StepBudget};
use crate::scope::ScopeGuard;
use crate::tools::endpoint::ApiClient;
use crate::tools::github::github_registry;
use crate::tools::ToolRegistry;

pub const DEFAULT_MAX_TURNS: u32 = 40;

#[derive(Clone, Debug, PartialEq)]
pub struct OrchestrationResult {
    pub reply: AgentReply,
    /// Agent that produced `reply`.
    pub agent: &'static str,
    pub tool_calls: Vec<String>,
    pub steps: u32,
}

struct GithubRouting {
    config: GithubConfig,
    workers: HashMap<RepositoryBinding, AgentSpec>,
}

impl GithubRouting {
    fn worker_for(&self, user_id: &str) -> Option<(&RepositoryBinding, &AgentSpec)> {
        let binding = self.config.binding_for(user_id)?;
        self.workers.get(binding).map(|spec| (binding, spec))
    }
}

pub struct Orchestrator {
    runner: AgentRunner,
    leader: AgentSpec,
    leader_with_github: AgentSpec,
    chat: AgentSpec,
    awx: AgentSpec,
    github: Option<GithubRouting>,
    scope: ScopeGuard,
    max_turns: u32,
}

impl Orchestrator {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        awx_tools: ToolRegistry,
        max_turns: u32,
    ) -> Result<Self, regex::Error> {
        Ok(Self {
            runner: AgentRunner::new(llm),
            leader: leader_spec(false),
            leader_with_github: leader_spec(true),
            chat: chat_spec(),
            awx: awx_worker_spec(Arc::new(awx_tools)),
            github: None,
            scope: ScopeGuard::new()?,
            max_turns,
        })
    }

    /// Builds one GitHub worker per distinct binding. A disabled config
    /// leaves GitHub unreachable for everyone.
    pub fn with_github(mut self, config: GithubConfig, client: Arc<dyn ApiClient>) -> Self {
        if !config.enabled {
            return self;
        }

        let mut workers = HashMap::new();
        let bindings = config.default_binding.iter().chain(config.bindings.values());
        for binding in bindings {
            workers.entry(binding.clone()).or_insert_with(|| {
                let tools = Arc::new(github_registry(client.clone(), binding));
                github_worker_spec(binding, tools)
            });
        }
        self.github = Some(GithubRouting { config, workers });
        self
    }

    pub fn max_turns(&self) -> u32 {
        self.max_turns
    }

    pub fn binding_for(&self, user_id: &str) -> Option<&RepositoryBinding> {
        self.github.as_ref()?.worker_for(user_id).map(|(binding, _)| binding)
    }

    pub async fn run(
        &self,
        user_id: &str,
        history: &[Turn],
        message: &str,
        events: &EventSink,
        correlation_id: &str,
    ) -> Result<OrchestrationResult, AgentError> {
        let github = self.github.as_ref().and_then(|routing| routing.worker_for(user_id));
        let leader = if github.is_some() { &self.leader_with_github } else { &self.leader };

        let mut context: Vec<ChatMessage> = history.iter().map(ChatMessage::from).collect();
        context.push(ChatMessage::user(message));

        let mut budget = StepBudget::new(self.max_turns);
        let leader_run =
            self.runner.run(leader, context.clone(), &mut budget, events, correlation_id).await?;

        let specialist = match leader_run.step {
            AgentStep::Final(reply) => {
                return Ok(OrchestrationResult {
                    reply,
                    agent: LEADER_NAME,
                    tool_calls: leader_run.tool_calls,
                    steps: budget.used(),
                });
            }
            AgentStep::Handoff(specialist) => specialist,
        };

        let spec = match specialist {
            Specialist::Chat => &self.chat,
            Specialist::AwxWorker => &self.awx,
            Specialist::GithubWorker => {
                let Some((binding, spec)) = github else {
                    return Err(AgentError::MalformedOutput {
                        agent: LEADER_NAME,
                        detail: "handoff to a GitHub worker the user has no binding for".into(),
                    });
                };
                if let Some(violation) = self.scope.check(message, binding) {
                    info!(
                        event_name = "agent.github.scope_refused",
                        correlation_id,
                        user_id,
                        repository = %binding.repository,
                        branch = %binding.branch,
                        violation = ?violation,
                        "request outside the bound repository"
                    );
                    return Ok(OrchestrationResult {
                        reply: AgentReply::from_explanation(violation.refusal(binding)),
                        agent: specialist.agent_name(),
                        tool_calls: Vec::new(),
                        steps: budget.used(),
                    });
                }
                spec
            }
        };

        let run = self.runner.run(spec, context, &mut budget, events, correlation_id).await?;
        match run.step {
            AgentStep::Final(reply) => Ok(OrchestrationResult {
                reply,
                agent: spec.name,
                tool_calls: run.tool_calls,
                steps: budget.used(),
            }),
            AgentStep::Handoff(_) => Err(AgentError::MalformedOutput {
                agent: spec.name,
                detail: "specialists cannot hand off".into(),
            }),
        }
    }
}

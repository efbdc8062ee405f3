//! Agent definitions: the leader and its three specialists.

use std::sync::Arc;

use serde_json::{json, Value};

use awxchat_core::RepositoryBinding;

use crate::llm::{OutputSchema, ToolDefinition};
use crate::tools::ToolRegistry;

/// The agents the leader may hand a turn to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Specialist {
    Chat,
    AwxWorker,
    GithubWorker,
}

impl Specialist {
    pub const ALL: [Specialist; 3] = [Self::Chat, Self::AwxWorker, Self::GithubWorker];

    pub fn agent_name(&self) -> &'static str {
        match self {
            Self::Chat => "chat_agent",
            Self::AwxWorker => "awx_worker_agent",
            Self::GithubWorker => "github_worker_agent",
        }
    }

    pub fn handoff_tool_name(&self) -> &'static str {
        match self {
            Self::Chat => "transfer_to_chat_agent",
            Self::AwxWorker => "transfer_to_awx_worker_agent",
            Self::GithubWorker => "transfer_to_github_worker_agent",
        }
    }

    pub fn from_handoff_tool(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|specialist| specialist.handoff_tool_name() == name)
    }

    pub fn handoff_description(&self) -> &'static str {
        match self {
            Self::Chat => {
                "Hand off when the user wants an explanation, guidance or general Ansible/AWX \
                 knowledge that needs no live system data."
            }
            Self::AwxWorker => {
                "Hand off when the user wants to read or change anything on the AWX controller: \
                 inventories, hosts, projects, job templates, jobs, credentials, users."
            }
            Self::GithubWorker => {
                "Hand off for GitHub work on the user's repository: issues, pull requests, file \
                 contents, code search, workflow runs, commits."
            }
        }
    }

    pub fn handoff_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.handoff_tool_name().to_string(),
            description: self.handoff_description().to_string(),
            parameters: json!({ "type": "object", "properties": {}, "additionalProperties": false }),
        }
    }
}

/// Immutable description of one agent, built once at startup.
#[derive(Clone)]
pub struct AgentSpec {
    pub name: &'static str,
    pub instructions: String,
    pub tools: Arc<ToolRegistry>,
    pub output: OutputSchema,
    pub handoffs: Vec<Specialist>,
}

impl AgentSpec {
    pub fn tool_definitions(&self) -> Vec<ToolDefinition> {
        let mut definitions: Vec<ToolDefinition> =
            self.handoffs.iter().map(Specialist::handoff_definition).collect();
        definitions.extend(self.tools.definitions());
        definitions
    }
}

pub const LEADER_NAME: &str = "leader_agent";

const LEADER_INSTRUCTIONS: &str = "\
You are the entry point of an assistant for Ansible AWX users. Read the conversation and decide \
who answers the latest message.

- Explanations, how-to questions and general Ansible, AWX, Linux or DevOps knowledge: hand off to \
the chat agent.
- Anything that must read or change live AWX data (list, show, create, update, delete, launch, \
cancel): hand off to the AWX worker agent.
{github_rule}
Prefer handing off. Answer yourself only for greetings or questions about what you can do. Hand \
off at most once. When you answer yourself, reply with JSON matching the output schema; put the \
whole answer in `explanation`.";

const CHAT_INSTRUCTIONS: &str = "\
You are an Ansible AWX specialist supporting users of AWX 24.6.1. Answer questions about using, \
configuring, operating and troubleshooting AWX, and closely related Ansible, Linux and DevOps \
topics. Give clear step-by-step guidance: UI navigation, example API calls such as \
/api/v2/job_templates/<id>/, and example playbooks when asked.

Vague follow-ups (\"what is that?\", \"show me\", \"another way?\") refer to the earlier \
conversation; infer the intent from it. When a question needs an id, name or status you do not \
have, ask for it. You cannot see live system state; say so when a question depends on it.

Reply with JSON matching the output schema; the whole answer goes in `explanation`.";

const AWX_INSTRUCTIONS: &str = "\
You operate an Ansible AWX controller through its REST API (/api/v2/). Follow this protocol for \
every operation, even simple ones:

1. Discover: use list_api_paths when you do not know which endpoint serves the request.
2. Document: call document_search on the endpoint and read its allowed methods and fields.
3. Pre-check: when creating a project with scm_type manual, first obtain from the user the \
project directory name, the playbook filename and its content. Without them, do nothing and ask. \
Then call check_project_manual_path with type=add, and pass the same directory as local_path \
when creating. After deleting a manual project, call check_project_manual_path with type=remove.
4. Invoke: call call_awx_api (or the matching explicit tool) with the method and fields the \
documentation requires.

Tool failures come back as text; explain them to the user instead of retrying blindly.

Reply with JSON matching the output schema:
- tool_result: the raw result of the last tool call;
- result: a readable version of tool_result;
- explanation: a short, friendly summary of what was done and what it means;
- tool_name: the tool you used (empty string if none).";

const GITHUB_INSTRUCTIONS: &str = "\
You work on exactly one GitHub repository and branch:
- repository: {repository}
- branch: {branch}

Every tool is already scoped to them; never ask the user for a repository or branch. If a request \
concerns any other repository or branch, do not call a tool and reply:
- Access denied. I can only work with the {repository} repository.
- Access denied. I can only work with the {branch} branch.

You can read repository details, list, read, create and update issues, list and read pull \
requests, read files, search code, and inspect workflow runs and commits. Answer only from tool \
results. Mention the repository and branch in your explanation. When a call times out or is rate \
limited, say so and suggest what to try next.

Reply with JSON matching the output schema:
- result: the raw result of the last tool call;
- explanation: a short, friendly summary;
- tool_name: the tool you used (empty string if none).";

fn strict_object(fields: &[&str]) -> Value {
    let properties: serde_json::Map<String, Value> = fields
        .iter()
        .map(|field| (field.to_string(), json!({ "type": "string" })))
        .collect();
    json!({
        "type": "object",
        "properties": properties,
        "required": fields,
        "additionalProperties": false
    })
}

pub fn leader_output() -> OutputSchema {
    OutputSchema { name: "leader_output", schema: strict_object(&["explanation"]) }
}

pub fn chat_output() -> OutputSchema {
    OutputSchema { name: "chat_output", schema: strict_object(&["explanation"]) }
}

pub fn awx_worker_output() -> OutputSchema {
    OutputSchema {
        name: "awx_worker_output",
        schema: strict_object(&["tool_result", "result", "explanation", "tool_name"]),
    }
}

pub fn github_worker_output() -> OutputSchema {
    OutputSchema {
        name: "github_worker_output",
        schema: strict_object(&["result", "explanation", "tool_name"]),
    }
}

pub fn leader_spec(with_github: bool) -> AgentSpec {
    let (github_rule, handoffs) = if with_github {
        (
            "- GitHub repository work (issues, pull requests, files, code search, workflow runs): \
             hand off to the GitHub worker agent.\n",
            Specialist::ALL.to_vec(),
        )
    } else {
        ("", vec![Specialist::Chat, Specialist::AwxWorker])
    };

    AgentSpec {
        name: LEADER_NAME,
        instructions: LEADER_INSTRUCTIONS.replace("{github_rule}", github_rule),
        tools: Arc::new(ToolRegistry::new()),
        output: leader_output(),
        handoffs,
    }
}

pub fn chat_spec() -> AgentSpec {
    AgentSpec {
        name: Specialist::Chat.agent_name(),
        instructions: CHAT_INSTRUCTIONS.to_string(),
        tools: Arc::new(ToolRegistry::new()),
        output: chat_output(),
        handoffs: Vec::new(),
    }
}

pub fn awx_worker_spec(tools: Arc<ToolRegistry>) -> AgentSpec {
    AgentSpec {
        name: Specialist::AwxWorker.agent_name(),
        instructions: AWX_INSTRUCTIONS.to_string(),
        tools,
        output: awx_worker_output(),
        handoffs: Vec::new(),
    }
}

pub fn github_worker_spec(binding: &RepositoryBinding, tools: Arc<ToolRegistry>) -> AgentSpec {
    AgentSpec {
        name: Specialist::GithubWorker.agent_name(),
        instructions: GITHUB_INSTRUCTIONS
            .replace("{repository}", &binding.repository)
            .replace("{branch}", &binding.branch),
        tools,
        output: github_worker_output(),
        handoffs: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use awxchat_core::RepositoryBinding;
    use serde_json::json;

    use super::{awx_worker_output, github_worker_spec, leader_spec, Specialist};
    use crate::tools::ToolRegistry;

    #[test]
    fn handoff_tool_names_round_trip() {
        for specialist in Specialist::ALL {
            assert_eq!(Specialist::from_handoff_tool(specialist.handoff_tool_name()), Some(specialist));
        }
        assert_eq!(Specialist::from_handoff_tool("transfer_to_nobody"), None);
    }

    #[test]
    fn leader_without_github_cannot_reach_github_worker() {
        let leader = leader_spec(false);
        assert!(!leader.handoffs.contains(&Specialist::GithubWorker));
        let names: Vec<String> = leader.tool_definitions().into_iter().map(|d| d.name).collect();
        assert_eq!(names, vec!["transfer_to_chat_agent", "transfer_to_awx_worker_agent"]);
        assert!(!leader.instructions.contains("GitHub"));
        assert!(!leader.instructions.contains("{github_rule}"));
    }

    #[test]
    fn leader_with_github_offers_all_specialists() {
        let leader = leader_spec(true);
        assert_eq!(leader.handoffs, Specialist::ALL.to_vec());
        assert!(leader.instructions.contains("GitHub worker agent"));
    }

    #[test]
    fn output_schemas_are_strict() {
        let schema = awx_worker_output().schema;
        assert_eq!(schema["additionalProperties"], json!(false));
        assert_eq!(schema["required"], json!(["tool_result", "result", "explanation", "tool_name"]));
    }

    #[test]
    fn github_instructions_name_the_binding() {
        let binding = RepositoryBinding::new("acme/playbooks", "main");
        let spec = github_worker_spec(&binding, Arc::new(ToolRegistry::new()));
        assert!(spec
            .instructions
            .contains("Access denied. I can only work with the acme/playbooks repository."));
        assert!(spec.instructions.contains("Access denied. I can only work with the main branch."));
        assert!(spec.handoffs.is_empty());
    }
}

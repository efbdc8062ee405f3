//! GitHub capability bundle. Every tool is bound to one repository and
//! branch; neither can be supplied by the model.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use octocrab::Octocrab;
use secrecy::ExposeSecret;
use serde_json::{json, Value};

use awxchat_core::config::GithubConfig;
use awxchat_core::RepositoryBinding;

use super::endpoint::{
    ApiClient, ApiRequest, EndpointSpec, EndpointTool, HttpMethod, ParamKind, ParamSpec,
};
use super::{Tool, ToolError, ToolOutput, ToolRegistry};
use crate::llm::ToolDefinition;

const SERVICE: &str = "github";

/// REST client for the GitHub worker, routed through octocrab's generic
/// verbs so every bundle tool shares the `ApiClient` seam.
#[derive(Clone)]
pub struct GithubClient {
    octocrab: Octocrab,
}

impl GithubClient {
    /// Must be called inside a tokio runtime.
    pub fn from_config(config: &GithubConfig) -> Result<Self, ToolError> {
        let mut builder = Octocrab::builder()
            .base_uri(config.api_base_url.trim_end_matches('/'))
            .map_err(client_error)?
            .set_connect_timeout(Some(Duration::from_secs(10)))
            .set_read_timeout(Some(Duration::from_secs(30)));
        if let Some(token) = &config.token {
            builder = builder.personal_token(token.expose_secret().to_string());
        }
        Ok(Self { octocrab: builder.build().map_err(client_error)? })
    }
}

#[async_trait]
impl ApiClient for GithubClient {
    fn service(&self) -> &'static str {
        SERVICE
    }

    async fn send(&self, request: ApiRequest) -> Result<Value, ToolError> {
        let route = request.path.as_str();
        let body = request.body.as_ref();
        let result: octocrab::Result<Value> = match request.method {
            HttpMethod::Get if request.query.is_empty() => {
                self.octocrab.get(route, None::<&()>).await
            }
            HttpMethod::Get => self.octocrab.get(route, Some(&request.query)).await,
            HttpMethod::Post => self.octocrab.post(route, body).await,
            HttpMethod::Put => self.octocrab.put(route, body).await,
            HttpMethod::Patch => self.octocrab.patch(route, body).await,
            HttpMethod::Delete => self.octocrab.delete(route, body).await,
            HttpMethod::Options => {
                return Err(ToolError::Rejected(
                    "OPTIONS is not supported by the GitHub API".to_string(),
                ));
            }
        };
        result.map_err(client_error)
    }
}

fn client_error(error: octocrab::Error) -> ToolError {
    match error {
        octocrab::Error::GitHub { source, .. } => ToolError::Status {
            service: SERVICE,
            status: source.status_code.as_u16(),
            body: source.message,
        },
        octocrab::Error::Serde { source, .. } => {
            ToolError::MalformedResponse { service: SERVICE, detail: source.to_string() }
        }
        octocrab::Error::Json { source, .. } => {
            ToolError::MalformedResponse { service: SERVICE, detail: source.to_string() }
        }
        other => ToolError::Upstream { service: SERVICE, detail: other.to_string() },
    }
}

const OWNER: ParamSpec = ParamSpec::path_text("owner", "Repository owner");
const REPO: ParamSpec = ParamSpec::path_text("repo", "Repository name");
const PER_PAGE: ParamSpec = ParamSpec::query("per_page", "Results per page, max 100", ParamKind::Integer);
const PAGE: ParamSpec = ParamSpec::query("page", "Page number, from 1", ParamKind::Integer);

/// Endpoints exposed to the GitHub worker. `owner`, `repo` and the
/// branch-valued parameters are always bound.
pub const REPOSITORY_ENDPOINTS: &[EndpointSpec] = &[
    EndpointSpec {
        name: "get_repository",
        description: "Get details of the repository.",
        method: HttpMethod::Get,
        path: "/repos/{owner}/{repo}",
        params: &[OWNER, REPO],
    },
    EndpointSpec {
        name: "list_issues",
        description: "List issues of the repository.",
        method: HttpMethod::Get,
        path: "/repos/{owner}/{repo}/issues",
        params: &[
            OWNER,
            REPO,
            ParamSpec::query("state", "open, closed or all", ParamKind::String),
            ParamSpec::query("labels", "Comma-separated label names", ParamKind::String),
            PER_PAGE,
            PAGE,
        ],
    },
    EndpointSpec {
        name: "get_issue",
        description: "Get one issue of the repository.",
        method: HttpMethod::Get,
        path: "/repos/{owner}/{repo}/issues/{issue_number}",
        params: &[OWNER, REPO, ParamSpec::path_id("issue_number", "Issue number")],
    },
    EndpointSpec {
        name: "create_issue",
        description: "Open an issue in the repository.",
        method: HttpMethod::Post,
        path: "/repos/{owner}/{repo}/issues",
        params: &[
            OWNER,
            REPO,
            ParamSpec::body("title", "Issue title", ParamKind::String).required(),
            ParamSpec::body("body", "Issue description, markdown", ParamKind::String),
            ParamSpec::body("labels", "Label names", ParamKind::StringArray),
            ParamSpec::body("assignees", "Assignee logins", ParamKind::StringArray),
        ],
    },
    EndpointSpec {
        name: "update_issue",
        description: "Edit an issue of the repository, including closing or reopening it.",
        method: HttpMethod::Patch,
        path: "/repos/{owner}/{repo}/issues/{issue_number}",
        params: &[
            OWNER,
            REPO,
            ParamSpec::path_id("issue_number", "Issue number"),
            ParamSpec::body("title", "New title", ParamKind::String),
            ParamSpec::body("body", "New description", ParamKind::String),
            ParamSpec::body("state", "open or closed", ParamKind::String),
            ParamSpec::body("labels", "Replacement label names", ParamKind::StringArray),
        ],
    },
    EndpointSpec {
        name: "list_pull_requests",
        description: "List pull requests targeting the bound branch.",
        method: HttpMethod::Get,
        path: "/repos/{owner}/{repo}/pulls",
        params: &[
            OWNER,
            REPO,
            ParamSpec::query("base", "Base branch", ParamKind::String),
            ParamSpec::query("state", "open, closed or all", ParamKind::String),
            PER_PAGE,
            PAGE,
        ],
    },
    EndpointSpec {
        name: "get_pull_request",
        description: "Get one pull request of the repository.",
        method: HttpMethod::Get,
        path: "/repos/{owner}/{repo}/pulls/{pull_number}",
        params: &[OWNER, REPO, ParamSpec::path_id("pull_number", "Pull request number")],
    },
    EndpointSpec {
        name: "get_file_contents",
        description: "Read a file or list a directory on the bound branch.",
        method: HttpMethod::Get,
        path: "/repos/{owner}/{repo}/contents/{path}",
        params: &[
            OWNER,
            REPO,
            ParamSpec::path_text("path", "File or directory path inside the repository"),
            ParamSpec::query("ref", "Branch", ParamKind::String),
        ],
    },
    EndpointSpec {
        name: "list_workflow_runs",
        description: "List GitHub Actions workflow runs on the bound branch.",
        method: HttpMethod::Get,
        path: "/repos/{owner}/{repo}/actions/runs",
        params: &[
            OWNER,
            REPO,
            ParamSpec::query("branch", "Branch", ParamKind::String),
            ParamSpec::query("status", "e.g. completed, failure, in_progress", ParamKind::String),
            PER_PAGE,
            PAGE,
        ],
    },
    EndpointSpec {
        name: "list_commits",
        description: "List recent commits on the bound branch.",
        method: HttpMethod::Get,
        path: "/repos/{owner}/{repo}/commits",
        params: &[
            OWNER,
            REPO,
            ParamSpec::query("sha", "Branch", ParamKind::String),
            ParamSpec::query("path", "Only commits touching this path", ParamKind::String),
            PER_PAGE,
            PAGE,
        ],
    },
];

/// Parameters that carry the branch for each endpoint.
fn branch_param(endpoint: &str) -> Option<&'static str> {
    match endpoint {
        "list_pull_requests" => Some("base"),
        "get_file_contents" => Some("ref"),
        "list_workflow_runs" => Some("branch"),
        "list_commits" => Some("sha"),
        _ => None,
    }
}

/// Code search confined to the bound repository.
pub struct SearchCodeTool {
    client: Arc<dyn ApiClient>,
    binding: RepositoryBinding,
}

impl SearchCodeTool {
    pub fn scoped_query(&self, query: &str) -> Result<String, ToolError> {
        let lowered = query.to_ascii_lowercase();
        if ["repo:", "org:", "user:"].iter().any(|qualifier| lowered.contains(qualifier)) {
            return Err(ToolError::Rejected(format!(
                "Search is limited to {}; remove repo:, org: and user: qualifiers.",
                self.binding.repository
            )));
        }
        Ok(format!("{} repo:{}", query.trim(), self.binding.repository))
    }
}

#[async_trait]
impl Tool for SearchCodeTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "search_code".to_string(),
            description: "Search code in the repository. Searches the default branch index."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "query": { "type": "string", "description": "Search terms, e.g. `hosts: all extension:yml`" },
                    "per_page": { "type": "integer" }
                },
                "required": ["query"],
                "additionalProperties": false
            }),
        }
    }

    async fn execute(&self, arguments: Value) -> Result<ToolOutput, ToolError> {
        let query = arguments
            .get("query")
            .and_then(Value::as_str)
            .filter(|query| !query.trim().is_empty())
            .ok_or_else(|| ToolError::InvalidArguments("missing required parameter `query`".into()))?;

        let mut request = ApiRequest::new(HttpMethod::Get, "/search/code");
        request.query.push(("q".to_string(), self.scoped_query(query)?));
        if let Some(per_page) = arguments.get("per_page").and_then(Value::as_u64) {
            request.query.push(("per_page".to_string(), per_page.to_string()));
        }

        let value = self.client.send(request).await?;
        Ok(ToolOutput::json(&value))
    }
}

/// Every tool the GitHub worker may use for one binding.
pub fn github_registry(client: Arc<dyn ApiClient>, binding: &RepositoryBinding) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    for spec in REPOSITORY_ENDPOINTS {
        let mut tool = EndpointTool::new(*spec, client.clone())
            .bind("owner", binding.owner())
            .bind("repo", binding.name());
        if let Some(param) = branch_param(spec.name) {
            tool = tool.bind(param, binding.branch.as_str());
        }
        registry.register(tool);
    }
    registry.register(SearchCodeTool { client, binding: binding.clone() });
    registry
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use awxchat_core::RepositoryBinding;
    use serde_json::json;

    use awxchat_core::config::GithubConfig;

    use super::{github_registry, GithubClient};
    use crate::testing::RecordingApi;
    use crate::tools::endpoint::{ApiClient, ApiRequest, HttpMethod};
    use crate::tools::ToolError;

    fn binding() -> RepositoryBinding {
        RepositoryBinding::new("acme/playbooks", "main")
    }

    fn client(api_base_url: &str) -> GithubClient {
        GithubClient::from_config(&GithubConfig {
            enabled: true,
            token: Some("ghp_test".to_string().into()),
            api_base_url: api_base_url.to_string(),
            default_binding: Some(binding()),
            bindings: Default::default(),
        })
        .expect("client builds")
    }

    #[tokio::test]
    async fn options_requests_are_rejected_locally() {
        let error = client("http://127.0.0.1:9")
            .send(ApiRequest::new(HttpMethod::Options, "/repos/acme/playbooks"))
            .await
            .expect_err("options unsupported");

        assert!(matches!(error, ToolError::Rejected(_)), "{error:?}");
    }

    #[tokio::test]
    async fn unreachable_api_surfaces_as_upstream_failure() {
        let error = client("http://127.0.0.1:9")
            .send(ApiRequest::new(HttpMethod::Get, "/repos/acme/playbooks"))
            .await
            .expect_err("nothing listens on the discard port");

        assert!(matches!(error, ToolError::Upstream { service: "github", .. }), "{error:?}");
    }

    #[test]
    fn schemas_never_accept_repository_or_branch() {
        let registry = github_registry(Arc::new(RecordingApi::returning(json!({}))), &binding());
        for definition in registry.definitions() {
            let properties = &definition.parameters["properties"];
            for forbidden in ["owner", "repo", "base", "ref", "branch", "sha"] {
                assert!(
                    properties.get(forbidden).is_none(),
                    "{} exposes {forbidden}",
                    definition.name
                );
            }
            assert_eq!(definition.parameters["additionalProperties"], json!(false));
        }
    }

    #[tokio::test]
    async fn file_reads_are_pinned_to_bound_branch() {
        let api = Arc::new(RecordingApi::returning(json!({"name": "site.yml"})));
        let registry = github_registry(api.clone(), &binding());

        let output =
            registry.invoke("get_file_contents", json!({"path": "roles/web/tasks/main.yml"})).await;

        assert!(!output.is_error, "{}", output.content);
        let sent = api.requests();
        assert_eq!(sent[0].path, "/repos/acme/playbooks/contents/roles/web/tasks/main.yml");
        assert_eq!(sent[0].query, vec![("ref".to_string(), "main".to_string())]);
    }

    #[tokio::test]
    async fn supplying_another_repository_fails_validation() {
        let api = Arc::new(RecordingApi::returning(json!([])));
        let registry = github_registry(api.clone(), &binding());

        let output = registry.invoke("list_issues", json!({"repo": "other"})).await;

        assert!(output.is_error);
        assert!(api.requests().is_empty());
    }

    #[tokio::test]
    async fn code_search_is_qualified_with_bound_repository() {
        let api = Arc::new(RecordingApi::returning(json!({"total_count": 0, "items": []})));
        let registry = github_registry(api.clone(), &binding());

        let output = registry.invoke("search_code", json!({"query": "become: true"})).await;
        assert!(!output.is_error, "{}", output.content);
        assert_eq!(
            api.requests()[0].query[0],
            ("q".to_string(), "become: true repo:acme/playbooks".to_string())
        );

        let escaped = registry.invoke("search_code", json!({"query": "token repo:evil/leak"})).await;
        assert!(escaped.is_error);
        assert_eq!(api.requests().len(), 1);
    }

    #[tokio::test]
    async fn created_issue_goes_to_bound_repository() {
        let api = Arc::new(RecordingApi::returning(json!({"number": 12})));
        let registry = github_registry(api.clone(), &binding());

        let output = registry
            .invoke("create_issue", json!({"title": "Fix inventory", "labels": ["bug"]}))
            .await;

        assert!(!output.is_error, "{}", output.content);
        let sent = &api.requests()[0];
        assert_eq!(sent.path, "/repos/acme/playbooks/issues");
        assert_eq!(sent.body, Some(json!({"title": "Fix inventory", "labels": ["bug"]})));
    }
}

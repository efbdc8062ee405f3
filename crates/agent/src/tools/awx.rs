//! AWX capability bundle: authenticated client, discovery meta-tools, the
//! manual-project staging tool, and explicit per-resource wrappers.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Map, Value};
use tracing::info;

use awxchat_core::config::AwxConfig;

use super::endpoint::{
    execute_http, ApiClient, ApiRequest, EndpointSpec, EndpointTool, HttpMethod, ParamKind,
    ParamSpec,
};
use super::{Tool, ToolError, ToolOutput, ToolRegistry};
use crate::llm::ToolDefinition;

const SERVICE: &str = "awx";
const PROJECTS_PATH: &str = "/api/v2/projects/";
const SCM_TYPES: &[&str] = &["manual", "git", "svn", "insights", "archive"];

#[derive(Clone)]
enum AwxAuth {
    Bearer(SecretString),
    Basic { username: String, password: SecretString },
    Anonymous,
}

/// Shared HTTP client for one AWX controller.
#[derive(Clone)]
pub struct AwxClient {
    http: reqwest::Client,
    base_url: String,
    auth: AwxAuth,
}

impl AwxClient {
    pub fn from_config(config: &AwxConfig) -> Result<Self, ToolError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .danger_accept_invalid_certs(!config.verify_tls)
            .build()
            .map_err(|source| ToolError::Transport { service: SERVICE, source })?;

        let auth = match (&config.token, &config.username, &config.password) {
            (Some(token), _, _) => AwxAuth::Bearer(token.clone()),
            (None, Some(username), Some(password)) => {
                AwxAuth::Basic { username: username.clone(), password: password.clone() }
            }
            _ => AwxAuth::Anonymous,
        };

        Ok(Self { http, base_url: config.base_url.trim_end_matches('/').to_string(), auth })
    }

    /// Same controller, authenticating as another account.
    pub fn with_credentials(&self, username: impl Into<String>, password: SecretString) -> Self {
        Self {
            http: self.http.clone(),
            base_url: self.base_url.clone(),
            auth: AwxAuth::Basic { username: username.into(), password },
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// `GET /api/v2/me/` for the authenticated account.
    pub async fn current_user(&self) -> Result<Value, ToolError> {
        self.send(ApiRequest::new(HttpMethod::Get, "/api/v2/me/")).await
    }

    pub async fn ping(&self) -> Result<Value, ToolError> {
        self.send(ApiRequest::new(HttpMethod::Get, "/api/v2/ping/")).await
    }
}

#[async_trait]
impl ApiClient for AwxClient {
    fn service(&self) -> &'static str {
        SERVICE
    }

    async fn send(&self, request: ApiRequest) -> Result<Value, ToolError> {
        let url = format!("{}{}", self.base_url, request.path);
        let mut builder = self.http.request(request.method.to_reqwest(), url);
        builder = match &self.auth {
            AwxAuth::Bearer(token) => builder.bearer_auth(token.expose_secret()),
            AwxAuth::Basic { username, password } => {
                builder.basic_auth(username, Some(password.expose_secret()))
            }
            AwxAuth::Anonymous => builder,
        };
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }
        execute_http(SERVICE, builder).await
    }
}

/// Normalizes a model-supplied API path: must stay under `/api/`, may not
/// be absolute or traverse upwards, and always ends with a slash.
pub fn normalize_api_path(raw: &str) -> Result<String, ToolError> {
    let trimmed = raw.trim();
    if trimmed.contains("://") || trimmed.split(['/', '?']).any(|segment| segment == "..") {
        return Err(ToolError::InvalidArguments(format!(
            "`{trimmed}` must be a relative AWX API path such as /api/v2/inventories/"
        )));
    }

    let (path, query) = match trimmed.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (trimmed, None),
    };
    let mut path = if path.starts_with('/') { path.to_string() } else { format!("/{path}") };
    if !path.starts_with("/api/") {
        return Err(ToolError::InvalidArguments(format!(
            "`{trimmed}` is outside the AWX API; paths start with /api/"
        )));
    }
    if !path.ends_with('/') {
        path.push('/');
    }

    Ok(match query {
        Some(query) if !query.is_empty() => format!("{path}?{query}"),
        _ => path,
    })
}

/// The directory AWX scans for manual-SCM project content.
#[derive(Clone, Debug)]
pub struct ProjectStaging {
    root: PathBuf,
}

impl ProjectStaging {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// AWX only accepts a directory directly under the projects root.
    pub fn project_dir(&self, local_path: &str) -> Result<PathBuf, ToolError> {
        Ok(self.root.join(single_component(local_path, "path")?))
    }

    pub async fn is_staged(&self, local_path: &str) -> bool {
        match self.project_dir(local_path) {
            Ok(dir) => tokio::fs::metadata(dir).await.is_ok_and(|meta| meta.is_dir()),
            Err(_) => false,
        }
    }

    pub async fn add(
        &self,
        local_path: &str,
        filename: &str,
        content: &str,
    ) -> Result<PathBuf, ToolError> {
        let dir = self.project_dir(local_path)?;
        let file = dir.join(single_component(filename, "filename")?);
        tokio::fs::create_dir_all(&dir).await?;
        tokio::fs::write(&file, content).await?;
        Ok(file)
    }

    /// Returns whether anything was removed.
    pub async fn remove(&self, local_path: &str) -> Result<bool, ToolError> {
        let dir = self.project_dir(local_path)?;
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(true),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(error) => Err(error.into()),
        }
    }

    async fn require_staged(&self, body: &Value) -> Result<(), ToolError> {
        let local_path = body
            .get("local_path")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|path| !path.is_empty())
            .ok_or_else(|| {
                ToolError::Rejected(
                    "A manual project needs `local_path`. Ask the user for the project path, \
                     playbook filename and content, stage them with check_project_manual_path \
                     (type=add), then retry."
                        .to_string(),
                )
            })?;

        if self.is_staged(local_path).await {
            return Ok(());
        }
        let shown = self
            .project_dir(local_path)
            .map(|dir| dir.display().to_string())
            .unwrap_or_else(|_| local_path.to_string());
        Err(ToolError::Rejected(format!(
            "The manual project directory `{shown}` is not staged. Call \
             check_project_manual_path with type=add first; no project was created."
        )))
    }
}

fn single_component<'a>(value: &'a str, field: &str) -> Result<&'a str, ToolError> {
    let trimmed = value.trim();
    let mut components = Path::new(trimmed).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(trimmed),
        _ => Err(ToolError::InvalidArguments(format!(
            "`{field}` must be a single relative name without slashes or `..`"
        ))),
    }
}

fn string_arg<'a>(arguments: &'a Value, name: &str) -> Result<&'a str, ToolError> {
    arguments
        .get(name)
        .and_then(Value::as_str)
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| ToolError::InvalidArguments(format!("missing required parameter `{name}`")))
}

/// True for project collection paths, top-level or nested under another
/// resource (`/api/v2/organizations/1/projects/`), with any query ignored.
fn creates_project(path: &str) -> bool {
    let path = path.split_once('?').map_or(path, |(path, _)| path);
    path.trim_end_matches('/').rsplit('/').next() == Some("projects")
}

fn is_manual_project(body: Option<&Value>) -> bool {
    body.and_then(|body| body.get("scm_type")).and_then(Value::as_str) == Some("manual")
}

/// `GET /api/v2/`: the catalogue of top-level endpoints.
pub struct ListApiPathsTool {
    client: Arc<dyn ApiClient>,
}

#[async_trait]
impl Tool for ListApiPathsTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "list_api_paths".to_string(),
            description: "List every top-level AWX API v2 endpoint and its path. Use this to \
                          discover which endpoint serves a request."
                .to_string(),
            parameters: json!({ "type": "object", "properties": {}, "additionalProperties": false }),
        }
    }

    async fn execute(&self, _arguments: Value) -> Result<ToolOutput, ToolError> {
        let value = self.client.send(ApiRequest::new(HttpMethod::Get, "/api/v2/")).await?;
        Ok(ToolOutput::json(&value))
    }
}

/// `OPTIONS <endpoint>`: description, allowed actions, and field schema.
pub struct DocumentSearchTool {
    client: Arc<dyn ApiClient>,
}

#[async_trait]
impl Tool for DocumentSearchTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "document_search".to_string(),
            description: "Read the documentation of one AWX API endpoint: description, allowed \
                          methods and the fields each method accepts. Always call this before \
                          call_awx_api."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "endpoint": {
                        "type": "string",
                        "description": "Endpoint path, e.g. /api/v2/job_templates/"
                    }
                },
                "required": ["endpoint"],
                "additionalProperties": false
            }),
        }
    }

    async fn execute(&self, arguments: Value) -> Result<ToolOutput, ToolError> {
        let path = normalize_api_path(string_arg(&arguments, "endpoint")?)?;
        let value = self.client.send(ApiRequest::new(HttpMethod::Options, path.clone())).await?;

        let mut document = Map::new();
        document.insert("endpoint".to_string(), json!(path));
        for key in ["name", "description", "actions", "search_fields", "related_search_fields"] {
            if let Some(field) = value.get(key) {
                document.insert(key.to_string(), field.clone());
            }
        }
        if document.len() == 1 {
            document.insert("raw".to_string(), value);
        }
        Ok(ToolOutput::json(&Value::Object(document)))
    }
}

/// Generic call against any AWX API path.
pub struct CallAwxApiTool {
    client: Arc<dyn ApiClient>,
    staging: ProjectStaging,
}

#[async_trait]
impl Tool for CallAwxApiTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "call_awx_api".to_string(),
            description: "Call an AWX API v2 endpoint with the method, query parameters and body \
                          described by document_search."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "method": {
                        "type": "string",
                        "enum": ["GET", "POST", "PUT", "PATCH", "DELETE", "OPTIONS"]
                    },
                    "path": { "type": "string", "description": "e.g. /api/v2/inventories/" },
                    "params": { "type": "object", "description": "Query string parameters" },
                    "body": { "type": "object", "description": "JSON request body" }
                },
                "required": ["method", "path"],
                "additionalProperties": false
            }),
        }
    }

    async fn execute(&self, arguments: Value) -> Result<ToolOutput, ToolError> {
        let method = HttpMethod::parse(string_arg(&arguments, "method")?).ok_or_else(|| {
            ToolError::InvalidArguments("unsupported HTTP method".to_string())
        })?;
        let path = normalize_api_path(string_arg(&arguments, "path")?)?;
        let body = arguments.get("body").filter(|body| body.is_object()).cloned();

        if method == HttpMethod::Post && creates_project(&path) && is_manual_project(body.as_ref()) {
            if let Some(body) = &body {
                self.staging.require_staged(body).await?;
            }
        }

        let mut request = ApiRequest::new(method, path);
        if let Some(params) = arguments.get("params").and_then(Value::as_object) {
            request.query = params
                .iter()
                .map(|(key, value)| {
                    let text = value.as_str().map(str::to_owned).unwrap_or_else(|| value.to_string());
                    (key.clone(), text)
                })
                .collect();
        }
        if method.allows_body() {
            request.body = body;
        }

        let value = self.client.send(request).await?;
        Ok(ToolOutput::json(&value))
    }
}

/// Stages or removes the on-disk directory a manual project points at.
pub struct CheckProjectManualPathTool {
    staging: ProjectStaging,
}

#[async_trait]
impl Tool for CheckProjectManualPathTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "check_project_manual_path".to_string(),
            description: "Prepare the local directory of a manual-SCM project. type=add writes \
                          <path>/<filename> with content before the project is created; \
                          type=remove deletes <path> after the project is deleted."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "type": { "type": "string", "enum": ["add", "remove"] },
                    "path": { "type": "string", "description": "Project directory name (local_path)" },
                    "filename": { "type": "string", "description": "Playbook file name, add only" },
                    "content": { "type": "string", "description": "Playbook content, add only" }
                },
                "required": ["type", "path"],
                "additionalProperties": false
            }),
        }
    }

    async fn execute(&self, arguments: Value) -> Result<ToolOutput, ToolError> {
        let path = string_arg(&arguments, "path")?;
        match string_arg(&arguments, "type")? {
            "add" => {
                let filename = string_arg(&arguments, "filename")?;
                let content = arguments.get("content").and_then(Value::as_str).unwrap_or_default();
                let file = self.staging.add(path, filename, content).await?;
                info!(event_name = "agent.awx.project_staged", path = %file.display());
                Ok(ToolOutput::json(&json!({
                    "status": "success",
                    "local_path": path,
                    "file": file.display().to_string(),
                })))
            }
            "remove" => {
                let removed = self.staging.remove(path).await?;
                Ok(ToolOutput::json(&json!({
                    "status": "success",
                    "local_path": path,
                    "removed": removed,
                })))
            }
            other => Err(ToolError::InvalidArguments(format!("unknown type `{other}`"))),
        }
    }
}

/// Explicit project creation with the manual-SCM pre-check.
pub struct CreateProjectTool {
    client: Arc<dyn ApiClient>,
    staging: ProjectStaging,
}

const CREATE_PROJECT: EndpointSpec = EndpointSpec {
    name: "create_project",
    description: "Create a project. scm_type manual needs local_path staged with \
                  check_project_manual_path first; other types need scm_url.",
    method: HttpMethod::Post,
    path: PROJECTS_PATH,
    params: &[
        ParamSpec::body("name", "Project name", ParamKind::String).required(),
        ParamSpec::body("organization", "Organization id", ParamKind::Integer).required(),
        ParamSpec::body("scm_type", "manual, git, svn, insights or archive", ParamKind::String)
            .required(),
        ParamSpec::body("scm_url", "Repository URL", ParamKind::String),
        ParamSpec::body("scm_branch", "Branch, tag or commit", ParamKind::String),
        ParamSpec::body("credential", "SCM credential id", ParamKind::Integer),
        ParamSpec::body("local_path", "Directory under the projects root", ParamKind::String),
        ParamSpec::body("description", "Description", ParamKind::String),
    ],
};

#[async_trait]
impl Tool for CreateProjectTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: CREATE_PROJECT.name.to_string(),
            description: CREATE_PROJECT.description.to_string(),
            parameters: CREATE_PROJECT.input_schema(&[]),
        }
    }

    async fn execute(&self, arguments: Value) -> Result<ToolOutput, ToolError> {
        let scm_type = string_arg(&arguments, "scm_type")?;
        if !SCM_TYPES.contains(&scm_type) {
            return Err(ToolError::InvalidArguments(format!(
                "scm_type must be one of: {}",
                SCM_TYPES.join(", ")
            )));
        }
        if scm_type == "manual" {
            self.staging.require_staged(&arguments).await?;
        } else if string_arg(&arguments, "scm_url").is_err() {
            return Err(ToolError::InvalidArguments(
                "scm_url is required for non-manual projects".to_string(),
            ));
        }

        EndpointTool::new(CREATE_PROJECT, self.client.clone()).execute(arguments).await
    }
}

const PAGE_SIZE: ParamSpec = ParamSpec::query("page_size", "Items per page", ParamKind::Integer);
const PAGE: ParamSpec = ParamSpec::query("page", "Page number, from 1", ParamKind::Integer);
const SEARCH: ParamSpec = ParamSpec::query("search", "Free-text filter", ParamKind::String);

/// Explicit wrappers over the same call path as `call_awx_api`.
pub const RESOURCE_ENDPOINTS: &[EndpointSpec] = &[
    EndpointSpec {
        name: "list_inventories",
        description: "List inventories.",
        method: HttpMethod::Get,
        path: "/api/v2/inventories/",
        params: &[PAGE_SIZE, PAGE, SEARCH],
    },
    EndpointSpec {
        name: "get_inventory",
        description: "Get one inventory.",
        method: HttpMethod::Get,
        path: "/api/v2/inventories/{inventory_id}/",
        params: &[ParamSpec::path_id("inventory_id", "Inventory id")],
    },
    EndpointSpec {
        name: "create_inventory",
        description: "Create an inventory in an organization.",
        method: HttpMethod::Post,
        path: "/api/v2/inventories/",
        params: &[
            ParamSpec::body("name", "Inventory name", ParamKind::String).required(),
            ParamSpec::body("organization", "Organization id", ParamKind::Integer).required(),
            ParamSpec::body("description", "Description", ParamKind::String),
            ParamSpec::body("variables", "Inventory variables as YAML or JSON text", ParamKind::String),
        ],
    },
    EndpointSpec {
        name: "update_inventory",
        description: "Update fields of an inventory.",
        method: HttpMethod::Patch,
        path: "/api/v2/inventories/{inventory_id}/",
        params: &[
            ParamSpec::path_id("inventory_id", "Inventory id"),
            ParamSpec::body("name", "New name", ParamKind::String),
            ParamSpec::body("description", "New description", ParamKind::String),
        ],
    },
    EndpointSpec {
        name: "delete_inventory",
        description: "Delete an inventory.",
        method: HttpMethod::Delete,
        path: "/api/v2/inventories/{inventory_id}/",
        params: &[ParamSpec::path_id("inventory_id", "Inventory id")],
    },
    EndpointSpec {
        name: "list_hosts",
        description: "List hosts, optionally only those of one inventory.",
        method: HttpMethod::Get,
        path: "/api/v2/hosts/",
        params: &[
            ParamSpec::query("inventory", "Inventory id filter", ParamKind::Integer),
            PAGE_SIZE,
            PAGE,
            SEARCH,
        ],
    },
    EndpointSpec {
        name: "get_host",
        description: "Get one host.",
        method: HttpMethod::Get,
        path: "/api/v2/hosts/{host_id}/",
        params: &[ParamSpec::path_id("host_id", "Host id")],
    },
    EndpointSpec {
        name: "create_host",
        description: "Add a host to an inventory.",
        method: HttpMethod::Post,
        path: "/api/v2/hosts/",
        params: &[
            ParamSpec::body("name", "Host name or address", ParamKind::String).required(),
            ParamSpec::body("inventory", "Inventory id", ParamKind::Integer).required(),
            ParamSpec::body("variables", "Host variables as YAML or JSON text", ParamKind::String),
            ParamSpec::body("description", "Description", ParamKind::String),
        ],
    },
    EndpointSpec {
        name: "update_host",
        description: "Update fields of a host.",
        method: HttpMethod::Patch,
        path: "/api/v2/hosts/{host_id}/",
        params: &[
            ParamSpec::path_id("host_id", "Host id"),
            ParamSpec::body("name", "New name", ParamKind::String),
            ParamSpec::body("variables", "New variables", ParamKind::String),
            ParamSpec::body("description", "New description", ParamKind::String),
            ParamSpec::body("enabled", "Enable or disable the host", ParamKind::Boolean),
        ],
    },
    EndpointSpec {
        name: "delete_host",
        description: "Delete a host.",
        method: HttpMethod::Delete,
        path: "/api/v2/hosts/{host_id}/",
        params: &[ParamSpec::path_id("host_id", "Host id")],
    },
    EndpointSpec {
        name: "list_job_templates",
        description: "List job templates.",
        method: HttpMethod::Get,
        path: "/api/v2/job_templates/",
        params: &[PAGE_SIZE, PAGE, SEARCH],
    },
    EndpointSpec {
        name: "get_job_template",
        description: "Get one job template.",
        method: HttpMethod::Get,
        path: "/api/v2/job_templates/{template_id}/",
        params: &[ParamSpec::path_id("template_id", "Job template id")],
    },
    EndpointSpec {
        name: "create_job_template",
        description: "Create a job template running a playbook of a project against an inventory.",
        method: HttpMethod::Post,
        path: "/api/v2/job_templates/",
        params: &[
            ParamSpec::body("name", "Template name", ParamKind::String).required(),
            ParamSpec::body("inventory", "Inventory id", ParamKind::Integer).required(),
            ParamSpec::body("project", "Project id", ParamKind::Integer).required(),
            ParamSpec::body("playbook", "Playbook file, e.g. site.yml", ParamKind::String).required(),
            ParamSpec::body("job_type", "run or check", ParamKind::String),
            ParamSpec::body("extra_vars", "Extra variables as YAML or JSON text", ParamKind::String),
            ParamSpec::body("description", "Description", ParamKind::String),
        ],
    },
    EndpointSpec {
        name: "launch_job_template",
        description: "Launch a job from a job template.",
        method: HttpMethod::Post,
        path: "/api/v2/job_templates/{template_id}/launch/",
        params: &[
            ParamSpec::path_id("template_id", "Job template id"),
            ParamSpec::body("extra_vars", "Variables overriding the template's", ParamKind::Object),
            ParamSpec::body("limit", "Host pattern limit", ParamKind::String),
        ],
    },
    EndpointSpec {
        name: "list_jobs",
        description: "List jobs, optionally filtered by status (pending, running, successful, failed, canceled).",
        method: HttpMethod::Get,
        path: "/api/v2/jobs/",
        params: &[
            ParamSpec::query("status", "Job status filter", ParamKind::String),
            ParamSpec::query("order_by", "Sort field, e.g. -created", ParamKind::String),
            PAGE_SIZE,
            PAGE,
        ],
    },
    EndpointSpec {
        name: "get_job",
        description: "Get one job with its status.",
        method: HttpMethod::Get,
        path: "/api/v2/jobs/{job_id}/",
        params: &[ParamSpec::path_id("job_id", "Job id")],
    },
    EndpointSpec {
        name: "cancel_job",
        description: "Cancel a pending or running job.",
        method: HttpMethod::Post,
        path: "/api/v2/jobs/{job_id}/cancel/",
        params: &[ParamSpec::path_id("job_id", "Job id")],
    },
    EndpointSpec {
        name: "get_job_stdout",
        description: "Get the output of a job. Use format json for structured content.",
        method: HttpMethod::Get,
        path: "/api/v2/jobs/{job_id}/stdout/",
        params: &[
            ParamSpec::path_id("job_id", "Job id"),
            ParamSpec::query("format", "txt, ansi, html or json", ParamKind::String),
        ],
    },
    EndpointSpec {
        name: "list_projects",
        description: "List projects.",
        method: HttpMethod::Get,
        path: PROJECTS_PATH,
        params: &[PAGE_SIZE, PAGE, SEARCH],
    },
    EndpointSpec {
        name: "get_project",
        description: "Get one project.",
        method: HttpMethod::Get,
        path: "/api/v2/projects/{project_id}/",
        params: &[ParamSpec::path_id("project_id", "Project id")],
    },
    EndpointSpec {
        name: "list_organizations",
        description: "List organizations.",
        method: HttpMethod::Get,
        path: "/api/v2/organizations/",
        params: &[PAGE_SIZE, PAGE, SEARCH],
    },
    EndpointSpec {
        name: "get_organization",
        description: "Get one organization.",
        method: HttpMethod::Get,
        path: "/api/v2/organizations/{organization_id}/",
        params: &[ParamSpec::path_id("organization_id", "Organization id")],
    },
    EndpointSpec {
        name: "create_organization",
        description: "Create an organization.",
        method: HttpMethod::Post,
        path: "/api/v2/organizations/",
        params: &[
            ParamSpec::body("name", "Organization name", ParamKind::String).required(),
            ParamSpec::body("description", "Description", ParamKind::String),
        ],
    },
    EndpointSpec {
        name: "list_credentials",
        description: "List credentials (secrets are never returned by AWX).",
        method: HttpMethod::Get,
        path: "/api/v2/credentials/",
        params: &[PAGE_SIZE, PAGE, SEARCH],
    },
    EndpointSpec {
        name: "get_credential",
        description: "Get one credential.",
        method: HttpMethod::Get,
        path: "/api/v2/credentials/{credential_id}/",
        params: &[ParamSpec::path_id("credential_id", "Credential id")],
    },
    EndpointSpec {
        name: "list_users",
        description: "List users.",
        method: HttpMethod::Get,
        path: "/api/v2/users/",
        params: &[PAGE_SIZE, PAGE, SEARCH],
    },
    EndpointSpec {
        name: "get_user",
        description: "Get one user.",
        method: HttpMethod::Get,
        path: "/api/v2/users/{user_id}/",
        params: &[ParamSpec::path_id("user_id", "User id")],
    },
    EndpointSpec {
        name: "get_ping",
        description: "Controller health: version, instances and capacity.",
        method: HttpMethod::Get,
        path: "/api/v2/ping/",
        params: &[],
    },
    EndpointSpec {
        name: "get_config",
        description: "Controller configuration, including the AWX and Ansible versions.",
        method: HttpMethod::Get,
        path: "/api/v2/config/",
        params: &[],
    },
    EndpointSpec {
        name: "get_dashboard",
        description: "Dashboard counts of hosts, inventories, projects and jobs.",
        method: HttpMethod::Get,
        path: "/api/v2/dashboard/",
        params: &[],
    },
];

/// Every tool the AWX worker may use.
pub fn awx_registry(client: Arc<dyn ApiClient>, staging: ProjectStaging) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(ListApiPathsTool { client: client.clone() });
    registry.register(DocumentSearchTool { client: client.clone() });
    registry.register(CallAwxApiTool { client: client.clone(), staging: staging.clone() });
    registry.register(CheckProjectManualPathTool { staging: staging.clone() });
    registry.register(CreateProjectTool { client: client.clone(), staging });
    for spec in RESOURCE_ENDPOINTS {
        registry.register(EndpointTool::new(*spec, client.clone()));
    }
    registry
}

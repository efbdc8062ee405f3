//! Declarative REST endpoint tools: one `EndpointSpec` describes one call,
//! one `EndpointTool` performs it through an `ApiClient`.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use super::{Tool, ToolError, ToolOutput};
use crate::llm::ToolDefinition;

/// Longest slice of an error or non-JSON body kept in tool output.
pub const BODY_EXCERPT_CHARS: usize = 1000;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Options,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
            Self::Options => "OPTIONS",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "GET" => Some(Self::Get),
            "POST" => Some(Self::Post),
            "PUT" => Some(Self::Put),
            "PATCH" => Some(Self::Patch),
            "DELETE" => Some(Self::Delete),
            "OPTIONS" => Some(Self::Options),
            _ => None,
        }
    }

    pub fn allows_body(&self) -> bool {
        matches!(self, Self::Post | Self::Put | Self::Patch)
    }

    pub fn to_reqwest(self) -> reqwest::Method {
        match self {
            Self::Get => reqwest::Method::GET,
            Self::Post => reqwest::Method::POST,
            Self::Put => reqwest::Method::PUT,
            Self::Patch => reqwest::Method::PATCH,
            Self::Delete => reqwest::Method::DELETE,
            Self::Options => reqwest::Method::OPTIONS,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParamLocation {
    Path,
    Query,
    Body,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParamKind {
    Integer,
    String,
    Boolean,
    Object,
    StringArray,
}

impl ParamKind {
    fn schema(&self) -> Value {
        match self {
            Self::Integer => json!({ "type": "integer" }),
            Self::String => json!({ "type": "string" }),
            Self::Boolean => json!({ "type": "boolean" }),
            Self::Object => json!({ "type": "object" }),
            Self::StringArray => json!({ "type": "array", "items": { "type": "string" } }),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ParamSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub kind: ParamKind,
    pub location: ParamLocation,
    pub required: bool,
}

impl ParamSpec {
    pub const fn path_id(name: &'static str, description: &'static str) -> Self {
        Self { name, description, kind: ParamKind::Integer, location: ParamLocation::Path, required: true }
    }

    pub const fn path_text(name: &'static str, description: &'static str) -> Self {
        Self { name, description, kind: ParamKind::String, location: ParamLocation::Path, required: true }
    }

    pub const fn query(name: &'static str, description: &'static str, kind: ParamKind) -> Self {
        Self { name, description, kind, location: ParamLocation::Query, required: false }
    }

    pub const fn body(name: &'static str, description: &'static str, kind: ParamKind) -> Self {
        Self { name, description, kind, location: ParamLocation::Body, required: false }
    }

    pub const fn required(mut self) -> Self {
        self.required = true;
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EndpointSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub method: HttpMethod,
    /// Path template with `{param}` placeholders.
    pub path: &'static str,
    pub params: &'static [ParamSpec],
}

impl EndpointSpec {
    /// JSON schema for the parameters the model may supply. Bound
    /// parameters are not part of it, and nothing else is accepted.
    pub fn input_schema(&self, bound: &[&str]) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();
        for param in self.params.iter().filter(|param| !bound.contains(&param.name)) {
            let mut schema = param.kind.schema();
            schema["description"] = json!(param.description);
            properties.insert(param.name.to_string(), schema);
            if param.required {
                required.push(json!(param.name));
            }
        }

        json!({
            "type": "object",
            "properties": properties,
            "required": required,
            "additionalProperties": false
        })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ApiRequest {
    pub method: HttpMethod,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl ApiRequest {
    pub fn new(method: HttpMethod, path: impl Into<String>) -> Self {
        Self { method, path: path.into(), query: Vec::new(), body: None }
    }
}

/// Authenticated access to one REST service.
#[async_trait]
pub trait ApiClient: Send + Sync {
    fn service(&self) -> &'static str;

    async fn send(&self, request: ApiRequest) -> Result<Value, ToolError>;
}

/// Executes a prepared reqwest call and normalizes its response.
pub async fn execute_http(
    service: &'static str,
    request: reqwest::RequestBuilder,
) -> Result<Value, ToolError> {
    let response =
        request.send().await.map_err(|source| ToolError::Transport { service, source })?;
    let status = response.status().as_u16();
    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned);
    let text = response.text().await.map_err(|source| ToolError::Transport { service, source })?;
    normalize_response(service, status, content_type.as_deref(), &text)
}

/// Turns a raw HTTP response into the JSON handed to the model.
pub fn normalize_response(
    service: &'static str,
    status: u16,
    content_type: Option<&str>,
    body: &str,
) -> Result<Value, ToolError> {
    if status >= 400 {
        return Err(ToolError::Status { service, status, body: excerpt(body) });
    }
    if status == 204 {
        return Ok(json!({ "status": "success" }));
    }
    if body.trim().is_empty() {
        return Ok(json!({ "status": "success", "message": "Empty response" }));
    }

    let declared_json = content_type.is_some_and(|value| value.contains("json"));
    match serde_json::from_str::<Value>(body) {
        Ok(value) => Ok(value),
        Err(error) if declared_json => {
            Err(ToolError::MalformedResponse { service, detail: error.to_string() })
        }
        Err(_) => Ok(json!({
            "status": status,
            "content_type": content_type.unwrap_or("unknown"),
            "text": excerpt(body),
        })),
    }
}

pub fn excerpt(text: &str) -> String {
    text.chars().take(BODY_EXCERPT_CHARS).collect()
}

/// A tool that performs the call described by one `EndpointSpec`.
pub struct EndpointTool {
    spec: EndpointSpec,
    client: Arc<dyn ApiClient>,
    bound: Vec<(&'static str, Value)>,
}

impl EndpointTool {
    pub fn new(spec: EndpointSpec, client: Arc<dyn ApiClient>) -> Self {
        Self { spec, client, bound: Vec::new() }
    }

    /// Fixes a parameter to `value` and hides it from the model.
    pub fn bind(mut self, name: &'static str, value: impl Into<Value>) -> Self {
        self.bound.push((name, value.into()));
        self
    }

    pub fn spec(&self) -> &EndpointSpec {
        &self.spec
    }

    fn bound_names(&self) -> Vec<&str> {
        self.bound.iter().map(|(name, _)| *name).collect()
    }

    fn lookup<'a>(&'a self, arguments: &'a Map<String, Value>, name: &str) -> Option<&'a Value> {
        self.bound
            .iter()
            .find(|(bound, _)| *bound == name)
            .map(|(_, value)| value)
            .or_else(|| arguments.get(name))
    }

    pub fn build_request(&self, arguments: &Value) -> Result<ApiRequest, ToolError> {
        let empty = Map::new();
        let arguments = arguments.as_object().unwrap_or(&empty);
        let mut request = ApiRequest::new(self.spec.method, self.spec.path);
        let mut body = Map::new();

        for param in self.spec.params {
            let Some(value) = self.lookup(arguments, param.name).filter(|value| !value.is_null())
            else {
                if param.required {
                    return Err(ToolError::InvalidArguments(format!(
                        "missing required parameter `{}`",
                        param.name
                    )));
                }
                continue;
            };

            match param.location {
                ParamLocation::Path => {
                    let segment = scalar_text(value);
                    if segment.is_empty() || segment.split('/').any(|part| part == "..") {
                        return Err(ToolError::InvalidArguments(format!(
                            "parameter `{}` is not a valid path segment",
                            param.name
                        )));
                    }
                    request.path = request.path.replace(&format!("{{{}}}", param.name), &segment);
                }
                ParamLocation::Query => {
                    request.query.push((param.name.to_string(), scalar_text(value)));
                }
                ParamLocation::Body => {
                    body.insert(param.name.to_string(), value.clone());
                }
            }
        }

        if self.spec.method.allows_body() && !body.is_empty() {
            request.body = Some(Value::Object(body));
        }
        Ok(request)
    }
}

#[async_trait]
impl Tool for EndpointTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.spec.name.to_string(),
            description: self.spec.description.to_string(),
            parameters: self.spec.input_schema(&self.bound_names()),
        }
    }

    async fn execute(&self, arguments: Value) -> Result<ToolOutput, ToolError> {
        let request = self.build_request(&arguments)?;
        let value = self.client.send(request).await?;
        Ok(ToolOutput::json(&value))
    }
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Array(items) => {
            items.iter().map(scalar_text).collect::<Vec<_>>().join(",")
        }
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::{
        normalize_response, EndpointSpec, EndpointTool, HttpMethod, ParamKind, ParamSpec,
    };
    use crate::testing::RecordingApi;
    use crate::tools::{Tool, ToolError};

    const UPDATE_HOST: EndpointSpec = EndpointSpec {
        name: "update_host",
        description: "Update a host",
        method: HttpMethod::Patch,
        path: "/api/v2/hosts/{id}/",
        params: &[
            ParamSpec::path_id("id", "Host id"),
            ParamSpec::body("name", "New name", ParamKind::String),
            ParamSpec::body("enabled", "Enable the host", ParamKind::Boolean),
            ParamSpec::query("dry_run", "Validate only", ParamKind::Boolean),
        ],
    };

    #[test]
    fn no_content_is_success() {
        assert_eq!(normalize_response("awx", 204, None, "").ok(), Some(json!({"status": "success"})));
    }

    #[test]
    fn empty_body_is_success_with_message() {
        assert_eq!(
            normalize_response("awx", 200, Some("application/json"), "  ").ok(),
            Some(json!({"status": "success", "message": "Empty response"}))
        );
    }

    #[test]
    fn non_json_body_is_wrapped_with_excerpt() {
        let body = "x".repeat(1500);
        let value = normalize_response("awx", 200, Some("text/plain"), &body).expect("wrapped");
        assert_eq!(value["status"], json!(200));
        assert_eq!(value["content_type"], json!("text/plain"));
        assert_eq!(value["text"].as_str().map(str::len), Some(1000));
    }

    #[test]
    fn error_status_is_a_tool_error() {
        let error = normalize_response("awx", 404, Some("application/json"), "{\"detail\":\"Not found.\"}")
            .expect_err("404 should fail");
        assert!(matches!(error, ToolError::Status { status: 404, .. }));
        assert!(error.to_string().contains("Not found."));
    }

    #[test]
    fn declared_json_that_does_not_parse_is_malformed() {
        let error = normalize_response("awx", 200, Some("application/json"), "{oops")
            .expect_err("broken json should fail");
        assert!(matches!(error, ToolError::MalformedResponse { .. }));
    }

    #[test]
    fn schema_lists_params_and_forbids_extras() {
        let schema = UPDATE_HOST.input_schema(&[]);
        assert_eq!(schema["required"], json!(["id"]));
        assert_eq!(schema["additionalProperties"], json!(false));
        assert_eq!(schema["properties"]["enabled"]["type"], json!("boolean"));
    }

    #[tokio::test]
    async fn request_places_params_by_location() {
        let api = Arc::new(RecordingApi::returning(json!({"id": 7})));
        let tool = EndpointTool::new(UPDATE_HOST, api.clone());

        let output = tool
            .execute(json!({"id": 7, "name": "web-01", "dry_run": true}))
            .await
            .expect("call succeeds");

        assert_eq!(output.content, "{\"id\":7}");
        let sent = api.requests();
        assert_eq!(sent[0].method, HttpMethod::Patch);
        assert_eq!(sent[0].path, "/api/v2/hosts/7/");
        assert_eq!(sent[0].query, vec![("dry_run".to_string(), "true".to_string())]);
        assert_eq!(sent[0].body, Some(json!({"name": "web-01"})));
    }

    #[test]
    fn bound_params_are_hidden_and_win() {
        let tool = EndpointTool::new(UPDATE_HOST, Arc::new(RecordingApi::returning(json!({}))))
            .bind("id", 3);

        let definition = tool.definition();
        assert!(definition.parameters["properties"].get("id").is_none());

        let request = tool.build_request(&json!({"id": 99})).expect("request builds");
        assert_eq!(request.path, "/api/v2/hosts/3/");
    }

    #[test]
    fn missing_required_and_traversal_are_rejected() {
        let tool = EndpointTool::new(UPDATE_HOST, Arc::new(RecordingApi::returning(json!({}))));
        assert!(matches!(tool.build_request(&json!({})), Err(ToolError::InvalidArguments(_))));
        assert!(matches!(
            tool.build_request(&json!({"id": "../../me"})),
            Err(ToolError::InvalidArguments(_))
        ));
    }

    #[test]
    fn methods_parse_case_insensitively() {
        assert_eq!(HttpMethod::parse("patch"), Some(HttpMethod::Patch));
        assert_eq!(HttpMethod::parse("TRACE"), None);
        assert!(!HttpMethod::Options.allows_body());
    }
}

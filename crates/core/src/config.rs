use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub llm: LlmConfig,
    pub awx: AwxConfig,
    pub github: GithubConfig,
    pub slack: SlackConfig,
    pub server: ServerConfig,
    pub agent: AgentConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub api_key: Option<SecretString>,
    pub base_url: Option<String>,
    pub model: String,
    /// Model used by the guardrail classifier; falls back to `model`.
    pub guardrail_model: Option<String>,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

#[derive(Clone, Debug)]
pub struct AwxConfig {
    pub base_url: String,
    pub token: Option<SecretString>,
    pub username: Option<String>,
    pub password: Option<SecretString>,
    pub verify_tls: bool,
    /// Directory the controller scans for manual-SCM project content.
    pub projects_root: PathBuf,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct GithubConfig {
    pub enabled: bool,
    pub token: Option<SecretString>,
    pub api_base_url: String,
    pub default_binding: Option<RepositoryBinding>,
    pub bindings: BTreeMap<String, RepositoryBinding>,
}

/// The single repository and branch a user may operate on.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepositoryBinding {
    pub repository: String,
    pub branch: String,
}

#[derive(Clone, Debug)]
pub struct SlackConfig {
    pub enabled: bool,
    pub bot_token: SecretString,
    pub signing_secret: Option<SecretString>,
    pub api_base_url: String,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct AgentConfig {
    /// Model invocations allowed per turn across leader and specialist.
    pub max_turns: u32,
    pub history_window: usize,
    pub guardrail_window: usize,
    pub guardrail_timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    #[serde(rename = "openai")]
    OpenAi,
    #[serde(rename = "openrouter")]
    OpenRouter,
    Ollama,
}

impl LlmProvider {
    /// Chat-completions base URL used when `llm.base_url` is unset.
    pub fn default_base_url(&self) -> &'static str {
        match self {
            Self::OpenAi => "https://api.openai.com/v1",
            Self::OpenRouter => "https://openrouter.ai/api/v1",
            Self::Ollama => "http://localhost:11434/v1",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub llm_provider: Option<LlmProvider>,
    pub llm_model: Option<String>,
    pub awx_base_url: Option<String>,
    pub server_port: Option<u16>,
    pub slack_enabled: Option<bool>,
    pub github_enabled: Option<bool>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://awxchat.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            llm: LlmConfig {
                provider: LlmProvider::Ollama,
                api_key: None,
                base_url: Some(LlmProvider::Ollama.default_base_url().to_string()),
                model: "llama3.1".to_string(),
                guardrail_model: None,
                timeout_secs: 60,
                max_retries: 2,
            },
            awx: AwxConfig {
                base_url: "http://localhost:8052".to_string(),
                token: None,
                username: None,
                password: None,
                verify_tls: true,
                projects_root: PathBuf::from("/var/lib/awx/projects"),
                timeout_secs: 30,
            },
            github: GithubConfig {
                enabled: false,
                token: None,
                api_base_url: "https://api.github.com".to_string(),
                default_binding: None,
                bindings: BTreeMap::new(),
            },
            slack: SlackConfig {
                enabled: false,
                bot_token: String::new().into(),
                signing_secret: None,
                api_base_url: "https://slack.com/api".to_string(),
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8000,
                graceful_shutdown_secs: 15,
            },
            agent: AgentConfig {
                max_turns: 40,
                history_window: 20,
                guardrail_window: 6,
                guardrail_timeout_secs: 20,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LlmProvider {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "openrouter" => Ok(Self::OpenRouter),
            "ollama" => Ok(Self::Ollama),
            other => Err(ConfigError::Validation(format!(
                "unsupported llm provider `{other}` (expected openai|openrouter|ollama)"
            ))),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl RepositoryBinding {
    pub fn new(repository: impl Into<String>, branch: impl Into<String>) -> Self {
        Self { repository: repository.into(), branch: branch.into() }
    }

    pub fn owner(&self) -> &str {
        self.repository.split_once('/').map(|(owner, _)| owner).unwrap_or_default()
    }

    pub fn name(&self) -> &str {
        self.repository.split_once('/').map(|(_, name)| name).unwrap_or(&self.repository)
    }
}

impl GithubConfig {
    /// The binding for `user_id`, falling back to the deployment default.
    pub fn binding_for(&self, user_id: &str) -> Option<&RepositoryBinding> {
        if !self.enabled {
            return None;
        }
        self.bindings.get(user_id).or(self.default_binding.as_ref())
    }
}

impl LlmConfig {
    pub fn effective_base_url(&self) -> String {
        self.base_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .unwrap_or(self.provider.default_base_url())
            .trim_end_matches('/')
            .to_string()
    }

    pub fn effective_guardrail_model(&self) -> &str {
        self.guardrail_model.as_deref().unwrap_or(&self.model)
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("awxchat.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(llm) = patch.llm {
            if let Some(provider) = llm.provider {
                self.llm.provider = provider;
                if llm.base_url.is_none() {
                    self.llm.base_url = None;
                }
            }
            if let Some(llm_api_key_value) = llm.api_key {
                self.llm.api_key = Some(secret_value(llm_api_key_value));
            }
            if let Some(base_url) = llm.base_url {
                self.llm.base_url = Some(base_url);
            }
            if let Some(model) = llm.model {
                self.llm.model = model;
            }
            if let Some(guardrail_model) = llm.guardrail_model {
                self.llm.guardrail_model = Some(guardrail_model);
            }
            if let Some(timeout_secs) = llm.timeout_secs {
                self.llm.timeout_secs = timeout_secs;
            }
            if let Some(max_retries) = llm.max_retries {
                self.llm.max_retries = max_retries;
            }
        }

        if let Some(awx) = patch.awx {
            if let Some(base_url) = awx.base_url {
                self.awx.base_url = base_url;
            }
            if let Some(awx_token_value) = awx.token {
                self.awx.token = Some(secret_value(awx_token_value));
            }
            if let Some(username) = awx.username {
                self.awx.username = Some(username);
            }
            if let Some(awx_password_value) = awx.password {
                self.awx.password = Some(secret_value(awx_password_value));
            }
            if let Some(verify_tls) = awx.verify_tls {
                self.awx.verify_tls = verify_tls;
            }
            if let Some(projects_root) = awx.projects_root {
                self.awx.projects_root = projects_root;
            }
            if let Some(timeout_secs) = awx.timeout_secs {
                self.awx.timeout_secs = timeout_secs;
            }
        }

        if let Some(github) = patch.github {
            if let Some(enabled) = github.enabled {
                self.github.enabled = enabled;
            }
            if let Some(github_token_value) = github.token {
                self.github.token = Some(secret_value(github_token_value));
            }
            if let Some(api_base_url) = github.api_base_url {
                self.github.api_base_url = api_base_url;
            }
            if let (Some(repository), Some(branch)) = (github.repository, github.branch) {
                self.github.default_binding = Some(RepositoryBinding::new(repository, branch));
            }
            for entry in github.bindings.unwrap_or_default() {
                self.github
                    .bindings
                    .insert(entry.user_id, RepositoryBinding::new(entry.repository, entry.branch));
            }
        }

        if let Some(slack) = patch.slack {
            if let Some(enabled) = slack.enabled {
                self.slack.enabled = enabled;
            }
            if let Some(slack_bot_token_value) = slack.bot_token {
                self.slack.bot_token = secret_value(slack_bot_token_value);
            }
            if let Some(signing_secret_value) = slack.signing_secret {
                self.slack.signing_secret = Some(secret_value(signing_secret_value));
            }
            if let Some(api_base_url) = slack.api_base_url {
                self.slack.api_base_url = api_base_url;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(agent) = patch.agent {
            if let Some(max_turns) = agent.max_turns {
                self.agent.max_turns = max_turns;
            }
            if let Some(history_window) = agent.history_window {
                self.agent.history_window = history_window;
            }
            if let Some(guardrail_window) = agent.guardrail_window {
                self.agent.guardrail_window = guardrail_window;
            }
            if let Some(guardrail_timeout_secs) = agent.guardrail_timeout_secs {
                self.agent.guardrail_timeout_secs = guardrail_timeout_secs;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("AWXCHAT_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("AWXCHAT_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections =
                parse_u32("AWXCHAT_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("AWXCHAT_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("AWXCHAT_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("AWXCHAT_LLM_PROVIDER") {
            self.llm.provider = value.parse()?;
            if read_env("AWXCHAT_LLM_BASE_URL").is_none() {
                self.llm.base_url = None;
            }
        }
        if let Some(value) = read_env("AWXCHAT_LLM_API_KEY") {
            self.llm.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("AWXCHAT_LLM_BASE_URL") {
            self.llm.base_url = Some(value);
        }
        if let Some(value) = read_env("AWXCHAT_LLM_MODEL") {
            self.llm.model = value;
        }
        if let Some(value) = read_env("AWXCHAT_LLM_GUARDRAIL_MODEL") {
            self.llm.guardrail_model = Some(value);
        }
        if let Some(value) = read_env("AWXCHAT_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_u64("AWXCHAT_LLM_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("AWXCHAT_LLM_MAX_RETRIES") {
            self.llm.max_retries = parse_u32("AWXCHAT_LLM_MAX_RETRIES", &value)?;
        }

        if let Some(value) = read_env("AWXCHAT_AWX_BASE_URL") {
            self.awx.base_url = value;
        }
        if let Some(value) = read_env("AWXCHAT_AWX_TOKEN") {
            self.awx.token = Some(secret_value(value));
        }
        if let Some(value) = read_env("AWXCHAT_AWX_USERNAME") {
            self.awx.username = Some(value);
        }
        if let Some(value) = read_env("AWXCHAT_AWX_PASSWORD") {
            self.awx.password = Some(secret_value(value));
        }
        if let Some(value) = read_env("AWXCHAT_AWX_VERIFY_TLS") {
            self.awx.verify_tls = parse_bool("AWXCHAT_AWX_VERIFY_TLS", &value)?;
        }
        if let Some(value) = read_env("AWXCHAT_AWX_PROJECTS_ROOT") {
            self.awx.projects_root = PathBuf::from(value);
        }
        if let Some(value) = read_env("AWXCHAT_AWX_TIMEOUT_SECS") {
            self.awx.timeout_secs = parse_u64("AWXCHAT_AWX_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("AWXCHAT_GITHUB_ENABLED") {
            self.github.enabled = parse_bool("AWXCHAT_GITHUB_ENABLED", &value)?;
        }
        if let Some(value) = read_env("AWXCHAT_GITHUB_TOKEN") {
            self.github.token = Some(secret_value(value));
        }
        if let Some(value) = read_env("AWXCHAT_GITHUB_API_BASE_URL") {
            self.github.api_base_url = value;
        }
        let repository = read_env("AWXCHAT_GITHUB_REPOSITORY");
        let branch = read_env("AWXCHAT_GITHUB_BRANCH");
        match (repository, branch) {
            (Some(repository), Some(branch)) => {
                self.github.default_binding = Some(RepositoryBinding::new(repository, branch));
            }
            (Some(repository), None) => {
                let branch = self
                    .github
                    .default_binding
                    .as_ref()
                    .map(|binding| binding.branch.clone())
                    .unwrap_or_else(|| "main".to_string());
                self.github.default_binding = Some(RepositoryBinding::new(repository, branch));
            }
            (None, Some(branch)) => match self.github.default_binding.as_mut() {
                Some(binding) => binding.branch = branch,
                None => {
                    return Err(ConfigError::InvalidEnvOverride {
                        key: "AWXCHAT_GITHUB_BRANCH".to_string(),
                        value: branch,
                    })
                }
            },
            (None, None) => {}
        }
        if let Some(value) = read_env("AWXCHAT_GITHUB_BINDINGS") {
            for (user_id, binding) in parse_bindings("AWXCHAT_GITHUB_BINDINGS", &value)? {
                self.github.bindings.insert(user_id, binding);
            }
        }

        if let Some(value) = read_env("AWXCHAT_SLACK_ENABLED") {
            self.slack.enabled = parse_bool("AWXCHAT_SLACK_ENABLED", &value)?;
        }
        if let Some(value) = read_env("AWXCHAT_SLACK_BOT_TOKEN") {
            self.slack.bot_token = secret_value(value);
        }
        if let Some(value) = read_env("AWXCHAT_SLACK_SIGNING_SECRET") {
            self.slack.signing_secret = Some(secret_value(value));
        }

        if let Some(value) = read_env("AWXCHAT_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("AWXCHAT_SERVER_PORT") {
            self.server.port = parse_u16("AWXCHAT_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("AWXCHAT_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("AWXCHAT_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        if let Some(value) = read_env("AWXCHAT_AGENT_MAX_TURNS") {
            self.agent.max_turns = parse_u32("AWXCHAT_AGENT_MAX_TURNS", &value)?;
        }
        if let Some(value) = read_env("AWXCHAT_AGENT_HISTORY_WINDOW") {
            self.agent.history_window = parse_usize("AWXCHAT_AGENT_HISTORY_WINDOW", &value)?;
        }
        if let Some(value) = read_env("AWXCHAT_AGENT_GUARDRAIL_WINDOW") {
            self.agent.guardrail_window = parse_usize("AWXCHAT_AGENT_GUARDRAIL_WINDOW", &value)?;
        }
        if let Some(value) = read_env("AWXCHAT_AGENT_GUARDRAIL_TIMEOUT_SECS") {
            self.agent.guardrail_timeout_secs =
                parse_u64("AWXCHAT_AGENT_GUARDRAIL_TIMEOUT_SECS", &value)?;
        }

        let log_level =
            read_env("AWXCHAT_LOGGING_LEVEL").or_else(|| read_env("AWXCHAT_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("AWXCHAT_LOGGING_FORMAT").or_else(|| read_env("AWXCHAT_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(llm_provider) = overrides.llm_provider {
            self.llm.provider = llm_provider;
        }
        if let Some(llm_model) = overrides.llm_model {
            self.llm.model = llm_model;
        }
        if let Some(awx_base_url) = overrides.awx_base_url {
            self.awx.base_url = awx_base_url;
        }
        if let Some(server_port) = overrides.server_port {
            self.server.port = server_port;
        }
        if let Some(slack_enabled) = overrides.slack_enabled {
            self.slack.enabled = slack_enabled;
        }
        if let Some(github_enabled) = overrides.github_enabled {
            self.github.enabled = github_enabled;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_llm(&self.llm)?;
        validate_awx(&self.awx)?;
        validate_github(&self.github)?;
        validate_slack(&self.slack)?;
        validate_server(&self.server)?;
        validate_agent(&self.agent)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("awxchat.toml"), PathBuf::from("config/awxchat.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

/// Parses `user=owner/repo@branch` pairs separated by commas.
fn parse_bindings(
    key: &str,
    value: &str,
) -> Result<Vec<(String, RepositoryBinding)>, ConfigError> {
    let invalid =
        || ConfigError::InvalidEnvOverride { key: key.to_string(), value: value.to_string() };

    value
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let (user_id, target) = entry.split_once('=').ok_or_else(invalid)?;
            let (repository, branch) = target.rsplit_once('@').ok_or_else(invalid)?;
            if user_id.trim().is_empty() {
                return Err(invalid());
            }
            Ok((user_id.trim().to_string(), RepositoryBinding::new(repository.trim(), branch.trim())))
        })
        .collect()
}

fn is_http_url(value: &str) -> bool {
    value.starts_with("http://") || value.starts_with("https://")
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_llm(llm: &LlmConfig) -> Result<(), ConfigError> {
    if llm.timeout_secs == 0 || llm.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "llm.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    if llm.model.trim().is_empty() {
        return Err(ConfigError::Validation("llm.model must not be empty".to_string()));
    }

    match llm.provider {
        LlmProvider::OpenAi | LlmProvider::OpenRouter => {
            let missing = llm
                .api_key
                .as_ref()
                .map(|value| value.expose_secret().trim().is_empty())
                .unwrap_or(true);
            if missing {
                return Err(ConfigError::Validation(
                    "llm.api_key is required for openai/openrouter providers".to_string(),
                ));
            }
        }
        LlmProvider::Ollama => {}
    }

    if !is_http_url(&llm.effective_base_url()) {
        return Err(ConfigError::Validation(
            "llm.base_url must start with http:// or https://".to_string(),
        ));
    }

    Ok(())
}

fn validate_awx(awx: &AwxConfig) -> Result<(), ConfigError> {
    if !is_http_url(awx.base_url.trim()) {
        return Err(ConfigError::Validation(
            "awx.base_url must start with http:// or https://".to_string(),
        ));
    }

    if awx.timeout_secs == 0 || awx.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "awx.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    if awx.username.is_some() && awx.password.is_none() {
        return Err(ConfigError::Validation(
            "awx.password is required when awx.username is set".to_string(),
        ));
    }

    if awx.projects_root.as_os_str().is_empty() {
        return Err(ConfigError::Validation("awx.projects_root must not be empty".to_string()));
    }

    Ok(())
}

fn validate_github(github: &GithubConfig) -> Result<(), ConfigError> {
    if !github.enabled {
        return Ok(());
    }

    let missing_token = github
        .token
        .as_ref()
        .map(|value| value.expose_secret().trim().is_empty())
        .unwrap_or(true);
    if missing_token {
        return Err(ConfigError::Validation(
            "github.token is required when github.enabled is true".to_string(),
        ));
    }

    if !is_http_url(&github.api_base_url) {
        return Err(ConfigError::Validation(
            "github.api_base_url must start with http:// or https://".to_string(),
        ));
    }

    let bindings = github
        .default_binding
        .iter()
        .map(|binding| ("<default>", binding))
        .chain(github.bindings.iter().map(|(user, binding)| (user.as_str(), binding)));
    for (user_id, binding) in bindings {
        let well_formed = binding
            .repository
            .split_once('/')
            .map(|(owner, name)| !owner.is_empty() && !name.is_empty() && !name.contains('/'))
            .unwrap_or(false);
        if !well_formed {
            return Err(ConfigError::Validation(format!(
                "github binding for `{user_id}` must name a repository as `owner/name`"
            )));
        }
        if binding.branch.trim().is_empty() || binding.branch.contains(char::is_whitespace) {
            return Err(ConfigError::Validation(format!(
                "github binding for `{user_id}` must name a branch without whitespace"
            )));
        }
    }

    Ok(())
}

fn validate_slack(slack: &SlackConfig) -> Result<(), ConfigError> {
    if !slack.enabled {
        return Ok(());
    }

    let bot_token = slack.bot_token.expose_secret();
    if bot_token.is_empty() {
        return Err(ConfigError::Validation(
            "slack.bot_token is required when slack.enabled is true. Get it from https://api.slack.com/apps > Your App > OAuth & Permissions > Bot User OAuth Token".to_string()
        ));
    }
    if !bot_token.starts_with("xoxb-") {
        let hint = if bot_token.starts_with("xapp-") {
            " (hint: you may have used the app token instead of the bot token)"
        } else {
            ""
        };
        return Err(ConfigError::Validation(format!(
            "slack.bot_token must start with `xoxb-`{hint}. Get it from https://api.slack.com/apps"
        )));
    }

    if !is_http_url(&slack.api_base_url) {
        return Err(ConfigError::Validation(
            "slack.api_base_url must start with http:// or https://".to_string(),
        ));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_agent(agent: &AgentConfig) -> Result<(), ConfigError> {
    if agent.max_turns == 0 || agent.max_turns > 200 {
        return Err(ConfigError::Validation(
            "agent.max_turns must be in range 1..=200".to_string(),
        ));
    }

    if agent.history_window == 0 {
        return Err(ConfigError::Validation(
            "agent.history_window must be greater than zero".to_string(),
        ));
    }

    if agent.guardrail_window == 0 {
        return Err(ConfigError::Validation(
            "agent.guardrail_window must be greater than zero".to_string(),
        ));
    }

    if agent.guardrail_timeout_secs == 0 || agent.guardrail_timeout_secs > 120 {
        return Err(ConfigError::Validation(
            "agent.guardrail_timeout_secs must be in range 1..=120".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_usize(key: &str, value: &str) -> Result<usize, ConfigError> {
    value.parse::<usize>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    value.parse::<bool>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    llm: Option<LlmPatch>,
    awx: Option<AwxPatch>,
    github: Option<GithubPatch>,
    slack: Option<SlackPatch>,
    server: Option<ServerPatch>,
    agent: Option<AgentPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    provider: Option<LlmProvider>,
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    guardrail_model: Option<String>,
    timeout_secs: Option<u64>,
    max_retries: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct AwxPatch {
    base_url: Option<String>,
    token: Option<String>,
    username: Option<String>,
    password: Option<String>,
    verify_tls: Option<bool>,
    projects_root: Option<PathBuf>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct GithubPatch {
    enabled: Option<bool>,
    token: Option<String>,
    api_base_url: Option<String>,
    repository: Option<String>,
    branch: Option<String>,
    bindings: Option<Vec<BindingPatch>>,
}

#[derive(Debug, Deserialize)]
struct BindingPatch {
    user_id: String,
    repository: String,
    branch: String,
}

#[derive(Debug, Default, Deserialize)]
struct SlackPatch {
    enabled: Option<bool>,
    bot_token: Option<String>,
    signing_secret: Option<String>,
    api_base_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct AgentPatch {
    max_turns: Option<u32>,
    history_window: Option<usize>,
    guardrail_window: Option<usize>,
    guardrail_timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::io;
    use std::sync::{Mutex, OnceLock};

    use secrecy::ExposeSecret;
    use tempfile::TempDir;

    use super::{
        AppConfig, ConfigError, ConfigOverrides, LlmProvider, LoadOptions, LogFormat,
        RepositoryBinding,
    };

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn clear_vars(vars: &[&str]) {
        for var in vars {
            env::remove_var(var);
        }
    }

    fn ensure(condition: bool, message: &'static str) -> Result<(), String> {
        if condition {
            Ok(())
        } else {
            Err(message.to_string())
        }
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TEST_AWX_TOKEN", "awx-token-from-env");
        env::set_var("TEST_LLM_KEY", "sk-from-env");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("awxchat.toml");
            fs::write(
                &path,
                r#"
[llm]
provider = "openrouter"
api_key = "${TEST_LLM_KEY}"
model = "openai/gpt-4o-mini"

[awx]
base_url = "https://awx.example.com"
token = "${TEST_AWX_TOKEN}"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.awx.token.as_ref().map(|token| token.expose_secret())
                    == Some("awx-token-from-env"),
                "awx token should be loaded from environment",
            )?;
            ensure(
                config.llm.provider == LlmProvider::OpenRouter,
                "provider should come from the file",
            )?;
            ensure(
                config.llm.effective_base_url() == "https://openrouter.ai/api/v1",
                "provider default base url should apply when none is configured",
            )?;
            Ok(())
        })();

        clear_vars(&["TEST_AWX_TOKEN", "TEST_LLM_KEY"]);
        result
    }

    #[test]
    fn logging_env_aliases_are_supported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("AWXCHAT_LOG_LEVEL", "warn");
        env::set_var("AWXCHAT_LOG_FORMAT", "pretty");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.logging.level == "warn", "warning log level should be set from env var")?;
            ensure(
                matches!(config.logging.format, LogFormat::Pretty),
                "pretty logging format should be set from env var",
            )?;
            Ok(())
        })();

        clear_vars(&["AWXCHAT_LOG_LEVEL", "AWXCHAT_LOG_FORMAT"]);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("AWXCHAT_DATABASE_URL", "sqlite://from-env.db");
        env::set_var("AWXCHAT_AWX_BASE_URL", "https://awx-from-env.example.com");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("awxchat.toml");
            fs::write(
                &path,
                r#"
[database]
url = "sqlite://from-file.db"

[awx]
base_url = "https://awx-from-file.example.com"

[agent]
max_turns = 12

[logging]
level = "warn"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    database_url: Some("sqlite://from-override.db".to_string()),
                    log_level: Some("debug".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.database.url == "sqlite://from-override.db",
                "override database url should win",
            )?;
            ensure(config.logging.level == "debug", "overridden log level should be debug")?;
            ensure(
                config.awx.base_url == "https://awx-from-env.example.com",
                "env awx url should win over file and defaults",
            )?;
            ensure(config.agent.max_turns == 12, "file agent budget should win over default")?;
            ensure(config.agent.history_window == 20, "default history window should be 20")?;
            Ok(())
        })();

        clear_vars(&["AWXCHAT_DATABASE_URL", "AWXCHAT_AWX_BASE_URL"]);
        result
    }

    #[test]
    fn github_bindings_load_from_file_and_env() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("AWXCHAT_GITHUB_BINDINGS", "bob=acme/infra@develop, carol=acme/site@gh-pages");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("awxchat.toml");
            fs::write(
                &path,
                r#"
[github]
enabled = true
token = "ghp_file_token"
repository = "acme/playbooks"
branch = "main"

[[github.bindings]]
user_id = "alice"
repository = "acme/roles"
branch = "release"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.github.binding_for("alice")
                    == Some(&RepositoryBinding::new("acme/roles", "release")),
                "file binding should resolve for alice",
            )?;
            ensure(
                config.github.binding_for("bob")
                    == Some(&RepositoryBinding::new("acme/infra", "develop")),
                "env binding should resolve for bob",
            )?;
            ensure(
                config.github.binding_for("unknown")
                    == Some(&RepositoryBinding::new("acme/playbooks", "main")),
                "unbound users should fall back to the default binding",
            )?;
            Ok(())
        })();

        clear_vars(&["AWXCHAT_GITHUB_BINDINGS"]);
        result
    }

    #[test]
    fn malformed_binding_env_is_rejected() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("AWXCHAT_GITHUB_BINDINGS", "bob-acme/infra");

        let result = match AppConfig::load(LoadOptions::default()) {
            Ok(_) => Err("expected invalid override error".to_string()),
            Err(ConfigError::InvalidEnvOverride { key, .. }) => {
                ensure(key == "AWXCHAT_GITHUB_BINDINGS", "error should name the bindings key")
            }
            Err(other) => Err(format!("unexpected error: {other}")),
        };

        clear_vars(&["AWXCHAT_GITHUB_BINDINGS"]);
        result
    }

    #[test]
    fn validation_fails_fast_with_actionable_error() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("AWXCHAT_SLACK_ENABLED", "true");
        env::set_var("AWXCHAT_SLACK_BOT_TOKEN", "xapp-wrong-kind");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => {
                    return Err("expected validation failure but config load succeeded".to_string())
                }
                Err(error) => error,
            };
            let has_message = matches!(
                error,
                ConfigError::Validation(ref message) if message.contains("slack.bot_token")
            );
            ensure(has_message, "validation failure should mention slack.bot_token")
        })();

        clear_vars(&["AWXCHAT_SLACK_ENABLED", "AWXCHAT_SLACK_BOT_TOKEN"]);
        result
    }

    #[test]
    fn github_binding_requires_owner_and_name() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("AWXCHAT_GITHUB_ENABLED", "true");
        env::set_var("AWXCHAT_GITHUB_TOKEN", "ghp_test");
        env::set_var("AWXCHAT_GITHUB_REPOSITORY", "playbooks");

        let result = match AppConfig::load(LoadOptions::default()) {
            Ok(_) => Err("expected validation failure".to_string()),
            Err(ConfigError::Validation(message)) => {
                ensure(message.contains("owner/name"), "message should explain the format")
            }
            Err(other) => Err(format!("unexpected error: {other}")),
        };

        clear_vars(&["AWXCHAT_GITHUB_ENABLED", "AWXCHAT_GITHUB_TOKEN", "AWXCHAT_GITHUB_REPOSITORY"]);
        result
    }

    #[test]
    fn secret_values_are_not_leaked_by_debug() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("AWXCHAT_AWX_TOKEN", "awx-secret-value");
        env::set_var("AWXCHAT_LLM_API_KEY", "sk-secret-value");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            let debug = format!("{config:?}");

            ensure(!debug.contains("awx-secret-value"), "debug output should not contain awx token")?;
            ensure(!debug.contains("sk-secret-value"), "debug output should not contain llm key")?;
            ensure(
                matches!(config.logging.format, LogFormat::Compact),
                "default logging format should be compact",
            )?;
            Ok(())
        })();

        clear_vars(&["AWXCHAT_AWX_TOKEN", "AWXCHAT_LLM_API_KEY"]);
        result
    }
}

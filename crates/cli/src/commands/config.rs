use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use awxchat_core::config::AppConfig;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use toml::Value;

use crate::commands::{load_config, CommandResult};

#[derive(Debug, Serialize)]
struct ConfigEntry {
    key: &'static str,
    value: String,
    source: String,
}

pub fn run() -> CommandResult {
    let config = match load_config("config") {
        Ok(config) => config,
        Err(failure) => return failure,
    };

    let file_path = detect_config_path();
    let file_doc = load_config_file_doc(file_path.as_deref());
    let entries: Vec<ConfigEntry> = effective_values(&config)
        .into_iter()
        .map(|(key, env_key, value)| ConfigEntry {
            key,
            value,
            source: field_source(key, env_key, file_doc.as_ref(), file_path.as_deref()),
        })
        .collect();

    CommandResult::success_with_data(
        "config",
        "effective config (source precedence: env > file > default)",
        serde_json::to_value(entries).ok(),
    )
}

fn effective_values(config: &AppConfig) -> Vec<(&'static str, &'static str, String)> {
    vec![
        ("database.url", "AWXCHAT_DATABASE_URL", config.database.url.clone()),
        (
            "database.max_connections",
            "AWXCHAT_DATABASE_MAX_CONNECTIONS",
            config.database.max_connections.to_string(),
        ),
        ("llm.provider", "AWXCHAT_LLM_PROVIDER", format!("{:?}", config.llm.provider)),
        ("llm.model", "AWXCHAT_LLM_MODEL", config.llm.model.clone()),
        (
            "llm.guardrail_model",
            "AWXCHAT_LLM_GUARDRAIL_MODEL",
            config.llm.effective_guardrail_model().to_string(),
        ),
        ("llm.base_url", "AWXCHAT_LLM_BASE_URL", config.llm.effective_base_url()),
        ("llm.api_key", "AWXCHAT_LLM_API_KEY", redact_optional(config.llm.api_key.as_ref())),
        ("awx.base_url", "AWXCHAT_AWX_BASE_URL", config.awx.base_url.clone()),
        ("awx.token", "AWXCHAT_AWX_TOKEN", redact_optional(config.awx.token.as_ref())),
        (
            "awx.username",
            "AWXCHAT_AWX_USERNAME",
            config.awx.username.clone().unwrap_or_else(|| "<unset>".to_string()),
        ),
        ("awx.password", "AWXCHAT_AWX_PASSWORD", redact_optional(config.awx.password.as_ref())),
        ("awx.verify_tls", "AWXCHAT_AWX_VERIFY_TLS", config.awx.verify_tls.to_string()),
        (
            "awx.projects_root",
            "AWXCHAT_AWX_PROJECTS_ROOT",
            config.awx.projects_root.display().to_string(),
        ),
        ("github.enabled", "AWXCHAT_GITHUB_ENABLED", config.github.enabled.to_string()),
        ("github.token", "AWXCHAT_GITHUB_TOKEN", redact_optional(config.github.token.as_ref())),
        ("slack.enabled", "AWXCHAT_SLACK_ENABLED", config.slack.enabled.to_string()),
        (
            "slack.bot_token",
            "AWXCHAT_SLACK_BOT_TOKEN",
            redact_token(config.slack.bot_token.expose_secret()),
        ),
        (
            "slack.signing_secret",
            "AWXCHAT_SLACK_SIGNING_SECRET",
            redact_optional(config.slack.signing_secret.as_ref()),
        ),
        ("server.bind_address", "AWXCHAT_SERVER_BIND_ADDRESS", config.server.bind_address.clone()),
        ("server.port", "AWXCHAT_SERVER_PORT", config.server.port.to_string()),
        ("agent.max_turns", "AWXCHAT_AGENT_MAX_TURNS", config.agent.max_turns.to_string()),
        (
            "agent.history_window",
            "AWXCHAT_AGENT_HISTORY_WINDOW",
            config.agent.history_window.to_string(),
        ),
        ("logging.level", "AWXCHAT_LOGGING_LEVEL", config.logging.level.clone()),
        ("logging.format", "AWXCHAT_LOGGING_FORMAT", format!("{:?}", config.logging.format)),
    ]
}

fn detect_config_path() -> Option<PathBuf> {
    [PathBuf::from("awxchat.toml"), PathBuf::from("config/awxchat.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let raw = fs::read_to_string(path?).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_key: &str,
    file_doc: Option<&Value>,
    file_path: Option<&Path>,
) -> String {
    if env::var_os(env_key).is_some() {
        return format!("env ({env_key})");
    }

    if let Some(doc) = file_doc {
        if contains_path(doc, key_path) {
            let file_path = file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn redact_optional(secret: Option<&SecretString>) -> String {
    match secret {
        Some(secret) if !secret.expose_secret().trim().is_empty() => "<redacted>".to_string(),
        Some(_) => "<empty>".to_string(),
        None => "<unset>".to_string(),
    }
}

/// Keeps the Slack token kind prefix (`xoxb-`) visible and hides the rest.
fn redact_token(token: &str) -> String {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    if let Some((prefix, _)) = trimmed.split_once('-') {
        return format!("{prefix}-***");
    }

    "<redacted>".to_string()
}

use std::env;
use std::sync::{Mutex, OnceLock};

use awxchat_cli::commands::{config, doctor, history, migrate};
use awxchat_core::domain::conversation::Turn;
use awxchat_db::{connect, ConversationRepository, SqlConversationRepository, SwapOutcome};
use serde_json::Value;

#[test]
fn migrate_returns_success_with_valid_env() {
    with_env(&[("AWXCHAT_DATABASE_URL", "sqlite::memory:")], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 0, "expected successful migrate run");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "ok");
    });
}

#[test]
fn migrate_returns_config_failure_for_non_sqlite_url() {
    with_env(&[("AWXCHAT_DATABASE_URL", "postgres://localhost/awx")], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn config_reports_sources_and_redacts_secrets() {
    with_env(
        &[
            ("AWXCHAT_AWX_BASE_URL", "https://awx.example.com"),
            ("AWXCHAT_AWX_TOKEN", "super-secret-token"),
        ],
        || {
            let result = config::run();
            assert_eq!(result.exit_code, 0);
            assert!(!result.output.contains("super-secret-token"));

            let payload = parse_payload(&result.output);
            let entries = payload["data"].as_array().expect("config entries");
            let entry = |key: &str| {
                entries.iter().find(|entry| entry["key"] == key).cloned().expect("entry present")
            };

            assert_eq!(entry("awx.base_url")["value"], "https://awx.example.com");
            assert_eq!(entry("awx.base_url")["source"], "env (AWXCHAT_AWX_BASE_URL)");
            assert_eq!(entry("awx.token")["value"], "<redacted>");
            assert_eq!(entry("llm.api_key")["value"], "<unset>");
            assert_eq!(entry("server.port")["source"], "default");
        },
    );
}

#[test]
fn doctor_reports_unreachable_awx_and_skips_disabled_slack() {
    with_env(
        &[
            ("AWXCHAT_DATABASE_URL", "sqlite::memory:"),
            ("AWXCHAT_AWX_BASE_URL", "http://127.0.0.1:9"),
            ("AWXCHAT_AWX_TIMEOUT_SECS", "2"),
        ],
        || {
            let result = doctor::run(true);
            assert_eq!(result.exit_code, 7, "unreachable AWX should fail readiness");

            let report = parse_payload(&result.output);
            assert_eq!(report["overall_status"], "fail");
            assert_eq!(check_status(&report, "config_validation"), "pass");
            assert_eq!(check_status(&report, "database_connectivity"), "pass");
            assert_eq!(check_status(&report, "awx_reachability"), "fail");
            assert_eq!(check_status(&report, "slack_readiness"), "skipped");
        },
    );
}

#[test]
fn doctor_skips_downstream_checks_when_config_invalid() {
    with_env(&[("AWXCHAT_AWX_BASE_URL", "awx.internal")], || {
        let result = doctor::run(true);
        assert_ne!(result.exit_code, 0);

        let report = parse_payload(&result.output);
        assert_eq!(check_status(&report, "config_validation"), "fail");
        assert_eq!(check_status(&report, "database_connectivity"), "skipped");
        assert_eq!(check_status(&report, "awx_reachability"), "skipped");
    });
}

#[test]
fn history_prints_stored_window_as_summaries() {
    let dir = tempfile::tempdir().expect("tempdir");
    let url = format!("sqlite://{}?mode=rwc", dir.path().join("history.db").display());

    with_env(&[("AWXCHAT_DATABASE_URL", &url), ("AWXCHAT_AGENT_HISTORY_WINDOW", "2")], || {
        assert_eq!(migrate::run().exit_code, 0);
        let turns = vec![
            Turn::user("list job templates"),
            Turn::assistant("calling the API")
                .with_tool(Some("call_awx_api".to_string()), Some("{\"count\":3}".to_string())),
            Turn::assistant("There are 3 job templates."),
        ];
        seed_history(&url, "alice", &turns);

        let result = history::run("alice");
        assert_eq!(result.exit_code, 0, "unexpected output: {}", result.output);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "history");
        assert_eq!(payload["data"]["version"], 1);
        let window = payload["data"]["turns"].as_array().expect("turns");
        assert_eq!(window.len(), 2);
        assert_eq!(window[0]["content"], "calling the API");
        assert!(window[0].get("tool_result").is_none());
        assert_eq!(window[1]["role"], "assistant");
    });
}

#[test]
fn history_for_unknown_user_is_empty() {
    let dir = tempfile::tempdir().expect("tempdir");
    let url = format!("sqlite://{}?mode=rwc", dir.path().join("empty.db").display());

    with_env(&[("AWXCHAT_DATABASE_URL", &url)], || {
        assert_eq!(migrate::run().exit_code, 0);

        let payload = parse_payload(&history::run("nobody").output);
        assert_eq!(payload["status"], "ok");
        assert_eq!(payload["data"]["turns"], Value::Array(Vec::new()));
        assert_eq!(payload["data"]["version"], Value::Null);
    });
}

#[test]
fn history_reports_store_read_failure_for_corrupt_payload() {
    let dir = tempfile::tempdir().expect("tempdir");
    let url = format!("sqlite://{}?mode=rwc", dir.path().join("corrupt.db").display());

    with_env(&[("AWXCHAT_DATABASE_URL", &url)], || {
        assert_eq!(migrate::run().exit_code, 0);
        seed_raw(&url, "alice", "not json");

        let result = history::run("alice");
        assert_eq!(result.exit_code, 6);
        let payload = parse_payload(&result.output);
        assert_eq!(payload["error_class"], "store_read");
    });
}

#[test]
fn history_rejects_blank_user_id() {
    let result = history::run("   ");
    assert_eq!(result.exit_code, 64);
    assert_eq!(parse_payload(&result.output)["error_class"], "invalid_input");
}

fn seed_history(url: &str, user_id: &str, turns: &[Turn]) {
    let payload = serde_json::to_string(turns).expect("serialize turns");
    seed_raw(url, user_id, &payload);
}

fn seed_raw(url: &str, user_id: &str, payload: &str) {
    let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().expect("rt");
    runtime.block_on(async {
        let pool = connect(url).await.expect("connect");
        let outcome = SqlConversationRepository::new(pool.clone())
            .compare_and_swap(user_id, None, payload)
            .await
            .expect("seed record");
        assert_eq!(outcome, SwapOutcome::Committed { version: 1 });
        pool.close().await;
    });
}

fn check_status(report: &Value, name: &str) -> String {
    report["checks"]
        .as_array()
        .and_then(|checks| checks.iter().find(|check| check["name"] == name))
        .and_then(|check| check["status"].as_str())
        .unwrap_or_default()
        .to_string()
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard = ENV_LOCK
        .get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());

    let keys = [
        "AWXCHAT_DATABASE_URL",
        "AWXCHAT_DATABASE_MAX_CONNECTIONS",
        "AWXCHAT_DATABASE_TIMEOUT_SECS",
        "AWXCHAT_LLM_PROVIDER",
        "AWXCHAT_LLM_API_KEY",
        "AWXCHAT_LLM_BASE_URL",
        "AWXCHAT_LLM_MODEL",
        "AWXCHAT_AWX_BASE_URL",
        "AWXCHAT_AWX_TOKEN",
        "AWXCHAT_AWX_USERNAME",
        "AWXCHAT_AWX_PASSWORD",
        "AWXCHAT_AWX_TIMEOUT_SECS",
        "AWXCHAT_GITHUB_ENABLED",
        "AWXCHAT_SLACK_ENABLED",
        "AWXCHAT_SLACK_BOT_TOKEN",
        "AWXCHAT_SLACK_SIGNING_SECRET",
        "AWXCHAT_SERVER_BIND_ADDRESS",
        "AWXCHAT_SERVER_PORT",
        "AWXCHAT_AGENT_HISTORY_WINDOW",
        "AWXCHAT_LOGGING_LEVEL",
        "AWXCHAT_LOGGING_FORMAT",
        "AWXCHAT_LOG_LEVEL",
        "AWXCHAT_LOG_FORMAT",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}

use std::sync::Arc;
use std::time::Duration;

use awxchat_agent::guardrails::{GuardrailGate, LlmClassifier};
use awxchat_agent::llm::{LlmClient, LlmError, OpenAiCompatibleClient};
use awxchat_agent::tools::awx::{awx_registry, AwxClient, ProjectStaging};
use awxchat_agent::tools::github::GithubClient;
use awxchat_agent::tools::ToolError;
use awxchat_agent::{AgentRuntime, ConversationStore, Orchestrator};
use awxchat_core::config::{AppConfig, ConfigError};
use awxchat_db::{
    connect_with_config, migrations, DbPool, SqlConversationRepository, SqlSlackIdentityRepository,
};
use awxchat_slack::{
    chat_dispatcher, LoginService, SignatureVerifier, SlackApiError, SlackBot, SlackWebClient,
};
use thiserror::Error;
use tracing::info;

use crate::slack::{AwxCredentialVerifier, RuntimeChatService};
use crate::state::{AppState, SlackState};

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub state: AppState,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("model client setup failed: {0}")]
    Llm(#[from] LlmError),
    #[error("api client setup failed: {0}")]
    Client(#[from] ToolError),
    #[error("slack client setup failed: {0}")]
    Slack(#[from] SlackApiError),
    #[error("scope patterns failed to compile: {0}")]
    Scope(#[from] regex::Error),
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let db_pool =
        connect_with_config(&config.database).await.map_err(BootstrapError::DatabaseConnect)?;
    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database connected and migrations applied"
    );

    let model = OpenAiCompatibleClient::from_config(&config.llm)?;
    let classifier_model: Arc<dyn LlmClient> =
        Arc::new(model.with_model(config.llm.effective_guardrail_model()));
    let model: Arc<dyn LlmClient> = Arc::new(model);

    let awx = AwxClient::from_config(&config.awx)?;
    let awx_tools = awx_registry(
        Arc::new(awx.clone()),
        ProjectStaging::new(config.awx.projects_root.clone()),
    );
    let mut orchestrator = Orchestrator::new(model, awx_tools, config.agent.max_turns)?;
    if config.github.enabled {
        let github = GithubClient::from_config(&config.github)?;
        orchestrator = orchestrator.with_github(config.github.clone(), Arc::new(github));
    }

    let store = ConversationStore::with_window(
        Arc::new(SqlConversationRepository::new(db_pool.clone())),
        config.agent.history_window,
    );
    let gate = GuardrailGate::new(
        Arc::new(LlmClassifier::new(classifier_model)),
        config.agent.guardrail_window,
        Duration::from_secs(config.agent.guardrail_timeout_secs),
    );
    let runtime = Arc::new(AgentRuntime::new(store, gate, orchestrator));
    let mut state = AppState::new(runtime.clone());

    if config.slack.enabled {
        let login = Arc::new(LoginService::new(
            Arc::new(SqlSlackIdentityRepository::new(db_pool.clone())),
            Arc::new(AwxCredentialVerifier::new(awx)),
        ));
        let dispatcher = chat_dispatcher(Arc::new(RuntimeChatService::new(runtime)), login);
        let api = Arc::new(SlackWebClient::from_config(&config.slack)?);
        state = state.with_slack(SlackState {
            bot: Arc::new(SlackBot::new(dispatcher, api)),
            verifier: config.slack.signing_secret.clone().map(SignatureVerifier::new),
        });
    }

    info!(
        event_name = "system.bootstrap.ready",
        correlation_id = "bootstrap",
        github_enabled = config.github.enabled,
        slack_enabled = config.slack.enabled,
        max_turns = config.agent.max_turns,
        "application bootstrap complete"
    );

    Ok(Application { config, db_pool, state })
}

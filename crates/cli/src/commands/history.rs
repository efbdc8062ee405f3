use awxchat_core::domain::conversation::{recent_window, Turn};
use awxchat_db::{
    connect_with_config, ConversationRepository, RepositoryError, SqlConversationRepository,
};
use serde_json::json;

use crate::commands::{
    async_runtime, load_config, CommandResult, EXIT_DATABASE, EXIT_INVALID_INPUT, EXIT_STORE_READ,
};

/// Reads through the repository rather than the fail-open store so that a
/// broken or corrupt record is reported instead of shown as empty.
pub fn run(user_id: &str) -> CommandResult {
    let user_id = user_id.trim();
    if user_id.is_empty() {
        return CommandResult::failure(
            "history",
            "invalid_input",
            "user id must not be empty",
            EXIT_INVALID_INPUT,
        );
    }

    let config = match load_config("history") {
        Ok(config) => config,
        Err(failure) => return failure,
    };
    let runtime = match async_runtime("history") {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };

    let loaded = runtime.block_on(async {
        let pool = connect_with_config(&config.database)
            .await
            .map_err(|error| ("db_connectivity", error.to_string(), EXIT_DATABASE))?;
        let record = SqlConversationRepository::new(pool.clone()).load(user_id).await;
        pool.close().await;
        record.map_err(|error| ("store_read", error.to_string(), EXIT_STORE_READ))
    });

    let record = match loaded {
        Ok(record) => record,
        Err((error_class, message, exit_code)) => {
            return CommandResult::failure("history", error_class, message, exit_code);
        }
    };

    let (turns, version) = match record {
        Some(record) => match decode_turns(&record.payload) {
            Ok(turns) => (turns, Some(record.version)),
            Err(error) => {
                return CommandResult::failure(
                    "history",
                    "store_read",
                    error.to_string(),
                    EXIT_STORE_READ,
                );
            }
        },
        None => (Vec::new(), None),
    };

    let window: Vec<Turn> =
        recent_window(&turns, config.agent.history_window).iter().map(Turn::summary).collect();
    CommandResult::success_with_data(
        "history",
        format!("{} of {} stored turns for `{user_id}`", window.len(), turns.len()),
        Some(json!({ "user_id": user_id, "version": version, "turns": window })),
    )
}

fn decode_turns(payload: &str) -> Result<Vec<Turn>, RepositoryError> {
    serde_json::from_str(payload).map_err(|error| RepositoryError::Decode(error.to_string()))
}

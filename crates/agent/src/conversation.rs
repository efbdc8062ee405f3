use std::sync::Arc;

use tracing::{debug, warn};

use awxchat_core::domain::conversation::recent_window;
use awxchat_core::{Turn, DEFAULT_HISTORY_WINDOW};
use awxchat_db::{ConversationRepository, RepositoryError, SwapOutcome};

/// Total compare-and-swap attempts per write, including the first.
pub const MAX_WRITE_ATTEMPTS: u32 = 3;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriteOutcome {
    Saved { attempts: u32 },
    /// Every attempt lost the race to a concurrent writer.
    Conflicted { attempts: u32 },
    /// The history could not be serialized or the store was unreachable.
    Failed,
}

impl WriteOutcome {
    pub fn is_saved(&self) -> bool {
        matches!(self, Self::Saved { .. })
    }
}

/// Per-user conversation history. Reads fail open to an empty history and
/// writes never surface an error to the caller.
#[derive(Clone)]
pub struct ConversationStore {
    repository: Arc<dyn ConversationRepository>,
    window: usize,
}

impl ConversationStore {
    pub fn new(repository: Arc<dyn ConversationRepository>) -> Self {
        Self::with_window(repository, DEFAULT_HISTORY_WINDOW)
    }

    pub fn with_window(repository: Arc<dyn ConversationRepository>, window: usize) -> Self {
        Self { repository, window: window.max(1) }
    }

    pub fn window(&self) -> usize {
        self.window
    }

    /// The most recent turns for `user_id`, oldest first.
    pub async fn read(&self, user_id: &str) -> Vec<Turn> {
        let record = match self.repository.load(user_id).await {
            Ok(Some(record)) => record,
            Ok(None) => return Vec::new(),
            Err(error) => {
                warn!(
                    event_name = "conversation.read.failed",
                    user_id,
                    error = %error,
                    "history store unreachable; continuing with empty history"
                );
                return Vec::new();
            }
        };

        match serde_json::from_str::<Vec<Turn>>(&record.payload) {
            Ok(turns) => recent_window(&turns, self.window).to_vec(),
            Err(error) => {
                warn!(
                    event_name = "conversation.read.corrupt",
                    user_id,
                    version = record.version,
                    error = %error,
                    "stored history is not a turn list; treating as empty"
                );
                Vec::new()
            }
        }
    }

    /// Replaces the whole stored history for `user_id` with `turns`.
    pub async fn write(&self, user_id: &str, turns: &[Turn]) -> WriteOutcome {
        let payload = match serde_json::to_string(turns) {
            Ok(payload) => payload,
            Err(error) => {
                warn!(
                    event_name = "conversation.write.serialize_failed",
                    user_id,
                    error = %error,
                    "history could not be serialized"
                );
                return WriteOutcome::Failed;
            }
        };

        for attempt in 1..=MAX_WRITE_ATTEMPTS {
            match self.try_swap(user_id, &payload).await {
                Ok(SwapOutcome::Committed { version }) => {
                    debug!(
                        event_name = "conversation.write.saved",
                        user_id,
                        version,
                        attempt,
                        turns = turns.len(),
                        "history saved"
                    );
                    return WriteOutcome::Saved { attempts: attempt };
                }
                Ok(SwapOutcome::Conflict) => {
                    debug!(
                        event_name = "conversation.write.conflict",
                        user_id,
                        attempt,
                        "concurrent writer committed first"
                    );
                }
                Err(error) => {
                    warn!(
                        event_name = "conversation.write.failed",
                        user_id,
                        attempt,
                        error = %error,
                        "history store unreachable; write dropped"
                    );
                    return WriteOutcome::Failed;
                }
            }
        }

        warn!(
            event_name = "conversation.write.conflicted",
            user_id,
            attempts = MAX_WRITE_ATTEMPTS,
            "history write abandoned after repeated conflicts"
        );
        WriteOutcome::Conflicted { attempts: MAX_WRITE_ATTEMPTS }
    }

    pub async fn ping(&self) -> Result<(), RepositoryError> {
        self.repository.ping().await
    }

    async fn try_swap(&self, user_id: &str, payload: &str) -> Result<SwapOutcome, RepositoryError> {
        let expected = self.repository.load(user_id).await?.map(|record| record.version);
        self.repository.compare_and_swap(user_id, expected, payload).await
    }
}

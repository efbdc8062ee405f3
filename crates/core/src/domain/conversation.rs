use serde::{Deserialize, Serialize};

/// Number of turns a history read returns.
pub const DEFAULT_HISTORY_WINDOW: usize = 20;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }

    /// Speaker label used in role-tagged transcripts.
    pub fn label(&self) -> &'static str {
        match self {
            Self::User => "User",
            Self::Assistant => "Assistant",
        }
    }
}

/// One utterance in a user's conversation. Never mutated once stored.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_result: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into(), tool_result: None, tool_name: None }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into(), tool_result: None, tool_name: None }
    }

    pub fn with_tool(mut self, tool_name: Option<String>, tool_result: Option<String>) -> Self {
        self.tool_name = tool_name;
        self.tool_result = tool_result;
        self
    }

    /// Role and content only; what clients see when they ask for history.
    pub fn summary(&self) -> Self {
        Self { role: self.role, content: self.content.clone(), tool_result: None, tool_name: None }
    }
}

/// The most recent `window` turns, oldest first.
pub fn recent_window(turns: &[Turn], window: usize) -> &[Turn] {
    let start = turns.len().saturating_sub(window);
    &turns[start..]
}

/// Renders turns as `User: ...` / `Assistant: ...` lines.
pub fn transcript(turns: &[Turn]) -> String {
    turns
        .iter()
        .map(|turn| format!("{}: {}", turn.role.label(), turn.content))
        .collect::<Vec<_>>()
        .join("\n")
}

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::domain::conversation::Turn;

/// Structured output a turn produces, whichever agent produced it last.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentReply {
    pub explanation: String,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient_text")]
    pub result: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient_text")]
    pub tool_result: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient_text")]
    pub tool_name: Option<String>,
}

impl AgentReply {
    pub fn from_explanation(explanation: impl Into<String>) -> Self {
        Self { explanation: explanation.into(), ..Self::default() }
    }

    /// A turn counts as answered only when the explanation carries text.
    pub fn is_material(&self) -> bool {
        !self.explanation.trim().is_empty()
    }

    pub fn to_assistant_turn(&self) -> Turn {
        let tool_result = self.tool_result.clone().or_else(|| self.result.clone());
        Turn::assistant(self.explanation.clone()).with_tool(self.tool_name.clone(), tool_result)
    }

    /// Plain text rendering for chat surfaces without structured display.
    pub fn display_text(&self) -> String {
        match self.result.as_deref().map(str::trim).filter(|result| !result.is_empty()) {
            Some(result) => format!("{}\n\n{}", self.explanation, result),
            None => self.explanation.clone(),
        }
    }
}

fn lenient_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(Value::Null) => None,
        Some(Value::String(text)) if text.is_empty() => None,
        Some(Value::String(text)) => Some(text),
        Some(other) => Some(other.to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::AgentReply;
    use crate::domain::conversation::Role;

    #[test]
    fn decodes_worker_output_with_structured_result() {
        let reply: AgentReply = serde_json::from_str(
            r#"{"explanation":"Found 2 inventories","result":{"count":2},"tool_name":"list_inventories","tool_result":""}"#,
        )
        .expect("reply should decode");
        assert_eq!(reply.result.as_deref(), Some(r#"{"count":2}"#));
        assert_eq!(reply.tool_name.as_deref(), Some("list_inventories"));
        assert!(reply.tool_result.is_none());
    }

    #[test]
    fn blank_explanation_is_not_material() {
        assert!(!AgentReply::from_explanation("  ").is_material());
        assert!(AgentReply::from_explanation("done").is_material());
    }

    #[test]
    fn assistant_turn_carries_tool_fields() {
        let reply = AgentReply {
            explanation: "Launched job 42".to_string(),
            result: Some("job 42 pending".to_string()),
            tool_result: None,
            tool_name: Some("launch_job_template".to_string()),
        };
        let turn = reply.to_assistant_turn();
        assert_eq!(turn.role, Role::Assistant);
        assert_eq!(turn.tool_result.as_deref(), Some("job 42 pending"));
        assert_eq!(reply.display_text(), "Launched job 42\n\njob 42 pending");
    }
}

use thiserror::Error;

use awxchat_core::{ApplicationError, DomainError};

use crate::llm::LlmError;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error(transparent)]
    InvalidRequest(#[from] DomainError),
    #[error(transparent)]
    Llm(#[from] LlmError),
    #[error("max turns ({0}) exceeded")]
    MaxTurnsExceeded(u32),
    #[error("{agent} produced output that does not match its schema: {detail}")]
    MalformedOutput { agent: &'static str, detail: String },
    #[error("guardrail classifier failed: {0}")]
    Classifier(String),
}

impl AgentError {
    pub fn into_application(self) -> ApplicationError {
        match self {
            Self::InvalidRequest(error) => ApplicationError::Domain(error),
            Self::Llm(error) => ApplicationError::Integration(error.to_string()),
            Self::Classifier(message) => ApplicationError::Integration(message),
            error @ (Self::MaxTurnsExceeded(_) | Self::MalformedOutput { .. }) => {
                ApplicationError::Orchestration(error.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use awxchat_core::{ApplicationError, DomainError};

    use super::AgentError;
    use crate::llm::LlmError;

    #[test]
    fn step_exhaustion_is_an_orchestration_failure() {
        let mapped = AgentError::MaxTurnsExceeded(40).into_application();
        assert_eq!(mapped, ApplicationError::Orchestration("max turns (40) exceeded".to_string()));
    }

    #[test]
    fn model_outage_is_an_integration_failure() {
        let mapped = AgentError::from(LlmError::Api { status: 502, message: "bad gateway".into() })
            .into_application();
        assert!(matches!(mapped, ApplicationError::Integration(ref m) if m.contains("502")));
    }

    #[test]
    fn validation_failure_stays_a_domain_error() {
        let mapped = AgentError::from(DomainError::EmptyMessage).into_application();
        assert_eq!(mapped, ApplicationError::Domain(DomainError::EmptyMessage));
    }
}

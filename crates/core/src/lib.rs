//! Core types shared by every awxchat crate: configuration, the error
//! taxonomy, and the conversation domain model.

pub mod config;
pub mod domain;
pub mod errors;

pub use config::{AppConfig, ConfigError, LoadOptions, RepositoryBinding};
pub use domain::conversation::{Role, Turn, DEFAULT_HISTORY_WINDOW};
pub use domain::reply::AgentReply;
pub use errors::{ApplicationError, DomainError, InterfaceError};

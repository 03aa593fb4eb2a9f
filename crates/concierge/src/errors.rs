use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failures local to one capability invocation.
///
/// These never abort a reply: the agent folds them into a tool-result message so the model
/// can read them and react.
#[derive(Error, Debug, Clone, PartialEq, Deserialize, Serialize)]
pub enum ToolError {
    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("Tool execution failed: {0}")]
    ExecutionError(String),
}

pub type ToolResult<T> = Result<T, ToolError>;

/// Terminal conditions of a reply or a conversation opening
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Unknown capability requested by the model: {0}")]
    UnknownCapability(String),

    #[error("Capability registered twice: {0}")]
    DuplicateCapability(String),

    #[error("Model backend failed: {0}")]
    Backend(String),

    #[error("Malformed response from model backend: {0}")]
    MalformedResponse(String),

    #[error("Round-trip limit of {limit} exceeded without a final answer")]
    RoundTripLimitExceeded { limit: usize },

    #[error("Operation was cancelled")]
    Cancelled,

    #[error("Conversation has no messages")]
    EmptyConversation,

    #[error("Generation task failed: {0}")]
    TaskFailed(String),
}

impl AgentError {
    /// Wrap a backend failure, keeping the whole context chain in the message
    pub fn backend(err: anyhow::Error) -> Self {
        AgentError::Backend(format!("{:#}", err))
    }
}

pub type AgentResult<T> = Result<T, AgentError>;

/// Settings could not be loaded
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required environment variable: {env_var}")]
    MissingEnvVar { env_var: String },

    #[error("Configuration error: {0}")]
    Other(#[from] config::ConfigError),
}

/// Environment variable that sets a dotted settings key, e.g. `provider.api_key`
pub fn to_env_var(field_path: &str) -> String {
    format!(
        "{}_{}",
        crate::settings::ENV_PREFIX,
        field_path.to_uppercase().replace('.', "__")
    )
}

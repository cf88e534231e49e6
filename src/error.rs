//! Error types for the genesis agent

use std::time::Duration;
use thiserror::Error;

/// Result type alias for agent operations
pub type Result<T> = std::result::Result<T, AgentError>;

#[derive(Error, Debug)]
pub enum AgentError {

    // =============================
    // Plan Errors (fatal to one plan)
    // =============================

    #[error("Malformed plan: {0}")]
    MalformedPlan(String),

    #[error("Cyclic plan: steps {stuck:?} never become runnable")]
    CyclicPlan { stuck: Vec<usize> },

    // =============================
    // Step Errors (contained per step)
    // =============================

    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Remote invocation of {tool} failed: {message}")]
    RemoteInvocation { tool: String, message: String },

    #[error("Invalid parameters for {tool}: {message}")]
    ParameterValidation { tool: String, message: String },

    #[error("Tool {tool} timed out after {} ms", .after.as_millis())]
    Timeout { tool: String, after: Duration },

    #[error("Tool {tool} was cancelled")]
    Cancelled { tool: String },

    // =============================
    // Collaborator Errors
    // =============================

    #[error("LLM error: {0}")]
    LlmError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Context store error: {0}")]
    StateError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    // =============================
    // External Library Conversions
    // =============================

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl AgentError {
    /// Errors the executor records into a step's result entry instead of
    /// aborting the plan.
    pub fn is_step_error(&self) -> bool {
        matches!(
            self,
            AgentError::ToolNotFound(_)
                | AgentError::RemoteInvocation { .. }
                | AgentError::ParameterValidation { .. }
                | AgentError::Timeout { .. }
                | AgentError::Cancelled { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cyclic_plan_names_stuck_steps() {
        let err = AgentError::CyclicPlan { stuck: vec![0, 1] };
        assert_eq!(err.to_string(), "Cyclic plan: steps [0, 1] never become runnable");
        assert!(!err.is_step_error());
    }

    #[test]
    fn test_timeout_message_in_millis() {
        let err = AgentError::Timeout {
            tool: "stock_data.get_price".to_string(),
            after: Duration::from_millis(1500),
        };
        assert!(err.to_string().contains("1500 ms"));
        assert!(err.is_step_error());
    }
}

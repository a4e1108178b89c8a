//! Error types for the IronLoom domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum.

use thiserror::Error;

/// The top-level error type for all IronLoom operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Tool errors ---
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    // --- Orchestration errors ---
    #[error(transparent)]
    Orchestrator(#[from] OrchestratorError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API error (status {status_code}): {message}")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl ProviderError {
    /// Whether this failure means the credentials were rejected.
    ///
    /// Some gateways report auth problems as generic API errors, so the
    /// message text is inspected as well as the variant.
    pub fn is_auth(&self) -> bool {
        match self {
            ProviderError::AuthenticationFailed(_) => true,
            ProviderError::ApiError { status_code, .. } if matches!(status_code, 401 | 403) => true,
            other => {
                let msg = other.to_string().to_lowercase();
                msg.contains("401")
                    || msg.contains("authentication")
                    || msg.contains("invalid x-api-key")
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Unknown tool: {0}")]
    NotFound(String),

    #[error("{0}")]
    ExecutionFailed(String),

    #[error("Command timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Command blocked: matches dangerous pattern '{0}'")]
    CommandBlocked(String),

    #[error("Invalid input: {0}")]
    InvalidArguments(String),

    #[error("Cancelled")]
    Cancelled,
}

/// Synchronous, caller-recoverable failures of orchestration operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrchestratorError {
    #[error("max concurrent agents ({limit}) reached")]
    CapacityExceeded { limit: usize },

    #[error("agent not found or not running: {0}")]
    AgentNotFound(String),

    #[error("agent already finished: {0}")]
    AgentFinished(String),

    #[error("work order not found: {0}")]
    WorkOrderNotFound(String),

    #[error("No tasks provided")]
    NoTasks,

    #[error("Too many tasks: {requested} (max {max})")]
    TooManyTasks { requested: usize, max: usize },

    #[error("Too many concurrent sub-agents: {active} active + {requested} requested (max {max})")]
    SubAgentCapacity {
        active: usize,
        requested: usize,
        max: usize,
    },

    #[error("Agent '{0}' not found or not available for delegation")]
    UnknownDelegate(String),

    #[error("Invalid work order transition for {id}: {from} -> {to}")]
    InvalidTransition { id: String, from: String, to: String },

    #[error("Store error: {0}")]
    Store(String),

    #[error("create work directory: {0}")]
    WorkDir(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_error_displays_correctly() {
        let err = Error::Provider(ProviderError::ApiError {
            status_code: 500,
            message: "upstream exploded".into(),
        });
        assert!(err.to_string().contains("500"));
        assert!(err.to_string().contains("upstream exploded"));
    }

    #[test]
    fn auth_detection_by_variant_and_message() {
        assert!(ProviderError::AuthenticationFailed("bad key".into()).is_auth());
        assert!(
            ProviderError::ApiError {
                status_code: 401,
                message: "nope".into()
            }
            .is_auth()
        );
        assert!(ProviderError::Network("Invalid x-api-key header".into()).is_auth());
        assert!(
            !ProviderError::ApiError {
                status_code: 500,
                message: "boom".into()
            }
            .is_auth()
        );
        assert!(!ProviderError::Timeout("slow".into()).is_auth());
    }

    #[test]
    fn tool_error_messages_are_model_readable() {
        assert_eq!(
            ToolError::NotFound("frobnicate".into()).to_string(),
            "Unknown tool: frobnicate"
        );
        assert_eq!(
            ToolError::AccessDenied("path outside sandbox".into()).to_string(),
            "Access denied: path outside sandbox"
        );
        assert!(
            ToolError::CommandBlocked("rm -rf /".into())
                .to_string()
                .contains("rm -rf /")
        );
    }

    #[test]
    fn capacity_error_mentions_limit() {
        let err = OrchestratorError::SubAgentCapacity {
            active: 3,
            requested: 3,
            max: 5,
        };
        assert_eq!(
            err.to_string(),
            "Too many concurrent sub-agents: 3 active + 3 requested (max 5)"
        );
    }
}

//! Common error types used across the workspace.
//!
//! Each layer defines its own typed errors and converts into [`HubError`]
//! via `#[from]`. Failures local to one automation, one trigger handler, or
//! one RPC call must never abort the runtime as a whole; they are logged
//! and isolated at the call site.

use thiserror::Error;

/// Top-level error for the mindhub core.
#[derive(Debug, Error)]
pub enum HubError {
    /// Trigger construction failed (bad cron, regex, or timestamp).
    #[error(transparent)]
    Trigger(#[from] TriggerError),

    /// Persistence layer failure.
    #[error("storage failure: {0}")]
    Storage(String),

    /// Model backend failure.
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// Tool invocation failure.
    #[error(transparent)]
    Tool(#[from] ToolError),

    /// A referenced record does not exist.
    #[error(transparent)]
    NotFound(#[from] NotFoundError),
}

/// A lookup by identifier or hash found nothing.
#[derive(Debug, Error)]
#[error("{entity} not found: {id}")]
pub struct NotFoundError {
    pub entity: &'static str,
    pub id: String,
}

/// Trigger construction failures.
///
/// These mark a handler invalid rather than aborting a reschedule batch:
/// an invalid handler never fires but stays visible with a human-readable
/// description.
#[derive(Debug, Error)]
pub enum TriggerError {
    #[error("invalid cron expression: {0}")]
    Cron(String),

    #[error("invalid state regex: {0}")]
    Regex(String),

    #[error("invalid timestamp: {0}")]
    Timestamp(String),

    #[error("target instant is already in the past")]
    PastDue,
}

/// Language-model backend failures.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("network failure: {0}")]
    Network(String),

    #[error("backend returned status {status}: {message}")]
    Api { status: u16, message: String },

    #[error("malformed backend response: {0}")]
    Decode(String),

    #[error("model call exceeded its deadline")]
    Timeout,

    #[error("unknown provider: {0}")]
    UnknownProvider(String),
}

/// Tool invocation failures, reported back to the model as a failed
/// tool-result turn rather than aborting the conversation.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("unknown tool: {0}")]
    Unknown(String),

    #[error("invalid tool arguments: {0}")]
    InvalidArgs(String),

    #[error("tool call exceeded its deadline")]
    Timeout,

    #[error("tool failed: {0}")]
    Failed(String),
}

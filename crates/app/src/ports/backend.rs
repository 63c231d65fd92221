//! Language-model backend port.

use async_trait::async_trait;

use mindhub_domain::error::BackendError;
use mindhub_domain::message::Message;

use super::tool::ToolDefinition;

/// One completion round against a language model.
///
/// Implementations convert their own wire message shapes to and from the
/// canonical [`Message`] representation. The returned turn is always an
/// assistant turn; it may request zero or more tool calls.
#[async_trait]
pub trait LlmBackend: Send + Sync {
    /// Short provider name, for logs.
    fn name(&self) -> &str;

    /// Send the full transcript plus tool declarations and return the
    /// model's next turn.
    async fn complete(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
    ) -> Result<Message, BackendError>;
}

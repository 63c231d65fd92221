//! The agentic tool-calling loop.
//!
//! Drives a bounded model conversation: each round sends the full
//! transcript plus tool declarations to the backend, executes any requested
//! tool calls, and appends the results. Every transcript append is emitted
//! incrementally so callers can stream partial progress.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use mindhub_domain::error::ToolError;
use mindhub_domain::message::{Message, ToolCall};

use crate::ports::{LlmBackend, ToolContext, ToolRegistry};

/// Bounds for one agent run.
#[derive(Debug, Clone)]
pub struct AgentLoopConfig {
    /// Hard iteration ceiling; reaching it truncates the conversation
    /// rather than failing it.
    pub max_rounds: u32,
    /// Deadline for one model completion.
    pub model_timeout: Duration,
    /// Deadline for one tool call.
    pub tool_timeout: Duration,
}

impl Default for AgentLoopConfig {
    fn default() -> Self {
        Self {
            max_rounds: 10,
            model_timeout: Duration::from_secs(5 * 60),
            tool_timeout: Duration::from_secs(60),
        }
    }
}

/// Appended on a model timeout so the conversation can continue.
const TIMEOUT_APOLOGY: &str =
    "I'm sorry, that request took too long to answer. Let me try to continue.";

/// Run the loop to completion, truncation, or cancellation.
///
/// Returns the transcript as it stands when the loop stops. Cancellation is
/// cooperative: it stops consuming further model and tool turns, but work
/// already dispatched keeps its effects.
pub async fn run_loop(
    backend: &dyn LlmBackend,
    tools: &ToolRegistry,
    ctx: &ToolContext,
    prompt: String,
    config: &AgentLoopConfig,
    cancel: &CancellationToken,
    turn_tx: Option<&mpsc::Sender<Message>>,
) -> Vec<Message> {
    let mut transcript = Vec::new();
    append(&mut transcript, Message::user(prompt), turn_tx).await;

    let definitions = tools.definitions();

    for round in 0..config.max_rounds {
        if cancel.is_cancelled() {
            debug!(round, "agent loop cancelled");
            return transcript;
        }

        let completion = tokio::select! {
            () = cancel.cancelled() => {
                debug!(round, "agent loop cancelled mid-completion");
                return transcript;
            }
            result = tokio::time::timeout(
                config.model_timeout,
                backend.complete(&transcript, &definitions),
            ) => result,
        };

        let reply = match completion {
            Ok(Ok(reply)) => reply,
            Ok(Err(err)) => {
                // A hard backend failure ends the run; the failure stays
                // visible in the transcript rather than bubbling out.
                warn!(%err, backend = backend.name(), "model completion failed");
                append(
                    &mut transcript,
                    Message::assistant(format!("The model backend failed: {err}")),
                    turn_tx,
                )
                .await;
                return transcript;
            }
            Err(_elapsed) => {
                warn!(backend = backend.name(), "model completion timed out");
                append(&mut transcript, Message::assistant(TIMEOUT_APOLOGY), turn_tx).await;
                continue;
            }
        };

        let calls = reply.tool_calls.clone();
        let done = reply.is_final();
        append(&mut transcript, reply, turn_tx).await;

        if done {
            debug!(round, "agent loop finished");
            return transcript;
        }

        for call in calls {
            if cancel.is_cancelled() {
                return transcript;
            }
            let result = dispatch_tool(tools, ctx, &call, config.tool_timeout).await;
            append(&mut transcript, result, turn_tx).await;
        }
    }

    // Deliberate truncation, not an error.
    debug!(max_rounds = config.max_rounds, "agent loop hit round ceiling");
    transcript
}

/// Execute one requested tool call, always producing a tool-result turn.
async fn dispatch_tool(
    tools: &ToolRegistry,
    ctx: &ToolContext,
    call: &ToolCall,
    deadline: Duration,
) -> Message {
    let outcome = match tools.get(&call.name) {
        Some(tool) => match tokio::time::timeout(deadline, tool.call(call.arguments.clone(), ctx))
            .await
        {
            Ok(result) => result,
            Err(_elapsed) => Err(ToolError::Timeout),
        },
        None => Err(ToolError::Unknown(call.name.clone())),
    };

    match outcome {
        Ok(value) => Message::tool_result(call.id.clone(), value.to_string()),
        Err(err) => {
            warn!(%err, tool = call.name, "tool call failed");
            Message::tool_result(
                call.id.clone(),
                serde_json::json!({ "error": err.to_string() }).to_string(),
            )
        }
    }
}

async fn append(
    transcript: &mut Vec<Message>,
    message: Message,
    turn_tx: Option<&mpsc::Sender<Message>>,
) {
    if let Some(tx) = turn_tx {
        // A closed receiver only means nobody is streaming this run.
        let _ = tx.send(message.clone()).await;
    }
    transcript.push(message);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;

    use mindhub_domain::error::{BackendError, HubError};
    use mindhub_domain::id::SignalId;
    use mindhub_domain::message::MessageRole;
    use mindhub_domain::signal::{NewSignal, Signal};

    use crate::ports::{SignalStore, Tool, ToolDefinition};

    struct NullSignalStore;

    #[async_trait]
    impl SignalStore for NullSignalStore {
        async fn list_alive(&self) -> Result<Vec<Signal>, HubError> {
            Ok(vec![])
        }
        async fn create(&self, _signal: NewSignal) -> Result<Signal, HubError> {
            unimplemented!()
        }
        async fn delete(&self, _id: SignalId) -> Result<(), HubError> {
            Ok(())
        }
        async fn delete_by_hash(&self, _hash: &str) -> Result<(), HubError> {
            Ok(())
        }
        async fn mark_dead(&self, _id: SignalId) -> Result<(), HubError> {
            Ok(())
        }
    }

    fn test_ctx() -> ToolContext {
        ToolContext::new("hash", Arc::new(NullSignalStore))
    }

    /// Backend that replays a scripted sequence of turns.
    struct ScriptedBackend {
        turns: Vec<Message>,
        round: AtomicU32,
    }

    impl ScriptedBackend {
        fn new(turns: Vec<Message>) -> Self {
            Self {
                turns,
                round: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl crate::ports::LlmBackend for ScriptedBackend {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn complete(
            &self,
            _messages: &[Message],
            _tools: &[ToolDefinition],
        ) -> Result<Message, BackendError> {
            let idx = self.round.fetch_add(1, Ordering::SeqCst) as usize;
            Ok(self
                .turns
                .get(idx)
                .cloned()
                .unwrap_or_else(|| Message::assistant("done")))
        }
    }

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn definition(&self) -> ToolDefinition {
            ToolDefinition {
                name: "echo".to_string(),
                description: "Echo the arguments back".to_string(),
                parameters: serde_json::json!({"type": "object"}),
            }
        }

        async fn call(
            &self,
            args: serde_json::Value,
            _ctx: &ToolContext,
        ) -> Result<serde_json::Value, ToolError> {
            Ok(args)
        }
    }

    struct StuckTool;

    #[async_trait]
    impl Tool for StuckTool {
        fn definition(&self) -> ToolDefinition {
            ToolDefinition {
                name: "stuck".to_string(),
                description: "Never returns".to_string(),
                parameters: serde_json::json!({"type": "object"}),
            }
        }

        async fn call(
            &self,
            _args: serde_json::Value,
            _ctx: &ToolContext,
        ) -> Result<serde_json::Value, ToolError> {
            futures::future::pending().await
        }
    }

    fn call(name: &str) -> ToolCall {
        ToolCall {
            id: format!("call_{name}"),
            name: name.to_string(),
            arguments: serde_json::json!({"value": 1}),
        }
    }

    #[tokio::test]
    async fn should_terminate_when_model_requests_no_tools() {
        let backend = ScriptedBackend::new(vec![Message::assistant("all done")]);
        let transcript = run_loop(
            &backend,
            &ToolRegistry::new(),
            &test_ctx(),
            "do the thing".to_string(),
            &AgentLoopConfig::default(),
            &CancellationToken::new(),
            None,
        )
        .await;

        assert_eq!(transcript.len(), 2);
        assert_eq!(transcript[0].role, MessageRole::User);
        assert_eq!(transcript[1].content, "all done");
    }

    #[tokio::test]
    async fn should_execute_requested_tool_and_continue() {
        let backend = ScriptedBackend::new(vec![
            Message::assistant_with_calls("", vec![call("echo")]),
            Message::assistant("finished"),
        ]);
        let tools = ToolRegistry::new().with(Arc::new(EchoTool));
        let transcript = run_loop(
            &backend,
            &tools,
            &test_ctx(),
            "task".to_string(),
            &AgentLoopConfig::default(),
            &CancellationToken::new(),
            None,
        )
        .await;

        // user, assistant+call, tool result, final assistant
        assert_eq!(transcript.len(), 4);
        assert_eq!(transcript[2].role, MessageRole::Tool);
        assert_eq!(transcript[2].tool_call_id.as_deref(), Some("call_echo"));
        assert_eq!(transcript[3].content, "finished");
    }

    #[tokio::test]
    async fn should_report_unknown_tool_as_failed_result() {
        let backend = ScriptedBackend::new(vec![
            Message::assistant_with_calls("", vec![call("missing")]),
            Message::assistant("ok"),
        ]);
        let transcript = run_loop(
            &backend,
            &ToolRegistry::new(),
            &test_ctx(),
            "task".to_string(),
            &AgentLoopConfig::default(),
            &CancellationToken::new(),
            None,
        )
        .await;

        assert_eq!(transcript[2].role, MessageRole::Tool);
        assert!(transcript[2].content.contains("unknown tool"));
    }

    #[tokio::test(start_paused = true)]
    async fn should_report_tool_timeout_as_failed_result() {
        let backend = ScriptedBackend::new(vec![
            Message::assistant_with_calls("", vec![call("stuck")]),
            Message::assistant("ok"),
        ]);
        let tools = ToolRegistry::new().with(Arc::new(StuckTool));
        let transcript = run_loop(
            &backend,
            &tools,
            &test_ctx(),
            "task".to_string(),
            &AgentLoopConfig::default(),
            &CancellationToken::new(),
            None,
        )
        .await;

        assert!(transcript[2].content.contains("deadline"));
        assert_eq!(transcript[3].content, "ok");
    }

    #[tokio::test]
    async fn should_truncate_at_round_ceiling() {
        // Always asks for another tool call, never finishes.
        let backend = ScriptedBackend::new(
            (0..20)
                .map(|_| Message::assistant_with_calls("", vec![call("echo")]))
                .collect(),
        );
        let tools = ToolRegistry::new().with(Arc::new(EchoTool));
        let config = AgentLoopConfig {
            max_rounds: 3,
            ..AgentLoopConfig::default()
        };
        let transcript = run_loop(
            &backend,
            &tools,
            &test_ctx(),
            "task".to_string(),
            &config,
            &CancellationToken::new(),
            None,
        )
        .await;

        // user + 3 × (assistant call + tool result)
        assert_eq!(transcript.len(), 7);
    }

    #[tokio::test]
    async fn should_emit_every_append_incrementally() {
        let backend = ScriptedBackend::new(vec![
            Message::assistant_with_calls("", vec![call("echo")]),
            Message::assistant("finished"),
        ]);
        let tools = ToolRegistry::new().with(Arc::new(EchoTool));
        let (tx, mut rx) = mpsc::channel(16);

        let transcript = run_loop(
            &backend,
            &tools,
            &test_ctx(),
            "task".to_string(),
            &AgentLoopConfig::default(),
            &CancellationToken::new(),
            Some(&tx),
        )
        .await;
        drop(tx);

        let mut streamed = Vec::new();
        while let Some(msg) = rx.recv().await {
            streamed.push(msg);
        }
        assert_eq!(streamed, transcript);
    }

    #[tokio::test]
    async fn should_stop_consuming_turns_when_cancelled() {
        let backend = ScriptedBackend::new(vec![Message::assistant("never seen")]);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let transcript = run_loop(
            &backend,
            &ToolRegistry::new(),
            &test_ctx(),
            "task".to_string(),
            &AgentLoopConfig::default(),
            &cancel,
            None,
        )
        .await;

        // Only the initial user turn was appended.
        assert_eq!(transcript.len(), 1);
        assert_eq!(transcript[0].role, MessageRole::User);
    }

    /// Backend whose first completion hangs, then answers normally.
    struct SlowThenDoneBackend {
        round: AtomicU32,
    }

    #[async_trait]
    impl crate::ports::LlmBackend for SlowThenDoneBackend {
        fn name(&self) -> &str {
            "slow"
        }

        async fn complete(
            &self,
            _messages: &[Message],
            _tools: &[ToolDefinition],
        ) -> Result<Message, BackendError> {
            if self.round.fetch_add(1, Ordering::SeqCst) == 0 {
                futures::future::pending().await
            } else {
                Ok(Message::assistant("recovered"))
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn should_inject_apology_on_model_timeout_and_continue() {
        let backend = SlowThenDoneBackend {
            round: AtomicU32::new(0),
        };
        let transcript = run_loop(
            &backend,
            &ToolRegistry::new(),
            &test_ctx(),
            "task".to_string(),
            &AgentLoopConfig::default(),
            &CancellationToken::new(),
            None,
        )
        .await;

        assert_eq!(transcript.len(), 3);
        assert_eq!(transcript[1].content, TIMEOUT_APOLOGY);
        assert_eq!(transcript[2].content, "recovered");
    }
}

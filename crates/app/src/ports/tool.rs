//! Tool port — named, schema-described callables for the agentic loop.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use mindhub_domain::error::ToolError;
use mindhub_domain::log::ServiceCallRecord;
use serde::{Deserialize, Serialize};

use super::storage::SignalStore;

/// A tool declaration sent to the model alongside the transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON schema of the tool's arguments object.
    pub parameters: serde_json::Value,
}

/// Per-execution context handed to every tool call.
///
/// Carries the automation the run belongs to, the signal store (so
/// scheduling tools can create and cancel signals), and the collector for
/// service-call audit records.
#[derive(Clone)]
pub struct ToolContext {
    /// Hash of the automation this run executes on behalf of.
    pub automation_hash: String,
    pub signals: Arc<dyn SignalStore>,
    services: Arc<Mutex<Vec<ServiceCallRecord>>>,
}

impl ToolContext {
    #[must_use]
    pub fn new(automation_hash: impl Into<String>, signals: Arc<dyn SignalStore>) -> Self {
        Self {
            automation_hash: automation_hash.into(),
            signals,
            services: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Record a side effect issued during this run.
    ///
    /// Recorded effects stand even when the run is later cancelled.
    pub fn record_service_call(&self, record: ServiceCallRecord) {
        self.services
            .lock()
            .expect("service call collector poisoned")
            .push(record);
    }

    /// Drain the service calls recorded so far, in issue order.
    #[must_use]
    pub fn take_service_calls(&self) -> Vec<ServiceCallRecord> {
        std::mem::take(
            &mut *self
                .services
                .lock()
                .expect("service call collector poisoned"),
        )
    }
}

/// A callable the model may invoke. Results must be JSON-serializable.
#[async_trait]
pub trait Tool: Send + Sync {
    fn definition(&self) -> ToolDefinition;

    /// Execute the tool with the model-provided arguments.
    async fn call(
        &self,
        args: serde_json::Value,
        ctx: &ToolContext,
    ) -> Result<serde_json::Value, ToolError>;
}

/// A closed set of named tools.
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, tool: Arc<dyn Tool>) -> Self {
        self.tools.push(tool);
        self
    }

    /// Declarations for every registered tool.
    #[must_use]
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(|t| t.definition()).collect()
    }

    /// Look up a tool by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.iter().find(|t| t.definition().name == name)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

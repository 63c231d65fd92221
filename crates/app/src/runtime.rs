//! Runtime assembly and the read-only surface exposed to transports.
//!
//! The pipeline owns the automation list and the trigger-handler set;
//! everything outside the `app` crate sees them only through the feeds on
//! [`RuntimeHandle`]. Transports receive the handle at construction —
//! there is no global runtime.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc, watch};

use mindhub_domain::automation::Automation;
use mindhub_domain::error::{HubError, NotFoundError};
use mindhub_domain::log::AutomationLogEntry;
use mindhub_domain::message::Message;

use crate::agent_loop::AgentLoopConfig;
use crate::executor::Executor;
use crate::pipeline::{Pipeline, PipelineConfig};
use crate::ports::{DirectoryWatcher, LlmBackend, LogStore, SignalStore, StateObserver, ToolRegistry};
use crate::triggers::TriggerDescription;

/// The runtime surface a transport serves to remote callers.
#[async_trait]
pub trait RuntimeApi: Send + Sync {
    /// The current automation list.
    async fn list_automations(&self) -> Vec<Automation>;

    /// Current trigger-handler descriptions (the "pending automations" view).
    async fn list_triggers(&self) -> Vec<TriggerDescription>;

    /// The most recent log entries, newest first.
    async fn recent_logs(&self, limit: usize) -> Result<Vec<AutomationLogEntry>, HubError>;

    /// Subscribe to log entries appended from now on.
    fn subscribe_logs(&self) -> broadcast::Receiver<AutomationLogEntry>;

    /// Run an automation immediately, streaming its transcript turns.
    async fn run_automation(&self, hash: &str) -> Result<mpsc::Receiver<Message>, HubError>;
}

/// Cloneable read/run handle over a live runtime.
#[derive(Clone)]
pub struct RuntimeHandle {
    automations: watch::Receiver<Vec<Automation>>,
    triggers: watch::Receiver<Vec<TriggerDescription>>,
    log_feed: broadcast::Sender<AutomationLogEntry>,
    logs: Arc<dyn LogStore>,
    executor: Executor,
}

#[async_trait]
impl RuntimeApi for RuntimeHandle {
    async fn list_automations(&self) -> Vec<Automation> {
        self.automations.borrow().clone()
    }

    async fn list_triggers(&self) -> Vec<TriggerDescription> {
        self.triggers.borrow().clone()
    }

    async fn recent_logs(&self, limit: usize) -> Result<Vec<AutomationLogEntry>, HubError> {
        self.logs.recent(limit).await
    }

    fn subscribe_logs(&self) -> broadcast::Receiver<AutomationLogEntry> {
        self.log_feed.subscribe()
    }

    async fn run_automation(&self, hash: &str) -> Result<mpsc::Receiver<Message>, HubError> {
        let automation = self
            .automations
            .borrow()
            .iter()
            .find(|a| a.hash == hash)
            .cloned()
            .ok_or_else(|| NotFoundError {
                entity: "Automation",
                id: hash.to_string(),
            })?;

        let (tx, rx) = mpsc::channel(16);
        let executor = self.executor.clone();
        tokio::spawn(async move {
            executor.run_manual(automation, tx).await;
        });
        Ok(rx)
    }
}

/// Capacity of the log-entry broadcast feed.
const LOG_FEED_CAPACITY: usize = 256;

/// Wire a pipeline and its handle from ports and configuration.
#[must_use]
#[allow(clippy::too_many_arguments)]
pub fn build_runtime(
    pipeline_config: PipelineConfig,
    loop_config: AgentLoopConfig,
    backend: Arc<dyn LlmBackend>,
    tools: ToolRegistry,
    signals: Arc<dyn SignalStore>,
    logs: Arc<dyn LogStore>,
    observer: Arc<dyn StateObserver>,
    watcher: Arc<dyn DirectoryWatcher>,
) -> (Pipeline, RuntimeHandle) {
    let (automations_tx, automations_rx) = watch::channel(Vec::new());
    let (triggers_tx, triggers_rx) = watch::channel(Vec::new());
    let (log_feed, _) = broadcast::channel(LOG_FEED_CAPACITY);

    let executor = Executor::new(
        backend,
        tools,
        Arc::clone(&signals),
        Arc::clone(&logs),
        log_feed.clone(),
        loop_config,
    );

    let pipeline = Pipeline::new(
        pipeline_config,
        signals,
        observer,
        watcher,
        executor.clone(),
        automations_tx,
        triggers_tx,
    );

    let handle = RuntimeHandle {
        automations: automations_rx,
        triggers: triggers_rx,
        log_feed,
        logs,
        executor,
    };

    (pipeline, handle)
}

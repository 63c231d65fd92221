//! Execution step — turns a fire event (or a manual request) into one
//! agent run and one appended log entry.
//!
//! Side effects are never rolled back: a cancelled run still logs the
//! transcript it produced and keeps any service calls it already issued.

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use mindhub_domain::automation::Automation;
use mindhub_domain::log::{AutomationLogEntry, LogEntryKind};
use mindhub_domain::message::Message;
use mindhub_domain::signal::TriggerPayload;

use crate::agent_loop::{run_loop, AgentLoopConfig};
use crate::ports::{LlmBackend, LogStore, SignalStore, ToolContext, ToolRegistry};
use crate::triggers::FireEvent;

/// Shared execution dependencies; cheap to clone.
#[derive(Clone)]
pub struct Executor {
    backend: Arc<dyn LlmBackend>,
    tools: ToolRegistry,
    signals: Arc<dyn SignalStore>,
    logs: Arc<dyn LogStore>,
    log_feed: broadcast::Sender<AutomationLogEntry>,
    config: AgentLoopConfig,
}

impl Executor {
    #[must_use]
    pub fn new(
        backend: Arc<dyn LlmBackend>,
        tools: ToolRegistry,
        signals: Arc<dyn SignalStore>,
        logs: Arc<dyn LogStore>,
        log_feed: broadcast::Sender<AutomationLogEntry>,
        config: AgentLoopConfig,
    ) -> Self {
        Self {
            backend,
            tools,
            signals,
            logs,
            log_feed,
            config,
        }
    }

    /// Run an automation because its trigger fired.
    ///
    /// One-shot signals are marked dead up front so a preempted run cannot
    /// re-arm them on the next reschedule.
    pub async fn execute_signal(&self, fire: FireEvent, cancel: CancellationToken) {
        let FireEvent { signal, automation } = fire;
        info!(
            automation = %automation.file_name,
            signal = %signal.id,
            kind = signal.payload.kind(),
            "trigger fired, executing automation"
        );

        if signal.payload.is_one_shot() {
            if let Err(err) = self.signals.mark_dead(signal.id).await {
                error!(%err, signal = %signal.id, "failed to mark one-shot signal dead");
            }
        }

        let prompt = execute_prompt(&automation);
        self.run(
            LogEntryKind::ExecuteSignal,
            automation,
            Some(signal.payload),
            prompt,
            cancel,
            None,
        )
        .await;
    }

    /// Run an automation on direct request, streaming transcript turns.
    pub async fn run_manual(&self, automation: Automation, turn_tx: mpsc::Sender<Message>) {
        let prompt = execute_prompt(&automation);
        self.run(
            LogEntryKind::Manual,
            automation,
            None,
            prompt,
            CancellationToken::new(),
            Some(turn_tx),
        )
        .await;
    }

    /// Ask the model to plan signals for an automation that has none.
    pub async fn determine_signals(&self, automation: Automation, cancel: CancellationToken) {
        let prompt = determine_prompt(&automation);
        self.run(
            LogEntryKind::DetermineSignal,
            automation,
            None,
            prompt,
            cancel,
            None,
        )
        .await;
    }

    async fn run(
        &self,
        kind: LogEntryKind,
        automation: Automation,
        signaled_by: Option<TriggerPayload>,
        prompt: String,
        cancel: CancellationToken,
        turn_tx: Option<mpsc::Sender<Message>>,
    ) {
        let ctx = ToolContext::new(automation.hash.clone(), Arc::clone(&self.signals));
        let transcript = run_loop(
            self.backend.as_ref(),
            &self.tools,
            &ctx,
            prompt,
            &self.config,
            &cancel,
            turn_tx.as_ref(),
        )
        .await;

        let mut entry =
            AutomationLogEntry::new(kind, transcript).with_automation(automation.clone());
        if let Some(payload) = signaled_by {
            entry = entry.with_signaled_by(payload);
        }
        entry = entry.with_services_called(ctx.take_service_calls());

        if let Err(err) = self.logs.append_automation_log(&entry).await {
            error!(%err, automation = %automation.file_name, "failed to append log entry");
            return;
        }
        for record in &entry.services_called {
            if let Err(err) = self.logs.append_service_call(entry.id, record).await {
                error!(%err, service = %record.service, "failed to append service call record");
            }
        }

        // No subscribers is fine; the feed is best-effort.
        let _ = self.log_feed.send(entry);
    }
}

fn execute_prompt(automation: &Automation) -> String {
    format!(
        "You are a home automation agent. Carry out the following automation \
         now, using the available tools where needed. When the task is \
         complete, reply with a short summary and no further tool calls.\n\n\
         {}",
        automation.contents
    )
}

fn determine_prompt(automation: &Automation) -> String {
    format!(
        "You are a home automation agent. The following automation has no \
         schedule yet. Decide when it should run and register the \
         appropriate signals with the schedule_signal tool (cron, offset, \
         absolute time, or state match). Do not carry out the automation \
         itself.\n\n{}",
        automation.contents
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use mindhub_domain::error::{BackendError, HubError};
    use mindhub_domain::id::{LogEntryId, SignalId};
    use mindhub_domain::log::ServiceCallRecord;
    use mindhub_domain::signal::{NewSignal, Signal};

    use crate::ports::ToolDefinition;

    struct DoneBackend;

    #[async_trait]
    impl LlmBackend for DoneBackend {
        fn name(&self) -> &str {
            "done"
        }

        async fn complete(
            &self,
            _messages: &[Message],
            _tools: &[ToolDefinition],
        ) -> Result<Message, BackendError> {
            Ok(Message::assistant("done"))
        }
    }

    #[derive(Default)]
    struct RecordingSignalStore {
        dead: Mutex<Vec<SignalId>>,
    }

    #[async_trait]
    impl SignalStore for RecordingSignalStore {
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
        async fn mark_dead(&self, id: SignalId) -> Result<(), HubError> {
            self.dead.lock().unwrap().push(id);
            Ok(())
        }
    }

    #[derive(Default)]
    struct InMemoryLogStore {
        entries: Mutex<Vec<AutomationLogEntry>>,
    }

    #[async_trait]
    impl LogStore for InMemoryLogStore {
        async fn append_automation_log(&self, entry: &AutomationLogEntry) -> Result<(), HubError> {
            self.entries.lock().unwrap().push(entry.clone());
            Ok(())
        }
        async fn append_service_call(
            &self,
            _log_entry_id: LogEntryId,
            _record: &ServiceCallRecord,
        ) -> Result<(), HubError> {
            Ok(())
        }
        async fn recent(&self, limit: usize) -> Result<Vec<AutomationLogEntry>, HubError> {
            let entries = self.entries.lock().unwrap();
            Ok(entries.iter().rev().take(limit).cloned().collect())
        }
    }

    fn executor(
        signals: Arc<RecordingSignalStore>,
        logs: Arc<InMemoryLogStore>,
    ) -> (Executor, broadcast::Receiver<AutomationLogEntry>) {
        let (log_feed, log_rx) = broadcast::channel(16);
        (
            Executor::new(
                Arc::new(DoneBackend),
                ToolRegistry::new(),
                signals,
                logs,
                log_feed,
                AgentLoopConfig::default(),
            ),
            log_rx,
        )
    }

    fn fire(payload: TriggerPayload) -> FireEvent {
        FireEvent {
            signal: Signal {
                id: SignalId::new(),
                created_at: mindhub_domain::time::now(),
                automation_hash: "hash".to_string(),
                payload,
                is_dead: false,
            },
            automation: Automation::from_contents("Water the plants.", "a.md"),
        }
    }

    #[tokio::test]
    async fn should_append_execute_log_entry_with_trigger_context() {
        let signals = Arc::new(RecordingSignalStore::default());
        let logs = Arc::new(InMemoryLogStore::default());
        let (executor, mut log_rx) = executor(Arc::clone(&signals), Arc::clone(&logs));

        executor
            .execute_signal(
                fire(TriggerPayload::Cron {
                    cron: "0 0 8 * * *".to_string(),
                }),
                CancellationToken::new(),
            )
            .await;

        let entries = logs.entries.lock().unwrap().clone();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].kind, LogEntryKind::ExecuteSignal);
        assert!(matches!(
            entries[0].signaled_by,
            Some(TriggerPayload::Cron { .. })
        ));
        assert!(entries[0].automation.is_some());

        // The entry is also published on the live feed.
        let published = log_rx.recv().await.unwrap();
        assert_eq!(published.id, entries[0].id);
    }

    #[tokio::test]
    async fn should_mark_one_shot_signal_dead_after_firing() {
        let signals = Arc::new(RecordingSignalStore::default());
        let logs = Arc::new(InMemoryLogStore::default());
        let (executor, _log_rx) = executor(Arc::clone(&signals), logs);

        let event = fire(TriggerPayload::Offset {
            offset_in_seconds: 5.0,
        });
        let id = event.signal.id;
        executor.execute_signal(event, CancellationToken::new()).await;

        assert_eq!(signals.dead.lock().unwrap().as_slice(), &[id]);
    }

    #[tokio::test]
    async fn should_not_mark_recurring_signal_dead() {
        let signals = Arc::new(RecordingSignalStore::default());
        let logs = Arc::new(InMemoryLogStore::default());
        let (executor, _log_rx) = executor(Arc::clone(&signals), logs);

        executor
            .execute_signal(
                fire(TriggerPayload::Cron {
                    cron: "0 0 8 * * *".to_string(),
                }),
                CancellationToken::new(),
            )
            .await;

        assert!(signals.dead.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn should_stream_manual_run_turns() {
        let signals = Arc::new(RecordingSignalStore::default());
        let logs = Arc::new(InMemoryLogStore::default());
        let (executor, _log_rx) = executor(signals, Arc::clone(&logs));

        let (tx, mut rx) = mpsc::channel(16);
        executor
            .run_manual(Automation::from_contents("Do it.", "a.md"), tx)
            .await;

        let mut turns = Vec::new();
        while let Some(turn) = rx.recv().await {
            turns.push(turn);
        }
        assert_eq!(turns.len(), 2);

        let entries = logs.entries.lock().unwrap();
        assert_eq!(entries[0].kind, LogEntryKind::Manual);
        assert!(entries[0].signaled_by.is_none());
    }

    #[tokio::test]
    async fn should_log_determine_run_with_its_own_kind() {
        let signals = Arc::new(RecordingSignalStore::default());
        let logs = Arc::new(InMemoryLogStore::default());
        let (executor, _log_rx) = executor(signals, Arc::clone(&logs));

        executor
            .determine_signals(
                Automation::from_contents("Every morning, open the blinds.", "a.md"),
                CancellationToken::new(),
            )
            .await;

        let entries = logs.entries.lock().unwrap();
        assert_eq!(entries[0].kind, LogEntryKind::DetermineSignal);
    }
}

//! Persistence ports — signals and the append-only execution log.
//!
//! These traits are object-safe (`async_trait`) because the tool layer
//! reaches the signal store through a `dyn` handle.

use std::sync::Arc;

use async_trait::async_trait;

use mindhub_domain::error::HubError;
use mindhub_domain::id::SignalId;
use mindhub_domain::log::{AutomationLogEntry, ServiceCallRecord};
use mindhub_domain::signal::{NewSignal, Signal};

/// Persistence for [`Signal`] rows.
///
/// Append/delete-only from the core's perspective: the runtime never
/// mutates a signal's payload, it only creates, deletes, and marks dead.
#[async_trait]
pub trait SignalStore: Send + Sync {
    /// All signals that have not been marked dead.
    async fn list_alive(&self) -> Result<Vec<Signal>, HubError>;

    /// Persist a new signal and return it with its assigned id.
    async fn create(&self, signal: NewSignal) -> Result<Signal, HubError>;

    /// Delete one signal by id. Deleting a missing signal is not an error.
    async fn delete(&self, id: SignalId) -> Result<(), HubError>;

    /// Delete every signal bound to the given automation hash.
    async fn delete_by_hash(&self, automation_hash: &str) -> Result<(), HubError>;

    /// Mark a one-shot signal as consumed.
    async fn mark_dead(&self, id: SignalId) -> Result<(), HubError>;
}

/// Persistence for the append-only execution log.
#[async_trait]
pub trait LogStore: Send + Sync {
    /// Append one log entry. Entries are write-once; there is no update.
    async fn append_automation_log(&self, entry: &AutomationLogEntry) -> Result<(), HubError>;

    /// Append one service-call audit record under an existing log entry.
    async fn append_service_call(
        &self,
        log_entry_id: mindhub_domain::id::LogEntryId,
        record: &ServiceCallRecord,
    ) -> Result<(), HubError>;

    /// The most recent log entries, newest first.
    async fn recent(&self, limit: usize) -> Result<Vec<AutomationLogEntry>, HubError>;
}

#[async_trait]
impl<T: SignalStore + ?Sized> SignalStore for Arc<T> {
    async fn list_alive(&self) -> Result<Vec<Signal>, HubError> {
        (**self).list_alive().await
    }

    async fn create(&self, signal: NewSignal) -> Result<Signal, HubError> {
        (**self).create(signal).await
    }

    async fn delete(&self, id: SignalId) -> Result<(), HubError> {
        (**self).delete(id).await
    }

    async fn delete_by_hash(&self, automation_hash: &str) -> Result<(), HubError> {
        (**self).delete_by_hash(automation_hash).await
    }

    async fn mark_dead(&self, id: SignalId) -> Result<(), HubError> {
        (**self).mark_dead(id).await
    }
}

#[async_trait]
impl<T: LogStore + ?Sized> LogStore for Arc<T> {
    async fn append_automation_log(&self, entry: &AutomationLogEntry) -> Result<(), HubError> {
        (**self).append_automation_log(entry).await
    }

    async fn append_service_call(
        &self,
        log_entry_id: mindhub_domain::id::LogEntryId,
        record: &ServiceCallRecord,
    ) -> Result<(), HubError> {
        (**self).append_service_call(log_entry_id, record).await
    }

    async fn recent(&self, limit: usize) -> Result<Vec<AutomationLogEntry>, HubError> {
        (**self).recent(limit).await
    }
}

//! Observation ports — entity state changes and filesystem ticks.

use std::path::Path;

use futures::stream::BoxStream;

use mindhub_domain::state::StateChange;

/// Observes state updates for a set of entities.
///
/// Used only by the state-regex trigger handler. The returned stream is
/// lazy and runs until dropped; dropping it releases the subscription.
pub trait StateObserver: Send + Sync {
    /// A lazy sequence of state changes for the given entities.
    fn observe(&self, entity_ids: &[String]) -> BoxStream<'static, StateChange>;
}

/// Watches a directory for changes.
pub trait DirectoryWatcher: Send + Sync {
    /// A lazy sequence of change ticks for the given path.
    ///
    /// Ticks carry no payload; the consumer re-scans the directory itself.
    /// The stream ends when the watcher is torn down.
    fn watch(&self, path: &Path, recursive: bool) -> BoxStream<'static, ()>;
}

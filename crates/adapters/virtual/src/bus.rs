//! In-process entity state bus.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use futures::stream::{BoxStream, StreamExt};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

use mindhub_app::ports::StateObserver;
use mindhub_domain::state::StateChange;

const FEED_CAPACITY: usize = 64;

/// Holds the last known state per entity and broadcasts every update.
///
/// Stands in for a real home hub: tests and the demo runtime push states
/// through it, the state-regex trigger handlers observe it.
pub struct VirtualStateBus {
    states: RwLock<HashMap<String, StateChange>>,
    feed: broadcast::Sender<StateChange>,
}

impl VirtualStateBus {
    #[must_use]
    pub fn new() -> Arc<Self> {
        let (feed, _) = broadcast::channel(FEED_CAPACITY);
        Arc::new(Self {
            states: RwLock::new(HashMap::new()),
            feed,
        })
    }

    /// Record a state update and publish it to every observer.
    pub fn push_state(&self, change: StateChange) {
        self.states
            .write()
            .expect("state map poisoned")
            .insert(change.entity_id.clone(), change.clone());
        // No observers is fine.
        let _ = self.feed.send(change);
    }

    /// The last known state of one entity.
    #[must_use]
    pub fn state_of(&self, entity_id: &str) -> Option<StateChange> {
        self.states
            .read()
            .expect("state map poisoned")
            .get(entity_id)
            .cloned()
    }

    /// All last known states, ordered by entity id.
    #[must_use]
    pub fn snapshot(&self) -> Vec<StateChange> {
        let mut states: Vec<StateChange> = self
            .states
            .read()
            .expect("state map poisoned")
            .values()
            .cloned()
            .collect();
        states.sort_by(|a, b| a.entity_id.cmp(&b.entity_id));
        states
    }
}

impl StateObserver for VirtualStateBus {
    fn observe(&self, entity_ids: &[String]) -> BoxStream<'static, StateChange> {
        let ids: Vec<String> = entity_ids.to_vec();
        BroadcastStream::new(self.feed.subscribe())
            .filter_map(move |item| {
                let keep = item.ok().filter(|change| ids.contains(&change.entity_id));
                async move { keep }
            })
            .boxed()
    }
}

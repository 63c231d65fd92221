//! # mindhub-adapter-fswatch-notify
//!
//! [`DirectoryWatcher`] adapter backed by [notify](https://docs.rs/notify).
//!
//! Filesystem events are collapsed to plain ticks; the pipeline re-scans
//! the directory itself and applies its own debouncing.

use std::path::Path;

use futures::stream::{self, BoxStream, StreamExt};
use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{error, warn};

use mindhub_app::ports::DirectoryWatcher;

/// Directory watcher using the platform's native notification backend.
#[derive(Debug, Default, Clone, Copy)]
pub struct NotifyDirectoryWatcher;

impl NotifyDirectoryWatcher {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

fn is_relevant(event: &Event) -> bool {
    // Access events fire on every read; only content-affecting kinds count.
    event.kind.is_create() || event.kind.is_modify() || event.kind.is_remove()
}

impl DirectoryWatcher for NotifyDirectoryWatcher {
    fn watch(&self, path: &Path, recursive: bool) -> BoxStream<'static, ()> {
        let (tx, rx) = mpsc::unbounded_channel();
        let callback = move |result: Result<Event, notify::Error>| match result {
            Ok(event) => {
                if is_relevant(&event) {
                    let _ = tx.send(());
                }
            }
            Err(err) => warn!(%err, "filesystem watch error"),
        };

        let mut watcher = match RecommendedWatcher::new(callback, Config::default()) {
            Ok(watcher) => watcher,
            Err(err) => {
                error!(%err, "failed to create filesystem watcher");
                return stream::empty().boxed();
            }
        };
        let mode = if recursive {
            RecursiveMode::Recursive
        } else {
            RecursiveMode::NonRecursive
        };
        if let Err(err) = watcher.watch(path, mode) {
            error!(%err, path = %path.display(), "failed to watch directory");
            return stream::empty().boxed();
        }

        // The watcher moves into the stream so the subscription lives
        // exactly as long as the consumer; dropping the stream drops the
        // watcher, which closes the channel.
        UnboundedReceiverStream::new(rx)
            .map(move |()| {
                let _ = &watcher;
            })
            .boxed()
    }
}

//! The reactive runtime pipeline.
//!
//! Five stages: directory watch → reparse → reschedule → fire → execute.
//! Stages 2, 3, and 5 are latest-wins: a new input cancels the in-flight
//! work via a child [`CancellationToken`]. Stage 4 merges every handler's
//! fire stream with `select_all`, so no handler can starve another.
//!
//! A reparse or reschedule failure is logged and absorbed; the pipeline
//! resumes on the next directory-change tick.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::stream::{self, BoxStream, StreamExt};
use futures::stream::select_all;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use mindhub_domain::automation::{self, Automation};
use mindhub_domain::error::HubError;
use mindhub_domain::signal::Signal;

use crate::executor::Executor;
use crate::ports::{DirectoryWatcher, SignalStore, StateObserver};
use crate::triggers::{TriggerDescription, TriggerHandler};

/// Pipeline tuning knobs.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Directory holding automation source files. When unset the pipeline
    /// is dormant and the runtime serves RPC only.
    pub automation_dir: Option<PathBuf>,
    /// Coalescing window for filesystem change ticks.
    pub debounce: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            automation_dir: None,
            debounce: Duration::from_secs(2),
        }
    }
}

/// State shared by every reschedule cycle.
struct CycleShared {
    signals: Arc<dyn SignalStore>,
    observer: Arc<dyn StateObserver>,
    executor: Executor,
    automations_tx: watch::Sender<Vec<Automation>>,
    triggers_tx: watch::Sender<Vec<TriggerDescription>>,
    rescan_tx: mpsc::Sender<()>,
    /// Automation hashes already given a determine-signal run this
    /// lifetime, so a model that declines to schedule is not asked again.
    determined: Mutex<HashSet<String>>,
}

/// The restartable dataflow graph owning the automation list and the
/// trigger-handler set.
pub struct Pipeline {
    config: PipelineConfig,
    watcher: Arc<dyn DirectoryWatcher>,
    shared: Arc<CycleShared>,
    rescan_rx: mpsc::Receiver<()>,
}

impl Pipeline {
    #[must_use]
    pub fn new(
        config: PipelineConfig,
        signals: Arc<dyn SignalStore>,
        observer: Arc<dyn StateObserver>,
        watcher: Arc<dyn DirectoryWatcher>,
        executor: Executor,
        automations_tx: watch::Sender<Vec<Automation>>,
        triggers_tx: watch::Sender<Vec<TriggerDescription>>,
    ) -> Self {
        let (rescan_tx, rescan_rx) = mpsc::channel(4);
        Self {
            config,
            watcher,
            shared: Arc::new(CycleShared {
                signals,
                observer,
                executor,
                automations_tx,
                triggers_tx,
                rescan_tx,
                determined: Mutex::new(HashSet::new()),
            }),
            rescan_rx,
        }
    }

    /// Drive the pipeline until the token is cancelled.
    pub async fn run(mut self, cancel: CancellationToken) {
        let Some(dir) = self.config.automation_dir.clone() else {
            info!("no automation directory configured, runtime is dormant");
            cancel.cancelled().await;
            return;
        };

        let mut ticks = self.watcher.watch(&dir, true);

        // Initial tick at startup.
        let mut cycle = cancel.child_token();
        spawn_cycle(Arc::clone(&self.shared), dir.clone(), cycle.clone());

        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    cycle.cancel();
                    break;
                }
                tick = ticks.next() => match tick {
                    Some(()) => {
                        self.coalesce(&mut ticks).await;
                        debug!("directory changed, restarting cycle");
                        cycle.cancel();
                        cycle = cancel.child_token();
                        spawn_cycle(Arc::clone(&self.shared), dir.clone(), cycle.clone());
                    }
                    None => {
                        warn!("directory watch stream ended");
                        ticks = stream::pending().boxed();
                    }
                },
                rescan = self.rescan_rx.recv() => {
                    if rescan.is_some() {
                        debug!("internal rescan requested, restarting cycle");
                        cycle.cancel();
                        cycle = cancel.child_token();
                        spawn_cycle(Arc::clone(&self.shared), dir.clone(), cycle.clone());
                    }
                }
            }
        }
    }

    /// Absorb further ticks until the debounce window stays quiet.
    async fn coalesce(&self, ticks: &mut BoxStream<'static, ()>) {
        loop {
            match tokio::time::timeout(self.config.debounce, ticks.next()).await {
                Ok(Some(())) => {}
                Ok(None) | Err(_) => break,
            }
        }
    }
}

fn spawn_cycle(shared: Arc<CycleShared>, dir: PathBuf, cancel: CancellationToken) {
    tokio::spawn(async move {
        tokio::select! {
            () = cancel.cancelled() => {
                debug!("cycle cancelled");
            }
            () = run_cycle(shared, dir, cancel.clone()) => {}
        }
    });
}

/// One reparse → reschedule → fire/execute cycle. Runs until every handler
/// stream ends or the cycle token is cancelled.
async fn run_cycle(shared: Arc<CycleShared>, dir: PathBuf, cancel: CancellationToken) {
    // Stage 2: reparse. The parsed list replaces the previous one
    // wholesale; the watch channel shares one result with all consumers.
    let automations = match scan_directory(&dir).await {
        Ok(automations) => automations,
        Err(err) => {
            error!(%err, dir = %dir.display(), "reparse failed, waiting for next change");
            return;
        }
    };
    info!(count = automations.len(), "parsed automations");
    shared.automations_tx.send_replace(automations.clone());

    // Stage 3: reschedule.
    let handlers = match reschedule(&shared, &automations).await {
        Ok(handlers) => handlers,
        Err(err) => {
            error!(%err, "reschedule failed, waiting for next change");
            return;
        }
    };
    shared
        .triggers_tx
        .send_replace(handlers.iter().map(TriggerHandler::describe).collect());

    spawn_determine_runs(&shared, &automations, &handlers, &cancel);

    // Stage 4: fan-in. Dropping `merged` (on cancellation) releases every
    // handler's timer and subscription at once.
    let mut merged = select_all(
        handlers
            .iter()
            .map(|handler| handler.fire_stream(&shared.observer)),
    );

    // Stage 5: single-flight with preemption; the later fire wins.
    let mut running: Option<CancellationToken> = None;
    while let Some(fire) = merged.next().await {
        if let Some(previous) = running.take() {
            previous.cancel();
        }
        let token = cancel.child_token();
        running = Some(token.clone());
        let executor = shared.executor.clone();
        tokio::spawn(async move {
            executor.execute_signal(fire, token).await;
        });
    }
}

/// Load alive signals, drop orphans, and build one handler per survivor.
async fn reschedule(
    shared: &CycleShared,
    automations: &[Automation],
) -> Result<Vec<TriggerHandler>, HubError> {
    let signals = shared.signals.list_alive().await?;
    let mut handlers = Vec::new();

    for signal in signals {
        match resolve(automations, &signal) {
            Some(automation) => {
                handlers.push(TriggerHandler::build(signal, automation.clone()));
            }
            None => {
                // Orphaned: the hash no longer exists. Auto-deleted, not an error.
                info!(
                    signal = %signal.id,
                    hash = %signal.automation_hash,
                    "deleting orphaned signal"
                );
                shared.signals.delete(signal.id).await?;
            }
        }
    }

    Ok(handlers)
}

fn resolve<'a>(automations: &'a [Automation], signal: &Signal) -> Option<&'a Automation> {
    automations.iter().find(|a| a.hash == signal.automation_hash)
}

/// Give every signal-less automation one determine-signal run, then nudge
/// an internal rescan so freshly created signals get handlers.
fn spawn_determine_runs(
    shared: &Arc<CycleShared>,
    automations: &[Automation],
    handlers: &[TriggerHandler],
    cancel: &CancellationToken,
) {
    let scheduled: HashSet<&str> = handlers
        .iter()
        .map(|h| h.signal.automation_hash.as_str())
        .collect();

    let missing: Vec<Automation> = {
        let mut determined = shared
            .determined
            .lock()
            .expect("determine set poisoned");
        automations
            .iter()
            .filter(|a| !scheduled.contains(a.hash.as_str()))
            .filter(|a| determined.insert(a.hash.clone()))
            .cloned()
            .collect()
    };

    if missing.is_empty() {
        return;
    }

    info!(count = missing.len(), "planning signals for new automations");
    let shared = Arc::clone(shared);
    let token = cancel.child_token();
    tokio::spawn(async move {
        for automation in missing {
            if token.is_cancelled() {
                return;
            }
            shared
                .executor
                .determine_signals(automation, token.clone())
                .await;
        }
        let _ = shared.rescan_tx.send(()).await;
    });
}

/// Recursively collect and parse every `.md` file under the directory.
async fn scan_directory(dir: &Path) -> Result<Vec<Automation>, HubError> {
    let mut automations = Vec::new();
    let mut pending = vec![dir.to_path_buf()];

    while let Some(current) = pending.pop() {
        let mut entries = tokio::fs::read_dir(&current)
            .await
            .map_err(|err| HubError::Storage(err.to_string()))?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|err| HubError::Storage(err.to_string()))?
        {
            let path = entry.path();
            if path.is_dir() {
                pending.push(path);
            } else if path.extension().is_some_and(|ext| ext == "md") {
                match tokio::fs::read_to_string(&path).await {
                    Ok(contents) => {
                        let name = path
                            .file_name()
                            .map(|n| n.to_string_lossy().into_owned())
                            .unwrap_or_default();
                        automations.extend(automation::parse_source(&name, &contents));
                    }
                    Err(err) => {
                        // One unreadable file must not sink the batch.
                        warn!(%err, path = %path.display(), "skipping unreadable automation file");
                    }
                }
            }
        }
    }

    // Stable order keeps the published list deterministic across rescans.
    automations.sort_by(|a, b| a.file_name.cmp(&b.file_name).then(a.hash.cmp(&b.hash)));
    Ok(automations)
}

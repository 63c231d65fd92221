//! Typed client stub for the RPC protocol.
//!
//! One method here per server [`Method`](crate::method::Method) — the call
//! surface is explicit rather than proxied. Call ids are monotonically
//! increasing numbers; the routing entry for a call is removed on its first
//! terminal message, so completed calls leak nothing and concurrent calls
//! sharing the channel never cross-talk.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tracing::{debug, warn};

use mindhub_app::triggers::TriggerDescription;
use mindhub_domain::automation::Automation;
use mindhub_domain::log::AutomationLogEntry;
use mindhub_domain::message::Message;

use crate::protocol::{ResponseKind, RpcRequest, RpcResponse};

/// Client-side RPC failures.
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    /// The underlying channel closed before the call finished.
    #[error("rpc transport closed")]
    Transport,

    /// The server answered with an `error` response.
    #[error("rpc call failed: {0}")]
    Remote(String),

    /// The response payload did not match the expected shape.
    #[error("malformed rpc payload: {0}")]
    Decode(#[from] serde_json::Error),
}

type PendingMap = Arc<Mutex<HashMap<String, mpsc::Sender<RpcResponse>>>>;

/// Typed handle over one duplex RPC connection.
pub struct RpcClient {
    outgoing: mpsc::Sender<String>,
    next_id: AtomicU64,
    pending: PendingMap,
}

impl RpcClient {
    /// Build a client over a duplex string channel and spawn its response
    /// router.
    #[must_use]
    pub fn new(outgoing: mpsc::Sender<String>, incoming: mpsc::Receiver<String>) -> Self {
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        tokio::spawn(route_responses(incoming, Arc::clone(&pending)));
        Self {
            outgoing,
            next_id: AtomicU64::new(1),
            pending,
        }
    }

    /// Current automation list.
    ///
    /// # Errors
    ///
    /// Returns [`RpcError`] if the transport closes or the server reports a
    /// failure.
    pub async fn list_automations(&self) -> Result<Vec<Automation>, RpcError> {
        let value = self.call("automations.list", None).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Current trigger-handler descriptions.
    ///
    /// # Errors
    ///
    /// Returns [`RpcError`] if the transport closes or the server reports a
    /// failure.
    pub async fn list_triggers(&self) -> Result<Vec<TriggerDescription>, RpcError> {
        let value = self.call("triggers.list", None).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// The most recent log entries, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`RpcError`] if the transport closes or the server reports a
    /// failure.
    pub async fn recent_logs(&self, limit: usize) -> Result<Vec<AutomationLogEntry>, RpcError> {
        let value = self
            .call("logs.recent", Some(vec![serde_json::json!(limit)]))
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Subscribe to log entries appended from now on.
    ///
    /// # Errors
    ///
    /// Returns [`RpcError::Transport`] if the request cannot be sent.
    pub async fn subscribe_logs(
        &self,
    ) -> Result<mpsc::Receiver<Result<AutomationLogEntry, RpcError>>, RpcError> {
        self.stream("logs.subscribe", None).await
    }

    /// Run an automation by hash, streaming its transcript turns.
    ///
    /// # Errors
    ///
    /// Returns [`RpcError::Transport`] if the request cannot be sent. A
    /// server-side failure arrives as the first `Err` element of the stream.
    pub async fn run_automation(
        &self,
        hash: &str,
    ) -> Result<mpsc::Receiver<Result<Message, RpcError>>, RpcError> {
        self.stream("automations.run", Some(vec![serde_json::json!(hash)]))
            .await
    }

    async fn submit(
        &self,
        method: &str,
        args: Option<Vec<serde_json::Value>>,
    ) -> Result<mpsc::Receiver<RpcResponse>, RpcError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed).to_string();
        let (tx, rx) = mpsc::channel(16);
        self.pending
            .lock()
            .expect("pending map poisoned")
            .insert(id.clone(), tx);

        let request = RpcRequest {
            request_id: id.clone(),
            method: method.to_string(),
            args,
        };
        let raw = serde_json::to_string(&request)?;
        if self.outgoing.send(raw).await.is_err() {
            self.pending
                .lock()
                .expect("pending map poisoned")
                .remove(&id);
            return Err(RpcError::Transport);
        }
        Ok(rx)
    }

    async fn call(
        &self,
        method: &str,
        args: Option<Vec<serde_json::Value>>,
    ) -> Result<serde_json::Value, RpcError> {
        let mut rx = self.submit(method, args).await?;
        match rx.recv().await {
            Some(response) => match response.kind {
                ResponseKind::Reply => Ok(response.object),
                ResponseKind::Error => Err(RpcError::Remote(describe_error(&response.object))),
                ResponseKind::Item | ResponseKind::End => Err(RpcError::Remote(format!(
                    "unexpected {:?} response to a plain call",
                    response.kind
                ))),
            },
            None => Err(RpcError::Transport),
        }
    }

    async fn stream<T>(
        &self,
        method: &str,
        args: Option<Vec<serde_json::Value>>,
    ) -> Result<mpsc::Receiver<Result<T, RpcError>>, RpcError>
    where
        T: serde::de::DeserializeOwned + Send + 'static,
    {
        let mut rx = self.submit(method, args).await?;
        let (tx, out) = mpsc::channel(16);
        tokio::spawn(async move {
            while let Some(response) = rx.recv().await {
                match response.kind {
                    ResponseKind::Item => {
                        let item = serde_json::from_value(response.object).map_err(RpcError::from);
                        if tx.send(item).await.is_err() {
                            return;
                        }
                    }
                    ResponseKind::End => return,
                    ResponseKind::Error => {
                        let _ = tx
                            .send(Err(RpcError::Remote(describe_error(&response.object))))
                            .await;
                        return;
                    }
                    ResponseKind::Reply => {
                        let _ = tx
                            .send(Err(RpcError::Remote(
                                "unexpected reply response to a streaming call".to_string(),
                            )))
                            .await;
                        return;
                    }
                }
            }
        });
        Ok(out)
    }
}

/// Route inbound responses to their call's channel, pruning the entry on
/// the first terminal message.
async fn route_responses(mut incoming: mpsc::Receiver<String>, pending: PendingMap) {
    while let Some(raw) = incoming.recv().await {
        let response: RpcResponse = match serde_json::from_str(&raw) {
            Ok(response) => response,
            Err(err) => {
                warn!(%err, "dropping malformed rpc response");
                continue;
            }
        };

        let terminal = response.kind.is_terminal();
        let target = {
            let mut pending = pending.lock().expect("pending map poisoned");
            if terminal {
                pending.remove(&response.request_id)
            } else {
                pending.get(&response.request_id).cloned()
            }
        };

        match target {
            Some(tx) => {
                // The call may have been dropped by its caller; that only
                // ends this one call.
                let _ = tx.send(response).await;
            }
            None => debug!(id = %response.request_id, "response for unknown call"),
        }
    }
}

fn describe_error(object: &serde_json::Value) -> String {
    object
        .as_str()
        .map_or_else(|| object.to_string(), ToOwned::to_owned)
}

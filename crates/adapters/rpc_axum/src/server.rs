//! Server side of the RPC protocol.
//!
//! [`serve`] speaks through a pair of string channels so the transport
//! underneath is swappable; the websocket binding in [`crate::ws`] is one
//! such transport and the tests here drive the channels directly.
//!
//! Each request is dispatched on its own task: responses for one
//! `requestId` are strictly ordered, different ids interleave freely.

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tracing::{debug, warn};

use mindhub_app::runtime::RuntimeApi;

use crate::method::Method;
use crate::protocol::{RpcRequest, RpcResponse};

/// Default entry count for `logs.recent` when the caller passes no limit.
const DEFAULT_RECENT_LIMIT: usize = 50;

/// Serve the runtime API over a duplex string channel until the incoming
/// side closes.
pub async fn serve(
    api: Arc<dyn RuntimeApi>,
    mut incoming: mpsc::Receiver<String>,
    outgoing: mpsc::Sender<String>,
) {
    while let Some(raw) = incoming.recv().await {
        match serde_json::from_str::<RpcRequest>(&raw) {
            Ok(request) => {
                debug!(id = %request.request_id, method = %request.method, "rpc request");
                let api = Arc::clone(&api);
                let outgoing = outgoing.clone();
                tokio::spawn(dispatch(api, request, outgoing));
            }
            Err(err) => match recover_request_id(&raw) {
                // Fail closed, but tell the caller when we can still
                // correlate the failure.
                Some(id) => {
                    send(&outgoing, &RpcResponse::error(id, format!("malformed request: {err}")))
                        .await;
                }
                None => warn!(%err, "dropping malformed rpc request without an id"),
            },
        }
    }
}

fn recover_request_id(raw: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(raw).ok()?;
    value
        .get("requestId")
        .and_then(serde_json::Value::as_str)
        .map(ToOwned::to_owned)
}

async fn dispatch(api: Arc<dyn RuntimeApi>, request: RpcRequest, outgoing: mpsc::Sender<String>) {
    let id = request.request_id.clone();
    let Some(method) = Method::parse(&request.method) else {
        send(
            &outgoing,
            &RpcResponse::error(id, format!("unknown method: {}", request.method)),
        )
        .await;
        return;
    };

    match method {
        Method::AutomationsList => {
            let automations = api.list_automations().await;
            reply_with(&outgoing, &id, &automations).await;
        }
        Method::TriggersList => {
            let triggers = api.list_triggers().await;
            reply_with(&outgoing, &id, &triggers).await;
        }
        Method::LogsRecent => {
            let limit = request
                .args
                .as_ref()
                .and_then(|args| args.first())
                .and_then(serde_json::Value::as_u64)
                .and_then(|n| usize::try_from(n).ok())
                .unwrap_or(DEFAULT_RECENT_LIMIT);
            match api.recent_logs(limit).await {
                Ok(entries) => reply_with(&outgoing, &id, &entries).await,
                Err(err) => {
                    send(&outgoing, &RpcResponse::error(id, err.to_string())).await;
                }
            }
        }
        Method::LogsSubscribe => {
            let mut feed = api.subscribe_logs();
            loop {
                match feed.recv().await {
                    Ok(entry) => {
                        if !item_with(&outgoing, &id, &entry).await {
                            return;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!(id = %id, missed, "log subscriber lagged, skipping entries");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            send(&outgoing, &RpcResponse::end(id)).await;
        }
        Method::AutomationsRun => {
            let Some(hash) = request
                .args
                .as_ref()
                .and_then(|args| args.first())
                .and_then(serde_json::Value::as_str)
                .map(ToOwned::to_owned)
            else {
                send(
                    &outgoing,
                    &RpcResponse::error(id, "automations.run expects an automation hash"),
                )
                .await;
                return;
            };
            match api.run_automation(&hash).await {
                Ok(mut turns) => {
                    while let Some(turn) = turns.recv().await {
                        if !item_with(&outgoing, &id, &turn).await {
                            return;
                        }
                    }
                    send(&outgoing, &RpcResponse::end(id)).await;
                }
                // Error in place of end; prior items stand.
                Err(err) => {
                    send(&outgoing, &RpcResponse::error(id, err.to_string())).await;
                }
            }
        }
    }
}

async fn reply_with<T: serde::Serialize>(outgoing: &mpsc::Sender<String>, id: &str, value: &T) {
    let response = match serde_json::to_value(value) {
        Ok(object) => RpcResponse::reply(id, object),
        Err(err) => RpcResponse::error(id, format!("failed to encode response: {err}")),
    };
    send(outgoing, &response).await;
}

/// Returns false when the outgoing channel is gone and the stream should
/// stop.
async fn item_with<T: serde::Serialize>(
    outgoing: &mpsc::Sender<String>,
    id: &str,
    value: &T,
) -> bool {
    let response = match serde_json::to_value(value) {
        Ok(object) => RpcResponse::item(id, object),
        Err(err) => RpcResponse::error(id, format!("failed to encode item: {err}")),
    };
    let terminal = response.kind.is_terminal();
    send(outgoing, &response).await && !terminal
}

async fn send(outgoing: &mpsc::Sender<String>, response: &RpcResponse) -> bool {
    match serde_json::to_string(response) {
        Ok(text) => outgoing.send(text).await.is_ok(),
        Err(err) => {
            warn!(%err, "failed to serialize rpc response");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use async_trait::async_trait;

    use mindhub_domain::automation::Automation;
    use mindhub_domain::error::{HubError, NotFoundError};
    use mindhub_domain::log::{AutomationLogEntry, LogEntryKind};
    use mindhub_domain::message::Message;

    use mindhub_app::triggers::TriggerDescription;

    use crate::protocol::ResponseKind;

    struct FakeApi {
        log_feed: broadcast::Sender<AutomationLogEntry>,
    }

    impl FakeApi {
        fn new() -> Arc<Self> {
            let (log_feed, _) = broadcast::channel(16);
            Arc::new(Self { log_feed })
        }
    }

    #[async_trait]
    impl RuntimeApi for FakeApi {
        async fn list_automations(&self) -> Vec<Automation> {
            vec![Automation::from_contents("Water the plants.", "a.md")]
        }

        async fn list_triggers(&self) -> Vec<TriggerDescription> {
            Vec::new()
        }

        async fn recent_logs(&self, limit: usize) -> Result<Vec<AutomationLogEntry>, HubError> {
            let entry = AutomationLogEntry::new(LogEntryKind::Manual, vec![Message::user("hi")]);
            Ok(std::iter::repeat_with(|| entry.clone())
                .take(limit.min(2))
                .collect())
        }

        fn subscribe_logs(&self) -> broadcast::Receiver<AutomationLogEntry> {
            self.log_feed.subscribe()
        }

        async fn run_automation(
            &self,
            hash: &str,
        ) -> Result<mpsc::Receiver<Message>, HubError> {
            if hash != "known" {
                return Err(NotFoundError {
                    entity: "Automation",
                    id: hash.to_string(),
                }
                .into());
            }
            let (tx, rx) = mpsc::channel(8);
            tokio::spawn(async move {
                for n in [3, 4, 7] {
                    tx.send(Message::assistant(n.to_string())).await.unwrap();
                }
            });
            Ok(rx)
        }
    }

    struct Wire {
        to_server: mpsc::Sender<String>,
        from_server: mpsc::Receiver<String>,
    }

    impl Wire {
        fn connect(api: Arc<dyn RuntimeApi>) -> Self {
            let (to_server, incoming) = mpsc::channel(16);
            let (outgoing, from_server) = mpsc::channel(16);
            tokio::spawn(serve(api, incoming, outgoing));
            Self {
                to_server,
                from_server,
            }
        }

        async fn request(&self, id: &str, method: &str, args: serde_json::Value) {
            let raw = serde_json::json!({"requestId": id, "method": method, "args": args});
            self.to_server.send(raw.to_string()).await.unwrap();
        }

        async fn next(&mut self) -> RpcResponse {
            let raw = tokio::time::timeout(Duration::from_secs(2), self.from_server.recv())
                .await
                .expect("no response within deadline")
                .expect("server closed the channel");
            serde_json::from_str(&raw).unwrap()
        }
    }

    #[tokio::test]
    async fn should_reply_with_automation_list() {
        let mut wire = Wire::connect(FakeApi::new());
        wire.request("1", "automations.list", serde_json::Value::Null)
            .await;

        let response = wire.next().await;
        assert_eq!(response.request_id, "1");
        assert_eq!(response.kind, ResponseKind::Reply);
        let automations: Vec<Automation> = serde_json::from_value(response.object).unwrap();
        assert_eq!(automations[0].contents, "Water the plants.");
    }

    #[tokio::test]
    async fn should_stream_items_then_end_in_order() {
        let mut wire = Wire::connect(FakeApi::new());
        wire.request("2", "automations.run", serde_json::json!(["known"]))
            .await;

        for expected in ["3", "4", "7"] {
            let response = wire.next().await;
            assert_eq!(response.kind, ResponseKind::Item);
            let turn: Message = serde_json::from_value(response.object).unwrap();
            assert_eq!(turn.content, expected);
        }
        let terminal = wire.next().await;
        assert_eq!(terminal.kind, ResponseKind::End);
    }

    #[tokio::test]
    async fn should_send_error_instead_of_end_when_call_fails() {
        let mut wire = Wire::connect(FakeApi::new());
        wire.request("3", "automations.run", serde_json::json!(["missing"]))
            .await;

        let response = wire.next().await;
        assert_eq!(response.kind, ResponseKind::Error);
        assert!(response.object.as_str().unwrap().contains("not found"));
    }

    #[tokio::test]
    async fn should_send_error_for_unknown_method() {
        let mut wire = Wire::connect(FakeApi::new());
        wire.request("4", "automations.delete", serde_json::Value::Null)
            .await;

        let response = wire.next().await;
        assert_eq!(response.request_id, "4");
        assert_eq!(response.kind, ResponseKind::Error);
    }

    #[tokio::test]
    async fn should_answer_malformed_request_when_id_is_recoverable() {
        let mut wire = Wire::connect(FakeApi::new());
        wire.to_server
            .send(r#"{"requestId": "5", "method": 42}"#.to_string())
            .await
            .unwrap();

        let response = wire.next().await;
        assert_eq!(response.request_id, "5");
        assert_eq!(response.kind, ResponseKind::Error);
    }

    #[tokio::test]
    async fn should_drop_malformed_request_without_id() {
        let mut wire = Wire::connect(FakeApi::new());
        wire.to_server.send("not json".to_string()).await.unwrap();
        // A follow-up request still gets served; the broken one vanished.
        wire.request("6", "triggers.list", serde_json::Value::Null)
            .await;

        let response = wire.next().await;
        assert_eq!(response.request_id, "6");
        assert_eq!(response.kind, ResponseKind::Reply);
    }

    #[tokio::test]
    async fn should_interleave_responses_for_concurrent_requests() {
        let api = FakeApi::new();
        let feed = api.log_feed.clone();
        let mut wire = Wire::connect(api);

        wire.request("sub", "logs.subscribe", serde_json::Value::Null)
            .await;
        // Give the subscription task a moment to attach.
        tokio::time::sleep(Duration::from_millis(50)).await;

        wire.request("list", "automations.list", serde_json::Value::Null)
            .await;
        let response = wire.next().await;
        assert_eq!(response.request_id, "list");

        feed.send(AutomationLogEntry::new(
            LogEntryKind::Manual,
            vec![Message::user("hi")],
        ))
        .unwrap();
        let pushed = wire.next().await;
        assert_eq!(pushed.request_id, "sub");
        assert_eq!(pushed.kind, ResponseKind::Item);
    }
}

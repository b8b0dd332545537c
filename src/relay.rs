//! Forwards WebSocket messages to the engine and answers the sender.

use std::sync::Arc;

use nal2_server::{ClientId, EngineBridge, InboundMessage, SessionEvent, SessionRegistry};
use serde_json::json;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

/// Spawn the relay loop. It ends when the registry is dropped or another
/// consumer takes over its inbox.
pub fn spawn_relay(registry: Arc<SessionRegistry>, bridge: EngineBridge) -> JoinHandle<()> {
    let events = registry.subscribe();
    let inbox = registry.open_inbox();
    tokio::spawn(run_relay(registry, bridge, events, inbox))
}

async fn run_relay(
    registry: Arc<SessionRegistry>,
    bridge: EngineBridge,
    mut events: broadcast::Receiver<SessionEvent>,
    mut inbox: mpsc::UnboundedReceiver<InboundMessage>,
) {
    let calls = TaskTracker::new();
    let mut watching = true;
    loop {
        tokio::select! {
            message = inbox.recv() => {
                let Some(InboundMessage { client_id, text }) = message else { break };
                // Each call gets its own task; the engine keeps the order.
                let call = answer(Arc::clone(&registry), bridge.clone(), client_id, text);
                let _ = calls.spawn(call);
            }
            event = events.recv(), if watching => match event {
                Ok(SessionEvent::Connected { client_id }) => info!(client_id = %client_id, "client joined"),
                Ok(SessionEvent::Disconnected { client_id }) => info!(client_id = %client_id, "client left"),
                Ok(SessionEvent::Message { .. }) => {}
                // Only join and leave logs are lost; messages come through the inbox.
                Err(RecvError::Lagged(skipped)) => debug!(skipped, "relay event log fell behind"),
                Err(RecvError::Closed) => watching = false,
            },
        }
    }

    let _ = calls.close();
    calls.wait().await;
    debug!("relay stopped");
}

async fn answer(
    registry: Arc<SessionRegistry>,
    bridge: EngineBridge,
    client_id: ClientId,
    text: String,
) {
    let reply = match bridge.call(text).await {
        Ok(output) => output,
        Err(err) => {
            warn!(client_id = %client_id, error = %err, "engine call from websocket failed");
            json!({ "return": -1, "error": err.to_string() }).to_string()
        }
    };
    match registry.send(&client_id, reply) {
        Ok(()) => debug!(client_id = %client_id, "reply queued"),
        Err(err) => warn!(error = %err, "could not deliver reply"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use nal2_core::{Completion, Engine};
    use serde_json::Value;

    fn bridge(engine: impl Engine) -> EngineBridge {
        EngineBridge::new(Arc::new(engine), Duration::from_secs(5))
    }

    #[tokio::test]
    async fn reply_goes_back_to_sender() {
        let registry = Arc::new(SessionRegistry::new(8));
        let relay = spawn_relay(
            Arc::clone(&registry),
            bridge(|payload: String, c: Completion| {
                let _ = c.resolve(format!("echo:{payload}"));
            }),
        );
        let (id, mut rx) = registry.register();
        let (_other, mut other_rx) = registry.register();

        registry.publish_message(&id, "ping".into());
        let reply = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reply, "echo:ping");
        assert!(other_rx.try_recv().is_err());

        relay.abort();
    }

    #[tokio::test]
    async fn engine_failure_is_reported_as_json() {
        let registry = Arc::new(SessionRegistry::new(8));
        let relay = spawn_relay(
            Arc::clone(&registry),
            bridge(|_: String, c: Completion| {
                let _ = c.reject("bad request");
            }),
        );
        let (id, mut rx) = registry.register();

        registry.publish_message(&id, "{}".into());
        let reply = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        let value: Value = serde_json::from_str(&reply).unwrap();
        assert_eq!(value["return"], -1);
        assert_eq!(value["error"], "bad request");

        relay.abort();
    }

    #[tokio::test]
    async fn reply_to_departed_client_is_dropped() {
        let registry = Arc::new(SessionRegistry::new(8));
        let relay = spawn_relay(
            Arc::clone(&registry),
            bridge(|payload: String, c: Completion| {
                let _ = c.resolve(payload);
            }),
        );
        let (gone, _rx) = registry.register();
        registry.publish_message(&gone, "x".into());
        let _ = registry.unregister(&gone);

        // The relay survives and keeps serving other clients.
        let (id, mut rx) = registry.register();
        registry.publish_message(&id, "still here".into());
        let reply = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reply, "still here");

        relay.abort();
    }

    #[tokio::test]
    async fn backlog_past_event_capacity_is_fully_answered() {
        let registry = Arc::new(SessionRegistry::new(2048));
        let relay = spawn_relay(
            Arc::clone(&registry),
            bridge(|payload: String, c: Completion| {
                let _ = c.resolve(payload);
            }),
        );
        let (id, mut rx) = registry.register();

        let total = 1100;
        for n in 0..total {
            registry.publish_message(&id, n.to_string());
        }

        let mut replies = Vec::with_capacity(total);
        while replies.len() < total {
            let reply = tokio::time::timeout(Duration::from_secs(10), rx.recv())
                .await
                .unwrap()
                .unwrap();
            replies.push(reply.parse::<usize>().unwrap());
        }
        replies.sort_unstable();
        assert_eq!(replies, (0..total).collect::<Vec<_>>());

        relay.abort();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn slow_call_does_not_hold_up_other_clients() {
        let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();
        let release_rx = parking_lot::Mutex::new(release_rx);
        let registry = Arc::new(SessionRegistry::new(8));
        let relay = spawn_relay(
            Arc::clone(&registry),
            bridge(move |payload: String, c: Completion| {
                if payload == "slow" {
                    let _ = release_rx.lock().recv();
                }
                let _ = c.resolve(payload);
            }),
        );
        let (slow, mut slow_rx) = registry.register();
        let (fast, mut fast_rx) = registry.register();

        registry.publish_message(&slow, "slow".into());
        registry.publish_message(&fast, "fast".into());
        let reply = tokio::time::timeout(Duration::from_secs(5), fast_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reply, "fast");
        assert!(slow_rx.try_recv().is_err());

        release_tx.send(()).unwrap();
        let reply = tokio::time::timeout(Duration::from_secs(5), slow_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reply, "slow");

        relay.abort();
    }
}

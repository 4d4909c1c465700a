//! Out-of-band control messages for the offline cache.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};

use crate::cache::OfflineCache;
use crate::error::OfflineError;
use crate::network::Network;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ControlMessage {
    ClearCaches,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ControlReply {
    CachesCleared { success: bool },
}

/// Apply one control message.
pub fn handle_control<N: Network>(cache: &OfflineCache<N>, message: ControlMessage) -> ControlReply {
    match message {
        ControlMessage::ClearCaches => {
            let success = match cache.clear() {
                Ok(_) => true,
                Err(e) => {
                    tracing::error!("Failed to clear offline caches: {}", e);
                    false
                }
            };
            ControlReply::CachesCleared { success }
        }
    }
}

type Envelope = (ControlMessage, oneshot::Sender<ControlReply>);

/// Sender side of a running control channel.
#[derive(Debug, Clone)]
pub struct ControlHandle {
    tx: mpsc::Sender<Envelope>,
}

impl ControlHandle {
    pub async fn send(&self, message: ControlMessage) -> Result<ControlReply, OfflineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send((message, reply_tx))
            .await
            .map_err(|_| OfflineError::ControlClosed)?;
        reply_rx.await.map_err(|_| OfflineError::ControlClosed)
    }

    /// JSON in, JSON out: `{"type":"CLEAR_CACHES"}`.
    pub async fn send_json(&self, message: &str) -> anyhow::Result<String> {
        let message: ControlMessage = serde_json::from_str(message)?;
        let reply = self.send(message).await?;
        Ok(serde_json::to_string(&reply)?)
    }
}

/// Serve control messages for `cache` until every handle is dropped.
pub fn spawn_control_channel<N>(cache: Arc<OfflineCache<N>>) -> ControlHandle
where
    N: Network + 'static,
{
    let (tx, mut rx) = mpsc::channel::<Envelope>(8);

    tokio::spawn(async move {
        while let Some((message, reply_tx)) = rx.recv().await {
            let reply = handle_control(&cache, message);
            let _ = reply_tx.send(reply);
        }
        tracing::debug!("Offline control channel closed");
    });

    ControlHandle { tx }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    #[test]
    fn test_message_wire_format() {
        let msg: ControlMessage = serde_json::from_str(r#"{"type":"CLEAR_CACHES"}"#).unwrap();
        assert_eq!(msg, ControlMessage::ClearCaches);

        let reply = serde_json::to_value(ControlReply::CachesCleared { success: true }).unwrap();
        assert_eq!(reply, serde_json::json!({"type": "CACHES_CLEARED", "success": true}));
    }

    #[test]
    fn test_unknown_message_is_rejected() {
        assert!(serde_json::from_str::<ControlMessage>(r#"{"type":"SELF_DESTRUCT"}"#).is_err());
    }
}

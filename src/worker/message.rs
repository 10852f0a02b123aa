//! Messages from the application to the worker.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::debug;

/// Commands the worker understands. No reply is ever sent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WorkerMessage {
  /// Fetch and store each URL ahead of time
  #[serde(rename = "PRECACHE_URLS")]
  PrecacheUrls { urls: Vec<String> },
}

impl WorkerMessage {
  /// Parse a raw message. Anything unrecognised is ignored.
  pub fn from_json(raw: &str) -> Option<Self> {
    match serde_json::from_str(raw) {
      Ok(message) => Some(message),
      Err(e) => {
        debug!(error = %e, "ignoring unrecognised worker message");
        None
      }
    }
  }
}

/// Application side of the worker message channel.
#[derive(Debug, Clone)]
pub struct WorkerHandle {
  tx: mpsc::UnboundedSender<WorkerMessage>,
}

impl WorkerHandle {
  pub fn channel() -> (Self, mpsc::UnboundedReceiver<WorkerMessage>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Self { tx }, rx)
  }

  /// Fire-and-forget. Returns `false` if the worker is gone.
  pub fn post(&self, message: WorkerMessage) -> bool {
    self.tx.send(message).is_ok()
  }

  pub fn precache(&self, urls: Vec<String>) -> bool {
    self.post(WorkerMessage::PrecacheUrls { urls })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_wire_format() {
    let message = WorkerMessage::PrecacheUrls {
      urls: vec!["/tasks/1".to_string()],
    };
    assert_eq!(
      serde_json::to_value(&message).unwrap(),
      serde_json::json!({ "type": "PRECACHE_URLS", "urls": ["/tasks/1"] })
    );
    assert_eq!(
      WorkerMessage::from_json(r#"{"type":"PRECACHE_URLS","urls":["/a","/b"]}"#),
      Some(WorkerMessage::PrecacheUrls {
        urls: vec!["/a".to_string(), "/b".to_string()]
      })
    );
  }

  #[test]
  fn test_unknown_messages_are_ignored() {
    assert_eq!(WorkerMessage::from_json(r#"{"type":"SKIP_WAITING"}"#), None);
    assert_eq!(WorkerMessage::from_json(r#"{"type":"PRECACHE_URLS","urls":"x"}"#), None);
    assert_eq!(WorkerMessage::from_json("null"), None);
  }

  #[tokio::test]
  async fn test_post_after_worker_gone() {
    let (handle, rx) = WorkerHandle::channel();
    assert!(handle.precache(vec!["/".to_string()]));
    drop(rx);
    assert!(!handle.precache(vec!["/".to_string()]));
  }
}

//! WebSocket message types for the loomq-server protocol
//!
//! Events pushed by the server reuse the engine's own `{"type", "data"}`
//! envelope; this module only defines the client-to-server messages and the
//! small set of direct replies.

use serde::{Deserialize, Serialize};

/// Request message from client to server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ClientMessage {
  /// Restrict pushed events to the given devices
  #[serde(rename = "subscribe")]
  Subscribe(SubscribeRequest),

  /// Ping the server
  #[serde(rename = "ping")]
  Ping,
}

/// Request to filter pushed events by device
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscribeRequest {
  /// Device ids to receive events for; an empty list subscribes to all
  #[serde(default)]
  pub device_ids: Vec<i64>,
}

/// Response message from server to client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ServerReply {
  /// Pong response
  #[serde(rename = "pong")]
  Pong,

  /// Subscription acknowledged, echoing the applied filter
  #[serde(rename = "subscribed")]
  Subscribed { device_ids: Vec<i64> },

  /// Error response
  #[serde(rename = "error")]
  Error { message: String },
}

impl ServerReply {
  /// Create an error response
  pub fn error<S: Into<String>>(message: S) -> Self {
    Self::Error {
      message: message.into(),
    }
  }
}

//! Loomq server implementation
//!
//! This module contains the HTTP and WebSocket surface built on Axum. REST
//! routes delegate to the coordinator; the `/ws` endpoint fans broadcast
//! events out to connected panels, optionally filtered per device.

use crate::error::{Error, Result};
use crate::handler;
use crate::message::{ClientMessage, ServerReply};
use axum::{
  extract::{
    ws::{Message, WebSocket, WebSocketUpgrade},
    State,
  },
  response::IntoResponse,
  routing::{get, post, put},
  Router,
};
use futures_util::{SinkExt, StreamExt};
use loomq::store::MemoryStore;
#[cfg(feature = "postgres")]
use loomq::store::PostgresStore;
use loomq::{Coordinator, EngineConfig};
use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, RwLock};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Per-connection event filter; `None` means all devices
type DeviceFilter = Arc<RwLock<Option<HashSet<i64>>>>;

/// Shared state for the server
pub struct AppState {
  /// The coordination engine
  pub coordinator: Arc<Coordinator>,
}

/// Loomq Server
///
/// A standalone server exposing the coordination engine over HTTP and
/// WebSocket. Supports two stores:
/// - Memory (default, no external dependencies)
/// - PostgresSQL (requires `postgres` feature)
///
/// Device agents report heartbeats over REST; wall panels and dashboards
/// read queues over REST and follow live changes over the `/ws` endpoint.
pub struct LoomqServer {
  /// Server address
  addr: SocketAddr,
  /// The coordination engine
  coordinator: Arc<Coordinator>,
}

impl LoomqServer {
  /// Create a new LoomqServer around an existing coordinator
  ///
  /// Useful when the embedding process wants to share the engine with other
  /// in-process consumers.
  pub fn with_coordinator<A: Into<SocketAddr>>(addr: A, coordinator: Arc<Coordinator>) -> Self {
    Self {
      addr: addr.into(),
      coordinator,
    }
  }

  /// Create a new LoomqServer with the in-memory store
  pub fn with_memory<A: Into<SocketAddr>>(addr: A, config: EngineConfig) -> Result<Self> {
    let coordinator = Coordinator::new(Arc::new(MemoryStore::new()), config)?;
    Ok(Self::with_coordinator(addr, Arc::new(coordinator)))
  }

  /// Create a new LoomqServer with the PostgresSQL store
  #[cfg(feature = "postgres")]
  pub async fn with_postgres<A: Into<SocketAddr>>(
    addr: A,
    database_url: &str,
    config: EngineConfig,
  ) -> Result<Self> {
    let store = Arc::new(PostgresStore::new(database_url).await?);
    let coordinator = Coordinator::new(store, config)?;
    Ok(Self::with_coordinator(addr, Arc::new(coordinator)))
  }

  /// Get the coordinator instance
  pub fn coordinator(&self) -> &Arc<Coordinator> {
    &self.coordinator
  }

  /// Build the REST and WebSocket router
  ///
  /// Heartbeats address the device by code; the `{id}` segment name is
  /// shared with the other device routes because the router requires one
  /// name per position.
  fn router(state: Arc<AppState>) -> Router {
    Router::new()
      .route("/health", get(health_handler))
      .route("/ws", get(websocket_handler))
      .route(
        "/devices",
        get(handler::list_devices).post(handler::register_device),
      )
      .route("/devices/online", get(handler::online_devices))
      .route(
        "/devices/{id}",
        get(handler::get_device)
          .put(handler::update_device)
          .delete(handler::delete_device),
      )
      .route(
        "/devices/{id}/manual-status",
        post(handler::set_manual_status),
      )
      .route("/devices/{id}/status", post(handler::heartbeat))
      .route("/queue", post(handler::join_queue))
      .route("/queue/count/{id}", get(handler::queue_count))
      .route(
        "/queue/{id}",
        get(handler::get_queue).delete(handler::leave_queue),
      )
      .route("/queue/{id}/position", put(handler::reposition_entry))
      .route("/queue/{id}/complete", post(handler::complete_queue))
      .route("/queue/{id}/timeout/extend", post(handler::extend_timeout))
      .layer(CorsLayer::permissive())
      .layer(TraceLayer::new_for_http())
      .with_state(state)
  }

  /// Run the server
  ///
  /// Starts the background components, serves until ctrl-c and shuts the
  /// engine down before returning.
  pub async fn run(self) -> Result<()> {
    self.coordinator.start().await;

    let state = Arc::new(AppState {
      coordinator: self.coordinator.clone(),
    });
    let app = Self::router(state);

    let listener = tokio::net::TcpListener::bind(self.addr)
      .await
      .map_err(Error::Io)?;

    info!("Loomq server listening on {}", self.addr);

    let result = axum::serve(listener, app)
      .with_graceful_shutdown(async {
        let _ = tokio::signal::ctrl_c().await;
        info!("Received shutdown signal, stopping server...");
      })
      .await
      .map_err(Error::Io);

    self.coordinator.shutdown().await;

    result
  }
}

/// Health check handler
async fn health_handler() -> impl IntoResponse {
  "OK"
}

/// WebSocket upgrade handler
async fn websocket_handler(
  ws: WebSocketUpgrade,
  State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
  ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle a WebSocket connection
///
/// Every broadcast event is pushed as its own JSON frame. A lagging client
/// loses the events it missed and is expected to refetch.
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
  let conn_id = Uuid::new_v4();
  info!("WebSocket connection {conn_id} established");

  let (mut sender, mut receiver) = socket.split();
  let mut event_rx = state.coordinator.subscribe();
  let filter: DeviceFilter = Arc::new(RwLock::new(None));

  // Use a channel to send outgoing replies alongside pushed events
  let (out_tx, mut out_rx) = mpsc::channel::<String>(256);

  let send_filter = filter.clone();
  let send_task = tokio::spawn(async move {
    loop {
      tokio::select! {
        Some(json) = out_rx.recv() => {
          if sender.send(Message::Text(json.into())).await.is_err() {
            break;
          }
        }
        event = event_rx.recv() => match event {
          Ok(event) => {
            let wanted = match send_filter.read().await.as_ref() {
              Some(ids) => ids.contains(&event.device_id()),
              None => true,
            };
            if !wanted {
              continue;
            }
            match serde_json::to_string(&event) {
              Ok(json) => {
                if sender.send(Message::Text(json.into())).await.is_err() {
                  break;
                }
              }
              Err(e) => warn!("Failed to serialize event: {e}"),
            }
          }
          Err(broadcast::error::RecvError::Lagged(missed)) => {
            warn!("WebSocket connection {conn_id} lagged, {missed} events dropped");
          }
          Err(broadcast::error::RecvError::Closed) => break,
        },
        else => break,
      }
    }
  });

  // Handle incoming messages
  while let Some(msg) = receiver.next().await {
    let response = match msg {
      Ok(Message::Text(text)) => handle_client_text(text.as_str(), &filter).await,
      Ok(Message::Binary(_)) | Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => None,
      Ok(Message::Close(_)) => break,
      Err(e) => {
        error!("WebSocket error on connection {conn_id}: {e}");
        break;
      }
    };

    if let Some(response) = response {
      if out_tx.send(response).await.is_err() {
        break;
      }
    }
  }

  // Cleanup
  drop(out_tx);
  send_task.abort();

  info!("WebSocket connection {conn_id} closed");
}

/// Handle one text frame from the client
///
/// Plain-text "ping" is kept for clients that predate the typed protocol.
async fn handle_client_text(text: &str, filter: &DeviceFilter) -> Option<String> {
  if text.trim() == "ping" {
    return Some("pong".to_string());
  }

  let reply = match serde_json::from_str::<ClientMessage>(text) {
    Ok(ClientMessage::Ping) => ServerReply::Pong,
    Ok(ClientMessage::Subscribe(req)) => {
      let device_ids = req.device_ids;
      let mut filter = filter.write().await;
      *filter = if device_ids.is_empty() {
        None
      } else {
        Some(device_ids.iter().copied().collect())
      };
      ServerReply::Subscribed { device_ids }
    }
    Err(e) => {
      warn!("Invalid message: {e}");
      ServerReply::error(format!("Invalid message: {e}"))
    }
  };
  serde_json::to_string(&reply).ok()
}

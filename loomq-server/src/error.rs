//! Error types for loomq-server

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use loomq::error::Error as EngineError;
use thiserror::Error;

/// Result type for loomq-server
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for loomq-server
#[derive(Error, Debug)]
pub enum Error {
  /// Coordination engine error
  #[error(transparent)]
  Engine(#[from] EngineError),

  /// Serialization error
  #[error("Serialization error: {0}")]
  Serialization(#[from] serde_json::Error),

  /// IO error
  #[error("IO error: {0}")]
  Io(#[from] std::io::Error),

  /// Invalid message
  #[error("Invalid message: {0}")]
  InvalidMessage(String),

  /// Configuration error
  #[error("Configuration error: {0}")]
  Config(String),
}

impl Error {
  /// Create an invalid message error
  pub fn invalid_message<S: Into<String>>(msg: S) -> Self {
    Self::InvalidMessage(msg.into())
  }

  /// Create a configuration error
  pub fn config<S: Into<String>>(msg: S) -> Self {
    Self::Config(msg.into())
  }

  /// HTTP status code this error maps to
  pub fn status_code(&self) -> StatusCode {
    match self {
      Error::Engine(e) => match e {
        EngineError::DeviceNotFound { .. }
        | EngineError::EntryNotFound { .. }
        | EngineError::NoActiveDeadline { .. } => StatusCode::NOT_FOUND,
        EngineError::DeviceExists { .. }
        | EngineError::VersionConflict { .. }
        | EngineError::ExtendLimitExceeded { .. } => StatusCode::CONFLICT,
        EngineError::InvalidCopies { .. }
        | EngineError::InvalidRange { .. }
        | EngineError::Config { .. } => StatusCode::BAD_REQUEST,
        EngineError::LockTimeout { .. } => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
      },
      Error::InvalidMessage(_) | Error::Config(_) => StatusCode::BAD_REQUEST,
      Error::Serialization(_) | Error::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
  }
}

impl IntoResponse for Error {
  fn into_response(self) -> Response {
    let status = self.status_code();
    let body = Json(serde_json::json!({ "error": self.to_string() }));
    (status, body).into_response()
  }
}

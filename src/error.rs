// src/error.rs

use thiserror::Error;

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum InboxError {
  // --- Flow Control ---
  #[error("Mailbox capacity exceeded (capacity {capacity})")]
  CapacityExceeded { capacity: usize },

  // --- Start-up ---
  #[error("Remote inboxes are not supported when there is no cluster")]
  MissingCluster,
  #[error("Invalid argument provided: {0}")]
  InvalidArgument(String),

  // --- Per-message Failures ---
  #[error("Malformed message: {0}")]
  MalformedMessage(String),
  #[error("Message handler failed: {0}")]
  Handler(String),

  // --- Collaborators ---
  #[error("Cluster operation failed: {0}")]
  Cluster(String),
  #[error("Serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

impl InboxError {
  /// Convenience for handler implementations reporting a failure.
  pub fn handler(reason: impl Into<String>) -> Self {
    InboxError::Handler(reason.into())
  }

  /// Whether this error was raised before any dispatch was attempted.
  pub fn is_malformed(&self) -> bool {
    matches!(self, InboxError::MalformedMessage(_) | InboxError::Serialization(_))
  }
}

// src/cluster/mod.rs

//! The narrow contract a remote inbox needs from the cluster store, plus an
//! in-process implementation.

pub mod keys;
pub mod memory;

pub use memory::MemoryCluster;

use crate::error::InboxError;
use async_trait::async_trait;
use std::fmt;

/// Stream of payloads published on one channel key. It ends when the
/// channel is unsubscribed.
pub type Notifications = async_channel::Receiver<String>;

/// Durable queues, key/value metadata and pub/sub channels shared by every
/// node of a cluster.
///
/// Queues are FIFO per key. `get_next_message` only peeks; the head item is
/// removed by an explicit `dequeue`.
#[async_trait]
pub trait Cluster: Send + Sync + fmt::Debug {
  /// Snapshot count of durable items at `key`.
  async fn queue_length(&self, key: &str) -> Result<usize, InboxError>;

  /// The raw head item at `key`, without removing it.
  async fn get_next_message(&self, key: &str) -> Result<Option<String>, InboxError>;

  /// Appends `payload` at `key`, returning the new length.
  async fn enqueue(&self, key: &str, payload: String) -> Result<usize, InboxError>;

  /// Removes the head item at `key`.
  async fn dequeue(&self, key: &str) -> Result<(), InboxError>;

  async fn subscribe_to_channel(&self, key: &str) -> Result<Notifications, InboxError>;

  async fn unsubscribe_channel(&self, key: &str) -> Result<(), InboxError>;

  /// Publishes `payload`, returning how many subscribers received it.
  async fn publish_to_channel(&self, key: &str, payload: String) -> Result<usize, InboxError>;

  async fn set_value(&self, key: &str, value: String) -> Result<(), InboxError>;

  /// Number of fields in the hash stored at `key`.
  async fn get_hash_fields(&self, key: &str) -> Result<usize, InboxError>;
}

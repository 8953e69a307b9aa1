// src/cluster/memory.rs

use crate::cluster::{Cluster, Notifications};
use crate::error::InboxError;

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

#[derive(Debug, Default)]
struct StoreState {
  queues: HashMap<String, VecDeque<String>>,
  values: HashMap<String, String>,
  hashes: HashMap<String, HashMap<String, String>>,
  channels: HashMap<String, Vec<async_channel::Sender<String>>>,
}

/// A `Cluster` living entirely in this process. Every clone of an
/// `Arc<MemoryCluster>` sees the same store, which is enough for tests and
/// single-node deployments.
#[derive(Debug, Default)]
pub struct MemoryCluster {
  state: Mutex<StoreState>,
  dequeue_calls: AtomicUsize,
}

impl MemoryCluster {
  pub fn new() -> Self {
    Self::default()
  }

  /// Total `dequeue` calls served so far.
  pub fn dequeue_calls(&self) -> usize {
    self.dequeue_calls.load(Ordering::Acquire)
  }

  pub fn get_value(&self, key: &str) -> Option<String> {
    self.state.lock().values.get(key).cloned()
  }

  pub fn set_hash_field(&self, key: &str, field: &str, value: String) {
    self
      .state
      .lock()
      .hashes
      .entry(key.to_string())
      .or_default()
      .insert(field.to_string(), value);
  }

  /// Live subscriptions on `key`.
  pub fn subscriber_count(&self, key: &str) -> usize {
    self
      .state
      .lock()
      .channels
      .get(key)
      .map(|subs| subs.iter().filter(|tx| !tx.is_closed()).count())
      .unwrap_or(0)
  }
}

#[async_trait]
impl Cluster for MemoryCluster {
  async fn queue_length(&self, key: &str) -> Result<usize, InboxError> {
    Ok(self.state.lock().queues.get(key).map(VecDeque::len).unwrap_or(0))
  }

  async fn get_next_message(&self, key: &str) -> Result<Option<String>, InboxError> {
    Ok(self.state.lock().queues.get(key).and_then(|q| q.front().cloned()))
  }

  async fn enqueue(&self, key: &str, payload: String) -> Result<usize, InboxError> {
    let mut state = self.state.lock();
    let queue = state.queues.entry(key.to_string()).or_default();
    queue.push_back(payload);
    Ok(queue.len())
  }

  async fn dequeue(&self, key: &str) -> Result<(), InboxError> {
    self.dequeue_calls.fetch_add(1, Ordering::AcqRel);
    let mut state = self.state.lock();
    if let Some(queue) = state.queues.get_mut(key) {
      queue.pop_front();
      if queue.is_empty() {
        state.queues.remove(key);
      }
    }
    Ok(())
  }

  async fn subscribe_to_channel(&self, key: &str) -> Result<Notifications, InboxError> {
    let (tx, rx) = async_channel::unbounded();
    self.state.lock().channels.entry(key.to_string()).or_default().push(tx);
    tracing::trace!(key, "Channel subscribed");
    Ok(rx)
  }

  async fn unsubscribe_channel(&self, key: &str) -> Result<(), InboxError> {
    if let Some(subs) = self.state.lock().channels.remove(key) {
      subs.iter().for_each(|tx| {
        tx.close();
      });
      tracing::trace!(key, subscribers = subs.len(), "Channel unsubscribed");
    }
    Ok(())
  }

  async fn publish_to_channel(&self, key: &str, payload: String) -> Result<usize, InboxError> {
    let mut state = self.state.lock();
    let Some(subs) = state.channels.get_mut(key) else {
      return Ok(0);
    };
    subs.retain(|tx| !tx.is_closed());
    let delivered = subs.iter().filter(|tx| tx.try_send(payload.clone()).is_ok()).count();
    Ok(delivered)
  }

  async fn set_value(&self, key: &str, value: String) -> Result<(), InboxError> {
    self.state.lock().values.insert(key.to_string(), value);
    Ok(())
  }

  async fn get_hash_fields(&self, key: &str) -> Result<usize, InboxError> {
    Ok(self.state.lock().hashes.get(key).map(HashMap::len).unwrap_or(0))
  }
}

// src/settings.rs

use std::collections::HashMap;

use crate::message::ProcessId;

/// Default hard capacity (message count ceiling) of a mailbox.
pub const DEFAULT_MAILBOX_SIZE: usize = 100_000;

/// Physical slot count a ring buffer starts with before it doubles.
pub const DEFAULT_INITIAL_BUFFER_SIZE: usize = 16;

/// System-wide inbox configuration.
#[derive(Debug, Clone)]
pub struct InboxSettings {
  /// Capacity applied to every mailbox without an explicit override.
  pub default_mailbox_size: usize,
  /// Per-process capacity overrides.
  pub process_mailbox_sizes: HashMap<ProcessId, usize>,
  /// Physical size a fresh ring buffer is allocated with.
  pub initial_buffer_size: usize,
}

impl Default for InboxSettings {
  fn default() -> Self {
    Self {
      default_mailbox_size: DEFAULT_MAILBOX_SIZE,
      process_mailbox_sizes: HashMap::new(),
      initial_buffer_size: DEFAULT_INITIAL_BUFFER_SIZE,
    }
  }
}

impl InboxSettings {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_default_mailbox_size(mut self, size: usize) -> Self {
    self.default_mailbox_size = size.max(1);
    self
  }

  pub fn with_process_mailbox_size(mut self, pid: ProcessId, size: usize) -> Self {
    self.process_mailbox_sizes.insert(pid, size.max(1));
    self
  }

  pub fn with_initial_buffer_size(mut self, size: usize) -> Self {
    self.initial_buffer_size = size.max(1);
    self
  }

  /// Resolves the effective capacity for a process.
  pub fn mailbox_size_for(&self, pid: &ProcessId) -> usize {
    self
      .process_mailbox_sizes
      .get(pid)
      .copied()
      .unwrap_or(self.default_mailbox_size)
  }
}

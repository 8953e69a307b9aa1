// src/message/dead_letter.rs

use crate::error::InboxError;
use crate::message::ProcessId;

use serde::{Deserialize, Serialize};

/// Default capacity of the channel created by `dead_letters()`.
pub const DEFAULT_DEAD_LETTER_CAPACITY: usize = 1024;

/// A message that could not be delivered or whose handler failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeadLetter {
  pub sender: Option<ProcessId>,
  pub recipient: ProcessId,
  pub reason: String,
  /// Rendered cause, when there was one.
  pub error: Option<String>,
  /// Rendered form of the original message, when it could be captured.
  pub message: Option<String>,
}

impl DeadLetter {
  pub fn new(sender: Option<ProcessId>, recipient: ProcessId, reason: impl Into<String>) -> Self {
    Self {
      sender,
      recipient,
      reason: reason.into(),
      error: None,
      message: None,
    }
  }

  pub fn with_error(mut self, error: &InboxError) -> Self {
    self.error = Some(error.to_string());
    self
  }

  pub fn with_message(mut self, message: impl Into<String>) -> Self {
    self.message = Some(message.into());
    self
  }
}

/// Sending end of the dead-letter sink.
pub type DeadLetterSender = async_channel::Sender<DeadLetter>;
/// Receiving end of the dead-letter sink.
pub type DeadLetterReceiver = async_channel::Receiver<DeadLetter>;

/// Creates a bounded dead-letter channel pair.
pub fn dead_letters(capacity: usize) -> (DeadLetterSender, DeadLetterReceiver) {
  async_channel::bounded(capacity.max(1))
}

/// Hands `letter` to the sink without waiting. A full or closed sink is
/// logged; dead-lettering never fails the caller.
pub(crate) fn forward(sink: &DeadLetterSender, letter: DeadLetter) {
  tracing::warn!(
    recipient = %letter.recipient,
    reason = %letter.reason,
    error = ?letter.error,
    "Dead letter"
  );
  if let Err(e) = sink.try_send(letter) {
    tracing::error!(error = %e, "Dead letter sink unavailable; letter dropped");
  }
}

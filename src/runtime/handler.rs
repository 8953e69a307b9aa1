// src/runtime/handler.rs

use crate::error::InboxError;
use crate::runtime::InboxDirective;
use async_trait::async_trait;

/// Processes one message at a time on behalf of a mailbox consumer loop.
///
/// An `Err` is logged by the loop and treated like `InboxDirective::DEFAULT`,
/// so the failing message is discarded rather than retried forever.
#[async_trait]
pub trait InboxHandler<T: Send + Sync>: Send {
  async fn handle(&mut self, msg: &T) -> Result<InboxDirective, InboxError>;
}

/// Adapts a synchronous closure into an `InboxHandler`.
pub struct FnHandler<F> {
  f: F,
}

/// Wraps `f` so it can drive a mailbox.
pub fn handler_fn<F>(f: F) -> FnHandler<F> {
  FnHandler { f }
}

#[async_trait]
impl<T, F> InboxHandler<T> for FnHandler<F>
where
  T: Send + Sync,
  F: FnMut(&T) -> Result<InboxDirective, InboxError> + Send,
{
  async fn handle(&mut self, msg: &T) -> Result<InboxDirective, InboxError> {
    (self.f)(msg)
  }
}

// src/inbox/mod.rs

//! Actor inboxes. `LocalInbox` is backed by in-process mailboxes,
//! `RemoteInbox` by the cluster store. Both deliver through the same
//! `Actor` trait and obey the same directive rules.

pub mod dispatch;
pub mod local;
pub mod remote;

pub use dispatch::RemoteDispatcher;
pub use local::LocalInbox;
pub use remote::RemoteInbox;

use crate::context::InboxContext;
use crate::error::InboxError;
use crate::message::{DeadLetter, InboundMessage, ProcessId, SystemMessage, UserControlMessage, UserMessage};
use crate::runtime::InboxDirective;

use std::fmt::Debug;
use std::future::Future;
use std::panic::AssertUnwindSafe;

use async_trait::async_trait;
use futures::FutureExt;

/// The message handlers an inbox dispatches to.
#[async_trait]
pub trait Actor<T: Send + Sync + 'static>: Send + Sync + 'static {
  async fn user_message(&self, msg: &UserMessage<T>) -> Result<InboxDirective, InboxError>;

  async fn user_control_message(&self, msg: &UserControlMessage) -> Result<InboxDirective, InboxError> {
    tracing::trace!(msg = ?msg, "Unhandled user-control message");
    Ok(InboxDirective::DEFAULT)
  }

  /// Called for system messages other than `Pause`/`Unpause`, which the
  /// inbox applies itself.
  async fn system_message(&self, msg: &SystemMessage) -> Result<(), InboxError> {
    tracing::trace!(msg = ?msg, "Unhandled system message");
    Ok(())
  }
}

/// Operations shared by local and remote inboxes.
#[async_trait]
pub trait Inbox: Send + Sync {
  fn pid(&self) -> &ProcessId;

  fn is_paused(&self) -> bool;

  /// Stops user-message delivery after the message in flight.
  async fn pause(&self) -> Result<(), InboxError>;

  /// Resumes user-message delivery.
  async fn unpause(&self) -> Result<(), InboxError>;

  /// Stops all delivery. Idempotent.
  async fn shutdown(&self);
}

/// Awaits an actor callback, turning a panic into a `Handler` error.
pub(crate) async fn guarded<F, R>(fut: F) -> Result<R, InboxError>
where
  F: Future<Output = Result<R, InboxError>>,
{
  match AssertUnwindSafe(fut).catch_unwind().await {
    Ok(result) => result,
    Err(_) => Err(InboxError::handler("actor panicked while handling a message")),
  }
}

/// Dead-letters a message whose dispatch failed and answers the requester
/// when the message expected a reply.
pub(crate) async fn report_failure<T: Debug>(
  ctx: &InboxContext,
  recipient: &ProcessId,
  sender: Option<ProcessId>,
  msg: &InboundMessage<T>,
  error: &InboxError,
  reason: &str,
) {
  tracing::warn!(pid = %recipient, kind = msg.variant_name(), error = %error, "{}", reason);
  ctx
    .reply_error_if_asked(recipient, msg.request(), msg.session_id(), error)
    .await;
  ctx.tell_dead_letters(
    DeadLetter::new(sender, recipient.clone(), reason)
      .with_error(error)
      .with_message(format!("{:?}", msg)),
  );
}

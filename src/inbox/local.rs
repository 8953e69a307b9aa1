// src/inbox/local.rs

use crate::context::InboxContext;
use crate::error::InboxError;
use crate::inbox::{guarded, report_failure, Actor, Inbox};
use crate::message::{InboundMessage, ProcessId, SystemMessage, UserMessage};
use crate::runtime::{InboxDirective, InboxHandler, LocalMailbox};

use std::fmt::Debug;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::task::JoinHandle;

/// An inbox for an actor living in this process: one mailbox for user and
/// user-control messages, one for system messages, each with its own
/// consumer task. Dropping the inbox cancels both mailboxes.
pub struct LocalInbox<A, T: Send + Sync + 'static> {
  pid: ProcessId,
  user: LocalMailbox<InboundMessage<T>>,
  system: LocalMailbox<SystemMessage>,
  tasks: Mutex<Vec<JoinHandle<()>>>,
  _actor: PhantomData<fn() -> A>,
}

struct UserDispatch<A, T> {
  pid: ProcessId,
  actor: Arc<A>,
  ctx: InboxContext,
  _msg: PhantomData<fn() -> T>,
}

struct SystemDispatch<A, T: Send + Sync + 'static> {
  pid: ProcessId,
  actor: Arc<A>,
  ctx: InboxContext,
  user: LocalMailbox<InboundMessage<T>>,
}

#[async_trait]
impl<A, T> InboxHandler<InboundMessage<T>> for UserDispatch<A, T>
where
  A: Actor<T>,
  T: Debug + Send + Sync + 'static,
{
  async fn handle(&mut self, msg: &InboundMessage<T>) -> Result<InboxDirective, InboxError> {
    let result = match msg {
      InboundMessage::User(user) => guarded(self.actor.user_message(user)).await,
      InboundMessage::UserControl(ctrl) => guarded(self.actor.user_control_message(ctrl)).await,
      InboundMessage::System(_) => Err(InboxError::InvalidArgument("system message in user mailbox".into())),
    };
    match result {
      Ok(directive) => Ok(directive),
      Err(e) => {
        let sender = match msg {
          InboundMessage::User(user) => user.sender.clone(),
          _ => None,
        };
        report_failure(&self.ctx, &self.pid, sender, msg, &e, "Local user inbox").await;
        Ok(InboxDirective::DEFAULT)
      }
    }
  }
}

#[async_trait]
impl<A, T> InboxHandler<SystemMessage> for SystemDispatch<A, T>
where
  A: Actor<T>,
  T: Debug + Send + Sync + 'static,
{
  async fn handle(&mut self, msg: &SystemMessage) -> Result<InboxDirective, InboxError> {
    let result = match msg {
      SystemMessage::Pause => {
        self.user.pause();
        Ok(())
      }
      SystemMessage::Unpause => {
        self.user.unpause();
        Ok(())
      }
      other => guarded(self.actor.system_message(other)).await,
    };
    if let Err(e) = result {
      let wrapped: InboundMessage<T> = InboundMessage::System(msg.clone());
      report_failure(&self.ctx, &self.pid, None, &wrapped, &e, "Local system inbox").await;
    }
    if matches!(msg, SystemMessage::ShutdownProcess) {
      self.user.cancel();
      return Ok(InboxDirective::SHUTDOWN);
    }
    Ok(InboxDirective::DEFAULT)
  }
}

impl<A, T> LocalInbox<A, T>
where
  A: Actor<T>,
  T: Debug + Send + Sync + 'static,
{
  /// Creates both mailboxes and starts their consumers.
  ///
  /// `max_mailbox_size` overrides the capacity configured in the settings.
  pub fn startup(pid: ProcessId, actor: Arc<A>, ctx: InboxContext, max_mailbox_size: Option<usize>) -> Self {
    let settings = ctx.settings();
    let capacity = max_mailbox_size.unwrap_or_else(|| settings.mailbox_size_for(&pid));
    let initial = settings.initial_buffer_size;

    let user = LocalMailbox::with_initial_size(capacity, initial);
    let system = LocalMailbox::with_initial_size(capacity, initial);

    let user_task = user.spawn_receiver(UserDispatch {
      pid: pid.clone(),
      actor: actor.clone(),
      ctx: ctx.clone(),
      _msg: PhantomData,
    });
    let system_task = system.spawn_receiver(SystemDispatch {
      pid: pid.clone(),
      actor,
      ctx,
      user: user.clone(),
    });

    tracing::debug!(pid = %pid, capacity, "Local inbox started");
    Self {
      pid,
      user,
      system,
      tasks: Mutex::new(vec![user_task, system_task]),
      _actor: PhantomData,
    }
  }

  /// Posts any message to the matching mailbox.
  pub fn tell(&self, msg: InboundMessage<T>) -> Result<(), InboxError> {
    match msg {
      InboundMessage::System(sys) => self.system.post(sys),
      other => self.user.post(other),
    }
  }

  pub fn tell_user(&self, msg: UserMessage<T>) -> Result<(), InboxError> {
    self.user.post(InboundMessage::User(msg))
  }

  pub fn tell_system(&self, msg: SystemMessage) -> Result<(), InboxError> {
    self.system.post(msg)
  }

  /// User messages waiting for delivery.
  pub fn count(&self) -> usize {
    self.user.count()
  }

  /// Waits until both consumer tasks have exited.
  pub async fn join(&self) {
    let tasks: Vec<_> = std::mem::take(&mut *self.tasks.lock());
    for task in tasks {
      if let Err(e) = task.await {
        tracing::error!(pid = %self.pid, error = %e, "Inbox consumer task failed");
      }
    }
  }
}

#[async_trait]
impl<A, T> Inbox for LocalInbox<A, T>
where
  A: Actor<T>,
  T: Debug + Send + Sync + 'static,
{
  fn pid(&self) -> &ProcessId {
    &self.pid
  }

  fn is_paused(&self) -> bool {
    self.user.is_paused()
  }

  async fn pause(&self) -> Result<(), InboxError> {
    self.user.pause();
    Ok(())
  }

  async fn unpause(&self) -> Result<(), InboxError> {
    self.user.unpause();
    Ok(())
  }

  async fn shutdown(&self) {
    self.user.cancel();
    self.system.cancel();
    tracing::debug!(pid = %self.pid, "Local inbox shut down");
  }
}

impl<A, T: Send + Sync + 'static> Drop for LocalInbox<A, T> {
  fn drop(&mut self) {
    self.user.cancel();
    self.system.cancel();
    for task in self.tasks.lock().drain(..) {
      task.abort();
    }
  }
}

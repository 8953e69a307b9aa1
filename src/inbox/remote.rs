// src/inbox/remote.rs

//! An inbox fronted by the cluster store.
//!
//! User messages are persisted in a durable queue that any node may append
//! to. A notification on the user channel means "work may be waiting"; the
//! notifications are funnelled through a local mailbox so at most one drain
//! of the durable queue runs at a time. System messages carry their payload
//! inline on the system channel and are never persisted.

use crate::cluster::{keys, Cluster, Notifications};
use crate::context::InboxContext;
use crate::error::InboxError;
use crate::inbox::{guarded, report_failure, Actor, Inbox};
use crate::message::{DeadLetter, InboundMessage, ProcessId, ProcessMetaData, RemoteMessageDto, SystemMessage};
use crate::runtime::directive::DirectiveOutcome;
use crate::runtime::{InboxDirective, InboxHandler, LocalMailbox};

use std::fmt::Debug;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Bounds a message type must meet to travel through the cluster store.
pub trait RemoteMessage: Serialize + DeserializeOwned + Debug + Send + Sync + 'static {}

impl<T> RemoteMessage for T where T: Serialize + DeserializeOwned + Debug + Send + Sync + 'static {}

struct RemoteInner<A, T> {
  pid: ProcessId,
  actor: Arc<A>,
  ctx: InboxContext,
  /// Released on shutdown.
  cluster: RwLock<Option<Arc<dyn Cluster>>>,
  /// Local wake queue fed by user-channel notifications.
  user_notify: LocalMailbox<String>,
  paused: AtomicBool,
  shut_down: AtomicBool,
  /// Serialises pause/unpause and system-message dispatch.
  sync: tokio::sync::Mutex<()>,
  /// Approximate: seeded from a store snapshot and bumped by notifications,
  /// so it races with remote writers.
  scheduled_items: AtomicUsize,
  max_mailbox_size: usize,
  tasks: Mutex<Vec<JoinHandle<()>>>,
  _msg: PhantomData<fn() -> T>,
}

/// Coordinates a cluster-backed inbox for one actor.
///
/// Call `shutdown` to release the channels. Dropping without it stops the
/// local tasks but leaves the store subscriptions to be pruned by the store.
pub struct RemoteInbox<A: Actor<T>, T: RemoteMessage> {
  inner: Arc<RemoteInner<A, T>>,
}

struct CheckRemoteInbox<A, T> {
  inner: Arc<RemoteInner<A, T>>,
}

#[async_trait]
impl<A, T> InboxHandler<String> for CheckRemoteInbox<A, T>
where
  A: Actor<T>,
  T: RemoteMessage,
{
  async fn handle(&mut self, _notification: &String) -> Result<InboxDirective, InboxError> {
    let key = keys::user_inbox_key(&self.inner.pid);
    self.inner.check_remote_inbox(&key, true).await;
    Ok(InboxDirective::DEFAULT)
  }
}

impl<A, T> RemoteInbox<A, T>
where
  A: Actor<T>,
  T: RemoteMessage,
{
  /// Starts the inbox: subscribes the system and scheduled channels,
  /// publishes the process metadata, then subscribes the user channel and
  /// triggers an initial drain.
  ///
  /// Fails with `MissingCluster` when the context carries no cluster. Any
  /// later failure shuts the partially started inbox down before returning.
  pub async fn startup(
    pid: ProcessId,
    actor: Arc<A>,
    ctx: InboxContext,
    max_mailbox_size: Option<usize>,
  ) -> Result<Self, InboxError> {
    let cluster = ctx.cluster().ok_or(InboxError::MissingCluster)?;
    let settings = ctx.settings();
    let max_mailbox_size = max_mailbox_size.unwrap_or_else(|| settings.mailbox_size_for(&pid));
    let user_notify = LocalMailbox::with_initial_size(max_mailbox_size, settings.initial_buffer_size);

    let inner = Arc::new(RemoteInner {
      pid: pid.clone(),
      actor,
      ctx,
      cluster: RwLock::new(Some(cluster.clone())),
      user_notify,
      paused: AtomicBool::new(false),
      shut_down: AtomicBool::new(false),
      sync: tokio::sync::Mutex::new(()),
      scheduled_items: AtomicUsize::new(0),
      max_mailbox_size,
      tasks: Mutex::new(Vec::new()),
      _msg: PhantomData,
    });

    let drain_task = inner.user_notify.spawn_receiver(CheckRemoteInbox { inner: inner.clone() });
    inner.tasks.lock().push(drain_task);
    let inbox = Self { inner };

    if let Err(e) = inbox.inner.start(&cluster).await {
      tracing::error!(pid = %pid, error = %e, "Remote inbox start-up failed");
      inbox.inner.shutdown().await;
      // Dropping the inbox aborts the tasks spawned so far.
      return Err(e);
    }
    if inbox.inner.is_shut_down() {
      // Shut down while starting: drop anything subscribed after the shutdown ran.
      inbox.inner.release_channels(&cluster).await;
    }

    tracing::debug!(pid = %pid, max_mailbox_size, "Remote inbox started");
    Ok(inbox)
  }

  pub fn max_mailbox_size(&self) -> usize {
    self.inner.max_mailbox_size
  }

  /// Durable items currently waiting in the user queue.
  pub async fn queue_length(&self) -> Result<usize, InboxError> {
    let cluster = self.inner.cluster().ok_or(InboxError::MissingCluster)?;
    cluster.queue_length(&keys::user_inbox_key(&self.inner.pid)).await
  }

  /// Best-effort count of scheduled items. Not linearizable with other
  /// writers; use `refresh_scheduled_items` for a fresh reading.
  pub fn scheduled_items_hint(&self) -> usize {
    self.inner.scheduled_items.load(Ordering::Acquire)
  }

  /// Re-reads the scheduled item count from the store.
  pub async fn refresh_scheduled_items(&self) -> Result<usize, InboxError> {
    let cluster = self.inner.cluster().ok_or(InboxError::MissingCluster)?;
    let count = cluster.get_hash_fields(&keys::scheduled_key(&self.inner.pid)).await?;
    self.inner.scheduled_items.store(count, Ordering::Release);
    Ok(count)
  }

  /// Publishes a synthetic notification so the durable queue is re-checked.
  pub async fn check_now(&self) -> Result<(), InboxError> {
    let cluster = self.inner.cluster().ok_or(InboxError::MissingCluster)?;
    self.inner.publish_check(&cluster).await
  }
}

impl<A, T> RemoteInner<A, T>
where
  A: Actor<T>,
  T: RemoteMessage,
{
  fn cluster(&self) -> Option<Arc<dyn Cluster>> {
    self.cluster.read().clone()
  }

  fn is_paused(&self) -> bool {
    self.paused.load(Ordering::Acquire)
  }

  fn is_shut_down(&self) -> bool {
    self.shut_down.load(Ordering::Acquire)
  }

  /// The fallible start-up steps. The user channel comes last because
  /// subscribing it starts delivery; a shutdown triggered by an earlier
  /// system message ends start-up early.
  async fn start(self: &Arc<Self>, cluster: &Arc<dyn Cluster>) -> Result<(), InboxError> {
    self.subscribe_system_channel(cluster).await?;
    if self.is_shut_down() {
      return Ok(());
    }
    self.subscribe_scheduled_channel(cluster).await?;

    let meta = serde_json::to_string(&ProcessMetaData::of::<A, T>())?;
    cluster.set_value(&keys::metadata_key(&self.pid), meta).await?;
    if self.is_shut_down() {
      return Ok(());
    }
    self.subscribe_user_channel(cluster).await
  }

  fn track(&self, task: JoinHandle<()>) {
    let mut tasks = self.tasks.lock();
    tasks.retain(|t| !t.is_finished());
    tasks.push(task);
  }

  /// Replaces any previous subscription on `key` with a fresh one.
  async fn resubscribe(cluster: &Arc<dyn Cluster>, key: &str) -> Result<Notifications, InboxError> {
    if let Err(e) = cluster.unsubscribe_channel(key).await {
      tracing::debug!(key, error = %e, "Unsubscribe before subscribe failed");
    }
    cluster.subscribe_to_channel(key).await
  }

  async fn subscribe_system_channel(self: &Arc<Self>, cluster: &Arc<dyn Cluster>) -> Result<(), InboxError> {
    let rx = Self::resubscribe(cluster, &keys::system_inbox_notify_key(&self.pid)).await?;
    let inner = self.clone();
    self.track(tokio::spawn(async move {
      while let Ok(payload) = rx.recv().await {
        inner.sys_inbox(&payload).await;
      }
      tracing::trace!(pid = %inner.pid, "System channel closed");
    }));
    Ok(())
  }

  async fn subscribe_user_channel(self: &Arc<Self>, cluster: &Arc<dyn Cluster>) -> Result<(), InboxError> {
    let rx = Self::resubscribe(cluster, &keys::user_inbox_notify_key(&self.pid)).await?;
    let inner = self.clone();
    self.track(tokio::spawn(async move {
      while let Ok(notification) = rx.recv().await {
        if let Err(e) = inner.user_notify.post(notification) {
          tracing::warn!(pid = %inner.pid, error = %e, "User notification dropped");
        }
      }
      tracing::trace!(pid = %inner.pid, "User channel closed");
    }));
    // Checked asynchronously so children created during actor setup exist
    // before the first queued message is handled.
    self.publish_check(cluster).await
  }

  async fn subscribe_scheduled_channel(self: &Arc<Self>, cluster: &Arc<dyn Cluster>) -> Result<(), InboxError> {
    let rx = Self::resubscribe(cluster, &keys::scheduled_notify_key(&self.pid)).await?;
    let inner = self.clone();
    self.track(tokio::spawn(async move {
      while rx.recv().await.is_ok() {
        inner.scheduled_items.fetch_add(1, Ordering::AcqRel);
      }
    }));
    let seeded = cluster.get_hash_fields(&keys::scheduled_key(&self.pid)).await?;
    self.scheduled_items.store(seeded, Ordering::Release);
    Ok(())
  }

  async fn publish_check(&self, cluster: &Arc<dyn Cluster>) -> Result<(), InboxError> {
    cluster
      .publish_to_channel(&keys::user_inbox_notify_key(&self.pid), Uuid::new_v4().to_string())
      .await
      .map(|_| ())
  }

  async fn pause(self: &Arc<Self>) -> Result<(), InboxError> {
    let _guard = self.sync.lock().await;
    self.pause_locked().await
  }

  async fn pause_locked(&self) -> Result<(), InboxError> {
    if self.paused.swap(true, Ordering::AcqRel) {
      return Ok(());
    }
    tracing::debug!(pid = %self.pid, "Remote inbox paused");
    match self.cluster() {
      Some(cluster) => cluster.unsubscribe_channel(&keys::user_inbox_notify_key(&self.pid)).await,
      None => Ok(()),
    }
  }

  async fn unpause(self: &Arc<Self>) -> Result<(), InboxError> {
    let _guard = self.sync.lock().await;
    self.unpause_locked().await
  }

  async fn unpause_locked(self: &Arc<Self>) -> Result<(), InboxError> {
    if !self.paused.swap(false, Ordering::AcqRel) {
      return Ok(());
    }
    tracing::debug!(pid = %self.pid, "Remote inbox unpaused");
    match self.cluster() {
      Some(cluster) => self.subscribe_user_channel(&cluster).await,
      None => Ok(()),
    }
  }

  async fn shutdown(&self) {
    if self.shut_down.swap(true, Ordering::AcqRel) {
      return;
    }
    self.user_notify.cancel();

    let cluster = self.cluster.write().take();
    if let Some(cluster) = cluster {
      self.release_channels(&cluster).await;
    }
    tracing::debug!(pid = %self.pid, "Remote inbox shut down");
  }

  /// Unsubscribes every channel this inbox listens on, ignoring failures.
  async fn release_channels(&self, cluster: &Arc<dyn Cluster>) {
    for key in [
      keys::user_inbox_notify_key(&self.pid),
      keys::system_inbox_notify_key(&self.pid),
      keys::scheduled_notify_key(&self.pid),
    ] {
      if let Err(e) = cluster.unsubscribe_channel(&key).await {
        tracing::debug!(key = %key, error = %e, "Unsubscribe during shutdown failed");
      }
    }
  }

  /// Applies a system message. Pause/unpause act on this inbox; the rest go
  /// to the actor. The caller must hold `sync`.
  async fn system_message_locked(self: &Arc<Self>, msg: &SystemMessage) -> Result<(), InboxError> {
    match msg {
      SystemMessage::Pause => self.pause_locked().await,
      SystemMessage::Unpause => self.unpause_locked().await,
      other => guarded(self.actor.system_message(other)).await,
    }
  }

  /// Handles one payload from the system channel.
  async fn sys_inbox(self: &Arc<Self>, payload: &str) {
    let decoded = RemoteMessageDto::parse(payload).and_then(|dto| {
      let msg = dto.decode::<T>()?;
      Ok((dto, msg))
    });
    let (dto, msg) = match decoded {
      Ok(pair) => pair,
      Err(e) => {
        let sender = RemoteMessageDto::parse(payload).ok().and_then(|dto| dto.sender_pid());
        self.ctx.tell_dead_letters(
          DeadLetter::new(sender, self.pid.clone(), "Failed to deserialise message")
            .with_error(&e)
            .with_message(payload),
        );
        return;
      }
    };

    let result = {
      let _guard = self.sync.lock().await;
      match &msg {
        InboundMessage::System(sys) => self.system_message_locked(sys).await,
        _ => Err(InboxError::MalformedMessage(format!(
          "{} message on the system channel",
          msg.variant_name()
        ))),
      }
    };
    if let Err(e) = result {
      report_failure(&self.ctx, &self.pid, dto.sender_pid(), &msg, &e, "Remote message inbox.").await;
    }

    if matches!(msg, InboundMessage::System(SystemMessage::ShutdownProcess)) {
      self.shutdown().await;
    }
  }

  /// Dispatches one durable message to the actor. A system message found
  /// here is applied as if it had arrived on the system channel; the drain
  /// shuts the inbox down once a `ShutdownProcess` has been removed.
  async fn dispatch_user(self: &Arc<Self>, msg: &InboundMessage<T>) -> Result<InboxDirective, InboxError> {
    match msg {
      InboundMessage::User(user) => guarded(self.actor.user_message(user)).await,
      InboundMessage::UserControl(ctrl) => guarded(self.actor.user_control_message(ctrl)).await,
      InboundMessage::System(sys) => {
        tracing::warn!(pid = %self.pid, msg = ?sys, "System message found in the user queue");
        let _guard = self.sync.lock().await;
        self.system_message_locked(sys).await.map(|_| InboxDirective::DEFAULT)
      }
    }
  }

  /// Drains the durable queue at `key`.
  ///
  /// The queue length read on entry bounds the drain. It only shrinks when an
  /// item is actually removed, so retried or paused items do not eat into the
  /// remaining work. An empty queue ends the drain.
  async fn check_remote_inbox(self: &Arc<Self>, key: &str, pausable: bool) {
    let Some(cluster) = self.cluster() else {
      return;
    };
    let mut remaining = match cluster.queue_length(key).await {
      Ok(len) => len,
      Err(e) => {
        tracing::error!(pid = %self.pid, key, error = %e, "Failed to read queue length");
        return;
      }
    };
    tracing::trace!(pid = %self.pid, key, remaining, "Checking remote inbox");

    while remaining > 0 && !(pausable && self.is_paused()) && !self.is_shut_down() {
      let payload = match cluster.get_next_message(key).await {
        Ok(Some(payload)) => payload,
        Ok(None) => break,
        Err(e) => {
          tracing::error!(pid = %self.pid, key, error = %e, "Failed to read next message");
          break;
        }
      };

      let (dto, msg) = match RemoteMessageDto::parse(&payload).and_then(|dto| {
        let msg = dto.decode::<T>()?;
        Ok((dto, msg))
      }) {
        Ok(pair) => pair,
        Err(e) => {
          // Can never succeed: dead-letter it and take it out of the queue.
          let sender = RemoteMessageDto::parse(&payload).ok().and_then(|dto| dto.sender_pid());
          self.ctx.tell_dead_letters(
            DeadLetter::new(sender, self.pid.clone(), "Failed to deserialise message")
              .with_error(&e)
              .with_message(payload),
          );
          if let Err(e) = cluster.dequeue(key).await {
            tracing::error!(pid = %self.pid, key, error = %e, "Failed to dequeue malformed message");
            break;
          }
          remaining -= 1;
          continue;
        }
      };

      let directive = match self.dispatch_user(&msg).await {
        Ok(directive) => directive,
        Err(e) => {
          report_failure(&self.ctx, &self.pid, dto.sender_pid(), &msg, &e, "Remote message inbox.").await;
          InboxDirective::DEFAULT
        }
      };

      if directive.is_pause() {
        if let Err(e) = self.pause().await {
          tracing::warn!(pid = %self.pid, error = %e, "Pause requested by handler failed to unsubscribe");
        }
      }

      match directive.outcome() {
        DirectiveOutcome::Advance => {
          if let Err(e) = cluster.dequeue(key).await {
            tracing::error!(pid = %self.pid, key, error = %e, "Failed to dequeue handled message");
            break;
          }
          remaining -= 1;
          // Removed first so a restarted inbox does not replay it.
          if matches!(msg, InboundMessage::System(SystemMessage::ShutdownProcess)) {
            self.shutdown().await;
            break;
          }
        }
        DirectiveOutcome::Retry => {
          tracing::trace!(pid = %self.pid, key, "Message left at the front of the queue");
        }
        DirectiveOutcome::Shutdown => {
          self.shutdown().await;
          break;
        }
      }
    }
  }
}

#[async_trait]
impl<A, T> Inbox for RemoteInbox<A, T>
where
  A: Actor<T>,
  T: RemoteMessage,
{
  fn pid(&self) -> &ProcessId {
    &self.inner.pid
  }

  fn is_paused(&self) -> bool {
    self.inner.is_paused()
  }

  /// Unsubscribes from user notifications. A drain already running stops
  /// at its next loop check.
  async fn pause(&self) -> Result<(), InboxError> {
    self.inner.pause().await
  }

  /// Re-subscribes and forces an immediate re-check of the durable queue.
  async fn unpause(&self) -> Result<(), InboxError> {
    self.inner.unpause().await
  }

  async fn shutdown(&self) {
    self.inner.shutdown().await;
  }
}

impl<A: Actor<T>, T: RemoteMessage> Drop for RemoteInbox<A, T> {
  fn drop(&mut self) {
    self.inner.user_notify.cancel();
    for task in self.inner.tasks.lock().drain(..) {
      task.abort();
    }
  }
}

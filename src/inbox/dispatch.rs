// src/inbox/dispatch.rs

//! Producer side of remote inboxes.

use crate::cluster::{keys, Cluster, Notifications};
use crate::error::InboxError;
use crate::message::{ErrorReply, InboundMessage, ProcessId, RemoteMessageDto, SystemMessage, UserMessage};
use crate::settings::InboxSettings;

use std::sync::Arc;

use serde::Serialize;

/// Posts messages into remote inboxes through the cluster store.
///
/// User and user-control messages are appended to the durable queue and
/// followed by a notification. System messages only go out on the system
/// channel and are lost if nobody is subscribed.
#[derive(Debug, Clone)]
pub struct RemoteDispatcher {
  cluster: Arc<dyn Cluster>,
  settings: Arc<InboxSettings>,
  sender: Option<ProcessId>,
}

impl RemoteDispatcher {
  pub fn new(cluster: Arc<dyn Cluster>, settings: InboxSettings) -> Self {
    Self {
      cluster,
      settings: Arc::new(settings),
      sender: None,
    }
  }

  /// Stamps outgoing messages with `sender` and makes `ask` possible.
  pub fn with_sender(mut self, sender: ProcessId) -> Self {
    self.sender = Some(sender);
    self
  }

  pub fn sender(&self) -> Option<&ProcessId> {
    self.sender.as_ref()
  }

  /// Sends any message to `to`, picking the path by category.
  pub async fn send<T: Serialize>(&self, to: &ProcessId, msg: &InboundMessage<T>) -> Result<(), InboxError> {
    let dto = RemoteMessageDto::encode(to, msg)?;
    match msg {
      InboundMessage::System(_) => self.publish_system(to, &dto).await,
      _ => self.enqueue_user(to, &dto).await,
    }
  }

  pub async fn tell<T: Serialize>(&self, to: &ProcessId, content: T) -> Result<(), InboxError> {
    let mut msg = UserMessage::tell(content);
    msg.sender = self.sender.clone();
    self.send(to, &InboundMessage::User(msg)).await
  }

  /// Sends a request. Failures handling it come back as an `ErrorReply` on
  /// this dispatcher's reply channel.
  pub async fn ask<T: Serialize>(
    &self,
    to: &ProcessId,
    content: T,
    request_id: u64,
    session_id: Option<String>,
  ) -> Result<(), InboxError> {
    let reply_to = self
      .sender
      .clone()
      .ok_or_else(|| InboxError::InvalidArgument("ask requires a sender to reply to".into()))?;
    let mut msg = UserMessage::ask(content, request_id, reply_to);
    msg.session_id = session_id;
    self.send(to, &InboundMessage::User(msg)).await
  }

  pub async fn tell_system(&self, to: &ProcessId, msg: SystemMessage) -> Result<(), InboxError> {
    self.send::<()>(to, &InboundMessage::System(msg)).await
  }

  /// Subscribes to error replies addressed to this dispatcher's sender.
  pub async fn subscribe_error_replies(&self) -> Result<Notifications, InboxError> {
    let sender = self
      .sender
      .as_ref()
      .ok_or_else(|| InboxError::InvalidArgument("no sender to receive replies for".into()))?;
    self.cluster.subscribe_to_channel(&keys::reply_notify_key(sender)).await
  }

  /// Decodes a payload received from `subscribe_error_replies`.
  pub fn parse_error_reply(payload: &str) -> Result<ErrorReply, InboxError> {
    serde_json::from_str(payload).map_err(|e| InboxError::MalformedMessage(e.to_string()))
  }

  async fn enqueue_user(&self, to: &ProcessId, dto: &RemoteMessageDto) -> Result<(), InboxError> {
    let key = keys::user_inbox_key(to);
    let capacity = self.settings.mailbox_size_for(to);
    if self.cluster.queue_length(&key).await? >= capacity {
      return Err(InboxError::CapacityExceeded { capacity });
    }
    let length = self.cluster.enqueue(&key, dto.to_payload()?).await?;
    let notification = dto.message_id.map(|id| id.to_string()).unwrap_or_default();
    self
      .cluster
      .publish_to_channel(&keys::user_inbox_notify_key(to), notification)
      .await?;
    tracing::trace!(to = %to, length, "User message enqueued");
    Ok(())
  }

  async fn publish_system(&self, to: &ProcessId, dto: &RemoteMessageDto) -> Result<(), InboxError> {
    let delivered = self
      .cluster
      .publish_to_channel(&keys::system_inbox_notify_key(to), dto.to_payload()?)
      .await?;
    if delivered == 0 {
      tracing::debug!(to = %to, "System message published with no subscriber");
    }
    Ok(())
  }
}

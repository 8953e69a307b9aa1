// src/context.rs

use crate::cluster::{keys, Cluster};
use crate::error::InboxError;
use crate::message::dead_letter;
use crate::message::{DeadLetter, DeadLetterSender, ErrorReply, ProcessId, RequestInfo};
use crate::settings::InboxSettings;

use std::fmt;
use std::sync::Arc;

/// Sending end for error replies delivered in-process.
pub type ErrorReplySender = async_channel::Sender<ErrorReply>;
/// Receiving end for error replies delivered in-process.
pub type ErrorReplyReceiver = async_channel::Receiver<ErrorReply>;

/// The runtime collaborators an inbox is started with. Cloning is cheap.
#[derive(Clone)]
pub struct InboxContext {
  settings: Arc<InboxSettings>,
  cluster: Option<Arc<dyn Cluster>>,
  dead_letters: DeadLetterSender,
  replies: Option<ErrorReplySender>,
}

impl InboxContext {
  pub fn new(settings: InboxSettings, dead_letters: DeadLetterSender) -> Self {
    Self {
      settings: Arc::new(settings),
      cluster: None,
      dead_letters,
      replies: None,
    }
  }

  /// Attaches the cluster store remote inboxes require.
  pub fn with_cluster(mut self, cluster: Arc<dyn Cluster>) -> Self {
    self.cluster = Some(cluster);
    self
  }

  /// Routes error replies to an in-process channel instead of the cluster.
  pub fn with_reply_sink(mut self, replies: ErrorReplySender) -> Self {
    self.replies = Some(replies);
    self
  }

  pub fn settings(&self) -> &InboxSettings {
    &self.settings
  }

  pub fn cluster(&self) -> Option<Arc<dyn Cluster>> {
    self.cluster.clone()
  }

  pub fn dead_letters(&self) -> &DeadLetterSender {
    &self.dead_letters
  }

  pub(crate) fn tell_dead_letters(&self, letter: DeadLetter) {
    dead_letter::forward(&self.dead_letters, letter);
  }

  /// Sends an `ErrorReply` to the requester if the failed message was a
  /// request. The session id travels with the reply.
  pub(crate) async fn reply_error_if_asked(
    &self,
    from: &ProcessId,
    request: Option<&RequestInfo>,
    session_id: Option<&str>,
    error: &InboxError,
  ) {
    let Some(request) = request else {
      return;
    };
    let reply = ErrorReply {
      request_id: request.request_id,
      session_id: session_id.map(str::to_string),
      to: request.reply_to.clone(),
      from: from.clone(),
      error: error.to_string(),
    };

    if let Some(replies) = &self.replies {
      if let Err(e) = replies.try_send(reply) {
        tracing::warn!(to = %request.reply_to, error = %e, "Failed to deliver error reply");
      }
      return;
    }

    let Some(cluster) = &self.cluster else {
      tracing::debug!(to = %request.reply_to, "No reply path for error reply; dropped");
      return;
    };
    let key = keys::reply_notify_key(&request.reply_to);
    let result = match serde_json::to_string(&reply) {
      Ok(payload) => cluster.publish_to_channel(&key, payload).await.map(|_| ()),
      Err(e) => Err(e.into()),
    };
    if let Err(e) = result {
      tracing::warn!(to = %request.reply_to, error = %e, "Failed to publish error reply");
    }
  }
}

impl fmt::Debug for InboxContext {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("InboxContext")
      .field("settings", &self.settings)
      .field("has_cluster", &self.cluster.is_some())
      .field("has_reply_sink", &self.replies.is_some())
      .finish_non_exhaustive()
  }
}

// src/message/mod.rs

//! Message types delivered through inboxes.

pub mod dead_letter;
pub mod remote;

pub use dead_letter::{dead_letters, DeadLetter, DeadLetterReceiver, DeadLetterSender};
pub use remote::{ErrorReply, ProcessMetaData, RemoteMessageDto};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Address of an actor: a path such as `/root/user/worker`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProcessId(String);

impl ProcessId {
  pub fn new(path: impl Into<String>) -> Self {
    Self(path.into())
  }

  pub fn path(&self) -> &str {
    &self.0
  }

  /// Address of a child named `name` under this process.
  pub fn child(&self, name: &str) -> Self {
    Self(format!("{}/{}", self.0.trim_end_matches('/'), name))
  }
}

impl fmt::Display for ProcessId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

impl From<&str> for ProcessId {
  fn from(path: &str) -> Self {
    Self::new(path)
  }
}

/// Control messages handled on the system channel. They are never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SystemMessage {
  Pause,
  Unpause,
  Restart,
  ShutdownProcess,
  ChildFaulted { child: ProcessId, error: String },
  Watch { pid: ProcessId },
  Unwatch { pid: ProcessId },
}

/// Control messages that travel in the user queue alongside user messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum UserControlMessage {
  GetChildren,
  Ping,
  /// Application-defined control verb.
  Custom { name: String },
}

/// Present when the sender expects a reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestInfo {
  pub request_id: u64,
  pub reply_to: ProcessId,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UserMessage<T> {
  pub content: T,
  pub sender: Option<ProcessId>,
  pub request: Option<RequestInfo>,
  pub session_id: Option<String>,
}

impl<T> UserMessage<T> {
  /// A fire-and-forget message.
  pub fn tell(content: T) -> Self {
    Self {
      content,
      sender: None,
      request: None,
      session_id: None,
    }
  }

  /// A request expecting a reply at `reply_to`.
  pub fn ask(content: T, request_id: u64, reply_to: ProcessId) -> Self {
    Self {
      content,
      sender: Some(reply_to.clone()),
      request: Some(RequestInfo { request_id, reply_to }),
      session_id: None,
    }
  }

  pub fn with_sender(mut self, sender: ProcessId) -> Self {
    self.sender = Some(sender);
    self
  }

  pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
    self.session_id = Some(session_id.into());
    self
  }

  pub fn is_request(&self) -> bool {
    self.request.is_some()
  }
}

/// Every message an inbox can deliver, by category.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage<T> {
  System(SystemMessage),
  User(UserMessage<T>),
  UserControl(UserControlMessage),
}

impl<T> InboundMessage<T> {
  pub fn variant_name(&self) -> &'static str {
    match self {
      InboundMessage::System(_) => "System",
      InboundMessage::User(_) => "User",
      InboundMessage::UserControl(_) => "UserControl",
    }
  }

  pub fn session_id(&self) -> Option<&str> {
    match self {
      InboundMessage::User(msg) => msg.session_id.as_deref(),
      _ => None,
    }
  }

  pub fn request(&self) -> Option<&RequestInfo> {
    match self {
      InboundMessage::User(msg) => msg.request.as_ref(),
      _ => None,
    }
  }
}

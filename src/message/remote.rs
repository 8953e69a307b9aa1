// src/message/remote.rs

//! The envelope used for messages that cross the cluster store.

use crate::error::InboxError;
use crate::message::{InboundMessage, ProcessId, RequestInfo, UserMessage};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Wire envelope for a remote message. `content` carries the JSON text of the
/// system message, user-control message or user payload.
///
/// `kind == 0 && tag == 0` is the value a failed or empty encode produces and
/// is always rejected.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RemoteMessageDto {
  #[serde(default)]
  pub kind: u8,
  #[serde(default)]
  pub tag: u8,
  #[serde(default)]
  pub to: String,
  pub sender: Option<String>,
  pub reply_to: Option<String>,
  pub request_id: Option<u64>,
  pub message_id: Option<Uuid>,
  pub session_id: Option<String>,
  pub content: Option<String>,
}

impl RemoteMessageDto {
  pub const KIND_UNKNOWN: u8 = 0;
  pub const KIND_SYSTEM: u8 = 1;
  pub const KIND_USER: u8 = 2;
  pub const KIND_USER_CONTROL: u8 = 3;

  pub const TAG_UNKNOWN: u8 = 0;
  pub const TAG_TELL: u8 = 1;
  pub const TAG_ASK: u8 = 2;

  /// Builds the envelope for `msg` addressed to `to`.
  pub fn encode<T: Serialize>(to: &ProcessId, msg: &InboundMessage<T>) -> Result<Self, InboxError> {
    let mut dto = RemoteMessageDto {
      to: to.path().to_string(),
      message_id: Some(Uuid::new_v4()),
      tag: Self::TAG_TELL,
      ..Default::default()
    };
    match msg {
      InboundMessage::System(sys) => {
        dto.kind = Self::KIND_SYSTEM;
        dto.content = Some(serde_json::to_string(sys)?);
      }
      InboundMessage::UserControl(ctrl) => {
        dto.kind = Self::KIND_USER_CONTROL;
        dto.content = Some(serde_json::to_string(ctrl)?);
      }
      InboundMessage::User(user) => {
        dto.kind = Self::KIND_USER;
        dto.content = Some(serde_json::to_string(&user.content)?);
        dto.sender = user.sender.as_ref().map(|p| p.path().to_string());
        dto.session_id = user.session_id.clone();
        if let Some(request) = &user.request {
          dto.tag = Self::TAG_ASK;
          dto.request_id = Some(request.request_id);
          dto.reply_to = Some(request.reply_to.path().to_string());
        }
      }
    }
    Ok(dto)
  }

  /// Parses a payload read from the store or a notification channel.
  pub fn parse(payload: &str) -> Result<Self, InboxError> {
    serde_json::from_str(payload).map_err(|e| InboxError::MalformedMessage(format!("undecodable envelope: {}", e)))
  }

  pub fn to_payload(&self) -> Result<String, InboxError> {
    Ok(serde_json::to_string(self)?)
  }

  pub fn is_sentinel_bad(&self) -> bool {
    self.kind == Self::KIND_UNKNOWN && self.tag == Self::TAG_UNKNOWN
  }

  pub fn sender_pid(&self) -> Option<ProcessId> {
    self.sender.as_deref().map(ProcessId::new)
  }

  /// Decodes the envelope into a typed message.
  pub fn decode<T: DeserializeOwned>(&self) -> Result<InboundMessage<T>, InboxError> {
    if self.is_sentinel_bad() {
      return Err(InboxError::MalformedMessage("envelope has no kind or tag".into()));
    }
    let content = self
      .content
      .as_deref()
      .ok_or_else(|| InboxError::MalformedMessage("envelope has no content".into()))?;
    let malformed = |e: serde_json::Error| InboxError::MalformedMessage(format!("undecodable content: {}", e));

    match self.kind {
      Self::KIND_SYSTEM => Ok(InboundMessage::System(serde_json::from_str(content).map_err(malformed)?)),
      Self::KIND_USER_CONTROL => Ok(InboundMessage::UserControl(serde_json::from_str(content).map_err(malformed)?)),
      Self::KIND_USER => {
        let request = match self.tag {
          Self::TAG_TELL => None,
          Self::TAG_ASK => {
            let (request_id, reply_to) = self
              .request_id
              .zip(self.reply_to.as_deref())
              .ok_or_else(|| InboxError::MalformedMessage("ask without request id or reply address".into()))?;
            Some(RequestInfo {
              request_id,
              reply_to: ProcessId::new(reply_to),
            })
          }
          other => return Err(InboxError::MalformedMessage(format!("unknown user message tag {}", other))),
        };
        Ok(InboundMessage::User(UserMessage {
          content: serde_json::from_str(content).map_err(malformed)?,
          sender: self.sender_pid(),
          request,
          session_id: self.session_id.clone(),
        }))
      }
      other => Err(InboxError::MalformedMessage(format!("unknown message kind {}", other))),
    }
  }
}

/// Sent back to a requester when handling its request failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorReply {
  pub request_id: u64,
  pub session_id: Option<String>,
  pub to: ProcessId,
  pub from: ProcessId,
  pub error: String,
}

/// Type identity of a process, published for remote introspection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessMetaData {
  pub message_types: Vec<String>,
  pub actor_type: String,
}

impl ProcessMetaData {
  pub fn of<A: ?Sized, T>() -> Self {
    Self {
      message_types: vec![std::any::type_name::<T>().to_string()],
      actor_type: std::any::type_name::<A>().to_string(),
    }
  }
}

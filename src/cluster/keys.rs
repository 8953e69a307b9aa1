// src/cluster/keys.rs

//! Store and channel keys derived from a process id.

use crate::message::ProcessId;

pub fn user_inbox_key(pid: &ProcessId) -> String {
  format!("{}-user-inbox", pid)
}

pub fn user_inbox_notify_key(pid: &ProcessId) -> String {
  format!("{}-notify", user_inbox_key(pid))
}

pub fn system_inbox_notify_key(pid: &ProcessId) -> String {
  format!("{}-system-inbox-notify", pid)
}

pub fn metadata_key(pid: &ProcessId) -> String {
  format!("{}-metadata", pid)
}

pub fn scheduled_key(pid: &ProcessId) -> String {
  format!("{}-scheduled", pid)
}

pub fn scheduled_notify_key(pid: &ProcessId) -> String {
  format!("{}-notify", scheduled_key(pid))
}

/// Channel on which error replies for requests sent by `pid` arrive.
pub fn reply_notify_key(pid: &ProcessId) -> String {
  format!("{}-reply-notify", pid)
}

//! rinbox - actor mailboxes for a Tokio-based process runtime.
//!
//! A mailbox buffers the messages addressed to one actor and releases them,
//! one at a time, to that actor's handler. The handler answers every message
//! with an [`InboxDirective`] that decides whether the mailbox advances,
//! retries the same message, pauses or shuts down. The same rules hold for
//! purely local mailboxes and for inboxes backed by a shared cluster store.

/// The cluster store contract and its in-process implementation.
pub mod cluster;
/// Runtime collaborators handed to inboxes at start-up.
pub mod context;
/// Error type used throughout the library.
pub mod error;
/// Local and remote actor inboxes.
pub mod inbox;
/// Message categories, envelopes and dead letters.
pub mod message;
/// Ring buffer, directives and the local consumer loop.
pub mod runtime;
/// Mailbox sizing configuration.
pub mod settings;

pub use cluster::{Cluster, MemoryCluster};
pub use context::InboxContext;
pub use error::InboxError;
pub use inbox::{Actor, Inbox, LocalInbox, RemoteDispatcher, RemoteInbox};
pub use message::{
  dead_letters, DeadLetter, InboundMessage, ProcessId, SystemMessage, UserControlMessage, UserMessage,
};
pub use runtime::{handler_fn, GrowableRingBuffer, InboxDirective, InboxHandler, LocalMailbox};
pub use settings::InboxSettings;

const VERSION_MAJOR: i32 = 0;
const VERSION_MINOR: i32 = 1;
const VERSION_PATCH: i32 = 0;

/// Returns the library version as a tuple (major, minor, patch).
pub fn version() -> (i32, i32, i32) {
  (VERSION_MAJOR, VERSION_MINOR, VERSION_PATCH)
}

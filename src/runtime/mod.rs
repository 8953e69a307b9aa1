// src/runtime/mod.rs

//! Core mailbox primitives: the ring buffer, directives, handlers and the
//! local consumer loop.

pub mod directive;
pub mod handler;
pub mod mailbox;
pub mod ring_buffer;

pub use directive::{DirectiveOutcome, InboxDirective};
pub use handler::{handler_fn, FnHandler, InboxHandler};
pub use mailbox::{LocalMailbox, MailboxState};
pub use ring_buffer::GrowableRingBuffer;

// src/runtime/mailbox.rs

//! A local, in-process mailbox: a growable ring buffer plus a single
//! consumer loop driven by `InboxDirective`s.

use crate::error::InboxError;
use crate::runtime::directive::DirectiveOutcome;
use crate::runtime::{GrowableRingBuffer, InboxDirective, InboxHandler};

use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::FutureExt;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

/// Run state of a mailbox. Every transition happens under the buffer mutex
/// and is followed by a wake-up where a blocked consumer must observe it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MailboxState {
  Running,
  Paused,
  Cancelled,
}

struct Inner<T> {
  buffer: GrowableRingBuffer<T>,
  state: MailboxState,
}

struct Shared<T> {
  inner: Mutex<Inner<T>>,
  /// Stores a permit when nobody is waiting, so a post that lands between the
  /// consumer's emptiness check and its wait is never lost.
  wake: Notify,
  consumer_active: AtomicBool,
}

/// Cloneable handle to a local mailbox. Any number of producers may `post`;
/// exactly one consumer loop (`receive`) may run at a time. Starting a second
/// one is a caller error: it is logged, not prevented.
pub struct LocalMailbox<T> {
  shared: Arc<Shared<T>>,
}

impl<T> Clone for LocalMailbox<T> {
  fn clone(&self) -> Self {
    Self {
      shared: self.shared.clone(),
    }
  }
}

impl<T> fmt::Debug for LocalMailbox<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let inner = self.shared.inner.lock();
    f.debug_struct("LocalMailbox")
      .field("state", &inner.state)
      .field("count", &inner.buffer.count())
      .field("capacity", &inner.buffer.capacity())
      .finish()
  }
}

impl<T: Send + Sync + 'static> LocalMailbox<T> {
  /// Creates a running, empty mailbox limited to `capacity` queued items.
  pub fn new(capacity: usize) -> Self {
    Self::from_buffer(GrowableRingBuffer::new(capacity))
  }

  /// Like `new` but with an explicit starting slot count for the buffer.
  pub fn with_initial_size(capacity: usize, initial_size: usize) -> Self {
    Self::from_buffer(GrowableRingBuffer::with_initial_size(capacity, initial_size))
  }

  fn from_buffer(buffer: GrowableRingBuffer<T>) -> Self {
    Self {
      shared: Arc::new(Shared {
        inner: Mutex::new(Inner {
          buffer,
          state: MailboxState::Running,
        }),
        wake: Notify::new(),
        consumer_active: AtomicBool::new(false),
      }),
    }
  }

  /// Enqueues `value` and wakes the consumer unless paused.
  ///
  /// Fails with `CapacityExceeded` when the mailbox is at capacity. Posting to
  /// a cancelled mailbox succeeds but the value is discarded.
  pub fn post(&self, value: T) -> Result<(), InboxError> {
    let mut inner = self.shared.inner.lock();
    let state = inner.state;
    match state {
      MailboxState::Cancelled => {
        tracing::trace!("Post to cancelled mailbox discarded");
        Ok(())
      }
      MailboxState::Paused => inner.buffer.post(value),
      MailboxState::Running => {
        inner.buffer.post(value)?;
        drop(inner);
        self.shared.wake.notify_one();
        Ok(())
      }
    }
  }

  /// Number of items waiting. An item currently being handled is not counted.
  /// A retried item is put back without a capacity check, so this can read
  /// `capacity() + 1` for a moment.
  pub fn count(&self) -> usize {
    self.shared.inner.lock().buffer.count()
  }

  pub fn capacity(&self) -> usize {
    self.shared.inner.lock().buffer.capacity()
  }

  pub fn state(&self) -> MailboxState {
    self.shared.inner.lock().state
  }

  pub fn is_paused(&self) -> bool {
    self.state() == MailboxState::Paused
  }

  pub fn is_cancelled(&self) -> bool {
    self.state() == MailboxState::Cancelled
  }

  /// Stops delivery after the item currently being handled.
  pub fn pause(&self) {
    let mut inner = self.shared.inner.lock();
    if inner.state == MailboxState::Running {
      inner.state = MailboxState::Paused;
      tracing::trace!("Mailbox paused");
    }
  }

  /// Resumes delivery and wakes the consumer.
  pub fn unpause(&self) {
    let mut inner = self.shared.inner.lock();
    if inner.state == MailboxState::Paused {
      inner.state = MailboxState::Running;
      drop(inner);
      tracing::trace!("Mailbox unpaused");
      self.shared.wake.notify_one();
    }
  }

  /// Cancels the mailbox: held items are dropped and a blocked consumer
  /// wakes up and exits. A handler already running finishes its item.
  pub fn cancel(&self) {
    let mut inner = self.shared.inner.lock();
    if inner.state != MailboxState::Cancelled {
      let discarded = inner.buffer.count();
      inner.state = MailboxState::Cancelled;
      inner.buffer.clear();
      drop(inner);
      tracing::debug!(discarded, "Mailbox cancelled");
    }
    self.shared.wake.notify_one();
  }

  /// Runs the consumer loop on a dedicated task.
  pub fn spawn_receiver<H>(&self, handler: H) -> JoinHandle<()>
  where
    H: InboxHandler<T> + 'static,
  {
    let mailbox = self.clone();
    tokio::spawn(async move { mailbox.receive(handler).await })
  }

  /// Delivers items to `handler` one at a time until the mailbox is cancelled
  /// or the handler returns `SHUTDOWN`.
  pub async fn receive<H>(&self, mut handler: H)
  where
    H: InboxHandler<T>,
  {
    if self.shared.consumer_active.swap(true, Ordering::AcqRel) {
      tracing::warn!("A second consumer loop was started on the same mailbox; delivery order is undefined");
    }
    tracing::debug!("Mailbox consumer loop started");

    loop {
      let next = {
        let mut inner = self.shared.inner.lock();
        match inner.state {
          MailboxState::Cancelled => break,
          MailboxState::Paused => None,
          MailboxState::Running => inner.buffer.advance_tail(),
        }
      };

      let Some(item) = next else {
        self.shared.wake.notified().await;
        continue;
      };

      let directive = Self::invoke(&mut handler, &item).await;
      if directive.is_pause() {
        self.pause();
      }

      match directive.outcome() {
        DirectiveOutcome::Advance => drop(item),
        DirectiveOutcome::Retry => {
          let mut inner = self.shared.inner.lock();
          if inner.state != MailboxState::Cancelled {
            inner.buffer.push_back_tail(item);
          }
        }
        DirectiveOutcome::Shutdown => {
          tracing::debug!("Handler requested shutdown");
          self.cancel();
          break;
        }
      }
    }

    self.shared.consumer_active.store(false, Ordering::Release);
    tracing::debug!("Mailbox consumer loop stopped");
  }

  /// Calls the handler, converting failures and panics into `DEFAULT`.
  async fn invoke<H>(handler: &mut H, item: &T) -> InboxDirective
  where
    H: InboxHandler<T>,
  {
    match AssertUnwindSafe(handler.handle(item)).catch_unwind().await {
      Ok(Ok(directive)) => directive,
      Ok(Err(e)) => {
        tracing::warn!(error = %e, "Mailbox handler failed; message discarded");
        InboxDirective::DEFAULT
      }
      Err(_) => {
        tracing::error!("Mailbox handler panicked; message discarded");
        InboxDirective::DEFAULT
      }
    }
  }
}

// src/runtime/directive.rs

use bitflags::bitflags;

bitflags! {
  /// What a handler tells its mailbox after processing one message.
  ///
  /// The empty set is `DEFAULT`: the message was handled and the mailbox
  /// advances past it. `PAUSE` may be combined with any base outcome.
  #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
  pub struct InboxDirective: u8 {
    /// The message was not consumed; offer it again next.
    const PUSH_TO_FRONT_OF_QUEUE = 0b001;
    /// Stop consuming after this message until explicitly resumed.
    const PAUSE = 0b010;
    /// Stop consuming permanently (same as cancelling the mailbox).
    const SHUTDOWN = 0b100;
  }
}

/// The base outcome of a directive once the pause bit is stripped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectiveOutcome {
  /// Remove the item and carry on.
  Advance,
  /// Keep the item at the front of the queue.
  Retry,
  /// Cancel the mailbox.
  Shutdown,
}

impl InboxDirective {
  pub const DEFAULT: Self = Self::empty();

  /// Whether the pause modifier is set.
  pub fn is_pause(self) -> bool {
    self.contains(Self::PAUSE)
  }

  /// The directive with the pause modifier removed.
  pub fn without_pause(self) -> Self {
    self.difference(Self::PAUSE)
  }

  /// Resolves the base outcome. `SHUTDOWN` wins over everything else.
  pub fn outcome(self) -> DirectiveOutcome {
    let base = self.without_pause();
    if base.contains(Self::SHUTDOWN) {
      DirectiveOutcome::Shutdown
    } else if base.contains(Self::PUSH_TO_FRONT_OF_QUEUE) {
      DirectiveOutcome::Retry
    } else {
      DirectiveOutcome::Advance
    }
  }
}

// src/runtime/ring_buffer.rs

//! A growable circular buffer holding the pending messages of one mailbox.

use crate::error::InboxError;
use crate::settings::DEFAULT_INITIAL_BUFFER_SIZE;

/// Circular buffer with a hard occupancy ceiling and a physical slot array
/// that doubles whenever it fills up.
///
/// `head` is the next write position and `tail` the next read position.
/// `head == tail` means either empty or completely full; the `full` flag
/// tells the two apart.
///
/// The buffer itself is not synchronised. `LocalMailbox` keeps it behind a
/// single mutex together with the run state.
#[derive(Debug)]
pub struct GrowableRingBuffer<T> {
  slots: Vec<Option<T>>,
  head: usize,
  tail: usize,
  full: bool,
  capacity: usize,
}

impl<T> GrowableRingBuffer<T> {
  /// Creates an empty buffer limited to `capacity` queued items.
  pub fn new(capacity: usize) -> Self {
    Self::with_initial_size(capacity, DEFAULT_INITIAL_BUFFER_SIZE)
  }

  /// Creates an empty buffer with an explicit starting slot count.
  pub fn with_initial_size(capacity: usize, initial_size: usize) -> Self {
    Self {
      slots: Self::alloc(initial_size.max(1)),
      head: 0,
      tail: 0,
      full: false,
      capacity: capacity.max(1),
    }
  }

  fn alloc(size: usize) -> Vec<Option<T>> {
    std::iter::repeat_with(|| None).take(size).collect()
  }

  /// Number of items currently queued.
  pub fn count(&self) -> usize {
    let size = self.slots.len();
    if self.head > self.tail {
      self.head - self.tail
    } else if self.head < self.tail {
      size - self.tail + self.head
    } else if self.full {
      size
    } else {
      0
    }
  }

  pub fn is_empty(&self) -> bool {
    self.count() == 0
  }

  /// Hard ceiling on queued items.
  pub fn capacity(&self) -> usize {
    self.capacity
  }

  /// Current physical slot count.
  pub fn buffer_size(&self) -> usize {
    self.slots.len()
  }

  /// Appends `value` at the head.
  ///
  /// Fails with `CapacityExceeded` once occupancy reaches the hard capacity;
  /// the buffer is left untouched in that case.
  pub fn post(&mut self, value: T) -> Result<(), InboxError> {
    if self.count() >= self.capacity {
      return Err(InboxError::CapacityExceeded { capacity: self.capacity });
    }
    if self.full {
      self.grow();
    }
    let size = self.slots.len();
    self.slots[self.head] = Some(value);
    self.head = (self.head + 1) % size;
    self.full = self.head == self.tail;
    Ok(())
  }

  /// The item that would be consumed next.
  pub fn peek_tail(&self) -> Option<&T> {
    if self.is_empty() {
      return None;
    }
    self.slots[self.tail].as_ref()
  }

  /// Removes and returns the item at the tail.
  pub fn advance_tail(&mut self) -> Option<T> {
    if self.is_empty() {
      return None;
    }
    let size = self.slots.len();
    let item = self.slots[self.tail].take();
    self.tail = (self.tail + 1) % size;
    self.full = false;
    item
  }

  /// Puts `value` back in front of the tail so it is consumed next.
  ///
  /// Used to restore an item that was taken for processing but not consumed.
  /// The item was already admitted once, so the hard capacity is not checked
  /// again; the physical buffer grows if it has to. If producers refilled
  /// the buffer meanwhile, occupancy reaches `capacity + 1` and `post` keeps
  /// failing until it drops below `capacity` again.
  pub fn push_back_tail(&mut self, value: T) {
    if self.full {
      self.grow();
    }
    let size = self.slots.len();
    self.tail = (self.tail + size - 1) % size;
    self.slots[self.tail] = Some(value);
    self.full = self.head == self.tail;
  }

  /// Drops every queued item and resets both indices.
  pub fn clear(&mut self) {
    self.slots.iter_mut().for_each(|slot| *slot = None);
    self.head = 0;
    self.tail = 0;
    self.full = false;
  }

  /// Doubles the slot array. Only valid while full (`head == tail`).
  ///
  /// The block from the tail to the physical end moves to the end of the new
  /// array and the tail follows it. Slots before the head keep their index,
  /// so the head stays put and the new space opens up right after it.
  fn grow(&mut self) {
    debug_assert!(self.full && self.head == self.tail);
    let old_size = self.slots.len();
    let new_size = old_size << 1;
    let mut old = std::mem::replace(&mut self.slots, Self::alloc(new_size));

    let end_block_size = old_size - self.tail;
    let end_block_pos = new_size - end_block_size;

    for (idx, slot) in old.iter_mut().enumerate().take(self.head) {
      self.slots[idx] = slot.take();
    }
    for (offset, slot) in old[self.tail..].iter_mut().enumerate() {
      self.slots[end_block_pos + offset] = slot.take();
    }

    tracing::trace!(old_size, new_size, head = self.head, tail = end_block_pos, "Ring buffer grown");
    self.tail = end_block_pos;
    self.full = false;
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn drain<T>(buffer: &mut GrowableRingBuffer<T>) -> Vec<T> {
    std::iter::from_fn(|| buffer.advance_tail()).collect()
  }

  #[test]
  fn fifo_order_is_preserved() {
    let mut buffer = GrowableRingBuffer::new(100);
    for i in 0..10 {
      buffer.post(i).unwrap();
    }
    assert_eq!(buffer.count(), 10);
    assert_eq!(buffer.peek_tail(), Some(&0));
    assert_eq!(drain(&mut buffer), (0..10).collect::<Vec<_>>());
    assert!(buffer.is_empty());
  }

  #[test]
  fn full_and_empty_are_distinguished() {
    let mut buffer = GrowableRingBuffer::with_initial_size(100, 4);
    for i in 0..4 {
      buffer.post(i).unwrap();
    }
    // head wrapped onto tail: must read as full, not empty
    assert_eq!(buffer.count(), 4);
    assert_eq!(buffer.buffer_size(), 4);
    assert_eq!(drain(&mut buffer), vec![0, 1, 2, 3]);
    assert_eq!(buffer.count(), 0);
  }

  #[test]
  fn growth_keeps_order_when_wrapped() {
    let mut buffer = GrowableRingBuffer::with_initial_size(1000, 4);
    buffer.post(0).unwrap();
    buffer.post(1).unwrap();
    buffer.post(2).unwrap();
    assert_eq!(buffer.advance_tail(), Some(0));
    assert_eq!(buffer.advance_tail(), Some(1));
    for i in 3..6 {
      buffer.post(i).unwrap();
    }
    assert_eq!(buffer.count(), 4);

    for i in 6..40 {
      buffer.post(i).unwrap();
    }
    assert!(buffer.buffer_size() >= 38);
    assert_eq!(buffer.count(), 38);
    assert_eq!(drain(&mut buffer), (2..40).collect::<Vec<_>>());
  }

  #[test]
  fn growth_round_trip_over_several_doublings() {
    let mut buffer = GrowableRingBuffer::with_initial_size(10_000, 2);
    let mut expected = Vec::new();
    for round in 0..5 {
      for i in 0..300 {
        let value = round * 1000 + i;
        buffer.post(value).unwrap();
        expected.push(value);
      }
      for _ in 0..150 {
        let got = buffer.advance_tail().unwrap();
        assert_eq!(got, expected.remove(0));
      }
    }
    assert_eq!(drain(&mut buffer), expected);
  }

  #[test]
  fn capacity_rejection_does_not_touch_occupancy() {
    let mut buffer = GrowableRingBuffer::with_initial_size(3, 2);
    buffer.post("a").unwrap();
    buffer.post("b").unwrap();
    buffer.post("c").unwrap();
    let before = buffer.count();

    let err = buffer.post("d").unwrap_err();
    assert!(matches!(err, InboxError::CapacityExceeded { capacity: 3 }));
    assert_eq!(buffer.count(), before);
    assert_eq!(drain(&mut buffer), vec!["a", "b", "c"]);
  }

  #[test]
  fn push_back_tail_restores_front_item() {
    let mut buffer = GrowableRingBuffer::with_initial_size(100, 4);
    for i in 0..4 {
      buffer.post(i).unwrap();
    }
    let first = buffer.advance_tail().unwrap();
    buffer.post(4).unwrap();
    // full again while the first item is out
    assert_eq!(buffer.count(), 4);

    buffer.push_back_tail(first);
    assert_eq!(buffer.count(), 5);
    assert_eq!(buffer.peek_tail(), Some(&0));
    assert_eq!(drain(&mut buffer), vec![0, 1, 2, 3, 4]);
  }

  #[test]
  fn push_back_tail_may_overshoot_capacity_by_one() {
    let mut buffer = GrowableRingBuffer::with_initial_size(2, 2);
    buffer.post("a").unwrap();
    buffer.post("b").unwrap();
    let taken = buffer.advance_tail().unwrap();
    buffer.post("c").unwrap();

    buffer.push_back_tail(taken);
    assert_eq!(buffer.count(), 3);
    assert!(buffer.post("d").is_err());

    assert_eq!(buffer.advance_tail(), Some("a"));
    assert!(buffer.post("d").is_err());
    assert_eq!(buffer.advance_tail(), Some("b"));
    buffer.post("d").unwrap();
    assert_eq!(drain(&mut buffer), vec!["c", "d"]);
  }

  #[test]
  fn clear_discards_items() {
    let mut buffer = GrowableRingBuffer::with_initial_size(100, 4);
    for i in 0..6 {
      buffer.post(i).unwrap();
    }
    buffer.clear();
    assert_eq!(buffer.count(), 0);
    assert!(buffer.peek_tail().is_none());
    buffer.post(42).unwrap();
    assert_eq!(drain(&mut buffer), vec![42]);
  }
}

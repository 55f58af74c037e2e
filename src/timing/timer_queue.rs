use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::fmt::{Debug, Formatter};

use rustc_hash::FxHashSet;

use crate::timing::Timestamp;

/// Identifies a scheduled entry so its owner can cancel it. Handles are never reused within
///  one [TimerQueue].
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct TimerHandle(u64);

impl Debug for TimerHandle {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "T#{}", self.0)
    }
}

struct Entry<E> {
    due: Timestamp,
    handle: TimerHandle,
    payload: E,
}

impl<E> PartialEq for Entry<E> {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.handle == other.handle
    }
}
impl<E> Eq for Entry<E> {}

impl<E> PartialOrd for Entry<E> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<E> Ord for Entry<E> {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max heap: reverse both keys so the earliest entry - and for equal
        //  times the one scheduled first - is at the top
        match other.due.cmp(&self.due) {
            Ordering::Equal => other.handle.cmp(&self.handle),
            ordering => ordering,
        }
    }
}

/// A queue of timed entries for a single logical timeline.
///
/// Entries come out earliest first; entries due at the same instant come out in the order they
///  were scheduled. Cancelling is idempotent: cancelling an entry that already fired or was
///  already cancelled has no effect.
pub struct TimerQueue<E> {
    heap: BinaryHeap<Entry<E>>,
    pending: FxHashSet<TimerHandle>,
    next_handle: u64,
}

impl<E> Default for TimerQueue<E> {
    fn default() -> Self {
        TimerQueue {
            heap: BinaryHeap::new(),
            pending: Default::default(),
            next_handle: 0,
        }
    }
}

impl<E> TimerQueue<E> {
    pub fn new() -> TimerQueue<E> {
        Default::default()
    }

    pub fn schedule_at(&mut self, due: Timestamp, payload: E) -> TimerHandle {
        let handle = TimerHandle(self.next_handle);
        self.next_handle += 1;

        self.pending.insert(handle);
        self.heap.push(Entry { due, handle, payload });
        handle
    }

    /// Returns `true` if the entry was still pending.
    pub fn cancel(&mut self, handle: TimerHandle) -> bool {
        self.pending.remove(&handle)
    }

    pub fn is_pending(&self, handle: TimerHandle) -> bool {
        self.pending.contains(&handle)
    }

    /// Due time of the earliest entry that was not cancelled
    pub fn next_due(&mut self) -> Option<Timestamp> {
        self.discard_cancelled();
        self.heap.peek().map(|e| e.due)
    }

    /// Removes and returns the earliest entry if it is due at or before `now`.
    pub fn pop_due(&mut self, now: Timestamp) -> Option<(Timestamp, TimerHandle, E)> {
        match self.next_due() {
            Some(due) if due <= now => self.pop_next(),
            _ => None,
        }
    }

    /// Removes and returns the earliest entry regardless of its due time.
    pub fn pop_next(&mut self) -> Option<(Timestamp, TimerHandle, E)> {
        self.discard_cancelled();
        let entry = self.heap.pop()?;
        self.pending.remove(&entry.handle);
        Some((entry.due, entry.handle, entry.payload))
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    fn discard_cancelled(&mut self) {
        while let Some(top) = self.heap.peek() {
            if self.pending.contains(&top.handle) {
                break;
            }
            let _ = self.heap.pop();
        }
    }
}

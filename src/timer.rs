use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

/// Delayed callbacks on a virtual millisecond clock.
///
/// Entries fire in `(due_ms, insertion order)` order. Each entry carries a tag
/// so whole groups can be cancelled at once.
#[derive(Debug)]
pub struct TimerQueue<T, A> {
    heap: BinaryHeap<Reverse<Entry<T, A>>>,
    next_seq: u64,
}

#[derive(Debug)]
struct Entry<T, A> {
    due_ms: u64,
    seq: u64,
    tag: T,
    action: A,
}

impl<T, A> PartialEq for Entry<T, A> {
    fn eq(&self, other: &Self) -> bool {
        self.due_ms == other.due_ms && self.seq == other.seq
    }
}

impl<T, A> Eq for Entry<T, A> {}

impl<T, A> PartialOrd for Entry<T, A> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T, A> Ord for Entry<T, A> {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.due_ms, self.seq).cmp(&(other.due_ms, other.seq))
    }
}

impl<T, A> Default for TimerQueue<T, A> {
    fn default() -> Self {
        Self {
            heap: BinaryHeap::new(),
            next_seq: 0,
        }
    }
}

impl<T: PartialEq, A> TimerQueue<T, A> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, tag: T, due_ms: u64, action: A) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Reverse(Entry {
            due_ms,
            seq,
            tag,
            action,
        }));
    }

    /// Drop every entry carrying `tag`; returns how many were removed.
    pub fn cancel(&mut self, tag: &T) -> usize {
        let before = self.heap.len();
        self.heap.retain(|Reverse(e)| e.tag != *tag);
        before - self.heap.len()
    }

    pub fn cancel_all(&mut self) -> usize {
        let n = self.heap.len();
        self.heap.clear();
        n
    }

    /// Remove and return the earliest entry due at or before `now_ms`, with
    /// the time it was due.
    pub fn pop_due(&mut self, now_ms: u64) -> Option<(u64, T, A)> {
        if self.heap.peek()?.0.due_ms > now_ms {
            return None;
        }
        self.heap.pop().map(|Reverse(e)| (e.due_ms, e.tag, e.action))
    }

    pub fn next_due(&self) -> Option<u64> {
        self.heap.peek().map(|Reverse(e)| e.due_ms)
    }

    pub fn has(&self, tag: &T) -> bool {
        self.heap.iter().any(|Reverse(e)| e.tag == *tag)
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

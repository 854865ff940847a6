use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};

/// Identifier returned by [`DeferredQueue::schedule`], used to cancel an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeferredId(u64);

#[derive(Debug)]
struct Entry<T> {
    deadline: f64,
    seq: u64,
    item: T,
}

impl<T> PartialEq for Entry<T> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<T> Eq for Entry<T> {}

impl<T> PartialOrd for Entry<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// Reversed so the max-heap pops the earliest deadline, then the earliest seq.
impl<T> Ord for Entry<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .deadline
            .total_cmp(&self.deadline)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// One-shot effects keyed by a wall-clock deadline, drained once per tick.
///
/// Entries never fire early: an entry is due when `now >= deadline`. Entries
/// with equal deadlines come out in the order they were scheduled.
#[derive(Debug)]
pub struct DeferredQueue<T> {
    heap: BinaryHeap<Entry<T>>,
    cancelled: HashSet<u64>,
    next_seq: u64,
}

impl<T> DeferredQueue<T> {
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            cancelled: HashSet::new(),
            next_seq: 0,
        }
    }

    pub fn schedule(&mut self, deadline: f64, item: T) -> DeferredId {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Entry {
            deadline,
            seq,
            item,
        });
        DeferredId(seq)
    }

    /// Returns true if the entry was still pending.
    pub fn cancel(&mut self, id: DeferredId) -> bool {
        let pending = self.heap.iter().any(|e| e.seq == id.0) && !self.cancelled.contains(&id.0);
        if pending {
            self.cancelled.insert(id.0);
        }
        pending
    }

    pub fn drain_due(&mut self, now: f64) -> Vec<T> {
        let mut due = Vec::new();
        while let Some(top) = self.heap.peek() {
            if top.deadline > now {
                break;
            }
            if let Some(entry) = self.heap.pop() {
                if !self.cancelled.remove(&entry.seq) {
                    due.push(entry.item);
                }
            }
        }
        due
    }

    /// Removes every pending entry regardless of deadline, in deadline order.
    pub fn drain_all(&mut self) -> Vec<T> {
        let mut all = Vec::with_capacity(self.heap.len());
        while let Some(entry) = self.heap.pop() {
            if !self.cancelled.remove(&entry.seq) {
                all.push(entry.item);
            }
        }
        self.cancelled.clear();
        all
    }

    pub fn clear(&mut self) {
        self.heap.clear();
        self.cancelled.clear();
    }

    pub fn len(&self) -> usize {
        self.heap.len() - self.cancelled.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn next_deadline(&self) -> Option<f64> {
        self.heap
            .iter()
            .filter(|e| !self.cancelled.contains(&e.seq))
            .map(|e| e.deadline)
            .min_by(|a, b| a.total_cmp(b))
    }
}

impl<T> Default for DeferredQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

//! Bounded stream buffer: the queue + hash index pair at the heart of
//! MESHJOIN.
//!
//! Tuples are addressed by a monotone admission sequence number, so the
//! join-key multimap yields probe hits in queue order and FIFO retirement
//! falls out of the sequence arithmetic. Retired mid-queue slots are holes
//! that are compacted lazily from the head; the index never references a
//! retired tuple, so queue contents and index stay bijective.

use std::collections::{HashMap, VecDeque};

use crate::meshstream::error::{MeshError, MeshResult};
use crate::meshstream::types::StreamTuple;

struct BufferEntry {
    tuple: StreamTuple,
    entry_step: u64,
}

/// Holds up to W unretired stream tuples with O(1+k) lookup by join key.
pub struct StreamBuffer {
    capacity: usize,
    queue: VecDeque<Option<BufferEntry>>,
    /// Sequence number of the tuple at the queue front
    head_seq: u64,
    /// Sequence number the next admission receives
    next_seq: u64,
    /// join_key -> admission sequence numbers, ascending
    index: HashMap<i64, Vec<u64>>,
    live: usize,
}

impl StreamBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            queue: VecDeque::with_capacity(capacity),
            head_seq: 0,
            next_seq: 0,
            index: HashMap::new(),
            live: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn has_capacity(&self) -> bool {
        self.live < self.capacity
    }

    /// Append a tuple, recording the step it entered at.
    pub fn admit(&mut self, tuple: StreamTuple, entry_step: u64) -> MeshResult<()> {
        if self.live >= self.capacity {
            return Err(MeshError::BufferFull {
                capacity: self.capacity,
            });
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        self.index.entry(tuple.join_key).or_default().push(seq);
        self.queue.push_back(Some(BufferEntry { tuple, entry_step }));
        self.live += 1;
        Ok(())
    }

    /// Sequence numbers of all resident tuples with this join key, in
    /// queue (admission) order.
    pub fn probe(&self, join_key: i64) -> Vec<u64> {
        self.index.get(&join_key).cloned().unwrap_or_default()
    }

    /// Remove a tuple from both queue and index. Returns `None` if the
    /// sequence number is not resident, which callers treat as a
    /// programming error.
    pub fn retire(&mut self, seq: u64) -> Option<StreamTuple> {
        let slot = usize::try_from(seq.checked_sub(self.head_seq)?).ok()?;
        let entry = self.queue.get_mut(slot)?.take()?;
        if let Some(seqs) = self.index.get_mut(&entry.tuple.join_key) {
            if let Ok(pos) = seqs.binary_search(&seq) {
                seqs.remove(pos);
            }
            if seqs.is_empty() {
                self.index.remove(&entry.tuple.join_key);
            }
        }
        self.live -= 1;
        self.compact_head();
        Some(entry.tuple)
    }

    /// Yield and remove head tuples that have seen the full rotation: the
    /// driver has advanced `rotation_len` steps since their admission.
    pub fn expired_head(&mut self, current_step: u64, rotation_len: u64) -> Vec<StreamTuple> {
        let mut expired = Vec::new();
        loop {
            self.compact_head();
            let head = match self.queue.front() {
                Some(Some(entry)) if entry.entry_step + rotation_len <= current_step => {
                    self.head_seq
                }
                _ => break,
            };
            if let Some(tuple) = self.retire(head) {
                expired.push(tuple);
            }
        }
        expired
    }

    /// Remove and return every resident tuple in queue order. Used for the
    /// final expiry when the engine drains on stop or persistent source
    /// failure.
    pub fn drain_all(&mut self) -> Vec<StreamTuple> {
        let tuples = self
            .queue
            .drain(..)
            .flatten()
            .map(|entry| entry.tuple)
            .collect();
        self.index.clear();
        self.head_seq = self.next_seq;
        self.live = 0;
        tuples
    }

    fn compact_head(&mut self) {
        while matches!(self.queue.front(), Some(None)) {
            self.queue.pop_front();
            self.head_seq += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tuple(order_id: i64, join_key: i64) -> StreamTuple {
        StreamTuple::new(order_id, join_key, 1)
    }

    #[test]
    fn test_admit_to_capacity() {
        let mut buffer = StreamBuffer::new(2);
        buffer.admit(tuple(1, 10), 0).unwrap();
        buffer.admit(tuple(2, 10), 0).unwrap();
        let err = buffer.admit(tuple(3, 10), 0).unwrap_err();
        assert!(matches!(err, MeshError::BufferFull { capacity: 2 }));
        assert_eq!(buffer.len(), 2);
    }

    #[test]
    fn test_probe_returns_queue_order() {
        let mut buffer = StreamBuffer::new(4);
        buffer.admit(tuple(401, 5), 0).unwrap();
        buffer.admit(tuple(999, 7), 0).unwrap();
        buffer.admit(tuple(402, 5), 0).unwrap();
        let hits: Vec<i64> = buffer
            .probe(5)
            .into_iter()
            .map(|seq| buffer.retire(seq).unwrap().order_id)
            .collect();
        assert_eq!(hits, vec![401, 402]);
        assert!(buffer.probe(5).is_empty());
        assert_eq!(buffer.len(), 1);
    }

    #[test]
    fn test_retire_unknown_seq() {
        let mut buffer = StreamBuffer::new(2);
        buffer.admit(tuple(1, 10), 0).unwrap();
        assert!(buffer.retire(5).is_none());
        let retired = buffer.retire(0).unwrap();
        assert_eq!(retired.order_id, 1);
        // retiring twice is a programming error; here it just returns None
        assert!(buffer.retire(0).is_none());
    }

    #[test]
    fn test_expired_head_is_fifo() {
        let mut buffer = StreamBuffer::new(4);
        buffer.admit(tuple(1, 10), 0).unwrap();
        buffer.admit(tuple(2, 11), 0).unwrap();
        buffer.admit(tuple(3, 12), 2).unwrap();

        // nothing has seen the full rotation yet
        assert!(buffer.expired_head(2, 3).is_empty());

        let expired: Vec<i64> = buffer
            .expired_head(3, 3)
            .into_iter()
            .map(|t| t.order_id)
            .collect();
        assert_eq!(expired, vec![1, 2]);
        assert_eq!(buffer.len(), 1);

        let expired: Vec<i64> = buffer
            .expired_head(5, 3)
            .into_iter()
            .map(|t| t.order_id)
            .collect();
        assert_eq!(expired, vec![3]);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_expired_head_skips_retired_holes() {
        let mut buffer = StreamBuffer::new(4);
        buffer.admit(tuple(1, 10), 0).unwrap();
        buffer.admit(tuple(2, 11), 0).unwrap();
        // retire the head mid-queue; the hole must not block expiry of #2
        buffer.retire(0).unwrap();
        let expired: Vec<i64> = buffer
            .expired_head(1, 1)
            .into_iter()
            .map(|t| t.order_id)
            .collect();
        assert_eq!(expired, vec![2]);
    }

    #[test]
    fn test_index_queue_bijection_after_churn() {
        let mut buffer = StreamBuffer::new(8);
        for i in 0..8 {
            buffer.admit(tuple(i, i % 3), 0).unwrap();
        }
        for seq in buffer.probe(0) {
            buffer.retire(seq).unwrap();
        }
        let indexed: usize = [0, 1, 2].iter().map(|k| buffer.probe(*k).len()).sum();
        assert_eq!(indexed, buffer.len());
        buffer.admit(tuple(100, 0), 1).unwrap();
        assert_eq!(buffer.probe(0).len(), 1);
    }

    #[test]
    fn test_drain_all_preserves_order() {
        let mut buffer = StreamBuffer::new(4);
        for i in 0..4 {
            buffer.admit(tuple(i, i), 0).unwrap();
        }
        buffer.retire(1).unwrap();
        let drained: Vec<i64> = buffer.drain_all().into_iter().map(|t| t.order_id).collect();
        assert_eq!(drained, vec![0, 2, 3]);
        assert!(buffer.is_empty());
        assert!(buffer.probe(2).is_empty());
    }
}

use std::collections::{HashMap, VecDeque};

use crate::protocol::FrameHeader;

pub const DEFAULT_RESEND_CAPACITY: usize = 128;

/// A transmitted frame kept for server-requested retransmission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResendEntry {
    pub header: FrameHeader,
    pub bytes: Vec<u8>,
}

/// Bounded map of recently sent frames
///
/// Eviction follows insertion order (FIFO), not frame number and not access.
/// Entries are never replaced once inserted.
#[derive(Debug)]
pub struct ResendBuffer {
    capacity: usize,
    order: VecDeque<u64>,
    entries: HashMap<u64, ResendEntry>,
}

impl ResendBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            order: VecDeque::with_capacity(capacity),
            entries: HashMap::with_capacity(capacity),
        }
    }

    /// Insert a frame; returns false (and keeps the original) if the key exists
    pub fn put(&mut self, frame_no: u64, entry: ResendEntry) -> bool {
        if self.entries.contains_key(&frame_no) {
            return false;
        }

        self.entries.insert(frame_no, entry);
        self.order.push_back(frame_no);

        while self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.entries.remove(&oldest);
            }
        }

        true
    }

    pub fn get(&self, frame_no: u64) -> Option<&ResendEntry> {
        self.entries.get(&frame_no)
    }

    pub fn contains(&self, frame_no: u64) -> bool {
        self.entries.contains_key(&frame_no)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Frame numbers currently held, oldest first
    pub fn frame_numbers(&self) -> impl Iterator<Item = u64> + '_ {
        self.order.iter().copied()
    }

    pub fn clear(&mut self) {
        self.order.clear();
        self.entries.clear();
    }
}

impl Default for ResendBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_RESEND_CAPACITY)
    }
}

//! Bounded inbound frame queue with tail-drop

use crate::protocol::{decode, DecodedFrame};
use std::collections::VecDeque;
use tracing::trace;

/// Default queue capacity
pub const DEFAULT_MAX_QUEUE_LEN: usize = 50;

/// Raw link-layer frame as received from the socket
pub type RawFrame = Vec<u8>;

/// Outcome of offering a frame to the queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enqueue {
    Enqueued,
    /// Queue was full; the new frame was discarded
    Dropped,
}

/// Queue counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub queue_length: usize,
    pub max_queue_length: usize,
    /// Frames removed by consumers, matched or not
    pub serviced: u64,
    /// Frames discarded on arrival because the queue was full
    pub dropped: u64,
}

/// FIFO of raw frames awaiting a pull-based consumer.
///
/// When full, new arrivals are dropped and counted; frames already queued
/// are never evicted.
#[derive(Debug)]
pub struct SessionQueue {
    items: VecDeque<RawFrame>,
    max_len: usize,
    serviced: u64,
    dropped: u64,
}

impl Default for SessionQueue {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_QUEUE_LEN)
    }
}

impl SessionQueue {
    pub fn new(max_len: usize) -> Self {
        Self {
            items: VecDeque::with_capacity(max_len),
            max_len,
            serviced: 0,
            dropped: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn enqueue(&mut self, frame: RawFrame) -> Enqueue {
        if self.items.len() >= self.max_len {
            self.dropped += 1;
            trace!(len = frame.len(), dropped = self.dropped, "queue full, frame dropped");
            return Enqueue::Dropped;
        }
        trace!(len = frame.len(), queued = self.items.len() + 1, "frame queued");
        self.items.push_back(frame);
        Enqueue::Enqueued
    }

    /// Remove up to `count` frames from the head, oldest first
    pub fn dequeue(&mut self, count: usize) -> Vec<RawFrame> {
        let n = count.min(self.items.len());
        self.serviced += n as u64;
        self.items.drain(..n).collect()
    }

    /// Dequeue and decode frames one at a time, keeping those accepted by
    /// `predicate`, until `count` have matched or the queue is empty.
    ///
    /// Rejected frames are consumed and counted as serviced.
    pub fn dequeue_matching<F>(&mut self, mut predicate: F, count: usize) -> Vec<DecodedFrame>
    where
        F: FnMut(&DecodedFrame) -> bool,
    {
        let mut matched = Vec::new();
        while matched.len() < count {
            let Some(frame) = self.items.pop_front() else {
                break;
            };
            self.serviced += 1;
            let decoded = decode(&frame);
            if predicate(&decoded) {
                matched.push(decoded);
            }
        }
        matched
    }

    pub fn stats(&self) -> QueueStats {
        QueueStats {
            queue_length: self.items.len(),
            max_queue_length: self.max_len,
            serviced: self.serviced,
            dropped: self.dropped,
        }
    }
}

//! Bounded FIFO queue for messages awaiting a live connection

use std::collections::VecDeque;

use crewlink_protocol::WireMessage;

/// Default capacity of the outbound queue
pub const OUTBOUND_CAPACITY: usize = 100;

/// FIFO queue of wire messages, bounded by capacity.
///
/// Queue order reflects call order. On overflow the *incoming* message is
/// dropped; queued messages are never displaced.
#[derive(Debug)]
pub struct OutboundQueue {
    items: VecDeque<WireMessage>,
    capacity: usize,
}

impl OutboundQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            items: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Enqueue a message. Returns false when the queue is full and the
    /// message was dropped.
    pub fn push(&mut self, msg: WireMessage) -> bool {
        if self.items.len() >= self.capacity {
            return false;
        }
        self.items.push_back(msg);
        true
    }

    /// Put a message back at the head after a failed flush
    pub fn requeue_front(&mut self, msg: WireMessage) {
        self.items.push_front(msg);
    }

    pub fn pop(&mut self) -> Option<WireMessage> {
        self.items.pop_front()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl Default for OutboundQueue {
    fn default() -> Self {
        Self::new(OUTBOUND_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subscribe(n: usize) -> WireMessage {
        WireMessage::Subscribe {
            thread_id: n.to_string(),
        }
    }

    #[test]
    fn fifo_order_preserved() {
        let mut queue = OutboundQueue::default();
        for n in 0..5 {
            assert!(queue.push(subscribe(n)));
        }
        for n in 0..5 {
            assert_eq!(queue.pop(), Some(subscribe(n)));
        }
        assert!(queue.pop().is_none());
    }

    #[test]
    fn overflow_drops_the_newest_message() {
        let mut queue = OutboundQueue::default();
        for n in 1..=100 {
            assert!(queue.push(subscribe(n)), "message {n} should fit");
        }
        // message 101 is discarded, 1..100 retained in order
        assert!(!queue.push(subscribe(101)));
        assert_eq!(queue.len(), 100);
        assert_eq!(queue.pop(), Some(subscribe(1)));
        let mut last = None;
        while let Some(msg) = queue.pop() {
            last = Some(msg);
        }
        assert_eq!(last, Some(subscribe(100)));
    }

    #[test]
    fn requeue_front_restores_head() {
        let mut queue = OutboundQueue::default();
        queue.push(subscribe(1));
        queue.push(subscribe(2));
        let head = queue.pop().unwrap();
        queue.requeue_front(head);
        assert_eq!(queue.pop(), Some(subscribe(1)));
    }

    #[test]
    fn clear_empties_the_queue() {
        let mut queue = OutboundQueue::default();
        queue.push(subscribe(1));
        queue.clear();
        assert!(queue.is_empty());
    }
}

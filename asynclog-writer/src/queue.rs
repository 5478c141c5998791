//! Bounded FIFO work queue.
//!
//! Many producers, one consumer. A full queue blocks producers instead of
//! dropping records. Closing the queue rejects new items but lets the
//! consumer drain what is already buffered before it sees end-of-stream.
//!
//! No lock is held while a producer waits for space, so `close` and other
//! producers never queue up behind a blocked send.

use crate::error::WriterError;
use crossbeam_channel::{
    bounded, Receiver, RecvTimeoutError, SendTimeoutError, Sender,
};
use parking_lot::RwLock;
use std::time::Duration;

/// Outcome of a timed dequeue.
#[derive(Debug, PartialEq, Eq)]
pub enum Dequeue<T> {
    Item(T),
    Timeout,
    /// The queue is closed and fully drained.
    Closed,
}

/// A bounded, ordered, thread-safe queue.
pub struct WorkQueue<T> {
    /// `None` once closed. Producers send on a clone, so the channel
    /// disconnects once the last in-flight send has finished.
    sender: RwLock<Option<Sender<T>>>,
    receiver: Receiver<T>,
    capacity: usize,
}

impl<T> WorkQueue<T> {
    /// Creates a queue holding at most `capacity` items.
    ///
    /// A capacity of zero makes every enqueue wait for the consumer.
    pub fn new(capacity: usize) -> Self {
        let (sender, receiver) = bounded(capacity);
        Self {
            sender: RwLock::new(Some(sender)),
            receiver,
            capacity,
        }
    }

    fn sender(&self) -> Result<Sender<T>, WriterError> {
        self.sender
            .read()
            .as_ref()
            .cloned()
            .ok_or(WriterError::QueueClosed)
    }

    /// Appends an item, blocking while the queue is full.
    pub fn enqueue(&self, item: T) -> Result<(), WriterError> {
        self.sender()?
            .send(item)
            .map_err(|_| WriterError::QueueClosed)
    }

    /// Appends an item, blocking at most `timeout` while the queue is full.
    ///
    /// On timeout the item is not enqueued.
    pub fn enqueue_timeout(&self, item: T, timeout: Duration) -> Result<(), WriterError> {
        self.sender()?
            .send_timeout(item, timeout)
            .map_err(|e| match e {
                SendTimeoutError::Timeout(_) => WriterError::EnqueueTimeout(timeout),
                SendTimeoutError::Disconnected(_) => WriterError::QueueClosed,
            })
    }

    /// Removes the oldest item, blocking while the queue is empty.
    ///
    /// Returns `None` once the queue is closed and drained.
    pub fn dequeue_blocking(&self) -> Option<T> {
        self.receiver.recv().ok()
    }

    /// Removes the oldest item, blocking at most `timeout` while the queue is empty.
    pub fn dequeue_timeout(&self, timeout: Duration) -> Dequeue<T> {
        match self.receiver.recv_timeout(timeout) {
            Ok(item) => Dequeue::Item(item),
            Err(RecvTimeoutError::Timeout) => Dequeue::Timeout,
            Err(RecvTimeoutError::Disconnected) => Dequeue::Closed,
        }
    }

    /// Closes the queue to new items. Returns `false` if it was already closed.
    ///
    /// Does not wait. Producers already blocked on a full queue keep their
    /// place and are delivered; the consumer sees end-of-stream after them.
    pub fn close(&self) -> bool {
        self.sender.write().take().is_some()
    }

    /// Returns whether the queue has been closed.
    pub fn is_closed(&self) -> bool {
        self.sender.read().is_none()
    }

    /// Returns the number of buffered items.
    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    /// Returns whether no items are buffered.
    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    /// Returns the queue capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_fifo_order() {
        let queue = WorkQueue::new(8);
        for i in 0..5 {
            queue.enqueue(i).unwrap();
        }
        assert_eq!(queue.len(), 5);

        let drained: Vec<_> = (0..5).filter_map(|_| queue.dequeue_blocking()).collect();
        assert_eq!(drained, vec![0, 1, 2, 3, 4]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_close_drains_then_ends() {
        let queue = WorkQueue::new(4);
        queue.enqueue("a").unwrap();
        queue.enqueue("b").unwrap();

        assert!(queue.close());
        assert!(!queue.close());
        assert!(queue.is_closed());

        assert_eq!(queue.dequeue_blocking(), Some("a"));
        assert_eq!(queue.dequeue_timeout(Duration::from_millis(10)), Dequeue::Item("b"));
        assert_eq!(queue.dequeue_blocking(), None);
        assert_eq!(queue.dequeue_timeout(Duration::from_millis(10)), Dequeue::Closed);
    }

    #[test]
    fn test_enqueue_after_close() {
        let queue = WorkQueue::new(4);
        queue.close();
        assert!(matches!(queue.enqueue(1), Err(WriterError::QueueClosed)));
        assert!(matches!(
            queue.enqueue_timeout(1, Duration::from_millis(1)),
            Err(WriterError::QueueClosed)
        ));
    }

    #[test]
    fn test_dequeue_timeout_on_empty() {
        let queue: WorkQueue<u8> = WorkQueue::new(1);
        assert_eq!(queue.dequeue_timeout(Duration::from_millis(5)), Dequeue::Timeout);
    }

    #[test]
    fn test_enqueue_timeout_when_full() {
        let queue = WorkQueue::new(1);
        queue.enqueue(1).unwrap();

        let err = queue.enqueue_timeout(2, Duration::from_millis(20)).unwrap_err();
        assert!(matches!(err, WriterError::EnqueueTimeout(_)));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_full_queue_blocks_until_dequeue() {
        let queue = Arc::new(WorkQueue::new(1));
        queue.enqueue(1).unwrap();

        let (done_tx, done_rx) = mpsc::channel();
        let producer = {
            let queue = queue.clone();
            thread::spawn(move || {
                queue.enqueue(2).unwrap();
                done_tx.send(()).unwrap();
            })
        };

        // Still blocked: nothing has been dequeued.
        assert!(done_rx.recv_timeout(Duration::from_millis(100)).is_err());

        assert_eq!(queue.dequeue_blocking(), Some(1));
        done_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        producer.join().unwrap();
        assert_eq!(queue.dequeue_blocking(), Some(2));
    }

    #[test]
    fn test_close_with_blocked_producer() {
        let queue = Arc::new(WorkQueue::new(1));
        queue.enqueue(1).unwrap();

        let producer = {
            let queue = queue.clone();
            thread::spawn(move || queue.enqueue(2))
        };
        thread::sleep(Duration::from_millis(50));

        let consumer = {
            let queue = queue.clone();
            thread::spawn(move || {
                let mut items = Vec::new();
                while let Some(item) = queue.dequeue_blocking() {
                    items.push(item);
                }
                items
            })
        };

        queue.close();
        // Whichever side of the close the producer landed on, nothing is lost.
        let expected = match producer.join().unwrap() {
            Ok(()) => vec![1, 2],
            Err(_) => vec![1],
        };
        assert_eq!(consumer.join().unwrap(), expected);
    }

    #[test]
    fn test_close_does_not_wait_for_blocked_producer() {
        let queue = Arc::new(WorkQueue::new(1));
        queue.enqueue(1).unwrap();

        let producer = {
            let queue = queue.clone();
            thread::spawn(move || queue.enqueue(2))
        };
        thread::sleep(Duration::from_millis(50));

        // Nobody is consuming, so a close that waited on the producer would hang.
        let (closed_tx, closed_rx) = mpsc::channel();
        let closer = {
            let queue = queue.clone();
            thread::spawn(move || {
                closed_tx.send(queue.close()).unwrap();
            })
        };
        assert!(closed_rx.recv_timeout(Duration::from_secs(5)).unwrap());
        closer.join().unwrap();

        // Enqueues from other threads don't wait behind the blocked one either.
        assert!(matches!(
            queue.enqueue_timeout(3, Duration::ZERO),
            Err(WriterError::QueueClosed)
        ));

        assert_eq!(queue.dequeue_blocking(), Some(1));
        let landed = producer.join().unwrap().is_ok();
        if landed {
            assert_eq!(queue.dequeue_blocking(), Some(2));
        }
        assert_eq!(queue.dequeue_blocking(), None);
    }
}

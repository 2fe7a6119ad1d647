//! Bounded FIFO buffer between request handlers and the delivery worker.
//!
//! Backed by a tokio bounded mpsc channel: [`DispatchQueue`] is the cloneable
//! producer side, [`QueueReceiver`] the single consumer.

use tokio::sync::mpsc::{self, error::TrySendError};

use crate::error::DispatchError;
use crate::message::Message;

/// Default number of messages the queue holds.
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;

/// Producer handle. Enqueue never waits.
#[derive(Debug, Clone)]
pub struct DispatchQueue {
    tx: mpsc::Sender<Message>,
}

/// Consumer handle, owned by the delivery worker.
#[derive(Debug)]
pub struct QueueReceiver {
    rx: mpsc::Receiver<Message>,
}

/// Create a queue holding at most `capacity` messages.
pub fn bounded(capacity: usize) -> (DispatchQueue, QueueReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (DispatchQueue { tx }, QueueReceiver { rx })
}

impl DispatchQueue {
    /// Append a message, failing immediately when the queue is full.
    pub fn enqueue(&self, message: Message) -> Result<(), DispatchError> {
        self.tx.try_send(message).map_err(|e| match e {
            TrySendError::Full(_) => DispatchError::QueueFull,
            TrySendError::Closed(_) => DispatchError::Stopped,
        })
    }

    /// Number of messages currently buffered.
    pub fn len(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.tx.max_capacity()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl QueueReceiver {
    /// Wait for the next message. `None` once every producer is gone.
    pub async fn dequeue(&mut self) -> Option<Message> {
        self.rx.recv().await
    }

    /// Stop accepting new messages and drop whatever is still buffered.
    /// Returns how many messages were discarded.
    pub fn close_and_drain(&mut self) -> usize {
        self.rx.close();
        let mut dropped = 0;
        while self.rx.try_recv().is_ok() {
            dropped += 1;
        }
        dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(id: u64) -> Message {
        Message {
            id,
            sender: None,
            recipient: format!("user{}@example.com", id),
            subject: "Hi".to_string(),
            body: "Test".to_string(),
        }
    }

    #[tokio::test]
    async fn test_fifo_order() {
        let (queue, mut rx) = bounded(10);
        for id in 0..5 {
            queue.enqueue(message(id)).unwrap();
        }
        assert_eq!(queue.len(), 5);

        for id in 0..5 {
            assert_eq!(rx.dequeue().await.unwrap().id, id);
        }
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_full_queue_rejects_without_blocking() {
        let (queue, _rx) = bounded(DEFAULT_QUEUE_CAPACITY);
        for id in 0..DEFAULT_QUEUE_CAPACITY as u64 {
            queue.enqueue(message(id)).unwrap();
        }

        assert_eq!(queue.enqueue(message(999)), Err(DispatchError::QueueFull));
        assert_eq!(queue.len(), DEFAULT_QUEUE_CAPACITY);
    }

    #[tokio::test]
    async fn test_dequeue_frees_capacity() {
        let (queue, mut rx) = bounded(1);
        queue.enqueue(message(1)).unwrap();
        assert_eq!(queue.enqueue(message(2)), Err(DispatchError::QueueFull));

        assert_eq!(rx.dequeue().await.unwrap().id, 1);
        queue.enqueue(message(3)).unwrap();
        assert_eq!(rx.dequeue().await.unwrap().id, 3);
    }

    #[tokio::test]
    async fn test_closed_queue_reports_stopped() {
        let (queue, mut rx) = bounded(4);
        queue.enqueue(message(1)).unwrap();
        queue.enqueue(message(2)).unwrap();

        assert_eq!(rx.close_and_drain(), 2);
        assert!(queue.is_closed());
        assert_eq!(queue.enqueue(message(3)), Err(DispatchError::Stopped));
    }
}

//! The bounded single-producer(-many)-many-consumer channel of pending
//! validations. Ingest handlers are the producers; the worker pool drains
//! it in FIFO order.

use thiserror::Error;
use tokio::sync::mpsc;

use crate::model::IngestMessage;

#[derive(Debug, Error)]
pub enum EnqueueError {
    #[error("message queue is full")]
    Full,
    #[error("message queue is closed")]
    Closed,
}

/// The producer half, cloned into every ingest handler invocation.
#[derive(Clone)]
pub struct MessageProducer {
    sender: mpsc::Sender<IngestMessage>,
}

impl MessageProducer {
    /// Enqueues a message, waiting up to the handler's own write timeout if
    /// the queue is full (the default backpressure policy).
    pub async fn enqueue(&self, message: IngestMessage) -> Result<(), EnqueueError> {
        self.sender
            .send(message)
            .await
            .map_err(|_| EnqueueError::Closed)
    }

    /// Fail-fast variant: returns immediately with [`EnqueueError::Full`]
    /// instead of waiting — a tunable backpressure policy, an acceptable
    /// alternative to blocking.
    pub fn try_enqueue(&self, message: IngestMessage) -> Result<(), EnqueueError> {
        self.sender.try_send(message).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => EnqueueError::Full,
            mpsc::error::TrySendError::Closed(_) => EnqueueError::Closed,
        })
    }
}

/// The consumer half, owned by the worker pool.
pub struct MessageConsumer {
    receiver: mpsc::Receiver<IngestMessage>,
}

impl MessageConsumer {
    pub async fn recv(&mut self) -> Option<IngestMessage> {
        self.receiver.recv().await
    }
}

/// Creates the bounded channel with the configured capacity (default 1000).
pub fn channel(capacity: usize) -> (MessageProducer, MessageConsumer) {
    let (sender, receiver) = mpsc::channel(capacity);
    (MessageProducer { sender }, MessageConsumer { receiver })
}

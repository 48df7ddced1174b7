//! Event publishing/subscription abstraction (mechanics only).
//!
//! The bus distributes events that are already durable elsewhere, so delivery is
//! best-effort and at-least-once. Consumers (mailers, websocket fan-out, cache
//! warmers) must tolerate duplicates.

use std::sync::Arc;
use std::sync::mpsc::Receiver;

/// A subscription to a bus; each subscription receives every published message.
#[derive(Debug)]
pub struct Subscription<M> {
    receiver: Receiver<M>,
}

impl<M> Subscription<M> {
    pub fn new(receiver: Receiver<M>) -> Self {
        Self { receiver }
    }

    /// Block until the next message is available.
    pub fn recv(&self) -> Result<M, std::sync::mpsc::RecvError> {
        self.receiver.recv()
    }

    /// Try to receive a message without blocking.
    pub fn try_recv(&self) -> Result<M, std::sync::mpsc::TryRecvError> {
        self.receiver.try_recv()
    }
}

/// Domain-agnostic pub/sub bus.
///
/// `publish` must not block on consumers; a slow or dead subscriber never holds
/// up the publisher.
pub trait EventBus<M>: Send + Sync {
    type Error: core::fmt::Debug + Send + Sync + 'static;

    fn publish(&self, message: M) -> Result<(), Self::Error>;

    fn subscribe(&self) -> Subscription<M>;
}

impl<M, B> EventBus<M> for Arc<B>
where
    B: EventBus<M> + ?Sized,
{
    type Error = B::Error;

    fn publish(&self, message: M) -> Result<(), Self::Error> {
        (**self).publish(message)
    }

    fn subscribe(&self) -> Subscription<M> {
        (**self).subscribe()
    }
}

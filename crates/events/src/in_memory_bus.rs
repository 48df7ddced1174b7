//! Process-local bus handing committed order events to in-process listeners
//! (mailer, cache invalidation, dashboards) in dev and tests.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, mpsc};

use thiserror::Error;

use crate::bus::{EventBus, Subscription};

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum InMemoryBusError {
    #[error("listener registry lock poisoned")]
    Poisoned,
}

/// Fans each event out to every listener registered at publish time.
///
/// Listeners only see events published after they subscribed. A listener whose
/// receiving end is gone is forgotten on the next publish.
#[derive(Debug)]
pub struct InMemoryEventBus<M> {
    listeners: Mutex<Vec<mpsc::Sender<M>>>,
    published: AtomicU64,
}

impl<M> InMemoryEventBus<M> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().map(|l| l.len()).unwrap_or(0)
    }

    /// Events accepted since the bus was created, delivered or not.
    pub fn published_count(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }
}

impl<M> Default for InMemoryEventBus<M> {
    fn default() -> Self {
        Self {
            listeners: Mutex::new(Vec::new()),
            published: AtomicU64::new(0),
        }
    }
}

impl<M> EventBus<M> for InMemoryEventBus<M>
where
    M: Clone + Send + 'static,
{
    type Error = InMemoryBusError;

    fn publish(&self, message: M) -> Result<(), Self::Error> {
        let mut listeners = self.listeners.lock().map_err(|_| InMemoryBusError::Poisoned)?;
        listeners.retain(|listener| listener.send(message.clone()).is_ok());
        self.published.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn subscribe(&self) -> Subscription<M> {
        let (tx, rx) = mpsc::channel();
        match self.listeners.lock() {
            Ok(mut listeners) => listeners.push(tx),
            // A poisoned registry also fails every publish; the receiver just stays empty.
            Err(poisoned) => poisoned.into_inner().push(tx),
        }
        Subscription::new(rx)
    }
}

//! Post-commit side effects: notifications and cache invalidation.
//!
//! These run after the order transaction has committed, on a detached task.
//! A failure here is logged and dropped; it never touches the committed order.

use std::sync::Arc;

use anyhow::anyhow;
use async_trait::async_trait;
use serde_json::Value as JsonValue;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use dualmart_core::Document;
use dualmart_events::{EventBus, EventEnvelope};
use dualmart_orders::{Order, OrderEvent};

/// Hands order events to whatever delivers emails/queues/websockets.
#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    async fn enqueue(&self, event: OrderEvent) -> anyhow::Result<()>;
}

/// Drops cached read models under a namespace.
#[async_trait]
pub trait CacheInvalidator: Send + Sync {
    async fn invalidate(&self, namespace: &str) -> anyhow::Result<()>;
}

/// Dispatcher that publishes order events as JSON envelopes on an [`EventBus`].
#[derive(Debug, Clone)]
pub struct BusNotificationDispatcher<B> {
    bus: B,
}

impl<B> BusNotificationDispatcher<B> {
    pub fn new(bus: B) -> Self {
        Self { bus }
    }
}

#[async_trait]
impl<B> NotificationDispatcher for BusNotificationDispatcher<B>
where
    B: EventBus<EventEnvelope<JsonValue>>,
{
    async fn enqueue(&self, event: OrderEvent) -> anyhow::Result<()> {
        let envelope =
            EventEnvelope::from_typed(*event.order_id().as_uuid(), Order::collection(), &event)?;
        self.bus
            .publish(envelope)
            .map_err(|e| anyhow!("event bus publish failed: {e:?}"))
    }
}

/// Does nothing; for deployments without notifications or caches.
#[derive(Debug, Clone, Copy, Default)]
pub struct Noop;

#[async_trait]
impl NotificationDispatcher for Noop {
    async fn enqueue(&self, _event: OrderEvent) -> anyhow::Result<()> {
        Ok(())
    }
}

#[async_trait]
impl CacheInvalidator for Noop {
    async fn invalidate(&self, _namespace: &str) -> anyhow::Result<()> {
        Ok(())
    }
}

/// The fire-and-forget work triggered by a committed order.
#[derive(Clone)]
pub struct PostCommitEffects {
    notifier: Arc<dyn NotificationDispatcher>,
    cache: Arc<dyn CacheInvalidator>,
    namespace: String,
}

impl core::fmt::Debug for PostCommitEffects {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PostCommitEffects")
            .field("namespace", &self.namespace)
            .finish_non_exhaustive()
    }
}

impl PostCommitEffects {
    pub fn new(
        notifier: Arc<dyn NotificationDispatcher>,
        cache: Arc<dyn CacheInvalidator>,
        namespace: impl Into<String>,
    ) -> Self {
        Self {
            notifier,
            cache,
            namespace: namespace.into(),
        }
    }

    pub fn disabled() -> Self {
        Self::new(Arc::new(Noop), Arc::new(Noop), "orders")
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Spawn the side effects for `order` on the current runtime.
    ///
    /// Callers normally drop the handle; it is returned so tests can await completion.
    pub fn spawn(&self, order: &Order) -> JoinHandle<()> {
        let events = OrderEvent::for_new_order(order);
        let order_number = order.order_number().clone();
        let notifier = Arc::clone(&self.notifier);
        let cache = Arc::clone(&self.cache);
        let namespace = self.namespace.clone();

        tokio::spawn(async move {
            for event in events {
                let kind = dualmart_events::Event::event_type(&event);
                match notifier.enqueue(event).await {
                    Ok(()) => debug!(order_number = %order_number, kind, "notification enqueued"),
                    Err(err) => warn!(
                        order_number = %order_number,
                        kind,
                        error = %err,
                        "notification failed; order unaffected"
                    ),
                }
            }

            if let Err(err) = cache.invalidate(&namespace).await {
                warn!(
                    order_number = %order_number,
                    namespace = %namespace,
                    error = %err,
                    "cache invalidation failed; order unaffected"
                );
            }
        })
    }
}

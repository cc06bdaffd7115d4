//! Stock change fan-out.
//!
//! Each product has its own topic, created on first subscription and removed
//! when its last subscriber goes away. A global topic receives every update.
//! Delivery is at most once to current subscribers; nothing is replayed.

use std::sync::Arc;

use dashmap::DashMap;
use serde::Serialize;
use thiserror::Error;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tokio::sync::broadcast;
use tracing::debug;

use crate::domain::types::ProductId;

const DEFAULT_CAPACITY: usize = 64;

/// A product's quantity after a committed inventory write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StockChangeMessage {
    pub product_id: ProductId,
    pub new_quantity: i64,
    pub timestamp: OffsetDateTime,
}

impl StockChangeMessage {
    pub fn now(product_id: ProductId, new_quantity: i64) -> Self {
        Self {
            product_id,
            new_quantity,
            timestamp: OffsetDateTime::now_utc(),
        }
    }
}

/// Wire form of a stock change, as pushed to subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StockUpdate {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub product_id: ProductId,
    pub stock: i64,
    pub in_stock: bool,
    pub timestamp: String,
}

impl From<&StockChangeMessage> for StockUpdate {
    fn from(message: &StockChangeMessage) -> Self {
        Self {
            kind: "stock_update",
            product_id: message.product_id,
            stock: message.new_quantity,
            in_stock: message.new_quantity > 0,
            timestamp: message
                .timestamp
                .format(&Rfc3339)
                .unwrap_or_else(|_| message.timestamp.unix_timestamp().to_string()),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum NotifyError {
    #[error("no subscribers for product {product_id}")]
    NoSubscribers { product_id: ProductId },
    #[error("stock notification transport failed: {0}")]
    Transport(String),
}

/// Sink for stock change messages.
///
/// Implementations must not block; the caller is a write request that has
/// already committed.
pub trait StockNotifier: Send + Sync {
    /// Returns how many subscribers the message reached.
    fn notify(&self, message: &StockChangeMessage) -> Result<usize, NotifyError>;
}

struct Hub {
    topics: DashMap<ProductId, broadcast::Sender<StockUpdate>>,
    global: broadcast::Sender<StockUpdate>,
    capacity: usize,
}

/// In-process topic map backed by `tokio::sync::broadcast` channels.
#[derive(Clone)]
pub struct StockBroadcaster {
    hub: Arc<Hub>,
}

impl StockBroadcaster {
    /// `capacity` bounds each topic's buffer; slow subscribers skip what they missed.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (global, _) = broadcast::channel(capacity);
        Self {
            hub: Arc::new(Hub {
                topics: DashMap::new(),
                global,
                capacity,
            }),
        }
    }

    /// Subscribe to one product's topic.
    pub fn subscribe(&self, product_id: ProductId) -> Subscription {
        let receiver = self
            .hub
            .topics
            .entry(product_id)
            .or_insert_with(|| broadcast::channel(self.hub.capacity).0)
            .subscribe();
        debug!(product_id, "Stock topic subscribed");
        Subscription {
            receiver,
            topic: Some(product_id),
            hub: self.hub.clone(),
        }
    }

    /// Subscribe to every product's updates.
    pub fn subscribe_all(&self) -> Subscription {
        Subscription {
            receiver: self.hub.global.subscribe(),
            topic: None,
            hub: self.hub.clone(),
        }
    }

    pub fn subscriber_count(&self, product_id: ProductId) -> usize {
        self.hub
            .topics
            .get(&product_id)
            .map(|sender| sender.receiver_count())
            .unwrap_or(0)
    }

    pub fn global_subscriber_count(&self) -> usize {
        self.hub.global.receiver_count()
    }

    /// Open subscriptions across product topics and the global topic.
    pub fn total_subscribers(&self) -> usize {
        let per_topic: usize = self
            .hub
            .topics
            .iter()
            .map(|entry| entry.value().receiver_count())
            .sum();
        per_topic + self.global_subscriber_count()
    }

    pub fn topic_count(&self) -> usize {
        self.hub.topics.len()
    }
}

impl Default for StockBroadcaster {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl StockNotifier for StockBroadcaster {
    fn notify(&self, message: &StockChangeMessage) -> Result<usize, NotifyError> {
        let update = StockUpdate::from(message);
        let topic_reach = self
            .hub
            .topics
            .get(&message.product_id)
            .and_then(|sender| sender.send(update.clone()).ok())
            .unwrap_or(0);
        let global_reach = self.hub.global.send(update).unwrap_or(0);

        match topic_reach + global_reach {
            0 => Err(NotifyError::NoSubscribers {
                product_id: message.product_id,
            }),
            reached => Ok(reached),
        }
    }
}

/// Live interest in a topic; dropping it revokes the interest.
pub struct Subscription {
    receiver: broadcast::Receiver<StockUpdate>,
    topic: Option<ProductId>,
    hub: Arc<Hub>,
}

impl Subscription {
    pub fn topic(&self) -> Option<ProductId> {
        self.topic
    }

    /// Next update, or `None` once the broadcaster is gone.
    ///
    /// Updates overwritten while this subscriber lagged are skipped.
    pub async fn recv(&mut self) -> Option<StockUpdate> {
        loop {
            match self.receiver.recv().await {
                Ok(update) => return Some(update),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!(topic = ?self.topic, skipped, "Stock subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(product_id) = self.topic {
            // This subscription's receiver is still alive here.
            self.hub
                .topics
                .remove_if(&product_id, |_, sender| sender.receiver_count() <= 1);
        }
    }
}

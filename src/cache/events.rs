//! Mutation events.
//!
//! Every committed write that is visible through a cached view produces one
//! [`InvalidationEvent`].

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use uuid::Uuid;

use crate::domain::entities::InventoryChange;
use crate::domain::types::{CategoryId, OrderId, ProductId};

/// Monotonic epoch for ordering events within this process.
pub type Epoch = u64;

/// Entity family touched by a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Product,
    Category,
    Order,
    Stock,
}

impl EntityKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EntityKind::Product => "product",
            EntityKind::Category => "category",
            EntityKind::Order => "order",
            EntityKind::Stock => "stock",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    /// A product row changed. `None` means any product may have changed.
    ProductChanged { product_id: Option<ProductId> },
    /// A category row changed.
    CategoryChanged { category_id: Option<CategoryId> },
    /// Inventory of one product changed; carries the post-write quantity.
    StockChanged(InventoryChange),
    /// An order moved stock on each of its lines.
    OrderChanged {
        order_id: OrderId,
        lines: Vec<InventoryChange>,
    },
}

impl EventKind {
    pub fn entity(&self) -> EntityKind {
        match self {
            EventKind::ProductChanged { .. } => EntityKind::Product,
            EventKind::CategoryChanged { .. } => EntityKind::Category,
            EventKind::StockChanged(_) => EntityKind::Stock,
            EventKind::OrderChanged { .. } => EntityKind::Order,
        }
    }

    pub fn entity_id(&self) -> Option<i64> {
        match self {
            EventKind::ProductChanged { product_id } => *product_id,
            EventKind::CategoryChanged { category_id } => *category_id,
            EventKind::StockChanged(change) => Some(change.product_id),
            EventKind::OrderChanged { order_id, .. } => Some(*order_id),
        }
    }
}

/// Event with idempotency and ordering support.
#[derive(Debug, Clone)]
pub struct InvalidationEvent {
    /// Unique identifier for idempotency (UUIDv4).
    pub id: Uuid,
    pub epoch: Epoch,
    pub kind: EventKind,
}

impl InvalidationEvent {
    pub fn new(kind: EventKind, epoch: Epoch) -> Self {
        Self {
            id: Uuid::new_v4(),
            epoch,
            kind,
        }
    }
}

/// Hands out epochs in strictly increasing order.
#[derive(Debug, Default)]
pub struct EpochClock {
    counter: AtomicU64,
}

impl EpochClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&self) -> Epoch {
        self.counter.fetch_add(1, Ordering::SeqCst)
    }

    pub fn stamp(&self, kind: EventKind) -> InvalidationEvent {
        InvalidationEvent::new(kind, self.next())
    }
}

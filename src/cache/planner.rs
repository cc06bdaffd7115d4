//! Invalidation plan generation.
//!
//! Maps mutation events onto the cache keys and key families they make stale.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::domain::entities::InventoryChange;
use crate::domain::types::ProductId;

use super::events::{EventKind, InvalidationEvent};
use super::keys::{View, ViewFamily, ViewKey, entity_key};

/// Keys to drop and stock messages to send for one event.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct InvalidationPlan {
    /// Individual keys to delete.
    pub keys: BTreeSet<ViewKey>,
    /// Families whose every registered key is deleted.
    pub families: BTreeSet<ViewFamily>,
    /// Latest post-write quantity per product, to be announced after deletion.
    pub notifications: BTreeMap<ProductId, i64>,
}

impl fmt::Display for InvalidationPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let families: Vec<&str> = self.families.iter().map(|family| family.name()).collect();
        write!(
            f,
            "InvalidationPlan {{ keys: {}, families: [{}], notifications: {} }}",
            self.keys.len(),
            families.join(","),
            self.notifications.len(),
        )
    }
}

impl InvalidationPlan {
    pub fn from_event(event: &InvalidationEvent) -> Self {
        let mut plan = Self::default();
        plan.apply(&event.kind);
        plan
    }

    fn apply(&mut self, kind: &EventKind) {
        match kind {
            EventKind::ProductChanged {
                product_id: Some(id),
            } => {
                self.keys.insert(entity_key(ViewFamily::ProductDetail, *id));
                self.keys.insert(entity_key(ViewFamily::ProductStock, *id));
                self.keys.insert(View::FeaturedProducts.key());
                self.families.insert(ViewFamily::ProductsList);
            }
            EventKind::ProductChanged { product_id: None } => {
                // Category product counts move with any product.
                self.keys.insert(View::FeaturedProducts.key());
                self.keys.insert(View::Categories.key());
                self.families.insert(ViewFamily::ProductDetail);
                self.families.insert(ViewFamily::ProductStock);
                self.families.insert(ViewFamily::ProductsList);
            }
            EventKind::CategoryChanged { .. } => {
                self.keys.insert(View::Categories.key());
                self.families.insert(ViewFamily::ProductsList);
            }
            EventKind::StockChanged(change) => self.apply_stock(change),
            EventKind::OrderChanged { lines, .. } => {
                for change in lines {
                    self.apply_stock(change);
                }
            }
        }
    }

    fn apply_stock(&mut self, change: &InventoryChange) {
        self.keys
            .insert(entity_key(ViewFamily::ProductDetail, change.product_id));
        self.keys
            .insert(entity_key(ViewFamily::ProductStock, change.product_id));
        self.families.insert(ViewFamily::ProductsList);
        self.notifications
            .insert(change.product_id, change.remaining);
    }

    /// Check if the plan has any actions to execute.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty() && self.families.is_empty() && self.notifications.is_empty()
    }
}

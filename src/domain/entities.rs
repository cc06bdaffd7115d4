//! Catalog records as served by the read views and returned by write paths.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::types::{
    CategoryId, CategoryStatus, OrderId, OrderStatus, ProductId, ProductStatus,
};

/// Threshold used when a product has no explicit minimum stock level.
pub const DEFAULT_MIN_STOCK_LEVEL: i64 = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductSummary {
    pub id: ProductId,
    pub category_id: Option<CategoryId>,
    pub category_name: Option<String>,
    pub name: String,
    pub brand: Option<String>,
    pub price: f64,
    pub discount_price: Option<f64>,
    pub is_featured: bool,
    pub stock_quantity: i64,
    pub in_stock: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl ProductSummary {
    /// Price the customer pays.
    pub fn effective_price(&self) -> f64 {
        self.discount_price.unwrap_or(self.price)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductDetail {
    #[serde(flatten)]
    pub product: ProductSummary,
    pub description: Option<String>,
    pub status: ProductStatus,
    pub min_stock_level: i64,
    pub low_stock: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
    pub description: Option<String>,
    pub sort_order: i32,
    pub product_count: i64,
}

/// Availability of one product, computed from quantity minus reservations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockLevel {
    pub product_id: ProductId,
    pub stock: i64,
    pub in_stock: bool,
    pub low_stock: bool,
    pub out_of_stock: bool,
    pub min_stock_level: i64,
}

impl StockLevel {
    pub fn from_inventory(
        product_id: ProductId,
        quantity: i64,
        reserved: i64,
        min_stock_level: Option<i64>,
    ) -> Self {
        let available = quantity - reserved;
        let min_stock_level = min_stock_level.unwrap_or(DEFAULT_MIN_STOCK_LEVEL);
        Self {
            product_id,
            stock: available.max(0),
            in_stock: available > 0,
            low_stock: available > 0 && available <= min_stock_level,
            out_of_stock: available <= 0,
            min_stock_level,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductPage {
    pub products: Vec<ProductSummary>,
    pub page: u32,
    pub per_page: u32,
    pub total: u64,
    pub total_pages: u64,
}

/// Partial product update; `None` leaves a column untouched.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ProductUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub price: Option<f64>,
    pub discount_price: Option<f64>,
    pub is_featured: Option<bool>,
    pub status: Option<ProductStatus>,
    pub category_id: Option<CategoryId>,
}

impl ProductUpdate {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct CategoryUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub sort_order: Option<i32>,
    pub status: Option<CategoryStatus>,
}

impl CategoryUpdate {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct OrderLineRequest {
    pub product_id: ProductId,
    pub quantity: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NewOrder {
    pub customer_id: i64,
    pub lines: Vec<OrderLineRequest>,
}

impl NewOrder {
    /// Sum quantities per product, keeping first-seen order. `None` when a
    /// product's total does not fit in an `i64`.
    pub fn merged_lines(&self) -> Option<Vec<(ProductId, i64)>> {
        let mut merged: Vec<(ProductId, i64)> = Vec::new();
        for line in &self.lines {
            match merged.iter_mut().find(|(id, _)| *id == line.product_id) {
                Some((_, quantity)) => *quantity = quantity.checked_add(line.quantity)?,
                None => merged.push((line.product_id, line.quantity)),
            }
        }
        Some(merged)
    }
}

/// Post-write quantity of one product touched by an inventory mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InventoryChange {
    pub product_id: ProductId,
    pub remaining: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlacedOrder {
    pub order_id: OrderId,
    pub status: OrderStatus,
    pub total: f64,
    pub inventory: Vec<InventoryChange>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderStatusChange {
    pub order_id: OrderId,
    pub previous: OrderStatus,
    pub status: OrderStatus,
    /// Quantities after restocking; empty when the transition moves no stock.
    pub inventory: Vec<InventoryChange>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stock_level_subtracts_reservations() {
        let level = StockLevel::from_inventory(42, 12, 2, Some(5));
        assert_eq!(level.stock, 10);
        assert!(level.in_stock);
        assert!(!level.low_stock);
        assert!(!level.out_of_stock);
    }

    #[test]
    fn stock_level_defaults_min_level_and_flags_low_stock() {
        let level = StockLevel::from_inventory(7, 4, 0, None);
        assert_eq!(level.min_stock_level, DEFAULT_MIN_STOCK_LEVEL);
        assert!(level.low_stock);
    }

    #[test]
    fn over_reserved_stock_clamps_to_zero() {
        let level = StockLevel::from_inventory(7, 1, 3, None);
        assert_eq!(level.stock, 0);
        assert!(level.out_of_stock);
        assert!(!level.in_stock);
        assert!(!level.low_stock);
    }

    #[test]
    fn duplicate_order_lines_are_summed() {
        let order = NewOrder {
            customer_id: 1,
            lines: vec![
                OrderLineRequest {
                    product_id: 7,
                    quantity: 2,
                },
                OrderLineRequest {
                    product_id: 42,
                    quantity: 1,
                },
                OrderLineRequest {
                    product_id: 7,
                    quantity: 3,
                },
            ],
        };
        assert_eq!(order.merged_lines(), Some(vec![(7, 5), (42, 1)]));
    }

    #[test]
    fn overflowing_order_lines_do_not_merge() {
        let order = NewOrder {
            customer_id: 1,
            lines: vec![
                OrderLineRequest {
                    product_id: 42,
                    quantity: i64::MAX,
                },
                OrderLineRequest {
                    product_id: 42,
                    quantity: i64::MAX,
                },
            ],
        };
        assert_eq!(order.merged_lines(), None);
    }

    #[test]
    fn empty_updates_are_detected() {
        assert!(ProductUpdate::default().is_empty());
        assert!(
            !ProductUpdate {
                is_featured: Some(true),
                ..Default::default()
            }
            .is_empty()
        );
        assert!(CategoryUpdate::default().is_empty());
    }
}

//! Repository traits describing persistence adapters.
//!
//! Reads are the loaders behind the cached views; writes are the mutations
//! whose commits drive invalidation.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::entities::{
    Category, CategoryUpdate, InventoryChange, NewOrder, OrderStatusChange, PlacedOrder,
    ProductDetail, ProductPage, ProductSummary, ProductUpdate, StockLevel,
};
use crate::domain::listing::ListQuery;
use crate::domain::types::{CategoryId, OrderId, OrderStatus, ProductId};

/// Number of products shown on the featured shelf.
pub const FEATURED_LIMIT: u32 = 8;

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("{entity} `{id}` not found")]
    NotFound { entity: &'static str, id: i64 },
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error(
        "insufficient stock for product {product_id}: requested {requested}, available {available}"
    )]
    InsufficientStock {
        product_id: ProductId,
        requested: i64,
        available: i64,
    },
    #[error("database timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }

    pub fn not_found(entity: &'static str, id: i64) -> Self {
        Self::NotFound { entity, id }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }
}

/// Read side of the catalog. Every method is a loader for one view family.
#[async_trait]
pub trait CatalogRepo: Send + Sync {
    /// Active featured products in active categories, newest first.
    async fn featured_products(&self, limit: u32) -> Result<Vec<ProductSummary>, RepoError>;

    /// Active categories by sort order, with their active product counts.
    async fn categories(&self) -> Result<Vec<Category>, RepoError>;

    /// `None` when the product does not exist or is not active.
    async fn product_detail(&self, id: ProductId) -> Result<Option<ProductDetail>, RepoError>;

    async fn list_products(&self, query: &ListQuery) -> Result<ProductPage, RepoError>;

    /// `None` when the product has no inventory row.
    async fn stock_level(&self, id: ProductId) -> Result<Option<StockLevel>, RepoError>;
}

/// Write side of the catalog. Each call commits before returning.
#[async_trait]
pub trait CatalogWriteRepo: Send + Sync {
    async fn update_product(
        &self,
        id: ProductId,
        update: &ProductUpdate,
    ) -> Result<ProductDetail, RepoError>;

    /// Soft delete: the row stays with status `deleted`.
    async fn delete_product(&self, id: ProductId) -> Result<(), RepoError>;

    async fn update_category(
        &self,
        id: CategoryId,
        update: &CategoryUpdate,
    ) -> Result<Category, RepoError>;

    /// Overwrite the on-hand quantity of a product.
    async fn set_stock(&self, id: ProductId, quantity: i64) -> Result<InventoryChange, RepoError>;

    /// Create the order and decrement stock for every line, or change nothing.
    async fn place_order(&self, order: &NewOrder) -> Result<PlacedOrder, RepoError>;

    /// Move an order to `status`; cancelling restocks every line.
    async fn update_order_status(
        &self,
        id: OrderId,
        status: OrderStatus,
    ) -> Result<OrderStatusChange, RepoError>;
}

//! Catalog writes and checkout.
//!
//! Every successful write is followed by exactly one call into the
//! [`InvalidationRouter`], after the repository has committed. Rejected or
//! failed writes emit nothing.

use std::sync::Arc;

use thiserror::Error;
use tracing::{info, instrument};

use crate::application::repos::{CatalogWriteRepo, RepoError};
use crate::cache::{InvalidationReport, InvalidationRouter};
use crate::domain::entities::{
    Category, CategoryUpdate, InventoryChange, NewOrder, OrderStatusChange, PlacedOrder,
    ProductDetail, ProductUpdate,
};
use crate::domain::error::DomainError;
use crate::domain::types::{CategoryId, OrderId, OrderStatus, ProductId};

#[derive(Debug, Error)]
pub enum InventoryError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Repo(RepoError),
}

impl From<RepoError> for InventoryError {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::NotFound { entity, id } => Self::Domain(DomainError::not_found(entity, id)),
            RepoError::InvalidInput { message } => Self::Domain(DomainError::validation(message)),
            RepoError::InsufficientStock {
                product_id,
                requested,
                available,
            } => Self::Domain(DomainError::InsufficientStock {
                product_id,
                requested,
                available,
            }),
            other => Self::Repo(other),
        }
    }
}

/// A committed write and the invalidation it triggered.
#[derive(Debug, Clone)]
pub struct Applied<T> {
    pub data: T,
    pub invalidation: InvalidationReport,
}

#[derive(Clone)]
pub struct InventoryService {
    writer: Arc<dyn CatalogWriteRepo>,
    router: Arc<InvalidationRouter>,
}

impl InventoryService {
    pub fn new(writer: Arc<dyn CatalogWriteRepo>, router: Arc<InvalidationRouter>) -> Self {
        Self { writer, router }
    }

    #[instrument(skip(self, update))]
    pub async fn update_product(
        &self,
        id: ProductId,
        update: ProductUpdate,
    ) -> Result<Applied<ProductDetail>, InventoryError> {
        validate_product_update(&update)?;
        let detail = self.writer.update_product(id, &update).await?;
        let invalidation = self.router.product_changed(id).await;
        Ok(Applied {
            data: detail,
            invalidation,
        })
    }

    #[instrument(skip(self))]
    pub async fn delete_product(&self, id: ProductId) -> Result<Applied<()>, InventoryError> {
        self.writer.delete_product(id).await?;
        let invalidation = self.router.product_changed(id).await;
        info!(product_id = id, "Product soft-deleted");
        Ok(Applied {
            data: (),
            invalidation,
        })
    }

    /// Operator flush of the product-derived views. Nothing is written.
    #[instrument(skip(self))]
    pub async fn clear_product_views(&self) -> Applied<()> {
        let invalidation = self.router.sweep_products().await;
        info!(deleted = invalidation.deleted, "Product views cleared");
        Applied {
            data: (),
            invalidation,
        }
    }

    #[instrument(skip(self, update))]
    pub async fn update_category(
        &self,
        id: CategoryId,
        update: CategoryUpdate,
    ) -> Result<Applied<Category>, InventoryError> {
        if update.is_empty() {
            return Err(DomainError::validation("no category fields to update").into());
        }
        if let Some(name) = &update.name
            && name.trim().is_empty()
        {
            return Err(DomainError::validation("category name must not be blank").into());
        }
        let category = self.writer.update_category(id, &update).await?;
        let invalidation = self.router.category_changed(id).await;
        Ok(Applied {
            data: category,
            invalidation,
        })
    }

    #[instrument(skip(self))]
    pub async fn set_stock(
        &self,
        id: ProductId,
        quantity: i64,
    ) -> Result<Applied<InventoryChange>, InventoryError> {
        if quantity < 0 {
            return Err(DomainError::validation("stock quantity must not be negative").into());
        }
        let change = self.writer.set_stock(id, quantity).await?;
        let invalidation = self.router.stock_changed(change).await;
        Ok(Applied {
            data: change,
            invalidation,
        })
    }

    #[instrument(skip(self, order), fields(lines = order.lines.len()))]
    pub async fn place_order(
        &self,
        order: NewOrder,
    ) -> Result<Applied<PlacedOrder>, InventoryError> {
        validate_order(&order)?;
        let placed = self.writer.place_order(&order).await?;
        let invalidation = self
            .router
            .order_changed(placed.order_id, placed.inventory.clone())
            .await;
        info!(order_id = placed.order_id, total = placed.total, "Order placed");
        Ok(Applied {
            data: placed,
            invalidation,
        })
    }

    #[instrument(skip(self))]
    pub async fn update_order_status(
        &self,
        id: OrderId,
        status: OrderStatus,
    ) -> Result<Applied<OrderStatusChange>, InventoryError> {
        let change = self.writer.update_order_status(id, status).await?;
        let invalidation = self
            .router
            .order_changed(change.order_id, change.inventory.clone())
            .await;
        Ok(Applied {
            data: change,
            invalidation,
        })
    }
}

fn validate_product_update(update: &ProductUpdate) -> Result<(), DomainError> {
    if update.is_empty() {
        return Err(DomainError::validation("no product fields to update"));
    }
    if let Some(name) = &update.name
        && name.trim().is_empty()
    {
        return Err(DomainError::validation("product name must not be blank"));
    }
    if let Some(price) = update.price
        && !(price.is_finite() && price > 0.0)
    {
        return Err(DomainError::validation("price must be positive"));
    }
    if let Some(discount) = update.discount_price
        && !(discount.is_finite() && discount >= 0.0)
    {
        return Err(DomainError::validation("discount price must not be negative"));
    }
    if let (Some(price), Some(discount)) = (update.price, update.discount_price)
        && discount > price
    {
        return Err(DomainError::validation("discount price must not exceed price"));
    }
    Ok(())
}

fn validate_order(order: &NewOrder) -> Result<(), DomainError> {
    if order.lines.is_empty() {
        return Err(DomainError::validation("order has no lines"));
    }
    if let Some(line) = order.lines.iter().find(|line| line.quantity <= 0) {
        return Err(DomainError::validation(format!(
            "quantity for product {} must be positive",
            line.product_id
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::repos::CatalogRepo;
    use crate::cache::{CacheConfig, KeyCache, KeyRegistry, MemoryBackend, StockBroadcaster};
    use crate::domain::entities::OrderLineRequest;
    use crate::infra::memory::InMemoryCatalog;

    fn service(catalog: Arc<InMemoryCatalog>) -> (InventoryService, StockBroadcaster) {
        let config = CacheConfig::default();
        let backend = Arc::new(MemoryBackend::new(config.memory_capacity_non_zero()));
        let cache = Arc::new(KeyCache::new(backend, &config));
        let broadcaster = StockBroadcaster::default();
        let router = Arc::new(InvalidationRouter::new(
            cache,
            Arc::new(KeyRegistry::new()),
            Arc::new(broadcaster.clone()),
        ));
        (InventoryService::new(catalog, router), broadcaster)
    }

    #[tokio::test]
    async fn each_write_triggers_one_invalidation() {
        let catalog = Arc::new(InMemoryCatalog::seeded());
        let (service, _) = service(catalog);

        let first = service.set_stock(42, 7).await.expect("stock set");
        let second = service
            .update_product(
                42,
                ProductUpdate {
                    is_featured: Some(false),
                    ..Default::default()
                },
            )
            .await
            .expect("product updated");

        assert_eq!(first.invalidation.epoch + 1, second.invalidation.epoch);
        assert_eq!(first.data.remaining, 7);
    }

    #[tokio::test]
    async fn rejected_writes_emit_nothing() {
        let catalog = Arc::new(InMemoryCatalog::seeded());
        let (service, _) = service(catalog);

        let err = service.set_stock(42, -1).await.expect_err("negative stock");
        assert!(matches!(err, InventoryError::Domain(DomainError::Validation { .. })));

        let err = service
            .update_product(9_999, ProductUpdate {
                price: Some(10.0),
                ..Default::default()
            })
            .await
            .expect_err("missing product");
        assert!(matches!(err, InventoryError::Domain(DomainError::NotFound { .. })));

        let applied = service.set_stock(42, 3).await.expect("stock set");
        assert_eq!(applied.invalidation.epoch, 0);
    }

    #[tokio::test]
    async fn insufficient_stock_leaves_inventory_untouched() {
        let catalog = Arc::new(InMemoryCatalog::seeded());
        let (service, _) = service(catalog.clone());

        let err = service
            .place_order(NewOrder {
                customer_id: 1,
                lines: vec![OrderLineRequest {
                    product_id: 42,
                    quantity: 1_000,
                }],
            })
            .await
            .expect_err("insufficient stock");

        assert!(matches!(
            err,
            InventoryError::Domain(DomainError::InsufficientStock { product_id: 42, .. })
        ));
        let level = catalog.stock_level(42).await.expect("query").expect("row");
        assert_eq!(level.stock, 12);
    }

    #[tokio::test]
    async fn overflowing_duplicate_lines_are_rejected() {
        let catalog = Arc::new(InMemoryCatalog::seeded());
        let (service, _) = service(catalog.clone());

        let line = OrderLineRequest {
            product_id: 42,
            quantity: i64::MAX,
        };
        let err = service
            .place_order(NewOrder {
                customer_id: 1,
                lines: vec![line.clone(), line],
            })
            .await
            .expect_err("overflowing order");

        assert!(matches!(err, InventoryError::Domain(DomainError::Validation { .. })));
        let level = catalog.stock_level(42).await.expect("query").expect("row");
        assert_eq!(level.stock, 12);
        let applied = service.set_stock(42, 5).await.expect("stock set");
        assert_eq!(applied.invalidation.epoch, 0);
    }

    #[tokio::test]
    async fn placing_and_cancelling_an_order_notifies_subscribers() {
        let catalog = Arc::new(InMemoryCatalog::seeded());
        let (service, broadcaster) = service(catalog);
        let mut subscription = broadcaster.subscribe(42);

        let placed = service
            .place_order(NewOrder {
                customer_id: 1,
                lines: vec![OrderLineRequest {
                    product_id: 42,
                    quantity: 2,
                }],
            })
            .await
            .expect("order placed");
        assert_eq!(placed.invalidation.notified, 1);
        let update = subscription.recv().await.expect("stock update");
        assert_eq!(update.stock, 10);

        let cancelled = service
            .update_order_status(placed.data.order_id, OrderStatus::Cancelled)
            .await
            .expect("order cancelled");
        assert_eq!(cancelled.data.previous, OrderStatus::Pending);
        let update = subscription.recv().await.expect("restock update");
        assert_eq!(update.stock, 12);
    }

    #[test]
    fn discount_above_price_is_rejected() {
        let update = ProductUpdate {
            price: Some(10.0),
            discount_price: Some(12.0),
            ..Default::default()
        };
        assert!(validate_product_update(&update).is_err());
    }
}

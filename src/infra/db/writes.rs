use async_trait::async_trait;
use sqlx::{MySql, QueryBuilder, Transaction};

use crate::application::repos::{CatalogWriteRepo, RepoError};
use crate::domain::entities::{
    Category, CategoryUpdate, InventoryChange, NewOrder, OrderStatusChange, PlacedOrder,
    ProductDetail, ProductUpdate,
};
use crate::domain::types::{CategoryId, OrderId, OrderStatus, ProductId, ProductStatus};

use super::MySqlCatalog;
use super::rows::{
    CATEGORY_SELECT, CategoryRow, INVENTORY_SELECT, InventoryRow, PRODUCT_SELECT, ProductRow,
};
use super::util::map_sqlx_error;

impl MySqlCatalog {
    async fn lock_product(
        tx: &mut Transaction<'_, MySql>,
        id: ProductId,
    ) -> Result<ProductRow, RepoError> {
        let sql = format!("{PRODUCT_SELECT} WHERE p.product_id = ? FOR UPDATE");
        let row = sqlx::query_as::<_, ProductRow>(&sql)
            .bind(id)
            .fetch_optional(&mut **tx)
            .await
            .map_err(map_sqlx_error)?
            .ok_or_else(|| RepoError::not_found("product", id))?;

        if row.status()? == ProductStatus::Deleted {
            return Err(RepoError::not_found("product", id));
        }
        Ok(row)
    }

    async fn remaining(
        tx: &mut Transaction<'_, MySql>,
        id: ProductId,
    ) -> Result<InventoryChange, RepoError> {
        let row = sqlx::query_as::<_, InventoryRow>(INVENTORY_SELECT)
            .bind(id)
            .fetch_optional(&mut **tx)
            .await
            .map_err(map_sqlx_error)?;

        Ok(InventoryChange {
            product_id: id,
            remaining: row.as_ref().map(InventoryRow::available).unwrap_or(0),
        })
    }

    async fn load_detail(
        tx: &mut Transaction<'_, MySql>,
        id: ProductId,
    ) -> Result<ProductDetail, RepoError> {
        let sql = format!("{PRODUCT_SELECT} WHERE p.product_id = ?");
        sqlx::query_as::<_, ProductRow>(&sql)
            .bind(id)
            .fetch_optional(&mut **tx)
            .await
            .map_err(map_sqlx_error)?
            .ok_or_else(|| RepoError::not_found("product", id))?
            .into_detail()
    }
}

#[async_trait]
impl CatalogWriteRepo for MySqlCatalog {
    async fn update_product(
        &self,
        id: ProductId,
        update: &ProductUpdate,
    ) -> Result<ProductDetail, RepoError> {
        let mut tx = self.begin().await.map_err(map_sqlx_error)?;
        Self::lock_product(&mut tx, id).await?;

        let mut qb =
            QueryBuilder::<MySql>::new("UPDATE products SET updated_at = UTC_TIMESTAMP()");
        if let Some(name) = &update.name {
            qb.push(", product_name = ");
            qb.push_bind(name.trim().to_string());
        }
        if let Some(description) = &update.description {
            qb.push(", description = ");
            qb.push_bind(description.clone());
        }
        if let Some(price) = update.price {
            qb.push(", price = ");
            qb.push_bind(price);
        }
        if let Some(discount_price) = update.discount_price {
            qb.push(", discount_price = ");
            qb.push_bind(discount_price);
        }
        if let Some(is_featured) = update.is_featured {
            qb.push(", is_featured = ");
            qb.push_bind(is_featured);
        }
        if let Some(status) = update.status {
            qb.push(", status = ");
            qb.push_bind(status.as_str());
        }
        if let Some(category_id) = update.category_id {
            qb.push(", category_id = ");
            qb.push_bind(category_id);
        }
        qb.push(" WHERE product_id = ");
        qb.push_bind(id);

        qb.build()
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

        // Read back before commit so a failed reload rolls the write back.
        let detail = Self::load_detail(&mut tx, id).await?;
        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(detail)
    }

    async fn delete_product(&self, id: ProductId) -> Result<(), RepoError> {
        let result = sqlx::query(
            "UPDATE products SET status = 'deleted', updated_at = UTC_TIMESTAMP() \
             WHERE product_id = ? AND status <> 'deleted'",
        )
        .bind(id)
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(RepoError::not_found("product", id));
        }
        Ok(())
    }

    async fn update_category(
        &self,
        id: CategoryId,
        update: &CategoryUpdate,
    ) -> Result<Category, RepoError> {
        let mut qb =
            QueryBuilder::<MySql>::new("UPDATE categories SET updated_at = UTC_TIMESTAMP()");
        if let Some(name) = &update.name {
            qb.push(", category_name = ");
            qb.push_bind(name.trim().to_string());
        }
        if let Some(description) = &update.description {
            qb.push(", description = ");
            qb.push_bind(description.clone());
        }
        if let Some(sort_order) = update.sort_order {
            qb.push(", sort_order = ");
            qb.push_bind(sort_order);
        }
        if let Some(status) = update.status {
            qb.push(", status = ");
            qb.push_bind(status.as_str());
        }
        qb.push(" WHERE category_id = ");
        qb.push_bind(id);

        qb.build()
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        let sql = format!("{CATEGORY_SELECT} WHERE c.category_id = ?");
        sqlx::query_as::<_, CategoryRow>(&sql)
            .bind(id)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?
            .map(Category::from)
            .ok_or_else(|| RepoError::not_found("category", id))
    }

    async fn set_stock(&self, id: ProductId, quantity: i64) -> Result<InventoryChange, RepoError> {
        let mut tx = self.begin().await.map_err(map_sqlx_error)?;
        Self::lock_product(&mut tx, id).await?;

        sqlx::query(
            "INSERT INTO inventory (product_id, quantity) VALUES (?, ?) \
             ON DUPLICATE KEY UPDATE quantity = VALUES(quantity), updated_at = UTC_TIMESTAMP()",
        )
        .bind(id)
        .bind(quantity)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        let change = Self::remaining(&mut tx, id).await?;
        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(change)
    }

    async fn place_order(&self, order: &NewOrder) -> Result<PlacedOrder, RepoError> {
        let requested = order
            .merged_lines()
            .ok_or_else(|| RepoError::invalid("order quantity overflows"))?;

        let mut tx = self.begin().await.map_err(map_sqlx_error)?;

        let mut priced = Vec::with_capacity(requested.len());
        let mut total = 0.0;
        for (product_id, quantity) in &requested {
            let product = Self::lock_product(&mut tx, *product_id).await?;
            if product.status()? != ProductStatus::Active {
                return Err(RepoError::not_found("product", *product_id));
            }
            if product.available() < *quantity {
                return Err(RepoError::InsufficientStock {
                    product_id: *product_id,
                    requested: *quantity,
                    available: product.available(),
                });
            }
            let unit_price = product.effective_price();
            total += unit_price * (*quantity as f64);
            priced.push((*product_id, *quantity, unit_price));
        }
        let total = (total * 100.0).round() / 100.0;

        let inserted = sqlx::query(
            "INSERT INTO orders (user_id, status, total_amount, created_at) \
             VALUES (?, ?, ?, UTC_TIMESTAMP())",
        )
        .bind(order.customer_id)
        .bind(OrderStatus::Pending.as_str())
        .bind(total)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;
        let order_id = OrderId::try_from(inserted.last_insert_id())
            .map_err(|_| RepoError::from_persistence("order id exceeds supported range"))?;

        let mut inventory = Vec::with_capacity(priced.len());
        for (product_id, quantity, unit_price) in priced {
            sqlx::query(
                "INSERT INTO order_items (order_id, product_id, quantity, unit_price, total_price) \
                 VALUES (?, ?, ?, ?, ?)",
            )
            .bind(order_id)
            .bind(product_id)
            .bind(quantity)
            .bind(unit_price)
            .bind(unit_price * quantity as f64)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

            sqlx::query(
                "UPDATE inventory SET quantity = quantity - ?, updated_at = UTC_TIMESTAMP() \
                 WHERE product_id = ?",
            )
            .bind(quantity)
            .bind(product_id)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

            inventory.push(Self::remaining(&mut tx, product_id).await?);
        }

        tx.commit().await.map_err(map_sqlx_error)?;

        Ok(PlacedOrder {
            order_id,
            status: OrderStatus::Pending,
            total,
            inventory,
        })
    }

    async fn update_order_status(
        &self,
        id: OrderId,
        status: OrderStatus,
    ) -> Result<OrderStatusChange, RepoError> {
        let mut tx = self.begin().await.map_err(map_sqlx_error)?;

        let current = sqlx::query_scalar::<_, String>(
            "SELECT status FROM orders WHERE order_id = ? FOR UPDATE",
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(map_sqlx_error)?
        .ok_or_else(|| RepoError::not_found("order", id))?;
        let previous: OrderStatus = current.parse().map_err(|_| {
            RepoError::from_persistence(format!("unknown order status `{current}`"))
        })?;

        if matches!(previous, OrderStatus::Cancelled | OrderStatus::Delivered) {
            return Err(RepoError::invalid(format!("order {id} is already {previous}")));
        }

        let mut inventory = Vec::new();
        if previous.restocks_on(status) {
            let lines: Vec<(ProductId, i64)> = sqlx::query_as(
                "SELECT product_id, CAST(quantity AS SIGNED) FROM order_items WHERE order_id = ?",
            )
            .bind(id)
            .fetch_all(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

            for (product_id, quantity) in lines {
                sqlx::query(
                    "UPDATE inventory SET quantity = quantity + ?, updated_at = UTC_TIMESTAMP() \
                     WHERE product_id = ?",
                )
                .bind(quantity)
                .bind(product_id)
                .execute(&mut *tx)
                .await
                .map_err(map_sqlx_error)?;

                match inventory
                    .iter()
                    .position(|change: &InventoryChange| change.product_id == product_id)
                {
                    Some(index) => inventory[index] = Self::remaining(&mut tx, product_id).await?,
                    None => inventory.push(Self::remaining(&mut tx, product_id).await?),
                }
            }
        }

        sqlx::query("UPDATE orders SET status = ?, updated_at = UTC_TIMESTAMP() WHERE order_id = ?")
            .bind(status.as_str())
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

        tx.commit().await.map_err(map_sqlx_error)?;

        Ok(OrderStatusChange {
            order_id: id,
            previous,
            status,
            inventory,
        })
    }
}

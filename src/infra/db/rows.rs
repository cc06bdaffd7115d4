use time::PrimitiveDateTime;

use crate::application::repos::RepoError;
use crate::domain::entities::{Category, ProductDetail, ProductSummary, StockLevel};
use crate::domain::types::{CategoryId, ProductId, ProductStatus};

/// Product columns joined with category and inventory. Integer inventory
/// columns are widened to BIGINT so they decode as `i64`.
pub(super) const PRODUCT_SELECT: &str = "\
    SELECT p.product_id AS id, p.category_id, c.category_name, p.product_name AS name, \
           p.brand, p.description, \
           CAST(p.price AS DOUBLE) AS price, \
           CAST(p.discount_price AS DOUBLE) AS discount_price, \
           p.is_featured, p.status, p.created_at, \
           CAST(COALESCE(i.quantity, 0) AS SIGNED) AS quantity, \
           CAST(COALESCE(i.reserved_quantity, 0) AS SIGNED) AS reserved, \
           CAST(i.min_stock_level AS SIGNED) AS min_stock_level \
    FROM products p \
    LEFT JOIN categories c ON c.category_id = p.category_id \
    LEFT JOIN inventory i ON i.product_id = p.product_id ";

/// Storefront visibility: active product in an active (or no) category.
pub(super) const VISIBLE: &str =
    "p.status = 'active' AND (c.status = 'active' OR c.status IS NULL)";

pub(super) const AVAILABLE_EXPR: &str =
    "(COALESCE(i.quantity, 0) - COALESCE(i.reserved_quantity, 0))";

#[derive(Debug, sqlx::FromRow)]
pub(super) struct ProductRow {
    pub id: ProductId,
    pub category_id: Option<CategoryId>,
    pub category_name: Option<String>,
    pub name: String,
    pub brand: Option<String>,
    pub description: Option<String>,
    pub price: f64,
    pub discount_price: Option<f64>,
    pub is_featured: bool,
    pub status: String,
    pub created_at: PrimitiveDateTime,
    pub quantity: i64,
    pub reserved: i64,
    pub min_stock_level: Option<i64>,
}

impl ProductRow {
    pub fn stock_level(&self) -> StockLevel {
        StockLevel::from_inventory(self.id, self.quantity, self.reserved, self.min_stock_level)
    }

    pub fn available(&self) -> i64 {
        (self.quantity - self.reserved).max(0)
    }

    pub fn effective_price(&self) -> f64 {
        self.discount_price.unwrap_or(self.price)
    }

    pub fn status(&self) -> Result<ProductStatus, RepoError> {
        self.status.parse().map_err(|_| {
            RepoError::from_persistence(format!("unknown product status `{}`", self.status))
        })
    }

    pub fn into_summary(self) -> ProductSummary {
        let available = self.available();
        ProductSummary {
            id: self.id,
            category_id: self.category_id,
            category_name: self.category_name,
            name: self.name,
            brand: self.brand,
            price: self.price,
            discount_price: self.discount_price,
            is_featured: self.is_featured,
            stock_quantity: available,
            in_stock: available > 0,
            created_at: self.created_at.assume_utc(),
        }
    }

    pub fn into_detail(self) -> Result<ProductDetail, RepoError> {
        let status = self.status()?;
        let level = self.stock_level();
        let description = self.description.clone();
        Ok(ProductDetail {
            product: self.into_summary(),
            description,
            status,
            min_stock_level: level.min_stock_level,
            low_stock: level.low_stock,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(super) struct CategoryRow {
    pub id: CategoryId,
    pub name: String,
    pub description: Option<String>,
    pub sort_order: i32,
    pub product_count: i64,
}

impl From<CategoryRow> for Category {
    fn from(row: CategoryRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            description: row.description,
            sort_order: row.sort_order,
            product_count: row.product_count,
        }
    }
}

pub(super) const CATEGORY_SELECT: &str = "\
    SELECT c.category_id AS id, c.category_name AS name, c.description, c.sort_order, \
           (SELECT COUNT(*) FROM products p \
             WHERE p.category_id = c.category_id AND p.status = 'active') AS product_count \
    FROM categories c ";

#[derive(Debug, sqlx::FromRow)]
pub(super) struct InventoryRow {
    pub quantity: i64,
    pub reserved: i64,
}

impl InventoryRow {
    pub fn available(&self) -> i64 {
        (self.quantity - self.reserved).max(0)
    }
}

pub(super) const INVENTORY_SELECT: &str = "\
    SELECT CAST(quantity AS SIGNED) AS quantity, \
           CAST(reserved_quantity AS SIGNED) AS reserved \
    FROM inventory WHERE product_id = ?";

//! In-process catalog store.
//!
//! Serves when no database URL is configured and backs the test suites. It
//! counts every read so callers can observe whether a view came from the
//! cache or from the store.

use std::cmp::Ordering as CmpOrdering;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use time::OffsetDateTime;
use time::macros::datetime;
use tokio::sync::RwLock;

use crate::application::repos::{CatalogRepo, CatalogWriteRepo, RepoError};
use crate::domain::entities::{
    Category, CategoryUpdate, InventoryChange, NewOrder, OrderStatusChange, PlacedOrder,
    ProductDetail, ProductPage, ProductSummary, ProductUpdate, StockLevel,
};
use crate::domain::listing::{ListQuery, SortField, SortOrder};
use crate::domain::types::{
    CategoryId, CategoryStatus, OrderId, OrderStatus, ProductId, ProductStatus,
};

#[derive(Debug, Clone)]
pub struct CategoryRecord {
    pub id: CategoryId,
    pub name: String,
    pub description: Option<String>,
    pub sort_order: i32,
    pub status: CategoryStatus,
}

impl CategoryRecord {
    pub fn new(id: CategoryId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            description: None,
            sort_order: 0,
            status: CategoryStatus::Active,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProductRecord {
    pub id: ProductId,
    pub category_id: Option<CategoryId>,
    pub name: String,
    pub brand: Option<String>,
    pub description: Option<String>,
    pub price: f64,
    pub discount_price: Option<f64>,
    pub is_featured: bool,
    pub status: ProductStatus,
    pub quantity: i64,
    pub reserved: i64,
    pub min_stock_level: Option<i64>,
    pub created_at: OffsetDateTime,
}

impl ProductRecord {
    pub fn new(id: ProductId, name: impl Into<String>, price: f64) -> Self {
        Self {
            id,
            category_id: None,
            name: name.into(),
            brand: None,
            description: None,
            price,
            discount_price: None,
            is_featured: false,
            status: ProductStatus::Active,
            quantity: 0,
            reserved: 0,
            min_stock_level: None,
            created_at: OffsetDateTime::UNIX_EPOCH,
        }
    }

    fn available(&self) -> i64 {
        (self.quantity - self.reserved).max(0)
    }

    fn stock_level(&self) -> StockLevel {
        StockLevel::from_inventory(self.id, self.quantity, self.reserved, self.min_stock_level)
    }

    fn effective_price(&self) -> f64 {
        self.discount_price.unwrap_or(self.price)
    }
}

#[derive(Debug, Clone)]
struct OrderRecord {
    status: OrderStatus,
    lines: Vec<(ProductId, i64)>,
}

#[derive(Debug, Default)]
struct CatalogState {
    categories: BTreeMap<CategoryId, CategoryRecord>,
    products: BTreeMap<ProductId, ProductRecord>,
    orders: BTreeMap<OrderId, OrderRecord>,
    next_order_id: OrderId,
}

impl CatalogState {
    fn category_active(&self, id: Option<CategoryId>) -> bool {
        match id {
            None => true,
            Some(id) => self
                .categories
                .get(&id)
                .is_some_and(|category| category.status == CategoryStatus::Active),
        }
    }

    fn visible(&self, product: &ProductRecord) -> bool {
        product.status == ProductStatus::Active && self.category_active(product.category_id)
    }

    fn summary(&self, product: &ProductRecord) -> ProductSummary {
        let available = product.available();
        ProductSummary {
            id: product.id,
            category_id: product.category_id,
            category_name: product
                .category_id
                .and_then(|id| self.categories.get(&id))
                .map(|category| category.name.clone()),
            name: product.name.clone(),
            brand: product.brand.clone(),
            price: product.price,
            discount_price: product.discount_price,
            is_featured: product.is_featured,
            stock_quantity: available,
            in_stock: available > 0,
            created_at: product.created_at,
        }
    }

    fn detail(&self, product: &ProductRecord) -> ProductDetail {
        let level = product.stock_level();
        ProductDetail {
            product: self.summary(product),
            description: product.description.clone(),
            status: product.status,
            min_stock_level: level.min_stock_level,
            low_stock: level.low_stock,
        }
    }

    fn live_product_mut(&mut self, id: ProductId) -> Result<&mut ProductRecord, RepoError> {
        self.products
            .get_mut(&id)
            .filter(|product| product.status != ProductStatus::Deleted)
            .ok_or_else(|| RepoError::not_found("product", id))
    }
}

/// Catalog held in memory behind an async lock.
#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    state: RwLock<CatalogState>,
    loads: AtomicUsize,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// A small demo catalog: two categories and a handful of products,
    /// including the desk lamp with id 42.
    pub fn seeded() -> Self {
        let mut state = CatalogState {
            next_order_id: 1,
            ..Default::default()
        };

        let mut lighting = CategoryRecord::new(1, "Lighting");
        lighting.description = Some("Lamps and fixtures".to_string());
        lighting.sort_order = 1;
        let mut furniture = CategoryRecord::new(2, "Furniture");
        furniture.sort_order = 2;
        let mut archive = CategoryRecord::new(3, "Archive");
        archive.sort_order = 3;
        archive.status = CategoryStatus::Inactive;
        for category in [lighting, furniture, archive] {
            state.categories.insert(category.id, category);
        }

        let mut desk_lamp = ProductRecord::new(42, "Desk Lamp", 49.0);
        desk_lamp.category_id = Some(1);
        desk_lamp.brand = Some("Lumen".to_string());
        desk_lamp.description = Some("Adjustable LED desk lamp".to_string());
        desk_lamp.discount_price = Some(39.0);
        desk_lamp.is_featured = true;
        desk_lamp.quantity = 12;
        desk_lamp.min_stock_level = Some(5);
        desk_lamp.created_at = datetime!(2024-03-01 09:00 UTC);

        let mut floor_lamp = ProductRecord::new(43, "Floor Lamp", 129.0);
        floor_lamp.category_id = Some(1);
        floor_lamp.brand = Some("Lumen".to_string());
        floor_lamp.created_at = datetime!(2024-02-10 09:00 UTC);

        let mut chair = ProductRecord::new(7, "Oak Chair", 89.5);
        chair.category_id = Some(2);
        chair.is_featured = true;
        chair.quantity = 4;
        chair.created_at = datetime!(2024-01-15 09:00 UTC);

        let mut table = ProductRecord::new(8, "Walnut Table", 420.0);
        table.category_id = Some(2);
        table.quantity = 3;
        table.reserved = 1;
        table.created_at = datetime!(2024-01-20 09:00 UTC);

        let mut retired = ProductRecord::new(9, "Retired Stool", 25.0);
        retired.category_id = Some(3);
        retired.quantity = 30;
        retired.created_at = datetime!(2023-06-01 09:00 UTC);

        for product in [desk_lamp, floor_lamp, chair, table, retired] {
            state.products.insert(product.id, product);
        }

        Self {
            state: RwLock::new(state),
            loads: AtomicUsize::new(0),
        }
    }

    pub async fn insert_category(&self, category: CategoryRecord) {
        self.state
            .write()
            .await
            .categories
            .insert(category.id, category);
    }

    pub async fn insert_product(&self, product: ProductRecord) {
        self.state.write().await.products.insert(product.id, product);
    }

    /// Number of read queries served so far.
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    fn record_load(&self) {
        self.loads.fetch_add(1, Ordering::SeqCst);
    }
}

fn compare(a: &ProductRecord, b: &ProductRecord, sort_by: SortField) -> CmpOrdering {
    match sort_by {
        SortField::CreatedAt => a.created_at.cmp(&b.created_at),
        SortField::Price => a.effective_price().total_cmp(&b.effective_price()),
        SortField::Name => a.name.to_lowercase().cmp(&b.name.to_lowercase()),
    }
    .then_with(|| a.id.cmp(&b.id))
}

fn matches_search(product: &ProductRecord, needle: &str) -> bool {
    let needle = needle.to_lowercase();
    let contains = |value: &str| value.to_lowercase().contains(&needle);
    contains(&product.name)
        || product.description.as_deref().is_some_and(contains)
        || product.brand.as_deref().is_some_and(contains)
}

fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[async_trait]
impl CatalogRepo for InMemoryCatalog {
    async fn featured_products(&self, limit: u32) -> Result<Vec<ProductSummary>, RepoError> {
        self.record_load();
        let state = self.state.read().await;
        let mut featured: Vec<&ProductRecord> = state
            .products
            .values()
            .filter(|product| product.is_featured && state.visible(product))
            .collect();
        featured.sort_by(|a, b| compare(b, a, SortField::CreatedAt));
        Ok(featured
            .into_iter()
            .take(limit as usize)
            .map(|product| state.summary(product))
            .collect())
    }

    async fn categories(&self) -> Result<Vec<Category>, RepoError> {
        self.record_load();
        let state = self.state.read().await;
        let mut counts: HashMap<CategoryId, i64> = HashMap::new();
        for product in state.products.values().filter(|p| state.visible(p)) {
            if let Some(category_id) = product.category_id {
                *counts.entry(category_id).or_default() += 1;
            }
        }

        let mut categories: Vec<Category> = state
            .categories
            .values()
            .filter(|category| category.status == CategoryStatus::Active)
            .map(|category| Category {
                id: category.id,
                name: category.name.clone(),
                description: category.description.clone(),
                sort_order: category.sort_order,
                product_count: counts.get(&category.id).copied().unwrap_or(0),
            })
            .collect();
        categories.sort_by(|a, b| a.sort_order.cmp(&b.sort_order).then(a.name.cmp(&b.name)));
        Ok(categories)
    }

    async fn product_detail(&self, id: ProductId) -> Result<Option<ProductDetail>, RepoError> {
        self.record_load();
        let state = self.state.read().await;
        Ok(state
            .products
            .get(&id)
            .filter(|product| state.visible(product))
            .map(|product| state.detail(product)))
    }

    async fn list_products(&self, query: &ListQuery) -> Result<ProductPage, RepoError> {
        self.record_load();
        let state = self.state.read().await;
        let mut matching: Vec<&ProductRecord> = state
            .products
            .values()
            .filter(|product| state.visible(product))
            .filter(|product| {
                query.category_id.is_none() || product.category_id == query.category_id
            })
            .filter(|product| !query.in_stock_only || product.available() > 0)
            .filter(|product| {
                query
                    .search
                    .as_deref()
                    .is_none_or(|needle| matches_search(product, needle))
            })
            .collect();

        matching.sort_by(|a, b| match query.sort_order {
            SortOrder::Asc => compare(a, b, query.sort_by),
            SortOrder::Desc => compare(b, a, query.sort_by),
        });

        let total = matching.len() as u64;
        let per_page = u64::from(query.per_page.max(1));
        let products = matching
            .into_iter()
            .skip(query.offset() as usize)
            .take(per_page as usize)
            .map(|product| state.summary(product))
            .collect();

        Ok(ProductPage {
            products,
            page: query.page,
            per_page: query.per_page,
            total,
            total_pages: total.div_ceil(per_page),
        })
    }

    async fn stock_level(&self, id: ProductId) -> Result<Option<StockLevel>, RepoError> {
        self.record_load();
        let state = self.state.read().await;
        Ok(state
            .products
            .get(&id)
            .filter(|product| product.status != ProductStatus::Deleted)
            .map(ProductRecord::stock_level))
    }
}

#[async_trait]
impl CatalogWriteRepo for InMemoryCatalog {
    async fn update_product(
        &self,
        id: ProductId,
        update: &ProductUpdate,
    ) -> Result<ProductDetail, RepoError> {
        let mut state = self.state.write().await;
        if let Some(category_id) = update.category_id
            && !state.categories.contains_key(&category_id)
        {
            return Err(RepoError::invalid(format!(
                "category {category_id} does not exist"
            )));
        }

        let product = state.live_product_mut(id)?;
        if let Some(name) = &update.name {
            product.name = name.trim().to_string();
        }
        if let Some(description) = &update.description {
            product.description = Some(description.clone());
        }
        if let Some(price) = update.price {
            product.price = price;
        }
        if let Some(discount_price) = update.discount_price {
            product.discount_price = Some(discount_price);
        }
        if let Some(is_featured) = update.is_featured {
            product.is_featured = is_featured;
        }
        if let Some(status) = update.status {
            product.status = status;
        }
        if let Some(category_id) = update.category_id {
            product.category_id = Some(category_id);
        }

        let product = product.clone();
        Ok(state.detail(&product))
    }

    async fn delete_product(&self, id: ProductId) -> Result<(), RepoError> {
        let mut state = self.state.write().await;
        state.live_product_mut(id)?.status = ProductStatus::Deleted;
        Ok(())
    }

    async fn update_category(
        &self,
        id: CategoryId,
        update: &CategoryUpdate,
    ) -> Result<Category, RepoError> {
        let mut state = self.state.write().await;
        let product_count = state
            .products
            .values()
            .filter(|product| {
                product.category_id == Some(id) && product.status == ProductStatus::Active
            })
            .count() as i64;

        let category = state
            .categories
            .get_mut(&id)
            .ok_or_else(|| RepoError::not_found("category", id))?;
        if let Some(name) = &update.name {
            category.name = name.trim().to_string();
        }
        if let Some(description) = &update.description {
            category.description = Some(description.clone());
        }
        if let Some(sort_order) = update.sort_order {
            category.sort_order = sort_order;
        }
        if let Some(status) = update.status {
            category.status = status;
        }

        Ok(Category {
            id: category.id,
            name: category.name.clone(),
            description: category.description.clone(),
            sort_order: category.sort_order,
            product_count,
        })
    }

    async fn set_stock(&self, id: ProductId, quantity: i64) -> Result<InventoryChange, RepoError> {
        let mut state = self.state.write().await;
        let product = state.live_product_mut(id)?;
        product.quantity = quantity;
        Ok(InventoryChange {
            product_id: id,
            remaining: product.available(),
        })
    }

    async fn place_order(&self, order: &NewOrder) -> Result<PlacedOrder, RepoError> {
        let mut state = self.state.write().await;

        let requested = order
            .merged_lines()
            .ok_or_else(|| RepoError::invalid("order quantity overflows"))?;

        let mut total = 0.0;
        for (product_id, quantity) in &requested {
            let product = state
                .products
                .get(product_id)
                .filter(|product| state.visible(product))
                .ok_or_else(|| RepoError::not_found("product", *product_id))?;
            if product.available() < *quantity {
                return Err(RepoError::InsufficientStock {
                    product_id: *product_id,
                    requested: *quantity,
                    available: product.available(),
                });
            }
            total += product.effective_price() * (*quantity as f64);
        }

        let mut inventory = Vec::with_capacity(requested.len());
        for (product_id, quantity) in &requested {
            let product = state.live_product_mut(*product_id)?;
            product.quantity -= quantity;
            inventory.push(InventoryChange {
                product_id: *product_id,
                remaining: product.available(),
            });
        }

        let order_id = state.next_order_id.max(1);
        state.next_order_id = order_id + 1;
        state.orders.insert(
            order_id,
            OrderRecord {
                status: OrderStatus::Pending,
                lines: requested,
            },
        );

        Ok(PlacedOrder {
            order_id,
            status: OrderStatus::Pending,
            total: round_cents(total),
            inventory,
        })
    }

    async fn update_order_status(
        &self,
        id: OrderId,
        status: OrderStatus,
    ) -> Result<OrderStatusChange, RepoError> {
        let mut state = self.state.write().await;
        let order = state
            .orders
            .get(&id)
            .cloned()
            .ok_or_else(|| RepoError::not_found("order", id))?;

        if matches!(order.status, OrderStatus::Cancelled | OrderStatus::Delivered) {
            return Err(RepoError::invalid(format!(
                "order {id} is already {}",
                order.status
            )));
        }

        let mut inventory = Vec::new();
        if order.status.restocks_on(status) {
            for (product_id, quantity) in &order.lines {
                if let Some(product) = state.products.get_mut(product_id) {
                    product.quantity += quantity;
                    inventory.push(InventoryChange {
                        product_id: *product_id,
                        remaining: product.available(),
                    });
                }
            }
        }

        if let Some(record) = state.orders.get_mut(&id) {
            record.status = status;
        }

        Ok(OrderStatusChange {
            order_id: id,
            previous: order.status,
            status,
            inventory,
        })
    }
}

//! Request and response bodies for the JSON surfaces.

use serde::{Deserialize, Serialize};

use crate::application::inventory::Applied;
use crate::domain::listing::{DEFAULT_PER_PAGE, ListQuery, SortField, SortOrder};
use crate::domain::types::{CategoryId, OrderStatus};

/// Query string accepted by `GET /api/products`.
#[derive(Debug, Default, Deserialize)]
pub struct ProductListParams {
    pub category: Option<CategoryId>,
    pub search: Option<String>,
    pub in_stock: Option<bool>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub sort_by: Option<SortField>,
    pub sort_order: Option<SortOrder>,
}

impl From<ProductListParams> for ListQuery {
    fn from(params: ProductListParams) -> Self {
        ListQuery {
            category_id: params.category,
            search: params.search,
            in_stock_only: params.in_stock.unwrap_or(false),
            page: params.page.unwrap_or(1),
            per_page: params.per_page.unwrap_or(DEFAULT_PER_PAGE),
            sort_by: params.sort_by.unwrap_or_default(),
            sort_order: params.sort_order.unwrap_or_default(),
        }
        .normalized()
    }
}

#[derive(Debug, Deserialize)]
pub struct StockPayload {
    pub quantity: i64,
}

#[derive(Debug, Deserialize)]
pub struct OrderStatusPayload {
    pub status: OrderStatus,
}

/// Body returned by every write: the committed value and what it invalidated.
#[derive(Debug, Serialize)]
pub struct AppliedBody<T> {
    pub data: T,
    pub invalidated: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub stale_keys: Vec<String>,
    pub notified: usize,
}

impl<T> From<Applied<T>> for AppliedBody<T> {
    fn from(applied: Applied<T>) -> Self {
        Self {
            data: applied.data,
            invalidated: applied.invalidation.deleted,
            stale_keys: applied
                .invalidation
                .failed
                .iter()
                .map(ToString::to_string)
                .collect(),
            notified: applied.invalidation.notified,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_params_default_and_clamp() {
        let query = ListQuery::from(ProductListParams {
            per_page: Some(1_000),
            search: Some(" lamp ".to_string()),
            ..Default::default()
        });

        assert_eq!(query.page, 1);
        assert_eq!(query.per_page, 100);
        assert_eq!(query.search.as_deref(), Some("lamp"));
        assert_eq!(query.sort_by, SortField::CreatedAt);
        assert!(!query.in_stock_only);
    }
}

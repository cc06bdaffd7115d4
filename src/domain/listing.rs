//! Product listing filters.

use serde::{Deserialize, Serialize};

use super::types::CategoryId;

pub const DEFAULT_PER_PAGE: u32 = 20;
pub const MAX_PER_PAGE: u32 = 100;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    #[default]
    CreatedAt,
    Price,
    Name,
}

impl SortField {
    pub fn as_str(self) -> &'static str {
        match self {
            SortField::CreatedAt => "created_at",
            SortField::Price => "price",
            SortField::Name => "name",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    pub fn as_str(self) -> &'static str {
        match self {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        }
    }
}

/// Normalised filter set for `products_list` views.
///
/// Construct through [`ListQuery::normalized`] so that equivalent requests
/// (blank search, out-of-range paging) collapse onto the same cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ListQuery {
    pub category_id: Option<CategoryId>,
    pub search: Option<String>,
    pub in_stock_only: bool,
    pub page: u32,
    pub per_page: u32,
    pub sort_by: SortField,
    pub sort_order: SortOrder,
}

impl Default for ListQuery {
    fn default() -> Self {
        Self {
            category_id: None,
            search: None,
            in_stock_only: false,
            page: 1,
            per_page: DEFAULT_PER_PAGE,
            sort_by: SortField::default(),
            sort_order: SortOrder::default(),
        }
    }
}

impl ListQuery {
    pub fn normalized(mut self) -> Self {
        self.search = self
            .search
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        self.page = self.page.max(1);
        self.per_page = self.per_page.clamp(1, MAX_PER_PAGE);
        self
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.per_page)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalisation_collapses_blank_search_and_clamps_paging() {
        let query = ListQuery {
            search: Some("   ".to_string()),
            page: 0,
            per_page: 500,
            ..Default::default()
        }
        .normalized();

        assert_eq!(query.search, None);
        assert_eq!(query.page, 1);
        assert_eq!(query.per_page, MAX_PER_PAGE);
    }

    #[test]
    fn offset_follows_page() {
        let query = ListQuery {
            page: 3,
            per_page: 10,
            ..Default::default()
        };
        assert_eq!(query.offset(), 20);
    }
}

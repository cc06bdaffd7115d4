use async_trait::async_trait;
use sqlx::{MySql, QueryBuilder};

use crate::application::repos::{CatalogRepo, RepoError};
use crate::domain::entities::{Category, ProductDetail, ProductPage, ProductSummary, StockLevel};
use crate::domain::listing::{ListQuery, SortField};
use crate::domain::types::ProductId;

use super::MySqlCatalog;
use super::rows::{
    AVAILABLE_EXPR, CATEGORY_SELECT, CategoryRow, PRODUCT_SELECT, ProductRow, VISIBLE,
};
use super::util::{convert_count, map_sqlx_error};

impl MySqlCatalog {
    fn push_list_filters(qb: &mut QueryBuilder<'_, MySql>, query: &ListQuery) {
        qb.push(" WHERE ");
        qb.push(VISIBLE);

        if let Some(category_id) = query.category_id {
            qb.push(" AND p.category_id = ");
            qb.push_bind(category_id);
        }

        if query.in_stock_only {
            qb.push(" AND ");
            qb.push(AVAILABLE_EXPR);
            qb.push(" > 0");
        }

        if let Some(search) = query.search.as_ref() {
            let pattern = format!("%{search}%");
            qb.push(" AND (p.product_name LIKE ");
            qb.push_bind(pattern.clone());
            qb.push(" OR p.description LIKE ");
            qb.push_bind(pattern.clone());
            qb.push(" OR p.brand LIKE ");
            qb.push_bind(pattern);
            qb.push(")");
        }
    }

    fn sort_column(field: SortField) -> &'static str {
        match field {
            SortField::CreatedAt => "p.created_at",
            SortField::Price => "COALESCE(p.discount_price, p.price)",
            SortField::Name => "p.product_name",
        }
    }
}

#[async_trait]
impl CatalogRepo for MySqlCatalog {
    async fn featured_products(&self, limit: u32) -> Result<Vec<ProductSummary>, RepoError> {
        let sql = format!(
            "{PRODUCT_SELECT} WHERE {VISIBLE} AND p.is_featured = 1 \
             ORDER BY p.created_at DESC, p.product_id DESC LIMIT ?"
        );
        let rows = sqlx::query_as::<_, ProductRow>(&sql)
            .bind(limit)
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(ProductRow::into_summary).collect())
    }

    async fn categories(&self) -> Result<Vec<Category>, RepoError> {
        let sql = format!(
            "{CATEGORY_SELECT} WHERE c.status = 'active' ORDER BY c.sort_order, c.category_name"
        );
        let rows = sqlx::query_as::<_, CategoryRow>(&sql)
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(Category::from).collect())
    }

    async fn product_detail(&self, id: ProductId) -> Result<Option<ProductDetail>, RepoError> {
        let sql = format!("{PRODUCT_SELECT} WHERE {VISIBLE} AND p.product_id = ?");
        let row = sqlx::query_as::<_, ProductRow>(&sql)
            .bind(id)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        row.map(ProductRow::into_detail).transpose()
    }

    async fn list_products(&self, query: &ListQuery) -> Result<ProductPage, RepoError> {
        let mut count_qb = QueryBuilder::<MySql>::new(
            "SELECT COUNT(*) FROM products p \
             LEFT JOIN categories c ON c.category_id = p.category_id \
             LEFT JOIN inventory i ON i.product_id = p.product_id",
        );
        Self::push_list_filters(&mut count_qb, query);
        let total: i64 = count_qb
            .build_query_scalar::<i64>()
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        let total = convert_count(total)?;

        let mut qb = QueryBuilder::<MySql>::new(PRODUCT_SELECT);
        Self::push_list_filters(&mut qb, query);
        qb.push(" ORDER BY ");
        qb.push(Self::sort_column(query.sort_by));
        qb.push(" ");
        qb.push(query.sort_order.as_str().to_uppercase());
        qb.push(", p.product_id ");
        qb.push(query.sort_order.as_str().to_uppercase());
        qb.push(" LIMIT ");
        qb.push_bind(query.per_page);
        qb.push(" OFFSET ");
        qb.push_bind(query.offset());

        let rows = qb
            .build_query_as::<ProductRow>()
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        let per_page = u64::from(query.per_page.max(1));
        Ok(ProductPage {
            products: rows.into_iter().map(ProductRow::into_summary).collect(),
            page: query.page,
            per_page: query.per_page,
            total,
            total_pages: total.div_ceil(per_page),
        })
    }

    async fn stock_level(&self, id: ProductId) -> Result<Option<StockLevel>, RepoError> {
        let sql = format!("{PRODUCT_SELECT} WHERE p.product_id = ? AND p.status <> 'deleted'");
        let row = sqlx::query_as::<_, ProductRow>(&sql)
            .bind(id)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(row.as_ref().map(ProductRow::stock_level))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_filters_bind_every_condition() {
        let query = ListQuery {
            category_id: Some(3),
            search: Some("lamp".to_string()),
            in_stock_only: true,
            ..Default::default()
        };
        let mut qb = QueryBuilder::<MySql>::new("SELECT 1 FROM products p");
        MySqlCatalog::push_list_filters(&mut qb, &query);
        let sql = qb.sql();

        assert!(sql.contains("p.category_id = ?"));
        assert!(sql.contains("> 0"));
        assert_eq!(sql.matches("LIKE ?").count(), 3);
    }

    #[test]
    fn price_sort_uses_effective_price() {
        assert_eq!(
            MySqlCatalog::sort_column(SortField::Price),
            "COALESCE(p.discount_price, p.price)"
        );
    }
}

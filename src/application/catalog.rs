//! Cached catalog reads.

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::application::repos::{CatalogRepo, FEATURED_LIMIT, RepoError};
use crate::cache::{Cached, ReadThroughView, View};
use crate::domain::entities::{Category, ProductDetail, ProductPage, ProductSummary, StockLevel};
use crate::domain::listing::ListQuery;
use crate::domain::types::ProductId;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("{entity} `{id}` not found")]
    NotFound { entity: &'static str, id: i64 },
    #[error(transparent)]
    Repo(#[from] RepoError),
}

/// Outcome of a warm-up pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WarmReport {
    pub warmed: Vec<&'static str>,
    pub failed: Vec<&'static str>,
}

#[derive(Clone)]
pub struct CatalogService {
    repo: Arc<dyn CatalogRepo>,
    views: Arc<ReadThroughView>,
}

impl CatalogService {
    pub fn new(repo: Arc<dyn CatalogRepo>, views: Arc<ReadThroughView>) -> Self {
        Self { repo, views }
    }

    pub async fn featured_products(&self) -> Result<Cached<Vec<ProductSummary>>, CatalogError> {
        self.views
            .get_or_load(&View::FeaturedProducts, || async {
                Ok::<_, CatalogError>(self.repo.featured_products(FEATURED_LIMIT).await?)
            })
            .await
    }

    pub async fn categories(&self) -> Result<Cached<Vec<Category>>, CatalogError> {
        self.views
            .get_or_load(&View::Categories, || async {
                Ok::<_, CatalogError>(self.repo.categories().await?)
            })
            .await
    }

    /// Missing products are reported, not cached.
    pub async fn product_detail(
        &self,
        id: ProductId,
    ) -> Result<Cached<ProductDetail>, CatalogError> {
        self.views
            .get_or_load(&View::ProductDetail(id), || async {
                self.repo
                    .product_detail(id)
                    .await?
                    .ok_or(CatalogError::NotFound {
                        entity: "product",
                        id,
                    })
            })
            .await
    }

    pub async fn stock_level(&self, id: ProductId) -> Result<Cached<StockLevel>, CatalogError> {
        self.views
            .get_or_load(&View::ProductStock(id), || async {
                self.repo
                    .stock_level(id)
                    .await?
                    .ok_or(CatalogError::NotFound {
                        entity: "inventory",
                        id,
                    })
            })
            .await
    }

    pub async fn list_products(
        &self,
        query: ListQuery,
    ) -> Result<Cached<ProductPage>, CatalogError> {
        let query = query.normalized();
        let view = View::ProductsList(query.clone());
        self.views
            .get_or_load(&view, || async {
                Ok::<_, CatalogError>(self.repo.list_products(&query).await?)
            })
            .await
    }

    /// Preload the featured shelf and the category list.
    pub async fn warm(&self) -> WarmReport {
        let mut report = WarmReport::default();

        match self.featured_products().await {
            Ok(_) => report.warmed.push("featured_products"),
            Err(err) => {
                warn!(view = "featured_products", error = %err, "Cache warm-up failed");
                report.failed.push("featured_products");
            }
        }
        match self.categories().await {
            Ok(_) => report.warmed.push("categories"),
            Err(err) => {
                warn!(view = "categories", error = %err, "Cache warm-up failed");
                report.failed.push("categories");
            }
        }

        info!(
            warmed = report.warmed.len(),
            failed = report.failed.len(),
            "Cache warm-up finished"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheConfig, KeyCache, KeyRegistry, MemoryBackend, TtlPolicy};
    use crate::infra::memory::InMemoryCatalog;

    fn service(catalog: Arc<InMemoryCatalog>) -> CatalogService {
        let config = CacheConfig::default();
        let backend = Arc::new(MemoryBackend::new(config.memory_capacity_non_zero()));
        let cache = Arc::new(KeyCache::new(backend, &config));
        let views = Arc::new(ReadThroughView::new(
            cache,
            Arc::new(KeyRegistry::new()),
            TtlPolicy::default(),
        ));
        CatalogService::new(catalog, views)
    }

    #[tokio::test]
    async fn repeated_detail_reads_hit_the_cache() {
        let catalog = Arc::new(InMemoryCatalog::seeded());
        let service = service(catalog.clone());

        let first = service.product_detail(42).await.expect("detail");
        let second = service.product_detail(42).await.expect("detail");

        assert!(!first.cached);
        assert!(second.cached);
        assert_eq!(first.data, second.data);
        assert_eq!(catalog.load_count(), 1);
    }

    #[tokio::test]
    async fn missing_product_is_not_cached() {
        let catalog = Arc::new(InMemoryCatalog::seeded());
        let service = service(catalog.clone());

        for _ in 0..2 {
            let err = service.product_detail(9_999).await.expect_err("missing");
            assert!(matches!(err, CatalogError::NotFound { id: 9_999, .. }));
        }
        assert_eq!(catalog.load_count(), 2);
    }

    #[tokio::test]
    async fn equivalent_list_queries_share_one_entry() {
        let catalog = Arc::new(InMemoryCatalog::seeded());
        let service = service(catalog.clone());

        service
            .list_products(ListQuery {
                search: Some("  ".to_string()),
                ..Default::default()
            })
            .await
            .expect("list");
        let again = service.list_products(ListQuery::default()).await.expect("list");

        assert!(again.cached);
        assert_eq!(catalog.load_count(), 1);
    }

    #[tokio::test]
    async fn warm_preloads_featured_and_categories() {
        let catalog = Arc::new(InMemoryCatalog::seeded());
        let service = service(catalog.clone());

        let report = service.warm().await;
        assert_eq!(report.warmed, vec!["featured_products", "categories"]);
        assert!(report.failed.is_empty());

        assert!(service.featured_products().await.expect("featured").cached);
        assert!(service.categories().await.expect("categories").cached);
        assert_eq!(catalog.load_count(), 2);
    }
}

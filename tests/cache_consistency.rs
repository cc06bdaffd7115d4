//! End-to-end cache consistency: reads through the cache, writes through the
//! inventory service, and the stock fan-out that follows each write.

use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::Notify;

use storefront::application::catalog::CatalogService;
use storefront::application::inventory::InventoryService;
use storefront::cache::{
    CacheBackend, CacheConfig, CacheError, CacheResult, InvalidationRouter, KeyCache,
    KeyRegistry, MemoryBackend, NotifyError, ReadThroughView, StockBroadcaster,
    StockChangeMessage, StockNotifier, View, ViewFamily,
};
use storefront::domain::entities::{NewOrder, OrderLineRequest, ProductUpdate};
use storefront::domain::listing::ListQuery;
use storefront::domain::types::OrderStatus;
use storefront::infra::memory::InMemoryCatalog;

struct Harness {
    catalog: CatalogService,
    inventory: InventoryService,
    cache: Arc<KeyCache>,
    registry: Arc<KeyRegistry>,
    repo: Arc<InMemoryCatalog>,
}

fn harness_with(backend: Arc<dyn CacheBackend>, notifier: Arc<dyn StockNotifier>) -> Harness {
    let config = CacheConfig::default();
    let cache = Arc::new(KeyCache::new(backend, &config));
    let registry = Arc::new(KeyRegistry::new());
    let repo = Arc::new(InMemoryCatalog::seeded());
    let views = Arc::new(ReadThroughView::new(
        cache.clone(),
        registry.clone(),
        config.ttl,
    ));
    let router = Arc::new(InvalidationRouter::new(
        cache.clone(),
        registry.clone(),
        notifier,
    ));
    Harness {
        catalog: CatalogService::new(repo.clone(), views),
        inventory: InventoryService::new(repo.clone(), router),
        cache,
        registry,
        repo,
    }
}

fn memory_backend() -> Arc<dyn CacheBackend> {
    Arc::new(MemoryBackend::new(
        NonZeroUsize::new(256).expect("capacity should be non-zero"),
    ))
}

fn order(product_id: i64, quantity: i64) -> NewOrder {
    NewOrder {
        customer_id: 1,
        lines: vec![OrderLineRequest {
            product_id,
            quantity,
        }],
    }
}

#[tokio::test]
async fn stock_write_refreshes_detail_and_pushes_update() {
    let broadcaster = StockBroadcaster::default();
    let h = harness_with(memory_backend(), Arc::new(broadcaster.clone()));

    let first = h.catalog.product_detail(42).await.expect("detail loads");
    assert!(!first.cached);
    assert_eq!(first.data.product.stock_quantity, 12);
    let second = h.catalog.product_detail(42).await.expect("detail loads");
    assert!(second.cached);
    let stock = h.catalog.stock_level(42).await.expect("stock loads");
    assert_eq!(stock.data.stock, 12);

    let mut subscription = broadcaster.subscribe(42);
    let applied = h.inventory.set_stock(42, 3).await.expect("stock update");
    assert_eq!(applied.data.remaining, 3);
    assert_eq!(applied.invalidation.deleted, 2);
    assert!(applied.invalidation.failed.is_empty());
    assert_eq!(applied.invalidation.notified, 1);

    let update = tokio::time::timeout(Duration::from_secs(1), subscription.recv())
        .await
        .expect("update should arrive")
        .expect("subscription open");
    assert_eq!(update.product_id, 42);
    assert_eq!(update.stock, 3);
    assert!(update.in_stock);

    let refreshed = h.catalog.product_detail(42).await.expect("detail loads");
    assert!(!refreshed.cached);
    assert_eq!(refreshed.data.product.stock_quantity, 3);
    let stock = h.catalog.stock_level(42).await.expect("stock loads");
    assert!(!stock.cached);
    assert!(stock.data.low_stock);
}

#[tokio::test]
async fn selling_out_shows_zero_stock_and_pushes_out_of_stock() {
    let broadcaster = StockBroadcaster::default();
    let h = harness_with(memory_backend(), Arc::new(broadcaster.clone()));

    let before = h.catalog.product_detail(42).await.expect("detail loads");
    assert!(before.data.product.in_stock);
    assert!(h.catalog.product_detail(42).await.expect("detail").cached);

    let mut subscription = broadcaster.subscribe(42);
    let applied = h.inventory.set_stock(42, 0).await.expect("stock update");
    assert_eq!(applied.data.remaining, 0);

    let after = h.catalog.product_detail(42).await.expect("detail loads");
    assert!(!after.cached);
    assert_eq!(after.data.product.stock_quantity, 0);
    assert!(!after.data.product.in_stock);

    let update = tokio::time::timeout(Duration::from_secs(1), subscription.recv())
        .await
        .expect("update should arrive")
        .expect("subscription open");
    assert_eq!(update.product_id, 42);
    assert_eq!(update.stock, 0);
    assert!(!update.in_stock);
}

#[tokio::test]
async fn product_write_drops_every_listing_variant() {
    let h = harness_with(memory_backend(), Arc::new(StockBroadcaster::default()));

    let by_lighting = ListQuery {
        category_id: Some(1),
        ..ListQuery::default()
    }
    .normalized();
    let by_search = ListQuery {
        search: Some("lamp".to_string()),
        ..ListQuery::default()
    }
    .normalized();
    h.catalog
        .list_products(by_lighting.clone())
        .await
        .expect("listing loads");
    h.catalog
        .list_products(by_search.clone())
        .await
        .expect("listing loads");
    h.catalog.featured_products().await.expect("featured loads");
    assert_eq!(h.registry.keys_for(ViewFamily::ProductsList).len(), 2);

    let update = ProductUpdate {
        name: Some("Desk Lamp Pro".to_string()),
        ..ProductUpdate::default()
    };
    let applied = h
        .inventory
        .update_product(42, update)
        .await
        .expect("product update");
    assert_eq!(applied.invalidation.deleted, 3);
    assert!(h.registry.keys_for(ViewFamily::ProductsList).is_empty());

    for query in [by_lighting, by_search] {
        let page = h.catalog.list_products(query).await.expect("listing loads");
        assert!(!page.cached);
        assert!(
            page.data
                .products
                .iter()
                .any(|product| product.name == "Desk Lamp Pro")
        );
    }
    let featured = h.catalog.featured_products().await.expect("featured loads");
    assert!(!featured.cached);
}

#[tokio::test]
async fn category_write_leaves_product_detail_cached() {
    let h = harness_with(memory_backend(), Arc::new(StockBroadcaster::default()));

    h.catalog.categories().await.expect("categories load");
    h.catalog.product_detail(7).await.expect("detail loads");

    let applied = h
        .inventory
        .update_category(
            2,
            storefront::domain::entities::CategoryUpdate {
                name: Some("Seating".to_string()),
                ..Default::default()
            },
        )
        .await
        .expect("category update");
    assert_eq!(applied.invalidation.notified, 0);

    let categories = h.catalog.categories().await.expect("categories load");
    assert!(!categories.cached);
    assert!(categories.data.iter().any(|c| c.name == "Seating"));
    assert!(h.catalog.product_detail(7).await.expect("detail").cached);
}

#[derive(Default)]
struct EventLog(Mutex<Vec<String>>);

impl EventLog {
    fn push(&self, entry: String) {
        self.0.lock().expect("log lock").push(entry);
    }

    fn entries(&self) -> Vec<String> {
        self.0.lock().expect("log lock").clone()
    }
}

/// Memory store that records every delete.
struct LoggingBackend {
    inner: MemoryBackend,
    log: Arc<EventLog>,
}

#[async_trait]
impl CacheBackend for LoggingBackend {
    fn name(&self) -> &'static str {
        "logging"
    }

    async fn get(&self, key: &str) -> CacheResult<Option<Bytes>> {
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> CacheResult<()> {
        self.inner.set(key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> CacheResult<bool> {
        self.log.push(format!("delete {key}"));
        self.inner.delete(key).await
    }

    async fn clear(&self, prefix: &str) -> CacheResult<usize> {
        self.inner.clear(prefix).await
    }

    async fn key_count(&self, prefix: &str) -> CacheResult<usize> {
        self.inner.key_count(prefix).await
    }
}

struct LoggingNotifier {
    log: Arc<EventLog>,
}

impl StockNotifier for LoggingNotifier {
    fn notify(&self, message: &StockChangeMessage) -> Result<usize, NotifyError> {
        self.log.push(format!(
            "notify {}={}",
            message.product_id, message.new_quantity
        ));
        Ok(1)
    }
}

#[tokio::test]
async fn notification_follows_key_deletion() {
    let log = Arc::new(EventLog::default());
    let backend = Arc::new(LoggingBackend {
        inner: MemoryBackend::new(NonZeroUsize::new(64).expect("non-zero")),
        log: log.clone(),
    });
    let h = harness_with(backend, Arc::new(LoggingNotifier { log: log.clone() }));
    h.catalog.stock_level(42).await.expect("stock loads");

    h.inventory
        .place_order(order(42, 2))
        .await
        .expect("order placed");

    let entries = log.entries();
    let deleted_stock = entries
        .iter()
        .position(|entry| entry.ends_with("product_stock:42"))
        .expect("stock key deleted");
    let notified = entries
        .iter()
        .position(|entry| entry == "notify 42=10")
        .expect("stock change notified");
    assert!(deleted_stock < notified, "log: {entries:?}");
    assert!(
        entries.iter().all(|entry| entry.starts_with("delete") || entry == "notify 42=10"),
        "one notification per product: {entries:?}"
    );
}

#[tokio::test]
async fn cancelled_order_restocks_and_notifies() {
    let broadcaster = StockBroadcaster::default();
    let h = harness_with(memory_backend(), Arc::new(broadcaster.clone()));
    let mut all = broadcaster.subscribe_all();

    let placed = h
        .inventory
        .place_order(order(7, 3))
        .await
        .expect("order placed");
    let cancelled = h
        .inventory
        .update_order_status(placed.data.order_id, OrderStatus::Cancelled)
        .await
        .expect("order cancelled");
    assert_eq!(cancelled.data.previous, OrderStatus::Pending);

    let first = all.recv().await.expect("first update");
    let second = all.recv().await.expect("second update");
    assert_eq!((first.product_id, first.stock), (7, 1));
    assert_eq!((second.product_id, second.stock), (7, 4));
}

/// Store that fails every call.
struct DownBackend;

#[async_trait]
impl CacheBackend for DownBackend {
    fn name(&self) -> &'static str {
        "down"
    }

    async fn get(&self, _key: &str) -> CacheResult<Option<Bytes>> {
        Err(CacheError::unavailable("connection refused"))
    }

    async fn set(&self, _key: &str, _value: Bytes, _ttl: Duration) -> CacheResult<()> {
        Err(CacheError::unavailable("connection refused"))
    }

    async fn delete(&self, _key: &str) -> CacheResult<bool> {
        Err(CacheError::unavailable("connection refused"))
    }

    async fn clear(&self, _prefix: &str) -> CacheResult<usize> {
        Err(CacheError::unavailable("connection refused"))
    }

    async fn key_count(&self, _prefix: &str) -> CacheResult<usize> {
        Err(CacheError::unavailable("connection refused"))
    }
}

#[tokio::test]
async fn unreachable_store_falls_back_to_the_database() {
    let broadcaster = StockBroadcaster::default();
    let h = harness_with(Arc::new(DownBackend), Arc::new(broadcaster.clone()));

    for _ in 0..3 {
        let detail = h.catalog.product_detail(42).await.expect("detail loads");
        assert!(!detail.cached);
        assert_eq!(detail.data.product.name, "Desk Lamp");
    }
    assert_eq!(h.repo.load_count(), 3);

    let mut subscription = broadcaster.subscribe(42);
    let applied = h.inventory.set_stock(42, 20).await.expect("write commits");
    assert!(
        applied
            .invalidation
            .failed
            .contains(&View::ProductStock(42).key())
    );
    assert_eq!(applied.invalidation.notified, 1);
    let update = subscription.recv().await.expect("update delivered");
    assert_eq!(update.stock, 20);

    assert_eq!(h.cache.clear_all().await, 0);
}

#[tokio::test]
async fn missing_products_are_not_cached() {
    let h = harness_with(memory_backend(), Arc::new(StockBroadcaster::default()));

    assert!(h.catalog.product_detail(999).await.is_err());
    assert!(h.catalog.product_detail(999).await.is_err());
    assert!(h.registry.keys_for(ViewFamily::ProductDetail).is_empty());
    assert_eq!(h.repo.load_count(), 2);
}

/// Memory store whose first `set` parks until released.
struct GatedBackend {
    inner: MemoryBackend,
    held: std::sync::atomic::AtomicBool,
    entered: Notify,
    release: Notify,
}

impl GatedBackend {
    fn new() -> Self {
        Self {
            inner: MemoryBackend::new(NonZeroUsize::new(64).expect("non-zero")),
            held: std::sync::atomic::AtomicBool::new(false),
            entered: Notify::new(),
            release: Notify::new(),
        }
    }
}

#[async_trait]
impl CacheBackend for GatedBackend {
    fn name(&self) -> &'static str {
        "gated"
    }

    async fn get(&self, key: &str) -> CacheResult<Option<Bytes>> {
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> CacheResult<()> {
        if !self.held.swap(true, std::sync::atomic::Ordering::SeqCst) {
            self.entered.notify_one();
            self.release.notified().await;
        }
        self.inner.set(key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> CacheResult<bool> {
        self.inner.delete(key).await
    }

    async fn clear(&self, prefix: &str) -> CacheResult<usize> {
        self.inner.clear(prefix).await
    }

    async fn key_count(&self, prefix: &str) -> CacheResult<usize> {
        self.inner.key_count(prefix).await
    }
}

#[tokio::test]
async fn write_landing_after_invalidation_is_caught_by_the_next_one() {
    let config = CacheConfig {
        op_timeout_ms: 1000,
        ..CacheConfig::default()
    };
    let backend = Arc::new(GatedBackend::new());
    let cache = Arc::new(KeyCache::new(backend.clone(), &config));
    let registry = Arc::new(KeyRegistry::new());
    let views = Arc::new(ReadThroughView::new(
        cache.clone(),
        registry.clone(),
        config.ttl,
    ));
    let router = InvalidationRouter::new(
        cache.clone(),
        registry.clone(),
        Arc::new(StockBroadcaster::default()),
    );
    let listing = View::ProductsList(ListQuery::default().normalized());

    let reader = tokio::spawn({
        let views = views.clone();
        let listing = listing.clone();
        async move {
            views
                .get_or_load(&listing, || async {
                    Ok::<_, std::convert::Infallible>("v1".to_string())
                })
                .await
        }
    });

    backend.entered.notified().await;
    router.product_changed(42).await;
    backend.release.notify_one();
    let first = reader
        .await
        .expect("reader task joins")
        .expect("loader is infallible");
    assert_eq!(first.data, "v1");
    assert!(registry.keys_for(ViewFamily::ProductsList).contains(&listing.key()));

    let report = router.product_changed(42).await;
    assert!(report.deleted >= 1);

    let reread = views
        .get_or_load(&listing, || async {
            Ok::<_, std::convert::Infallible>("v2".to_string())
        })
        .await
        .expect("loader is infallible");
    assert!(!reread.cached);
    assert_eq!(reread.data, "v2");
}

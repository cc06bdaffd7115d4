//! Mutation-driven invalidation.
//!
//! [`InvalidationRouter::on_mutation`] runs after a write commits: it drops
//! every cache entry the write made stale and only then announces stock
//! changes.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;

use metrics::{counter, histogram};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::domain::entities::InventoryChange;
use crate::domain::types::{CategoryId, OrderId, ProductId};

use super::events::{EntityKind, Epoch, EpochClock, EventKind, InvalidationEvent};
use super::keys::ViewKey;
use super::notifier::{NotifyError, StockChangeMessage, StockNotifier};
use super::planner::InvalidationPlan;
use super::registry::KeyRegistry;
use super::store::KeyCache;

const METRIC_CACHE_INVALIDATE_MS: &str = "storefront_cache_invalidate_ms";
const METRIC_CACHE_INVALIDATED_KEYS: &str = "storefront_cache_invalidated_keys_total";
const METRIC_STOCK_NOTIFY: &str = "storefront_stock_notify_total";

/// Outcome of one mutation hook.
#[derive(Debug, Clone)]
pub struct InvalidationReport {
    pub event_id: Uuid,
    pub epoch: Epoch,
    pub entity: EntityKind,
    /// Keys that existed and were removed.
    pub deleted: usize,
    /// Keys the store failed to delete; they stay stale until their TTL.
    pub failed: Vec<ViewKey>,
    /// Subscribers reached by stock notifications.
    pub notified: usize,
}

pub struct InvalidationRouter {
    cache: Arc<KeyCache>,
    registry: Arc<KeyRegistry>,
    notifier: Arc<dyn StockNotifier>,
    clock: EpochClock,
}

impl InvalidationRouter {
    pub fn new(
        cache: Arc<KeyCache>,
        registry: Arc<KeyRegistry>,
        notifier: Arc<dyn StockNotifier>,
    ) -> Self {
        Self {
            cache,
            registry,
            notifier,
            clock: EpochClock::new(),
        }
    }

    /// Invalidate the views affected by a committed write, then notify.
    ///
    /// Never fails: store errors are logged and reported, notification errors
    /// are logged and counted.
    #[instrument(skip(self), fields(entity = %kind.entity(), entity_id = ?kind.entity_id()))]
    pub async fn on_mutation(&self, kind: EventKind) -> InvalidationReport {
        let started_at = Instant::now();
        let event = self.clock.stamp(kind);
        let plan = InvalidationPlan::from_event(&event);

        debug!(
            event_id = %event.id,
            event_epoch = event.epoch,
            plan = %plan,
            "Invalidation starting"
        );

        let (deleted, failed) = self.invalidate(&plan).await;
        let notified = self.notify(&plan);

        histogram!(METRIC_CACHE_INVALIDATE_MS, "entity" => event.kind.entity().as_str())
            .record(started_at.elapsed().as_secs_f64() * 1000.0);
        counter!(METRIC_CACHE_INVALIDATED_KEYS).increment(deleted as u64);

        if !failed.is_empty() {
            let failed_keys: Vec<&str> = failed.iter().map(ViewKey::as_str).collect();
            warn!(
                event_id = %event.id,
                failed_keys = ?failed_keys,
                "Invalidation partially failed; entries expire by TTL"
            );
        }

        info!(
            event_id = %event.id,
            event_epoch = event.epoch,
            deleted,
            failed = failed.len(),
            notified,
            "Invalidation complete"
        );

        report(&event, deleted, failed, notified)
    }

    async fn invalidate(&self, plan: &InvalidationPlan) -> (usize, Vec<ViewKey>) {
        let mut targets: BTreeSet<ViewKey> = plan.keys.clone();
        for family in &plan.families {
            targets.extend(self.registry.take_family(*family));
        }

        let mut deleted = 0;
        let mut failed = Vec::new();
        for key in targets {
            match self.cache.try_delete(key.as_str()).await {
                Ok(existed) => {
                    self.registry.unregister(&key);
                    if existed {
                        deleted += 1;
                    }
                }
                Err(_) => {
                    // Keep it indexed so the next invalidation retries it.
                    self.registry.register(&key);
                    failed.push(key);
                }
            }
        }
        (deleted, failed)
    }

    fn notify(&self, plan: &InvalidationPlan) -> usize {
        let mut reached = 0;
        for (product_id, quantity) in &plan.notifications {
            let message = StockChangeMessage::now(*product_id, *quantity);
            match self.notifier.notify(&message) {
                Ok(count) => {
                    counter!(METRIC_STOCK_NOTIFY, "outcome" => "delivered").increment(1);
                    reached += count;
                }
                Err(NotifyError::NoSubscribers { .. }) => {
                    counter!(METRIC_STOCK_NOTIFY, "outcome" => "no_subscribers").increment(1);
                    debug!(product_id, "No stock subscribers");
                }
                Err(err) => {
                    counter!(METRIC_STOCK_NOTIFY, "outcome" => "failed").increment(1);
                    warn!(product_id, error = %err, "Stock notification failed");
                }
            }
        }
        reached
    }

    pub async fn product_changed(&self, product_id: ProductId) -> InvalidationReport {
        self.on_mutation(EventKind::ProductChanged {
            product_id: Some(product_id),
        })
        .await
    }

    /// Drop every product-derived view: featured, detail, stock, listings
    /// and categories.
    pub async fn sweep_products(&self) -> InvalidationReport {
        self.on_mutation(EventKind::ProductChanged { product_id: None })
            .await
    }

    pub async fn category_changed(&self, category_id: CategoryId) -> InvalidationReport {
        self.on_mutation(EventKind::CategoryChanged {
            category_id: Some(category_id),
        })
        .await
    }

    pub async fn stock_changed(&self, change: InventoryChange) -> InvalidationReport {
        self.on_mutation(EventKind::StockChanged(change)).await
    }

    pub async fn order_changed(
        &self,
        order_id: OrderId,
        lines: Vec<InventoryChange>,
    ) -> InvalidationReport {
        self.on_mutation(EventKind::OrderChanged { order_id, lines })
            .await
    }
}

fn report(
    event: &InvalidationEvent,
    deleted: usize,
    failed: Vec<ViewKey>,
    notified: usize,
) -> InvalidationReport {
    InvalidationReport {
        event_id: event.id,
        epoch: event.epoch,
        entity: event.kind.entity(),
        deleted,
        failed,
        notified,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use bytes::Bytes;

    use super::*;
    use crate::cache::config::CacheConfig;
    use crate::cache::keys::{View, ViewFamily};
    use crate::cache::notifier::StockBroadcaster;
    use crate::cache::store::tests::{DownBackend, memory_cache};
    use crate::domain::listing::ListQuery;

    #[derive(Default)]
    struct RecordingNotifier {
        sent: Mutex<Vec<StockChangeMessage>>,
    }

    impl StockNotifier for RecordingNotifier {
        fn notify(&self, message: &StockChangeMessage) -> Result<usize, NotifyError> {
            self.sent.lock().unwrap().push(*message);
            Ok(1)
        }
    }

    async fn seed(cache: &KeyCache, registry: &KeyRegistry, view: View) -> ViewKey {
        let key = view.key();
        registry.register(&key);
        cache
            .set(key.as_str(), Bytes::from_static(b"{}"), Duration::from_secs(60))
            .await;
        key
    }

    fn list(page: u32) -> View {
        View::ProductsList(ListQuery {
            page,
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn stock_change_drops_detail_and_every_listing() {
        let cache = Arc::new(memory_cache());
        let registry = Arc::new(KeyRegistry::new());
        let notifier = Arc::new(RecordingNotifier::default());
        let router = InvalidationRouter::new(cache.clone(), registry.clone(), notifier.clone());

        let detail = seed(&cache, &registry, View::ProductDetail(42)).await;
        let page1 = seed(&cache, &registry, list(1)).await;
        let page2 = seed(&cache, &registry, list(2)).await;
        let untouched = seed(&cache, &registry, View::ProductDetail(7)).await;

        let report = router
            .stock_changed(InventoryChange {
                product_id: 42,
                remaining: 9,
            })
            .await;

        assert_eq!(report.deleted, 3);
        assert!(report.failed.is_empty());
        for key in [&detail, &page1, &page2] {
            assert!(cache.get(key.as_str()).await.is_none());
        }
        assert!(cache.get(untouched.as_str()).await.is_some());
        assert!(registry.keys_for(ViewFamily::ProductsList).is_empty());

        let sent = notifier.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!((sent[0].product_id, sent[0].new_quantity), (42, 9));
    }

    #[tokio::test]
    async fn category_change_keeps_product_detail() {
        let cache = Arc::new(memory_cache());
        let registry = Arc::new(KeyRegistry::new());
        let router = InvalidationRouter::new(
            cache.clone(),
            registry.clone(),
            Arc::new(RecordingNotifier::default()),
        );

        let categories = seed(&cache, &registry, View::Categories).await;
        let detail = seed(&cache, &registry, View::ProductDetail(1)).await;

        router.category_changed(3).await;

        assert!(cache.get(categories.as_str()).await.is_none());
        assert!(cache.get(detail.as_str()).await.is_some());
    }

    #[tokio::test]
    async fn product_change_sends_no_stock_notification() {
        let notifier = Arc::new(RecordingNotifier::default());
        let router = InvalidationRouter::new(
            Arc::new(memory_cache()),
            Arc::new(KeyRegistry::new()),
            notifier.clone(),
        );

        let report = router.product_changed(42).await;

        assert_eq!(report.entity, EntityKind::Product);
        assert!(notifier.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn product_sweep_drops_every_product_view() {
        let cache = Arc::new(memory_cache());
        let registry = Arc::new(KeyRegistry::new());
        let notifier = Arc::new(RecordingNotifier::default());
        let router = InvalidationRouter::new(cache.clone(), registry.clone(), notifier.clone());

        let swept = [
            seed(&cache, &registry, View::FeaturedProducts).await,
            seed(&cache, &registry, View::Categories).await,
            seed(&cache, &registry, View::ProductDetail(7)).await,
            seed(&cache, &registry, View::ProductStock(42)).await,
            seed(&cache, &registry, list(3)).await,
        ];

        let report = router.sweep_products().await;

        assert_eq!(report.entity, EntityKind::Product);
        assert_eq!(report.deleted, swept.len());
        for key in &swept {
            assert!(cache.get(key.as_str()).await.is_none());
        }
        assert_eq!(registry.key_count(), 0);
        assert!(notifier.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn store_failure_is_reported_and_keys_stay_indexed() {
        let cache = Arc::new(KeyCache::new(Arc::new(DownBackend), &CacheConfig::default()));
        let registry = Arc::new(KeyRegistry::new());
        registry.register(&list(1).key());
        let notifier = Arc::new(RecordingNotifier::default());
        let router = InvalidationRouter::new(cache, registry.clone(), notifier.clone());

        let report = router
            .stock_changed(InventoryChange {
                product_id: 42,
                remaining: 0,
            })
            .await;

        assert_eq!(report.deleted, 0);
        assert!(report.failed.contains(&list(1).key()));
        assert!(report.failed.contains(&View::ProductDetail(42).key()));
        assert!(registry.keys_for(ViewFamily::ProductsList).contains(&list(1).key()));
        assert_eq!(notifier.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn notification_without_subscribers_does_not_fail_mutation() {
        let router = InvalidationRouter::new(
            Arc::new(memory_cache()),
            Arc::new(KeyRegistry::new()),
            Arc::new(StockBroadcaster::new(4)),
        );

        let report = router
            .order_changed(
                5,
                vec![InventoryChange {
                    product_id: 1,
                    remaining: 2,
                }],
            )
            .await;

        assert_eq!(report.notified, 0);
        assert_eq!(report.entity, EntityKind::Order);
    }

    #[tokio::test]
    async fn epochs_increase_across_mutations() {
        let router = InvalidationRouter::new(
            Arc::new(memory_cache()),
            Arc::new(KeyRegistry::new()),
            Arc::new(RecordingNotifier::default()),
        );

        let first = router.product_changed(1).await;
        let second = router.product_changed(1).await;

        assert!(first.epoch < second.epoch);
        assert_ne!(first.event_id, second.event_id);
    }
}

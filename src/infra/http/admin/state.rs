use std::sync::Arc;

use crate::application::{catalog::CatalogService, inventory::InventoryService};
use crate::cache::{KeyCache, KeyRegistry, StatsProbe};
use crate::infra::db::MySqlCatalog;

#[derive(Clone)]
pub struct AdminState {
    pub catalog: Arc<CatalogService>,
    pub inventory: Arc<InventoryService>,
    pub cache: Arc<KeyCache>,
    pub registry: Arc<KeyRegistry>,
    pub stats: Arc<StatsProbe>,
    /// `None` when the catalog is served from memory.
    pub db: Option<MySqlCatalog>,
}

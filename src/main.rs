use std::{process, sync::Arc, time::Duration};

use storefront::{
    application::{
        catalog::CatalogService,
        error::AppError,
        inventory::InventoryService,
        repos::{CatalogRepo, CatalogWriteRepo},
    },
    cache::{
        CacheConfig, InvalidationRouter, KeyCache, KeyRegistry, ReadThroughView, StatsProbe,
        StockBroadcaster, StockNotifier, build_backend,
    },
    config,
    infra::{
        db::MySqlCatalog,
        error::InfraError,
        http::{self, AdminState, HttpState},
        memory::InMemoryCatalog,
        telemetry,
    },
};
use tokio::{sync::watch, try_join};
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::FlushCache(_) => run_flush_cache(settings).await,
        config::Command::CacheStats(_) => run_cache_stats(settings).await,
    }
}

struct Repositories {
    reads: Arc<dyn CatalogRepo>,
    writes: Arc<dyn CatalogWriteRepo>,
    db: Option<MySqlCatalog>,
}

async fn init_repositories(settings: &config::Settings) -> Result<Repositories, AppError> {
    let Some(database_url) = settings.database.url.as_ref() else {
        warn!("No database url configured; serving the seeded in-memory catalog");
        let catalog = Arc::new(InMemoryCatalog::seeded());
        return Ok(Repositories {
            reads: catalog.clone(),
            writes: catalog,
            db: None,
        });
    };

    let pool = MySqlCatalog::connect(database_url, settings.database.max_connections.get())
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    MySqlCatalog::run_migrations(&pool)
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    let catalog = MySqlCatalog::new(pool);
    Ok(Repositories {
        reads: Arc::new(catalog.clone()),
        writes: Arc::new(catalog.clone()),
        db: Some(catalog),
    })
}

fn build_cache(settings: &config::Settings) -> Result<(CacheConfig, Arc<KeyCache>), AppError> {
    let cache_config = CacheConfig::from(&settings.cache);
    let backend = build_backend(&cache_config)?;
    let cache = Arc::new(KeyCache::new(backend, &cache_config));
    Ok((cache_config, cache))
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let repositories = init_repositories(&settings).await?;
    let (cache_config, cache) = build_cache(&settings)?;
    let registry = Arc::new(KeyRegistry::new());
    let broadcaster = StockBroadcaster::new(settings.notifier.channel_capacity.get());

    let views = Arc::new(ReadThroughView::new(
        cache.clone(),
        registry.clone(),
        cache_config.ttl,
    ));
    let notifier: Arc<dyn StockNotifier> = Arc::new(broadcaster.clone());
    let router = Arc::new(InvalidationRouter::new(
        cache.clone(),
        registry.clone(),
        notifier,
    ));

    let catalog = Arc::new(CatalogService::new(repositories.reads, views));
    let inventory = Arc::new(InventoryService::new(repositories.writes, router));
    let stats = Arc::new(StatsProbe::new(
        cache.clone(),
        registry.clone(),
        Some(broadcaster.clone()),
    ));

    info!(
        backend = cache.backend_name(),
        enabled = cache.is_enabled(),
        prefix = cache.prefix(),
        "Cache initialised"
    );

    if settings.cache.warm_on_start {
        catalog.warm().await;
    }

    let http_state = HttpState {
        catalog: catalog.clone(),
        inventory: inventory.clone(),
        broadcaster,
        stats: stats.clone(),
    };
    let admin_state = AdminState {
        catalog,
        inventory,
        cache,
        registry,
        stats,
        db: repositories.db,
    };

    serve_http(&settings, http_state, admin_state).await
}

async fn run_flush_cache(settings: config::Settings) -> Result<(), AppError> {
    let (_, cache) = build_cache(&settings)?;
    let deleted = cache.clear_all().await;
    info!(
        backend = cache.backend_name(),
        prefix = cache.prefix(),
        deleted,
        "Cache flushed"
    );
    println!("{deleted}");
    Ok(())
}

async fn run_cache_stats(settings: config::Settings) -> Result<(), AppError> {
    let (_, cache) = build_cache(&settings)?;
    let probe = StatsProbe::new(cache, Arc::new(KeyRegistry::new()), None);
    let snapshot = probe.snapshot().await;
    let rendered = serde_json::to_string_pretty(&snapshot)
        .map_err(|err| AppError::unexpected(format!("failed to encode cache stats: {err}")))?;
    println!("{rendered}");
    Ok(())
}

async fn serve_http(
    settings: &config::Settings,
    http_state: HttpState,
    admin_state: AdminState,
) -> Result<(), AppError> {
    let public_router = http::build_router(http_state);
    let admin_router = http::build_admin_router(admin_state);

    let public_listener = tokio::net::TcpListener::bind(settings.server.public_addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;
    let admin_listener = tokio::net::TcpListener::bind(settings.server.admin_addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;

    info!(
        public = %settings.server.public_addr,
        admin = %settings.server.admin_addr,
        "Listening"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "Failed to listen for shutdown signal");
            return;
        }
        info!("Shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    let public_server = axum::serve(public_listener, public_router.into_make_service())
        .with_graceful_shutdown(wait_for_shutdown(shutdown_rx.clone()));
    let admin_server = axum::serve(admin_listener, admin_router.into_make_service())
        .with_graceful_shutdown(wait_for_shutdown(shutdown_rx.clone()));

    let grace = settings.server.graceful_shutdown;
    tokio::select! {
        result = async { try_join!(public_server, admin_server) } => {
            result.map_err(|err| AppError::unexpected(format!("server error: {err}")))?;
        }
        _ = shutdown_deadline(shutdown_rx, grace) => {
            warn!(
                grace_secs = grace.as_secs(),
                "Graceful shutdown timed out; dropping open connections"
            );
        }
    }

    Ok(())
}

async fn wait_for_shutdown(mut shutdown: watch::Receiver<bool>) {
    if shutdown.wait_for(|stop| *stop).await.is_err() {
        std::future::pending::<()>().await;
    }
}

async fn shutdown_deadline(shutdown: watch::Receiver<bool>, grace: Duration) {
    wait_for_shutdown(shutdown).await;
    tokio::time::sleep(grace).await;
}

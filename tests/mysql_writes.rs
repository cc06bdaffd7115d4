//! Write-path checks against a live MySQL. Run with `DATABASE_URL` set and
//! `cargo test -- --ignored`.

use sqlx::MySqlPool;

use storefront::application::repos::{CatalogRepo, CatalogWriteRepo, RepoError};
use storefront::domain::entities::ProductUpdate;
use storefront::infra::db::MySqlCatalog;

async fn seed(pool: &MySqlPool) {
    sqlx::query("INSERT INTO categories (category_id, category_name) VALUES (1, 'Lighting')")
        .execute(pool)
        .await
        .expect("seed category");
    sqlx::query(
        "INSERT INTO products (product_id, category_id, product_name, price) \
         VALUES (42, 1, 'Desk Lamp', 39.90)",
    )
    .execute(pool)
    .await
    .expect("seed product");
    sqlx::query("INSERT INTO inventory (product_id, quantity) VALUES (42, 12)")
        .execute(pool)
        .await
        .expect("seed inventory");
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "needs a MySQL DATABASE_URL"]
async fn product_update_returns_the_committed_row(pool: MySqlPool) {
    seed(&pool).await;
    let catalog = MySqlCatalog::new(pool);

    let detail = catalog
        .update_product(
            42,
            &ProductUpdate {
                name: Some("Desk Lamp Pro".to_string()),
                ..ProductUpdate::default()
            },
        )
        .await
        .expect("update commits");
    assert_eq!(detail.product.name, "Desk Lamp Pro");
    assert_eq!(detail.product.stock_quantity, 12);

    let stored = catalog
        .product_detail(42)
        .await
        .expect("read")
        .expect("row");
    assert_eq!(stored, detail);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "needs a MySQL DATABASE_URL"]
async fn failed_product_update_leaves_row_untouched(pool: MySqlPool) {
    seed(&pool).await;
    let catalog = MySqlCatalog::new(pool);

    let err = catalog
        .update_product(
            42,
            &ProductUpdate {
                name: Some("Orphan Lamp".to_string()),
                category_id: Some(999),
                ..ProductUpdate::default()
            },
        )
        .await
        .expect_err("unknown category");
    assert!(!matches!(err, RepoError::NotFound { .. }));

    let stored = catalog
        .product_detail(42)
        .await
        .expect("read")
        .expect("row");
    assert_eq!(stored.product.name, "Desk Lamp");
}

//! Applies the catalog schema to the database named by `DATABASE_URL`.

use anyhow::Context;

use diecast_infra::config::CatalogConfig;
use diecast_infra::store::PostgresCatalogStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    diecast_observability::init();

    let config = CatalogConfig::from_env().context("failed to load configuration")?;
    let database = config.require_database()?;

    let store = PostgresCatalogStore::connect(database)
        .await
        .context("failed to connect to Postgres")?;
    store.apply_schema().await.context("failed to apply catalog schema")?;

    tracing::info!(
        max_connections = database.max_connections,
        default_page_limit = config.listing.default_limit,
        "catalog schema is up to date"
    );
    Ok(())
}

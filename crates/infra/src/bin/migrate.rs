//! Applies the stock ledger schema to `DATABASE_URL`.

use anyhow::{Context, Result};
use tracing::info;

use stockledger_infra::config::LedgerConfig;
use stockledger_infra::store::PostgresLedgerStore;

#[tokio::main]
async fn main() -> Result<()> {
    stockledger_observability::init();

    let config = LedgerConfig::from_env().context("invalid ledger configuration")?;
    if config.database_url.is_none() {
        anyhow::bail!("DATABASE_URL must be set to run migrations");
    }

    let store = PostgresLedgerStore::connect(&config)
        .await
        .context("failed to connect to Postgres")?;
    store.migrate().await.context("failed to apply schema")?;

    info!("stock ledger schema is up to date");
    Ok(())
}

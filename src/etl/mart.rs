//! Build-mart command - materializes the per-encounter risk table from the base tables.

use tracing::{info, instrument};

use crate::config::Config;
use crate::db::{queries, Database};
use crate::error::Result;

/// Runs the build-mart command and returns the number of mart rows.
#[instrument(skip(config))]
pub async fn run(config: &Config) -> Result<i64> {
    let db = Database::connect(config.database.url()?).await?;
    db.run_migrations().await?;

    let rows = queries::rebuild_mart(db.pool(), &config.database.mart_table).await?;
    info!(table = %config.database.mart_table, rows, "Built mart table");
    Ok(rows)
}

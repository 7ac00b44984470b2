//! Bring the ledger schema up to date and seed default settings.
//!
//! Reads the same `STOCKLEDGER_*` environment as the application.

use anyhow::Context;
use tracing::info;

use stockledger_infra::{Ledger, LedgerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    stockledger_observability::init();

    let config = LedgerConfig::from_env().context("invalid ledger configuration")?;
    let ledger = Ledger::connect(config)
        .await
        .context("cannot open ledger database")?;

    let threshold = ledger
        .reorder_threshold()
        .await
        .context("cannot seed reorder threshold")?;

    let applied = stockledger_infra::migrations::applied_versions(ledger.store().pool())
        .await
        .context("cannot read schema version")?;
    info!(
        schema_version = applied.last().copied().unwrap_or_default(),
        reorder_threshold = threshold,
        "ledger database ready"
    );
    Ok(())
}

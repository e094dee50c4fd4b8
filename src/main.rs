use anyhow::Context;
use osikatu::{App, ConfigBuilder};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ConfigBuilder::new()
        .from_env()
        .context("failed to read configuration")?
        .build()
        .context("invalid configuration")?;

    osikatu::init_tracing_with_config(&config);
    tracing::info!(
        plans = ?config.billing.plans().iter().map(|p| p.id.clone()).collect::<Vec<_>>(),
        gacha_items = config.gacha.pool.items.len(),
        "Configuration loaded"
    );

    App::from_config(config).serve().await?;
    Ok(())
}

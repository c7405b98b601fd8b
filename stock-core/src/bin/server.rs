//! Inventory server binary

use anyhow::Context;
use stock_core::{Config, Inventory, NewItem, Principal};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    let filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(tracing::Level::INFO.into());
    if std::env::var("STOCK_LOG_JSON").is_ok() {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    tracing::info!("Starting StockSense inventory server");

    // Load configuration
    let config = match std::env::var("STOCK_CONFIG") {
        Ok(path) => Config::from_file(&path)
            .with_context(|| format!("Failed to load config from {}", path))?,
        Err(_) => Config::from_env().context("Failed to load config from environment")?,
    };

    // Open inventory
    let inventory = Inventory::open(config).context("Failed to open inventory")?;
    tracing::info!("Inventory opened successfully");

    if std::env::var("STOCK_SEED").is_ok() && inventory.list_items()?.is_empty() {
        seed(&inventory).await?;
    }

    let stats = inventory.stats()?;
    tracing::info!(stats = %serde_json::to_string(&stats)?, "Inventory ready");

    tokio::signal::ctrl_c().await?;

    tracing::info!("Shutting down inventory server");
    inventory.shutdown().await?;
    Ok(())
}

/// Sample items for a fresh data directory
async fn seed(inventory: &Inventory) -> anyhow::Result<()> {
    let admin = Principal::admin("system", "System");
    let samples = [
        ("MCH-001", "Hydraulic pump", "Acme Industrial", "Rack A1", 12, 4),
        ("MCH-002", "Servo motor", "Kinetix", "Rack A2", 6, 2),
        ("FLT-010", "Air filter cartridge", "Filtra", "Bin C3", 30, 0),
    ];

    for (code, description, vendor, location, current, allocated) in samples {
        inventory
            .create_item(
                &admin,
                NewItem {
                    code: code.to_string(),
                    description: description.to_string(),
                    vendor: vendor.to_string(),
                    storage_location: location.to_string(),
                    current_stock: Some(current),
                    allocated_stock: Some(allocated),
                    ..Default::default()
                },
            )
            .await
            .with_context(|| format!("Failed to seed {}", code))?;
    }

    tracing::info!(items = samples.len(), "Seeded sample inventory");
    Ok(())
}

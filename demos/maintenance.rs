/// Multi-store manager demo
///
/// Runs a DataManager with short maintenance intervals, prints bus events
/// and stops everything with destroy(). Set RUST_LOG=kvdex=debug for the
/// library's tracing output.

use kvdex::{DataManager, ManagerConfig, StoreConfig};
use serde_json::json;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("kvdex=info")))
        .init();

    let config = ManagerConfig {
        enable_compression: true,
        compression_level: 0, // lz4
        sync_interval: 200,
        backup_interval: 500,
        optimize_interval: 0,
        compact_interval: 300,
        validation_interval: 1_000,
        ..ManagerConfig::default()
    };
    let manager = DataManager::new(config);

    for event in ["store:created", "maintenance:backup", "maintenance:validate"] {
        manager.on(event, |e| println!("  [bus] {} {}", e.name, e.payload));
    }

    manager.init().await?;
    let saves = manager.create_store(StoreConfig::new("saves")).await?;

    if let Some(default) = manager.default_store() {
        default.write().set("settings:volume", json!(7))?;
    }
    for slot in 1..=3 {
        saves.write().set(&format!("slot{}", slot), json!({"level": slot, "hp": 100}))?;
    }

    tokio::time::sleep(Duration::from_millis(1_200)).await;

    let stats = manager.stats();
    println!("\nStores: {:?}", manager.store_names());
    for task in &stats.tasks {
        println!(
            "  {:<9} runs={} skipped={} failures={}",
            task.task, task.runs, task.skipped_overlaps, task.failures
        );
    }
    if let Some(bytes) = manager.backup_of("saves") {
        println!("  latest 'saves' backup: {} bytes", bytes.len());
    }
    println!("  health: {:?}", manager.health());

    manager.destroy().await;
    println!("Destroyed: {}", manager.is_destroyed());
    Ok(())
}

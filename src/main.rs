use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use slotbook::engine::Engine;
use slotbook::maintenance;
use slotbook::store::DurableStore;

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let metrics_port: Option<u16> = std::env::var("SLOTBOOK_METRICS_PORT")
        .ok()
        .and_then(|s| s.parse().ok());
    slotbook::observability::init(metrics_port)?;

    let data_dir = std::env::var("SLOTBOOK_DATA_DIR").unwrap_or_else(|_| "./data".into());
    let compact_threshold: u64 = env_or("SLOTBOOK_COMPACT_THRESHOLD", 1000);
    let compact_every = Duration::from_secs(env_or("SLOTBOOK_COMPACT_INTERVAL_SECS", 30));

    std::fs::create_dir_all(&data_dir)?;
    let wal_path = PathBuf::from(&data_dir).join("slotbook.wal");
    let store = Arc::new(DurableStore::open(&wal_path)?);
    let engine = Engine::new(store.clone());

    info!("slotbook engine ready");
    info!("  data_dir: {data_dir}");
    info!("  compact: every {}s past {compact_threshold} appends", compact_every.as_secs());
    info!("  metrics: {}", metrics_port.map_or("disabled".to_string(), |p| format!("http://0.0.0.0:{p}/metrics")));

    let compactor = tokio::spawn(maintenance::run_compactor(
        engine.store().clone(),
        compact_threshold,
        compact_every,
    ));

    // Graceful shutdown on SIGTERM/ctrl-c
    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
    }

    info!("shutdown signal received");
    compactor.abort();
    maintenance::compact_if_needed(&store, 1).await;
    info!("slotbook stopped");
    Ok(())
}

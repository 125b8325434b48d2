use std::sync::Arc;

use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "taskdock=info".into()),
        )
        .init();

    // load config: explicit path via TASKDOCK_CONFIG > ~/.taskdock/taskdock.toml
    let config_path = std::env::var("TASKDOCK_CONFIG").ok();
    let config = taskdock_core::TaskdockConfig::load(config_path.as_deref()).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        taskdock_core::TaskdockConfig::default()
    });

    let db_path = &config.database.path;
    ensure_parent_dir(db_path);
    info!(path = %db_path, "opening SQLite database");

    let db = rusqlite::Connection::open(db_path)?;
    db.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    taskdock_store::init_db(&db)?;
    info!("database migrations complete");

    // each store gets its own connection for thread safety
    let jobs = Arc::new(taskdock_store::JobStore::new(rusqlite::Connection::open(
        db_path,
    )?));
    let triggers = Arc::new(taskdock_store::TriggerStore::new(
        rusqlite::Connection::open(db_path)?,
    ));
    let bus = Arc::new(taskdock_bus::EventBus::new());

    let scheduler = taskdock_scheduler::Scheduler::new(
        jobs,
        triggers,
        Arc::clone(&bus),
        config.runtime.app_root.clone(),
    )
    .await?;
    scheduler.start().await?;
    info!(app_root = %config.runtime.app_root, "taskdock running");

    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    Ok(())
}

/// Ensure the parent directory for a file path exists.
fn ensure_parent_dir(path: &str) {
    if let Some(parent) = std::path::Path::new(path).parent() {
        let _ = std::fs::create_dir_all(parent);
    }
}

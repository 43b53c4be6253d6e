pub mod config;
pub mod db;
pub mod remote;
pub mod study;
pub mod sync;

use std::path::PathBuf;
use std::time::Duration;

use chrono::{Local, Utc};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::AppConfig;
use crate::db::SqliteRepository;
use crate::remote::RemoteClient;
use crate::sync::SyncCoordinator;

/// How often the agent logs its status line.
const STATUS_LOG_INTERVAL: Duration = Duration::from_secs(60);

pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Run the sync agent until Ctrl-C.
///
/// The first argument, when given, is a TOML config file.
pub async fn run() -> anyhow::Result<()> {
    init_tracing();

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = AppConfig::load(config_path.as_deref())?;

    tracing::info!(path = %config.database_path.display(), "Opening local store...");
    let foreground = SqliteRepository::open(&config.database_path)?;
    let background = db::shared(SqliteRepository::open(&config.database_path)?);

    let evaluations = study::evaluate_all_sections(&foreground, Utc::now())?;
    let struggling = evaluations
        .iter()
        .filter(|e| e.result.needs_remediation)
        .count();
    let queue = study::build_study_queue(&foreground, &config.study, Local::now())?;
    tracing::info!(
        sections = evaluations.len(),
        struggling,
        due = queue.due_count,
        new = queue.new_count,
        remediation = queue.remediation_count,
        "Study queue ready"
    );

    let client = RemoteClient::new(config.remote.clone())?;
    tracing::info!(url = %config.remote.url, "Starting sync coordinator...");
    let mut coordinator = SyncCoordinator::start(client, background, config.sync.clone()).await;
    tracing::info!(status = %coordinator.status_line(), "Sync status");

    let mut ticker = tokio::time::interval(STATUS_LOG_INTERVAL);
    ticker.tick().await;
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                tracing::info!(status = %coordinator.status_line(), "Sync status");
            }
            signal = tokio::signal::ctrl_c() => {
                signal?;
                tracing::info!("Shutting down...");
                break;
            }
        }
    }

    coordinator.stop().await;
    Ok(())
}

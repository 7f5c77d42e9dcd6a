use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use genqueue::api::{ApiServer, AppState};
use genqueue::config::AppConfig;
use genqueue::logging::init_logging;
use genqueue::queue::{CommandExecutor, JobQueueManager, RetentionService};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config = AppConfig::from_env()?;

    // The guard flushes buffered log output on drop
    let (logging_config, _log_guard) = init_logging(config.log_dir())?;

    info!("Starting genqueue v{}", env!("CARGO_PKG_VERSION"));

    let root_token = CancellationToken::new();
    logging_config.start_retention_cleanup(root_token.child_token());

    let executor = CommandExecutor::new(config.pipeline.clone());
    info!(
        program = %executor.config().program,
        timeout_secs = ?executor.config().timeout_secs,
        "Using external generation pipeline"
    );
    let manager = JobQueueManager::new(config.queue.clone(), Arc::new(executor));

    let retention = RetentionService::new(config.retention.clone(), manager.clone());
    if retention.config().is_enabled() {
        info!(
            "Finished jobs are kept for {}s",
            retention.config().retention_secs
        );
    }
    retention.start_background_task(root_token.child_token());

    let state = AppState::new(manager.clone()).with_logging_config(logging_config);
    let server = ApiServer::new(config.api.clone(), state);

    let server_token = server.cancel_token();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for shutdown signal: {}", e);
            return;
        }
        info!("Received shutdown signal");
        server_token.cancel();
    });

    server.run().await?;

    root_token.cancel();
    manager.shutdown().await;

    info!("genqueue stopped");
    Ok(())
}

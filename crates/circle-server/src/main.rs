use std::sync::Arc;

use anyhow::Result;
use circle_server::{config, db, server, telemetry};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    telemetry::init(config::LogFormat::from_env())
        .map_err(|e| anyhow::anyhow!("Failed to init telemetry: {}", e))?;

    info!("Circle Server starting...");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let server_config = config::ServerConfig::from_env()
        .map_err(|e| anyhow::anyhow!("Failed to load server configuration: {}", e))?;
    server_config.log_config();

    let database = db::Database::open("circle", server_config.db_path.as_deref())
        .await
        .map_err(|e| anyhow::anyhow!("Failed to initialize database: {}", e))?;

    db::MigrationRunner::default()
        .run(&database)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to run migrations: {}", e))?;

    info!("Database initialized and migrations complete");

    let state = Arc::new(server::AppState::new(Arc::new(database), server_config));
    server::start(state).await?;

    info!("Circle Server stopped");
    Ok(())
}

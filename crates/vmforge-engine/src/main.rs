// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! VMForge Engine - VM Fleet Orchestration Daemon
//!
//! A long-running daemon responsible for:
//! - Lifecycle workflows (provision, power, migrate, reinstall, destroy)
//! - Cluster task polling and status reconciliation
//! - Fleet bandwidth accounting
//! - Scheduled backups and archive retention

use std::sync::Arc;
use tracing::{info, warn};

use vmforge_core::PostgresPersistence;
use vmforge_engine::backup_worker::BackupWorkerConfig;
use vmforge_engine::config::Config;
use vmforge_engine::control::proxmox::{ProxmoxClient, ProxmoxClientConfig};
use vmforge_engine::runtime::EngineRuntime;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "vmforge_engine=info".into()),
        )
        .init();

    // Load .env file if present
    if let Err(e) = dotenvy::dotenv() {
        warn!("No .env file loaded: {}", e);
    }

    // Load configuration
    let config = Config::from_env()?;

    info!(
        proxmox_host = %config.proxmox_host,
        backup_storage = %config.backup_storage,
        "Starting VMForge Engine"
    );

    // Connect to database
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await?;

    info!("Connected to database");

    vmforge_core::migrations::run_postgres(&pool).await?;

    info!("Database schema verified");

    let persistence = Arc::new(PostgresPersistence::new(pool));

    // Create cluster API client
    let mut client_config = ProxmoxClientConfig::new(
        &config.proxmox_host,
        &config.token_id,
        &config.token_secret,
    );
    client_config.insecure_tls = config.insecure_tls;
    if config.insecure_tls {
        warn!("TLS certificate verification disabled for cluster API");
    }
    let control = Arc::new(ProxmoxClient::new(client_config)?);

    // Start the runtime
    let runtime = EngineRuntime::builder()
        .persistence(persistence)
        .control(control)
        .backup_config(BackupWorkerConfig {
            storage: config.backup_storage.clone(),
            ..BackupWorkerConfig::default()
        })
        .build()?
        .start()
        .await;

    info!("Engine ready");

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    // Graceful shutdown
    runtime.shutdown().await?;

    info!("VMForge Engine shut down");

    Ok(())
}

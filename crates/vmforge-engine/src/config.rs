// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration for vmforge-engine.

/// Engine configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Database URL for the fleet database
    pub database_url: String,
    /// Hostname of the cluster API endpoint
    pub proxmox_host: String,
    /// API token id, `user@realm!tokenname`
    pub token_id: String,
    /// API token secret
    pub token_secret: String,
    /// Skip TLS certificate verification when talking to the cluster
    pub insecure_tls: bool,
    /// Storage identifier scheduled backups are written to
    pub backup_storage: String,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = std::env::var("VMFORGE_DATABASE_URL")
            .map_err(|_| ConfigError::MissingEnvVar("VMFORGE_DATABASE_URL"))?;

        let proxmox_host = std::env::var("VMFORGE_PROXMOX_HOST")
            .map_err(|_| ConfigError::MissingEnvVar("VMFORGE_PROXMOX_HOST"))?;

        let token_id = std::env::var("VMFORGE_PROXMOX_TOKEN_ID")
            .map_err(|_| ConfigError::MissingEnvVar("VMFORGE_PROXMOX_TOKEN_ID"))?;

        let token_secret = std::env::var("VMFORGE_PROXMOX_TOKEN_SECRET")
            .map_err(|_| ConfigError::MissingEnvVar("VMFORGE_PROXMOX_TOKEN_SECRET"))?;

        let insecure_tls = std::env::var("VMFORGE_PROXMOX_INSECURE_TLS")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);

        let backup_storage =
            std::env::var("VMFORGE_BACKUP_STORAGE").unwrap_or_else(|_| "local".to_string());

        Ok(Self {
            database_url,
            proxmox_host,
            token_id,
            token_secret,
            insecure_tls,
            backup_storage,
        })
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required environment variable is missing.
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(&'static str),
}

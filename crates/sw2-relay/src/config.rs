// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Relay configuration.
//!
//! Supports both programmatic and file-based (JSON) configuration.

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use sw2_policy::{PolicyConfig, PolicyError};
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error(transparent)]
    Policy(#[from] PolicyError),
}

/// Where accepted events are kept.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    /// SQLite database under `store_path`
    #[default]
    Sqlite,
    /// Process memory, lost on restart
    Memory,
}

/// Relay configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Address to bind to (default: 0.0.0.0)
    #[serde(default = "default_bind_address")]
    pub bind_address: IpAddr,

    /// TCP port to listen on (default: 3334)
    #[serde(default = "default_port")]
    pub port: u16,

    /// Maximum message size (bytes)
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,

    /// Maximum open subscriptions per connection
    #[serde(default = "default_max_subscriptions")]
    pub max_subscriptions: usize,

    /// Upper bound on events returned per filter
    #[serde(default = "default_max_query_limit")]
    pub max_query_limit: usize,

    /// Outbound queue depth per connection
    #[serde(default = "default_outbound_queue")]
    pub outbound_queue: usize,

    /// Event storage backend
    #[serde(default)]
    pub storage: StorageBackend,

    /// Directory holding the SQLite database (default: db)
    #[serde(default = "default_store_path")]
    pub store_path: PathBuf,

    /// Access policy
    #[serde(default)]
    pub policy: PolicyConfig,
}

fn default_bind_address() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

fn default_port() -> u16 {
    3334
}

fn default_max_message_size() -> usize {
    512 * 1024 // 512 KB
}

fn default_max_subscriptions() -> usize {
    20
}

fn default_max_query_limit() -> usize {
    500
}

fn default_outbound_queue() -> usize {
    256
}

fn default_store_path() -> PathBuf {
    PathBuf::from("db")
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
            max_message_size: default_max_message_size(),
            max_subscriptions: default_max_subscriptions(),
            max_query_limit: default_max_query_limit(),
            outbound_queue: default_outbound_queue(),
            storage: StorageBackend::default(),
            store_path: default_store_path(),
            policy: PolicyConfig::default(),
        }
    }
}

impl RelayConfig {
    /// Load configuration from a JSON file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a JSON file.
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.port)
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::Invalid("port cannot be 0".into()));
        }
        if self.max_message_size < 1024 {
            return Err(ConfigError::Invalid(
                "max_message_size must be at least 1024".into(),
            ));
        }
        if self.max_subscriptions == 0 {
            return Err(ConfigError::Invalid(
                "max_subscriptions cannot be 0".into(),
            ));
        }
        if self.max_query_limit == 0 {
            return Err(ConfigError::Invalid("max_query_limit cannot be 0".into()));
        }
        if self.outbound_queue == 0 {
            return Err(ConfigError::Invalid("outbound_queue cannot be 0".into()));
        }
        if self.storage == StorageBackend::Sqlite && self.store_path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("store_path cannot be empty".into()));
        }
        self.policy.validate()?;
        Ok(())
    }
}

// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # sw2 relay
//!
//! Event relay whose write and read access is gated by the whitelist policy
//! engine from `sw2-policy`.
//!
//! ## Architecture
//!
//! ```text
//! +-----------+   event / req / count / auth   +-------------+
//! |  Client   | -----------------------------> | RelayServer |
//! +-----------+                                +------+------+
//!       ^                                             |
//!       |   ok / event / eose / closed / auth         v
//!       +------------------------------- PolicyHooks + EventStore
//! ```
//!
//! Every connection gets a random challenge. Whether it is sent on connect,
//! sent after a refused read, or never sent at all is up to the policy.
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use sw2_policy::PolicyEngine;
//! use sw2_relay::{MemoryStore, RelayConfig, RelayInfo, RelayServer};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = RelayConfig::default();
//! let engine = PolicyEngine::from_config(&config.policy)?;
//! let server = RelayServer::new(
//!     config,
//!     RelayInfo::from_env(),
//!     Arc::new(engine),
//!     Arc::new(MemoryStore::new()),
//! )?;
//! server.run().await?;
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod client;
pub mod config;
pub mod event;
pub mod info;
pub mod server;
pub mod sqlite;
pub mod store;

pub use auth::{generate_challenge, AuthError, ConnectionAuth, AUTH_EVENT_KIND};
pub use client::RelayClient;
pub use config::{ConfigError, RelayConfig, StorageBackend};
pub use event::{Event, Filter, DELETION_KIND};
pub use info::RelayInfo;
pub use server::{ClientMessage, RelayMessage, RelayServer, ServerError};
pub use sqlite::SqliteStore;
pub use store::{EventStore, MemoryStore, SaveOutcome};

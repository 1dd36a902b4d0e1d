// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Policy engine: the single composition point of the policy layer.
//!
//! # Architecture
//!
//! ```text
//! PolicyEngine
//! +-- mode: PolicyMode                 (fixed at startup)
//! +-- write: WritePolicy               (Arc<Whitelist>, always present)
//! +-- read: Option<ReadPolicy>         (Arc<Whitelist>, modes B and C)
//! +-- connection: ConnectionPolicy     (challenge on connect, mode C)
//! ```
//!
//! All whitelists are loaded by [`PolicyEngine::from_config`] before the
//! engine is handed to a relay. After that the engine is immutable and is
//! shared between connection tasks without locking.

use crate::config::{PolicyConfig, PolicyMode};
use crate::decision::Decision;
use crate::error::PolicyError;
use crate::hooks::PolicyHooks;
use crate::identity::{Identity, IdentityResolver, RequestContext};
use crate::policy::{ConnectionPolicy, ReadPolicy, WritePolicy};
use crate::whitelist::{Whitelist, WhitelistSource};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Configured policy layer for one relay process.
#[derive(Debug, Clone)]
pub struct PolicyEngine {
    mode: PolicyMode,
    write: WritePolicy,
    read: Option<ReadPolicy>,
    connection: ConnectionPolicy,
}

impl PolicyEngine {
    /// Load every whitelist the configured mode needs and build the engine.
    ///
    /// Fails if a required artifact is missing or malformed. In
    /// `mandatory_read` mode a missing write artifact (and fallback) yields
    /// an empty write whitelist, i.e. open write.
    pub fn from_config(config: &PolicyConfig) -> Result<Self, PolicyError> {
        config.validate()?;
        let profile = config.mode.profile();

        let (write_primary, write_fallback) = config.write_artifacts();
        let write_whitelist = match WhitelistSource::load(write_primary, write_fallback) {
            Ok(wl) => wl,
            Err(e) if e.is_not_found() && profile.write_optional => {
                warn!("{}; accepting writes from any identity", e);
                Whitelist::default()
            }
            Err(e) => return Err(e),
        };

        let mut builder = Self::builder(config.mode).write_whitelist(write_whitelist);
        if let Some(read_path) = config.read_artifact() {
            builder = builder.read_whitelist(WhitelistSource::load(read_path, None)?);
        }

        let engine = builder.build()?;
        info!(
            "Policy mode {}: {} write identities{}, read gating {}",
            engine.mode,
            engine.write.whitelist().len(),
            if engine.write.is_open() { " (open)" } else { "" },
            match &engine.read {
                Some(read) if read.auth_required() => "with mandatory auth",
                Some(_) => "enabled",
                None => "disabled",
            }
        );
        Ok(engine)
    }

    /// Build an engine from in-memory whitelists.
    pub fn builder(mode: PolicyMode) -> PolicyEngineBuilder {
        PolicyEngineBuilder {
            mode,
            write_whitelist: None,
            read_whitelist: None,
        }
    }

    pub fn mode(&self) -> PolicyMode {
        self.mode
    }

    pub fn write_policy(&self) -> &WritePolicy {
        &self.write
    }

    pub fn read_policy(&self) -> Option<&ReadPolicy> {
        self.read.as_ref()
    }

    pub fn connection_policy(&self) -> &ConnectionPolicy {
        &self.connection
    }

    /// Every identity the engine knows about, write list first.
    pub fn whitelisted_identities(&self) -> impl Iterator<Item = &Identity> {
        let read = self
            .read
            .iter()
            .flat_map(|r| r.whitelist().identities().iter());
        self.write.whitelist().identities().iter().chain(read)
    }
}

impl PolicyHooks for PolicyEngine {
    fn on_connect(&self, ctx: &dyn RequestContext) {
        self.connection.on_connect(ctx);
    }

    fn on_submit_event(&self, identity: &Identity) -> Decision {
        let decision = self.write.admit(identity);
        if let Decision::Reject(reason) = decision {
            debug!("Rejected event from '{}': {}", identity, reason);
        }
        decision
    }

    fn on_submit_filter(&self, ctx: &dyn RequestContext) -> Decision {
        let Some(read) = &self.read else {
            return Decision::Admit;
        };
        let reader = IdentityResolver::resolve(ctx);
        let decision = read.admit(&reader);
        if let Decision::Reject(reason) = decision {
            debug!("Rejected filter from '{}': {}", reader, reason);
        }
        decision
    }
}

/// Builder for [`PolicyEngine`].
#[derive(Debug)]
pub struct PolicyEngineBuilder {
    mode: PolicyMode,
    write_whitelist: Option<Whitelist>,
    read_whitelist: Option<Whitelist>,
}

impl PolicyEngineBuilder {
    /// Write whitelist (defaults to empty, i.e. open write).
    pub fn write_whitelist(mut self, whitelist: Whitelist) -> Self {
        self.write_whitelist = Some(whitelist);
        self
    }

    /// Read whitelist. Required when the mode gates reads.
    pub fn read_whitelist(mut self, whitelist: Whitelist) -> Self {
        self.read_whitelist = Some(whitelist);
        self
    }

    pub fn build(self) -> Result<PolicyEngine, PolicyError> {
        let profile = self.mode.profile();

        let read = match (profile.read_gating, self.read_whitelist) {
            (Some(gating), Some(wl)) => Some(ReadPolicy::new(Arc::new(wl), gating.auth_required)),
            (Some(_), None) => {
                return Err(PolicyError::InvalidConfig(format!(
                    "{} mode requires a read whitelist",
                    self.mode
                )))
            }
            (None, Some(_)) => {
                return Err(PolicyError::InvalidConfig(format!(
                    "{} mode does not gate reads",
                    self.mode
                )))
            }
            (None, None) => None,
        };

        Ok(PolicyEngine {
            mode: self.mode,
            write: WritePolicy::new(Arc::new(self.write_whitelist.unwrap_or_default())),
            read,
            connection: ConnectionPolicy::new(profile.challenge_on_connect),
        })
    }
}

// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Identity whitelists and the artifacts they are loaded from.
//!
//! # Artifact Format
//!
//! ```json
//! {
//!   "pubkeys": [
//!     "3bf0c63fcb93463407af97a5e5ee64fa883d107ef9e558472c4eb9aaaefa459d",
//!     "82341f882b6eabcd2ba7f1ef90aad961cf074af15b9ef44a09f9d2a8fbfbe6a2"
//!   ]
//! }
//! ```
//!
//! Whitelists are loaded once at startup and never change afterwards.

use crate::error::PolicyError;
use crate::identity::Identity;
use serde::Deserialize;
use std::collections::HashSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

/// On-disk shape of a whitelist artifact.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct WhitelistDocument {
    pubkeys: Vec<Identity>,
}

/// Immutable, ordered list of authorized identities.
///
/// An empty whitelist is meaningful: write gating treats it as "anyone may
/// write", read gating as "any authenticated identity may read".
#[derive(Debug, Clone, Default)]
pub struct Whitelist {
    ordered: Vec<Identity>,
    index: HashSet<Identity>,
}

impl Whitelist {
    /// Build a whitelist from in-memory identities, keeping their order.
    pub fn from_identities<I, T>(identities: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Identity>,
    {
        let ordered: Vec<Identity> = identities.into_iter().map(Into::into).collect();
        let index = ordered.iter().cloned().collect();
        Self { ordered, index }
    }

    /// Parse an artifact's contents. `origin` is only used for diagnostics.
    pub fn parse(content: &str, origin: &Path) -> Result<Self, PolicyError> {
        let doc: WhitelistDocument =
            serde_json::from_str(content).map_err(|e| PolicyError::MalformedConfig {
                path: origin.to_path_buf(),
                reason: e.to_string(),
            })?;
        Ok(Self::from_identities(doc.pubkeys))
    }

    /// Exact-match membership test.
    pub fn contains(&self, identity: &Identity) -> bool {
        self.index.contains(identity)
    }

    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    /// Identities in artifact order.
    pub fn identities(&self) -> &[Identity] {
        &self.ordered
    }
}

/// Loads whitelists from JSON artifacts on disk.
#[derive(Debug, Clone, Copy, Default)]
pub struct WhitelistSource;

impl WhitelistSource {
    /// Load the artifact at `primary`, retrying at `fallback` when `primary`
    /// does not exist.
    ///
    /// Returns [`PolicyError::ConfigNotFound`] only when every candidate is
    /// absent; any other read failure is reported as [`PolicyError::Io`].
    pub fn load(primary: &Path, fallback: Option<&Path>) -> Result<Whitelist, PolicyError> {
        match read_artifact(primary)? {
            Some(content) => {
                debug!("Loaded whitelist artifact {}", primary.display());
                return Whitelist::parse(&content, primary);
            }
            None => debug!("Whitelist artifact {} not found", primary.display()),
        }

        if let Some(fallback) = fallback {
            if let Some(content) = read_artifact(fallback)? {
                debug!("Loaded fallback whitelist artifact {}", fallback.display());
                return Whitelist::parse(&content, fallback);
            }
        }

        Err(PolicyError::ConfigNotFound {
            path: primary.to_path_buf(),
            fallback: fallback.map(PathBuf::from),
        })
    }
}

/// `Ok(None)` means the file does not exist.
fn read_artifact(path: &Path) -> Result<Option<String>, PolicyError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(source) => Err(PolicyError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Policy engine error types.
//!
//! Only configuration loading can fail. Per-request access decisions are
//! never errors; they are returned as [`crate::Decision`] values.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while loading whitelists or building the engine.
///
/// Every variant is fatal to process start: the relay must not serve
/// requests with a partially-loaded policy.
#[derive(Debug, Error)]
pub enum PolicyError {
    /// Whitelist artifact (and its fallback, if any) does not exist.
    #[error("whitelist not found: {}", display_paths(.path, .fallback))]
    ConfigNotFound {
        path: PathBuf,
        fallback: Option<PathBuf>,
    },

    /// Artifact exists but is not a `{"pubkeys": [...]}` document.
    #[error("malformed whitelist {}: {reason}", .path.display())]
    MalformedConfig { path: PathBuf, reason: String },

    /// Any other I/O failure while reading an artifact.
    #[error("could not read whitelist {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Policy configuration values are inconsistent.
    #[error("invalid policy configuration: {0}")]
    InvalidConfig(String),
}

fn display_paths(path: &std::path::Path, fallback: &Option<PathBuf>) -> String {
    match fallback {
        Some(fb) => format!("{} (fallback {})", path.display(), fb.display()),
        None => path.display().to_string(),
    }
}

impl PolicyError {
    /// True when the error only means "artifact absent".
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::ConfigNotFound { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_display_mentions_fallback() {
        let err = PolicyError::ConfigNotFound {
            path: PathBuf::from("write_whitelist.json"),
            fallback: Some(PathBuf::from("whitelist.json")),
        };
        let msg = err.to_string();
        assert!(msg.contains("write_whitelist.json"));
        assert!(msg.contains("fallback whitelist.json"));
        assert!(err.is_not_found());
    }

    #[test]
    fn test_malformed_display() {
        let err = PolicyError::MalformedConfig {
            path: PathBuf::from("whitelist.json"),
            reason: "missing field `pubkeys`".into(),
        };
        assert!(err.to_string().contains("malformed whitelist whitelist.json"));
        assert!(!err.is_not_found());
    }
}

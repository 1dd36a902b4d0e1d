// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Relay information document.

use serde::{Deserialize, Serialize};

pub const SOFTWARE_URL: &str = "https://github.com/bitvora/sw2";

/// Descriptive metadata served in reply to an `info` request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayInfo {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Operator's public key
    #[serde(default)]
    pub pubkey: String,
    #[serde(default)]
    pub contact: String,
    #[serde(default)]
    pub icon: String,
    pub software: String,
    pub version: String,
    /// Protocol features implemented by the relay (NIP numbers)
    #[serde(default)]
    pub supported_nips: Vec<u32>,
}

impl RelayInfo {
    /// Read `RELAY_NAME`, `RELAY_PUBKEY`, `RELAY_ICON`, `RELAY_CONTACT` and
    /// `RELAY_DESCRIPTION` from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable lookup. Unset variables are empty.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).unwrap_or_default();
        Self {
            name: var("RELAY_NAME"),
            description: var("RELAY_DESCRIPTION"),
            pubkey: var("RELAY_PUBKEY"),
            contact: var("RELAY_CONTACT"),
            icon: var("RELAY_ICON"),
            software: SOFTWARE_URL.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            supported_nips: vec![1, 9, 11, 42, 45],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_from_lookup() {
        let vars: HashMap<&str, &str> = [
            ("RELAY_NAME", "sw2 test"),
            ("RELAY_PUBKEY", "abcd"),
            ("RELAY_CONTACT", "ops@example.org"),
        ]
        .into_iter()
        .collect();

        let info = RelayInfo::from_lookup(|k| vars.get(k).map(|v| v.to_string()));
        assert_eq!(info.name, "sw2 test");
        assert_eq!(info.pubkey, "abcd");
        assert_eq!(info.contact, "ops@example.org");
        assert!(info.icon.is_empty());
        assert!(info.description.is_empty());
        assert_eq!(info.software, SOFTWARE_URL);
        assert_eq!(info.version, env!("CARGO_PKG_VERSION"));
    }
}

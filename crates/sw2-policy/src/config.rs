// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Policy configuration.
//!
//! The deployment mode is chosen once at startup and fixed for the life of
//! the process. Each mode is a row of data ([`ModeProfile`]) rather than a
//! separate code path.

use crate::error::PolicyError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Supported deployment modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyMode {
    /// Write whitelist only; reads are open.
    #[default]
    WriteOnly,
    /// Write whitelist plus read whitelist; no challenge on connect.
    WriteRead,
    /// Write whitelist (with fallback, open when empty) plus read whitelist
    /// with mandatory authentication, challenged on connect.
    MandatoryRead,
}

impl PolicyMode {
    pub const ALL: [PolicyMode; 3] = [Self::WriteOnly, Self::WriteRead, Self::MandatoryRead];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WriteOnly => "write_only",
            Self::WriteRead => "write_read",
            Self::MandatoryRead => "mandatory_read",
        }
    }

    /// The table row describing this mode.
    pub fn profile(&self) -> ModeProfile {
        match self {
            Self::WriteOnly => ModeProfile {
                write_source: WriteSource::Generic,
                write_optional: false,
                read_gating: None,
                challenge_on_connect: false,
            },
            Self::WriteRead => ModeProfile {
                write_source: WriteSource::Generic,
                write_optional: false,
                read_gating: Some(ReadGating {
                    auth_required: false,
                }),
                challenge_on_connect: false,
            },
            Self::MandatoryRead => ModeProfile {
                write_source: WriteSource::DedicatedWithFallback,
                write_optional: true,
                read_gating: Some(ReadGating {
                    auth_required: true,
                }),
                challenge_on_connect: true,
            },
        }
    }
}

impl fmt::Display for PolicyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for PolicyMode {
    type Err = PolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "write_only" | "write-only" | "a" | "A" => Ok(Self::WriteOnly),
            "write_read" | "write-read" | "b" | "B" => Ok(Self::WriteRead),
            "mandatory_read" | "mandatory-read" | "c" | "C" => Ok(Self::MandatoryRead),
            other => Err(PolicyError::InvalidConfig(format!(
                "unknown policy mode '{}'",
                other
            ))),
        }
    }
}

/// Which artifact the write whitelist comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteSource {
    /// `whitelist_path` only.
    Generic,
    /// `write_whitelist_path`, falling back to `whitelist_path`.
    DedicatedWithFallback,
}

/// Read gating parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadGating {
    pub auth_required: bool,
}

/// Static description of a deployment mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeProfile {
    pub write_source: WriteSource,
    /// Missing write artifacts mean "open write" instead of a startup failure.
    pub write_optional: bool,
    pub read_gating: Option<ReadGating>,
    pub challenge_on_connect: bool,
}

/// Policy section of the relay configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Deployment mode (default: write_only)
    #[serde(default)]
    pub mode: PolicyMode,

    /// Generic whitelist artifact
    #[serde(default = "default_whitelist_path")]
    pub whitelist_path: PathBuf,

    /// Dedicated write whitelist artifact (mandatory_read mode only)
    #[serde(default = "default_write_whitelist_path")]
    pub write_whitelist_path: PathBuf,

    /// Read whitelist artifact (write_read and mandatory_read modes)
    #[serde(default = "default_read_whitelist_path")]
    pub read_whitelist_path: PathBuf,
}

fn default_whitelist_path() -> PathBuf {
    PathBuf::from("whitelist.json")
}

fn default_write_whitelist_path() -> PathBuf {
    PathBuf::from("write_whitelist.json")
}

fn default_read_whitelist_path() -> PathBuf {
    PathBuf::from("read_whitelist.json")
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            mode: PolicyMode::default(),
            whitelist_path: default_whitelist_path(),
            write_whitelist_path: default_write_whitelist_path(),
            read_whitelist_path: default_read_whitelist_path(),
        }
    }
}

impl PolicyConfig {
    /// Config for `mode` with default artifact paths.
    pub fn with_mode(mode: PolicyMode) -> Self {
        Self {
            mode,
            ..Default::default()
        }
    }

    /// Resolve relative artifact paths against `base`.
    pub fn relative_to(mut self, base: &Path) -> Self {
        for path in [
            &mut self.whitelist_path,
            &mut self.write_whitelist_path,
            &mut self.read_whitelist_path,
        ] {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        }
        self
    }

    /// Primary and fallback artifacts for the write whitelist.
    pub fn write_artifacts(&self) -> (&Path, Option<&Path>) {
        match self.mode.profile().write_source {
            WriteSource::Generic => (self.whitelist_path.as_path(), None),
            WriteSource::DedicatedWithFallback => (
                self.write_whitelist_path.as_path(),
                Some(self.whitelist_path.as_path()),
            ),
        }
    }

    /// Read whitelist artifact, if the mode gates reads.
    pub fn read_artifact(&self) -> Option<&Path> {
        self.mode
            .profile()
            .read_gating
            .map(|_| self.read_whitelist_path.as_path())
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), PolicyError> {
        if self.whitelist_path.as_os_str().is_empty() {
            return Err(PolicyError::InvalidConfig(
                "whitelist_path cannot be empty".into(),
            ));
        }
        if self.mode == PolicyMode::MandatoryRead && self.write_whitelist_path.as_os_str().is_empty()
        {
            return Err(PolicyError::InvalidConfig(
                "write_whitelist_path required in mandatory_read mode".into(),
            ));
        }
        if let Some(read) = self.read_artifact() {
            if read.as_os_str().is_empty() {
                return Err(PolicyError::InvalidConfig(format!(
                    "read_whitelist_path required in {} mode",
                    self.mode
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PolicyConfig::default();
        assert_eq!(config.mode, PolicyMode::WriteOnly);
        assert_eq!(config.whitelist_path, PathBuf::from("whitelist.json"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_mode_profiles() {
        let a = PolicyMode::WriteOnly.profile();
        assert!(a.read_gating.is_none());
        assert!(!a.challenge_on_connect);
        assert!(!a.write_optional);

        let b = PolicyMode::WriteRead.profile();
        assert_eq!(
            b.read_gating,
            Some(ReadGating {
                auth_required: false
            })
        );
        assert!(!b.challenge_on_connect);

        let c = PolicyMode::MandatoryRead.profile();
        assert_eq!(
            c.read_gating,
            Some(ReadGating {
                auth_required: true
            })
        );
        assert!(c.challenge_on_connect);
        assert!(c.write_optional);
        assert_eq!(c.write_source, WriteSource::DedicatedWithFallback);
    }

    #[test]
    fn test_any_read_gating_challenges_only_when_auth_required() {
        for mode in PolicyMode::ALL {
            let p = mode.profile();
            let auth_required = p.read_gating.map(|g| g.auth_required).unwrap_or(false);
            assert_eq!(p.challenge_on_connect, auth_required, "{mode}");
        }
    }

    #[test]
    fn test_write_artifacts_per_mode() {
        let a = PolicyConfig::with_mode(PolicyMode::WriteOnly);
        assert_eq!(a.write_artifacts(), (Path::new("whitelist.json"), None));
        assert!(a.read_artifact().is_none());

        let c = PolicyConfig::with_mode(PolicyMode::MandatoryRead);
        assert_eq!(
            c.write_artifacts(),
            (
                Path::new("write_whitelist.json"),
                Some(Path::new("whitelist.json"))
            )
        );
        assert_eq!(c.read_artifact(), Some(Path::new("read_whitelist.json")));
    }

    #[test]
    fn test_mode_from_str() {
        assert_eq!(
            "mandatory_read".parse::<PolicyMode>().unwrap(),
            PolicyMode::MandatoryRead
        );
        assert_eq!("B".parse::<PolicyMode>().unwrap(), PolicyMode::WriteRead);
        assert!("everything".parse::<PolicyMode>().is_err());
    }

    #[test]
    fn test_config_serialization() {
        let json = r#"{"mode": "write_read", "read_whitelist_path": "readers.json"}"#;
        let config: PolicyConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.mode, PolicyMode::WriteRead);
        assert_eq!(config.read_whitelist_path, PathBuf::from("readers.json"));
        assert_eq!(config.whitelist_path, PathBuf::from("whitelist.json"));
    }

    #[test]
    fn test_relative_to() {
        let config = PolicyConfig {
            read_whitelist_path: PathBuf::from("/etc/sw2/read.json"),
            ..Default::default()
        }
        .relative_to(Path::new("/srv/relay"));
        assert_eq!(
            config.whitelist_path,
            PathBuf::from("/srv/relay/whitelist.json")
        );
        assert_eq!(
            config.read_whitelist_path,
            PathBuf::from("/etc/sw2/read.json")
        );
    }

    #[test]
    fn test_validation_empty_read_path() {
        let config = PolicyConfig {
            mode: PolicyMode::WriteRead,
            read_whitelist_path: PathBuf::new(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}

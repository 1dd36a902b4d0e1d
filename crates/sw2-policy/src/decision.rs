// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Admission decisions returned by every policy check.

use std::fmt;

/// Why a request was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DenyReason {
    /// Submitted event carries no identity.
    NoIdentity,
    /// Submitter is absent from a non-empty write whitelist.
    NotWhitelisted,
    /// Read requires an authenticated connection and there is none.
    AuthRequired,
    /// Reader is absent from the read whitelist, or anonymous.
    ReadNotAuthorized,
}

impl DenyReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoIdentity => "no identity",
            Self::NotWhitelisted => "identity not whitelisted",
            Self::AuthRequired => "authentication required",
            Self::ReadNotAuthorized => "not authorized to read",
        }
    }
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a write or read check.
///
/// A rejection is an access-denied value for the transport to relay to the
/// requester, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub enum Decision {
    Admit,
    Reject(DenyReason),
}

impl Decision {
    pub fn is_rejected(&self) -> bool {
        matches!(self, Self::Reject(_))
    }

    pub fn is_admitted(&self) -> bool {
        !self.is_rejected()
    }

    /// Human-readable reason; empty when admitted.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Admit => "",
            Self::Reject(reason) => reason.as_str(),
        }
    }

    pub fn deny_reason(&self) -> Option<DenyReason> {
        match self {
            Self::Admit => None,
            Self::Reject(reason) => Some(*reason),
        }
    }

    /// The `(reject, reason)` pair view.
    pub fn as_pair(&self) -> (bool, &'static str) {
        (self.is_rejected(), self.reason())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reason_strings() {
        assert_eq!(DenyReason::NoIdentity.to_string(), "no identity");
        assert_eq!(
            DenyReason::NotWhitelisted.to_string(),
            "identity not whitelisted"
        );
        assert_eq!(
            DenyReason::AuthRequired.to_string(),
            "authentication required"
        );
        assert_eq!(
            DenyReason::ReadNotAuthorized.to_string(),
            "not authorized to read"
        );
    }

    #[test]
    fn test_admit_has_empty_reason() {
        assert_eq!(Decision::Admit.as_pair(), (false, ""));
        assert!(Decision::Admit.deny_reason().is_none());
    }

    #[test]
    fn test_reject_pair() {
        let d = Decision::Reject(DenyReason::NotWhitelisted);
        assert!(d.is_rejected());
        assert!(!d.is_admitted());
        assert_eq!(d.as_pair(), (true, "identity not whitelisted"));
    }
}

// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Identities and the per-request context supplied by the transport.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque public identity of a publisher or reader (a hex public key on the wire).
///
/// Compared by exact, case-sensitive string equality. The empty string is
/// the "no identity" value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    /// Create an identity from any string-like value.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The "no identity" value.
    pub fn empty() -> Self {
        Self(String::new())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Identity {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for Identity {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl AsRef<str> for Identity {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Per-connection state owned by the transport and authentication collaborators.
///
/// The policy engine never constructs a context; it only reads the
/// authenticated identity and may ask for an authentication challenge.
pub trait RequestContext {
    /// Identity established by the authentication handshake, if any.
    fn authenticated_identity(&self) -> Option<&Identity>;

    /// Ask the authentication collaborator to start its handshake.
    fn request_challenge(&self);
}

/// Resolves the authenticated identity of a request.
///
/// Never blocks and never fails: a connection that has not authenticated
/// resolves to [`Identity::empty`].
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityResolver;

impl IdentityResolver {
    pub fn resolve(ctx: &dyn RequestContext) -> Identity {
        ctx.authenticated_identity()
            .cloned()
            .unwrap_or_else(Identity::empty)
    }
}

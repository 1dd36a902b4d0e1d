// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Write, read and connection policies.
//!
//! Each policy holds a shared, immutable whitelist and computes a
//! [`Decision`] synchronously from in-memory state. Nothing here locks,
//! blocks or performs I/O, so policies can be evaluated concurrently from
//! any number of connection tasks.

use crate::decision::{Decision, DenyReason};
use crate::identity::{Identity, RequestContext};
use crate::whitelist::Whitelist;
use std::sync::Arc;

/// Decide whether an event declared by `submitter` may be stored.
///
/// Rules, in order:
/// 1. empty identity: reject ("no identity")
/// 2. empty whitelist: admit (open write)
/// 3. identity whitelisted: admit
/// 4. otherwise: reject ("identity not whitelisted")
pub fn admit_write(submitter: &Identity, whitelist: &Whitelist) -> Decision {
    if submitter.is_empty() {
        return Decision::Reject(DenyReason::NoIdentity);
    }
    if whitelist.is_empty() || whitelist.contains(submitter) {
        return Decision::Admit;
    }
    Decision::Reject(DenyReason::NotWhitelisted)
}

/// Decide whether a connection authenticated as `reader` may query.
///
/// Rules, in order:
/// 1. `auth_required` and anonymous: reject ("authentication required")
/// 2. anonymous: reject ("not authorized to read"); an empty identity is
///    never treated as a member of any whitelist, even an empty one
/// 3. empty whitelist: admit (any authenticated identity)
/// 4. identity whitelisted: admit
/// 5. otherwise: reject ("not authorized to read")
pub fn admit_read(reader: &Identity, whitelist: &Whitelist, auth_required: bool) -> Decision {
    if reader.is_empty() {
        return if auth_required {
            Decision::Reject(DenyReason::AuthRequired)
        } else {
            Decision::Reject(DenyReason::ReadNotAuthorized)
        };
    }
    if whitelist.is_empty() || whitelist.contains(reader) {
        return Decision::Admit;
    }
    Decision::Reject(DenyReason::ReadNotAuthorized)
}

/// Gates event publication against the write whitelist.
#[derive(Debug, Clone)]
pub struct WritePolicy {
    whitelist: Arc<Whitelist>,
}

impl WritePolicy {
    pub fn new(whitelist: Arc<Whitelist>) -> Self {
        Self { whitelist }
    }

    pub fn admit(&self, submitter: &Identity) -> Decision {
        admit_write(submitter, &self.whitelist)
    }

    pub fn whitelist(&self) -> &Whitelist {
        &self.whitelist
    }

    /// True when every non-empty identity may publish.
    pub fn is_open(&self) -> bool {
        self.whitelist.is_empty()
    }
}

/// Gates queries and subscriptions against the read whitelist.
#[derive(Debug, Clone)]
pub struct ReadPolicy {
    whitelist: Arc<Whitelist>,
    auth_required: bool,
}

impl ReadPolicy {
    pub fn new(whitelist: Arc<Whitelist>, auth_required: bool) -> Self {
        Self {
            whitelist,
            auth_required,
        }
    }

    pub fn admit(&self, reader: &Identity) -> Decision {
        admit_read(reader, &self.whitelist, self.auth_required)
    }

    pub fn whitelist(&self) -> &Whitelist {
        &self.whitelist
    }

    pub fn auth_required(&self) -> bool {
        self.auth_required
    }
}

/// Requests an authentication challenge when a connection is opened.
///
/// Never rejects the connection itself.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConnectionPolicy {
    challenge_on_connect: bool,
}

impl ConnectionPolicy {
    pub fn new(challenge_on_connect: bool) -> Self {
        Self {
            challenge_on_connect,
        }
    }

    pub fn on_connect(&self, ctx: &dyn RequestContext) {
        if self.challenge_on_connect {
            ctx.request_challenge();
        }
    }

    pub fn challenges_on_connect(&self) -> bool {
        self.challenge_on_connect
    }
}

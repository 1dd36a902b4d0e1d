// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Extension points a relay invokes on the policy layer.
//!
//! A relay receives exactly one `Arc<dyn PolicyHooks>` when it is built and
//! calls each hook once per connection, event or filter.

use crate::decision::Decision;
use crate::identity::{Identity, RequestContext};

/// Hooks invoked by the transport.
///
/// Implementations must be safe to call from many connection tasks at once.
pub trait PolicyHooks: Send + Sync {
    /// New connection accepted. May request an authentication challenge.
    fn on_connect(&self, ctx: &dyn RequestContext);

    /// Event submitted by `identity`, checked before it is persisted.
    fn on_submit_event(&self, identity: &Identity) -> Decision;

    /// Query or subscription submitted on `ctx`, checked before storage is
    /// consulted.
    fn on_submit_filter(&self, ctx: &dyn RequestContext) -> Decision;
}

/// Admits everything and never challenges.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenPolicy;

impl PolicyHooks for OpenPolicy {
    fn on_connect(&self, _ctx: &dyn RequestContext) {}

    fn on_submit_event(&self, _identity: &Identity) -> Decision {
        Decision::Admit
    }

    fn on_submit_filter(&self, _ctx: &dyn RequestContext) -> Decision {
        Decision::Admit
    }
}

// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! sw2 access policy engine
//!
//! Decides, per connection and per request, whether an event relay may
//! accept a write (event publication) or a read (query/subscription), based
//! on whitelists of public identities.
//!
//! # Modes
//!
//! | Mode | Write gating | Read gating | Challenge on connect |
//! |------|--------------|-------------|----------------------|
//! | `write_only` | whitelist | none | no |
//! | `write_read` | whitelist | whitelist, auth optional | no |
//! | `mandatory_read` | whitelist with fallback, open if empty | whitelist, auth required | yes |
//!
//! # Quick Start
//!
//! ```no_run
//! use sw2_policy::{PolicyConfig, PolicyEngine, PolicyHooks, PolicyMode, Identity};
//!
//! let engine = PolicyEngine::from_config(&PolicyConfig::with_mode(PolicyMode::WriteOnly))?;
//! let decision = engine.on_submit_event(&Identity::from("3bf0c63f..."));
//! if decision.is_rejected() {
//!     println!("blocked: {}", decision.reason());
//! }
//! # Ok::<(), sw2_policy::PolicyError>(())
//! ```

pub mod config;
pub mod decision;
pub mod engine;
pub mod error;
pub mod hooks;
pub mod identity;
pub mod policy;
pub mod whitelist;

pub use config::{ModeProfile, PolicyConfig, PolicyMode, ReadGating, WriteSource};
pub use decision::{Decision, DenyReason};
pub use engine::{PolicyEngine, PolicyEngineBuilder};
pub use error::PolicyError;
pub use hooks::{OpenPolicy, PolicyHooks};
pub use identity::{Identity, IdentityResolver, RequestContext};
pub use policy::{admit_read, admit_write, ConnectionPolicy, ReadPolicy, WritePolicy};
pub use whitelist::{Whitelist, WhitelistSource};

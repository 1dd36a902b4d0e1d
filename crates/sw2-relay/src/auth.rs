// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Challenge-response authentication of relay connections.
//!
//! # Protocol
//!
//! ```text
//! Client                                 Relay
//!    |                                      |
//!    |<------ 1. auth {challenge} ----------| (on connect, or when a read
//!    |                                      |  is refused for lack of auth)
//!    |------- 2. auth {event} ------------->| kind 22242, tag
//!    |                                      | ["challenge", <challenge>]
//!    |<------ 3. ok {event_id, accepted} ---|
//! ```
//!
//! Signatures are not verified; an echoed challenge inside a fresh auth
//! event is enough to bind the event's pubkey to the connection.

use crate::event::Event;
use ring::rand::{SecureRandom, SystemRandom};
use std::sync::atomic::{AtomicBool, Ordering};
use sw2_policy::{Identity, RequestContext};
use thiserror::Error;

/// Kind of a client authentication event.
pub const AUTH_EVENT_KIND: u32 = 22242;

/// Maximum distance between an auth event's `created_at` and now (seconds).
pub const AUTH_MAX_SKEW_SECS: u64 = 600;

/// Authentication errors, reported back to the client in an `ok` message.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("random generator unavailable")]
    Rng,

    #[error("auth event must be kind 22242, got {0}")]
    WrongKind(u32),

    #[error("auth event has no pubkey")]
    MissingPubkey,

    #[error("challenge mismatch")]
    ChallengeMismatch,

    #[error("auth event created_at too far from current time")]
    Stale,
}

/// Generate a fresh 32-byte challenge, hex encoded.
pub fn generate_challenge() -> Result<String, AuthError> {
    let rng = SystemRandom::new();
    let mut nonce = [0u8; 32];
    rng.fill(&mut nonce).map_err(|_| AuthError::Rng)?;
    Ok(hex::encode(nonce))
}

/// Authentication state of one connection.
///
/// Implements [`RequestContext`] so the policy layer can read the
/// authenticated identity and ask for a challenge.
#[derive(Debug)]
pub struct ConnectionAuth {
    challenge: String,
    identity: Option<Identity>,
    challenge_requested: AtomicBool,
    challenge_sent: bool,
}

impl ConnectionAuth {
    pub fn new(challenge: String) -> Self {
        Self {
            challenge,
            identity: None,
            challenge_requested: AtomicBool::new(false),
            challenge_sent: false,
        }
    }

    pub fn challenge(&self) -> &str {
        &self.challenge
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    /// Returns true once per requested challenge that has not yet been sent.
    pub fn take_challenge_request(&mut self) -> bool {
        let requested = self.challenge_requested.swap(false, Ordering::SeqCst);
        if requested && !self.challenge_sent {
            self.challenge_sent = true;
            return true;
        }
        false
    }

    /// Validate an auth event against this connection's challenge and, on
    /// success, bind its pubkey to the connection.
    pub fn authenticate(&mut self, event: &Event, now_secs: u64) -> Result<&Identity, AuthError> {
        if event.kind != AUTH_EVENT_KIND {
            return Err(AuthError::WrongKind(event.kind));
        }
        if event.pubkey.is_empty() {
            return Err(AuthError::MissingPubkey);
        }
        if event.tag_value("challenge") != Some(self.challenge.as_str()) {
            return Err(AuthError::ChallengeMismatch);
        }
        if event.created_at.abs_diff(now_secs) > AUTH_MAX_SKEW_SECS {
            return Err(AuthError::Stale);
        }
        Ok(&*self.identity.insert(event.pubkey.clone()))
    }
}

impl RequestContext for ConnectionAuth {
    fn authenticated_identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    fn request_challenge(&self) {
        self.challenge_requested.store(true, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::tests::event;

    fn auth_event(pubkey: &str, challenge: &str, created_at: u64) -> Event {
        let mut ev = event("auth1", pubkey, created_at, AUTH_EVENT_KIND);
        ev.tags = vec![
            vec!["relay".into(), "ws://localhost:3334".into()],
            vec!["challenge".into(), challenge.into()],
        ];
        ev
    }

    #[test]
    fn test_challenge_is_random_hex() {
        let a = generate_challenge().unwrap();
        let b = generate_challenge().unwrap();
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[test]
    fn test_authenticate_success() {
        let mut auth = ConnectionAuth::new("c1".into());
        assert!(auth.authenticated_identity().is_none());
        let id = auth.authenticate(&auth_event("pub1", "c1", 1000), 1000).unwrap();
        assert_eq!(id, &Identity::from("pub1"));
        assert_eq!(auth.authenticated_identity(), Some(&Identity::from("pub1")));
    }

    #[test]
    fn test_authenticate_failures() {
        let mut auth = ConnectionAuth::new("c1".into());
        assert_eq!(
            auth.authenticate(&auth_event("pub1", "other", 1000), 1000),
            Err(AuthError::ChallengeMismatch)
        );
        assert_eq!(
            auth.authenticate(&auth_event("", "c1", 1000), 1000),
            Err(AuthError::MissingPubkey)
        );
        assert_eq!(
            auth.authenticate(&auth_event("pub1", "c1", 1000), 5000),
            Err(AuthError::Stale)
        );
        let mut wrong = auth_event("pub1", "c1", 1000);
        wrong.kind = 1;
        assert_eq!(auth.authenticate(&wrong, 1000), Err(AuthError::WrongKind(1)));
        assert!(auth.identity().is_none());
    }

    #[test]
    fn test_challenge_requested_once() {
        let mut auth = ConnectionAuth::new("c1".into());
        assert!(!auth.take_challenge_request());
        auth.request_challenge();
        assert!(auth.take_challenge_request());
        assert!(!auth.take_challenge_request());
        auth.request_challenge();
        assert!(!auth.take_challenge_request());
    }
}

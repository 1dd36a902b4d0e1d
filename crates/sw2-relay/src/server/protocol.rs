// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Relay wire protocol.
//!
//! Length-prefixed JSON messages, one per frame.
//!
//! Wire format:
//! ```text
//! +----------------+-------------------+
//! | Length (4B BE) | JSON payload      |
//! +----------------+-------------------+
//! ```

use crate::event::{Event, Filter};
use crate::info::RelayInfo;
use serde::{Deserialize, Serialize};
use sw2_policy::{Decision, DenyReason};

/// Messages sent by clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Publish an event.
    Event { event: Event },

    /// Query stored events and subscribe to new ones.
    Req {
        subscription_id: String,
        filters: Vec<Filter>,
    },

    /// Stop a subscription.
    Close { subscription_id: String },

    /// Count stored events.
    Count {
        subscription_id: String,
        filters: Vec<Filter>,
    },

    /// Answer an authentication challenge.
    Auth { event: Event },

    /// Request the relay information document.
    Info,
}

/// Messages sent by the relay.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RelayMessage {
    /// Result of an `event` or `auth` submission.
    Ok {
        event_id: String,
        accepted: bool,
        #[serde(default)]
        message: String,
    },

    /// Event matching a subscription.
    Event {
        subscription_id: String,
        event: Event,
    },

    /// End of stored events for a subscription.
    Eose { subscription_id: String },

    /// Subscription refused or terminated by the relay.
    Closed {
        subscription_id: String,
        message: String,
    },

    /// Result of a `count` request.
    Count { subscription_id: String, count: usize },

    /// Authentication challenge.
    Auth { challenge: String },

    /// Human-readable notice.
    Notice { message: String },

    /// Relay information document.
    Info(RelayInfo),
}

impl RelayMessage {
    /// `ok` reply for an event, carrying the policy outcome.
    pub fn event_decision(event_id: &str, decision: Decision) -> Self {
        Self::Ok {
            event_id: event_id.to_string(),
            accepted: decision.is_admitted(),
            message: match decision {
                Decision::Admit => String::new(),
                Decision::Reject(reason) => format!("blocked: {}", reason),
            },
        }
    }

    /// `closed` reply for a refused subscription or count.
    pub fn filter_rejected(subscription_id: &str, reason: DenyReason) -> Self {
        let prefix = match reason {
            DenyReason::AuthRequired => "auth-required",
            _ => "restricted",
        };
        Self::Closed {
            subscription_id: subscription_id.to_string(),
            message: format!("{}: {}", prefix, reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_message_parse() {
        let json = r#"{"type":"event","event":{"id":"e1","pubkey":"pub1","created_at":1,"kind":1,"tags":[],"content":"hi","sig":""}}"#;
        match serde_json::from_str::<ClientMessage>(json).unwrap() {
            ClientMessage::Event { event } => {
                assert_eq!(event.id, "e1");
                assert_eq!(event.content, "hi");
            }
            other => panic!("Wrong message type: {:?}", other),
        }
    }

    #[test]
    fn test_req_message_parse() {
        let json = r#"{"type":"req","subscription_id":"s1","filters":[{"kinds":[1],"limit":5}]}"#;
        match serde_json::from_str::<ClientMessage>(json).unwrap() {
            ClientMessage::Req {
                subscription_id,
                filters,
            } => {
                assert_eq!(subscription_id, "s1");
                assert_eq!(filters[0].kinds, Some(vec![1]));
                assert_eq!(filters[0].limit, Some(5));
            }
            other => panic!("Wrong message type: {:?}", other),
        }
    }

    #[test]
    fn test_info_message_parse() {
        assert!(matches!(
            serde_json::from_str::<ClientMessage>(r#"{"type":"info"}"#).unwrap(),
            ClientMessage::Info
        ));
    }

    #[test]
    fn test_event_decision_messages() {
        let json = serde_json::to_string(&RelayMessage::event_decision(
            "e1",
            Decision::Reject(DenyReason::NotWhitelisted),
        ))
        .unwrap();
        assert!(json.contains(r#""type":"ok""#));
        assert!(json.contains(r#""accepted":false"#));
        assert!(json.contains("blocked: identity not whitelisted"));

        match RelayMessage::event_decision("e1", Decision::Admit) {
            RelayMessage::Ok {
                accepted, message, ..
            } => {
                assert!(accepted);
                assert!(message.is_empty());
            }
            other => panic!("Wrong message type: {:?}", other),
        }
    }

    #[test]
    fn test_filter_rejected_prefixes() {
        match RelayMessage::filter_rejected("s1", DenyReason::AuthRequired) {
            RelayMessage::Closed { message, .. } => {
                assert_eq!(message, "auth-required: authentication required")
            }
            other => panic!("Wrong message type: {:?}", other),
        }
        match RelayMessage::filter_rejected("s1", DenyReason::ReadNotAuthorized) {
            RelayMessage::Closed { message, .. } => {
                assert_eq!(message, "restricted: not authorized to read")
            }
            other => panic!("Wrong message type: {:?}", other),
        }
    }
}

// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Events and query filters.
//!
//! Events are stored and relayed as submitted. Content, id and signature are
//! not validated by the relay.

use serde::{Deserialize, Serialize};
use sw2_policy::Identity;

/// Kind of a deletion request event.
pub const DELETION_KIND: u32 = 5;

/// A published event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Event id (hex)
    pub id: String,

    /// Declared author identity
    #[serde(default)]
    pub pubkey: Identity,

    /// Unix timestamp (seconds)
    pub created_at: u64,

    pub kind: u32,

    #[serde(default)]
    pub tags: Vec<Vec<String>>,

    #[serde(default)]
    pub content: String,

    #[serde(default)]
    pub sig: String,
}

impl Event {
    /// First value of the first tag named `name`.
    pub fn tag_value(&self, name: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|t| t.first().map(String::as_str) == Some(name))
            .and_then(|t| t.get(1))
            .map(String::as_str)
    }

    /// Ids referenced through `e` tags.
    pub fn referenced_event_ids(&self) -> impl Iterator<Item = &str> {
        self.tags
            .iter()
            .filter(|t| t.first().map(String::as_str) == Some("e"))
            .filter_map(|t| t.get(1))
            .map(String::as_str)
    }

    pub fn is_deletion(&self) -> bool {
        self.kind == DELETION_KIND
    }
}

/// Query/subscription filter. Absent fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ids: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authors: Option<Vec<Identity>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kinds: Option<Vec<u32>>,

    /// Inclusive lower bound on `created_at`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub since: Option<u64>,

    /// Inclusive upper bound on `created_at`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub until: Option<u64>,

    /// Maximum number of stored events returned (newest first)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

impl Filter {
    /// Filter matching the given ids.
    pub fn ids<I: IntoIterator<Item = S>, S: Into<String>>(ids: I) -> Self {
        Self {
            ids: Some(ids.into_iter().map(Into::into).collect()),
            ..Default::default()
        }
    }

    /// Filter matching events from the given authors.
    pub fn authors<I: IntoIterator<Item = S>, S: Into<Identity>>(authors: I) -> Self {
        Self {
            authors: Some(authors.into_iter().map(Into::into).collect()),
            ..Default::default()
        }
    }

    /// Restrict to the given kinds.
    pub fn with_kinds(mut self, kinds: impl IntoIterator<Item = u32>) -> Self {
        self.kinds = Some(kinds.into_iter().collect());
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Check whether an event satisfies every constraint of the filter.
    pub fn matches(&self, event: &Event) -> bool {
        if let Some(ids) = &self.ids {
            if !ids.iter().any(|id| *id == event.id) {
                return false;
            }
        }
        if let Some(authors) = &self.authors {
            if !authors.contains(&event.pubkey) {
                return false;
            }
        }
        if let Some(kinds) = &self.kinds {
            if !kinds.contains(&event.kind) {
                return false;
            }
        }
        if self.since.is_some_and(|since| event.created_at < since) {
            return false;
        }
        if self.until.is_some_and(|until| event.created_at > until) {
            return false;
        }
        true
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn event(id: &str, pubkey: &str, created_at: u64, kind: u32) -> Event {
        Event {
            id: id.into(),
            pubkey: Identity::from(pubkey),
            created_at,
            kind,
            tags: Vec::new(),
            content: String::new(),
            sig: String::new(),
        }
    }

    #[test]
    fn test_empty_filter_matches_everything() {
        assert!(Filter::default().matches(&event("a", "p", 1, 1)));
    }

    #[test]
    fn test_filter_fields() {
        let ev = event("a", "p", 100, 1);
        assert!(Filter::ids(["a"]).matches(&ev));
        assert!(!Filter::ids(["b"]).matches(&ev));
        assert!(Filter::authors(["p"]).matches(&ev));
        assert!(!Filter::authors(["q"]).matches(&ev));
        assert!(!Filter::default().with_kinds([0, 3]).matches(&ev));

        let window = Filter {
            since: Some(100),
            until: Some(100),
            ..Default::default()
        };
        assert!(window.matches(&ev));
        let later = Filter {
            since: Some(101),
            ..Default::default()
        };
        assert!(!later.matches(&ev));
    }

    #[test]
    fn test_event_wire_format() {
        let json = r#"{"id":"ab","pubkey":"p1","created_at":5,"kind":5,
            "tags":[["e","x1"],["p","someone"],["e","x2"]],"content":"gone","sig":"00"}"#;
        let ev: Event = serde_json::from_str(json).unwrap();
        assert!(ev.is_deletion());
        assert_eq!(ev.pubkey, Identity::from("p1"));
        let refs: Vec<&str> = ev.referenced_event_ids().collect();
        assert_eq!(refs, vec!["x1", "x2"]);
        assert_eq!(ev.tag_value("p"), Some("someone"));
        assert_eq!(ev.tag_value("challenge"), None);
    }

    #[test]
    fn test_filter_omits_absent_fields() {
        let json = serde_json::to_string(&Filter::default().with_limit(10)).unwrap();
        assert_eq!(json, r#"{"limit":10}"#);
    }
}

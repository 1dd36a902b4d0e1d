// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Event store abstraction
//!
//! The relay only reaches storage after the policy layer has admitted a
//! request.

use crate::event::{Event, Filter};
use anyhow::Result;
use parking_lot::RwLock;
use std::collections::HashMap;

/// Result of saving an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    Stored,
    /// An event with the same id is already stored.
    Duplicate,
}

/// Storage backend trait
///
/// Backend-agnostic interface for persisting and querying events.
///
/// # Implementations
///
/// - `MemoryStore` -- In-process, lost on restart
/// - `SqliteStore` -- SQLite database, survives restarts
pub trait EventStore: Send + Sync {
    /// Persist an event
    fn save_event(&self, event: &Event) -> Result<SaveOutcome>;

    /// Stored events matching `filter`, newest first, truncated to
    /// `filter.limit` when set
    fn query_events(&self, filter: &Filter) -> Result<Vec<Event>>;

    /// Number of stored events matching `filter` (ignores `limit`)
    fn count_events(&self, filter: &Filter) -> Result<usize>;

    /// Remove an event by id. Returns false if it was not stored.
    fn delete_event(&self, id: &str) -> Result<bool>;
}

/// In-memory event store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    events: RwLock<HashMap<String, Event>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }
}

impl EventStore for MemoryStore {
    fn save_event(&self, event: &Event) -> Result<SaveOutcome> {
        let mut events = self.events.write();
        if events.contains_key(&event.id) {
            return Ok(SaveOutcome::Duplicate);
        }
        events.insert(event.id.clone(), event.clone());
        Ok(SaveOutcome::Stored)
    }

    fn query_events(&self, filter: &Filter) -> Result<Vec<Event>> {
        let events = self.events.read();
        let mut matched: Vec<Event> = events
            .values()
            .filter(|e| filter.matches(e))
            .cloned()
            .collect();
        // Newest first; id breaks ties so results are deterministic.
        matched.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        if let Some(limit) = filter.limit {
            matched.truncate(limit);
        }
        Ok(matched)
    }

    fn count_events(&self, filter: &Filter) -> Result<usize> {
        Ok(self
            .events
            .read()
            .values()
            .filter(|e| filter.matches(e))
            .count())
    }

    fn delete_event(&self, id: &str) -> Result<bool> {
        Ok(self.events.write().remove(id).is_some())
    }
}

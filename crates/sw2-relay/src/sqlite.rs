// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! SQLite event store
//!
//! Persistent storage that survives relay restarts.

use crate::event::{Event, Filter};
use crate::store::{EventStore, SaveOutcome};
use anyhow::{Context, Result};
use parking_lot::Mutex;
use rusqlite::types::{Type, Value};
use rusqlite::{params, params_from_iter, Connection};
use std::path::Path;
use sw2_policy::Identity;

/// Database file created inside the configured store directory.
pub const DB_FILE_NAME: &str = "events.sqlite";

/// SQLite event store
///
/// Thread-safe via internal Mutex (SQLite Connection is not Sync).
///
/// # Schema
///
/// ```sql
/// CREATE TABLE events (
///     id TEXT PRIMARY KEY,
///     pubkey TEXT NOT NULL,
///     created_at INTEGER NOT NULL,
///     kind INTEGER NOT NULL,
///     tags TEXT NOT NULL,      -- JSON array of arrays
///     content TEXT NOT NULL,
///     sig TEXT NOT NULL
/// );
/// CREATE INDEX idx_pubkey ON events(pubkey);
/// CREATE INDEX idx_created_at ON events(created_at);
/// CREATE INDEX idx_kind ON events(kind);
/// ```
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the database inside directory `dir`.
    pub fn open(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create store directory {}", dir.display()))?;
        let path = dir.join(DB_FILE_NAME);
        let conn = Connection::open(&path)
            .with_context(|| format!("Failed to open SQLite database at {}", path.display()))?;

        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Create an in-memory SQLite store (for testing)
    pub fn new_in_memory() -> Result<Self> {
        let conn =
            Connection::open_in_memory().context("Failed to create in-memory SQLite database")?;

        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.conn.lock();

        conn.execute(
            "CREATE TABLE IF NOT EXISTS events (
                id TEXT PRIMARY KEY,
                pubkey TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                kind INTEGER NOT NULL,
                tags TEXT NOT NULL,
                content TEXT NOT NULL,
                sig TEXT NOT NULL
            )",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_pubkey ON events(pubkey)",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_created_at ON events(created_at)",
            [],
        )?;
        conn.execute("CREATE INDEX IF NOT EXISTS idx_kind ON events(kind)", [])?;

        Ok(())
    }

    fn row_to_event(row: &rusqlite::Row) -> rusqlite::Result<Event> {
        let tags_json: String = row.get(4)?;
        let tags = serde_json::from_str(&tags_json)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(4, Type::Text, Box::new(e)))?;

        Ok(Event {
            id: row.get(0)?,
            pubkey: Identity::new(row.get::<_, String>(1)?),
            created_at: row.get::<_, i64>(2)?.max(0) as u64,
            kind: row.get::<_, i64>(3)? as u32,
            tags,
            content: row.get(5)?,
            sig: row.get(6)?,
        })
    }
}

/// SQL condition and positional parameters equivalent to [`Filter::matches`].
fn where_clause(filter: &Filter) -> (String, Vec<Value>) {
    let mut clauses = Vec::new();
    let mut values = Vec::new();

    if let Some(ids) = &filter.ids {
        push_in(&mut clauses, &mut values, "id", ids.iter().map(|id| Value::Text(id.clone())));
    }
    if let Some(authors) = &filter.authors {
        push_in(
            &mut clauses,
            &mut values,
            "pubkey",
            authors.iter().map(|a| Value::Text(a.as_str().to_string())),
        );
    }
    if let Some(kinds) = &filter.kinds {
        push_in(
            &mut clauses,
            &mut values,
            "kind",
            kinds.iter().map(|k| Value::Integer(i64::from(*k))),
        );
    }
    if let Some(since) = filter.since {
        values.push(Value::Integer(to_i64(since)));
        clauses.push(format!("created_at >= ?{}", values.len()));
    }
    if let Some(until) = filter.until {
        values.push(Value::Integer(to_i64(until)));
        clauses.push(format!("created_at <= ?{}", values.len()));
    }

    if clauses.is_empty() {
        (String::new(), values)
    } else {
        (format!(" WHERE {}", clauses.join(" AND ")), values)
    }
}

fn push_in(
    clauses: &mut Vec<String>,
    values: &mut Vec<Value>,
    column: &str,
    items: impl Iterator<Item = Value>,
) {
    let first = values.len() + 1;
    values.extend(items);
    if values.len() < first {
        // An empty list matches nothing
        clauses.push("0".into());
        return;
    }
    let placeholders: Vec<String> = (first..=values.len()).map(|i| format!("?{}", i)).collect();
    clauses.push(format!("{} IN ({})", column, placeholders.join(", ")));
}

fn to_i64(v: u64) -> i64 {
    v.min(i64::MAX as u64) as i64
}

impl EventStore for SqliteStore {
    fn save_event(&self, event: &Event) -> Result<SaveOutcome> {
        let tags = serde_json::to_string(&event.tags)?;
        let conn = self.conn.lock();
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO events (id, pubkey, created_at, kind, tags, content, sig)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                event.id,
                event.pubkey.as_str(),
                to_i64(event.created_at),
                i64::from(event.kind),
                tags,
                event.content,
                event.sig,
            ],
        )?;

        Ok(if inserted == 0 {
            SaveOutcome::Duplicate
        } else {
            SaveOutcome::Stored
        })
    }

    fn query_events(&self, filter: &Filter) -> Result<Vec<Event>> {
        let (condition, mut values) = where_clause(filter);
        let mut sql = format!(
            "SELECT id, pubkey, created_at, kind, tags, content, sig FROM events{}
             ORDER BY created_at DESC, id ASC",
            condition
        );
        if let Some(limit) = filter.limit {
            values.push(Value::Integer(to_i64(limit as u64)));
            sql.push_str(&format!(" LIMIT ?{}", values.len()));
        }

        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&sql)?;
        let events = stmt
            .query_map(params_from_iter(values.iter()), Self::row_to_event)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(events)
    }

    fn count_events(&self, filter: &Filter) -> Result<usize> {
        let (condition, values) = where_clause(filter);
        let sql = format!("SELECT COUNT(*) FROM events{}", condition);

        let conn = self.conn.lock();
        let count: i64 = conn.query_row(&sql, params_from_iter(values.iter()), |row| row.get(0))?;
        Ok(count.max(0) as usize)
    }

    fn delete_event(&self, id: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let deleted = conn.execute("DELETE FROM events WHERE id = ?1", [id])?;
        Ok(deleted > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::tests::event;

    #[test]
    fn test_sqlite_store_save_and_duplicate() {
        let store = SqliteStore::new_in_memory().unwrap();
        let mut ev = event("a", "p", 1, 1);
        ev.tags = vec![vec!["e".into(), "b".into()]];
        ev.content = "hello".into();

        assert_eq!(store.save_event(&ev).unwrap(), SaveOutcome::Stored);
        assert_eq!(store.save_event(&ev).unwrap(), SaveOutcome::Duplicate);

        let loaded = store.query_events(&Filter::ids(["a"])).unwrap();
        assert_eq!(loaded, vec![ev]);
    }

    #[test]
    fn test_sqlite_store_query_filters() {
        let store = SqliteStore::new_in_memory().unwrap();
        for (id, author, ts, kind) in [("a", "p", 10, 1), ("b", "q", 30, 1), ("c", "p", 20, 7)] {
            store.save_event(&event(id, author, ts, kind)).unwrap();
        }

        let ids = |events: Vec<Event>| events.into_iter().map(|e| e.id).collect::<Vec<_>>();

        assert_eq!(ids(store.query_events(&Filter::default()).unwrap()), ["b", "c", "a"]);
        assert_eq!(
            ids(store.query_events(&Filter::default().with_limit(1)).unwrap()),
            ["b"]
        );
        assert_eq!(
            ids(store.query_events(&Filter::authors(["p"])).unwrap()),
            ["c", "a"]
        );
        assert_eq!(
            ids(store
                .query_events(&Filter::authors(["p"]).with_kinds([1]))
                .unwrap()),
            ["a"]
        );

        let window = Filter {
            since: Some(15),
            until: Some(30),
            ..Default::default()
        };
        assert_eq!(ids(store.query_events(&window).unwrap()), ["b", "c"]);

        let nothing = Filter {
            ids: Some(Vec::new()),
            ..Default::default()
        };
        assert!(store.query_events(&nothing).unwrap().is_empty());
    }

    #[test]
    fn test_sqlite_store_count_ignores_limit() {
        let store = SqliteStore::new_in_memory().unwrap();
        store.save_event(&event("a", "p", 1, 1)).unwrap();
        store.save_event(&event("b", "q", 2, 1)).unwrap();
        assert_eq!(store.count_events(&Filter::default().with_limit(1)).unwrap(), 2);
        assert_eq!(store.count_events(&Filter::authors(["q"])).unwrap(), 1);
    }

    #[test]
    fn test_sqlite_store_delete() {
        let store = SqliteStore::new_in_memory().unwrap();
        store.save_event(&event("a", "p", 1, 1)).unwrap();
        assert!(store.delete_event("a").unwrap());
        assert!(!store.delete_event("a").unwrap());
        assert_eq!(store.count_events(&Filter::default()).unwrap(), 0);
    }

    #[test]
    fn test_sqlite_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let store_dir = dir.path().join("db");
        {
            let store = SqliteStore::open(&store_dir).unwrap();
            store.save_event(&event("a", "p", 1, 1)).unwrap();
        }
        assert!(store_dir.join(DB_FILE_NAME).exists());

        let reopened = SqliteStore::open(&store_dir).unwrap();
        let events = reopened.query_events(&Filter::default()).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].id, "a");
    }
}

//! SQLite-backed event storage for the test relay.

use nostr::{Event, Filter};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::params;

use crate::config::DatabaseConfig;
use crate::error::Result;

pub struct Database {
    pool: Pool<SqliteConnectionManager>,
}

impl Database {
    pub fn new(config: DatabaseConfig) -> Result<Self> {
        let manager = match &config.path {
            Some(path) => SqliteConnectionManager::file(path),
            None => SqliteConnectionManager::memory(),
        };
        // A single-connection pool keeps an in-memory database from being
        // wiped between borrows; file-backed databases are fine with more.
        let pool_size = if config.path.is_some() { 4 } else { 1 };
        let pool = Pool::builder().max_size(pool_size).build(manager)?;

        let conn = pool.get()?;
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
        conn.execute("CREATE INDEX IF NOT EXISTS idx_events_pubkey ON events(pubkey)", [])?;
        conn.execute("CREATE INDEX IF NOT EXISTS idx_events_kind ON events(kind)", [])?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_events_created_at ON events(created_at)",
            [],
        )?;

        Ok(Self { pool })
    }

    /// Insert an event. Returns `false` without error if an event with the
    /// same id already exists (relays are expected to treat republication
    /// as a no-op, not a rejection).
    pub fn insert_event(&self, event: &Event) -> Result<bool> {
        let conn = self.pool.get()?;
        let tags = serde_json::to_string(&event.tags)?;
        let changed = conn.execute(
            "INSERT OR IGNORE INTO events (id, pubkey, created_at, kind, tags, content, sig)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                event.id,
                event.pubkey,
                event.created_at as i64,
                event.kind,
                tags,
                event.content,
                event.sig,
            ],
        )?;
        Ok(changed > 0)
    }

    /// Query events matching `filter`. SQL narrows by author/kind/time
    /// range; `Filter::matches` applies the remaining constraints (tags,
    /// the final `limit`) so storage and matching semantics never drift.
    pub fn query_events(&self, filter: &Filter) -> Result<Vec<Event>> {
        let conn = self.pool.get()?;
        let mut sql = "SELECT id, pubkey, created_at, kind, tags, content, sig FROM events WHERE 1=1".to_string();
        if !filter.authors.is_empty() {
            let list = filter.authors.iter().map(|a| format!("'{a}'")).collect::<Vec<_>>().join(",");
            sql.push_str(&format!(" AND pubkey IN ({list})"));
        }
        if !filter.kinds.is_empty() {
            let list = filter.kinds.iter().map(|k| k.to_string()).collect::<Vec<_>>().join(",");
            sql.push_str(&format!(" AND kind IN ({list})"));
        }
        if let Some(since) = filter.since {
            sql.push_str(&format!(" AND created_at >= {since}"));
        }
        if let Some(until) = filter.until {
            sql.push_str(&format!(" AND created_at < {until}"));
        }
        sql.push_str(" ORDER BY created_at DESC");

        let mut statement = conn.prepare(&sql)?;
        let rows = statement.query_map([], |row| {
            let tags_json: String = row.get(4)?;
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, u32>(3)?,
                tags_json,
                row.get::<_, String>(5)?,
                row.get::<_, String>(6)?,
            ))
        })?;

        let mut events = Vec::new();
        for row in rows {
            let (id, pubkey, created_at, kind, tags_json, content, sig) = row?;
            let tags: Vec<Vec<String>> = serde_json::from_str(&tags_json)?;
            let event = Event {
                id,
                pubkey,
                created_at: created_at as u64,
                kind,
                tags,
                content,
                sig,
            };
            if filter.matches(&event) {
                events.push(event);
            }
        }

        if let Some(limit) = filter.limit {
            events.truncate(limit as usize);
        }

        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_event(id: &str, pubkey: &str, created_at: u64) -> Event {
        Event {
            id: id.to_string(),
            pubkey: pubkey.to_string(),
            created_at,
            kind: 1,
            tags: vec![],
            content: "hello".to_string(),
            sig: "sig".to_string(),
        }
    }

    #[test]
    fn insert_and_query_round_trips() {
        let db = Database::new(DatabaseConfig::in_memory()).unwrap();
        let event = sample_event("a", "pk1", 100);
        assert!(db.insert_event(&event).unwrap());

        let filter = Filter::new().with_authors(["pk1".to_string()]);
        let results = db.query_events(&filter).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "a");
    }

    #[test]
    fn duplicate_insert_is_a_no_op() {
        let db = Database::new(DatabaseConfig::in_memory()).unwrap();
        let event = sample_event("a", "pk1", 100);
        assert!(db.insert_event(&event).unwrap());
        assert!(!db.insert_event(&event).unwrap());
    }

    #[test]
    fn until_cursor_excludes_events_at_or_after_until() {
        let db = Database::new(DatabaseConfig::in_memory()).unwrap();
        db.insert_event(&sample_event("a", "pk1", 100)).unwrap();
        db.insert_event(&sample_event("b", "pk1", 200)).unwrap();

        let filter = Filter::new().with_authors(["pk1".to_string()]).with_until(200);
        let results = db.query_events(&filter).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "a");
    }
}

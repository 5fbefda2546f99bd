//! Session-scoped append-only log store backed by SQLite, with indexed
//! timestamp/type lookups and wildcard text search.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LogEntry {
    pub id: i64,
    pub timestamp_ms: i64,
    #[serde(rename = "type")]
    pub entry_type: String,
    pub text: String,
}

impl LogEntry {
    pub fn timestamp(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.timestamp_ms).unwrap_or_else(Utc::now)
    }
}

#[derive(Debug, Default, Clone)]
pub struct FetchOptions {
    pub start_ms: Option<i64>,
    pub end_ms: Option<i64>,
    pub entry_type: Option<String>,
    pub text_pattern: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    pub newest_first: bool,
}

impl FetchOptions {
    pub fn new() -> Self {
        Self {
            newest_first: true,
            ..Default::default()
        }
    }
}

/// Builds the filesystem-safe `sessions/<session-id>/logs.db` path rooted at
/// `base_dir`, where `session-id` is derived from `started_at`.
pub fn session_db_path(base_dir: &Path, started_at: DateTime<Utc>) -> PathBuf {
    let session_id = started_at.format("%Y%m%dT%H%M%S%3fZ").to_string();
    base_dir.join("sessions").join(session_id).join("logs.db")
}

pub struct LogStore {
    conn: Mutex<Connection>,
}

impl LogStore {
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             CREATE TABLE IF NOT EXISTS log_entries (
                 id INTEGER PRIMARY KEY AUTOINCREMENT,
                 timestamp_ms INTEGER NOT NULL,
                 type TEXT NOT NULL,
                 text TEXT NOT NULL
             );
             CREATE INDEX IF NOT EXISTS idx_log_entries_timestamp ON log_entries(timestamp_ms);
             CREATE INDEX IF NOT EXISTS idx_log_entries_type ON log_entries(type);",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(
            "CREATE TABLE log_entries (
                 id INTEGER PRIMARY KEY AUTOINCREMENT,
                 timestamp_ms INTEGER NOT NULL,
                 type TEXT NOT NULL,
                 text TEXT NOT NULL
             );
             CREATE INDEX idx_log_entries_timestamp ON log_entries(timestamp_ms);
             CREATE INDEX idx_log_entries_type ON log_entries(type);",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn log(&self, text: &str, entry_type: &str) -> anyhow::Result<i64> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now().timestamp_millis();
        conn.execute(
            "INSERT INTO log_entries (timestamp_ms, type, text) VALUES (?1, ?2, ?3)",
            params![now, entry_type, text],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn fetch(&self, options: &FetchOptions) -> anyhow::Result<Vec<LogEntry>> {
        let conn = self.conn.lock().unwrap();

        let mut sql = String::from("SELECT id, timestamp_ms, type, text FROM log_entries");
        let mut clauses = Vec::new();
        let mut args: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(start) = options.start_ms {
            clauses.push(format!("timestamp_ms >= ?{}", args.len() + 1));
            args.push(Box::new(start));
        }
        if let Some(end) = options.end_ms {
            clauses.push(format!("timestamp_ms <= ?{}", args.len() + 1));
            args.push(Box::new(end));
        }
        if let Some(ref entry_type) = options.entry_type {
            clauses.push(format!("type = ?{}", args.len() + 1));
            args.push(Box::new(entry_type.clone()));
        }
        if let Some(ref pattern) = options.text_pattern {
            clauses.push(format!("text LIKE ?{}", args.len() + 1));
            args.push(Box::new(pattern.clone()));
        }
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }

        sql.push_str(if options.newest_first {
            " ORDER BY id DESC"
        } else {
            " ORDER BY id ASC"
        });

        if let Some(limit) = options.limit {
            sql.push_str(&format!(" LIMIT {limit}"));
            if let Some(offset) = options.offset {
                sql.push_str(&format!(" OFFSET {offset}"));
            }
        } else if let Some(offset) = options.offset {
            sql.push_str(&format!(" LIMIT -1 OFFSET {offset}"));
        }

        let mut stmt = conn.prepare(&sql)?;
        let params_ref: Vec<&dyn rusqlite::ToSql> = args.iter().map(|b| b.as_ref()).collect();
        let entries = stmt
            .query_map(params_ref.as_slice(), |row| {
                Ok(LogEntry {
                    id: row.get(0)?,
                    timestamp_ms: row.get(1)?,
                    entry_type: row.get(2)?,
                    text: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(entries)
    }

    pub fn count(&self) -> anyhow::Result<i64> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM log_entries", [], |row| row.get(0))
            .optional()?
            .unwrap_or(0);
        Ok(count)
    }

    pub fn clear(&self) -> anyhow::Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM log_entries", [])?;
        Ok(())
    }
}

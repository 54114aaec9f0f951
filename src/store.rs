//! SQLite-backed, append-only log of playbook runs.

use crate::model::{IndexEntry, Invocation, RunResult};
use rusqlite::{params, Connection};
use std::path::Path;
use time::format_description::FormatItem;
use time::macros::format_description;
use time::{OffsetDateTime, PrimitiveDateTime, UtcOffset};

/// Fixed-width UTC timestamps: lexical order is chronological and equality is exact.
const START_TIME_FORMAT: &[FormatItem<'static>] = format_description!(
    "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:9]Z"
);

const CREATE_RESULTS: &str = "CREATE TABLE IF NOT EXISTS results (
    id INTEGER PRIMARY KEY,
    start_time TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%f000000Z', 'now')),
    target TEXT NOT NULL,
    arguments TEXT NOT NULL DEFAULT '[]',
    output TEXT NOT NULL
)";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error")]
    Sqlite(#[from] rusqlite::Error),
    #[error("failed to prepare database directory {path}")]
    Dir {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("no recorded run for {target} at {start_time}")]
    NotFound { target: String, start_time: String },
    #[error("{count} recorded runs match {target} at {start_time}")]
    Ambiguous {
        target: String,
        start_time: String,
        count: usize,
    },
    #[error("corrupt row {id}: {reason}")]
    Corrupt { id: i64, reason: String },
}

pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open (or create) the database file, creating its parent directory if needed.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| StoreError::Dir {
                path: parent.display().to_string(),
                source,
            })?;
        }
        let conn = Connection::open(path)?;
        tracing::debug!(path = %path.display(), "opened result store");
        Ok(Self { conn })
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Ok(Self {
            conn: Connection::open_in_memory()?,
        })
    }

    /// Create the results table if it does not exist yet. Safe to call on every start.
    pub fn init(&self) -> Result<(), StoreError> {
        self.conn.execute_batch(CREATE_RESULTS)?;
        Ok(())
    }

    pub fn insert(&self, result: &RunResult) -> Result<(), StoreError> {
        let arguments = encode_arguments(result.invocation.arguments());
        self.conn.execute(
            "INSERT INTO results (start_time, target, arguments, output) VALUES (?1, ?2, ?3, ?4)",
            params![
                format_start_time(result.start_time),
                result.invocation.target(),
                arguments,
                result.output,
            ],
        )?;
        tracing::debug!(
            id = self.conn.last_insert_rowid(),
            playbook = result.invocation.target(),
            bytes = result.output.len(),
            "recorded run"
        );
        Ok(())
    }

    /// Every (target, start_time) pair in insertion order, without outputs.
    pub fn list_index(&self) -> Result<Vec<IndexEntry>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, target, start_time FROM results ORDER BY id")?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;

        let mut entries = Vec::new();
        for row in rows {
            let (id, target, start_time) = row?;
            entries.push(IndexEntry {
                target,
                start_time: parse_start_time(id, &start_time)?,
            });
        }
        Ok(entries)
    }

    /// Output of the single run recorded for `target` at `start_time`.
    ///
    /// Zero matches is `NotFound`; more than one is `Ambiguous`. Duplicates
    /// are never resolved by picking one.
    #[cfg_attr(not(feature = "tui"), allow(dead_code))]
    pub fn get_output(&self, target: &str, start_time: OffsetDateTime) -> Result<String, StoreError> {
        let key = format_start_time(start_time);
        let mut stmt = self.conn.prepare(
            "SELECT output FROM results WHERE target = ?1 AND start_time = ?2 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![target, key], |row| row.get::<_, String>(0))?;

        let mut outputs = Vec::with_capacity(1);
        for row in rows {
            outputs.push(row?);
        }

        match outputs.len() {
            0 => Err(StoreError::NotFound {
                target: target.to_string(),
                start_time: key,
            }),
            1 => Ok(outputs.remove(0)),
            count => Err(StoreError::Ambiguous {
                target: target.to_string(),
                start_time: key,
                count,
            }),
        }
    }

    /// Every recorded run, outputs included, in insertion order.
    #[cfg_attr(not(feature = "tui"), allow(dead_code))]
    pub fn get_all_results(&self) -> Result<Vec<RunResult>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, start_time, target, arguments, output FROM results ORDER BY id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
            ))
        })?;

        let mut results = Vec::new();
        for row in rows {
            let (id, start_time, target, arguments, output) = row?;
            let invocation = Invocation::new(target, decode_arguments(id, &arguments)?)
                .map_err(|e| StoreError::Corrupt {
                    id,
                    reason: e.to_string(),
                })?;
            results.push(RunResult {
                invocation,
                start_time: parse_start_time(id, &start_time)?,
                output,
            });
        }
        Ok(results)
    }
}

fn format_start_time(ts: OffsetDateTime) -> String {
    let utc = ts.to_offset(UtcOffset::UTC);
    utc.format(START_TIME_FORMAT)
        .unwrap_or_else(|_| utc.unix_timestamp_nanos().to_string())
}

fn parse_start_time(id: i64, raw: &str) -> Result<OffsetDateTime, StoreError> {
    PrimitiveDateTime::parse(raw, START_TIME_FORMAT)
        .map(PrimitiveDateTime::assume_utc)
        .map_err(|e| StoreError::Corrupt {
            id,
            reason: format!("bad start_time {raw:?}: {e}"),
        })
}

/// Arguments are a JSON array so any argument text round-trips.
fn encode_arguments(arguments: &[String]) -> String {
    serde_json::Value::from(arguments.to_vec()).to_string()
}

#[cfg_attr(not(feature = "tui"), allow(dead_code))]
fn decode_arguments(id: i64, raw: &str) -> Result<Vec<String>, StoreError> {
    serde_json::from_str(raw).map_err(|e| StoreError::Corrupt {
        id,
        reason: format!("bad arguments: {e}"),
    })
}

//! Durable per-bot log sink
//!
//! Fire-and-forget: a failed append is reported through tracing and
//! swallowed, it must never abort a tick.

use rusqlite::{params, Connection, Result as SqlResult, Row};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tracing::debug;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotLog {
    pub id: Option<i64>,
    pub bot_id: i64,
    pub level: LogLevel,
    pub message: String,
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogLevel {
    Info,
    Trade,
    Warning,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Info => "info",
            LogLevel::Trade => "trade",
            LogLevel::Warning => "warning",
            LogLevel::Error => "error",
        }
    }

    fn from_str(s: &str) -> Self {
        match s {
            "trade" => LogLevel::Trade,
            "warning" => LogLevel::Warning,
            "error" => LogLevel::Error,
            _ => LogLevel::Info,
        }
    }
}

impl BotLog {
    /// Append a log entry for a bot. Failures are swallowed.
    pub fn append(conn: Arc<Mutex<Connection>>, bot_id: i64, level: LogLevel, message: &str) {
        let result = {
            let conn = conn.lock().unwrap();
            conn.execute(
                "INSERT INTO bot_logs (bot_id, level, message) VALUES (?1, ?2, ?3)",
                params![bot_id, level.as_str(), message],
            )
        };

        if let Err(e) = result {
            debug!("log sink write failed for bot {}: {}", bot_id, e);
        }
    }

    fn from_row(row: &Row) -> SqlResult<Self> {
        Ok(BotLog {
            id: Some(row.get(0)?),
            bot_id: row.get(1)?,
            level: LogLevel::from_str(&row.get::<_, String>(2)?),
            message: row.get(3)?,
            created_at: Some(row.get(4)?),
        })
    }

    /// Read back the newest entries for a bot
    pub fn list_by_bot(
        conn: Arc<Mutex<Connection>>,
        bot_id: i64,
        limit: usize,
    ) -> SqlResult<Vec<Self>> {
        let conn = conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, bot_id, level, message, created_at FROM bot_logs
             WHERE bot_id = ?1 ORDER BY created_at DESC, id DESC LIMIT ?2",
        )?;

        let rows = stmt.query_map(params![bot_id, limit as i64], |row| Self::from_row(row))?;
        rows.collect()
    }
}

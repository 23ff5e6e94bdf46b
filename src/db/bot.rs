//! Bot row operations
//!
//! The bot row is the root entity: strategy parameters live in typed columns
//! (defaults applied once at creation, not re-derived per tick) and the
//! lifecycle status is the single source of truth the orchestrator polls.

use rusqlite::{params, Connection, Result as SqlResult, Row};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

use crate::core::grid::Progression;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bot {
    pub id: Option<i64>,
    pub user_id: i64,
    pub name: String,
    pub symbol: String,
    pub market_type: MarketType,
    pub status: BotStatus,
    pub grid_count: u32,
    pub grid_type: Progression,
    pub lower_price: Option<f64>,
    pub upper_price: Option<f64>,
    pub investment: f64,
    pub stop_loss_percent: f64,
    pub interval_secs: u64,
    pub last_price: Option<f64>,
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MarketType {
    Spot,
    Futures,
}

impl MarketType {
    fn as_str(&self) -> &'static str {
        match self {
            MarketType::Spot => "spot",
            MarketType::Futures => "futures",
        }
    }

    fn from_str(s: &str) -> Self {
        match s {
            "futures" | "future" => MarketType::Futures,
            _ => MarketType::Spot,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BotStatus {
    Stopped,
    Running,
    Error,
}

impl BotStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BotStatus::Stopped => "stopped",
            BotStatus::Running => "running",
            BotStatus::Error => "error",
        }
    }

    fn from_str(s: &str) -> Self {
        match s {
            "running" => BotStatus::Running,
            "error" => BotStatus::Error,
            _ => BotStatus::Stopped,
        }
    }
}

impl Bot {
    /// Create a new bot instance with default strategy parameters
    pub fn new(user_id: i64, name: String, symbol: String, market_type: MarketType) -> Self {
        Bot {
            id: None,
            user_id,
            name,
            symbol,
            market_type,
            status: BotStatus::Stopped,
            grid_count: 10,
            grid_type: Progression::Arithmetic,
            lower_price: None,
            upper_price: None,
            investment: 1000.0,
            stop_loss_percent: 5.0,
            interval_secs: 30,
            last_price: None,
            created_at: None,
        }
    }

    fn from_row(row: &Row) -> SqlResult<Self> {
        Ok(Bot {
            id: Some(row.get(0)?),
            user_id: row.get(1)?,
            name: row.get(2)?,
            symbol: row.get(3)?,
            market_type: MarketType::from_str(&row.get::<_, String>(4)?),
            status: BotStatus::from_str(&row.get::<_, String>(5)?),
            grid_count: row.get(6)?,
            grid_type: Progression::from_str(&row.get::<_, String>(7)?),
            lower_price: row.get(8)?,
            upper_price: row.get(9)?,
            investment: row.get(10)?,
            stop_loss_percent: row.get(11)?,
            interval_secs: row.get::<_, i64>(12)? as u64,
            last_price: row.get(13)?,
            created_at: Some(row.get(14)?),
        })
    }

    const COLUMNS: &'static str = "id, user_id, name, symbol, market_type, status, grid_count, \
         grid_type, lower_price, upper_price, investment, stop_loss_percent, \
         interval_secs, last_price, created_at";

    /// Insert bot into database
    pub fn insert(&self, conn: Arc<Mutex<Connection>>) -> SqlResult<i64> {
        let conn = conn.lock().unwrap();
        conn.execute(
            "INSERT INTO bots (
                user_id, name, symbol, market_type, status, grid_count, grid_type,
                lower_price, upper_price, investment, stop_loss_percent, interval_secs
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                self.user_id,
                self.name,
                self.symbol,
                self.market_type.as_str(),
                self.status.as_str(),
                self.grid_count,
                self.grid_type.as_str(),
                self.lower_price,
                self.upper_price,
                self.investment,
                self.stop_loss_percent,
                self.interval_secs as i64,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Find bot by ID
    pub fn find_by_id(conn: Arc<Mutex<Connection>>, id: i64) -> SqlResult<Option<Self>> {
        let conn = conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM bots WHERE id = ?1",
            Self::COLUMNS
        ))?;

        let mut rows = stmt.query(params![id])?;
        match rows.next()? {
            Some(row) => Ok(Some(Self::from_row(row)?)),
            None => Ok(None),
        }
    }

    /// List all bots whose durable status is `running`
    pub fn list_running(conn: Arc<Mutex<Connection>>) -> SqlResult<Vec<Self>> {
        let conn = conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM bots WHERE status = 'running' ORDER BY id",
            Self::COLUMNS
        ))?;

        let rows = stmt.query_map([], |row| Self::from_row(row))?;
        rows.collect()
    }

    /// Update durable lifecycle status
    pub fn set_status(conn: Arc<Mutex<Connection>>, id: i64, status: BotStatus) -> SqlResult<usize> {
        let conn = conn.lock().unwrap();
        conn.execute(
            "UPDATE bots SET status = ?1, updated_at = datetime('now') WHERE id = ?2",
            params![status.as_str(), id],
        )
    }

    /// Persist derived ladder bounds (set once at session initialization)
    pub fn set_bounds(
        conn: Arc<Mutex<Connection>>,
        id: i64,
        lower: f64,
        upper: f64,
    ) -> SqlResult<usize> {
        let conn = conn.lock().unwrap();
        conn.execute(
            "UPDATE bots SET lower_price = ?1, upper_price = ?2, updated_at = datetime('now')
             WHERE id = ?3",
            params![lower, upper, id],
        )
    }

    /// Persist the last observed market price
    pub fn set_last_price(conn: Arc<Mutex<Connection>>, id: i64, price: f64) -> SqlResult<usize> {
        let conn = conn.lock().unwrap();
        conn.execute(
            "UPDATE bots SET last_price = ?1, updated_at = datetime('now') WHERE id = ?2",
            params![price, id],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    #[test]
    fn test_bot_crud() {
        let db = Database::new_in_memory().unwrap();
        db.run_migrations().unwrap();
        let conn = db.connection();

        let bot = Bot::new(1, "btc grid".to_string(), "BTCUSDT".to_string(), MarketType::Spot);
        let bot_id = bot.insert(Arc::clone(&conn)).unwrap();

        let loaded = Bot::find_by_id(Arc::clone(&conn), bot_id).unwrap().unwrap();
        assert_eq!(loaded.symbol, "BTCUSDT");
        assert_eq!(loaded.status, BotStatus::Stopped);
        assert_eq!(loaded.grid_count, 10);
        assert!(loaded.lower_price.is_none());

        Bot::set_status(Arc::clone(&conn), bot_id, BotStatus::Running).unwrap();
        let running = Bot::list_running(Arc::clone(&conn)).unwrap();
        assert_eq!(running.len(), 1);
        assert_eq!(running[0].id, Some(bot_id));

        Bot::set_bounds(Arc::clone(&conn), bot_id, 950.0, 1050.0).unwrap();
        Bot::set_last_price(Arc::clone(&conn), bot_id, 1000.0).unwrap();
        let loaded = Bot::find_by_id(Arc::clone(&conn), bot_id).unwrap().unwrap();
        assert_eq!(loaded.lower_price, Some(950.0));
        assert_eq!(loaded.upper_price, Some(1050.0));
        assert_eq!(loaded.last_price, Some(1000.0));
    }

    #[test]
    fn test_find_missing_bot() {
        let db = Database::new_in_memory().unwrap();
        db.run_migrations().unwrap();

        let missing = Bot::find_by_id(db.connection(), 999).unwrap();
        assert!(missing.is_none());
    }
}

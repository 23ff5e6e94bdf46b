//! Realized trade records
//!
//! A trade row is immutable once created: buy fills open a round trip
//! (status `open`, zero profit), sell fills close one (status `closed`,
//! realized profit). RiskGuard sums profit over closed rows only.

use rusqlite::{params, Connection, Result as SqlResult, Row};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

use crate::db::order::OrderSide;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub id: Option<i64>,
    pub bot_id: i64,
    pub symbol: String,
    pub side: OrderSide,
    pub price: f64,
    pub quantity: f64,
    pub profit: f64,
    pub status: TradeStatus,
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeStatus {
    Open,
    Closed,
}

impl TradeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeStatus::Open => "open",
            TradeStatus::Closed => "closed",
        }
    }

    fn from_str(s: &str) -> Self {
        match s {
            "closed" => TradeStatus::Closed,
            _ => TradeStatus::Open,
        }
    }
}

impl Trade {
    pub fn new(
        bot_id: i64,
        symbol: String,
        side: OrderSide,
        price: f64,
        quantity: f64,
        profit: f64,
        status: TradeStatus,
    ) -> Self {
        Trade {
            id: None,
            bot_id,
            symbol,
            side,
            price,
            quantity,
            profit,
            status,
            created_at: None,
        }
    }

    fn from_row(row: &Row) -> SqlResult<Self> {
        Ok(Trade {
            id: Some(row.get(0)?),
            bot_id: row.get(1)?,
            symbol: row.get(2)?,
            side: match row.get::<_, String>(3)?.as_str() {
                "sell" => OrderSide::Sell,
                _ => OrderSide::Buy,
            },
            price: row.get(4)?,
            quantity: row.get(5)?,
            profit: row.get(6)?,
            status: TradeStatus::from_str(&row.get::<_, String>(7)?),
            created_at: Some(row.get(8)?),
        })
    }

    /// Insert trade into database
    pub fn insert(&self, conn: Arc<Mutex<Connection>>) -> SqlResult<i64> {
        let conn = conn.lock().unwrap();
        conn.execute(
            "INSERT INTO trades (bot_id, symbol, side, price, quantity, profit, status)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                self.bot_id,
                self.symbol,
                self.side.as_str(),
                self.price,
                self.quantity,
                self.profit,
                self.status.as_str(),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// List trades for a bot, newest first
    pub fn list_by_bot(conn: Arc<Mutex<Connection>>, bot_id: i64) -> SqlResult<Vec<Self>> {
        let conn = conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, bot_id, symbol, side, price, quantity, profit, status, created_at
             FROM trades WHERE bot_id = ?1 ORDER BY created_at DESC, id DESC",
        )?;

        let rows = stmt.query_map(params![bot_id], |row| Self::from_row(row))?;
        rows.collect()
    }

    /// Cumulative realized profit across all closed trades for a bot
    pub fn realized_profit(conn: Arc<Mutex<Connection>>, bot_id: i64) -> SqlResult<f64> {
        let conn = conn.lock().unwrap();
        let total: Option<f64> = conn.query_row(
            "SELECT SUM(profit) FROM trades WHERE bot_id = ?1 AND status = 'closed'",
            params![bot_id],
            |row| row.get(0),
        )?;
        Ok(total.unwrap_or(0.0))
    }
}

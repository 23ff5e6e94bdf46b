//! Grid order ledger operations
//!
//! Orders are append-only: a row is created when an order is placed at the
//! venue and only ever transitions pending -> filled or pending -> cancelled.
//! A partial unique index keeps at most one pending row per (bot, level, side).

use rusqlite::{params, Connection, Result as SqlResult, Row};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridOrder {
    pub id: Option<i64>,
    pub bot_id: i64,
    pub level: i64,
    pub side: OrderSide,
    pub price: f64,
    pub quantity: f64,
    pub venue_order_id: String,
    pub status: OrderState,
    pub filled_price: Option<f64>,
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderSide::Buy => "buy",
            OrderSide::Sell => "sell",
        }
    }

    fn from_str(s: &str) -> Self {
        match s {
            "sell" => OrderSide::Sell,
            _ => OrderSide::Buy,
        }
    }

    /// The side that closes this one's round trip
    pub fn opposite(&self) -> Self {
        match self {
            OrderSide::Buy => OrderSide::Sell,
            OrderSide::Sell => OrderSide::Buy,
        }
    }
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderState {
    Pending,
    Filled,
    Cancelled,
}

impl OrderState {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderState::Pending => "pending",
            OrderState::Filled => "filled",
            OrderState::Cancelled => "cancelled",
        }
    }

    fn from_str(s: &str) -> Self {
        match s {
            "filled" => OrderState::Filled,
            "cancelled" => OrderState::Cancelled,
            _ => OrderState::Pending,
        }
    }
}

impl GridOrder {
    /// Create a new pending order record
    pub fn new(
        bot_id: i64,
        level: i64,
        side: OrderSide,
        price: f64,
        quantity: f64,
        venue_order_id: String,
    ) -> Self {
        GridOrder {
            id: None,
            bot_id,
            level,
            side,
            price,
            quantity,
            venue_order_id,
            status: OrderState::Pending,
            filled_price: None,
            created_at: None,
        }
    }

    fn from_row(row: &Row) -> SqlResult<Self> {
        Ok(GridOrder {
            id: Some(row.get(0)?),
            bot_id: row.get(1)?,
            level: row.get(2)?,
            side: OrderSide::from_str(&row.get::<_, String>(3)?),
            price: row.get(4)?,
            quantity: row.get(5)?,
            venue_order_id: row.get(6)?,
            status: OrderState::from_str(&row.get::<_, String>(7)?),
            filled_price: row.get(8)?,
            created_at: Some(row.get(9)?),
        })
    }

    const COLUMNS: &'static str =
        "id, bot_id, level, side, price, quantity, venue_order_id, status, filled_price, created_at";

    /// Insert order into the ledger.
    ///
    /// Fails with a constraint violation if a pending order already exists at
    /// the same (bot, level, side).
    pub fn insert(&self, conn: Arc<Mutex<Connection>>) -> SqlResult<i64> {
        let conn = conn.lock().unwrap();
        conn.execute(
            "INSERT INTO grid_orders (
                bot_id, level, side, price, quantity, venue_order_id, status
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                self.bot_id,
                self.level,
                self.side.as_str(),
                self.price,
                self.quantity,
                self.venue_order_id,
                self.status.as_str(),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// List all pending orders for a bot
    pub fn list_pending(conn: Arc<Mutex<Connection>>, bot_id: i64) -> SqlResult<Vec<Self>> {
        let conn = conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM grid_orders WHERE bot_id = ?1 AND status = 'pending' ORDER BY level",
            Self::COLUMNS
        ))?;

        let rows = stmt.query_map(params![bot_id], |row| Self::from_row(row))?;
        rows.collect()
    }

    /// List all orders for a bot (audit trail)
    pub fn list_by_bot(conn: Arc<Mutex<Connection>>, bot_id: i64) -> SqlResult<Vec<Self>> {
        let conn = conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM grid_orders WHERE bot_id = ?1 ORDER BY created_at DESC, id DESC",
            Self::COLUMNS
        ))?;

        let rows = stmt.query_map(params![bot_id], |row| Self::from_row(row))?;
        rows.collect()
    }

    /// Check for a pending order at the given (level, side)
    pub fn has_pending_at(
        conn: Arc<Mutex<Connection>>,
        bot_id: i64,
        level: i64,
        side: OrderSide,
    ) -> SqlResult<bool> {
        let conn = conn.lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM grid_orders
             WHERE bot_id = ?1 AND level = ?2 AND side = ?3 AND status = 'pending'",
            params![bot_id, level, side.as_str()],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Mark an order filled at the venue-reported price
    pub fn mark_filled(
        conn: Arc<Mutex<Connection>>,
        id: i64,
        fill_price: f64,
    ) -> SqlResult<usize> {
        let conn = conn.lock().unwrap();
        conn.execute(
            "UPDATE grid_orders SET status = 'filled', filled_price = ?1 WHERE id = ?2",
            params![fill_price, id],
        )
    }

    /// Mark an order cancelled (venue cancellation is authoritative)
    pub fn mark_cancelled(conn: Arc<Mutex<Connection>>, id: i64) -> SqlResult<usize> {
        let conn = conn.lock().unwrap();
        conn.execute(
            "UPDATE grid_orders SET status = 'cancelled' WHERE id = ?1",
            params![id],
        )
    }

    /// Count orders for a bot in the given state
    pub fn count_by_status(
        conn: Arc<Mutex<Connection>>,
        bot_id: i64,
        status: OrderState,
    ) -> SqlResult<i64> {
        let conn = conn.lock().unwrap();
        conn.query_row(
            "SELECT COUNT(*) FROM grid_orders WHERE bot_id = ?1 AND status = ?2",
            params![bot_id, status.as_str()],
            |row| row.get(0),
        )
    }
}

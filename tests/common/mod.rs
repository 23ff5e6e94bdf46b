// Shared test fixtures: in-memory database setup and a scriptable mock
// exchange gateway.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use grid_bot_worker::{
    ApiCredentials, AssetBalance, Bot, Database, EngineError, EngineResult, ExchangeGateway,
    GatewayFactory, GridDefaults, MarketType, OrderSide, PlacedOrder, Progression,
    VenueOrderStatus, WorkerConfig, WorkerSettings,
};

pub fn test_db() -> Database {
    let db = Database::new_in_memory().expect("in-memory db");
    db.run_migrations().expect("migrations");
    db
}

/// Worker config tuned for tests: no tick floor, so every cycle ticks
pub fn test_config() -> WorkerConfig {
    WorkerConfig {
        worker: WorkerSettings {
            database_path: ":memory:".to_string(),
            poll_interval_secs: 1,
            min_tick_secs: 0,
        },
        ..WorkerConfig::default()
    }
}

pub fn test_defaults() -> GridDefaults {
    GridDefaults::default()
}

/// Insert a bot with the canonical test ladder: 950-1050, 5 levels,
/// 1000 invested, 5% stop loss.
pub fn insert_test_bot(db: &Database, user_id: i64) -> i64 {
    let mut bot = Bot::new(
        user_id,
        "test grid".to_string(),
        "BTCUSDT".to_string(),
        MarketType::Spot,
    );
    bot.grid_count = 5;
    bot.grid_type = Progression::Arithmetic;
    bot.lower_price = Some(950.0);
    bot.upper_price = Some(1050.0);
    bot.investment = 1000.0;
    bot.stop_loss_percent = 5.0;
    bot.interval_secs = 0;
    bot.insert(db.connection()).expect("insert bot")
}

/// Insert a bot with no configured bounds (session derives them)
pub fn insert_unbounded_bot(db: &Database, user_id: i64) -> i64 {
    let mut bot = Bot::new(
        user_id,
        "unbounded".to_string(),
        "ETHUSDT".to_string(),
        MarketType::Spot,
    );
    bot.grid_count = 5;
    bot.interval_secs = 0;
    bot.insert(db.connection()).expect("insert bot")
}

pub fn insert_credentials(db: &Database, user_id: i64) {
    ApiCredentials::upsert(db.connection(), user_id, "test-key", "test-secret")
        .expect("insert credentials");
}

#[derive(Debug, Clone)]
pub struct PlacedRecord {
    pub symbol: String,
    pub side: OrderSide,
    pub quantity: f64,
    pub price: f64,
    pub venue_order_id: String,
}

/// Scriptable in-process venue. Orders rest as Open until a test assigns
/// them a status; every interaction is recorded for assertions.
#[derive(Default)]
pub struct MockGateway {
    price: Mutex<f64>,
    statuses: Mutex<HashMap<String, VenueOrderStatus>>,
    flaky_orders: Mutex<HashSet<String>>,
    placed: Mutex<Vec<PlacedRecord>>,
    cancelled: Mutex<Vec<String>>,
    reject_credentials: Mutex<bool>,
    reject_placements: Mutex<bool>,
    next_id: AtomicUsize,
}

impl MockGateway {
    pub fn new(price: f64) -> Arc<Self> {
        let gateway = Self::default();
        *gateway.price.lock().unwrap() = price;
        Arc::new(gateway)
    }

    pub fn set_price(&self, price: f64) {
        *self.price.lock().unwrap() = price;
    }

    pub fn set_order_status(&self, venue_order_id: &str, status: VenueOrderStatus) {
        self.statuses
            .lock()
            .unwrap()
            .insert(venue_order_id.to_string(), status);
    }

    /// Make status queries for this order fail with a transient error
    pub fn set_order_flaky(&self, venue_order_id: &str) {
        self.flaky_orders
            .lock()
            .unwrap()
            .insert(venue_order_id.to_string());
    }

    pub fn set_reject_credentials(&self, reject: bool) {
        *self.reject_credentials.lock().unwrap() = reject;
    }

    pub fn set_reject_placements(&self, reject: bool) {
        *self.reject_placements.lock().unwrap() = reject;
    }

    pub fn placed(&self) -> Vec<PlacedRecord> {
        self.placed.lock().unwrap().clone()
    }

    pub fn cancelled(&self) -> Vec<String> {
        self.cancelled.lock().unwrap().clone()
    }
}

#[async_trait]
impl ExchangeGateway for MockGateway {
    async fn get_price(&self, _symbol: &str) -> EngineResult<f64> {
        Ok(*self.price.lock().unwrap())
    }

    async fn validate_credentials(&self) -> EngineResult<()> {
        if *self.reject_credentials.lock().unwrap() {
            return Err(EngineError::CredentialsRejected("mock rejection".to_string()));
        }
        Ok(())
    }

    async fn get_balances(&self) -> EngineResult<Vec<AssetBalance>> {
        Ok(vec![AssetBalance {
            asset: "USDT".to_string(),
            free: 100000.0,
            locked: 0.0,
        }])
    }

    async fn place_limit_order(
        &self,
        symbol: &str,
        side: OrderSide,
        quantity: f64,
        price: f64,
    ) -> EngineResult<PlacedOrder> {
        if *self.reject_placements.lock().unwrap() {
            return Err(EngineError::VenueRejection("mock rejection".to_string()));
        }

        let venue_order_id = format!("mock-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        self.placed.lock().unwrap().push(PlacedRecord {
            symbol: symbol.to_string(),
            side,
            quantity,
            price,
            venue_order_id: venue_order_id.clone(),
        });

        Ok(PlacedOrder { venue_order_id })
    }

    async fn cancel_order(&self, _symbol: &str, venue_order_id: &str) -> EngineResult<()> {
        self.cancelled
            .lock()
            .unwrap()
            .push(venue_order_id.to_string());
        Ok(())
    }

    async fn get_order_status(
        &self,
        _symbol: &str,
        venue_order_id: &str,
    ) -> EngineResult<VenueOrderStatus> {
        if self.flaky_orders.lock().unwrap().contains(venue_order_id) {
            return Err(EngineError::VenueTimeout("mock timeout".to_string()));
        }

        Ok(self
            .statuses
            .lock()
            .unwrap()
            .get(venue_order_id)
            .copied()
            .unwrap_or(VenueOrderStatus::Open))
    }
}

/// Hands every session the same shared mock gateway
pub struct MockGatewayFactory {
    gateway: Arc<MockGateway>,
}

impl MockGatewayFactory {
    pub fn new(gateway: Arc<MockGateway>) -> Arc<Self> {
        Arc::new(Self { gateway })
    }
}

impl GatewayFactory for MockGatewayFactory {
    fn build(
        &self,
        _credentials: &ApiCredentials,
        _market_type: MarketType,
    ) -> Arc<dyn ExchangeGateway> {
        Arc::clone(&self.gateway) as Arc<dyn ExchangeGateway>
    }
}

//! Grid bot session
//!
//! One running instance of the engine bound to a single bot. All state that
//! must survive a tick lives in the database; the session itself only caches
//! the ladder and the gateway, so a crashed worker resumes every bot from
//! durable state alone.

use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::clients::{ExchangeGateway, GatewayFactory, VenueOrderStatus};
use crate::config::GridDefaults;
use crate::core::grid::{self, GridLevel};
use crate::core::risk::{RiskGuard, RiskVerdict};
use crate::db::{
    ApiCredentials, Bot, BotLog, BotStatus, Database, GridOrder, LogLevel, OrderSide, OrderState,
    Trade, TradeStatus,
};
use crate::error::{EngineError, EngineResult};

/// Session lifecycle. Terminal states are never re-entered; restarting a bot
/// constructs a fresh session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Initializing,
    Active,
    Reconciling,
    Stopping,
    Terminated,
    Faulted,
}

pub struct GridBotSession {
    bot_id: i64,
    db: Database,
    factory: Arc<dyn GatewayFactory>,
    defaults: GridDefaults,
    state: SessionState,
    bot: Option<Bot>,
    gateway: Option<Arc<dyn ExchangeGateway>>,
    levels: Vec<GridLevel>,
    risk: Option<RiskGuard>,
}

impl GridBotSession {
    pub fn new(
        bot_id: i64,
        db: Database,
        factory: Arc<dyn GatewayFactory>,
        defaults: GridDefaults,
    ) -> Self {
        Self {
            bot_id,
            db,
            factory,
            defaults,
            state: SessionState::Initializing,
            bot: None,
            gateway: None,
            levels: Vec::new(),
            risk: None,
        }
    }

    pub fn bot_id(&self) -> i64 {
        self.bot_id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn levels(&self) -> &[GridLevel] {
        &self.levels
    }

    /// Load the bot, validate the venue, compute the ladder and place the
    /// initial buy orders. On failure the session faults and the bot's
    /// durable status becomes `error`; no orders are placed.
    pub async fn initialize(&mut self) -> EngineResult<()> {
        info!("Initializing grid session for bot #{}", self.bot_id);

        match self.try_initialize().await {
            Ok(current_price) => {
                self.state = SessionState::Active;
                self.place_initial_orders(current_price).await;
                Ok(())
            }
            Err(e) => {
                self.state = SessionState::Faulted;
                let _ = Bot::set_status(self.db.connection(), self.bot_id, BotStatus::Error);
                BotLog::append(
                    self.db.connection(),
                    self.bot_id,
                    LogLevel::Error,
                    &format!("Initialization failed: {}", e),
                );
                Err(e)
            }
        }
    }

    async fn try_initialize(&mut self) -> EngineResult<f64> {
        let conn = self.db.connection();

        let mut bot = Bot::find_by_id(Arc::clone(&conn), self.bot_id)?
            .ok_or(EngineError::BotNotFound(self.bot_id))?;

        let credentials = ApiCredentials::find_by_user(Arc::clone(&conn), bot.user_id)?
            .ok_or(EngineError::CredentialsMissing(bot.user_id))?;

        let gateway = self.factory.build(&credentials, bot.market_type);

        // One authenticated call proving the venue is reachable and the keys work
        gateway.validate_credentials().await?;

        let current_price = gateway.get_price(&bot.symbol).await?;

        let (lower, upper) = match (bot.lower_price, bot.upper_price) {
            (Some(lower), Some(upper)) => (lower, upper),
            _ => {
                let (lower, upper) =
                    grid::derive_bounds(current_price, self.defaults.range_percent)?;
                Bot::set_bounds(Arc::clone(&conn), self.bot_id, lower, upper)?;
                bot.lower_price = Some(lower);
                bot.upper_price = Some(upper);
                info!(
                    "Bot #{}: auto-set grid range {} - {}",
                    self.bot_id, lower, upper
                );
                (lower, upper)
            }
        };

        self.levels = grid::compute_levels(lower, upper, bot.grid_count, bot.grid_type)?;
        self.risk = Some(RiskGuard::new(
            bot.investment,
            bot.stop_loss_percent,
            lower,
            upper,
        ));

        Bot::set_last_price(Arc::clone(&conn), self.bot_id, current_price)?;

        info!(
            "Bot #{} initialized: {} | Range: {} - {} | Levels: {}",
            self.bot_id, bot.symbol, lower, upper, bot.grid_count
        );
        BotLog::append(
            Arc::clone(&conn),
            self.bot_id,
            LogLevel::Info,
            &format!(
                "Grid session initialized for {}. Range: {} - {}",
                bot.symbol, lower, upper
            ),
        );

        self.gateway = Some(Arc::clone(&gateway));
        self.bot = Some(bot);

        Ok(current_price)
    }

    /// Place resting buys at every level below the current price. Levels
    /// above stay empty on the sell side until a buy at that level fills.
    async fn place_initial_orders(&self, current_price: f64) {
        let bot = self.bot.as_ref().expect("bot loaded during initialize");
        let quantity = bot.investment / bot.grid_count as f64;

        for level in &self.levels {
            if level.price < current_price {
                self.place_order(bot, level.index as i64, OrderSide::Buy, level.buy_price, quantity)
                    .await;
            }
        }

        info!("Bot #{}: initial grid orders placed", self.bot_id);
    }

    /// Place one order at the venue and record it in the ledger. Failure
    /// abandons this single placement; the rest of the ladder continues.
    async fn place_order(
        &self,
        bot: &Bot,
        level: i64,
        side: OrderSide,
        price: f64,
        quantity: f64,
    ) {
        let conn = self.db.connection();
        let gateway = self.gateway.as_ref().expect("gateway built during initialize");

        match GridOrder::has_pending_at(Arc::clone(&conn), self.bot_id, level, side) {
            Ok(true) => {
                debug!(
                    "Bot #{}: pending {} order already exists at level {}, skipping",
                    self.bot_id, side, level
                );
                return;
            }
            Ok(false) => {}
            Err(e) => {
                warn!("Bot #{}: ledger check failed: {}", self.bot_id, e);
                return;
            }
        }

        match gateway
            .place_limit_order(&bot.symbol, side, quantity, price)
            .await
        {
            Ok(placed) => {
                let order = GridOrder::new(
                    self.bot_id,
                    level,
                    side,
                    price,
                    quantity,
                    placed.venue_order_id.clone(),
                );
                match order.insert(Arc::clone(&conn)) {
                    Ok(_) => {
                        info!(
                            "Bot #{}: placed {} order {} @ {} (venue id {})",
                            self.bot_id, side, quantity, price, placed.venue_order_id
                        );
                    }
                    Err(e) => {
                        // The venue holds an order the ledger does not know
                        // about; reconciliation cannot see it, so this is loud
                        warn!(
                            "Bot #{}: ledger write failed for venue order {}: {}",
                            self.bot_id, placed.venue_order_id, e
                        );
                        BotLog::append(
                            Arc::clone(&conn),
                            self.bot_id,
                            LogLevel::Error,
                            &format!(
                                "Ledger write failed for {} order at level {}: {}",
                                side, level, e
                            ),
                        );
                    }
                }
            }
            Err(e) => {
                warn!(
                    "Bot #{}: failed to place {} order @ {}: {}",
                    self.bot_id, side, price, e
                );
                BotLog::append(
                    Arc::clone(&conn),
                    self.bot_id,
                    LogLevel::Error,
                    &format!("Failed to place {} order @ {}: {}", side, price, e),
                );
            }
        }
    }

    /// One reconciliation step: sync pending orders against the venue,
    /// replace fills on the opposite side, then run the risk guard.
    pub async fn tick(&mut self) -> EngineResult<()> {
        if self.state != SessionState::Active {
            debug!(
                "Bot #{}: tick skipped in state {:?}",
                self.bot_id, self.state
            );
            return Ok(());
        }

        self.state = SessionState::Reconciling;
        let reconcile_result = self.reconcile().await;
        self.state = SessionState::Active;
        reconcile_result?;

        let bot = self.bot.as_ref().expect("bot loaded during initialize");
        let gateway = Arc::clone(self.gateway.as_ref().expect("gateway built"));

        let current_price = match gateway.get_price(&bot.symbol).await {
            Ok(price) => price,
            Err(e) => {
                // Transient: risk runs again next tick with a fresh price
                warn!("Bot #{}: price fetch failed: {}", self.bot_id, e);
                return Ok(());
            }
        };

        let conn = self.db.connection();
        Bot::set_last_price(Arc::clone(&conn), self.bot_id, current_price)?;

        let realized = Trade::realized_profit(Arc::clone(&conn), self.bot_id)?;
        let risk = self.risk.as_ref().expect("risk guard built during initialize");

        match risk.evaluate(current_price, realized) {
            RiskVerdict::Ok => Ok(()),
            RiskVerdict::OutOfRange { price } => {
                warn!("Bot #{}: price {} moved out of grid range", self.bot_id, price);
                BotLog::append(
                    Arc::clone(&conn),
                    self.bot_id,
                    LogLevel::Warning,
                    &format!("Price moved out of grid range: {}", price),
                );
                Ok(())
            }
            RiskVerdict::StopLoss { loss_percent } => {
                BotLog::append(
                    Arc::clone(&conn),
                    self.bot_id,
                    LogLevel::Error,
                    &format!("Stop loss triggered! Total P/L: {:.2}%", loss_percent),
                );
                self.halt(BotStatus::Stopped).await;
                Err(EngineError::RiskBreach(format!(
                    "realized loss {:.2}% breached stop loss",
                    loss_percent
                )))
            }
        }
    }

    async fn reconcile(&self) -> EngineResult<()> {
        let conn = self.db.connection();
        let bot = self.bot.as_ref().expect("bot loaded during initialize");
        let gateway = Arc::clone(self.gateway.as_ref().expect("gateway built"));

        let pending = GridOrder::list_pending(Arc::clone(&conn), self.bot_id)?;

        for order in pending {
            match gateway
                .get_order_status(&bot.symbol, &order.venue_order_id)
                .await
            {
                Ok(VenueOrderStatus::Filled { fill_price }) => {
                    self.handle_fill(bot, &order, fill_price).await?;
                }
                Ok(VenueOrderStatus::Cancelled) => {
                    GridOrder::mark_cancelled(
                        Arc::clone(&conn),
                        order.id.expect("ledger rows have ids"),
                    )?;
                    BotLog::append(
                        Arc::clone(&conn),
                        self.bot_id,
                        LogLevel::Info,
                        &format!("Order {} cancelled at venue", order.venue_order_id),
                    );
                }
                Ok(VenueOrderStatus::Open) => {}
                Err(e) => {
                    // Transient query failure: status unchanged, retried next tick
                    warn!(
                        "Bot #{}: error checking order {}: {}",
                        self.bot_id, order.venue_order_id, e
                    );
                }
            }
        }

        Ok(())
    }

    /// Mark a fill, record the trade, and post the opposite-side order at the
    /// adjacent level with the same quantity.
    async fn handle_fill(&self, bot: &Bot, order: &GridOrder, fill_price: f64) -> EngineResult<()> {
        let conn = self.db.connection();

        GridOrder::mark_filled(
            Arc::clone(&conn),
            order.id.expect("ledger rows have ids"),
            fill_price,
        )?;

        info!(
            "Bot #{}: order {} filled @ {}",
            self.bot_id, order.venue_order_id, fill_price
        );
        BotLog::append(
            Arc::clone(&conn),
            self.bot_id,
            LogLevel::Trade,
            &format!("Order filled: {} {} @ {}", order.side, order.quantity, fill_price),
        );

        self.record_trade(bot, order, fill_price)?;

        // Replacement on the opposite side at the adjacent level
        let adjacent = match order.side {
            OrderSide::Buy => order.level + 1,
            OrderSide::Sell => order.level - 1,
        };

        match self.levels.get(usize::try_from(adjacent).unwrap_or(usize::MAX)) {
            Some(level) => {
                let (side, price) = match order.side.opposite() {
                    OrderSide::Sell => (OrderSide::Sell, level.sell_price),
                    OrderSide::Buy => (OrderSide::Buy, level.buy_price),
                };
                self.place_order(bot, adjacent, side, price, order.quantity).await;
            }
            None => {
                info!(
                    "Bot #{}: fill at ladder boundary (level {}), no replacement",
                    self.bot_id, order.level
                );
                BotLog::append(
                    Arc::clone(&conn),
                    self.bot_id,
                    LogLevel::Info,
                    &format!("Fill at ladder boundary (level {}), no replacement", order.level),
                );
            }
        }

        Ok(())
    }

    /// Buy fills open a round trip; sell fills close the round trip opened by
    /// the buy at the adjacent lower level (sells are only ever placed as
    /// replacements, so that level always identifies the cost basis).
    fn record_trade(&self, bot: &Bot, order: &GridOrder, fill_price: f64) -> EngineResult<()> {
        let conn = self.db.connection();

        let trade = match order.side {
            OrderSide::Buy => Trade::new(
                self.bot_id,
                bot.symbol.clone(),
                OrderSide::Buy,
                fill_price,
                order.quantity,
                0.0,
                TradeStatus::Open,
            ),
            OrderSide::Sell => {
                let cost_basis = self
                    .levels
                    .get(usize::try_from(order.level - 1).unwrap_or(usize::MAX))
                    .map(|level| level.buy_price)
                    .unwrap_or(fill_price);
                let profit = (fill_price - cost_basis) * order.quantity;

                Trade::new(
                    self.bot_id,
                    bot.symbol.clone(),
                    OrderSide::Sell,
                    fill_price,
                    order.quantity,
                    profit,
                    TradeStatus::Closed,
                )
            }
        };

        trade.insert(Arc::clone(&conn))?;
        Ok(())
    }

    /// Graceful external stop: cancel everything pending and mark the bot
    /// stopped. Idempotent on terminal states.
    pub async fn shutdown(&mut self) -> EngineResult<()> {
        if matches!(self.state, SessionState::Terminated | SessionState::Faulted) {
            return Ok(());
        }

        self.state = SessionState::Stopping;
        info!("Stopping grid session for bot #{}", self.bot_id);

        self.halt(BotStatus::Stopped).await;

        BotLog::append(
            self.db.connection(),
            self.bot_id,
            LogLevel::Info,
            "Grid session stopped",
        );

        Ok(())
    }

    /// Cancel all pending orders (best-effort) and transition to Terminated
    async fn halt(&mut self, final_status: BotStatus) {
        self.cancel_all_pending().await;

        if let Err(e) = Bot::set_status(self.db.connection(), self.bot_id, final_status) {
            warn!("Bot #{}: failed to persist status: {}", self.bot_id, e);
        }

        self.state = SessionState::Terminated;
    }

    /// Best-effort cancellation: individual failures are logged and skipped,
    /// the shutdown always completes.
    async fn cancel_all_pending(&self) {
        let conn = self.db.connection();

        let (bot, gateway) = match (&self.bot, &self.gateway) {
            (Some(bot), Some(gateway)) => (bot, Arc::clone(gateway)),
            _ => return, // faulted before the venue was reachable
        };

        let pending = match GridOrder::list_pending(Arc::clone(&conn), self.bot_id) {
            Ok(pending) => pending,
            Err(e) => {
                warn!("Bot #{}: could not list pending orders: {}", self.bot_id, e);
                return;
            }
        };

        for order in pending {
            match gateway.cancel_order(&bot.symbol, &order.venue_order_id).await {
                Ok(()) => {
                    if let Err(e) = GridOrder::mark_cancelled(
                        Arc::clone(&conn),
                        order.id.expect("ledger rows have ids"),
                    ) {
                        warn!("Bot #{}: ledger update failed: {}", self.bot_id, e);
                    }
                    info!("Bot #{}: cancelled order {}", self.bot_id, order.venue_order_id);
                }
                Err(e) => {
                    warn!(
                        "Bot #{}: failed to cancel order {}: {}",
                        self.bot_id, order.venue_order_id, e
                    );
                    BotLog::append(
                        Arc::clone(&conn),
                        self.bot_id,
                        LogLevel::Error,
                        &format!("Failed to cancel order {}: {}", order.venue_order_id, e),
                    );
                }
            }
        }
    }

    /// Read-only snapshot of this session's bot, from durable state
    pub fn status_report(&self) -> EngineResult<StatusReport> {
        status_snapshot(&self.db, self.bot_id)
    }
}

/// Point-in-time view of a bot, computed from durable state only and
/// therefore safe to call concurrently with ticks
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub bot_id: i64,
    pub symbol: String,
    pub status: String,
    pub market_type: String,
    pub grid_count: u32,
    pub grid_type: String,
    pub lower_price: Option<f64>,
    pub upper_price: Option<f64>,
    pub investment: f64,
    pub stop_loss_percent: f64,
    pub pending_orders: i64,
    pub filled_orders: i64,
    pub realized_profit: f64,
    pub last_price: Option<f64>,
}

pub fn status_snapshot(db: &Database, bot_id: i64) -> EngineResult<StatusReport> {
    let conn = db.connection();

    let bot = Bot::find_by_id(Arc::clone(&conn), bot_id)?
        .ok_or(EngineError::BotNotFound(bot_id))?;

    let pending = GridOrder::count_by_status(Arc::clone(&conn), bot_id, OrderState::Pending)?;
    let filled = GridOrder::count_by_status(Arc::clone(&conn), bot_id, OrderState::Filled)?;
    let realized = Trade::realized_profit(Arc::clone(&conn), bot_id)?;

    Ok(StatusReport {
        bot_id,
        symbol: bot.symbol,
        status: bot.status.as_str().to_string(),
        market_type: match bot.market_type {
            crate::db::MarketType::Spot => "spot".to_string(),
            crate::db::MarketType::Futures => "futures".to_string(),
        },
        grid_count: bot.grid_count,
        grid_type: bot.grid_type.as_str().to_string(),
        lower_price: bot.lower_price,
        upper_price: bot.upper_price,
        investment: bot.investment,
        stop_loss_percent: bot.stop_loss_percent,
        pending_orders: pending,
        filled_orders: filled,
        realized_profit: realized,
        last_price: bot.last_price,
    })
}

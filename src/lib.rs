// Grid Trading Worker Library
//
// A multi-bot grid trading engine: ladder math, order-state reconciliation,
// stop-loss enforcement, and a scheduler that drives many bots concurrently
// against a rate-limited exchange.

pub mod clients;
pub mod config;
pub mod core;
pub mod db; // SQLite persistence layer
pub mod error; // Unified error handling

// Re-export core engine types
pub use core::{
    compute_levels, derive_bounds, start_bot, stop_bot, GridBotSession, GridLevel, Progression,
    RiskGuard, RiskVerdict, SessionState, StatusReport, WorkerOrchestrator,
};
pub use core::session::status_snapshot;

// Re-export error types
pub use error::{EngineError, EngineResult};

// Re-export client types
pub use clients::{
    AssetBalance, BinanceClient, BinanceGatewayFactory, ExchangeGateway, GatewayFactory,
    PlacedOrder, RateLimiter, VenueOrderStatus,
};

// Re-export configuration
pub use config::{ConfigError, GridDefaults, VenueConfig, WorkerConfig, WorkerSettings};

// Re-export database types
pub use db::{
    ApiCredentials, Bot, BotLog, BotStatus, Database, GridOrder, LogLevel, MarketType, OrderSide,
    OrderState, Trade, TradeStatus,
};

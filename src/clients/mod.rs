//! Exchange gateway abstraction
//!
//! The engine talks to the venue through the `ExchangeGateway` trait; the
//! orchestrator builds one gateway per bot from stored credentials via a
//! `GatewayFactory`. Tests substitute both seams.

use async_trait::async_trait;
use std::sync::Arc;

use crate::db::account::ApiCredentials;
use crate::db::bot::MarketType;
use crate::db::order::OrderSide;
use crate::error::EngineResult;

pub mod binance;

pub use binance::{BinanceClient, BinanceGatewayFactory, RateLimiter};

/// Venue-reported state of one order
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum VenueOrderStatus {
    /// Resting (new or partially filled)
    Open,
    Filled { fill_price: f64 },
    /// Cancelled or expired at the venue; authoritative and terminal
    Cancelled,
}

/// Acknowledgement returned by the venue for a placed order
#[derive(Debug, Clone)]
pub struct PlacedOrder {
    pub venue_order_id: String,
}

#[derive(Debug, Clone)]
pub struct AssetBalance {
    pub asset: String,
    pub free: f64,
    pub locked: f64,
}

/// Abstract capability against one external trading venue.
///
/// Implementations own request signing and per-credential rate limiting.
#[async_trait]
pub trait ExchangeGateway: Send + Sync {
    /// Current market price for a symbol
    async fn get_price(&self, symbol: &str) -> EngineResult<f64>;

    /// One authenticated call proving the credentials work
    async fn validate_credentials(&self) -> EngineResult<()>;

    /// Account balances
    async fn get_balances(&self) -> EngineResult<Vec<AssetBalance>>;

    /// Place a resting limit order; returns the venue order reference
    async fn place_limit_order(
        &self,
        symbol: &str,
        side: OrderSide,
        quantity: f64,
        price: f64,
    ) -> EngineResult<PlacedOrder>;

    /// Cancel a resting order
    async fn cancel_order(&self, symbol: &str, venue_order_id: &str) -> EngineResult<()>;

    /// Query the venue-reported status of an order
    async fn get_order_status(
        &self,
        symbol: &str,
        venue_order_id: &str,
    ) -> EngineResult<VenueOrderStatus>;
}

/// Builds a gateway for one bot's credentials and market type.
///
/// Gateways built from the same api key share one rate limiter; different
/// accounts never throttle each other.
pub trait GatewayFactory: Send + Sync {
    fn build(&self, credentials: &ApiCredentials, market_type: MarketType)
        -> Arc<dyn ExchangeGateway>;
}

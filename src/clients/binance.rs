//! Binance REST client with HMAC request signing and per-credential
//! rate limiting

use async_trait::async_trait;
use chrono::Utc;
use hmac::{Hmac, Mac};
use reqwest::{Method, StatusCode};
use serde_json::Value;
use sha2::Sha256;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;
use uuid::Uuid;

use crate::clients::{
    AssetBalance, ExchangeGateway, GatewayFactory, PlacedOrder, VenueOrderStatus,
};
use crate::config::VenueConfig;
use crate::db::account::ApiCredentials;
use crate::db::bot::MarketType;
use crate::db::order::OrderSide;
use crate::error::{EngineError, EngineResult};

type HmacSha256 = Hmac<Sha256>;

/// Throttles outbound calls sharing one credential.
///
/// The lock is held across the sleep so callers queue one behind another;
/// sessions using different keys hold different limiters and never wait on
/// each other.
pub struct RateLimiter {
    min_interval: Duration,
    last_call: tokio::sync::Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_call: tokio::sync::Mutex::new(None),
        }
    }

    pub async fn acquire(&self) {
        let mut last = self.last_call.lock().await;
        if let Some(prev) = *last {
            let elapsed = prev.elapsed();
            if elapsed < self.min_interval {
                tokio::time::sleep(self.min_interval - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }
}

pub struct BinanceClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    api_secret: String,
    market_type: MarketType,
    limiter: Arc<RateLimiter>,
}

impl BinanceClient {
    pub fn new(
        venue: &VenueConfig,
        credentials: &ApiCredentials,
        market_type: MarketType,
        limiter: Arc<RateLimiter>,
    ) -> Self {
        let base_url = match market_type {
            MarketType::Spot => venue.spot_base_url.clone(),
            MarketType::Futures => venue.futures_base_url.clone(),
        };

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(venue.request_timeout_secs))
            .build()
            .unwrap_or_default();

        Self {
            http,
            base_url,
            api_key: credentials.api_key.clone(),
            api_secret: credentials.api_secret.clone(),
            market_type,
            limiter,
        }
    }

    fn account_path(&self) -> &'static str {
        match self.market_type {
            MarketType::Spot => "/api/v3/account",
            MarketType::Futures => "/fapi/v2/account",
        }
    }

    fn balance_path(&self) -> &'static str {
        match self.market_type {
            MarketType::Spot => "/api/v3/account",
            MarketType::Futures => "/fapi/v2/balance",
        }
    }

    fn order_path(&self) -> &'static str {
        match self.market_type {
            MarketType::Spot => "/api/v3/order",
            MarketType::Futures => "/fapi/v1/order",
        }
    }

    fn price_path(&self) -> &'static str {
        match self.market_type {
            MarketType::Spot => "/api/v3/ticker/price",
            MarketType::Futures => "/fapi/v1/ticker/price",
        }
    }

    fn sign(&self, query: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(self.api_secret.as_bytes())
            .expect("HMAC accepts any key length");
        mac.update(query.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    fn encode_query(params: &[(&str, String)]) -> String {
        params
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&")
    }

    /// Public (unsigned) GET request
    async fn public_request(&self, path: &str, params: &[(&str, String)]) -> EngineResult<Value> {
        self.limiter.acquire().await;

        let mut url = format!("{}{}", self.base_url, path);
        if !params.is_empty() {
            url = format!("{}?{}", url, Self::encode_query(params));
        }

        let response = self.http.get(&url).send().await?;
        Self::decode_response(response).await
    }

    /// Signed request; params are carried in the query string so the
    /// signature always covers exactly what is sent
    async fn signed_request(
        &self,
        method: Method,
        path: &str,
        params: &[(&str, String)],
    ) -> EngineResult<Value> {
        self.limiter.acquire().await;

        let mut signed: Vec<(&str, String)> = params.to_vec();
        signed.push(("timestamp", Utc::now().timestamp_millis().to_string()));

        let query = Self::encode_query(&signed);
        let signature = self.sign(&query);
        let url = format!(
            "{}{}?{}&signature={}",
            self.base_url, path, query, signature
        );

        let response = self
            .http
            .request(method, &url)
            .header("X-MBX-APIKEY", &self.api_key)
            .send()
            .await?;

        Self::decode_response(response).await
    }

    async fn decode_response(response: reqwest::Response) -> EngineResult<Value> {
        let status = response.status();
        let body = response.text().await?;

        if status.is_success() {
            return serde_json::from_str(&body).map_err(EngineError::from);
        }

        debug!("venue returned {}: {}", status, body);
        let detail = format!("HTTP {}: {}", status.as_u16(), body);

        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                Err(EngineError::CredentialsRejected(detail))
            }
            StatusCode::TOO_MANY_REQUESTS | StatusCode::IM_A_TEAPOT => {
                Err(EngineError::VenueRateLimit(detail))
            }
            s if s.is_client_error() => Err(EngineError::VenueRejection(detail)),
            _ => Err(EngineError::VenueUnreachable(detail)),
        }
    }

    fn field_f64(value: &Value, field: &str) -> EngineResult<f64> {
        value
            .get(field)
            .and_then(|v| match v {
                Value::String(s) => s.parse::<f64>().ok(),
                Value::Number(n) => n.as_f64(),
                _ => None,
            })
            .ok_or_else(|| {
                EngineError::VenueResponse(format!("missing numeric field '{}'", field))
            })
    }
}

#[async_trait]
impl ExchangeGateway for BinanceClient {
    async fn get_price(&self, symbol: &str) -> EngineResult<f64> {
        let data = self
            .public_request(self.price_path(), &[("symbol", symbol.to_string())])
            .await?;
        Self::field_f64(&data, "price")
    }

    async fn validate_credentials(&self) -> EngineResult<()> {
        self.signed_request(Method::GET, self.account_path(), &[])
            .await?;
        Ok(())
    }

    async fn get_balances(&self) -> EngineResult<Vec<AssetBalance>> {
        let data = self
            .signed_request(Method::GET, self.balance_path(), &[])
            .await?;

        let mut balances = Vec::new();
        match self.market_type {
            MarketType::Spot => {
                let entries = data
                    .get("balances")
                    .and_then(Value::as_array)
                    .ok_or_else(|| {
                        EngineError::VenueResponse("missing 'balances' array".to_string())
                    })?;
                for entry in entries {
                    balances.push(AssetBalance {
                        asset: entry
                            .get("asset")
                            .and_then(Value::as_str)
                            .unwrap_or_default()
                            .to_string(),
                        free: Self::field_f64(entry, "free").unwrap_or(0.0),
                        locked: Self::field_f64(entry, "locked").unwrap_or(0.0),
                    });
                }
            }
            MarketType::Futures => {
                let entries = data.as_array().ok_or_else(|| {
                    EngineError::VenueResponse("expected balance array".to_string())
                })?;
                for entry in entries {
                    let total = Self::field_f64(entry, "balance").unwrap_or(0.0);
                    let free = Self::field_f64(entry, "availableBalance").unwrap_or(0.0);
                    balances.push(AssetBalance {
                        asset: entry
                            .get("asset")
                            .and_then(Value::as_str)
                            .unwrap_or_default()
                            .to_string(),
                        free,
                        locked: total - free,
                    });
                }
            }
        }

        Ok(balances)
    }

    async fn place_limit_order(
        &self,
        symbol: &str,
        side: OrderSide,
        quantity: f64,
        price: f64,
    ) -> EngineResult<PlacedOrder> {
        let side_param = match side {
            OrderSide::Buy => "BUY",
            OrderSide::Sell => "SELL",
        };

        let params = [
            ("symbol", symbol.to_string()),
            ("side", side_param.to_string()),
            ("type", "LIMIT".to_string()),
            ("timeInForce", "GTC".to_string()),
            ("quantity", quantity.to_string()),
            ("price", price.to_string()),
            ("newClientOrderId", Uuid::new_v4().to_string()),
        ];

        let data = self
            .signed_request(Method::POST, self.order_path(), &params)
            .await?;

        let venue_order_id = data
            .get("orderId")
            .map(|v| match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .ok_or_else(|| EngineError::VenueResponse("missing 'orderId'".to_string()))?;

        Ok(PlacedOrder { venue_order_id })
    }

    async fn cancel_order(&self, symbol: &str, venue_order_id: &str) -> EngineResult<()> {
        let params = [
            ("symbol", symbol.to_string()),
            ("orderId", venue_order_id.to_string()),
        ];

        self.signed_request(Method::DELETE, self.order_path(), &params)
            .await?;
        Ok(())
    }

    async fn get_order_status(
        &self,
        symbol: &str,
        venue_order_id: &str,
    ) -> EngineResult<VenueOrderStatus> {
        let params = [
            ("symbol", symbol.to_string()),
            ("orderId", venue_order_id.to_string()),
        ];

        let data = self
            .signed_request(Method::GET, self.order_path(), &params)
            .await?;

        let status = data
            .get("status")
            .and_then(Value::as_str)
            .ok_or_else(|| EngineError::VenueResponse("missing 'status'".to_string()))?;

        match status {
            "FILLED" => {
                // Prefer the average fill price when the venue reports one
                let fill_price = Self::field_f64(&data, "avgPrice")
                    .ok()
                    .filter(|p| *p > 0.0)
                    .map_or_else(|| Self::field_f64(&data, "price"), Ok)?;
                Ok(VenueOrderStatus::Filled { fill_price })
            }
            "CANCELED" | "EXPIRED" | "REJECTED" => Ok(VenueOrderStatus::Cancelled),
            _ => Ok(VenueOrderStatus::Open),
        }
    }
}

/// Builds `BinanceClient`s, handing gateways that share an api key the same
/// rate limiter
pub struct BinanceGatewayFactory {
    venue: VenueConfig,
    limiters: Mutex<HashMap<String, Arc<RateLimiter>>>,
}

impl BinanceGatewayFactory {
    pub fn new(venue: VenueConfig) -> Self {
        Self {
            venue,
            limiters: Mutex::new(HashMap::new()),
        }
    }

    fn limiter_for(&self, api_key: &str) -> Arc<RateLimiter> {
        let mut limiters = self.limiters.lock().unwrap();
        limiters
            .entry(api_key.to_string())
            .or_insert_with(|| {
                Arc::new(RateLimiter::new(Duration::from_millis(
                    self.venue.min_request_interval_ms,
                )))
            })
            .clone()
    }
}

impl GatewayFactory for BinanceGatewayFactory {
    fn build(
        &self,
        credentials: &ApiCredentials,
        market_type: MarketType,
    ) -> Arc<dyn ExchangeGateway> {
        let limiter = self.limiter_for(&credentials.api_key);
        Arc::new(BinanceClient::new(
            &self.venue,
            credentials,
            market_type,
            limiter,
        ))
    }
}

// HTTP-level tests for the signed venue client

use grid_bot_worker::{
    ApiCredentials, BinanceClient, EngineError, ExchangeGateway, MarketType, OrderSide,
    RateLimiter, VenueConfig, VenueOrderStatus,
};
use mockito::Matcher;
use std::sync::Arc;
use std::time::Duration;

fn client_for(server: &mockito::Server) -> BinanceClient {
    let venue = VenueConfig {
        spot_base_url: server.url(),
        futures_base_url: server.url(),
        request_timeout_secs: 5,
        min_request_interval_ms: 0,
    };
    let credentials = ApiCredentials {
        user_id: 1,
        api_key: "test-key".to_string(),
        api_secret: "test-secret".to_string(),
    };
    BinanceClient::new(
        &venue,
        &credentials,
        MarketType::Spot,
        Arc::new(RateLimiter::new(Duration::from_millis(0))),
    )
}

#[tokio::test]
async fn get_price_parses_string_quote() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/api/v3/ticker/price")
        .match_query(Matcher::UrlEncoded("symbol".into(), "BTCUSDT".into()))
        .with_status(200)
        .with_body(r#"{"symbol":"BTCUSDT","price":"42000.50"}"#)
        .create_async()
        .await;

    let client = client_for(&server);
    let price = client.get_price("BTCUSDT").await.unwrap();

    assert_eq!(price, 42000.50);
    mock.assert_async().await;
}

#[tokio::test]
async fn signed_requests_carry_key_header_and_hex_signature() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/api/v3/account")
        .match_header("X-MBX-APIKEY", "test-key")
        .match_query(Matcher::Regex(
            "timestamp=[0-9]+&signature=[0-9a-f]{64}".to_string(),
        ))
        .with_status(200)
        .with_body(r#"{"balances":[]}"#)
        .create_async()
        .await;

    let client = client_for(&server);
    client.validate_credentials().await.unwrap();

    mock.assert_async().await;
}

#[tokio::test]
async fn spot_balances_are_parsed() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", "/api/v3/account")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(
            r#"{"balances":[{"asset":"BTC","free":"0.5","locked":"0.1"},
                            {"asset":"USDT","free":"1000","locked":"0"}]}"#,
        )
        .create_async()
        .await;

    let client = client_for(&server);
    let balances = client.get_balances().await.unwrap();

    assert_eq!(balances.len(), 2);
    assert_eq!(balances[0].asset, "BTC");
    assert_eq!(balances[0].free, 0.5);
    assert_eq!(balances[0].locked, 0.1);
}

#[tokio::test]
async fn placed_order_returns_venue_reference() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/api/v3/order")
        .match_query(Matcher::AllOf(vec![
            Matcher::Regex("symbol=BTCUSDT".to_string()),
            Matcher::Regex("side=BUY".to_string()),
            Matcher::Regex("type=LIMIT".to_string()),
            Matcher::Regex("timeInForce=GTC".to_string()),
            Matcher::Regex("signature=[0-9a-f]{64}".to_string()),
        ]))
        .with_status(200)
        .with_body(r#"{"orderId":123456,"status":"NEW"}"#)
        .create_async()
        .await;

    let client = client_for(&server);
    let placed = client
        .place_limit_order("BTCUSDT", OrderSide::Buy, 0.5, 42000.0)
        .await
        .unwrap();

    assert_eq!(placed.venue_order_id, "123456");
    mock.assert_async().await;
}

#[tokio::test]
async fn order_status_maps_venue_states() {
    let mut server = mockito::Server::new_async().await;

    let _filled = server
        .mock("GET", "/api/v3/order")
        .match_query(Matcher::Regex("orderId=1".to_string()))
        .with_status(200)
        .with_body(r#"{"orderId":1,"status":"FILLED","price":"974.51","avgPrice":"974.50"}"#)
        .create_async()
        .await;

    let client = client_for(&server);
    let status = client.get_order_status("BTCUSDT", "1").await.unwrap();
    // Average fill price wins over the order price
    assert_eq!(status, VenueOrderStatus::Filled { fill_price: 974.50 });

    let _expired = server
        .mock("GET", "/api/v3/order")
        .match_query(Matcher::Regex("orderId=2".to_string()))
        .with_status(200)
        .with_body(r#"{"orderId":2,"status":"EXPIRED","price":"974.51"}"#)
        .create_async()
        .await;

    let status = client.get_order_status("BTCUSDT", "2").await.unwrap();
    assert_eq!(status, VenueOrderStatus::Cancelled);

    let _open = server
        .mock("GET", "/api/v3/order")
        .match_query(Matcher::Regex("orderId=3".to_string()))
        .with_status(200)
        .with_body(r#"{"orderId":3,"status":"PARTIALLY_FILLED","price":"974.51"}"#)
        .create_async()
        .await;

    let status = client.get_order_status("BTCUSDT", "3").await.unwrap();
    assert_eq!(status, VenueOrderStatus::Open);
}

#[tokio::test]
async fn http_errors_map_to_the_taxonomy() {
    let mut server = mockito::Server::new_async().await;

    let _rejected = server
        .mock("POST", "/api/v3/order")
        .match_query(Matcher::Any)
        .with_status(400)
        .with_body(r#"{"code":-1013,"msg":"Invalid quantity"}"#)
        .create_async()
        .await;

    let client = client_for(&server);
    let err = client
        .place_limit_order("BTCUSDT", OrderSide::Buy, 0.0, 42000.0)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::VenueRejection(_)));
    assert!(!err.is_retryable());

    let _unauthorized = server
        .mock("GET", "/api/v3/account")
        .match_query(Matcher::Any)
        .with_status(401)
        .with_body(r#"{"code":-2014,"msg":"API-key format invalid."}"#)
        .create_async()
        .await;

    let err = client.validate_credentials().await.unwrap_err();
    assert!(matches!(err, EngineError::CredentialsRejected(_)));
    assert!(err.is_fatal());

    let _throttled = server
        .mock("GET", "/api/v3/ticker/price")
        .match_query(Matcher::Any)
        .with_status(429)
        .with_body(r#"{"code":-1003,"msg":"Too many requests."}"#)
        .create_async()
        .await;

    let err = client.get_price("BTCUSDT").await.unwrap_err();
    assert!(matches!(err, EngineError::VenueRateLimit(_)));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn cancel_order_hits_delete_endpoint() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("DELETE", "/api/v3/order")
        .match_query(Matcher::AllOf(vec![
            Matcher::Regex("symbol=BTCUSDT".to_string()),
            Matcher::Regex("orderId=777".to_string()),
        ]))
        .with_status(200)
        .with_body(r#"{"orderId":777,"status":"CANCELED"}"#)
        .create_async()
        .await;

    let client = client_for(&server);
    client.cancel_order("BTCUSDT", "777").await.unwrap();

    mock.assert_async().await;
}

//! Binance USDT-margined futures venue adapter.
//!
//! Plain REST over `reqwest`: public endpoints for metadata and market
//! data, HMAC-SHA256 signed requests for order flow. Exchange error codes
//! are mapped onto the `VenueError` taxonomy so the engine can branch on
//! error class instead of matching message strings.

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use hmac::{Hmac, Mac};
use reqwest::{Client, Method, StatusCode};
use rust_decimal::Decimal;
use serde::Deserialize;
use sha2::Sha256;
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

use crate::error::VenueError;
use crate::models::Candle;
use crate::venue::{
    OrderOpts, OrderRef, OrderReport, OrderSide, OrderState, SymbolFilters, Venue,
};

const FAPI_URL: &str = "https://fapi.binance.com";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
const RECV_WINDOW_MS: u64 = 5_000;

type HmacSha256 = Hmac<Sha256>;

/// REST client for Binance USDT-margined futures.
pub struct BinanceFutures {
    http: Client,
    base_url: String,
    api_key: Option<String>,
    api_secret: Option<String>,
}

impl BinanceFutures {
    /// Build a client with credentials from `BINANCE_API_KEY` /
    /// `BINANCE_SECRET_KEY`. Missing credentials still allow public
    /// market-data calls, which is what the paper venue needs.
    pub fn from_env() -> Result<Self, VenueError> {
        let api_key = std::env::var("BINANCE_API_KEY").ok();
        let api_secret = std::env::var("BINANCE_SECRET_KEY").ok();
        Self::new(FAPI_URL.to_string(), api_key, api_secret)
    }

    pub fn new(
        base_url: String,
        api_key: Option<String>,
        api_secret: Option<String>,
    ) -> Result<Self, VenueError> {
        let http = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| VenueError::Connection(e.to_string()))?;
        Ok(Self {
            http,
            base_url,
            api_key,
            api_secret,
        })
    }

    /// Whether order endpoints can be used.
    pub fn has_credentials(&self) -> bool {
        self.api_key.is_some() && self.api_secret.is_some()
    }

    fn sign(&self, query: &str) -> Result<String, VenueError> {
        let secret = self
            .api_secret
            .as_deref()
            .ok_or(VenueError::MissingCredentials("BINANCE_SECRET_KEY"))?;
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|e| VenueError::Response(format!("hmac init: {e}")))?;
        mac.update(query.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    async fn public_get(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<serde_json::Value, VenueError> {
        let url = format!("{}{}", self.base_url, path);
        debug!(url = %url, "venue GET");
        let response = self.http.get(&url).query(params).send().await?;
        Self::parse_response(response).await
    }

    async fn signed_request(
        &self,
        method: Method,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<serde_json::Value, VenueError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(VenueError::MissingCredentials("BINANCE_API_KEY"))?;

        let mut query: Vec<String> = params
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect();
        query.push(format!("timestamp={}", Utc::now().timestamp_millis()));
        query.push(format!("recvWindow={RECV_WINDOW_MS}"));
        let query = query.join("&");
        let signature = self.sign(&query)?;

        let url = format!("{}{}?{}&signature={}", self.base_url, path, query, signature);
        debug!(path = %path, method = %method, "venue signed request");

        let response = self
            .http
            .request(method, &url)
            .header("X-MBX-APIKEY", api_key)
            .send()
            .await?;
        Self::parse_response(response).await
    }

    async fn parse_response(response: reqwest::Response) -> Result<serde_json::Value, VenueError> {
        let status = response.status();
        let body = response.text().await?;

        if status.is_success() {
            return serde_json::from_str(&body)
                .map_err(|e| VenueError::Response(format!("bad venue json: {e}")));
        }

        // error payloads look like {"code": -2013, "msg": "..."}
        if let Ok(err) = serde_json::from_str::<ApiError>(&body) {
            return Err(map_api_error(err.code, err.msg));
        }
        if status == StatusCode::REQUEST_TIMEOUT || status == StatusCode::GATEWAY_TIMEOUT {
            return Err(VenueError::Timeout(format!("{status}: {body}")));
        }
        Err(VenueError::Response(format!("{status}: {body}")))
    }

    fn decimal_field(value: &serde_json::Value, field: &str) -> Result<Decimal, VenueError> {
        let raw = value
            .get(field)
            .and_then(|v| v.as_str())
            .ok_or_else(|| VenueError::Response(format!("missing field {field}")))?;
        Decimal::from_str(raw)
            .map_err(|e| VenueError::Response(format!("bad decimal in {field}: {e}")))
    }

    fn client_order_id() -> String {
        format!("st-{}", Uuid::new_v4().simple())
    }
}

#[derive(Debug, Deserialize)]
struct ApiError {
    code: i64,
    #[serde(default)]
    msg: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderAck {
    order_id: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderDetail {
    status: String,
    #[serde(with = "rust_decimal::serde::str")]
    executed_qty: Decimal,
    #[serde(default, with = "rust_decimal::serde::str")]
    avg_price: Decimal,
}

fn map_api_error(code: i64, msg: String) -> VenueError {
    match code {
        // unknown order on query or cancel
        -2011 | -2013 => VenueError::OrderNotFound(msg),
        // margin/balance
        -2018 | -2019 => VenueError::InsufficientFunds(msg),
        // filter violations, bad prices, reduce-only rejections
        -1013 | -1111 | -2021 | -2022 | -4164 => VenueError::Rejected(msg),
        _ => VenueError::Response(format!("code {code}: {msg}")),
    }
}

fn order_state(status: &str) -> OrderState {
    match status {
        "NEW" | "PARTIALLY_FILLED" => OrderState::Open,
        // FILLED, CANCELED, EXPIRED, REJECTED no longer work
        _ => OrderState::Closed,
    }
}

fn parse_klines(value: &serde_json::Value) -> Result<Vec<Candle>, VenueError> {
    let rows = value
        .as_array()
        .ok_or_else(|| VenueError::Response("klines not an array".into()))?;

    let mut candles = Vec::with_capacity(rows.len());
    for row in rows {
        let cols = row
            .as_array()
            .filter(|c| c.len() >= 6)
            .ok_or_else(|| VenueError::Response("short kline row".into()))?;

        let open_ms = cols[0]
            .as_i64()
            .ok_or_else(|| VenueError::Response("bad kline open time".into()))?;
        let open_time = Utc
            .timestamp_millis_opt(open_ms)
            .single()
            .ok_or_else(|| VenueError::Response("kline time out of range".into()))?;

        let field = |i: usize| -> Result<Decimal, VenueError> {
            let raw = cols[i]
                .as_str()
                .ok_or_else(|| VenueError::Response("kline field not a string".into()))?;
            Decimal::from_str(raw)
                .map_err(|e| VenueError::Response(format!("bad kline decimal: {e}")))
        };

        candles.push(Candle {
            open_time,
            open: field(1)?,
            high: field(2)?,
            low: field(3)?,
            close: field(4)?,
            volume: field(5)?,
        });
    }
    Ok(candles)
}

#[async_trait]
impl Venue for BinanceFutures {
    async fn symbol_filters(&self, symbol: &str) -> Result<SymbolFilters, VenueError> {
        let info = self
            .public_get("/fapi/v1/exchangeInfo", &[("symbol", symbol.to_string())])
            .await?;

        let symbols = info
            .get("symbols")
            .and_then(|s| s.as_array())
            .ok_or_else(|| VenueError::Response("exchangeInfo missing symbols".into()))?;
        let entry = symbols
            .iter()
            .find(|s| s.get("symbol").and_then(|v| v.as_str()) == Some(symbol))
            .ok_or_else(|| VenueError::Response(format!("symbol {symbol} not listed")))?;

        let qty_precision = entry
            .get("quantityPrecision")
            .and_then(|v| v.as_u64())
            .ok_or_else(|| VenueError::Response("missing quantityPrecision".into()))?
            as u32;

        let filters = entry
            .get("filters")
            .and_then(|f| f.as_array())
            .ok_or_else(|| VenueError::Response("missing filters".into()))?;

        let mut price_tick = None;
        let mut min_qty = None;
        for filter in filters {
            match filter.get("filterType").and_then(|v| v.as_str()) {
                Some("PRICE_FILTER") => {
                    price_tick = Some(Self::decimal_field(filter, "tickSize")?);
                }
                Some("LOT_SIZE") => {
                    min_qty = Some(Self::decimal_field(filter, "minQty")?);
                }
                _ => {}
            }
        }

        Ok(SymbolFilters {
            price_tick: price_tick
                .ok_or_else(|| VenueError::Response("missing PRICE_FILTER".into()))?,
            qty_precision,
            min_qty: min_qty.ok_or_else(|| VenueError::Response("missing LOT_SIZE".into()))?,
        })
    }

    async fn ticker_price(&self, symbol: &str) -> Result<Decimal, VenueError> {
        let value = self
            .public_get("/fapi/v1/ticker/price", &[("symbol", symbol.to_string())])
            .await?;
        Self::decimal_field(&value, "price")
    }

    async fn candles(
        &self,
        symbol: &str,
        timeframe: &str,
        limit: usize,
    ) -> Result<Vec<Candle>, VenueError> {
        let value = self
            .public_get(
                "/fapi/v1/klines",
                &[
                    ("symbol", symbol.to_string()),
                    ("interval", timeframe.to_string()),
                    ("limit", limit.to_string()),
                ],
            )
            .await?;

        parse_klines(&value)
    }

    async fn place_limit_order(
        &self,
        symbol: &str,
        side: OrderSide,
        qty: Decimal,
        price: Decimal,
        opts: OrderOpts,
    ) -> Result<OrderRef, VenueError> {
        let mut params = vec![
            ("symbol", symbol.to_string()),
            ("side", side.as_str().to_string()),
            ("type", "LIMIT".to_string()),
            ("timeInForce", opts.time_in_force.as_str().to_string()),
            ("quantity", qty.to_string()),
            ("price", price.to_string()),
            ("newClientOrderId", Self::client_order_id()),
        ];
        if opts.reduce_only {
            params.push(("reduceOnly", "true".to_string()));
        }

        let value = self
            .signed_request(Method::POST, "/fapi/v1/order", &params)
            .await?;
        let ack: OrderAck = serde_json::from_value(value)
            .map_err(|e| VenueError::Response(format!("bad order ack: {e}")))?;
        Ok(OrderRef::new(symbol, ack.order_id.to_string()))
    }

    async fn place_stop_market_order(
        &self,
        symbol: &str,
        side: OrderSide,
        qty: Decimal,
        trigger_price: Decimal,
    ) -> Result<OrderRef, VenueError> {
        let params = vec![
            ("symbol", symbol.to_string()),
            ("side", side.as_str().to_string()),
            ("type", "STOP_MARKET".to_string()),
            ("quantity", qty.to_string()),
            ("stopPrice", trigger_price.to_string()),
            ("reduceOnly", "true".to_string()),
            ("newClientOrderId", Self::client_order_id()),
        ];

        let value = self
            .signed_request(Method::POST, "/fapi/v1/order", &params)
            .await?;
        let ack: OrderAck = serde_json::from_value(value)
            .map_err(|e| VenueError::Response(format!("bad order ack: {e}")))?;
        Ok(OrderRef::new(symbol, ack.order_id.to_string()))
    }

    async fn place_market_order(
        &self,
        symbol: &str,
        side: OrderSide,
        qty: Decimal,
        reduce_only: bool,
    ) -> Result<OrderRef, VenueError> {
        let mut params = vec![
            ("symbol", symbol.to_string()),
            ("side", side.as_str().to_string()),
            ("type", "MARKET".to_string()),
            ("quantity", qty.to_string()),
            ("newClientOrderId", Self::client_order_id()),
        ];
        if reduce_only {
            params.push(("reduceOnly", "true".to_string()));
        }

        let value = self
            .signed_request(Method::POST, "/fapi/v1/order", &params)
            .await?;
        let ack: OrderAck = serde_json::from_value(value)
            .map_err(|e| VenueError::Response(format!("bad order ack: {e}")))?;
        Ok(OrderRef::new(symbol, ack.order_id.to_string()))
    }

    async fn cancel_order(&self, order: &OrderRef) -> Result<bool, VenueError> {
        let params = vec![
            ("symbol", order.symbol.clone()),
            ("orderId", order.id.clone()),
        ];
        match self
            .signed_request(Method::DELETE, "/fapi/v1/order", &params)
            .await
        {
            Ok(_) => Ok(true),
            Err(VenueError::OrderNotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn order_status(&self, order: &OrderRef) -> Result<OrderReport, VenueError> {
        let params = vec![
            ("symbol", order.symbol.clone()),
            ("orderId", order.id.clone()),
        ];
        let value = self
            .signed_request(Method::GET, "/fapi/v1/order", &params)
            .await?;
        let detail: OrderDetail = serde_json::from_value(value)
            .map_err(|e| VenueError::Response(format!("bad order detail: {e}")))?;

        Ok(OrderReport {
            state: order_state(&detail.status),
            filled_qty: detail.executed_qty,
            avg_fill_price: detail.avg_price,
        })
    }

    async fn net_position(&self, symbol: &str) -> Result<Decimal, VenueError> {
        let params = vec![("symbol", symbol.to_string())];
        let value = self
            .signed_request(Method::GET, "/fapi/v2/positionRisk", &params)
            .await?;

        let rows = value
            .as_array()
            .ok_or_else(|| VenueError::Response("positionRisk not an array".into()))?;

        let mut net = Decimal::ZERO;
        for row in rows {
            net += Self::decimal_field(row, "positionAmt")?;
        }
        Ok(net)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_code_mapping() {
        assert!(matches!(
            map_api_error(-2013, "no such order".into()),
            VenueError::OrderNotFound(_)
        ));
        assert!(matches!(
            map_api_error(-2019, "margin".into()),
            VenueError::InsufficientFunds(_)
        ));
        assert!(matches!(
            map_api_error(-1013, "price filter".into()),
            VenueError::Rejected(_)
        ));
        assert!(matches!(
            map_api_error(-9999, "???".into()),
            VenueError::Response(_)
        ));
    }

    #[test]
    fn order_state_mapping() {
        assert_eq!(order_state("NEW"), OrderState::Open);
        assert_eq!(order_state("PARTIALLY_FILLED"), OrderState::Open);
        assert_eq!(order_state("FILLED"), OrderState::Closed);
        assert_eq!(order_state("CANCELED"), OrderState::Closed);
        assert_eq!(order_state("EXPIRED"), OrderState::Closed);
    }

    #[test]
    fn signature_is_deterministic_hex() {
        let venue = BinanceFutures::new(
            FAPI_URL.to_string(),
            Some("key".into()),
            Some("secret".into()),
        )
        .unwrap();
        let a = venue.sign("symbol=BTCUSDT&timestamp=1").unwrap();
        let b = venue.sign("symbol=BTCUSDT&timestamp=1").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn missing_credentials_surface_clearly() {
        let venue = BinanceFutures::new(FAPI_URL.to_string(), None, None).unwrap();
        assert!(!venue.has_credentials());
        assert!(matches!(
            venue.sign("q"),
            Err(VenueError::MissingCredentials(_))
        ));
    }

    #[test]
    fn kline_rows_parse() {
        use rust_decimal_macros::dec;

        let raw = serde_json::json!([[
            1709640000000i64,
            "69000.10",
            "69100.00",
            "68900.50",
            "69050.00",
            "123.456",
            1709640179999i64,
            "8519394.11",
            1234,
            "60.0",
            "4100000.00",
            "0"
        ]]);
        let candles = parse_klines(&raw).unwrap();
        assert_eq!(candles.len(), 1);
        assert_eq!(candles[0].open, dec!(69000.10));
        assert_eq!(candles[0].close, dec!(69050.00));
        assert_eq!(candles[0].volume, dec!(123.456));
        assert_eq!(candles[0].open_time.timestamp_millis(), 1709640000000);

        let truncated = serde_json::json!([[1709640000000i64, "1", "2"]]);
        assert!(parse_klines(&truncated).is_err());
    }
}

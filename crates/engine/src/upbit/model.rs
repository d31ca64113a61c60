use chrono::{DateTime, FixedOffset, NaiveDateTime, Utc};
use serde::Deserialize;

use common::{ActionType, Candle, OpenOrder, OrderState};

// ─── Response types ──────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub(crate) struct CandleResponse {
    pub candle_date_time_utc: NaiveDateTime,
    pub candle_date_time_kst: NaiveDateTime,
    pub opening_price: f64,
    pub high_price: f64,
    pub low_price: f64,
    pub trade_price: f64,
    pub timestamp: i64,
    pub candle_acc_trade_price: f64,
    pub candle_acc_trade_volume: f64,
}

impl From<CandleResponse> for Candle {
    fn from(r: CandleResponse) -> Self {
        Candle {
            open_time_utc: r.candle_date_time_utc,
            open_time_local: r.candle_date_time_kst,
            open: r.opening_price,
            high: r.high_price,
            low: r.low_price,
            close: r.trade_price,
            volume: r.candle_acc_trade_volume,
            quote_volume: r.candle_acc_trade_price,
            timestamp: r.timestamp,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct TickerResponse {
    pub market: String,
    pub trade_price: f64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum Side {
    Bid,
    Ask,
}

impl From<Side> for ActionType {
    fn from(side: Side) -> Self {
        match side {
            Side::Bid => ActionType::Buy,
            Side::Ask => ActionType::Sell,
        }
    }
}

/// Order body shared by the place, cancel and list endpoints. Amounts come
/// back as decimal strings.
#[derive(Debug, Deserialize)]
pub(crate) struct OrderResponse {
    pub uuid: String,
    pub side: Side,
    pub state: String,
    pub created_at: DateTime<FixedOffset>,
    #[serde(default)]
    pub price: Option<String>,
    #[serde(default)]
    pub volume: Option<String>,
    #[serde(default)]
    pub remaining_volume: Option<String>,
}

impl OrderResponse {
    pub fn order_state(&self) -> OrderState {
        order_state(&self.state)
    }

    pub fn created_at_utc(&self) -> DateTime<Utc> {
        self.created_at.with_timezone(&Utc)
    }
}

impl From<OrderResponse> for OpenOrder {
    fn from(r: OrderResponse) -> Self {
        let state = r.order_state();
        let created_at = r.created_at_utc();
        OpenOrder {
            order_id: r.uuid,
            action: r.side.into(),
            price: decimal(r.price.as_deref()),
            volume: decimal(r.volume.as_deref()),
            remaining_volume: decimal(r.remaining_volume.as_deref()),
            state,
            created_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ErrorResponse {
    pub error: ErrorBody,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ErrorBody {
    pub name: String,
    #[serde(default)]
    pub message: String,
}

/// Reason text for a failed call: the exchange's error name and message when
/// the body carries one, otherwise the raw status and body.
pub(crate) fn error_reason(status: reqwest::StatusCode, body: &str) -> String {
    match serde_json::from_str::<ErrorResponse>(body) {
        Ok(e) if e.error.message.is_empty() => e.error.name,
        Ok(e) => format!("{}: {}", e.error.name, e.error.message),
        Err(_) => format!("HTTP {status}: {body}"),
    }
}

pub(crate) fn order_state(state: &str) -> OrderState {
    match state {
        "wait" => OrderState::Wait,
        "watch" => OrderState::Watch,
        "done" => OrderState::Done,
        "cancel" => OrderState::Cancel,
        _ => OrderState::Failed,
    }
}

fn decimal(raw: Option<&str>) -> f64 {
    raw.and_then(|s| s.parse().ok()).unwrap_or(0.0)
}

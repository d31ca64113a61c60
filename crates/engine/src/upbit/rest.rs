use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{FixedOffset, NaiveDateTime, Utc};
use reqwest::{Client, Method, RequestBuilder};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use common::{
    collect_candles, ActionType, CancelParam, CandleSeries, CandleUnit, Error, ExchangeGateway, ExchangeKind,
    ExchangeTradingInfo, OpenOrder, OrderCancelResult, OrderParam, OrderResult, PriceType, Result,
    TradingTerm, UnitType, WindowPlanner,
};

use super::auth::{self, KeyResolver};
use super::model::{error_reason, CandleResponse, OrderResponse, TickerResponse};

/// Minute sizes the candle endpoint serves.
const MINUTE_SIZES: [u32; 8] = [1, 3, 5, 10, 15, 30, 60, 240];

/// Upbit quotes candle boundaries in KST.
fn kst() -> FixedOffset {
    FixedOffset::east_opt(9 * 3600).expect("+09:00 is a valid offset")
}

/// REST client for Upbit. Candle windows and `to` parameters are exchange-local
/// (KST) times.
///
/// Signed calls carry the header built by [`auth::authorization`], an HMAC
/// placeholder that Upbit's live API refuses. Credentials and signing sit
/// behind [`KeyResolver`] until the exchange's token scheme is wired in, so
/// live trading needs a resolver and signer for that scheme.
pub struct UpbitClient {
    base_url: String,
    http: Client,
    planner: WindowPlanner,
    keys: Arc<dyn KeyResolver>,
}

impl UpbitClient {
    pub fn new(
        base_url: impl Into<String>,
        max_page_size: u32,
        timeout: Duration,
        keys: Arc<dyn KeyResolver>,
    ) -> Result<Self> {
        let http = Client::builder()
            .use_rustls_tls()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
            planner: WindowPlanner::new(max_page_size)?,
            keys,
        })
    }

    fn candle_path(unit: CandleUnit) -> Result<String> {
        let unsupported = || Error::UnsupportedGranularity(format!("{unit} on Upbit"));
        match unit.unit_type() {
            UnitType::Minute if MINUTE_SIZES.contains(&unit.size()) => {
                Ok(format!("/v1/candles/minutes/{}", unit.size()))
            }
            UnitType::Day if unit.size() == 1 => Ok("/v1/candles/days".into()),
            UnitType::Week if unit.size() == 1 => Ok("/v1/candles/weeks".into()),
            _ => Err(unsupported()),
        }
    }

    /// Public market-data GET. Every failure is `MarketDataUnavailable`.
    async fn public_get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<T> {
        let url = format!("{}{path}", self.base_url);
        let resp = self
            .http
            .get(&url)
            .query(query)
            .send()
            .await
            .map_err(|e| Error::MarketDataUnavailable(e.to_string()))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| Error::MarketDataUnavailable(e.to_string()))?;
        if !status.is_success() {
            return Err(Error::MarketDataUnavailable(error_reason(status, &body)));
        }
        serde_json::from_str(&body).map_err(|e| Error::MarketDataUnavailable(format!("{path}: {e}")))
    }

    /// Signed account call. 4xx answers (except throttling) are rejections;
    /// network errors, throttling and 5xx answers are transport failures.
    async fn signed<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        params: &[(&str, String)],
        key_pair_id: &str,
    ) -> Result<T> {
        let keys = self.keys.resolve(key_pair_id)?;
        let query = params
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&");
        let url = format!("{}{path}", self.base_url);

        let request: RequestBuilder = if method == Method::POST {
            let body: serde_json::Map<String, serde_json::Value> = params
                .iter()
                .map(|(k, v)| (k.to_string(), serde_json::Value::String(v.clone())))
                .collect();
            self.http.post(&url).json(&body)
        } else {
            self.http.request(method, &url).query(params)
        };

        let resp = request
            .header("Authorization", auth::authorization(&keys, &query))
            .send()
            .await
            .map_err(|e| Error::TransportFailure(e.to_string()))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| Error::TransportFailure(e.to_string()))?;

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            return Err(Error::TransportFailure(error_reason(status, &body)));
        }
        if !status.is_success() {
            return Err(Error::OrderRejected {
                reason: error_reason(status, &body),
            });
        }
        serde_json::from_str(&body).map_err(|e| Error::TransportFailure(format!("{path}: {e}")))
    }

    async fn current_price(&self, instrument: &str) -> Result<f64> {
        let tickers: Vec<TickerResponse> = self
            .public_get("/v1/ticker", &[("markets", instrument.to_string())])
            .await?;
        tickers
            .into_iter()
            .find(|t| t.market == instrument)
            .map(|t| t.trade_price)
            .ok_or_else(|| Error::MarketDataUnavailable(format!("no ticker for {instrument}")))
    }

    async fn open_orders(&self, instrument: &str, key_pair_id: &str) -> Result<Vec<OpenOrder>> {
        let params = [("market", instrument.to_string()), ("state", "wait".to_string())];
        let orders: Vec<OrderResponse> = self
            .signed(Method::GET, "/v1/orders", &params, key_pair_id)
            .await
            .map_err(market_data)?;
        Ok(orders.into_iter().map(OpenOrder::from).collect())
    }
}

#[async_trait]
impl ExchangeGateway for UpbitClient {
    fn exchange(&self) -> ExchangeKind {
        ExchangeKind::Upbit
    }

    fn max_page_size(&self) -> u32 {
        self.planner.max_page_size()
    }

    fn local_now(&self) -> NaiveDateTime {
        Utc::now().with_timezone(&kst()).naive_local()
    }

    async fn fetch_candles(
        &self,
        instrument: &str,
        unit: CandleUnit,
        start: NaiveDateTime,
        end: NaiveDateTime,
        _key_pair_id: &str,
    ) -> Result<CandleSeries> {
        let path = Self::candle_path(unit)?;
        let window = self.planner.plan(unit, start, end)?;
        if window.row_count == 0 {
            return Ok(CandleSeries::empty(ExchangeKind::Upbit, instrument, unit));
        }

        let to = window
            .effective_end
            .and_local_timezone(kst())
            .single()
            .ok_or_else(|| Error::InvalidRange {
                start: start.to_string(),
                end: end.to_string(),
            })?;
        let query = [
            ("market", instrument.to_string()),
            ("to", to.format("%Y-%m-%dT%H:%M:%S%:z").to_string()),
            ("count", window.row_count.to_string()),
        ];

        debug!(%instrument, %unit, start = %window.start, end = %window.effective_end,
            rows = window.row_count, "Fetching Upbit candles");
        let rows: Vec<CandleResponse> = self.public_get(&path, &query).await?;

        // Newest first on the wire; the series sorts them.
        let candles = rows.into_iter().map(Into::into).collect();
        Ok(CandleSeries::new(ExchangeKind::Upbit, instrument, unit, candles))
    }

    async fn fetch_trading_info(
        &self,
        instrument: &str,
        term: TradingTerm,
        key_pair_id: &str,
    ) -> Result<ExchangeTradingInfo> {
        let fetched_at = Utc::now();
        let end = fetched_at.with_timezone(&kst()).naive_local();
        let start = end - term.lookback().map_err(market_data)?;

        let candles = collect_candles(self, instrument, term.candle_unit(), start, end, key_pair_id)
            .await
            .map_err(market_data)?;
        let current_price = self.current_price(instrument).await?;
        let open_orders = self.open_orders(instrument, key_pair_id).await?;

        Ok(ExchangeTradingInfo {
            exchange: ExchangeKind::Upbit,
            instrument: instrument.to_string(),
            term,
            current_price,
            candles,
            open_orders,
            fetched_at,
        })
    }

    async fn place_order(&self, param: &OrderParam, key_pair_id: &str) -> Result<OrderResult> {
        let mut params = vec![
            ("market", param.instrument.clone()),
            ("side", side(param.action)?.to_string()),
        ];
        let ord_type = match (param.price_type, param.action) {
            (PriceType::Limit, _) => {
                params.push(("volume", param.volume.to_string()));
                params.push(("price", param.price.to_string()));
                "limit"
            }
            // Market buys are sized by the amount spent.
            (PriceType::Market, ActionType::Buy) => {
                params.push(("price", param.price.to_string()));
                "price"
            }
            (PriceType::Market, _) => {
                params.push(("volume", param.volume.to_string()));
                "market"
            }
        };
        params.push(("ord_type", ord_type.to_string()));

        debug!(instrument = %param.instrument, action = %param.action, ord_type, "Submitting order to Upbit");
        let resp: OrderResponse = self
            .signed(Method::POST, "/v1/orders", &params, key_pair_id)
            .await
            .inspect_err(|e| warn!(instrument = %param.instrument, error = %e, "Upbit order failed"))?;

        Ok(OrderResult {
            state: resp.order_state(),
            created_at: resp.created_at_utc(),
            order_id: resp.uuid,
        })
    }

    async fn cancel_order(
        &self,
        param: &CancelParam,
        key_pair_id: &str,
    ) -> Result<OrderCancelResult> {
        let params = [("uuid", param.order_id.clone())];
        debug!(order_id = %param.order_id, "Cancelling Upbit order");
        let resp: OrderResponse = self
            .signed(Method::DELETE, "/v1/order", &params, key_pair_id)
            .await
            .inspect_err(|e| warn!(order_id = %param.order_id, error = %e, "Upbit cancel failed"))?;

        Ok(OrderCancelResult {
            state: resp.order_state(),
            created_at: resp.created_at_utc(),
            order_id: resp.uuid,
        })
    }
}

fn side(action: ActionType) -> Result<&'static str> {
    match action {
        ActionType::Buy => Ok("bid"),
        ActionType::Sell => Ok("ask"),
        other => Err(Error::InvalidTask(format!("{other} is not an order side"))),
    }
}

fn market_data(e: Error) -> Error {
    match e {
        Error::MarketDataUnavailable(_) => e,
        other => Error::MarketDataUnavailable(other.to_string()),
    }
}

use chrono::{Duration, NaiveDate, TimeZone, Utc};

use common::{
    ActionType, Candle, CandleSeries, ExchangeKind, ExchangeTradingInfo, OpenOrder, OrderState,
    OrderResult, StrategyCode, TradingResult, TradingTask, TradingTerm,
};

pub const INSTRUMENT: &str = "KRW-BTC";

pub fn snapshot(closes: &[f64], open_orders: Vec<OpenOrder>) -> ExchangeTradingInfo {
    let term = TradingTerm::Scalping;
    let base = NaiveDate::from_ymd_opt(2024, 1, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap();
    let candles = closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            let t = base + Duration::minutes(i as i64);
            Candle {
                open_time_utc: t,
                open_time_local: t + Duration::hours(9),
                open: close,
                high: close,
                low: close,
                close,
                volume: 1.0,
                quote_volume: close,
                timestamp: t.and_utc().timestamp_millis(),
            }
        })
        .collect();

    ExchangeTradingInfo {
        exchange: ExchangeKind::Paper,
        instrument: INSTRUMENT.to_string(),
        term,
        current_price: closes.last().copied().unwrap_or(0.0),
        candles: CandleSeries::new(ExchangeKind::Paper, INSTRUMENT, term.candle_unit(), candles),
        open_orders,
        fetched_at: Utc.with_ymd_and_hms(2024, 1, 1, 3, 20, 0).unwrap(),
    }
}

pub fn open_order(id: &str, action: ActionType, age_secs: i64) -> OpenOrder {
    OpenOrder {
        order_id: id.to_string(),
        action,
        price: 100.0,
        volume: 1.0,
        remaining_volume: 1.0,
        state: OrderState::Wait,
        created_at: Utc.with_ymd_and_hms(2024, 1, 1, 3, 20, 0).unwrap() - Duration::seconds(age_secs),
    }
}

pub fn outcome(task: &TradingTask, order_id: &str, state: OrderState) -> TradingResult {
    TradingResult::from_order(
        task,
        &OrderResult {
            order_id: order_id.to_string(),
            state,
            created_at: Utc::now(),
        },
    )
}

pub fn buy(code: StrategyCode, volume: f64) -> TradingTask {
    TradingTask::buy(code, INSTRUMENT, volume, 100.0, common::PriceType::Limit)
}

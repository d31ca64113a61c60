use chrono::{Duration, NaiveDate, NaiveDateTime};
use common::{collect_candles, CandleUnit, Error, ExchangeKind};
use paper::PaperExchange;

fn t0() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap()
}

#[tokio::test]
async fn whole_minute_page_ends_drop_each_page_start() {
    let unit = CandleUnit::minutes(1).unwrap();
    let closes: Vec<f64> = (0..500).map(f64::from).collect();
    let exchange = PaperExchange::builder()
        .max_page_size(200)
        .candles("KRW-BTC", unit, t0(), &closes)
        .build()
        .unwrap();

    // Pages end at 03:20, 06:40 and 08:20:30. The first two land on whole
    // minutes and hold 199 rows each.
    let end = t0() + Duration::minutes(500) + Duration::seconds(30);
    let series = collect_candles(&exchange, "KRW-BTC", unit, t0(), end, "paper").await.unwrap();

    assert_eq!(series.exchange, ExchangeKind::Paper);
    assert_eq!(series.len(), 498);
    let times: Vec<_> = series.candles().iter().map(|c| c.open_time_local).collect();
    assert!(!times.contains(&t0()));
    assert!(!times.contains(&(t0() + Duration::minutes(200))));
    assert_eq!(times.first(), Some(&(t0() + Duration::minutes(1))));
    assert_eq!(times.last(), Some(&(t0() + Duration::minutes(499))));
}

#[tokio::test]
async fn page_end_off_the_minute_returns_every_bar_in_range() {
    let unit = CandleUnit::minutes(1).unwrap();
    let closes: Vec<f64> = (0..30).map(f64::from).collect();
    let exchange = PaperExchange::builder()
        .max_page_size(200)
        .candles("KRW-BTC", unit, t0(), &closes)
        .build()
        .unwrap();

    let end = t0() + Duration::minutes(29) + Duration::seconds(59);
    let series = collect_candles(&exchange, "KRW-BTC", unit, t0() + Duration::seconds(59), end, "paper")
        .await
        .unwrap();
    assert_eq!(series.closes(), (1..30).map(f64::from).collect::<Vec<_>>());
}

#[tokio::test]
async fn inverted_range_is_rejected() {
    let unit = CandleUnit::minutes(1).unwrap();
    let exchange = PaperExchange::builder().build().unwrap();
    let err = collect_candles(&exchange, "KRW-BTC", unit, t0(), t0(), "paper").await.unwrap_err();
    assert!(matches!(err, Error::InvalidRange { .. }));
}

use chrono::{Duration, NaiveDate, NaiveDateTime};
use common::{CandleUnit, Error, UnitType, WindowPlanner};
use proptest::prelude::*;

fn base() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2020, 1, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
}

fn unit_strategy() -> impl Strategy<Value = CandleUnit> {
    (
        prop_oneof![Just(UnitType::Minute), Just(UnitType::Day), Just(UnitType::Week)],
        1u32..=240,
    )
        .prop_map(|(unit_type, size)| CandleUnit::new(unit_type, size).unwrap())
}

proptest! {
    /// A planned page never reaches past the requested end nor holds more
    /// rows than the page limit.
    #[test]
    fn plan_stays_within_range_and_page(
        unit in unit_strategy(),
        start_offset_secs in 0i64..(5 * 365 * 86_400),
        span_secs in 1i64..(3 * 365 * 86_400),
        max_page in 1u32..=500,
    ) {
        let planner = WindowPlanner::new(max_page).unwrap();
        let start = base() + Duration::seconds(start_offset_secs);
        let end = start + Duration::seconds(span_secs);

        let window = planner.plan(unit, start, end).unwrap();
        prop_assert!(window.effective_end <= end);
        prop_assert!(window.effective_end > start);
        prop_assert!(window.row_count <= max_page);
    }

    /// Pages tile the requested range without gaps or overlap.
    #[test]
    fn pages_cover_range_contiguously(
        size in 1u32..=30,
        span_mins in 1i64..20_000,
        extra_secs in 0i64..60,
    ) {
        let planner = WindowPlanner::default();
        let unit = CandleUnit::minutes(size).unwrap();
        let start = base();
        let end = start + Duration::minutes(span_mins) + Duration::seconds(extra_secs);

        let pages = planner.pages(unit, start, end).unwrap();
        prop_assert_eq!(pages.first().map(|p| p.start), Some(start));
        prop_assert_eq!(pages.last().map(|p| p.effective_end), Some(end));
        for pair in pages.windows(2) {
            prop_assert_eq!(pair[0].effective_end, pair[1].start);
        }
    }

    /// Months have no calendar entry, whatever the range.
    #[test]
    fn month_unit_is_always_unsupported(span_days in 1i64..2_000) {
        let planner = WindowPlanner::default();
        let unit = CandleUnit::new(UnitType::Month, 1).unwrap();
        let end = base() + Duration::days(span_days);
        prop_assert!(matches!(
            planner.plan(unit, base(), end),
            Err(Error::UnsupportedGranularity(_))
        ));
    }
}

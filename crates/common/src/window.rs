//! Candle window planning.
//!
//! Exchanges cap how many candles a single request may return. Given a unit
//! and a `[start, end)` range, the planner works out how far one page can
//! reach and how many rows that page holds, so the gateway can issue a
//! request the exchange will accept.
//!
//! Minute candles follow the exchange's boundary convention: when the page
//! end sits exactly on a whole minute, the bar opening at that minute is not
//! part of the page, so the naive count is one too high. Day and week pages
//! get no such correction.

use chrono::{Duration, NaiveDateTime, Timelike};

use crate::{CandleUnit, Error, Result, UnitType};

/// Page limit for exchanges that do not configure their own.
pub const DEFAULT_MAX_PAGE_SIZE: u32 = 200;

/// One exchange-compliant page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CandleWindow {
    pub start: NaiveDateTime,
    /// Last instant covered by the page. Never after the requested end.
    pub effective_end: NaiveDateTime,
    pub row_count: u32,
}

/// Calendar arithmetic for one unit type.
struct Calendar {
    span: fn(i64) -> Option<Duration>,
    whole_units: fn(&Duration) -> i64,
    exclusive_minute_boundary: bool,
}

fn calendar(unit_type: UnitType) -> Result<Calendar> {
    match unit_type {
        UnitType::Minute => Ok(Calendar {
            span: Duration::try_minutes,
            whole_units: Duration::num_minutes,
            exclusive_minute_boundary: true,
        }),
        UnitType::Day => Ok(Calendar {
            span: Duration::try_days,
            whole_units: Duration::num_days,
            exclusive_minute_boundary: false,
        }),
        UnitType::Week => Ok(Calendar {
            span: Duration::try_weeks,
            whole_units: Duration::num_weeks,
            exclusive_minute_boundary: false,
        }),
        UnitType::Month => Err(Error::unsupported(unit_type)),
    }
}

/// Length of one candle of `unit`.
///
/// Fails with `InvalidUnit` when the size is too large for a duration.
pub fn unit_span(unit: CandleUnit) -> Result<Duration> {
    let cal = calendar(unit.unit_type())?;
    (cal.span)(i64::from(unit.size()))
        .ok_or_else(|| Error::InvalidUnit(format!("{unit} is longer than any representable duration")))
}

/// Plans candle pages for an exchange with a fixed maximum page size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowPlanner {
    max_page_size: u32,
}

impl Default for WindowPlanner {
    fn default() -> Self {
        Self {
            max_page_size: DEFAULT_MAX_PAGE_SIZE,
        }
    }
}

impl WindowPlanner {
    pub fn new(max_page_size: u32) -> Result<Self> {
        if max_page_size == 0 {
            return Err(Error::Config("max page size must be at least 1".into()));
        }
        Ok(Self { max_page_size })
    }

    pub fn max_page_size(&self) -> u32 {
        self.max_page_size
    }

    /// The earlier of `end` and the furthest point one page can reach from `start`.
    ///
    /// A reach that overflows the calendar lies past any `end`, so `end` is returned.
    pub fn limited_end(
        &self,
        unit: CandleUnit,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<NaiveDateTime> {
        let cal = calendar(unit.unit_type())?;
        let limit = i64::from(self.max_page_size)
            .checked_mul(i64::from(unit.size()))
            .and_then(cal.span)
            .and_then(|reach| start.checked_add_signed(reach));
        Ok(match limit {
            Some(limit) => end.min(limit),
            None => end,
        })
    }

    /// Number of whole candles between `start` and `end`.
    ///
    /// Fails with `PageSizeExceeded` instead of truncating when the span
    /// holds more rows than one page allows.
    pub fn row_count(
        &self,
        unit: CandleUnit,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<u32> {
        let cal = calendar(unit.unit_type())?;
        if end <= start {
            return Err(invalid_range(start, end));
        }

        let mut count = (cal.whole_units)(&(end - start)) / i64::from(unit.size());
        if cal.exclusive_minute_boundary && end.second() == 0 {
            count -= 1;
        }
        let count = count.max(0);

        if count > i64::from(self.max_page_size) {
            return Err(Error::PageSizeExceeded {
                requested: count,
                max: self.max_page_size,
            });
        }
        Ok(count as u32)
    }

    /// Plan the first page of `[start, end)`.
    pub fn plan(
        &self,
        unit: CandleUnit,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<CandleWindow> {
        let effective_end = self.limited_end(unit, start, end)?;
        let row_count = self.row_count(unit, start, effective_end)?;
        Ok(CandleWindow {
            start,
            effective_end,
            row_count,
        })
    }

    /// Plan every page needed to cover `[start, end)`, each starting where
    /// the previous one ended.
    pub fn pages(
        &self,
        unit: CandleUnit,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<Vec<CandleWindow>> {
        if end <= start {
            return Err(invalid_range(start, end));
        }
        let mut pages = Vec::new();
        let mut cursor = start;
        while cursor < end {
            let window = self.plan(unit, cursor, end)?;
            cursor = window.effective_end;
            pages.push(window);
        }
        Ok(pages)
    }
}

fn invalid_range(start: NaiveDateTime, end: NaiveDateTime) -> Error {
    Error::InvalidRange {
        start: start.to_string(),
        end: end.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(day: u32, h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, day)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    fn minute() -> CandleUnit {
        CandleUnit::minutes(1).unwrap()
    }

    fn month() -> CandleUnit {
        CandleUnit::new(UnitType::Month, 1).unwrap()
    }

    #[test]
    fn minute_end_on_exact_boundary_drops_one_row() {
        let planner = WindowPlanner::default();
        let w = planner.plan(minute(), at(1, 0, 0, 0), at(1, 0, 10, 0)).unwrap();
        assert_eq!(w.effective_end, at(1, 0, 10, 0));
        assert_eq!(w.row_count, 9);
    }

    #[test]
    fn minute_end_with_seconds_keeps_count() {
        let planner = WindowPlanner::default();
        let w = planner.plan(minute(), at(1, 0, 0, 0), at(1, 0, 10, 30)).unwrap();
        assert_eq!(w.effective_end, at(1, 0, 10, 30));
        assert_eq!(w.row_count, 10);
    }

    #[test]
    fn minute_count_is_divided_by_unit_size() {
        let planner = WindowPlanner::default();
        let unit = CandleUnit::minutes(5).unwrap();
        let count = planner.row_count(unit, at(1, 0, 0, 0), at(1, 1, 0, 30)).unwrap();
        assert_eq!(count, 12);
    }

    #[test]
    fn day_window_is_clamped_to_one_page() {
        let planner = WindowPlanner::default();
        let unit = CandleUnit::days(1).unwrap();
        let start = at(1, 0, 0, 0);
        let end = start + Duration::days(500);

        let w = planner.plan(unit, start, end).unwrap();
        assert_eq!(w.effective_end, start + Duration::days(200));
        assert_eq!(w.row_count, 200);
    }

    #[test]
    fn day_count_over_page_size_is_an_error() {
        let planner = WindowPlanner::default();
        let unit = CandleUnit::days(1).unwrap();
        let start = at(1, 0, 0, 0);

        let err = planner
            .row_count(unit, start, start + Duration::days(500))
            .unwrap_err();
        assert!(
            matches!(err, Error::PageSizeExceeded { requested: 500, max: 200 }),
            "unexpected error: {err}"
        );
    }

    #[test]
    fn week_count_truncates_partial_weeks() {
        let planner = WindowPlanner::default();
        let unit = CandleUnit::weeks(2).unwrap();
        let start = at(1, 0, 0, 0);
        let end = start + Duration::weeks(11) + Duration::days(3);
        assert_eq!(planner.row_count(unit, start, end).unwrap(), 5);
    }

    #[test]
    fn smaller_page_size_moves_the_limit() {
        let planner = WindowPlanner::new(10).unwrap();
        let unit = CandleUnit::minutes(3).unwrap();
        let end = planner.limited_end(unit, at(1, 0, 0, 0), at(2, 0, 0, 0)).unwrap();
        assert_eq!(end, at(1, 0, 30, 0));
    }

    #[test]
    fn unsupported_unit_fails_for_end_and_count() {
        let planner = WindowPlanner::default();
        let start = at(1, 0, 0, 0);
        let end = at(20, 0, 0, 0);
        assert!(matches!(
            planner.limited_end(month(), start, end),
            Err(Error::UnsupportedGranularity(_))
        ));
        assert!(matches!(
            planner.row_count(month(), start, end),
            Err(Error::UnsupportedGranularity(_))
        ));
    }

    #[test]
    fn empty_or_reversed_range_is_rejected() {
        let planner = WindowPlanner::default();
        let t = at(1, 0, 0, 0);
        assert!(matches!(planner.plan(minute(), t, t), Err(Error::InvalidRange { .. })));
        assert!(matches!(
            planner.pages(minute(), t, t - Duration::minutes(1)),
            Err(Error::InvalidRange { .. })
        ));
    }

    #[test]
    fn zero_page_size_is_a_config_error() {
        assert!(matches!(WindowPlanner::new(0), Err(Error::Config(_))));
    }

    #[test]
    fn pages_chain_until_end() {
        let planner = WindowPlanner::default();
        let start = at(1, 0, 0, 0);
        let end = start + Duration::minutes(450) + Duration::seconds(30);

        let pages = planner.pages(minute(), start, end).unwrap();
        assert_eq!(pages.len(), 3);
        assert_eq!(pages[0].effective_end, start + Duration::minutes(200));
        assert_eq!(pages[1].start, pages[0].effective_end);
        assert_eq!(pages[2].effective_end, end);
        let counts: Vec<u32> = pages.iter().map(|p| p.row_count).collect();
        assert_eq!(counts, vec![199, 199, 50]);
    }

    #[test]
    fn oversized_unit_plans_an_empty_page() {
        let planner = WindowPlanner::default();
        let unit = CandleUnit::weeks(u32::MAX).unwrap();
        let start = at(1, 0, 0, 0);
        let end = start + Duration::weeks(1);

        let w = planner.plan(unit, start, end).unwrap();
        assert_eq!(w.effective_end, end);
        assert_eq!(w.row_count, 0);
        assert_eq!(planner.pages(unit, start, end).unwrap().len(), 1);
        assert!(matches!(unit_span(unit), Err(Error::InvalidUnit(_))));
    }

    #[test]
    fn unit_span_scales_with_size() {
        assert_eq!(unit_span(CandleUnit::minutes(15).unwrap()).unwrap(), Duration::minutes(15));
        assert_eq!(unit_span(CandleUnit::weeks(2).unwrap()).unwrap(), Duration::weeks(2));
        let month = CandleUnit::new(UnitType::Month, 1).unwrap();
        assert!(matches!(unit_span(month), Err(Error::UnsupportedGranularity(_))));
    }
}

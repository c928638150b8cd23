//! Calendar effects, evaluated on the candle's UTC open time.

use chrono::{Datelike, Duration, NaiveDate, Timelike, Weekday};
use common::{Direction, Signal};
use serde::{Deserialize, Serialize};

use super::filters::Gate;
use super::{Rule, RuleContext};

/// A set of calendar positions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CalendarRule {
    DaysOfWeek { days: Vec<Weekday> },
    /// Months numbered 1–12.
    Months { months: Vec<u32> },
    /// Hours `start..end` in UTC. Wraps past midnight when `start > end`.
    HourWindow { start: u32, end: u32 },
    /// The last `days_before` and first `days_after` calendar days of a month.
    TurnOfMonth { days_before: u32, days_after: u32 },
    /// Within `days_before` days ahead of or `days_after` days after a listed date.
    NearHoliday {
        dates: Vec<NaiveDate>,
        days_before: i64,
        days_after: i64,
    },
}

impl CalendarRule {
    pub fn matches(&self, ctx: &RuleContext<'_>) -> bool {
        let time = ctx.candle.open_time;
        let date = time.date_naive();
        match self {
            CalendarRule::DaysOfWeek { days } => days.contains(&date.weekday()),
            CalendarRule::Months { months } => months.contains(&date.month()),
            CalendarRule::HourWindow { start, end } => {
                let hour = time.hour();
                if start <= end {
                    hour >= *start && hour < *end
                } else {
                    hour >= *start || hour < *end
                }
            }
            CalendarRule::TurnOfMonth {
                days_before,
                days_after,
            } => {
                let day = date.day();
                let remaining = days_in_month(date).saturating_sub(day);
                day <= *days_after || remaining < *days_before
            }
            CalendarRule::NearHoliday {
                dates,
                days_before,
                days_after,
            } => dates.iter().any(|h| {
                date >= *h - Duration::days(*days_before) && date <= *h + Duration::days(*days_after)
            }),
        }
    }
}

fn days_in_month(date: NaiveDate) -> u32 {
    let (y, m) = (date.year(), date.month());
    let next = if m == 12 {
        NaiveDate::from_ymd_opt(y + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(y, m + 1, 1)
    };
    next.and_then(|d| d.pred_opt()).map_or(31, |d| d.day())
}

/// Gate entries to candles inside (or, inverted, outside) a calendar window.
#[derive(Debug, Clone)]
pub struct SeasonalFilter {
    rule: CalendarRule,
    inverted: bool,
}

impl SeasonalFilter {
    pub fn new(rule: CalendarRule) -> Self {
        Self { rule, inverted: false }
    }

    /// Allow entries only outside the window.
    pub fn outside(mut self) -> Self {
        self.inverted = true;
        self
    }
}

impl Gate for SeasonalFilter {
    fn allows(&self, ctx: &RuleContext<'_>, _direction: Direction) -> bool {
        self.rule.matches(ctx) != self.inverted
    }
}

/// Hold a position in `direction` while inside the window, flat outside it.
#[derive(Debug, Clone)]
pub struct SeasonalSignal {
    rule: CalendarRule,
    direction: Direction,
}

impl SeasonalSignal {
    pub fn new(rule: CalendarRule, direction: Direction) -> Self {
        Self { rule, direction }
    }
}

impl Rule for SeasonalSignal {
    fn evaluate(&self, ctx: &RuleContext<'_>) -> Signal {
        let inside = self.rule.matches(ctx);
        match (inside, ctx.direction()) {
            (true, Some(d)) if d == self.direction => Signal::Hold,
            (true, _) => Signal::enter(self.direction),
            (false, Some(d)) => Signal::exit(d),
            (false, None) => Signal::Hold,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicator_set::IndicatorValues;
    use crate::rules::testing::{at_day, close, flat, long};
    use chrono::{TimeZone, Utc};
    use common::{Candle, Position};

    fn ctx_matches(rule: &CalendarRule, candle: &Candle) -> bool {
        let values = IndicatorValues::default();
        let pos = flat();
        rule.matches(&RuleContext {
            candle,
            prev_candle: None,
            values: &values,
            prev_values: None,
            position: &pos,
            bar_index: 0,
        })
    }

    fn on(y: i32, m: u32, d: u32, h: u32) -> Candle {
        let mut c = close(100.0);
        c.open_time = Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap();
        c
    }

    #[test]
    fn day_of_week_and_month() {
        // 2024-01-02 is a Tuesday
        let tue = close(100.0);
        let rule = CalendarRule::DaysOfWeek { days: vec![Weekday::Tue, Weekday::Wed] };
        assert!(ctx_matches(&rule, &tue));
        assert!(!ctx_matches(&rule, &at_day(tue.clone(), 3)));

        let rule = CalendarRule::Months { months: vec![11, 12, 1] };
        assert!(ctx_matches(&rule, &tue));
        assert!(!ctx_matches(&rule, &on(2024, 6, 3, 0)));
    }

    #[test]
    fn hour_window_wraps() {
        let rule = CalendarRule::HourWindow { start: 22, end: 2 };
        assert!(ctx_matches(&rule, &on(2024, 1, 2, 23)));
        assert!(ctx_matches(&rule, &on(2024, 1, 2, 1)));
        assert!(!ctx_matches(&rule, &on(2024, 1, 2, 2)));
        let rule = CalendarRule::HourWindow { start: 9, end: 17 };
        assert!(ctx_matches(&rule, &on(2024, 1, 2, 9)));
        assert!(!ctx_matches(&rule, &on(2024, 1, 2, 17)));
    }

    #[test]
    fn turn_of_month() {
        let rule = CalendarRule::TurnOfMonth { days_before: 2, days_after: 3 };
        // February 2024 has 29 days
        assert!(ctx_matches(&rule, &on(2024, 2, 28, 0)));
        assert!(ctx_matches(&rule, &on(2024, 2, 29, 0)));
        assert!(!ctx_matches(&rule, &on(2024, 2, 27, 0)));
        assert!(ctx_matches(&rule, &on(2024, 3, 3, 0)));
        assert!(!ctx_matches(&rule, &on(2024, 3, 4, 0)));
        assert!(ctx_matches(&rule, &on(2024, 12, 31, 0)));
    }

    #[test]
    fn near_holiday() {
        let xmas = NaiveDate::from_ymd_opt(2024, 12, 25).unwrap();
        let rule = CalendarRule::NearHoliday { dates: vec![xmas], days_before: 2, days_after: 1 };
        assert!(ctx_matches(&rule, &on(2024, 12, 23, 0)));
        assert!(ctx_matches(&rule, &on(2024, 12, 26, 0)));
        assert!(!ctx_matches(&rule, &on(2024, 12, 22, 0)));
        assert!(!ctx_matches(&rule, &on(2024, 12, 27, 0)));
    }

    fn eval(rule: &dyn Rule, candle: &Candle, pos: &Position) -> Signal {
        let values = IndicatorValues::default();
        rule.evaluate(&RuleContext {
            candle,
            prev_candle: None,
            values: &values,
            prev_values: None,
            position: pos,
            bar_index: 0,
        })
    }

    #[test]
    fn seasonal_signal_holds_inside_window() {
        let rule = SeasonalSignal::new(
            CalendarRule::DaysOfWeek { days: vec![Weekday::Tue] },
            Direction::Long,
        );
        let tue = close(100.0);
        let wed = at_day(tue.clone(), 1);
        assert_eq!(eval(&rule, &tue, &flat()), Signal::EnterLong);
        assert_eq!(eval(&rule, &tue, &long(1)), Signal::Hold);
        assert_eq!(eval(&rule, &wed, &long(1)), Signal::ExitLong);
        assert_eq!(eval(&rule, &wed, &flat()), Signal::Hold);
    }

    #[test]
    fn filter_inversion() {
        let values = IndicatorValues::default();
        let pos = flat();
        let tue = close(100.0);
        let ctx = RuleContext {
            candle: &tue,
            prev_candle: None,
            values: &values,
            prev_values: None,
            position: &pos,
            bar_index: 0,
        };
        let rule = CalendarRule::DaysOfWeek { days: vec![Weekday::Tue] };
        assert!(SeasonalFilter::new(rule.clone()).allows(&ctx, Direction::Long));
        assert!(!SeasonalFilter::new(rule).outside().allows(&ctx, Direction::Long));
    }
}

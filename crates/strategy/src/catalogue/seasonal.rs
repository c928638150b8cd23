//! Calendar-effect bundles.

use chrono::{NaiveDate, Weekday};
use common::{Direction, Error, Result};

use super::{crossover, length, long_only, BundleDef};
use crate::indicators::Ema;
use crate::params::{Parameter, ParameterSet};
use crate::rules::{CalendarRule, Gated, Operand, Rule, SeasonalFilter, SeasonalSignal};

pub(super) const BUNDLES: &[BundleDef] = &[
    BundleDef {
        kind: "day_of_week",
        description: "Hold a position on chosen weekdays",
        params: || {
            ParameterSet::new()
                .add(text("days", "mon", "Weekdays", "Comma-separated weekdays to hold"))
                .add(direction_param())
        },
        build: |p, _| {
            let days = weekdays(&p.get::<String>("days")?)?;
            signal(p, CalendarRule::DaysOfWeek { days })
        },
    },
    BundleDef {
        kind: "month_of_year",
        description: "Hold a position in chosen months",
        params: || {
            ParameterSet::new()
                .add(text("months", "1", "Months", "Comma-separated month numbers to hold"))
                .add(direction_param())
        },
        build: |p, _| {
            let months = months(&p.get::<String>("months")?)?;
            signal(p, CalendarRule::Months { months })
        },
    },
    BundleDef {
        kind: "halloween",
        description: "Long from November through April, flat in summer",
        params: ParameterSet::new,
        build: |_, _| {
            Ok(Box::new(SeasonalSignal::new(
                CalendarRule::Months { months: vec![11, 12, 1, 2, 3, 4] },
                Direction::Long,
            )))
        },
    },
    BundleDef {
        kind: "turn_of_month",
        description: "Long over the last and first days of each month",
        params: || {
            ParameterSet::new()
                .add(days("days_before", 1, "Days before month end"))
                .add(days("days_after", 3, "Days after month start"))
                .add(direction_param())
        },
        build: |p, _| {
            signal(
                p,
                CalendarRule::TurnOfMonth {
                    days_before: p.get("days_before")?,
                    days_after: p.get("days_after")?,
                },
            )
        },
    },
    BundleDef {
        kind: "holiday_effect",
        description: "Hold a position around listed holidays",
        params: || {
            ParameterSet::new()
                .add(text(
                    "dates",
                    "2024-12-25,2025-01-01,2025-12-25,2026-01-01",
                    "Holidays",
                    "Comma-separated YYYY-MM-DD dates",
                ))
                .add(days("days_before", 2, "Days before"))
                .add(days("days_after", 1, "Days after"))
                .add(direction_param())
        },
        build: |p, _| {
            let dates = dates(&p.get::<String>("dates")?)?;
            let before: u32 = p.get("days_before")?;
            let after: u32 = p.get("days_after")?;
            signal(
                p,
                CalendarRule::NearHoliday {
                    dates,
                    days_before: i64::from(before),
                    days_after: i64::from(after),
                },
            )
        },
    },
    BundleDef {
        kind: "intraday_window",
        description: "Hold a position during a UTC hour window",
        params: || {
            ParameterSet::new()
                .add(hour("start_hour", 13, "Start hour"))
                .add(hour("end_hour", 20, "End hour"))
                .add(direction_param())
        },
        build: |p, _| {
            signal(
                p,
                CalendarRule::HourWindow {
                    start: p.get("start_hour")?,
                    end: p.get("end_hour")?,
                },
            )
        },
    },
    BundleDef {
        kind: "ema_cross_seasonal",
        description: "EMA cross with entries only in chosen months",
        params: || {
            ParameterSet::new()
                .add(length("fast", 10, "Fast length"))
                .add(length("slow", 30, "Slow length"))
                .add(text("months", "11,12,1,2,3,4", "Months", "Months in which entries are allowed"))
                .add(long_only(true))
        },
        build: |p, s| {
            let fast = s.attach(Ema::new(p.get("fast")?))?;
            let slow = s.attach(Ema::new(p.get("slow")?))?;
            let cross = crossover(Operand::series(fast), Operand::series(slow), p.get("long_only")?);
            let months = months(&p.get::<String>("months")?)?;
            Ok(Box::new(Gated::new(cross, SeasonalFilter::new(CalendarRule::Months { months }))))
        },
    },
];

fn text(name: &str, value: &str, display: &str, description: &str) -> Parameter<String> {
    Parameter::new(name, value.to_string()).display(display, description, "Calendar")
}

fn days(name: &str, value: u32, display: &str) -> Parameter<u32> {
    Parameter::new(name, value)
        .display(display, display, "Calendar")
        .range(0.0, 15.0)
}

fn hour(name: &str, value: u32, display: &str) -> Parameter<u32> {
    Parameter::new(name, value)
        .display(display, "Hour of day, UTC", "Calendar")
        .range(0.0, 24.0)
}

fn direction_param() -> Parameter<String> {
    Parameter::new("direction", "long".to_string()).display(
        "Direction",
        "Side held inside the window: long or short",
        "Trading",
    )
}

fn signal(p: &ParameterSet, rule: CalendarRule) -> Result<Box<dyn Rule>> {
    let direction = match p.get::<String>("direction")?.trim().to_ascii_lowercase().as_str() {
        "long" => Direction::Long,
        "short" => Direction::Short,
        other => {
            return Err(Error::invalid_config(format!(
                "direction must be 'long' or 'short', got '{other}'"
            )))
        }
    };
    Ok(Box::new(SeasonalSignal::new(rule, direction)))
}

fn list(raw: &str) -> impl Iterator<Item = &str> {
    raw.split(',').map(str::trim).filter(|s| !s.is_empty())
}

fn weekdays(raw: &str) -> Result<Vec<Weekday>> {
    list(raw)
        .map(|d| {
            d.parse::<Weekday>()
                .map_err(|_| Error::invalid_config(format!("bad weekday '{d}'")))
        })
        .collect()
}

fn months(raw: &str) -> Result<Vec<u32>> {
    list(raw)
        .map(|m| match m.parse::<u32>() {
            Ok(n @ 1..=12) => Ok(n),
            _ => Err(Error::invalid_config(format!("bad month '{m}'"))),
        })
        .collect()
}

fn dates(raw: &str) -> Result<Vec<NaiveDate>> {
    list(raw)
        .map(|d| {
            NaiveDate::parse_from_str(d, "%Y-%m-%d")
                .map_err(|e| Error::invalid_config(format!("bad date '{d}': {e}")))
        })
        .collect()
}

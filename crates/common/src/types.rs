use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

// ─── Candles ──────────────────────────────────────────────────────────────────

/// Lifecycle flag of a candle event. A candle is reported zero or more times as
/// `Active` while it builds and exactly once as `Finished`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CandleState {
    Active,
    #[default]
    Finished,
}

/// OHLCV aggregate for one timeframe bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub security: String,
    pub open_time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    #[serde(default)]
    pub state: CandleState,
}

impl Candle {
    pub fn is_finished(&self) -> bool {
        self.state == CandleState::Finished
    }

    /// Reject data no indicator can consume. The check is shared by every
    /// indicator set so each calculator can assume finite, ordered prices.
    pub fn validate(&self) -> Result<()> {
        let prices = [
            ("open", self.open),
            ("high", self.high),
            ("low", self.low),
            ("close", self.close),
        ];
        for (field, value) in prices {
            if !value.is_finite() {
                return Err(Error::invalid_input(
                    &self.security,
                    format!("{field} price is not finite ({value})"),
                ));
            }
        }
        if !self.volume.is_finite() || self.volume < 0.0 {
            return Err(Error::invalid_input(
                &self.security,
                format!("volume must be finite and non-negative, got {}", self.volume),
            ));
        }
        if self.high < self.low {
            return Err(Error::invalid_input(
                &self.security,
                format!("high {} is below low {}", self.high, self.low),
            ));
        }
        Ok(())
    }

    pub fn is_bullish(&self) -> bool {
        self.close > self.open
    }

    pub fn is_bearish(&self) -> bool {
        self.close < self.open
    }

    pub fn body(&self) -> f64 {
        (self.close - self.open).abs()
    }

    pub fn range(&self) -> f64 {
        self.high - self.low
    }

    pub fn body_top(&self) -> f64 {
        self.open.max(self.close)
    }

    pub fn body_bottom(&self) -> f64 {
        self.open.min(self.close)
    }

    pub fn upper_shadow(&self) -> f64 {
        self.high - self.body_top()
    }

    pub fn lower_shadow(&self) -> f64 {
        self.body_bottom() - self.low
    }

    pub fn typical_price(&self) -> f64 {
        (self.high + self.low + self.close) / 3.0
    }

    pub fn median_price(&self) -> f64 {
        (self.high + self.low) / 2.0
    }
}

/// Candle bucket length. Parsed from strings such as `"30s"`, `"5m"`, `"4h"`, `"1d"`, `"1w"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Timeframe {
    seconds: u64,
}

impl Timeframe {
    pub const fn from_seconds(seconds: u64) -> Self {
        Self { seconds }
    }

    pub const fn minutes(n: u64) -> Self {
        Self { seconds: n * 60 }
    }

    pub const fn hours(n: u64) -> Self {
        Self { seconds: n * 3_600 }
    }

    pub const fn days(n: u64) -> Self {
        Self { seconds: n * 86_400 }
    }

    pub fn seconds(&self) -> u64 {
        self.seconds
    }
}

impl Default for Timeframe {
    fn default() -> Self {
        Timeframe::minutes(5)
    }
}

impl FromStr for Timeframe {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.len() < 2 {
            return Err(Error::invalid_config(format!("bad timeframe '{s}'")));
        }
        let (digits, unit) = s.split_at(s.len() - 1);
        let n: u64 = digits
            .parse()
            .map_err(|_| Error::invalid_config(format!("bad timeframe '{s}'")))?;
        if n == 0 {
            return Err(Error::invalid_config("timeframe must be positive"));
        }
        let mult = match unit {
            "s" => 1,
            "m" => 60,
            "h" => 3_600,
            "d" => 86_400,
            "w" => 604_800,
            other => {
                return Err(Error::invalid_config(format!(
                    "unknown timeframe unit '{other}' in '{s}'"
                )))
            }
        };
        Ok(Timeframe::from_seconds(n * mult))
    }
}

impl TryFrom<String> for Timeframe {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Timeframe> for String {
    fn from(tf: Timeframe) -> Self {
        tf.to_string()
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = self.seconds;
        if s % 604_800 == 0 {
            write!(f, "{}w", s / 604_800)
        } else if s % 86_400 == 0 {
            write!(f, "{}d", s / 86_400)
        } else if s % 3_600 == 0 {
            write!(f, "{}h", s / 3_600)
        } else if s % 60 == 0 {
            write!(f, "{}m", s / 60)
        } else {
            write!(f, "{s}s")
        }
    }
}

// ─── Signals ──────────────────────────────────────────────────────────────────

/// Position direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    pub fn opposite(self) -> Self {
        match self {
            Direction::Long => Direction::Short,
            Direction::Short => Direction::Long,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Long => write!(f, "long"),
            Direction::Short => write!(f, "short"),
        }
    }
}

/// Directive produced by a rule bundle (or the protection policy) for one candle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Signal {
    EnterLong,
    EnterShort,
    ExitLong,
    ExitShort,
    Reverse,
    ClosePosition,
    #[default]
    Hold,
}

impl Signal {
    pub fn is_hold(&self) -> bool {
        *self == Signal::Hold
    }

    pub fn is_entry(&self) -> bool {
        matches!(self, Signal::EnterLong | Signal::EnterShort | Signal::Reverse)
    }

    pub fn enter(direction: Direction) -> Self {
        match direction {
            Direction::Long => Signal::EnterLong,
            Direction::Short => Signal::EnterShort,
        }
    }

    pub fn exit(direction: Direction) -> Self {
        match direction {
            Direction::Long => Signal::ExitLong,
            Direction::Short => Signal::ExitShort,
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Signal::EnterLong => "enter-long",
            Signal::EnterShort => "enter-short",
            Signal::ExitLong => "exit-long",
            Signal::ExitShort => "exit-short",
            Signal::Reverse => "reverse",
            Signal::ClosePosition => "close-position",
            Signal::Hold => "hold",
        };
        f.write_str(s)
    }
}

// ─── Orders & fills ───────────────────────────────────────────────────────────

/// Side of a trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn opposite(self) -> Self {
        match self {
            OrderSide::Buy => OrderSide::Sell,
            OrderSide::Sell => OrderSide::Buy,
        }
    }

    /// Side that moves a position by `delta` (positive = buy).
    pub fn for_delta(delta: Decimal) -> Self {
        if delta.is_sign_negative() {
            OrderSide::Sell
        } else {
            OrderSide::Buy
        }
    }

    pub fn sign(self) -> Decimal {
        match self {
            OrderSide::Buy => Decimal::ONE,
            OrderSide::Sell => Decimal::NEGATIVE_ONE,
        }
    }
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "BUY"),
            OrderSide::Sell => write!(f, "SELL"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum OrderType {
    Market,
    Limit { price: f64 },
}

/// An order to be submitted through the host's broker adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub security: String,
    pub side: OrderSide,
    pub volume: Decimal,
    pub order_type: OrderType,
    pub comment: Option<String>,
}

impl Order {
    pub fn market(security: impl Into<String>, side: OrderSide, volume: Decimal) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            security: security.into(),
            side,
            volume,
            order_type: OrderType::Market,
            comment: None,
        }
    }

    pub fn limit(
        security: impl Into<String>,
        side: OrderSide,
        volume: Decimal,
        price: f64,
    ) -> Self {
        Self {
            order_type: OrderType::Limit { price },
            ..Self::market(security, side, volume)
        }
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    /// Volume with the sign of its effect on the position.
    pub fn signed_volume(&self) -> Decimal {
        self.volume * self.side.sign()
    }
}

/// Execution report delivered by the host. May be partial.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fill {
    pub order_id: String,
    pub security: String,
    pub side: OrderSide,
    pub volume: Decimal,
    pub price: f64,
    pub time: DateTime<Utc>,
}

impl Fill {
    pub fn signed_volume(&self) -> Decimal {
        self.volume * self.side.sign()
    }
}

/// Host notification that an order was refused by the broker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRejection {
    pub order_id: String,
    pub security: String,
    pub reason: String,
}

/// Everything the host pushes into a session. Candles and fills share one queue,
/// which serialises them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum HostEvent {
    Candle(Candle),
    Fill(Fill),
    OrderRejected(OrderRejection),
    Stop,
}

// ─── Positions ────────────────────────────────────────────────────────────────

/// Net position in one security, advanced only by fills.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub security: String,
    /// Signed net quantity (positive = long).
    pub net: Decimal,
    pub avg_entry_price: f64,
    /// Bar index at which the current position was opened.
    pub entry_bar: Option<u64>,
    /// Most favourable price seen since entry (high for longs, low for shorts).
    pub peak_price: Option<f64>,
}

/// What a fill did to the position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PositionChange {
    Opened { direction: Direction, price: f64 },
    Increased,
    Reduced,
    Closed,
    Flipped { direction: Direction, price: f64 },
}

impl Position {
    pub fn flat(security: impl Into<String>) -> Self {
        Self {
            security: security.into(),
            net: Decimal::ZERO,
            avg_entry_price: 0.0,
            entry_bar: None,
            peak_price: None,
        }
    }

    pub fn is_flat(&self) -> bool {
        self.net.is_zero()
    }

    pub fn direction(&self) -> Option<Direction> {
        if self.net > Decimal::ZERO {
            Some(Direction::Long)
        } else if self.net < Decimal::ZERO {
            Some(Direction::Short)
        } else {
            None
        }
    }

    /// Apply a signed fill quantity at `price`, observed on bar `bar`.
    pub fn apply_fill(&mut self, signed_volume: Decimal, price: f64, bar: u64) -> PositionChange {
        let old = self.net;
        let new = old + signed_volume;
        self.net = new;

        if new.is_zero() {
            self.avg_entry_price = 0.0;
            self.entry_bar = None;
            self.peak_price = None;
            return PositionChange::Closed;
        }

        let direction = if new > Decimal::ZERO {
            Direction::Long
        } else {
            Direction::Short
        };

        if old.is_zero() || old.is_sign_negative() != new.is_sign_negative() {
            self.avg_entry_price = price;
            self.entry_bar = Some(bar);
            self.peak_price = Some(price);
            return if old.is_zero() {
                PositionChange::Opened { direction, price }
            } else {
                PositionChange::Flipped { direction, price }
            };
        }

        if new.abs() > old.abs() {
            let old_qty = decimal_to_f64(old.abs());
            let add_qty = decimal_to_f64(signed_volume.abs());
            let total = old_qty + add_qty;
            if total > 0.0 {
                self.avg_entry_price = (self.avg_entry_price * old_qty + price * add_qty) / total;
            }
            PositionChange::Increased
        } else {
            PositionChange::Reduced
        }
    }

    /// Track the most favourable excursion using a finished candle.
    pub fn update_peak(&mut self, candle: &Candle) {
        match self.direction() {
            Some(Direction::Long) => {
                let peak = self.peak_price.unwrap_or(candle.high).max(candle.high);
                self.peak_price = Some(peak);
            }
            Some(Direction::Short) => {
                let peak = self.peak_price.unwrap_or(candle.low).min(candle.low);
                self.peak_price = Some(peak);
            }
            None => self.peak_price = None,
        }
    }
}

/// Lossy conversion used where quantities meet price arithmetic.
pub fn decimal_to_f64(d: Decimal) -> f64 {
    d.to_f64().unwrap_or(0.0)
}

/// Lifecycle state of a strategy runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StrategyState {
    #[default]
    Stopped,
    Running,
    /// Stopped by a fatal error; requires `reset` before it can start again.
    Halted,
}

impl fmt::Display for StrategyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StrategyState::Stopped => write!(f, "stopped"),
            StrategyState::Running => write!(f, "running"),
            StrategyState::Halted => write!(f, "halted"),
        }
    }
}

//! Trend composites: ADX/DMI, SuperTrend and Parabolic SAR.
//!
//! All three are inherently sequential; each keeps the previous candle's
//! extremes and its own direction state.

use common::{Candle, Result};

use super::ma::Ema;
use super::volatility::{true_range, Atr};
use super::{Indicator, IndicatorValue};

// ─── ADX ──────────────────────────────────────────────────────────────────────

/// Average Directional Index (Wilder) with +DI / −DI.
///
/// 1. +DM / −DM from consecutive highs and lows
/// 2. Wilder-smooth +DM, −DM and TR
/// 3. DI = 100 · smoothed DM / smoothed TR
/// 4. DX = 100 · |+DI − −DI| / (+DI + −DI), ADX = Wilder-smoothed DX
///
/// Formed after `2 · period` candles.
#[derive(Debug, Clone)]
pub struct Adx {
    prev: Option<(f64, f64, f64)>,
    tr: Ema,
    plus_dm: Ema,
    minus_dm: Ema,
    adx: Ema,
    plus_di: f64,
    minus_di: f64,
    name: String,
}

impl Adx {
    pub fn new(period: usize) -> Self {
        Self {
            prev: None,
            tr: Ema::wilder(period),
            plus_dm: Ema::wilder(period),
            minus_dm: Ema::wilder(period),
            adx: Ema::wilder(period),
            plus_di: 0.0,
            minus_di: 0.0,
            name: format!("adx_{period}"),
        }
    }

    fn value(&self) -> IndicatorValue {
        IndicatorValue::Adx {
            ma: self.adx.value(),
            plus_di: self.plus_di,
            minus_di: self.minus_di,
        }
    }
}

impl Indicator for Adx {
    fn name(&self) -> &str {
        &self.name
    }

    fn update(&mut self, candle: &Candle) -> Result<IndicatorValue> {
        let Some((prev_high, prev_low, prev_close)) =
            self.prev.replace((candle.high, candle.low, candle.close))
        else {
            return Ok(self.value());
        };

        let up = candle.high - prev_high;
        let down = prev_low - candle.low;
        let pdm = if up > down && up > 0.0 { up } else { 0.0 };
        let mdm = if down > up && down > 0.0 { down } else { 0.0 };

        let tr = self.tr.next(true_range(candle, Some(prev_close)));
        let pdm = self.plus_dm.next(pdm);
        let mdm = self.minus_dm.next(mdm);

        if self.tr.is_warm() {
            if tr > 0.0 {
                self.plus_di = 100.0 * pdm / tr;
                self.minus_di = 100.0 * mdm / tr;
            } else {
                self.plus_di = 0.0;
                self.minus_di = 0.0;
            }
            let di_sum = self.plus_di + self.minus_di;
            let dx = if di_sum == 0.0 {
                0.0
            } else {
                100.0 * (self.plus_di - self.minus_di).abs() / di_sum
            };
            self.adx.next(dx);
        }
        Ok(self.value())
    }

    fn is_formed(&self) -> bool {
        self.adx.is_warm()
    }

    fn reset(&mut self) {
        self.prev = None;
        self.tr.clear();
        self.plus_dm.clear();
        self.minus_dm.clear();
        self.adx.clear();
        self.plus_di = 0.0;
        self.minus_di = 0.0;
    }
}

// ─── SuperTrend ───────────────────────────────────────────────────────────────

/// SuperTrend: ATR bands around the median price that only tighten, flipping
/// between support (up-trend, lower band) and resistance (down-trend, upper
/// band) when the close crosses the active band.
#[derive(Debug, Clone)]
pub struct SuperTrend {
    atr: Atr,
    multiplier: f64,
    bands: Option<(f64, f64)>,
    is_up_trend: bool,
    prev_close: Option<f64>,
    name: String,
}

impl SuperTrend {
    pub fn new(period: usize, multiplier: f64) -> Self {
        Self {
            atr: Atr::new(period),
            multiplier,
            bands: None,
            is_up_trend: true,
            prev_close: None,
            name: format!("supertrend_{period}_{multiplier}"),
        }
    }
}

impl Indicator for SuperTrend {
    fn name(&self) -> &str {
        &self.name
    }

    fn update(&mut self, candle: &Candle) -> Result<IndicatorValue> {
        let atr = self.atr.next(candle);
        let prev_close = self.prev_close.replace(candle.close);
        if !self.atr.is_warm() {
            return Ok(IndicatorValue::SuperTrend {
                value: candle.median_price(),
                is_up_trend: true,
            });
        }

        let hl2 = candle.median_price();
        let basic_upper = hl2 + self.multiplier * atr;
        let basic_lower = hl2 - self.multiplier * atr;

        let (upper, lower) = match (self.bands, prev_close) {
            (Some((upper, lower)), Some(pc)) => {
                let upper = if pc <= upper { basic_upper.min(upper) } else { basic_upper };
                let lower = if pc >= lower { basic_lower.max(lower) } else { basic_lower };
                (upper, lower)
            }
            _ => (basic_upper, basic_lower),
        };
        let first = self.bands.is_none();
        self.bands = Some((upper, lower));

        if !first {
            if self.is_up_trend && candle.close < lower {
                self.is_up_trend = false;
            } else if !self.is_up_trend && candle.close > upper {
                self.is_up_trend = true;
            }
        }

        Ok(IndicatorValue::SuperTrend {
            value: if self.is_up_trend { lower } else { upper },
            is_up_trend: self.is_up_trend,
        })
    }

    fn is_formed(&self) -> bool {
        self.bands.is_some()
    }

    fn reset(&mut self) {
        self.atr.clear();
        self.bands = None;
        self.is_up_trend = true;
        self.prev_close = None;
    }
}

// ─── Parabolic SAR ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
struct SarState {
    sar: f64,
    ep: f64,
    af: f64,
    is_long: bool,
}

/// Wilder's Parabolic SAR. Direction is seeded from the first two closes;
/// formed from the second candle on.
#[derive(Debug, Clone)]
pub struct ParabolicSar {
    af_start: f64,
    af_step: f64,
    af_max: f64,
    state: Option<SarState>,
    // (high, low, close) of the last two candles, newest first
    prev: [Option<(f64, f64, f64)>; 2],
    name: String,
}

impl ParabolicSar {
    pub fn new(af_start: f64, af_step: f64, af_max: f64) -> Self {
        Self {
            af_start,
            af_step,
            af_max,
            state: None,
            prev: [None, None],
            name: format!("psar_{af_start}_{af_step}_{af_max}"),
        }
    }

    /// 0.02 / 0.02 / 0.20.
    pub fn standard() -> Self {
        Self::new(0.02, 0.02, 0.20)
    }

    fn step(&self, st: SarState, candle: &Candle) -> SarState {
        let SarState { sar, mut ep, mut af, mut is_long } = st;
        let mut new_sar = sar + af * (ep - sar);
        let extremes = self.prev.iter().flatten();

        if is_long {
            for &(_, low, _) in extremes {
                new_sar = new_sar.min(low);
            }
            if candle.low < new_sar {
                is_long = false;
                new_sar = ep;
                ep = candle.low;
                af = self.af_start;
            } else if candle.high > ep {
                ep = candle.high;
                af = (af + self.af_step).min(self.af_max);
            }
        } else {
            for &(high, _, _) in extremes {
                new_sar = new_sar.max(high);
            }
            if candle.high > new_sar {
                is_long = true;
                new_sar = ep;
                ep = candle.high;
                af = self.af_start;
            } else if candle.low < ep {
                ep = candle.low;
                af = (af + self.af_step).min(self.af_max);
            }
        }

        SarState { sar: new_sar, ep, af, is_long }
    }
}

impl Indicator for ParabolicSar {
    fn name(&self) -> &str {
        &self.name
    }

    fn update(&mut self, candle: &Candle) -> Result<IndicatorValue> {
        let next = match (self.state, self.prev[0]) {
            (Some(st), _) => Some(self.step(st, candle)),
            (None, Some((high, low, close))) => {
                let is_long = candle.close >= close;
                Some(if is_long {
                    SarState { sar: low, ep: candle.high, af: self.af_start, is_long }
                } else {
                    SarState { sar: high, ep: candle.low, af: self.af_start, is_long }
                })
            }
            (None, None) => None,
        };
        self.state = next;
        self.prev = [Some((candle.high, candle.low, candle.close)), self.prev[0]];

        let value = self.state.map(|s| s.sar).unwrap_or(candle.low);
        Ok(IndicatorValue::Scalar(value))
    }

    fn is_formed(&self) -> bool {
        self.state.is_some()
    }

    fn reset(&mut self) {
        self.state = None;
        self.prev = [None, None];
    }
}

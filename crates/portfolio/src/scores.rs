use std::collections::{HashMap, VecDeque};
use std::fmt;

use common::Candle;
use strategy::FactorConfig;

/// Cross-sectional score per security. Higher ranks first.
pub trait ScoreProvider: Send + fmt::Debug {
    fn name(&self) -> &str;

    /// Record a finished candle of a universe security.
    fn observe(&mut self, _candle: &Candle) {}

    /// Current score, `None` while there is not enough history.
    fn score(&self, security: &str) -> Option<f64>;

    fn reset(&mut self) {}
}

/// Bounded close history per security.
#[derive(Debug, Clone)]
struct CloseHistory {
    capacity: usize,
    closes: HashMap<String, VecDeque<f64>>,
}

impl CloseHistory {
    fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            closes: HashMap::new(),
        }
    }

    fn push(&mut self, candle: &Candle) {
        let buf = self
            .closes
            .entry(candle.security.clone())
            .or_insert_with(|| VecDeque::with_capacity(self.capacity));
        if buf.len() == self.capacity {
            buf.pop_front();
        }
        buf.push_back(candle.close);
    }

    /// Full window for `security`, oldest first.
    fn full(&self, security: &str) -> Option<&VecDeque<f64>> {
        self.closes.get(security).filter(|b| b.len() == self.capacity)
    }

    fn clear(&mut self) {
        self.closes.clear();
    }
}

fn simple_return(from: f64, to: f64) -> Option<f64> {
    (from > 0.0).then(|| to / from - 1.0)
}

/// Return over `lookback` candles, skipping the most recent `skip`.
#[derive(Debug, Clone)]
pub struct MomentumScore {
    lookback: usize,
    skip: usize,
    history: CloseHistory,
}

impl MomentumScore {
    pub fn new(lookback: usize, skip: usize) -> Self {
        Self {
            lookback,
            skip,
            history: CloseHistory::new(lookback + skip + 1),
        }
    }
}

impl ScoreProvider for MomentumScore {
    fn name(&self) -> &str {
        "momentum"
    }

    fn observe(&mut self, candle: &Candle) {
        self.history.push(candle);
    }

    fn score(&self, security: &str) -> Option<f64> {
        let buf = self.history.full(security)?;
        let end = buf.len() - 1 - self.skip;
        simple_return(buf[end - self.lookback], buf[end])
    }

    fn reset(&mut self) {
        self.history.clear();
    }
}

/// Short-term reversal: the negated return over `lookback` candles.
#[derive(Debug, Clone)]
pub struct ReversalScore {
    history: CloseHistory,
}

impl ReversalScore {
    pub fn new(lookback: usize) -> Self {
        Self {
            history: CloseHistory::new(lookback + 1),
        }
    }
}

impl ScoreProvider for ReversalScore {
    fn name(&self) -> &str {
        "reversal"
    }

    fn observe(&mut self, candle: &Candle) {
        self.history.push(candle);
    }

    fn score(&self, security: &str) -> Option<f64> {
        let buf = self.history.full(security)?;
        simple_return(*buf.front()?, *buf.back()?).map(|r| -r)
    }

    fn reset(&mut self) {
        self.history.clear();
    }
}

/// Low volatility: the negated standard deviation of one-candle returns.
#[derive(Debug, Clone)]
pub struct LowVolatilityScore {
    history: CloseHistory,
}

impl LowVolatilityScore {
    pub fn new(lookback: usize) -> Self {
        Self {
            history: CloseHistory::new(lookback.max(2) + 1),
        }
    }
}

impl ScoreProvider for LowVolatilityScore {
    fn name(&self) -> &str {
        "low_volatility"
    }

    fn observe(&mut self, candle: &Candle) {
        self.history.push(candle);
    }

    fn score(&self, security: &str) -> Option<f64> {
        let buf = self.history.full(security)?;
        let returns: Vec<f64> = buf
            .iter()
            .zip(buf.iter().skip(1))
            .map(|(a, b)| simple_return(*a, *b))
            .collect::<Option<_>>()?;
        let n = returns.len() as f64;
        let mean = returns.iter().sum::<f64>() / n;
        let var = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n;
        Some(-var.sqrt())
    }

    fn reset(&mut self) {
        self.history.clear();
    }
}

/// Scores supplied from outside the price stream (accruals, asset growth, ...).
#[derive(Debug, Clone, Default)]
pub struct ExternalScores {
    scores: HashMap<String, f64>,
}

impl ExternalScores {
    pub fn new(scores: HashMap<String, f64>) -> Self {
        Self { scores }
    }

    pub fn set(&mut self, security: impl Into<String>, score: f64) {
        self.scores.insert(security.into(), score);
    }
}

impl ScoreProvider for ExternalScores {
    fn name(&self) -> &str {
        "external"
    }

    fn score(&self, security: &str) -> Option<f64> {
        self.scores.get(security).copied()
    }
}

pub fn provider_for(factor: &FactorConfig) -> Box<dyn ScoreProvider> {
    match factor {
        FactorConfig::Momentum { lookback, skip } => Box::new(MomentumScore::new(*lookback, *skip)),
        FactorConfig::Reversal { lookback } => Box::new(ReversalScore::new(*lookback)),
        FactorConfig::LowVolatility { lookback } => Box::new(LowVolatilityScore::new(*lookback)),
        FactorConfig::External { scores } => Box::new(ExternalScores::new(scores.clone())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use common::CandleState;

    fn feed(p: &mut dyn ScoreProvider, security: &str, closes: &[f64]) {
        let start = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        for (i, c) in closes.iter().enumerate() {
            p.observe(&Candle {
                security: security.into(),
                open_time: start + Duration::days(i as i64),
                open: *c,
                high: *c,
                low: *c,
                close: *c,
                volume: 1.0,
                state: CandleState::Finished,
            });
        }
    }

    #[test]
    fn momentum_skips_recent_candles() {
        let mut m = MomentumScore::new(2, 1);
        feed(&mut m, "A", &[100.0, 110.0]);
        assert_eq!(m.score("A"), None);
        feed(&mut m, "A", &[120.0, 50.0]);
        // window [100, 110, 120, 50]: return from 100 to 120
        assert!((m.score("A").unwrap() - 0.2).abs() < 1e-12);
        assert_eq!(m.score("B"), None);
    }

    #[test]
    fn reversal_negates_return() {
        let mut r = ReversalScore::new(1);
        feed(&mut r, "A", &[100.0, 90.0]);
        assert!((r.score("A").unwrap() - 0.1).abs() < 1e-12);
    }

    #[test]
    fn calmer_series_scores_higher() {
        let mut v = LowVolatilityScore::new(4);
        feed(&mut v, "CALM", &[100.0, 100.5, 100.0, 100.5, 100.0]);
        feed(&mut v, "WILD", &[100.0, 110.0, 95.0, 112.0, 90.0]);
        assert!(v.score("CALM").unwrap() > v.score("WILD").unwrap());
    }

    #[test]
    fn external_scores_from_config() {
        let cfg = FactorConfig::External {
            scores: HashMap::from([("A".to_string(), 3.0)]),
        };
        let p = provider_for(&cfg);
        assert_eq!(p.name(), "external");
        assert_eq!(p.score("A"), Some(3.0));
        assert_eq!(p.score("Z"), None);
    }
}

use std::collections::HashMap;

use chrono::{DateTime, Utc};

/// The rebalancer's universe and its current target weights.
#[derive(Debug, Clone, Default)]
pub struct UniverseBasket {
    pub securities: Vec<String>,
    /// Signed weight per selected security; unselected securities are absent.
    pub target_weights: HashMap<String, f64>,
    pub last_rebalance: Option<DateTime<Utc>>,
}

impl UniverseBasket {
    pub fn new(securities: Vec<String>) -> Self {
        Self {
            securities,
            ..Self::default()
        }
    }

    pub fn contains(&self, security: &str) -> bool {
        self.securities.iter().any(|s| s == security)
    }

    /// Target weight of `security`, zero when it is not selected.
    pub fn weight(&self, security: &str) -> f64 {
        self.target_weights.get(security).copied().unwrap_or(0.0)
    }
}

/// Decile long/short weights from cross-sectional scores.
///
/// Scores are ranked descending with ties broken by security id. With `n`
/// valid (finite) scores, `K = n / deciles` names go long at `+leverage / K`
/// from the top and, unless `long_only`, short at `-leverage / K` from the
/// bottom. Returns `None` when fewer than `2 * deciles` scores are valid or
/// `deciles < 2`, since a single group would be both long and short.
pub fn decile_weights(
    scores: &[(String, f64)],
    deciles: usize,
    leverage: f64,
    long_only: bool,
) -> Option<HashMap<String, f64>> {
    let mut valid: Vec<&(String, f64)> = scores.iter().filter(|(_, s)| s.is_finite()).collect();
    if deciles < 2 || valid.len() < 2 * deciles {
        return None;
    }
    valid.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

    let k = valid.len() / deciles;
    let weight = leverage / k as f64;
    let mut weights = HashMap::with_capacity(2 * k);
    for (security, _) in valid.iter().take(k) {
        weights.insert(security.clone(), weight);
    }
    if !long_only {
        for (security, _) in valid.iter().rev().take(k) {
            weights.insert(security.clone(), -weight);
        }
    }
    Some(weights)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lettered(values: &[f64]) -> Vec<(String, f64)> {
        values
            .iter()
            .enumerate()
            .map(|(i, v)| (((b'A' + i as u8) as char).to_string(), *v))
            .collect()
    }

    #[test]
    fn ten_names_five_deciles() {
        let scores = lettered(&[9.0, 8.0, 7.0, 6.0, 5.0, 4.0, 3.0, 2.0, 1.0, 0.0]);
        let w = decile_weights(&scores, 5, 1.0, false).unwrap();
        assert_eq!(w.len(), 4);
        assert_eq!(w["A"], 0.5);
        assert_eq!(w["B"], 0.5);
        assert_eq!(w["I"], -0.5);
        assert_eq!(w["J"], -0.5);
        assert!(!w.contains_key("C"));
    }

    #[test]
    fn too_few_valid_scores_aborts() {
        let scores = lettered(&[1.0, 2.0, 3.0, f64::NAN]);
        assert!(decile_weights(&scores, 2, 1.0, false).is_none());
        assert!(decile_weights(&lettered(&[1.0, 2.0, 3.0, 4.0]), 2, 1.0, false).is_some());
        assert!(decile_weights(&lettered(&[1.0, 2.0]), 0, 1.0, false).is_none());
    }

    #[test]
    fn ties_break_by_security_id() {
        let scores = vec![
            ("C".to_string(), 1.0),
            ("B".to_string(), 1.0),
            ("A".to_string(), 1.0),
            ("F".to_string(), 0.0),
            ("D".to_string(), 0.0),
            ("E".to_string(), 0.0),
        ];
        let w = decile_weights(&scores, 3, 2.0, false).unwrap();
        assert_eq!(w["A"], 1.0);
        assert_eq!(w["B"], 1.0);
        assert_eq!(w["E"], -1.0);
        assert_eq!(w["F"], -1.0);
        assert_eq!(w.len(), 4);
    }

    #[test]
    fn long_only_drops_shorts() {
        let scores = lettered(&[5.0, 4.0, 3.0, 2.0, 1.0, 0.0]);
        let w = decile_weights(&scores, 3, 1.0, true).unwrap();
        assert_eq!(w.len(), 2);
        assert!(w.values().all(|v| *v > 0.0));
    }

    #[test]
    fn weights_per_side_sum_to_leverage() {
        let scores = lettered(&[3.0, 1.0, 4.0, 1.5, 9.0, 2.6, 5.0, 3.5, 8.0, 7.0, 9.5]);
        let w = decile_weights(&scores, 3, 1.5, false).unwrap();
        let long: f64 = w.values().filter(|v| **v > 0.0).sum();
        let short: f64 = w.values().filter(|v| **v < 0.0).sum();
        assert!((long - 1.5).abs() < 1e-12);
        assert!((short + 1.5).abs() < 1e-12);
    }
}

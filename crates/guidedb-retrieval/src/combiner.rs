//! Linear fusion of title and content similarity.

use serde::Serialize;

use guidedb_core::{Error, Result};

const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

/// Title/content weights. Construction enforces `title + content == 1`
/// (within 1e-6) and both in `[0, 1]`, so `combine` never re-checks.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct WeightPair {
    title_weight: f64,
    content_weight: f64,
}

impl WeightPair {
    /// Stage 1 default: find the right heading.
    pub const TITLE_HEAVY: WeightPair = WeightPair { title_weight: 0.95, content_weight: 0.05 };
    /// Stage 2 default: match on body text.
    pub const CONTENT_HEAVY: WeightPair = WeightPair { title_weight: 0.3, content_weight: 0.7 };

    pub fn new(title_weight: f64, content_weight: f64) -> Result<Self> {
        for (name, w) in [("title", title_weight), ("content", content_weight)] {
            if !w.is_finite() || !(0.0..=1.0).contains(&w) {
                return Err(Error::InvalidWeightConfiguration(format!("{name} weight {w} is outside [0, 1]")));
            }
        }
        let sum = title_weight + content_weight;
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(Error::InvalidWeightConfiguration(format!(
                "weights must sum to 1.0, got {title_weight} + {content_weight} = {sum}"
            )));
        }
        Ok(Self { title_weight, content_weight })
    }

    pub fn title_weight(&self) -> f64 { self.title_weight }

    pub fn content_weight(&self) -> f64 { self.content_weight }

    pub fn is_title_heavy(&self) -> bool { self.title_weight > self.content_weight }

    pub fn is_content_heavy(&self) -> bool { self.content_weight > self.title_weight }
}

/// `w.title * title_score + w.content * content_score`, unclamped.
pub fn combine(title_score: f64, content_score: f64, weights: WeightPair) -> f64 {
    weights.title_weight * title_score + weights.content_weight * content_score
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid_pairs() {
        for w in [WeightPair::TITLE_HEAVY, WeightPair::CONTENT_HEAVY] {
            let rebuilt = WeightPair::new(w.title_weight(), w.content_weight()).unwrap();
            assert_eq!(rebuilt, w);
        }
        assert!(WeightPair::TITLE_HEAVY.is_title_heavy());
        assert!(WeightPair::CONTENT_HEAVY.is_content_heavy());
    }

    #[test]
    fn sum_tolerance_is_one_in_a_million() {
        assert!(WeightPair::new(0.5, 0.5 + 5e-7).is_ok());
        assert!(matches!(WeightPair::new(0.5, 0.5 + 2e-6), Err(Error::InvalidWeightConfiguration(_))));
        assert!(matches!(WeightPair::new(1.2, -0.2), Err(Error::InvalidWeightConfiguration(_))));
        assert!(matches!(WeightPair::new(f64::NAN, 1.0), Err(Error::InvalidWeightConfiguration(_))));
    }

    #[test]
    fn combine_does_not_clamp() {
        let w = WeightPair::new(0.5, 0.5).unwrap();
        assert_eq!(combine(-1.0, -0.5, w), -0.75);
    }
}

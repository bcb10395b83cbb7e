// calibration.rs — How well an agent's stated confidence predicts outcomes.
//
// score = 100 × (1 − mean |predicted − actual|), over history entries that
// carry a predicted confidence. Success counts as 1.0, Partial as 0.5 and
// Failure as 0.0.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::EventRecord;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Interpretation {
    Excellent,
    Good,
    Fair,
    Poor,
    /// No event in the history carried a confidence.
    NoData,
}

impl Interpretation {
    pub fn for_score(score: f64) -> Self {
        if score >= 90.0 {
            Interpretation::Excellent
        } else if score >= 75.0 {
            Interpretation::Good
        } else if score >= 50.0 {
            Interpretation::Fair
        } else {
            Interpretation::Poor
        }
    }
}

impl fmt::Display for Interpretation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Interpretation::Excellent => write!(f, "excellent"),
            Interpretation::Good => write!(f, "good"),
            Interpretation::Fair => write!(f, "fair"),
            Interpretation::Poor => write!(f, "poor"),
            Interpretation::NoData => write!(f, "no_data"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Calibration {
    pub domain: String,
    /// Within [0, 100]; 0 when there are no samples.
    pub calibration_score: f64,
    pub interpretation: Interpretation,
    pub sample_count: usize,
    /// Mean of predicted minus actual. Positive means over-confident.
    pub bias: f64,
}

/// Scores a domain's confidence history.
#[derive(Debug, Clone, Copy, Default)]
pub struct CalibrationTracker;

impl CalibrationTracker {
    pub fn calibrate(&self, domain: &str, history: &[EventRecord]) -> Calibration {
        let samples: Vec<(f64, f64)> = history
            .iter()
            .filter_map(|r| r.predicted_confidence.map(|p| (p, r.outcome.as_actual())))
            .collect();

        if samples.is_empty() {
            return Calibration {
                domain: domain.to_string(),
                calibration_score: 0.0,
                interpretation: Interpretation::NoData,
                sample_count: 0,
                bias: 0.0,
            };
        }

        let n = samples.len() as f64;
        let mae = samples.iter().map(|(p, a)| (p - a).abs()).sum::<f64>() / n;
        let bias = samples.iter().map(|(p, a)| p - a).sum::<f64>() / n;
        let score = (100.0 * (1.0 - mae)).clamp(0.0, 100.0);

        Calibration {
            domain: domain.to_string(),
            calibration_score: score,
            interpretation: Interpretation::for_score(score),
            sample_count: samples.len(),
            bias,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Impact, Outcome};
    use chrono::Utc;

    fn sample(outcome: Outcome, confidence: Option<f64>) -> EventRecord {
        EventRecord {
            outcome,
            impact: Impact::Medium,
            predicted_confidence: confidence,
            delta: 0.0,
            value_after: 50.0,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn no_samples_is_no_data() {
        let history = vec![sample(Outcome::Success, None)];
        let c = CalibrationTracker.calibrate("email.send", &history);
        assert_eq!(c.calibration_score, 0.0);
        assert_eq!(c.interpretation, Interpretation::NoData);
        assert_eq!(c.sample_count, 0);
    }

    #[test]
    fn perfect_predictions_score_100() {
        let history = vec![
            sample(Outcome::Success, Some(1.0)),
            sample(Outcome::Failure, Some(0.0)),
            sample(Outcome::Partial, Some(0.5)),
        ];
        let c = CalibrationTracker.calibrate("email.send", &history);
        assert_eq!(c.calibration_score, 100.0);
        assert_eq!(c.interpretation, Interpretation::Excellent);
        assert_eq!(c.bias, 0.0);
    }

    #[test]
    fn overconfidence_shows_as_positive_bias() {
        let history = vec![
            sample(Outcome::Failure, Some(0.9)),
            sample(Outcome::Success, Some(0.9)),
        ];
        let c = CalibrationTracker.calibrate("finance.transfer", &history);
        // MAE = (0.9 + 0.1) / 2 = 0.5
        assert!((c.calibration_score - 50.0).abs() < 1e-9);
        assert_eq!(c.interpretation, Interpretation::Fair);
        assert!((c.bias - 0.4).abs() < 1e-9);
        assert_eq!(c.sample_count, 2);
    }

    #[test]
    fn interpretation_bands() {
        assert_eq!(Interpretation::for_score(90.0), Interpretation::Excellent);
        assert_eq!(Interpretation::for_score(89.9), Interpretation::Good);
        assert_eq!(Interpretation::for_score(75.0), Interpretation::Good);
        assert_eq!(Interpretation::for_score(50.0), Interpretation::Fair);
        assert_eq!(Interpretation::for_score(49.9), Interpretation::Poor);
    }
}

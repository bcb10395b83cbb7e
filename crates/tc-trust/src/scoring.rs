// scoring.rs — The trust arithmetic.
//
// Pure functions only; the stores call these under their per-key lock.
//
// Events: delta = outcome_weight × impact_scale, value clamped to [0, 100].
// With the default weights a failure costs 2.5× what the same-impact
// success earns.
//
// Decay: after a full period of inactivity the value moves toward neutral
// by `rate` of the remaining distance per elapsed period. One tick moves at
// most `max_step` points and never drops more than one state.

use chrono::{DateTime, Utc};

use crate::config::{DecayConfig, ScoringConfig, StateThresholds};
use crate::types::{Impact, Outcome};

pub const MIN_VALUE: f64 = 0.0;
pub const MAX_VALUE: f64 = 100.0;

pub fn outcome_weight(outcome: Outcome, config: &ScoringConfig) -> f64 {
    match outcome {
        Outcome::Success => config.success_weight,
        Outcome::Partial => config.partial_weight,
        Outcome::Failure => config.failure_weight,
    }
}

pub fn impact_scale(impact: Impact, config: &ScoringConfig) -> f64 {
    match impact {
        Impact::Low => config.low_impact,
        Impact::Medium => config.medium_impact,
        Impact::High => config.high_impact,
    }
}

/// Unclamped change an event asks for.
pub fn event_delta(outcome: Outcome, impact: Impact, config: &ScoringConfig) -> f64 {
    outcome_weight(outcome, config) * impact_scale(impact, config)
}

pub fn clamp_value(value: f64) -> f64 {
    value.clamp(MIN_VALUE, MAX_VALUE)
}

/// True once the key has been idle for longer than one decay period.
pub fn decay_due(last_activity: DateTime<Utc>, now: DateTime<Utc>, config: &DecayConfig) -> bool {
    now - last_activity > config.period()
}

/// Whole decay periods between `anchor` and `now`.
pub fn periods_elapsed(anchor: DateTime<Utc>, now: DateTime<Utc>, config: &DecayConfig) -> u32 {
    let period_secs = config.period().num_seconds();
    let elapsed_secs = (now - anchor).num_seconds();
    if period_secs <= 0 || elapsed_secs <= 0 {
        return 0;
    }
    u32::try_from(elapsed_secs / period_secs).unwrap_or(u32::MAX)
}

/// Value after decaying `value` toward `neutral` for `periods` periods in one tick.
pub fn decayed_value(
    value: f64,
    neutral: f64,
    periods: u32,
    decay: &DecayConfig,
    thresholds: &StateThresholds,
) -> f64 {
    if periods == 0 || value == neutral {
        return value;
    }

    let exponent = i32::try_from(periods).unwrap_or(i32::MAX);
    let target = neutral + (value - neutral) * (1.0 - decay.rate).powi(exponent);
    let step = (target - value).clamp(-decay.max_step, decay.max_step);
    let mut next = value + step;

    if value > neutral {
        let floor = thresholds.lower_bound(thresholds.state_for(value).lower());
        next = next.max(floor).max(neutral);
    } else {
        next = next.min(neutral);
    }
    clamp_value(next)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn cfg() -> ScoringConfig {
        ScoringConfig::default()
    }

    #[test]
    fn default_weights_match_table() {
        assert_eq!(event_delta(Outcome::Success, Impact::Medium, &cfg()), 2.0);
        assert_eq!(event_delta(Outcome::Success, Impact::Low, &cfg()), 1.0);
        assert_eq!(event_delta(Outcome::Partial, Impact::High, &cfg()), 1.0);
        assert_eq!(event_delta(Outcome::Failure, Impact::High, &cfg()), -10.0);
        assert_eq!(event_delta(Outcome::Failure, Impact::Low, &cfg()), -2.5);
    }

    #[test]
    fn losses_outweigh_equal_gains() {
        for impact in [Impact::Low, Impact::Medium, Impact::High] {
            let gain = event_delta(Outcome::Success, impact, &cfg());
            let loss = event_delta(Outcome::Failure, impact, &cfg());
            assert!(loss.abs() > gain, "impact {impact}");
            assert_eq!(loss.abs() / gain, 2.5);
        }
    }

    #[test]
    fn clamp_keeps_range() {
        assert_eq!(clamp_value(-3.0), 0.0);
        assert_eq!(clamp_value(104.0), 100.0);
        assert_eq!(clamp_value(42.5), 42.5);
    }

    #[test]
    fn decay_due_only_after_full_period() {
        let d = DecayConfig::default();
        let start = Utc::now();
        assert!(!decay_due(start, start + Duration::days(7), &d));
        assert!(decay_due(start, start + Duration::days(7) + Duration::seconds(1), &d));
    }

    #[test]
    fn periods_are_whole() {
        let d = DecayConfig::default();
        let start = Utc::now();
        assert_eq!(periods_elapsed(start, start + Duration::days(6), &d), 0);
        assert_eq!(periods_elapsed(start, start + Duration::days(15), &d), 2);
        assert_eq!(periods_elapsed(start, start - Duration::days(15), &d), 0);
    }

    #[test]
    fn one_period_moves_one_percent_of_distance() {
        let t = StateThresholds::default();
        let d = DecayConfig::default();
        let next = decayed_value(80.0, 50.0, 1, &d, &t);
        assert!((next - 79.7).abs() < 1e-9);
        let next = decayed_value(20.0, 50.0, 1, &d, &t);
        assert!((next - 20.3).abs() < 1e-9);
    }

    #[test]
    fn neutral_does_not_move() {
        let t = StateThresholds::default();
        assert_eq!(decayed_value(50.0, 50.0, 10, &DecayConfig::default(), &t), 50.0);
    }

    #[test]
    fn step_is_capped() {
        let t = StateThresholds::default();
        let d = DecayConfig {
            max_step: 1.0,
            ..DecayConfig::default()
        };
        // 40 periods would move 74 → ~66.0; the cap holds it at 73.
        assert_eq!(decayed_value(74.0, 50.0, 40, &d, &t), 73.0);
    }

    #[test]
    fn single_tick_drops_at_most_one_state() {
        let t = StateThresholds::default();
        let d = DecayConfig {
            max_step: 100.0,
            ..DecayConfig::default()
        };
        // Raw decay over 200 periods would land near 56.7 (Learning).
        let next = decayed_value(100.0, 50.0, 200, &d, &t);
        assert_eq!(next, 75.0);
        assert_eq!(t.state_for(next), crate::types::TrustState::Trusted);
    }

    #[test]
    fn decay_never_overshoots_neutral() {
        let t = StateThresholds::default();
        let d = DecayConfig {
            rate: 0.9,
            max_step: 100.0,
            ..DecayConfig::default()
        };
        let down = decayed_value(60.0, 50.0, 50, &d, &t);
        assert!(down >= 50.0);
        let up = decayed_value(10.0, 50.0, 50, &d, &t);
        assert!(up <= 50.0);
    }
}

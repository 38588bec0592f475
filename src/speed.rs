//! Speech-rate policy.
//!
//! Short utterances are spoken at full rate, medium ones are progressively
//! slowed, long ones sit at a floor rate, and the result is scaled up by a
//! fixed factor to offset the model's baseline pacing.

use std::fmt;
use std::str::FromStr;

/// Utterances up to this many phonemes are not slowed down.
pub const SHORT_UTTERANCE_LEN: usize = 83;

/// Utterances of at least this many phonemes use [`FLOOR_RATE`].
pub const LONG_UTTERANCE_LEN: usize = 183;

/// Rate lost per phoneme between the two thresholds is `1 / SLOWDOWN_DIVISOR`.
const SLOWDOWN_DIVISOR: f32 = 500.0;

/// Slowest rate before global scaling.
pub const FLOOR_RATE: f32 = 0.8;

/// Scale applied to every adaptive rate.
pub const GLOBAL_SCALE: f32 = 1.1;

/// Maps phoneme count to a speed multiplier.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SpeedPolicy {
    /// Same multiplier for every utterance.
    Constant(f32),
    /// Piecewise-linear slow-down for long utterances.
    LengthAdaptive,
}

impl Default for SpeedPolicy {
    fn default() -> Self {
        SpeedPolicy::LengthAdaptive
    }
}

impl SpeedPolicy {
    pub fn speed_for(&self, phoneme_len: usize) -> f32 {
        match self {
            SpeedPolicy::Constant(speed) => *speed,
            SpeedPolicy::LengthAdaptive => adaptive_speed(phoneme_len),
        }
    }
}

/// Length-adaptive multiplier for an utterance of `phoneme_len` units.
pub fn adaptive_speed(phoneme_len: usize) -> f32 {
    let base = if phoneme_len <= SHORT_UTTERANCE_LEN {
        1.0
    } else if phoneme_len < LONG_UTTERANCE_LEN {
        1.0 - (phoneme_len - SHORT_UTTERANCE_LEN) as f32 / SLOWDOWN_DIVISOR
    } else {
        FLOOR_RATE
    };
    base * GLOBAL_SCALE
}

impl FromStr for SpeedPolicy {
    type Err = String;

    /// Accepts `adaptive`, `constant` (1.0) or `constant:<speed>`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "adaptive" => Ok(SpeedPolicy::LengthAdaptive),
            "constant" => Ok(SpeedPolicy::Constant(1.0)),
            other => {
                let value = other
                    .strip_prefix("constant:")
                    .ok_or_else(|| format!("unknown speed policy '{s}'"))?;
                let speed: f32 = value
                    .parse()
                    .map_err(|e| format!("invalid constant speed '{value}': {e}"))?;
                if !(speed.is_finite() && speed > 0.0) {
                    return Err(format!("constant speed must be positive, got {speed}"));
                }
                Ok(SpeedPolicy::Constant(speed))
            }
        }
    }
}

impl fmt::Display for SpeedPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpeedPolicy::Constant(speed) => write!(f, "constant:{speed}"),
            SpeedPolicy::LengthAdaptive => f.write_str("adaptive"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_utterances_run_at_scaled_full_rate() {
        for len in [0, 1, 40, 83] {
            assert_eq!(adaptive_speed(len), 1.0 * 1.1);
        }
    }

    #[test]
    fn long_utterances_run_at_scaled_floor() {
        for len in [183, 184, 500, 10_000] {
            assert_eq!(adaptive_speed(len), 0.8 * 1.1);
        }
    }

    #[test]
    fn medium_utterances_follow_the_slope() {
        let expected = (1.0 - 50.0 / 500.0) * 1.1;
        assert!((adaptive_speed(133) - expected).abs() < 1e-6);
    }

    #[test]
    fn curve_is_continuous_and_non_increasing() {
        let mut previous = adaptive_speed(SHORT_UTTERANCE_LEN);
        for len in SHORT_UTTERANCE_LEN + 1..=LONG_UTTERANCE_LEN {
            let speed = adaptive_speed(len);
            assert!(speed <= previous, "rate rose at {len}");
            assert!(previous - speed <= GLOBAL_SCALE / SLOWDOWN_DIVISOR + 1e-6);
            previous = speed;
        }
    }

    #[test]
    fn constant_policy_ignores_length() {
        let policy = SpeedPolicy::Constant(1.0);
        assert_eq!(policy.speed_for(5), 1.0);
        assert_eq!(policy.speed_for(5_000), 1.0);
    }

    #[test]
    fn parses_policy_names() {
        assert_eq!("adaptive".parse(), Ok(SpeedPolicy::LengthAdaptive));
        assert_eq!("Constant".parse(), Ok(SpeedPolicy::Constant(1.0)));
        assert_eq!("constant:0.9".parse(), Ok(SpeedPolicy::Constant(0.9)));
        assert!("constant:-1".parse::<SpeedPolicy>().is_err());
        assert!("fast".parse::<SpeedPolicy>().is_err());
    }
}

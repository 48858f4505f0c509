//! Effect stage declarations and their runtime state.

use std::collections::{HashMap, VecDeque};

use crate::RouteError;

/// Feedback applied to the reverb delay line.
pub const REVERB_FEEDBACK: f32 = 0.4;

/// Level of the delayed signal mixed into the reverb output.
pub const REVERB_WET: f32 = 0.5;

/// Longest delay or reverb line a program may declare, in milliseconds.
pub const MAX_LINE_MS: u32 = 10_000;

/// One parsed line of an effect program.
///
/// All parameters are integers. `Gain::amount` is an integer multiplier, so
/// fractional gains are not expressible in a program.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageSpec {
    /// Pure delay of `time_ms` milliseconds.
    Delay {
        /// Delay length in milliseconds.
        time_ms: u32,
    },
    /// Placeholder, passes samples through unchanged.
    Distortion {
        /// Configured intensity.
        intensity: i32,
    },
    /// Placeholder, passes samples through unchanged.
    Compression {
        /// Configured amount.
        amount: i32,
    },
    /// Placeholder, passes samples through unchanged.
    Gating {
        /// Configured threshold.
        threshold: i32,
    },
    /// One-tap feedback comb; `intensity` is the line length in milliseconds.
    Reverb {
        /// Delay line length in milliseconds.
        intensity: u32,
    },
    /// Multiply and clamp to [-1.0, 1.0].
    Gain {
        /// Integer multiplier.
        amount: i32,
    },
}

impl StageSpec {
    /// Parses one non-empty program line, `type key=value ...`.
    ///
    /// `line_no` is only used for error reporting. Tokens without `=` are
    /// ignored; repeated keys keep the last value.
    pub fn parse(line: &str, line_no: usize) -> Result<Self, RouteError> {
        let mut tokens = line.split_whitespace();
        let kind = tokens
            .next()
            .ok_or_else(|| RouteError::invalid_effect(line_no, "empty line"))?;

        let mut params = HashMap::new();
        for token in tokens {
            let Some((key, value)) = token.split_once('=') else {
                continue;
            };
            let value: i32 = value.parse().map_err(|_| {
                RouteError::invalid_effect(line_no, format!("'{key}' needs an integer, got '{value}'"))
            })?;
            params.insert(key, value);
        }

        let required = |key: &str| {
            params
                .get(key)
                .copied()
                .ok_or_else(|| RouteError::invalid_effect(line_no, format!("{kind} requires '{key}'")))
        };
        let duration = |key: &str| {
            let value = required(key)?;
            let ms = u32::try_from(value).map_err(|_| {
                RouteError::invalid_effect(line_no, format!("'{key}' must not be negative"))
            })?;
            if ms > MAX_LINE_MS {
                return Err(RouteError::invalid_effect(
                    line_no,
                    format!("'{key}' exceeds {MAX_LINE_MS} ms, got {ms}"),
                ));
            }
            Ok(ms)
        };

        match kind {
            "delay" => Ok(Self::Delay {
                time_ms: duration("time")?,
            }),
            "distortion" => Ok(Self::Distortion {
                intensity: required("intensity")?,
            }),
            "compression" => Ok(Self::Compression {
                amount: required("amount")?,
            }),
            "gating" => Ok(Self::Gating {
                threshold: required("threshold")?,
            }),
            "reverb" => Ok(Self::Reverb {
                intensity: duration("intensity")?,
            }),
            "gain" => Ok(Self::Gain {
                amount: required("amount")?,
            }),
            other => Err(RouteError::invalid_effect(
                line_no,
                format!("unknown effect type '{other}'"),
            )),
        }
    }

    /// Creates fresh stage state for `sample_rate`.
    pub fn instantiate(&self, sample_rate: u32) -> Stage {
        match *self {
            Self::Delay { time_ms } => Stage::Delay(DelayLine::new(line_len(time_ms, sample_rate))),
            Self::Reverb { intensity } => {
                Stage::Reverb(DelayLine::new(line_len(intensity, sample_rate)))
            }
            Self::Gain { amount } => Stage::Gain(amount as f32),
            Self::Distortion { .. } | Self::Compression { .. } | Self::Gating { .. } => {
                Stage::PassThrough
            }
        }
    }
}

/// Samples held by a line of `time_ms` at `sample_rate`.
fn line_len(time_ms: u32, sample_rate: u32) -> usize {
    (u64::from(time_ms) * u64::from(sample_rate) / 1000) as usize
}

/// FIFO of past samples.
#[derive(Debug, Clone)]
pub struct DelayLine {
    queue: VecDeque<f32>,
    capacity: usize,
}

impl DelayLine {
    /// Creates an empty line holding `capacity` samples.
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: VecDeque::new(),
            capacity,
        }
    }

    /// Number of samples of delay.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Enqueues `input` and returns the sample `capacity` calls old, or silence while filling.
    fn delay(&mut self, input: f32) -> f32 {
        self.queue.push_back(input);
        if self.queue.len() > self.capacity {
            self.queue.pop_front().unwrap_or(0.0)
        } else {
            0.0
        }
    }

    /// One feedback comb step.
    fn reverb(&mut self, input: f32) -> f32 {
        let delayed = if self.queue.len() >= self.capacity {
            self.queue.pop_front().unwrap_or(0.0)
        } else {
            0.0
        };
        self.queue.push_back(input + delayed * REVERB_FEEDBACK);
        input + delayed * REVERB_WET
    }
}

/// Runtime state of one stage.
#[derive(Debug, Clone)]
pub enum Stage {
    /// Pure delay.
    Delay(DelayLine),
    /// Feedback comb.
    Reverb(DelayLine),
    /// Multiplier, clamped.
    Gain(f32),
    /// Distortion, compression and gating placeholders.
    PassThrough,
}

impl Stage {
    /// Processes one sample.
    #[inline]
    pub fn process(&mut self, input: f32) -> f32 {
        match self {
            Self::Delay(line) => line.delay(input),
            Self::Reverb(line) => line.reverb(input),
            Self::Gain(amount) => (input * *amount).clamp(-1.0, 1.0),
            Self::PassThrough => input,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    #[test]
    fn test_parse_each_type() {
        assert_eq!(
            StageSpec::parse("delay time=250", 1).unwrap(),
            StageSpec::Delay { time_ms: 250 }
        );
        assert_eq!(
            StageSpec::parse("distortion intensity=3", 1).unwrap(),
            StageSpec::Distortion { intensity: 3 }
        );
        assert_eq!(
            StageSpec::parse("compression amount=-2", 1).unwrap(),
            StageSpec::Compression { amount: -2 }
        );
        assert_eq!(
            StageSpec::parse("gating threshold=10", 1).unwrap(),
            StageSpec::Gating { threshold: 10 }
        );
        assert_eq!(
            StageSpec::parse("reverb intensity=40", 1).unwrap(),
            StageSpec::Reverb { intensity: 40 }
        );
        assert_eq!(
            StageSpec::parse("gain amount=2", 1).unwrap(),
            StageSpec::Gain { amount: 2 }
        );
    }

    #[test]
    fn test_parse_ignores_extra_tokens_and_keeps_last_value() {
        assert_eq!(
            StageSpec::parse("delay  wet  time=5 mix=1 time=7", 1).unwrap(),
            StageSpec::Delay { time_ms: 7 }
        );
    }

    #[test]
    fn test_parse_errors() {
        let unknown = StageSpec::parse("frobnicate x=1", 3).unwrap_err();
        assert_eq!(unknown.kind(), ErrorKind::Configuration);
        assert!(unknown.to_string().contains("line 3"));

        let missing = StageSpec::parse("delay amount=5", 1).unwrap_err();
        assert!(missing.to_string().contains("'time'"));

        let fractional = StageSpec::parse("gain amount=0.5", 1).unwrap_err();
        assert!(fractional.to_string().contains("integer"));

        let negative = StageSpec::parse("reverb intensity=-5", 1).unwrap_err();
        assert!(negative.to_string().contains("negative"));
    }

    #[test]
    fn test_line_length_is_bounded_at_parse() {
        let err = StageSpec::parse("delay time=2147483647", 2).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert!(matches!(err, RouteError::InvalidEffect { line: 2, .. }));

        let over = format!("reverb intensity={}", MAX_LINE_MS + 1);
        assert!(StageSpec::parse(&over, 1).is_err());

        let longest = format!("delay time={MAX_LINE_MS}");
        assert_eq!(
            StageSpec::parse(&longest, 1).unwrap(),
            StageSpec::Delay {
                time_ms: MAX_LINE_MS
            }
        );
    }

    #[test]
    fn test_long_delay_grows_on_demand() {
        let stage = StageSpec::Delay {
            time_ms: MAX_LINE_MS,
        }
        .instantiate(48000);
        let Stage::Delay(mut line) = stage else {
            panic!("expected delay stage");
        };
        assert_eq!(line.capacity(), 480_000);
        assert_eq!(line.queue.capacity(), 0);

        for _ in 0..64 {
            assert_eq!(line.delay(0.5), 0.0);
        }
        assert_eq!(line.queue.len(), 64);
        assert!(line.queue.capacity() < line.capacity());
    }

    #[test]
    fn test_delay_line_length() {
        let stage = StageSpec::Delay { time_ms: 10 }.instantiate(1000);
        let Stage::Delay(line) = stage else {
            panic!("expected delay stage");
        };
        assert_eq!(line.capacity(), 10);
        assert_eq!(line_len(250, 44100), 11025);
    }

    #[test]
    fn test_zero_length_delay_is_identity() {
        let mut stage = StageSpec::Delay { time_ms: 0 }.instantiate(48000);
        assert_eq!(stage.process(0.3), 0.3);
        assert_eq!(stage.process(-0.7), -0.7);
    }

    #[test]
    fn test_reverb_comb() {
        // Two-sample line at 1 kHz
        let mut stage = StageSpec::Reverb { intensity: 2 }.instantiate(1000);
        assert_eq!(stage.process(1.0), 1.0);
        assert_eq!(stage.process(0.0), 0.0);
        // First echo: 1.0 * 0.5 wet
        assert_eq!(stage.process(0.0), 0.5);
        assert_eq!(stage.process(0.0), 0.0);
        // Fed back at 0.4, then 0.5 wet
        assert!((stage.process(0.0) - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_gain_clamps() {
        let mut stage = Stage::Gain(2.0);
        assert_eq!(stage.process(0.9), 1.0);
        assert_eq!(stage.process(-0.9), -1.0);
        assert_eq!(stage.process(0.25), 0.5);
    }

    #[test]
    fn test_placeholders_pass_through() {
        for spec in [
            StageSpec::Distortion { intensity: 9 },
            StageSpec::Compression { amount: 9 },
            StageSpec::Gating { threshold: 9 },
        ] {
            let mut stage = spec.instantiate(48000);
            assert_eq!(stage.process(0.42), 0.42);
        }
    }
}

//! Configuration types for routes.

use std::time::Duration;

/// Buffering mode requested by a route.
///
/// Selects how deep the endpoint buffers are and how large the pump's
/// read chunks get. Low latency trades headroom for responsiveness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Latency {
    /// Small buffers, short waits.
    Low,
    /// Deeper buffers for stability.
    #[default]
    Normal,
}

impl Latency {
    /// Maps the host-facing low-latency flag onto a mode.
    #[must_use]
    pub fn from_flag(low_latency: bool) -> Self {
        if low_latency {
            Self::Low
        } else {
            Self::Normal
        }
    }

    /// Returns `true` for [`Latency::Low`].
    #[must_use]
    pub fn is_low(&self) -> bool {
        matches!(self, Self::Low)
    }
}

/// Tunables for a [`StreamPump`](crate::pipeline::StreamPump) loop.
///
/// Use [`PumpConfig::for_latency()`] for the standard profiles, or override
/// individual fields.
///
/// # Example
///
/// ```
/// use route_audio::{Latency, PumpConfig};
/// use std::time::Duration;
///
/// let config = PumpConfig {
///     capture_wait: Duration::from_millis(4),
///     ..PumpConfig::for_latency(Latency::Low)
/// };
/// assert_eq!(config.chunk_frames, 512);
/// ```
#[derive(Debug, Clone)]
pub struct PumpConfig {
    /// Latency profile these values were derived from.
    pub latency: Latency,

    /// Buffer depth requested from endpoints when they are opened.
    ///
    /// Default: 50ms (10ms for low latency)
    pub buffer_duration: Duration,

    /// Frames read per tick when the source is a decoded file.
    ///
    /// Default: 1024 (512 for low latency)
    pub chunk_frames: usize,

    /// Bounded wait when the capture side has no frames ready.
    ///
    /// Every wait is followed by a stop-signal check, so this bounds
    /// shutdown latency.
    /// Default: 10ms (2ms for low latency)
    pub capture_wait: Duration,

    /// Wait before retrying when the render side reports no free space.
    ///
    /// Default: 1ms
    pub render_retry: Duration,
}

impl PumpConfig {
    /// Returns the standard profile for the given latency mode.
    #[must_use]
    pub fn for_latency(latency: Latency) -> Self {
        match latency {
            Latency::Low => Self {
                latency,
                buffer_duration: Duration::from_millis(10),
                chunk_frames: 512,
                capture_wait: Duration::from_millis(2),
                render_retry: Duration::from_millis(1),
            },
            Latency::Normal => Self {
                latency,
                buffer_duration: Duration::from_millis(50),
                chunk_frames: 1024,
                capture_wait: Duration::from_millis(10),
                render_retry: Duration::from_millis(1),
            },
        }
    }

    /// Upper bound on how long the pump can go without checking the stop signal.
    #[must_use]
    pub fn max_wait(&self) -> Duration {
        self.capture_wait.max(self.render_retry)
    }

    /// Number of frames the requested buffer duration holds at `sample_rate`.
    #[must_use]
    pub fn buffer_frames(&self, sample_rate: u32) -> usize {
        (u128::from(sample_rate) * self.buffer_duration.as_micros() / 1_000_000) as usize
    }
}

impl Default for PumpConfig {
    fn default() -> Self {
        Self::for_latency(Latency::Normal)
    }
}

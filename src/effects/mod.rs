//! Declarative effect chains.
//!
//! An effect program is plain text, one stage per line:
//!
//! ```text
//! delay time=250
//! reverb intensity=40
//! gain amount=2
//! ```
//!
//! Parsing produces an immutable [`EffectProgram`]. Each route instantiates
//! its own [`EffectChain`]s from it (one per destination channel), so stage
//! state is never shared between threads. Installing a new program resets
//! that state, which can be audible as a discontinuity.

mod stage;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::RouteError;

pub use stage::{DelayLine, Stage, StageSpec, MAX_LINE_MS, REVERB_FEEDBACK, REVERB_WET};

/// A parsed, validated effect program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectProgram {
    stages: Vec<StageSpec>,
    sample_rate: u32,
}

impl EffectProgram {
    /// Parses `text` for the given sample rate.
    ///
    /// Blank lines are skipped. Any unknown type, missing required key or
    /// non-integer value rejects the whole program.
    ///
    /// # Example
    ///
    /// ```
    /// use route_audio::EffectProgram;
    ///
    /// let program = EffectProgram::parse("delay time=100\n\ngain amount=2", 48000).unwrap();
    /// assert_eq!(program.len(), 2);
    ///
    /// assert!(EffectProgram::parse("frobnicate x=1", 48000).is_err());
    /// ```
    pub fn parse(text: &str, sample_rate: u32) -> Result<Self, RouteError> {
        let stages = text
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(index, line)| StageSpec::parse(line, index + 1))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            stages,
            sample_rate,
        })
    }

    /// Stage declarations in program order.
    pub fn stages(&self) -> &[StageSpec] {
        &self.stages
    }

    /// Sample rate the program was parsed for.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Number of stages.
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Returns `true` for a program without stages.
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Creates a chain with fresh stage state.
    pub fn instantiate(&self) -> EffectChain {
        EffectChain {
            stages: self
                .stages
                .iter()
                .map(|spec| spec.instantiate(self.sample_rate))
                .collect(),
        }
    }
}

/// Stateful stages rendering one sample stream.
#[derive(Debug, Clone, Default)]
pub struct EffectChain {
    stages: Vec<Stage>,
}

impl EffectChain {
    /// Parses `text` and builds a chain in one step.
    ///
    /// Fails before any sample is rendered if the program is malformed.
    pub fn initialize(text: &str, sample_rate: u32) -> Result<Self, RouteError> {
        Ok(EffectProgram::parse(text, sample_rate)?.instantiate())
    }

    /// Pipes one sample through every stage in program order.
    #[inline]
    pub fn render(&mut self, sample: f32) -> f32 {
        self.stages
            .iter_mut()
            .fold(sample, |acc, stage| stage.process(acc))
    }

    /// Renders a whole mono block in place.
    pub fn render_block(&mut self, samples: &mut [f32]) {
        for sample in samples {
            *sample = self.render(*sample);
        }
    }

    /// Number of stages.
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Returns `true` for a chain without stages.
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

/// Shared slot holding the currently installed program.
///
/// The control plane installs or clears programs; route threads poll the
/// generation each tick and only touch the lock (with `try_lock`) after it
/// changed.
#[derive(Debug, Default)]
pub struct EffectSlot {
    program: Mutex<Option<Arc<EffectProgram>>>,
    generation: AtomicU64,
}

impl EffectSlot {
    /// Creates an empty slot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs `program` for every route.
    pub fn install(&self, program: EffectProgram) {
        *self.program.lock() = Some(Arc::new(program));
        self.generation.fetch_add(1, Ordering::Release);
    }

    /// Removes the installed program.
    pub fn clear(&self) {
        *self.program.lock() = None;
        self.generation.fetch_add(1, Ordering::Release);
    }

    /// The installed program, if any.
    pub fn current(&self) -> Option<Arc<EffectProgram>> {
        self.program.lock().clone()
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Non-blocking read; `None` if the slot is being written.
    pub(crate) fn try_current(&self) -> Option<Option<Arc<EffectProgram>>> {
        self.program.try_lock().map(|program| program.clone())
    }
}

/// Per-route effect state: one chain per destination channel.
#[derive(Debug)]
pub(crate) struct ChannelEffects {
    slot: Arc<EffectSlot>,
    generation: u64,
    chains: Vec<EffectChain>,
}

impl ChannelEffects {
    pub(crate) fn new(slot: Arc<EffectSlot>) -> Self {
        Self {
            slot,
            // Forces a load on the first tick
            generation: u64::MAX,
            chains: Vec::new(),
        }
    }

    /// Picks up a newly installed program, rebuilding all chains.
    ///
    /// Keeps the current chains if the slot is contended.
    fn refresh(&mut self, channels: usize) {
        let generation = self.slot.generation();
        if generation == self.generation {
            return;
        }
        let Some(program) = self.slot.try_current() else {
            return;
        };

        self.chains = match program {
            Some(program) if !program.is_empty() => {
                tracing::debug!(stages = program.len(), channels, "effect chain reloaded");
                (0..channels).map(|_| program.instantiate()).collect()
            }
            _ => Vec::new(),
        };
        self.generation = generation;
    }

    /// Renders interleaved `samples` in place.
    pub(crate) fn process(&mut self, samples: &mut [f32], channels: usize) {
        self.refresh(channels);
        if self.chains.len() != channels || channels == 0 {
            return;
        }
        for frame in samples.chunks_exact_mut(channels) {
            for (sample, chain) in frame.iter_mut().zip(&mut self.chains) {
                *sample = chain.render(*sample);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_chain_warm_up() {
        // 10ms at 1kHz is a 10-sample line
        let mut chain = EffectChain::initialize("delay time=10", 1000).unwrap();
        let input: Vec<f32> = (1..=30).map(|i| i as f32 / 100.0).collect();
        let output: Vec<f32> = input.iter().map(|&s| chain.render(s)).collect();

        assert!(output[..10].iter().all(|&s| s == 0.0));
        assert_eq!(&output[10..], &input[..20]);
    }

    #[test]
    fn test_gain_chain_clamps() {
        let mut chain = EffectChain::initialize("gain amount=2", 48000).unwrap();
        assert_eq!(chain.render(0.9), 1.0);
        assert_eq!(chain.render(-0.9), -1.0);
    }

    #[test]
    fn test_stages_run_in_order() {
        // Gain before the delay: delayed output is the amplified input
        let mut chain = EffectChain::initialize("gain amount=2\ndelay time=1", 1000).unwrap();
        assert_eq!(chain.render(0.25), 0.0);
        assert_eq!(chain.render(0.0), 0.5);
    }

    #[test]
    fn test_unknown_type_fails_initialize() {
        let err = EffectChain::initialize("frobnicate x=1", 48000).unwrap_err();
        assert!(matches!(err, RouteError::InvalidEffect { line: 1, .. }));
    }

    #[test]
    fn test_error_reports_original_line_number() {
        let err = EffectProgram::parse("delay time=5\n\n   \ngating", 48000).unwrap_err();
        assert!(matches!(err, RouteError::InvalidEffect { line: 4, .. }));
    }

    #[test]
    fn test_empty_program() {
        let mut chain = EffectChain::initialize("\n  \n", 48000).unwrap();
        assert!(chain.is_empty());
        assert_eq!(chain.render(0.3), 0.3);
    }

    #[test]
    fn test_render_block() {
        let mut chain = EffectChain::initialize("gain amount=3", 48000).unwrap();
        let mut block = [0.1f32, 0.5, -0.2];
        chain.render_block(&mut block);
        assert!((block[0] - 0.3).abs() < 1e-6);
        assert_eq!(block[1], 1.0);
        assert!((block[2] + 0.6).abs() < 1e-6);
    }

    #[test]
    fn test_channel_effects_follow_slot() {
        let slot = Arc::new(EffectSlot::new());
        let mut effects = ChannelEffects::new(Arc::clone(&slot));

        let mut samples = vec![0.25f32; 4];
        effects.process(&mut samples, 2);
        assert_eq!(samples, vec![0.25; 4]);

        slot.install(EffectProgram::parse("gain amount=2", 48000).unwrap());
        effects.process(&mut samples, 2);
        assert_eq!(samples, vec![0.5; 4]);

        slot.clear();
        effects.process(&mut samples, 2);
        assert_eq!(samples, vec![0.5; 4]);
        assert!(slot.current().is_none());
    }

    #[test]
    fn test_channel_effects_keep_channels_apart() {
        let slot = Arc::new(EffectSlot::new());
        slot.install(EffectProgram::parse("delay time=1", 1000).unwrap());
        let mut effects = ChannelEffects::new(slot);

        // Stereo frames: left 0.1, 0.2; right 0.9, 0.8
        let mut samples = vec![0.1f32, 0.9, 0.2, 0.8];
        effects.process(&mut samples, 2);
        assert_eq!(samples, vec![0.0, 0.0, 0.1, 0.9]);
    }
}

//! The per-route streaming loop.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, trace, warn};

use super::{CaptureSource, StopToken};
use crate::config::PumpConfig;
use crate::effects::{ChannelEffects, EffectSlot};
use crate::endpoint::Endpoint;
use crate::format::{decode_into, from_float, remap_channels, resample, NativeFormat};
use crate::gain::GainHandle;
use crate::route::{RouteEnd, RouteState, RouteStats};
use crate::RouteError;

/// Extra time allowed for a render buffer to play out after playback ends.
const DRAIN_SLACK: Duration = Duration::from_millis(50);

/// Ticks between periodic trace lines.
const TRACE_EVERY: u64 = 500;

/// Moves audio from one capture source to one render endpoint.
///
/// Each tick reads whatever the source has ready, converts it to float,
/// applies the route gain (clamped, before any rate or layout change),
/// resamples and remaps to the render format when they differ, runs the
/// installed effect chain per channel and writes the result without ever
/// asking the render endpoint for more frames than it reports free.
///
/// The loop ends when the stop token fires, when a one-shot source is
/// exhausted, or on the first endpoint error. On every exit the render
/// endpoint is stopped, then the capture endpoint, then both are closed
/// in the same order. This also runs if the pump is dropped without
/// [`run()`](Self::run) finishing.
///
/// # Example
///
/// ```
/// use route_audio::pipeline::{CaptureSource, PcmReader, StreamPump};
/// use route_audio::{
///     Direction, EndpointBackend, MockBackend, MockEndpoint, NativeFormat, PcmBuffer,
///     PumpConfig, RouteEnd, SampleFormat,
/// };
///
/// let backend = MockBackend::new();
/// backend.add(MockEndpoint::render("out", NativeFormat::new(8000, 1, SampleFormat::F32)));
///
/// let config = PumpConfig::default();
/// let render = backend.open(&"out".into(), Direction::Render, &config).unwrap();
/// let pcm = PcmBuffer::from_i16(&[8192; 100], 8000, 1);
/// let source = CaptureSource::Pcm(PcmReader::new(pcm, config.chunk_frames));
///
/// let end = StreamPump::new(source, render, config).run().unwrap();
/// assert_eq!(end, RouteEnd::SourceExhausted);
/// assert_eq!(backend.rendered("out"), vec![0.25; 100]);
/// assert_eq!(backend.open_handles(), 0);
/// ```
pub struct StreamPump {
    source: CaptureSource,
    render: Box<dyn Endpoint>,
    config: PumpConfig,
    gain: Option<GainHandle>,
    effects: Option<ChannelEffects>,
    stop: StopToken,
    state: Arc<RouteState>,
    released: bool,
    raw: Vec<u8>,
    samples: Vec<f32>,
}

impl StreamPump {
    /// Creates a pump at unity gain, without effects, on a detached stop token.
    pub fn new(source: CaptureSource, render: Box<dyn Endpoint>, config: PumpConfig) -> Self {
        Self {
            source,
            render,
            config,
            gain: None,
            effects: None,
            stop: StopToken::detached(),
            state: Arc::new(RouteState::new()),
            released: false,
            raw: Vec::new(),
            samples: Vec::new(),
        }
    }

    /// Reads the route gain through `gain` on every tick.
    #[must_use]
    pub fn with_gain(mut self, gain: GainHandle) -> Self {
        self.gain = Some(gain);
        self
    }

    /// Applies whatever program is installed in `slot`.
    #[must_use]
    pub fn with_effects(mut self, slot: Arc<EffectSlot>) -> Self {
        self.effects = Some(ChannelEffects::new(slot));
        self
    }

    /// Observes `stop` at every blocking point.
    #[must_use]
    pub fn with_stop(mut self, stop: StopToken) -> Self {
        self.stop = stop;
        self
    }

    #[must_use]
    pub(crate) fn with_state(mut self, state: Arc<RouteState>) -> Self {
        self.state = state;
        self
    }

    /// Current counters.
    pub fn stats(&self) -> RouteStats {
        self.state.stats()
    }

    /// Runs the loop to completion and releases both endpoints.
    pub fn run(mut self) -> Result<RouteEnd, RouteError> {
        let result = self.start().and_then(|()| self.stream());
        let result = match result {
            Ok(RouteEnd::SourceExhausted) => self.drain().map(|()| RouteEnd::SourceExhausted),
            other => other,
        };
        self.release();
        result
    }

    fn start(&mut self) -> Result<(), RouteError> {
        self.source.start()?;
        self.render.start()
    }

    fn stream(&mut self) -> Result<RouteEnd, RouteError> {
        let src = self.source.format();
        let dst = self.render.native_format();
        let convert = src.needs_conversion_to(&dst);
        let src_channels = usize::from(src.channels);
        let dst_channels = usize::from(dst.channels);

        info!(
            source = ?self.source,
            destination = %self.render.id(),
            src_rate = src.sample_rate,
            src_channels,
            dst_rate = dst.sample_rate,
            dst_channels,
            latency = ?self.config.latency,
            "route streaming"
        );

        loop {
            if self.stop.is_stopped() {
                return Ok(RouteEnd::Stopped);
            }

            let frames = match self.capture()? {
                Some(0) => continue,
                Some(frames) => frames,
                None => return Ok(RouteEnd::SourceExhausted),
            };

            self.samples.clear();
            decode_into(&self.raw, src.format, &mut self.samples);

            let gain = self.gain.as_mut().map_or(1.0, GainHandle::current);
            let mut peak = 0.0f32;
            for sample in &mut self.samples {
                *sample = (*sample * gain).clamp(-1.0, 1.0);
                peak = peak.max(sample.abs());
            }
            self.state.set_peak(peak);

            let mut converted;
            let out = if convert {
                let resampled =
                    resample(&self.samples, src_channels, src.sample_rate, dst.sample_rate);
                converted = remap_channels(&resampled, src_channels, dst_channels);
                &mut converted
            } else {
                &mut self.samples
            };

            if let Some(effects) = self.effects.as_mut() {
                effects.process(out, dst_channels);
            }

            let written = write_frames(
                self.render.as_mut(),
                &self.stop,
                self.config.render_retry,
                out,
                dst,
            )?;

            let ticks = self.state.ticks.fetch_add(1, Ordering::Relaxed) + 1;
            self.state
                .frames_captured
                .fetch_add(frames as u64, Ordering::Relaxed);
            self.state
                .frames_rendered
                .fetch_add(written as u64, Ordering::Relaxed);
            if ticks % TRACE_EVERY == 0 {
                trace!(ticks, frames, written, gain, peak, "pump tick");
            }
        }
    }

    /// Reads the next block into `self.raw`.
    ///
    /// `Some(0)` means nothing was ready (after a bounded wait), `None` that
    /// a one-shot source is exhausted.
    fn capture(&mut self) -> Result<Option<usize>, RouteError> {
        match &mut self.source {
            CaptureSource::Endpoint(endpoint) => {
                let ready = endpoint.available_frames()?;
                let frames = if ready == 0 {
                    0
                } else {
                    endpoint.read_frames(ready, &mut self.raw)?
                };
                if frames == 0 {
                    endpoint.wait(self.config.capture_wait);
                }
                Ok(Some(frames))
            }
            CaptureSource::Pcm(reader) => {
                if reader.available_frames() == 0 {
                    return Ok(None);
                }
                Ok(Some(reader.read_frames(usize::MAX, &mut self.raw)))
            }
        }
    }

    /// Lets the render buffer play out after a one-shot source ended.
    fn drain(&mut self) -> Result<(), RouteError> {
        let capacity = self.render.buffer_frames();
        let rate = self.render.native_format().sample_rate.max(1);
        let budget =
            Duration::from_secs_f64(capacity as f64 / f64::from(rate)) * 2 + DRAIN_SLACK;
        let deadline = Instant::now() + budget;

        while self.render.available_frames()? < capacity {
            if self.stop.is_stopped() || Instant::now() >= deadline {
                break;
            }
            self.render.wait(self.config.render_retry);
        }
        Ok(())
    }

    /// Stops render, stops capture, closes render, closes capture. Runs once.
    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;

        if let Err(e) = self.render.stop() {
            warn!(endpoint = %self.render.id(), error = %e, "render stop failed");
        }
        if let Err(e) = self.source.stop() {
            warn!(source = ?self.source, error = %e, "capture stop failed");
        }
        self.render.close();
        self.source.close();

        debug!(
            destination = %self.render.id(),
            stats = ?self.state.stats(),
            "route endpoints released"
        );
    }
}

impl Drop for StreamPump {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for StreamPump {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamPump")
            .field("source", &self.source)
            .field("render", self.render.id())
            .field("config", &self.config)
            .field("released", &self.released)
            .finish_non_exhaustive()
    }
}

/// Writes interleaved `samples` to `render`, bounded by its free space.
///
/// Waits `retry` whenever the endpoint is full and gives up early if `stop`
/// fires. Returns the number of frames written.
fn write_frames(
    render: &mut dyn Endpoint,
    stop: &StopToken,
    retry: Duration,
    samples: &[f32],
    format: NativeFormat,
) -> Result<usize, RouteError> {
    let channels = usize::from(format.channels);
    if channels == 0 {
        return Ok(0);
    }
    let total = samples.len() / channels;
    let mut written = 0;

    while written < total {
        if stop.is_stopped() {
            break;
        }

        let free = render.available_frames()?;
        if free == 0 {
            render.wait(retry);
            continue;
        }

        let frames = free.min(total - written);
        let buffer = render.acquire_write_buffer(frames)?;
        from_float(
            &samples[written * channels..(written + frames) * channels],
            format.format,
            buffer,
        );
        render.release_write_buffer(frames)?;
        written += frames;
    }

    Ok(written)
}

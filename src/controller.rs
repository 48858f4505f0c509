//! The control surface: starting and stopping routes, gains and effects.

use std::path::Path;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::config::{Latency, PumpConfig};
use crate::decode::{Decoder, PcmBuffer};
use crate::effects::{EffectProgram, EffectSlot};
use crate::endpoint::{is_valid_app_name, Direction, EndpointBackend, EndpointId, EndpointInfo};
use crate::event::{event_callback, EventCallback, RouteEvent};
use crate::gain::{GainHandle, GainRegistry};
use crate::pipeline::{CaptureSource, PcmReader, StopSignal, StopToken, StreamPump};
use crate::route::{RouteEnd, RouteHandle, RouteId, RouteKind, RouteState, RouteStatus};
use crate::{DecodeFailure, RouteError};

/// Starts and stops routes over one endpoint backend.
///
/// Each `start_*` call resolves its endpoints synchronously, so
/// configuration, decode and feedback errors are returned before any thread
/// exists. On success the route runs on its own thread until
/// [`stop_all()`](Self::stop_all), the end of a playback file, or a device
/// error; the returned [`RouteHandle`] reports which.
///
/// Endpoint names that do not resolve fall back to the system default for
/// that direction. Only when there is no default either does the call fail.
///
/// Dropping the controller stops every route it started.
///
/// # Example
///
/// ```
/// use route_audio::{
///     Direction, MockBackend, MockEndpoint, NativeFormat, RouteController, RouteEnd,
///     RouteStatus, SampleFormat,
/// };
///
/// let format = NativeFormat::new(48000, 2, SampleFormat::F32);
/// let backend = MockBackend::new();
/// backend.add(MockEndpoint::capture("mic", format).samples(vec![0.5; 960]).looping());
/// backend.add(MockEndpoint::render("speakers", format));
/// backend.set_default(Direction::Render, "speakers");
///
/// let controller = RouteController::new(backend.clone());
/// controller.set_gain("mic", 0.5);
///
/// let route = controller.start_device_route("mic", "", false, "mic").unwrap();
/// controller.stop_all();
///
/// assert!(matches!(route.join(), RouteStatus::Finished(RouteEnd::Stopped)));
/// assert_eq!(backend.open_handles(), 0);
/// ```
pub struct RouteController {
    backend: Arc<dyn EndpointBackend>,
    decoder: Option<Arc<dyn Decoder>>,
    gains: Arc<GainRegistry>,
    effects: Arc<EffectSlot>,
    stop: Arc<StopSignal>,
    active: Arc<AtomicUsize>,
    next_id: AtomicU64,
    event_callback: Option<EventCallback>,
}

impl RouteController {
    /// Creates a controller over `backend`.
    ///
    /// With the `symphonia-decoder` feature, playback files are decoded by
    /// [`SymphoniaDecoder`](crate::SymphoniaDecoder).
    pub fn new(backend: impl EndpointBackend + 'static) -> Self {
        Self {
            backend: Arc::new(backend),
            decoder: default_decoder(),
            gains: Arc::new(GainRegistry::new()),
            effects: Arc::new(EffectSlot::new()),
            stop: StopSignal::shared(),
            active: Arc::new(AtomicUsize::new(0)),
            next_id: AtomicU64::new(0),
            event_callback: None,
        }
    }

    /// Replaces the decoder used by [`start_playback()`](Self::start_playback).
    #[must_use]
    pub fn with_decoder(mut self, decoder: impl Decoder + 'static) -> Self {
        self.decoder = Some(Arc::new(decoder));
        self
    }

    /// Sets a callback for route events.
    ///
    /// [`RouteEvent::FellBackToDefault`] is delivered on the thread calling
    /// `start_*`; every other event on the route's own thread. The callback
    /// must not block.
    #[must_use]
    pub fn on_event<F>(mut self, callback: F) -> Self
    where
        F: Fn(RouteEvent) + Send + Sync + 'static,
    {
        self.event_callback = Some(event_callback(callback));
        self
    }

    /// Plays a file once on `destination`.
    ///
    /// The file is decoded before anything else happens. Playback runs at
    /// unity gain and ends with [`RouteEnd::SourceExhausted`] unless
    /// stopped first.
    pub fn start_playback(
        &self,
        file: impl AsRef<Path>,
        destination: &str,
        low_latency: bool,
    ) -> Result<RouteHandle, RouteError> {
        let path = file.as_ref();
        let decoder = self
            .decoder
            .as_ref()
            .ok_or_else(|| RouteError::decode(path, DecodeFailure::UnsupportedFormat))?;
        let buffer = decoder.decode(path)?;
        let destination = self.resolve(Direction::Render, destination)?;

        self.spawn(RoutePlan {
            kind: RouteKind::Playback,
            source: PlanSource::Pcm {
                buffer,
                label: path.display().to_string(),
            },
            destination,
            latency: Latency::from_flag(low_latency),
            gain_key: None,
        })
    }

    /// Streams a capture device to a render device until stopped.
    pub fn start_device_route(
        &self,
        source: &str,
        destination: &str,
        low_latency: bool,
        gain_key: &str,
    ) -> Result<RouteHandle, RouteError> {
        let source = self.resolve(Direction::Capture, source)?;
        let destination = self.resolve(Direction::Render, destination)?;

        self.spawn(RoutePlan {
            kind: RouteKind::Device,
            source: PlanSource::Endpoint(source),
            destination,
            latency: Latency::from_flag(low_latency),
            gain_key: Some(gain_key.to_string()),
        })
    }

    /// Streams one application's own audio to a render device until stopped.
    ///
    /// Fails with [`RouteError::FeedbackRisk`] if the application already
    /// plays on the destination endpoint.
    pub fn start_app_route(
        &self,
        app: &str,
        destination: &str,
        low_latency: bool,
        gain_key: &str,
    ) -> Result<RouteHandle, RouteError> {
        let not_found = || RouteError::AppNotFound {
            app: app.to_string(),
        };
        if !is_valid_app_name(app) {
            return Err(not_found());
        }
        let session = self.backend.find_app_session(app).ok_or_else(not_found)?;
        let destination = self.resolve(Direction::Render, destination)?;

        if session.device == destination {
            warn!(app, endpoint = %destination, "app route rejected, source plays on destination");
            return Err(RouteError::FeedbackRisk {
                endpoint: destination,
            });
        }

        self.spawn(RoutePlan {
            kind: RouteKind::App,
            source: PlanSource::Endpoint(session.session),
            destination,
            latency: Latency::from_flag(low_latency),
            gain_key: Some(gain_key.to_string()),
        })
    }

    /// Stops every route running at the time of the call.
    ///
    /// Returns immediately; use the route handles to wait for them.
    pub fn stop_all(&self) {
        info!(active = self.active_routes(), "stopping all routes");
        self.stop.stop_all();
    }

    /// Sets the gain multiplier for `key`.
    pub fn set_gain(&self, key: &str, value: f32) {
        self.gains.set(key, value);
    }

    /// Gain multiplier for `key`; `0.0` if never set.
    pub fn gain(&self, key: &str) -> f32 {
        self.gains.get(key)
    }

    /// Forgets every gain; running routes fall silent.
    pub fn clear_gains(&self) {
        self.gains.clear();
    }

    /// The shared gain registry.
    pub fn gains(&self) -> &Arc<GainRegistry> {
        &self.gains
    }

    /// Parses and installs an effect program for all routes.
    ///
    /// A malformed program is rejected and the installed one stays.
    pub fn init_effect_chain(&self, program: &str, sample_rate: u32) -> Result<(), RouteError> {
        let program = EffectProgram::parse(program, sample_rate)?;
        info!(stages = program.len(), sample_rate, "effect chain installed");
        self.effects.install(program);
        Ok(())
    }

    /// Removes the installed effect program.
    pub fn clear_effect_chain(&self) {
        self.effects.clear();
    }

    /// Number of route threads still running.
    pub fn active_routes(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Lists endpoints in one direction.
    pub fn list_endpoints(&self, direction: Direction) -> Result<Vec<EndpointInfo>, RouteError> {
        self.backend.list_endpoints(direction)
    }

    /// Applications usable with [`start_app_route()`](Self::start_app_route).
    pub fn list_apps(&self) -> Vec<String> {
        let mut apps: Vec<String> = self
            .backend
            .list_apps()
            .into_iter()
            .filter(|app| is_valid_app_name(app))
            .collect();
        apps.sort();
        apps.dedup();
        apps
    }

    fn resolve(&self, direction: Direction, name: &str) -> Result<EndpointId, RouteError> {
        let name = name.trim();
        if !name.is_empty() {
            if let Some(id) = self.backend.find_endpoint(direction, name) {
                return Ok(id);
            }
        }

        let fallback = self.backend.default_endpoint(direction).ok_or_else(|| {
            RouteError::EndpointUnresolved {
                direction,
                name: name.to_string(),
            }
        })?;

        if !name.is_empty() {
            warn!(requested = name, %direction, used = %fallback, "endpoint not found, using system default");
            self.emit(RouteEvent::FellBackToDefault {
                requested: name.to_string(),
                direction,
                used: fallback.clone(),
            });
        }
        Ok(fallback)
    }

    fn spawn(&self, plan: RoutePlan) -> Result<RouteHandle, RouteError> {
        let id = RouteId::new(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        let kind = plan.kind;
        let destination = plan.destination.clone();
        let state = Arc::new(RouteState::new());
        let (status_tx, status_rx) = watch::channel(RouteStatus::Running);

        info!(
            route = %id,
            ?kind,
            source = %plan.source.label(),
            destination = %plan.destination,
            latency = ?plan.latency,
            gain_key = plan.gain_key.as_deref(),
            "starting route"
        );

        let source = plan.source;
        let worker = RouteWorker {
            id,
            config: PumpConfig::for_latency(plan.latency),
            gain: plan.gain_key.map(|key| self.gains.handle(key)),
            destination: plan.destination,
            backend: Arc::clone(&self.backend),
            effects: Arc::clone(&self.effects),
            // Taken here, not on the thread, so a stop_all right after this call applies
            stop: self.stop.token(),
            state: Arc::clone(&state),
            status: status_tx,
            active: Arc::clone(&self.active),
            event_callback: self.event_callback.clone(),
        };

        self.active.fetch_add(1, Ordering::SeqCst);
        let thread = std::thread::Builder::new()
            .name(id.to_string())
            .spawn(move || worker.run(source))
            .map_err(|e| {
                self.active.fetch_sub(1, Ordering::SeqCst);
                RouteError::device(&destination, format!("cannot spawn route thread: {e}"))
            })?;

        Ok(RouteHandle::new(id, kind, state, status_rx, thread))
    }

    fn emit(&self, event: RouteEvent) {
        if let Some(callback) = &self.event_callback {
            callback(event);
        }
    }
}

impl Drop for RouteController {
    fn drop(&mut self) {
        if self.active_routes() > 0 {
            self.stop.stop_all();
        }
    }
}

impl std::fmt::Debug for RouteController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteController")
            .field("backend", &self.backend.name())
            .field("gains", &self.gains.len())
            .field("effects", &self.effects.current().map(|p| p.len()))
            .field("active_routes", &self.active_routes())
            .finish_non_exhaustive()
    }
}

#[cfg(feature = "symphonia-decoder")]
fn default_decoder() -> Option<Arc<dyn Decoder>> {
    Some(Arc::new(crate::SymphoniaDecoder::new()))
}

#[cfg(not(feature = "symphonia-decoder"))]
fn default_decoder() -> Option<Arc<dyn Decoder>> {
    None
}

/// A route whose endpoints are resolved but not yet opened.
struct RoutePlan {
    kind: RouteKind,
    source: PlanSource,
    destination: EndpointId,
    latency: Latency,
    gain_key: Option<String>,
}

enum PlanSource {
    Endpoint(EndpointId),
    Pcm { buffer: PcmBuffer, label: String },
}

impl PlanSource {
    fn label(&self) -> String {
        match self {
            Self::Endpoint(id) => id.to_string(),
            Self::Pcm { label, .. } => label.clone(),
        }
    }
}

/// Everything a route thread owns.
struct RouteWorker {
    id: RouteId,
    config: PumpConfig,
    gain: Option<GainHandle>,
    destination: EndpointId,
    backend: Arc<dyn EndpointBackend>,
    effects: Arc<EffectSlot>,
    stop: StopToken,
    state: Arc<RouteState>,
    status: watch::Sender<RouteStatus>,
    active: Arc<AtomicUsize>,
    event_callback: Option<EventCallback>,
}

impl RouteWorker {
    fn run(mut self, source: PlanSource) {
        let status = match self.stream(source) {
            Ok(end) => {
                info!(route = %self.id, ?end, stats = ?self.state.stats(), "route finished");
                self.emit(RouteEvent::Finished { route: self.id, end });
                RouteStatus::Finished(end)
            }
            Err(error) => {
                error!(route = %self.id, %error, "route aborted");
                self.emit(RouteEvent::Failed {
                    route: self.id,
                    error: error.clone(),
                });
                RouteStatus::Failed(error)
            }
        };

        self.state.running.store(false, Ordering::SeqCst);
        self.status.send_replace(status);
        self.active.fetch_sub(1, Ordering::SeqCst);
    }

    /// Opens capture then render on this thread and pumps until the route ends.
    fn stream(&mut self, source: PlanSource) -> Result<RouteEnd, RouteError> {
        let label = source.label();
        let mut capture = match source {
            PlanSource::Endpoint(id) => {
                CaptureSource::Endpoint(self.backend.open(&id, Direction::Capture, &self.config)?)
            }
            PlanSource::Pcm { buffer, .. } => {
                CaptureSource::Pcm(PcmReader::new(buffer, self.config.chunk_frames))
            }
        };
        let render = match self
            .backend
            .open(&self.destination, Direction::Render, &self.config)
        {
            Ok(render) => render,
            Err(e) => {
                capture.close();
                return Err(e);
            }
        };

        self.emit(RouteEvent::Started {
            route: self.id,
            source: label,
            destination: self.destination.clone(),
        });

        let mut pump = StreamPump::new(capture, render, self.config.clone())
            .with_effects(Arc::clone(&self.effects))
            .with_stop(self.stop.clone())
            .with_state(Arc::clone(&self.state));
        if let Some(gain) = self.gain.take() {
            pump = pump.with_gain(gain);
        }
        pump.run()
    }

    fn emit(&self, event: RouteEvent) {
        if let Some(callback) = &self.event_callback {
            callback(event);
        }
    }
}

//! In-memory endpoint backend for testing without hardware.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};

use super::{AppSession, Direction, Endpoint, EndpointBackend, EndpointId, EndpointInfo};
use crate::config::PumpConfig;
use crate::format::{decode_into, encode, NativeFormat};
use crate::RouteError;

/// Render capacity used when none is configured.
const DEFAULT_RENDER_CAPACITY: usize = 4096;

/// Capture packet size used when none is configured.
const DEFAULT_PACKET_FRAMES: usize = 480;

/// Description of one mock endpoint.
///
/// Capture endpoints replay scripted samples in fixed-size packets.
/// Render endpoints have a fixed capacity that only drains while the pump
/// waits, which makes backpressure deterministic.
///
/// # Example
///
/// ```
/// use route_audio::{MockEndpoint, NativeFormat, SampleFormat};
///
/// let mic = MockEndpoint::capture("mic", NativeFormat::new(48000, 1, SampleFormat::I16))
///     .samples(vec![0.25; 4800])
///     .packet_frames(480)
///     .looping();
///
/// let speakers = MockEndpoint::render("speakers", NativeFormat::new(48000, 2, SampleFormat::F32))
///     .capacity(1024)
///     .drain_per_wait(256);
/// ```
#[derive(Debug, Clone)]
#[must_use]
pub struct MockEndpoint {
    id: EndpointId,
    display_name: String,
    direction: Direction,
    format: NativeFormat,
    samples: Vec<f32>,
    packet_frames: usize,
    looping: bool,
    capacity: usize,
    drain_per_wait: usize,
    fail_open: bool,
    fail_acquire_after: Option<usize>,
}

impl MockEndpoint {
    /// A capture endpoint with no data.
    pub fn capture(id: impl Into<EndpointId>, format: NativeFormat) -> Self {
        Self::new(id.into(), Direction::Capture, format)
    }

    /// A render endpoint with the default capacity that drains fully on every wait.
    pub fn render(id: impl Into<EndpointId>, format: NativeFormat) -> Self {
        Self::new(id.into(), Direction::Render, format)
    }

    fn new(id: EndpointId, direction: Direction, format: NativeFormat) -> Self {
        Self {
            display_name: id.to_string(),
            id,
            direction,
            format,
            samples: Vec::new(),
            packet_frames: DEFAULT_PACKET_FRAMES,
            looping: false,
            capacity: DEFAULT_RENDER_CAPACITY,
            drain_per_wait: usize::MAX,
            fail_open: false,
            fail_acquire_after: None,
        }
    }

    /// Sets the display name (defaults to the id).
    pub fn display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = name.into();
        self
    }

    /// Interleaved samples a capture endpoint delivers.
    pub fn samples(mut self, samples: Vec<f32>) -> Self {
        self.samples = samples;
        self
    }

    /// Maximum frames a capture endpoint reports per poll.
    pub fn packet_frames(mut self, frames: usize) -> Self {
        self.packet_frames = frames.max(1);
        self
    }

    /// Restarts the capture data from the beginning when it runs out.
    pub fn looping(mut self) -> Self {
        self.looping = true;
        self
    }

    /// Render buffer capacity in frames.
    pub fn capacity(mut self, frames: usize) -> Self {
        self.capacity = frames;
        self
    }

    /// Frames a render endpoint plays out per [`Endpoint::wait`] call.
    pub fn drain_per_wait(mut self, frames: usize) -> Self {
        self.drain_per_wait = frames;
        self
    }

    /// Makes `open` fail with a device error.
    pub fn fail_on_open(mut self) -> Self {
        self.fail_open = true;
        self
    }

    /// Makes buffer acquisition fail after `count` successful acquires.
    pub fn fail_acquire_after(mut self, count: usize) -> Self {
        self.fail_acquire_after = Some(count);
        self
    }

    fn info(&self) -> EndpointInfo {
        EndpointInfo::new(self.id.clone(), self.display_name.clone())
    }
}

/// One entry in the [`MockBackend`] lifecycle log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lifecycle {
    /// `open` returned a handle.
    Opened(EndpointId),
    /// `start` was called.
    Started(EndpointId),
    /// `stop` was called.
    Stopped(EndpointId),
    /// `close` released the handle.
    Closed(EndpointId),
}

#[derive(Debug, Default)]
struct MockState {
    endpoints: Vec<MockEndpoint>,
    sessions: Vec<(AppSession, MockEndpoint)>,
    defaults: HashMap<Direction, EndpointId>,
    log: Vec<Lifecycle>,
    rendered: HashMap<EndpointId, Vec<f32>>,
    overruns: usize,
}

impl MockState {
    fn find(&self, id: &EndpointId, direction: Direction) -> Option<&MockEndpoint> {
        self.endpoints
            .iter()
            .chain(self.sessions.iter().map(|(_, endpoint)| endpoint))
            .find(|e| &e.id == id && e.direction == direction)
    }

    fn count(&self, matches: impl Fn(&Lifecycle) -> bool) -> usize {
        self.log.iter().filter(|event| matches(event)).count()
    }
}

/// Backend of scripted in-memory endpoints.
///
/// Cloning shares the same state, so a test can keep a clone for
/// inspection while the controller owns another.
///
/// # Example
///
/// ```
/// use route_audio::{Direction, EndpointBackend, MockBackend, MockEndpoint, NativeFormat, SampleFormat};
///
/// let format = NativeFormat::new(48000, 2, SampleFormat::F32);
/// let backend = MockBackend::new();
/// backend.add(MockEndpoint::render("speakers", format));
/// backend.set_default(Direction::Render, "speakers");
///
/// assert_eq!(backend.default_endpoint(Direction::Render).unwrap().as_str(), "speakers");
/// assert_eq!(backend.open_handles(), 0);
/// ```
#[derive(Debug, Clone, Default)]
pub struct MockBackend {
    state: Arc<Mutex<MockState>>,
}

impl MockBackend {
    /// Creates a backend with no endpoints.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an endpoint.
    pub fn add(&self, endpoint: MockEndpoint) -> &Self {
        self.state.lock().endpoints.push(endpoint);
        self
    }

    /// Sets the system default for a direction.
    pub fn set_default(&self, direction: Direction, id: impl Into<EndpointId>) -> &Self {
        self.state.lock().defaults.insert(direction, id.into());
        self
    }

    /// Registers a running application whose session plays on `device`.
    ///
    /// `session` must be a capture endpoint; it is reachable only through
    /// [`find_app_session`](EndpointBackend::find_app_session).
    pub fn add_app(&self, app: &str, session: MockEndpoint, device: impl Into<EndpointId>) -> &Self {
        let entry = AppSession {
            app: app.to_string(),
            session: session.id.clone(),
            device: device.into(),
        };
        self.state.lock().sessions.push((entry, session));
        self
    }

    /// Ordered open/start/stop/close log.
    pub fn lifecycle(&self) -> Vec<Lifecycle> {
        self.state.lock().log.clone()
    }

    /// Number of successful opens.
    pub fn open_count(&self) -> usize {
        self.state
            .lock()
            .count(|e| matches!(e, Lifecycle::Opened(_)))
    }

    /// Number of handles released.
    pub fn close_count(&self) -> usize {
        self.state
            .lock()
            .count(|e| matches!(e, Lifecycle::Closed(_)))
    }

    /// Handles opened but not yet closed.
    pub fn open_handles(&self) -> usize {
        let state = self.state.lock();
        let opened = state.count(|e| matches!(e, Lifecycle::Opened(_)));
        let closed = state.count(|e| matches!(e, Lifecycle::Closed(_)));
        opened.saturating_sub(closed)
    }

    /// Number of `start` calls.
    pub fn start_count(&self) -> usize {
        self.state
            .lock()
            .count(|e| matches!(e, Lifecycle::Started(_)))
    }

    /// Number of `stop` calls.
    pub fn stop_count(&self) -> usize {
        self.state
            .lock()
            .count(|e| matches!(e, Lifecycle::Stopped(_)))
    }

    /// Everything written to a render endpoint so far, as normalized samples.
    pub fn rendered(&self, id: impl Into<EndpointId>) -> Vec<f32> {
        self.state
            .lock()
            .rendered
            .get(&id.into())
            .cloned()
            .unwrap_or_default()
    }

    /// Number of write requests that exceeded the free space.
    pub fn overruns(&self) -> usize {
        self.state.lock().overruns
    }

    fn record(&self, event: Lifecycle) {
        self.state.lock().log.push(event);
    }
}

impl EndpointBackend for MockBackend {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn list_endpoints(&self, direction: Direction) -> Result<Vec<EndpointInfo>, RouteError> {
        Ok(self
            .state
            .lock()
            .endpoints
            .iter()
            .filter(|e| e.direction == direction)
            .map(MockEndpoint::info)
            .collect())
    }

    fn default_endpoint(&self, direction: Direction) -> Option<EndpointId> {
        self.state.lock().defaults.get(&direction).cloned()
    }

    fn list_apps(&self) -> Vec<String> {
        self.state
            .lock()
            .sessions
            .iter()
            .map(|(session, _)| session.app.clone())
            .collect()
    }

    fn find_app_session(&self, app: &str) -> Option<AppSession> {
        self.state
            .lock()
            .sessions
            .iter()
            .find(|(session, _)| session.app == app)
            .map(|(session, _)| session.clone())
    }

    fn open(
        &self,
        id: &EndpointId,
        direction: Direction,
        _config: &PumpConfig,
    ) -> Result<Box<dyn Endpoint>, RouteError> {
        let spec = self
            .state
            .lock()
            .find(id, direction)
            .cloned()
            .ok_or_else(|| RouteError::device(id, format!("no mock {direction} endpoint")))?;

        if spec.fail_open {
            return Err(RouteError::device(id, "activation failed"));
        }

        let endpoint: Box<dyn Endpoint> = match direction {
            Direction::Capture => Box::new(MockCapture::new(spec, self.clone())),
            Direction::Render => Box::new(MockRender::new(spec, self.clone())),
        };
        self.record(Lifecycle::Opened(id.clone()));
        Ok(endpoint)
    }
}

/// Shared start/stop/close bookkeeping for both mock handle kinds.
struct Handle {
    id: EndpointId,
    backend: MockBackend,
    closed: bool,
}

impl Handle {
    fn start(&mut self) -> Result<(), RouteError> {
        if self.closed {
            return Err(RouteError::device(&self.id, "start on closed handle"));
        }
        self.backend.record(Lifecycle::Started(self.id.clone()));
        Ok(())
    }

    fn stop(&mut self) -> Result<(), RouteError> {
        self.backend.record(Lifecycle::Stopped(self.id.clone()));
        Ok(())
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.backend.record(Lifecycle::Closed(self.id.clone()));
        }
    }
}

struct MockCapture {
    handle: Handle,
    format: NativeFormat,
    data: Vec<u8>,
    producer: HeapProd<u8>,
    consumer: HeapCons<u8>,
    packet_frames: usize,
    looping: bool,
}

impl MockCapture {
    fn new(spec: MockEndpoint, backend: MockBackend) -> Self {
        let data = encode(&spec.samples, spec.format.format);
        let (mut producer, consumer) = HeapRb::<u8>::new(data.len().max(1)).split();
        producer.push_slice(&data);

        Self {
            handle: Handle {
                id: spec.id,
                backend,
                closed: false,
            },
            format: spec.format,
            data,
            producer,
            consumer,
            packet_frames: spec.packet_frames,
            looping: spec.looping,
        }
    }
}

impl Endpoint for MockCapture {
    fn id(&self) -> &EndpointId {
        &self.handle.id
    }

    fn direction(&self) -> Direction {
        Direction::Capture
    }

    fn native_format(&self) -> NativeFormat {
        self.format
    }

    fn buffer_frames(&self) -> usize {
        self.consumer.capacity().get() / self.format.bytes_per_frame()
    }

    fn available_frames(&mut self) -> Result<usize, RouteError> {
        if self.handle.closed {
            return Err(RouteError::device(&self.handle.id, "read on closed handle"));
        }
        if self.looping && self.consumer.is_empty() {
            self.producer.push_slice(&self.data);
        }
        let frames = self.consumer.occupied_len() / self.format.bytes_per_frame();
        Ok(frames.min(self.packet_frames))
    }

    fn read_frames(&mut self, max_frames: usize, out: &mut Vec<u8>) -> Result<usize, RouteError> {
        let frames = self.available_frames()?.min(max_frames);
        out.clear();
        out.resize(frames * self.format.bytes_per_frame(), 0);
        self.consumer.pop_slice(out);
        Ok(frames)
    }

    fn acquire_write_buffer(&mut self, _frames: usize) -> Result<&mut [u8], RouteError> {
        Err(RouteError::device(&self.handle.id, "capture endpoint is read-only"))
    }

    fn release_write_buffer(&mut self, _frames: usize) -> Result<(), RouteError> {
        Err(RouteError::device(&self.handle.id, "capture endpoint is read-only"))
    }

    fn start(&mut self) -> Result<(), RouteError> {
        self.handle.start()
    }

    fn stop(&mut self) -> Result<(), RouteError> {
        self.handle.stop()
    }

    fn close(&mut self) {
        self.handle.close();
    }
}

struct MockRender {
    handle: Handle,
    format: NativeFormat,
    capacity: usize,
    pending: usize,
    drain_per_wait: usize,
    fail_acquire_after: Option<usize>,
    acquired: usize,
    scratch: Vec<u8>,
}

impl MockRender {
    fn new(spec: MockEndpoint, backend: MockBackend) -> Self {
        Self {
            handle: Handle {
                id: spec.id,
                backend,
                closed: false,
            },
            format: spec.format,
            capacity: spec.capacity,
            pending: 0,
            drain_per_wait: spec.drain_per_wait,
            fail_acquire_after: spec.fail_acquire_after,
            acquired: 0,
            scratch: Vec::new(),
        }
    }
}

impl Endpoint for MockRender {
    fn id(&self) -> &EndpointId {
        &self.handle.id
    }

    fn direction(&self) -> Direction {
        Direction::Render
    }

    fn native_format(&self) -> NativeFormat {
        self.format
    }

    fn buffer_frames(&self) -> usize {
        self.capacity
    }

    fn available_frames(&mut self) -> Result<usize, RouteError> {
        if self.handle.closed {
            return Err(RouteError::device(&self.handle.id, "write on closed handle"));
        }
        Ok(self.capacity - self.pending)
    }

    fn wait(&mut self, timeout: Duration) {
        std::thread::sleep(timeout);
        self.pending = self.pending.saturating_sub(self.drain_per_wait);
    }

    fn read_frames(&mut self, _max_frames: usize, _out: &mut Vec<u8>) -> Result<usize, RouteError> {
        Err(RouteError::device(&self.handle.id, "render endpoint is write-only"))
    }

    fn acquire_write_buffer(&mut self, frames: usize) -> Result<&mut [u8], RouteError> {
        if frames > self.capacity - self.pending {
            self.handle.backend.state.lock().overruns += 1;
            return Err(RouteError::device(&self.handle.id, "buffer overrun"));
        }
        if self.fail_acquire_after.is_some_and(|limit| self.acquired >= limit) {
            return Err(RouteError::device(&self.handle.id, "buffer acquire failed"));
        }

        self.acquired += 1;
        self.scratch.clear();
        self.scratch.resize(frames * self.format.bytes_per_frame(), 0);
        Ok(&mut self.scratch)
    }

    fn release_write_buffer(&mut self, frames: usize) -> Result<(), RouteError> {
        let bytes = (frames * self.format.bytes_per_frame()).min(self.scratch.len());
        let mut state = self.handle.backend.state.lock();
        let rendered = state.rendered.entry(self.handle.id.clone()).or_default();
        decode_into(&self.scratch[..bytes], self.format.format, rendered);
        self.pending += frames;
        Ok(())
    }

    fn start(&mut self) -> Result<(), RouteError> {
        self.handle.start()
    }

    fn stop(&mut self) -> Result<(), RouteError> {
        self.handle.stop()
    }

    fn close(&mut self) {
        self.handle.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::SampleFormat;

    fn mono_i16() -> NativeFormat {
        NativeFormat::new(48000, 1, SampleFormat::I16)
    }

    #[test]
    fn test_capture_delivers_packets() {
        let backend = MockBackend::new();
        backend.add(
            MockEndpoint::capture("mic", mono_i16())
                .samples(vec![0.5; 10])
                .packet_frames(4),
        );

        let mut mic = backend
            .open(&"mic".into(), Direction::Capture, &PumpConfig::default())
            .unwrap();
        let mut bytes = Vec::new();

        assert_eq!(mic.available_frames().unwrap(), 4);
        assert_eq!(mic.read_frames(100, &mut bytes).unwrap(), 4);
        assert_eq!(bytes.len(), 8);
        assert_eq!(mic.read_frames(4, &mut bytes).unwrap(), 4);
        assert_eq!(mic.read_frames(4, &mut bytes).unwrap(), 2);
        assert_eq!(mic.available_frames().unwrap(), 0);
    }

    #[test]
    fn test_looping_capture_refills() {
        let backend = MockBackend::new();
        backend.add(
            MockEndpoint::capture("mic", mono_i16())
                .samples(vec![0.5; 4])
                .packet_frames(4)
                .looping(),
        );

        let mut mic = backend
            .open(&"mic".into(), Direction::Capture, &PumpConfig::default())
            .unwrap();
        let mut bytes = Vec::new();
        for _ in 0..3 {
            assert_eq!(mic.read_frames(4, &mut bytes).unwrap(), 4);
        }
    }

    #[test]
    fn test_render_backpressure_and_drain() {
        let format = NativeFormat::new(48000, 2, SampleFormat::F32);
        let backend = MockBackend::new();
        backend.add(MockEndpoint::render("spk", format).capacity(8).drain_per_wait(3));

        let mut spk = backend
            .open(&"spk".into(), Direction::Render, &PumpConfig::default())
            .unwrap();
        assert_eq!(spk.available_frames().unwrap(), 8);

        let buf = spk.acquire_write_buffer(8).unwrap();
        assert_eq!(buf.len(), 64);
        spk.release_write_buffer(8).unwrap();
        assert_eq!(spk.available_frames().unwrap(), 0);

        assert!(spk.acquire_write_buffer(1).is_err());
        assert_eq!(backend.overruns(), 1);

        spk.wait(Duration::from_millis(1));
        assert_eq!(spk.available_frames().unwrap(), 3);
        assert_eq!(backend.rendered("spk").len(), 16);
    }

    #[test]
    fn test_acquire_failure_injection() {
        let format = NativeFormat::new(48000, 1, SampleFormat::F32);
        let backend = MockBackend::new();
        backend.add(MockEndpoint::render("spk", format).fail_acquire_after(1));

        let mut spk = backend
            .open(&"spk".into(), Direction::Render, &PumpConfig::default())
            .unwrap();
        assert!(spk.acquire_write_buffer(1).is_ok());
        spk.release_write_buffer(1).unwrap();
        assert!(spk.acquire_write_buffer(1).is_err());
    }

    #[test]
    fn test_lifecycle_counts() {
        let backend = MockBackend::new();
        backend.add(MockEndpoint::capture("mic", mono_i16()));

        let mut mic = backend
            .open(&"mic".into(), Direction::Capture, &PumpConfig::default())
            .unwrap();
        assert_eq!(backend.open_handles(), 1);

        mic.start().unwrap();
        mic.stop().unwrap();
        mic.close();
        mic.close();

        assert_eq!(backend.open_handles(), 0);
        assert_eq!(backend.close_count(), 1);
        assert_eq!(
            backend.lifecycle(),
            vec![
                Lifecycle::Opened("mic".into()),
                Lifecycle::Started("mic".into()),
                Lifecycle::Stopped("mic".into()),
                Lifecycle::Closed("mic".into()),
            ]
        );
    }

    #[test]
    fn test_open_failures() {
        let backend = MockBackend::new();
        backend.add(MockEndpoint::render("broken", mono_i16()).fail_on_open());

        let config = PumpConfig::default();
        assert!(backend.open(&"broken".into(), Direction::Render, &config).is_err());
        assert!(backend.open(&"missing".into(), Direction::Render, &config).is_err());
        assert_eq!(backend.open_count(), 0);
    }

    #[test]
    fn test_app_sessions() {
        let backend = MockBackend::new();
        backend.add_app("Spotify", MockEndpoint::capture("spotify-loopback", mono_i16()), "spk");

        let session = backend.find_app_session("Spotify").unwrap();
        assert_eq!(session.session.as_str(), "spotify-loopback");
        assert_eq!(session.device.as_str(), "spk");
        assert!(backend.find_app_session("Discord").is_none());
        assert_eq!(backend.list_apps(), vec!["Spotify".to_string()]);
        assert!(backend.list_endpoints(Direction::Capture).unwrap().is_empty());
    }
}

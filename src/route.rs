//! Route handles and telemetry.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use tokio::sync::watch;

use crate::RouteError;

/// Identifier of one started route, unique per controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RouteId(u64);

impl RouteId {
    /// Wraps a raw id.
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// The raw id.
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for RouteId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "route-{}", self.0)
    }
}

/// What a route moves audio from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteKind {
    /// A decoded file, played once.
    Playback,
    /// A capture device.
    Device,
    /// An application's own audio session.
    App,
}

/// Why a route ended without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteEnd {
    /// The stop signal was observed.
    Stopped,
    /// A one-shot playback reached the end of its file.
    SourceExhausted,
}

/// Current state of a route.
#[derive(Debug, Clone)]
pub enum RouteStatus {
    /// The route thread is streaming.
    Running,
    /// The route ended and released its endpoints.
    Finished(RouteEnd),
    /// The route aborted on an error and released its endpoints.
    Failed(RouteError),
}

impl RouteStatus {
    /// Returns `true` while the route is streaming.
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }
}

/// Snapshot of a route's counters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RouteStats {
    /// Pump iterations that moved audio.
    pub ticks: u64,
    /// Frames read from the capture side.
    pub frames_captured: u64,
    /// Frames written to the render side.
    pub frames_rendered: u64,
    /// Absolute peak of the last tick, after gain.
    pub peak: f32,
}

/// Counters shared between a route thread and its handle.
#[derive(Debug)]
pub(crate) struct RouteState {
    pub running: AtomicBool,
    pub ticks: AtomicU64,
    pub frames_captured: AtomicU64,
    pub frames_rendered: AtomicU64,
    /// f32 bits
    peak: AtomicU32,
}

impl RouteState {
    pub fn new() -> Self {
        Self {
            running: AtomicBool::new(true),
            ticks: AtomicU64::new(0),
            frames_captured: AtomicU64::new(0),
            frames_rendered: AtomicU64::new(0),
            peak: AtomicU32::new(0),
        }
    }

    pub fn set_peak(&self, peak: f32) {
        self.peak.store(peak.to_bits(), Ordering::Relaxed);
    }

    pub fn stats(&self) -> RouteStats {
        RouteStats {
            ticks: self.ticks.load(Ordering::Relaxed),
            frames_captured: self.frames_captured.load(Ordering::Relaxed),
            frames_rendered: self.frames_rendered.load(Ordering::Relaxed),
            peak: f32::from_bits(self.peak.load(Ordering::Relaxed)),
        }
    }
}

/// Handle to a started route.
///
/// Routes are stopped through
/// [`RouteController::stop_all()`](crate::RouteController::stop_all);
/// the handle observes them. Dropping the handle detaches from the route
/// without stopping it.
///
/// # Example
///
/// ```ignore
/// let mut route = controller.start_device_route("USB Mic", "Speakers", false, "mic")?;
///
/// // Streams in the background...
/// controller.stop_all();
///
/// match route.finished().await {
///     RouteStatus::Finished(end) => println!("ended: {end:?}"),
///     RouteStatus::Failed(e) => eprintln!("failed: {e}"),
///     RouteStatus::Running => unreachable!(),
/// }
/// ```
#[derive(Debug)]
pub struct RouteHandle {
    id: RouteId,
    kind: RouteKind,
    state: Arc<RouteState>,
    status: watch::Receiver<RouteStatus>,
    thread: Option<JoinHandle<()>>,
}

impl RouteHandle {
    pub(crate) fn new(
        id: RouteId,
        kind: RouteKind,
        state: Arc<RouteState>,
        status: watch::Receiver<RouteStatus>,
        thread: JoinHandle<()>,
    ) -> Self {
        Self {
            id,
            kind,
            state,
            status,
            thread: Some(thread),
        }
    }

    /// The route's id.
    pub fn id(&self) -> RouteId {
        self.id
    }

    /// The route's kind.
    pub fn kind(&self) -> RouteKind {
        self.kind
    }

    /// Current status.
    pub fn status(&self) -> RouteStatus {
        self.status.borrow().clone()
    }

    /// Returns `true` while the route thread is streaming.
    pub fn is_running(&self) -> bool {
        self.state.running.load(Ordering::SeqCst)
    }

    /// Current counters.
    pub fn stats(&self) -> RouteStats {
        self.state.stats()
    }

    /// Blocks until the route thread exits and returns its final status.
    pub fn join(mut self) -> RouteStatus {
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::error!(route = %self.id, "route thread panicked");
            }
        }
        self.status()
    }

    /// Waits asynchronously until the route is no longer running.
    pub async fn finished(&mut self) -> RouteStatus {
        if let Ok(status) = self.status.wait_for(|status| !status.is_running()).await {
            return status.clone();
        }
        // Sender gone: the thread exited, whatever it last published stands
        self.status()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_id_display() {
        assert_eq!(RouteId::new(3).to_string(), "route-3");
        assert_eq!(RouteId::new(3).get(), 3);
    }

    #[test]
    fn test_route_state_stats() {
        let state = RouteState::new();
        state.ticks.fetch_add(2, Ordering::Relaxed);
        state.frames_captured.fetch_add(960, Ordering::Relaxed);
        state.frames_rendered.fetch_add(880, Ordering::Relaxed);
        state.set_peak(0.75);

        let stats = state.stats();
        assert_eq!(stats.ticks, 2);
        assert_eq!(stats.frames_captured, 960);
        assert_eq!(stats.frames_rendered, 880);
        assert_eq!(stats.peak, 0.75);
    }

    #[test]
    fn test_handle_join_returns_final_status() {
        let state = Arc::new(RouteState::new());
        let (tx, rx) = watch::channel(RouteStatus::Running);
        let thread_state = Arc::clone(&state);
        let thread = std::thread::spawn(move || {
            thread_state.running.store(false, Ordering::SeqCst);
            tx.send_replace(RouteStatus::Finished(RouteEnd::SourceExhausted));
        });

        let handle = RouteHandle::new(RouteId::new(1), RouteKind::Playback, state, rx, thread);
        assert_eq!(handle.kind(), RouteKind::Playback);
        assert!(matches!(
            handle.join(),
            RouteStatus::Finished(RouteEnd::SourceExhausted)
        ));
    }

    #[tokio::test]
    async fn test_handle_finished_waits_for_terminal_status() {
        let state = Arc::new(RouteState::new());
        let (tx, rx) = watch::channel(RouteStatus::Running);
        let thread = std::thread::spawn(move || {
            std::thread::sleep(std::time::Duration::from_millis(20));
            tx.send_replace(RouteStatus::Failed(RouteError::AppNotFound {
                app: "x".into(),
            }));
        });

        let mut handle = RouteHandle::new(RouteId::new(2), RouteKind::App, state, rx, thread);
        assert!(matches!(handle.finished().await, RouteStatus::Failed(_)));
    }
}

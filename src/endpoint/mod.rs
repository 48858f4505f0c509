//! Endpoint abstraction.
//!
//! The routing core never talks to an OS audio API directly. A backend
//! implements [`EndpointBackend`] for discovery and hands out [`Endpoint`]
//! handles; the pump only ever sees those handles.
//!
//! Available backends:
//! - [`MockBackend`]: in-memory endpoints for tests and demos
//! - [`CpalBackend`]: hardware devices through cpal (feature `cpal-backend`)

#[cfg(feature = "cpal-backend")]
mod cpal_backend;
mod endpoint_id;
mod mock;

use std::time::Duration;

use crate::config::PumpConfig;
use crate::format::NativeFormat;
use crate::RouteError;

#[cfg(feature = "cpal-backend")]
pub use cpal_backend::CpalBackend;
pub use endpoint_id::EndpointId;
use endpoint_id::resolve_name;
pub use mock::{Lifecycle, MockBackend, MockEndpoint};

/// Process names that own audio sessions but are never meaningful routing sources.
const APP_NAME_BLACKLIST: &[&str] = &["explorer", "TextInputHost", "ApplicationFrameHost"];

/// Which way audio flows through an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Audio is read from the endpoint.
    Capture,
    /// Audio is written to the endpoint.
    Render,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Capture => f.write_str("capture"),
            Self::Render => f.write_str("render"),
        }
    }
}

/// An endpoint as listed by a backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointInfo {
    /// Identifier used to open the endpoint.
    pub id: EndpointId,
    /// Human-readable name.
    pub display_name: String,
}

impl EndpointInfo {
    /// Creates an entry.
    pub fn new(id: impl Into<EndpointId>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
        }
    }
}

/// A running application's audio session, usable as a loopback capture source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppSession {
    /// Application name the session was resolved from.
    pub app: String,
    /// Capture endpoint for the session's loopback.
    pub session: EndpointId,
    /// Render endpoint the application is playing on.
    pub device: EndpointId,
}

/// An open capture or render endpoint.
///
/// A handle belongs to exactly one route and is only used from that route's
/// thread, so implementations need not be `Send`. Capture handles implement
/// the read half, render handles the write half; calling the other half is
/// a device error.
///
/// `close()` must be idempotent.
pub trait Endpoint {
    /// Identifier this handle was opened with.
    fn id(&self) -> &EndpointId;

    /// Capture or render.
    fn direction(&self) -> Direction;

    /// Format the endpoint produces or consumes.
    fn native_format(&self) -> NativeFormat;

    /// Total buffer capacity in frames.
    fn buffer_frames(&self) -> usize;

    /// Capture: frames ready to read. Render: frames of free space.
    fn available_frames(&mut self) -> Result<usize, RouteError>;

    /// Blocks for at most `timeout` waiting for data or space.
    fn wait(&mut self, timeout: Duration) {
        std::thread::sleep(timeout);
    }

    /// Reads up to `max_frames` frames of native-format bytes into `out`.
    ///
    /// `out` is cleared first. Returns the number of frames read.
    fn read_frames(&mut self, max_frames: usize, out: &mut Vec<u8>) -> Result<usize, RouteError>;

    /// Borrows a writable region for exactly `frames` frames.
    ///
    /// Callers never request more than [`available_frames()`](Self::available_frames) reported.
    fn acquire_write_buffer(&mut self, frames: usize) -> Result<&mut [u8], RouteError>;

    /// Commits `frames` frames of the region from the last acquire.
    fn release_write_buffer(&mut self, frames: usize) -> Result<(), RouteError>;

    /// Starts the device stream.
    fn start(&mut self) -> Result<(), RouteError>;

    /// Stops the device stream.
    fn stop(&mut self) -> Result<(), RouteError>;

    /// Releases the handle.
    fn close(&mut self);
}

/// Discovery and opening of endpoints on one audio system.
pub trait EndpointBackend: Send + Sync {
    /// Short backend name for logs.
    fn name(&self) -> &'static str;

    /// Lists endpoints in one direction.
    fn list_endpoints(&self, direction: Direction) -> Result<Vec<EndpointInfo>, RouteError>;

    /// The system default endpoint for a direction, if any.
    fn default_endpoint(&self, direction: Direction) -> Option<EndpointId>;

    /// Finds the endpoint `name` refers to, by id or display name.
    ///
    /// Id matches win; display names ignore case.
    fn find_endpoint(&self, direction: Direction, name: &str) -> Option<EndpointId> {
        match self.list_endpoints(direction) {
            Ok(endpoints) => resolve_name(&endpoints, name),
            Err(e) => {
                tracing::warn!(backend = self.name(), %direction, error = %e, "endpoint listing failed");
                None
            }
        }
    }

    /// Names of applications that currently own an audio session.
    fn list_apps(&self) -> Vec<String> {
        Vec::new()
    }

    /// Resolves a running application's own audio session.
    fn find_app_session(&self, _app: &str) -> Option<AppSession> {
        None
    }

    /// Opens an endpoint. Called on the route thread that will own it.
    fn open(
        &self,
        id: &EndpointId,
        direction: Direction,
        config: &PumpConfig,
    ) -> Result<Box<dyn Endpoint>, RouteError>;
}

/// Returns `true` if `name` is usable as an application routing source.
///
/// Rejects empty names, names without any alphanumeric character, and
/// shell/system processes that own sessions but never carry user audio.
pub fn is_valid_app_name(name: &str) -> bool {
    let name = name.trim();
    !name.is_empty()
        && name.chars().any(char::is_alphanumeric)
        && !APP_NAME_BLACKLIST.contains(&name)
}

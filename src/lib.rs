//! # route-audio
//!
//! **Note:** This crate is under active development. The API may change before 1.0.
//!
//! Real-time audio routing between endpoints.
//!
//! `route-audio` moves audio from a capture source (an input device, one
//! application's own audio session, or a decoded file) to a render device,
//! converting sample format, rate and channel layout on the fly. Each route
//! applies a per-key gain and an optional shared effect chain, and every
//! route stops through one global stop signal.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use route_audio::{CpalBackend, RouteController, RouteStatus};
//!
//! let controller = RouteController::new(CpalBackend::new())
//!     .on_event(|e| tracing::info!(?e, "route event"));
//!
//! controller.set_gain("mic", 0.8);
//! controller.init_effect_chain("delay time=120\nreverb intensity=40", 48000)?;
//!
//! let mut route = controller.start_device_route("USB Mic", "Speakers", true, "mic")?;
//! let playback = controller.start_playback("chime.wav", "Speakers", false)?;
//!
//! // Later, from any thread
//! controller.stop_all();
//!
//! if let RouteStatus::Failed(e) = route.finished().await {
//!     tracing::error!(%e, "route failed");
//! }
//! ```
//!
//! ## Architecture
//!
//! The crate keeps a strict thread boundary:
//!
//! - **Control plane**: the [`RouteController`] resolves endpoints and
//!   rejects bad requests synchronously, then hands each route to its own
//!   thread
//! - **Route thread**: opens the endpoints and runs a
//!   [`StreamPump`](pipeline::StreamPump) that never blocks without a bound
//!   and never takes a lock the control plane can hold for long
//! - **Shared state**: gains are atomics behind a concurrent map, the effect
//!   program is swapped whole, and the stop signal is a single epoch counter
//!
//! Endpoints come from an [`EndpointBackend`]: [`CpalBackend`] for real
//! devices (feature `cpal-backend`), [`MockBackend`] for scripted tests.

// unsafe_code lint is configured in Cargo.toml as "deny"
#![warn(missing_docs)]
// Audio code requires intentional numeric casts between sample formats
#![allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_possible_wrap,
    clippy::cast_lossless
)]
// unwrap/expect allowed in tests only
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]
// These doc lints are too strict for internal implementation details
#![allow(clippy::missing_panics_doc, clippy::missing_errors_doc)]

mod config;
mod controller;
mod decode;
pub mod effects;
mod endpoint;
mod error;
mod event;
pub mod format;
mod gain;
pub mod pipeline;
mod route;

pub use config::{Latency, PumpConfig};
pub use controller::RouteController;
#[cfg(feature = "symphonia-decoder")]
pub use decode::SymphoniaDecoder;
pub use decode::{Decoder, PcmBuffer};
pub use effects::{EffectChain, EffectProgram, EffectSlot};
#[cfg(feature = "cpal-backend")]
pub use endpoint::CpalBackend;
pub use endpoint::{
    is_valid_app_name, AppSession, Direction, Endpoint, EndpointBackend, EndpointId,
    EndpointInfo, Lifecycle, MockBackend, MockEndpoint,
};
pub use error::{DecodeFailure, ErrorKind, RouteError};
pub use event::{event_callback, EventCallback, RouteEvent};
pub use format::{NativeFormat, SampleFormat};
pub use gain::{GainHandle, GainRegistry};
pub use route::{RouteEnd, RouteHandle, RouteId, RouteKind, RouteStats, RouteStatus};

//! Audio pipeline components.
//!
//! Every route runs one pump on its own thread:
//!
//! ```text
//! Capture source → decode → gain → resample → remap → effects → Render endpoint
//! ```
//!
//! - **Capture source**: a live endpoint, or a decoded file read in chunks
//! - **Stream pump**: the loop itself, with bounded waits and backpressure
//! - **Stop signal**: one cooperative signal shared by all routes
//!
//! The pump never holds a lock the control plane can take for long: gain
//! reads are atomic loads and the effect slot is only polled with `try_lock`.

mod capture;
mod pump;
mod stop;

pub use capture::{CaptureSource, PcmReader};
pub use pump::StreamPump;
pub use stop::{StopSignal, StopToken};

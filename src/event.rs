//! Route lifecycle events.
//!
//! Events are notifications for logging and UI; the authoritative outcome
//! of a route is its [`RouteStatus`](crate::RouteStatus).

use std::sync::Arc;

use crate::endpoint::{Direction, EndpointId};
use crate::route::{RouteEnd, RouteId};
use crate::RouteError;

/// Events emitted by the [`RouteController`](crate::RouteController) and its routes.
///
/// # Example
///
/// ```
/// use route_audio::RouteEvent;
///
/// fn handle_event(event: RouteEvent) {
///     match event {
///         RouteEvent::Started { route, source, destination } => {
///             eprintln!("{route}: {source} -> {destination}");
///         }
///         RouteEvent::FellBackToDefault { requested, direction, used } => {
///             eprintln!("{direction} '{requested}' not found, using {used}");
///         }
///         RouteEvent::Finished { route, end } => {
///             eprintln!("{route} finished: {end:?}");
///         }
///         RouteEvent::Failed { route, error } => {
///             eprintln!("{route} failed: {error}");
///         }
///     }
/// }
/// ```
#[derive(Debug, Clone)]
pub enum RouteEvent {
    /// A route thread opened both endpoints and began streaming.
    Started {
        /// The route.
        route: RouteId,
        /// Capture side (or the file path for playback).
        source: String,
        /// Render endpoint.
        destination: EndpointId,
    },

    /// A named endpoint was not found and the system default was used.
    ///
    /// Emitted on the thread that called `start_*`, before the route exists.
    FellBackToDefault {
        /// The name that did not resolve.
        requested: String,
        /// Which side of the route.
        direction: Direction,
        /// The default endpoint used instead.
        used: EndpointId,
    },

    /// A route ended normally.
    Finished {
        /// The route.
        route: RouteId,
        /// Why it ended.
        end: RouteEnd,
    },

    /// A route aborted on an error.
    Failed {
        /// The route.
        route: RouteId,
        /// The error that ended it.
        error: RouteError,
    },
}

/// Callback type for receiving route events.
///
/// Called from route threads, and for [`RouteEvent::FellBackToDefault`] from
/// the thread starting the route; implementations must not block.
pub type EventCallback = Arc<dyn Fn(RouteEvent) + Send + Sync>;

/// Creates an [`EventCallback`] from a closure.
///
/// # Example
///
/// ```
/// use route_audio::{event_callback, RouteEvent};
///
/// let callback = event_callback(|event: RouteEvent| {
///     println!("Got event: {:?}", event);
/// });
/// ```
pub fn event_callback<F>(f: F) -> EventCallback
where
    F: Fn(RouteEvent) + Send + Sync + 'static,
{
    Arc::new(f)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_event_debug() {
        let event = RouteEvent::Finished {
            route: RouteId::new(7),
            end: RouteEnd::SourceExhausted,
        };
        let debug = format!("{:?}", event);
        assert!(debug.contains("Finished"));
        assert!(debug.contains("SourceExhausted"));
    }

    #[test]
    fn test_event_callback_helper() {
        use std::sync::atomic::{AtomicBool, Ordering};

        let called = Arc::new(AtomicBool::new(false));
        let called_clone = called.clone();

        let callback = event_callback(move |_| {
            called_clone.store(true, Ordering::SeqCst);
        });

        callback(RouteEvent::Finished {
            route: RouteId::new(1),
            end: RouteEnd::Stopped,
        });
        assert!(called.load(Ordering::SeqCst));
    }
}

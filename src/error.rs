//! Error types for route-audio.
//!
//! Errors fall into four classes (see [`ErrorKind`]):
//! - **Configuration**: detected before a route thread starts (bad endpoint
//!   name with no usable default, malformed effect program)
//! - **Decode**: the playback file could not be turned into PCM
//! - **FeedbackRisk**: an application route would capture its own output
//! - **Device**: endpoint activation or buffer failures while streaming
//!
//! The first three are returned synchronously from the `start_*` calls.
//! Device errors end a running route and surface through its terminal
//! [`RouteStatus`](crate::RouteStatus).

use std::path::PathBuf;

use crate::endpoint::{Direction, EndpointId};

/// Broad classification of a [`RouteError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Unresolvable endpoint or malformed effect program.
    Configuration,
    /// Endpoint activation, negotiation or buffer failure.
    Device,
    /// The playback file could not be decoded.
    Decode,
    /// Source and destination resolve to the same physical endpoint.
    FeedbackRisk,
}

/// Why a file could not be decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeFailure {
    /// The file does not exist.
    NotFound,
    /// The container or codec is not supported.
    UnsupportedFormat,
    /// The file exists but could not be read (locked, permissions, I/O).
    Unreadable,
    /// The file decoded to zero samples.
    Empty,
}

impl std::fmt::Display for DecodeFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Self::NotFound => "file not found",
            Self::UnsupportedFormat => "unsupported format",
            Self::Unreadable => "file unreadable",
            Self::Empty => "empty payload",
        };
        f.write_str(text)
    }
}

/// Errors produced by the routing core.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RouteError {
    /// No endpoint matched the name and the system has no default either.
    #[error("no usable {direction} endpoint for '{name}' (no system default)")]
    EndpointUnresolved {
        /// Which side of the route failed to resolve.
        direction: Direction,
        /// The requested name (may be empty).
        name: String,
    },

    /// No running application with an audio session matched the name.
    #[error("no audio session found for application '{app}'")]
    AppNotFound {
        /// The requested application name.
        app: String,
    },

    /// A line of an effect program could not be parsed.
    #[error("invalid effect on line {line}: {reason}")]
    InvalidEffect {
        /// 1-based line number in the program text.
        line: usize,
        /// What was wrong with it.
        reason: String,
    },

    /// An endpoint failed while opening or streaming.
    #[error("device error on '{endpoint}': {reason}")]
    Device {
        /// The endpoint that failed.
        endpoint: EndpointId,
        /// Backend-provided description.
        reason: String,
    },

    /// The playback file could not be decoded.
    #[error("cannot decode {path}: {failure}")]
    Decode {
        /// Path of the file.
        path: PathBuf,
        /// What went wrong.
        failure: DecodeFailure,
    },

    /// The application's session plays on the destination endpoint itself.
    #[error("source and destination are the same endpoint '{endpoint}', feedback possible")]
    FeedbackRisk {
        /// The shared endpoint.
        endpoint: EndpointId,
    },
}

impl RouteError {
    /// Returns the error class.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::EndpointUnresolved { .. } | Self::AppNotFound { .. } | Self::InvalidEffect { .. } => {
                ErrorKind::Configuration
            }
            Self::Device { .. } => ErrorKind::Device,
            Self::Decode { .. } => ErrorKind::Decode,
            Self::FeedbackRisk { .. } => ErrorKind::FeedbackRisk,
        }
    }

    /// Creates a device error for the given endpoint.
    pub fn device(endpoint: &EndpointId, reason: impl Into<String>) -> Self {
        Self::Device {
            endpoint: endpoint.clone(),
            reason: reason.into(),
        }
    }

    /// Creates an effect parse error.
    pub fn invalid_effect(line: usize, reason: impl Into<String>) -> Self {
        Self::InvalidEffect {
            line,
            reason: reason.into(),
        }
    }

    /// Creates a decode error for the given path.
    pub fn decode(path: impl Into<PathBuf>, failure: DecodeFailure) -> Self {
        Self::Decode {
            path: path.into(),
            failure,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_error_display() {
        let err = RouteError::EndpointUnresolved {
            direction: Direction::Render,
            name: "Speakers".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "no usable render endpoint for 'Speakers' (no system default)"
        );
    }

    #[test]
    fn test_error_kinds() {
        let id = EndpointId::new("hw:0");
        assert_eq!(RouteError::device(&id, "gone").kind(), ErrorKind::Device);
        assert_eq!(
            RouteError::invalid_effect(1, "unknown effect").kind(),
            ErrorKind::Configuration
        );
        assert_eq!(
            RouteError::AppNotFound { app: "x".into() }.kind(),
            ErrorKind::Configuration
        );
        assert_eq!(
            RouteError::decode("a.wav", DecodeFailure::Empty).kind(),
            ErrorKind::Decode
        );
        assert_eq!(
            RouteError::FeedbackRisk { endpoint: id }.kind(),
            ErrorKind::FeedbackRisk
        );
    }

    #[test]
    fn test_decode_error_display() {
        let err = RouteError::decode("/tmp/missing.wav", DecodeFailure::NotFound);
        assert!(err.to_string().contains("/tmp/missing.wav"));
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_device_error_display() {
        let err = RouteError::device(&EndpointId::new("USB Mic"), "buffer acquire failed");
        assert_eq!(
            err.to_string(),
            "device error on 'USB Mic': buffer acquire failed"
        );
    }
}

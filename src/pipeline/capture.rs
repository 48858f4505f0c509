//! Capture side of a pump: a live endpoint or a decoded file.

use crate::decode::PcmBuffer;
use crate::endpoint::{Endpoint, EndpointId};
use crate::format::NativeFormat;
use crate::RouteError;

/// Sequential reader over a decoded file.
///
/// Hands out at most `chunk_frames` frames per read until the buffer is
/// exhausted.
#[derive(Debug, Clone)]
pub struct PcmReader {
    buffer: PcmBuffer,
    position: usize,
    chunk_frames: usize,
}

impl PcmReader {
    /// Creates a reader at the start of `buffer`.
    pub fn new(buffer: PcmBuffer, chunk_frames: usize) -> Self {
        Self {
            buffer,
            position: 0,
            chunk_frames: chunk_frames.max(1),
        }
    }

    /// Format of the decoded data.
    pub fn format(&self) -> NativeFormat {
        self.buffer.format()
    }

    /// Frames not read yet.
    pub fn remaining(&self) -> usize {
        self.buffer.frames() - self.position
    }

    /// Frames the next read returns.
    pub fn available_frames(&self) -> usize {
        self.remaining().min(self.chunk_frames)
    }

    /// Copies up to `max_frames` frames into `out` and advances.
    pub fn read_frames(&mut self, max_frames: usize, out: &mut Vec<u8>) -> usize {
        let frames = self.available_frames().min(max_frames);
        let bytes_per_frame = self.buffer.format().bytes_per_frame();
        let start = self.position * bytes_per_frame;

        out.clear();
        out.extend_from_slice(&self.buffer.data()[start..start + frames * bytes_per_frame]);
        self.position += frames;
        frames
    }
}

/// Where a pump pulls audio from.
pub enum CaptureSource {
    /// A live capture endpoint; never exhausts on its own.
    Endpoint(Box<dyn Endpoint>),
    /// A decoded file, read once.
    Pcm(PcmReader),
}

impl CaptureSource {
    /// Format of the audio this source yields.
    pub fn format(&self) -> NativeFormat {
        match self {
            Self::Endpoint(endpoint) => endpoint.native_format(),
            Self::Pcm(reader) => reader.format(),
        }
    }

    /// Endpoint id, for live sources.
    pub fn endpoint_id(&self) -> Option<&EndpointId> {
        match self {
            Self::Endpoint(endpoint) => Some(endpoint.id()),
            Self::Pcm(_) => None,
        }
    }

    pub(crate) fn start(&mut self) -> Result<(), RouteError> {
        match self {
            Self::Endpoint(endpoint) => endpoint.start(),
            Self::Pcm(_) => Ok(()),
        }
    }

    pub(crate) fn stop(&mut self) -> Result<(), RouteError> {
        match self {
            Self::Endpoint(endpoint) => endpoint.stop(),
            Self::Pcm(_) => Ok(()),
        }
    }

    pub(crate) fn close(&mut self) {
        if let Self::Endpoint(endpoint) = self {
            endpoint.close();
        }
    }
}

impl std::fmt::Debug for CaptureSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Endpoint(endpoint) => f.debug_tuple("Endpoint").field(endpoint.id()).finish(),
            Self::Pcm(reader) => f
                .debug_struct("Pcm")
                .field("format", &reader.format())
                .field("remaining", &reader.remaining())
                .finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pcm_reader_chunks() {
        let samples: Vec<i16> = (0..10).collect();
        let mut reader = PcmReader::new(PcmBuffer::from_i16(&samples, 8000, 2), 2);
        let mut out = Vec::new();

        assert_eq!(reader.remaining(), 5);
        assert_eq!(reader.read_frames(usize::MAX, &mut out), 2);
        assert_eq!(out.len(), 8);
        assert_eq!(i16::from_ne_bytes([out[4], out[5]]), 2);

        assert_eq!(reader.read_frames(1, &mut out), 1);
        assert_eq!(reader.read_frames(usize::MAX, &mut out), 2);
        assert_eq!(reader.available_frames(), 0);
        assert_eq!(reader.read_frames(usize::MAX, &mut out), 0);
        assert!(out.is_empty());
    }

    #[test]
    fn test_capture_source_format() {
        let pcm = PcmBuffer::from_i16(&[0; 4], 22050, 1);
        let source = CaptureSource::Pcm(PcmReader::new(pcm, 64));
        assert_eq!(source.format().sample_rate, 22050);
        assert!(source.endpoint_id().is_none());
    }
}

//! File decoding for one-shot playback.

use std::path::Path;

use crate::format::{NativeFormat, SampleFormat};
use crate::RouteError;

/// Decoded audio, immutable once produced.
#[derive(Clone, PartialEq)]
pub struct PcmBuffer {
    data: Vec<u8>,
    format: NativeFormat,
}

impl std::fmt::Debug for PcmBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PcmBuffer")
            .field("bytes", &self.data.len())
            .field("format", &self.format)
            .finish()
    }
}

impl PcmBuffer {
    /// Wraps native-endian PCM bytes in the given format.
    pub fn new(data: Vec<u8>, format: NativeFormat) -> Self {
        Self { data, format }
    }

    /// Builds an int16 buffer from interleaved samples.
    pub fn from_i16(samples: &[i16], sample_rate: u32, channels: u16) -> Self {
        Self {
            data: samples.iter().flat_map(|s| s.to_ne_bytes()).collect(),
            format: NativeFormat::new(sample_rate, channels, SampleFormat::I16),
        }
    }

    /// Raw payload.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Sample rate, channel count and sample format.
    pub fn format(&self) -> NativeFormat {
        self.format
    }

    /// Number of whole frames in the payload.
    pub fn frames(&self) -> usize {
        match self.format.bytes_per_frame() {
            0 => 0,
            bytes => self.data.len() / bytes,
        }
    }

    /// Returns `true` if the payload holds no frames.
    pub fn is_empty(&self) -> bool {
        self.frames() == 0
    }
}

/// Turns an audio file into PCM.
pub trait Decoder: Send + Sync {
    /// Decodes the whole file.
    fn decode(&self, path: &Path) -> Result<PcmBuffer, RouteError>;
}

#[cfg(feature = "symphonia-decoder")]
pub use self::symphonia_decoder::SymphoniaDecoder;

#[cfg(feature = "symphonia-decoder")]
mod symphonia_decoder {
    use std::fs::File;
    use std::path::Path;

    use symphonia::core::audio::SampleBuffer;
    use symphonia::core::codecs::{Decoder as _, DecoderOptions, CODEC_TYPE_NULL};
    use symphonia::core::errors::Error as SymphoniaError;
    use symphonia::core::formats::{FormatOptions, FormatReader as _};
    use symphonia::core::io::MediaSourceStream;
    use symphonia::core::meta::MetadataOptions;
    use symphonia::core::probe::Hint;
    use tracing::{debug, warn};

    use super::{Decoder, PcmBuffer};
    use crate::error::DecodeFailure;
    use crate::format::{NativeFormat, SampleFormat};
    use crate::RouteError;

    /// Decoder for every container and codec symphonia supports.
    ///
    /// Output is always interleaved int16 at the file's own rate and channel
    /// count; the pump converts from there.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SymphoniaDecoder;

    impl SymphoniaDecoder {
        /// Creates a decoder.
        pub fn new() -> Self {
            Self
        }
    }

    impl Decoder for SymphoniaDecoder {
        fn decode(&self, path: &Path) -> Result<PcmBuffer, RouteError> {
            let fail = |failure| RouteError::decode(path, failure);

            let file = File::open(path).map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => fail(DecodeFailure::NotFound),
                _ => fail(DecodeFailure::Unreadable),
            })?;
            let mss = MediaSourceStream::new(Box::new(file), Default::default());

            let mut hint = Hint::new();
            if let Some(ext) = path.extension().and_then(|ext| ext.to_str()) {
                hint.with_extension(ext);
            }

            let probed = symphonia::default::get_probe()
                .format(
                    &hint,
                    mss,
                    &FormatOptions::default(),
                    &MetadataOptions::default(),
                )
                .map_err(|_| fail(DecodeFailure::UnsupportedFormat))?;
            let mut format = probed.format;

            let track = format
                .tracks()
                .iter()
                .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
                .ok_or_else(|| fail(DecodeFailure::UnsupportedFormat))?;
            let track_id = track.id;
            let mut sample_rate = track.codec_params.sample_rate;
            let mut channels = track.codec_params.channels.map(|c| c.count() as u16);

            let mut decoder = symphonia::default::get_codecs()
                .make(&track.codec_params, &DecoderOptions::default())
                .map_err(|_| fail(DecodeFailure::UnsupportedFormat))?;

            let mut data = Vec::new();
            loop {
                let packet = match format.next_packet() {
                    Ok(packet) => packet,
                    Err(SymphoniaError::IoError(e))
                        if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                    {
                        break;
                    }
                    Err(SymphoniaError::ResetRequired) => break,
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "packet read failed");
                        return Err(fail(DecodeFailure::Unreadable));
                    }
                };

                if packet.track_id() != track_id {
                    continue;
                }

                match decoder.decode(&packet) {
                    Ok(decoded) => {
                        let spec = *decoded.spec();
                        sample_rate.get_or_insert(spec.rate);
                        channels.get_or_insert(spec.channels.count() as u16);

                        let mut samples =
                            SampleBuffer::<i16>::new(decoded.capacity() as u64, spec);
                        samples.copy_interleaved_ref(decoded);
                        data.extend(samples.samples().iter().flat_map(|s| s.to_ne_bytes()));
                    }
                    Err(SymphoniaError::DecodeError(e)) => {
                        warn!(path = %path.display(), error = %e, "skipping corrupt packet");
                    }
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "decode failed");
                        return Err(fail(DecodeFailure::Unreadable));
                    }
                }
            }

            let (Some(sample_rate), Some(channels)) = (sample_rate, channels) else {
                return Err(fail(DecodeFailure::UnsupportedFormat));
            };
            let buffer = PcmBuffer::new(
                data,
                NativeFormat::new(sample_rate, channels, SampleFormat::I16),
            );
            if buffer.is_empty() {
                return Err(fail(DecodeFailure::Empty));
            }

            debug!(
                path = %path.display(),
                sample_rate,
                channels,
                frames = buffer.frames(),
                "file decoded"
            );
            Ok(buffer)
        }
    }
}

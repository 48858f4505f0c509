//! Sample format conversion between native PCM bytes and normalized f32.
//!
//! The two integer directions use different 32-bit constants: decoding
//! divides by 2^31 so `i32::MIN` lands exactly on -1.0, encoding multiplies
//! by `i32::MAX` so +1.0 cannot overflow. The 16-bit path has the same
//! asymmetry (÷32768 in, ×32767 out). Whether the two directions were meant
//! to agree is unconfirmed; they are kept separate on purpose.

/// Divisor for int16 → f32.
pub const I16_DECODE_SCALE: f32 = 32768.0;
/// Multiplier for f32 → int16.
pub const I16_ENCODE_SCALE: f32 = 32767.0;
/// Divisor for int32 → f32.
pub const I32_DECODE_SCALE: f64 = 2_147_483_648.0;
/// Multiplier for f32 → int32.
pub const I32_ENCODE_SCALE: f64 = 2_147_483_647.0;

/// Native sample encoding of an endpoint or decoded buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SampleFormat {
    /// Signed 16-bit integer.
    I16,
    /// Signed 32-bit integer.
    I32,
    /// 32-bit IEEE float.
    F32,
}

impl SampleFormat {
    /// Size of one sample in bytes.
    #[must_use]
    pub const fn bytes_per_sample(self) -> usize {
        match self {
            Self::I16 => 2,
            Self::I32 | Self::F32 => 4,
        }
    }

    /// Bits per sample.
    #[must_use]
    pub const fn bit_depth(self) -> u16 {
        match self {
            Self::I16 => 16,
            Self::I32 | Self::F32 => 32,
        }
    }

    /// Returns `true` for floating-point formats.
    #[must_use]
    pub const fn is_float(self) -> bool {
        matches!(self, Self::F32)
    }
}

/// Format an endpoint exposes natively.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NativeFormat {
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Number of interleaved channels.
    pub channels: u16,
    /// Sample encoding.
    pub format: SampleFormat,
}

impl NativeFormat {
    /// Creates a native format description.
    #[must_use]
    pub const fn new(sample_rate: u32, channels: u16, format: SampleFormat) -> Self {
        Self {
            sample_rate,
            channels,
            format,
        }
    }

    /// Bytes per interleaved frame.
    #[must_use]
    pub const fn bytes_per_frame(&self) -> usize {
        self.channels as usize * self.format.bytes_per_sample()
    }

    /// Bits per sample.
    #[must_use]
    pub const fn bit_depth(&self) -> u16 {
        self.format.bit_depth()
    }

    /// Returns `true` if samples are floating point.
    #[must_use]
    pub const fn is_float(&self) -> bool {
        self.format.is_float()
    }

    /// Returns `true` if rate or channel layout differ from `other`.
    #[must_use]
    pub fn needs_conversion_to(&self, other: &NativeFormat) -> bool {
        self.sample_rate != other.sample_rate || self.channels != other.channels
    }
}

/// Converts an i16 sample to f32.
#[inline]
pub fn i16_to_f32(sample: i16) -> f32 {
    f32::from(sample) / I16_DECODE_SCALE
}

/// Converts an i32 sample to f32.
#[inline]
pub fn i32_to_f32(sample: i32) -> f32 {
    (f64::from(sample) / I32_DECODE_SCALE) as f32
}

/// Converts an f32 sample to i16, clamping to [-1.0, 1.0] first.
#[inline]
pub fn f32_to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * I16_ENCODE_SCALE) as i16
}

/// Converts an f32 sample to i32, clamping to [-1.0, 1.0] first.
#[inline]
pub fn f32_to_i32(sample: f32) -> i32 {
    (f64::from(sample.clamp(-1.0, 1.0)) * I32_ENCODE_SCALE) as i32
}

/// Decodes native-endian PCM bytes and appends normalized samples to `out`.
///
/// Trailing bytes that do not form a whole sample are ignored.
pub fn decode_into(bytes: &[u8], format: SampleFormat, out: &mut Vec<f32>) {
    out.reserve(bytes.len() / format.bytes_per_sample());
    match format {
        SampleFormat::I16 => out.extend(
            bytes
                .chunks_exact(2)
                .map(|b| i16_to_f32(i16::from_ne_bytes([b[0], b[1]]))),
        ),
        SampleFormat::I32 => out.extend(
            bytes
                .chunks_exact(4)
                .map(|b| i32_to_f32(i32::from_ne_bytes([b[0], b[1], b[2], b[3]]))),
        ),
        SampleFormat::F32 => out.extend(
            bytes
                .chunks_exact(4)
                .map(|b| f32::from_ne_bytes([b[0], b[1], b[2], b[3]])),
        ),
    }
}

/// Decodes native-endian PCM bytes into a new vector of normalized samples.
pub fn to_float(bytes: &[u8], format: SampleFormat) -> Vec<f32> {
    let mut out = Vec::new();
    decode_into(bytes, format, &mut out);
    out
}

/// Encodes normalized samples into `out` as native-endian PCM.
///
/// Integer targets are clamped and scaled; float targets are copied
/// unchanged. Writes `min(samples, out capacity)` whole samples and
/// returns the number of bytes written.
pub fn from_float(samples: &[f32], format: SampleFormat, out: &mut [u8]) -> usize {
    let size = format.bytes_per_sample();
    let mut written = 0;
    for (dst, &sample) in out.chunks_exact_mut(size).zip(samples) {
        match format {
            SampleFormat::I16 => dst.copy_from_slice(&f32_to_i16(sample).to_ne_bytes()),
            SampleFormat::I32 => dst.copy_from_slice(&f32_to_i32(sample).to_ne_bytes()),
            SampleFormat::F32 => dst.copy_from_slice(&sample.to_ne_bytes()),
        }
        written += size;
    }
    written
}

/// Encodes normalized samples into a new native-endian byte vector.
pub fn encode(samples: &[f32], format: SampleFormat) -> Vec<u8> {
    let mut out = vec![0u8; samples.len() * format.bytes_per_sample()];
    from_float(samples, format, &mut out);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_i16_to_f32_range() {
        assert_eq!(i16_to_f32(-32768), -1.0);
        assert_eq!(i16_to_f32(0), 0.0);
        assert_eq!(i16_to_f32(16384), 0.5);
        assert!(i16_to_f32(32767) < 1.0);
    }

    #[test]
    fn test_i32_to_f32_range() {
        assert_eq!(i32_to_f32(i32::MIN), -1.0);
        assert_eq!(i32_to_f32(0), 0.0);
        assert_eq!(i32_to_f32(1 << 30), 0.5);
    }

    #[test]
    fn test_f32_to_i16_full_range() {
        assert_eq!(f32_to_i16(1.0), 32767);
        assert_eq!(f32_to_i16(-1.0), -32767);
        assert_eq!(f32_to_i16(0.0), 0);
    }

    #[test]
    fn test_f32_to_i16_clamping() {
        assert_eq!(f32_to_i16(2.0), 32767);
        assert_eq!(f32_to_i16(-2.0), -32767);
    }

    #[test]
    fn test_f32_to_i32_full_range() {
        assert_eq!(f32_to_i32(1.0), i32::MAX);
        assert_eq!(f32_to_i32(-1.0), -i32::MAX);
        assert_eq!(f32_to_i32(3.0), i32::MAX);
    }

    #[test]
    fn test_decode_i16_bytes() {
        let bytes: Vec<u8> = [0i16, 16384, -32768]
            .iter()
            .flat_map(|s| s.to_ne_bytes())
            .collect();
        assert_eq!(to_float(&bytes, SampleFormat::I16), vec![0.0, 0.5, -1.0]);
    }

    #[test]
    fn test_decode_ignores_partial_sample() {
        let mut bytes = 0.25f32.to_ne_bytes().to_vec();
        bytes.push(0xff);
        assert_eq!(to_float(&bytes, SampleFormat::F32), vec![0.25]);
    }

    #[test]
    fn test_float_target_passes_through() {
        let out = encode(&[1.5, -0.25], SampleFormat::F32);
        assert_eq!(to_float(&out, SampleFormat::F32), vec![1.5, -0.25]);
    }

    #[test]
    fn test_from_float_respects_output_length() {
        let mut out = [0u8; 4];
        let written = from_float(&[0.5, 0.5, 0.5], SampleFormat::I16, &mut out);
        assert_eq!(written, 4);
    }

    #[test]
    fn test_native_format_helpers() {
        let format = NativeFormat::new(48000, 2, SampleFormat::I32);
        assert_eq!(format.bytes_per_frame(), 8);
        assert_eq!(format.bit_depth(), 32);
        assert!(!format.is_float());
        assert!(format.needs_conversion_to(&NativeFormat::new(44100, 2, SampleFormat::I32)));
        assert!(!format.needs_conversion_to(&NativeFormat::new(48000, 2, SampleFormat::F32)));
    }
}

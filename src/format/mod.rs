//! Audio format conversion utilities.
//!
//! This module provides the stateless conversions the pump applies on
//! every tick:
//! - Sample format conversion (native PCM bytes ↔ normalized f32)
//! - Sample rate conversion (linear resampling)
//! - Channel layout conversion (wraparound remap)

mod convert;
mod remap;
mod resample;

pub use convert::{
    decode_into, encode, f32_to_i16, f32_to_i32, from_float, i16_to_f32, i32_to_f32, to_float,
    NativeFormat, SampleFormat, I16_DECODE_SCALE, I16_ENCODE_SCALE, I32_DECODE_SCALE,
    I32_ENCODE_SCALE,
};
pub use remap::remap_channels;
pub use resample::{resample, resampled_len};

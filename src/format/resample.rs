//! Sample rate conversion.
//!
//! Linear interpolation over interleaved frames. Fast and deterministic,
//! not band-limited.

/// Number of frames produced when resampling `src_frames` frames.
///
/// Integer truncation: `src_frames * dst_rate / src_rate`. Some earlier
/// builds rounded up instead; truncation keeps the output length
/// reproducible across platforms.
pub fn resampled_len(src_frames: usize, src_rate: u32, dst_rate: u32) -> usize {
    if src_rate == 0 {
        return 0;
    }
    (src_frames as u64 * u64::from(dst_rate) / u64::from(src_rate)) as usize
}

/// Resamples interleaved audio from `src_rate` to `dst_rate`.
///
/// Destination frame `i` reads source position `i * src_frames / dst_frames`
/// and interpolates linearly between the two neighbouring source frames,
/// per channel. Source indices past the end contribute silence, so the
/// final frame fades toward zero rather than holding the last value.
///
/// Equal rates return an exact copy.
///
/// # Arguments
///
/// * `src` - Interleaved input samples
/// * `channels` - Channel count of `src`
/// * `src_rate` - Source sample rate in Hz
/// * `dst_rate` - Target sample rate in Hz
pub fn resample(src: &[f32], channels: usize, src_rate: u32, dst_rate: u32) -> Vec<f32> {
    if src_rate == dst_rate {
        return src.to_vec();
    }
    if channels == 0 {
        return Vec::new();
    }

    let src_frames = src.len() / channels;
    let dst_frames = resampled_len(src_frames, src_rate, dst_rate);
    let mut out = Vec::with_capacity(dst_frames * channels);

    let sample_at = |frame: usize, channel: usize| -> f32 {
        if frame < src_frames {
            src[frame * channels + channel]
        } else {
            0.0
        }
    };

    for i in 0..dst_frames {
        let pos = i as f64 * src_frames as f64 / dst_frames as f64;
        let idx = pos.floor() as usize;
        let frac = (pos - idx as f64) as f32;

        for c in 0..channels {
            let s0 = sample_at(idx, c);
            let s1 = sample_at(idx + 1, c);
            out.push(s0 * (1.0 - frac) + s1 * frac);
        }
    }

    out
}

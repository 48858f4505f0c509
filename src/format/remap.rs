//! Channel layout conversion.

/// Remaps interleaved frames from `src_ch` to `dst_ch` channels.
///
/// Destination channel `c` copies source channel `c % src_ch`. Mono
/// therefore broadcasts to every output channel, and wider layouts wrap
/// around. This is not a downmix: narrowing simply drops the extra
/// source channels.
pub fn remap_channels(src: &[f32], src_ch: usize, dst_ch: usize) -> Vec<f32> {
    if src_ch == dst_ch {
        return src.to_vec();
    }
    if src_ch == 0 || dst_ch == 0 {
        return Vec::new();
    }

    let frames = src.len() / src_ch;
    let mut out = Vec::with_capacity(frames * dst_ch);
    for frame in src.chunks_exact(src_ch) {
        if src_ch == 1 {
            out.extend(std::iter::repeat(frame[0]).take(dst_ch));
        } else {
            out.extend((0..dst_ch).map(|c| frame[c % src_ch]));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remap_identity() {
        let src = vec![0.1f32, 0.2, 0.3, 0.4];
        assert_eq!(remap_channels(&src, 2, 2), src);
    }

    #[test]
    fn test_remap_mono_broadcast() {
        let src = vec![0.1f32, -0.2, 0.3];
        let out = remap_channels(&src, 1, 4);
        assert_eq!(out.len(), 12);
        for (frame, &expected) in out.chunks_exact(4).zip(&src) {
            assert!(frame.iter().all(|&s| s == expected));
        }
    }

    #[test]
    fn test_remap_wraparound() {
        // Two frames of three channels
        let src = vec![1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0];
        let out = remap_channels(&src, 3, 5);
        assert_eq!(out, vec![1.0, 2.0, 3.0, 1.0, 2.0, 4.0, 5.0, 6.0, 4.0, 5.0]);
        // Channel 3 reads channel 0, channel 4 reads channel 1
        assert_eq!(out[3], src[0]);
        assert_eq!(out[4], src[1]);
    }

    #[test]
    fn test_remap_narrowing_drops_channels() {
        let src = vec![1.0f32, 2.0, 3.0, 4.0];
        assert_eq!(remap_channels(&src, 2, 1), vec![1.0, 3.0]);
    }

    #[test]
    fn test_remap_zero_channels() {
        assert!(remap_channels(&[1.0], 0, 2).is_empty());
        assert!(remap_channels(&[1.0], 1, 0).is_empty());
    }
}

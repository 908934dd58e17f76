//! Discrete wavelet transforms via lifting.
//!
//! The reversible 5-3 filter works on integers, the irreversible 9-7
//! filter on f64. One-dimensional kernels transform a signal in place and
//! leave it split as `[low-pass .. | high-pass ..]`; the 2-D transform
//! runs rows then columns, which produces the standard LL/HL/LH/HH
//! quadrant layout. Boundary handling is whole-sample symmetric extension.

/// 9-7 lifting coefficients (ITU-T T.800 Annex F).
const ALPHA: f64 = -1.586134342;
const BETA: f64 = -0.052980118;
const GAMMA: f64 = 0.882911076;
const DELTA: f64 = 0.443506852;
const K: f64 = 1.230174105;

/// Dimensions of the LL region after each of `levels` decompositions.
///
/// `dims[0]` is the full size, `dims[l]` the LL size after `l` transforms
/// (half-and-ceiling per level). Both encode and decode derive geometry
/// from this one function so they can never disagree.
pub fn level_dims(width: usize, height: usize, levels: u8) -> Vec<(usize, usize)> {
    let mut dims = Vec::with_capacity(levels as usize + 1);
    let (mut w, mut h) = (width, height);
    dims.push((w, h));
    for _ in 0..levels {
        w = w.div_ceil(2);
        h = h.div_ceil(2);
        dims.push((w, h));
    }
    dims
}

fn deinterleave<T: Copy>(x: &mut [T], scratch: &mut Vec<T>) {
    scratch.clear();
    scratch.extend(x.iter().copied().step_by(2));
    scratch.extend(x.iter().copied().skip(1).step_by(2));
    x.copy_from_slice(scratch);
}

fn interleave<T: Copy>(x: &mut [T], scratch: &mut Vec<T>) {
    let half = x.len().div_ceil(2);
    scratch.clear();
    scratch.extend_from_slice(x);
    for (i, slot) in x.iter_mut().enumerate() {
        *slot = if i % 2 == 0 {
            scratch[i / 2]
        } else {
            scratch[half + i / 2]
        };
    }
}

// The integer lifting steps wrap on overflow. Coefficients from a valid
// stream stay far inside i32; a hostile stream must not be able to abort
// the process through an overflow check.

#[inline]
fn predict(a: i32, b: i32) -> i32 {
    a.wrapping_add(b) >> 1
}

#[inline]
fn update(a: i32, b: i32) -> i32 {
    a.wrapping_add(b).wrapping_add(2) >> 2
}

/// Forward 5-3 on one line; output split as `[low | high]`.
pub fn forward_53(x: &mut [i32], scratch: &mut Vec<i32>) {
    let len = x.len();
    if len < 2 {
        return;
    }
    // Predict odd samples.
    let mut i = 1;
    while i + 1 < len {
        x[i] = x[i].wrapping_sub(predict(x[i - 1], x[i + 1]));
        i += 2;
    }
    if len % 2 == 0 {
        x[len - 1] = x[len - 1].wrapping_sub(x[len - 2]);
    }
    // Update even samples.
    x[0] = x[0].wrapping_add(update(x[1], x[1]));
    let mut i = 2;
    while i + 1 < len {
        x[i] = x[i].wrapping_add(update(x[i - 1], x[i + 1]));
        i += 2;
    }
    if len % 2 == 1 {
        x[len - 1] = x[len - 1].wrapping_add(update(x[len - 2], x[len - 2]));
    }
    deinterleave(x, scratch);
}

/// Inverse 5-3; exact inverse of [`forward_53`].
pub fn inverse_53(x: &mut [i32], scratch: &mut Vec<i32>) {
    let len = x.len();
    if len < 2 {
        return;
    }
    interleave(x, scratch);
    // Undo the even update.
    x[0] = x[0].wrapping_sub(update(x[1], x[1]));
    let mut i = 2;
    while i + 1 < len {
        x[i] = x[i].wrapping_sub(update(x[i - 1], x[i + 1]));
        i += 2;
    }
    if len % 2 == 1 {
        x[len - 1] = x[len - 1].wrapping_sub(update(x[len - 2], x[len - 2]));
    }
    // Undo the odd prediction.
    let mut i = 1;
    while i + 1 < len {
        x[i] = x[i].wrapping_add(predict(x[i - 1], x[i + 1]));
        i += 2;
    }
    if len % 2 == 0 {
        x[len - 1] = x[len - 1].wrapping_add(x[len - 2]);
    }
}

fn lift_odd(x: &mut [f64], weight: f64) {
    let len = x.len();
    let mut i = 1;
    while i + 1 < len {
        x[i] += weight * (x[i - 1] + x[i + 1]);
        i += 2;
    }
    if len % 2 == 0 {
        x[len - 1] += weight * 2.0 * x[len - 2];
    }
}

fn lift_even(x: &mut [f64], weight: f64) {
    let len = x.len();
    x[0] += weight * 2.0 * x[1];
    let mut i = 2;
    while i + 1 < len {
        x[i] += weight * (x[i - 1] + x[i + 1]);
        i += 2;
    }
    if len % 2 == 1 {
        x[len - 1] += weight * 2.0 * x[len - 2];
    }
}

/// Forward 9-7 on one line; output split as `[low | high]`.
pub fn forward_97(x: &mut [f64], scratch: &mut Vec<f64>) {
    let len = x.len();
    if len < 2 {
        return;
    }
    lift_odd(x, ALPHA);
    lift_even(x, BETA);
    lift_odd(x, GAMMA);
    lift_even(x, DELTA);
    for (i, sample) in x.iter_mut().enumerate() {
        if i % 2 == 0 {
            *sample /= K;
        } else {
            *sample *= K;
        }
    }
    deinterleave(x, scratch);
}

/// Inverse 9-7; inverse of [`forward_97`] up to floating-point rounding.
pub fn inverse_97(x: &mut [f64], scratch: &mut Vec<f64>) {
    let len = x.len();
    if len < 2 {
        return;
    }
    interleave(x, scratch);
    for (i, sample) in x.iter_mut().enumerate() {
        if i % 2 == 0 {
            *sample *= K;
        } else {
            *sample /= K;
        }
    }
    lift_even(x, -DELTA);
    lift_odd(x, -GAMMA);
    lift_even(x, -BETA);
    lift_odd(x, -ALPHA);
}

/// Row/column driver shared by both filters. Line and reorder scratch
/// come from the per-thread buffer pool.
///
/// `data` is a plane with row stride `stride`; the transform touches the
/// top-left `width x height` region only.
macro_rules! plane_transform {
    ($fn_2d:ident, $fn_multi:ident, $fn_1d:ident, $ty:ty, $scratch_fn:path, $cols_first:expr, $levels_rev:expr) => {
        pub fn $fn_2d(data: &mut [$ty], width: usize, height: usize, stride: usize) {
            fn rows(data: &mut [$ty], width: usize, height: usize, stride: usize, scratch: &mut Vec<$ty>) {
                for y in 0..height {
                    $fn_1d(&mut data[y * stride..y * stride + width], scratch);
                }
            }
            fn cols(
                data: &mut [$ty],
                width: usize,
                height: usize,
                stride: usize,
                line: &mut Vec<$ty>,
                scratch: &mut Vec<$ty>,
            ) {
                for x in 0..width {
                    line.clear();
                    line.extend((0..height).map(|y| data[y * stride + x]));
                    $fn_1d(&mut line[..], scratch);
                    for (y, &v) in line.iter().enumerate() {
                        data[y * stride + x] = v;
                    }
                }
            }

            $scratch_fn(height, |line| {
                $scratch_fn(width.max(height), |scratch| {
                    if $cols_first {
                        cols(data, width, height, stride, line, scratch);
                        rows(data, width, height, stride, scratch);
                    } else {
                        rows(data, width, height, stride, scratch);
                        cols(data, width, height, stride, line, scratch);
                    }
                })
            })
        }

        /// Multi-level driver over the memoised [`level_dims`] sequence.
        pub fn $fn_multi(data: &mut [$ty], width: usize, height: usize, stride: usize, levels: u8) {
            let dims = level_dims(width, height, levels);
            if $levels_rev {
                for level in (0..levels as usize).rev() {
                    let (w, h) = dims[level];
                    $fn_2d(data, w, h, stride);
                }
            } else {
                for level in 0..levels as usize {
                    let (w, h) = dims[level];
                    $fn_2d(data, w, h, stride);
                }
            }
        }
    };
}

plane_transform!(forward_2d_53, forward_multi_53, forward_53, i32, crate::pool::with_scratch_i32, false, false);
plane_transform!(inverse_2d_53, inverse_multi_53, inverse_53, i32, crate::pool::with_scratch_i32, true, true);
plane_transform!(forward_2d_97, forward_multi_97, forward_97, f64, crate::pool::with_scratch_f64, false, false);
plane_transform!(inverse_2d_97, inverse_multi_97, inverse_97, f64, crate::pool::with_scratch_f64, true, true);

#[cfg(test)]
mod tests {
    use super::*;

    // Deterministic pseudo-random series, keeps the tests hermetic.
    fn lcg(seed: &mut u64) -> u64 {
        *seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        *seed >> 33
    }

    #[test]
    fn forward_53_matches_hand_computation() {
        // Constant input: high-pass must vanish, low-pass keeps the level.
        let mut x = [7; 8];
        let mut scratch = Vec::new();
        forward_53(&mut x, &mut scratch);
        assert_eq!(&x[..4], &[7, 7, 7, 7]);
        assert_eq!(&x[4..], &[0, 0, 0, 0]);
    }

    #[test]
    fn roundtrip_53_all_lengths() {
        let mut seed = 1u64;
        let mut scratch = Vec::new();
        for len in 1..=130 {
            let original: Vec<i32> = (0..len)
                .map(|_| (lcg(&mut seed) as i32 % (1 << 23)) - (1 << 22))
                .collect();
            let mut x = original.clone();
            forward_53(&mut x, &mut scratch);
            inverse_53(&mut x, &mut scratch);
            assert_eq!(x, original, "length {len}");
        }
    }

    #[test]
    fn roundtrip_97_all_lengths() {
        let mut seed = 2u64;
        let mut scratch = Vec::new();
        for len in 2..=130 {
            let original: Vec<f64> = (0..len)
                .map(|_| lcg(&mut seed) as f64 / 1e4 - 1000.0)
                .collect();
            let mut x = original.clone();
            forward_97(&mut x, &mut scratch);
            inverse_97(&mut x, &mut scratch);
            for (a, b) in x.iter().zip(&original) {
                assert!((a - b).abs() <= 1e-9 * b.abs().max(1.0), "length {len}");
            }
        }
    }

    #[test]
    fn level_dims_half_and_ceiling() {
        assert_eq!(level_dims(5, 3, 2), vec![(5, 3), (3, 2), (2, 1)]);
        assert_eq!(level_dims(8, 8, 3), vec![(8, 8), (4, 4), (2, 2), (1, 1)]);
    }

    #[test]
    fn multi_level_roundtrip_53() {
        let mut seed = 3u64;
        for &(w, h) in &[(8usize, 8usize), (16, 16), (13, 7), (32, 8), (1, 9)] {
            let levels = 3u8;
            let original: Vec<i32> = (0..w * h)
                .map(|_| (lcg(&mut seed) as i32 % 4096) - 2048)
                .collect();
            let mut plane = original.clone();
            forward_multi_53(&mut plane, w, h, w, levels);
            inverse_multi_53(&mut plane, w, h, w, levels);
            assert_eq!(plane, original, "{w}x{h}");
        }
    }

    #[test]
    fn multi_level_roundtrip_97() {
        let mut seed = 4u64;
        for &(w, h) in &[(8usize, 8usize), (16, 16), (13, 7), (256, 2)] {
            let levels = 2u8;
            let original: Vec<f64> = (0..w * h)
                .map(|_| lcg(&mut seed) as f64 / 1e6)
                .collect();
            let mut plane = original.clone();
            forward_multi_97(&mut plane, w, h, w, levels);
            inverse_multi_97(&mut plane, w, h, w, levels);
            for (a, b) in plane.iter().zip(&original) {
                assert!((a - b).abs() <= 1e-9 * b.abs().max(1.0), "{w}x{h}");
            }
        }
    }

    #[test]
    fn quadrant_layout_after_2d() {
        // A vertical step should concentrate energy in LL and LH.
        let (w, h) = (8usize, 8usize);
        let mut plane = vec![0i32; w * h];
        for y in 4..8 {
            for x in 0..w {
                plane[y * w + x] = 100;
            }
        }
        forward_2d_53(&mut plane, w, h, w);
        // HL quadrant (right-top) stays zero: rows are constant.
        for y in 0..4 {
            for x in 4..8 {
                assert_eq!(plane[y * w + x], 0, "HL at ({x},{y})");
            }
        }
        // HH also zero.
        for y in 4..8 {
            for x in 4..8 {
                assert_eq!(plane[y * w + x], 0, "HH at ({x},{y})");
            }
        }
        // LH carries the step.
        assert!((4..8).any(|y| (0..4).any(|x| plane[y * w + x] != 0)));
    }
}

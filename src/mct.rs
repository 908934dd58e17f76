//! Multi-component transforms and DC level shifting.
//!
//! RCT is the reversible integer transform paired with the 5-3 filter,
//! ICT the irreversible float transform paired with 9-7. Both apply to the
//! first three components only; extra components (alpha) pass through.

/// Forward reversible colour transform, in place over three planes.
///
/// Y = floor((R + 2G + B) / 4), U = B - G, V = R - G.
pub fn forward_rct(c0: &mut [i32], c1: &mut [i32], c2: &mut [i32]) {
    for ((r, g), b) in c0.iter_mut().zip(c1.iter_mut()).zip(c2.iter_mut()) {
        let (red, green, blue) = (*r, *g, *b);
        *r = (red + 2 * green + blue) >> 2;
        *g = blue - green;
        *b = red - green;
    }
}

/// Inverse of [`forward_rct`]: G = Y - floor((U + V) / 4), R = V + G, B = U + G.
/// Wraps on overflow so corrupt coefficients cannot abort the decode.
pub fn inverse_rct(c0: &mut [i32], c1: &mut [i32], c2: &mut [i32]) {
    for ((y, u), v) in c0.iter_mut().zip(c1.iter_mut()).zip(c2.iter_mut()) {
        let (luma, cb, cr) = (*y, *u, *v);
        let green = luma.wrapping_sub(cb.wrapping_add(cr) >> 2);
        *y = cr.wrapping_add(green);
        *u = green;
        *v = cb.wrapping_add(green);
    }
}

/// Forward ICT matrix (Table G.1 coefficients), rows Y, Cb, Cr.
const ICT_FORWARD: [[f64; 3]; 3] = [
    [0.299, 0.587, 0.114],
    [-0.16875, -0.33126, 0.5],
    [0.5, -0.41869, -0.08131],
];

/// Algebraic inverse of [`ICT_FORWARD`], computed once at runtime so the
/// pair stays exact to machine precision. The dominant entries are the
/// familiar 1.402 and 1.772.
fn ict_inverse() -> &'static [[f64; 3]; 3] {
    use std::sync::OnceLock;
    static INVERSE: OnceLock<[[f64; 3]; 3]> = OnceLock::new();
    INVERSE.get_or_init(|| {
        let m = &ICT_FORWARD;
        let cof = |r1: usize, c1: usize, r2: usize, c2: usize| {
            m[r1][c1] * m[r2][c2] - m[r1][c2] * m[r2][c1]
        };
        let det =
            m[0][0] * cof(1, 1, 2, 2) - m[0][1] * cof(1, 0, 2, 2) + m[0][2] * cof(1, 0, 2, 1);
        [
            [cof(1, 1, 2, 2) / det, -cof(0, 1, 2, 2) / det, cof(0, 1, 1, 2) / det],
            [-cof(1, 0, 2, 2) / det, cof(0, 0, 2, 2) / det, -cof(0, 0, 1, 2) / det],
            [cof(1, 0, 2, 1) / det, -cof(0, 0, 2, 1) / det, cof(0, 0, 1, 1) / det],
        ]
    })
}

/// Forward irreversible colour transform.
pub fn forward_ict(c0: &mut [f64], c1: &mut [f64], c2: &mut [f64]) {
    let m = &ICT_FORWARD;
    for ((r, g), b) in c0.iter_mut().zip(c1.iter_mut()).zip(c2.iter_mut()) {
        let (red, green, blue) = (*r, *g, *b);
        *r = m[0][0] * red + m[0][1] * green + m[0][2] * blue;
        *g = m[1][0] * red + m[1][1] * green + m[1][2] * blue;
        *b = m[2][0] * red + m[2][1] * green + m[2][2] * blue;
    }
}

/// Inverse irreversible colour transform.
pub fn inverse_ict(c0: &mut [f64], c1: &mut [f64], c2: &mut [f64]) {
    let m = ict_inverse();
    for ((y, cb), cr) in c0.iter_mut().zip(c1.iter_mut()).zip(c2.iter_mut()) {
        let (luma, blue_d, red_d) = (*y, *cb, *cr);
        *y = m[0][0] * luma + m[0][1] * blue_d + m[0][2] * red_d;
        *cb = m[1][0] * luma + m[1][1] * blue_d + m[1][2] * red_d;
        *cr = m[2][0] * luma + m[2][1] * blue_d + m[2][2] * red_d;
    }
}

/// Subtract 2^(p-1) so unsigned samples centre on zero. Signed components
/// skip the shift entirely; the caller gates on signedness.
pub fn dc_shift_forward(plane: &mut [i32], precision: u8) {
    let shift = 1 << (precision - 1);
    for sample in plane {
        *sample -= shift;
    }
}

/// Add 2^(p-1) back after the inverse transform.
pub fn dc_shift_inverse(plane: &mut [i32], precision: u8) {
    let shift = 1 << (precision - 1);
    for sample in plane {
        *sample = sample.wrapping_add(shift);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rct_roundtrips_exactly() {
        // Sweep a grid of values across the signed 16-bit range.
        let values: Vec<i32> = (-32768..32768).step_by(1021).collect();
        for &r in &values {
            for &g in &values {
                for &b in &values {
                    let mut c0 = [r];
                    let mut c1 = [g];
                    let mut c2 = [b];
                    forward_rct(&mut c0, &mut c1, &mut c2);
                    inverse_rct(&mut c0, &mut c1, &mut c2);
                    assert_eq!((c0[0], c1[0], c2[0]), (r, g, b));
                }
            }
        }
    }

    #[test]
    fn ict_roundtrips_within_tolerance() {
        let values: Vec<f64> = (-32768..32768).step_by(4099).map(|v| v as f64).collect();
        for &r in &values {
            for &g in &values {
                for &b in &values {
                    let mut c0 = [r];
                    let mut c1 = [g];
                    let mut c2 = [b];
                    forward_ict(&mut c0, &mut c1, &mut c2);
                    inverse_ict(&mut c0, &mut c1, &mut c2);
                    assert!((c0[0] - r).abs() < 1e-2);
                    assert!((c1[0] - g).abs() < 1e-2);
                    assert!((c2[0] - b).abs() < 1e-2);
                }
            }
        }
    }

    #[test]
    fn dc_shift_centres_unsigned_range() {
        let mut plane = [0, 128, 255];
        dc_shift_forward(&mut plane, 8);
        assert_eq!(plane, [-128, 0, 127]);
        dc_shift_inverse(&mut plane, 8);
        assert_eq!(plane, [0, 128, 255]);
    }
}

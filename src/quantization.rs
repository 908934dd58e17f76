//! Subband quantization per ITU-T T.800 Annex E.
//!
//! The reversible path carries one 5-bit exponent per subband and no
//! mantissa; the irreversible path uses the scalar-derived style: a single
//! (exponent, mantissa) word for the coarsest LL, derived for every other
//! subband as epsilon_b = epsilon_0 - N_L + n_b. Dequantization multiplies
//! by Delta_b = 2^(R_b - epsilon_b) * (1 + mu_b / 2^11).

use crate::codestream::{Qcd, QuantizationValues};
use crate::tile::{Band, BandType};

/// Guard bits signalled in Sqcd.
pub const GUARD_BITS: u8 = 2;

/// Number of magnitude bit-planes available for a subband (Equation E-2).
pub fn max_bitplanes(exponent: u8, guard_bits: u8) -> u8 {
    (guard_bits + exponent).saturating_sub(1).min(31)
}

/// Bits needed to represent `magnitude`.
pub fn magnitude_bits(magnitude: u32) -> u8 {
    (32 - magnitude.leading_zeros()) as u8
}

/// One quantization step in its wire representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepSize {
    /// 5-bit exponent.
    pub exponent: u8,
    /// 11-bit mantissa.
    pub mantissa: u16,
}

impl StepSize {
    /// The step value for a subband with dynamic range `rb` bits.
    pub fn delta(&self, rb: u8) -> f64 {
        2f64.powi(rb as i32 - self.exponent as i32) * (1.0 + self.mantissa as f64 / 2048.0)
    }

    /// Closest wire representation of `delta` for dynamic range `rb`.
    pub fn from_delta(delta: f64, rb: u8) -> Self {
        let log = delta.log2().floor();
        let mut exponent = (rb as f64 - log) as i32;
        let mut mantissa = ((delta / 2f64.powf(log) - 1.0) * 2048.0).round() as i32;
        if mantissa > 2047 {
            // 2.0 * 2^log rounds up into the next octave.
            mantissa = 0;
            exponent -= 1;
        }
        let exponent = exponent.clamp(1, 31) as u8;
        Self {
            exponent,
            mantissa: mantissa.clamp(0, 2047) as u16,
        }
    }
}

/// Derived step for a subband at decomposition level `n_b` out of `levels`,
/// from the signalled coarsest-level step (E-3).
pub fn derive_step(base: StepSize, levels: u8, n_b: u8) -> StepSize {
    let exponent = (base.exponent as i32 - levels as i32 + n_b as i32).clamp(1, 31) as u8;
    StepSize {
        exponent,
        mantissa: base.mantissa,
    }
}

/// Base quantization step from the 1..=100 quality knob.
///
/// Monotone: higher quality, smaller step. Quality 50 is a unit step;
/// each 12.5 points halve or double it. The mapping is this encoder's
/// own; Annex E only constrains the wire form.
pub fn quality_step(quality: u8) -> f64 {
    2f64.powf((50.0 - quality as f64) / 12.5)
}

/// Index of a band in QCD subband order: LL first, then HL/LH/HH per
/// resolution from coarse to fine.
pub fn band_qcd_index(band: &Band, levels: u8) -> usize {
    match band.band_type {
        BandType::Ll => 0,
        other => {
            let resolution = (levels - band.level + 1) as usize;
            let pos = match other {
                BandType::Hl => 0,
                BandType::Lh => 1,
                _ => 2,
            };
            1 + 3 * (resolution - 1) + pos
        }
    }
}

/// The signalled (exponent, mantissa) pair governing a band. Both sides
/// of the pipe derive steps through this one function.
pub fn band_step(qcd: &Qcd, band: &Band, levels: u8) -> StepSize {
    match &qcd.values {
        QuantizationValues::NoQuantization { exponents } => {
            let index = band_qcd_index(band, levels).min(exponents.len() - 1);
            StepSize {
                exponent: exponents[index],
                mantissa: 0,
            }
        }
        QuantizationValues::ScalarDerived { exponent, mantissa } => derive_step(
            StepSize {
                exponent: *exponent,
                mantissa: *mantissa,
            },
            levels,
            band.level,
        ),
        QuantizationValues::ScalarExpounded { pairs } => {
            let index = band_qcd_index(band, levels).min(pairs.len() - 1);
            let (exponent, mantissa) = pairs[index];
            StepSize { exponent, mantissa }
        }
    }
}

/// Mb for a band: guard bits plus its signalled exponent minus one.
pub fn band_bitplane_budget(qcd: &Qcd, band: &Band, levels: u8) -> u8 {
    max_bitplanes(band_step(qcd, band, levels).exponent, qcd.guard_bits)
}

/// Dead-zone scalar quantizer: q = sign(x) * floor(|x| / delta), with the
/// index magnitude clamped to what `max_planes` bit-planes can carry.
pub fn quantize(value: f64, delta: f64, max_planes: u8) -> i32 {
    let cap = (1u32 << max_planes.min(31)) - 1;
    let magnitude = ((value.abs() / delta) as u32).min(cap) as i32;
    if value < 0.0 {
        -magnitude
    } else {
        magnitude
    }
}

/// Inverse of [`quantize`] up to one quantization step.
pub fn dequantize(index: i32, delta: f64) -> f64 {
    index as f64 * delta
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_size_wire_roundtrip() {
        for &(delta, rb) in &[(0.25f64, 8u8), (1.0, 9), (3.75, 10), (0.061, 12)] {
            let step = StepSize::from_delta(delta, rb);
            let recovered = step.delta(rb);
            assert!(
                (recovered - delta).abs() / delta < 1e-3,
                "delta {delta} -> {recovered}"
            );
        }
    }

    #[test]
    fn derived_steps_shrink_toward_fine_levels() {
        let base = StepSize {
            exponent: 16,
            mantissa: 512,
        };
        let coarse = derive_step(base, 5, 5);
        let fine = derive_step(base, 5, 1);
        assert_eq!(coarse.exponent, 16);
        assert_eq!(fine.exponent, 12);
        // Smaller exponent means a larger step.
        assert!(fine.delta(10) > coarse.delta(10));
    }

    #[test]
    fn quality_ordering() {
        assert!(quality_step(10) > quality_step(50));
        assert!(quality_step(50) > quality_step(75));
        assert!(quality_step(75) > quality_step(100));
    }

    #[test]
    fn quantize_roundtrip_within_one_step() {
        let delta = 0.5;
        for &v in &[-100.3f64, -0.7, 0.0, 0.2, 3.9, 250.1] {
            let q = quantize(v, delta, 16);
            let back = dequantize(q, delta);
            assert!((back - v).abs() <= delta, "{v} -> {q} -> {back}");
        }
    }

    #[test]
    fn quantize_clamps_to_plane_budget() {
        assert_eq!(quantize(1e9, 1.0, 4), 15);
        assert_eq!(quantize(-1e9, 1.0, 4), -15);
    }

    #[test]
    fn bitplane_budget() {
        assert_eq!(max_bitplanes(9, 2), 10);
        assert_eq!(magnitude_bits(0), 0);
        assert_eq!(magnitude_bits(1), 1);
        assert_eq!(magnitude_bits(255), 8);
        assert_eq!(magnitude_bits(256), 9);
    }
}

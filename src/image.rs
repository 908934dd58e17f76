//! Planar sample buffers and stream metadata.

use crate::error::{ErrorKind, Result};
use crate::options::Format;

/// The sample structure the core consumes and produces.
///
/// Components are planar `i32` buffers of length `width * height` in
/// row-major order. All components share one precision and signedness;
/// non-uniform component geometries are outside the core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanarImage {
    pub width: u32,
    pub height: u32,
    /// Bits per sample, 1..=16.
    pub precision: u8,
    pub signed: bool,
    /// One plane per component; 1..=4 components.
    pub planes: Vec<Vec<i32>>,
}

impl PlanarImage {
    pub fn new(width: u32, height: u32, precision: u8, signed: bool, components: usize) -> Self {
        let len = width as usize * height as usize;
        Self {
            width,
            height,
            precision,
            signed,
            planes: vec![vec![0; len]; components],
        }
    }

    pub fn component_count(&self) -> usize {
        self.planes.len()
    }

    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(ErrorKind::Inconsistent("image dimensions are zero").into());
        }
        if !(1..=16).contains(&self.precision) {
            return Err(ErrorKind::Inconsistent("precision outside 1..=16").into());
        }
        if self.planes.is_empty() || self.planes.len() > 4 {
            return Err(ErrorKind::Inconsistent("component count outside 1..=4").into());
        }
        let expected = self.width as usize * self.height as usize;
        if self.planes.iter().any(|p| p.len() != expected) {
            return Err(ErrorKind::Inconsistent("plane length does not match dimensions").into());
        }
        Ok(())
    }

    /// The representable sample range for this precision and signedness.
    pub fn sample_range(&self) -> (i32, i32) {
        if self.signed {
            (-(1 << (self.precision - 1)), (1 << (self.precision - 1)) - 1)
        } else {
            (0, (1 << self.precision) - 1)
        }
    }
}

/// A decoded image together with the colorspace the file declared.
#[derive(Debug, Clone)]
pub struct DecodedImage {
    pub image: PlanarImage,
    pub colorspace: Colorspace,
}

/// Enumerated colorspace readout.
///
/// The core reports the declared value; colorspace math belongs to an
/// external collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Colorspace {
    /// Raw codestream without a JP2 wrapper, nothing declared.
    Unspecified,
    /// Enumerated code 16.
    Srgb,
    /// Enumerated code 17.
    Greyscale,
    /// Enumerated code 18.
    Sycc,
    /// A recognised enumerated code without a dedicated variant.
    Other(u32),
    /// An enumerated code outside the recognised set.
    Unknown(u32),
}

/// Enumerated codes the core recognises (ISO/IEC 15444-1 Table I.10 subset).
const RECOGNISED_CODES: [u32; 17] = [1, 3, 4, 9, 11, 12, 13, 14, 16, 17, 18, 19, 20, 21, 22, 23, 24];

/// Codes an external collaborator can map to sRGB.
const SRGB_CONVERTIBLE: [u32; 15] = [1, 3, 4, 9, 11, 12, 13, 14, 18, 19, 20, 21, 22, 23, 24];

impl Colorspace {
    pub fn from_code(code: u32) -> Self {
        match code {
            16 => Self::Srgb,
            17 => Self::Greyscale,
            18 => Self::Sycc,
            c if RECOGNISED_CODES.contains(&c) => Self::Other(c),
            c => Self::Unknown(c),
        }
    }

    /// The enumerated code, when one was declared.
    pub fn code(&self) -> Option<u32> {
        match self {
            Self::Unspecified => None,
            Self::Srgb => Some(16),
            Self::Greyscale => Some(17),
            Self::Sycc => Some(18),
            Self::Other(c) | Self::Unknown(c) => Some(*c),
        }
    }

    /// Whether the external conversion contract covers this value.
    pub fn convertible_to_srgb(&self) -> bool {
        matches!(self.code(), Some(c) if SRGB_CONVERTIBLE.contains(&c))
    }
}

/// Invert 8-bit CMY samples to RGB (enumerated colorspace 12).
///
/// The one colorspace conversion cheap enough to keep beside the buffer
/// type; every other enumerated code is handed to an external converter
/// together with the planar buffer and precision.
pub fn cmy_to_rgb(c: u8, m: u8, y: u8) -> (u8, u8, u8) {
    (255 - c, 255 - m, 255 - y)
}

/// Per-component metadata as declared in SIZ.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComponentInfo {
    pub precision: u8,
    pub signed: bool,
}

/// Everything [`crate::read_info`] can report without decoding pixels.
#[derive(Debug, Clone)]
pub struct StreamInfo {
    pub format: Format,
    pub width: u32,
    pub height: u32,
    pub components: Vec<ComponentInfo>,
    pub colorspace: Colorspace,
    /// Rsiz profile field from SIZ.
    pub profile: u16,
    pub decomposition_levels: u8,
    pub layers: u16,
    pub tile_width: u32,
    pub tile_height: u32,
    pub tile_count: u32,
    pub icc_profile: Option<Vec<u8>>,
    pub comment: Option<String>,
}

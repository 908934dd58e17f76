//! Codestream marker codes (ISO/IEC 15444-1 Annex A).

use num_enum::{IntoPrimitive, TryFromPrimitive};

/// Two-byte marker codes used by the core. Every code has 0xFF as its
/// high byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[repr(u16)]
pub enum Marker {
    /// Start of codestream. No segment body.
    Soc = 0xFF4F,
    /// Extended capabilities (HTJ2K signalling).
    Cap = 0xFF50,
    /// Image and tile geometry.
    Siz = 0xFF51,
    /// Coding style default.
    Cod = 0xFF52,
    /// Quantization default.
    Qcd = 0xFF5C,
    /// Comment.
    Com = 0xFF64,
    /// Start of tile-part.
    Sot = 0xFF90,
    /// Start of packet (optional, inside tile-part data).
    Sop = 0xFF91,
    /// End of packet header (optional).
    Eph = 0xFF92,
    /// Start of data. No segment body.
    Sod = 0xFF93,
    /// End of codestream. No segment body.
    Eoc = 0xFFD9,
}

impl Marker {
    /// Markers that stand alone, with no length-prefixed segment.
    pub fn is_delimiter(self) -> bool {
        matches!(self, Marker::Soc | Marker::Sod | Marker::Eoc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_match_the_standard() {
        assert_eq!(u16::from(Marker::Soc), 0xFF4F);
        assert_eq!(u16::from(Marker::Siz), 0xFF51);
        assert_eq!(u16::from(Marker::Eoc), 0xFFD9);
        assert_eq!(Marker::try_from(0xFF93u16).unwrap(), Marker::Sod);
        assert!(Marker::try_from(0xFF00u16).is_err());
    }

    #[test]
    fn delimiters_have_no_body() {
        assert!(Marker::Soc.is_delimiter());
        assert!(Marker::Eoc.is_delimiter());
        assert!(!Marker::Siz.is_delimiter());
        assert!(!Marker::Sot.is_delimiter());
    }
}

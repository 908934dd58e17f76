//! Error types for encoding and decoding.

use std::fmt;
use thiserror::Error;

/// The failure classes surfaced by the codec.
///
/// Low-level modules construct an [`ErrorKind`]; the pipeline attaches the
/// byte offset of the failure before handing it to the caller.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The input is not a JP2 file or J2K codestream, or declares a feature
    /// combination no conforming stream can carry.
    #[error("format: {0}")]
    Format(&'static str),

    /// The input ended before a declared length completed.
    #[error("truncated: {0}")]
    Truncated(&'static str),

    /// A header field disagrees with another header field.
    #[error("inconsistent: {0}")]
    Inconsistent(&'static str),

    /// The stream or the caller requested a feature outside the core.
    #[error("unsupported: {0}")]
    Unsupported(&'static str),

    /// A length field or derived allocation exceeds the configured cap.
    #[error("bound exceeded: {what} wants {requested} bytes, cap is {cap}")]
    BoundExceeded {
        what: &'static str,
        requested: u64,
        cap: u64,
    },

    /// Tier-1 or packet structure failed an internal invariant.
    #[error("corrupt: {0}")]
    Corrupt(&'static str),

    /// The worker pool was cancelled through the caller's token.
    #[error("cancelled")]
    Cancelled,
}

/// An [`ErrorKind`] plus the byte offset at which it was detected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodecError {
    /// Offset into the input stream, when the failure maps to one.
    pub offset: Option<u64>,
    pub kind: ErrorKind,
}

impl CodecError {
    pub fn new(kind: ErrorKind) -> Self {
        Self { offset: None, kind }
    }

    /// Attach an offset unless an inner layer already recorded one.
    pub fn with_offset(mut self, offset: u64) -> Self {
        if self.offset.is_none() {
            self.offset = Some(offset);
        }
        self
    }
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.offset {
            Some(offset) => write!(f, "{} at byte {}", self.kind, offset),
            None => write!(f, "{}", self.kind),
        }
    }
}

impl std::error::Error for CodecError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.kind)
    }
}

impl From<ErrorKind> for CodecError {
    fn from(kind: ErrorKind) -> Self {
        Self::new(kind)
    }
}

pub type Result<T> = std::result::Result<T, CodecError>;

/// Reject an allocation derived from an untrusted length field.
///
/// Returns the length as `usize` only when it fits below `cap`.
pub fn checked_len(what: &'static str, requested: u64, cap: u64) -> Result<usize> {
    if requested > cap {
        return Err(ErrorKind::BoundExceeded {
            what,
            requested,
            cap,
        }
        .into());
    }
    Ok(requested as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offset_is_attached_once() {
        let err = CodecError::new(ErrorKind::Truncated("box body"))
            .with_offset(12)
            .with_offset(99);
        assert_eq!(err.offset, Some(12));
        assert_eq!(format!("{err}"), "truncated: box body at byte 12");
    }

    #[test]
    fn checked_len_rejects_above_cap() {
        assert!(checked_len("tile buffer", 10, 16).is_ok());
        let err = checked_len("tile buffer", 17, 16).unwrap_err();
        assert!(matches!(err.kind, ErrorKind::BoundExceeded { .. }));
    }
}

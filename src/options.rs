//! Encoder and decoder options.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::image::Colorspace;
use crate::progression::ProgressionOrder;

/// Output container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// Raw codestream (SOC .. EOC).
    J2k,
    /// JP2 file wrapping the codestream in boxes.
    Jp2,
}

/// Cooperative cancellation for the tier-1 worker pool.
///
/// Cloning shares the flag. A cancelled encode aborts with
/// [`crate::ErrorKind::Cancelled`] and emits no output.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

/// Options recognised by [`crate::encode`].
#[derive(Debug, Clone)]
pub struct EncoderOptions {
    pub format: Format,
    /// Reversible path (RCT + 5-3). Wins over `quality` when both are set.
    pub lossless: bool,
    /// 1..=100, used in lossy mode.
    pub quality: u8,
    /// Number of resolutions (decomposition levels + 1).
    pub resolutions: u8,
    /// Code-block size as (log2 width, log2 height).
    pub code_block_exp: (u8, u8),
    pub progression: ProgressionOrder,
    pub layers: u16,
    /// Tile size; `None` means one tile covering the image.
    pub tile_size: Option<(u32, u32)>,
    pub sop_markers: bool,
    pub eph_markers: bool,
    /// Re-quantize samples to this bit depth before encoding.
    pub precision_override: Option<u8>,
    /// Emitted as a COM segment (registration 1, Latin-1).
    pub comment: Option<String>,
    /// Overrides the colorspace written into the JP2 colr box.
    pub colorspace: Option<Colorspace>,
    /// Signal HTJ2K capability (CAP marker + code-block style bit 6).
    /// Block coding itself stays in the Part-1 coder.
    pub high_throughput: bool,
    pub cancel: Option<CancelToken>,
}

impl Default for EncoderOptions {
    fn default() -> Self {
        Self {
            format: Format::J2k,
            lossless: true,
            quality: 85,
            resolutions: 6,
            code_block_exp: (6, 6),
            progression: ProgressionOrder::Lrcp,
            layers: 1,
            tile_size: None,
            sop_markers: false,
            eph_markers: false,
            precision_override: None,
            comment: None,
            colorspace: None,
            high_throughput: false,
            cancel: None,
        }
    }
}

impl EncoderOptions {
    /// Clamp free-form values into their documented domains.
    pub(crate) fn normalized(&self) -> Self {
        let mut opts = self.clone();
        opts.quality = opts.quality.clamp(1, 100);
        opts.resolutions = opts.resolutions.clamp(1, 32);
        opts.layers = opts.layers.max(1);
        let (mut cbx, mut cby) = opts.code_block_exp;
        cbx = cbx.clamp(2, 10);
        cby = cby.clamp(2, 10);
        while cbx + cby > 12 {
            if cbx >= cby {
                cbx -= 1;
            } else {
                cby -= 1;
            }
        }
        opts.code_block_exp = (cbx, cby);
        if let Some(p) = opts.precision_override {
            opts.precision_override = Some(p.clamp(1, 16));
        }
        opts
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|t| t.is_cancelled())
    }
}

/// Options recognised by [`crate::decode_with`].
#[derive(Debug, Clone, Default)]
pub struct DecodeOptions {
    /// Zero-fill code-blocks whose tier-1 data is corrupt instead of
    /// aborting the whole decode.
    pub lenient: bool,
    /// On truncation inside packet data, return the reconstruction up to
    /// the last complete packet instead of an error.
    pub allow_partial: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalization_clamps_code_blocks() {
        let opts = EncoderOptions {
            code_block_exp: (10, 10),
            quality: 0,
            resolutions: 0,
            ..Default::default()
        }
        .normalized();
        let (cbx, cby) = opts.code_block_exp;
        assert!(cbx + cby <= 12);
        assert!(cbx >= 2 && cby >= 2);
        assert_eq!(opts.quality, 1);
        assert_eq!(opts.resolutions, 1);
    }

    #[test]
    fn cancel_token_is_shared() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
    }
}

/*!
# jp2kit

`jp2kit` is a pure Rust encoder and decoder for the JPEG 2000 core coding
system (ISO/IEC 15444-1), covering the pipeline from raw samples to a
compliant codestream and back:

- Multi-component transforms (reversible RCT, irreversible ICT) and DC
  level shifting.
- Multi-level 2-D discrete wavelet transforms via lifting, 5-3 integer
  and 9-7 float.
- Tier-1 EBCOT block coding over the MQ arithmetic coder.
- Tier-2 packet assembly with tag-tree coded headers and the five
  progression orders.
- Codestream framing (SIZ, COD, QCD, COM, CAP, SOT/SOD, EOC) and the JP2
  box wrapper.

The library works on planar `i32` sample buffers ([`PlanarImage`]);
adapters to concrete pixel formats live with the host application. Every
length field read from untrusted input is checked against a cap before it
is used for an allocation, and decoding never panics on malformed input.

## Example

```
use jp2kit::{decode, encode, EncoderOptions, Format, PlanarImage};

let mut image = PlanarImage::new(8, 8, 8, false, 1);
image.planes[0].iter_mut().for_each(|s| *s = 128);

let options = EncoderOptions { format: Format::Jp2, ..Default::default() };
let bytes = encode(&image, &options).unwrap();
let decoded = decode(&bytes).unwrap();
assert_eq!(decoded.image, image);
```
*/

pub mod bit_io;
pub mod bit_plane_coder;
pub mod codestream;
pub mod decoder;
pub mod dwt;
pub mod encoder;
pub mod error;
pub mod image;
pub mod jp2;
pub mod marker;
pub mod mct;
pub mod options;
pub mod packet;
pub mod pool;
pub mod progression;
pub mod quantization;
pub mod stream_reader;
pub mod stream_writer;
pub mod tag_tree;
pub mod tile;

pub mod mq_coder;

pub use decoder::{decode, decode_with, read_info};
pub use encoder::encode;
pub use error::{CodecError, ErrorKind, Result};
pub use image::{cmy_to_rgb, Colorspace, ComponentInfo, DecodedImage, PlanarImage, StreamInfo};
pub use options::{CancelToken, DecodeOptions, EncoderOptions, Format};
pub use progression::ProgressionOrder;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_grayscale_roundtrip() {
        let mut image = PlanarImage::new(8, 8, 8, false, 1);
        image.planes[0].iter_mut().for_each(|s| *s = 128);

        let bytes = encode(&image, &EncoderOptions::default()).unwrap();
        assert_eq!(&bytes[..4], &[0xFF, 0x4F, 0xFF, 0x51]);
        assert_eq!(&bytes[bytes.len() - 2..], &[0xFF, 0xD9]);

        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded.image, image);
        assert_eq!(decoded.colorspace, Colorspace::Unspecified);
    }

    #[test]
    fn metadata_without_pixel_decode() {
        let mut image = PlanarImage::new(32, 16, 8, false, 3);
        for plane in &mut image.planes {
            plane.iter_mut().enumerate().for_each(|(i, s)| *s = (i % 251) as i32);
        }
        let options = EncoderOptions {
            format: Format::Jp2,
            comment: Some("metadata probe".into()),
            ..Default::default()
        };
        let bytes = encode(&image, &options).unwrap();

        let info = read_info(&bytes).unwrap();
        assert_eq!(info.format, Format::Jp2);
        assert_eq!((info.width, info.height), (32, 16));
        assert_eq!(info.components.len(), 3);
        assert_eq!(info.colorspace, Colorspace::Srgb);
        assert_eq!(info.decomposition_levels, 5);
        assert_eq!(info.layers, 1);
        assert_eq!(info.tile_count, 1);
        assert_eq!(info.comment.as_deref(), Some("metadata probe"));
    }
}

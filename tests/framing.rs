//! Codestream framing, JP2 box structure, and robustness against
//! malformed input.

use jp2kit::{decode, decode_with, encode, DecodeOptions, EncoderOptions, ErrorKind, Format, PlanarImage};

fn small_image() -> PlanarImage {
    let mut image = PlanarImage::new(8, 8, 8, false, 1);
    let mut state = 17u64;
    for sample in &mut image.planes[0] {
        state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
        *sample = ((state >> 33) & 0xFF) as i32;
    }
    image
}

fn small_j2k() -> Vec<u8> {
    encode(&small_image(), &EncoderOptions::default()).unwrap()
}

fn small_jp2() -> Vec<u8> {
    let options = EncoderOptions {
        format: Format::Jp2,
        ..Default::default()
    };
    encode(&small_image(), &options).unwrap()
}

#[test]
fn codestream_starts_with_soc_siz_and_ends_with_eoc() {
    let bytes = small_j2k();
    assert_eq!(&bytes[..4], &[0xFF, 0x4F, 0xFF, 0x51]);
    assert_eq!(&bytes[bytes.len() - 2..], &[0xFF, 0xD9]);
}

#[test]
fn every_marker_segment_length_is_exact() {
    let bytes = small_j2k();
    // Walk the main header: SOC, then length-prefixed segments until SOT.
    let mut pos = 2;
    let mut seen_siz = false;
    loop {
        assert_eq!(bytes[pos], 0xFF, "marker expected at {pos}");
        let code = u16::from_be_bytes([bytes[pos], bytes[pos + 1]]);
        if code == 0xFF90 {
            break;
        }
        let length = u16::from_be_bytes([bytes[pos + 2], bytes[pos + 3]]) as usize;
        assert!(pos + 2 + length <= bytes.len(), "segment {code:04X} overruns");
        if code == 0xFF51 {
            assert!(!seen_siz, "SIZ appears twice");
            assert_eq!(pos, 2, "SIZ must immediately follow SOC");
            seen_siz = true;
        }
        pos += 2 + length;
    }
    assert!(seen_siz);

    // SOT: Lsot is 10 and Psot spans to EOC for a single tile-part.
    let lsot = u16::from_be_bytes([bytes[pos + 2], bytes[pos + 3]]);
    assert_eq!(lsot, 10);
    let psot = u32::from_be_bytes([bytes[pos + 6], bytes[pos + 7], bytes[pos + 8], bytes[pos + 9]]);
    assert_eq!(pos + psot as usize, bytes.len() - 2);
}

#[test]
fn jp2_box_structure_is_wellformed() {
    let bytes = small_jp2();
    assert_eq!(
        &bytes[..12],
        &[0x00, 0x00, 0x00, 0x0C, 0x6A, 0x50, 0x20, 0x20, 0x0D, 0x0A, 0x87, 0x0A]
    );

    // Walk the top-level boxes after the signature.
    let mut pos = 12;
    let mut types = Vec::new();
    while pos < bytes.len() {
        let length = u32::from_be_bytes(bytes[pos..pos + 4].try_into().unwrap()) as usize;
        let box_type = &bytes[pos + 4..pos + 8];
        types.push(box_type.to_vec());
        assert!(length >= 8 && pos + length <= bytes.len());
        if box_type == b"jp2h" {
            // Exactly one ihdr and one colr inside.
            let mut inner = pos + 8;
            let end = pos + length;
            let mut ihdr = 0;
            let mut colr = 0;
            while inner < end {
                let ilen = u32::from_be_bytes(bytes[inner..inner + 4].try_into().unwrap()) as usize;
                match &bytes[inner + 4..inner + 8] {
                    b"ihdr" => ihdr += 1,
                    b"colr" => colr += 1,
                    _ => {}
                }
                inner += ilen;
            }
            assert_eq!((ihdr, colr), (1, 1));
        }
        if box_type == b"jp2c" {
            let codestream = &bytes[pos + 8..pos + length];
            assert_eq!(&codestream[..2], &[0xFF, 0x4F]);
            assert_eq!(&codestream[codestream.len() - 2..], &[0xFF, 0xD9]);
        }
        pos += length;
    }
    assert_eq!(
        types,
        vec![b"ftyp".to_vec(), b"jp2h".to_vec(), b"jp2c".to_vec()]
    );
}

// Literal scenario 4: four zero bytes are a format error.
#[test]
fn zero_bytes_are_a_format_error() {
    let err = decode(&[0x00, 0x00, 0x00, 0x00]).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::Format(_)));
}

// Literal scenario 5: JP2 with a header but no codestream box.
#[test]
fn jp2_without_codestream_box() {
    let bytes = small_jp2();
    let jp2c = bytes.windows(4).position(|w| w == b"jp2c").unwrap() - 4;
    let err = decode(&bytes[..jp2c]).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Inconsistent("missing jp2c codestream box"));
}

// Literal scenario 6: an unescaped marker code inside packet payload.
#[test]
fn marker_code_inside_packet_payload() {
    let mut bytes = small_j2k();
    // Overwrite two bytes near the end of the last code-block segment,
    // well inside declared packet payload.
    let sod = bytes.windows(2).position(|w| w == [0xFF, 0x93]).unwrap();
    let target = bytes.len() - 12;
    assert!(target > sod + 2);
    bytes[target] = 0xFF;
    bytes[target + 1] = 0x90;
    let err = decode(&bytes).unwrap_err();
    assert!(
        matches!(err.kind, ErrorKind::Corrupt(_) | ErrorKind::Truncated(_)),
        "unexpected kind: {:?}",
        err.kind
    );
    assert!(err.offset.is_some(), "error should carry an offset");
}

#[test]
fn every_prefix_truncation_is_handled() {
    let bytes = small_jp2();
    for len in 0..bytes.len() {
        // Must return an error or a (partial) image; never panic.
        let _ = decode(&bytes[..len]);
        let _ = decode_with(
            &bytes[..len],
            &DecodeOptions {
                lenient: true,
                allow_partial: true,
            },
        );
    }
}

#[test]
fn single_bit_flips_never_panic() {
    let bytes = small_jp2();
    for i in 0..bytes.len() {
        for bit in 0..8 {
            let mut mutated = bytes.clone();
            mutated[i] ^= 1 << bit;
            // Either a typed error or a decoded image is acceptable.
            let _ = decode(&mutated);
        }
    }
}

#[test]
fn bit_flips_in_j2k_never_panic() {
    let bytes = small_j2k();
    for i in 0..bytes.len() {
        for bit in 0..8 {
            let mut mutated = bytes.clone();
            mutated[i] ^= 1 << bit;
            let _ = decode_with(
                &mutated,
                &DecodeOptions {
                    lenient: true,
                    allow_partial: true,
                },
            );
        }
    }
}

#[test]
fn truncated_packet_data_errors_in_strict_mode() {
    let bytes = small_j2k();
    let sod = bytes.windows(2).position(|w| w == [0xFF, 0x93]).unwrap();
    let cut = sod + 2 + (bytes.len() - sod) / 2;
    let err = decode(&bytes[..cut]).unwrap_err();
    assert!(matches!(
        err.kind,
        ErrorKind::Truncated(_) | ErrorKind::Inconsistent(_) | ErrorKind::Corrupt(_)
    ));
}

#[test]
fn comment_survives_the_trip() {
    let options = EncoderOptions {
        comment: Some("created by jp2kit".into()),
        ..Default::default()
    };
    let bytes = encode(&small_image(), &options).unwrap();
    let info = jp2kit::read_info(&bytes).unwrap();
    assert_eq!(info.comment.as_deref(), Some("created by jp2kit"));
    // The COM marker is in the main header.
    assert!(bytes.windows(2).any(|w| w == [0xFF, 0x64]));
}

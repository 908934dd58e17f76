//! JP2 box layer (ISO/IEC 15444-1 Annex I).
//!
//! A box is a length-prefixed record: 4-byte big-endian length, 4-byte
//! ASCII type, contents. Length 1 introduces an 8-byte extended length;
//! length 0 ("to end of file") is rejected. Unknown boxes are skipped by
//! length; any declared content size above [`MAX_BOX_BYTES`] is rejected
//! before allocation.

use log::debug;

use crate::error::{checked_len, ErrorKind, Result};
use crate::image::{Colorspace, ComponentInfo};
use crate::stream_reader::StreamReader;
use crate::stream_writer::StreamWriter;

/// Upper bound on a single box's declared content size.
pub const MAX_BOX_BYTES: u64 = 1 << 30;

/// The fixed 12-byte JP2 signature box.
pub const JP2_SIGNATURE: [u8; 12] = [
    0x00, 0x00, 0x00, 0x0C, b'j', b'P', b' ', b' ', 0x0D, 0x0A, 0x87, 0x0A,
];

pub const TYPE_SIGNATURE: [u8; 4] = *b"jP  ";
pub const TYPE_FILE_TYPE: [u8; 4] = *b"ftyp";
pub const TYPE_JP2_HEADER: [u8; 4] = *b"jp2h";
pub const TYPE_IMAGE_HEADER: [u8; 4] = *b"ihdr";
pub const TYPE_BITS_PER_COMPONENT: [u8; 4] = *b"bpcc";
pub const TYPE_COLOUR: [u8; 4] = *b"colr";
pub const TYPE_CODESTREAM: [u8; 4] = *b"jp2c";

const BRAND_JP2: [u8; 4] = *b"jp2 ";
const IHDR_COMPRESSION_JPEG2000: u8 = 7;

/// One parsed box: its type and its content bytes.
pub struct Jp2Box<'a> {
    pub box_type: [u8; 4],
    pub content: &'a [u8],
}

/// Read the box at the reader's position, advancing past it.
pub fn read_box<'a>(reader: &mut StreamReader<'a>) -> Result<Jp2Box<'a>> {
    let start = reader.position();
    let l_box = reader.read_u32()?;
    let mut box_type = [0u8; 4];
    box_type.copy_from_slice(reader.read_bytes(4)?);

    let content_len = match l_box {
        0 => {
            return Err(ErrorKind::Unsupported("box running to end of file")
                .into())
        }
        1 => {
            let xl_box = reader.read_u64()?;
            xl_box
                .checked_sub(16)
                .ok_or(ErrorKind::Inconsistent("extended box length below header size"))?
        }
        n => u64::from(n)
            .checked_sub(8)
            .ok_or(ErrorKind::Inconsistent("box length below header size"))?,
    };

    let content_len = checked_len("box content", content_len, MAX_BOX_BYTES)
        .map_err(|e| e.with_offset(start))?;
    let content = reader
        .read_bytes(content_len)
        .map_err(|e| e.with_offset(start))?;

    Ok(Jp2Box { box_type, content })
}

/// Everything the box walk extracts ahead of codestream decoding.
#[derive(Debug)]
pub struct Jp2Header<'a> {
    pub width: u32,
    pub height: u32,
    pub components: Vec<ComponentInfo>,
    pub colorspace: Colorspace,
    pub icc_profile: Option<Vec<u8>>,
    pub codestream: &'a [u8],
}

pub fn is_jp2(data: &[u8]) -> bool {
    data.len() >= 12 && data[..12] == JP2_SIGNATURE
}

/// Walk the box structure of a JP2 file down to the codestream box.
pub fn parse_jp2(data: &[u8]) -> Result<Jp2Header<'_>> {
    if !is_jp2(data) {
        return Err(ErrorKind::Format("missing JP2 signature box").into());
    }

    let mut reader = StreamReader::new(data);
    // Signature box, already verified byte-for-byte.
    read_box(&mut reader)?;

    let ftyp = read_box(&mut reader)?;
    if ftyp.box_type != TYPE_FILE_TYPE {
        return Err(ErrorKind::Format("second box is not ftyp").into());
    }
    parse_ftyp(ftyp.content)?;

    let mut header: Option<(u32, u32, Vec<ComponentInfo>, Colorspace, Option<Vec<u8>>)> = None;
    let mut codestream = None;

    while !reader.is_empty() {
        let offset = reader.position();
        let bx = read_box(&mut reader)?;
        match bx.box_type {
            TYPE_JP2_HEADER => {
                header = Some(parse_jp2h(bx.content).map_err(|e| e.with_offset(offset))?);
            }
            TYPE_CODESTREAM => {
                codestream = Some(bx.content);
                break;
            }
            other => {
                debug!(
                    "skipping box {:?} ({} bytes)",
                    String::from_utf8_lossy(&other),
                    bx.content.len()
                );
            }
        }
    }

    let (width, height, components, colorspace, icc_profile) =
        header.ok_or(ErrorKind::Inconsistent("no jp2h header box before codestream"))?;
    let codestream =
        codestream.ok_or(ErrorKind::Inconsistent("missing jp2c codestream box"))?;

    Ok(Jp2Header {
        width,
        height,
        components,
        colorspace,
        icc_profile,
        codestream,
    })
}

fn parse_ftyp(content: &[u8]) -> Result<()> {
    if content.len() < 8 {
        return Err(ErrorKind::Truncated("ftyp box").into());
    }
    if content[0..4] == BRAND_JP2 {
        return Ok(());
    }
    // Accept files whose compatibility list still names jp2.
    let compatible = content[8..]
        .chunks_exact(4)
        .any(|brand| brand == BRAND_JP2);
    if compatible {
        Ok(())
    } else {
        Err(ErrorKind::Format("unknown ftyp brand").into())
    }
}

type Jp2hFields = (u32, u32, Vec<ComponentInfo>, Colorspace, Option<Vec<u8>>);

fn parse_jp2h(content: &[u8]) -> Result<Jp2hFields> {
    let mut reader = StreamReader::new(content);
    let mut ihdr: Option<(u32, u32, u16, u8)> = None;
    let mut bpcc: Option<Vec<u8>> = None;
    let mut colorspace = None;
    let mut icc_profile = None;

    while !reader.is_empty() {
        let bx = read_box(&mut reader)?;
        match bx.box_type {
            TYPE_IMAGE_HEADER => {
                if ihdr.is_some() {
                    return Err(ErrorKind::Inconsistent("more than one ihdr box").into());
                }
                ihdr = Some(parse_ihdr(bx.content)?);
            }
            TYPE_BITS_PER_COMPONENT => bpcc = Some(bx.content.to_vec()),
            TYPE_COLOUR => {
                // The first colr box wins; later ones only carry lower
                // precedence alternatives.
                if colorspace.is_none() {
                    let (cs, icc) = parse_colr(bx.content)?;
                    colorspace = Some(cs);
                    icc_profile = icc;
                }
            }
            other => {
                debug!("skipping jp2h child {:?}", String::from_utf8_lossy(&other));
            }
        }
    }

    let (height, width, nc, bpc) = ihdr.ok_or(ErrorKind::Inconsistent("jp2h without ihdr"))?;
    let colorspace = colorspace.ok_or(ErrorKind::Inconsistent("jp2h without colr"))?;

    let components = if bpc == 0xFF {
        let table = bpcc.ok_or(ErrorKind::Inconsistent("ihdr defers to missing bpcc"))?;
        if table.len() != nc as usize {
            return Err(ErrorKind::Inconsistent("bpcc entry count != component count").into());
        }
        table.iter().map(|&b| component_from_ssiz(b)).collect::<Result<_>>()?
    } else {
        let one = component_from_ssiz(bpc)?;
        vec![one; nc as usize]
    };

    Ok((width, height, components, colorspace, icc_profile))
}

fn component_from_ssiz(byte: u8) -> Result<ComponentInfo> {
    let precision = (byte & 0x7F) + 1;
    if !(1..=16).contains(&precision) {
        return Err(ErrorKind::Inconsistent("bits-per-component outside 1..=16").into());
    }
    Ok(ComponentInfo {
        precision,
        signed: byte & 0x80 != 0,
    })
}

fn parse_ihdr(content: &[u8]) -> Result<(u32, u32, u16, u8)> {
    let mut reader = StreamReader::new(content);
    let height = reader.read_u32()?;
    let width = reader.read_u32()?;
    let nc = reader.read_u16()?;
    let bpc = reader.read_u8()?;
    let compression = reader.read_u8()?;
    let _unknown_colorspace = reader.read_u8()?;
    let _ipr = reader.read_u8()?;
    if compression != IHDR_COMPRESSION_JPEG2000 {
        return Err(ErrorKind::Format("unsupported compression type in ihdr").into());
    }
    if nc == 0 {
        return Err(ErrorKind::Inconsistent("ihdr declares zero components").into());
    }
    Ok((height, width, nc, bpc))
}

fn parse_colr(content: &[u8]) -> Result<(Colorspace, Option<Vec<u8>>)> {
    let mut reader = StreamReader::new(content);
    let method = reader.read_u8()?;
    let _precedence = reader.read_u8()?;
    let _approximation = reader.read_u8()?;
    match method {
        1 => {
            let code = reader.read_u32()?;
            Ok((Colorspace::from_code(code), None))
        }
        2 | 3 => {
            let icc = reader.tail().to_vec();
            if icc.is_empty() {
                return Err(ErrorKind::Truncated("colr ICC profile").into());
            }
            // ICC-described colorspaces are reported as unknown; the
            // profile bytes travel alongside for the host to interpret.
            Ok((Colorspace::Unknown(0), Some(icc)))
        }
        _ => Err(ErrorKind::Unsupported("colr method outside 1..=3").into()),
    }
}

fn write_box(writer: &mut StreamWriter, box_type: [u8; 4], content: &[u8]) {
    writer.write_u32(content.len() as u32 + 8);
    writer.write_bytes(&box_type);
    writer.write_bytes(content);
}

/// Wrap a finished codestream in the minimal JP2 box set:
/// signature, ftyp, jp2h (ihdr + colr), jp2c.
pub fn write_jp2(
    codestream: &[u8],
    width: u32,
    height: u32,
    components: &[ComponentInfo],
    colorspace: Colorspace,
) -> Vec<u8> {
    let mut writer = StreamWriter::with_capacity(codestream.len() + 96);
    writer.write_bytes(&JP2_SIGNATURE);

    let mut ftyp = StreamWriter::new();
    ftyp.write_bytes(&BRAND_JP2);
    ftyp.write_u32(0);
    ftyp.write_bytes(&BRAND_JP2);
    write_box(&mut writer, TYPE_FILE_TYPE, ftyp.as_bytes());

    let mut ihdr = StreamWriter::new();
    ihdr.write_u32(height);
    ihdr.write_u32(width);
    ihdr.write_u16(components.len() as u16);
    let first = components[0];
    ihdr.write_u8((first.precision - 1) | if first.signed { 0x80 } else { 0 });
    ihdr.write_u8(IHDR_COMPRESSION_JPEG2000);
    ihdr.write_u8(0);
    ihdr.write_u8(0);

    let mut colr = StreamWriter::new();
    colr.write_u8(1); // enumerated method
    colr.write_u8(0);
    colr.write_u8(0);
    colr.write_u32(colorspace.code().unwrap_or(16));

    let mut jp2h = StreamWriter::new();
    write_box(&mut jp2h, TYPE_IMAGE_HEADER, ihdr.as_bytes());
    write_box(&mut jp2h, TYPE_COLOUR, colr.as_bytes());
    write_box(&mut writer, TYPE_JP2_HEADER, jp2h.as_bytes());

    write_box(&mut writer, TYPE_CODESTREAM, codestream);
    writer.into_bytes()
}

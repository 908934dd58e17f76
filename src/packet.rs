//! Tier-2 packet assembly and parsing (ITU-T T.800 B.9/B.10).
//!
//! A packet covers one (layer, resolution, component, precinct) and
//! consists of a bit-packed header followed by the concatenated
//! code-block contributions. The header carries, per code-block:
//! inclusion (tag tree on first inclusion, one bit afterwards),
//! zero-bit-plane count (tag tree, first inclusion only), the number of
//! coding passes (Table B.4 codewords) and the byte length via the
//! Lblock scheme of B.10.7.1.

use log::warn;

use crate::bit_io::{BitReader, BitWriter};
use crate::error::{CodecError, ErrorKind, Result};
use crate::marker::Marker;
use crate::stream_writer::StreamWriter;
use crate::tag_tree::TagTree;

/// Highest pass count Table B.4 can signal.
pub const MAX_CODING_PASSES: u32 = 164;

/// Cap on the zero-bit-plane count a stream may declare.
const MAX_MISSING_PLANES: u32 = 63;

/// Encoder-side description of one code-block's contribution to a packet.
pub struct BlockContribution<'a> {
    pub data: &'a [u8],
    pub passes: u32,
    pub missing_planes: u32,
}

/// Encoder-side: every code-block of one band, row-major over the grid.
pub struct BandContributions<'a> {
    /// Code-blocks across and down.
    pub grid: (usize, usize),
    pub blocks: Vec<BlockContribution<'a>>,
}

fn write_pass_count(writer: &mut BitWriter, passes: u32) {
    debug_assert!((1..=MAX_CODING_PASSES).contains(&passes));
    match passes {
        1 => writer.write_bit(0),
        2 => writer.write_bits(0b10, 2),
        3..=5 => writer.write_bits(0b1100 + (passes - 3), 4),
        6..=36 => {
            writer.write_bits(0b1111, 4);
            writer.write_bits(passes - 6, 5);
        }
        _ => {
            writer.write_bits(0x1FF, 9);
            writer.write_bits(passes - 37, 7);
        }
    }
}

fn read_pass_count(reader: &mut BitReader) -> Result<u32> {
    if reader.read_bit()? == 0 {
        return Ok(1);
    }
    if reader.read_bit()? == 0 {
        return Ok(2);
    }
    let two = reader.read_bits(2)?;
    if two < 3 {
        return Ok(3 + two);
    }
    let five = reader.read_bits(5)?;
    if five < 31 {
        return Ok(6 + five);
    }
    Ok(37 + reader.read_bits(7)?)
}

fn length_bits(lblock: u32, passes: u32) -> u32 {
    lblock + passes.ilog2()
}

/// Emit one packet: optional SOP, the header, optional EPH, the bodies.
///
/// The encoder produces a single quality layer, so the tag trees are
/// built fresh per packet: inclusion value 0 for contributing blocks and
/// 1 (i.e. "a later layer") for empty ones.
pub fn write_packet(
    out: &mut StreamWriter,
    bands: &[BandContributions],
    sop_markers: bool,
    eph_markers: bool,
    sequence: u16,
) {
    if sop_markers {
        out.write_u16(Marker::Sop.into());
        out.write_u16(4);
        out.write_u16(sequence);
    }

    let any_included = bands
        .iter()
        .any(|band| band.blocks.iter().any(|b| b.passes > 0));

    let mut header = BitWriter::new();
    if !any_included {
        header.write_bit(0);
    } else {
        header.write_bit(1);
        for band in bands {
            let (across, down) = band.grid;
            if across == 0 || down == 0 {
                continue;
            }
            let mut inclusion = TagTree::new(across, down);
            let mut zero_planes = TagTree::new(across, down);
            inclusion.seed_for_encoding();
            zero_planes.seed_for_encoding();
            for by in 0..down {
                for bx in 0..across {
                    let block = &band.blocks[by * across + bx];
                    inclusion.set_value(bx, by, (block.passes == 0) as u32);
                    zero_planes.set_value(bx, by, block.missing_planes);
                }
            }
            for by in 0..down {
                for bx in 0..across {
                    let block = &band.blocks[by * across + bx];
                    inclusion.encode(bx, by, 1, &mut header);
                    if block.passes == 0 {
                        continue;
                    }
                    zero_planes.encode(bx, by, u32::MAX, &mut header);
                    write_pass_count(&mut header, block.passes);

                    // Lblock starts at three; raise it until the byte
                    // count fits.
                    let needed = u32::max(1, crate::quantization::magnitude_bits(block.data.len() as u32) as u32);
                    let raise = needed.saturating_sub(length_bits(3, block.passes));
                    for _ in 0..raise {
                        header.write_bit(1);
                    }
                    header.write_bit(0);
                    header.write_bits(
                        block.data.len() as u32,
                        length_bits(3 + raise, block.passes) as u8,
                    );
                }
            }
        }
    }
    out.write_bytes(&header.finish());

    if eph_markers {
        out.write_u16(Marker::Eph.into());
    }

    for band in bands {
        for block in &band.blocks {
            out.write_bytes(block.data);
        }
    }
}

/// Decode-side running state of one code-block across layers.
#[derive(Debug, Clone, Default)]
pub struct CodeBlockDecodeState {
    pub included: bool,
    pub missing_planes: u8,
    pub lblock: u32,
    pub passes: u32,
    /// Concatenation of every codeword segment received so far.
    pub data: Vec<u8>,
}

/// Decode-side state of one precinct of one band.
#[derive(Debug, Clone)]
pub struct PrecinctDecoder {
    pub grid: (usize, usize),
    inclusion: TagTree,
    zero_planes: TagTree,
    pub blocks: Vec<CodeBlockDecodeState>,
}

impl PrecinctDecoder {
    pub fn new(grid: (usize, usize)) -> Self {
        let mut blocks = vec![CodeBlockDecodeState::default(); grid.0 * grid.1];
        for block in &mut blocks {
            block.lblock = 3;
        }
        Self {
            grid,
            inclusion: TagTree::new(grid.0, grid.1),
            zero_planes: TagTree::new(grid.0, grid.1),
            blocks,
        }
    }
}

/// Parse one packet from the head of `data`, crediting code-block
/// segments to the precinct states. Returns the bytes consumed.
/// `base_offset` is the absolute stream position of `data[0]`, used for
/// error reports.
pub fn read_packet(
    data: &[u8],
    bands: &mut [&mut PrecinctDecoder],
    layer: u16,
    sop_markers: bool,
    eph_markers: bool,
    base_offset: u64,
) -> Result<usize> {
    let mut pos = 0usize;

    if sop_markers && data.len() >= 2 && data[0..2] == u16::from(Marker::Sop).to_be_bytes() {
        // SOP: marker, Lsop = 4, Nsop.
        if data.len() < 6 {
            return Err(ErrorKind::Truncated("SOP marker segment").into());
        }
        pos = 6;
    }

    let mut reader = BitReader::new(&data[pos..]);
    let mut entries: Vec<(usize, usize, u32, usize)> = Vec::new();

    if reader
        .read_bit()
        .map_err(|e| e.with_offset(base_offset + pos as u64))?
        == 1
    {
        for (band_idx, band) in bands.iter_mut().enumerate() {
            let (across, down) = band.grid;
            for by in 0..down {
                for bx in 0..across {
                    let block_idx = by * across + bx;
                    let first_time = !band.blocks[block_idx].included;

                    let included_now = if first_time {
                        band.inclusion
                            .decode(bx, by, layer as u32 + 1, &mut reader)?
                            <= layer as u32
                    } else {
                        reader.read_bit()? == 1
                    };
                    if !included_now {
                        continue;
                    }

                    if first_time {
                        let missing =
                            band.zero_planes.decode(bx, by, u32::MAX, &mut reader)?;
                        if missing > MAX_MISSING_PLANES {
                            return Err(ErrorKind::Corrupt("zero-bit-plane count").into());
                        }
                        band.blocks[block_idx].missing_planes = missing as u8;
                        band.blocks[block_idx].included = true;
                    }

                    let added = read_pass_count(&mut reader)?;

                    let mut raise = 0u32;
                    while reader.read_bit()? == 1 {
                        raise += 1;
                        if raise > 32 {
                            return Err(ErrorKind::Corrupt("Lblock escape run").into());
                        }
                    }
                    let block = &mut band.blocks[block_idx];
                    block.lblock += raise;
                    let bits = length_bits(block.lblock, added);
                    if bits > 32 {
                        return Err(ErrorKind::Corrupt("code-block length field width").into());
                    }
                    let length = reader.read_bits(bits as u8)? as usize;
                    block.passes += added;
                    if block.passes > MAX_CODING_PASSES {
                        return Err(ErrorKind::Corrupt("accumulated coding passes").into());
                    }
                    entries.push((band_idx, block_idx, added, length));
                }
            }
        }
    }

    reader.align_to_byte()?;
    let mut body = pos + reader.byte_position();

    if eph_markers {
        let marker = data
            .get(body..body + 2)
            .ok_or(CodecError::new(ErrorKind::Truncated("EPH marker")))?;
        if marker != u16::from(Marker::Eph).to_be_bytes() {
            warn!("expected EPH after packet header, found {marker:02X?}");
            return Err(ErrorKind::Corrupt("missing EPH marker").into());
        }
        body += 2;
    }

    for (band_idx, block_idx, _added, length) in entries {
        let segment = data.get(body..body + length).ok_or(
            CodecError::new(ErrorKind::Truncated("code-block segment"))
                .with_offset(base_offset + body as u64),
        )?;
        // Tier-1 output never holds a byte above 0x8F after an 0xFF; a
        // marker code inside a payload means the framing is wrong, and
        // resyncing over it silently would mask the damage.
        if let Some(i) = segment
            .windows(2)
            .position(|pair| pair[0] == 0xFF && (0x90..=0x93).contains(&pair[1]))
        {
            return Err(
                CodecError::new(ErrorKind::Corrupt("marker code inside packet payload"))
                    .with_offset(base_offset + (body + i + 1) as u64),
            );
        }
        bands[band_idx].blocks[block_idx].data.extend_from_slice(segment);
        body += length;
    }

    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pass_count_codewords_roundtrip() {
        for passes in 1..=MAX_CODING_PASSES {
            let mut writer = BitWriter::new();
            write_pass_count(&mut writer, passes);
            // Pad so the reader has whole bytes to work with.
            writer.write_bits(0, 7);
            let bytes = writer.finish();
            let mut reader = BitReader::new(&bytes);
            assert_eq!(read_pass_count(&mut reader).unwrap(), passes);
        }
    }

    fn single_band_packet(
        data: &[&[u8]],
        passes: &[u32],
        missing: &[u32],
        grid: (usize, usize),
    ) -> Vec<u8> {
        let blocks: Vec<BlockContribution> = data
            .iter()
            .zip(passes)
            .zip(missing)
            .map(|((d, &p), &m)| BlockContribution {
                data: d,
                passes: p,
                missing_planes: m,
            })
            .collect();
        let band = BandContributions { grid, blocks };
        let mut out = StreamWriter::new();
        write_packet(&mut out, &[band], false, false, 0);
        out.into_bytes()
    }

    #[test]
    fn empty_packet_is_one_byte() {
        let bytes = single_band_packet(&[&[], &[]], &[0, 0], &[0, 0], (2, 1));
        assert_eq!(bytes, vec![0x00]);

        let mut precinct = PrecinctDecoder::new((2, 1));
        let consumed = read_packet(&bytes, &mut [&mut precinct], 0, false, false, 0).unwrap();
        assert_eq!(consumed, 1);
        assert!(precinct.blocks.iter().all(|b| !b.included));
    }

    #[test]
    fn packet_roundtrip_mixed_blocks() {
        let d0 = [0x12, 0x34, 0x56];
        let d2 = [0xAB; 300];
        let bytes = single_band_packet(
            &[&d0, &[], &d2, &[]],
            &[4, 0, 19, 0],
            &[2, 0, 0, 0],
            (2, 2),
        );

        let mut precinct = PrecinctDecoder::new((2, 2));
        let consumed = read_packet(&bytes, &mut [&mut precinct], 0, false, false, 0).unwrap();
        assert_eq!(consumed, bytes.len());

        assert!(precinct.blocks[0].included);
        assert_eq!(precinct.blocks[0].passes, 4);
        assert_eq!(precinct.blocks[0].missing_planes, 2);
        assert_eq!(precinct.blocks[0].data, d0);

        assert!(!precinct.blocks[1].included);

        assert!(precinct.blocks[2].included);
        assert_eq!(precinct.blocks[2].passes, 19);
        assert_eq!(precinct.blocks[2].data, d2.to_vec());

        assert!(!precinct.blocks[3].included);
    }

    #[test]
    fn sop_and_eph_wrap_the_header() {
        let d0 = [0x01, 0x02];
        let blocks = vec![BlockContribution {
            data: &d0,
            passes: 1,
            missing_planes: 0,
        }];
        let band = BandContributions {
            grid: (1, 1),
            blocks,
        };
        let mut out = StreamWriter::new();
        write_packet(&mut out, &[band], true, true, 7);
        let bytes = out.into_bytes();

        assert_eq!(&bytes[..2], &u16::from(Marker::Sop).to_be_bytes());
        assert_eq!(&bytes[2..4], &[0, 4]);
        assert_eq!(&bytes[4..6], &[0, 7]);

        let mut precinct = PrecinctDecoder::new((1, 1));
        let consumed = read_packet(&bytes, &mut [&mut precinct], 0, true, true, 0).unwrap();
        assert_eq!(consumed, bytes.len());
        assert_eq!(precinct.blocks[0].data, d0);
    }

    #[test]
    fn truncated_body_reports_truncation() {
        let d0 = [0x55; 40];
        let bytes = single_band_packet(&[&d0], &[7], &[1], (1, 1));
        let mut precinct = PrecinctDecoder::new((1, 1));
        let err = read_packet(&bytes[..bytes.len() - 5], &mut [&mut precinct], 0, false, false, 0)
            .unwrap_err();
        assert!(matches!(err.kind, ErrorKind::Truncated(_)));
    }
}

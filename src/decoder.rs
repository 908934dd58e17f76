//! Inverse pipeline: codestream bytes to samples.
//!
//! The driver detects JP2 against raw J2K by the leading bytes, walks the
//! main header, then consumes tile-parts packet by packet in the declared
//! progression order. Reconstruction runs per tile: tier-1 on the worker
//! pool, dequantization, inverse DWT, inverse MCT, DC shift, clamp.

use log::{debug, warn};

use crate::bit_plane_coder::decode_block;
use crate::codestream::{
    read_main_header, MainHeader, Segment, Sot, Transformation, CB_STYLE_HT,
};
use crate::error::{CodecError, ErrorKind, Result};
use crate::image::{Colorspace, ComponentInfo, DecodedImage, PlanarImage, StreamInfo};
use crate::jp2;
use crate::marker::Marker;
use crate::mct;
use crate::options::{DecodeOptions, Format};
use crate::packet::{read_packet, PrecinctDecoder};
use crate::pool;
use crate::progression::{packet_sequence, ProgressionStep};
use crate::quantization::{band_bitplane_budget, band_step};
use crate::stream_reader::StreamReader;
use crate::tile::{self, Band, Rect};
use crate::{dwt, quantization};

pub fn decode(data: &[u8]) -> Result<DecodedImage> {
    decode_with(data, &DecodeOptions::default())
}

pub fn decode_with(data: &[u8], options: &DecodeOptions) -> Result<DecodedImage> {
    let (codestream, colorspace, base) = locate_codestream(data)?;
    let image = decode_codestream(codestream, options)
        .map_err(|e| match e.offset {
            Some(offset) => CodecError {
                offset: Some(offset + base),
                kind: e.kind,
            },
            None => e,
        })?;
    Ok(DecodedImage { image, colorspace })
}

/// Identify the container and find the codestream bytes.
fn locate_codestream(data: &[u8]) -> Result<(&[u8], Colorspace, u64)> {
    if jp2::is_jp2(data) {
        let header = jp2::parse_jp2(data)?;
        let base = header.codestream.as_ptr() as u64 - data.as_ptr() as u64;
        Ok((header.codestream, header.colorspace, base))
    } else if data.len() >= 2 && data[0..2] == u16::from(Marker::Soc).to_be_bytes() {
        Ok((data, Colorspace::Unspecified, 0))
    } else {
        Err(ErrorKind::Format("neither a JP2 signature nor an SOC marker").into())
    }
}

/// Running decode state of one tile.
struct TileDecodeState {
    /// `[component][resolution][band]`.
    precincts: Vec<Vec<Vec<PrecinctDecoder>>>,
    steps: Vec<ProgressionStep>,
    packets_done: usize,
}

fn decode_codestream(codestream: &[u8], options: &DecodeOptions) -> Result<PlanarImage> {
    let mut reader = StreamReader::new(codestream);
    let header = read_main_header(&mut reader)?;
    check_supported(&header)?;

    let siz = &header.siz;
    let levels = header.cod.decomposition_levels;
    let components = siz.components.len();
    let (precision, signed) = siz.component_format();
    let cb_w = 1usize << header.cod.cb_width_exp;
    let cb_h = 1usize << header.cod.cb_height_exp;

    let tile_rects = tile::tile_rects(
        siz.width as usize,
        siz.height as usize,
        siz.tile_width.min(siz.width) as usize,
        siz.tile_height.min(siz.height) as usize,
    );

    let mut tiles: Vec<TileDecodeState> = tile_rects
        .iter()
        .map(|rect| {
            let resolutions = tile::resolutions(rect.w, rect.h, levels);
            let precincts = (0..components)
                .map(|_| {
                    resolutions
                        .iter()
                        .map(|resolution| {
                            resolution
                                .bands
                                .iter()
                                .map(|band| {
                                    PrecinctDecoder::new(tile::code_block_grid(
                                        band.rect.w,
                                        band.rect.h,
                                        cb_w,
                                        cb_h,
                                    ))
                                })
                                .collect()
                        })
                        .collect()
                })
                .collect();
            TileDecodeState {
                precincts,
                steps: packet_sequence(
                    header.cod.progression,
                    header.cod.layers,
                    levels + 1,
                    components as u16,
                ),
                packets_done: 0,
            }
        })
        .collect();

    // Tile-part loop.
    let mut truncated = false;
    loop {
        let offset = reader.position();
        match reader.peek_u16() {
            Some(code) if code == u16::from(Marker::Eoc) => {
                reader.skip(2)?;
                break;
            }
            Some(code) if code == u16::from(Marker::Sot) => {
                if let Err(e) = read_tile_part(&mut reader, codestream, &header, &mut tiles) {
                    if options.allow_partial {
                        warn!("stopping at damaged tile-part: {e}");
                        truncated = true;
                        break;
                    }
                    return Err(e);
                }
            }
            Some(_) => {
                return Err(CodecError::new(ErrorKind::Format(
                    "expected SOT or EOC between tile-parts",
                ))
                .with_offset(offset));
            }
            None => {
                if options.allow_partial {
                    warn!("input ended before EOC");
                    truncated = true;
                    break;
                }
                return Err(
                    CodecError::new(ErrorKind::Truncated("missing EOC marker")).with_offset(offset)
                );
            }
        }
    }
    if truncated {
        debug!("returning partial reconstruction");
    }

    if !options.allow_partial {
        for (index, tile) in tiles.iter().enumerate() {
            if tile.packets_done < tile.steps.len() {
                debug!(
                    "tile {index}: {} of {} packets arrived",
                    tile.packets_done,
                    tile.steps.len()
                );
                return Err(ErrorKind::Truncated("tile packet data").into());
            }
        }
    }

    // Reconstruction.
    let mut image = PlanarImage::new(siz.width, siz.height, precision, signed, components);
    for (rect, state) in tile_rects.iter().zip(&mut tiles) {
        reconstruct_tile(&mut image, rect, state, &header, options)?;
    }
    Ok(image)
}

fn check_supported(header: &MainHeader) -> Result<()> {
    let style = header.cod.cb_style;
    if style & CB_STYLE_HT != 0 {
        return Err(ErrorKind::Unsupported("HTJ2K code-block coding").into());
    }
    if style != 0 {
        return Err(ErrorKind::Unsupported("code-block style modes").into());
    }
    Ok(())
}

/// Parse one tile-part: SOT segment, header overrides, SOD, packet data.
fn read_tile_part(
    reader: &mut StreamReader,
    codestream: &[u8],
    header: &MainHeader,
    tiles: &mut [TileDecodeState],
) -> Result<()> {
    let sot_start = reader.position();
    let sot = match Segment::read(reader)? {
        Segment::Sot(sot) => sot,
        _ => unreachable!("caller peeked the SOT code"),
    };
    let tile_index = sot.tile_index as usize;
    if tile_index >= tiles.len() {
        return Err(CodecError::new(ErrorKind::Inconsistent("tile index out of range"))
            .with_offset(sot_start));
    }

    // Segments between SOT and SOD.
    loop {
        let offset = reader.position();
        match reader.peek_u16() {
            Some(code) if code == u16::from(Marker::Sod) => {
                reader.skip(2)?;
                break;
            }
            None => {
                return Err(
                    CodecError::new(ErrorKind::Truncated("tile-part header")).with_offset(offset)
                )
            }
            Some(_) => match Segment::read(reader)? {
                Segment::Cod(_) | Segment::Qcd(_) => {
                    return Err(CodecError::new(ErrorKind::Unsupported(
                        "tile-part coding-style overrides",
                    ))
                    .with_offset(offset));
                }
                _ => {}
            },
        }
    }

    let data_start = reader.position() as usize;
    let data_end = tile_part_end(&sot, sot_start, data_start, codestream.len())?;
    let body = &codestream[data_start..data_end];

    let state = &mut tiles[tile_index];
    let mut pos = 0usize;
    while state.packets_done < state.steps.len() && pos < body.len() {
        let step = state.steps[state.packets_done];
        let mut bands: Vec<&mut PrecinctDecoder> = state.precincts[step.component as usize]
            [step.resolution as usize]
            .iter_mut()
            .collect();
        let consumed = read_packet(
            &body[pos..],
            &mut bands,
            step.layer,
            header.cod.sop_markers,
            header.cod.eph_markers,
            (data_start + pos) as u64,
        )
        .map_err(|e| e.with_offset((data_start + pos) as u64))?;
        pos += consumed;
        state.packets_done += 1;
    }

    if pos < body.len() {
        // Spec: resync to the next marker, reporting the skipped bytes.
        warn!(
            "tile {} part {}: resync skipped {} trailing bytes",
            sot.tile_index,
            sot.tile_part_index,
            body.len() - pos
        );
    }
    reader.seek(data_end as u64)
}

fn tile_part_end(
    sot: &Sot,
    sot_start: u64,
    data_start: usize,
    total_len: usize,
) -> Result<usize> {
    if sot.tile_part_length == 0 {
        // Open-ended tile-part: runs to EOC.
        return Ok(total_len.saturating_sub(2).max(data_start));
    }
    let end = sot_start as usize + sot.tile_part_length as usize;
    if end < data_start || end > total_len {
        return Err(CodecError::new(ErrorKind::Inconsistent(
            "Psot disagrees with the stream length",
        ))
        .with_offset(sot_start));
    }
    Ok(end)
}

/// Tier-1 + inverse transforms for one tile, writing into `image`.
fn reconstruct_tile(
    image: &mut PlanarImage,
    rect: &Rect,
    state: &TileDecodeState,
    header: &MainHeader,
    options: &DecodeOptions,
) -> Result<()> {
    let levels = header.cod.decomposition_levels;
    let components = image.component_count();
    let reversible = header.cod.transformation == Transformation::Reversible53;
    let cb_w = 1usize << header.cod.cb_width_exp;
    let cb_h = 1usize << header.cod.cb_height_exp;
    let resolutions = tile::resolutions(rect.w, rect.h, levels);

    // Collect tier-1 jobs across the whole tile.
    struct Job {
        data: Vec<u8>,
        block: Rect,
        band: Band,
        missing: u8,
        budget: u8,
        passes: u32,
        component: usize,
    }
    let mut jobs = Vec::new();
    for component in 0..components {
        for resolution in &resolutions {
            for (band_idx, band) in resolution.bands.iter().enumerate() {
                let precinct = &state.precincts[component][resolution.index as usize][band_idx];
                let blocks = tile::band_code_blocks(band.rect.w, band.rect.h, cb_w, cb_h);
                for (block_rect, block_state) in blocks.iter().zip(&precinct.blocks) {
                    if block_state.passes == 0 {
                        continue;
                    }
                    jobs.push(Job {
                        data: block_state.data.clone(),
                        block: *block_rect,
                        band: *band,
                        missing: block_state.missing_planes,
                        budget: band_bitplane_budget(&header.qcd, band, levels),
                        passes: block_state.passes,
                        component,
                    });
                }
            }
        }
    }

    let lenient = options.lenient;
    let decoded: Vec<(usize, Band, Rect, std::result::Result<Vec<i32>, ErrorKind>)> =
        pool::run_indexed(jobs, |job| {
            let result = decode_block(
                &job.data,
                job.block.w,
                job.block.h,
                job.band.band_type,
                job.missing,
                job.budget,
                job.passes,
            );
            (job.component, job.band, job.block, result)
        });

    // Scatter results into per-component arenas.
    let mut int_planes = vec![vec![0i32; rect.area()]; if reversible { components } else { 0 }];
    let mut float_planes = vec![vec![0f64; rect.area()]; if reversible { 0 } else { components }];

    for (component, band, block, result) in decoded {
        let coefficients = match result {
            Ok(c) => c,
            Err(kind) => {
                if lenient {
                    warn!("zero-filling corrupt code-block: {kind}");
                    vec![0; block.area()]
                } else {
                    return Err(kind.into());
                }
            }
        };
        if reversible {
            tile::write_block(&mut int_planes[component], rect.w, &band.rect, &block, &coefficients);
        } else {
            let step = band_step(&header.qcd, &band, levels);
            let (precision, _) = header.siz.component_format();
            let rb = precision + band.band_type.gain();
            let delta = step.delta(rb);
            let dequantized: Vec<f64> = coefficients
                .iter()
                .map(|&q| quantization::dequantize(q, delta))
                .collect();
            tile::write_block(&mut float_planes[component], rect.w, &band.rect, &block, &dequantized);
        }
    }

    // Inverse DWT per component, then inverse MCT across the first three.
    let (precision, signed) = header.siz.component_format();
    let mct_enabled = header.cod.mct && components >= 3;

    let mut sample_planes: Vec<Vec<i32>> = if reversible {
        for plane in &mut int_planes {
            dwt::inverse_multi_53(plane, rect.w, rect.h, rect.w, levels);
        }
        if mct_enabled {
            let (first, rest) = int_planes.split_at_mut(1);
            let (second, third) = rest.split_at_mut(1);
            mct::inverse_rct(&mut first[0], &mut second[0], &mut third[0]);
        }
        int_planes
    } else {
        for plane in &mut float_planes {
            dwt::inverse_multi_97(plane, rect.w, rect.h, rect.w, levels);
        }
        if mct_enabled {
            let (first, rest) = float_planes.split_at_mut(1);
            let (second, third) = rest.split_at_mut(1);
            mct::inverse_ict(&mut first[0], &mut second[0], &mut third[0]);
        }
        float_planes
            .iter()
            .map(|plane| plane.iter().map(|&v| v.round() as i32).collect())
            .collect()
    };

    let (low, high) = image.sample_range();
    for plane in &mut sample_planes {
        if !signed {
            mct::dc_shift_inverse(plane, precision);
        }
        for sample in plane.iter_mut() {
            *sample = (*sample).clamp(low, high);
        }
    }

    // Place the tile into the image planes.
    let width = image.width as usize;
    for (out, tile_plane) in image.planes.iter_mut().zip(&sample_planes) {
        for row in 0..rect.h {
            let start = (rect.y0 + row) * width + rect.x0;
            out[start..start + rect.w].copy_from_slice(&tile_plane[row * rect.w..(row + 1) * rect.w]);
        }
    }
    Ok(())
}

/// Read stream metadata without decoding pixel data.
pub fn read_info(data: &[u8]) -> Result<StreamInfo> {
    let (format, codestream, colorspace, icc_profile) = if jp2::is_jp2(data) {
        let jp2_header = jp2::parse_jp2(data)?;
        (
            Format::Jp2,
            jp2_header.codestream,
            jp2_header.colorspace,
            jp2_header.icc_profile,
        )
    } else if data.len() >= 2 && data[0..2] == u16::from(Marker::Soc).to_be_bytes() {
        (Format::J2k, data, Colorspace::Unspecified, None)
    } else {
        return Err(ErrorKind::Format("neither a JP2 signature nor an SOC marker").into());
    };

    let mut reader = StreamReader::new(codestream);
    let header = read_main_header(&mut reader)?;

    let comment = header.com.as_ref().and_then(|com| {
        (com.registration == 1).then(|| String::from_utf8_lossy(&com.data).into_owned())
    });

    let components: Vec<ComponentInfo> = header.siz.components.clone();
    Ok(StreamInfo {
        format,
        width: header.siz.width,
        height: header.siz.height,
        components,
        colorspace,
        profile: header.siz.rsiz,
        decomposition_levels: header.cod.decomposition_levels,
        layers: header.cod.layers,
        tile_width: header.siz.tile_width,
        tile_height: header.siz.tile_height,
        tile_count: header.siz.tile_count(),
        icc_profile,
        comment,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn garbage_input_is_a_format_error() {
        let err = decode(&[0x00, 0x00, 0x00, 0x00]).unwrap_err();
        assert!(matches!(err.kind, ErrorKind::Format(_)));
        assert!(decode(&[]).is_err());
    }

    #[test]
    fn ht_signalling_is_unsupported() {
        use crate::codestream::{Cod, Qcd, QuantizationValues, Siz};
        use crate::progression::ProgressionOrder;
        let header = MainHeader {
            siz: Siz {
                rsiz: 0,
                width: 8,
                height: 8,
                x_offset: 0,
                y_offset: 0,
                tile_width: 8,
                tile_height: 8,
                tile_x_offset: 0,
                tile_y_offset: 0,
                components: vec![ComponentInfo {
                    precision: 8,
                    signed: false,
                }],
            },
            cod: Cod {
                sop_markers: false,
                eph_markers: false,
                progression: ProgressionOrder::Lrcp,
                layers: 1,
                mct: false,
                decomposition_levels: 0,
                cb_width_exp: 6,
                cb_height_exp: 6,
                cb_style: CB_STYLE_HT,
                transformation: Transformation::Reversible53,
            },
            qcd: Qcd {
                guard_bits: 2,
                values: QuantizationValues::NoQuantization { exponents: vec![9] },
            },
            cap: None,
            com: None,
        };
        let err = check_supported(&header).unwrap_err();
        assert!(matches!(err.kind, ErrorKind::Unsupported(_)));
    }
}

//! Forward pipeline: samples to codestream.
//!
//! Stages per tile: DC level shift, optional MCT, multi-level DWT into the
//! tile arena, code-block partitioning, tier-1 on the worker pool, tier-2
//! packet assembly, tile-part framing. The whole stream builds in a
//! buffered writer and is only handed out on success.
//!
//! Tile transforms run before the main header is written: the reversible
//! path widens a subband's quantization exponent when the actual
//! coefficient range needs more bit-planes than the nominal budget, and
//! the exponents live in QCD.

use log::debug;

use crate::bit_plane_coder::{encode_block, EncodedBlock};
use crate::codestream::{
    write_main_header, Cap, Cod, Com, MainHeader, Qcd, QuantizationValues, Segment, Siz, Sot,
    Transformation, CB_STYLE_HT,
};
use crate::dwt;
use crate::error::{ErrorKind, Result};
use crate::image::{Colorspace, ComponentInfo, PlanarImage};
use crate::jp2;
use crate::marker::Marker;
use crate::mct;
use crate::options::{EncoderOptions, Format};
use crate::packet::{write_packet, BandContributions, BlockContribution, MAX_CODING_PASSES};
use crate::pool;
use crate::progression::packet_sequence;
use crate::quantization::{
    self, band_bitplane_budget, band_step, magnitude_bits, max_bitplanes, quality_step, StepSize,
    GUARD_BITS,
};
use crate::stream_writer::StreamWriter;
use crate::tile::{self, Band, Rect};

/// Per-tile coefficient arenas, one plane per component, in the quadrant
/// layout the multi-level DWT leaves behind.
enum TileArena {
    Reversible(Vec<Vec<i32>>),
    Irreversible(Vec<Vec<f64>>),
}

pub fn encode(image: &PlanarImage, options: &EncoderOptions) -> Result<Vec<u8>> {
    image.validate()?;
    let options = options.normalized();

    let staged;
    let image = match apply_precision_override(image, &options) {
        Some(scaled) => {
            staged = scaled;
            &staged
        }
        None => image,
    };

    let lossless = options.lossless;
    let levels = options.resolutions - 1;
    let components = image.component_count();
    let precision = image.precision;
    let mct_enabled = components >= 3;
    let cb_w = 1usize << options.code_block_exp.0;
    let cb_h = 1usize << options.code_block_exp.1;

    let (tile_w, tile_h) = match options.tile_size {
        Some((w, h)) => (w.clamp(1, image.width), h.clamp(1, image.height)),
        None => (image.width, image.height),
    };
    let tile_rects = tile::tile_rects(
        image.width as usize,
        image.height as usize,
        tile_w as usize,
        tile_h as usize,
    );
    if tile_rects.len() > u16::MAX as usize {
        return Err(ErrorKind::Inconsistent("more tiles than SOT can index").into());
    }

    // Transform every tile up front; QCD depends on the outcome.
    let mut arenas = Vec::with_capacity(tile_rects.len());
    for rect in &tile_rects {
        if options.is_cancelled() {
            return Err(ErrorKind::Cancelled.into());
        }
        arenas.push(transform_tile(image, rect, lossless, mct_enabled, levels));
    }

    // Effective precision seen by the coefficient path: the reversible
    // colour transform widens the chroma channels by one bit.
    let effective_precision = precision + (lossless && mct_enabled) as u8;

    let band_layout = band_order(levels);
    let qcd = build_qcd(
        lossless,
        &options,
        levels,
        effective_precision,
        &band_layout,
        &arenas,
        &tile_rects,
    );

    let header = MainHeader {
        siz: Siz {
            rsiz: 0,
            width: image.width,
            height: image.height,
            x_offset: 0,
            y_offset: 0,
            tile_width: tile_w,
            tile_height: tile_h,
            tile_x_offset: 0,
            tile_y_offset: 0,
            components: vec![
                ComponentInfo {
                    precision,
                    signed: image.signed,
                };
                components
            ],
        },
        cod: Cod {
            sop_markers: options.sop_markers,
            eph_markers: options.eph_markers,
            progression: options.progression,
            layers: 1,
            mct: mct_enabled,
            decomposition_levels: levels,
            cb_width_exp: options.code_block_exp.0,
            cb_height_exp: options.code_block_exp.1,
            cb_style: if options.high_throughput { CB_STYLE_HT } else { 0 },
            transformation: if lossless {
                Transformation::Reversible53
            } else {
                Transformation::Irreversible97
            },
        },
        qcd,
        cap: options.high_throughput.then(Cap::high_throughput),
        com: options.comment.as_deref().map(Com::latin1),
    };
    header.validate()?;
    if options.layers > 1 {
        debug!("layer count {} requested, emitting the single-layer form", options.layers);
    }

    let mut writer = StreamWriter::with_capacity(4096);
    write_main_header(&mut writer, &header);

    for (tile_index, (rect, arena)) in tile_rects.iter().zip(&arenas).enumerate() {
        encode_tile(
            &mut writer,
            tile_index as u16,
            rect,
            arena,
            &header,
            &options,
            effective_precision,
            (cb_w, cb_h),
        )?;
    }

    writer.write_u16(Marker::Eoc.into());
    let codestream = writer.into_bytes();

    Ok(match options.format {
        Format::J2k => codestream,
        Format::Jp2 => {
            let colorspace = options.colorspace.unwrap_or(if components >= 3 {
                Colorspace::Srgb
            } else {
                Colorspace::Greyscale
            });
            jp2::write_jp2(
                &codestream,
                image.width,
                image.height,
                &header.siz.components,
                colorspace,
            )
        }
    })
}

/// Scale samples to the override precision. `None` when nothing changes.
fn apply_precision_override(image: &PlanarImage, options: &EncoderOptions) -> Option<PlanarImage> {
    let target = options.precision_override?;
    if target == image.precision {
        return None;
    }
    let mut scaled = image.clone();
    scaled.precision = target;
    if image.signed {
        // Signed samples shift; fractional rescaling has no natural
        // midpoint anchor.
        let from = image.precision;
        for plane in &mut scaled.planes {
            for sample in plane {
                *sample = if target >= from {
                    *sample << (target - from)
                } else {
                    *sample >> (from - target)
                };
            }
        }
    } else {
        let from_max = (1i64 << image.precision) - 1;
        let to_max = (1i64 << target) - 1;
        for plane in &mut scaled.planes {
            for sample in plane {
                let v = (*sample as i64).clamp(0, from_max);
                *sample = ((v * to_max + from_max / 2) / from_max) as i32;
            }
        }
    }
    Some(scaled)
}

fn transform_tile(
    image: &PlanarImage,
    rect: &Rect,
    lossless: bool,
    mct_enabled: bool,
    levels: u8,
) -> TileArena {
    let width = image.width as usize;
    let mut planes: Vec<Vec<i32>> = image
        .planes
        .iter()
        .map(|plane| {
            let mut out = Vec::with_capacity(rect.area());
            for row in 0..rect.h {
                let start = (rect.y0 + row) * width + rect.x0;
                out.extend_from_slice(&plane[start..start + rect.w]);
            }
            out
        })
        .collect();

    if !image.signed {
        for plane in &mut planes {
            mct::dc_shift_forward(plane, image.precision);
        }
    }

    if lossless {
        if mct_enabled {
            let (first, rest) = planes.split_at_mut(1);
            let (second, third) = rest.split_at_mut(1);
            mct::forward_rct(&mut first[0], &mut second[0], &mut third[0]);
        }
        for plane in &mut planes {
            dwt::forward_multi_53(plane, rect.w, rect.h, rect.w, levels);
        }
        TileArena::Reversible(planes)
    } else {
        let mut float_planes: Vec<Vec<f64>> = planes
            .iter()
            .map(|plane| plane.iter().map(|&v| v as f64).collect())
            .collect();
        if mct_enabled {
            let (first, rest) = float_planes.split_at_mut(1);
            let (second, third) = rest.split_at_mut(1);
            mct::forward_ict(&mut first[0], &mut second[0], &mut third[0]);
        }
        for plane in &mut float_planes {
            dwt::forward_multi_97(plane, rect.w, rect.h, rect.w, levels);
        }
        TileArena::Irreversible(float_planes)
    }
}

/// The QCD subband order: LL, then HL/LH/HH per resolution, finest last.
/// Each entry is (resolution index, band position within the resolution).
fn band_order(levels: u8) -> Vec<(u8, usize)> {
    let mut order = vec![(0u8, 0usize)];
    for r in 1..=levels {
        for pos in 0..3 {
            order.push((r, pos));
        }
    }
    order
}

fn build_qcd(
    lossless: bool,
    options: &EncoderOptions,
    levels: u8,
    effective_precision: u8,
    band_layout: &[(u8, usize)],
    arenas: &[TileArena],
    tile_rects: &[Rect],
) -> Qcd {
    if !lossless {
        let delta_base = quality_step(options.quality) * 2f64.powi(effective_precision as i32 - 8);
        return Qcd {
            guard_bits: GUARD_BITS,
            values: QuantizationValues::ScalarDerived {
                exponent: StepSize::from_delta(delta_base, effective_precision).exponent,
                mantissa: StepSize::from_delta(delta_base, effective_precision).mantissa,
            },
        };
    }

    // Reversible: one exponent per subband, nominal budget raised where a
    // tile's actual coefficients need more magnitude bit-planes.
    let mut exponents = Vec::with_capacity(band_layout.len());
    for &(res_idx, band_pos) in band_layout {
        let mut needed_planes = 0u8;
        let mut gain = 0u8;
        for (arena, rect) in arenas.iter().zip(tile_rects) {
            let resolutions = tile::resolutions(rect.w, rect.h, levels);
            let band = resolutions[res_idx as usize].bands[band_pos];
            gain = band.band_type.gain();
            if let TileArena::Reversible(planes) = arena {
                for plane in planes {
                    let max = band_max_magnitude(plane, rect.w, &band);
                    needed_planes = needed_planes.max(magnitude_bits(max));
                }
            }
        }
        let nominal = effective_precision + gain;
        let required = (needed_planes + 1).saturating_sub(GUARD_BITS);
        exponents.push(nominal.max(required).clamp(1, 30));
    }
    Qcd {
        guard_bits: GUARD_BITS,
        values: QuantizationValues::NoQuantization { exponents },
    }
}

fn band_max_magnitude(plane: &[i32], stride: usize, band: &Band) -> u32 {
    let mut max = 0u32;
    for row in 0..band.rect.h {
        let start = (band.rect.y0 + row) * stride + band.rect.x0;
        for &v in &plane[start..start + band.rect.w] {
            max = max.max(v.unsigned_abs());
        }
    }
    max
}

/// Everything tier-2 needs to place one coded block.
struct BlockSlot {
    job: usize,
    missing_planes: u32,
}

struct BandSlots {
    grid: (usize, usize),
    slots: Vec<BlockSlot>,
}

#[allow(clippy::too_many_arguments)]
fn encode_tile(
    writer: &mut StreamWriter,
    tile_index: u16,
    rect: &Rect,
    arena: &TileArena,
    header: &MainHeader,
    options: &EncoderOptions,
    effective_precision: u8,
    code_block: (usize, usize),
) -> Result<()> {
    let levels = header.cod.decomposition_levels;
    let components = header.siz.components.len();
    let resolutions = tile::resolutions(rect.w, rect.h, levels);

    // Gather tier-1 jobs in tier-2 scan order, component-major.
    let mut jobs: Vec<(Vec<i32>, usize, usize, crate::tile::BandType)> = Vec::new();
    let mut layout: Vec<Vec<Vec<BandSlots>>> = Vec::with_capacity(components);

    for component in 0..components {
        let mut per_resolution = Vec::with_capacity(resolutions.len());
        for resolution in &resolutions {
            let mut bands = Vec::with_capacity(resolution.bands.len());
            for band in &resolution.bands {
                let grid = tile::code_block_grid(band.rect.w, band.rect.h, code_block.0, code_block.1);
                let blocks = tile::band_code_blocks(band.rect.w, band.rect.h, code_block.0, code_block.1);
                let max_planes = band_bitplane_budget(&header.qcd, band, levels);
                let mut slots = Vec::with_capacity(blocks.len());
                for block in &blocks {
                    let coeffs = extract_block(arena, component, rect.w, band, block, header, levels, effective_precision);
                    slots.push(BlockSlot {
                        job: jobs.len(),
                        // Filled in once the pass counts are known.
                        missing_planes: max_planes as u32,
                    });
                    jobs.push((coeffs, block.w, block.h, band.band_type));
                }
                bands.push(BandSlots { grid, slots });
            }
            per_resolution.push(bands);
        }
        layout.push(per_resolution);
    }

    if options.is_cancelled() {
        return Err(ErrorKind::Cancelled.into());
    }
    let cancel = options.cancel.clone();
    let results: Vec<Option<EncodedBlock>> = pool::run_indexed(jobs, move |(coeffs, w, h, band)| {
        if cancel.as_ref().is_some_and(|t| t.is_cancelled()) {
            return None;
        }
        Some(encode_block(&coeffs, w, h, band))
    });
    let mut encoded = Vec::with_capacity(results.len());
    for result in results {
        match result {
            Some(block) => {
                debug_assert!(block.passes <= MAX_CODING_PASSES);
                encoded.push(block);
            }
            None => return Err(ErrorKind::Cancelled.into()),
        }
    }

    // Convert the plane budget into missing-plane counts.
    for per_resolution in &mut layout {
        for bands in per_resolution.iter_mut() {
            for band in bands.iter_mut() {
                for slot in &mut band.slots {
                    let coded = encoded[slot.job].coded_planes as u32;
                    debug_assert!(coded <= slot.missing_planes);
                    slot.missing_planes -= coded.min(slot.missing_planes);
                }
            }
        }
    }

    let sot_at = writer.len();
    Segment::Sot(Sot {
        tile_index,
        tile_part_length: 0,
        tile_part_index: 0,
        tile_part_count: 1,
    })
    .write(writer);
    writer.write_u16(Marker::Sod.into());

    let mut sequence = 0u16;
    for step in packet_sequence(
        options.progression,
        1,
        levels + 1,
        components as u16,
    ) {
        let bands = &layout[step.component as usize][step.resolution as usize];
        let contributions: Vec<BandContributions> = bands
            .iter()
            .map(|band| BandContributions {
                grid: band.grid,
                blocks: band
                    .slots
                    .iter()
                    .map(|slot| BlockContribution {
                        data: &encoded[slot.job].data,
                        passes: encoded[slot.job].passes,
                        missing_planes: slot.missing_planes,
                    })
                    .collect(),
            })
            .collect();
        write_packet(
            writer,
            &contributions,
            options.sop_markers,
            options.eph_markers,
            sequence,
        );
        sequence = sequence.wrapping_add(1);
    }

    // Psot spans from the SOT marker to the end of the tile-part.
    let tile_part_length = (writer.len() - sot_at) as u32;
    writer.patch_u32(sot_at + 6, tile_part_length);
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn extract_block(
    arena: &TileArena,
    component: usize,
    stride: usize,
    band: &Band,
    block: &Rect,
    header: &MainHeader,
    levels: u8,
    effective_precision: u8,
) -> Vec<i32> {
    match arena {
        TileArena::Reversible(planes) => {
            let mut out = Vec::new();
            tile::read_block(&planes[component], stride, &band.rect, block, &mut out);
            out
        }
        TileArena::Irreversible(planes) => {
            let step = band_step(&header.qcd, band, levels);
            let rb = effective_precision + band.band_type.gain();
            let delta = step.delta(rb);
            let max_planes = max_bitplanes(step.exponent, header.qcd.guard_bits);
            let mut out = Vec::with_capacity(block.area());
            for row in 0..block.h {
                let y = band.rect.y0 + block.y0 + row;
                let start = y * stride + band.rect.x0 + block.x0;
                out.extend(
                    planes[component][start..start + block.w]
                        .iter()
                        .map(|&c| quantization::quantize(c, delta, max_planes)),
                );
            }
            out
        }
    }
}

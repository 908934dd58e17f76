//! Tile partitioning and subband geometry.
//!
//! A tile's coefficients live in one contiguous arena: the tile-sized
//! plane left in quadrant layout by the multi-level DWT. Every subband is
//! a rectangular view into that arena (offset + stride), and code-blocks
//! are row-major sub-rectangles of a band. Nothing here allocates per
//! block.

use crate::dwt::level_dims;

/// Subband orientation tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BandType {
    Ll,
    Hl,
    Lh,
    Hh,
}

impl BandType {
    pub fn is_high_x(self) -> bool {
        matches!(self, BandType::Hl | BandType::Hh)
    }

    pub fn is_high_y(self) -> bool {
        matches!(self, BandType::Lh | BandType::Hh)
    }

    /// log2 subband gain used by quantization.
    pub fn gain(self) -> u8 {
        self.is_high_x() as u8 + self.is_high_y() as u8
    }
}

/// A rectangle in tile-plane coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub x0: usize,
    pub y0: usize,
    pub w: usize,
    pub h: usize,
}

impl Rect {
    pub fn is_empty(&self) -> bool {
        self.w == 0 || self.h == 0
    }

    pub fn area(&self) -> usize {
        self.w * self.h
    }
}

/// One subband of a resolution: its orientation, its decomposition level
/// (`n_b` in Annex E terms), and its view into the tile arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Band {
    pub band_type: BandType,
    pub level: u8,
    pub rect: Rect,
}

/// One resolution level: LL alone at r = 0, then HL/LH/HH per level.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub index: u8,
    pub bands: Vec<Band>,
}

/// Subband geometry for a tile of `tile_w x tile_h` with `levels`
/// decompositions, in the quadrant layout the DWT leaves behind.
pub fn resolutions(tile_w: usize, tile_h: usize, levels: u8) -> Vec<Resolution> {
    let dims = level_dims(tile_w, tile_h, levels);
    let mut out = Vec::with_capacity(levels as usize + 1);

    let (ll_w, ll_h) = dims[levels as usize];
    out.push(Resolution {
        index: 0,
        bands: vec![Band {
            band_type: BandType::Ll,
            level: levels,
            rect: Rect {
                x0: 0,
                y0: 0,
                w: ll_w,
                h: ll_h,
            },
        }],
    });

    for r in 1..=levels {
        let level = levels - r + 1;
        let (parent_w, parent_h) = dims[level as usize - 1];
        let (low_w, low_h) = dims[level as usize];
        let bands = vec![
            Band {
                band_type: BandType::Hl,
                level,
                rect: Rect {
                    x0: low_w,
                    y0: 0,
                    w: parent_w - low_w,
                    h: low_h,
                },
            },
            Band {
                band_type: BandType::Lh,
                level,
                rect: Rect {
                    x0: 0,
                    y0: low_h,
                    w: low_w,
                    h: parent_h - low_h,
                },
            },
            Band {
                band_type: BandType::Hh,
                level,
                rect: Rect {
                    x0: low_w,
                    y0: low_h,
                    w: parent_w - low_w,
                    h: parent_h - low_h,
                },
            },
        ];
        out.push(Resolution { index: r, bands });
    }

    out
}

/// Row-major code-block grid over a band of `band_w x band_h`, blocks of
/// `cb_w x cb_h` anchored at the band origin, edge blocks clipped.
pub fn band_code_blocks(band_w: usize, band_h: usize, cb_w: usize, cb_h: usize) -> Vec<Rect> {
    if band_w == 0 || band_h == 0 {
        return Vec::new();
    }
    let across = band_w.div_ceil(cb_w);
    let down = band_h.div_ceil(cb_h);
    let mut blocks = Vec::with_capacity(across * down);
    for by in 0..down {
        for bx in 0..across {
            let x0 = bx * cb_w;
            let y0 = by * cb_h;
            blocks.push(Rect {
                x0,
                y0,
                w: cb_w.min(band_w - x0),
                h: cb_h.min(band_h - y0),
            });
        }
    }
    blocks
}

/// Number of code-blocks across and down for a band.
pub fn code_block_grid(band_w: usize, band_h: usize, cb_w: usize, cb_h: usize) -> (usize, usize) {
    if band_w == 0 || band_h == 0 {
        (0, 0)
    } else {
        (band_w.div_ceil(cb_w), band_h.div_ceil(cb_h))
    }
}

/// Tile rectangles over the image grid in row-major tile-index order,
/// edge tiles clipped to the image extent.
pub fn tile_rects(width: usize, height: usize, tile_w: usize, tile_h: usize) -> Vec<Rect> {
    let across = width.div_ceil(tile_w);
    let down = height.div_ceil(tile_h);
    let mut tiles = Vec::with_capacity(across * down);
    for ty in 0..down {
        for tx in 0..across {
            let x0 = tx * tile_w;
            let y0 = ty * tile_h;
            tiles.push(Rect {
                x0,
                y0,
                w: tile_w.min(width - x0),
                h: tile_h.min(height - y0),
            });
        }
    }
    tiles
}

/// Copy a band-local code-block out of the tile arena.
pub fn read_block<T: Copy>(plane: &[T], stride: usize, band: &Rect, block: &Rect, out: &mut Vec<T>) {
    out.clear();
    out.reserve(block.area());
    for row in 0..block.h {
        let y = band.y0 + block.y0 + row;
        let start = y * stride + band.x0 + block.x0;
        out.extend_from_slice(&plane[start..start + block.w]);
    }
}

/// Scatter a decoded code-block back into the tile arena.
pub fn write_block<T: Copy>(plane: &mut [T], stride: usize, band: &Rect, block: &Rect, data: &[T]) {
    for row in 0..block.h {
        let y = band.y0 + block.y0 + row;
        let start = y * stride + band.x0 + block.x0;
        plane[start..start + block.w].copy_from_slice(&data[row * block.w..(row + 1) * block.w]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolutions_partition_the_tile() {
        let res = resolutions(13, 7, 2);
        assert_eq!(res.len(), 3);
        // r=0: LL of dims after 2 levels: ceil(13/4)=4, ceil(7/4)=2.
        assert_eq!(res[0].bands[0].rect, Rect { x0: 0, y0: 0, w: 4, h: 2 });
        assert_eq!(res[0].bands[0].level, 2);
        // r=1 sits at level 2: parent (7,4), low (4,2).
        let hl = res[1].bands[0];
        assert_eq!(hl.band_type, BandType::Hl);
        assert_eq!(hl.rect, Rect { x0: 4, y0: 0, w: 3, h: 2 });
        // r=2 is the finest level 1: parent (13,7), low (7,4).
        let hh = res[2].bands[2];
        assert_eq!(hh.band_type, BandType::Hh);
        assert_eq!(hh.rect, Rect { x0: 7, y0: 4, w: 6, h: 3 });

        // Areas over all bands must cover the tile exactly.
        let total: usize = res
            .iter()
            .flat_map(|r| r.bands.iter())
            .map(|b| b.rect.area())
            .sum();
        assert_eq!(total, 13 * 7);
    }

    #[test]
    fn degenerate_one_pixel_tile() {
        let res = resolutions(1, 1, 3);
        assert_eq!(res[0].bands[0].rect.area(), 1);
        for r in &res[1..] {
            assert!(r.bands.iter().all(|b| b.rect.is_empty()));
        }
    }

    #[test]
    fn code_blocks_clip_at_edges() {
        let blocks = band_code_blocks(70, 40, 64, 64);
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0], Rect { x0: 0, y0: 0, w: 64, h: 40 });
        assert_eq!(blocks[1], Rect { x0: 64, y0: 0, w: 6, h: 40 });
        assert!(band_code_blocks(0, 40, 64, 64).is_empty());
    }

    #[test]
    fn tiles_cover_image_row_major() {
        let tiles = tile_rects(100, 60, 64, 64);
        assert_eq!(tiles.len(), 2);
        assert_eq!(tiles[0], Rect { x0: 0, y0: 0, w: 64, h: 60 });
        assert_eq!(tiles[1], Rect { x0: 64, y0: 0, w: 36, h: 60 });
    }

    #[test]
    fn block_copy_roundtrip() {
        let stride = 8;
        let mut plane: Vec<i32> = (0..64).collect();
        let band = Rect { x0: 4, y0: 2, w: 4, h: 4 };
        let block = Rect { x0: 1, y0: 1, w: 3, h: 2 };
        let mut data = Vec::new();
        read_block(&plane, stride, &band, &block, &mut data);
        assert_eq!(data, vec![29, 30, 31, 37, 38, 39]);
        let doubled: Vec<i32> = data.iter().map(|v| v * 2).collect();
        write_block(&mut plane, stride, &band, &block, &doubled);
        assert_eq!(plane[29], 58);
        assert_eq!(plane[39], 78);
    }
}

//! Tag trees (ITU-T T.800 B.10.2).
//!
//! A tag tree is a quad tree over a grid of leaves where every interior
//! node holds the minimum of its children. Packet headers use two of
//! them per precinct: one for first-inclusion layers and one for
//! zero-bit-plane counts. The coded form is incremental: each query emits
//! (or consumes) only the bits not already known from earlier queries,
//! as zero bits that raise a lower bound and a one bit that seals a
//! node's value against the query threshold.

use crate::bit_io::{BitReader, BitWriter};
use crate::error::Result;

#[derive(Debug, Clone, Copy)]
struct Node {
    /// Encoder: the value assigned via `set_value` (min-propagated).
    /// Decoder: the lower bound discovered so far.
    value: u32,
    /// Encoder only: bound already emitted for this node.
    emitted: u32,
    /// The node's value has been sealed with a one bit.
    known: bool,
}

#[derive(Debug, Clone)]
struct Level {
    offset: usize,
    width: usize,
}

/// A tag tree over a `width x height` leaf grid.
#[derive(Debug, Clone)]
pub struct TagTree {
    levels: Vec<Level>,
    nodes: Vec<Node>,
}

impl TagTree {
    /// An encoder-side tree starts with all values at `u32::MAX`; call
    /// [`TagTree::set_value`] for every leaf before encoding. A
    /// decoder-side tree is used as-is.
    pub fn new(width: usize, height: usize) -> Self {
        let mut levels = Vec::new();
        let mut nodes = Vec::new();
        let (mut w, mut h) = (width, height);
        if w > 0 && h > 0 {
            loop {
                levels.push(Level {
                    offset: nodes.len(),
                    width: w,
                });
                nodes.extend(
                    std::iter::repeat(Node {
                        value: 0,
                        emitted: 0,
                        known: false,
                    })
                    .take(w * h),
                );
                if w == 1 && h == 1 {
                    break;
                }
                w = w.div_ceil(2);
                h = h.div_ceil(2);
            }
        }
        Self { levels, nodes }
    }

    fn node_index(&self, level: usize, x: usize, y: usize) -> usize {
        let l = &self.levels[level];
        l.offset + (y >> level) * l.width + (x >> level)
    }

    /// Root-to-leaf node indices for leaf `(x, y)`.
    fn path(&self, x: usize, y: usize) -> impl Iterator<Item = usize> + '_ {
        (0..self.levels.len())
            .rev()
            .map(move |level| self.node_index(level, x, y))
    }

    /// Assign a leaf value, min-propagating through the ancestors.
    /// Encoder side only, before any `encode` call.
    pub fn set_value(&mut self, x: usize, y: usize, value: u32) {
        for level in 0..self.levels.len() {
            let idx = self.node_index(level, x, y);
            let node = &mut self.nodes[idx];
            if level == 0 {
                node.value = value;
            } else if value < node.value {
                node.value = value;
            } else {
                break;
            }
        }
    }

    /// Initialise every node for encoding after the leaves were filled:
    /// interior values become the minimum over their children.
    ///
    /// `set_value` already min-propagates, but leaves that were never set
    /// must default high, so the encoder seeds with `u32::MAX` first.
    pub fn seed_for_encoding(&mut self) {
        for node in &mut self.nodes {
            node.value = u32::MAX;
            node.emitted = 0;
            node.known = false;
        }
    }

    /// Emit the bits that prove `value(x, y) >= threshold` or pin the
    /// exact value when it is below the threshold.
    pub fn encode(&mut self, x: usize, y: usize, threshold: u32, writer: &mut BitWriter) {
        let path: Vec<usize> = self.path(x, y).collect();
        let mut low = 0u32;
        for idx in path {
            let node = &mut self.nodes[idx];
            if low > node.emitted {
                node.emitted = low;
            } else {
                low = node.emitted;
            }
            while low < threshold {
                if low >= node.value {
                    if !node.known {
                        writer.write_bit(1);
                        node.known = true;
                    }
                    break;
                }
                writer.write_bit(0);
                low += 1;
            }
            node.emitted = low;
            if low >= threshold {
                break;
            }
        }
    }

    /// Consume bits until the value at `(x, y)` is either known or proven
    /// to be at least `threshold`. Returns the discovered bound.
    pub fn decode(&mut self, x: usize, y: usize, threshold: u32, reader: &mut BitReader) -> Result<u32> {
        let path: Vec<usize> = self.path(x, y).collect();
        let mut low = 0u32;
        let mut result = 0u32;
        for idx in path {
            let node = &mut self.nodes[idx];
            if !node.known {
                let mut val = node.value.max(low);
                while val < threshold {
                    if reader.read_bit()? == 1 {
                        node.known = true;
                        break;
                    }
                    val += 1;
                }
                node.value = val;
            }
            result = node.value;
            if node.value >= threshold {
                break;
            }
            low = node.value;
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip_grid(width: usize, height: usize, values: &[u32], threshold: u32) {
        let mut enc = TagTree::new(width, height);
        enc.seed_for_encoding();
        for y in 0..height {
            for x in 0..width {
                enc.set_value(x, y, values[y * width + x]);
            }
        }
        let mut writer = BitWriter::new();
        for y in 0..height {
            for x in 0..width {
                enc.encode(x, y, threshold, &mut writer);
            }
        }
        let bytes = writer.finish();

        let mut dec = TagTree::new(width, height);
        let mut reader = BitReader::new(&bytes);
        for y in 0..height {
            for x in 0..width {
                let got = dec.decode(x, y, threshold, &mut reader).unwrap();
                let expected = values[y * width + x].min(threshold);
                assert_eq!(got, expected, "({x},{y}) threshold {threshold}");
            }
        }
    }

    #[test]
    fn b102_example_values() {
        // The 6x3 example grid from B.10.2.
        let values = [
            1, 3, 2, 3, 2, 3, //
            2, 2, 2, 2, 2, 2, //
            2, 2, 2, 2, 2, 2,
        ];
        roundtrip_grid(6, 3, &values, u32::MAX);
    }

    #[test]
    fn thresholded_queries_stay_partial() {
        roundtrip_grid(3, 2, &[0, 0, 1, 1, 1, 1], 1);
        roundtrip_grid(3, 2, &[0, 0, 1, 1, 1, 1], 2);
    }

    #[test]
    fn incremental_thresholds_share_bits() {
        // Query the same tree at rising thresholds, as layers do.
        let (width, height) = (2usize, 2usize);
        let values = [0u32, 2, 1, 3];

        let mut enc = TagTree::new(width, height);
        enc.seed_for_encoding();
        for y in 0..height {
            for x in 0..width {
                enc.set_value(x, y, values[y * width + x]);
            }
        }
        let mut writer = BitWriter::new();
        for threshold in 1..=4 {
            for y in 0..height {
                for x in 0..width {
                    enc.encode(x, y, threshold, &mut writer);
                }
            }
        }
        let bytes = writer.finish();

        let mut dec = TagTree::new(width, height);
        let mut reader = BitReader::new(&bytes);
        for threshold in 1..=4u32 {
            for y in 0..height {
                for x in 0..width {
                    let got = dec.decode(x, y, threshold, &mut reader).unwrap();
                    assert_eq!(got, values[y * width + x].min(threshold));
                }
            }
        }
    }

    #[test]
    fn single_leaf_tree() {
        roundtrip_grid(1, 1, &[5], u32::MAX);
        roundtrip_grid(1, 1, &[0], 1);
    }
}

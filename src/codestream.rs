//! Typed marker segments and main-header assembly.
//!
//! Each segment that the core understands is one variant of [`Segment`],
//! and a single read/write dispatch keeps the parser total: any marker in
//! the 0xFF00..=0xFFFF range that is not understood is skipped by its
//! declared length.

use log::warn;

use crate::error::{checked_len, ErrorKind, Result};
use crate::image::ComponentInfo;
use crate::marker::Marker;
use crate::progression::ProgressionOrder;
use crate::stream_reader::StreamReader;
use crate::stream_writer::StreamWriter;

/// Decomposition levels accepted from a stream.
pub const MAX_DECOMPOSITION_LEVELS: u8 = 32;

/// Cap on the planar buffers derived from SIZ (bytes).
pub const MAX_IMAGE_BYTES: u64 = 1 << 30;

/// Code-block style bit reserved for HTJ2K (Part 15) signalling.
pub const CB_STYLE_HT: u8 = 0x40;

/// Pcap bit that announces a Part-15 block coder.
pub const PCAP_HT: u32 = 1 << 14;

/// Wavelet filter selection from COD.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transformation {
    /// 9-7 filter, lossy path.
    Irreversible97,
    /// 5-3 filter, lossless path.
    Reversible53,
}

impl Transformation {
    fn from_byte(byte: u8) -> Result<Self> {
        match byte {
            0 => Ok(Self::Irreversible97),
            1 => Ok(Self::Reversible53),
            _ => Err(ErrorKind::Inconsistent("transformation byte outside 0..=1").into()),
        }
    }

    fn to_byte(self) -> u8 {
        match self {
            Self::Irreversible97 => 0,
            Self::Reversible53 => 1,
        }
    }
}

/// SIZ: image and tile geometry (A.5.1).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Siz {
    pub rsiz: u16,
    pub width: u32,
    pub height: u32,
    pub x_offset: u32,
    pub y_offset: u32,
    pub tile_width: u32,
    pub tile_height: u32,
    pub tile_x_offset: u32,
    pub tile_y_offset: u32,
    pub components: Vec<ComponentInfo>,
}

impl Siz {
    pub fn tiles_across(&self) -> u32 {
        self.width.div_ceil(self.tile_width)
    }

    pub fn tiles_down(&self) -> u32 {
        self.height.div_ceil(self.tile_height)
    }

    pub fn tile_count(&self) -> u32 {
        self.tiles_across() * self.tiles_down()
    }

    /// Uniform (precision, signedness) across components.
    pub fn component_format(&self) -> (u8, bool) {
        let first = self.components[0];
        (first.precision, first.signed)
    }

    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(ErrorKind::Inconsistent("SIZ image dimensions are zero").into());
        }
        if self.tile_width == 0 || self.tile_height == 0 {
            return Err(ErrorKind::Inconsistent("SIZ tile dimensions are zero").into());
        }
        if self.x_offset != 0 || self.y_offset != 0 {
            return Err(ErrorKind::Unsupported("non-zero image grid origin").into());
        }
        if self.tile_x_offset > self.x_offset || self.tile_y_offset > self.y_offset {
            return Err(ErrorKind::Inconsistent("tile origin outside image").into());
        }
        if self.components.is_empty() || self.components.len() > 4 {
            return Err(ErrorKind::Unsupported("component count outside 1..=4").into());
        }
        let (precision, signed) = self.component_format();
        if !(1..=16).contains(&precision) {
            return Err(ErrorKind::Unsupported("component precision above 16").into());
        }
        if self
            .components
            .iter()
            .any(|c| c.precision != precision || c.signed != signed)
        {
            return Err(ErrorKind::Unsupported("non-uniform component formats").into());
        }
        let samples = self.width as u64 * self.height as u64 * self.components.len() as u64;
        checked_len("image sample buffer", samples.saturating_mul(4), MAX_IMAGE_BYTES)?;
        if self.tiles_across() as u64 * self.tiles_down() as u64 > u64::from(u16::MAX) {
            // SOT can only index 65535 tiles; more is undecodable anyway.
            return Err(ErrorKind::BoundExceeded {
                what: "tile count",
                requested: self.tiles_across() as u64 * self.tiles_down() as u64,
                cap: u64::from(u16::MAX),
            }
            .into());
        }
        Ok(())
    }

    fn read_body(reader: &mut StreamReader) -> Result<Self> {
        let rsiz = reader.read_u16()?;
        let width = reader.read_u32()?;
        let height = reader.read_u32()?;
        let x_offset = reader.read_u32()?;
        let y_offset = reader.read_u32()?;
        let tile_width = reader.read_u32()?;
        let tile_height = reader.read_u32()?;
        let tile_x_offset = reader.read_u32()?;
        let tile_y_offset = reader.read_u32()?;
        let count = reader.read_u16()? as usize;
        let mut components = Vec::with_capacity(count.min(4));
        for _ in 0..count {
            let ssiz = reader.read_u8()?;
            let dx = reader.read_u8()?;
            let dy = reader.read_u8()?;
            if dx != 1 || dy != 1 {
                return Err(ErrorKind::Unsupported("component subsampling").into());
            }
            components.push(ComponentInfo {
                precision: (ssiz & 0x7F) + 1,
                signed: ssiz & 0x80 != 0,
            });
        }
        let siz = Self {
            rsiz,
            width,
            height,
            x_offset,
            y_offset,
            tile_width,
            tile_height,
            tile_x_offset,
            tile_y_offset,
            components,
        };
        siz.validate()?;
        Ok(siz)
    }

    fn write_body(&self, writer: &mut StreamWriter) {
        writer.write_u16(self.rsiz);
        writer.write_u32(self.width);
        writer.write_u32(self.height);
        writer.write_u32(self.x_offset);
        writer.write_u32(self.y_offset);
        writer.write_u32(self.tile_width);
        writer.write_u32(self.tile_height);
        writer.write_u32(self.tile_x_offset);
        writer.write_u32(self.tile_y_offset);
        writer.write_u16(self.components.len() as u16);
        for component in &self.components {
            writer.write_u8((component.precision - 1) | if component.signed { 0x80 } else { 0 });
            writer.write_u8(1);
            writer.write_u8(1);
        }
    }
}

/// COD: coding style default (A.6.1).
///
/// Scod bit 0 enables SOP markers, bit 1 EPH markers, bit 2 declares
/// per-resolution precinct sizes (outside the core).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cod {
    pub sop_markers: bool,
    pub eph_markers: bool,
    pub progression: ProgressionOrder,
    pub layers: u16,
    pub mct: bool,
    pub decomposition_levels: u8,
    /// log2 of the code-block width (already includes the +2 bias).
    pub cb_width_exp: u8,
    pub cb_height_exp: u8,
    pub cb_style: u8,
    pub transformation: Transformation,
}

impl Cod {
    pub fn resolutions(&self) -> u8 {
        self.decomposition_levels + 1
    }

    pub fn validate(&self) -> Result<()> {
        if self.layers == 0 {
            return Err(ErrorKind::Inconsistent("COD declares zero layers").into());
        }
        if self.decomposition_levels > MAX_DECOMPOSITION_LEVELS {
            return Err(ErrorKind::Inconsistent("too many decomposition levels").into());
        }
        if !(2..=10).contains(&self.cb_width_exp)
            || !(2..=10).contains(&self.cb_height_exp)
            || self.cb_width_exp + self.cb_height_exp > 12
        {
            return Err(ErrorKind::Inconsistent("code-block exponents outside standard mode").into());
        }
        Ok(())
    }

    fn read_body(reader: &mut StreamReader) -> Result<Self> {
        let scod = reader.read_u8()?;
        if scod & 0x04 != 0 {
            return Err(ErrorKind::Unsupported("per-resolution precinct sizes").into());
        }
        let progression = ProgressionOrder::try_from(reader.read_u8()?)
            .map_err(|_| ErrorKind::Inconsistent("unknown progression order"))?;
        let layers = reader.read_u16()?;
        let mct = match reader.read_u8()? {
            0 => false,
            1 => true,
            _ => return Err(ErrorKind::Inconsistent("MCT byte outside 0..=1").into()),
        };
        let decomposition_levels = reader.read_u8()?;
        let cb_width_exp = reader
            .read_u8()?
            .checked_add(2)
            .ok_or(ErrorKind::Inconsistent("code-block width exponent overflow"))?;
        let cb_height_exp = reader
            .read_u8()?
            .checked_add(2)
            .ok_or(ErrorKind::Inconsistent("code-block height exponent overflow"))?;
        let cb_style = reader.read_u8()?;
        let transformation = Transformation::from_byte(reader.read_u8()?)?;
        let cod = Self {
            sop_markers: scod & 0x01 != 0,
            eph_markers: scod & 0x02 != 0,
            progression,
            layers,
            mct,
            decomposition_levels,
            cb_width_exp,
            cb_height_exp,
            cb_style,
            transformation,
        };
        cod.validate()?;
        Ok(cod)
    }

    fn write_body(&self, writer: &mut StreamWriter) {
        let scod = (self.sop_markers as u8) | ((self.eph_markers as u8) << 1);
        writer.write_u8(scod);
        writer.write_u8(self.progression.into());
        writer.write_u16(self.layers);
        writer.write_u8(self.mct as u8);
        writer.write_u8(self.decomposition_levels);
        writer.write_u8(self.cb_width_exp - 2);
        writer.write_u8(self.cb_height_exp - 2);
        writer.write_u8(self.cb_style);
        writer.write_u8(self.transformation.to_byte());
    }
}

/// Quantization values carried by QCD, per Annex E.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuantizationValues {
    /// Style 0: reversible, one 5-bit exponent per subband.
    NoQuantization { exponents: Vec<u8> },
    /// Style 1: one (exponent, mantissa) word, derived per subband.
    ScalarDerived { exponent: u8, mantissa: u16 },
    /// Style 2: one (exponent, mantissa) word per subband.
    ScalarExpounded { pairs: Vec<(u8, u16)> },
}

/// QCD: quantization default (A.6.4).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Qcd {
    pub guard_bits: u8,
    pub values: QuantizationValues,
}

impl Qcd {
    pub fn is_reversible(&self) -> bool {
        matches!(self.values, QuantizationValues::NoQuantization { .. })
    }

    fn read_body(reader: &mut StreamReader, body_len: usize) -> Result<Self> {
        let sqcd = reader.read_u8()?;
        let guard_bits = sqcd >> 5;
        let remaining = body_len - 1;
        let values = match sqcd & 0x1F {
            0 => {
                let mut exponents = Vec::with_capacity(remaining);
                for _ in 0..remaining {
                    exponents.push(reader.read_u8()? >> 3);
                }
                QuantizationValues::NoQuantization { exponents }
            }
            1 => {
                let word = reader.read_u16()?;
                // Any bytes past the single word are tolerated.
                reader.skip(remaining.saturating_sub(2))?;
                QuantizationValues::ScalarDerived {
                    exponent: (word >> 11) as u8,
                    mantissa: word & 0x07FF,
                }
            }
            2 => {
                let mut pairs = Vec::with_capacity(remaining / 2);
                for _ in 0..remaining / 2 {
                    let word = reader.read_u16()?;
                    pairs.push(((word >> 11) as u8, word & 0x07FF));
                }
                reader.skip(remaining % 2)?;
                QuantizationValues::ScalarExpounded { pairs }
            }
            _ => return Err(ErrorKind::Unsupported("quantization style").into()),
        };
        Ok(Self { guard_bits, values })
    }

    fn write_body(&self, writer: &mut StreamWriter) {
        let style: u8 = match &self.values {
            QuantizationValues::NoQuantization { .. } => 0,
            QuantizationValues::ScalarDerived { .. } => 1,
            QuantizationValues::ScalarExpounded { .. } => 2,
        };
        writer.write_u8((self.guard_bits << 5) | style);
        match &self.values {
            QuantizationValues::NoQuantization { exponents } => {
                for &exponent in exponents {
                    writer.write_u8(exponent << 3);
                }
            }
            QuantizationValues::ScalarDerived { exponent, mantissa } => {
                writer.write_u16(((*exponent as u16) << 11) | (mantissa & 0x07FF));
            }
            QuantizationValues::ScalarExpounded { pairs } => {
                for &(exponent, mantissa) in pairs {
                    writer.write_u16(((exponent as u16) << 11) | (mantissa & 0x07FF));
                }
            }
        }
    }
}

/// COM: comment (A.9.2). Registration 0 is binary, 1 is Latin-1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Com {
    pub registration: u16,
    pub data: Vec<u8>,
}

impl Com {
    pub fn latin1(text: &str) -> Self {
        Self {
            registration: 1,
            data: text.bytes().collect(),
        }
    }

    fn read_body(reader: &mut StreamReader, body_len: usize) -> Result<Self> {
        let registration = reader.read_u16()?;
        let data = reader.read_bytes(body_len - 2)?.to_vec();
        Ok(Self { registration, data })
    }

    fn write_body(&self, writer: &mut StreamWriter) {
        writer.write_u16(self.registration);
        writer.write_bytes(&self.data);
    }
}

/// CAP: extended capabilities (A.5.2).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cap {
    pub pcap: u32,
    pub ccap: Vec<u16>,
}

impl Cap {
    /// The CAP segment announcing a Part-15 (HTJ2K) block coder.
    pub fn high_throughput() -> Self {
        Self {
            pcap: PCAP_HT,
            ccap: vec![0],
        }
    }

    fn read_body(reader: &mut StreamReader, body_len: usize) -> Result<Self> {
        let pcap = reader.read_u32()?;
        let mut remaining = body_len.saturating_sub(4);
        let mut ccap = Vec::with_capacity(remaining / 2);
        while remaining >= 2 {
            ccap.push(reader.read_u16()?);
            remaining -= 2;
        }
        reader.skip(remaining)?;
        Ok(Self { pcap, ccap })
    }

    fn write_body(&self, writer: &mut StreamWriter) {
        writer.write_u32(self.pcap);
        for &c in &self.ccap {
            writer.write_u16(c);
        }
    }
}

/// SOT: start of tile-part (A.4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sot {
    pub tile_index: u16,
    /// Total tile-part length in bytes, counted from the SOT marker.
    /// Zero means "up to the next SOT or EOC".
    pub tile_part_length: u32,
    pub tile_part_index: u8,
    pub tile_part_count: u8,
}

impl Sot {
    fn read_body(reader: &mut StreamReader) -> Result<Self> {
        Ok(Self {
            tile_index: reader.read_u16()?,
            tile_part_length: reader.read_u32()?,
            tile_part_index: reader.read_u8()?,
            tile_part_count: reader.read_u8()?,
        })
    }

    fn write_body(&self, writer: &mut StreamWriter) {
        writer.write_u16(self.tile_index);
        writer.write_u32(self.tile_part_length);
        writer.write_u8(self.tile_part_index);
        writer.write_u8(self.tile_part_count);
    }
}

/// A length-prefixed marker segment in tagged form.
#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    Siz(Siz),
    Cod(Cod),
    Qcd(Qcd),
    Com(Com),
    Cap(Cap),
    Sot(Sot),
    Unknown { marker: u16 },
}

impl Segment {
    /// Read the segment at the reader's position (marker code included).
    pub fn read(reader: &mut StreamReader) -> Result<Self> {
        let offset = reader.position();
        let marker = reader.read_u16()?;
        if marker & 0xFF00 != 0xFF00 {
            return Err(CodecErrorAt(offset, ErrorKind::Format("expected a marker")).into());
        }
        let length = reader.read_u16()?;
        if length < 2 {
            return Err(CodecErrorAt(offset, ErrorKind::Inconsistent("segment length below 2")).into());
        }
        let body_len = (length - 2) as usize;
        let body = reader
            .read_bytes(body_len)
            .map_err(|e| e.with_offset(offset))?;
        let mut body_reader = StreamReader::new(body);

        let segment = match Marker::try_from(marker) {
            Ok(Marker::Siz) => Self::Siz(Siz::read_body(&mut body_reader)?),
            Ok(Marker::Cod) => Self::Cod(Cod::read_body(&mut body_reader)?),
            Ok(Marker::Qcd) => Self::Qcd(Qcd::read_body(&mut body_reader, body_len)?),
            Ok(Marker::Com) => Self::Com(Com::read_body(&mut body_reader, body_len)?),
            Ok(Marker::Cap) => Self::Cap(Cap::read_body(&mut body_reader, body_len)?),
            Ok(Marker::Sot) => Self::Sot(Sot::read_body(&mut body_reader)?),
            _ => {
                warn!("skipping unknown marker segment {marker:#06X} ({body_len} bytes)");
                Self::Unknown { marker }
            }
        };
        Ok(segment)
    }

    /// Write the segment, marker code and length included.
    pub fn write(&self, writer: &mut StreamWriter) {
        let (marker, mut body) = (self.marker(), StreamWriter::new());
        match self {
            Self::Siz(s) => s.write_body(&mut body),
            Self::Cod(s) => s.write_body(&mut body),
            Self::Qcd(s) => s.write_body(&mut body),
            Self::Com(s) => s.write_body(&mut body),
            Self::Cap(s) => s.write_body(&mut body),
            Self::Sot(s) => s.write_body(&mut body),
            Self::Unknown { .. } => {}
        }
        writer.write_u16(marker);
        writer.write_u16(body.len() as u16 + 2);
        writer.write_bytes(body.as_bytes());
    }

    fn marker(&self) -> u16 {
        match self {
            Self::Siz(_) => Marker::Siz.into(),
            Self::Cod(_) => Marker::Cod.into(),
            Self::Qcd(_) => Marker::Qcd.into(),
            Self::Com(_) => Marker::Com.into(),
            Self::Cap(_) => Marker::Cap.into(),
            Self::Sot(_) => Marker::Sot.into(),
            Self::Unknown { marker } => *marker,
        }
    }
}

// Small helper so segment errors carry the segment's own offset.
struct CodecErrorAt(u64, ErrorKind);

impl From<CodecErrorAt> for crate::error::CodecError {
    fn from(value: CodecErrorAt) -> Self {
        crate::error::CodecError::new(value.1).with_offset(value.0)
    }
}

/// The main header: SIZ through the last segment before the first tile-part.
#[derive(Debug, Clone, PartialEq)]
pub struct MainHeader {
    pub siz: Siz,
    pub cod: Cod,
    pub qcd: Qcd,
    pub cap: Option<Cap>,
    pub com: Option<Com>,
}

impl MainHeader {
    /// Cross-field checks that single segments cannot perform alone.
    pub fn validate(&self) -> Result<()> {
        match (self.cod.transformation, self.qcd.is_reversible()) {
            (Transformation::Reversible53, false) => {
                Err(ErrorKind::Inconsistent("5-3 transform with scalar quantization").into())
            }
            (Transformation::Irreversible97, true) => {
                Err(ErrorKind::Inconsistent("9-7 transform without quantization").into())
            }
            _ => {
                let needed = 3 * self.cod.decomposition_levels as usize + 1;
                match &self.qcd.values {
                    QuantizationValues::NoQuantization { exponents } if exponents.len() < needed => {
                        return Err(
                            ErrorKind::Inconsistent("QCD carries too few subband exponents").into()
                        );
                    }
                    QuantizationValues::ScalarExpounded { pairs } if pairs.len() < needed => {
                        return Err(
                            ErrorKind::Inconsistent("QCD carries too few subband step sizes").into()
                        );
                    }
                    _ => {}
                }
                if self.cod.mct && self.siz.components.len() < 3 {
                    return Err(ErrorKind::Inconsistent("MCT enabled with fewer than 3 components")
                        .into());
                }
                Ok(())
            }
        }
    }
}

/// Parse SOC and the main header, leaving the reader at the first SOT/EOC.
pub fn read_main_header(reader: &mut StreamReader) -> Result<MainHeader> {
    if reader.read_u16().map_err(|e| e.with_offset(0))? != u16::from(Marker::Soc) {
        return Err(CodecErrorAt(0, ErrorKind::Format("missing SOC marker")).into());
    }

    let siz_offset = reader.position();
    let siz = match Segment::read(reader).map_err(|e| e.with_offset(siz_offset))? {
        Segment::Siz(siz) => siz,
        _ => return Err(CodecErrorAt(siz_offset, ErrorKind::Inconsistent("SIZ must follow SOC")).into()),
    };

    let mut cod = None;
    let mut qcd = None;
    let mut cap = None;
    let mut com = None;

    loop {
        let offset = reader.position();
        match reader.peek_u16() {
            Some(m) if m == u16::from(Marker::Sot) || m == u16::from(Marker::Eoc) => break,
            Some(_) => {}
            None => {
                return Err(CodecErrorAt(offset, ErrorKind::Truncated("main header")).into());
            }
        }
        match Segment::read(reader).map_err(|e| e.with_offset(offset))? {
            Segment::Siz(_) => {
                return Err(CodecErrorAt(offset, ErrorKind::Inconsistent("duplicate SIZ")).into())
            }
            Segment::Cod(s) => cod = Some(s),
            Segment::Qcd(s) => qcd = Some(s),
            Segment::Cap(s) => cap = Some(s),
            Segment::Com(s) => com = Some(s),
            Segment::Sot(_) => unreachable!("SOT is handled by the peek above"),
            Segment::Unknown { .. } => {}
        }
    }

    let header = MainHeader {
        siz,
        cod: cod.ok_or(ErrorKind::Inconsistent("main header without COD"))?,
        qcd: qcd.ok_or(ErrorKind::Inconsistent("main header without QCD"))?,
        cap,
        com,
    };
    header.validate()?;
    Ok(header)
}

/// Emit SOC and the main header segments.
pub fn write_main_header(writer: &mut StreamWriter, header: &MainHeader) {
    writer.write_u16(Marker::Soc.into());
    Segment::Siz(header.siz.clone()).write(writer);
    if let Some(cap) = &header.cap {
        Segment::Cap(cap.clone()).write(writer);
    }
    Segment::Cod(header.cod).write(writer);
    Segment::Qcd(header.qcd.clone()).write(writer);
    if let Some(com) = &header.com {
        Segment::Com(com.clone()).write(writer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_header() -> MainHeader {
        MainHeader {
            siz: Siz {
                rsiz: 0,
                width: 64,
                height: 48,
                x_offset: 0,
                y_offset: 0,
                tile_width: 64,
                tile_height: 48,
                tile_x_offset: 0,
                tile_y_offset: 0,
                components: vec![
                    ComponentInfo {
                        precision: 8,
                        signed: false
                    };
                    3
                ],
            },
            cod: Cod {
                sop_markers: false,
                eph_markers: false,
                progression: ProgressionOrder::Lrcp,
                layers: 1,
                mct: true,
                decomposition_levels: 3,
                cb_width_exp: 6,
                cb_height_exp: 6,
                cb_style: 0,
                transformation: Transformation::Reversible53,
            },
            qcd: Qcd {
                guard_bits: 2,
                values: QuantizationValues::NoQuantization {
                    exponents: vec![9; 10],
                },
            },
            cap: None,
            com: Some(Com::latin1("jp2kit")),
        }
    }

    #[test]
    fn main_header_roundtrip() {
        let header = sample_header();
        let mut writer = StreamWriter::new();
        write_main_header(&mut writer, &header);
        writer.write_u16(Marker::Eoc.into());
        let bytes = writer.into_bytes();
        assert_eq!(&bytes[..4], &[0xFF, 0x4F, 0xFF, 0x51]);

        let mut reader = StreamReader::new(&bytes);
        let parsed = read_main_header(&mut reader).unwrap();
        assert_eq!(parsed, header);
        assert_eq!(reader.peek_u16(), Some(u16::from(Marker::Eoc)));
    }

    #[test]
    fn every_length_field_matches_byte_count() {
        let mut writer = StreamWriter::new();
        write_main_header(&mut writer, &sample_header());
        let bytes = writer.into_bytes();
        let mut pos = 2; // skip SOC
        while pos + 4 <= bytes.len() {
            let length = u16::from_be_bytes([bytes[pos + 2], bytes[pos + 3]]) as usize;
            assert!(pos + 2 + length <= bytes.len());
            pos += 2 + length;
        }
        assert_eq!(pos, bytes.len());
    }

    #[test]
    fn transform_and_quantization_must_agree() {
        let mut header = sample_header();
        header.qcd.values = QuantizationValues::ScalarDerived {
            exponent: 10,
            mantissa: 0,
        };
        let err = header.validate().unwrap_err();
        assert!(matches!(err.kind, ErrorKind::Inconsistent(_)));
    }

    #[test]
    fn siz_must_follow_soc() {
        // SOC then COD instead of SIZ.
        let bytes = [0xFF, 0x4F, 0xFF, 0x52, 0x00, 0x0C, 0, 0, 0, 1, 0, 3, 4, 4, 0, 1];
        let mut reader = StreamReader::new(&bytes);
        let err = read_main_header(&mut reader).unwrap_err();
        assert!(matches!(err.kind, ErrorKind::Inconsistent(_)));
    }

    #[test]
    fn qcd_styles_roundtrip() {
        for values in [
            QuantizationValues::NoQuantization {
                exponents: vec![8, 9, 9, 10],
            },
            QuantizationValues::ScalarDerived {
                exponent: 17,
                mantissa: 0x312,
            },
            QuantizationValues::ScalarExpounded {
                pairs: vec![(15, 1), (16, 2047)],
            },
        ] {
            let qcd = Qcd {
                guard_bits: 2,
                values,
            };
            let mut writer = StreamWriter::new();
            Segment::Qcd(qcd.clone()).write(&mut writer);
            let bytes = writer.into_bytes();
            let mut reader = StreamReader::new(&bytes);
            let parsed = Segment::read(&mut reader).unwrap();
            assert_eq!(parsed, Segment::Qcd(qcd));
        }
    }
}

//! ISO-BMFF container sniffing and header probing
//!
//! Everything here reads headers only. Pixel payloads are never touched,
//! and malformed input yields `Unsupported`/`None` rather than an error.

use crate::codec::{LoopCount, SequenceInfo};
use crate::error::{Error, Result};
use crate::image::{
    ColorPrimaries, ColorRange, ImageMetadata, ImageSize, MatrixCoefficients, Nclx, Orientation,
    TransferCharacteristics,
};
use whereat::at;

/// Container type identified from the `ftyp` major brand
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContainerKind {
    /// Still AVIF image
    Avif,
    /// Animated AVIF image sequence (`avis`)
    AvifSequence,
    /// HEIF/HEIC image
    Heic,
    /// Anything else
    Unsupported,
}

impl ContainerKind {
    pub fn is_avif(self) -> bool {
        matches!(self, ContainerKind::Avif | ContainerKind::AvifSequence)
    }

    pub fn is_heif(self) -> bool {
        matches!(self, ContainerKind::Heic)
    }

    pub fn is_supported(self) -> bool {
        !matches!(self, ContainerKind::Unsupported)
    }
}

const HEIF_BRANDS: [&[u8; 4]; 6] = [b"heic", b"heix", b"hevc", b"hevx", b"mif1", b"msf1"];

/// Classify a buffer by the major brand of its leading `ftyp` box
///
/// Reads bytes 4..12 only. Short or unknown input is
/// [`ContainerKind::Unsupported`].
pub fn classify(data: &[u8]) -> ContainerKind {
    let Some(header) = data.get(4..12) else {
        return ContainerKind::Unsupported;
    };
    if &header[..4] != b"ftyp" {
        return ContainerKind::Unsupported;
    }
    let brand = &header[4..8];
    if brand == b"avif" {
        ContainerKind::Avif
    } else if brand == b"avis" {
        ContainerKind::AvifSequence
    } else if HEIF_BRANDS.iter().any(|b| &b[..] == brand) {
        ContainerKind::Heic
    } else {
        ContainerKind::Unsupported
    }
}

/// Size of the primary image, with orientation applied
///
/// An empty buffer is an error; anything else that cannot be parsed is
/// `Ok(None)`.
pub fn probe_size(data: &[u8]) -> Result<Option<ImageSize>> {
    if data.is_empty() {
        return Err(at(Error::invalid_dimensions(0, 0)));
    }
    Ok(probe(data).map(|meta| meta.display_size()))
}

/// Read size and orientation of the primary item from container headers
pub fn probe(data: &[u8]) -> Option<ImageMetadata> {
    let top = children(data)?;
    let from_meta = find(&top, b"meta").and_then(|meta| probe_meta(full_box_body(meta.body)?));
    let meta = match from_meta {
        Some(meta) => meta,
        None => ImageMetadata {
            size: probe_track_size(&top)?,
            orientation: Orientation::Normal,
            bit_depth: None,
            nclx: None,
        },
    };
    if meta.size.width == 0 || meta.size.height == 0 {
        return None;
    }
    Some(meta)
}

/// Parse `moov` timing of the first picture/video track
pub fn parse_sequence_info(data: &[u8]) -> Option<SequenceInfo> {
    let top = children(data)?;
    let moov = children(find(&top, b"moov")?.body)?;
    let mvhd = parse_mvhd(find(&moov, b"mvhd")?.body)?;

    let track = moov
        .iter()
        .filter(|b| &b.kind == b"trak")
        .filter_map(|trak| children(trak.body))
        .find(|trak| track_handler(trak).is_some_and(|h| &h == b"pict" || &h == b"vide"))?;

    let mdia = children(find(&track, b"mdia")?.body)?;
    let timescale = parse_mdhd_timescale(find(&mdia, b"mdhd")?.body)?;
    let minf = children(find(&mdia, b"minf")?.body)?;
    let stbl = children(find(&minf, b"stbl")?.body)?;
    let frame_deltas = parse_stts(find(&stbl, b"stts")?.body)?;
    if frame_deltas.is_empty() {
        return None;
    }

    let loop_count = find(&track, b"edts")
        .and_then(|edts| children(edts.body))
        .and_then(|edts| find(&edts, b"elst").and_then(|elst| parse_elst(elst.body, &mvhd)))
        .unwrap_or(LoopCount::Infinite);

    Some(SequenceInfo {
        timescale,
        frame_deltas,
        loop_count,
    })
}

// Frame counts above this are treated as hostile input.
const MAX_FRAMES: u64 = 1 << 20;

#[derive(Debug, Clone, Copy)]
struct BoxRef<'a> {
    kind: [u8; 4],
    body: &'a [u8],
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn read(&mut self, n: usize) -> Option<&'a [u8]> {
        let end = self.pos.checked_add(n)?;
        let bytes = self.data.get(self.pos..end)?;
        self.pos = end;
        Some(bytes)
    }

    fn skip(&mut self, n: usize) -> Option<()> {
        self.read(n).map(|_| ())
    }

    fn u8(&mut self) -> Option<u8> {
        self.read(1).map(|b| b[0])
    }

    fn u16(&mut self) -> Option<u16> {
        self.read(2)?.try_into().ok().map(u16::from_be_bytes)
    }

    fn u32(&mut self) -> Option<u32> {
        self.read(4)?.try_into().ok().map(u32::from_be_bytes)
    }

    fn u64(&mut self) -> Option<u64> {
        self.read(8)?.try_into().ok().map(u64::from_be_bytes)
    }

    fn uint(&mut self, bytes: usize) -> Option<u32> {
        match bytes {
            1 => self.u8().map(u32::from),
            2 => self.u16().map(u32::from),
            _ => self.u32(),
        }
    }

    fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }
}

/// Split `data` into consecutive boxes; `None` if any header is malformed
fn children(data: &[u8]) -> Option<Vec<BoxRef<'_>>> {
    let mut boxes = Vec::new();
    let mut r = Reader::new(data);
    while r.remaining() > 0 {
        let start = r.pos;
        let size32 = r.u32()?;
        let kind: [u8; 4] = r.read(4)?.try_into().ok()?;
        let size = match size32 {
            // runs to the end of the enclosing data
            0 => (data.len() - start) as u64,
            1 => r.u64()?,
            n => u64::from(n),
        };
        let header = r.pos - start;
        let size = usize::try_from(size).ok()?;
        if size < header {
            return None;
        }
        let body = r.read(size - header)?;
        boxes.push(BoxRef { kind, body });
    }
    Some(boxes)
}

fn find<'a, 'b>(boxes: &'b [BoxRef<'a>], kind: &[u8; 4]) -> Option<&'b BoxRef<'a>> {
    boxes.iter().find(|b| &b.kind == kind)
}

/// Version of a full box plus its remaining body
fn full_box(body: &[u8]) -> Option<(u8, u32, &[u8])> {
    let mut r = Reader::new(body);
    let version = r.u8()?;
    let flags = r.uint(2)? << 8 | r.uint(1)?;
    Some((version, flags, &body[4..]))
}

fn full_box_body(body: &[u8]) -> Option<&[u8]> {
    full_box(body).map(|(_, _, rest)| rest)
}

#[derive(Debug, Clone, Copy)]
enum Property {
    Size(ImageSize),
    Rotation(u8),
    Mirror(u8),
    BitDepth(u8),
    Colour(Nclx),
    Other,
}

fn parse_property(b: &BoxRef<'_>) -> Property {
    match &b.kind {
        b"ispe" => full_box_body(b.body)
            .and_then(|rest| {
                let mut r = Reader::new(rest);
                Some(Property::Size(ImageSize::new(r.u32()?, r.u32()?)))
            })
            .unwrap_or(Property::Other),
        b"irot" => b.body.first().map_or(Property::Other, |v| Property::Rotation(v & 0x3)),
        b"imir" => b.body.first().map_or(Property::Other, |v| Property::Mirror(v & 0x1)),
        b"pixi" => full_box_body(b.body)
            .and_then(|rest| {
                let mut r = Reader::new(rest);
                let channels = r.u8()?;
                if channels == 0 {
                    return None;
                }
                // first channel is luma
                Some(Property::BitDepth(r.u8()?))
            })
            .unwrap_or(Property::Other),
        b"colr" => parse_nclx(b.body).map_or(Property::Other, Property::Colour),
        _ => Property::Other,
    }
}

/// `colr` with colour type `nclx`; ICC profiles are not inspected
fn parse_nclx(body: &[u8]) -> Option<Nclx> {
    let mut r = Reader::new(body);
    if r.read(4)? != b"nclx" {
        return None;
    }
    let code = |v: u16| u8::try_from(v).ok();
    let primaries = code(r.u16()?)?;
    let transfer = code(r.u16()?)?;
    let matrix = code(r.u16()?)?;
    let full_range = r.u8()? & 0x80 != 0;
    Some(Nclx {
        color_primaries: ColorPrimaries(primaries),
        transfer_characteristics: TransferCharacteristics(transfer),
        matrix_coefficients: MatrixCoefficients(matrix),
        color_range: if full_range {
            ColorRange::Full
        } else {
            ColorRange::Limited
        },
    })
}

fn probe_meta(meta_body: &[u8]) -> Option<ImageMetadata> {
    let meta = children(meta_body)?;
    let iprp = children(find(&meta, b"iprp")?.body)?;
    let properties: Vec<Property> = children(find(&iprp, b"ipco")?.body)?
        .iter()
        .map(parse_property)
        .collect();

    let primary = find(&meta, b"pitm").and_then(|pitm| {
        let (version, _, rest) = full_box(pitm.body)?;
        Reader::new(rest).uint(if version == 0 { 2 } else { 4 })
    });
    let associated = match (primary, find(&iprp, b"ipma")) {
        (Some(item), Some(ipma)) => parse_ipma(ipma.body, item)?,
        _ => Vec::new(),
    };

    let mut size = None;
    let mut rotation = 0u8;
    let mut mirror = None;
    let mut bit_depth = None;
    let mut nclx = None;
    if associated.is_empty() {
        size = properties.iter().find_map(|p| match p {
            Property::Size(s) => Some(*s),
            _ => None,
        });
        bit_depth = properties.iter().find_map(|p| match p {
            Property::BitDepth(d) => Some(*d),
            _ => None,
        });
        nclx = properties.iter().find_map(|p| match p {
            Property::Colour(c) => Some(*c),
            _ => None,
        });
    } else {
        for index in associated {
            // property indices are 1-based, 0 means "no property"
            match index.checked_sub(1).and_then(|i| properties.get(i)) {
                Some(Property::Size(s)) => size = Some(*s),
                Some(Property::Rotation(r)) => rotation = *r,
                Some(Property::Mirror(m)) => mirror = Some(*m),
                Some(Property::BitDepth(d)) => bit_depth = Some(*d),
                Some(Property::Colour(c)) => nclx = Some(*c),
                _ => {}
            }
        }
    }
    Some(ImageMetadata {
        size: size?,
        orientation: Orientation::from_heif(rotation, mirror),
        bit_depth,
        nclx,
    })
}

/// Property indices associated with `item`, in association order
fn parse_ipma(body: &[u8], item: u32) -> Option<Vec<usize>> {
    let (version, flags, rest) = full_box(body)?;
    let mut r = Reader::new(rest);
    let id_bytes = if version < 1 { 2 } else { 4 };
    let (index_bytes, essential_mask) = if flags & 1 != 0 {
        (2, 0x8000)
    } else {
        (1, 0x80)
    };
    let entry_count = r.u32()?;
    for _ in 0..entry_count {
        let item_id = r.uint(id_bytes)?;
        let count = r.u8()?;
        let mut indices = Vec::with_capacity(usize::from(count));
        for _ in 0..count {
            let value = r.uint(index_bytes)?;
            indices.push((value & !essential_mask) as usize);
        }
        if item_id == item {
            return Some(indices);
        }
    }
    Some(Vec::new())
}

fn probe_track_size(top: &[BoxRef<'_>]) -> Option<ImageSize> {
    let moov = children(find(top, b"moov")?.body)?;
    let trak = children(find(&moov, b"trak")?.body)?;
    let (version, _, rest) = full_box(find(&trak, b"tkhd")?.body)?;
    let mut r = Reader::new(rest);
    // times, track id, reserved, duration
    r.skip(if version == 1 { 32 } else { 20 })?;
    // reserved, layer, alternate group, volume, reserved, matrix
    r.skip(8 + 2 + 2 + 2 + 2 + 36)?;
    let width = r.u32()? >> 16;
    let height = r.u32()? >> 16;
    Some(ImageSize::new(width, height))
}

struct MovieHeader {
    timescale: u32,
    duration: u64,
}

fn parse_mvhd(body: &[u8]) -> Option<MovieHeader> {
    let (version, _, rest) = full_box(body)?;
    let mut r = Reader::new(rest);
    if version == 1 {
        r.skip(16)?;
        let timescale = r.u32()?;
        let duration = r.u64()?;
        Some(MovieHeader { timescale, duration })
    } else {
        r.skip(8)?;
        let timescale = r.u32()?;
        let duration = match r.u32()? {
            u32::MAX => u64::MAX,
            d => u64::from(d),
        };
        Some(MovieHeader { timescale, duration })
    }
}

fn parse_mdhd_timescale(body: &[u8]) -> Option<u32> {
    let (version, _, rest) = full_box(body)?;
    let mut r = Reader::new(rest);
    r.skip(if version == 1 { 16 } else { 8 })?;
    r.u32()
}

fn track_handler(trak: &[BoxRef<'_>]) -> Option<[u8; 4]> {
    let mdia = children(find(trak, b"mdia")?.body)?;
    let rest = full_box_body(find(&mdia, b"hdlr")?.body)?;
    rest.get(4..8)?.try_into().ok()
}

fn parse_stts(body: &[u8]) -> Option<Vec<u32>> {
    let rest = full_box_body(body)?;
    let mut r = Reader::new(rest);
    let entry_count = r.u32()?;
    let mut deltas = Vec::new();
    let mut total = 0u64;
    for _ in 0..entry_count {
        let count = r.u32()?;
        let delta = r.u32()?;
        total += u64::from(count);
        if total > MAX_FRAMES {
            return None;
        }
        deltas.extend(std::iter::repeat_n(delta, count as usize));
    }
    Some(deltas)
}

/// Loop count from the edit list; bit 0 of the flags means "repeat"
fn parse_elst(body: &[u8], mvhd: &MovieHeader) -> Option<LoopCount> {
    let (version, flags, rest) = full_box(body)?;
    if flags & 1 == 0 {
        return Some(LoopCount::Finite(1));
    }
    let mut r = Reader::new(rest);
    let entry_count = r.u32()?;
    if entry_count != 1 {
        return Some(LoopCount::Infinite);
    }
    let segment = if version == 1 {
        r.u64()?
    } else {
        u64::from(r.u32()?)
    };
    if segment == 0 || mvhd.duration == u64::MAX || mvhd.timescale == 0 {
        return Some(LoopCount::Infinite);
    }
    let plays = mvhd.duration.div_ceil(segment);
    Some(LoopCount::Finite(u32::try_from(plays).unwrap_or(u32::MAX)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bx(kind: &[u8; 4], body: &[u8]) -> Vec<u8> {
        let mut out = ((body.len() + 8) as u32).to_be_bytes().to_vec();
        out.extend_from_slice(kind);
        out.extend_from_slice(body);
        out
    }

    fn full(kind: &[u8; 4], version: u8, flags: u32, body: &[u8]) -> Vec<u8> {
        let mut b = vec![version, (flags >> 16) as u8, (flags >> 8) as u8, flags as u8];
        b.extend_from_slice(body);
        bx(kind, &b)
    }

    fn ftyp(brand: &[u8; 4]) -> Vec<u8> {
        let mut body = brand.to_vec();
        body.extend_from_slice(&0u32.to_be_bytes());
        body.extend_from_slice(b"mif1");
        bx(b"ftyp", &body)
    }

    fn ispe(w: u32, h: u32) -> Vec<u8> {
        let mut b = w.to_be_bytes().to_vec();
        b.extend_from_slice(&h.to_be_bytes());
        full(b"ispe", 0, 0, &b)
    }

    fn still(brand: &[u8; 4], props: &[Vec<u8>], assoc: &[u8]) -> Vec<u8> {
        let mut data = ftyp(brand);
        let pitm = full(b"pitm", 0, 0, &1u16.to_be_bytes());
        let ipco = bx(b"ipco", &props.concat());
        let mut ipma_body = 1u32.to_be_bytes().to_vec();
        ipma_body.extend_from_slice(&1u16.to_be_bytes());
        ipma_body.push(assoc.len() as u8);
        ipma_body.extend_from_slice(assoc);
        let ipma = full(b"ipma", 0, 0, &ipma_body);
        let iprp = bx(b"iprp", &[ipco, ipma].concat());
        data.extend(full(b"meta", 0, 0, &[pitm, iprp].concat()));
        data
    }

    #[test]
    fn classify_brands() {
        assert_eq!(classify(&ftyp(b"avif")), ContainerKind::Avif);
        assert_eq!(classify(&ftyp(b"avis")), ContainerKind::AvifSequence);
        for brand in HEIF_BRANDS {
            assert_eq!(classify(&ftyp(brand)), ContainerKind::Heic);
        }
        assert_eq!(classify(&ftyp(b"isom")), ContainerKind::Unsupported);
    }

    #[test]
    fn classify_short_and_garbage() {
        assert_eq!(classify(&[]), ContainerKind::Unsupported);
        let data = ftyp(b"avif");
        for len in 0..12 {
            assert_eq!(classify(&data[..len]), ContainerKind::Unsupported);
        }
        assert_eq!(classify(b"\x89PNG\r\n\x1a\n\0\0\0\0"), ContainerKind::Unsupported);
    }

    #[test]
    fn kind_predicates() {
        assert!(ContainerKind::AvifSequence.is_avif());
        assert!(!ContainerKind::Heic.is_avif());
        assert!(ContainerKind::Heic.is_heif());
        assert!(!ContainerKind::Unsupported.is_supported());
    }

    #[test]
    fn probe_primary_ispe() {
        let data = still(b"avif", &[ispe(64, 48)], &[0x81]);
        assert_eq!(probe_size(&data).unwrap(), Some(ImageSize::new(64, 48)));
    }

    #[test]
    fn probe_uses_associated_property_not_first() {
        let data = still(b"heic", &[ispe(8, 8), ispe(640, 480)], &[2]);
        assert_eq!(probe_size(&data).unwrap(), Some(ImageSize::new(640, 480)));
    }

    #[test]
    fn probe_applies_rotation() {
        let irot = bx(b"irot", &[1]);
        let data = still(b"heic", &[ispe(400, 300), irot], &[1, 0x82]);
        let meta = probe(&data).unwrap();
        assert_eq!(meta.orientation, Orientation::Rotate270);
        assert_eq!(meta.size, ImageSize::new(400, 300));
        assert_eq!(probe_size(&data).unwrap(), Some(ImageSize::new(300, 400)));
    }

    #[test]
    fn probe_reads_depth_and_nclx() {
        let pixi = full(b"pixi", 0, 0, &[3, 10, 10, 10]);
        let mut colr = b"nclx".to_vec();
        for code in [9u16, 16, 9] {
            colr.extend_from_slice(&code.to_be_bytes());
        }
        colr.push(0x80);
        let data = still(b"avif", &[ispe(16, 16), pixi, bx(b"colr", &colr)], &[1, 2, 3]);
        let meta = probe(&data).unwrap();
        assert_eq!(meta.bit_depth, Some(10));
        let nclx = meta.nclx.unwrap();
        assert_eq!(nclx.color_primaries, ColorPrimaries::BT2020);
        assert_eq!(nclx.transfer_characteristics, TransferCharacteristics::SMPTE2084);
        assert_eq!(nclx.color_range, ColorRange::Full);

        let icc = bx(b"colr", b"prof\0\0\0\0");
        let data = still(b"avif", &[ispe(16, 16), icc], &[1, 2]);
        let meta = probe(&data).unwrap();
        assert_eq!((meta.bit_depth, meta.nclx), (None, None));
    }

    #[test]
    fn probe_empty_is_hard_error() {
        let err = probe_size(&[]).unwrap_err().into_inner();
        assert!(matches!(err, Error::InvalidDimensions { .. }));
    }

    #[test]
    fn probe_truncated_is_soft() {
        let data = still(b"avif", &[ispe(64, 48)], &[1]);
        for len in [1, 11, 20, data.len() - 1] {
            assert_eq!(probe_size(&data[..len]).unwrap(), None, "len {len}");
        }
    }

    #[test]
    fn probe_zero_size_is_absent() {
        let data = still(b"avif", &[ispe(0, 48)], &[1]);
        assert_eq!(probe_size(&data).unwrap(), None);
    }

    #[test]
    fn large_size_box_header() {
        let mut data = ftyp(b"avif");
        let inner = [ispe(10, 20)].concat();
        let ipco = bx(b"ipco", &inner);
        let iprp = bx(b"iprp", &ipco);
        let meta_body = [vec![0, 0, 0, 0], iprp].concat();
        // 64-bit size form
        data.extend_from_slice(&1u32.to_be_bytes());
        data.extend_from_slice(b"meta");
        data.extend_from_slice(&((meta_body.len() + 16) as u64).to_be_bytes());
        data.extend_from_slice(&meta_body);
        assert_eq!(probe_size(&data).unwrap(), Some(ImageSize::new(10, 20)));
    }

    fn sequence(deltas: &[(u32, u32)], elst: Option<(u32, u32)>) -> Vec<u8> {
        let mut data = ftyp(b"avis");
        let mut mvhd = Vec::new();
        mvhd.extend_from_slice(&[0; 8]);
        mvhd.extend_from_slice(&1000u32.to_be_bytes());
        mvhd.extend_from_slice(&3000u32.to_be_bytes());
        let mvhd = full(b"mvhd", 0, 0, &mvhd);

        let mut mdhd = vec![0; 8];
        mdhd.extend_from_slice(&30u32.to_be_bytes());
        mdhd.extend_from_slice(&0u32.to_be_bytes());
        let mdhd = full(b"mdhd", 0, 0, &mdhd);
        let hdlr = full(b"hdlr", 0, 0, &[0, 0, 0, 0, b'p', b'i', b'c', b't']);
        let mut stts = (deltas.len() as u32).to_be_bytes().to_vec();
        for (count, delta) in deltas {
            stts.extend_from_slice(&count.to_be_bytes());
            stts.extend_from_slice(&delta.to_be_bytes());
        }
        let stbl = bx(b"stbl", &full(b"stts", 0, 0, &stts));
        let minf = bx(b"minf", &stbl);
        let mdia = bx(b"mdia", &[mdhd, hdlr, minf].concat());
        let mut trak = mdia;
        if let Some((flags, segment)) = elst {
            let mut e = 1u32.to_be_bytes().to_vec();
            e.extend_from_slice(&segment.to_be_bytes());
            e.extend_from_slice(&0u32.to_be_bytes());
            e.extend_from_slice(&0x0001_0000u32.to_be_bytes());
            trak.extend(bx(b"edts", &full(b"elst", 0, flags, &e)));
        }
        data.extend(bx(b"moov", &[mvhd, bx(b"trak", &trak)].concat()));
        data
    }

    #[test]
    fn sequence_timing_from_stts() {
        let info = parse_sequence_info(&sequence(&[(2, 3), (1, 6)], None)).unwrap();
        assert_eq!(info.timescale, 30);
        assert_eq!(info.frame_deltas, vec![3, 3, 6]);
        assert_eq!(info.frame_duration_ms(2), Some(200));
        assert_eq!(info.loop_count, LoopCount::Infinite);
    }

    #[test]
    fn sequence_loop_count_from_edit_list() {
        let once = parse_sequence_info(&sequence(&[(3, 1)], Some((0, 1000)))).unwrap();
        assert_eq!(once.loop_count, LoopCount::Finite(1));
        let thrice = parse_sequence_info(&sequence(&[(3, 1)], Some((1, 1000)))).unwrap();
        assert_eq!(thrice.loop_count, LoopCount::Finite(3));
        let forever = parse_sequence_info(&sequence(&[(3, 1)], Some((1, 0)))).unwrap();
        assert_eq!(forever.loop_count, LoopCount::Infinite);
    }

    #[test]
    fn sequence_missing_moov_is_none() {
        assert!(parse_sequence_info(&ftyp(b"avis")).is_none());
        assert!(parse_sequence_info(&sequence(&[], None)).is_none());
    }
}

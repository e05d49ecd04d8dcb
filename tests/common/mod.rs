//! Shared fixtures: an ISO-BMFF writer and a codec that synthesizes frames
//!
//! Files written here carry real `ftyp`/`meta`/`moov` headers. The `mdat`
//! payload is a small frame description the [`MockCodec`] expands into
//! planes, so the whole decode pipeline runs without an AV1 decoder.

#![allow(dead_code)]

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use zenheif::{
    ChromaSampling, Codec, CodecError, ColorPrimaries, ColorRange, ContainerKind,
    ContentLightLevel, EncodeRequest, EncodeSamples, EncodeTarget, FramePlanes,
    MatrixCoefficients, Nclx, Plane, ResolvedChroma, Sequence, SequenceInfo,
    TransferCharacteristics, YuvFrame,
};

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn bx(kind: &[u8; 4], body: &[u8]) -> Vec<u8> {
    let mut out = ((body.len() + 8) as u32).to_be_bytes().to_vec();
    out.extend_from_slice(kind);
    out.extend_from_slice(body);
    out
}

pub fn full(kind: &[u8; 4], version: u8, flags: u32, body: &[u8]) -> Vec<u8> {
    let mut b = vec![version, (flags >> 16) as u8, (flags >> 8) as u8, flags as u8];
    b.extend_from_slice(body);
    bx(kind, &b)
}

pub fn ftyp(brand: &[u8; 4]) -> Vec<u8> {
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

/// What the mock codec decodes out of an `mdat`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameSpec {
    pub width: u32,
    pub height: u32,
    pub bit_depth: u8,
    pub chroma: ChromaSampling,
    pub alpha: bool,
    pub nclx: Nclx,
    /// 0 means no `clli`
    pub max_cll: u16,
}

impl FrameSpec {
    pub fn sdr(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            bit_depth: 8,
            chroma: ChromaSampling::Cs420,
            alpha: false,
            nclx: srgb_nclx(),
            max_cll: 0,
        }
    }

    pub fn pq(width: u32, height: u32) -> Self {
        Self {
            bit_depth: 10,
            nclx: Nclx {
                color_primaries: ColorPrimaries::BT2020,
                transfer_characteristics: TransferCharacteristics::SMPTE2084,
                matrix_coefficients: MatrixCoefficients::BT2020_NCL,
                color_range: ColorRange::Full,
            },
            max_cll: 1000,
            ..Self::sdr(width, height)
        }
    }

    fn to_bytes(self) -> Vec<u8> {
        let mut out = self.width.to_be_bytes().to_vec();
        out.extend_from_slice(&self.height.to_be_bytes());
        out.push(self.bit_depth);
        out.push(match self.chroma {
            ChromaSampling::Cs420 => 0,
            ChromaSampling::Cs422 => 1,
            ChromaSampling::Cs444 => 2,
            ChromaSampling::Monochrome => 3,
        });
        out.push(u8::from(self.alpha));
        out.push(self.nclx.color_primaries.0);
        out.push(self.nclx.transfer_characteristics.0);
        out.push(self.nclx.matrix_coefficients.0);
        out.push(u8::from(self.nclx.color_range == ColorRange::Full));
        out.extend_from_slice(&self.max_cll.to_be_bytes());
        out
    }

    fn from_bytes(b: &[u8]) -> Option<Self> {
        if b.len() < 17 {
            return None;
        }
        let be32 = |i: usize| u32::from_be_bytes([b[i], b[i + 1], b[i + 2], b[i + 3]]);
        Some(Self {
            width: be32(0),
            height: be32(4),
            bit_depth: b[8],
            chroma: match b[9] {
                0 => ChromaSampling::Cs420,
                1 => ChromaSampling::Cs422,
                2 => ChromaSampling::Cs444,
                _ => ChromaSampling::Monochrome,
            },
            alpha: b[10] != 0,
            nclx: Nclx {
                color_primaries: ColorPrimaries(b[11]),
                transfer_characteristics: TransferCharacteristics(b[12]),
                matrix_coefficients: MatrixCoefficients(b[13]),
                color_range: if b[14] != 0 {
                    ColorRange::Full
                } else {
                    ColorRange::Limited
                },
            },
            max_cll: u16::from_be_bytes([b[15], b[16]]),
        })
    }

    /// Synthesize frame `index`: a luma ramp shifted per frame, neutral chroma
    pub fn frame(&self, index: usize) -> YuvFrame {
        let (w, h) = (self.width, self.height);
        let (cw, ch) = self.chroma.chroma_size(w, h);
        let shift = u32::from(self.bit_depth.saturating_sub(8));
        let luma = |x: u32, y: u32| 16 + (x * 7 + y * 3 + index as u32 * 17) % 200;
        let y_vals: Vec<u32> = (0..h).flat_map(|y| (0..w).map(move |x| luma(x, y))).collect();
        let has_chroma = self.chroma != ChromaSampling::Monochrome;
        let chroma_len = (cw * ch) as usize;

        let planes = if self.bit_depth == 8 {
            let chroma = || has_chroma.then(|| Plane::new(vec![128u8; chroma_len], cw, ch));
            FramePlanes::Depth8 {
                y: Plane::new(y_vals.iter().map(|&v| v as u8).collect(), w, h),
                u: chroma(),
                v: chroma(),
                alpha: self
                    .alpha
                    .then(|| Plane::new(vec![128u8; (w * h) as usize], w, h)),
            }
        } else {
            let mid = 128u16 << shift;
            let chroma = || has_chroma.then(|| Plane::new(vec![mid; chroma_len], cw, ch));
            FramePlanes::Depth16 {
                y: Plane::new(y_vals.iter().map(|&v| (v << shift) as u16).collect(), w, h),
                u: chroma(),
                v: chroma(),
                alpha: self
                    .alpha
                    .then(|| Plane::new(vec![mid; (w * h) as usize], w, h)),
            }
        };
        YuvFrame {
            width: w,
            height: h,
            bit_depth: self.bit_depth,
            chroma: self.chroma,
            nclx: self.nclx,
            alpha_range: ColorRange::Full,
            alpha_premultiplied: false,
            content_light: (self.max_cll > 0).then_some(ContentLightLevel {
                max_cll: self.max_cll,
                max_pall: self.max_cll / 4,
            }),
            planes,
        }
    }
}

pub fn srgb_nclx() -> Nclx {
    Nclx {
        color_primaries: ColorPrimaries::BT709,
        transfer_characteristics: TransferCharacteristics::SRGB,
        matrix_coefficients: MatrixCoefficients::BT601,
        color_range: ColorRange::Full,
    }
}

fn pixi(bit_depth: u8) -> Vec<u8> {
    full(b"pixi", 0, 0, &[3, bit_depth, bit_depth, bit_depth])
}

fn colr(nclx: &Nclx) -> Vec<u8> {
    let mut b = b"nclx".to_vec();
    for code in [
        nclx.color_primaries.0,
        nclx.transfer_characteristics.0,
        nclx.matrix_coefficients.0,
    ] {
        b.extend_from_slice(&u16::from(code).to_be_bytes());
    }
    b.push(if nclx.color_range == ColorRange::Full { 0x80 } else { 0 });
    bx(b"colr", &b)
}

fn meta(spec: &FrameSpec, irot: Option<u8>, imir: Option<u8>) -> Vec<u8> {
    let pitm = full(b"pitm", 0, 0, &1u16.to_be_bytes());
    let mut props = vec![
        ispe(spec.width, spec.height),
        pixi(spec.bit_depth),
        colr(&spec.nclx),
    ];
    let mut assoc = vec![0x81u8, 0x02, 0x03];
    if let Some(angle) = irot {
        props.push(bx(b"irot", &[angle]));
        assoc.push(0x80 | props.len() as u8);
    }
    if let Some(axis) = imir {
        props.push(bx(b"imir", &[axis]));
        assoc.push(0x80 | props.len() as u8);
    }
    let ipco = bx(b"ipco", &props.concat());
    let mut ipma = 1u32.to_be_bytes().to_vec();
    ipma.extend_from_slice(&1u16.to_be_bytes());
    ipma.push(assoc.len() as u8);
    ipma.extend_from_slice(&assoc);
    let ipma = full(b"ipma", 0, 0, &ipma);
    let iprp = bx(b"iprp", &[ipco, ipma].concat());
    full(b"meta", 0, 0, &[pitm, iprp].concat())
}

/// A still image file with brand `brand`
pub fn still_file(brand: &[u8; 4], spec: &FrameSpec) -> Vec<u8> {
    oriented_file(brand, spec, None, None)
}

/// A still image file with `irot`/`imir` properties on the primary item
pub fn oriented_file(
    brand: &[u8; 4],
    spec: &FrameSpec,
    irot: Option<u8>,
    imir: Option<u8>,
) -> Vec<u8> {
    let mut data = ftyp(brand);
    data.extend(meta(spec, irot, imir));
    data.extend(bx(b"mdat", &spec.to_bytes()));
    data
}

/// How an animated file repeats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Looping {
    /// No edit list
    Unspecified,
    /// Edit list without the repeat flag
    Once,
    /// Repeat flag with a movie `plays` times the edit segment
    Times(u32),
    /// Repeat flag with an indefinite movie duration
    Forever,
}

/// An `avis` file with one picture track
///
/// `deltas` are per-frame durations in ticks of `timescale`.
pub fn sequence_file(spec: &FrameSpec, timescale: u32, deltas: &[u32], looping: Looping) -> Vec<u8> {
    let mut data = ftyp(b"avis");
    data.extend(meta(spec, None, None));

    let ticks: u64 = deltas.iter().map(|&d| u64::from(d)).sum();
    let segment_ms = (ticks * 1000 / u64::from(timescale.max(1))) as u32;
    let movie_ms = match looping {
        Looping::Times(n) => segment_ms * n,
        Looping::Forever => u32::MAX,
        Looping::Unspecified | Looping::Once => segment_ms,
    };
    let mut mvhd = vec![0; 8];
    mvhd.extend_from_slice(&1000u32.to_be_bytes());
    mvhd.extend_from_slice(&movie_ms.to_be_bytes());
    let mvhd = full(b"mvhd", 0, 0, &mvhd);

    let mut mdhd = vec![0; 8];
    mdhd.extend_from_slice(&timescale.to_be_bytes());
    mdhd.extend_from_slice(&(ticks as u32).to_be_bytes());
    let mdhd = full(b"mdhd", 0, 0, &mdhd);
    let hdlr = full(b"hdlr", 0, 0, &[0, 0, 0, 0, b'p', b'i', b'c', b't']);
    let mut stts = (deltas.len() as u32).to_be_bytes().to_vec();
    for delta in deltas {
        stts.extend_from_slice(&1u32.to_be_bytes());
        stts.extend_from_slice(&delta.to_be_bytes());
    }
    let stbl = bx(b"stbl", &full(b"stts", 0, 0, &stts));
    let minf = bx(b"minf", &stbl);
    let mdia = bx(b"mdia", &[mdhd, hdlr, minf].concat());

    let mut trak = Vec::new();
    let flags = match looping {
        Looping::Unspecified => None,
        Looping::Once => Some(0),
        Looping::Times(_) | Looping::Forever => Some(1),
    };
    if let Some(flags) = flags {
        let mut e = 1u32.to_be_bytes().to_vec();
        e.extend_from_slice(&segment_ms.to_be_bytes());
        e.extend_from_slice(&0u32.to_be_bytes());
        e.extend_from_slice(&0x0001_0000u32.to_be_bytes());
        trak.extend(bx(b"edts", &full(b"elst", 0, flags, &e)));
    }
    trak.extend(mdia);
    let moov = bx(b"moov", &[mvhd, bx(b"trak", &trak)].concat());
    data.extend(moov);
    data.extend(bx(b"mdat", &spec.to_bytes()));
    data
}

fn find_mdat(data: &[u8]) -> Option<&[u8]> {
    let mut pos = 0usize;
    while pos + 8 <= data.len() {
        let size = u32::from_be_bytes(data[pos..pos + 4].try_into().ok()?) as usize;
        if size < 8 || pos + size > data.len() {
            return None;
        }
        if &data[pos + 4..pos + 8] == b"mdat" {
            return Some(&data[pos + 8..pos + size]);
        }
        pos += size;
    }
    None
}

/// Parameters of one encode call, as seen by the codec
#[derive(Debug, Clone, PartialEq)]
pub struct EncodeRecord {
    pub target: EncodeTarget,
    pub width: u32,
    pub height: u32,
    pub ten_bit: bool,
    pub with_alpha: bool,
    pub quality: u8,
    pub crf: Option<(u8, &'static str)>,
    pub chroma: ResolvedChroma,
    pub speed: u8,
    pub nclx: Option<Nclx>,
    pub first_sample: [u16; 4],
}

/// Codec that expands [`FrameSpec`] payloads and writes them back out
#[derive(Debug, Default)]
pub struct MockCodec {
    pub encodes: Mutex<Vec<EncodeRecord>>,
    pub frames_decoded: AtomicUsize,
}

impl MockCodec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_encode(&self) -> Option<EncodeRecord> {
        self.encodes.lock().unwrap().last().cloned()
    }

    pub fn frames_decoded(&self) -> usize {
        self.frames_decoded.load(Ordering::SeqCst)
    }
}

fn read_spec(data: &[u8]) -> Result<FrameSpec, CodecError> {
    find_mdat(data)
        .and_then(FrameSpec::from_bytes)
        .ok_or_else(|| CodecError::Malformed("no frame payload".into()))
}

impl Codec for MockCodec {
    fn decode_image(&self, data: &[u8], kind: ContainerKind) -> Result<YuvFrame, CodecError> {
        if kind == ContainerKind::AvifSequence {
            return Err(CodecError::Unsupported("use open_sequence".into()));
        }
        let spec = read_spec(data)?;
        self.frames_decoded.fetch_add(1, Ordering::SeqCst);
        Ok(spec.frame(0))
    }

    fn open_sequence(&self, data: &[u8]) -> Result<Box<dyn Sequence>, CodecError> {
        let spec = read_spec(data)?;
        let info = zenheif::parse_sequence_info(data)
            .ok_or_else(|| CodecError::Malformed("no picture track".into()))?;
        Ok(Box::new(MockSequence { spec, info }))
    }

    fn encode(&self, request: &EncodeRequest<'_>) -> Result<Vec<u8>, CodecError> {
        let (ten_bit, first_sample) = match request.samples {
            EncodeSamples::Rgba8(px) => (false, px.first().map(|p| p.map(u16::from))),
            EncodeSamples::Rgba10(px) => (true, px.first().copied()),
        };
        let expected = (request.width * request.height) as usize;
        let len = match request.samples {
            EncodeSamples::Rgba8(px) => px.len(),
            EncodeSamples::Rgba10(px) => px.len(),
        };
        if len != expected {
            return Err(CodecError::Malformed(format!("{len} samples for {expected} pixels")));
        }
        self.encodes.lock().unwrap().push(EncodeRecord {
            target: request.target,
            width: request.width,
            height: request.height,
            ten_bit,
            with_alpha: request.with_alpha,
            quality: request.quality,
            crf: request.crf,
            chroma: request.chroma,
            speed: request.speed,
            nclx: request.nclx,
            first_sample: first_sample.unwrap_or_default(),
        });

        let spec = FrameSpec {
            width: request.width,
            height: request.height,
            bit_depth: if ten_bit { 10 } else { 8 },
            chroma: match request.chroma {
                ResolvedChroma::Yuv420 => ChromaSampling::Cs420,
                ResolvedChroma::Yuv422 => ChromaSampling::Cs422,
                ResolvedChroma::Yuv444 => ChromaSampling::Cs444,
                ResolvedChroma::Yuv400 => ChromaSampling::Monochrome,
            },
            alpha: request.with_alpha,
            nclx: request.nclx.unwrap_or_else(srgb_nclx),
            max_cll: 0,
        };
        let brand = match request.target {
            EncodeTarget::Avif => b"avif",
            EncodeTarget::Heic => b"heic",
        };
        Ok(still_file(brand, &spec))
    }
}

struct MockSequence {
    spec: FrameSpec,
    info: SequenceInfo,
}

impl Sequence for MockSequence {
    fn info(&self) -> &SequenceInfo {
        &self.info
    }

    fn decode_frame(&mut self, index: usize) -> Result<YuvFrame, CodecError> {
        Ok(self.spec.frame(index))
    }
}

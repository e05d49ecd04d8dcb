//! The external codec seam
//!
//! Bitstream decode and encode of AV1 and HEVC payloads live behind
//! [`Codec`]. Everything around it (sniffing, probing, geometry, color
//! negotiation, tone mapping, session lifecycle) is handled by this crate.

use crate::container::ContainerKind;
use crate::encoder::{EncodeTarget, PreciseMode, ResolvedChroma};
use crate::image::{ChromaSampling, ColorRange, ImageSize, Nclx};

/// Failure reported by a codec backend
#[derive(Debug, Clone, thiserror::Error)]
#[non_exhaustive]
pub enum CodecError {
    /// The backend cannot handle this item, target, or parameter set
    #[error("unsupported: {0}")]
    Unsupported(String),
    /// The payload or request is malformed
    #[error("malformed: {0}")]
    Malformed(String),
}

/// One sample plane, rows `stride` samples apart
#[derive(Debug, Clone)]
pub struct Plane<T> {
    pub data: Vec<T>,
    /// Samples per row
    pub stride: usize,
    pub width: u32,
    pub height: u32,
}

impl<T: Copy> Plane<T> {
    /// Tightly packed plane
    pub fn new(data: Vec<T>, width: u32, height: u32) -> Self {
        Self {
            data,
            stride: width as usize,
            width,
            height,
        }
    }

    /// Iterate over rows without stride padding
    pub fn rows(&self) -> impl Iterator<Item = &[T]> {
        let width = self.width as usize;
        self.data
            .chunks(self.stride.max(1))
            .take(self.height as usize)
            .map(move |row| &row[..width.min(row.len())])
    }

    pub(crate) fn is_consistent(&self) -> bool {
        self.stride >= self.width as usize
            && self.data.len() >= self.stride * (self.height as usize).saturating_sub(1) + self.width as usize
    }
}

/// Sample planes of a decoded frame
#[derive(Debug, Clone)]
pub enum FramePlanes {
    /// 8-bit samples
    Depth8 {
        y: Plane<u8>,
        u: Option<Plane<u8>>,
        v: Option<Plane<u8>>,
        alpha: Option<Plane<u8>>,
    },
    /// 10, 12, or 16-bit samples in the low bits of each `u16`
    Depth16 {
        y: Plane<u16>,
        u: Option<Plane<u16>>,
        v: Option<Plane<u16>>,
        alpha: Option<Plane<u16>>,
    },
}

/// Content light level information (`clli`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ContentLightLevel {
    /// Maximum content light level in nits, 0 if unknown
    pub max_cll: u16,
    /// Maximum frame-average light level in nits, 0 if unknown
    pub max_pall: u16,
}

/// A frame decoded at native resolution
#[derive(Debug, Clone)]
pub struct YuvFrame {
    pub width: u32,
    pub height: u32,
    /// 8, 10, 12, or 16
    pub bit_depth: u8,
    pub chroma: ChromaSampling,
    pub nclx: Nclx,
    /// Range of the alpha plane
    pub alpha_range: ColorRange,
    pub alpha_premultiplied: bool,
    pub content_light: Option<ContentLightLevel>,
    pub planes: FramePlanes,
}

impl YuvFrame {
    pub fn size(&self) -> ImageSize {
        ImageSize::new(self.width, self.height)
    }

    pub fn has_alpha(&self) -> bool {
        match &self.planes {
            FramePlanes::Depth8 { alpha, .. } => alpha.is_some(),
            FramePlanes::Depth16 { alpha, .. } => alpha.is_some(),
        }
    }
}

/// Repetition of an animated sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoopCount {
    /// Play forever
    #[default]
    Infinite,
    /// Play this many times in total
    Finite(u32),
}

/// Container-level timing of an animated sequence
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceInfo {
    /// Ticks per second of the frame deltas
    pub timescale: u32,
    /// Per-frame duration in timescale ticks; its length is the frame count
    pub frame_deltas: Vec<u32>,
    pub loop_count: LoopCount,
}

impl SequenceInfo {
    pub fn frame_count(&self) -> usize {
        self.frame_deltas.len()
    }

    /// Duration of one frame in milliseconds
    pub fn frame_duration_ms(&self, index: usize) -> Option<u64> {
        let delta = *self.frame_deltas.get(index)?;
        Some(ticks_to_ms(u64::from(delta), self.timescale))
    }

    /// Sum of all frame durations in milliseconds
    pub fn total_duration_ms(&self) -> u64 {
        let ticks: u64 = self.frame_deltas.iter().map(|&d| u64::from(d)).sum();
        ticks_to_ms(ticks, self.timescale)
    }
}

fn ticks_to_ms(ticks: u64, timescale: u32) -> u64 {
    if timescale == 0 {
        return 0;
    }
    ticks.saturating_mul(1000) / u64::from(timescale)
}

/// An opened multi-frame decode session owned by the codec
pub trait Sequence: Send {
    fn info(&self) -> &SequenceInfo;

    /// Decode frame `index` at native resolution
    ///
    /// Callers guarantee `index < info().frame_count()`.
    fn decode_frame(&mut self, index: usize) -> Result<YuvFrame, CodecError>;
}

/// Interleaved samples handed to the encoder
#[derive(Debug, Clone, Copy)]
pub enum EncodeSamples<'a> {
    /// 8-bit RGBA, one `[r, g, b, a]` per pixel
    Rgba8(&'a [[u8; 4]]),
    /// 10-bit RGBA (0..=1023), one `[r, g, b, a]` per pixel
    Rgba10(&'a [[u16; 4]]),
}

/// A fully validated encode request
#[derive(Debug, Clone)]
pub struct EncodeRequest<'a> {
    pub target: EncodeTarget,
    pub width: u32,
    pub height: u32,
    pub samples: EncodeSamples<'a>,
    /// Whether the alpha channel should be written
    pub with_alpha: bool,
    /// 0..=100
    pub quality: u8,
    /// CRF and x265 preset name, HEIC only
    pub crf: Option<(u8, &'static str)>,
    pub precise_mode: PreciseMode,
    pub chroma: ResolvedChroma,
    /// 0 (slowest) ..= 10 (fastest)
    pub speed: u8,
    /// `None` means untagged
    pub nclx: Option<Nclx>,
}

/// Bitstream-level decoder and encoder for AV1/HEVC image items
///
/// Each method defaults to reporting [`CodecError::Unsupported`], so a
/// backend implements only what it provides.
pub trait Codec: Send + Sync {
    /// Decode the primary image item at native resolution
    fn decode_image(&self, data: &[u8], kind: ContainerKind) -> Result<YuvFrame, CodecError> {
        let _ = data;
        Err(CodecError::Unsupported(format!(
            "decoding {kind:?} is not provided by this codec"
        )))
    }

    /// Open an animated sequence
    ///
    /// `data` is owned by the caller's session for as long as the returned
    /// sequence lives; backends copy what they keep.
    fn open_sequence(&self, data: &[u8]) -> Result<Box<dyn Sequence>, CodecError> {
        let _ = data;
        Err(CodecError::Unsupported(
            "sequences are not provided by this codec".into(),
        ))
    }

    /// Encode a complete image
    fn encode(&self, request: &EncodeRequest<'_>) -> Result<Vec<u8>, CodecError> {
        Err(CodecError::Unsupported(format!(
            "encoding {:?} is not provided by this codec",
            request.target
        )))
    }
}

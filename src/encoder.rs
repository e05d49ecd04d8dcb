//! AVIF/HEIC encoding
//!
//! [`Encoder`] validates a [`PixelSurface`] against an [`EncoderConfig`],
//! resolves automatic chroma and surface choices, maps the color tag to
//! NCLX, and hands an [`EncodeRequest`] to the codec backend.

use crate::codec::{Codec, EncodeRequest, EncodeSamples};
use crate::color::ResolvedPixelFormat;
use crate::convert;
use crate::error::{Error, Result};
use crate::image::{ColorPrimaries, ColorRange, MatrixCoefficients, Nclx, PixelSurface, TransferCharacteristics};
use std::sync::Arc;
use log::{debug, warn};
use whereat::at;

/// Output container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EncodeTarget {
    /// AV1 in AVIF
    Avif,
    /// HEVC in HEIF
    Heic,
}

/// x265 speed preset used in CRF mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum HeifPreset {
    Placebo,
    VerySlow,
    Slower,
    Slow,
    Medium,
    Fast,
    Faster,
    VeryFast,
    SuperFast,
    #[default]
    UltraFast,
}

impl HeifPreset {
    /// Name understood by x265
    pub fn x265_name(self) -> &'static str {
        match self {
            HeifPreset::Placebo => "placebo",
            HeifPreset::VerySlow => "veryslow",
            HeifPreset::Slower => "slower",
            HeifPreset::Slow => "slow",
            HeifPreset::Medium => "medium",
            HeifPreset::Fast => "fast",
            HeifPreset::Faster => "faster",
            HeifPreset::VeryFast => "veryfast",
            HeifPreset::SuperFast => "superfast",
            HeifPreset::UltraFast => "ultrafast",
        }
    }
}

impl TryFrom<u8> for HeifPreset {
    type Error = whereat::At<Error>;

    fn try_from(value: u8) -> Result<Self> {
        Ok(match value {
            0 => Self::Placebo,
            1 => Self::VerySlow,
            2 => Self::Slower,
            3 => Self::Slow,
            4 => Self::Medium,
            5 => Self::Fast,
            6 => Self::Faster,
            7 => Self::VeryFast,
            8 => Self::SuperFast,
            9 => Self::UltraFast,
            _ => {
                return Err(at(Error::InvalidQualityArgument(format!(
                    "unknown preset code {value}"
                ))));
            }
        })
    }
}

const MAX_QUALITY: u8 = 100;
const MAX_CRF: u8 = 51;
/// CRF carried alongside a plain quality value
const DEFAULT_CRF: u8 = 40;

/// Quality control for one encode
///
/// Only constructible through [`quality`](Self::quality) and
/// [`crf`](Self::crf), which validate their ranges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodeQualityArgument(QualityMode);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum QualityMode {
    Quality(u8),
    Crf { crf: u8, preset: HeifPreset },
}

impl EncodeQualityArgument {
    /// Quality in `0..=100`
    pub fn quality(quality: u8) -> Result<Self> {
        if quality > MAX_QUALITY {
            return Err(at(Error::InvalidQualityArgument(format!(
                "quality {quality} is outside 0..=100"
            ))));
        }
        Ok(Self(QualityMode::Quality(quality)))
    }

    /// Constant rate factor in `0..=51` with an x265 preset
    pub fn crf(crf: u8, preset: HeifPreset) -> Result<Self> {
        if crf > MAX_CRF {
            return Err(at(Error::InvalidQualityArgument(format!(
                "crf {crf} is outside 0..=51"
            ))));
        }
        Ok(Self(QualityMode::Crf { crf, preset }))
    }

    pub fn is_crf_mode(&self) -> bool {
        matches!(self.0, QualityMode::Crf { .. })
    }

    /// Quality value; 100 in CRF mode
    pub fn quality_value(&self) -> u8 {
        match self.0 {
            QualityMode::Quality(q) => q,
            QualityMode::Crf { .. } => MAX_QUALITY,
        }
    }

    /// CRF and preset; 40 and ultrafast in quality mode
    pub fn crf_value(&self) -> (u8, HeifPreset) {
        match self.0 {
            QualityMode::Quality(_) => (DEFAULT_CRF, HeifPreset::UltraFast),
            QualityMode::Crf { crf, preset } => (crf, preset),
        }
    }
}

impl Default for EncodeQualityArgument {
    fn default() -> Self {
        Self(QualityMode::Quality(80))
    }
}

/// Lossy or lossless compression
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PreciseMode {
    #[default]
    Lossy,
    Lossless,
}

/// Requested chroma subsampling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ChromaSubsampling {
    /// Chosen from quality
    #[default]
    Auto,
    Yuv420,
    Yuv422,
    Yuv444,
    /// Monochrome
    Yuv400,
}

impl TryFrom<u8> for ChromaSubsampling {
    type Error = whereat::At<Error>;

    fn try_from(value: u8) -> Result<Self> {
        Ok(match value {
            0 => Self::Auto,
            1 => Self::Yuv420,
            2 => Self::Yuv422,
            3 => Self::Yuv444,
            4 => Self::Yuv400,
            _ => {
                return Err(at(Error::UnsupportedFormat(format!(
                    "unknown chroma subsampling code {value}"
                ))));
            }
        })
    }
}

/// Chroma subsampling an encode commits to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResolvedChroma {
    Yuv420,
    Yuv422,
    Yuv444,
    Yuv400,
}

impl ResolvedChroma {
    /// Whether chroma is halved along at least one axis
    pub fn is_subsampled(self) -> bool {
        matches!(self, ResolvedChroma::Yuv420 | ResolvedChroma::Yuv422)
    }
}

/// Resolve [`ChromaSubsampling::Auto`] from compression settings
pub fn resolve_chroma(
    requested: ChromaSubsampling,
    quality: &EncodeQualityArgument,
    precise_mode: PreciseMode,
) -> ResolvedChroma {
    match requested {
        ChromaSubsampling::Yuv420 => ResolvedChroma::Yuv420,
        ChromaSubsampling::Yuv422 => ResolvedChroma::Yuv422,
        ChromaSubsampling::Yuv444 => ResolvedChroma::Yuv444,
        ChromaSubsampling::Yuv400 => ResolvedChroma::Yuv400,
        ChromaSubsampling::Auto => {
            let q = quality.quality_value();
            if precise_mode == PreciseMode::Lossless || q > 93 {
                ResolvedChroma::Yuv444
            } else if q > 65 {
                ResolvedChroma::Yuv422
            } else {
                ResolvedChroma::Yuv420
            }
        }
    }
}

/// Channels to encode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum EncodeSurface {
    /// RGBA when any pixel is translucent, else RGB
    #[default]
    Auto,
    Rgb,
    Rgba,
}

/// Color space a surface's pixel values are expressed in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataSpace {
    Srgb,
    Bt709,
    Bt2020,
    DisplayP3,
    ScrgbLinear,
    Scrgb,
    /// BT.2020 with PQ, full range
    Bt2020Pq,
    /// BT.2020 with PQ, limited range
    Bt2020ItuPq,
    /// BT.2020 with HLG, full range
    Bt2020Hlg,
    /// BT.2020 with HLG, limited range
    Bt2020ItuHlg,
    Bt601_525,
    Bt601_625,
    AdobeRgb,
    DciP3,
}

impl DataSpace {
    /// Map an Android `ADataSpace` value; unknown codes are `None`
    pub fn from_android(code: i32) -> Option<Self> {
        Some(match code {
            142671872 => Self::Srgb,
            406913024 => Self::ScrgbLinear,
            411107328 => Self::Scrgb,
            143261696 => Self::DisplayP3,
            163971072 => Self::Bt2020Pq,
            298188800 => Self::Bt2020ItuPq,
            151715840 => Self::AdobeRgb,
            281149440 => Self::Bt601_625,
            281280512 => Self::Bt601_525,
            147193856 => Self::Bt2020,
            281083904 => Self::Bt709,
            155844608 => Self::DciP3,
            168165376 => Self::Bt2020Hlg,
            302383104 => Self::Bt2020ItuHlg,
            _ => return None,
        })
    }

    /// Tag for RGB values decoded from a frame signalled with `nclx`
    ///
    /// Unspecified or unusual primary/transfer pairs are untagged.
    pub fn from_nclx(nclx: &Nclx) -> Option<Self> {
        let full = nclx.color_range == ColorRange::Full;
        Some(match (nclx.color_primaries, nclx.transfer_characteristics) {
            (ColorPrimaries::BT709, TransferCharacteristics::SRGB) => Self::Srgb,
            (ColorPrimaries::BT709, TransferCharacteristics::BT709) => Self::Bt709,
            (ColorPrimaries::BT709, TransferCharacteristics::LINEAR) => Self::ScrgbLinear,
            (ColorPrimaries::BT601, TransferCharacteristics::SRGB) => Self::Scrgb,
            (ColorPrimaries::BT601, TransferCharacteristics::BT601) => Self::Bt601_625,
            (ColorPrimaries::SMPTE432, TransferCharacteristics::SRGB) => Self::DisplayP3,
            (ColorPrimaries::BT2020, TransferCharacteristics::SMPTE2084) if full => Self::Bt2020Pq,
            (ColorPrimaries::BT2020, TransferCharacteristics::SMPTE2084) => Self::Bt2020ItuPq,
            (ColorPrimaries::BT2020, TransferCharacteristics::HLG) if full => Self::Bt2020Hlg,
            (ColorPrimaries::BT2020, TransferCharacteristics::HLG) => Self::Bt2020ItuHlg,
            (ColorPrimaries::BT2020, _) => Self::Bt2020,
            _ => return None,
        })
    }

    /// CICP description, or `None` when the space has no NCLX form
    pub fn nclx(self) -> Option<Nclx> {
        let (primaries, transfer, matrix, range) = match self {
            DataSpace::Srgb => (
                ColorPrimaries::BT709,
                TransferCharacteristics::SRGB,
                MatrixCoefficients::BT709,
                ColorRange::Full,
            ),
            DataSpace::Bt709 => (
                ColorPrimaries::BT709,
                TransferCharacteristics::BT709,
                MatrixCoefficients::BT709,
                ColorRange::Limited,
            ),
            DataSpace::Bt2020 => (
                ColorPrimaries::BT2020,
                TransferCharacteristics::BT2020_10BIT,
                MatrixCoefficients::BT2020_NCL,
                ColorRange::Full,
            ),
            DataSpace::DisplayP3 => (
                ColorPrimaries::SMPTE432,
                TransferCharacteristics::SRGB,
                MatrixCoefficients::BT601,
                ColorRange::Full,
            ),
            DataSpace::ScrgbLinear => (
                ColorPrimaries::BT709,
                TransferCharacteristics::LINEAR,
                MatrixCoefficients::BT709,
                ColorRange::Full,
            ),
            DataSpace::Scrgb => (
                ColorPrimaries::BT601,
                TransferCharacteristics::SRGB,
                MatrixCoefficients::BT601,
                ColorRange::Full,
            ),
            DataSpace::Bt2020Pq | DataSpace::Bt2020ItuPq => (
                ColorPrimaries::BT2020,
                TransferCharacteristics::SMPTE2084,
                MatrixCoefficients::BT2020_NCL,
                if self == DataSpace::Bt2020Pq {
                    ColorRange::Full
                } else {
                    ColorRange::Limited
                },
            ),
            DataSpace::Bt2020Hlg | DataSpace::Bt2020ItuHlg => (
                ColorPrimaries::BT2020,
                TransferCharacteristics::HLG,
                MatrixCoefficients::BT2020_NCL,
                if self == DataSpace::Bt2020Hlg {
                    ColorRange::Full
                } else {
                    ColorRange::Limited
                },
            ),
            DataSpace::Bt601_525 | DataSpace::Bt601_625 => (
                ColorPrimaries::BT601,
                TransferCharacteristics::BT601,
                MatrixCoefficients::BT601,
                ColorRange::Limited,
            ),
            DataSpace::AdobeRgb | DataSpace::DciP3 => return None,
        };
        Some(Nclx {
            color_primaries: primaries,
            transfer_characteristics: transfer,
            matrix_coefficients: matrix,
            color_range: range,
        })
    }
}

/// Fastest encoder speed
pub const MAX_SPEED: u8 = 10;

/// Configuration for AVIF/HEIC encoding
///
/// # Example
///
/// ```
/// use zenheif::{ChromaSubsampling, EncodeQualityArgument, EncoderConfig};
///
/// let config = EncoderConfig::new()
///     .quality(EncodeQualityArgument::quality(80).unwrap())
///     .chroma(ChromaSubsampling::Yuv444)
///     .speed(6);
/// ```
#[derive(Debug, Clone, Default)]
pub struct EncoderConfig {
    pub(crate) quality: EncodeQualityArgument,
    pub(crate) precise_mode: PreciseMode,
    pub(crate) chroma: ChromaSubsampling,
    pub(crate) speed: Option<u8>,
    pub(crate) surface: EncodeSurface,
    pub(crate) data_space: Option<DataSpace>,
}

impl EncoderConfig {
    /// Create a new encoder configuration with default settings
    ///
    /// Defaults: quality 80, lossy, auto chroma, speed 10, auto surface
    pub fn new() -> Self {
        Self::default()
    }

    pub fn quality(mut self, quality: EncodeQualityArgument) -> Self {
        self.quality = quality;
        self
    }

    pub fn precise_mode(mut self, mode: PreciseMode) -> Self {
        self.precise_mode = mode;
        self
    }

    pub fn chroma(mut self, chroma: ChromaSubsampling) -> Self {
        self.chroma = chroma;
        self
    }

    /// Set encoding speed (0 = slowest/best, 10 = fastest)
    ///
    /// Values above 10 are clamped.
    pub fn speed(mut self, speed: u8) -> Self {
        self.speed = Some(speed);
        self
    }

    pub fn surface(mut self, surface: EncodeSurface) -> Self {
        self.surface = surface;
        self
    }

    /// Override the surface's own color tag
    pub fn data_space(mut self, data_space: DataSpace) -> Self {
        self.data_space = Some(data_space);
        self
    }

    fn resolved_speed(&self) -> u8 {
        match self.speed {
            None => MAX_SPEED,
            Some(s) if s > MAX_SPEED => {
                warn!("encoder speed {s} clamped to {MAX_SPEED}");
                MAX_SPEED
            }
            Some(s) => s,
        }
    }
}

/// Encodes pixel surfaces through a codec backend
#[derive(Clone)]
pub struct Encoder {
    codec: Arc<dyn Codec>,
    config: EncoderConfig,
}

impl core::fmt::Debug for Encoder {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Encoder").field("config", &self.config).finish_non_exhaustive()
    }
}

impl Encoder {
    pub fn new(codec: Arc<dyn Codec>, config: EncoderConfig) -> Self {
        Self { codec, config }
    }

    pub fn config(&self) -> &EncoderConfig {
        &self.config
    }

    /// Encode a complete surface into `target`
    pub fn encode(&self, surface: &PixelSurface, target: EncodeTarget) -> Result<Vec<u8>> {
        let config = &self.config;
        let (width, height) = (surface.width, surface.height);
        if width == 0 || height == 0 {
            return Err(at(Error::invalid_dimensions(width, height)));
        }
        let row_bytes = width as usize * surface.format.bytes_per_pixel();
        let min_len = surface
            .stride
            .checked_mul(height as usize - 1)
            .and_then(|n| n.checked_add(row_bytes))
            .ok_or_else(|| at(Error::invalid_dimensions(width, height)))?;
        if surface.stride < row_bytes || surface.data.len() < min_len {
            return Err(at(Error::invalid_dimensions(width, height)));
        }

        let chroma = resolve_chroma(config.chroma, &config.quality, config.precise_mode);
        let needs_even = target == EncodeTarget::Heic || chroma.is_subsampled();
        if needs_even && (width % 2 != 0 || height % 2 != 0) {
            return Err(at(Error::invalid_dimensions(width, height)));
        }

        let quality = if config.precise_mode == PreciseMode::Lossless {
            MAX_QUALITY
        } else {
            config.quality.quality_value()
        };
        let crf = config
            .quality
            .is_crf_mode()
            .then(|| {
                let (crf, preset) = config.quality.crf_value();
                (crf, preset.x265_name())
            });

        let data_space = config.data_space.or(surface.data_space);
        let nclx = match data_space {
            None => None,
            Some(ds) => {
                let nclx = ds.nclx();
                if nclx.is_none() {
                    warn!("{ds:?} has no NCLX description; encoding untagged");
                }
                nclx
            }
        };

        let rgba8;
        let rgba10;
        let (samples, translucent) = match surface.format {
            ResolvedPixelFormat::Rgba8888 | ResolvedPixelFormat::Hardware => {
                rgba8 = convert::unpack_rgba8(surface);
                let translucent = rgba8.iter().any(|px| px[3] < 255);
                (EncodeSamples::Rgba8(&rgba8), translucent)
            }
            ResolvedPixelFormat::Rgb565 => {
                rgba8 = convert::unpack_rgb565(surface);
                (EncodeSamples::Rgba8(&rgba8), false)
            }
            ResolvedPixelFormat::RgbaF16 => {
                rgba10 = convert::unpack_f16_to_10bit(surface);
                let translucent = rgba10.iter().any(|px| px[3] < 1023);
                (EncodeSamples::Rgba10(&rgba10), translucent)
            }
            ResolvedPixelFormat::Rgba1010102 => {
                rgba10 = convert::unpack_1010102(surface);
                let translucent = rgba10.iter().any(|px| px[3] < 1023);
                (EncodeSamples::Rgba10(&rgba10), translucent)
            }
        };
        let with_alpha = match config.surface {
            EncodeSurface::Auto => translucent,
            EncodeSurface::Rgb => false,
            EncodeSurface::Rgba => true,
        };

        let request = EncodeRequest {
            target,
            width,
            height,
            samples,
            with_alpha,
            quality,
            crf,
            precise_mode: config.precise_mode,
            chroma,
            speed: config.resolved_speed(),
            nclx,
        };
        debug!(
            "encode {target:?} {width}x{height} from {:?}: quality {quality}, chroma {chroma:?}, alpha {with_alpha}, tag {data_space:?}",
            surface.format
        );
        let encoded = self.codec.encode(&request).map_err(|e| at(Error::from_encode(e)))?;
        debug!("encoded {} bytes", encoded.len());
        Ok(encoded)
    }
}

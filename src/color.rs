//! Output pixel format negotiation
//!
//! [`resolve`] is total: every request and capability combination yields a
//! concrete format, with 8-bit RGBA as the universal last resort.

use crate::error::{Error, Result};
use crate::image::{ColorPrimaries, ImageMetadata, TransferCharacteristics};
use whereat::at;

/// Pixel format asked for by the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PixelFormatRequest {
    /// Pick automatically from the source
    #[default]
    Default,
    Rgba8888,
    /// Half-float RGBA
    RgbaF16,
    Rgb565,
    /// 10 bits per color channel, 2 alpha bits
    Rgba1010102,
    /// GPU-backed surface with RGBA8888 layout
    Hardware,
}

impl TryFrom<u8> for PixelFormatRequest {
    type Error = whereat::At<Error>;

    fn try_from(value: u8) -> Result<Self> {
        Ok(match value {
            0 => Self::Default,
            1 => Self::Rgba8888,
            2 => Self::RgbaF16,
            3 => Self::Rgb565,
            4 => Self::Rgba1010102,
            5 => Self::Hardware,
            _ => {
                return Err(at(Error::UnsupportedFormat(format!(
                    "unknown pixel format code {value}"
                ))));
            }
        })
    }
}

/// Pixel format a decode commits to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResolvedPixelFormat {
    /// `[r, g, b, a]` bytes
    Rgba8888,
    /// `[r, g, b, a]` little-endian IEEE half floats
    RgbaF16,
    /// Little-endian `u16`: red in bits 11..16, green 5..11, blue 0..5
    Rgb565,
    /// Little-endian `u32`: red in bits 0..10, green 10..20, blue 20..30,
    /// alpha 30..32
    Rgba1010102,
    /// Same bytes as [`Rgba8888`](Self::Rgba8888), destined for a hardware
    /// buffer
    Hardware,
}

impl ResolvedPixelFormat {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            Self::Rgba8888 | Self::Rgba1010102 | Self::Hardware => 4,
            Self::RgbaF16 => 8,
            Self::Rgb565 => 2,
        }
    }

    /// Can hold values above SDR white or more than 8 bits per channel
    pub fn is_hdr_capable(self) -> bool {
        matches!(self, Self::RgbaF16 | Self::Rgba1010102)
    }

    pub fn has_alpha(self) -> bool {
        !matches!(self, Self::Rgb565)
    }
}

/// Which optional surface formats the environment can allocate
///
/// 8-bit RGBA is always available and has no flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub rgba_f16: bool,
    pub rgba_1010102: bool,
    pub rgb_565: bool,
    pub hardware: bool,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            rgba_f16: true,
            rgba_1010102: false,
            rgb_565: true,
            hardware: false,
        }
    }
}

impl Capabilities {
    /// Only 8-bit RGBA
    pub const BASELINE: Self = Self {
        rgba_f16: false,
        rgba_1010102: false,
        rgb_565: false,
        hardware: false,
    };

    /// Every format
    pub const ALL: Self = Self {
        rgba_f16: true,
        rgba_1010102: true,
        rgb_565: true,
        hardware: true,
    };

    pub fn supports(&self, format: ResolvedPixelFormat) -> bool {
        match format {
            ResolvedPixelFormat::Rgba8888 => true,
            ResolvedPixelFormat::RgbaF16 => self.rgba_f16,
            ResolvedPixelFormat::Rgba1010102 => self.rgba_1010102,
            ResolvedPixelFormat::Rgb565 => self.rgb_565,
            ResolvedPixelFormat::Hardware => self.hardware,
        }
    }
}

/// What the decoded source carries, as far as format choice is concerned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceTraits {
    pub bit_depth: u8,
    pub hdr: bool,
    pub wide_gamut: bool,
}

impl Default for SourceTraits {
    fn default() -> Self {
        Self {
            bit_depth: 8,
            hdr: false,
            wide_gamut: false,
        }
    }
}

impl SourceTraits {
    pub fn from_signal(
        bit_depth: u8,
        transfer: TransferCharacteristics,
        primaries: ColorPrimaries,
    ) -> Self {
        Self {
            bit_depth,
            hdr: transfer.is_hdr(),
            wide_gamut: primaries.is_wide_gamut(),
        }
    }

    /// Traits signalled in container headers
    ///
    /// A missing `pixi` reads as 8-bit and a missing `nclx` as SDR.
    pub fn from_metadata(meta: &ImageMetadata) -> Self {
        let bit_depth = meta.bit_depth.unwrap_or(8);
        match meta.nclx {
            Some(nclx) => {
                Self::from_signal(bit_depth, nclx.transfer_characteristics, nclx.color_primaries)
            }
            None => Self {
                bit_depth,
                ..Self::default()
            },
        }
    }

    /// Loses information in an 8-bit SDR surface
    pub fn is_rich(&self) -> bool {
        self.bit_depth > 8 || self.hdr || self.wide_gamut
    }
}

/// Resolve the format a decode will produce
pub fn resolve(
    requested: PixelFormatRequest,
    capabilities: &Capabilities,
    source: &SourceTraits,
) -> ResolvedPixelFormat {
    let concrete = match requested {
        PixelFormatRequest::Default => None,
        PixelFormatRequest::Rgba8888 => Some(ResolvedPixelFormat::Rgba8888),
        PixelFormatRequest::RgbaF16 => Some(ResolvedPixelFormat::RgbaF16),
        PixelFormatRequest::Rgb565 => Some(ResolvedPixelFormat::Rgb565),
        PixelFormatRequest::Rgba1010102 => Some(ResolvedPixelFormat::Rgba1010102),
        PixelFormatRequest::Hardware => Some(ResolvedPixelFormat::Hardware),
    };
    match concrete {
        Some(format) if capabilities.supports(format) => format,
        _ => automatic(capabilities, source),
    }
}

// RGB565 is never picked here: it drops alpha and range.
fn automatic(capabilities: &Capabilities, source: &SourceTraits) -> ResolvedPixelFormat {
    if source.is_rich() {
        if capabilities.rgba_f16 {
            return ResolvedPixelFormat::RgbaF16;
        }
        if capabilities.rgba_1010102 {
            return ResolvedPixelFormat::Rgba1010102;
        }
    }
    ResolvedPixelFormat::Rgba8888
}

#[cfg(test)]
mod tests {
    use super::*;

    const REQUESTS: [PixelFormatRequest; 6] = [
        PixelFormatRequest::Default,
        PixelFormatRequest::Rgba8888,
        PixelFormatRequest::RgbaF16,
        PixelFormatRequest::Rgb565,
        PixelFormatRequest::Rgba1010102,
        PixelFormatRequest::Hardware,
    ];

    fn sdr() -> SourceTraits {
        SourceTraits::default()
    }

    fn hdr10() -> SourceTraits {
        SourceTraits {
            bit_depth: 10,
            hdr: true,
            wide_gamut: true,
        }
    }

    #[test]
    fn supported_request_is_kept() {
        let all = Capabilities::ALL;
        assert_eq!(
            resolve(PixelFormatRequest::Rgb565, &all, &hdr10()),
            ResolvedPixelFormat::Rgb565
        );
        assert_eq!(
            resolve(PixelFormatRequest::Rgba8888, &all, &hdr10()),
            ResolvedPixelFormat::Rgba8888
        );
        assert_eq!(
            resolve(PixelFormatRequest::Hardware, &all, &sdr()),
            ResolvedPixelFormat::Hardware
        );
    }

    #[test]
    fn unsupported_ten_bit_falls_back_to_float_for_rich_source() {
        let caps = Capabilities {
            rgba_f16: true,
            ..Capabilities::BASELINE
        };
        assert_eq!(
            resolve(PixelFormatRequest::Rgba1010102, &caps, &hdr10()),
            ResolvedPixelFormat::RgbaF16
        );
        assert_eq!(
            resolve(PixelFormatRequest::Rgba1010102, &caps, &sdr()),
            ResolvedPixelFormat::Rgba8888
        );
    }

    #[test]
    fn default_prefers_extended_formats_for_rich_sources() {
        let ten_bit_only = Capabilities {
            rgba_1010102: true,
            ..Capabilities::BASELINE
        };
        assert_eq!(
            resolve(PixelFormatRequest::Default, &Capabilities::ALL, &hdr10()),
            ResolvedPixelFormat::RgbaF16
        );
        assert_eq!(
            resolve(PixelFormatRequest::Default, &ten_bit_only, &hdr10()),
            ResolvedPixelFormat::Rgba1010102
        );
        assert_eq!(
            resolve(PixelFormatRequest::Default, &Capabilities::BASELINE, &hdr10()),
            ResolvedPixelFormat::Rgba8888
        );
        assert_eq!(
            resolve(PixelFormatRequest::Default, &Capabilities::ALL, &sdr()),
            ResolvedPixelFormat::Rgba8888
        );
    }

    #[test]
    fn wide_gamut_eight_bit_counts_as_rich() {
        let p3 = SourceTraits::from_signal(8, TransferCharacteristics::SRGB, ColorPrimaries::SMPTE432);
        assert!(p3.is_rich());
        assert_eq!(
            resolve(PixelFormatRequest::Default, &Capabilities::ALL, &p3),
            ResolvedPixelFormat::RgbaF16
        );
    }

    #[test]
    fn rgb565_never_automatic() {
        let caps_list = [
            Capabilities::BASELINE,
            Capabilities::ALL,
            Capabilities::default(),
            Capabilities {
                rgb_565: true,
                ..Capabilities::BASELINE
            },
        ];
        for caps in caps_list {
            for req in REQUESTS {
                if req == PixelFormatRequest::Rgb565 {
                    continue;
                }
                for src in [sdr(), hdr10()] {
                    assert_ne!(resolve(req, &caps, &src), ResolvedPixelFormat::Rgb565);
                }
            }
        }
    }

    #[test]
    fn resolution_is_total_and_supported() {
        let caps_list = [Capabilities::BASELINE, Capabilities::ALL, Capabilities::default()];
        for caps in caps_list {
            for req in REQUESTS {
                for src in [sdr(), hdr10()] {
                    let a = resolve(req, &caps, &src);
                    assert!(caps.supports(a), "{req:?} -> {a:?} unsupported by {caps:?}");
                    assert_eq!(a, resolve(req, &caps, &src));
                }
            }
        }
    }

    #[test]
    fn request_codes() {
        assert_eq!(PixelFormatRequest::try_from(0).unwrap(), PixelFormatRequest::Default);
        assert_eq!(PixelFormatRequest::try_from(4).unwrap(), PixelFormatRequest::Rgba1010102);
        assert!(PixelFormatRequest::try_from(9).is_err());
    }
}

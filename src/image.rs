//! Image geometry, color signalling, and the pixel surface handed to callers

use crate::color::ResolvedPixelFormat;
use crate::encoder::DataSpace;

/// Width and height of an image in pixels
///
/// A successful probe never yields a zero dimension; absence is `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ImageSize {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
}

impl ImageSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Any zero dimension, meaning "keep the source size" in a request
    pub fn is_original(self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub(crate) fn transposed(self) -> Self {
        Self::new(self.height, self.width)
    }

    pub(crate) fn pixel_count(self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }
}

/// EXIF-style orientation of the primary item
///
/// Derived from the HEIF `irot` and `imir` transformative properties.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Orientation {
    /// No rotation or flip needed.
    #[default]
    Normal = 1,
    /// Flip horizontally (mirror left-right).
    FlipHorizontal = 2,
    /// Rotate 180 degrees.
    Rotate180 = 3,
    /// Flip vertically (mirror top-bottom).
    FlipVertical = 4,
    /// Transpose (rotate 90 CW then flip horizontally).
    Transpose = 5,
    /// Rotate 90 degrees clockwise.
    Rotate90 = 6,
    /// Transverse (rotate 90 CCW then flip horizontally).
    Transverse = 7,
    /// Rotate 270 degrees clockwise (= 90 CCW).
    Rotate270 = 8,
}

impl Orientation {
    /// Combine an `irot` angle (counter-clockwise quarter turns) with an
    /// optional `imir` axis, rotation applied first
    ///
    /// `imir` axis 0 mirrors about the vertical axis (left-right), axis 1
    /// about the horizontal axis (top-bottom).
    pub fn from_heif(ccw_quarter_turns: u8, mirror_axis: Option<u8>) -> Self {
        // Turn counter-clockwise turns into the clockwise display rotation.
        let cw = (4 - (ccw_quarter_turns % 4)) % 4;
        // A top-bottom flip is a left-right flip after an extra half turn.
        let (cw, flip) = match mirror_axis {
            None => (cw, false),
            Some(0) => (cw, true),
            Some(_) => ((cw + 2) % 4, true),
        };
        match (cw, flip) {
            (0, false) => Self::Normal,
            (1, false) => Self::Rotate90,
            (2, false) => Self::Rotate180,
            (3, false) => Self::Rotate270,
            (0, true) => Self::FlipHorizontal,
            (1, true) => Self::Transpose,
            (2, true) => Self::FlipVertical,
            _ => Self::Transverse,
        }
    }

    /// Whether this orientation swaps width and height.
    pub fn swaps_dimensions(self) -> bool {
        matches!(
            self,
            Self::Transpose | Self::Rotate90 | Self::Transverse | Self::Rotate270
        )
    }

    /// Display size for a stored size
    pub fn display_size(self, stored: ImageSize) -> ImageSize {
        if self.swaps_dimensions() {
            stored.transposed()
        } else {
            stored
        }
    }

    pub fn is_identity(self) -> bool {
        matches!(self, Self::Normal)
    }
}

/// Metadata read from container headers without decoding pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageMetadata {
    /// Stored size of the primary item, before orientation
    pub size: ImageSize,
    /// Orientation to apply for display
    pub orientation: Orientation,
    /// Luma bit depth from `pixi`, when present
    pub bit_depth: Option<u8>,
    /// Color signalling from an `nclx` `colr` box, when present
    pub nclx: Option<Nclx>,
}

impl ImageMetadata {
    /// Size after orientation is applied
    pub fn display_size(&self) -> ImageSize {
        self.orientation.display_size(self.size)
    }
}

/// Chroma subsampling format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChromaSampling {
    /// 4:2:0 - chroma is half resolution in both dimensions
    Cs420,
    /// 4:2:2 - chroma is half resolution horizontally
    Cs422,
    /// 4:4:4 - no chroma subsampling
    Cs444,
    /// Monochrome (no chroma)
    Monochrome,
}

impl ChromaSampling {
    /// Size of one chroma plane for a luma plane of `width`x`height`
    pub fn chroma_size(self, width: u32, height: u32) -> (u32, u32) {
        match self {
            ChromaSampling::Cs420 => (width.div_ceil(2), height.div_ceil(2)),
            ChromaSampling::Cs422 => (width.div_ceil(2), height),
            ChromaSampling::Cs444 => (width, height),
            ChromaSampling::Monochrome => (0, 0),
        }
    }
}

/// Color primaries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ColorPrimaries(pub u8);

impl ColorPrimaries {
    pub const BT709: Self = Self(1);
    pub const UNKNOWN: Self = Self(2);
    pub const BT470M: Self = Self(4);
    pub const BT470BG: Self = Self(5);
    pub const BT601: Self = Self(6);
    pub const SMPTE240: Self = Self(7);
    pub const FILM: Self = Self(8);
    pub const BT2020: Self = Self(9);
    pub const XYZ: Self = Self(10);
    pub const SMPTE431: Self = Self(11);
    pub const SMPTE432: Self = Self(12);
    pub const EBU3213: Self = Self(22);

    /// Gamut wider than BT.709/sRGB
    pub fn is_wide_gamut(self) -> bool {
        matches!(self, Self::BT2020 | Self::SMPTE431 | Self::SMPTE432)
    }
}

/// Transfer characteristics (gamma curve)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TransferCharacteristics(pub u8);

impl TransferCharacteristics {
    pub const BT709: Self = Self(1);
    pub const UNKNOWN: Self = Self(2);
    pub const BT470M: Self = Self(4);
    pub const BT470BG: Self = Self(5);
    pub const BT601: Self = Self(6);
    pub const SMPTE240: Self = Self(7);
    pub const LINEAR: Self = Self(8);
    pub const LOG100: Self = Self(9);
    pub const LOG100_SQRT10: Self = Self(10);
    pub const IEC61966: Self = Self(11);
    pub const BT1361: Self = Self(12);
    pub const SRGB: Self = Self(13);
    pub const BT2020_10BIT: Self = Self(14);
    pub const BT2020_12BIT: Self = Self(15);
    pub const SMPTE2084: Self = Self(16);
    pub const SMPTE428: Self = Self(17);
    pub const HLG: Self = Self(18);

    /// PQ or HLG
    pub fn is_hdr(self) -> bool {
        matches!(self, Self::SMPTE2084 | Self::HLG)
    }
}

/// Matrix coefficients for YUV to RGB conversion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MatrixCoefficients(pub u8);

impl MatrixCoefficients {
    pub const IDENTITY: Self = Self(0);
    pub const BT709: Self = Self(1);
    pub const UNKNOWN: Self = Self(2);
    pub const FCC: Self = Self(4);
    pub const BT470BG: Self = Self(5);
    pub const BT601: Self = Self(6);
    pub const SMPTE240: Self = Self(7);
    pub const YCGCO: Self = Self(8);
    pub const BT2020_NCL: Self = Self(9);
    pub const BT2020_CL: Self = Self(10);
    pub const SMPTE2085: Self = Self(11);
    pub const CHROMAT_NCL: Self = Self(12);
    pub const CHROMAT_CL: Self = Self(13);
    pub const ICTCP: Self = Self(14);
}

/// Color range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColorRange {
    /// Limited/studio range (Y: 16-235, UV: 16-240 for 8-bit)
    #[default]
    Limited,
    /// Full range (0-255 for 8-bit)
    Full,
}

/// CICP color description (NCLX)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Nclx {
    pub color_primaries: ColorPrimaries,
    pub transfer_characteristics: TransferCharacteristics,
    pub matrix_coefficients: MatrixCoefficients,
    pub color_range: ColorRange,
}

/// Decoded pixels owned by the caller
///
/// Rows are `stride` bytes apart; the sample layout of each row is given
/// by [`format`](Self::format).
#[derive(Debug, Clone, PartialEq)]
pub struct PixelSurface {
    pub width: u32,
    pub height: u32,
    /// Bytes per row
    pub stride: usize,
    pub format: ResolvedPixelFormat,
    pub data: Vec<u8>,
    /// Color tag of the pixel values, `None` when untagged
    pub data_space: Option<DataSpace>,
}

impl PixelSurface {
    /// Allocate a zeroed surface with a tightly packed stride
    pub fn new(width: u32, height: u32, format: ResolvedPixelFormat) -> Self {
        let stride = width as usize * format.bytes_per_pixel();
        Self {
            width,
            height,
            stride,
            format,
            data: vec![0; stride * height as usize],
            data_space: None,
        }
    }

    /// Tag the surface with a data space
    pub fn with_data_space(mut self, data_space: Option<DataSpace>) -> Self {
        self.data_space = data_space;
        self
    }

    pub fn size(&self) -> ImageSize {
        ImageSize::new(self.width, self.height)
    }

    /// Bytes of one row, without stride padding
    pub fn row(&self, y: u32) -> &[u8] {
        let start = y as usize * self.stride;
        let len = self.width as usize * self.format.bytes_per_pixel();
        &self.data[start..start + len]
    }

    pub(crate) fn row_mut(&mut self, y: u32) -> &mut [u8] {
        let start = y as usize * self.stride;
        let len = self.width as usize * self.format.bytes_per_pixel();
        &mut self.data[start..start + len]
    }
}

//! Scale planning and application
//!
//! [`plan`] is a pure function of sizes and mode. [`apply`] resamples and
//! crops a working raster to match a plan exactly.

use crate::error::{Error, Result};
use crate::image::{ImageSize, Orientation};
use image::Rgba32FImage;
use image::imageops::{self, FilterType};
use whereat::at;

/// How requested dimensions relate to the source aspect ratio
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ScaleMode {
    /// Largest aspect-preserving box inside the requested box
    #[default]
    Fit,
    /// Smallest aspect-preserving box covering the requested box, centre-cropped
    Fill,
    /// Exactly the requested box, aspect ratio ignored
    Resize,
}

impl TryFrom<u8> for ScaleMode {
    type Error = whereat::At<Error>;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            1 => Ok(Self::Fit),
            2 => Ok(Self::Fill),
            3 => Ok(Self::Resize),
            _ => Err(at(Error::UnsupportedFormat(format!("unknown scale mode {value}")))),
        }
    }
}

/// Resampling filter strength
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ScalingQuality {
    /// Nearest neighbour
    Fastest,
    /// Bilinear
    Low,
    /// Bicubic (Catmull-Rom)
    #[default]
    Medium,
    /// Lanczos, 3 lobes
    High,
}

impl ScalingQuality {
    fn filter(self) -> FilterType {
        match self {
            ScalingQuality::Fastest => FilterType::Nearest,
            ScalingQuality::Low => FilterType::Triangle,
            ScalingQuality::Medium => FilterType::CatmullRom,
            ScalingQuality::High => FilterType::Lanczos3,
        }
    }
}

/// Window taken from the scaled raster
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Exact geometry of a scaled decode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScalePlan {
    pub output_width: u32,
    pub output_height: u32,
    /// Size the whole source is resampled to
    pub scaled_width: u32,
    pub scaled_height: u32,
    /// Part of the scaled raster kept, `None` when all of it is kept
    pub crop: Option<CropRect>,
}

impl ScalePlan {
    fn exact(size: ImageSize) -> Self {
        Self {
            output_width: size.width,
            output_height: size.height,
            scaled_width: size.width,
            scaled_height: size.height,
            crop: None,
        }
    }

    pub fn output_size(&self) -> ImageSize {
        ImageSize::new(self.output_width, self.output_height)
    }

    pub fn scaled_size(&self) -> ImageSize {
        ImageSize::new(self.scaled_width, self.scaled_height)
    }

    /// Output size once `orientation` is applied
    pub fn display_size(&self, orientation: Orientation) -> ImageSize {
        orientation.display_size(self.output_size())
    }
}

fn round_dim(v: f64) -> Result<u32> {
    // f64::round rounds half away from zero
    let r = v.round();
    if !(r >= 1.0) || r > f64::from(u32::MAX) {
        return Err(at(Error::invalid_dimensions(r as i64, 0)));
    }
    Ok(r as u32)
}

/// Plan output geometry for `source` scaled into `requested`
///
/// A request with a zero on either axis keeps the source size and ignores
/// `mode`.
pub fn plan(source: ImageSize, requested: ImageSize, mode: ScaleMode) -> Result<ScalePlan> {
    if source.width == 0 || source.height == 0 {
        return Err(at(Error::invalid_dimensions(source.width, source.height)));
    }
    if requested.is_original() {
        return Ok(ScalePlan::exact(source));
    }

    let (sw, sh) = (f64::from(source.width), f64::from(source.height));
    let (rw, rh) = (f64::from(requested.width), f64::from(requested.height));

    match mode {
        ScaleMode::Resize => Ok(ScalePlan::exact(requested)),
        ScaleMode::Fit => {
            let ratio_bitmap = sw / sh;
            let ratio_box = rw / rh;
            let size = if ratio_box > ratio_bitmap {
                ImageSize::new(round_dim(rh * ratio_bitmap)?, requested.height)
            } else {
                ImageSize::new(requested.width, round_dim(rw / ratio_bitmap)?)
            };
            Ok(ScalePlan::exact(size))
        }
        ScaleMode::Fill => {
            if requested.width >= source.width && requested.height >= source.height {
                return Ok(ScalePlan::exact(source));
            }
            let factor = (rw / sw).max(rh / sh);
            let scaled_width = round_dim(sw * factor)?.max(requested.width);
            let scaled_height = round_dim(sh * factor)?.max(requested.height);
            let crop = (scaled_width != requested.width || scaled_height != requested.height)
                .then(|| CropRect {
                    x: (scaled_width - requested.width) / 2,
                    y: (scaled_height - requested.height) / 2,
                    width: requested.width,
                    height: requested.height,
                });
            Ok(ScalePlan {
                output_width: requested.width,
                output_height: requested.height,
                scaled_width,
                scaled_height,
                crop,
            })
        }
    }
}

/// Plan in stored (pre-orientation) space for a box given in display space
///
/// When `orientation` swaps axes the requested box is swapped too, so the
/// aspect comparison runs against a box oriented like the stored pixels.
pub fn plan_oriented(
    stored: ImageSize,
    orientation: Orientation,
    requested: ImageSize,
    mode: ScaleMode,
) -> Result<ScalePlan> {
    let requested = if orientation.swaps_dimensions() {
        requested.transposed()
    } else {
        requested
    };
    plan(stored, requested, mode)
}

/// Resample and crop `img` to the plan's output size
pub fn apply(img: Rgba32FImage, plan: &ScalePlan, quality: ScalingQuality) -> Rgba32FImage {
    let scaled = if img.dimensions() == (plan.scaled_width, plan.scaled_height) {
        img
    } else {
        imageops::resize(&img, plan.scaled_width, plan.scaled_height, quality.filter())
    };
    match plan.crop {
        Some(c) => imageops::crop_imm(&scaled, c.x, c.y, c.width, c.height).to_image(),
        None => scaled,
    }
}

/// Transform stored pixels for display
pub fn orient(img: Rgba32FImage, orientation: Orientation) -> Rgba32FImage {
    match orientation {
        Orientation::Normal => img,
        Orientation::FlipHorizontal => imageops::flip_horizontal(&img),
        Orientation::Rotate180 => imageops::rotate180(&img),
        Orientation::FlipVertical => imageops::flip_vertical(&img),
        Orientation::Transpose => imageops::flip_horizontal(&imageops::rotate90(&img)),
        Orientation::Rotate90 => imageops::rotate90(&img),
        Orientation::Transverse => imageops::flip_horizontal(&imageops::rotate270(&img)),
        Orientation::Rotate270 => imageops::rotate270(&img),
    }
}

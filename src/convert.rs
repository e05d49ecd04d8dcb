//! YUV to RGBA conversion, alpha handling, bit depth scaling, and packing
//! into the output surface formats

use crate::codec::{FramePlanes, Plane, YuvFrame};
use crate::color::ResolvedPixelFormat;
use crate::error::{Error, Result};
use crate::image::{ChromaSampling, ColorRange, MatrixCoefficients, PixelSurface};
use ::image::Rgba32FImage;
use imgref::ImgVec;
use rgb::Rgba;
use whereat::at;
use yuv::{YuvGrayImage, YuvPlanarImage, YuvRange, YuvStandardMatrix};

fn to_yuv_matrix(mc: MatrixCoefficients) -> YuvStandardMatrix {
    match mc {
        MatrixCoefficients::BT709 => YuvStandardMatrix::Bt709,
        MatrixCoefficients::BT601 | MatrixCoefficients::BT470BG | MatrixCoefficients::FCC => {
            YuvStandardMatrix::Bt601
        }
        MatrixCoefficients::BT2020_NCL | MatrixCoefficients::BT2020_CL => YuvStandardMatrix::Bt2020,
        MatrixCoefficients::SMPTE240 => YuvStandardMatrix::Smpte240,
        _ => YuvStandardMatrix::Bt601,
    }
}

fn to_yuv_range(range: ColorRange) -> YuvRange {
    match range {
        ColorRange::Full => YuvRange::Full,
        ColorRange::Limited => YuvRange::Limited,
    }
}

/// Scale a limited-range Y value to full range (8-bit)
#[inline]
fn limited_to_full_8(y: u8) -> u8 {
    let y = y as i16;
    ((y - 16).max(0) * 255 / 219).min(255) as u8
}

/// Scale a limited-range Y value to full range at the given bit depth
#[inline]
fn limited_to_full_16(y: u16, bit_depth: u8) -> u16 {
    let max_val = (1u32 << bit_depth) - 1;
    let y_min = 16u32 << (bit_depth - 8);
    let y_range = 219u32 << (bit_depth - 8);
    ((y as u32).saturating_sub(y_min) * max_val / y_range).min(max_val) as u16
}

/// Scale a value from native bit depth to full u16 range using LSB replication.
///
/// For 10-bit: `(v << 6) | (v >> 4)` maps 0→0, 1023→65535
#[inline]
pub(crate) fn scale_to_u16(v: u16, bit_depth: u8) -> u16 {
    let shift = 16 - bit_depth;
    if shift == 0 {
        return v;
    }
    (v << shift) | (v >> (bit_depth - shift))
}

/// Convert premultiplied alpha to straight alpha for 8-bit RGBA
fn unpremultiply8(row: &mut [Rgba<u8>]) {
    for px in row.iter_mut() {
        if px.a != 255 && px.a != 0 {
            let a = px.a as u16;
            px.r = (px.r as u16 * 255 / a).min(255) as u8;
            px.g = (px.g as u16 * 255 / a).min(255) as u8;
            px.b = (px.b as u16 * 255 / a).min(255) as u8;
        }
    }
}

/// Convert premultiplied alpha to straight alpha for 16-bit RGBA
fn unpremultiply16(row: &mut [Rgba<u16>]) {
    for px in row.iter_mut() {
        if px.a != 0xFFFF && px.a != 0 {
            let a = px.a as u32;
            px.r = (px.r as u32 * 0xFFFF / a).min(0xFFFF) as u16;
            px.g = (px.g as u32 * 0xFFFF / a).min(0xFFFF) as u16;
            px.b = (px.b as u32 * 0xFFFF / a).min(0xFFFF) as u16;
        }
    }
}

fn check_plane<T: Copy>(plane: &Plane<T>, width: u32, height: u32, name: &str) -> Result<()> {
    if !plane.is_consistent() || plane.width < width || plane.height < height {
        return Err(at(Error::CorruptContainer(format!(
            "{name} plane {}x{} (stride {}, {} samples) does not cover {width}x{height}",
            plane.width,
            plane.height,
            plane.stride,
            plane.data.len()
        ))));
    }
    Ok(())
}

fn chroma_planes<'a, T: Copy>(
    frame: &YuvFrame,
    u: Option<&'a Plane<T>>,
    v: Option<&'a Plane<T>>,
) -> Result<Option<(&'a Plane<T>, &'a Plane<T>)>> {
    if frame.chroma == ChromaSampling::Monochrome {
        return Ok(None);
    }
    let (Some(u), Some(v)) = (u, v) else {
        return Err(at(Error::CorruptContainer("missing chroma plane".into())));
    };
    let (cw, ch) = frame.chroma.chroma_size(frame.width, frame.height);
    check_plane(u, cw, ch, "U")?;
    check_plane(v, cw, ch, "V")?;
    Ok(Some((u, v)))
}

/// Convert a native-resolution frame to straight-alpha RGBA in `[0, 1]`
///
/// Values keep the frame's transfer function and primaries; nothing is
/// linearized here.
pub(crate) fn frame_to_rgba(frame: &YuvFrame) -> Result<Rgba32FImage> {
    if frame.width == 0 || frame.height == 0 {
        return Err(at(Error::invalid_dimensions(frame.width, frame.height)));
    }
    let (width, height) = (frame.width as usize, frame.height as usize);
    let samples: Vec<f32> = match &frame.planes {
        FramePlanes::Depth8 { y, u, v, alpha } => {
            if frame.bit_depth != 8 {
                return Err(at(Error::CorruptContainer(format!(
                    "8-bit planes tagged as {}-bit",
                    frame.bit_depth
                ))));
            }
            let mut img = convert_8bit(frame, y, u.as_ref(), v.as_ref())?;
            if let Some(alpha) = alpha {
                check_plane(alpha, frame.width, frame.height, "alpha")?;
                add_alpha8(&mut img, alpha, frame.alpha_range, frame.alpha_premultiplied);
            }
            let (buf, _, _) = img.into_contiguous_buf();
            buf.iter()
                .flat_map(|px| [px.r, px.g, px.b, px.a])
                .map(|c| c as f32 / 255.0)
                .collect()
        }
        FramePlanes::Depth16 { y, u, v, alpha } => {
            if !matches!(frame.bit_depth, 10 | 12 | 16) {
                return Err(at(Error::UnsupportedFormat(format!(
                    "unsupported bit depth {}",
                    frame.bit_depth
                ))));
            }
            let mut img = convert_16bit(frame, y, u.as_ref(), v.as_ref())?;
            if let Some(alpha) = alpha {
                check_plane(alpha, frame.width, frame.height, "alpha")?;
                add_alpha16(
                    &mut img,
                    alpha,
                    frame.alpha_range,
                    frame.bit_depth,
                    frame.alpha_premultiplied,
                );
            }
            let (buf, _, _) = img.into_contiguous_buf();
            buf.iter()
                .flat_map(|px| [px.r, px.g, px.b, px.a])
                .map(|c| c as f32 / 65535.0)
                .collect()
        }
    };
    Rgba32FImage::from_raw(frame.width, frame.height, samples).ok_or_else(|| {
        at(Error::CorruptContainer(format!(
            "converted buffer does not hold {width}x{height} pixels"
        )))
    })
}

fn convert_8bit(
    frame: &YuvFrame,
    y: &Plane<u8>,
    u: Option<&Plane<u8>>,
    v: Option<&Plane<u8>>,
) -> Result<ImgVec<Rgba<u8>>> {
    let (width, height) = (frame.width, frame.height);
    check_plane(y, width, height, "Y")?;
    let range = to_yuv_range(frame.nclx.color_range);
    let matrix = to_yuv_matrix(frame.nclx.matrix_coefficients);
    let mut out = vec![Rgba::new(0u8, 0, 0, 255); width as usize * height as usize];
    let rgba_stride = width * 4;
    let bytes: &mut [u8] = bytemuck::cast_slice_mut(out.as_mut_slice());

    match chroma_planes(frame, u, v)? {
        None => {
            let gray = YuvGrayImage {
                y_plane: y.data.as_slice(),
                y_stride: y.stride as u32,
                width,
                height,
            };
            yuv::yuv400_to_rgba(&gray, bytes, rgba_stride, range, matrix).map_err(|e| at(Error::from(e)))?;
        }
        Some((u, v)) => {
            let planar = YuvPlanarImage {
                y_plane: y.data.as_slice(),
                y_stride: y.stride as u32,
                u_plane: u.data.as_slice(),
                u_stride: u.stride as u32,
                v_plane: v.data.as_slice(),
                v_stride: v.stride as u32,
                width,
                height,
            };
            match frame.chroma {
                ChromaSampling::Cs420 => yuv::yuv420_to_rgba(&planar, bytes, rgba_stride, range, matrix),
                ChromaSampling::Cs422 => yuv::yuv422_to_rgba(&planar, bytes, rgba_stride, range, matrix),
                _ => yuv::yuv444_to_rgba(&planar, bytes, rgba_stride, range, matrix),
            }
            .map_err(|e| at(Error::from(e)))?;
        }
    }
    // Opaque until an alpha plane says otherwise
    for px in out.iter_mut() {
        px.a = 255;
    }
    Ok(ImgVec::new(out, width as usize, height as usize))
}

/// Output is scaled to full u16 range
fn convert_16bit(
    frame: &YuvFrame,
    y: &Plane<u16>,
    u: Option<&Plane<u16>>,
    v: Option<&Plane<u16>>,
) -> Result<ImgVec<Rgba<u16>>> {
    let (width, height) = (frame.width, frame.height);
    check_plane(y, width, height, "Y")?;
    let range = to_yuv_range(frame.nclx.color_range);
    let matrix = to_yuv_matrix(frame.nclx.matrix_coefficients);
    let depth = frame.bit_depth;
    let mut out = vec![Rgba::new(0u16, 0, 0, 0xFFFF); width as usize * height as usize];
    let rgba_stride = width * 4;
    let samples: &mut [u16] = bytemuck::cast_slice_mut(out.as_mut_slice());

    match chroma_planes(frame, u, v)? {
        None => {
            let gray = YuvGrayImage {
                y_plane: y.data.as_slice(),
                y_stride: y.stride as u32,
                width,
                height,
            };
            match depth {
                10 => yuv::y010_to_rgba10(&gray, samples, rgba_stride, range, matrix),
                12 => yuv::y012_to_rgba12(&gray, samples, rgba_stride, range, matrix),
                _ => yuv::y016_to_rgba16(&gray, samples, rgba_stride, range, matrix),
            }
            .map_err(|e| at(Error::from(e)))?;
        }
        Some((u, v)) => {
            let planar = YuvPlanarImage {
                y_plane: y.data.as_slice(),
                y_stride: y.stride as u32,
                u_plane: u.data.as_slice(),
                u_stride: u.stride as u32,
                v_plane: v.data.as_slice(),
                v_stride: v.stride as u32,
                width,
                height,
            };
            match (depth, frame.chroma) {
                (10, ChromaSampling::Cs420) => yuv::i010_to_rgba10(&planar, samples, rgba_stride, range, matrix),
                (10, ChromaSampling::Cs422) => yuv::i210_to_rgba10(&planar, samples, rgba_stride, range, matrix),
                (10, _) => yuv::i410_to_rgba10(&planar, samples, rgba_stride, range, matrix),
                (12, ChromaSampling::Cs420) => yuv::i012_to_rgba12(&planar, samples, rgba_stride, range, matrix),
                (12, ChromaSampling::Cs422) => yuv::i212_to_rgba12(&planar, samples, rgba_stride, range, matrix),
                (12, _) => yuv::i412_to_rgba12(&planar, samples, rgba_stride, range, matrix),
                (_, ChromaSampling::Cs420) => yuv::i016_to_rgba16(&planar, samples, rgba_stride, range, matrix),
                (_, ChromaSampling::Cs422) => yuv::i216_to_rgba16(&planar, samples, rgba_stride, range, matrix),
                (_, _) => yuv::i416_to_rgba16(&planar, samples, rgba_stride, range, matrix),
            }
            .map_err(|e| at(Error::from(e)))?;
        }
    }
    for px in out.iter_mut() {
        px.r = scale_to_u16(px.r, depth);
        px.g = scale_to_u16(px.g, depth);
        px.b = scale_to_u16(px.b, depth);
        px.a = 0xFFFF;
    }
    Ok(ImgVec::new(out, width as usize, height as usize))
}

fn add_alpha8(img: &mut ImgVec<Rgba<u8>>, alpha: &Plane<u8>, range: ColorRange, premultiplied: bool) {
    for (alpha_row, img_row) in alpha.rows().zip(img.rows_mut()) {
        for (&a, px) in alpha_row.iter().zip(img_row.iter_mut()) {
            px.a = match range {
                ColorRange::Full => a,
                ColorRange::Limited => limited_to_full_8(a),
            };
        }
        if premultiplied {
            unpremultiply8(img_row);
        }
    }
}

/// Alpha samples are range-converted, then scaled to full u16 to match
/// the color channels
fn add_alpha16(
    img: &mut ImgVec<Rgba<u16>>,
    alpha: &Plane<u16>,
    range: ColorRange,
    bit_depth: u8,
    premultiplied: bool,
) {
    let max = ((1u32 << bit_depth) - 1) as u16;
    for (alpha_row, img_row) in alpha.rows().zip(img.rows_mut()) {
        for (&a, px) in alpha_row.iter().zip(img_row.iter_mut()) {
            let a = match range {
                ColorRange::Full => a.min(max),
                ColorRange::Limited => limited_to_full_16(a, bit_depth),
            };
            px.a = scale_to_u16(a, bit_depth);
        }
        if premultiplied {
            unpremultiply16(img_row);
        }
    }
}

#[inline]
fn quantize(c: f32, max: f32) -> u32 {
    (c.clamp(0.0, 1.0) * max).round() as u32
}

/// Pack `[0, 1]` RGBA into a surface of the resolved format
pub(crate) fn pack(img: &Rgba32FImage, format: ResolvedPixelFormat) -> PixelSurface {
    let mut surface = PixelSurface::new(img.width(), img.height(), format);
    for (y, row) in img.rows().enumerate() {
        let dst = surface.row_mut(y as u32);
        let bpp = format.bytes_per_pixel();
        for (px, out) in row.zip(dst.chunks_exact_mut(bpp)) {
            let [r, g, b, a] = px.0;
            match format {
                ResolvedPixelFormat::Rgba8888 | ResolvedPixelFormat::Hardware => {
                    out[0] = quantize(r, 255.0) as u8;
                    out[1] = quantize(g, 255.0) as u8;
                    out[2] = quantize(b, 255.0) as u8;
                    out[3] = quantize(a, 255.0) as u8;
                }
                ResolvedPixelFormat::RgbaF16 => {
                    for (i, c) in [r, g, b, a].into_iter().enumerate() {
                        let h = half::f16::from_f32(c);
                        out[i * 2..i * 2 + 2].copy_from_slice(&h.to_le_bytes());
                    }
                }
                ResolvedPixelFormat::Rgb565 => {
                    let v = (quantize(r, 31.0) << 11) | (quantize(g, 63.0) << 5) | quantize(b, 31.0);
                    out.copy_from_slice(&(v as u16).to_le_bytes());
                }
                ResolvedPixelFormat::Rgba1010102 => {
                    let v = quantize(r, 1023.0)
                        | (quantize(g, 1023.0) << 10)
                        | (quantize(b, 1023.0) << 20)
                        | (quantize(a, 3.0) << 30);
                    out.copy_from_slice(&v.to_le_bytes());
                }
            }
        }
    }
    surface
}

/// Read an 8-bit RGBA surface back into interleaved samples
pub(crate) fn unpack_rgba8(surface: &PixelSurface) -> Vec<[u8; 4]> {
    let mut out = Vec::with_capacity(surface.size().pixel_count() as usize);
    for y in 0..surface.height {
        out.extend(
            surface
                .row(y)
                .chunks_exact(4)
                .map(|px| [px[0], px[1], px[2], px[3]]),
        );
    }
    out
}

/// Expand an RGB565 surface to opaque 8-bit RGBA
pub(crate) fn unpack_rgb565(surface: &PixelSurface) -> Vec<[u8; 4]> {
    let mut out = Vec::with_capacity(surface.size().pixel_count() as usize);
    for y in 0..surface.height {
        out.extend(surface.row(y).chunks_exact(2).map(|px| {
            let v = u16::from_le_bytes([px[0], px[1]]);
            let (r, g, b) = ((v >> 11) & 0x1F, (v >> 5) & 0x3F, v & 0x1F);
            [
                ((r << 3) | (r >> 2)) as u8,
                ((g << 2) | (g >> 4)) as u8,
                ((b << 3) | (b >> 2)) as u8,
                255,
            ]
        }));
    }
    out
}

/// Read a half-float RGBA surface back as 10-bit samples
pub(crate) fn unpack_f16_to_10bit(surface: &PixelSurface) -> Vec<[u16; 4]> {
    let mut out = Vec::with_capacity(surface.size().pixel_count() as usize);
    for y in 0..surface.height {
        out.extend(surface.row(y).chunks_exact(8).map(|px| {
            let mut s = [0u16; 4];
            for (i, c) in s.iter_mut().enumerate() {
                let v = half::f16::from_le_bytes([px[i * 2], px[i * 2 + 1]]).to_f32();
                *c = quantize(v, 1023.0) as u16;
            }
            s
        }));
    }
    out
}

/// Read an RGBA1010102 surface back as 10-bit samples; 2-bit alpha is
/// widened by bit replication
pub(crate) fn unpack_1010102(surface: &PixelSurface) -> Vec<[u16; 4]> {
    let mut out = Vec::with_capacity(surface.size().pixel_count() as usize);
    for y in 0..surface.height {
        out.extend(surface.row(y).chunks_exact(4).map(|px| {
            let v = u32::from_le_bytes([px[0], px[1], px[2], px[3]]);
            let a2 = (v >> 30) as u16;
            [
                (v & 0x3FF) as u16,
                ((v >> 10) & 0x3FF) as u16,
                ((v >> 20) & 0x3FF) as u16,
                a2 * 0x155,
            ]
        }));
    }
    out
}

//! HDR tone mapping: selection, transfer functions, and curves
//!
//! Curves take linear light relative to SDR reference white (1.0 = the
//! white point, 203 nits by default) and return display-linear `[0,1]`.

#![allow(clippy::excessive_precision)]

use crate::color::ResolvedPixelFormat;
use crate::image::{ColorPrimaries, TransferCharacteristics};
use image::Rgba32FImage;

/// SDR reference white in nits (ITU-R BT.2408)
pub const REFERENCE_WHITE_NITS: f32 = 203.0;

/// Content peak assumed when the frame carries no light level
pub const DEFAULT_CONTENT_MAX_NITS: f32 = 1000.0;

/// Tone mapping curve
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToneMapperKind {
    /// Keep the encoded signal
    None,
    /// Extended Reinhard on luma, per ITU-R BT.2408
    Rec2408,
    /// Logarithmic compression on luma
    Logarithmic,
    /// Uncharted 2 filmic curve
    Filmic,
    /// ACES RRT+ODT fit
    Aces,
}

/// What to do with HDR content when the surface can hold it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum HdrOutputPolicy {
    /// Tone map regardless of the surface
    #[default]
    ToneMap,
    /// Leave the HDR signal untouched in F16/1010102 surfaces
    PassThrough,
}

/// Choose the tone mapper for one decode
///
/// SDR sources never get one. An explicit preference is used verbatim.
/// Otherwise [`ToneMapperKind::Rec2408`], unless the surface is
/// HDR-capable and the policy is [`HdrOutputPolicy::PassThrough`].
pub fn select(
    transfer: TransferCharacteristics,
    preference: Option<ToneMapperKind>,
    format: ResolvedPixelFormat,
    policy: HdrOutputPolicy,
) -> ToneMapperKind {
    if !transfer.is_hdr() {
        return ToneMapperKind::None;
    }
    if let Some(kind) = preference {
        return kind;
    }
    if format.is_hdr_capable() && policy == HdrOutputPolicy::PassThrough {
        ToneMapperKind::None
    } else {
        ToneMapperKind::Rec2408
    }
}

/// sRGB OETF: Linear `[0,1]` → sRGB encoded `[0,1]`
#[inline]
pub fn srgb_oetf(linear: f32) -> f32 {
    if linear <= 0.0031308 {
        linear * 12.92
    } else {
        1.055 * linear.powf(1.0 / 2.4) - 0.055
    }
}

const PQ_M1: f32 = 2610.0 / 16384.0;
const PQ_M2: f32 = 2523.0 / 4096.0 * 128.0;
const PQ_C1: f32 = 3424.0 / 4096.0;
const PQ_C2: f32 = 2413.0 / 4096.0 * 32.0;
const PQ_C3: f32 = 2392.0 / 4096.0 * 32.0;

/// PQ EOTF: PQ encoded `[0,1]` → absolute nits
#[inline]
pub fn pq_eotf_nits(encoded: f32) -> f32 {
    if encoded <= 0.0 {
        return 0.0;
    }
    let e = encoded.powf(1.0 / PQ_M2);
    let numerator = (e - PQ_C1).max(0.0);
    let denominator = PQ_C2 - PQ_C3 * e;
    if denominator <= 0.0 {
        return 10000.0;
    }
    (numerator / denominator).powf(1.0 / PQ_M1) * 10000.0
}

const HLG_A: f32 = 0.17883277;
const HLG_B: f32 = 0.28466892;
const HLG_C: f32 = 0.55991073;

/// HLG inverse OETF: HLG encoded `[0,1]` → scene linear `[0,1]`
#[inline]
pub fn hlg_oetf_inv(encoded: f32) -> f32 {
    if encoded <= 0.0 {
        0.0
    } else if encoded <= 0.5 {
        encoded * encoded / 3.0
    } else {
        (((encoded - HLG_C) / HLG_A).exp() + HLG_B) / 12.0
    }
}

const BT2020_LUMA: [f32; 3] = [0.2627, 0.6780, 0.0593];

#[inline]
fn luma(rgb: [f32; 3]) -> f32 {
    BT2020_LUMA[0] * rgb[0] + BT2020_LUMA[1] * rgb[1] + BT2020_LUMA[2] * rgb[2]
}

/// HLG EOTF with the BT.2100 OOTF, output in nits for a display of `peak`
fn hlg_eotf_nits(rgb: [f32; 3], peak: f32) -> [f32; 3] {
    let scene = rgb.map(hlg_oetf_inv);
    let gamma = 1.2 + 0.42 * (peak / 1000.0).log10();
    let y = luma(scene);
    let gain = if y > 0.0 { peak * y.powf(gamma - 1.0) } else { 0.0 };
    scene.map(|c| c * gain)
}

const BT2100_TO_BT709: [[f32; 3]; 3] = [
    [1.6604910, -0.5876411, -0.0728499],
    [-0.1245505, 1.1328999, -0.0083494],
    [-0.0181508, -0.1005789, 1.1187297],
];

const ACES_INPUT: [[f32; 3]; 3] = [
    [0.59719, 0.35458, 0.04823],
    [0.07600, 0.90834, 0.01566],
    [0.02840, 0.13383, 0.83777],
];

const ACES_OUTPUT: [[f32; 3]; 3] = [
    [1.60475, -0.53108, -0.07367],
    [-0.10208, 1.10813, -0.00605],
    [-0.00327, -0.07276, 1.07602],
];

#[inline]
fn mul3(m: &[[f32; 3]; 3], v: [f32; 3]) -> [f32; 3] {
    [
        m[0][0] * v[0] + m[0][1] * v[1] + m[0][2] * v[2],
        m[1][0] * v[0] + m[1][1] * v[1] + m[1][2] * v[2],
        m[2][0] * v[0] + m[2][1] * v[1] + m[2][2] * v[2],
    ]
}

fn uncharted2(x: f32) -> f32 {
    const A: f32 = 0.15;
    const B: f32 = 0.50;
    const C: f32 = 0.10;
    const D: f32 = 0.20;
    const E: f32 = 0.02;
    const F: f32 = 0.30;
    ((x * (A * x + C * B) + D * E) / (x * (A * x + B) + D * F)) - E / F
}

fn aces_rrt_odt(x: f32) -> f32 {
    let a = x * (x + 0.0245786) - 0.000090537;
    let b = x * (0.983729 * x + 0.4329510) + 0.238081;
    a / b
}

/// A configured tone curve
#[derive(Debug, Clone, Copy)]
pub struct ToneMapper {
    kind: ToneMapperKind,
    /// Content peak relative to reference white
    content_max: f32,
    /// Display peak relative to reference white
    display_max: f32,
}

impl ToneMapper {
    pub fn new(kind: ToneMapperKind, content_max_nits: f32, display_max_nits: f32) -> Self {
        let content_max = if content_max_nits > 0.0 {
            content_max_nits
        } else {
            DEFAULT_CONTENT_MAX_NITS
        };
        Self {
            kind,
            content_max: content_max / REFERENCE_WHITE_NITS,
            display_max: display_max_nits.max(1.0) / REFERENCE_WHITE_NITS,
        }
    }

    pub fn kind(&self) -> ToneMapperKind {
        self.kind
    }

    /// Map white-relative linear RGB to display-linear `[0,1]`
    pub fn map(&self, rgb: [f32; 3]) -> [f32; 3] {
        let out = match self.kind {
            ToneMapperKind::None => rgb,
            ToneMapperKind::Rec2408 => {
                let ld = self.content_max;
                let weight_a = self.display_max / (ld * ld);
                let weight_b = 1.0 / self.display_max;
                let l = luma(rgb);
                if l <= 0.0 {
                    rgb
                } else {
                    let scale = (1.0 + weight_a * l) / (1.0 + weight_b * l);
                    rgb.map(|c| c * scale)
                }
            }
            ToneMapperKind::Logarithmic => {
                let l = luma(rgb);
                if l <= 0.0 {
                    rgb
                } else {
                    let den = 1.0 / (1.0 + self.content_max).ln();
                    let scale = (1.0 + l).abs().ln() * den / l;
                    rgb.map(|c| c * scale)
                }
            }
            ToneMapperKind::Filmic => {
                const EXPOSURE_BIAS: f32 = 2.0;
                const WHITE: f32 = 11.2;
                let white_scale = 1.0 / uncharted2(WHITE);
                rgb.map(|c| uncharted2(c * EXPOSURE_BIAS) * white_scale)
            }
            ToneMapperKind::Aces => {
                let v = mul3(&ACES_INPUT, rgb).map(aces_rrt_odt);
                mul3(&ACES_OUTPUT, v)
            }
        };
        out.map(|c| c.clamp(0.0, 1.0))
    }
}

/// Tone map an image of encoded HDR signal into sRGB-encoded SDR in place
///
/// Alpha is untouched. Does nothing for SDR transfers or
/// [`ToneMapperKind::None`].
pub fn apply(
    img: &mut Rgba32FImage,
    transfer: TransferCharacteristics,
    primaries: ColorPrimaries,
    mapper: &ToneMapper,
) {
    if mapper.kind == ToneMapperKind::None || !transfer.is_hdr() {
        return;
    }
    let to_bt709 = primaries == ColorPrimaries::BT2020;
    let hlg_peak = mapper.content_max * REFERENCE_WHITE_NITS;
    for px in img.pixels_mut() {
        let signal = [px[0], px[1], px[2]];
        let nits = if transfer == TransferCharacteristics::SMPTE2084 {
            signal.map(pq_eotf_nits)
        } else {
            hlg_eotf_nits(signal, hlg_peak)
        };
        let mut linear = nits.map(|c| c / REFERENCE_WHITE_NITS);
        if to_bt709 {
            linear = mul3(&BT2100_TO_BT709, linear).map(|c| c.max(0.0));
        }
        let mapped = mapper.map(linear);
        px[0] = srgb_oetf(mapped[0]);
        px[1] = srgb_oetf(mapped[1]);
        px[2] = srgb_oetf(mapped[2]);
    }
}

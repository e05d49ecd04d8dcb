//! Single-image decode pipeline
//!
//! Sniff, probe, decode at native resolution through the [`Codec`], then
//! convert, scale, orient, tone map, and pack into the negotiated format.

use crate::codec::{Codec, YuvFrame};
use crate::color::{self, PixelFormatRequest, ResolvedPixelFormat, SourceTraits};
use crate::config::DecoderConfig;
use crate::container::{self, ContainerKind};
use crate::convert;
use crate::encoder::DataSpace;
use crate::error::{Error, Result};
use crate::image::{ColorPrimaries, ImageSize, Orientation, PixelSurface, TransferCharacteristics};
use crate::scale::{self, ScaleMode, ScalingQuality};
use crate::tonemap::{self, DEFAULT_CONTENT_MAX_NITS, ToneMapper, ToneMapperKind};
use log::{debug, warn};
use std::sync::Arc;
use whereat::at;

/// Signal properties that drive tone mapping
///
/// Taken from the decoded frame for still images and from the first frame
/// for animated sessions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct ToneSource {
    pub(crate) transfer: TransferCharacteristics,
    pub(crate) primaries: ColorPrimaries,
    pub(crate) content_max_nits: f32,
    /// Curve fixed for every frame; `None` selects per render
    pub(crate) sticky: Option<ToneMapperKind>,
}

impl ToneSource {
    pub(crate) fn from_frame(frame: &YuvFrame) -> Self {
        let content_max_nits = match frame.content_light {
            Some(clli) if clli.max_cll > 0 => f32::from(clli.max_cll),
            _ => DEFAULT_CONTENT_MAX_NITS,
        };
        Self {
            transfer: frame.nclx.transfer_characteristics,
            primaries: frame.nclx.color_primaries,
            content_max_nits,
            sticky: None,
        }
    }
}

/// Output geometry and format asked for by the caller
#[derive(Debug, Clone, Copy)]
pub(crate) struct RenderRequest {
    /// In display (post-orientation) space; a zero axis keeps the source size
    pub(crate) size: ImageSize,
    pub(crate) format: PixelFormatRequest,
    pub(crate) mode: ScaleMode,
    pub(crate) quality: ScalingQuality,
}

/// Turn a native-resolution frame into a caller-owned surface
pub(crate) fn render_frame(
    frame: &YuvFrame,
    orientation: Orientation,
    request: &RenderRequest,
    tone: &ToneSource,
    config: &DecoderConfig,
) -> Result<PixelSurface> {
    let traits = SourceTraits::from_signal(
        frame.bit_depth,
        frame.nclx.transfer_characteristics,
        frame.nclx.color_primaries,
    );
    let resolved = color::resolve(request.format, &config.capabilities, &traits);
    let plan = scale::plan_oriented(frame.size(), orientation, request.size, request.mode)?;
    let kind = tone.sticky.unwrap_or_else(|| {
        tonemap::select(tone.transfer, config.tone_mapper, resolved, config.hdr_policy)
    });
    debug!(
        "render {}x{} {orientation:?} -> {:?} as {resolved:?}, tone {kind:?}",
        frame.width, frame.height, plan
    );

    let rgba = convert::frame_to_rgba(frame)?;
    let scaled = scale::apply(rgba, &plan, request.quality);
    let mut img = scale::orient(scaled, orientation);

    let data_space = if kind == ToneMapperKind::None {
        DataSpace::from_nclx(&frame.nclx)
    } else {
        let mapper = ToneMapper::new(kind, tone.content_max_nits, config.display_max_nits);
        tonemap::apply(&mut img, tone.transfer, tone.primaries, &mapper);
        Some(DataSpace::Srgb)
    };

    let surface = convert::pack(&img, resolved).with_data_space(data_space);
    debug_assert_eq!(surface.size(), plan.display_size(orientation));
    debug_assert_eq!(surface.format, resolved);
    Ok(surface)
}

/// Decodes still AVIF and HEIC images through a codec backend
#[derive(Clone)]
pub struct Decoder {
    codec: Arc<dyn Codec>,
    config: DecoderConfig,
}

impl core::fmt::Debug for Decoder {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Decoder")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Decoder {
    pub fn new(codec: Arc<dyn Codec>, config: DecoderConfig) -> Self {
        Self { codec, config }
    }

    pub fn config(&self) -> &DecoderConfig {
        &self.config
    }

    /// Decode the primary image of `data`
    ///
    /// `requested` is in display space; a zero on either axis keeps the
    /// source size. The returned surface has
    /// the format [`color::resolve`] picks for `format`.
    pub fn decode(
        &self,
        data: &[u8],
        requested: ImageSize,
        format: PixelFormatRequest,
        mode: ScaleMode,
    ) -> Result<PixelSurface> {
        let kind = container::classify(data);
        if kind == ContainerKind::Unsupported {
            return Err(at(Error::UnsupportedFormat(if data.is_empty() {
                "empty buffer".into()
            } else {
                "not an AVIF or HEIF container".into()
            })));
        }
        let meta = container::probe(data).ok_or_else(|| {
            at(Error::CorruptContainer(
                "primary item dimensions not found".into(),
            ))
        })?;
        debug!("decode {kind:?}: stored {:?}, {:?}", meta.size, meta.orientation);
        self.config
            .check_frame_size(meta.size.width, meta.size.height)?;

        let frame = self
            .codec
            .decode_image(data, kind)
            .map_err(|e| at(Error::from_decode(e)))?;
        if frame.size() != meta.size {
            warn!(
                "decoded frame {}x{} differs from container size {}x{}",
                frame.width, frame.height, meta.size.width, meta.size.height
            );
            self.config.check_frame_size(frame.width, frame.height)?;
        }

        let request = RenderRequest {
            size: requested,
            format,
            mode,
            quality: self.config.scaling_quality,
        };
        render_frame(
            &frame,
            meta.orientation,
            &request,
            &ToneSource::from_frame(&frame),
            &self.config,
        )
    }

    /// Format a decode of `data` with `format` would produce, without
    /// decoding pixels
    ///
    /// Bit depth and color signalling come from the `pixi` and `colr`
    /// headers. A file that carries neither is treated as 8-bit SDR, so the
    /// answer can differ from [`decode`](Self::decode) when the bitstream
    /// alone signals more.
    pub fn preferred_format(&self, data: &[u8], format: PixelFormatRequest) -> ResolvedPixelFormat {
        let source = container::probe(data)
            .map(|meta| SourceTraits::from_metadata(&meta))
            .unwrap_or_default();
        debug!("preferred format for {source:?}");
        color::resolve(format, &self.config.capabilities, &source)
    }
}

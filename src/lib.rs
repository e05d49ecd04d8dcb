//! # zenheif
//!
//! AVIF and HEIC decode/encode bridge over a pluggable AV1/HEVC codec.
//!
//! This crate does everything around the bitstream codec: container
//! sniffing and header probing, output format negotiation, scale planning
//! (fit, fill, resize), orientation, HDR tone mapping, animated sequence
//! sessions, and encode parameter validation. Bitstream work goes through
//! the [`Codec`] trait.
//!
//! ## Quick Start
//!
//! ```no_run
//! # fn codec() -> std::sync::Arc<dyn zenheif::Codec> { unimplemented!() }
//! use zenheif::{Decoder, DecoderConfig, ImageSize, PixelFormatRequest, ScaleMode};
//!
//! let data = std::fs::read("image.avif").unwrap();
//! assert!(zenheif::is_supported_image(&data));
//! let size = zenheif::probe_size(&data).unwrap();
//! println!("{size:?}");
//!
//! let decoder = Decoder::new(codec(), DecoderConfig::new());
//! let surface = decoder
//!     .decode(&data, ImageSize::new(800, 600), PixelFormatRequest::Default, ScaleMode::Fit)
//!     .unwrap();
//! println!("{}x{} {:?}", surface.width, surface.height, surface.format);
//! ```
//!
//! ## Features
//!
//! - **`encode`**: [`RavifCodec`], an AVIF encoder backend on ravif
//! - **`encode-asm`**: ravif with hand-written assembly
//! - **`encode-threading`**: ravif with multi-threading
//!
//! ## Configuration
//!
//! ```
//! use zenheif::{Capabilities, DecoderConfig, HdrOutputPolicy, ScalingQuality};
//!
//! let config = DecoderConfig::new()
//!     .capabilities(Capabilities::ALL)
//!     .hdr_policy(HdrOutputPolicy::PassThrough)
//!     .scaling_quality(ScalingQuality::High)
//!     .frame_size_limit(8192 * 8192);
//! ```

mod animated;
mod codec;
mod color;
mod config;
mod container;
mod convert;
mod decoder;
mod encoder;
mod error;
mod image;
#[cfg(feature = "encode")]
mod ravif_backend;
mod scale;
mod tonemap;

pub use animated::AnimatedSession;
pub use codec::{
    Codec, CodecError, ContentLightLevel, EncodeRequest, EncodeSamples, FramePlanes, LoopCount,
    Plane, Sequence, SequenceInfo, YuvFrame,
};
pub use color::{Capabilities, PixelFormatRequest, ResolvedPixelFormat, SourceTraits, resolve};
pub use config::DecoderConfig;
pub use container::{ContainerKind, parse_sequence_info, probe};
pub use decoder::Decoder;
pub use encoder::{
    ChromaSubsampling, DataSpace, EncodeQualityArgument, EncodeSurface, EncodeTarget, Encoder,
    EncoderConfig, HeifPreset, MAX_SPEED, PreciseMode, ResolvedChroma, resolve_chroma,
};
pub use error::{Error, Result};
pub use self::image::{
    ChromaSampling, ColorPrimaries, ColorRange, ImageMetadata, ImageSize, MatrixCoefficients,
    Nclx, Orientation, PixelSurface, TransferCharacteristics,
};
#[cfg(feature = "encode")]
pub use ravif_backend::RavifCodec;
pub use scale::{CropRect, ScaleMode, ScalePlan, ScalingQuality, plan, plan_oriented};
pub use tonemap::{
    DEFAULT_CONTENT_MAX_NITS, HdrOutputPolicy, REFERENCE_WHITE_NITS, ToneMapper, ToneMapperKind,
};

/// Identify the container type from the leading `ftyp` box
pub fn classify(data: &[u8]) -> ContainerKind {
    container::classify(data)
}

/// Display size of the primary image, read from headers only
///
/// `Ok(None)` when the buffer is not a readable AVIF/HEIF; an error only
/// for an empty buffer.
pub fn probe_size(data: &[u8]) -> Result<Option<ImageSize>> {
    container::probe_size(data)
}

/// AVIF still image or sequence
pub fn is_avif(data: &[u8]) -> bool {
    classify(data).is_avif()
}

/// HEIF/HEIC image
pub fn is_heif(data: &[u8]) -> bool {
    classify(data).is_heif()
}

/// Any container this crate can decode
pub fn is_supported_image(data: &[u8]) -> bool {
    classify(data).is_supported()
}

/// Pick the tone mapping curve for a decode
pub fn select_tone_mapper(
    transfer: TransferCharacteristics,
    preference: Option<ToneMapperKind>,
    format: ResolvedPixelFormat,
    policy: HdrOutputPolicy,
) -> ToneMapperKind {
    tonemap::select(transfer, preference, format, policy)
}

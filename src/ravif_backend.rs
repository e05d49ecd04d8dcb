//! AVIF encoding via ravif
//!
//! ravif writes 4:4:4 AV1 with sRGB transfer and BT.709 primaries. Subsampled
//! chroma requests are encoded at full chroma resolution; monochrome and HEIC
//! are not available.

use crate::codec::{Codec, CodecError, EncodeRequest, EncodeSamples};
use crate::encoder::{EncodeTarget, PreciseMode, ResolvedChroma};
use crate::image::TransferCharacteristics;
use imgref::Img;
use log::{debug, warn};
use rgb::{Rgb, Rgba};

/// [`Codec`] that encodes AVIF with ravif (rav1e)
///
/// Decoding is not provided.
#[derive(Debug, Clone, Default)]
pub struct RavifCodec {
    threads: Option<usize>,
}

impl RavifCodec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of threads
    ///
    /// `None` uses the rayon default. `Some(1)` for single-threaded.
    /// Only effective with the `encode-threading` feature.
    pub fn threads(mut self, threads: Option<usize>) -> Self {
        self.threads = threads.filter(|&n| n > 0);
        self
    }

    fn build_encoder(&self, request: &EncodeRequest<'_>) -> ravif::Encoder<'static> {
        let quality = f32::from(request.quality.clamp(1, 100));
        // ravif speeds start at 1
        let speed = request.speed.clamp(1, 10);
        let color_model = match request.precise_mode {
            PreciseMode::Lossless => ravif::ColorModel::RGB,
            PreciseMode::Lossy => ravif::ColorModel::YCbCr,
        };
        ravif::Encoder::new()
            .with_quality(quality)
            .with_alpha_quality(quality)
            .with_speed(speed)
            .with_internal_color_model(color_model)
            .with_alpha_color_mode(ravif::AlphaColorMode::UnassociatedClean)
            .with_num_threads(self.threads)
    }
}

fn encode_failed(err: ravif::Error) -> CodecError {
    CodecError::Malformed(err.to_string())
}

impl Codec for RavifCodec {
    fn encode(&self, request: &EncodeRequest<'_>) -> Result<Vec<u8>, CodecError> {
        if request.target != EncodeTarget::Avif {
            return Err(CodecError::Unsupported(format!(
                "ravif cannot write {:?}",
                request.target
            )));
        }
        match request.chroma {
            ResolvedChroma::Yuv400 => {
                return Err(CodecError::Unsupported(
                    "ravif cannot write monochrome AV1".into(),
                ));
            }
            ResolvedChroma::Yuv420 | ResolvedChroma::Yuv422 => {
                debug!("ravif encodes {:?} as 4:4:4", request.chroma);
            }
            ResolvedChroma::Yuv444 => {}
        }
        if let Some(nclx) = &request.nclx {
            if nclx.transfer_characteristics != TransferCharacteristics::SRGB {
                warn!(
                    "ravif always signals sRGB; {:?} transfer is not recorded",
                    nclx.transfer_characteristics
                );
            }
        }

        let (width, height) = (request.width as usize, request.height as usize);
        let encoder = self.build_encoder(request);
        let encoded = match request.samples {
            EncodeSamples::Rgba8(samples) => {
                let pixels: &[Rgba<u8>] = bytemuck::cast_slice(samples);
                if request.with_alpha {
                    encoder
                        .encode_rgba(Img::new(pixels, width, height))
                        .map_err(encode_failed)?
                } else {
                    let rgb: Vec<Rgb<u8>> =
                        pixels.iter().map(|px| Rgb::new(px.r, px.g, px.b)).collect();
                    encoder
                        .encode_rgb(Img::new(rgb.as_slice(), width, height))
                        .map_err(encode_failed)?
                }
            }
            EncodeSamples::Rgba10(samples) => {
                // identity matrix planes are stored G, B, R
                let planes = samples.iter().map(|px| [px[1], px[2], px[0]]);
                let alpha = request
                    .with_alpha
                    .then(|| samples.iter().map(|px| px[3]));
                encoder
                    .encode_raw_planes_10_bit(
                        width,
                        height,
                        planes,
                        alpha,
                        ravif::PixelRange::Full,
                        ravif::MatrixCoefficients::Identity,
                    )
                    .map_err(encode_failed)?
            }
        };
        debug!(
            "ravif wrote {} bytes (color {}, alpha {})",
            encoded.avif_file.len(),
            encoded.color_byte_size,
            encoded.alpha_byte_size
        );
        Ok(encoded.avif_file)
    }
}

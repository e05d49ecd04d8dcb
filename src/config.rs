//! Decoder configuration

use crate::color::Capabilities;
use crate::scale::ScalingQuality;
use crate::tonemap::{HdrOutputPolicy, REFERENCE_WHITE_NITS, ToneMapperKind};

/// Configuration shared by single-image decodes and animated sessions
#[derive(Debug, Clone)]
pub struct DecoderConfig {
    /// Maximum frame size limit in pixels (0 = no limit)
    pub(crate) frame_size_limit: u64,
    pub(crate) capabilities: Capabilities,
    /// Explicit curve for HDR sources; `None` picks automatically
    pub(crate) tone_mapper: Option<ToneMapperKind>,
    pub(crate) hdr_policy: HdrOutputPolicy,
    pub(crate) scaling_quality: ScalingQuality,
    pub(crate) display_max_nits: f32,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            frame_size_limit: 0,
            capabilities: Capabilities::default(),
            tone_mapper: None,
            hdr_policy: HdrOutputPolicy::default(),
            scaling_quality: ScalingQuality::default(),
            display_max_nits: REFERENCE_WHITE_NITS,
        }
    }
}

impl DecoderConfig {
    /// Create a new decoder configuration with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Set maximum frame size limit in total pixels
    ///
    /// If width * height of the stored image exceeds this limit, decoding
    /// fails with [`Error::ImageTooLarge`](crate::Error::ImageTooLarge).
    /// 0 means no limit.
    pub fn frame_size_limit(mut self, limit: u64) -> Self {
        self.frame_size_limit = limit;
        self
    }

    /// Surface formats the caller can allocate
    pub fn capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Force a tone mapping curve for HDR sources
    ///
    /// [`ToneMapperKind::None`] disables tone mapping. SDR sources are never
    /// tone mapped.
    pub fn tone_mapper(mut self, kind: Option<ToneMapperKind>) -> Self {
        self.tone_mapper = kind;
        self
    }

    pub fn hdr_policy(mut self, policy: HdrOutputPolicy) -> Self {
        self.hdr_policy = policy;
        self
    }

    /// Resampling filter used when the output size differs from the source
    pub fn scaling_quality(mut self, quality: ScalingQuality) -> Self {
        self.scaling_quality = quality;
        self
    }

    /// Peak luminance of the target display in nits
    pub fn display_max_nits(mut self, nits: f32) -> Self {
        self.display_max_nits = nits;
        self
    }

    pub(crate) fn check_frame_size(&self, width: u32, height: u32) -> crate::Result<()> {
        if self.frame_size_limit > 0 && u64::from(width) * u64::from(height) > self.frame_size_limit {
            return Err(whereat::at(crate::Error::ImageTooLarge { width, height }));
        }
        Ok(())
    }
}

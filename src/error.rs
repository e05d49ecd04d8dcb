//! Error types for zenheif

use crate::codec::CodecError;

/// Error type for zenheif operations
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The buffer is not a recognised container, or the codec cannot handle
    /// the item type
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Container metadata or the coded bitstream is structurally invalid
    #[error("Corrupt container: {0}")]
    CorruptContainer(String),

    /// A requested, computed, or input dimension is zero, negative, or
    /// misaligned for the target codec
    #[error("Invalid dimensions: {width}x{height}")]
    InvalidDimensions {
        /// Offending width
        width: i64,
        /// Offending height
        height: i64,
    },

    /// An animated session could not be opened
    #[error("Initialization failed: {0}")]
    InitializationFailed(String),

    /// Operation invoked on a session that is not open
    #[error("Session is not open")]
    NotOpen,

    /// Frame index outside `0..frame_count`
    #[error("Frame index {index} out of bounds (frame count {frame_count})")]
    FrameIndexOutOfBounds {
        /// Requested index
        index: usize,
        /// Number of frames in the sequence
        frame_count: usize,
    },

    /// Quality or CRF outside its valid range
    #[error("Invalid quality argument: {0}")]
    InvalidQualityArgument(String),

    /// Image dimensions exceed configured limit
    #[error("Image too large: {width}x{height}")]
    ImageTooLarge {
        /// Image width
        width: u32,
        /// Image height
        height: u32,
    },

    /// The encoder backend failed
    #[error("Encode error: {0}")]
    Encode(String),
}

impl Error {
    pub(crate) fn invalid_dimensions(width: impl Into<i64>, height: impl Into<i64>) -> Self {
        Error::InvalidDimensions {
            width: width.into(),
            height: height.into(),
        }
    }

    /// Map a codec failure met while decoding onto the public taxonomy
    pub(crate) fn from_decode(err: CodecError) -> Self {
        match err {
            CodecError::Unsupported(msg) => Error::UnsupportedFormat(msg),
            CodecError::Malformed(msg) => Error::CorruptContainer(msg),
        }
    }

    /// Map a codec failure met while encoding onto the public taxonomy
    pub(crate) fn from_encode(err: CodecError) -> Self {
        match err {
            CodecError::Unsupported(msg) => Error::UnsupportedFormat(msg),
            CodecError::Malformed(msg) => Error::Encode(msg),
        }
    }
}

impl From<yuv::YuvError> for Error {
    fn from(err: yuv::YuvError) -> Self {
        Error::CorruptContainer(format!("color conversion failed: {err}"))
    }
}

/// Result type for zenheif operations with location tracking
pub type Result<T, E = whereat::At<Error>> = core::result::Result<T, E>;

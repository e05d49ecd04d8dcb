//! Animated AVIF sequences
//!
//! An [`AnimatedSession`] owns one codec [`Sequence`] between `open` and
//! `close`. All operations lock a single mutex, so a session can be shared
//! between threads and calls never interleave.

use crate::codec::{Codec, LoopCount, Sequence, SequenceInfo};
use crate::color::{self, PixelFormatRequest, SourceTraits};
use crate::config::DecoderConfig;
use crate::container::{self, ContainerKind};
use crate::decoder::{RenderRequest, ToneSource, render_frame};
use crate::error::{Error, Result};
use crate::image::{ImageSize, Orientation, PixelSurface};
use crate::scale::{ScaleMode, ScalingQuality};
use crate::tonemap;
use log::debug;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use whereat::at;

struct OpenSequence {
    sequence: Box<dyn Sequence>,
    info: SequenceInfo,
    /// Stored size of the frames
    size: ImageSize,
    orientation: Orientation,
    /// Signal and curve fixed from the first frame for the whole session
    tone: ToneSource,
}

enum SessionState {
    Uninitialized,
    Open(OpenSequence),
    Closed,
}

/// Frame-by-frame access to an animated AVIF
///
/// ```no_run
/// # fn codec() -> std::sync::Arc<dyn zenheif::Codec> { unimplemented!() }
/// use zenheif::{AnimatedSession, DecoderConfig};
///
/// let data = std::fs::read("animation.avif").unwrap();
/// let session = AnimatedSession::new(codec(), DecoderConfig::new());
/// session.open(&data).unwrap();
/// for i in 0..session.frame_count().unwrap() {
///     let frame = session.get_frame(i).unwrap();
///     let delay = session.frame_duration(i).unwrap();
///     println!("{}x{} for {delay} ms", frame.width, frame.height);
/// }
/// session.close();
/// ```
pub struct AnimatedSession {
    codec: Arc<dyn Codec>,
    config: DecoderConfig,
    state: Mutex<SessionState>,
}

impl core::fmt::Debug for AnimatedSession {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AnimatedSession")
            .field("config", &self.config)
            .field("open", &self.is_open())
            .finish_non_exhaustive()
    }
}

impl AnimatedSession {
    /// Create an uninitialized session
    pub fn new(codec: Arc<dyn Codec>, config: DecoderConfig) -> Self {
        Self {
            codec,
            config,
            state: Mutex::new(SessionState::Uninitialized),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Open an animated AVIF held in `data`
    ///
    /// Decodes the first frame to fix the tone mapper for the session. The
    /// curve is selected against the format a `Default` request resolves
    /// to and reused for every frame, whatever format later calls ask for.
    /// Any failure leaves the session closed.
    pub fn open(&self, data: &[u8]) -> Result<()> {
        let mut state = self.lock();
        match *state {
            SessionState::Uninitialized => {}
            SessionState::Open(_) => {
                return Err(at(Error::InitializationFailed(
                    "session is already open".into(),
                )));
            }
            SessionState::Closed => return Err(at(Error::NotOpen)),
        }
        match self.open_sequence(data) {
            Ok(open) => {
                debug!(
                    "opened sequence: {} frames, {:?}, {} ms",
                    open.info.frame_count(),
                    open.info.loop_count,
                    open.info.total_duration_ms()
                );
                *state = SessionState::Open(open);
                Ok(())
            }
            Err(e) => {
                *state = SessionState::Closed;
                Err(e)
            }
        }
    }

    fn open_sequence(&self, data: &[u8]) -> Result<OpenSequence> {
        let init_failed = |msg: String| at(Error::InitializationFailed(msg));
        let kind = container::classify(data);
        if kind != ContainerKind::AvifSequence {
            return Err(init_failed(format!("{kind:?} is not an image sequence")));
        }
        let owned = data.to_vec();
        let mut sequence = self
            .codec
            .open_sequence(&owned)
            .map_err(|e| init_failed(e.to_string()))?;
        let info = sequence.info().clone();
        if info.frame_count() == 0 {
            return Err(init_failed("sequence has no frames".into()));
        }
        let first = sequence
            .decode_frame(0)
            .map_err(|e| init_failed(e.to_string()))?;
        let orientation = container::probe(&owned)
            .map(|meta| meta.orientation)
            .unwrap_or_default();

        let mut tone = ToneSource::from_frame(&first);
        let traits = SourceTraits::from_signal(first.bit_depth, tone.transfer, tone.primaries);
        let format = color::resolve(PixelFormatRequest::Default, &self.config.capabilities, &traits);
        let kind = tonemap::select(
            tone.transfer,
            self.config.tone_mapper,
            format,
            self.config.hdr_policy,
        );
        debug!("session tone mapper {kind:?} for {:?}", tone.transfer);
        tone.sticky = Some(kind);
        Ok(OpenSequence {
            size: first.size(),
            tone,
            sequence,
            info,
            orientation,
        })
    }

    pub fn is_open(&self) -> bool {
        matches!(*self.lock(), SessionState::Open(_))
    }

    fn with_open<T>(&self, f: impl FnOnce(&mut OpenSequence) -> Result<T>) -> Result<T> {
        match &mut *self.lock() {
            SessionState::Open(open) => f(open),
            _ => Err(at(Error::NotOpen)),
        }
    }

    pub fn frame_count(&self) -> Result<usize> {
        self.with_open(|open| Ok(open.info.frame_count()))
    }

    pub fn loop_count(&self) -> Result<LoopCount> {
        self.with_open(|open| Ok(open.info.loop_count))
    }

    /// Sum of all frame durations in milliseconds
    pub fn total_duration(&self) -> Result<u64> {
        self.with_open(|open| Ok(open.info.total_duration_ms()))
    }

    /// Display duration of frame `index` in milliseconds
    pub fn frame_duration(&self, index: usize) -> Result<u64> {
        self.with_open(|open| {
            open.info.frame_duration_ms(index).ok_or_else(|| {
                at(Error::FrameIndexOutOfBounds {
                    index,
                    frame_count: open.info.frame_count(),
                })
            })
        })
    }

    /// Frame size with orientation applied
    pub fn image_size(&self) -> Result<ImageSize> {
        self.with_open(|open| Ok(open.orientation.display_size(open.size)))
    }

    /// Decode frame `index` at its own size in the automatic format
    pub fn get_frame(&self, index: usize) -> Result<PixelSurface> {
        self.get_scaled_frame(
            index,
            ImageSize::new(0, 0),
            PixelFormatRequest::Default,
            ScaleMode::Fit,
            self.config.scaling_quality,
        )
    }

    /// Decode frame `index` scaled into `size` (display space)
    pub fn get_scaled_frame(
        &self,
        index: usize,
        size: ImageSize,
        format: PixelFormatRequest,
        mode: ScaleMode,
        quality: ScalingQuality,
    ) -> Result<PixelSurface> {
        self.with_open(|open| {
            let frame_count = open.info.frame_count();
            if index >= frame_count {
                return Err(at(Error::FrameIndexOutOfBounds { index, frame_count }));
            }
            let frame = open
                .sequence
                .decode_frame(index)
                .map_err(|e| at(Error::from_decode(e)))?;
            self.config.check_frame_size(frame.width, frame.height)?;
            let request = RenderRequest {
                size,
                format,
                mode,
                quality,
            };
            render_frame(&frame, open.orientation, &request, &open.tone, &self.config)
        })
    }

    /// Release the codec sequence
    ///
    /// Later calls report [`Error::NotOpen`]. Closing twice is a no-op.
    pub fn close(&self) {
        let mut state = self.lock();
        if matches!(*state, SessionState::Open(_)) {
            debug!("closing sequence");
            *state = SessionState::Closed;
        }
    }
}

impl Drop for AnimatedSession {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        *state = SessionState::Closed;
    }
}

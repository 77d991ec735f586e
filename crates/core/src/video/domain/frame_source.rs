use std::path::Path;

use thiserror::Error;

use crate::shared::frame::Frame;
use crate::shared::video_metadata::VideoMetadata;

#[derive(Error, Debug)]
pub enum SourceError {
    /// The file is missing, unreadable, or failed the metadata probe.
    /// Fatal to opening that file; never falls back to guessed dimensions.
    #[error("source unavailable: {0}")]
    Unavailable(String),

    /// Operation attempted after `close()`. Programmer error, fail fast.
    #[error("operation on a closed source")]
    Closed,

    /// The decoder failed mid-stream. Distinct from end-of-stream, which is
    /// `Ok(None)` from `next_frame`.
    #[error("decode failed: {0}")]
    Decode(String),
}

/// Presents a video file as a pull-based sequence of frames with seek
/// support, hiding the decoding mechanism.
///
/// Implementations must deliver frames in strictly increasing time order,
/// except immediately after [`seek`](FrameSource::seek), when the position
/// restarts at the seek target. A source instance is driven by exactly one
/// loop at a time.
pub trait FrameSource: Send {
    /// Probes the file and prepares decoding. Metadata is resolved once
    /// here; a failed probe fails the open.
    fn open(&mut self, path: &Path) -> Result<VideoMetadata, SourceError>;

    /// Pulls the next frame. `Ok(None)` signals end-of-stream, a normal
    /// terminal condition. Each delivered frame advances the internal frame
    /// counter by exactly one.
    fn next_frame(&mut self) -> Result<Option<Frame>, SourceError>;

    /// Current position derived from frames actually delivered:
    /// `frames_consumed / fps`.
    fn position_secs(&self) -> f64;

    /// Restarts decoding from the nearest position at or before `secs` and
    /// resets the frame counter to the estimate `secs * fps`. The estimate
    /// is not frame-exact: the underlying decoder seeks by time, not frame
    /// index. Prior decode state is fully released before the next frame is
    /// produced.
    fn seek(&mut self, secs: f64) -> Result<(), SourceError>;

    /// Releases decode resources. Idempotent; `next_frame` afterwards fails
    /// with [`SourceError::Closed`].
    fn close(&mut self);

    /// True once decode resources are actually released. Callers needing a
    /// hard release guarantee poll this rather than assuming `close` is
    /// synchronous in every implementation.
    fn is_closed(&self) -> bool;
}

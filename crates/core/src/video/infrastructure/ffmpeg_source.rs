use std::path::Path;

use crate::shared::frame::Frame;
use crate::shared::video_metadata::VideoMetadata;
use crate::video::domain::frame_source::{FrameSource, SourceError};

/// Decodes video frames via ffmpeg-next (libavformat + libavcodec).
///
/// Every decoded frame is converted to RGB24 and wrapped in a [`Frame`].
/// Seeking restarts decoding at the keyframe at or before the target and
/// resets the frame counter to the `secs * fps` estimate; release of decode
/// state is synchronous here, so `is_closed` is true right after `close`.
pub struct FfmpegSource {
    state: Option<DecodeState>,
    metadata: Option<VideoMetadata>,
    frames_consumed: f64,
    closed: bool,
}

// Safety: FfmpegSource is only driven from a single thread at a time.
// The raw pointers inside ffmpeg types are not shared across threads.
unsafe impl Send for FfmpegSource {}

struct DecodeState {
    ictx: ffmpeg_next::format::context::Input,
    decoder: ffmpeg_next::decoder::Video,
    scaler: ffmpeg_next::software::scaling::Context,
    stream_index: usize,
    width: u32,
    height: u32,
    flushing: bool,
}

impl FfmpegSource {
    pub fn new() -> Self {
        Self {
            state: None,
            metadata: None,
            frames_consumed: 0.0,
            closed: false,
        }
    }

    fn fps(&self) -> f64 {
        self.metadata.as_ref().map_or(0.0, |m| m.fps)
    }
}

impl Default for FfmpegSource {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameSource for FfmpegSource {
    fn open(&mut self, path: &Path) -> Result<VideoMetadata, SourceError> {
        ffmpeg_next::init().map_err(|e| SourceError::Unavailable(e.to_string()))?;

        let ictx = ffmpeg_next::format::input(path)
            .map_err(|e| SourceError::Unavailable(format!("{}: {e}", path.display())))?;

        let (stream_index, decoder, fps, total_frames) = {
            let stream = ictx
                .streams()
                .best(ffmpeg_next::media::Type::Video)
                .ok_or_else(|| SourceError::Unavailable("no video stream found".into()))?;

            let codec_ctx =
                ffmpeg_next::codec::context::Context::from_parameters(stream.parameters())
                    .map_err(|e| SourceError::Unavailable(e.to_string()))?;
            let decoder = codec_ctx
                .decoder()
                .video()
                .map_err(|e| SourceError::Unavailable(e.to_string()))?;

            let rate = stream.rate();
            let fps = if rate.denominator() != 0 {
                f64::from(rate.numerator()) / f64::from(rate.denominator())
            } else {
                0.0
            };

            (stream.index(), decoder, fps, stream.frames())
        };

        if fps <= 0.0 {
            return Err(SourceError::Unavailable(
                "probe reported no usable frame rate".into(),
            ));
        }

        let duration_secs = if ictx.duration() > 0 {
            ictx.duration() as f64 / f64::from(ffmpeg_next::ffi::AV_TIME_BASE)
        } else {
            0.0
        };

        // Containers without an nb_frames entry get a duration-based estimate.
        let total_frames = if total_frames > 0 {
            total_frames as usize
        } else {
            (duration_secs * fps).round() as usize
        };

        let width = decoder.width();
        let height = decoder.height();
        let scaler = ffmpeg_next::software::scaling::Context::get(
            decoder.format(),
            width,
            height,
            ffmpeg_next::format::Pixel::RGB24,
            width,
            height,
            ffmpeg_next::software::scaling::Flags::BILINEAR,
        )
        .map_err(|e| SourceError::Unavailable(e.to_string()))?;

        let metadata = VideoMetadata {
            width,
            height,
            fps,
            duration_secs,
            total_frames,
            source_path: path.to_path_buf(),
        };

        self.state = Some(DecodeState {
            ictx,
            decoder,
            scaler,
            stream_index,
            width,
            height,
            flushing: false,
        });
        self.metadata = Some(metadata.clone());
        self.frames_consumed = 0.0;
        self.closed = false;

        Ok(metadata)
    }

    fn next_frame(&mut self) -> Result<Option<Frame>, SourceError> {
        if self.closed {
            return Err(SourceError::Closed);
        }
        let state = self
            .state
            .as_mut()
            .ok_or_else(|| SourceError::Unavailable("source not opened".into()))?;

        match state.pull()? {
            Some(pixels) => {
                let frame = Frame::new(
                    pixels,
                    state.width,
                    state.height,
                    3,
                    self.frames_consumed as usize,
                );
                self.frames_consumed += 1.0;
                Ok(Some(frame))
            }
            None => Ok(None),
        }
    }

    fn position_secs(&self) -> f64 {
        let fps = self.fps();
        if fps > 0.0 {
            self.frames_consumed / fps
        } else {
            0.0
        }
    }

    fn seek(&mut self, secs: f64) -> Result<(), SourceError> {
        if self.closed {
            return Err(SourceError::Closed);
        }
        let fps = self.fps();
        let state = self
            .state
            .as_mut()
            .ok_or_else(|| SourceError::Unavailable("source not opened".into()))?;

        let target = secs.max(0.0);
        let ts = (target * f64::from(ffmpeg_next::ffi::AV_TIME_BASE)) as i64;
        // Backward-bounded range lands on the keyframe at or before target.
        state
            .ictx
            .seek(ts, ..ts)
            .map_err(|e| SourceError::Decode(format!("seek to {target:.3}s failed: {e}")))?;
        state.decoder.flush();
        state.flushing = false;

        // Estimate, not frame-exact: the container seeks by time.
        self.frames_consumed = target * fps;
        Ok(())
    }

    fn close(&mut self) {
        self.state = None;
        self.closed = true;
    }

    fn is_closed(&self) -> bool {
        self.closed && self.state.is_none()
    }
}

impl DecodeState {
    /// Pulls one RGB frame: drains the decoder first, then feeds packets
    /// until a frame comes out or the stream is exhausted.
    fn pull(&mut self) -> Result<Option<Vec<u8>>, SourceError> {
        loop {
            if let Some(pixels) = self.try_receive()? {
                return Ok(Some(pixels));
            }
            if self.flushing {
                return Ok(None);
            }

            loop {
                let Some((stream, packet)) = self.ictx.packets().next() else {
                    let _ = self.decoder.send_eof();
                    self.flushing = true;
                    break;
                };
                if stream.index() != self.stream_index {
                    continue;
                }
                if self.decoder.send_packet(&packet).is_err() {
                    continue;
                }
                break;
            }
        }
    }

    fn try_receive(&mut self) -> Result<Option<Vec<u8>>, SourceError> {
        let mut decoded = ffmpeg_next::util::frame::video::Video::empty();
        if self.decoder.receive_frame(&mut decoded).is_ok() {
            let mut rgb_frame = ffmpeg_next::util::frame::video::Video::empty();
            self.scaler
                .run(&decoded, &mut rgb_frame)
                .map_err(|e| SourceError::Decode(e.to_string()))?;
            Ok(Some(extract_rgb_pixels(&rgb_frame, self.width, self.height)))
        } else {
            Ok(None)
        }
    }
}

/// Copies pixel data from an ffmpeg frame into a contiguous RGB buffer.
///
/// ffmpeg rows may carry padding bytes (stride > width*3); strip them so the
/// buffer is tightly packed.
fn extract_rgb_pixels(
    rgb_frame: &ffmpeg_next::util::frame::video::Video,
    width: u32,
    height: u32,
) -> Vec<u8> {
    let stride = rgb_frame.stride(0);
    let data = rgb_frame.data(0);
    let w = width as usize;
    let h = height as usize;

    let mut pixels = Vec::with_capacity(w * h * 3);
    for row in 0..h {
        let row_start = row * stride;
        pixels.extend_from_slice(&data[row_start..row_start + w * 3]);
    }
    pixels
}

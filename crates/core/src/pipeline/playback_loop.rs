use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use thiserror::Error;

use crate::detection::domain::interval_tracker::{IntervalTracker, MovementEvent};
use crate::detection::domain::motion_model::{DetectionError, MotionModel};
use crate::shared::constants::OVERLAY_COLOR;
use crate::shared::frame::Frame;
use crate::shared::mask::ForegroundMask;
use crate::shared::video_metadata::VideoMetadata;
use crate::video::domain::frame_source::{FrameSource, SourceError};

/// Per-frame emission consumed by the presentation layer.
pub struct PlaybackUpdate {
    /// The decoded frame; carries bounding-box overlays when `moving`.
    pub frame: Frame,
    pub mask: ForegroundMask,
    pub position_secs: f64,
    pub moving: bool,
}

pub type PlaybackSink = Box<dyn FnMut(PlaybackUpdate) + Send>;

#[derive(Error, Debug)]
pub enum PlaybackError {
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error(transparent)]
    Detection(#[from] DetectionError),
    #[error("playback thread panicked")]
    ThreadPanicked,
}

/// Shared control surface between the loop thread and its callers.
/// Single-writer-many-reader: callers set, the loop consumes.
struct Controls {
    paused: Mutex<bool>,
    resumed: Condvar,
    seek_request: Mutex<Option<f64>>,
    stopped: AtomicBool,
}

/// Drives source → model → tracker at the source's native frame rate on a
/// dedicated thread, with transport controls.
///
/// Per cycle: honor a pause (parked on a condvar until resumed — no frames
/// advance while paused), consume a pending seek, read one frame, classify,
/// track, emit to the sink, then sleep `max(1/fps - elapsed, 0)`. If
/// processing exceeds one frame period the loop free-runs and falls behind
/// real time rather than dropping frames. End-of-stream skips the cycle;
/// the loop keeps running until `stop` so a later seek can resume playback.
///
/// Controls are asynchronous requests observed within one cycle, not
/// instantaneously. The loop owns its source exclusively and closes it
/// before the thread exits.
pub struct PlaybackLoop {
    controls: Arc<Controls>,
    handle: Option<thread::JoinHandle<Result<Vec<MovementEvent>, PlaybackError>>>,
}

impl PlaybackLoop {
    pub fn spawn(
        source: Box<dyn FrameSource>,
        model: Box<dyn MotionModel>,
        metadata: VideoMetadata,
        sink: PlaybackSink,
    ) -> Self {
        let controls = Arc::new(Controls {
            paused: Mutex::new(false),
            resumed: Condvar::new(),
            seek_request: Mutex::new(None),
            stopped: AtomicBool::new(false),
        });

        let thread_controls = controls.clone();
        let handle = thread::spawn(move || run(source, model, metadata, sink, thread_controls));

        Self {
            controls,
            handle: Some(handle),
        }
    }

    /// Level-triggered: playback halts within one cycle and stays halted.
    pub fn pause(&self) {
        *self.lock_paused() = true;
    }

    pub fn resume(&self) {
        *self.lock_paused() = false;
        self.controls.resumed.notify_all();
    }

    pub fn is_paused(&self) -> bool {
        *self.lock_paused()
    }

    /// One-shot request, consumed on the next cycle. A second call before
    /// consumption replaces the pending target.
    pub fn seek(&self, secs: f64) {
        *self
            .controls
            .seek_request
            .lock()
            .expect("playback seek lock poisoned") = Some(secs);
    }

    /// Stops the loop, joins the thread, and returns the accumulated
    /// movement events. The source is closed before this returns.
    pub fn stop(mut self) -> Result<Vec<MovementEvent>, PlaybackError> {
        self.request_stop();
        match self.handle.take() {
            Some(handle) => handle.join().unwrap_or(Err(PlaybackError::ThreadPanicked)),
            None => Err(PlaybackError::ThreadPanicked),
        }
    }

    fn request_stop(&self) {
        self.controls.stopped.store(true, Ordering::SeqCst);
        // wake the thread if it is parked in a pause
        self.controls.resumed.notify_all();
    }

    fn lock_paused(&self) -> std::sync::MutexGuard<'_, bool> {
        self.controls
            .paused
            .lock()
            .expect("playback pause lock poisoned")
    }
}

impl Drop for PlaybackLoop {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.request_stop();
            let _ = handle.join();
        }
    }
}

fn run(
    mut source: Box<dyn FrameSource>,
    mut model: Box<dyn MotionModel>,
    metadata: VideoMetadata,
    mut sink: PlaybackSink,
    controls: Arc<Controls>,
) -> Result<Vec<MovementEvent>, PlaybackError> {
    let period = Duration::from_secs_f64(metadata.frame_period_secs());
    let mut tracker = IntervalTracker::new();

    let failure = loop {
        if controls.stopped.load(Ordering::SeqCst) {
            break None;
        }
        let cycle_start = Instant::now();

        {
            let mut paused = controls
                .paused
                .lock()
                .expect("playback pause lock poisoned");
            while *paused && !controls.stopped.load(Ordering::SeqCst) {
                paused = controls
                    .resumed
                    .wait(paused)
                    .expect("playback pause lock poisoned");
            }
        }
        if controls.stopped.load(Ordering::SeqCst) {
            break None;
        }

        let pending_seek = controls
            .seek_request
            .lock()
            .expect("playback seek lock poisoned")
            .take();
        if let Some(target) = pending_seek {
            if let Err(e) = source.seek(target) {
                break Some(PlaybackError::from(e));
            }
        }

        match source.next_frame() {
            Err(e) => break Some(PlaybackError::from(e)),
            // end-of-stream: tolerated, not fatal; the caller notices the
            // absence of further output
            Ok(None) => {}
            Ok(Some(mut frame)) => {
                let detection = match model.detect(&frame) {
                    Ok(d) => d,
                    Err(e) => break Some(PlaybackError::from(e)),
                };
                let position = source.position_secs();
                tracker.update(detection.moving, position);

                if detection.moving {
                    for blob in detection.mask.blob_boxes() {
                        frame.draw_rect(
                            blob.x,
                            blob.y,
                            blob.width,
                            blob.height,
                            2,
                            OVERLAY_COLOR,
                        );
                    }
                }

                sink(PlaybackUpdate {
                    frame,
                    mask: detection.mask,
                    position_secs: position,
                    moving: detection.moving,
                });
            }
        }

        if let Some(remaining) = period.checked_sub(cycle_start.elapsed()) {
            thread::sleep(remaining);
        }
    };

    source.close();

    match failure {
        Some(e) => {
            log::warn!("playback stopped on error: {e}");
            Err(e)
        }
        None => Ok(tracker.events()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::domain::detection_parameters::DetectionParameters;
    use crate::detection::domain::motion_model::Detection;
    use std::path::{Path, PathBuf};
    use std::time::Duration;

    const FPS: f64 = 500.0;

    // --- Stubs ---

    struct StubSource {
        brightness: Vec<u8>,
        cursor: usize,
        seeks: Arc<Mutex<Vec<f64>>>,
        closed: Arc<AtomicBool>,
    }

    impl StubSource {
        fn new(brightness: Vec<u8>) -> Self {
            Self {
                brightness,
                cursor: 0,
                seeks: Arc::new(Mutex::new(Vec::new())),
                closed: Arc::new(AtomicBool::new(false)),
            }
        }
    }

    impl FrameSource for StubSource {
        fn open(&mut self, path: &Path) -> Result<VideoMetadata, SourceError> {
            Ok(metadata(path))
        }

        fn next_frame(&mut self) -> Result<Option<Frame>, SourceError> {
            match self.brightness.get(self.cursor) {
                Some(&value) => {
                    let frame = Frame::new(vec![value; 4 * 4 * 3], 4, 4, 3, self.cursor);
                    self.cursor += 1;
                    Ok(Some(frame))
                }
                None => Ok(None),
            }
        }

        fn position_secs(&self) -> f64 {
            self.cursor as f64 / FPS
        }

        fn seek(&mut self, secs: f64) -> Result<(), SourceError> {
            self.seeks.lock().unwrap().push(secs);
            self.cursor = ((secs * FPS) as usize).min(self.brightness.len());
            Ok(())
        }

        fn close(&mut self) {
            self.closed.store(true, Ordering::SeqCst);
        }

        fn is_closed(&self) -> bool {
            self.closed.load(Ordering::SeqCst)
        }
    }

    /// Classifies a frame as moving when its first byte is bright.
    struct StubModel;

    impl MotionModel for StubModel {
        fn detect(&mut self, frame: &Frame) -> Result<Detection, DetectionError> {
            let moving = frame.data()[0] > 127;
            let mask = ForegroundMask::new(
                vec![0; (frame.width() * frame.height()) as usize],
                frame.width(),
                frame.height(),
            );
            Ok(Detection { mask, moving })
        }

        fn apply_parameters(&mut self, _params: &DetectionParameters) -> Result<(), DetectionError> {
            Ok(())
        }

        fn parameters(&self) -> DetectionParameters {
            DetectionParameters::default()
        }
    }

    fn metadata(path: &Path) -> VideoMetadata {
        VideoMetadata {
            width: 4,
            height: 4,
            fps: FPS,
            duration_secs: 10.0,
            total_frames: 0,
            source_path: PathBuf::from(path),
        }
    }

    fn counting_sink() -> (Arc<Mutex<Vec<f64>>>, PlaybackSink) {
        let positions = Arc::new(Mutex::new(Vec::new()));
        let cloned = positions.clone();
        let sink: PlaybackSink = Box::new(move |update: PlaybackUpdate| {
            cloned.lock().unwrap().push(update.position_secs);
        });
        (positions, sink)
    }

    fn spawn_loop(brightness: Vec<u8>, sink: PlaybackSink) -> (PlaybackLoop, Arc<Mutex<Vec<f64>>>, Arc<AtomicBool>) {
        let source = StubSource::new(brightness);
        let seeks = source.seeks.clone();
        let closed = source.closed.clone();
        let playback = PlaybackLoop::spawn(
            Box::new(source),
            Box::new(StubModel),
            metadata(Path::new("/tmp/stub.avi")),
            sink,
        );
        (playback, seeks, closed)
    }

    fn wait_until(deadline_ms: u64, mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_millis(deadline_ms);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(2));
        }
        condition()
    }

    #[test]
    fn test_processes_all_frames_and_returns_events() {
        // bright run over frames 2..=4
        let mut brightness = vec![50u8; 10];
        for value in &mut brightness[2..5] {
            *value = 200;
        }
        let (positions, sink) = counting_sink();
        let (playback, _seeks, closed) = spawn_loop(brightness, sink);

        assert!(wait_until(2000, || positions.lock().unwrap().len() == 10));

        let events = playback.stop().unwrap();
        assert_eq!(events.len(), 1);
        assert!((events[0].start_secs - 3.0 / FPS).abs() < 1e-9);
        assert!((events[0].end_secs - 6.0 / FPS).abs() < 1e-9);
        assert!(closed.load(Ordering::SeqCst));
    }

    #[test]
    fn test_pause_halts_and_resume_restores_frame_flow() {
        let (positions, sink) = counting_sink();
        let (playback, _seeks, _closed) = spawn_loop(vec![50u8; 100_000], sink);

        assert!(wait_until(2000, || !positions.lock().unwrap().is_empty()));
        playback.pause();
        // let the in-flight cycle observe the pause
        thread::sleep(Duration::from_millis(30));

        let frozen = positions.lock().unwrap().len();
        thread::sleep(Duration::from_millis(60));
        assert_eq!(positions.lock().unwrap().len(), frozen);

        playback.resume();
        assert!(wait_until(2000, || positions.lock().unwrap().len() > frozen));
        drop(playback);
    }

    #[test]
    fn test_seek_request_is_consumed_once() {
        let (positions, sink) = counting_sink();
        let (playback, seeks, _closed) = spawn_loop(vec![50u8; 100_000], sink);

        playback.seek(1.0);
        assert!(wait_until(2000, || seeks.lock().unwrap().len() == 1));
        thread::sleep(Duration::from_millis(30));
        assert_eq!(seeks.lock().unwrap().len(), 1);

        // the loop keeps emitting from the new position
        assert!(wait_until(2000, || positions
            .lock()
            .unwrap()
            .iter()
            .any(|&p| p >= 1.0)));
        drop(playback);
    }

    #[test]
    fn test_end_of_stream_is_tolerated() {
        let (positions, sink) = counting_sink();
        let (playback, _seeks, closed) = spawn_loop(vec![50u8; 3], sink);

        assert!(wait_until(2000, || positions.lock().unwrap().len() == 3));
        // stream is over; the loop idles without failing
        thread::sleep(Duration::from_millis(30));
        assert_eq!(positions.lock().unwrap().len(), 3);

        let events = playback.stop().unwrap();
        assert!(events.is_empty());
        assert!(closed.load(Ordering::SeqCst));
    }

    #[test]
    fn test_stop_while_paused_does_not_deadlock() {
        let (_positions, sink) = counting_sink();
        let (playback, _seeks, closed) = spawn_loop(vec![50u8; 100_000], sink);

        playback.pause();
        thread::sleep(Duration::from_millis(20));
        playback.stop().unwrap();
        assert!(closed.load(Ordering::SeqCst));
    }
}

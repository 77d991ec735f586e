/// File extensions the batch job picks up when scanning a source folder.
pub const VIDEO_EXTENSIONS: &[&str] = &["avi"];

/// Extension of the per-file interval artifact written by the batch job.
pub const EVENT_FILE_EXTENSION: &str = "csv";

/// RGB color of the bounding boxes playback draws around moving blobs.
pub const OVERLAY_COLOR: [u8; 3] = [0, 255, 0];

pub mod batch_job;
pub mod playback_loop;

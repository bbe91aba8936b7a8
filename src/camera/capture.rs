use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use opencv::core::Mat;
use opencv::prelude::*;
use opencv::videoio::{self, VideoCapture};
use thiserror::Error;

use crate::config::CameraConfig;

const READ_RETRY: Duration = Duration::from_millis(200);

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("failed to open camera source {0}")]
    Open(String),
    #[error("opencv error: {0}")]
    OpenCv(#[from] opencv::Error),
}

/// Latest frame delivered by the grabber. Readers get a copy, never a view
/// that the grabber could overwrite.
#[derive(Clone, Default)]
pub struct FrameSlot {
    inner: Arc<Mutex<Option<Mat>>>,
}

impl FrameSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store(&self, frame: Mat) {
        if let Ok(mut slot) = self.inner.lock() {
            *slot = Some(frame);
        }
    }

    pub fn latest(&self) -> Option<Mat> {
        let slot = self.inner.lock().ok()?;
        slot.as_ref().and_then(|frame| frame.try_clone().ok())
    }

    pub fn clear(&self) {
        if let Ok(mut slot) = self.inner.lock() {
            *slot = None;
        }
    }
}

/// Keeps a camera open and pushes every decoded frame into a [`FrameSlot`].
pub struct FrameGrabber {
    camera_id: String,
    source: String,
    width: u32,
    height: u32,
    slot: FrameSlot,
}

impl FrameGrabber {
    pub fn new(config: &CameraConfig, slot: FrameSlot) -> Self {
        Self {
            camera_id: config.id.clone(),
            source: config.source.clone(),
            width: config.width,
            height: config.height,
            slot,
        }
    }

    fn open(&self) -> Result<VideoCapture, CaptureError> {
        let mut capture = match self.source.parse::<i32>() {
            Ok(index) => VideoCapture::new(index, videoio::CAP_ANY)?,
            Err(_) => VideoCapture::from_file(&self.source, videoio::CAP_ANY)?,
        };
        if !capture.is_opened()? {
            return Err(CaptureError::Open(self.source.clone()));
        }
        let width_set = request(&mut capture, videoio::CAP_PROP_FRAME_WIDTH, self.width as f64);
        let height_set = request(&mut capture, videoio::CAP_PROP_FRAME_HEIGHT, self.height as f64);
        if !(width_set && height_set) {
            tracing::debug!(
                camera = %self.camera_id,
                width = self.width,
                height = self.height,
                "backend refused requested resolution"
            );
        }
        if !request(&mut capture, videoio::CAP_PROP_BUFFERSIZE, 1.0) {
            tracing::debug!(camera = %self.camera_id, "backend ignores buffer size");
        }
        Ok(capture)
    }

    /// Blocks until `shutdown` is set or the device stops delivering frames.
    pub fn run(&self, shutdown: &AtomicBool) -> Result<(), CaptureError> {
        let mut capture = self.open()?;
        tracing::info!(camera = %self.camera_id, source = %self.source, "camera opened");

        let mut frame = Mat::default();
        let mut misses = 0u32;
        while !shutdown.load(Ordering::Relaxed) {
            if capture.read(&mut frame)? && !frame.empty() {
                misses = 0;
                self.slot.store(frame.try_clone()?);
                continue;
            }
            misses += 1;
            if misses == 1 || misses % 25 == 0 {
                tracing::warn!(camera = %self.camera_id, misses, "no frame from camera");
            }
            if misses >= 100 {
                self.slot.clear();
                return Err(CaptureError::Open(self.source.clone()));
            }
            std::thread::sleep(READ_RETRY);
        }

        tracing::info!(camera = %self.camera_id, "camera released");
        Ok(())
    }
}

/// Whether the backend accepted a property; refusals and errors both count as `false`.
fn request(capture: &mut VideoCapture, prop: i32, value: f64) -> bool {
    match capture.set(prop, value) {
        Ok(accepted) => accepted,
        Err(e) => {
            tracing::debug!(prop, error = %e, "capture property rejected");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::test_support::blank;
    use opencv::core::Vec3b;

    #[test]
    fn slot_hands_out_copies() {
        let slot = FrameSlot::new();
        assert!(slot.latest().is_none());

        slot.store(blank(4, 4, 9).unwrap());
        let mut copy = slot.latest().unwrap();
        copy.at_2d_mut::<Vec3b>(0, 0).unwrap()[0] = 0;

        let again = slot.latest().unwrap();
        assert_eq!(again.at_2d::<Vec3b>(0, 0).unwrap()[0], 9);

        slot.clear();
        assert!(slot.latest().is_none());
    }

    #[test]
    fn closed_capture_refuses_properties() {
        let mut capture = VideoCapture::default().unwrap();
        assert!(!request(&mut capture, videoio::CAP_PROP_FRAME_WIDTH, 640.0));
    }

    #[test]
    fn unknown_source_fails_to_open() {
        let config = CameraConfig {
            source: "/nonexistent/camdiff-test.mp4".into(),
            ..CameraConfig::default()
        };
        let grabber = FrameGrabber::new(&config, FrameSlot::new());
        let shutdown = AtomicBool::new(false);
        assert!(grabber.run(&shutdown).is_err());
    }
}

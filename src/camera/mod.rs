mod capture;

pub use capture::{CaptureError, FrameGrabber, FrameSlot};

#[cfg(feature = "camera-nokhwa")]
pub mod camera;
pub mod frame_channel;
pub mod frame_decoder;
pub mod image_source;
pub mod overlay;
pub mod tracks;

use anyhow::Result;

use crate::types::Frame;

/// A stream of RGB frames. `Ok(None)` marks the end of the stream.
pub trait FrameSource {
    fn next_frame(&mut self) -> Result<Option<Frame>>;
}

// Re-exports for convenience
#[cfg(feature = "camera-nokhwa")]
pub use camera::{CameraDevice, CameraSource, available_cameras};
pub use image_source::DirectorySource;
pub use overlay::OverlayPresenter;
pub use tracks::Tracks;

//! Perception tracks. Each wraps one external model behind a trait so the
//! session pipeline can run against ONNX Runtime or in-process fakes.

pub mod body;
pub mod common;
pub mod emotion;
pub mod face;
pub mod objects;

pub use body::{BodyTrack, OrtPoseLandmarker, PoseJoint, PoseLandmarker};
pub use emotion::{EmotionClassifier, EmotionError, EmotionTrack, OrtEmotionClassifier};
pub use face::{FaceLandmarker, FaceTrack, OrtFaceLandmarker};
pub use objects::{ObjectDetector, ObjectTrack, OrtObjectDetector, RawDetection, YoloConfig};

/// The four tracks a session runs on every frame, constructed once up front.
pub struct Tracks {
    pub face: FaceTrack,
    pub body: BodyTrack,
    pub objects: ObjectTrack,
    pub emotion: EmotionTrack,
}

use std::path::Path;

use anyhow::{Context, Result, anyhow};
use ort::session::Session;
use ort::value::Tensor;

use super::common::{self, TensorLayout};
use crate::{
    geometry::{self, FaceKeypoints},
    types::{FaceFrameResult, Frame, Landmark},
};

pub const FACE_INPUT_SIZE: u32 = 192;
pub const FACE_MESH_LANDMARKS: usize = 468;
const FACE_PRESENCE_THRESHOLD: f32 = 0.5;

/// Single-face landmark model. `Ok(None)` means no face in the frame.
pub trait FaceLandmarker: Send {
    fn detect(&mut self, frame: &Frame) -> Result<Option<Vec<Landmark>>>;
}

/// Gaze, blink and head pose for the (single) face in each frame.
pub struct FaceTrack {
    landmarker: Box<dyn FaceLandmarker>,
}

impl FaceTrack {
    pub fn new(landmarker: impl FaceLandmarker + 'static) -> Self {
        Self {
            landmarker: Box::new(landmarker),
        }
    }

    pub fn process(&mut self, frame: &Frame) -> Result<FaceFrameResult> {
        let Some(landmarks) = self.landmarker.detect(frame)? else {
            return Ok(FaceFrameResult::default());
        };

        let Some(keypoints) = FaceKeypoints::from_mesh(&landmarks) else {
            log::debug!(
                "face mesh too short for keypoints: {} landmarks",
                landmarks.len()
            );
            return Ok(FaceFrameResult::default());
        };

        let pose = geometry::head_pose(&keypoints, frame.width, frame.height);
        Ok(FaceFrameResult {
            gaze_zone: geometry::gaze_zone(&keypoints, frame.width),
            blink: geometry::blink(&keypoints),
            yaw: pose.yaw,
            pitch: pose.pitch,
            roll: pose.roll,
            landmarks: Some(landmarks),
        })
    }
}

/// MediaPipe face-mesh exported to ONNX: output 0 holds `x, y, z` triples in
/// input pixels, output 1 the face-presence logit.
pub struct OrtFaceLandmarker {
    session: Session,
}

impl OrtFaceLandmarker {
    pub fn new(model_path: &Path) -> Result<Self> {
        let session = common::build_session(model_path)?;
        Ok(Self { session })
    }
}

impl FaceLandmarker for OrtFaceLandmarker {
    fn detect(&mut self, frame: &Frame) -> Result<Option<Vec<Landmark>>> {
        let (input, letterbox) =
            common::letterbox_frame(frame, FACE_INPUT_SIZE, TensorLayout::Nhwc, 0)?;
        let tensor = Tensor::from_array(input)?;
        let outputs = self
            .session
            .run(ort::inputs![tensor])
            .context("failed to run face mesh session")?;

        if outputs.len() < 2 {
            return Err(anyhow!(
                "face mesh returned {} outputs, expected at least 2",
                outputs.len()
            ));
        }

        let presence = outputs[1]
            .try_extract_array::<f32>()
            .context("failed to read face presence output")?;
        let presence = common::presence_score(presence.iter().copied())
            .context("face presence output is empty or not finite")?;
        if common::sigmoid(presence) < FACE_PRESENCE_THRESHOLD {
            return Ok(None);
        }

        let coords = outputs[0]
            .try_extract_array::<f32>()
            .context("failed to read face mesh landmarks")?;
        let flattened: Vec<f32> = coords.iter().copied().collect();
        let raw = common::decode_landmarks(&flattened, 3, FACE_MESH_LANDMARKS)?;

        Ok(Some(common::normalize_landmarks(&raw, &letterbox)))
    }
}

use std::path::Path;

use anyhow::{Context, Result, anyhow};
use ort::session::Session;
use ort::value::Tensor;

use super::common::{self, TensorLayout};
use crate::{
    geometry::MovementTracker,
    types::{BodyFrameResult, Frame, Landmark, Point},
};

pub const POSE_INPUT_SIZE: u32 = 256;
pub const POSE_LANDMARKS: usize = 33;
/// x, y, z, visibility, presence
const POSE_LANDMARK_STRIDE: usize = 5;
const POSE_PRESENCE_THRESHOLD: f32 = 0.5;

/// Pose joints used for the body center, with their BlazePose indices.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PoseJoint {
    LeftShoulder,
    RightShoulder,
    LeftHip,
    RightHip,
}

impl PoseJoint {
    pub const TORSO: [PoseJoint; 4] = [
        PoseJoint::LeftShoulder,
        PoseJoint::RightShoulder,
        PoseJoint::LeftHip,
        PoseJoint::RightHip,
    ];

    pub fn index(self) -> usize {
        match self {
            PoseJoint::LeftShoulder => 11,
            PoseJoint::RightShoulder => 12,
            PoseJoint::LeftHip => 23,
            PoseJoint::RightHip => 24,
        }
    }
}

/// Mean of both shoulders and both hips.
pub fn body_center(landmarks: &[Landmark]) -> Option<Point> {
    let mut sum_x = 0.0f64;
    let mut sum_y = 0.0f64;
    for joint in PoseJoint::TORSO {
        let lm = landmarks.get(joint.index())?;
        sum_x += f64::from(lm.x);
        sum_y += f64::from(lm.y);
    }
    let n = PoseJoint::TORSO.len() as f64;
    Some(Point((sum_x / n) as f32, (sum_y / n) as f32))
}

/// Single-body pose model. `Ok(None)` means nobody in the frame.
pub trait PoseLandmarker: Send {
    fn detect(&mut self, frame: &Frame) -> Result<Option<Vec<Landmark>>>;
}

pub struct BodyTrack {
    landmarker: Box<dyn PoseLandmarker>,
    movement: MovementTracker,
}

impl BodyTrack {
    pub fn new(landmarker: impl PoseLandmarker + 'static) -> Self {
        Self {
            landmarker: Box::new(landmarker),
            movement: MovementTracker::new(),
        }
    }

    pub fn movement_tracker(&self) -> &MovementTracker {
        &self.movement
    }

    pub fn process(&mut self, frame: &Frame) -> Result<BodyFrameResult> {
        let Some(landmarks) = self.landmarker.detect(frame)? else {
            return Ok(BodyFrameResult::default());
        };
        let Some(center) = body_center(&landmarks) else {
            log::debug!("pose missing torso joints: {} landmarks", landmarks.len());
            return Ok(BodyFrameResult::default());
        };

        let (movement, recent_centers) = self.movement.update(center);
        Ok(BodyFrameResult {
            movement,
            recent_centers,
        })
    }
}

/// BlazePose landmark model exported to ONNX: output 0 holds five values per
/// landmark in input pixels, output 1 the pose-presence score.
pub struct OrtPoseLandmarker {
    session: Session,
}

impl OrtPoseLandmarker {
    pub fn new(model_path: &Path) -> Result<Self> {
        let session = common::build_session(model_path)?;
        Ok(Self { session })
    }
}

impl PoseLandmarker for OrtPoseLandmarker {
    fn detect(&mut self, frame: &Frame) -> Result<Option<Vec<Landmark>>> {
        let (input, letterbox) =
            common::letterbox_frame(frame, POSE_INPUT_SIZE, TensorLayout::Nhwc, 0)?;
        let tensor = Tensor::from_array(input)?;
        let outputs = self
            .session
            .run(ort::inputs![tensor])
            .context("failed to run pose landmark session")?;

        if outputs.len() < 2 {
            return Err(anyhow!(
                "pose model returned {} outputs, expected at least 2",
                outputs.len()
            ));
        }

        let presence = outputs[1]
            .try_extract_array::<f32>()
            .context("failed to read pose presence output")?;
        let presence = common::presence_score(presence.iter().copied())
            .context("pose presence output is empty or not finite")?;
        if presence < POSE_PRESENCE_THRESHOLD {
            return Ok(None);
        }

        let coords = outputs[0]
            .try_extract_array::<f32>()
            .context("failed to read pose landmarks")?;
        let flattened: Vec<f32> = coords.iter().copied().collect();
        let raw = common::decode_landmarks(&flattened, POSE_LANDMARK_STRIDE, POSE_LANDMARKS)?;

        Ok(Some(common::normalize_landmarks(&raw, &letterbox)))
    }
}

//! Geometric signals derived from face-mesh and pose landmarks.
//!
//! All thresholds are fixed empirical constants in normalized image units.

use crate::types::{GazeZone, Landmark, Movement, Point};

pub const EYE_CENTER_LEFT_THRESHOLD: f32 = 0.4;
pub const EYE_CENTER_RIGHT_THRESHOLD: f32 = 0.6;
pub const EYE_UP_THRESHOLD: f32 = 0.018;
pub const EYE_DOWN_THRESHOLD: f32 = 0.030;
pub const BLINK_THRESHOLD: f32 = 0.014;
pub const BODY_MOVEMENT_THRESHOLD: f64 = 0.015;
pub const POSITION_HISTORY_LEN: usize = 5;

// Face-mesh indices.
const NOSE_TIP: usize = 1;
const LEFT_EYE_OUTER: usize = 33;
const LEFT_EYE_LOWER: usize = 145;
const CHIN: usize = 152;
const LEFT_EYE_UPPER: usize = 159;
const RIGHT_EYE_OUTER: usize = 263;
const RIGHT_EYE_LOWER: usize = 374;
const RIGHT_EYE_UPPER: usize = 386;

/// The face-mesh points the signals below read, pulled out by name.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FaceKeypoints {
    pub nose_tip: Landmark,
    pub chin: Landmark,
    pub left_eye_outer: Landmark,
    pub right_eye_outer: Landmark,
    pub left_eye_upper: Landmark,
    pub left_eye_lower: Landmark,
    pub right_eye_upper: Landmark,
    pub right_eye_lower: Landmark,
}

impl FaceKeypoints {
    /// Returns `None` when the mesh is too short to contain every keypoint.
    pub fn from_mesh(landmarks: &[Landmark]) -> Option<Self> {
        let at = |idx: usize| landmarks.get(idx).copied();
        Some(Self {
            nose_tip: at(NOSE_TIP)?,
            chin: at(CHIN)?,
            left_eye_outer: at(LEFT_EYE_OUTER)?,
            right_eye_outer: at(RIGHT_EYE_OUTER)?,
            left_eye_upper: at(LEFT_EYE_UPPER)?,
            left_eye_lower: at(LEFT_EYE_LOWER)?,
            right_eye_upper: at(RIGHT_EYE_UPPER)?,
            right_eye_lower: at(RIGHT_EYE_LOWER)?,
        })
    }

    pub fn eye_center_x(&self) -> f32 {
        (self.left_eye_outer.x + self.right_eye_outer.x) / 2.0
    }

    /// Mean vertical gap between upper and lower eyelid over both eyes.
    pub fn eyelid_gap(&self) -> f32 {
        let left = (self.left_eye_upper.y - self.left_eye_lower.y).abs();
        let right = (self.right_eye_upper.y - self.right_eye_lower.y).abs();
        (left + right) / 2.0
    }
}

/// Coarse eye-direction class. `_frame_width` is accepted to keep the call
/// shape of the other face signals; the test runs in normalized space.
pub fn gaze_zone(keypoints: &FaceKeypoints, _frame_width: u32) -> GazeZone {
    let center_x = keypoints.eye_center_x();
    if center_x < EYE_CENTER_LEFT_THRESHOLD {
        return GazeZone::Left;
    }
    if center_x > EYE_CENTER_RIGHT_THRESHOLD {
        return GazeZone::Right;
    }

    let gap = keypoints.eyelid_gap();
    if gap < EYE_UP_THRESHOLD {
        GazeZone::Up
    } else if gap > EYE_DOWN_THRESHOLD {
        GazeZone::Down
    } else {
        GazeZone::Center
    }
}

pub fn blink(keypoints: &FaceKeypoints) -> bool {
    keypoints.eyelid_gap() < BLINK_THRESHOLD
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct HeadPose {
    pub yaw: f32,
    pub pitch: f32,
    pub roll: f32,
}

/// 2-D proxy for head orientation, in degrees. Not a real 3-D pose solve:
/// yaw is the eye-line angle, pitch the nose-to-chin angle, roll mixes the two.
pub fn head_pose(keypoints: &FaceKeypoints, frame_width: u32, frame_height: u32) -> HeadPose {
    // f32 products can round up across a pixel boundary
    let to_pixel = |p: Landmark| {
        (
            (f64::from(p.x) * f64::from(frame_width)) as i32,
            (f64::from(p.y) * f64::from(frame_height)) as i32,
        )
    };

    let (nose_x, nose_y) = to_pixel(keypoints.nose_tip);
    let (chin_x, chin_y) = to_pixel(keypoints.chin);
    let (left_x, left_y) = to_pixel(keypoints.left_eye_outer);
    let (right_x, right_y) = to_pixel(keypoints.right_eye_outer);

    let angle = |dy: i32, dx: i32| f64::from(dy).atan2(f64::from(dx)).to_degrees() as f32;

    HeadPose {
        yaw: angle(left_y - right_y, left_x - right_x),
        pitch: angle(chin_y - nose_y, chin_x - nose_x),
        roll: angle(nose_y - chin_y, right_x - left_x),
    }
}

/// Direction for a displacement that already cleared the movement threshold.
/// Horizontal-positive wins outright; otherwise the dominant axis decides.
pub fn movement_direction(dx: f64, dy: f64) -> Movement {
    if dx > 0.0 {
        Movement::Right
    } else if dx.abs() > dy.abs() {
        Movement::Left
    } else if dy > 0.0 {
        Movement::Down
    } else {
        Movement::Up
    }
}

/// Fixed-size ring of the most recent body centers, oldest first on read.
#[derive(Clone, Debug, Default)]
pub struct CenterHistory {
    slots: [Point; POSITION_HISTORY_LEN],
    head: usize,
    len: usize,
}

impl CenterHistory {
    pub fn push(&mut self, point: Point) {
        self.slots[self.head] = point;
        self.head = (self.head + 1) % POSITION_HISTORY_LEN;
        self.len = (self.len + 1).min(POSITION_HISTORY_LEN);
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = Point> + '_ {
        let start = (self.head + POSITION_HISTORY_LEN - self.len) % POSITION_HISTORY_LEN;
        (0..self.len).map(move |i| self.slots[(start + i) % POSITION_HISTORY_LEN])
    }

    pub fn snapshot(&self) -> Vec<Point> {
        self.iter().collect()
    }
}

/// Tracks body-center displacement between frames.
#[derive(Clone, Debug, Default)]
pub struct MovementTracker {
    previous_center: Option<Point>,
    history: CenterHistory,
}

impl MovementTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn previous_center(&self) -> Option<Point> {
        self.previous_center
    }

    pub fn history(&self) -> &CenterHistory {
        &self.history
    }

    /// Compares `center` against the last accepted position. State only
    /// advances when the displacement exceeds [`BODY_MOVEMENT_THRESHOLD`].
    pub fn update(&mut self, center: Point) -> (Movement, Option<Vec<Point>>) {
        let Some(previous) = self.previous_center else {
            self.previous_center = Some(center);
            return (Movement::NoMovement, None);
        };

        let dx = f64::from(center.x()) - f64::from(previous.x());
        let dy = f64::from(center.y()) - f64::from(previous.y());
        if dx.hypot(dy) <= BODY_MOVEMENT_THRESHOLD {
            return (Movement::NoMovement, None);
        }

        self.previous_center = Some(center);
        self.history.push(center);
        (movement_direction(dx, dy), Some(self.history.snapshot()))
    }
}

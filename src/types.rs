use image::RgbImage;
use serde::{Deserialize, Serialize};

/// A captured video frame as packed 8-bit RGB. Timing is owned by the
/// session, which stamps each record when the frame is processed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    pub rgb: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl Frame {
    pub fn new(rgb: Vec<u8>, width: u32, height: u32) -> Self {
        Self { rgb, width, height }
    }

    /// Solid black frame, mostly useful for tests and dry runs.
    pub fn blank(width: u32, height: u32) -> Self {
        Self::new(vec![0u8; width as usize * height as usize * 3], width, height)
    }

    pub fn from_image(image: RgbImage) -> Self {
        let (width, height) = image.dimensions();
        Self::new(image.into_raw(), width, height)
    }

    pub fn expected_len(&self) -> usize {
        (self.width as usize)
            .saturating_mul(self.height as usize)
            .saturating_mul(3)
    }

    /// Copies the pixels under `region` into a standalone image.
    pub fn crop(&self, region: FaceRegion) -> Option<RgbImage> {
        if region.width == 0
            || region.height == 0
            || region.x + region.width > self.width
            || region.y + region.height > self.height
            || self.rgb.len() < self.expected_len()
        {
            return None;
        }

        let src_stride = self.width as usize * 3;
        let row_len = region.width as usize * 3;
        let mut out = Vec::with_capacity(row_len * region.height as usize);
        for row in region.y..region.y + region.height {
            let offset = row as usize * src_stride + region.x as usize * 3;
            out.extend_from_slice(&self.rgb[offset..offset + row_len]);
        }
        RgbImage::from_raw(region.width, region.height, out)
    }
}

/// Pixel rectangle inside a frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FaceRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Detector keypoint in normalized image coordinates. `z` is carried but unused.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Landmark {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y, z: 0.0 }
    }
}

/// Normalized 2-D position, serialized as `[x, y]`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Point(pub f32, pub f32);

impl Point {
    pub fn x(&self) -> f32 {
        self.0
    }

    pub fn y(&self) -> f32 {
        self.1
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GazeZone {
    Left,
    Right,
    Up,
    Down,
    Center,
    #[default]
    Unknown,
}

impl GazeZone {
    pub fn label(&self) -> &'static str {
        match self {
            GazeZone::Left => "left",
            GazeZone::Right => "right",
            GazeZone::Up => "up",
            GazeZone::Down => "down",
            GazeZone::Center => "center",
            GazeZone::Unknown => "unknown",
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Movement {
    #[serde(rename = "up")]
    Up,
    #[serde(rename = "down")]
    Down,
    #[serde(rename = "left")]
    Left,
    #[serde(rename = "right")]
    Right,
    #[default]
    #[serde(rename = "No Movement")]
    NoMovement,
}

impl Movement {
    pub fn label(&self) -> &'static str {
        match self {
            Movement::Up => "up",
            Movement::Down => "down",
            Movement::Left => "left",
            Movement::Right => "right",
            Movement::NoMovement => "No Movement",
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Emotion {
    Angry,
    Disgust,
    Fear,
    Happy,
    Sad,
    Surprise,
    Neutral,
    #[default]
    Unknown,
}

impl Emotion {
    /// Classifier output order.
    pub const LABELS: [Emotion; 7] = [
        Emotion::Angry,
        Emotion::Disgust,
        Emotion::Fear,
        Emotion::Happy,
        Emotion::Sad,
        Emotion::Surprise,
        Emotion::Neutral,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Emotion::Angry => "Angry",
            Emotion::Disgust => "Disgust",
            Emotion::Fear => "Fear",
            Emotion::Happy => "Happy",
            Emotion::Sad => "Sad",
            Emotion::Surprise => "Surprise",
            Emotion::Neutral => "Neutral",
            Emotion::Unknown => "Unknown",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub label: String,
    pub confidence: f32,
    /// `[x1, y1, x2, y2]` in frame pixels.
    #[serde(rename = "box")]
    pub bbox: [i32; 4],
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct FaceFrameResult {
    pub gaze_zone: GazeZone,
    pub blink: bool,
    pub yaw: f32,
    pub pitch: f32,
    pub roll: f32,
    pub landmarks: Option<Vec<Landmark>>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct BodyFrameResult {
    pub movement: Movement,
    pub recent_centers: Option<Vec<Point>>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EyeTracking {
    pub direction: GazeZone,
    pub blink_detected: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HeadTracking {
    pub yaw: f32,
    pub pitch: f32,
    pub roll: f32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BodyTracking {
    pub movement: Movement,
    pub position_history: Option<Vec<Point>>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EmotionRecord {
    pub detected_emotion: Emotion,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Detections {
    pub yolo: Vec<Detection>,
}

/// Everything recorded for a single processed frame.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FrameRecord {
    /// Seconds since the session started.
    pub timestamp: f64,
    pub eye_tracking: EyeTracking,
    pub head_tracking: HeadTracking,
    pub body_tracking: BodyTracking,
    pub emotion: EmotionRecord,
    pub detections: Detections,
}

impl FrameRecord {
    pub fn new(
        timestamp: f64,
        face: &FaceFrameResult,
        body: &BodyFrameResult,
        emotion: Emotion,
        detections: Vec<Detection>,
    ) -> Self {
        Self {
            timestamp,
            eye_tracking: EyeTracking {
                direction: face.gaze_zone,
                blink_detected: face.blink,
            },
            head_tracking: HeadTracking {
                yaw: face.yaw,
                pitch: face.pitch,
                roll: face.roll,
            },
            body_tracking: BodyTracking {
                movement: body.movement,
                position_history: body.recent_centers.clone(),
            },
            emotion: EmotionRecord {
                detected_emotion: emotion,
            },
            detections: Detections { yolo: detections },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_are_plain_pixel_data() {
        let decoded = Frame::from_image(RgbImage::new(2, 1));
        assert_eq!(decoded, Frame::blank(2, 1));
        assert_eq!(decoded, Frame::new(vec![0; 6], 2, 1));
    }

    #[test]
    fn default_record_serializes_with_documented_field_names() {
        let record = FrameRecord::new(
            0.5,
            &FaceFrameResult::default(),
            &BodyFrameResult::default(),
            Emotion::Unknown,
            Vec::new(),
        );
        let value = serde_json::to_value(&record).unwrap();

        assert_eq!(value["timestamp"], 0.5);
        assert_eq!(value["eye_tracking"]["direction"], "unknown");
        assert_eq!(value["eye_tracking"]["blink_detected"], false);
        assert_eq!(value["head_tracking"]["yaw"], 0.0);
        assert_eq!(value["body_tracking"]["movement"], "No Movement");
        assert!(value["body_tracking"]["position_history"].is_null());
        assert_eq!(value["emotion"]["detected_emotion"], "Unknown");
        assert_eq!(value["detections"]["yolo"], serde_json::json!([]));
    }

    #[test]
    fn detection_box_and_history_points_are_arrays() {
        let body = BodyFrameResult {
            movement: Movement::Right,
            recent_centers: Some(vec![Point(0.5, 0.25)]),
        };
        let detections = vec![Detection {
            label: "person".to_string(),
            confidence: 0.5,
            bbox: [1, 2, 30, 40],
        }];
        let record = FrameRecord::new(
            1.0,
            &FaceFrameResult::default(),
            &body,
            Emotion::Happy,
            detections,
        );
        let value = serde_json::to_value(&record).unwrap();

        assert_eq!(value["body_tracking"]["movement"], "right");
        assert_eq!(
            value["body_tracking"]["position_history"],
            serde_json::json!([[0.5, 0.25]])
        );
        assert_eq!(
            value["detections"]["yolo"][0]["box"],
            serde_json::json!([1, 2, 30, 40])
        );
        assert_eq!(value["emotion"]["detected_emotion"], "Happy");

        let back: FrameRecord = serde_json::from_value(value).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn crop_copies_requested_rows() {
        let mut frame = Frame::blank(4, 3);
        // pixel (2, 1) -> red
        let idx = (1 * 4 + 2) * 3;
        frame.rgb[idx] = 255;

        let crop = frame
            .crop(FaceRegion {
                x: 1,
                y: 1,
                width: 2,
                height: 2,
            })
            .unwrap();
        assert_eq!(crop.dimensions(), (2, 2));
        assert_eq!(crop.get_pixel(1, 0).0, [255, 0, 0]);
        assert_eq!(crop.get_pixel(0, 0).0, [0, 0, 0]);
    }

    #[test]
    fn crop_rejects_out_of_bounds_or_empty() {
        let frame = Frame::blank(4, 3);
        let oob = FaceRegion {
            x: 3,
            y: 0,
            width: 2,
            height: 1,
        };
        let empty = FaceRegion {
            x: 0,
            y: 0,
            width: 0,
            height: 3,
        };
        assert!(frame.crop(oob).is_none());
        assert!(frame.crop(empty).is_none());
    }
}

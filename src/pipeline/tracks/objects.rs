use std::{cmp::Ordering, path::Path};

use anyhow::{Context, Result, anyhow};
use ort::session::Session;
use ort::value::Tensor;

use super::common::{self, LetterboxInfo, TensorLayout};
use crate::types::{Detection, Frame};

pub const YOLO_INPUT_SIZE: u32 = 640;
const YOLO_PAD_VALUE: u8 = 114;
const BOX_FEATURES: usize = 4;

pub const COCO_CLASSES: [&str; 80] = [
    "person",
    "bicycle",
    "car",
    "motorcycle",
    "airplane",
    "bus",
    "train",
    "truck",
    "boat",
    "traffic light",
    "fire hydrant",
    "stop sign",
    "parking meter",
    "bench",
    "bird",
    "cat",
    "dog",
    "horse",
    "sheep",
    "cow",
    "elephant",
    "bear",
    "zebra",
    "giraffe",
    "backpack",
    "umbrella",
    "handbag",
    "tie",
    "suitcase",
    "frisbee",
    "skis",
    "snowboard",
    "sports ball",
    "kite",
    "baseball bat",
    "baseball glove",
    "skateboard",
    "surfboard",
    "tennis racket",
    "bottle",
    "wine glass",
    "cup",
    "fork",
    "knife",
    "spoon",
    "bowl",
    "banana",
    "apple",
    "sandwich",
    "orange",
    "broccoli",
    "carrot",
    "hot dog",
    "pizza",
    "donut",
    "cake",
    "chair",
    "couch",
    "potted plant",
    "bed",
    "dining table",
    "toilet",
    "tv",
    "laptop",
    "mouse",
    "remote",
    "keyboard",
    "cell phone",
    "microwave",
    "oven",
    "toaster",
    "sink",
    "refrigerator",
    "book",
    "clock",
    "vase",
    "scissors",
    "teddy bear",
    "hair drier",
    "toothbrush",
];

/// Detector output before it is turned into a recorded [`Detection`].
#[derive(Clone, Debug, PartialEq)]
pub struct RawDetection {
    pub class_name: String,
    pub confidence: f32,
    /// `[x1, y1, x2, y2]` in frame pixels.
    pub xyxy: [f32; 4],
}

pub trait ObjectDetector: Send {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<RawDetection>>;
}

/// Whole-frame object detection. Every detector output is kept; callers
/// apply their own confidence or label filters.
pub struct ObjectTrack {
    detector: Box<dyn ObjectDetector>,
}

impl ObjectTrack {
    pub fn new(detector: impl ObjectDetector + 'static) -> Self {
        Self {
            detector: Box::new(detector),
        }
    }

    pub fn process(&mut self, frame: &Frame) -> Result<Vec<Detection>> {
        let raw = self.detector.detect(frame)?;
        Ok(raw.into_iter().map(to_detection).collect())
    }
}

fn to_detection(raw: RawDetection) -> Detection {
    Detection {
        label: raw.class_name,
        confidence: raw.confidence,
        bbox: raw.xyxy.map(|v| v as i32),
    }
}

#[derive(Clone, Debug)]
pub struct YoloConfig {
    pub score_threshold: f32,
    pub nms_threshold: f32,
    pub max_detections: usize,
}

impl Default for YoloConfig {
    fn default() -> Self {
        Self {
            score_threshold: 0.25,
            nms_threshold: 0.7,
            max_detections: 300,
        }
    }
}

/// YOLOv8 exported to ONNX: one output shaped `[1, 4 + classes, anchors]`.
pub struct OrtObjectDetector {
    session: Session,
    cfg: YoloConfig,
}

impl OrtObjectDetector {
    pub fn new(model_path: &Path, cfg: YoloConfig) -> Result<Self> {
        let session = common::build_session(model_path)?;
        Ok(Self { session, cfg })
    }
}

impl ObjectDetector for OrtObjectDetector {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<RawDetection>> {
        let (input, letterbox) =
            common::letterbox_frame(frame, YOLO_INPUT_SIZE, TensorLayout::Nchw, YOLO_PAD_VALUE)?;
        let tensor = Tensor::from_array(input)?;
        let outputs = self
            .session
            .run(ort::inputs![tensor])
            .context("failed to run object detector session")?;

        if outputs.len() < 1 {
            return Err(anyhow!("object detector returned no outputs"));
        }

        let predictions = outputs[0].try_extract_array::<f32>()?;
        let shape = predictions.shape().to_vec();
        let flattened: Vec<f32> = predictions.iter().copied().collect();

        decode_yolo_output(&flattened, &shape, &letterbox, &self.cfg)
    }
}

#[derive(Clone, Debug)]
struct Candidate {
    bbox: [f32; 4],
    class_id: usize,
    score: f32,
}

pub fn decode_yolo_output(
    data: &[f32],
    shape: &[usize],
    letterbox: &LetterboxInfo,
    cfg: &YoloConfig,
) -> Result<Vec<RawDetection>> {
    if shape.len() != 3 {
        return Err(anyhow!(
            "unexpected detector output shape {:?}, need [batch, features, anchors]",
            shape
        ));
    }
    let features = shape[1];
    let anchors = shape[2];
    if features <= BOX_FEATURES {
        return Err(anyhow!("detector feature dimension too small: {features}"));
    }
    if data.len() < features * anchors {
        return Err(anyhow!(
            "detector output too short: got {}, need {}",
            data.len(),
            features * anchors
        ));
    }

    let value = |feature: usize, anchor: usize| data[feature * anchors + anchor];
    let num_classes = features - BOX_FEATURES;

    let mut candidates = Vec::new();
    for anchor in 0..anchors {
        let mut class_id = 0;
        let mut score = f32::MIN;
        for class in 0..num_classes {
            let s = value(BOX_FEATURES + class, anchor);
            if s > score {
                score = s;
                class_id = class;
            }
        }
        if score < cfg.score_threshold {
            continue;
        }

        let cx = value(0, anchor);
        let cy = value(1, anchor);
        let hw = value(2, anchor) / 2.0;
        let hh = value(3, anchor) / 2.0;

        let (mut x1, mut y1) = letterbox.to_frame(cx - hw, cy - hh);
        let (mut x2, mut y2) = letterbox.to_frame(cx + hw, cy + hh);
        clamp_box(
            &mut x1,
            &mut y1,
            &mut x2,
            &mut y2,
            letterbox.orig_w,
            letterbox.orig_h,
        );
        if x2 <= x1 || y2 <= y1 {
            continue;
        }

        candidates.push(Candidate {
            bbox: [x1, y1, x2, y2],
            class_id,
            score,
        });
    }

    let kept = nms(&candidates, cfg.nms_threshold, cfg.max_detections);
    Ok(kept
        .into_iter()
        .map(|idx| {
            let c = &candidates[idx];
            RawDetection {
                class_name: class_name(c.class_id),
                confidence: c.score.clamp(0.0, 1.0),
                xyxy: c.bbox,
            }
        })
        .collect())
}

fn class_name(class_id: usize) -> String {
    COCO_CLASSES
        .get(class_id)
        .map(|name| name.to_string())
        .unwrap_or_else(|| format!("class_{class_id}"))
}

/// Per-class suppression, highest score first.
fn nms(candidates: &[Candidate], threshold: f32, top_k: usize) -> Vec<usize> {
    let mut order: Vec<usize> = (0..candidates.len()).collect();
    order.sort_by(|a, b| {
        candidates[*b]
            .score
            .partial_cmp(&candidates[*a].score)
            .unwrap_or(Ordering::Equal)
    });

    let mut keep: Vec<usize> = Vec::new();
    'outer: for &idx in &order {
        for &k in &keep {
            if candidates[idx].class_id == candidates[k].class_id
                && iou(&candidates[idx].bbox, &candidates[k].bbox) > threshold
            {
                continue 'outer;
            }
        }
        keep.push(idx);
        if keep.len() >= top_k {
            break;
        }
    }
    keep
}

fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
    let x1 = a[0].max(b[0]);
    let y1 = a[1].max(b[1]);
    let x2 = a[2].min(b[2]);
    let y2 = a[3].min(b[3]);

    let inter = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    if inter <= 0.0 {
        return 0.0;
    }

    let area_a = (a[2] - a[0]).max(0.0) * (a[3] - a[1]).max(0.0);
    let area_b = (b[2] - b[0]).max(0.0) * (b[3] - b[1]).max(0.0);
    let union = area_a + area_b - inter;
    if union <= 0.0 { 0.0 } else { inter / union }
}

fn clamp_box(x1: &mut f32, y1: &mut f32, x2: &mut f32, y2: &mut f32, w: u32, h: u32) {
    let max_w = w as f32;
    let max_h = h as f32;
    *x1 = x1.clamp(0.0, max_w);
    *y1 = y1.clamp(0.0, max_h);
    *x2 = x2.clamp(0.0, max_w);
    *y2 = y2.clamp(0.0, max_h);
}

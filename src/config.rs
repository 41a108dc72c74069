use std::path::PathBuf;

use clap::Parser;

use crate::{
    model_download::{DEFAULT_MODELS_DIR, ModelKind, default_model_path},
    session::EmotionFailurePolicy,
    store::DEFAULT_OUTPUT_PATH,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Records eye, head, body, object and emotion signals from a webcam", long_about = None)]
pub struct Args {
    /// Camera index (default 0)
    #[arg(short, long, default_value_t = 0)]
    pub camera: u32,

    /// Replay png/jpeg frames from this directory instead of a camera
    #[arg(long, value_name = "DIR")]
    pub frames_dir: Option<PathBuf>,

    /// Where the session JSON is written
    #[arg(short, long, default_value = DEFAULT_OUTPUT_PATH)]
    pub output: PathBuf,

    /// Directory holding the ONNX models
    #[arg(long, default_value = DEFAULT_MODELS_DIR)]
    pub models_dir: PathBuf,

    #[arg(long, value_name = "PATH")]
    pub face_model: Option<PathBuf>,

    #[arg(long, value_name = "PATH")]
    pub pose_model: Option<PathBuf>,

    #[arg(long, value_name = "PATH")]
    pub object_model: Option<PathBuf>,

    #[arg(long, value_name = "PATH")]
    pub emotion_model: Option<PathBuf>,

    /// Download the face model from here when it is missing
    #[arg(long, value_name = "URL")]
    pub face_model_url: Option<String>,

    #[arg(long, value_name = "URL")]
    pub pose_model_url: Option<String>,

    #[arg(long, value_name = "URL")]
    pub object_model_url: Option<String>,

    #[arg(long, value_name = "URL")]
    pub emotion_model_url: Option<String>,

    /// Stop after this many frames
    #[arg(long)]
    pub max_frames: Option<usize>,

    /// Save the last annotated frame as a PNG
    #[arg(long, value_name = "PATH")]
    pub snapshot: Option<PathBuf>,

    /// End the session when emotion classification fails
    #[arg(long, default_value_t = false)]
    pub abort_on_emotion_error: bool,

    /// Do not watch stdin for `q`
    #[arg(long, default_value_t = false)]
    pub no_quit_listener: bool,

    /// List available cameras and exit
    #[arg(long)]
    pub list_cameras: bool,
}

impl Args {
    pub fn model_path(&self, kind: ModelKind) -> PathBuf {
        let explicit = match kind {
            ModelKind::FaceLandmarker => &self.face_model,
            ModelKind::PoseLandmarker => &self.pose_model,
            ModelKind::ObjectDetector => &self.object_model,
            ModelKind::EmotionClassifier => &self.emotion_model,
        };
        explicit
            .clone()
            .unwrap_or_else(|| default_model_path(&self.models_dir, kind))
    }

    pub fn model_url(&self, kind: ModelKind) -> Option<&str> {
        match kind {
            ModelKind::FaceLandmarker => self.face_model_url.as_deref(),
            ModelKind::PoseLandmarker => self.pose_model_url.as_deref(),
            ModelKind::ObjectDetector => self.object_model_url.as_deref(),
            ModelKind::EmotionClassifier => self.emotion_model_url.as_deref(),
        }
    }

    pub fn emotion_policy(&self) -> EmotionFailurePolicy {
        if self.abort_on_emotion_error {
            EmotionFailurePolicy::Abort
        } else {
            EmotionFailurePolicy::SkipAndDefault
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let args = Args::parse_from(["interview-tracker"]);
        assert_eq!(args.camera, 0);
        assert_eq!(args.output, PathBuf::from(DEFAULT_OUTPUT_PATH));
        assert_eq!(args.max_frames, None);
        assert_eq!(args.emotion_policy(), EmotionFailurePolicy::SkipAndDefault);
        assert_eq!(
            args.model_path(ModelKind::ObjectDetector),
            PathBuf::from("models").join("yolov8n.onnx")
        );
        assert_eq!(args.model_url(ModelKind::FaceLandmarker), None);
    }

    #[test]
    fn overrides() {
        let args = Args::parse_from([
            "interview-tracker",
            "--camera",
            "2",
            "--frames-dir",
            "recording",
            "--models-dir",
            "weights",
            "--emotion-model",
            "/tmp/fer.onnx",
            "--pose-model-url",
            "https://example.com/pose.onnx",
            "--max-frames",
            "30",
            "--abort-on-emotion-error",
        ]);
        assert_eq!(args.camera, 2);
        assert_eq!(args.frames_dir, Some(PathBuf::from("recording")));
        assert_eq!(args.max_frames, Some(30));
        assert_eq!(args.emotion_policy(), EmotionFailurePolicy::Abort);
        assert_eq!(
            args.model_path(ModelKind::EmotionClassifier),
            PathBuf::from("/tmp/fer.onnx")
        );
        assert_eq!(
            args.model_path(ModelKind::FaceLandmarker),
            PathBuf::from("weights").join("face_landmark.onnx")
        );
        assert_eq!(
            args.model_url(ModelKind::PoseLandmarker),
            Some("https://example.com/pose.onnx")
        );
    }
}

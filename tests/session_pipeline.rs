use std::{
    collections::VecDeque,
    path::PathBuf,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

use anyhow::{Result, anyhow};
use ndarray::Array4;

use interview_tracker::{
    control::QuitSignal,
    pipeline::{
        FrameSource,
        tracks::{
            BodyTrack, EmotionClassifier, EmotionTrack, FaceLandmarker, FaceTrack,
            ObjectDetector, ObjectTrack, PoseLandmarker, RawDetection, Tracks,
        },
    },
    session::{
        EmotionFailurePolicy, FramePresenter, FrameView, PipelineState, SessionPipeline,
        TerminationReason,
    },
    store::SessionStore,
    types::{Emotion, Frame, GazeZone, Landmark, Movement, Point},
};

const WIDTH: u32 = 64;
const HEIGHT: u32 = 48;

struct NoFace;

impl FaceLandmarker for NoFace {
    fn detect(&mut self, _frame: &Frame) -> Result<Option<Vec<Landmark>>> {
        Ok(None)
    }
}

/// A full mesh whose landmarks span the middle half of the frame.
struct CenteredFace;

impl FaceLandmarker for CenteredFace {
    fn detect(&mut self, _frame: &Frame) -> Result<Option<Vec<Landmark>>> {
        let mut mesh = vec![Landmark::new(0.5, 0.5); 468];
        mesh[0] = Landmark::new(0.25, 0.25);
        mesh[10] = Landmark::new(0.75, 0.75);
        Ok(Some(mesh))
    }
}

struct BrokenFace;

impl FaceLandmarker for BrokenFace {
    fn detect(&mut self, _frame: &Frame) -> Result<Option<Vec<Landmark>>> {
        Err(anyhow!("face presence output unreadable"))
    }
}

struct NoBody;

impl PoseLandmarker for NoBody {
    fn detect(&mut self, _frame: &Frame) -> Result<Option<Vec<Landmark>>> {
        Ok(None)
    }
}

/// Torso centers replayed one per frame.
struct ScriptedBody(VecDeque<Point>);

impl PoseLandmarker for ScriptedBody {
    fn detect(&mut self, _frame: &Frame) -> Result<Option<Vec<Landmark>>> {
        let Some(center) = self.0.pop_front() else {
            return Ok(None);
        };
        Ok(Some(vec![Landmark::new(center.x(), center.y()); 33]))
    }
}

struct NoObjects;

impl ObjectDetector for NoObjects {
    fn detect(&mut self, _frame: &Frame) -> Result<Vec<RawDetection>> {
        Ok(Vec::new())
    }
}

struct OnePhone;

impl ObjectDetector for OnePhone {
    fn detect(&mut self, _frame: &Frame) -> Result<Vec<RawDetection>> {
        Ok(vec![RawDetection {
            class_name: "cell phone".into(),
            confidence: 0.62,
            xyxy: [10.7, 4.2, 30.9, 20.5],
        }])
    }
}

/// Always answers with the given class; counts how often it was asked.
struct FixedEmotion {
    class: usize,
    calls: Arc<AtomicUsize>,
}

impl EmotionClassifier for FixedEmotion {
    fn predict(&mut self, input: &Array4<f32>) -> Result<Vec<f32>> {
        assert_eq!(input.shape(), &[1, 64, 64, 1]);
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut scores = vec![0.0; 7];
        scores[self.class] = 1.0;
        Ok(scores)
    }
}

struct BrokenEmotion;

impl EmotionClassifier for BrokenEmotion {
    fn predict(&mut self, _input: &Array4<f32>) -> Result<Vec<f32>> {
        Err(anyhow!("emotion model exploded"))
    }
}

struct BlankFrames(usize);

impl FrameSource for BlankFrames {
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self.0 == 0 {
            return Ok(None);
        }
        self.0 -= 1;
        Ok(Some(Frame::blank(WIDTH, HEIGHT)))
    }
}

struct FailingSource;

impl FrameSource for FailingSource {
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        Err(anyhow!("camera unplugged"))
    }
}

#[derive(Clone, Default)]
struct CountingPresenter {
    presented: Arc<AtomicUsize>,
    finished: Arc<AtomicUsize>,
}

impl FramePresenter for CountingPresenter {
    fn present(&mut self, _frame: &mut Frame, _view: &FrameView<'_>) -> Result<()> {
        self.presented.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.finished.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn output_path(name: &str) -> PathBuf {
    let path = std::env::temp_dir()
        .join(format!("interview-tracker-it-{}", std::process::id()))
        .join(name)
        .join("session.json");
    let _ = std::fs::remove_file(&path);
    path
}

fn quiet_tracks() -> Tracks {
    Tracks {
        face: FaceTrack::new(NoFace),
        body: BodyTrack::new(NoBody),
        objects: ObjectTrack::new(NoObjects),
        emotion: EmotionTrack::new(FixedEmotion {
            class: 3,
            calls: Arc::default(),
        }),
    }
}

#[test]
fn empty_scene_records_defaults_for_every_frame() {
    let path = output_path("empty-scene");
    let mut pipeline = SessionPipeline::new(quiet_tracks(), SessionStore::new(&path));

    let summary = pipeline
        .run(&mut BlankFrames(3), &mut QuitSignal::never())
        .unwrap();

    assert_eq!(summary.frames, 3);
    assert_eq!(summary.reason, TerminationReason::EndOfStream);
    assert_eq!(
        pipeline.state(),
        PipelineState::Terminated(TerminationReason::EndOfStream)
    );

    let records = SessionStore::load(&path).unwrap();
    assert_eq!(records.len(), 3);
    for record in &records {
        assert_eq!(record.eye_tracking.direction, GazeZone::Unknown);
        assert!(!record.eye_tracking.blink_detected);
        assert_eq!(record.head_tracking.yaw, 0.0);
        assert_eq!(record.body_tracking.movement, Movement::NoMovement);
        assert_eq!(record.body_tracking.position_history, None);
        assert_eq!(record.emotion.detected_emotion, Emotion::Unknown);
        assert!(record.detections.yolo.is_empty());
    }
    assert!(records[0].timestamp >= 0.0 && records[0].timestamp < 0.5);
    assert!(records.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));

    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(json[0]["body_tracking"]["movement"], "No Movement");
    assert_eq!(json[0]["eye_tracking"]["direction"], "unknown");
    assert_eq!(json[0]["detections"]["yolo"], serde_json::json!([]));
}

#[test]
fn visible_face_gets_an_emotion_and_objects_are_recorded() {
    let path = output_path("face");
    let calls = Arc::new(AtomicUsize::new(0));
    let tracks = Tracks {
        face: FaceTrack::new(CenteredFace),
        body: BodyTrack::new(NoBody),
        objects: ObjectTrack::new(OnePhone),
        emotion: EmotionTrack::new(FixedEmotion {
            class: 3,
            calls: calls.clone(),
        }),
    };
    let mut pipeline = SessionPipeline::new(tracks, SessionStore::new(&path));

    pipeline
        .run(&mut BlankFrames(2), &mut QuitSignal::never())
        .unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 2);
    let records = SessionStore::load(&path).unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].emotion.detected_emotion, Emotion::Happy);
    assert_ne!(records[0].eye_tracking.direction, GazeZone::Unknown);

    let phone = &records[1].detections.yolo[0];
    assert_eq!(phone.label, "cell phone");
    assert_eq!(phone.bbox, [10, 4, 30, 20]);
}

#[test]
fn body_history_only_appears_on_movement() {
    let path = output_path("body");
    let centers = [
        Point(0.5, 0.5),
        Point(0.5078125, 0.5),
        Point(0.5625, 0.5),
        Point(0.5, 0.5),
    ];
    let tracks = Tracks {
        body: BodyTrack::new(ScriptedBody(centers.into_iter().collect())),
        ..quiet_tracks()
    };
    let mut pipeline = SessionPipeline::new(tracks, SessionStore::new(&path));

    pipeline
        .run(&mut BlankFrames(4), &mut QuitSignal::never())
        .unwrap();

    let moves: Vec<_> = pipeline
        .store()
        .records()
        .iter()
        .map(|r| r.body_tracking.movement)
        .collect();
    assert_eq!(
        moves,
        vec![
            Movement::NoMovement,
            Movement::NoMovement,
            Movement::Right,
            Movement::Left
        ]
    );

    let records = pipeline.store().records();
    assert_eq!(records[1].body_tracking.position_history, None);
    assert_eq!(
        records[2].body_tracking.position_history,
        Some(vec![Point(0.5625, 0.5)])
    );
    assert_eq!(
        records[3].body_tracking.position_history,
        Some(vec![Point(0.5625, 0.5), Point(0.5, 0.5)])
    );
}

#[test]
fn quit_request_stops_between_frames() {
    let path = output_path("quit");
    let presenter = CountingPresenter::default();
    let mut pipeline = SessionPipeline::new(quiet_tracks(), SessionStore::new(&path))
        .with_presenter(presenter.clone());

    let (handle, mut quit) = QuitSignal::channel();
    let mut source = BlankFrames(10);
    pipeline.process_frame(source.next_frame().unwrap().unwrap()).unwrap();
    handle.request();

    let summary = pipeline.run(&mut source, &mut quit).unwrap();

    assert_eq!(summary.reason, TerminationReason::QuitRequested);
    assert_eq!(summary.frames, 1);
    assert_eq!(presenter.presented.load(Ordering::SeqCst), 1);
    assert_eq!(presenter.finished.load(Ordering::SeqCst), 1);
    assert_eq!(SessionStore::load(&path).unwrap().len(), 1);

    assert!(pipeline.run(&mut source, &mut quit).is_err());
    assert_eq!(presenter.finished.load(Ordering::SeqCst), 1);
}

#[test]
fn frame_limit_ends_the_session() {
    let path = output_path("limit");
    let mut pipeline =
        SessionPipeline::new(quiet_tracks(), SessionStore::new(&path)).with_max_frames(Some(2));

    let summary = pipeline
        .run(&mut BlankFrames(5), &mut QuitSignal::never())
        .unwrap();

    assert_eq!(summary.reason, TerminationReason::FrameLimit);
    assert_eq!(SessionStore::load(&path).unwrap().len(), 2);
}

#[test]
fn emotion_failure_defaults_to_unknown() {
    let path = output_path("emotion-skip");
    let tracks = Tracks {
        face: FaceTrack::new(CenteredFace),
        emotion: EmotionTrack::new(BrokenEmotion),
        ..quiet_tracks()
    };
    let mut pipeline = SessionPipeline::new(tracks, SessionStore::new(&path));

    pipeline
        .run(&mut BlankFrames(2), &mut QuitSignal::never())
        .unwrap();

    let records = SessionStore::load(&path).unwrap();
    assert_eq!(records.len(), 2);
    assert!(
        records
            .iter()
            .all(|r| r.emotion.detected_emotion == Emotion::Unknown)
    );
}

#[test]
fn emotion_failure_can_abort_and_still_saves() {
    let path = output_path("emotion-abort");
    let tracks = Tracks {
        face: FaceTrack::new(CenteredFace),
        emotion: EmotionTrack::new(BrokenEmotion),
        ..quiet_tracks()
    };
    let mut pipeline = SessionPipeline::new(tracks, SessionStore::new(&path))
        .with_emotion_policy(EmotionFailurePolicy::Abort);

    let err = pipeline
        .run(&mut BlankFrames(2), &mut QuitSignal::never())
        .unwrap_err();

    assert!(format!("{err:#}").contains("emotion model exploded"));
    assert_eq!(
        pipeline.state(),
        PipelineState::Terminated(TerminationReason::Aborted)
    );
    assert!(SessionStore::load(&path).unwrap().is_empty());
}

#[test]
fn source_failure_flushes_what_was_recorded() {
    let path = output_path("source-failure");
    let mut pipeline = SessionPipeline::new(quiet_tracks(), SessionStore::new(&path));
    pipeline.process_frame(Frame::blank(WIDTH, HEIGHT)).unwrap();

    let err = pipeline
        .run(&mut FailingSource, &mut QuitSignal::never())
        .unwrap_err();

    assert!(format!("{err:#}").contains("camera unplugged"));
    assert_eq!(SessionStore::load(&path).unwrap().len(), 1);
}

#[test]
fn face_model_failure_is_not_recorded_as_no_face() {
    let path = output_path("face-failure");
    let tracks = Tracks {
        face: FaceTrack::new(BrokenFace),
        ..quiet_tracks()
    };
    let mut pipeline = SessionPipeline::new(tracks, SessionStore::new(&path));

    let err = pipeline
        .run(&mut BlankFrames(3), &mut QuitSignal::never())
        .unwrap_err();

    assert!(format!("{err:#}").contains("face presence output unreadable"));
    assert_eq!(
        pipeline.state(),
        PipelineState::Terminated(TerminationReason::Aborted)
    );
    assert!(SessionStore::load(&path).unwrap().is_empty());
}

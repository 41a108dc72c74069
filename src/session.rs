//! Per-frame fusion of the perception tracks into session records.

use std::{path::PathBuf, time::Instant};

use anyhow::{Result, bail};

use crate::{
    control::QuitSignal,
    pipeline::{FrameSource, tracks::Tracks},
    store::SessionStore,
    types::{
        BodyFrameResult, Detection, Emotion, FaceFrameResult, FaceRegion, Frame, FrameRecord,
        Landmark,
    },
};

/// What the presentation layer gets to see for each processed frame.
#[derive(Clone, Copy, Debug)]
pub struct FrameView<'a> {
    pub face: &'a FaceFrameResult,
    pub body: &'a BodyFrameResult,
    pub detections: &'a [Detection],
    pub emotion: Emotion,
    pub face_region: Option<FaceRegion>,
}

pub trait FramePresenter {
    fn present(&mut self, frame: &mut Frame, view: &FrameView<'_>) -> Result<()>;

    /// Called once after the session is flushed.
    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Presenter that shows nothing.
#[derive(Debug, Default)]
pub struct NullPresenter;

impl FramePresenter for NullPresenter {
    fn present(&mut self, _frame: &mut Frame, _view: &FrameView<'_>) -> Result<()> {
        Ok(())
    }
}

/// What to do when the emotion model fails on a face crop.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum EmotionFailurePolicy {
    /// Log the failure and record `Unknown` for the frame.
    #[default]
    SkipAndDefault,
    /// End the session with the error.
    Abort,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TerminationReason {
    EndOfStream,
    QuitRequested,
    FrameLimit,
    Aborted,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineState {
    Running,
    Terminated(TerminationReason),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionSummary {
    pub frames: usize,
    pub output_path: PathBuf,
    pub reason: TerminationReason,
}

/// Pixel bounding box of all landmarks, clamped to the frame. `None` when
/// there are no landmarks or the box has no area.
pub fn face_region(landmarks: &[Landmark], width: u32, height: u32) -> Option<FaceRegion> {
    if landmarks.is_empty() {
        return None;
    }

    let (min_x, max_x, min_y, max_y) = landmarks.iter().fold(
        (f32::MAX, f32::MIN, f32::MAX, f32::MIN),
        |acc, lm| {
            (
                acc.0.min(lm.x),
                acc.1.max(lm.x),
                acc.2.min(lm.y),
                acc.3.max(lm.y),
            )
        },
    );

    let to_pixel = |v: f32, extent: u32| {
        ((f64::from(v) * f64::from(extent)) as i64).clamp(0, i64::from(extent)) as u32
    };
    let clamp_x = |v: f32| to_pixel(v, width);
    let clamp_y = |v: f32| to_pixel(v, height);
    let (x1, x2) = (clamp_x(min_x), clamp_x(max_x));
    let (y1, y2) = (clamp_y(min_y), clamp_y(max_y));

    if x2 <= x1 || y2 <= y1 {
        return None;
    }

    Some(FaceRegion {
        x: x1,
        y: y1,
        width: x2 - x1,
        height: y2 - y1,
    })
}

/// Runs every track on each frame, records the merged result and hands the
/// frame on for display. Flushes the store exactly once, when it terminates.
pub struct SessionPipeline {
    tracks: Tracks,
    store: SessionStore,
    presenter: Box<dyn FramePresenter>,
    emotion_policy: EmotionFailurePolicy,
    max_frames: Option<usize>,
    session_start: Instant,
    state: PipelineState,
}

impl SessionPipeline {
    pub fn new(tracks: Tracks, store: SessionStore) -> Self {
        Self {
            tracks,
            store,
            presenter: Box::new(NullPresenter),
            emotion_policy: EmotionFailurePolicy::default(),
            max_frames: None,
            session_start: Instant::now(),
            state: PipelineState::Running,
        }
    }

    pub fn with_presenter(mut self, presenter: impl FramePresenter + 'static) -> Self {
        self.presenter = Box::new(presenter);
        self
    }

    pub fn with_emotion_policy(mut self, policy: EmotionFailurePolicy) -> Self {
        self.emotion_policy = policy;
        self
    }

    pub fn with_max_frames(mut self, max_frames: Option<usize>) -> Self {
        self.max_frames = max_frames;
        self
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    /// Processes frames until the source runs dry, a quit is requested or the
    /// frame limit is hit. The quit signal is only checked between frames.
    pub fn run(
        &mut self,
        source: &mut dyn FrameSource,
        quit: &mut QuitSignal,
    ) -> Result<SessionSummary> {
        if self.state != PipelineState::Running {
            bail!("session already terminated");
        }
        if self.store.is_empty() {
            self.session_start = Instant::now();
        }

        let reason = loop {
            if quit.poll() {
                break TerminationReason::QuitRequested;
            }
            if self.max_frames.is_some_and(|max| self.store.len() >= max) {
                break TerminationReason::FrameLimit;
            }

            let frame = match source.next_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => break TerminationReason::EndOfStream,
                Err(err) => return Err(self.abort(err.context("frame source failed"))),
            };

            if let Err(err) = self.process_frame(frame) {
                return Err(self.abort(err));
            }
        };

        self.terminate(reason)
    }

    /// Runs all tracks on one frame and appends the merged record.
    pub fn process_frame(&mut self, mut frame: Frame) -> Result<&FrameRecord> {
        if self.state != PipelineState::Running {
            bail!("session already terminated");
        }

        let face = self.tracks.face.process(&frame)?;
        let body = self.tracks.body.process(&frame)?;
        let detections = self.tracks.objects.process(&frame)?;

        let region = face
            .landmarks
            .as_deref()
            .and_then(|landmarks| face_region(landmarks, frame.width, frame.height));
        let emotion = self.detect_emotion(&frame, region)?;

        let timestamp = self.session_start.elapsed().as_secs_f64();
        let record = self.store.append(FrameRecord::new(
            timestamp, &face, &body, emotion, detections,
        ));

        let view = FrameView {
            face: &face,
            body: &body,
            detections: &record.detections.yolo,
            emotion,
            face_region: region,
        };
        if let Err(err) = self.presenter.present(&mut frame, &view) {
            log::warn!("failed to present frame: {err:?}");
        }

        Ok(record)
    }

    fn detect_emotion(&mut self, frame: &Frame, region: Option<FaceRegion>) -> Result<Emotion> {
        let Some(crop) = region.and_then(|region| frame.crop(region)) else {
            return Ok(Emotion::Unknown);
        };

        match self.tracks.emotion.classify(&crop) {
            Ok(emotion) => Ok(emotion),
            Err(err) => match self.emotion_policy {
                EmotionFailurePolicy::SkipAndDefault => {
                    log::warn!("emotion skipped for frame: {err}");
                    Ok(Emotion::Unknown)
                }
                EmotionFailurePolicy::Abort => Err(err.into()),
            },
        }
    }

    fn terminate(&mut self, reason: TerminationReason) -> Result<SessionSummary> {
        self.state = PipelineState::Terminated(reason);
        let output_path = self.store.flush()?;
        log::info!(
            "session ended ({reason:?}); {} frames saved to {}",
            self.store.len(),
            output_path.display()
        );

        if let Err(err) = self.presenter.finish() {
            log::warn!("presenter failed to finish: {err:?}");
        }

        Ok(SessionSummary {
            frames: self.store.len(),
            output_path,
            reason,
        })
    }

    /// Flushes what was recorded so far and hands back the error that ended
    /// the session.
    fn abort(&mut self, err: anyhow::Error) -> anyhow::Error {
        log::error!("session aborted: {err:?}");
        match self.terminate(TerminationReason::Aborted) {
            Ok(_) => err,
            Err(flush_err) => err.context(format!("session flush also failed: {flush_err:#}")),
        }
    }
}

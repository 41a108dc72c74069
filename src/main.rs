use anyhow::{Context, Result};
use clap::Parser;

use interview_tracker::{
    config::Args,
    control::{self, QuitSignal},
    model_download::{ModelDownloadEvent, ModelKind, ensure_model_ready},
    pipeline::{
        DirectorySource, FrameSource, OverlayPresenter,
        tracks::{
            BodyTrack, EmotionTrack, FaceTrack, ObjectTrack, OrtEmotionClassifier,
            OrtFaceLandmarker, OrtObjectDetector, OrtPoseLandmarker, Tracks, YoloConfig,
        },
    },
    session::SessionPipeline,
    store::SessionStore,
};

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    if args.list_cameras {
        return list_cameras();
    }

    let tracks = build_tracks(&args)?;
    let mut source = open_source(&args)?;

    let mut quit = if args.no_quit_listener {
        QuitSignal::never()
    } else {
        println!("Type q and press Enter to end the session.");
        control::spawn_stdin_listener()
    };

    let mut pipeline = SessionPipeline::new(tracks, SessionStore::new(&args.output))
        .with_presenter(OverlayPresenter::new(args.snapshot.clone()))
        .with_emotion_policy(args.emotion_policy())
        .with_max_frames(args.max_frames);

    let summary = pipeline.run(source.as_mut(), &mut quit)?;
    println!(
        "Saved {} frames to {}",
        summary.frames,
        summary.output_path.display()
    );
    Ok(())
}

fn model_path(args: &Args, kind: ModelKind) -> Result<std::path::PathBuf> {
    let path = args.model_path(kind);
    ensure_model_ready(kind, &path, args.model_url(kind), |event| {
        if let ModelDownloadEvent::AlreadyPresent { model } = event {
            log::debug!("{} model found at {}", model.label(), path.display());
        }
    })?;
    Ok(path)
}

fn build_tracks(args: &Args) -> Result<Tracks> {
    let face = OrtFaceLandmarker::new(&model_path(args, ModelKind::FaceLandmarker)?)
        .context("failed to load face landmarker")?;
    let pose = OrtPoseLandmarker::new(&model_path(args, ModelKind::PoseLandmarker)?)
        .context("failed to load pose landmarker")?;
    let objects = OrtObjectDetector::new(
        &model_path(args, ModelKind::ObjectDetector)?,
        YoloConfig::default(),
    )
    .context("failed to load object detector")?;
    let emotion = OrtEmotionClassifier::new(&model_path(args, ModelKind::EmotionClassifier)?)
        .context("failed to load emotion classifier")?;

    Ok(Tracks {
        face: FaceTrack::new(face),
        body: BodyTrack::new(pose),
        objects: ObjectTrack::new(objects),
        emotion: EmotionTrack::new(emotion),
    })
}

fn open_source(args: &Args) -> Result<Box<dyn FrameSource>> {
    if let Some(dir) = &args.frames_dir {
        return Ok(Box::new(DirectorySource::open(dir)?));
    }
    open_camera(args.camera)
}

#[cfg(feature = "camera-nokhwa")]
fn open_camera(index: u32) -> Result<Box<dyn FrameSource>> {
    let camera = interview_tracker::pipeline::CameraSource::open(index)
        .with_context(|| format!("failed to open camera {index}"))?;
    Ok(Box::new(camera))
}

#[cfg(not(feature = "camera-nokhwa"))]
fn open_camera(index: u32) -> Result<Box<dyn FrameSource>> {
    anyhow::bail!(
        "camera {index} requested but this build has no camera support; \
         rebuild with --features camera-nokhwa or pass --frames-dir"
    )
}

#[cfg(feature = "camera-nokhwa")]
fn list_cameras() -> Result<()> {
    let cameras = interview_tracker::pipeline::available_cameras()?;
    if cameras.is_empty() {
        println!("No cameras found.");
    }
    for camera in cameras {
        println!("{}: {}", camera.index, camera.label);
    }
    Ok(())
}

#[cfg(not(feature = "camera-nokhwa"))]
fn list_cameras() -> Result<()> {
    anyhow::bail!("this build has no camera support; rebuild with --features camera-nokhwa")
}

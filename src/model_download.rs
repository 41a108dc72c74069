use std::{
    fs,
    io::{Read, Write},
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, bail};
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::blocking::Client;

pub const DEFAULT_MODELS_DIR: &str = "models";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModelKind {
    FaceLandmarker,
    PoseLandmarker,
    ObjectDetector,
    EmotionClassifier,
}

impl ModelKind {
    pub const ALL: [ModelKind; 4] = [
        ModelKind::FaceLandmarker,
        ModelKind::PoseLandmarker,
        ModelKind::ObjectDetector,
        ModelKind::EmotionClassifier,
    ];

    pub fn label(self) -> &'static str {
        match self {
            ModelKind::FaceLandmarker => "face landmarker",
            ModelKind::PoseLandmarker => "pose landmarker",
            ModelKind::ObjectDetector => "object detector",
            ModelKind::EmotionClassifier => "emotion classifier",
        }
    }

    pub fn default_file_name(self) -> &'static str {
        match self {
            ModelKind::FaceLandmarker => "face_landmark.onnx",
            ModelKind::PoseLandmarker => "pose_landmark_full.onnx",
            ModelKind::ObjectDetector => "yolov8n.onnx",
            ModelKind::EmotionClassifier => "fer2013_mini_XCEPTION.onnx",
        }
    }
}

pub fn default_model_path(models_dir: &Path, kind: ModelKind) -> PathBuf {
    models_dir.join(kind.default_file_name())
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ModelDownloadEvent {
    AlreadyPresent {
        model: ModelKind,
    },
    Started {
        model: ModelKind,
        total: Option<u64>,
    },
    Progress {
        model: ModelKind,
        downloaded: u64,
        total: Option<u64>,
    },
    Finished {
        model: ModelKind,
    },
}

/// Makes sure `model_path` exists, fetching it from `url` when it is missing.
/// Without a URL a missing model is an error naming the expected path.
pub fn ensure_model_ready<F>(
    model: ModelKind,
    model_path: &Path,
    url: Option<&str>,
    mut on_event: F,
) -> anyhow::Result<()>
where
    F: FnMut(ModelDownloadEvent),
{
    if model_path.exists() {
        on_event(ModelDownloadEvent::AlreadyPresent { model });
        on_event(ModelDownloadEvent::Finished { model });
        return Ok(());
    }

    let Some(url) = url else {
        bail!(
            "{} model not found at {} and no download URL was given",
            model.label(),
            model_path.display()
        );
    };

    if let Some(parent) = model_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create model directory {}", parent.display()))?;
    }

    let mut progress: Option<ProgressBar> = None;
    download_to_path(model, url, model_path, &mut |event| {
        match &event {
            ModelDownloadEvent::Started { total, .. } => {
                progress = Some(create_progress_bar(*total));
            }
            ModelDownloadEvent::Progress { downloaded, .. } => {
                if let Some(pb) = progress.as_ref() {
                    pb.set_position(*downloaded);
                }
            }
            ModelDownloadEvent::Finished { model } => {
                if let Some(pb) = progress.take() {
                    pb.finish_with_message(format!("{} model ready", model.label()));
                }
            }
            ModelDownloadEvent::AlreadyPresent { .. } => {}
        }
        on_event(event);
    })
    .with_context(|| {
        format!(
            "failed to download {} model to {}",
            model.label(),
            model_path.display()
        )
    })
}

fn download_to_path<F>(
    model: ModelKind,
    url: &str,
    dest: &Path,
    on_event: &mut F,
) -> anyhow::Result<()>
where
    F: FnMut(ModelDownloadEvent),
{
    log::info!(
        "downloading {} model from {url} to {}",
        model.label(),
        dest.display()
    );

    let client = Client::new();
    let mut response = client
        .get(url)
        .send()
        .context("failed to start model download")?
        .error_for_status()
        .context("model download returned error status")?;

    let total_size = response.content_length();
    on_event(ModelDownloadEvent::Started {
        model,
        total: total_size,
    });

    // partial downloads never sit at the final path
    let tmp_path = dest.with_extension("download");
    let mut file = fs::File::create(&tmp_path)
        .with_context(|| format!("failed to create {}", tmp_path.display()))?;

    let mut downloaded: u64 = 0;
    let mut buffer = [0u8; 16 * 1024];
    loop {
        let bytes_read = response
            .read(&mut buffer)
            .context("failed while reading model bytes")?;
        if bytes_read == 0 {
            break;
        }

        file.write_all(&buffer[..bytes_read])
            .context("failed while writing model to disk")?;
        downloaded += bytes_read as u64;
        on_event(ModelDownloadEvent::Progress {
            model,
            downloaded,
            total: total_size,
        });
    }

    file.sync_all()
        .context("failed to flush downloaded model to disk")?;
    fs::rename(&tmp_path, dest).with_context(|| {
        format!(
            "failed to move temp model {} into place at {}",
            tmp_path.display(),
            dest.display()
        )
    })?;

    on_event(ModelDownloadEvent::Finished { model });
    Ok(())
}

fn create_progress_bar(total_size: Option<u64>) -> ProgressBar {
    match total_size {
        Some(total) if total > 0 => {
            let pb = ProgressBar::new(total);
            let style = ProgressStyle::with_template(
                "{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {bytes}/{total_bytes} ({eta})",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=>-");
            pb.set_style(style);
            pb
        }
        _ => {
            let pb = ProgressBar::new_spinner();
            let style = ProgressStyle::with_template("{spinner:.green} downloading model")
                .unwrap_or_else(|_| ProgressStyle::default_spinner());
            pb.set_style(style);
            pb.enable_steady_tick(Duration::from_millis(100));
            pb
        }
    }
}

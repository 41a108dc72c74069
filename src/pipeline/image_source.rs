use std::{
    collections::VecDeque,
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, anyhow};

use super::FrameSource;
use crate::types::Frame;

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg"];

/// Replays the still images of a directory, in file-name order, as a video
/// stream. Useful for offline runs and reproducing a session.
#[derive(Debug)]
pub struct DirectorySource {
    pending: VecDeque<PathBuf>,
}

impl DirectorySource {
    pub fn open(dir: &Path) -> Result<Self> {
        let mut paths: Vec<PathBuf> = fs::read_dir(dir)
            .with_context(|| format!("failed to list frames in {}", dir.display()))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| is_image(path))
            .collect();
        paths.sort();

        if paths.is_empty() {
            return Err(anyhow!("no png/jpeg frames found in {}", dir.display()));
        }
        log::info!("replaying {} frames from {}", paths.len(), dir.display());

        Ok(Self {
            pending: paths.into(),
        })
    }

    pub fn remaining(&self) -> usize {
        self.pending.len()
    }
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            IMAGE_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
        .unwrap_or(false)
}

impl FrameSource for DirectorySource {
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        let Some(path) = self.pending.pop_front() else {
            return Ok(None);
        };
        let image = image::open(&path)
            .with_context(|| format!("failed to read frame {}", path.display()))?
            .to_rgb8();
        Ok(Some(Frame::from_image(image)))
    }
}

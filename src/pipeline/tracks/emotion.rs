use std::path::Path;

use anyhow::{Context, Result, anyhow};
use image::{RgbImage, imageops::FilterType};
use ndarray::Array4;
use ort::session::Session;
use ort::value::Tensor;
use thiserror::Error;

use super::common;
use crate::types::Emotion;

pub const EMOTION_INPUT_SIZE: u32 = 64;

/// Per-crop failures, kept distinct so the caller decides skip vs abort.
#[derive(Debug, Error)]
pub enum EmotionError {
    #[error("face region is empty")]
    EmptyRegion,
    #[error("failed to preprocess face region: {0}")]
    Preprocess(String),
    #[error("emotion inference failed: {0:#}")]
    Inference(anyhow::Error),
}

/// Seven-way facial expression model over a `[1, 64, 64, 1]` grayscale tensor.
pub trait EmotionClassifier: Send {
    fn predict(&mut self, input: &Array4<f32>) -> Result<Vec<f32>>;
}

pub struct EmotionTrack {
    classifier: Box<dyn EmotionClassifier>,
}

impl EmotionTrack {
    pub fn new(classifier: impl EmotionClassifier + 'static) -> Self {
        Self {
            classifier: Box::new(classifier),
        }
    }

    pub fn classify(&mut self, face: &RgbImage) -> Result<Emotion, EmotionError> {
        let input = preprocess(face)?;
        self.classify_tensor(&input)
    }

    pub fn classify_tensor(&mut self, input: &Array4<f32>) -> Result<Emotion, EmotionError> {
        let scores = self
            .classifier
            .predict(input)
            .map_err(EmotionError::Inference)?;
        if scores.len() < Emotion::LABELS.len() {
            return Err(EmotionError::Inference(anyhow!(
                "expected {} scores, got {}",
                Emotion::LABELS.len(),
                scores.len()
            )));
        }

        // first maximum wins; NaN never does
        let mut best = 0;
        for (idx, score) in scores.iter().enumerate().take(Emotion::LABELS.len()) {
            if *score > scores[best] {
                best = idx;
            }
        }
        Ok(Emotion::LABELS[best])
    }
}

/// Grayscale, 64x64, intensities scaled to `[0, 1]`.
pub fn preprocess(face: &RgbImage) -> Result<Array4<f32>, EmotionError> {
    if face.width() == 0 || face.height() == 0 {
        return Err(EmotionError::EmptyRegion);
    }

    let gray = image::imageops::grayscale(face);
    let resized = image::imageops::resize(
        &gray,
        EMOTION_INPUT_SIZE,
        EMOTION_INPUT_SIZE,
        FilterType::Triangle,
    );
    let side = EMOTION_INPUT_SIZE as usize;
    let normalized: Vec<f32> = resized
        .into_raw()
        .into_iter()
        .map(|v| v as f32 / 255.0)
        .collect();

    Array4::from_shape_vec((1, side, side, 1), normalized)
        .map_err(|err| EmotionError::Preprocess(err.to_string()))
}

pub struct OrtEmotionClassifier {
    session: Session,
}

impl OrtEmotionClassifier {
    pub fn new(model_path: &Path) -> Result<Self> {
        let session = common::build_session(model_path).with_context(|| {
            format!(
                "failed to load emotion classifier from {}",
                model_path.display()
            )
        })?;
        Ok(Self { session })
    }
}

impl EmotionClassifier for OrtEmotionClassifier {
    fn predict(&mut self, input: &Array4<f32>) -> Result<Vec<f32>> {
        let tensor = Tensor::from_array(input.clone())?;
        let outputs = self
            .session
            .run(ort::inputs![tensor])
            .context("failed to run emotion classifier session")?;

        if outputs.len() < 1 {
            return Err(anyhow!("emotion classifier returned no outputs"));
        }

        let scores = outputs[0].try_extract_array::<f32>()?;
        Ok(scores.iter().copied().collect())
    }
}

use std::path::Path;

use anyhow::{Context, Result, anyhow};
use fast_image_resize as fir;
use ndarray::Array4;
use ort::session::{Session, builder::GraphOptimizationLevel};
use rayon::prelude::*;

use crate::types::{Frame, Landmark};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TensorLayout {
    /// `[1, H, W, 3]`, the MediaPipe convention.
    Nhwc,
    /// `[1, 3, H, W]`, the YOLO convention.
    Nchw,
}

#[derive(Clone, Debug)]
pub struct LetterboxInfo {
    pub scale: f32,
    pub pad_x: f32,
    pub pad_y: f32,
    pub orig_w: u32,
    pub orig_h: u32,
}

impl LetterboxInfo {
    /// Maps a point in model-input pixels back to frame pixels.
    pub fn to_frame(&self, x: f32, y: f32) -> (f32, f32) {
        ((x - self.pad_x) / self.scale, (y - self.pad_y) / self.scale)
    }

    /// Maps a point in model-input pixels to normalized frame coordinates.
    pub fn to_normalized(&self, x: f32, y: f32, z: f32) -> Landmark {
        let (fx, fy) = self.to_frame(x, y);
        Landmark {
            x: fx / self.orig_w.max(1) as f32,
            y: fy / self.orig_h.max(1) as f32,
            z: z / self.scale / self.orig_w.max(1) as f32,
        }
    }
}

pub fn build_session(model_path: &Path) -> Result<Session> {
    let session = Session::builder()?
        .with_optimization_level(GraphOptimizationLevel::Level3)?
        .with_intra_threads(2)?
        .commit_from_file(model_path)
        .with_context(|| format!("failed to load ORT session from {}", model_path.display()))?;
    Ok(session)
}

/// Resizes the frame to fit a `target_size` square, pads the rest with
/// `pad_value` and scales intensities to `[0, 1]`.
pub fn letterbox_frame(
    frame: &Frame,
    target_size: u32,
    layout: TensorLayout,
    pad_value: u8,
) -> Result<(Array4<f32>, LetterboxInfo)> {
    let expected_len = frame.expected_len();
    if frame.rgb.len() != expected_len || expected_len == 0 {
        return Err(anyhow!(
            "frame buffer size mismatch: got {}, expected {}",
            frame.rgb.len(),
            expected_len
        ));
    }

    let scale = target_size as f32 / (frame.width.max(frame.height) as f32);
    let new_w = ((frame.width as f32 * scale).round().max(1.0) as u32).min(target_size);
    let new_h = ((frame.height as f32 * scale).round().max(1.0) as u32).min(target_size);

    let src_image = fir::images::Image::from_vec_u8(
        frame.width,
        frame.height,
        frame.rgb.clone(),
        fir::PixelType::U8x3,
    )?;
    let mut dst_image = fir::images::Image::new(new_w, new_h, fir::PixelType::U8x3);
    let mut resizer = fir::Resizer::new();
    let resize_options = fir::ResizeOptions::new()
        .resize_alg(fir::ResizeAlg::Interpolation(fir::FilterType::Bilinear));
    resizer
        .resize(&src_image, &mut dst_image, Some(&resize_options))
        .context("fast resize failed")?;
    let resized = dst_image.into_vec();

    let pad_x = ((target_size - new_w) / 2) as usize;
    let pad_y = ((target_size - new_h) / 2) as usize;
    let side = target_size as usize;
    let mut canvas = vec![pad_value; side * side * 3];
    let dst_stride = side * 3;
    let src_stride = new_w as usize * 3;
    for row in 0..(new_h as usize) {
        let dst_offset = (pad_y + row) * dst_stride + pad_x * 3;
        let src_offset = row * src_stride;
        canvas[dst_offset..dst_offset + src_stride]
            .copy_from_slice(&resized[src_offset..src_offset + src_stride]);
    }

    let normalized: Vec<f32> = canvas.par_iter().map(|&v| v as f32 / 255.0).collect();
    let hwc = Array4::<f32>::from_shape_vec((1, side, side, 3), normalized)
        .map_err(|err| anyhow!("failed to build input tensor: {err}"))?;
    let input = match layout {
        TensorLayout::Nhwc => hwc,
        TensorLayout::Nchw => hwc
            .permuted_axes([0, 3, 1, 2])
            .as_standard_layout()
            .into_owned(),
    };

    let letterbox = LetterboxInfo {
        scale,
        pad_x: pad_x as f32,
        pad_y: pad_y as f32,
        orig_w: frame.width,
        orig_h: frame.height,
    };

    Ok((input, letterbox))
}

/// Splits a flat model output into `[x, y, z]` triples, `stride` values per
/// landmark.
pub fn decode_landmarks(flat: &[f32], stride: usize, count: usize) -> Result<Vec<[f32; 3]>> {
    if stride < 3 {
        return Err(anyhow!("landmark stride {stride} too small"));
    }
    if flat.len() < count * stride {
        return Err(anyhow!(
            "unexpected landmarks length: got {}, need {}",
            flat.len(),
            count * stride
        ));
    }

    Ok(flat
        .chunks_exact(stride)
        .map(|chunk| [chunk[0], chunk[1], chunk[2]])
        .collect())
}

pub fn normalize_landmarks(raw: &[[f32; 3]], letterbox: &LetterboxInfo) -> Vec<Landmark> {
    raw.iter()
        .map(|&[x, y, z]| letterbox.to_normalized(x, y, z))
        .collect()
}

pub fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// First value of a presence output. `None` for an empty or non-finite
/// output, which callers treat as a failed inference rather than "absent".
pub fn presence_score(values: impl IntoIterator<Item = f32>) -> Option<f32> {
    values.into_iter().next().filter(|score| score.is_finite())
}

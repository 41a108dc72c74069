use std::path::PathBuf;

use anyhow::{Context, Result};
use image::RgbImage;

use crate::{
    geometry::FaceKeypoints,
    session::{FramePresenter, FrameView},
    types::{FaceRegion, Frame, Point},
};

const BOX_THICKNESS: i32 = 3;
const KEYPOINT_RADIUS: i32 = 3;
const TRAIL_THICKNESS: i32 = 2;

const FACE_BOX_COLOR: [u8; 3] = [239, 68, 68];
const KEYPOINT_COLOR: [u8; 3] = [34, 197, 94];
const DETECTION_COLOR: [u8; 3] = [59, 130, 246];
const TRAIL_COLOR: [u8; 3] = [250, 204, 21];

/// Draws the per-frame signals onto the frame and logs a status line. The
/// last annotated frame can be written out as a PNG when the session ends.
#[derive(Debug, Default)]
pub struct OverlayPresenter {
    snapshot_path: Option<PathBuf>,
    last_frame: Option<Frame>,
}

impl OverlayPresenter {
    pub fn new(snapshot_path: Option<PathBuf>) -> Self {
        Self {
            snapshot_path,
            last_frame: None,
        }
    }
}

impl FramePresenter for OverlayPresenter {
    fn present(&mut self, frame: &mut Frame, view: &FrameView<'_>) -> Result<()> {
        draw_view(frame, view);
        log::debug!("{}", status_line(view));

        if self.snapshot_path.is_some() {
            self.last_frame = Some(frame.clone());
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        let (Some(path), Some(frame)) = (self.snapshot_path.as_ref(), self.last_frame.take())
        else {
            return Ok(());
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create snapshot directory {}", parent.display()))?;
        }
        let image = RgbImage::from_raw(frame.width, frame.height, frame.rgb)
            .context("annotated frame has an inconsistent buffer size")?;
        image
            .save(path)
            .with_context(|| format!("failed to write snapshot {}", path.display()))?;
        log::info!("saved annotated snapshot to {}", path.display());
        Ok(())
    }
}

pub fn status_line(view: &FrameView<'_>) -> String {
    format!(
        "eye={} blink={} yaw={:.1} pitch={:.1} roll={:.1} body={} emotion={} objects={}",
        view.face.gaze_zone.label(),
        if view.face.blink { "YES" } else { "NO" },
        view.face.yaw,
        view.face.pitch,
        view.face.roll,
        view.body.movement.label(),
        view.emotion.label(),
        view.detections.len()
    )
}

pub fn draw_view(frame: &mut Frame, view: &FrameView<'_>) {
    let (width, height) = (frame.width, frame.height);
    let buffer = frame.rgb.as_mut_slice();

    for detection in view.detections {
        let [x1, y1, x2, y2] = detection.bbox;
        draw_rect(
            buffer,
            width,
            height,
            (x1 as f32, y1 as f32),
            (x2 as f32, y2 as f32),
            DETECTION_COLOR,
            BOX_THICKNESS,
        );
    }

    if let Some(region) = view.face_region {
        draw_face_box(buffer, width, height, region);
    }

    if let Some(keypoints) = view
        .face
        .landmarks
        .as_deref()
        .and_then(FaceKeypoints::from_mesh)
    {
        let points = [
            keypoints.left_eye_outer,
            keypoints.right_eye_outer,
            keypoints.left_eye_upper,
            keypoints.left_eye_lower,
            keypoints.right_eye_upper,
            keypoints.right_eye_lower,
            keypoints.nose_tip,
            keypoints.chin,
        ];
        for lm in points {
            let center = (
                (lm.x * width as f32) as i32,
                (lm.y * height as f32) as i32,
            );
            draw_circle(buffer, width, height, center, KEYPOINT_RADIUS, KEYPOINT_COLOR);
        }
    }

    if let Some(trail) = &view.body.recent_centers {
        draw_trail(buffer, width, height, trail);
    }
}

fn draw_face_box(buffer: &mut [u8], width: u32, height: u32, region: FaceRegion) {
    let x1 = region.x as f32;
    let y1 = region.y as f32;
    let x2 = (region.x + region.width) as f32;
    let y2 = (region.y + region.height) as f32;
    draw_rect(
        buffer,
        width,
        height,
        (x1, y1),
        (x2, y2),
        FACE_BOX_COLOR,
        BOX_THICKNESS,
    );
}

fn draw_trail(buffer: &mut [u8], width: u32, height: u32, trail: &[Point]) {
    let to_pixel = |p: &Point| (p.x() * width as f32, p.y() * height as f32);
    for pair in trail.windows(2) {
        draw_line(
            buffer,
            width,
            height,
            to_pixel(&pair[0]),
            to_pixel(&pair[1]),
            TRAIL_COLOR,
            TRAIL_THICKNESS,
        );
    }
    if let Some(last) = trail.last() {
        let (x, y) = to_pixel(last);
        draw_circle(
            buffer,
            width,
            height,
            (x as i32, y as i32),
            KEYPOINT_RADIUS,
            TRAIL_COLOR,
        );
    }
}

fn draw_rect(
    buffer: &mut [u8],
    width: u32,
    height: u32,
    top_left: (f32, f32),
    bottom_right: (f32, f32),
    color: [u8; 3],
    thickness: i32,
) {
    let (x1, y1) = top_left;
    let (x2, y2) = bottom_right;
    let corners = [(x1, y1), (x2, y1), (x2, y2), (x1, y2)];
    for i in 0..corners.len() {
        let next = corners[(i + 1) % corners.len()];
        draw_line(buffer, width, height, corners[i], next, color, thickness);
    }
}

fn draw_line(
    buffer: &mut [u8],
    width: u32,
    height: u32,
    p0: (f32, f32),
    p1: (f32, f32),
    color: [u8; 3],
    thickness: i32,
) {
    let (mut x0, mut y0) = (p0.0 as i32, p0.1 as i32);
    let (x1, y1) = (p1.0 as i32, p1.1 as i32);
    let dx = (x1 - x0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let dy = -(y1 - y0).abs();
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;
    let radius = (thickness.max(1) - 1) / 2;

    loop {
        for ox in -radius..=radius {
            for oy in -radius..=radius {
                if ox.abs() + oy.abs() <= radius {
                    put_pixel_safe(buffer, width, height, x0 + ox, y0 + oy, color);
                }
            }
        }
        if x0 == x1 && y0 == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x0 += sx;
        }
        if e2 <= dx {
            err += dx;
            y0 += sy;
        }
    }
}

fn draw_circle(
    buffer: &mut [u8],
    width: u32,
    height: u32,
    center: (i32, i32),
    radius: i32,
    color: [u8; 3],
) {
    let (cx, cy) = center;
    for dy in -radius..=radius {
        for dx in -radius..=radius {
            if dx * dx + dy * dy <= radius * radius {
                put_pixel_safe(buffer, width, height, cx + dx, cy + dy, color);
            }
        }
    }
}

fn put_pixel_safe(buffer: &mut [u8], width: u32, height: u32, x: i32, y: i32, color: [u8; 3]) {
    if x < 0 || y < 0 {
        return;
    }
    let (ux, uy) = (x as u32, y as u32);
    if ux >= width || uy >= height {
        return;
    }
    let idx = (uy as usize * width as usize + ux as usize) * 3;
    if idx + 2 < buffer.len() {
        buffer[idx..idx + 3].copy_from_slice(&color);
    }
}

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::Instant,
};

use anyhow::{Result, anyhow};
use nokhwa::{
    Buffer, Camera,
    pixel_format::RgbFormat,
    query,
    utils::{
        ApiBackend, CameraIndex, CameraInfo, FrameFormat, RequestedFormat, RequestedFormatType,
    },
};

use super::{
    FrameSource,
    frame_channel::{
        ChannelSource, FRAME_TIMEOUT, FrameSender, MAX_CONSECUTIVE_READ_FAILURES, ReadFailures,
        deliver_error, frame_channel, offer_frame,
    },
    frame_decoder::{self, PixelFormat},
};
use crate::types::Frame;

// Prefer pixel formats that are widely supported on macOS (the built-in cameras
// often reject YUYV even though Nokhwa reports it).
const PREFERRED_PIXEL_FORMATS: &[FrameFormat] = &[
    FrameFormat::RAWRGB,
    FrameFormat::RAWBGR,
    FrameFormat::GRAY,
    FrameFormat::YUYV,
    FrameFormat::NV12,
    FrameFormat::MJPEG,
];

fn requested_formats() -> [RequestedFormat<'static>; 4] {
    [
        RequestedFormat::with_formats(
            RequestedFormatType::AbsoluteHighestFrameRate,
            PREFERRED_PIXEL_FORMATS,
        ),
        RequestedFormat::with_formats(
            RequestedFormatType::AbsoluteHighestResolution,
            PREFERRED_PIXEL_FORMATS,
        ),
        RequestedFormat::new::<RgbFormat>(RequestedFormatType::AbsoluteHighestFrameRate),
        RequestedFormat::new::<RgbFormat>(RequestedFormatType::None),
    ]
}

#[derive(Clone, Debug)]
pub struct CameraDevice {
    pub index: u32,
    pub label: String,
}

pub fn available_cameras() -> Result<Vec<CameraDevice>> {
    let cameras = query(ApiBackend::Auto)?;
    Ok(cameras
        .into_iter()
        .filter_map(|info| {
            let index = info.index().as_index().ok()?;
            Some(CameraDevice {
                index,
                label: format_camera_label(&info),
            })
        })
        .collect())
}

fn format_camera_label(info: &CameraInfo) -> String {
    info.human_name()
}

fn build_camera(index: CameraIndex) -> Result<Camera> {
    let mut last_err = None;

    for requested in requested_formats() {
        match Camera::new(index.clone(), requested) {
            Ok(mut camera) => match camera.open_stream() {
                Ok(()) => return Ok(camera),
                Err(err) => last_err = Some(err.into()),
            },
            Err(err) => last_err = Some(err.into()),
        }
    }

    Err(last_err.unwrap_or_else(|| anyhow!("failed to open camera with any supported format")))
}

fn pixel_format(format: FrameFormat) -> PixelFormat {
    match format {
        FrameFormat::NV12 => PixelFormat::Nv12,
        FrameFormat::YUYV => PixelFormat::Yuyv,
        FrameFormat::MJPEG => PixelFormat::Mjpeg,
        FrameFormat::RAWRGB => PixelFormat::Rgb,
        FrameFormat::RAWBGR => PixelFormat::Bgr,
        FrameFormat::GRAY => PixelFormat::Gray,
    }
}

fn decode_buffer(buffer: &Buffer) -> Result<Frame> {
    let resolution = buffer.resolution();
    frame_decoder::decode_frame(
        pixel_format(buffer.source_frame_format()),
        buffer.buffer(),
        resolution.width_x,
        resolution.height_y,
    )
}

/// Live webcam feed. Frames are captured on a background thread and handed
/// over through a single-slot channel, so the session always sees a recent
/// frame and slow processing drops frames instead of queueing them. Device
/// failures on that thread reach the session as errors.
#[derive(Debug)]
pub struct CameraSource {
    frames: ChannelSource,
    stop: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl CameraSource {
    pub fn open(index: u32) -> Result<Self> {
        let index = CameraIndex::Index(index);
        // Fail fast before spawning the capture thread.
        drop(build_camera(index.clone())?);

        let (frame_tx, frames) = frame_channel(FRAME_TIMEOUT);
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = stop.clone();

        let handle = thread::spawn(move || capture_loop(index, frame_tx, stop_flag));
        log::info!("camera capture started");

        Ok(Self {
            frames,
            stop,
            handle: Some(handle),
        })
    }
}

fn capture_loop(index: CameraIndex, frame_tx: FrameSender, stop_flag: Arc<AtomicBool>) {
    let mut camera = match build_camera(index) {
        Ok(cam) => cam,
        Err(err) => {
            log::error!("failed to open camera: {err:?}");
            deliver_error(&frame_tx, err.context("failed to open camera"), &stop_flag);
            return;
        }
    };

    let mut failures = ReadFailures::new(MAX_CONSECUTIVE_READ_FAILURES);
    while !stop_flag.load(Ordering::Relaxed) {
        let frame_start = Instant::now();
        let buffer = match camera.frame() {
            Ok(buffer) => buffer,
            Err(err) => {
                log::warn!(
                    "camera frame read failed (after {:?}): {err:?}",
                    frame_start.elapsed()
                );
                if failures.failed() {
                    deliver_error(
                        &frame_tx,
                        anyhow!(
                            "camera read failed {} times in a row: {err}",
                            failures.consecutive()
                        ),
                        &stop_flag,
                    );
                    break;
                }
                continue;
            }
        };
        failures.succeeded();

        let frame = match decode_buffer(&buffer) {
            Ok(frame) => frame,
            Err(err) => {
                log::warn!("failed to decode camera frame {err:?}");
                continue;
            }
        };

        if !offer_frame(&frame_tx, frame) {
            break;
        }
    }

    if let Err(err) = camera.stop_stream() {
        log::warn!("failed to stop camera stream: {err:?}");
    }
}

impl FrameSource for CameraSource {
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        self.frames.next_frame()
    }
}

impl Drop for CameraSource {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

use std::convert::TryFrom;

use anyhow::{Result, anyhow};
use rayon::prelude::*;
use yuv::{
    YuvBiPlanarImage, YuvConversionMode, YuvPackedImage, YuvRange, YuvStandardMatrix,
    yuv_nv12_to_rgb, yuyv422_to_rgb,
};
use zune_jpeg::{
    JpegDecoder,
    zune_core::{bytestream::ZCursor, colorspace::ColorSpace, options::DecoderOptions},
};

use crate::types::Frame;

/// Raw buffer layouts a capture device may hand us.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PixelFormat {
    Nv12,
    Yuyv,
    Mjpeg,
    Rgb,
    Bgr,
    Gray,
}

/// Decodes one capture buffer into a packed RGB [`Frame`].
pub fn decode_frame(format: PixelFormat, data: &[u8], width: u32, height: u32) -> Result<Frame> {
    let (rgb, width, height) = match format {
        PixelFormat::Nv12 => (nv12_to_rgb(data, width, height)?, width, height),
        PixelFormat::Yuyv => (yuyv_to_rgb(data, width, height)?, width, height),
        PixelFormat::Mjpeg => mjpeg_to_rgb(data)?,
        PixelFormat::Rgb => (packed_to_rgb(data, width, height, false)?, width, height),
        PixelFormat::Bgr => (packed_to_rgb(data, width, height, true)?, width, height),
        PixelFormat::Gray => (gray_to_rgb(data, width, height)?, width, height),
    };

    Ok(Frame::new(rgb, width, height))
}

fn nv12_to_rgb(data: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    let y_plane_len = width as usize * height as usize;
    let uv_plane_len = y_plane_len / 2;

    if data.len() < y_plane_len + uv_plane_len {
        return Err(anyhow!(
            "NV12 buffer too small: got {}, expected {}",
            data.len(),
            y_plane_len + uv_plane_len
        ));
    }

    let image = YuvBiPlanarImage {
        y_plane: &data[..y_plane_len],
        y_stride: width,
        uv_plane: &data[y_plane_len..y_plane_len + uv_plane_len],
        uv_stride: width,
        width,
        height,
    };
    let mut rgb = vec![0u8; y_plane_len * 3];

    yuv_nv12_to_rgb(
        &image,
        &mut rgb,
        width * 3,
        YuvRange::Full,
        YuvStandardMatrix::Bt709,
        YuvConversionMode::Balanced,
    )
    .map_err(|err| anyhow!("NV12→RGB failed: {err:?}"))?;

    Ok(rgb)
}

fn yuyv_to_rgb(data: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    let expected_len = width as usize * height as usize * 2;
    if data.len() < expected_len {
        return Err(anyhow!(
            "YUYV buffer too small: got {}, expected {}",
            data.len(),
            expected_len
        ));
    }

    let packed = YuvPackedImage {
        yuy: data,
        yuy_stride: width * 2,
        width,
        height,
    };
    let mut rgb = vec![0u8; width as usize * height as usize * 3];

    yuyv422_to_rgb(
        &packed,
        &mut rgb,
        width * 3,
        YuvRange::Full,
        YuvStandardMatrix::Bt709,
    )
    .map_err(|err| anyhow!("YUYV422→RGB failed: {err:?}"))?;

    Ok(rgb)
}

fn mjpeg_to_rgb(data: &[u8]) -> Result<(Vec<u8>, u32, u32)> {
    let options = DecoderOptions::default().jpeg_set_out_colorspace(ColorSpace::RGB);
    let mut decoder = JpegDecoder::new_with_options(ZCursor::new(data), options);
    let rgb = decoder
        .decode()
        .map_err(|err| anyhow!("MJPEG decode failed: {err:?}"))?;

    let info = decoder
        .info()
        .ok_or_else(|| anyhow!("MJPEG decoder produced no image info"))?;
    let expected_len = usize::try_from(info.width)
        .and_then(|w| usize::try_from(info.height).map(|h| w * h * 3))
        .map_err(|_| anyhow!("MJPEG dimensions do not fit usize"))?;
    if rgb.len() < expected_len {
        return Err(anyhow!(
            "MJPEG decode produced too few bytes: got {}, expected {}",
            rgb.len(),
            expected_len
        ));
    }

    let width =
        u32::try_from(info.width).map_err(|_| anyhow!("MJPEG width does not fit u32"))?;
    let height =
        u32::try_from(info.height).map_err(|_| anyhow!("MJPEG height does not fit u32"))?;

    Ok((rgb, width, height))
}

fn packed_to_rgb(data: &[u8], width: u32, height: u32, swap_rb: bool) -> Result<Vec<u8>> {
    let expected_len = width as usize * height as usize * 3;
    if data.len() < expected_len {
        return Err(anyhow!(
            "RGB buffer too small: got {}, expected {}",
            data.len(),
            expected_len
        ));
    }

    let mut rgb = data[..expected_len].to_vec();
    if swap_rb {
        rgb.par_chunks_exact_mut(3).for_each(|px| px.swap(0, 2));
    }
    Ok(rgb)
}

fn gray_to_rgb(data: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    let expected_len = width as usize * height as usize;
    if data.len() < expected_len {
        return Err(anyhow!(
            "GRAY buffer too small: got {}, expected {}",
            data.len(),
            expected_len
        ));
    }

    let mut rgb = vec![0u8; expected_len * 3];
    rgb.par_chunks_exact_mut(3)
        .zip(data[..expected_len].par_iter().copied())
        .for_each(|(dst, value)| dst.fill(value));

    Ok(rgb)
}
